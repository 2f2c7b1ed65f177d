//! Content fingerprints compatible with multipart ETags
//!
//! A payload no larger than the chunk size is identified by the quoted hex MD5
//! of its bytes. A larger payload is split into chunk-sized parts; the MD5 of
//! the concatenated raw part digests is rendered as `"<hex>-<parts>"`. This is
//! the tag an S3-compatible store reports for an object uploaded with parts of
//! exactly the same size, so the chunk size must match the upload part size.

use bucketsync_types::{ChunkSize, Fingerprint};
use md5::{Digest, Md5};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

const READ_BUFFER_SIZE: usize = 64 * 1024;

type PartDigest = md5::digest::Output<Md5>;

/// Computes ETag-compatible fingerprints for a fixed chunk size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentFingerprint {
    chunk_size: usize,
}

impl ContentFingerprint {
    /// Create a fingerprinter for the given chunk size
    pub fn new(chunk_size: ChunkSize) -> Self {
        Self {
            chunk_size: chunk_size.get(),
        }
    }

    /// Create a fingerprinter with an unvalidated chunk size.
    ///
    /// Zero is clamped to one byte.
    pub fn with_raw_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Chunk size in bytes
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Fingerprint an in-memory payload
    pub fn fingerprint(&self, payload: &[u8]) -> String {
        if payload.len() <= self.chunk_size {
            return render(&Md5::digest(payload), None);
        }

        let digests: Vec<PartDigest> = payload
            .chunks(self.chunk_size)
            .map(|chunk| Md5::digest(chunk))
            .collect();
        combine(&digests)
    }

    /// Fingerprint a stream without holding more than one read buffer in memory
    pub async fn fingerprint_reader<R>(&self, mut reader: R) -> std::io::Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE.min(self.chunk_size)];
        let mut digests: Vec<PartDigest> = Vec::new();
        let mut part = Md5::new();
        let mut part_len = 0usize;

        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }

            let mut data = &buffer[..read];
            while !data.is_empty() {
                let take = data.len().min(self.chunk_size - part_len);
                part.update(&data[..take]);
                part_len += take;
                data = &data[take..];

                if part_len == self.chunk_size {
                    digests.push(std::mem::take(&mut part).finalize());
                    part_len = 0;
                }
            }
        }

        if part_len > 0 {
            digests.push(part.finalize());
        }

        Ok(match digests.as_slice() {
            [] => render(&Md5::digest(b""), None),
            [single] => render(single, None),
            _ => combine(&digests),
        })
    }

    /// Fingerprint a local file.
    ///
    /// Read failures yield [`Fingerprint::Unknown`], which never matches a
    /// remote tag.
    pub async fn fingerprint_file(&self, path: &Path) -> Fingerprint {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot open file for fingerprinting");
                return Fingerprint::Unknown;
            }
        };

        match self.fingerprint_reader(file).await {
            Ok(tag) => Fingerprint::Known(tag),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read file for fingerprinting");
                Fingerprint::Unknown
            }
        }
    }
}

impl Default for ContentFingerprint {
    fn default() -> Self {
        Self::new(ChunkSize::default())
    }
}

fn combine(digests: &[PartDigest]) -> String {
    let mut outer = Md5::new();
    for digest in digests {
        outer.update(digest);
    }
    render(&outer.finalize(), Some(digests.len()))
}

fn render(digest: &[u8], parts: Option<usize>) -> String {
    match parts {
        Some(parts) => format!("\"{}-{}\"", hex::encode(digest), parts),
        None => format!("\"{}\"", hex::encode(digest)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn md5_hex(data: &[u8]) -> String {
        hex::encode(Md5::digest(data))
    }

    #[rstest]
    #[case(b"".as_slice(), "\"d41d8cd98f00b204e9800998ecf8427e\"")]
    #[case(b"hello".as_slice(), "\"5d41402abc4b2a76b9719d911017c592\"")]
    fn test_known_single_part_tags(#[case] payload: &[u8], #[case] expected: &str) {
        let fingerprint = ContentFingerprint::default();
        assert_eq!(fingerprint.fingerprint(payload), expected);
    }

    #[test]
    fn test_payload_equal_to_chunk_is_single_part() {
        let fingerprint = ContentFingerprint::with_raw_chunk_size(4);
        assert_eq!(
            fingerprint.fingerprint(b"abcd"),
            format!("\"{}\"", md5_hex(b"abcd"))
        );
    }

    #[test]
    fn test_one_byte_over_chunk_is_two_parts() {
        let fingerprint = ContentFingerprint::with_raw_chunk_size(4);

        let mut concatenated = Vec::new();
        concatenated.extend_from_slice(&Md5::digest(b"abcd"));
        concatenated.extend_from_slice(&Md5::digest(b"e"));
        let expected = format!("\"{}-2\"", md5_hex(&concatenated));

        assert_eq!(fingerprint.fingerprint(b"abcde"), expected);
    }

    #[tokio::test]
    async fn test_default_chunk_boundary_on_disk() {
        let chunk = ChunkSize::default().get();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![7u8; chunk + 1]).unwrap();
        file.flush().unwrap();

        let tag = ContentFingerprint::default()
            .fingerprint_file(file.path())
            .await;
        let tag = tag.as_tag().unwrap().to_string();
        assert!(tag.ends_with("-2\""), "unexpected tag {}", tag);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_unknown() {
        let fingerprint = ContentFingerprint::default()
            .fingerprint_file(Path::new("/nonexistent/bucketsync/file.bin"))
            .await;
        assert_eq!(fingerprint, Fingerprint::Unknown);
        assert!(!fingerprint.matches("\"d41d8cd98f00b204e9800998ecf8427e\""));
    }

    #[tokio::test]
    async fn test_empty_stream_matches_empty_payload() {
        let fingerprint = ContentFingerprint::with_raw_chunk_size(8);
        let streamed = fingerprint.fingerprint_reader(&b""[..]).await.unwrap();
        assert_eq!(streamed, fingerprint.fingerprint(b""));
    }

    proptest! {
        #[test]
        fn test_fingerprint_is_deterministic(
            payload in proptest::collection::vec(any::<u8>(), 0..512),
            chunk in 1usize..64,
        ) {
            let fingerprint = ContentFingerprint::with_raw_chunk_size(chunk);
            let first = fingerprint.fingerprint(&payload);
            let _ = fingerprint.fingerprint(b"unrelated call in between");
            prop_assert_eq!(first, fingerprint.fingerprint(&payload));
        }

        #[test]
        fn test_part_suffix_only_above_chunk(
            payload in proptest::collection::vec(any::<u8>(), 0..512),
            chunk in 1usize..64,
        ) {
            let tag = ContentFingerprint::with_raw_chunk_size(chunk).fingerprint(&payload);
            if payload.len() <= chunk {
                prop_assert_eq!(tag, format!("\"{}\"", md5_hex(&payload)));
            } else {
                let parts = payload.len().div_ceil(chunk);
                let suffix = format!("-{}\"", parts);
                prop_assert!(tag.ends_with(&suffix));
            }
        }

        #[test]
        fn test_streaming_matches_in_memory(
            payload in proptest::collection::vec(any::<u8>(), 0..2048),
            chunk in 1usize..300,
        ) {
            let fingerprint = ContentFingerprint::with_raw_chunk_size(chunk);
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let streamed = runtime
                .block_on(fingerprint.fingerprint_reader(payload.as_slice()))
                .unwrap();
            prop_assert_eq!(streamed, fingerprint.fingerprint(&payload));
        }
    }
}
