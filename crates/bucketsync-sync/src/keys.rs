//! Key and path conversions between the local tree and a bucket prefix
//!
//! Relative keys are always `/`-separated. A remote key is the normalized
//! prefix joined to a relative key with a single `/`.

use bucketsync_types::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Strip surrounding slashes from a configured prefix
pub fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_matches('/').to_string()
}

/// Prefix sent to the listing capability.
///
/// A non-empty prefix gets a trailing `/` so that `data` never matches
/// `database/...`.
pub fn listing_prefix(prefix: &str) -> String {
    let prefix = normalize_prefix(prefix);
    if prefix.is_empty() {
        prefix
    } else {
        format!("{}/", prefix)
    }
}

/// Full remote key for a relative key under `prefix`
pub fn remote_key(prefix: &str, relative_key: &str) -> String {
    let prefix = normalize_prefix(prefix);
    if prefix.is_empty() {
        relative_key.to_string()
    } else {
        format!("{}/{}", prefix, relative_key)
    }
}

/// Relative key of `path` under `root`, or `None` when `path` is the root
/// itself, lies outside it, or is not valid UTF-8.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Local path for a relative key under `root`.
///
/// Keys that would escape the root (`..`, absolute segments, empty
/// segments) are rejected.
pub fn local_path(root: &Path, relative_key: &str) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in relative_key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return Err(Error::other(format!(
                "Refusing to map key '{}' below '{}'",
                relative_key,
                root.display()
            )));
        }
        path.push(segment);
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "")]
    #[case("/", "")]
    #[case("data", "data/")]
    #[case("/data/", "data/")]
    #[case("site/www", "site/www/")]
    fn test_listing_prefix(#[case] prefix: &str, #[case] expected: &str) {
        assert_eq!(listing_prefix(prefix), expected);
    }

    #[rstest]
    #[case("", "x.txt", "x.txt")]
    #[case("data", "x.txt", "data/x.txt")]
    #[case("data/", "a/b.txt", "data/a/b.txt")]
    fn test_remote_key(#[case] prefix: &str, #[case] key: &str, #[case] expected: &str) {
        assert_eq!(remote_key(prefix, key), expected);
    }

    #[test]
    fn test_relative_key_uses_forward_slashes() {
        let root = Path::new("/srv/site");
        let path = root.join("assets").join("css").join("main.css");
        assert_eq!(
            relative_key(root, &path).as_deref(),
            Some("assets/css/main.css")
        );
        assert_eq!(relative_key(root, root), None);
        assert_eq!(relative_key(root, Path::new("/srv/other/x")), None);
    }

    #[rstest]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("a//b")]
    #[case("./a")]
    fn test_local_path_rejects_escapes(#[case] key: &str) {
        assert!(local_path(Path::new("/srv/site"), key).is_err());
    }

    #[test]
    fn test_local_path_nests_segments() {
        let path = local_path(Path::new("/srv/site"), "a/b/c.txt").unwrap();
        assert_eq!(path, Path::new("/srv/site").join("a").join("b").join("c.txt"));
    }
}
