//! Configuration types for bucketsync
//!
//! Validated newtypes shared by the configuration loader and the sync engine.

/// Fingerprint chunk size, which must equal the store's multipart part size
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "usize", into = "usize"))]
pub struct ChunkSize(usize);

impl ChunkSize {
    /// Minimum multipart part size accepted by S3-compatible stores (5MiB)
    pub const MIN: usize = 5 * 1024 * 1024;
    /// Maximum multipart part size accepted by S3-compatible stores (5GiB)
    pub const MAX: usize = 5 * 1024 * 1024 * 1024;
    /// Default chunk size (5MiB)
    pub const DEFAULT: usize = Self::MIN;

    /// Create a new chunk size with validation
    pub fn new(size: usize) -> Result<Self, String> {
        if size < Self::MIN {
            Err(format!("Chunk size {} is below minimum {}", size, Self::MIN))
        } else if size > Self::MAX {
            Err(format!("Chunk size {} exceeds maximum {}", size, Self::MAX))
        } else {
            Ok(Self(size))
        }
    }

    /// Get the chunk size value
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<usize> for ChunkSize {
    type Error = String;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

impl From<ChunkSize> for usize {
    fn from(size: ChunkSize) -> Self {
        size.0
    }
}

/// Number of objects transferred at the same time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "usize", into = "usize"))]
pub struct Concurrency(usize);

impl Concurrency {
    /// Minimum concurrency (strictly sequential)
    pub const MIN: usize = 1;
    /// Maximum concurrency
    pub const MAX: usize = 64;

    /// Create a new concurrency value with validation
    pub fn new(count: usize) -> Result<Self, String> {
        if count < Self::MIN {
            Err(format!("Concurrency {} is below minimum {}", count, Self::MIN))
        } else if count > Self::MAX {
            Err(format!("Concurrency {} exceeds maximum {}", count, Self::MAX))
        } else {
            Ok(Self(count))
        }
    }

    /// Get the concurrency value
    pub fn get(self) -> usize {
        self.0
    }

    /// One object at a time
    pub fn sequential() -> Self {
        Self(Self::MIN)
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self::sequential()
    }
}

impl TryFrom<usize> for Concurrency {
    type Error = String;

    fn try_from(count: usize) -> Result<Self, Self::Error> {
        Self::new(count)
    }
}

impl From<Concurrency> for usize {
    fn from(count: Concurrency) -> Self {
        count.0
    }
}
