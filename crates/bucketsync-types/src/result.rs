//! Result type alias for bucketsync operations

use crate::Error;

/// Result type alias for bucketsync operations
pub type Result<T> = std::result::Result<T, Error>;
