use thiserror::Error;

use wastegate_bytes::Truncated;
use wastegate_schema::VersionTriple;


/// A fatal conversion failure. Errors localized to a single block are not
/// represented here; those fall back (bulk swap or same-size conversion) and
/// are logged instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("input truncated: {0}")]
    Truncated(#[from] Truncated),

    #[error("not a Gamebryo file: {0}")]
    BadMagic(String),

    #[error("malformed version string {0:?} in header")]
    BadVersionString(String),

    #[error("endian byte {0:#04x} is neither big-endian (0) nor little-endian (1)")]
    BadEndianByte(u8),

    #[error("unsupported Gamebryo version {0}")]
    UnsupportedVersion(VersionTriple),

    #[error("container limit exceeded: {0}")]
    LimitExceeded(String),

    #[error(
        "block {index} at offset {offset} with size {size} overruns the input of {input_len} bytes"
    )]
    BlockBoundsExceeded {
        index:     usize,
        offset:    usize,
        size:      u32,
        input_len: usize,
    },

    #[error("internal layout invariant violated: {0}")]
    Internal(String),
}
