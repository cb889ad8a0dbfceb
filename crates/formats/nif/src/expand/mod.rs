//! Size-changing block transformations: packed-geometry unpacking, skin
//! partition re-population, and Havok vertex decompression. Each scanner
//! parses its block type out of the big-endian input and produces an
//! expansion record the layout planner and output writer consume.

pub mod havok;
pub mod packed_geometry;
pub mod skin_partition;

use std::io;

use thiserror::Error;


/// A failed expansion parse. Never fatal to the conversion: the affected
/// block falls back to a same-size conversion and the failure is logged.
#[derive(Error, Debug)]
pub enum ExpandError {
    #[error("unexpected end of block data")]
    Truncated(#[from] io::Error),

    #[error("block layout mismatch: {0}")]
    Layout(String),
}
