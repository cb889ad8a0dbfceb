//! Structure-aware conversion of big-endian Xbox 360 Gamebryo ("NIF")
//! containers into the little-endian form the PC builds of Fallout 3,
//! New Vegas, and Oblivion consume.
//!
//! The interesting work is structural, not just byte order: packed-geometry
//! side blocks are dissolved back into their geometry blocks, half-precision
//! streams widen to floats, skin partitions get their bone data back, and
//! block indices are remapped around the removed blocks.

pub mod container;
pub mod errors;
pub mod expand;
pub mod layout;
pub mod transcode;
pub mod writer;

mod interface;


pub use self::container::{BlockInfo, ContainerView};
pub use self::errors::ConvertError;
pub use self::interface::{
    ContentClass, Conversion, ProbeResult, can_convert, classify, convert, probe,
};
