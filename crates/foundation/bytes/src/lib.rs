//! Bounds-checked endian primitives over indexed byte buffers, plus the
//! IEEE-754 binary16 conversions used by packed Gamebryo vertex streams.

mod endian;
mod half;


pub use self::endian::{
    Truncated,
    read_u8, read_u16_be, read_u16_le, read_u32_be, read_u32_le,
    read_u64_be, read_u64_le, read_i32_be, read_i32_le,
    read_f32_be, read_f32_le, read_f16_be,
    swap_u16_inplace, swap_u32_inplace, swap_u64_inplace,
    push_u16_le, push_u32_le, push_i32_le, push_f32_le,
};
pub use self::half::{decode_f16, encode_f16};
