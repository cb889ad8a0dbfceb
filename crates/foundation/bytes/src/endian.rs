use thiserror::Error;

use crate::half::decode_f16;


/// A read or swap would run past the end of the buffer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("read of {wanted} bytes at offset {offset} exceeds buffer of {len} bytes")]
pub struct Truncated {
    pub offset: usize,
    pub wanted: usize,
    pub len:    usize,
}

#[inline]
fn take<const N: usize>(buf: &[u8], pos: usize) -> Result<[u8; N], Truncated> {
    match pos.checked_add(N).and_then(|end| buf.get(pos..end)) {
        // The slice has length exactly N, so this try_into does not fail.
        Some(bytes) => Ok(bytes.try_into().unwrap()),
        None => Err(Truncated {
            offset: pos,
            wanted: N,
            len:    buf.len(),
        }),
    }
}

#[inline]
pub fn read_u8(buf: &[u8], pos: usize) -> Result<u8, Truncated> {
    Ok(take::<1>(buf, pos)?[0])
}

#[inline]
pub fn read_u16_be(buf: &[u8], pos: usize) -> Result<u16, Truncated> {
    Ok(u16::from_be_bytes(take(buf, pos)?))
}

#[inline]
pub fn read_u16_le(buf: &[u8], pos: usize) -> Result<u16, Truncated> {
    Ok(u16::from_le_bytes(take(buf, pos)?))
}

#[inline]
pub fn read_u32_be(buf: &[u8], pos: usize) -> Result<u32, Truncated> {
    Ok(u32::from_be_bytes(take(buf, pos)?))
}

#[inline]
pub fn read_u32_le(buf: &[u8], pos: usize) -> Result<u32, Truncated> {
    Ok(u32::from_le_bytes(take(buf, pos)?))
}

#[inline]
pub fn read_u64_be(buf: &[u8], pos: usize) -> Result<u64, Truncated> {
    Ok(u64::from_be_bytes(take(buf, pos)?))
}

#[inline]
pub fn read_u64_le(buf: &[u8], pos: usize) -> Result<u64, Truncated> {
    Ok(u64::from_le_bytes(take(buf, pos)?))
}

#[inline]
pub fn read_i32_be(buf: &[u8], pos: usize) -> Result<i32, Truncated> {
    Ok(i32::from_be_bytes(take(buf, pos)?))
}

#[inline]
pub fn read_i32_le(buf: &[u8], pos: usize) -> Result<i32, Truncated> {
    Ok(i32::from_le_bytes(take(buf, pos)?))
}

#[inline]
pub fn read_f32_be(buf: &[u8], pos: usize) -> Result<f32, Truncated> {
    Ok(f32::from_bits(read_u32_be(buf, pos)?))
}

#[inline]
pub fn read_f32_le(buf: &[u8], pos: usize) -> Result<f32, Truncated> {
    Ok(f32::from_bits(read_u32_le(buf, pos)?))
}

/// Read a big-endian binary16 value and widen it to an `f32`.
#[inline]
pub fn read_f16_be(buf: &[u8], pos: usize) -> Result<f32, Truncated> {
    Ok(decode_f16(read_u16_be(buf, pos)?))
}

#[inline]
fn swap_inplace<const N: usize>(buf: &mut [u8], pos: usize) -> Result<(), Truncated> {
    match pos.checked_add(N).and_then(|end| buf.get_mut(pos..end)) {
        Some(bytes) => {
            bytes.reverse();
            Ok(())
        }
        None => Err(Truncated {
            offset: pos,
            wanted: N,
            len:    buf.len(),
        }),
    }
}

#[inline]
pub fn swap_u16_inplace(buf: &mut [u8], pos: usize) -> Result<(), Truncated> {
    swap_inplace::<2>(buf, pos)
}

#[inline]
pub fn swap_u32_inplace(buf: &mut [u8], pos: usize) -> Result<(), Truncated> {
    swap_inplace::<4>(buf, pos)
}

#[inline]
pub fn swap_u64_inplace(buf: &mut [u8], pos: usize) -> Result<(), Truncated> {
    swap_inplace::<8>(buf, pos)
}

#[inline]
pub fn push_u16_le(out: &mut Vec<u8>, value: u16) {
    out.extend(value.to_le_bytes());
}

#[inline]
pub fn push_u32_le(out: &mut Vec<u8>, value: u32) {
    out.extend(value.to_le_bytes());
}

#[inline]
pub fn push_i32_le(out: &mut Vec<u8>, value: i32) {
    out.extend(value.to_le_bytes());
}

#[inline]
pub fn push_f32_le(out: &mut Vec<u8>, value: f32) {
    out.extend(value.to_bits().to_le_bytes());
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_respect_endianness() {
        let buf = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0];

        assert_eq!(read_u16_be(&buf, 0), Ok(0x1234));
        assert_eq!(read_u16_le(&buf, 0), Ok(0x3412));
        assert_eq!(read_u32_be(&buf, 0), Ok(0x1234_5678));
        assert_eq!(read_u32_le(&buf, 0), Ok(0x7856_3412));
        assert_eq!(read_u64_be(&buf, 0), Ok(0x1234_5678_9ABC_DEF0));
        assert_eq!(read_u64_le(&buf, 0), Ok(0xF0DE_BC9A_7856_3412));

        assert_eq!(read_i32_be(&[0xFF; 4], 0), Ok(-1));
        assert_eq!(read_i32_le(&[0xFF; 4], 0), Ok(-1));

        let pi = std::f32::consts::PI;
        assert_eq!(read_f32_be(&pi.to_bits().to_be_bytes(), 0), Ok(pi));
        assert_eq!(read_f32_le(&pi.to_bits().to_le_bytes(), 0), Ok(pi));

        // 0x3C00 is 1.0 in binary16.
        assert_eq!(read_f16_be(&[0x3C, 0x00], 0), Ok(1.0));
    }

    #[test]
    fn reads_are_bounds_checked() {
        let buf = [0u8; 3];

        assert_eq!(
            read_u32_be(&buf, 0),
            Err(Truncated { offset: 0, wanted: 4, len: 3 }),
        );
        assert_eq!(
            read_u16_le(&buf, 2),
            Err(Truncated { offset: 2, wanted: 2, len: 3 }),
        );
        assert!(read_u8(&buf, 2).is_ok());
        assert!(read_u8(&buf, 3).is_err());
    }

    #[test]
    fn swap_reverses_in_place() {
        let mut buf = [0x12, 0x34, 0x56, 0x78, 0x9A];

        swap_u32_inplace(&mut buf, 0).unwrap();
        assert_eq!(buf, [0x78, 0x56, 0x34, 0x12, 0x9A]);

        swap_u16_inplace(&mut buf, 3).unwrap();
        assert_eq!(buf, [0x78, 0x56, 0x34, 0x9A, 0x12]);

        assert!(swap_u16_inplace(&mut buf, 4).is_err());

        let mut wide = [1u8, 2, 3, 4, 5, 6, 7, 8];
        swap_u64_inplace(&mut wide, 0).unwrap();
        assert_eq!(wide, [8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn pushes_emit_little_endian() {
        let mut out = Vec::new();
        push_u16_le(&mut out, 0x1234);
        push_u32_le(&mut out, 0x5678_9ABC);
        push_i32_le(&mut out, -1);

        assert_eq!(out, [0x34, 0x12, 0xBC, 0x9A, 0x78, 0x56, 0xFF, 0xFF, 0xFF, 0xFF]);
    }
}
