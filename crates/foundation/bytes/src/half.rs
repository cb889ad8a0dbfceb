//! IEEE-754 binary16 ("half") conversions. Xbox 360 Gamebryo files store
//! packed vertex positions, UVs, and bone weights as halves; the PC builds
//! expect full binary32 floats.


/// Widen a binary16 bit pattern to the exactly-representable `f32`.
///
/// Subnormal halves are renormalized, and an all-ones exponent maps to
/// ±infinity or NaN (the 10 payload bits are kept in the top of the `f32`
/// payload).
pub fn decode_f16(bits: u16) -> f32 {
    let sign = u32::from(bits >> 15) << 31;
    let exp  = u32::from((bits >> 10) & 0x1F);
    let mant = u32::from(bits & 0x3FF);

    let out = match (exp, mant) {
        (0, 0)  => sign,
        (0, _)  => {
            // Subnormal: shift the mantissa up until its leading bit becomes
            // the implicit one. Each shift costs one exponent step below the
            // smallest normal half exponent.
            let mut exp  = 113u32;
            let mut mant = mant;
            while mant & 0x400 == 0 {
                mant <<= 1;
                exp -= 1;
            }
            sign | (exp << 23) | ((mant & 0x3FF) << 13)
        }
        (31, _) => sign | 0x7F80_0000 | (mant << 13),
        _       => sign | ((exp + 112) << 23) | (mant << 13),
    };

    f32::from_bits(out)
}

/// Narrow an `f32` to the nearest binary16 bit pattern (ties to even).
/// Out-of-range magnitudes become ±infinity; NaN payloads are truncated
/// and quieted.
pub fn encode_f16(value: f32) -> u16 {
    let bits  = value.to_bits();
    let sign  = ((bits >> 16) & 0x8000) as u16;
    let exp32 = ((bits >> 23) & 0xFF) as i32;
    let mant32 = bits & 0x007F_FFFF;

    if exp32 == 0xFF {
        return if mant32 != 0 {
            sign | 0x7C00 | 0x200 | ((mant32 >> 13) as u16 & 0x1FF)
        } else {
            sign | 0x7C00
        };
    }

    let exp16 = exp32 - 127 + 15;

    if exp16 >= 31 {
        return sign | 0x7C00;
    }

    if exp16 <= 0 {
        // Subnormal half (or zero). The implicit bit joins the fraction and
        // everything shifts right by the exponent deficit.
        if exp16 < -10 {
            return sign;
        }
        let mant = mant32 | 0x0080_0000;
        let shift = (14 - exp16) as u32;
        let frac = mant >> shift;
        let rem  = mant & ((1 << shift) - 1);
        let half = 1 << (shift - 1);

        let mut out = frac as u16;
        if rem > half || (rem == half && out & 1 == 1) {
            out += 1;
        }
        return sign | out;
    }

    let mut out = ((exp16 as u32) << 10 | (mant32 >> 13)) as u16;
    let rem = mant32 & 0x1FFF;
    if rem > 0x1000 || (rem == 0x1000 && out & 1 == 1) {
        // A carry out of the fraction rolls into the exponent field, which
        // is the IEEE-correct result (possibly infinity).
        out += 1;
    }
    sign | out
}
