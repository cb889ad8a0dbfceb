//! BSPackedAdditionalGeometryData extraction. The Xbox 360 builds move
//! vertex streams out of the geometry data block into a packed side block,
//! compressed to halves and bytes; the PC builds expect full-precision
//! streams back inside NiTriShapeData / NiTriStripsData. The packed block is
//! removed from the output and each referencing geometry block grows.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt as _};

use wastegate_bytes::{decode_f16, push_f32_le, push_i32_le, push_u16_le, push_u32_le};

use super::ExpandError;


/// Stream-presence bits of the packed block's vertex format word.
pub const FMT_POSITIONS: u32 = 0x01;
pub const FMT_NORMALS: u32 = 0x02;
pub const FMT_UVS: u32 = 0x04;
pub const FMT_BONE_INDICES: u32 = 0x08;
pub const FMT_BONE_WEIGHTS: u32 = 0x10;
pub const FMT_TRIANGLES: u32 = 0x20;
pub const FMT_TANGENTS: u32 = 0x40;
pub const FMT_BITANGENTS: u32 = 0x80;

/// Decoded streams of one packed block, indexed by mesh vertex.
#[derive(Debug, Clone)]
pub struct PackedStreams {
    pub block_index:  usize,
    pub num_vertices: usize,
    pub format:       u32,
    pub positions:    Vec<[f32; 3]>,
    pub normals:      Vec<[f32; 3]>,
    pub uvs:          Vec<[f32; 2]>,
    pub tangents:     Vec<[f32; 3]>,
    pub bitangents:   Vec<[f32; 3]>,
    pub bone_indices: Vec<[u8; 4]>,
    pub bone_weights: Vec<[f32; 4]>,
    pub triangles:    Vec<[u16; 3]>,
}

impl PackedStreams {
    pub fn has(&self, bit: u32) -> bool {
        self.format & bit != 0
    }

    /// Parse a big-endian packed block body.
    pub fn parse(
        input:       &[u8],
        block_index: usize,
        offset:      usize,
        size:        u32,
    ) -> Result<Self, ExpandError> {
        let block = block_slice(input, offset, size)?;
        let mut r = Cursor::new(block);

        let num_vertices = usize::from(r.read_u16::<BigEndian>()?);
        let format = r.read_u32::<BigEndian>()?;

        let num_triangles = if format & FMT_TRIANGLES != 0 {
            r.read_u32::<BigEndian>()? as usize
        } else {
            0
        };

        let mut streams = Self {
            block_index,
            num_vertices,
            format,
            positions:    Vec::new(),
            normals:      Vec::new(),
            uvs:          Vec::new(),
            tangents:     Vec::new(),
            bitangents:   Vec::new(),
            bone_indices: Vec::new(),
            bone_weights: Vec::new(),
            triangles:    Vec::new(),
        };

        if format & FMT_POSITIONS != 0 {
            streams.positions = read_half3s(&mut r, num_vertices)?;
        }
        if format & FMT_NORMALS != 0 {
            streams.normals = read_byte4_vectors(&mut r, num_vertices)?;
        }
        if format & FMT_UVS != 0 {
            for _ in 0..num_vertices {
                streams.uvs.push([read_half(&mut r)?, read_half(&mut r)?]);
            }
        }
        if format & FMT_BONE_INDICES != 0 {
            for _ in 0..num_vertices {
                let mut quad = [0u8; 4];
                r.read_exact(&mut quad)?;
                streams.bone_indices.push(quad);
            }
        }
        if format & FMT_BONE_WEIGHTS != 0 {
            for _ in 0..num_vertices {
                streams.bone_weights.push([
                    read_half(&mut r)?,
                    read_half(&mut r)?,
                    read_half(&mut r)?,
                    read_half(&mut r)?,
                ]);
            }
        }
        if format & FMT_TANGENTS != 0 {
            streams.tangents = read_byte4_vectors(&mut r, num_vertices)?;
        }
        if format & FMT_BITANGENTS != 0 {
            streams.bitangents = read_byte4_vectors(&mut r, num_vertices)?;
        }
        if format & FMT_TRIANGLES != 0 {
            for _ in 0..num_triangles {
                streams.triangles.push([
                    r.read_u16::<BigEndian>()?,
                    r.read_u16::<BigEndian>()?,
                    r.read_u16::<BigEndian>()?,
                ]);
            }
        }

        expect_fully_read(&r, size)?;
        Ok(streams)
    }
}

/// A geometry data block parsed in its Xbox form: the streams named by the
/// packed block's format are stored compressed in place of the PC arrays.
#[derive(Debug, Clone)]
pub struct XboxGeomData {
    pub block_index: usize,
    /// The packed block whose format this block was parsed under.
    pub packed_block: usize,
    group_id:          i32,
    num_vertices:      u16,
    keep_flags:        u8,
    compress_flags:    u8,
    has_vertices:      bool,
    vertices:          Vec<[f32; 3]>,
    bs_vector_flags:   u16,
    has_normals:       bool,
    normals:           Vec<[f32; 3]>,
    tangents:          Vec<[f32; 3]>,
    bitangents:        Vec<[f32; 3]>,
    center:            [f32; 3],
    radius:            f32,
    has_vertex_colors: bool,
    vertex_colors:     Vec<[f32; 4]>,
    uv_sets:           Vec<Vec<[f32; 2]>>,
    consistency_flags: u16,
    num_triangles:     u16,
    tail:              GeomTail,
}

#[derive(Debug, Clone)]
enum GeomTail {
    TriShape {
        num_triangle_points: u32,
        has_triangles:       bool,
        triangles:           Vec<[u16; 3]>,
        match_groups:        Vec<Vec<u16>>,
    },
    TriStrips {
        strip_lengths: Vec<u16>,
        has_points:    bool,
        points:        Vec<Vec<u16>>,
    },
}

/// Tangent/bitangent presence bit of BS Vector Flags.
const BSVF_TANGENTS: u16 = 4096;
/// UV presence bit of BS Vector Flags.
const BSVF_UV: u16 = 1;

impl XboxGeomData {
    /// Parse a big-endian geometry data block under the hypothesis that its
    /// compressed streams follow `packed`'s format. Fails (cheaply) when the
    /// hypothesis is wrong; the caller tries each packed block in turn.
    pub fn parse(
        input:       &[u8],
        block_index: usize,
        offset:      usize,
        size:        u32,
        strips:      bool,
        packed:      &PackedStreams,
    ) -> Result<Self, ExpandError> {
        let block = block_slice(input, offset, size)?;
        let mut r = Cursor::new(block);

        let group_id = r.read_i32::<BigEndian>()?;
        let num_vertices = r.read_u16::<BigEndian>()?;
        let keep_flags = r.read_u8()?;
        let compress_flags = r.read_u8()?;

        if usize::from(num_vertices) != packed.num_vertices {
            return Err(ExpandError::Layout(format!(
                "geometry block declares {num_vertices} vertices, packed block {}",
                packed.num_vertices,
            )));
        }
        let nv = usize::from(num_vertices);

        let has_vertices = r.read_u8()? != 0;
        let mut vertices = Vec::new();
        if has_vertices {
            vertices = if packed.has(FMT_POSITIONS) {
                read_half3s(&mut r, nv)?
            } else {
                read_float3s(&mut r, nv)?
            };
        }

        let bs_vector_flags = r.read_u16::<BigEndian>()?;

        let has_normals = r.read_u8()? != 0;
        let mut normals = Vec::new();
        let mut tangents = Vec::new();
        let mut bitangents = Vec::new();
        if has_normals {
            normals = if packed.has(FMT_NORMALS) {
                read_byte4_vectors(&mut r, nv)?
            } else {
                read_float3s(&mut r, nv)?
            };
            if bs_vector_flags & BSVF_TANGENTS != 0 {
                tangents = if packed.has(FMT_TANGENTS) {
                    read_byte4_vectors(&mut r, nv)?
                } else {
                    read_float3s(&mut r, nv)?
                };
                bitangents = if packed.has(FMT_BITANGENTS) {
                    read_byte4_vectors(&mut r, nv)?
                } else {
                    read_float3s(&mut r, nv)?
                };
            }
        }

        let center = [
            r.read_f32::<BigEndian>()?,
            r.read_f32::<BigEndian>()?,
            r.read_f32::<BigEndian>()?,
        ];
        let radius = r.read_f32::<BigEndian>()?;

        let has_vertex_colors = r.read_u8()? != 0;
        let mut vertex_colors = Vec::new();
        if has_vertex_colors {
            for _ in 0..nv {
                vertex_colors.push([
                    r.read_f32::<BigEndian>()?,
                    r.read_f32::<BigEndian>()?,
                    r.read_f32::<BigEndian>()?,
                    r.read_f32::<BigEndian>()?,
                ]);
            }
        }

        let uv_count = usize::from(bs_vector_flags & BSVF_UV);
        let mut uv_sets = Vec::with_capacity(uv_count);
        for _ in 0..uv_count {
            let mut set = Vec::with_capacity(nv);
            for _ in 0..nv {
                if packed.has(FMT_UVS) {
                    set.push([read_half(&mut r)?, read_half(&mut r)?]);
                } else {
                    set.push([r.read_f32::<BigEndian>()?, r.read_f32::<BigEndian>()?]);
                }
            }
            uv_sets.push(set);
        }

        let consistency_flags = r.read_u16::<BigEndian>()?;
        let additional_ref = r.read_i32::<BigEndian>()?;
        if additional_ref != block_index_as_ref(packed.block_index) {
            return Err(ExpandError::Layout(format!(
                "geometry block points at additional data {additional_ref}, not {}",
                packed.block_index,
            )));
        }

        let num_triangles = r.read_u16::<BigEndian>()?;

        let tail = if strips {
            let num_strips = usize::from(r.read_u16::<BigEndian>()?);
            let mut strip_lengths = Vec::with_capacity(num_strips);
            for _ in 0..num_strips {
                strip_lengths.push(r.read_u16::<BigEndian>()?);
            }
            let has_points = r.read_u8()? != 0;
            let mut points = Vec::new();
            if has_points {
                for &len in &strip_lengths {
                    let mut strip = Vec::with_capacity(usize::from(len));
                    for _ in 0..len {
                        strip.push(r.read_u16::<BigEndian>()?);
                    }
                    points.push(strip);
                }
            }
            GeomTail::TriStrips { strip_lengths, has_points, points }
        } else {
            let num_triangle_points = r.read_u32::<BigEndian>()?;
            let has_triangles = r.read_u8()? != 0;
            let mut triangles = Vec::new();
            if has_triangles {
                for _ in 0..num_triangles {
                    triangles.push([
                        r.read_u16::<BigEndian>()?,
                        r.read_u16::<BigEndian>()?,
                        r.read_u16::<BigEndian>()?,
                    ]);
                }
            }
            let num_match_groups = usize::from(r.read_u16::<BigEndian>()?);
            let mut match_groups = Vec::with_capacity(num_match_groups);
            for _ in 0..num_match_groups {
                let len = usize::from(r.read_u16::<BigEndian>()?);
                let mut group = Vec::with_capacity(len);
                for _ in 0..len {
                    group.push(r.read_u16::<BigEndian>()?);
                }
                match_groups.push(group);
            }
            GeomTail::TriShape {
                num_triangle_points,
                has_triangles,
                triangles,
                match_groups,
            }
        };

        expect_fully_read(&r, size)?;

        Ok(Self {
            block_index,
            packed_block: packed.block_index,
            group_id,
            num_vertices,
            keep_flags,
            compress_flags,
            has_vertices,
            vertices,
            bs_vector_flags,
            has_normals,
            normals,
            tangents,
            bitangents,
            center,
            radius,
            has_vertex_colors,
            vertex_colors,
            uv_sets,
            consistency_flags,
            num_triangles,
            tail,
        })
    }

    pub fn num_triangles(&self) -> u16 {
        self.num_triangles
    }

    /// Whether the block already embeds its triangle array.
    pub fn has_embedded_triangles(&self) -> bool {
        match &self.tail {
            GeomTail::TriShape { has_triangles, .. } => *has_triangles,
            GeomTail::TriStrips { has_points, .. }   => *has_points,
        }
    }
}

/// The growth of one geometry data block, with everything the writer needs
/// to emit its PC form.
#[derive(Debug, Clone)]
pub struct GeomExpansion {
    pub block_index:    usize,
    pub packed_block:   usize,
    pub new_size:       u32,
    pub vertex_count:   usize,
    pub normal_count:   usize,
    pub uv_count:       usize,
    /// Triangles appended because the Xbox form did not embed them.
    pub triangle_count: usize,
    geom:             XboxGeomData,
    extra_triangles:  Option<Vec<[u16; 3]>>,
}

impl GeomExpansion {
    /// Compute the growth plan for a parsed geometry block. The per-stream
    /// deltas are fixed by the precision change: half3 to float3 costs 6
    /// bytes per vertex, byte4 to float3 costs 8, half2 to float2 costs 4.
    ///
    /// `strip_triangles` supplies reconstructed faces for blocks that embed
    /// neither triangles nor a packed triangle stream.
    pub fn plan(
        geom:            XboxGeomData,
        packed:          &PackedStreams,
        original_size:   u32,
        strip_triangles: Option<Vec<[u16; 3]>>,
    ) -> Result<Self, ExpandError> {
        let nv = usize::from(geom.num_vertices);
        let mut delta = 0usize;
        let mut normal_count = 0;
        let mut uv_count = 0;

        if geom.has_vertices && packed.has(FMT_POSITIONS) {
            delta += 6 * nv;
        }
        if geom.has_normals && packed.has(FMT_NORMALS) {
            delta += 8 * nv;
            normal_count = nv;
        }
        if geom.has_normals && geom.bs_vector_flags & BSVF_TANGENTS != 0 {
            if packed.has(FMT_TANGENTS) {
                delta += 8 * nv;
            }
            if packed.has(FMT_BITANGENTS) {
                delta += 8 * nv;
            }
        }
        if packed.has(FMT_UVS) {
            uv_count = geom.uv_sets.len();
            delta += 4 * nv * uv_count;
        }

        let mut extra_triangles = None;
        let mut triangle_count = 0;
        if !geom.has_embedded_triangles() && geom.num_triangles > 0 {
            let source: Option<Vec<[u16; 3]>> = if packed.has(FMT_TRIANGLES) {
                Some(packed.triangles.clone())
            } else {
                strip_triangles
            };
            if let Some(triangles) = source {
                if triangles.len() != usize::from(geom.num_triangles) {
                    return Err(ExpandError::Layout(format!(
                        "{} reconstituted triangles for a block declaring {}",
                        triangles.len(),
                        geom.num_triangles,
                    )));
                }
                triangle_count = triangles.len();
                delta += 6 * triangle_count;
                extra_triangles = Some(triangles);
            }
        }

        Ok(Self {
            block_index:  geom.block_index,
            packed_block: packed.block_index,
            new_size:     original_size + delta as u32,
            vertex_count: nv,
            normal_count,
            uv_count,
            triangle_count,
            geom,
            extra_triangles,
        })
    }

    /// Emit the PC little-endian form of the geometry block: full-precision
    /// streams from the packed block in place of the compressed ones, the
    /// additional-data ref nulled, and reconstituted triangles appended.
    pub fn emit(&self, packed: &PackedStreams, out: &mut Vec<u8>) {
        let geom = &self.geom;
        let nv = usize::from(geom.num_vertices);

        push_i32_le(out, geom.group_id);
        push_u16_le(out, geom.num_vertices);
        out.push(geom.keep_flags);
        out.push(geom.compress_flags);

        out.push(u8::from(geom.has_vertices));
        if geom.has_vertices {
            let source = if packed.has(FMT_POSITIONS) {
                &packed.positions
            } else {
                &geom.vertices
            };
            push_float3s(out, &source[..nv]);
        }

        push_u16_le(out, geom.bs_vector_flags);

        out.push(u8::from(geom.has_normals));
        if geom.has_normals {
            let source = if packed.has(FMT_NORMALS) { &packed.normals } else { &geom.normals };
            push_float3s(out, &source[..nv]);

            if geom.bs_vector_flags & BSVF_TANGENTS != 0 {
                let source = if packed.has(FMT_TANGENTS) {
                    &packed.tangents
                } else {
                    &geom.tangents
                };
                push_float3s(out, &source[..nv]);

                let source = if packed.has(FMT_BITANGENTS) {
                    &packed.bitangents
                } else {
                    &geom.bitangents
                };
                push_float3s(out, &source[..nv]);
            }
        }

        for component in geom.center {
            push_f32_le(out, component);
        }
        push_f32_le(out, geom.radius);

        out.push(u8::from(geom.has_vertex_colors));
        for color in &geom.vertex_colors {
            for component in color {
                push_f32_le(out, *component);
            }
        }

        for (set_index, set) in geom.uv_sets.iter().enumerate() {
            if packed.has(FMT_UVS) && set_index == 0 {
                for uv in &packed.uvs[..nv] {
                    push_f32_le(out, uv[0]);
                    push_f32_le(out, uv[1]);
                }
            } else {
                for uv in set {
                    push_f32_le(out, uv[0]);
                    push_f32_le(out, uv[1]);
                }
            }
        }

        push_u16_le(out, geom.consistency_flags);
        // The packed source block is removed from the output.
        push_i32_le(out, -1);

        push_u16_le(out, geom.num_triangles);

        match &geom.tail {
            GeomTail::TriShape {
                num_triangle_points,
                has_triangles,
                triangles,
                match_groups,
            } => {
                push_u32_le(out, *num_triangle_points);

                if *has_triangles {
                    out.push(1);
                    push_triangles(out, triangles);
                } else if let Some(extra) = &self.extra_triangles {
                    out.push(1);
                    push_triangles(out, extra);
                } else {
                    out.push(0);
                }

                push_u16_le(out, match_groups.len() as u16);
                for group in match_groups {
                    push_u16_le(out, group.len() as u16);
                    for &vertex in group {
                        push_u16_le(out, vertex);
                    }
                }
            }
            GeomTail::TriStrips { strip_lengths, has_points, points } => {
                push_u16_le(out, strip_lengths.len() as u16);
                for &len in strip_lengths {
                    push_u16_le(out, len);
                }
                out.push(u8::from(*has_points));
                for strip in points {
                    for &point in strip {
                        push_u16_le(out, point);
                    }
                }
            }
        }
    }
}

fn block_index_as_ref(index: usize) -> i32 {
    i32::try_from(index).unwrap_or(-1)
}

fn block_slice(input: &[u8], offset: usize, size: u32) -> Result<&[u8], ExpandError> {
    offset
        .checked_add(size as usize)
        .and_then(|end| input.get(offset..end))
        .ok_or_else(|| ExpandError::Layout("block range outside the input".to_owned()))
}

fn expect_fully_read(r: &Cursor<&[u8]>, size: u32) -> Result<(), ExpandError> {
    if r.position() == u64::from(size) {
        Ok(())
    } else {
        Err(ExpandError::Layout(format!(
            "consumed {} bytes of a {size}-byte block",
            r.position(),
        )))
    }
}

fn read_half(r: &mut Cursor<&[u8]>) -> Result<f32, ExpandError> {
    Ok(decode_f16(r.read_u16::<BigEndian>()?))
}

fn read_half3s(r: &mut Cursor<&[u8]>, count: usize) -> Result<Vec<[f32; 3]>, ExpandError> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push([read_half(r)?, read_half(r)?, read_half(r)?]);
    }
    Ok(out)
}

fn read_float3s(r: &mut Cursor<&[u8]>, count: usize) -> Result<Vec<[f32; 3]>, ExpandError> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push([
            r.read_f32::<BigEndian>()?,
            r.read_f32::<BigEndian>()?,
            r.read_f32::<BigEndian>()?,
        ]);
    }
    Ok(out)
}

/// Byte-packed unit vectors: signed bytes scaled by 127, fourth byte unused.
fn read_byte4_vectors(r: &mut Cursor<&[u8]>, count: usize) -> Result<Vec<[f32; 3]>, ExpandError> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let mut quad = [0u8; 4];
        r.read_exact(&mut quad)?;
        out.push([
            f32::from(quad[0] as i8) / 127.0,
            f32::from(quad[1] as i8) / 127.0,
            f32::from(quad[2] as i8) / 127.0,
        ]);
    }
    Ok(out)
}

fn push_float3s(out: &mut Vec<u8>, values: &[[f32; 3]]) {
    for value in values {
        push_f32_le(out, value[0]);
        push_f32_le(out, value[1]);
        push_f32_le(out, value[2]);
    }
}

fn push_triangles(out: &mut Vec<u8>, triangles: &[[u16; 3]]) {
    for triangle in triangles {
        push_u16_le(out, triangle[0]);
        push_u16_le(out, triangle[1]);
        push_u16_le(out, triangle[2]);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use wastegate_bytes::encode_f16;

    fn be16(v: u16) -> [u8; 2] {
        v.to_be_bytes()
    }

    fn be32(v: u32) -> [u8; 4] {
        v.to_be_bytes()
    }

    fn push_half_be(out: &mut Vec<u8>, value: f32) {
        out.extend(encode_f16(value).to_be_bytes());
    }

    /// Packed block with half3 positions for the unit triangle and one
    /// embedded triangle record.
    fn packed_positions_and_triangle() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(be16(3));
        out.extend(be32(FMT_POSITIONS | FMT_TRIANGLES));
        out.extend(be32(1));
        for position in [[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] {
            for component in position {
                push_half_be(&mut out, component);
            }
        }
        for index in [0u16, 1, 2] {
            out.extend(be16(index));
        }
        out
    }

    #[test]
    fn parses_packed_streams() {
        let block = packed_positions_and_triangle();
        let streams = PackedStreams::parse(&block, 2, 0, block.len() as u32).unwrap();

        assert_eq!(streams.num_vertices, 3);
        assert!(streams.has(FMT_POSITIONS));
        assert!(streams.has(FMT_TRIANGLES));
        assert_eq!(streams.positions, vec![
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
        assert_eq!(streams.triangles, vec![[0, 1, 2]]);
    }

    #[test]
    fn rejects_a_short_packed_block() {
        let block = packed_positions_and_triangle();
        assert!(PackedStreams::parse(&block[..10], 2, 0, 10).is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        let mut block = packed_positions_and_triangle();
        block.extend([0, 0]);
        let size = block.len() as u32;
        assert!(matches!(
            PackedStreams::parse(&block, 2, 0, size),
            Err(ExpandError::Layout(_)),
        ));
    }

    /// An Xbox-form NiTriShapeData with compressed (half3) positions and an
    /// embedded triangle, pointing at packed block 2.
    fn xbox_trishape_data() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(be32(0)); // Group ID
        out.extend(be16(3)); // Num Vertices
        out.push(0); // Keep Flags
        out.push(0); // Compress Flags
        out.push(1); // Has Vertices
        for position in [[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] {
            for component in position {
                push_half_be(&mut out, component);
            }
        }
        out.extend(be16(0)); // BS Vector Flags
        out.push(0); // Has Normals
        for _ in 0..4 {
            out.extend(be32(0)); // Center + Radius
        }
        out.push(0); // Has Vertex Colors
        out.extend(be16(0)); // Consistency Flags
        out.extend(be32(2)); // Additional Data -> block 2
        out.extend(be16(1)); // Num Triangles
        out.extend(be32(3)); // Num Triangle Points
        out.push(1); // Has Triangles
        for index in [0u16, 1, 2] {
            out.extend(be16(index));
        }
        out.extend(be16(0)); // Num Match Groups
        out
    }

    #[test]
    fn grows_by_the_position_precision_delta() {
        let packed_block = packed_positions_and_triangle();
        let packed =
            PackedStreams::parse(&packed_block, 2, 0, packed_block.len() as u32).unwrap();

        let geom_block = xbox_trishape_data();
        let original_size = geom_block.len() as u32;
        let geom =
            XboxGeomData::parse(&geom_block, 1, 0, original_size, false, &packed).unwrap();
        assert!(geom.has_embedded_triangles());

        let expansion = GeomExpansion::plan(geom, &packed, original_size, None).unwrap();
        // 3 vertices, half3 -> float3: 6 bytes each. Triangles were already
        // embedded, so nothing else moves.
        assert_eq!(expansion.new_size, original_size + 18);
        assert_eq!(expansion.triangle_count, 0);

        let mut out = Vec::new();
        expansion.emit(&packed, &mut out);
        assert_eq!(out.len() as u32, expansion.new_size);

        // Positions come back full-precision and little-endian.
        let first = &out[4 + 2 + 2 + 1..][..12];
        assert_eq!(&first[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&first[4..8], &0.0f32.to_le_bytes());

        // The additional-data ref is nulled: it sits right before the
        // triangle tail.
        let ref_at = out.len() - (2 + 4 + 1 + 6 + 2) - 4;
        assert_eq!(&out[ref_at..ref_at + 4], &(-1i32).to_le_bytes());
    }

    #[test]
    fn wrong_packed_hypothesis_is_rejected() {
        let packed_block = packed_positions_and_triangle();
        let mut packed =
            PackedStreams::parse(&packed_block, 2, 0, packed_block.len() as u32).unwrap();
        // Same streams, wrong block index: the additional-data ref check
        // must fail.
        packed.block_index = 7;

        let geom_block = xbox_trishape_data();
        let result =
            XboxGeomData::parse(&geom_block, 1, 0, geom_block.len() as u32, false, &packed);
        assert!(matches!(result, Err(ExpandError::Layout(_))));
    }

    #[test]
    fn appends_packed_triangles_when_missing() {
        let packed_block = packed_positions_and_triangle();
        let packed =
            PackedStreams::parse(&packed_block, 2, 0, packed_block.len() as u32).unwrap();

        // Same geometry block, but with Has Triangles = 0 and no triangle
        // array.
        let mut geom_block = xbox_trishape_data();
        let tail_at = geom_block.len() - (1 + 6 + 2);
        geom_block[tail_at] = 0; // Has Triangles
        geom_block.drain(tail_at + 1..tail_at + 7);
        let original_size = geom_block.len() as u32;

        let geom =
            XboxGeomData::parse(&geom_block, 1, 0, original_size, false, &packed).unwrap();
        let expansion = GeomExpansion::plan(geom, &packed, original_size, None).unwrap();

        assert_eq!(expansion.triangle_count, 1);
        assert_eq!(expansion.new_size, original_size + 18 + 6);

        let mut out = Vec::new();
        expansion.emit(&packed, &mut out);
        assert_eq!(out.len() as u32, expansion.new_size);
        // Appended triangle, little-endian, right before the empty match
        // group count.
        let tri_at = out.len() - 2 - 6;
        assert_eq!(&out[tri_at..tri_at + 6], &[0, 0, 1, 0, 2, 0]);
    }
}
