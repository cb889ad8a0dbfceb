//! hkPackedNiTriStripsData vertex decompression. When the block's
//! `compressed` flag is set, vertices are stored as half-precision triplets;
//! the PC form wants full floats, which grows the block by 6 bytes per
//! vertex and shifts the trailing sub-shape array.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt as _};

use wastegate_bytes::{decode_f16, push_f32_le, push_u16_le, push_u32_le};

use super::ExpandError;


#[derive(Debug, Clone)]
pub struct HavokExpansion {
    pub block_index:   usize,
    pub original_size: u32,
    pub new_size:      u32,
    pub num_triangles: u32,
    pub num_vertices:  u32,
    pub num_sub_shapes: u16,
    /// Offset of the vertex array within the block (after the flag byte).
    pub vertex_data_offset: usize,
    triangles:  Vec<([u16; 3], u16)>,
    vertices:   Vec<[f32; 3]>,
    sub_shapes: Vec<[u32; 3]>,
}

impl HavokExpansion {
    /// Parse a big-endian `hkPackedNiTriStripsData` block. Returns `None`
    /// when the block is not compressed; the schema-driven transcoder
    /// handles it at its current size.
    pub fn parse(
        input:       &[u8],
        block_index: usize,
        offset:      usize,
        size:        u32,
    ) -> Result<Option<Self>, ExpandError> {
        let block = offset
            .checked_add(size as usize)
            .and_then(|end| input.get(offset..end))
            .ok_or_else(|| ExpandError::Layout("block range outside the input".to_owned()))?;
        let mut r = Cursor::new(block);

        let num_triangles = r.read_u32::<BigEndian>()?;
        let mut triangles = Vec::with_capacity(num_triangles as usize);
        for _ in 0..num_triangles {
            triangles.push((
                [
                    r.read_u16::<BigEndian>()?,
                    r.read_u16::<BigEndian>()?,
                    r.read_u16::<BigEndian>()?,
                ],
                r.read_u16::<BigEndian>()?, // welding info
            ));
        }

        let num_vertices = r.read_u32::<BigEndian>()?;
        let compressed = r.read_u8()?;
        if compressed == 0 {
            return Ok(None);
        }

        let vertex_data_offset = r.position() as usize;
        let mut vertices = Vec::with_capacity(num_vertices as usize);
        for _ in 0..num_vertices {
            vertices.push([
                decode_f16(r.read_u16::<BigEndian>()?),
                decode_f16(r.read_u16::<BigEndian>()?),
                decode_f16(r.read_u16::<BigEndian>()?),
            ]);
        }

        let num_sub_shapes = r.read_u16::<BigEndian>()?;
        let mut sub_shapes = Vec::with_capacity(usize::from(num_sub_shapes));
        for _ in 0..num_sub_shapes {
            sub_shapes.push([
                r.read_u32::<BigEndian>()?,
                r.read_u32::<BigEndian>()?,
                r.read_u32::<BigEndian>()?,
            ]);
        }

        if r.position() != u64::from(size) {
            return Err(ExpandError::Layout(format!(
                "consumed {} bytes of a {size}-byte collision block",
                r.position(),
            )));
        }

        Ok(Some(Self {
            block_index,
            original_size: size,
            new_size: size + 6 * num_vertices,
            num_triangles,
            num_vertices,
            num_sub_shapes,
            vertex_data_offset,
            triangles,
            vertices,
            sub_shapes,
        }))
    }

    /// Emit the little-endian PC form: same fields, `compressed` cleared,
    /// vertices widened to floats.
    pub fn emit(&self, out: &mut Vec<u8>) {
        push_u32_le(out, self.num_triangles);
        for (triangle, welding) in &self.triangles {
            push_u16_le(out, triangle[0]);
            push_u16_le(out, triangle[1]);
            push_u16_le(out, triangle[2]);
            push_u16_le(out, *welding);
        }

        push_u32_le(out, self.num_vertices);
        out.push(0); // no longer compressed

        for vertex in &self.vertices {
            push_f32_le(out, vertex[0]);
            push_f32_le(out, vertex[1]);
            push_f32_le(out, vertex[2]);
        }

        push_u16_le(out, self.num_sub_shapes);
        for shape in &self.sub_shapes {
            push_u32_le(out, shape[0]);
            push_u32_le(out, shape[1]);
            push_u32_le(out, shape[2]);
        }
    }
}
