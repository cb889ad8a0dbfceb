//! NiSkinPartition re-population. The Xbox form ships partitions with
//! `has_vertex_weights` and `has_bone_indices` cleared; the weights and bone
//! indices live in the packed geometry block instead. The expander parses
//! every partition, merges the bone data back in, and rewrites the block
//! with both flags set.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt as _};

use wastegate_bytes::{push_f32_le, push_u16_le, push_u32_le};

use super::ExpandError;
use super::packed_geometry::{FMT_BONE_INDICES, FMT_BONE_WEIGHTS, PackedStreams};


/// One partition of a skinned mesh, as parsed from the input.
#[derive(Debug, Clone)]
pub struct Partition {
    pub num_vertices:           u16,
    pub num_triangles:          u16,
    pub num_weights_per_vertex: u16,
    pub bones:                  Vec<u16>,
    /// Partition-local vertex index -> mesh vertex index.
    pub vertex_map:     Option<Vec<u16>>,
    pub vertex_weights: Option<Vec<f32>>,
    pub strip_lengths:  Vec<u16>,
    pub has_faces:      bool,
    pub strips:         Vec<Vec<u16>>,
    pub triangles:      Vec<[u16; 3]>,
    pub bone_indices:   Option<Vec<u8>>,
}

/// A parsed NiSkinPartition block.
#[derive(Debug, Clone)]
pub struct SkinPartitionBlock {
    pub block_index: usize,
    pub partitions:  Vec<Partition>,
}

impl SkinPartitionBlock {
    pub fn parse(
        input:       &[u8],
        block_index: usize,
        offset:      usize,
        size:        u32,
    ) -> Result<Self, ExpandError> {
        let block = offset
            .checked_add(size as usize)
            .and_then(|end| input.get(offset..end))
            .ok_or_else(|| ExpandError::Layout("block range outside the input".to_owned()))?;
        let mut r = Cursor::new(block);

        let num_partitions = r.read_u32::<BigEndian>()? as usize;
        if num_partitions > usize::from(u16::MAX) {
            return Err(ExpandError::Layout(format!(
                "implausible partition count {num_partitions}"
            )));
        }

        let mut partitions = Vec::with_capacity(num_partitions);
        for _ in 0..num_partitions {
            partitions.push(parse_partition(&mut r)?);
        }

        if r.position() != u64::from(size) {
            return Err(ExpandError::Layout(format!(
                "consumed {} bytes of a {size}-byte skin partition block",
                r.position(),
            )));
        }

        Ok(Self { block_index, partitions })
    }

    /// Whether any partition is missing its weights or bone indices.
    pub fn needs_bone_data(&self) -> bool {
        self.partitions
            .iter()
            .any(|p| p.vertex_weights.is_none() || p.bone_indices.is_none())
    }
}

fn parse_partition(r: &mut Cursor<&[u8]>) -> Result<Partition, ExpandError> {
    let num_vertices = r.read_u16::<BigEndian>()?;
    let num_triangles = r.read_u16::<BigEndian>()?;
    let num_bones = r.read_u16::<BigEndian>()?;
    let num_strips = r.read_u16::<BigEndian>()?;
    let num_weights_per_vertex = r.read_u16::<BigEndian>()?;

    let nv = usize::from(num_vertices);
    let nwpv = usize::from(num_weights_per_vertex);

    let mut bones = Vec::with_capacity(usize::from(num_bones));
    for _ in 0..num_bones {
        bones.push(r.read_u16::<BigEndian>()?);
    }

    let has_vertex_map = r.read_u8()? != 0;
    let vertex_map = if has_vertex_map {
        let mut map = Vec::with_capacity(nv);
        for _ in 0..nv {
            map.push(r.read_u16::<BigEndian>()?);
        }
        Some(map)
    } else {
        None
    };

    let has_vertex_weights = r.read_u8()? != 0;
    let vertex_weights = if has_vertex_weights {
        let mut weights = Vec::with_capacity(nv * nwpv);
        for _ in 0..nv * nwpv {
            weights.push(r.read_f32::<BigEndian>()?);
        }
        Some(weights)
    } else {
        None
    };

    let mut strip_lengths = Vec::with_capacity(usize::from(num_strips));
    for _ in 0..num_strips {
        strip_lengths.push(r.read_u16::<BigEndian>()?);
    }

    let has_faces = r.read_u8()? != 0;
    let mut strips = Vec::new();
    let mut triangles = Vec::new();
    if has_faces {
        if num_strips > 0 {
            for &len in &strip_lengths {
                let mut strip = Vec::with_capacity(usize::from(len));
                for _ in 0..len {
                    strip.push(r.read_u16::<BigEndian>()?);
                }
                strips.push(strip);
            }
        } else {
            for _ in 0..num_triangles {
                triangles.push([
                    r.read_u16::<BigEndian>()?,
                    r.read_u16::<BigEndian>()?,
                    r.read_u16::<BigEndian>()?,
                ]);
            }
        }
    }

    let has_bone_indices = r.read_u8()? != 0;
    let bone_indices = if has_bone_indices {
        let mut indices = vec![0u8; nv * nwpv];
        r.read_exact(&mut indices)?;
        Some(indices)
    } else {
        None
    };

    Ok(Partition {
        num_vertices,
        num_triangles,
        num_weights_per_vertex,
        bones,
        vertex_map,
        vertex_weights,
        strip_lengths,
        has_faces,
        strips,
        triangles,
        bone_indices,
    })
}

impl Partition {
    /// The partition's faces as triangles: embedded triangles when present,
    /// otherwise reconstructed from the strips.
    pub fn reconstructed_triangles(&self) -> Vec<[u16; 3]> {
        if !self.triangles.is_empty() {
            return self.triangles.clone();
        }
        let mut out = Vec::new();
        for strip in &self.strips {
            out.extend(triangles_from_strip(strip));
        }
        out
    }

    /// Serialized size of the partition after bone data is merged in
    /// (both has-flags set, weights as f32, indices as bytes).
    fn merged_size(&self) -> usize {
        let nv = usize::from(self.num_vertices);
        let nwpv = usize::from(self.num_weights_per_vertex);

        let faces_bytes = if self.has_faces {
            if self.strip_lengths.is_empty() {
                usize::from(self.num_triangles) * 6
            } else {
                self.strip_lengths.iter().map(|&len| usize::from(len) * 2).sum()
            }
        } else {
            0
        };

        10 + self.bones.len() * 2
            + 1
            + self.vertex_map.as_ref().map_or(0, |_| 2 * nv)
            + 1
            + 4 * nv * nwpv
            + self.strip_lengths.len() * 2
            + 1
            + faces_bytes
            + 1
            + nv * nwpv
    }
}

/// Triangulate one strip: winding alternates starting from the second
/// triangle, and triples with a repeated vertex are dropped.
pub fn triangles_from_strip(strip: &[u16]) -> Vec<[u16; 3]> {
    let mut out = Vec::new();
    for i in 0..strip.len().saturating_sub(2) {
        let triangle = if i % 2 == 0 {
            [strip[i], strip[i + 1], strip[i + 2]]
        } else {
            [strip[i + 1], strip[i], strip[i + 2]]
        };
        if triangle[0] != triangle[1]
            && triangle[1] != triangle[2]
            && triangle[0] != triangle[2]
        {
            out.push(triangle);
        }
    }
    out
}

/// One partition together with the bone data it will be written with.
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    pub partition:    Partition,
    pub weights:      Vec<f32>,
    pub bone_indices: Vec<u8>,
}

/// The rewrite plan for one NiSkinPartition block.
#[derive(Debug, Clone)]
pub struct SkinPartitionExpansion {
    pub block_index:  usize,
    pub packed_block: usize,
    pub new_size:     u32,
    pub partitions:   Vec<PartitionPlan>,
}

impl SkinPartitionExpansion {
    /// Merge the packed block's per-vertex bone data into every partition.
    ///
    /// Partitions with a vertex map look mesh vertices up through it;
    /// partitions without one consume packed vertices at a running offset.
    /// With more than one partition that offset concatenates the maps, which
    /// approximates but does not deduplicate shared vertices.
    pub fn plan(
        parsed: SkinPartitionBlock,
        packed: &PackedStreams,
    ) -> Result<Self, ExpandError> {
        if !packed.has(FMT_BONE_WEIGHTS) || !packed.has(FMT_BONE_INDICES) {
            return Err(ExpandError::Layout(
                "packed block carries no bone data for the skin partition".to_owned(),
            ));
        }

        let mut partitions = Vec::with_capacity(parsed.partitions.len());
        let mut running_offset = 0usize;
        let mut new_size = 4usize;

        for partition in parsed.partitions {
            let nv = usize::from(partition.num_vertices);
            let nwpv = usize::from(partition.num_weights_per_vertex);

            // A partition that already carries its bone data keeps it.
            if let (Some(weights), Some(bone_indices)) =
                (&partition.vertex_weights, &partition.bone_indices)
            {
                let weights = weights.clone();
                let bone_indices = bone_indices.clone();
                running_offset += nv;
                new_size += partition.merged_size();
                partitions.push(PartitionPlan { partition, weights, bone_indices });
                continue;
            }

            let mut weights = Vec::with_capacity(nv * nwpv);
            let mut bone_indices = Vec::with_capacity(nv * nwpv);

            for local in 0..nv {
                let mesh_vertex = match &partition.vertex_map {
                    Some(map) => usize::from(map[local]),
                    None      => running_offset + local,
                };
                if mesh_vertex >= packed.num_vertices {
                    return Err(ExpandError::Layout(format!(
                        "partition references mesh vertex {mesh_vertex}, but the packed \
                         block has {}",
                        packed.num_vertices,
                    )));
                }

                let packed_weights = &packed.bone_weights[mesh_vertex];
                let packed_bones = &packed.bone_indices[mesh_vertex];

                for j in 0..nwpv {
                    let weight = packed_weights.get(j).copied().unwrap_or(0.0);
                    let global = packed_bones.get(j).copied().unwrap_or(0);

                    let local_bone = match partition
                        .bones
                        .iter()
                        .position(|&bone| bone == u16::from(global))
                    {
                        Some(index) => index as u8,
                        None => {
                            log::warn!(
                                "bone {global} of mesh vertex {mesh_vertex} is not in the \
                                 partition's bone list; using 0"
                            );
                            0
                        }
                    };

                    weights.push(weight);
                    bone_indices.push(local_bone);
                }
            }

            running_offset += nv;
            new_size += partition.merged_size();
            partitions.push(PartitionPlan { partition, weights, bone_indices });
        }

        Ok(Self {
            block_index: parsed.block_index,
            packed_block: packed.block_index,
            new_size: new_size as u32,
            partitions,
        })
    }

    /// Emit the little-endian PC form with the bone data inline.
    pub fn emit(&self, out: &mut Vec<u8>) {
        push_u32_le(out, self.partitions.len() as u32);

        for plan in &self.partitions {
            let partition = &plan.partition;

            push_u16_le(out, partition.num_vertices);
            push_u16_le(out, partition.num_triangles);
            push_u16_le(out, partition.bones.len() as u16);
            push_u16_le(out, partition.strip_lengths.len() as u16);
            push_u16_le(out, partition.num_weights_per_vertex);

            for &bone in &partition.bones {
                push_u16_le(out, bone);
            }

            match &partition.vertex_map {
                Some(map) => {
                    out.push(1);
                    for &vertex in map {
                        push_u16_le(out, vertex);
                    }
                }
                None => out.push(0),
            }

            out.push(1); // Has Vertex Weights
            for &weight in &plan.weights {
                push_f32_le(out, weight);
            }

            for &len in &partition.strip_lengths {
                push_u16_le(out, len);
            }

            out.push(u8::from(partition.has_faces));
            if partition.has_faces {
                if partition.strip_lengths.is_empty() {
                    for triangle in &partition.triangles {
                        push_u16_le(out, triangle[0]);
                        push_u16_le(out, triangle[1]);
                        push_u16_le(out, triangle[2]);
                    }
                } else {
                    for strip in &partition.strips {
                        for &point in strip {
                            push_u16_le(out, point);
                        }
                    }
                }
            }

            out.push(1); // Has Bone Indices
            out.extend(&plan.bone_indices);
        }
    }
}
