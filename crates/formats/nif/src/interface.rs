//! Host-facing entry points: probe a candidate buffer, classify its
//! content, and convert a big-endian container to the little-endian PC
//! form.

use std::collections::HashMap;

use wastegate_schema::Schema;

use crate::container::ContainerView;
use crate::errors::ConvertError;
use crate::expand::havok::HavokExpansion;
use crate::expand::packed_geometry::{GeomExpansion, PackedStreams, XboxGeomData};
use crate::expand::skin_partition::{SkinPartitionBlock, SkinPartitionExpansion};
use crate::layout::Plan;
use crate::transcode::read_block_fields;
use crate::writer::{self, Expansions};


/// A successful conversion: the little-endian bytes plus human-readable
/// notes about what was done.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub output: Vec<u8>,
    pub notes:  Vec<String>,
}

/// Rough content classification from the header's block type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Geometry,
    Animation,
    Mixed,
    Unknown,
}

impl ContentClass {
    /// Animation-only content ships as `.kf`; everything else as `.nif`.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Animation => "kf",
            _ => "nif",
        }
    }
}

/// Header summary for a candidate byte range, used to estimate the file
/// size and classify the content without converting.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub header_string:  String,
    pub version:        u32,
    pub user_version:   u32,
    pub bs_version:     u32,
    pub is_big_endian:  bool,
    pub num_blocks:     usize,
    /// Header + declared block sizes + footer.
    pub estimated_size: usize,
    pub content:        ContentClass,
}

/// Whether this converter applies: NIF signatures in big-endian form.
pub fn can_convert(signature_id: &str, probed: &ProbeResult) -> bool {
    signature_id == "nif" && probed.is_big_endian
}

/// Parse the header at `offset` into a summary, or `None` when the bytes do
/// not look like a container.
pub fn probe(input: &[u8], offset: usize) -> Option<ProbeResult> {
    let slice = input.get(offset..)?;
    let view = ContainerView::parse(slice).ok()?;

    Some(ProbeResult {
        header_string:  view.header_string.clone(),
        version:        view.version,
        user_version:   view.user_version,
        bs_version:     view.bs_version,
        is_big_endian:  view.is_big_endian,
        num_blocks:     view.blocks.len(),
        estimated_size: view.total_size(),
        content:        classify(&view.block_type_names),
    })
}

const GEOMETRY_NAMES: [&str; 11] = [
    "BSFadeNode",
    "NiNode",
    "NiTriStrips",
    "NiTriStripsData",
    "NiTriShape",
    "NiTriShapeData",
    "NiMaterialProperty",
    "BSPackedAdditionalGeometryData",
    "NiSkinInstance",
    "NiSkinData",
    "NiSkinPartition",
];

const ANIMATION_NAMES: [&str; 6] = [
    "NiControllerSequence",
    "NiTextKeyExtraData",
    "NiStringPalette",
    "NiControllerManager",
    "NiMultiTargetTransformController",
    "NiBlendTransformInterpolator",
];

/// Classify content from the block type directory alone.
pub fn classify(type_names: &[String]) -> ContentClass {
    let geometry = type_names.iter().any(|name| {
        GEOMETRY_NAMES.contains(&name.as_str())
            || name.starts_with("bhk")
            || name.starts_with("BSShader")
    });
    let animation = type_names.iter().any(|name| {
        ANIMATION_NAMES.contains(&name.as_str())
            || name.starts_with("NiTransform")
            || name.starts_with("NiBSpline")
    });

    match (geometry, animation) {
        (true, true)   => ContentClass::Mixed,
        (true, false)  => ContentClass::Geometry,
        (false, true)  => ContentClass::Animation,
        (false, false) => ContentClass::Unknown,
    }
}

/// Convert a big-endian container to the little-endian PC form.
///
/// A valid little-endian input succeeds immediately with `output == input`.
/// Errors are container-frame failures only; per-block problems degrade to
/// logged fallbacks.
pub fn convert(schema: &Schema, input: &[u8]) -> Result<Conversion, ConvertError> {
    let view = ContainerView::parse(input)?;

    if !view.is_big_endian {
        return Ok(Conversion {
            output: input.to_vec(),
            notes:  vec!["already little-endian".to_owned()],
        });
    }

    if !view.is_bethesda() {
        return Err(ConvertError::UnsupportedVersion(view.versions()));
    }

    let mut expansions = Expansions::default();
    let mut notes = Vec::new();

    scan_packed_blocks(input, &view, &mut expansions);
    let parsed_geometry = match_geometry_targets(input, &view, &expansions);
    let strip_triangles =
        scan_skin_partitions(input, &view, schema, &parsed_geometry, &mut expansions);
    plan_geometry_expansions(&view, parsed_geometry, strip_triangles, &mut expansions);
    scan_havok_blocks(input, &view, &mut expansions);

    // Packed blocks are removed only once at least one geometry target
    // absorbed their streams.
    let mut removed: Vec<usize> = expansions
        .packed
        .keys()
        .copied()
        .filter(|&p| expansions.geometry.values().any(|g| g.packed_block == p))
        .collect();
    removed.sort_unstable();

    let mut size_overrides = HashMap::new();
    for (&index, expansion) in &expansions.geometry {
        size_overrides.insert(index, expansion.new_size);
    }
    for (&index, expansion) in &expansions.skin {
        size_overrides.insert(index, expansion.new_size);
    }
    for (&index, expansion) in &expansions.havok {
        size_overrides.insert(index, expansion.new_size);
    }

    let plan = Plan::build(&view, &removed, &size_overrides)?;
    let (output, stats) = writer::emit(input, &view, &plan, schema, &expansions)?;

    if !removed.is_empty() {
        notes.push(format!("removed {} packed geometry block(s)", removed.len()));
    }
    if !expansions.geometry.is_empty() {
        notes.push(format!(
            "unpacked vertex streams into {} geometry block(s)",
            expansions.geometry.len(),
        ));
    }
    if !expansions.skin.is_empty() {
        notes.push(format!(
            "re-populated {} skin partition block(s)",
            expansions.skin.len(),
        ));
    }
    if !expansions.havok.is_empty() {
        notes.push(format!(
            "decompressed {} havok collision block(s)",
            expansions.havok.len(),
        ));
    }
    if !stats.bulk_swapped.is_empty() {
        let mut types = stats.bulk_swapped.clone();
        types.sort();
        types.dedup();
        notes.push(format!("bulk-swapped unknown block types: {}", types.join(", ")));
    }

    Ok(Conversion { output, notes })
}

fn scan_havok_blocks(input: &[u8], view: &ContainerView, expansions: &mut Expansions) {
    for (index, block) in view.blocks.iter().enumerate() {
        if view.type_name(index) != "hkPackedNiTriStripsData" {
            continue;
        }
        match HavokExpansion::parse(input, index, block.data_offset, block.size) {
            Ok(Some(expansion)) => {
                expansions.havok.insert(index, expansion);
            }
            Ok(None) => {} // not compressed; same-size conversion applies
            Err(err) => {
                log::warn!(
                    "collision block {index} did not parse ({err}); \
                     converting it at its current size"
                );
            }
        }
    }
}

fn scan_packed_blocks(input: &[u8], view: &ContainerView, expansions: &mut Expansions) {
    for (index, block) in view.blocks.iter().enumerate() {
        if view.type_name(index) != "BSPackedAdditionalGeometryData" {
            continue;
        }
        match PackedStreams::parse(input, index, block.data_offset, block.size) {
            Ok(streams) => {
                expansions.packed.insert(index, streams);
            }
            Err(err) => {
                log::warn!("packed block {index} is unusable ({err}); leaving it in place");
            }
        }
    }
}

/// Find the geometry data blocks referencing each packed block by parsing
/// them under that hypothesis; the embedded additional-data ref settles it.
fn match_geometry_targets(
    input:      &[u8],
    view:       &ContainerView,
    expansions: &Expansions,
) -> HashMap<usize, XboxGeomData> {
    let mut parsed = HashMap::new();

    let mut packed_indices: Vec<usize> = expansions.packed.keys().copied().collect();
    packed_indices.sort_unstable();

    for packed_index in packed_indices {
        let packed = &expansions.packed[&packed_index];
        for (index, block) in view.blocks.iter().enumerate() {
            let strips = match view.type_name(index) {
                "NiTriShapeData"  => false,
                "NiTriStripsData" => true,
                _ => continue,
            };
            if parsed.contains_key(&index) {
                continue;
            }
            if let Ok(geom) = XboxGeomData::parse(
                input,
                index,
                block.data_offset,
                block.size,
                strips,
                packed,
            ) {
                parsed.insert(index, geom);
            }
        }
    }

    parsed
}

/// Walk NiTriShape-style blocks to their skin instances and partitions, and
/// plan the bone-data merge for partitions shipped without it. Returns
/// strip-reconstructed triangles per geometry block, for geometry blocks
/// that embed no triangle array.
fn scan_skin_partitions(
    input:           &[u8],
    view:            &ContainerView,
    schema:          &Schema,
    parsed_geometry: &HashMap<usize, XboxGeomData>,
    expansions:      &mut Expansions,
) -> HashMap<usize, Vec<[u16; 3]>> {
    let mut strip_triangles = HashMap::new();
    let versions = view.versions();

    for (index, block) in view.blocks.iter().enumerate() {
        let type_name = view.type_name(index);
        if type_name != "NiTriShape" && type_name != "NiTriStrips" {
            continue;
        }

        let fields = match read_block_fields(
            input,
            block.data_offset,
            block.size as usize,
            type_name,
            schema,
            versions,
        ) {
            Ok(fields) => fields,
            Err(err) => {
                log::warn!("cannot read geometry block {index} ({err}); skipping skin scan");
                continue;
            }
        };

        let Some(data_ref) = fields.block_ref("Data") else { continue };
        let Some(geom) = parsed_geometry.get(&data_ref) else { continue };
        let Some(packed) = expansions.packed.get(&geom.packed_block) else { continue };

        let Some(skin_ref) = fields.block_ref("Skin Instance") else { continue };
        let Some(skin_block) = view.blocks.get(skin_ref).copied() else { continue };

        let skin_fields = match read_block_fields(
            input,
            skin_block.data_offset,
            skin_block.size as usize,
            view.type_name(skin_ref),
            schema,
            versions,
        ) {
            Ok(fields) => fields,
            Err(err) => {
                log::warn!("cannot read skin instance block {skin_ref} ({err})");
                continue;
            }
        };

        let Some(partition_ref) = skin_fields.block_ref("Skin Partition") else { continue };
        let Some(partition_block) = view.blocks.get(partition_ref).copied() else { continue };

        let parsed = match SkinPartitionBlock::parse(
            input,
            partition_ref,
            partition_block.data_offset,
            partition_block.size,
        ) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::warn!(
                    "skin partition block {partition_ref} did not parse ({err}); \
                     converting it at its current size"
                );
                continue;
            }
        };

        // Geometry blocks that only provide strips get their triangles from
        // the partitions.
        let mut triangles = Vec::new();
        for partition in &parsed.partitions {
            triangles.extend(partition.reconstructed_triangles());
        }
        strip_triangles.insert(data_ref, triangles);

        if !parsed.needs_bone_data() || expansions.skin.contains_key(&partition_ref) {
            continue;
        }

        match SkinPartitionExpansion::plan(parsed, packed) {
            Ok(expansion) => {
                expansions.skin.insert(partition_ref, expansion);
            }
            Err(err) => {
                log::warn!(
                    "cannot merge bone data into skin partition {partition_ref} ({err}); \
                     converting it at its current size"
                );
            }
        }
    }

    strip_triangles
}

fn plan_geometry_expansions(
    view:            &ContainerView,
    parsed_geometry: HashMap<usize, XboxGeomData>,
    mut strip_triangles: HashMap<usize, Vec<[u16; 3]>>,
    expansions:      &mut Expansions,
) {
    let mut indices: Vec<usize> = parsed_geometry.keys().copied().collect();
    indices.sort_unstable();

    for index in indices {
        let geom = &parsed_geometry[&index];
        let Some(packed) = expansions.packed.get(&geom.packed_block) else { continue };

        let original_size = view.blocks[index].size;
        match GeomExpansion::plan(
            geom.clone(),
            packed,
            original_size,
            strip_triangles.remove(&index),
        ) {
            Ok(expansion) => {
                expansions.geometry.insert(index, expansion);
            }
            Err(err) => {
                log::warn!(
                    "cannot unpack geometry block {index} ({err}); \
                     converting it at its current size"
                );
            }
        }
    }
}



#[cfg(test)]
mod tests {
    use super::*;
    use wastegate_bytes::{decode_f16, encode_f16};
    use wastegate_schema::bethesda;
    use crate::expand::packed_geometry::{
        FMT_BONE_INDICES, FMT_BONE_WEIGHTS, FMT_POSITIONS, FMT_TRIANGLES,
    };

    // ================================
    //  Fixture building
    // ================================

    fn put_u16(out: &mut Vec<u8>, value: u16, be: bool) {
        out.extend(if be { value.to_be_bytes() } else { value.to_le_bytes() });
    }

    fn put_u32(out: &mut Vec<u8>, value: u32, be: bool) {
        out.extend(if be { value.to_be_bytes() } else { value.to_le_bytes() });
    }

    fn put_i32(out: &mut Vec<u8>, value: i32, be: bool) {
        out.extend(if be { value.to_be_bytes() } else { value.to_le_bytes() });
    }

    fn put_f32(out: &mut Vec<u8>, value: f32, be: bool) {
        put_u32(out, value.to_bits(), be);
    }

    fn put_half(out: &mut Vec<u8>, value: f32, be: bool) {
        put_u16(out, encode_f16(value), be);
    }

    /// Assembles a complete 20.2.0.7 Bethesda container around the given
    /// block bodies.
    struct NifBuilder {
        endian: u8,
        blocks: Vec<(String, Vec<u8>)>,
        roots:  Vec<i32>,
    }

    impl NifBuilder {
        fn big_endian() -> Self {
            Self { endian: 0, blocks: Vec::new(), roots: Vec::new() }
        }

        fn little_endian() -> Self {
            Self { endian: 1, blocks: Vec::new(), roots: Vec::new() }
        }

        fn block(mut self, type_name: &str, body: Vec<u8>) -> Self {
            self.blocks.push((type_name.to_owned(), body));
            self
        }

        fn root(mut self, root: i32) -> Self {
            self.roots.push(root);
            self
        }

        fn build(&self) -> Vec<u8> {
            let be = self.endian == 0;
            let mut out = Vec::new();

            out.extend(b"Gamebryo File Format, Version 20.2.0.7\n");
            out.extend(0x1402_0007u32.to_le_bytes());
            out.push(self.endian);
            out.extend(11u32.to_le_bytes());
            out.extend((self.blocks.len() as u32).to_le_bytes());
            // BSStreamHeader: version + three empty export strings.
            out.extend(34u32.to_le_bytes());
            out.extend([0u8, 0, 0]);

            let mut names: Vec<&str> = Vec::new();
            let mut indices = Vec::new();
            for (name, _) in &self.blocks {
                let index = match names.iter().position(|&n| n == name) {
                    Some(index) => index,
                    None => {
                        names.push(name);
                        names.len() - 1
                    }
                };
                indices.push(index as u16);
            }

            put_u16(&mut out, names.len() as u16, be);
            for name in &names {
                put_u32(&mut out, name.len() as u32, be);
                out.extend(name.as_bytes());
            }
            for &index in &indices {
                put_u16(&mut out, index, be);
            }
            for (_, body) in &self.blocks {
                put_u32(&mut out, body.len() as u32, be);
            }

            put_u32(&mut out, 0, be); // num strings
            put_u32(&mut out, 0, be); // max string length
            put_u32(&mut out, 0, be); // num groups

            for (_, body) in &self.blocks {
                out.extend(body);
            }

            put_u32(&mut out, self.roots.len() as u32, be);
            for &root in &self.roots {
                put_i32(&mut out, root, be);
            }

            out
        }
    }

    /// NiObjectNET + NiAVObject prefix shared by nodes and geometry: 76
    /// bytes at bs version 34.
    fn av_object_prefix(out: &mut Vec<u8>, be: bool) {
        put_i32(out, -1, be); // Name
        put_u32(out, 0, be); // Num Extra Data List
        put_i32(out, -1, be); // Controller
        put_u32(out, 14, be); // Flags
        for _ in 0..3 {
            put_f32(out, 0.0, be); // Translation
        }
        for value in [1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0] {
            put_f32(out, value, be); // Rotation
        }
        put_f32(out, 1.0, be); // Scale
        put_u32(out, 0, be); // Num Properties
        put_i32(out, -1, be); // Collision Object
    }

    /// An 84-byte NiNode with no children.
    fn ni_node_body(be: bool) -> Vec<u8> {
        let mut out = Vec::new();
        av_object_prefix(&mut out, be);
        put_u32(&mut out, 0, be); // Num Children
        put_u32(&mut out, 0, be); // Num Effects
        out
    }

    /// A 93-byte NiTriShape pointing at its data and skin instance blocks.
    fn ni_tri_shape_body(be: bool, data_ref: i32, skin_ref: i32) -> Vec<u8> {
        let mut out = Vec::new();
        av_object_prefix(&mut out, be);
        put_i32(&mut out, data_ref, be);
        put_i32(&mut out, skin_ref, be);
        put_u32(&mut out, 0, be); // Num Materials
        put_i32(&mut out, 0, be); // Active Material
        out.push(0); // Dirty Flag
        out
    }

    /// An Xbox-form NiTriShapeData: half3 positions, everything else plain.
    fn xbox_tri_shape_data_body(
        positions:      &[[f32; 3]],
        additional_ref: i32,
        num_triangles:  u16,
        triangles:      Option<&[[u16; 3]]>,
    ) -> Vec<u8> {
        let be = true;
        let mut out = Vec::new();
        put_i32(&mut out, 0, be); // Group ID
        put_u16(&mut out, positions.len() as u16, be);
        out.push(0); // Keep Flags
        out.push(0); // Compress Flags
        out.push(1); // Has Vertices
        for position in positions {
            for &component in position {
                put_half(&mut out, component, be);
            }
        }
        put_u16(&mut out, 0, be); // BS Vector Flags
        out.push(0); // Has Normals
        for _ in 0..4 {
            put_f32(&mut out, 0.0, be); // Center + Radius
        }
        out.push(0); // Has Vertex Colors
        put_u16(&mut out, 0, be); // Consistency Flags
        put_i32(&mut out, additional_ref, be);
        put_u16(&mut out, num_triangles, be);
        put_u32(&mut out, u32::from(num_triangles) * 3, be); // Num Triangle Points
        match triangles {
            Some(triangles) => {
                out.push(1);
                for triangle in triangles {
                    for &index in triangle {
                        put_u16(&mut out, index, be);
                    }
                }
            }
            None => out.push(0),
        }
        put_u16(&mut out, 0, be); // Num Match Groups
        out
    }

    fn packed_body(
        num_vertices: u16,
        format:       u32,
        positions:    &[[f32; 3]],
        triangles:    &[[u16; 3]],
        bone_indices: &[[u8; 4]],
        bone_weights: &[[f32; 4]],
    ) -> Vec<u8> {
        let be = true;
        let mut out = Vec::new();
        put_u16(&mut out, num_vertices, be);
        put_u32(&mut out, format, be);
        if format & FMT_TRIANGLES != 0 {
            put_u32(&mut out, triangles.len() as u32, be);
        }
        for position in positions {
            for &component in position {
                put_half(&mut out, component, be);
            }
        }
        for quad in bone_indices {
            out.extend(quad);
        }
        for weights in bone_weights {
            for &weight in weights {
                put_half(&mut out, weight, be);
            }
        }
        for triangle in triangles {
            for &index in triangle {
                put_u16(&mut out, index, be);
            }
        }
        out
    }

    /// A 28-byte NiSkinInstance.
    fn skin_instance_body(partition_ref: i32) -> Vec<u8> {
        let be = true;
        let mut out = Vec::new();
        put_i32(&mut out, -1, be); // Data
        put_i32(&mut out, partition_ref, be);
        put_i32(&mut out, -1, be); // Skeleton Root
        put_u32(&mut out, 3, be); // Num Bones
        for _ in 0..3 {
            put_i32(&mut out, -1, be);
        }
        out
    }

    /// One Xbox-form partition: 4 vertices, one 4-point strip, bones
    /// {7, 9, 11}, 4 weights per vertex, no weights or bone indices.
    fn xbox_skin_partition_body() -> Vec<u8> {
        let be = true;
        let mut out = Vec::new();
        put_u32(&mut out, 1, be); // num partitions
        put_u16(&mut out, 4, be); // num vertices
        put_u16(&mut out, 2, be); // num triangles
        put_u16(&mut out, 3, be); // num bones
        put_u16(&mut out, 1, be); // num strips
        put_u16(&mut out, 4, be); // weights per vertex
        for bone in [7u16, 9, 11] {
            put_u16(&mut out, bone, be);
        }
        out.push(1); // has vertex map
        for vertex in [0u16, 1, 2, 3] {
            put_u16(&mut out, vertex, be);
        }
        out.push(0); // has vertex weights
        put_u16(&mut out, 4, be); // strip length
        out.push(1); // has faces
        for point in [0u16, 1, 2, 3] {
            put_u16(&mut out, point, be);
        }
        out.push(0); // has bone indices
        out
    }

    fn le_u32(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
    }

    fn le_i32(buf: &[u8], at: usize) -> i32 {
        i32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
    }

    fn le_f32(buf: &[u8], at: usize) -> f32 {
        f32::from_bits(le_u32(buf, at))
    }

    // ================================
    //  Scenarios
    // ================================

    #[test]
    fn minimal_node_file_converts_to_little_endian() {
        let schema = bethesda::schema();
        let input = NifBuilder::big_endian()
            .block("NiNode", ni_node_body(true))
            .root(0)
            .build();

        let conversion = convert(&schema, &input).unwrap();
        let out = &conversion.output;

        let view = ContainerView::parse(out).unwrap();
        assert!(!view.is_big_endian);
        assert_eq!(view.blocks.len(), 1);
        assert_eq!(view.blocks[0].size, 84);
        assert_eq!(view.roots, [0]);
        assert_eq!(view.block_type_names, ["NiNode"]);

        // Size accounting: the output is exactly header + blocks + footer.
        assert_eq!(out.len(), view.total_size());

        // Spot-check a swapped field: Flags sits 12 bytes into the block.
        let block = view.blocks[0].data_offset;
        assert_eq!(le_u32(out, block + 12), 14);
        // And the rotation's first row: identity starts 16 bytes later.
        assert_eq!(le_f32(out, block + 28), 1.0);

        // The schema covered everything; no lossy fallback was needed.
        assert!(conversion.notes.is_empty(), "{:?}", conversion.notes);
    }

    #[test]
    fn little_endian_input_is_returned_unchanged() {
        let schema = bethesda::schema();
        let input = NifBuilder::little_endian()
            .block("NiNode", ni_node_body(false))
            .root(0)
            .build();

        let conversion = convert(&schema, &input).unwrap();
        assert_eq!(conversion.output, input);
        assert!(conversion.notes.iter().any(|note| note.contains("little-endian")));
    }

    #[test]
    fn conversion_is_idempotent() {
        let schema = bethesda::schema();
        let input = NifBuilder::big_endian()
            .block("NiNode", ni_node_body(true))
            .root(0)
            .build();

        let first = convert(&schema, &input).unwrap().output;
        let second = convert(&schema, &first).unwrap().output;
        assert_eq!(first, second);
    }

    #[test]
    fn packed_geometry_block_is_dissolved() {
        let schema = bethesda::schema();
        let positions = [[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let triangle = [[0u16, 1, 2]];

        let data_body = xbox_tri_shape_data_body(&positions, 2, 1, Some(&triangle));
        let data_size = data_body.len() as u32;

        let input = NifBuilder::big_endian()
            .block("NiTriShape", ni_tri_shape_body(true, 1, -1))
            .block("NiTriShapeData", data_body)
            .block(
                "BSPackedAdditionalGeometryData",
                packed_body(3, FMT_POSITIONS | FMT_TRIANGLES, &positions, &triangle, &[], &[]),
            )
            .root(0)
            .build();

        let conversion = convert(&schema, &input).unwrap();
        let out = &conversion.output;
        let view = ContainerView::parse(out).unwrap();

        // The packed block is gone and the type table no longer names it.
        assert_eq!(view.blocks.len(), 2);
        assert!(!view
            .block_type_names
            .iter()
            .any(|name| name == "BSPackedAdditionalGeometryData"));
        assert_eq!(view.roots, [0]);

        // The data block grew by exactly the position precision delta.
        assert_eq!(view.blocks[1].size, data_size + 18);

        // Its vertices are now full floats holding the packed values.
        let block = view.blocks[1].data_offset;
        assert_eq!(le_f32(out, block + 9), 1.0);
        assert_eq!(le_f32(out, block + 9 + 16), 1.0); // vertex 1 y
        assert_eq!(le_f32(out, block + 9 + 32), 1.0); // vertex 2 z

        // The additional-data ref is nulled and the triangle survived.
        assert_eq!(le_i32(out, block + 67), -1);
        assert_eq!(&out[block + 78..block + 84], &[0, 0, 1, 0, 2, 0]);

        // The NiTriShape still points at its data block.
        let shape = view.blocks[0].data_offset;
        assert_eq!(le_i32(out, shape + 76), 1);

        assert_eq!(out.len(), view.total_size());
        assert!(conversion.notes.iter().any(|note| note.contains("removed 1")));
        assert!(!conversion.notes.iter().any(|note| note.contains("bulk-swapped")));
    }

    fn compressed_havok_body() -> Vec<u8> {
        let be = true;
        let mut out = Vec::new();
        put_u32(&mut out, 2, be);
        for (triangle, welding) in [([0u16, 1, 2], 0xAAAA), ([2u16, 1, 3], 0xBBBB)] {
            for index in triangle {
                put_u16(&mut out, index, be);
            }
            put_u16(&mut out, welding, be);
        }
        put_u32(&mut out, 4, be); // num vertices
        out.push(1); // compressed
        for v in 0..4 {
            for c in 0..3 {
                put_half(&mut out, v as f32 + c as f32 / 4.0, be);
            }
        }
        put_u16(&mut out, 1, be); // num sub shapes
        put_u32(&mut out, 1, be);
        put_u32(&mut out, 12, be);
        put_u32(&mut out, 9, be);
        out
    }

    #[test]
    fn compressed_havok_vertices_are_widened() {
        let schema = bethesda::schema();
        let havok_body = compressed_havok_body();
        let original_size = havok_body.len() as u32;

        let input = NifBuilder::big_endian()
            .block("NiNode", ni_node_body(true))
            .block("hkPackedNiTriStripsData", havok_body)
            .root(0)
            .build();

        let conversion = convert(&schema, &input).unwrap();
        let out = &conversion.output;
        let view = ContainerView::parse(out).unwrap();

        assert_eq!(view.blocks.len(), 2);
        assert_eq!(view.blocks[1].size, original_size + 24);

        let block = view.blocks[1].data_offset;
        // num triangles + 2 triangle records, then num vertices.
        let flag_at = block + 4 + 16 + 4;
        assert_eq!(out[flag_at], 0, "compressed flag must be cleared");
        // 4 float3 vertices follow, 48 bytes.
        assert_eq!(le_f32(out, flag_at + 1), 0.0);
        assert_eq!(le_f32(out, flag_at + 1 + 12), 1.0);
        // The sub-shape tail shifted but survived intact.
        let tail = flag_at + 1 + 48;
        assert_eq!(&out[tail..tail + 2], &1u16.to_le_bytes());
        assert_eq!(le_u32(out, tail + 2), 1);
        assert_eq!(le_u32(out, tail + 6), 12);
        assert_eq!(le_u32(out, tail + 10), 9);

        assert_eq!(out.len(), view.total_size());
    }

    #[test]
    fn skin_partition_gets_its_bone_data_back() {
        let schema = bethesda::schema();
        let positions = [
            [0.0f32, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ];
        let bone_indices = [[7u8, 7, 9, 11], [9, 7, 9, 11], [11, 7, 9, 11], [7, 7, 9, 11]];
        let bone_weights = [
            [0.5f32, 0.25, 0.125, 0.125],
            [0.5, 0.25, 0.125, 0.125],
            [1.0, 0.0, 0.0, 0.0],
            [0.75, 0.25, 0.0, 0.0],
        ];

        // The geometry block embeds no triangles; they come back from the
        // partition's strip.
        let data_body = xbox_tri_shape_data_body(&positions, 2, 2, None);
        let data_size = data_body.len() as u32;
        let partition_body = xbox_skin_partition_body();

        let input = NifBuilder::big_endian()
            .block("NiTriShape", ni_tri_shape_body(true, 1, 3))
            .block("NiTriShapeData", data_body)
            .block(
                "BSPackedAdditionalGeometryData",
                packed_body(
                    4,
                    FMT_POSITIONS | FMT_BONE_INDICES | FMT_BONE_WEIGHTS,
                    &positions,
                    &[],
                    &bone_indices,
                    &bone_weights,
                ),
            )
            .block("NiSkinInstance", skin_instance_body(4))
            .block("NiSkinPartition", partition_body)
            .root(0)
            .build();

        let conversion = convert(&schema, &input).unwrap();
        let out = &conversion.output;
        let view = ContainerView::parse(out).unwrap();

        // Block count law: one packed block removed.
        assert_eq!(view.blocks.len(), 4);
        assert_eq!(
            view.block_type_names,
            ["NiTriShape", "NiTriShapeData", "NiSkinInstance", "NiSkinPartition"],
        );

        // Refs remapped across the removal: shape -> data 1, skin 3 -> 2;
        // skin instance -> partition 4 -> 3.
        let shape = view.blocks[0].data_offset;
        assert_eq!(le_i32(out, shape + 76), 1);
        assert_eq!(le_i32(out, shape + 80), 2);
        let skin = view.blocks[2].data_offset;
        assert_eq!(le_i32(out, skin + 4), 3);

        // Geometry grew by 4 positions (6 B each) + 2 reconstructed
        // triangles (6 B each).
        assert_eq!(view.blocks[1].size, data_size + 24 + 12);
        let data = view.blocks[1].data_offset;
        // Vertex 1 x = 1.0 at offset 9 + 12.
        assert_eq!(le_f32(out, data + 9 + 12), 1.0);
        // Reconstructed strip triangles (0,1,2), (2,1,3) with has-flag set.
        let tri_flag = data + 9 + 48 + 2 + 1 + 16 + 1 + 2 + 4 + 2 + 4;
        assert_eq!(out[tri_flag], 1);
        assert_eq!(
            &out[tri_flag + 1..tri_flag + 13],
            &[0, 0, 1, 0, 2, 0, 2, 0, 1, 0, 3, 0],
        );

        // The partition got both flags set and the merged arrays.
        let partition = view.blocks[3].data_offset;
        let expected_size = 4 + 10 + 6 + 1 + 8 + 1 + 64 + 2 + 1 + 8 + 1 + 16;
        assert_eq!(view.blocks[3].size, expected_size);

        let has_weights_at = partition + 4 + 10 + 6 + 1 + 8;
        assert_eq!(out[has_weights_at], 1);

        // Weights are the packed halves widened to f32.
        let weights_at = has_weights_at + 1;
        assert_eq!(le_f32(out, weights_at), decode_f16(encode_f16(0.5)));
        assert_eq!(le_f32(out, weights_at + 4), decode_f16(encode_f16(0.25)));

        // Bone indices are partition-local: vertex 0's globals {7,7,9,11}
        // map to {0,0,1,2} against bones [7,9,11].
        let has_bones_at = weights_at + 64 + 2 + 1 + 8;
        assert_eq!(out[has_bones_at], 1);
        assert_eq!(&out[has_bones_at + 1..has_bones_at + 5], &[0, 0, 1, 2]);
        assert_eq!(&out[has_bones_at + 5..has_bones_at + 9], &[1, 0, 1, 2]);

        assert_eq!(out.len(), view.total_size());
        assert!(!conversion.notes.iter().any(|note| note.contains("bulk-swapped")));
    }

    #[test]
    fn unknown_block_types_fall_back_to_bulk_swap() {
        let schema = bethesda::schema();
        let body = vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA];

        let input = NifBuilder::big_endian()
            .block("NiNode", ni_node_body(true))
            .block("NiMadeUpBlock", body)
            .root(0)
            .build();

        let conversion = convert(&schema, &input).unwrap();
        let out = &conversion.output;
        let view = ContainerView::parse(out).unwrap();

        let block = view.blocks[1].data_offset;
        // Aligned words reversed, trailing remainder untouched.
        assert_eq!(
            &out[block..block + 10],
            &[0x44, 0x33, 0x22, 0x11, 0x88, 0x77, 0x66, 0x55, 0x99, 0xAA],
        );
        assert!(conversion
            .notes
            .iter()
            .any(|note| note.contains("NiMadeUpBlock")));
    }

    #[test]
    fn non_bethesda_input_is_unsupported() {
        let schema = bethesda::schema();
        let mut input = NifBuilder::big_endian()
            .block("NiNode", ni_node_body(true))
            .root(0)
            .build();
        // Clear the user version; the subheader bytes then read as the type
        // table, which no longer parses as a Bethesda container.
        let user_version_at = 39 + 4 + 1;
        input[user_version_at..user_version_at + 4].copy_from_slice(&0u32.to_le_bytes());

        assert!(convert(&schema, &input).is_err());
    }

    // ================================
    //  Probe and classification
    // ================================

    #[test]
    fn probe_summarizes_the_header() {
        let input = NifBuilder::big_endian()
            .block("NiTriShape", ni_tri_shape_body(true, -1, -1))
            .root(0)
            .build();

        let probed = probe(&input, 0).unwrap();
        assert!(probed.is_big_endian);
        assert_eq!(probed.version, 0x1402_0007);
        assert_eq!(probed.user_version, 11);
        assert_eq!(probed.bs_version, 34);
        assert_eq!(probed.num_blocks, 1);
        assert_eq!(probed.estimated_size, input.len());
        assert_eq!(probed.content, ContentClass::Geometry);

        assert!(can_convert("nif", &probed));
        assert!(!can_convert("dds", &probed));
    }

    #[test]
    fn probe_honors_the_offset_and_trailing_garbage() {
        let file = NifBuilder::big_endian()
            .block("NiNode", ni_node_body(true))
            .root(0)
            .build();

        let mut carve = vec![0xEE; 7];
        carve.extend(&file);
        carve.extend([0xEE; 13]); // carved memory keeps running

        let probed = probe(&carve, 7).unwrap();
        assert_eq!(probed.estimated_size, file.len());

        assert!(probe(&carve, 0).is_none());
    }

    #[test]
    fn probe_of_a_little_endian_file_reports_it() {
        let input = NifBuilder::little_endian()
            .block("NiNode", ni_node_body(false))
            .root(0)
            .build();

        let probed = probe(&input, 0).unwrap();
        assert!(!probed.is_big_endian);
        assert!(!can_convert("nif", &probed));
    }

    #[test]
    fn classification_name_sets() {
        let names = |list: &[&str]| list.iter().map(|&s| s.to_owned()).collect::<Vec<_>>();

        assert_eq!(classify(&names(&["NiNode", "NiTriShape"])), ContentClass::Geometry);
        assert_eq!(classify(&names(&["bhkRigidBody"])), ContentClass::Geometry);
        assert_eq!(classify(&names(&["BSShaderPPLightingProperty"])), ContentClass::Geometry);
        assert_eq!(
            classify(&names(&["NiControllerSequence", "NiTextKeyExtraData"])),
            ContentClass::Animation,
        );
        assert_eq!(
            classify(&names(&["NiBSplineCompTransformInterpolator"])),
            ContentClass::Animation,
        );
        assert_eq!(
            classify(&names(&["NiNode", "NiControllerSequence"])),
            ContentClass::Mixed,
        );
        assert_eq!(classify(&names(&["NiSourceTexture"])), ContentClass::Unknown);

        assert_eq!(ContentClass::Animation.extension(), "kf");
        assert_eq!(ContentClass::Geometry.extension(), "nif");
        assert_eq!(ContentClass::Mixed.extension(), "nif");
    }
}
