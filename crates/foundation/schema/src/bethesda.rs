//! Built-in block definitions for the Gamebryo 20.x containers shipped by
//! Fallout 3, New Vegas, and Oblivion. The XML schema loader lives outside
//! this crate; these are the types the converter rewrites structurally, with
//! the same guards nif.xml expresses for them. Block types outside this set
//! are still converted via the bulk-swap fallback.

use crate::model::field;
use crate::schema::{Schema, SchemaBuilder};


/// Build the Bethesda schema. The result is immutable and is meant to be
/// built once at startup and shared.
pub fn schema() -> Schema {
    let mut b = SchemaBuilder::new();

    register_basics(&mut b);
    register_compounds(&mut b);
    register_scene_graph(&mut b);
    register_geometry(&mut b);
    register_skinning(&mut b);
    register_collision(&mut b);
    register_properties(&mut b);

    b.build().expect("built-in Bethesda schema is well-formed")
}

fn register_basics(b: &mut SchemaBuilder) {
    b.primitive("bool", Some(1));
    b.primitive("byte", Some(1));
    b.primitive("char", Some(1));
    b.primitive("short", Some(2));
    b.primitive("ushort", Some(2));
    b.primitive("int", Some(4));
    b.primitive("uint", Some(4));
    b.primitive("int64", Some(8));
    b.primitive("ulong", Some(8));
    b.primitive("float", Some(4));
    // Half-precision float; packed vertex streams use these.
    b.primitive("hfloat", Some(2));

    // 4-byte block indices; -1 is null. Ptr may point up the graph.
    b.primitive("Ref", Some(4));
    b.primitive("Ptr", Some(4));
    // Index into the header string table.
    b.primitive("StringIndex", Some(4));

    // u32 length prefix + ASCII bytes.
    b.primitive("SizedString", None);
    // u8 length prefix + ASCII bytes.
    b.primitive("ShortString", None);
    // ASCII through the first newline.
    b.primitive("HeaderString", None);

    b.enum_type("ConsistencyType", "ushort");
    b.bitfield("BSVectorFlags", "ushort");
}

fn register_compounds(b: &mut SchemaBuilder) {
    b.compound("Vector3", vec![
        field("x", "float"),
        field("y", "float"),
        field("z", "float"),
    ]);
    b.compound("Vector4", vec![
        field("x", "float"),
        field("y", "float"),
        field("z", "float"),
        field("w", "float"),
    ]);
    b.compound("Matrix33", vec![
        field("m11", "float"), field("m21", "float"), field("m31", "float"),
        field("m12", "float"), field("m22", "float"), field("m32", "float"),
        field("m13", "float"), field("m23", "float"), field("m33", "float"),
    ]);
    b.compound("Color3", vec![
        field("r", "float"),
        field("g", "float"),
        field("b", "float"),
    ]);
    b.compound("Color4", vec![
        field("r", "float"),
        field("g", "float"),
        field("b", "float"),
        field("a", "float"),
    ]);
    b.compound("TexCoord", vec![
        field("u", "float"),
        field("v", "float"),
    ]);
    b.compound("Triangle", vec![
        field("v1", "ushort"),
        field("v2", "ushort"),
        field("v3", "ushort"),
    ]);
    b.compound("NiBound", vec![
        field("Center", "Vector3"),
        field("Radius", "float"),
    ]);
    b.compound("SkinTransform", vec![
        field("Rotation", "Matrix33"),
        field("Translation", "Vector3"),
        field("Scale", "float"),
    ]);
    b.compound("MatchGroup", vec![
        field("Num Vertices", "ushort"),
        field("Vertex Indices", "ushort").len("Num Vertices"),
    ]);
    b.compound("BoneVertData", vec![
        field("Index", "ushort"),
        field("Weight", "float"),
    ]);
    // Per-bone skinning data; the weight list is gated by the block-level
    // Has Vertex Weights flag.
    b.compound("BoneData", vec![
        field("Skin Transform", "SkinTransform"),
        field("Bounding Sphere", "NiBound"),
        field("Num Vertices", "ushort"),
        field("Vertex Weights", "BoneVertData").len("Num Vertices").when("Has Vertex Weights"),
    ]);
    b.compound("BodyPartList", vec![
        field("Part Flag", "ushort"),
        field("Body Part", "ushort"),
    ]);
    b.compound("hkTriangle", vec![
        field("Triangle", "Triangle"),
        field("Welding Info", "ushort"),
    ]);
    b.compound("hkSubPartData", vec![
        field("Havok Filter", "uint"),
        field("Num Vertices", "uint"),
        field("Material", "uint"),
    ]);
    // One draw batch of a skinned mesh: bone palette, vertex map back into
    // the mesh, weights/indices, and strip or triangle faces.
    b.compound("SkinPartition", vec![
        field("Num Vertices", "ushort"),
        field("Num Triangles", "ushort"),
        field("Num Bones", "ushort"),
        field("Num Strips", "ushort"),
        field("Num Weights Per Vertex", "ushort"),
        field("Bones", "ushort").len("Num Bones"),
        field("Has Vertex Map", "bool"),
        field("Vertex Map", "ushort").len("Num Vertices").when("Has Vertex Map"),
        field("Has Vertex Weights", "bool"),
        field("Vertex Weights", "float")
            .len("Num Vertices")
            .width("Num Weights Per Vertex")
            .when("Has Vertex Weights"),
        field("Strip Lengths", "ushort").len("Num Strips"),
        field("Has Faces", "bool"),
        field("Strips", "ushort")
            .len("Strip Lengths")
            .when("Has Faces #AND# (Num Strips #NEQ# 0)"),
        field("Triangles", "Triangle")
            .len("Num Triangles")
            .when("Has Faces #AND# (Num Strips #EQ# 0)"),
        field("Has Bone Indices", "bool"),
        field("Bone Indices", "byte")
            .len("Num Vertices")
            .width("Num Weights Per Vertex")
            .when("Has Bone Indices"),
    ]);
}

fn register_scene_graph(b: &mut SchemaBuilder) {
    b.object("NiObject", None, vec![]);

    b.object("NiObjectNET", Some("NiObject"), vec![
        field("Name", "StringIndex"),
        field("Num Extra Data List", "uint"),
        field("Extra Data List", "Ref").len("Num Extra Data List").template("NiExtraData"),
        field("Controller", "Ref").template("NiTimeController"),
    ]);

    b.object("NiAVObject", Some("NiObjectNET"), vec![
        field("Flags", "ushort").ver("#BSVER# <= 26"),
        field("Flags", "uint").ver("#BSVER# > 26"),
        field("Translation", "Vector3"),
        field("Rotation", "Matrix33"),
        field("Scale", "float"),
        field("Num Properties", "uint").ver("#BSVER# <= 34"),
        field("Properties", "Ref").len("Num Properties").ver("#BSVER# <= 34")
            .template("NiProperty"),
        field("Collision Object", "Ref").ver("#VER# >= 10.0.1.0"),
    ]);

    b.object("NiNode", Some("NiAVObject"), vec![
        field("Num Children", "uint"),
        field("Children", "Ref").len("Num Children").template("NiAVObject"),
        field("Num Effects", "uint"),
        field("Effects", "Ref").len("Num Effects").template("NiDynamicEffect"),
    ]);

    b.object("BSFadeNode", Some("NiNode"), vec![]);

    b.object("NiExtraData", Some("NiObject"), vec![
        field("Name", "StringIndex"),
    ]);
    b.object("NiIntegerExtraData", Some("NiExtraData"), vec![
        field("Integer Data", "uint"),
    ]);
    b.object("BSXFlags", Some("NiIntegerExtraData"), vec![]);
    b.object("NiStringExtraData", Some("NiExtraData"), vec![
        field("String Data", "StringIndex"),
    ]);
    b.object("NiFloatExtraData", Some("NiExtraData"), vec![
        field("Float Data", "float"),
    ]);

    b.object("NiTimeController", Some("NiObject"), vec![
        field("Next Controller", "Ref").template("NiTimeController"),
        field("Flags", "ushort"),
        field("Frequency", "float"),
        field("Phase", "float"),
        field("Start Time", "float"),
        field("Stop Time", "float"),
        field("Target", "Ptr").template("NiObjectNET"),
    ]);
}

fn register_geometry(b: &mut SchemaBuilder) {
    b.object("NiGeometry", Some("NiAVObject"), vec![
        field("Data", "Ref").template("NiGeometryData"),
        field("Skin Instance", "Ref").template("NiSkinInstance"),
        field("Num Materials", "uint").ver("#VER# >= 20.2.0.5"),
        field("Material Name", "StringIndex").len("Num Materials"),
        field("Material Extra Data", "int").len("Num Materials"),
        field("Active Material", "int").ver("#VER# >= 20.2.0.5"),
        field("Dirty Flag", "bool").ver("#VER# >= 20.2.0.7"),
        field("Shader Property", "Ref").ver("#BSVER# > 34").template("BSShaderProperty"),
        field("Alpha Property", "Ref").ver("#BSVER# > 34").template("NiAlphaProperty"),
    ]);

    b.object("NiTriBasedGeom", Some("NiGeometry"), vec![]);
    b.object("NiTriShape", Some("NiTriBasedGeom"), vec![]);
    b.object("NiTriStrips", Some("NiTriBasedGeom"), vec![]);

    b.object("NiGeometryData", Some("NiObject"), vec![
        field("Group ID", "int").ver("#VER# >= 10.1.0.114"),
        field("Num Vertices", "ushort"),
        field("Keep Flags", "byte").ver("#VER# >= 10.1.0.0"),
        field("Compress Flags", "byte").ver("#VER# >= 10.1.0.0"),
        field("Has Vertices", "bool"),
        field("Vertices", "Vector3").len("Num Vertices").when("Has Vertices"),
        field("Num UV Sets", "ushort").ver("#BSVER# == 0"),
        field("BS Vector Flags", "BSVectorFlags").ver("#BSVER# > 0"),
        field("Has Normals", "bool"),
        field("Normals", "Vector3").len("Num Vertices").when("Has Normals"),
        field("Tangents", "Vector3")
            .len("Num Vertices")
            .when("Has Normals #AND# (BS Vector Flags #BITAND# 4096)"),
        field("Bitangents", "Vector3")
            .len("Num Vertices")
            .when("Has Normals #AND# (BS Vector Flags #BITAND# 4096)"),
        field("Center", "Vector3"),
        field("Radius", "float"),
        field("Has Vertex Colors", "bool"),
        field("Vertex Colors", "Color4").len("Num Vertices").when("Has Vertex Colors"),
        // Either spelling of the UV-count field may be present; the absent
        // one reads as zero.
        field("UV Sets", "TexCoord")
            .len("(Num UV Sets #BITAND# 63) #BITOR# (BS Vector Flags #BITAND# 1)")
            .width("Num Vertices"),
        field("Consistency Flags", "ConsistencyType").ver("#VER# >= 10.0.1.0"),
        field("Additional Data", "Ref").ver("#VER# >= 20.0.0.4")
            .template("AbstractAdditionalGeometryData"),
    ]);

    b.object("NiTriBasedGeomData", Some("NiGeometryData"), vec![
        field("Num Triangles", "ushort"),
    ]);

    b.object("NiTriShapeData", Some("NiTriBasedGeomData"), vec![
        field("Num Triangle Points", "uint"),
        field("Has Triangles", "bool"),
        field("Triangles", "Triangle").len("Num Triangles").when("Has Triangles"),
        field("Num Match Groups", "ushort"),
        field("Match Groups", "MatchGroup").len("Num Match Groups"),
    ]);

    b.object("NiTriStripsData", Some("NiTriBasedGeomData"), vec![
        field("Num Strips", "ushort"),
        field("Strip Lengths", "ushort").len("Num Strips"),
        field("Has Points", "bool"),
        field("Points", "ushort").len("Strip Lengths").when("Has Points"),
    ]);

    b.object("AbstractAdditionalGeometryData", Some("NiObject"), vec![]);

    // Xbox 360 side block carrying the vertex streams that the PC builds
    // expect inside the geometry data block. The format mask selects which
    // per-vertex streams are present.
    b.object("BSPackedAdditionalGeometryData", Some("AbstractAdditionalGeometryData"), vec![
        field("Num Vertices", "ushort"),
        field("Vertex Format", "uint"),
        field("Num Triangles", "uint").when("Vertex Format #BITAND# 32"),
        field("Positions", "hfloat").len("Num Vertices").width("3")
            .when("Vertex Format #BITAND# 1"),
        field("Normals", "byte").len("Num Vertices").width("4")
            .when("Vertex Format #BITAND# 2"),
        field("UVs", "hfloat").len("Num Vertices").width("2")
            .when("Vertex Format #BITAND# 4"),
        field("Bone Indices", "byte").len("Num Vertices").width("4")
            .when("Vertex Format #BITAND# 8"),
        field("Bone Weights", "hfloat").len("Num Vertices").width("4")
            .when("Vertex Format #BITAND# 16"),
        field("Tangents", "byte").len("Num Vertices").width("4")
            .when("Vertex Format #BITAND# 64"),
        field("Bitangents", "byte").len("Num Vertices").width("4")
            .when("Vertex Format #BITAND# 128"),
        field("Triangles", "Triangle").len("Num Triangles")
            .when("Vertex Format #BITAND# 32"),
    ]);
}

fn register_skinning(b: &mut SchemaBuilder) {
    b.object("NiSkinInstance", Some("NiObject"), vec![
        field("Data", "Ref").template("NiSkinData"),
        field("Skin Partition", "Ref").template("NiSkinPartition"),
        field("Skeleton Root", "Ptr").template("NiNode"),
        field("Num Bones", "uint"),
        field("Bones", "Ptr").len("Num Bones").template("NiNode"),
    ]);

    b.object("BSDismemberSkinInstance", Some("NiSkinInstance"), vec![
        field("Num Partitions", "int"),
        field("Partitions", "BodyPartList").len("Num Partitions"),
    ]);

    b.object("NiSkinData", Some("NiObject"), vec![
        field("Skin Transform", "SkinTransform"),
        field("Num Bones", "uint"),
        field("Has Vertex Weights", "byte").ver("#VER# >= 4.2.1.0"),
        field("Bone List", "BoneData").len("Num Bones"),
    ]);

    b.object("NiSkinPartition", Some("NiObject"), vec![
        field("Num Skin Partition Blocks", "uint"),
        field("Skin Partition Blocks", "SkinPartition").len("Num Skin Partition Blocks"),
    ]);
}

fn register_collision(b: &mut SchemaBuilder) {
    b.object("bhkRefObject", Some("NiObject"), vec![]);
    b.object("bhkSerializable", Some("bhkRefObject"), vec![]);
    b.object("bhkShape", Some("bhkSerializable"), vec![]);
    b.object("bhkShapeCollection", Some("bhkShape"), vec![]);

    // Havok collision mesh; vertices may be stored as half-precision when
    // the Compressed flag is set.
    b.object("hkPackedNiTriStripsData", Some("bhkShapeCollection"), vec![
        field("Num Triangles", "uint"),
        field("Triangles", "hkTriangle").len("Num Triangles"),
        field("Num Vertices", "uint"),
        field("Compressed", "byte"),
        field("Vertices", "Vector3").len("Num Vertices").when("#NOT# Compressed"),
        field("Compressed Vertices", "hfloat").len("Num Vertices").width("3")
            .when("Compressed"),
        field("Num Sub Shapes", "ushort"),
        field("Sub Shapes", "hkSubPartData").len("Num Sub Shapes"),
    ]);
}

fn register_properties(b: &mut SchemaBuilder) {
    b.object("NiProperty", Some("NiObjectNET"), vec![]);

    b.object("NiMaterialProperty", Some("NiProperty"), vec![
        field("Ambient Color", "Color3").ver("#BSVER# <= 21"),
        field("Diffuse Color", "Color3").ver("#BSVER# <= 21"),
        field("Specular Color", "Color3"),
        field("Emissive Color", "Color3"),
        field("Glossiness", "float"),
        field("Alpha", "float"),
        field("Emissive Mult", "float").ver("#BSVER# > 21"),
    ]);

    b.object("NiAlphaProperty", Some("NiProperty"), vec![
        field("Flags", "ushort"),
        field("Threshold", "byte"),
    ]);
}
