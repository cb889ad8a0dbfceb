use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;

use crate::condition::{CondParseError, FieldExpr};
use crate::model::FieldSpec;
use crate::version::{VersionExpr, VersionExprError};


/// How many elements an array field has.
#[derive(Debug, Clone)]
pub enum LengthSpec {
    /// A literal element count.
    Fixed(u64),
    /// The latest-read value of a prior field. When that field is itself an
    /// array, the array is jagged: one row per entry, each entry a row length
    /// (e.g. strip points sized by `Strip Lengths`).
    Field(String),
    /// A value expression over prior fields, e.g. `BS Vector Flags #BITAND# 63`.
    Expr(FieldExpr),
}

/// A compiled field of a block or compound.
#[derive(Debug, Clone)]
pub struct Field {
    pub name:      String,
    pub ty:        String,
    pub length:    Option<LengthSpec>,
    pub width:     Option<LengthSpec>,
    pub version:   Option<VersionExpr>,
    pub condition: Option<FieldExpr>,
    pub arg:       Option<FieldExpr>,
    pub template:  Option<String>,
}

/// A block type. `all_fields` is the flattened field list, topmost ancestor
/// first, and is what the transcoder walks.
#[derive(Debug, Clone)]
pub struct ObjectDef {
    pub name:       String,
    pub inherit:    Option<String>,
    pub fields:     Vec<Field>,
    pub all_fields: Vec<Field>,
}

/// An inline aggregate (nif.xml calls these compounds). Unlike blocks,
/// compounds have no inheritance and no header presence; they only occur as
/// field types.
#[derive(Debug, Clone)]
pub struct CompoundDef {
    pub name:       String,
    pub fields:     Vec<Field>,
    /// Byte size when every field is unconditional and fixed-width.
    pub fixed_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    /// A wire primitive. `size` is `None` for variable-width primitives
    /// (strings).
    Primitive { size: Option<usize> },
    /// Named constants over an integer storage type.
    Enum { storage: String },
    /// Packed flag fields over an integer storage type.
    Bitfield { storage: String },
    Compound(CompoundDef),
    Object(ObjectDef),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("type {0:?} is defined twice")]
    DuplicateType(String),
    #[error("object {object:?} inherits unknown type {parent:?}")]
    UnknownInherit { object: String, parent: String },
    #[error("inheritance cycle through object {0:?}")]
    InheritanceCycle(String),
    #[error("field {field:?} of {owner:?} has unknown type {ty:?}")]
    UnknownFieldType {
        owner: String,
        field: String,
        ty:    String,
    },
    #[error("bad version guard on field {field:?} of {owner:?}: {source}")]
    BadVersionGuard {
        owner:  String,
        field:  String,
        source: VersionExprError,
    },
    #[error("bad length expression on field {field:?} of {owner:?}: {source}")]
    BadLength {
        owner:  String,
        field:  String,
        source: CondParseError,
    },
    #[error("enum or bitfield {0:?} has non-primitive storage {1:?}")]
    BadStorage(String, String),
}

/// The immutable type registry a conversion consults. Built once at startup,
/// shared by any number of conversions.
#[derive(Debug, Clone)]
pub struct Schema {
    types: IndexMap<String, TypeDef>,
}

impl Schema {
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn get_object(&self, name: &str) -> Option<&ObjectDef> {
        match self.types.get(name) {
            Some(TypeDef::Object(def)) => Some(def),
            _ => None,
        }
    }

    pub fn get_compound(&self, name: &str) -> Option<&CompoundDef> {
        match self.types.get(name) {
            Some(TypeDef::Compound(def)) => Some(def),
            _ => None,
        }
    }

    pub fn contains_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Resolve an enum or bitfield to its storage primitive; other types
    /// resolve to themselves.
    pub fn resolve_storage<'a>(&'a self, name: &'a str) -> &'a str {
        let mut name = name;
        // Storage chains are at most enum -> primitive, but walking a few
        // levels costs nothing and tolerates aliased storages.
        for _ in 0..4 {
            match self.types.get(name) {
                Some(TypeDef::Enum { storage } | TypeDef::Bitfield { storage }) => {
                    name = storage;
                }
                _ => break,
            }
        }
        name
    }

    /// Byte width of a fixed-size primitive, enum, bitfield, or compound.
    pub fn get_type_size(&self, name: &str) -> Option<usize> {
        match self.types.get(name)? {
            TypeDef::Primitive { size }    => *size,
            TypeDef::Enum { storage } | TypeDef::Bitfield { storage } => {
                self.get_type_size(storage)
            }
            TypeDef::Compound(def)         => def.fixed_size,
            TypeDef::Object(_)             => None,
        }
    }

    /// Lower bound on the serialized size of a block of the given type:
    /// the sum over unconditional fields, counting guarded fields and
    /// dynamically-sized arrays as zero. Used to sanity-check declared block
    /// sizes before parsing.
    pub fn min_size(&self, name: &str) -> Option<usize> {
        let object = self.get_object(name)?;
        let mut total = 0;

        for field in &object.all_fields {
            if field.version.is_some() || field.condition.is_some() {
                continue;
            }

            let elements = match (&field.length, &field.width) {
                (None, _) => 1,
                (Some(LengthSpec::Fixed(n)), None) => *n as usize,
                (Some(LengthSpec::Fixed(n)), Some(LengthSpec::Fixed(m))) => {
                    (*n as usize) * (*m as usize)
                }
                // Counted by a prior field: may legitimately be empty.
                _ => 0,
            };

            if elements == 0 {
                continue;
            }

            let element = match self.get_type_size(&field.ty) {
                Some(size) => size,
                // Variable-width strings still occupy their length prefix.
                None => match field.ty.as_str() {
                    "SizedString" => 4,
                    "ShortString" => 1,
                    _ => return None,
                },
            };

            total += elements * element;
        }

        Some(total)
    }
}

enum RawEntry {
    Primitive { size: Option<usize> },
    Enum { storage: String },
    Bitfield { storage: String },
    Compound { fields: Vec<FieldSpec> },
    Object { inherit: Option<String>, fields: Vec<FieldSpec> },
}

/// Collects raw definitions and compiles them into a [`Schema`].
pub struct SchemaBuilder {
    entries:    IndexMap<String, RawEntry>,
    duplicates: Vec<String>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            entries:    IndexMap::new(),
            duplicates: Vec::new(),
        }
    }

    fn insert(&mut self, name: &str, entry: RawEntry) {
        if self.entries.insert(name.to_owned(), entry).is_some() {
            self.duplicates.push(name.to_owned());
        }
    }

    pub fn primitive(&mut self, name: &str, size: Option<usize>) {
        self.insert(name, RawEntry::Primitive { size });
    }

    pub fn enum_type(&mut self, name: &str, storage: &str) {
        self.insert(name, RawEntry::Enum { storage: storage.to_owned() });
    }

    pub fn bitfield(&mut self, name: &str, storage: &str) {
        self.insert(name, RawEntry::Bitfield { storage: storage.to_owned() });
    }

    pub fn compound(&mut self, name: &str, fields: Vec<FieldSpec>) {
        self.insert(name, RawEntry::Compound { fields });
    }

    pub fn object(&mut self, name: &str, inherit: Option<&str>, fields: Vec<FieldSpec>) {
        self.insert(name, RawEntry::Object {
            inherit: inherit.map(str::to_owned),
            fields,
        });
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        if let Some(name) = self.duplicates.first() {
            return Err(SchemaError::DuplicateType(name.clone()));
        }

        // First pass: compile fields and install every definition with an
        // empty all_fields, so lookups during flattening can already see the
        // whole registry.
        let mut types = IndexMap::with_capacity(self.entries.len());

        for (name, entry) in &self.entries {
            let def = match entry {
                RawEntry::Primitive { size } => TypeDef::Primitive { size: *size },
                RawEntry::Enum { storage }   => TypeDef::Enum { storage: storage.clone() },
                RawEntry::Bitfield { storage } => {
                    TypeDef::Bitfield { storage: storage.clone() }
                }
                RawEntry::Compound { fields } => TypeDef::Compound(CompoundDef {
                    name:       name.clone(),
                    fields:     compile_fields(name, fields)?,
                    fixed_size: None,
                }),
                RawEntry::Object { inherit, fields } => TypeDef::Object(ObjectDef {
                    name:       name.clone(),
                    inherit:    inherit.clone(),
                    fields:     compile_fields(name, fields)?,
                    all_fields: Vec::new(),
                }),
            };
            types.insert(name.clone(), def);
        }

        validate_field_types(&self.entries, &types)?;
        validate_storages(&types)?;

        // Second pass: flatten inheritance chains, topmost ancestor first.
        let object_names: Vec<String> = types
            .iter()
            .filter(|(_, def)| matches!(def, TypeDef::Object(_)))
            .map(|(name, _)| name.clone())
            .collect();

        for name in &object_names {
            let chain = ancestry_chain(name, &types)?;
            let mut all_fields = Vec::new();
            for ancestor in chain.iter().rev() {
                if let Some(TypeDef::Object(def)) = types.get(ancestor) {
                    all_fields.extend(def.fields.iter().cloned());
                }
            }
            if let Some(TypeDef::Object(def)) = types.get_mut(name) {
                def.all_fields = all_fields;
            }
        }

        // Third pass: compute compound fixed sizes (compounds may nest).
        let compound_names: Vec<String> = types
            .iter()
            .filter(|(_, def)| matches!(def, TypeDef::Compound(_)))
            .map(|(name, _)| name.clone())
            .collect();

        let mut schema = Schema { types };
        for name in &compound_names {
            let size = compound_fixed_size(&schema, name, &mut HashSet::new());
            if let Some(TypeDef::Compound(def)) = schema.types.get_mut(name) {
                def.fixed_size = size;
            }
        }

        Ok(schema)
    }
}

fn compile_fields(owner: &str, specs: &[FieldSpec]) -> Result<Vec<Field>, SchemaError> {
    specs.iter().map(|spec| compile_field(owner, spec)).collect()
}

fn compile_field(owner: &str, spec: &FieldSpec) -> Result<Field, SchemaError> {
    let version = match &spec.version {
        Some(guard) => Some(VersionExpr::parse(guard).map_err(|source| {
            SchemaError::BadVersionGuard {
                owner:  owner.to_owned(),
                field:  spec.name.clone(),
                source,
            }
        })?),
        None => None,
    };

    // An unparseable condition degrades to "always present" rather than
    // rejecting the whole schema; including too much is recoverable,
    // rejecting a file is not.
    let condition = spec.condition.as_deref().map(FieldExpr::compile_lenient);

    let length = spec
        .length
        .as_deref()
        .map(|src| parse_length(owner, &spec.name, src))
        .transpose()?;
    let width = spec
        .width
        .as_deref()
        .map(|src| parse_length(owner, &spec.name, src))
        .transpose()?;

    let arg = match &spec.arg {
        Some(src) => {
            Some(FieldExpr::compile_value(src).map_err(|source| SchemaError::BadLength {
                owner:  owner.to_owned(),
                field:  spec.name.clone(),
                source,
            })?)
        }
        None => None,
    };

    Ok(Field {
        name: spec.name.clone(),
        ty: spec.ty.clone(),
        length,
        width,
        version,
        condition,
        arg,
        template: spec.template.clone(),
    })
}

fn parse_length(owner: &str, field: &str, src: &str) -> Result<LengthSpec, SchemaError> {
    let src = src.trim();
    if let Ok(n) = src.parse::<u64>() {
        return Ok(LengthSpec::Fixed(n));
    }
    if src.contains(['#', '(', ')', '&', '|', '<', '>', '=', '!']) {
        let expr = FieldExpr::compile_value(src).map_err(|source| SchemaError::BadLength {
            owner:  owner.to_owned(),
            field:  field.to_owned(),
            source,
        })?;
        return Ok(LengthSpec::Expr(expr));
    }
    Ok(LengthSpec::Field(src.to_owned()))
}

fn validate_field_types(
    entries: &IndexMap<String, RawEntry>,
    types:   &IndexMap<String, TypeDef>,
) -> Result<(), SchemaError> {
    for (owner, entry) in entries {
        let fields = match entry {
            RawEntry::Compound { fields } | RawEntry::Object { fields, .. } => fields,
            _ => continue,
        };
        for field in fields {
            if !types.contains_key(&field.ty) {
                return Err(SchemaError::UnknownFieldType {
                    owner: owner.clone(),
                    field: field.name.clone(),
                    ty:    field.ty.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_storages(types: &IndexMap<String, TypeDef>) -> Result<(), SchemaError> {
    for (name, def) in types {
        if let TypeDef::Enum { storage } | TypeDef::Bitfield { storage } = def {
            match types.get(storage) {
                Some(TypeDef::Primitive { size: Some(_) }) => {}
                _ => return Err(SchemaError::BadStorage(name.clone(), storage.clone())),
            }
        }
    }
    Ok(())
}

/// Walk `name`'s ancestry up to the root, failing on unknown parents and on
/// cycles. Returns the chain starting at `name` itself.
fn ancestry_chain(
    name:  &str,
    types: &IndexMap<String, TypeDef>,
) -> Result<Vec<String>, SchemaError> {
    let mut chain = vec![name.to_owned()];
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(name.to_owned());

    let mut current = name.to_owned();
    loop {
        let parent = match types.get(&current) {
            Some(TypeDef::Object(def)) => match &def.inherit {
                Some(parent) => parent.clone(),
                None => break,
            },
            _ => {
                return Err(SchemaError::UnknownInherit {
                    object: current.clone(),
                    parent: current.clone(),
                });
            }
        };

        match types.get(&parent) {
            Some(TypeDef::Object(_)) => {}
            _ => {
                return Err(SchemaError::UnknownInherit {
                    object: current.clone(),
                    parent: parent.clone(),
                });
            }
        }

        if !seen.insert(parent.clone()) {
            return Err(SchemaError::InheritanceCycle(parent));
        }
        chain.push(parent.clone());
        current = parent;
    }

    Ok(chain)
}

fn compound_fixed_size(
    schema:   &Schema,
    name:     &str,
    visiting: &mut HashSet<String>,
) -> Option<usize> {
    if !visiting.insert(name.to_owned()) {
        // Self-referential compound; cannot be fixed-size.
        return None;
    }

    let def = schema.get_compound(name)?;
    let mut total = 0;

    for field in &def.fields {
        if field.version.is_some() || field.condition.is_some() {
            visiting.remove(name);
            return None;
        }
        let elements = match (&field.length, &field.width) {
            (None, _) => 1,
            (Some(LengthSpec::Fixed(n)), None) => *n as usize,
            (Some(LengthSpec::Fixed(n)), Some(LengthSpec::Fixed(m))) => {
                (*n as usize) * (*m as usize)
            }
            _ => {
                visiting.remove(name);
                return None;
            }
        };

        let element = match schema.get_type_size(&field.ty) {
            Some(size) => Some(size),
            None => compound_fixed_size(schema, &field.ty, visiting),
        };
        let Some(element) = element else {
            visiting.remove(name);
            return None;
        };

        total += elements * element;
    }

    visiting.remove(name);
    Some(total)
}
