//! Block-layout schema for Gamebryo containers: type definitions with
//! version- and condition-gated fields, the guard evaluators, and the
//! built-in Bethesda definitions.

pub mod bethesda;

mod condition;
mod model;
mod schema;
mod version;


pub use self::condition::{CmpOp, CondParseError, Expr, FieldExpr};
pub use self::model::{FieldSpec, field};
pub use self::schema::{
    CompoundDef, Field, LengthSpec, ObjectDef, Schema, SchemaBuilder, SchemaError, TypeDef,
};
pub use self::version::{VersionExpr, VersionExprError, VersionTriple};
