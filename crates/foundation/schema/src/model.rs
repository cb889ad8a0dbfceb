//! Raw, uncompiled field descriptions used while assembling a schema.
//! [`crate::SchemaBuilder::build`] compiles these into the checked form.


/// One field of a block or compound definition, as written: guards and
/// lengths are still source strings here.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name:      String,
    pub ty:        String,
    pub length:    Option<String>,
    pub width:     Option<String>,
    pub version:   Option<String>,
    pub condition: Option<String>,
    pub arg:       Option<String>,
    pub template:  Option<String>,
}

/// Start a field description; the builder methods fill in the optional parts.
pub fn field(name: &str, ty: &str) -> FieldSpec {
    FieldSpec {
        name:      name.to_owned(),
        ty:        ty.to_owned(),
        length:    None,
        width:     None,
        version:   None,
        condition: None,
        arg:       None,
        template:  None,
    }
}

impl FieldSpec {
    /// Array length: a literal count, the name of a prior count field, or a
    /// value expression.
    pub fn len(mut self, spec: &str) -> Self {
        self.length = Some(spec.to_owned());
        self
    }

    /// Second array dimension.
    pub fn width(mut self, spec: &str) -> Self {
        self.width = Some(spec.to_owned());
        self
    }

    /// Version guard over `#VER#` / `#USER_VER#` / `#BSVER#`.
    pub fn ver(mut self, guard: &str) -> Self {
        self.version = Some(guard.to_owned());
        self
    }

    /// Presence condition over prior fields of the same block.
    pub fn when(mut self, cond: &str) -> Self {
        self.condition = Some(cond.to_owned());
        self
    }

    /// Value passed to `#ARG#` inside the field's element type.
    pub fn arg(mut self, expr: &str) -> Self {
        self.arg = Some(expr.to_owned());
        self
    }

    /// Element type parameter for Ref/Ptr fields. Documentation only; the
    /// wire width of a reference does not depend on it.
    pub fn template(mut self, ty: &str) -> Self {
        self.template = Some(ty.to_owned());
        self
    }
}
