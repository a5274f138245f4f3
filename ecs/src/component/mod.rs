//! Component and singleton schemas.
//!
//! A component is declared as a named schema of typed scalar fields drawn
//! from a closed set ([`FieldKind`]). Definitions are plain data: each
//! field descriptor carries its kind, arity and default value, and a
//! construction function assembles them into a [`ComponentDef`] - no
//! subtype polymorphism is involved at runtime.
//!
//! Definitions are registered at world construction, are immutable
//! thereafter, and receive a process-unique [`ComponentId`] in
//! `[0, component_count)`. Component ids fit in the 8-bit `component`
//! field of ring events, which caps a world at [`MAX_COMPONENTS`]
//! components.
//!
//! # Example
//!
//! ```rust,ignore
//! let pos = ComponentDef::new("Pos")
//!     .field(FieldDef::f32("x"))
//!     .field(FieldDef::f32("y"));
//!
//! let shape = ComponentDef::new("Shape")
//!     .field(FieldDef::string("id", 36))
//!     .field(FieldDef::tuple("size", ScalarKind::F32, 2))
//!     .field(FieldDef::enumeration("fill", vec![0, 1, 2]).default(1u32))
//!     .field(FieldDef::reference("group"))
//!     .sync(SyncMode::Document);
//! ```

mod column;
mod singleton;
mod store;

pub use column::Column;
pub use singleton::{SingletonRead, SingletonStore, SingletonWrite};
pub use store::{ReadView, Store, WriteView};

use crate::entity::EntityId;

/// Maximum number of component definitions per world. Bounded by the 8-bit
/// component field of ring events.
pub const MAX_COMPONENTS: usize = 256;

/// A process-unique component identifier in `[0, component_count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u8);

impl ComponentId {
    /// Construct from a raw id.
    #[inline]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// The raw 8-bit id.
    #[inline]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    /// The id as a storage index.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A process-unique singleton identifier, in a separate id space from
/// components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SingletonId(u8);

impl SingletonId {
    /// Construct from a raw id.
    #[inline]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// The raw 8-bit id.
    #[inline]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    /// The id as a storage index.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// The scalar storage types a field (or tuple lane) may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
    F32,
    F64,
}

impl ScalarKind {
    /// The scalar's size in bytes.
    #[inline]
    pub const fn size(&self) -> usize {
        match self {
            ScalarKind::I8 | ScalarKind::U8 => 1,
            ScalarKind::I16 | ScalarKind::U16 => 2,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::F64 => 8,
        }
    }
}

/// The closed set of field types a component schema may declare.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// A single scalar of the given kind.
    Scalar(ScalarKind),
    /// A boolean, packed to one byte.
    Bool,
    /// A fixed-length array of a numeric subtype (e.g. Vec2 = `(F32, 2)`).
    Tuple {
        /// The lane scalar type.
        of: ScalarKind,
        /// The fixed lane count.
        len: usize,
    },
    /// A fixed-length byte subarray.
    Bytes {
        /// The fixed byte length.
        len: usize,
    },
    /// An integer tag whose accepted values are declared at definition
    /// time.
    Enum {
        /// The accepted tag values.
        values: Vec<u32>,
    },
    /// A 32-bit entity identifier. The referenced entity's lifetime is not
    /// owned; readers of a stale reference must consult liveness.
    Ref,
    /// Bounded-length UTF-8 stored inline (a two-byte length prefix plus
    /// `max` payload bytes).
    Str {
        /// Maximum payload length in bytes.
        max: usize,
    },
}

impl FieldKind {
    /// The scalar type backing this field's storage cells.
    pub fn scalar(&self) -> ScalarKind {
        match self {
            FieldKind::Scalar(kind) => *kind,
            FieldKind::Bool => ScalarKind::U8,
            FieldKind::Tuple { of, .. } => *of,
            FieldKind::Bytes { .. } => ScalarKind::U8,
            FieldKind::Enum { .. } => ScalarKind::U32,
            FieldKind::Ref => ScalarKind::U32,
            FieldKind::Str { .. } => ScalarKind::U8,
        }
    }

    /// The number of storage cells per entity.
    pub fn arity(&self) -> usize {
        match self {
            FieldKind::Scalar(_) | FieldKind::Bool | FieldKind::Enum { .. } | FieldKind::Ref => 1,
            FieldKind::Tuple { len, .. } => *len,
            FieldKind::Bytes { len } => *len,
            // Length prefix (two bytes) plus payload.
            FieldKind::Str { max } => max + 2,
        }
    }

    /// The zero/default value for this kind when no explicit default is
    /// declared.
    pub fn zero(&self) -> Value {
        match self {
            FieldKind::Scalar(ScalarKind::F32) | FieldKind::Scalar(ScalarKind::F64) => {
                Value::Float(0.0)
            }
            FieldKind::Scalar(_) => Value::Int(0),
            FieldKind::Bool => Value::Bool(false),
            FieldKind::Tuple { len, .. } => Value::Tuple(vec![0.0; *len]),
            FieldKind::Bytes { len } => Value::Bytes(vec![0; *len]),
            FieldKind::Enum { values } => {
                Value::Int(values.first().copied().unwrap_or(0) as i64)
            }
            FieldKind::Ref => Value::Ref(EntityId::INVALID),
            FieldKind::Str { .. } => Value::Str(String::new()),
        }
    }
}

/// A dynamically typed field value, used for defaults, initial data and
/// snapshots handed to store adapters.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Any integer field (including enum tags). Stored truncated to the
    /// field's declared width.
    Int(i64),
    /// Any floating-point field.
    Float(f64),
    /// A boolean field.
    Bool(bool),
    /// Tuple lanes, widened to `f64`. Every numeric lane type round-trips
    /// exactly through `f64` at the widths in the closed set.
    Tuple(Vec<f64>),
    /// Byte-buffer contents.
    Bytes(Vec<u8>),
    /// An entity reference.
    Ref(EntityId),
    /// A bounded string.
    Str(String),
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Int(v as i64)
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<EntityId> for Value {
    fn from(v: EntityId) -> Self {
        Value::Ref(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Tuple(v)
    }
}

impl From<&[f64]> for Value {
    fn from(v: &[f64]) -> Self {
        Value::Tuple(v.to_vec())
    }
}

/// One field of a component or singleton schema: a name, a kind, and the
/// default used when the field is added without explicit data.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    name: String,
    kind: FieldKind,
    default: Value,
}

impl FieldDef {
    /// Declare a field with the kind's zero default.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let default = kind.zero();
        Self {
            name: name.into(),
            kind,
            default,
        }
    }

    /// An `f32` field.
    pub fn f32(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Scalar(ScalarKind::F32))
    }

    /// An `f64` field.
    pub fn f64(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Scalar(ScalarKind::F64))
    }

    /// An `i8` field.
    pub fn i8(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Scalar(ScalarKind::I8))
    }

    /// An `i16` field.
    pub fn i16(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Scalar(ScalarKind::I16))
    }

    /// An `i32` field.
    pub fn i32(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Scalar(ScalarKind::I32))
    }

    /// A `u8` field.
    pub fn u8(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Scalar(ScalarKind::U8))
    }

    /// A `u16` field.
    pub fn u16(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Scalar(ScalarKind::U16))
    }

    /// A `u32` field.
    pub fn u32(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Scalar(ScalarKind::U32))
    }

    /// A boolean field, packed to one byte.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    /// A fixed-length tuple of a numeric subtype.
    pub fn tuple(name: impl Into<String>, of: ScalarKind, len: usize) -> Self {
        Self::new(name, FieldKind::Tuple { of, len })
    }

    /// A fixed-length byte buffer.
    pub fn bytes(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, FieldKind::Bytes { len })
    }

    /// An enum tag with the accepted values.
    pub fn enumeration(name: impl Into<String>, values: Vec<u32>) -> Self {
        Self::new(name, FieldKind::Enum { values })
    }

    /// An entity reference.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Ref)
    }

    /// A bounded inline UTF-8 string.
    pub fn string(name: impl Into<String>, max: usize) -> Self {
        Self::new(name, FieldKind::Str { max })
    }

    /// Override the default value. Write-once, at declaration time.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// The field name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field kind.
    #[inline]
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// The declared default value.
    #[inline]
    pub fn default_value(&self) -> &Value {
        &self.default
    }
}

/// How a component participates in external store synchronisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Not synced; adapters never hear about it.
    #[default]
    None,
    /// Synced as durable document state.
    Document,
    /// Synced as ephemeral presence state (cursors, selections).
    Ephemeral,
}

/// An immutable, named component schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDef {
    name: String,
    fields: Vec<FieldDef>,
    sync: SyncMode,
}

impl ComponentDef {
    /// Start a definition with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            sync: SyncMode::None,
        }
    }

    /// Append a field. Field order is storage order.
    pub fn field(mut self, field: FieldDef) -> Self {
        debug_assert!(
            !self.fields.iter().any(|f| f.name == field.name),
            "duplicate field '{}' on component '{}'",
            field.name,
            self.name
        );
        self.fields.push(field);
        self
    }

    /// Declare the sync mode consumed by store adapters.
    pub fn sync(mut self, sync: SyncMode) -> Self {
        self.sync = sync;
        self
    }

    /// The component name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered field descriptors.
    #[inline]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// The sync mode.
    #[inline]
    pub fn sync_mode(&self) -> SyncMode {
        self.sync
    }

    /// Index of the named field.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Index of the conventional stable-id field: a `Str` field named
    /// `id`, used as cross-process identity by store adapters.
    pub fn stable_id_field(&self) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == "id" && matches!(f.kind, FieldKind::Str { .. }))
    }
}

/// An immutable, named singleton schema. Identical field typing to a
/// component, with exactly one implicit instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SingletonDef {
    name: String,
    fields: Vec<FieldDef>,
    sync: SyncMode,
}

impl SingletonDef {
    /// Start a definition with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            sync: SyncMode::None,
        }
    }

    /// Append a field. Field order is storage order.
    pub fn field(mut self, field: FieldDef) -> Self {
        debug_assert!(
            !self.fields.iter().any(|f| f.name == field.name),
            "duplicate field '{}' on singleton '{}'",
            field.name,
            self.name
        );
        self.fields.push(field);
        self
    }

    /// Declare the sync mode consumed by store adapters.
    pub fn sync(mut self, sync: SyncMode) -> Self {
        self.sync = sync;
        self
    }

    /// The singleton name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered field descriptors.
    #[inline]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// The sync mode.
    #[inline]
    pub fn sync_mode(&self) -> SyncMode {
        self.sync
    }

    /// Index of the named field.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Initial or bulk data for a component: a bag of field name / value
/// pairs. Fields absent from the bag fall back to their declared
/// defaults.
#[derive(Debug, Clone, Default)]
pub struct Data {
    entries: Vec<(String, Value)>,
}

impl Data {
    /// An empty bag (every field defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value, replacing any earlier entry for the same name.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        self.entries.retain(|(n, _)| *n != name);
        self.entries.push((name, value.into()));
        self
    }

    /// Look up a field value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Iterate the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Whether the bag has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_arity_follows_kind() {
        assert_eq!(FieldDef::f32("x").kind().arity(), 1);
        assert_eq!(FieldDef::boolean("on").kind().arity(), 1);
        assert_eq!(FieldDef::tuple("size", ScalarKind::F32, 2).kind().arity(), 2);
        assert_eq!(FieldDef::bytes("buf", 16).kind().arity(), 16);
        // Strings carry a two-byte length prefix inline.
        assert_eq!(FieldDef::string("id", 36).kind().arity(), 38);
    }

    #[test]
    fn zero_defaults_match_kind() {
        assert_eq!(FieldDef::f32("x").default_value(), &Value::Float(0.0));
        assert_eq!(FieldDef::u32("n").default_value(), &Value::Int(0));
        assert_eq!(FieldDef::boolean("b").default_value(), &Value::Bool(false));
        assert_eq!(
            FieldDef::reference("target").default_value(),
            &Value::Ref(EntityId::INVALID)
        );
        assert_eq!(
            FieldDef::enumeration("fill", vec![3, 4]).default_value(),
            &Value::Int(3)
        );
    }

    #[test]
    fn explicit_default_overrides_zero() {
        let field = FieldDef::f32("scale").default(1.0f32);
        assert_eq!(field.default_value(), &Value::Float(1.0));
    }

    #[test]
    fn component_def_indexes_fields_by_name() {
        let def = ComponentDef::new("Pos")
            .field(FieldDef::f32("x"))
            .field(FieldDef::f32("y"));

        assert_eq!(def.field_index("x"), Some(0));
        assert_eq!(def.field_index("y"), Some(1));
        assert_eq!(def.field_index("z"), None);
    }

    #[test]
    fn stable_id_field_requires_a_str_named_id() {
        let synced = ComponentDef::new("Shape")
            .field(FieldDef::string("id", 36))
            .field(FieldDef::f32("x"));
        assert_eq!(synced.stable_id_field(), Some(0));

        // A numeric field named `id` does not qualify.
        let unsynced = ComponentDef::new("Other").field(FieldDef::u32("id"));
        assert_eq!(unsynced.stable_id_field(), None);
    }

    #[test]
    fn data_bag_replaces_and_falls_back() {
        let data = Data::new().set("x", 1.0f32).set("x", 2.0f32).set("on", true);

        assert_eq!(data.get("x"), Some(&Value::Float(2.0)));
        assert_eq!(data.get("on"), Some(&Value::Bool(true)));
        assert_eq!(data.get("missing"), None);
    }

    #[test]
    fn scalar_sizes() {
        assert_eq!(ScalarKind::U8.size(), 1);
        assert_eq!(ScalarKind::I16.size(), 2);
        assert_eq!(ScalarKind::F32.size(), 4);
        assert_eq!(ScalarKind::F64.size(), 8);
    }
}
