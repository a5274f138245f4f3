//! Per-component struct-of-arrays storage with typed field access.
//!
//! A [`Store`] owns one [`Column`] per field of its component definition,
//! each sized `max_entities + 1` rows so an entity id indexes its row
//! directly. Reading field `F` of entity `E` is `columns[F][E]` - no
//! indirection, no presence check.
//!
//! # Views
//!
//! - [`ReadView`] - read-only typed accessors over one entity's row.
//! - [`WriteView`] - typed setters; every field assignment through it
//!   emits one CHANGED event for the component. Multiple writes within a
//!   tick coalesce at the query level via deduplication, not at the ring.
//!
//! # Contract
//!
//! Reading a field of an entity that does not have the component is
//! undefined by contract: the store hands back whatever bytes the row
//! holds (typically a previous occupant's data). Callers gate on
//! `has_component` where that matters; the store does not validate.

use std::sync::Arc;

use crate::component::{
    Column, ComponentDef, ComponentId, Data, FieldDef, FieldKind, ScalarKind, Value,
};
use crate::entity::{EntityBuffer, EntityId};
use crate::event::{Kind, Ring};

/// Truncate `s` to at most `max` bytes without splitting a UTF-8 sequence.
fn clip_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Write `value` into `field`'s cells for `row`, coercing to the declared
/// kind. Shared by component and singleton stores.
pub(crate) fn write_field(column: &Column, field: &FieldDef, row: usize, value: &Value) {
    match field.kind() {
        FieldKind::Scalar(ScalarKind::F32) | FieldKind::Scalar(ScalarKind::F64) => {
            let v = match value {
                Value::Float(f) => *f,
                Value::Int(i) => *i as f64,
                other => panic!("field '{}' expects a number, got {:?}", field.name(), other),
            };
            column.store_num(column.cell(row, 0), v);
        }
        FieldKind::Scalar(_) => {
            let v = match value {
                Value::Int(i) => *i,
                Value::Float(f) => *f as i64,
                other => panic!("field '{}' expects an integer, got {:?}", field.name(), other),
            };
            column.store_int(column.cell(row, 0), v);
        }
        FieldKind::Bool => {
            let v = match value {
                Value::Bool(b) => *b as u8,
                Value::Int(i) => (*i != 0) as u8,
                other => panic!("field '{}' expects a bool, got {:?}", field.name(), other),
            };
            column.store_u8(column.cell(row, 0), v);
        }
        FieldKind::Tuple { len, .. } => {
            let lanes = match value {
                Value::Tuple(lanes) => lanes,
                other => panic!("field '{}' expects a tuple, got {:?}", field.name(), other),
            };
            debug_assert_eq!(
                lanes.len(),
                *len,
                "field '{}' expects {} lanes",
                field.name(),
                len
            );
            for lane in 0..(*len).min(lanes.len()) {
                column.store_num(column.cell(row, lane), lanes[lane]);
            }
        }
        FieldKind::Bytes { len } => {
            let bytes = match value {
                Value::Bytes(bytes) => bytes,
                other => panic!("field '{}' expects bytes, got {:?}", field.name(), other),
            };
            for i in 0..*len {
                let byte = bytes.get(i).copied().unwrap_or(0);
                column.store_u8(column.cell(row, i), byte);
            }
        }
        FieldKind::Enum { values } => {
            let tag = match value {
                Value::Int(i) => *i as u32,
                other => panic!("field '{}' expects an enum tag, got {:?}", field.name(), other),
            };
            debug_assert!(
                values.contains(&tag),
                "field '{}' rejects tag {} (accepted: {:?})",
                field.name(),
                tag,
                values
            );
            column.store_u32(column.cell(row, 0), tag);
        }
        FieldKind::Ref => {
            let raw = match value {
                Value::Ref(id) => id.raw(),
                Value::Int(i) => *i as u32,
                other => panic!("field '{}' expects a reference, got {:?}", field.name(), other),
            };
            column.store_u32(column.cell(row, 0), raw);
        }
        FieldKind::Str { max } => {
            let text = match value {
                Value::Str(text) => text.as_str(),
                other => panic!("field '{}' expects a string, got {:?}", field.name(), other),
            };
            debug_assert!(
                text.len() <= *max,
                "field '{}' overflows its {}-byte bound",
                field.name(),
                max
            );
            let clipped = clip_utf8(text, *max);
            let bytes = clipped.as_bytes();
            column.store_u8(column.cell(row, 0), (bytes.len() & 0xff) as u8);
            column.store_u8(column.cell(row, 1), ((bytes.len() >> 8) & 0xff) as u8);
            for i in 0..*max {
                let byte = bytes.get(i).copied().unwrap_or(0);
                column.store_u8(column.cell(row, i + 2), byte);
            }
        }
    }
}

/// Read `field`'s cells for `row` back into a canonical [`Value`].
pub(crate) fn read_field(column: &Column, field: &FieldDef, row: usize) -> Value {
    match field.kind() {
        FieldKind::Scalar(ScalarKind::F32) | FieldKind::Scalar(ScalarKind::F64) => {
            Value::Float(column.load_num(column.cell(row, 0)))
        }
        FieldKind::Scalar(_) => Value::Int(column.load_int(column.cell(row, 0))),
        FieldKind::Bool => Value::Bool(column.load_u8(column.cell(row, 0)) != 0),
        FieldKind::Tuple { len, .. } => Value::Tuple(
            (0..*len)
                .map(|lane| column.load_num(column.cell(row, lane)))
                .collect(),
        ),
        FieldKind::Bytes { len } => Value::Bytes(
            (0..*len)
                .map(|i| column.load_u8(column.cell(row, i)))
                .collect(),
        ),
        FieldKind::Enum { .. } => Value::Int(column.load_u32(column.cell(row, 0)) as i64),
        FieldKind::Ref => Value::Ref(EntityId::from_raw(column.load_u32(column.cell(row, 0)))),
        FieldKind::Str { max } => {
            let len = column.load_u8(column.cell(row, 0)) as usize
                | ((column.load_u8(column.cell(row, 1)) as usize) << 8);
            let len = len.min(*max);
            let bytes: Vec<u8> = (0..len)
                .map(|i| column.load_u8(column.cell(row, i + 2)))
                .collect();
            Value::Str(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

/// Struct-of-arrays backing storage for one registered component.
pub struct Store {
    def: ComponentDef,
    id: ComponentId,
    columns: Vec<Column>,
    buffer: Arc<EntityBuffer>,
    ring: Arc<Ring>,
}

impl Store {
    /// Build the store's columns, sized for `max_entities`.
    pub(crate) fn new(
        def: ComponentDef,
        id: ComponentId,
        max_entities: u32,
        buffer: Arc<EntityBuffer>,
        ring: Arc<Ring>,
    ) -> Self {
        let rows = max_entities as usize + 1;
        let columns = def
            .fields()
            .iter()
            .map(|field| Column::new(field.kind().scalar(), field.kind().arity(), rows))
            .collect();
        Self {
            def,
            id,
            columns,
            buffer,
            ring,
        }
    }

    /// The component definition.
    #[inline]
    pub fn def(&self) -> &ComponentDef {
        &self.def
    }

    /// The component id.
    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The component name.
    #[inline]
    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// Whether `entity` currently has this component.
    #[inline]
    pub fn has(&self, entity: EntityId) -> bool {
        self.buffer.has(entity, self.id.raw())
    }

    /// Attach this component to `entity`.
    ///
    /// Sets the component bit, populates every field from `data` (fields
    /// absent from the bag fall back to their declared defaults), and
    /// emits one CHANGED event per field written.
    pub fn add(&self, entity: EntityId, data: Option<&Data>) {
        self.buffer.set(entity, self.id.raw(), true);
        for (index, field) in self.def.fields().iter().enumerate() {
            let value = data
                .and_then(|d| d.get(field.name()))
                .unwrap_or(field.default_value());
            write_field(&self.columns[index], field, entity.index(), value);
            self.ring.push(Kind::Changed, entity, self.id.raw());
        }
        // Field-less markers still announce their presence transition.
        if self.def.fields().is_empty() {
            self.ring.push(Kind::Changed, entity, self.id.raw());
        }
    }

    /// Detach this component from `entity`.
    ///
    /// Clears the bit and emits one CHANGED event if it was set. The
    /// backing storage is not zeroed; it is overwritten on the next add.
    pub fn remove(&self, entity: EntityId) {
        if self.buffer.set(entity, self.id.raw(), false) {
            self.ring.push(Kind::Changed, entity, self.id.raw());
        }
    }

    /// A read-only view over `entity`'s row.
    #[inline]
    pub fn read(&self, entity: EntityId) -> ReadView<'_> {
        ReadView {
            store: self,
            row: entity.index(),
        }
    }

    /// A mutable view over `entity`'s row. Every field assignment through
    /// it emits a CHANGED event for this component.
    #[inline]
    pub fn write(&self, entity: EntityId) -> WriteView<'_> {
        WriteView {
            store: self,
            entity,
            row: entity.index(),
        }
    }

    /// Bulk-overwrite `entity`'s fields from `data`.
    ///
    /// Emits a single CHANGED event for the component regardless of how
    /// many fields the bag carries - queries deduplicate either way, so
    /// consumers observe the same set semantics as per-field writes.
    pub fn copy(&self, entity: EntityId, data: &Data) {
        let row = entity.index();
        for (name, value) in data.iter() {
            if let Some(index) = self.def.field_index(name) {
                write_field(&self.columns[index], &self.def.fields()[index], row, value);
            }
        }
        self.ring.push(Kind::Changed, entity, self.id.raw());
    }

    /// Snapshot every field of `entity` into a [`Data`] bag. Used by the
    /// store-adapter driver.
    pub fn snapshot(&self, entity: EntityId) -> Data {
        let row = entity.index();
        let mut data = Data::new();
        for (index, field) in self.def.fields().iter().enumerate() {
            data = data.set(field.name(), read_field(&self.columns[index], field, row));
        }
        data
    }

    /// Resolve a field name to its column index, panicking with context on
    /// a miss - an unknown field name is a programming error.
    fn field(&self, name: &str) -> usize {
        match self.def.field_index(name) {
            Some(index) => index,
            None => panic!("component '{}' has no field '{}'", self.def.name(), name),
        }
    }
}

/// Read-only typed accessors over one entity's row of a [`Store`].
pub struct ReadView<'a> {
    store: &'a Store,
    row: usize,
}

impl ReadView<'_> {
    /// Read an `f32` field.
    pub fn f32(&self, name: &str) -> f32 {
        let index = self.store.field(name);
        self.store.columns[index].load_num(self.store.columns[index].cell(self.row, 0)) as f32
    }

    /// Read an `f64` field.
    pub fn f64(&self, name: &str) -> f64 {
        let index = self.store.field(name);
        self.store.columns[index].load_num(self.store.columns[index].cell(self.row, 0))
    }

    /// Read any integer field, sign-extended.
    pub fn int(&self, name: &str) -> i64 {
        let index = self.store.field(name);
        self.store.columns[index].load_int(self.store.columns[index].cell(self.row, 0))
    }

    /// Read a `u32` field.
    pub fn u32(&self, name: &str) -> u32 {
        self.int(name) as u32
    }

    /// Read an `i32` field.
    pub fn i32(&self, name: &str) -> i32 {
        self.int(name) as i32
    }

    /// Read a boolean field.
    pub fn boolean(&self, name: &str) -> bool {
        let index = self.store.field(name);
        self.store.columns[index].load_u8(self.store.columns[index].cell(self.row, 0)) != 0
    }

    /// Read an enum tag.
    pub fn enum_tag(&self, name: &str) -> u32 {
        let index = self.store.field(name);
        self.store.columns[index].load_u32(self.store.columns[index].cell(self.row, 0))
    }

    /// Read an entity reference. A stale reference (pointing at a deleted
    /// id) is returned unchanged; consult liveness before following it.
    pub fn entity_ref(&self, name: &str) -> EntityId {
        let index = self.store.field(name);
        EntityId::from_raw(
            self.store.columns[index].load_u32(self.store.columns[index].cell(self.row, 0)),
        )
    }

    /// Read one lane of a tuple field.
    pub fn lane(&self, name: &str, lane: usize) -> f64 {
        let index = self.store.field(name);
        self.store.columns[index].load_num(self.store.columns[index].cell(self.row, lane))
    }

    /// Read all lanes of a tuple field.
    pub fn tuple(&self, name: &str) -> Vec<f64> {
        let index = self.store.field(name);
        match self.store.def.fields()[index].kind() {
            FieldKind::Tuple { len, .. } => (0..*len)
                .map(|lane| {
                    self.store.columns[index].load_num(self.store.columns[index].cell(self.row, lane))
                })
                .collect(),
            _ => panic!("field '{}' is not a tuple", name),
        }
    }

    /// Read a byte-buffer field.
    pub fn bytes(&self, name: &str) -> Vec<u8> {
        let index = self.store.field(name);
        match read_field(
            &self.store.columns[index],
            &self.store.def.fields()[index],
            self.row,
        ) {
            Value::Bytes(bytes) => bytes,
            _ => panic!("field '{}' is not a byte buffer", name),
        }
    }

    /// Read a string field.
    pub fn string(&self, name: &str) -> String {
        let index = self.store.field(name);
        match read_field(
            &self.store.columns[index],
            &self.store.def.fields()[index],
            self.row,
        ) {
            Value::Str(text) => text,
            _ => panic!("field '{}' is not a string", name),
        }
    }

    /// Read any field as a canonical [`Value`].
    pub fn value(&self, name: &str) -> Value {
        let index = self.store.field(name);
        read_field(
            &self.store.columns[index],
            &self.store.def.fields()[index],
            self.row,
        )
    }
}

/// Mutable typed accessors over one entity's row of a [`Store`]. Every
/// assignment emits one CHANGED event for the component.
pub struct WriteView<'a> {
    store: &'a Store,
    entity: EntityId,
    row: usize,
}

impl WriteView<'_> {
    /// Assign any field from a [`Value`].
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        let index = self.store.field(name);
        write_field(
            &self.store.columns[index],
            &self.store.def.fields()[index],
            self.row,
            &value.into(),
        );
        self.changed();
    }

    /// Assign an `f32` field.
    pub fn set_f32(&self, name: &str, value: f32) {
        self.set(name, value);
    }

    /// Assign an `f64` field.
    pub fn set_f64(&self, name: &str, value: f64) {
        self.set(name, value);
    }

    /// Assign one lane of a tuple field.
    pub fn set_lane(&self, name: &str, lane: usize, value: f64) {
        let index = self.store.field(name);
        let column = &self.store.columns[index];
        column.store_num(column.cell(self.row, lane), value);
        self.changed();
    }

    /// Read back through the same row (write views can read).
    pub fn as_read(&self) -> ReadView<'_> {
        ReadView {
            store: self.store,
            row: self.row,
        }
    }

    #[inline]
    fn changed(&self) {
        self.store
            .ring
            .push(Kind::Changed, self.entity, self.store.id.raw());
    }
}
