//! Single-slot storage for per-world resources.
//!
//! A singleton is a component-shaped record with exactly one instance. It
//! has identical field typing and storage semantics to a component but
//! does not participate in entity lifecycle: it is always present (fields
//! initialise to their declared defaults at world construction) and is
//! mutated in place.
//!
//! Writes emit CHANGED events whose subject is a reserved pseudo-entity
//! id past the world's entity range (`max_entities + 1 + singleton_id`),
//! so ring consumers can route singleton updates without a side channel.
//! A pseudo-entity is never alive in the entity buffer, which keeps
//! singleton events invisible to entity queries.

use std::sync::Arc;

use crate::component::store::{read_field, write_field};
use crate::component::{Column, Data, FieldKind, SingletonDef, SingletonId, Value};
use crate::entity::EntityId;
use crate::event::{Kind, Ring};

/// Backing storage for one registered singleton.
pub struct SingletonStore {
    def: SingletonDef,
    id: SingletonId,
    pseudo: EntityId,
    columns: Vec<Column>,
    ring: Arc<Ring>,
}

impl SingletonStore {
    /// Build the singleton's one-row columns and initialise every field to
    /// its declared default.
    pub(crate) fn new(def: SingletonDef, id: SingletonId, max_entities: u32, ring: Arc<Ring>) -> Self {
        let columns: Vec<Column> = def
            .fields()
            .iter()
            .map(|field| Column::new(field.kind().scalar(), field.kind().arity(), 1))
            .collect();
        for (index, field) in def.fields().iter().enumerate() {
            write_field(&columns[index], field, 0, field.default_value());
        }
        Self {
            def,
            id,
            pseudo: EntityId::from_raw(max_entities + 1 + id.raw() as u32),
            columns,
            ring,
        }
    }

    /// The singleton definition.
    #[inline]
    pub fn def(&self) -> &SingletonDef {
        &self.def
    }

    /// The singleton id.
    #[inline]
    pub fn id(&self) -> SingletonId {
        self.id
    }

    /// The singleton name.
    #[inline]
    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// The reserved pseudo-entity id carried by this singleton's CHANGED
    /// events.
    #[inline]
    pub fn pseudo_entity(&self) -> EntityId {
        self.pseudo
    }

    /// A read-only view of the instance.
    #[inline]
    pub fn read(&self) -> SingletonRead<'_> {
        SingletonRead { store: self }
    }

    /// A mutable view of the instance. Every field assignment through it
    /// emits a CHANGED event carrying the pseudo-entity id.
    #[inline]
    pub fn write(&self) -> SingletonWrite<'_> {
        SingletonWrite { store: self }
    }

    /// Snapshot every field into a [`Data`] bag.
    pub fn snapshot(&self) -> Data {
        let mut data = Data::new();
        for (index, field) in self.def.fields().iter().enumerate() {
            data = data.set(field.name(), read_field(&self.columns[index], field, 0));
        }
        data
    }

    fn field(&self, name: &str) -> usize {
        match self.def.field_index(name) {
            Some(index) => index,
            None => panic!("singleton '{}' has no field '{}'", self.def.name(), name),
        }
    }
}

/// Read-only typed accessors over a singleton instance.
pub struct SingletonRead<'a> {
    store: &'a SingletonStore,
}

impl SingletonRead<'_> {
    /// Read an `f32` field.
    pub fn f32(&self, name: &str) -> f32 {
        let index = self.store.field(name);
        self.store.columns[index].load_num(0) as f32
    }

    /// Read an `f64` field.
    pub fn f64(&self, name: &str) -> f64 {
        let index = self.store.field(name);
        self.store.columns[index].load_num(0)
    }

    /// Read any integer field, sign-extended.
    pub fn int(&self, name: &str) -> i64 {
        let index = self.store.field(name);
        self.store.columns[index].load_int(0)
    }

    /// Read a `u32` field.
    pub fn u32(&self, name: &str) -> u32 {
        self.int(name) as u32
    }

    /// Read a boolean field.
    pub fn boolean(&self, name: &str) -> bool {
        let index = self.store.field(name);
        self.store.columns[index].load_u8(0) != 0
    }

    /// Read an enum tag.
    pub fn enum_tag(&self, name: &str) -> u32 {
        let index = self.store.field(name);
        self.store.columns[index].load_u32(0)
    }

    /// Read one lane of a tuple field.
    pub fn lane(&self, name: &str, lane: usize) -> f64 {
        let index = self.store.field(name);
        let column = &self.store.columns[index];
        column.load_num(column.cell(0, lane))
    }

    /// Read all lanes of a tuple field.
    pub fn tuple(&self, name: &str) -> Vec<f64> {
        let index = self.store.field(name);
        match self.store.def.fields()[index].kind() {
            FieldKind::Tuple { len, .. } => {
                let column = &self.store.columns[index];
                (0..*len).map(|lane| column.load_num(column.cell(0, lane))).collect()
            }
            _ => panic!("field '{}' is not a tuple", name),
        }
    }

    /// Read a byte-buffer field.
    pub fn bytes(&self, name: &str) -> Vec<u8> {
        match self.value(name) {
            Value::Bytes(bytes) => bytes,
            _ => panic!("field '{}' is not a byte buffer", name),
        }
    }

    /// Read a string field.
    pub fn string(&self, name: &str) -> String {
        match self.value(name) {
            Value::Str(text) => text,
            _ => panic!("field '{}' is not a string", name),
        }
    }

    /// Read any field as a canonical [`Value`].
    pub fn value(&self, name: &str) -> Value {
        let index = self.store.field(name);
        read_field(&self.store.columns[index], &self.store.def.fields()[index], 0)
    }
}

/// Mutable typed accessors over a singleton instance.
pub struct SingletonWrite<'a> {
    store: &'a SingletonStore,
}

impl SingletonWrite<'_> {
    /// Assign any field from a [`Value`].
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        let index = self.store.field(name);
        write_field(
            &self.store.columns[index],
            &self.store.def.fields()[index],
            0,
            &value.into(),
        );
        self.changed();
    }

    /// Assign one lane of a tuple field.
    pub fn set_lane(&self, name: &str, lane: usize, value: f64) {
        let index = self.store.field(name);
        let column = &self.store.columns[index];
        column.store_num(column.cell(0, lane), value);
        self.changed();
    }

    /// Read back through the same instance.
    pub fn as_read(&self) -> SingletonRead<'_> {
        SingletonRead { store: self.store }
    }

    #[inline]
    fn changed(&self) {
        self.store
            .ring
            .push(Kind::Changed, self.store.pseudo, self.store.id.raw());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FieldDef;

    fn fixture() -> (SingletonStore, Arc<Ring>) {
        let ring = Arc::new(Ring::new(64));
        let def = SingletonDef::new("Frame")
            .field(FieldDef::u32("tick"))
            .field(FieldDef::f32("delta").default(0.016f32));
        let store = SingletonStore::new(def, SingletonId::from_raw(0), 100, Arc::clone(&ring));
        (store, ring)
    }

    #[test]
    fn fields_initialise_to_defaults() {
        let (store, _) = fixture();

        assert_eq!(store.read().u32("tick"), 0);
        assert_eq!(store.read().f32("delta"), 0.016);
    }

    #[test]
    fn construction_emits_no_events() {
        let (_, ring) = fixture();
        assert_eq!(ring.cursor(), 0);
    }

    #[test]
    fn writes_mutate_in_place_and_emit_changed() {
        let (store, ring) = fixture();

        store.write().set("tick", 41u32);
        store.write().set("tick", 42u32);

        assert_eq!(store.read().u32("tick"), 42);
        let changed: Vec<_> = ring.range(0, ring.cursor()).collect();
        assert_eq!(changed.len(), 2);
        // Subject is the reserved pseudo-entity, past the entity range.
        assert_eq!(changed[0].entity, EntityId::from_raw(101));
        assert_eq!(changed[0].kind, Kind::Changed);
    }

    #[test]
    fn pseudo_entity_ids_are_per_singleton() {
        let ring = Arc::new(Ring::new(8));
        let a = SingletonStore::new(
            SingletonDef::new("A").field(FieldDef::u32("v")),
            SingletonId::from_raw(0),
            100,
            Arc::clone(&ring),
        );
        let b = SingletonStore::new(
            SingletonDef::new("B").field(FieldDef::u32("v")),
            SingletonId::from_raw(1),
            100,
            Arc::clone(&ring),
        );

        assert_eq!(a.pseudo_entity().raw(), 101);
        assert_eq!(b.pseudo_entity().raw(), 102);
    }

    #[test]
    fn snapshot_reflects_current_values() {
        let (store, _) = fixture();
        store.write().set("tick", 7u32);

        let data = store.snapshot();
        assert_eq!(data.get("tick"), Some(&Value::Int(7)));
    }
}
