use std::any::type_name;
use std::fmt;

use crate::{Allocator, MemoryPool, Relocate, Relocation, SlotRef, StoredString, SystemAllocator};

/// The value held by the document root or by a [`Slot`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "mirrors the closed set of value kinds a JSON document can hold"
)]
pub enum VariantData {
    /// The JSON `null` value, also the state of a freshly allocated slot.
    #[default]
    Null,

    /// A JSON boolean.
    Bool(bool),

    /// A JSON number without fraction or exponent.
    Integer(i64),

    /// A JSON number with fraction or exponent.
    Float(f64),

    /// A JSON string.
    String(StoredString),

    /// Pre-serialized JSON, emitted verbatim by the serializer.
    Raw(StoredString),

    /// A JSON array.
    Array(Collection),

    /// A JSON object.
    Object(Collection),
}

impl VariantData {
    /// A human-readable name of the kind of value, for error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Raw(_) => "raw",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Whether this is the null value.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Relocate for VariantData {
    fn relocate<A: Allocator + ?Sized>(
        &mut self,
        pool: &mut MemoryPool<'_, A>,
        relocation: &Relocation,
    ) {
        match self {
            Self::String(string) | Self::Raw(string) => string.relocate(pool, relocation),
            Self::Array(collection) | Self::Object(collection) => {
                collection.relocate(pool, relocation);
            }
            Self::Null | Self::Bool(_) | Self::Integer(_) | Self::Float(_) => {}
        }
    }
}

/// The element list of an array or the member list of an object.
///
/// Entries are [`Slot`]s in the pool, linked through [`Slot::next()`] in insertion order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Collection {
    head: Option<SlotRef>,
    tail: Option<SlotRef>,
    len: usize,
}

impl Collection {
    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The first entry, if any.
    #[must_use]
    pub const fn first(&self) -> Option<SlotRef> {
        self.head
    }

    /// Iterates over the entries in insertion order.
    #[must_use]
    pub fn iter<'p, 'a, A: Allocator + ?Sized>(
        &self,
        pool: &'p MemoryPool<'a, A>,
    ) -> CollectionIter<'p, 'a, A> {
        CollectionIter {
            pool,
            next: self.head,
        }
    }

    /// Appends an allocated slot to the end of the collection.
    pub(crate) fn push<A: Allocator + ?Sized>(
        &mut self,
        pool: &mut MemoryPool<'_, A>,
        slot: SlotRef,
    ) {
        match self.tail {
            Some(tail) => pool.slot_mut(tail).set_next(Some(slot)),
            None => self.head = Some(slot),
        }

        self.tail = Some(slot);

        // Cannot overflow: every entry occupies a distinct slot in memory.
        self.len = self.len.wrapping_add(1);
    }
}

impl Relocate for Collection {
    fn relocate<A: Allocator + ?Sized>(
        &mut self,
        pool: &mut MemoryPool<'_, A>,
        relocation: &Relocation,
    ) {
        self.head = self.head.map(|slot| relocation.relocate_slot(slot));
        self.tail = self.tail.map(|slot| relocation.relocate_slot(slot));

        // The links stored inside the slots still hold old handles, so each one is fixed up
        // before it is followed.
        let mut current = self.head;

        while let Some(slot_ref) = current {
            let mut slot = *pool.slot(slot_ref);
            slot.relocate(pool, relocation);
            *pool.slot_mut(slot_ref) = slot;

            current = slot.next();
        }
    }
}

/// Iterator over the entries of a [`Collection`], yielding their slot handles.
pub struct CollectionIter<'p, 'a, A: Allocator + ?Sized = SystemAllocator> {
    pool: &'p MemoryPool<'a, A>,
    next: Option<SlotRef>,
}

impl<A: Allocator + ?Sized> Iterator for CollectionIter<'_, '_, A> {
    type Item = SlotRef;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.pool.slot(current).next();
        Some(current)
    }
}

impl<A: Allocator + ?Sized> fmt::Debug for CollectionIter<'_, '_, A> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

/// A fixed-size record in the slot region of a [`MemoryPool`].
///
/// A slot holds one array element or object member: its value, the link to the next entry of
/// the same collection and, for object members, the key.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Slot {
    data: VariantData,
    next: Option<SlotRef>,
    key: Option<StoredString>,
}

/// The size of one slot in bytes. Every array element and object member costs this much.
pub const SLOT_SIZE: usize = size_of::<Slot>();

impl Slot {
    /// The value held by the slot.
    #[must_use]
    pub const fn data(&self) -> &VariantData {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut VariantData {
        &mut self.data
    }

    /// Replaces the value held by the slot.
    pub fn set_data(&mut self, data: VariantData) {
        self.data = data;
    }

    /// The next entry of the collection this slot belongs to.
    #[must_use]
    pub const fn next(&self) -> Option<SlotRef> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<SlotRef>) {
        self.next = next;
    }

    /// The member key, for slots that belong to an object.
    #[must_use]
    pub const fn key(&self) -> Option<&StoredString> {
        self.key.as_ref()
    }

    pub(crate) fn set_key(&mut self, key: StoredString) {
        self.key = Some(key);
    }
}

impl Relocate for Slot {
    fn relocate<A: Allocator + ?Sized>(
        &mut self,
        pool: &mut MemoryPool<'_, A>,
        relocation: &Relocation,
    ) {
        self.next = self.next.map(|next| relocation.relocate_slot(next));

        if let Some(key) = &mut self.key {
            key.relocate(pool, relocation);
        }

        self.data.relocate(pool, relocation);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{JsonString, store_string};

    fn array_of_integers(pool: &mut MemoryPool<'_>, values: &[i64]) -> Collection {
        let mut collection = Collection::default();

        for value in values {
            let slot = pool.alloc_variant().unwrap();
            pool.slot_mut(slot).set_data(VariantData::Integer(*value));
            collection.push(pool, slot);
        }

        collection
    }

    fn integers(pool: &MemoryPool<'_>, collection: &Collection) -> Vec<i64> {
        collection
            .iter(pool)
            .map(|slot| match pool.slot(slot).data() {
                VariantData::Integer(value) => *value,
                other => panic!("unexpected {}", other.kind()),
            })
            .collect()
    }

    #[test]
    fn push_keeps_insertion_order() {
        let mut pool = MemoryPool::new(1024);

        let collection = array_of_integers(&mut pool, &[1, 2, 3]);

        assert_eq!(collection.len(), 3);
        assert_eq!(integers(&pool, &collection), [1, 2, 3]);
    }

    #[test]
    fn empty_collection_iterates_nothing() {
        let pool = MemoryPool::new(64);
        let collection = Collection::default();

        assert!(collection.is_empty());
        assert_eq!(collection.iter(&pool).count(), 0);
    }

    #[test]
    fn fresh_slot_is_null() {
        let slot = Slot::default();

        assert!(slot.data().is_null());
        assert!(slot.next().is_none());
        assert!(slot.key().is_none());
    }

    #[test]
    fn relocation_follows_the_squash() {
        let mut pool = MemoryPool::new(1024);

        let mut root = VariantData::Array(array_of_integers(&mut pool, &[10, 20, 30]));
        pool.shrink_to_fit(&mut root).unwrap();

        let VariantData::Array(collection) = root else {
            panic!("root is no longer an array");
        };

        assert_eq!(integers(&pool, &collection), [10, 20, 30]);
    }

    #[test]
    fn relocation_fixes_keys_and_nesting() {
        let mut pool = MemoryPool::new(2048);

        let inner = array_of_integers(&mut pool, &[7]);

        let member = pool.alloc_variant().unwrap();
        let key = store_string(&mut pool, JsonString::copied("inner")).unwrap();
        pool.slot_mut(member).set_key(key);
        pool.slot_mut(member).set_data(VariantData::Array(inner));

        let mut object = Collection::default();
        object.push(&mut pool, member);

        let mut root = VariantData::Object(object);
        assert!(pool.shrink_to_fit(&mut root).unwrap() > 0);

        let VariantData::Object(object) = root else {
            panic!("root is no longer an object");
        };

        let member = object.first().unwrap();
        let slot = *pool.slot(member);
        assert_eq!(slot.key().unwrap().bytes(&pool), b"inner");

        let VariantData::Array(inner) = slot.data() else {
            panic!("member is no longer an array");
        };
        assert_eq!(integers(&pool, inner), [7]);
    }

    #[test]
    fn kinds_are_named() {
        assert_eq!(VariantData::Null.kind(), "null");
        assert_eq!(VariantData::Integer(1).kind(), "integer");
        assert_eq!(VariantData::Object(Collection::default()).kind(), "object");
    }
}
