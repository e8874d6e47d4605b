use std::any::type_name;
use std::fmt;
use std::str::from_utf8;

use crate::error::Result;
use crate::{
    Allocator, Collection, Error, JsonString, MemoryPool, SLOT_SIZE, SlotRef, StoredString,
    SystemAllocator, VariantData, size_of_string, store_string,
};

/// Identifies a value inside a [`JsonDocument`]: the root or an array element or object member.
///
/// A node is a plain handle, invalidated by [`JsonDocument::clear()`] and rebased internally by
/// [`JsonDocument::shrink_to_fit()`], after which previously obtained nodes of array elements
/// and object members must be looked up again.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "a value lives either at the root or in a slot"
)]
pub enum Node {
    /// The root value of the document.
    Root,

    /// A value stored in a slot of the pool.
    Slot(SlotRef),
}

/// A value to store in a [`JsonDocument`].
///
/// Strings are given as [`JsonString`] so the caller decides whether they are copied into the
/// pool or linked. Arrays and objects start out empty.
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub enum Value<'s> {
    /// The JSON `null` value.
    Null,

    /// A JSON boolean.
    Bool(bool),

    /// A JSON integer.
    Integer(i64),

    /// A JSON number with fraction or exponent.
    Float(f64),

    /// A JSON string. The null string stores a null value.
    String(JsonString<'s>),

    /// Pre-serialized JSON, emitted verbatim. The null string stores a null value.
    Raw(JsonString<'s>),

    /// An empty JSON array.
    Array,

    /// An empty JSON object.
    Object,
}

impl From<bool> for Value<'_> {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value<'_> {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value<'_> {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for Value<'_> {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for Value<'_> {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<'s> From<JsonString<'s>> for Value<'s> {
    fn from(value: JsonString<'s>) -> Self {
        Self::String(value)
    }
}

impl<'s> From<&'s str> for Value<'s> {
    fn from(value: &'s str) -> Self {
        Self::String(JsonString::copied(value))
    }
}

/// A JSON document whose strings and collection entries live in a single [`MemoryPool`].
///
/// Values are addressed through [`Node`] handles starting from [`Node::Root`]. Building the
/// document never panics when the pool runs out of space: the failing operation returns
/// [`Error::PoolExhausted`], the pool is flagged as [overflowed][Self::overflowed] and the
/// document stays valid, just incomplete.
///
/// # Examples
///
/// ```
/// use json_pool::{JsonDocument, JsonString, Node, Value};
///
/// let mut document = JsonDocument::new(1024);
///
/// document.insert(Node::Root, JsonString::linked("name"), "Ada".into())?;
/// let tags = document.insert(Node::Root, JsonString::linked("tags"), Value::Array)?;
/// document.add(tags, 1815.into())?;
/// document.add(tags, true.into())?;
///
/// assert_eq!(document.to_string(), r#"{"name":"Ada","tags":[1815,true]}"#);
///
/// // Release the unused part of the pool once the document is complete.
/// document.shrink_to_fit()?;
/// assert_eq!(document.capacity(), document.memory_usage().next_multiple_of(json_pool::ALIGNMENT));
///
/// let name = document.member(Node::Root, "name").unwrap();
/// assert_eq!(document.as_str(name), Some("Ada"));
/// # Ok::<(), json_pool::Error>(())
/// ```
pub struct JsonDocument<'a, A: Allocator + ?Sized = SystemAllocator> {
    pool: MemoryPool<'a, A>,
    root: VariantData,
}

impl JsonDocument<'static> {
    /// Creates an empty document with a pool of at least `capacity` bytes, drawn from the
    /// [`SystemAllocator`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::from_pool(MemoryPool::new(capacity))
    }
}

impl<'a, A: Allocator + ?Sized> JsonDocument<'a, A> {
    /// Creates an empty document with a pool of at least `capacity` bytes, drawn from the given
    /// allocator.
    #[must_use]
    pub fn with_allocator(capacity: usize, allocator: &'a A) -> Self {
        Self::from_pool(
            MemoryPool::builder()
                .capacity(capacity)
                .allocator(allocator)
                .build(),
        )
    }

    /// Creates an empty document on top of an existing pool, discarding its content.
    #[must_use]
    pub fn from_pool(mut pool: MemoryPool<'a, A>) -> Self {
        pool.clear();

        Self {
            pool,
            root: VariantData::Null,
        }
    }

    /// The pool holding the content of the document.
    #[must_use]
    pub fn pool(&self) -> &MemoryPool<'a, A> {
        &self.pool
    }

    /// Capacity of the pool in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Number of pool bytes in use.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.pool.size()
    }

    /// Whether any part of the document was dropped because the pool ran out of space.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.pool.overflowed()
    }

    /// Empties the document and its pool, keeping the buffer for reuse.
    pub fn clear(&mut self) {
        self.root = VariantData::Null;
        self.pool.clear();
    }

    /// Releases the unused part of the pool, keeping the content intact.
    ///
    /// Returns the number of bytes reclaimed. Nodes of array elements and object members
    /// obtained before the call are invalidated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReallocationFailed`] if the allocator refuses to shrink the buffer, in
    /// which case the document is unchanged.
    pub fn shrink_to_fit(&mut self) -> Result<usize> {
        self.pool.shrink_to_fit(&mut self.root)
    }

    /// The value at `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` does not belong to this document.
    #[must_use]
    pub fn get(&self, node: Node) -> &VariantData {
        match node {
            Node::Root => &self.root,
            Node::Slot(slot) => self.pool.slot(slot).data(),
        }
    }

    fn get_mut(&mut self, node: Node) -> &mut VariantData {
        match node {
            Node::Root => &mut self.root,
            Node::Slot(slot) => self.pool.slot_mut(slot).data_mut(),
        }
    }

    /// Replaces the value at `node`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if a string to be copied does not fit in the pool. The
    /// previous value is then kept.
    pub fn set(&mut self, node: Node, value: Value<'_>) -> Result<()> {
        let data = self.store_value(value)?;
        *self.get_mut(node) = data;
        Ok(())
    }

    /// Appends an element to the array at `node`, turning a null `node` into an array first.
    ///
    /// Returns the node of the new element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `node` holds something other than an array or null,
    /// or [`Error::PoolExhausted`] if the pool has no room for the element.
    /// A string value copied before the element slot ran out stays in the pool, unreferenced,
    /// until the document is cleared.
    pub fn add(&mut self, node: Node, value: Value<'_>) -> Result<Node> {
        let mut collection = match *self.get(node) {
            VariantData::Null => Collection::default(),
            VariantData::Array(collection) => collection,
            other => {
                return Err(Error::TypeMismatch {
                    expected: "array",
                    actual: other.kind(),
                });
            }
        };

        let data = self.store_value(value)?;
        let slot = self.alloc_slot()?;
        self.pool.slot_mut(slot).set_data(data);

        collection.push(&mut self.pool, slot);
        *self.get_mut(node) = VariantData::Array(collection);

        Ok(Node::Slot(slot))
    }

    /// Sets the member `key` of the object at `node`, turning a null `node` into an object
    /// first. An existing member with the same key is overwritten.
    ///
    /// Returns the node of the member.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullKey`] for a null key, [`Error::TypeMismatch`] if `node` holds
    /// something other than an object or null, or [`Error::PoolExhausted`] if the pool has no
    /// room for the member.
    /// Strings copied before the member slot ran out stay in the pool, unreferenced, until the
    /// document is cleared.
    pub fn insert(&mut self, node: Node, key: JsonString<'_>, value: Value<'_>) -> Result<Node> {
        let Some(key_bytes) = key.as_bytes() else {
            return Err(Error::NullKey);
        };

        let mut collection = match *self.get(node) {
            VariantData::Null => Collection::default(),
            VariantData::Object(collection) => collection,
            other => {
                return Err(Error::TypeMismatch {
                    expected: "object",
                    actual: other.kind(),
                });
            }
        };

        let data = self.store_value(value)?;

        if let Some(existing) = self.find_member(&collection, key_bytes) {
            self.pool.slot_mut(existing).set_data(data);
            return Ok(Node::Slot(existing));
        }

        let key = self.store(key)?.ok_or(Error::NullKey)?;
        let slot = self.alloc_slot()?;

        let entry = self.pool.slot_mut(slot);
        entry.set_key(key);
        entry.set_data(data);

        collection.push(&mut self.pool, slot);
        *self.get_mut(node) = VariantData::Object(collection);

        Ok(Node::Slot(slot))
    }

    fn alloc_slot(&mut self) -> Result<SlotRef> {
        self.pool.alloc_variant().ok_or(Error::PoolExhausted {
            requested: SLOT_SIZE,
        })
    }

    fn store(&mut self, string: JsonString<'_>) -> Result<Option<StoredString>> {
        if string.is_null() {
            return Ok(None);
        }

        store_string(&mut self.pool, string)
            .map(Some)
            .ok_or(Error::PoolExhausted {
                requested: size_of_string(string.len()),
            })
    }

    fn store_value(&mut self, value: Value<'_>) -> Result<VariantData> {
        Ok(match value {
            Value::Null => VariantData::Null,
            Value::Bool(value) => VariantData::Bool(value),
            Value::Integer(value) => VariantData::Integer(value),
            Value::Float(value) => VariantData::Float(value),
            Value::String(string) => self
                .store(string)?
                .map_or(VariantData::Null, VariantData::String),
            Value::Raw(string) => self
                .store(string)?
                .map_or(VariantData::Null, VariantData::Raw),
            Value::Array => VariantData::Array(Collection::default()),
            Value::Object => VariantData::Object(Collection::default()),
        })
    }

    fn find_member(&self, object: &Collection, key: &[u8]) -> Option<SlotRef> {
        object.iter(&self.pool).find(|member| {
            self.pool
                .slot(*member)
                .key()
                .is_some_and(|member_key| member_key.bytes(&self.pool) == key)
        })
    }

    /// The element at `index` of the array at `node`.
    #[must_use]
    pub fn element(&self, node: Node, index: usize) -> Option<Node> {
        match self.get(node) {
            VariantData::Array(array) => array.iter(&self.pool).nth(index).map(Node::Slot),
            _ => None,
        }
    }

    /// The member `key` of the object at `node`.
    #[must_use]
    pub fn member(&self, node: Node, key: &str) -> Option<Node> {
        match self.get(node) {
            VariantData::Object(object) => self.find_member(object, key.as_bytes()).map(Node::Slot),
            _ => None,
        }
    }

    /// The key of an object member.
    #[must_use]
    pub fn key(&self, node: Node) -> Option<&str> {
        match node {
            Node::Root => None,
            Node::Slot(slot) => self
                .pool
                .slot(slot)
                .key()
                .and_then(|key| from_utf8(key.bytes(&self.pool)).ok()),
        }
    }

    /// Iterates over the elements of an array or the members of an object.
    ///
    /// Yields nothing for other kinds of values.
    pub fn children(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        let collection = match self.get(node) {
            VariantData::Array(collection) | VariantData::Object(collection) => *collection,
            _ => Collection::default(),
        };

        collection.iter(&self.pool).map(Node::Slot)
    }

    /// Number of elements or members of the collection at `node`, zero for other values.
    #[must_use]
    pub fn len(&self, node: Node) -> usize {
        match self.get(node) {
            VariantData::Array(collection) | VariantData::Object(collection) => collection.len(),
            _ => 0,
        }
    }

    /// Whether the value at `node` is null.
    #[must_use]
    pub fn is_null(&self, node: Node) -> bool {
        self.get(node).is_null()
    }

    /// The value at `node` as a boolean.
    #[must_use]
    pub fn as_bool(&self, node: Node) -> Option<bool> {
        match self.get(node) {
            VariantData::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The value at `node` as an integer.
    #[must_use]
    pub fn as_i64(&self, node: Node) -> Option<i64> {
        match self.get(node) {
            VariantData::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// The value at `node` as a floating-point number, converting integers.
    #[must_use]
    pub fn as_f64(&self, node: Node) -> Option<f64> {
        match self.get(node) {
            VariantData::Float(value) => Some(*value),
            #[expect(
                clippy::cast_precision_loss,
                reason = "JSON numbers are doubles to most consumers anyway"
            )]
            VariantData::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// The value at `node` as text, if it is a string holding valid UTF-8.
    #[must_use]
    pub fn as_str(&self, node: Node) -> Option<&str> {
        match self.get(node) {
            VariantData::String(string) => from_utf8(string.bytes(&self.pool)).ok(),
            _ => None,
        }
    }

    /// The bytes of a string or raw value at `node`.
    #[must_use]
    pub fn as_bytes(&self, node: Node) -> Option<&[u8]> {
        match self.get(node) {
            VariantData::String(string) | VariantData::Raw(string) => {
                Some(string.bytes(&self.pool))
            }
            _ => None,
        }
    }
}

impl<A: Allocator + ?Sized> fmt::Debug for JsonDocument<'_, A> {
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("pool", &self.pool)
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(JsonDocument<'static>: Send, fmt::Debug);
    assert_not_impl_any!(JsonDocument<'static>: Sync, Clone);

    #[test]
    fn null_root_becomes_array_on_add() {
        let mut document = JsonDocument::new(1024);

        let first = document.add(Node::Root, 1.into()).unwrap();
        _ = document.add(Node::Root, 2.into()).unwrap();

        assert_eq!(document.len(Node::Root), 2);
        assert_eq!(document.as_i64(first), Some(1));
        assert_eq!(
            document.element(Node::Root, 1).and_then(|n| document.as_i64(n)),
            Some(2)
        );
        assert!(document.element(Node::Root, 2).is_none());
    }

    #[test]
    fn null_root_becomes_object_on_insert() {
        let mut document = JsonDocument::new(1024);

        _ = document
            .insert(Node::Root, JsonString::linked("a"), Value::Bool(true))
            .unwrap();

        let a = document.member(Node::Root, "a").unwrap();
        assert_eq!(document.as_bool(a), Some(true));
        assert_eq!(document.key(a), Some("a"));
        assert!(document.member(Node::Root, "b").is_none());
    }

    #[test]
    fn insert_overwrites_existing_member() {
        let mut document = JsonDocument::new(1024);

        let first = document
            .insert(Node::Root, JsonString::copied("key"), 1.into())
            .unwrap();
        let usage = document.memory_usage();

        let second = document
            .insert(Node::Root, JsonString::copied("key"), 2.into())
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(document.len(Node::Root), 1);
        assert_eq!(document.as_i64(second), Some(2));
        assert_eq!(document.memory_usage(), usage);
    }

    #[test]
    fn wrong_kind_is_reported() {
        let mut document = JsonDocument::new(1024);
        document.set(Node::Root, 5.into()).unwrap();

        let error = document.add(Node::Root, 1.into()).unwrap_err();
        assert!(matches!(
            error,
            Error::TypeMismatch {
                expected: "array",
                actual: "integer"
            }
        ));

        let error = document
            .insert(Node::Root, JsonString::linked("k"), 1.into())
            .unwrap_err();
        assert!(matches!(error, Error::TypeMismatch { expected: "object", .. }));
    }

    #[test]
    fn null_key_is_rejected() {
        let mut document = JsonDocument::new(1024);

        let error = document
            .insert(Node::Root, JsonString::null(), 1.into())
            .unwrap_err();

        assert!(matches!(error, Error::NullKey));
        assert!(document.is_null(Node::Root));
    }

    #[test]
    fn null_string_stores_null() {
        let mut document = JsonDocument::new(64);

        document
            .set(Node::Root, Value::String(JsonString::null()))
            .unwrap();

        assert!(document.is_null(Node::Root));
        assert_eq!(document.memory_usage(), 0);
    }

    #[test]
    fn exhaustion_is_reported_and_flagged() {
        let mut document = JsonDocument::new(SLOT_SIZE);

        _ = document.add(Node::Root, 1.into()).unwrap();
        let error = document.add(Node::Root, 2.into()).unwrap_err();

        assert!(matches!(error, Error::PoolExhausted { requested } if requested == SLOT_SIZE));
        assert!(document.overflowed());
        assert_eq!(document.len(Node::Root), 1);
    }

    #[test]
    fn failed_add_keeps_the_copied_string() {
        let mut document = JsonDocument::new(crate::ALIGNMENT);

        let error = document.add(Node::Root, "abc".into()).unwrap_err();

        assert!(matches!(error, Error::PoolExhausted { requested } if requested == SLOT_SIZE));
        assert!(document.is_null(Node::Root));
        assert_eq!(document.memory_usage(), size_of_string(3));

        document.clear();
        assert_eq!(document.memory_usage(), 0);
    }

    #[test]
    fn clear_resets_everything() {
        let mut document = JsonDocument::new(1024);
        _ = document.add(Node::Root, "text".into()).unwrap();

        document.clear();

        assert!(document.is_null(Node::Root));
        assert_eq!(document.memory_usage(), 0);
        assert!(!document.overflowed());
    }

    #[test]
    fn shrink_to_fit_preserves_content() {
        let mut document = JsonDocument::new(4096);

        let list = document
            .insert(Node::Root, JsonString::copied("list"), Value::Array)
            .unwrap();
        _ = document.add(list, "one".into()).unwrap();
        _ = document.add(list, 2.5.into()).unwrap();

        assert!(document.shrink_to_fit().unwrap() > 0);

        let list = document.member(Node::Root, "list").unwrap();
        let one = document.element(list, 0).unwrap();
        let two = document.element(list, 1).unwrap();

        assert_eq!(document.as_str(one), Some("one"));
        assert_eq!(document.as_f64(two), Some(2.5));
    }

    #[test]
    fn children_visits_members_in_order() {
        let mut document = JsonDocument::new(1024);

        for key in ["x", "y", "z"] {
            _ = document
                .insert(Node::Root, JsonString::copied(key), Value::Null)
                .unwrap();
        }

        let keys: Vec<_> = document
            .children(Node::Root)
            .filter_map(|child| document.key(child))
            .collect();

        assert_eq!(keys, ["x", "y", "z"]);
    }

    #[test]
    fn integers_read_as_floats() {
        let mut document = JsonDocument::new(64);
        document.set(Node::Root, 3.into()).unwrap();

        assert_eq!(document.as_f64(Node::Root), Some(3.0));
        assert!(document.as_str(Node::Root).is_none());
    }
}
