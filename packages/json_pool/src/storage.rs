//! Storage policies deciding whether a string is copied into the pool or referenced in place.

use crate::{Allocator, MemoryPool, Relocate, Relocation, StringRef};

/// How a [`JsonString`] is to be stored.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum StoragePolicy {
    /// The bytes are copied into the pool (and deduplicated if the pool does that).
    Copy,

    /// The bytes are referenced where they are, without touching the pool.
    Link,

    /// Chosen per string at run time: linked if the flag is set, copied otherwise.
    LinkOrCopy {
        /// Whether to link rather than copy.
        link: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Source<'s> {
    Null,
    Copy(&'s [u8]),
    Link(&'static [u8]),
    LinkOrCopy(&'static [u8], bool),
}

/// A string about to be stored in a document, together with its [`StoragePolicy`].
///
/// Linking is only possible for `'static` data: a linked string is referenced by the document
/// without being copied, so it must outlive any pool. Strings with shorter lifetimes can only
/// be copied.
///
/// A null string is distinct from an empty string. Storing it never touches the pool.
///
/// # Examples
///
/// ```
/// use json_pool::{JsonString, MemoryPool, store_string};
///
/// let mut pool = MemoryPool::new(64);
///
/// let transient = String::from("copied");
/// let copied = store_string(&mut pool, JsonString::copied(&transient)).unwrap();
/// let linked = store_string(&mut pool, JsonString::linked("linked")).unwrap();
///
/// assert!(copied.is_copied());
/// assert!(linked.is_linked());
/// assert_eq!(pool.size(), 7);
///
/// assert!(store_string(&mut pool, JsonString::null()).is_none());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JsonString<'s> {
    source: Source<'s>,
}

impl<'s> JsonString<'s> {
    /// A string that is copied into the pool.
    #[must_use]
    pub const fn copied(value: &'s str) -> Self {
        Self::copied_bytes(value.as_bytes())
    }

    /// Arbitrary bytes that are copied into the pool.
    ///
    /// The bytes are not required to be UTF-8, though text accessors of the document will not
    /// return them if they are not.
    #[must_use]
    pub const fn copied_bytes(value: &'s [u8]) -> Self {
        Self {
            source: Source::Copy(value),
        }
    }

    /// The null string.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            source: Source::Null,
        }
    }

    /// Whether this is the null string.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self.source, Source::Null)
    }

    /// The bytes of the string, or `None` for the null string.
    #[must_use]
    pub const fn as_bytes(&self) -> Option<&'s [u8]> {
        match self.source {
            Source::Copy(bytes) => Some(bytes),
            Source::Null | Source::Link(_) | Source::LinkOrCopy(..) => self.static_bytes(),
        }
    }

    /// The bytes of a string that may be linked.
    const fn static_bytes(&self) -> Option<&'static [u8]> {
        match self.source {
            Source::Link(bytes) | Source::LinkOrCopy(bytes, _) => Some(bytes),
            Source::Null | Source::Copy(_) => None,
        }
    }

    /// The bytes to link to, if the policy resolves to linking.
    const fn link_target(&self) -> Option<&'static [u8]> {
        match self.source {
            Source::Link(bytes) | Source::LinkOrCopy(bytes, true) => Some(bytes),
            Source::Null | Source::Copy(_) | Source::LinkOrCopy(_, false) => None,
        }
    }

    /// The length of the string in bytes, zero for the null string.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self.as_bytes() {
            Some(bytes) => bytes.len(),
            None => 0,
        }
    }

    /// Whether the string is empty or null.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The storage policy of this string.
    #[must_use]
    pub const fn policy(&self) -> StoragePolicy {
        match self.source {
            Source::Null | Source::Copy(_) => StoragePolicy::Copy,
            Source::Link(_) => StoragePolicy::Link,
            Source::LinkOrCopy(_, link) => StoragePolicy::LinkOrCopy { link },
        }
    }
}

impl JsonString<'static> {
    /// A string that is referenced by the document instead of being copied.
    #[must_use]
    pub const fn linked(value: &'static str) -> Self {
        Self {
            source: Source::Link(value.as_bytes()),
        }
    }

    /// A string that is linked if `link` is set and copied otherwise.
    ///
    /// Linking requires `'static` data, so this takes a `&'static str` even when `link` is
    /// false. A string that does not live that long can only be [copied][Self::copied].
    ///
    /// # Examples
    ///
    /// ```
    /// use json_pool::{JsonString, MemoryPool, store_string};
    ///
    /// let mut pool = MemoryPool::new(64);
    ///
    /// let linked = store_string(&mut pool, JsonString::link_or_copy("id", true)).unwrap();
    /// let copied = store_string(&mut pool, JsonString::link_or_copy("id", false)).unwrap();
    ///
    /// assert!(linked.is_linked());
    /// assert!(copied.is_copied());
    /// assert_eq!(pool.size(), 3);
    /// ```
    #[must_use]
    pub const fn link_or_copy(value: &'static str, link: bool) -> Self {
        Self {
            source: Source::LinkOrCopy(value.as_bytes(), link),
        }
    }
}

impl<'s> From<&'s str> for JsonString<'s> {
    fn from(value: &'s str) -> Self {
        Self::copied(value)
    }
}

impl<'s> From<Option<&'s str>> for JsonString<'s> {
    fn from(value: Option<&'s str>) -> Self {
        value.map_or_else(Self::null, Self::copied)
    }
}

/// Where the bytes of a stored string live.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "a string is either in the pool or outside it, there is no third place"
)]
pub enum StoredString {
    /// Copied into the string region of the pool.
    Copied(StringRef),

    /// Referenced in place, outside the pool.
    Linked(&'static [u8]),
}

impl StoredString {
    /// Whether the bytes live in the pool.
    #[must_use]
    pub const fn is_copied(&self) -> bool {
        matches!(self, Self::Copied(_))
    }

    /// Whether the bytes live outside the pool.
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        matches!(self, Self::Linked(_))
    }

    /// The length of the string in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Copied(string) => string.len(),
            Self::Linked(bytes) => bytes.len(),
        }
    }

    /// Whether the string is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes of the string, resolved against the pool it was stored in.
    #[must_use]
    pub fn bytes<'p, A: Allocator + ?Sized>(&self, pool: &'p MemoryPool<'_, A>) -> &'p [u8] {
        match *self {
            Self::Copied(string) => pool.string(string),
            Self::Linked(bytes) => bytes,
        }
    }
}

impl Relocate for StoredString {
    fn relocate<A: Allocator + ?Sized>(
        &mut self,
        pool: &mut MemoryPool<'_, A>,
        relocation: &Relocation,
    ) {
        match self {
            Self::Copied(string) => *string = relocation.relocate_string(*string),
            Self::Linked(bytes) => debug_assert!(
                !pool.owns(bytes.as_ptr()),
                "a linked string must not point into the pool"
            ),
        }
    }
}

/// Stores a string in `pool` according to its [`StoragePolicy`].
///
/// Returns `None` for the null string, without touching the pool. Also returns `None` if a
/// string to be copied does not fit, in which case the pool is marked as overflowed. Linking
/// never fails and never touches the pool.
pub fn store_string<A: Allocator + ?Sized>(
    pool: &mut MemoryPool<'_, A>,
    string: JsonString<'_>,
) -> Option<StoredString> {
    if let Some(bytes) = string.link_target() {
        return Some(StoredString::Linked(bytes));
    }

    pool.save_string(string.as_bytes()?)
        .map(StoredString::Copied)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn copy_policy_uses_the_pool() {
        let mut pool = MemoryPool::new(64);

        let stored = store_string(&mut pool, JsonString::copied("hello")).unwrap();

        assert!(stored.is_copied());
        assert_eq!(stored.bytes(&pool), b"hello");
        assert_eq!(pool.size(), 6);
    }

    #[test]
    fn link_policy_leaves_pool_untouched() {
        const GREETING: &str = "hello";

        let mut pool = MemoryPool::new(64);

        let stored = store_string(&mut pool, JsonString::linked(GREETING)).unwrap();

        assert_eq!(stored, StoredString::Linked(GREETING.as_bytes()));
        assert!(!pool.owns(stored.bytes(&pool).as_ptr()));
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn link_or_copy_follows_flag() {
        let mut pool = MemoryPool::new(64);

        let linked = store_string(&mut pool, JsonString::link_or_copy("abc", true)).unwrap();
        assert!(linked.is_linked());
        assert_eq!(pool.size(), 0);

        let copied = store_string(&mut pool, JsonString::link_or_copy("abc", false)).unwrap();
        assert!(copied.is_copied());
        assert_eq!(pool.size(), 4);
    }

    #[test]
    fn linking_works_on_exhausted_pool() {
        let mut pool = MemoryPool::new(0);

        assert!(store_string(&mut pool, JsonString::linked("x")).is_some());
        assert!(!pool.overflowed());

        assert!(store_string(&mut pool, JsonString::copied("x")).is_none());
        assert!(pool.overflowed());
    }

    #[test]
    fn null_is_not_empty() {
        let mut pool = MemoryPool::new(64);

        assert!(store_string(&mut pool, JsonString::null()).is_none());
        assert!(!pool.overflowed());

        let empty = store_string(&mut pool, JsonString::copied("")).unwrap();
        assert!(empty.is_empty());
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn policy_reports_construction() {
        assert_eq!(JsonString::copied("a").policy(), StoragePolicy::Copy);
        assert_eq!(JsonString::linked("a").policy(), StoragePolicy::Link);
        assert_eq!(
            JsonString::link_or_copy("a", true).policy(),
            StoragePolicy::LinkOrCopy { link: true }
        );
        assert!(JsonString::from(None).is_null());
        assert_eq!(JsonString::from("abc").len(), 3);
    }
}
