//! JSON serialization of a [`JsonDocument`] through `serde`.

use std::fmt;
use std::io;
use std::str::from_utf8;

use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;

use crate::{Allocator, JsonDocument, MemoryPool, Node, VariantData};

/// Writes the document as compact JSON.
///
/// Non-finite floating-point numbers have no JSON representation and are written as `null`.
/// Strings that are not valid UTF-8 are written with invalid sequences replaced.
///
/// # Errors
///
/// Returns an error if the writer fails or if a raw value is not valid JSON.
///
/// # Examples
///
/// ```
/// use json_pool::{JsonDocument, Node, serialize_json};
///
/// let mut document = JsonDocument::new(256);
/// document.add(Node::Root, "line\nbreak".into())?;
/// document.add(Node::Root, f64::NAN.into())?;
/// document.add(Node::Root, 1e300.into())?;
///
/// let mut json = Vec::new();
/// serialize_json(&document, &mut json).unwrap();
///
/// assert_eq!(json, br#"["line\nbreak",null,1e300]"#);
/// # Ok::<(), json_pool::Error>(())
/// ```
pub fn serialize_json<A: Allocator + ?Sized, W: io::Write>(
    document: &JsonDocument<'_, A>,
    writer: W,
) -> serde_json::Result<()> {
    serde_json::to_writer(writer, document)
}

impl<A: Allocator + ?Sized> Serialize for JsonDocument<'_, A> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PooledVariant {
            pool: self.pool(),
            data: self.get(Node::Root),
        }
        .serialize(serializer)
    }
}

impl<A: Allocator + ?Sized> fmt::Display for JsonDocument<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// A variant paired with the pool its strings and collection entries live in.
struct PooledVariant<'p, 'a, A: Allocator + ?Sized> {
    pool: &'p MemoryPool<'a, A>,
    data: &'p VariantData,
}

impl<'p, 'a, A: Allocator + ?Sized> PooledVariant<'p, 'a, A> {
    fn child(&self, data: &'p VariantData) -> Self {
        Self {
            pool: self.pool,
            data,
        }
    }
}

impl<A: Allocator + ?Sized> Serialize for PooledVariant<'_, '_, A> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let pool = self.pool;

        match self.data {
            VariantData::Null => serializer.serialize_unit(),
            VariantData::Bool(value) => serializer.serialize_bool(*value),
            VariantData::Integer(value) => serializer.serialize_i64(*value),
            VariantData::Float(value) => serializer.serialize_f64(*value),
            VariantData::String(string) => {
                serializer.serialize_str(&String::from_utf8_lossy(string.bytes(pool)))
            }
            VariantData::Raw(raw) => {
                let text = from_utf8(raw.bytes(pool)).map_err(S::Error::custom)?;
                let raw: &RawValue = serde_json::from_str(text).map_err(S::Error::custom)?;
                raw.serialize(serializer)
            }
            VariantData::Array(array) => {
                let mut seq = serializer.serialize_seq(Some(array.len()))?;

                for element in array.iter(pool) {
                    seq.serialize_element(&self.child(pool.slot(element).data()))?;
                }

                seq.end()
            }
            VariantData::Object(object) => {
                let mut map = serializer.serialize_map(Some(object.len()))?;

                for member in object.iter(pool) {
                    let slot = pool.slot(member);
                    let key = slot.key().map_or(&[][..], |key| key.bytes(pool));

                    map.serialize_entry(&String::from_utf8_lossy(key), &self.child(slot.data()))?;
                }

                map.end()
            }
        }
    }
}
