//! Identifiers and the schema-less property bag carried by every entity.
//!
//! [`EntityId`] is the opaque identifier a store generates on insert. [`Props`] is the
//! field mapping of an entity: string keys to BSON values, where a key may also be marked
//! absent so the next update removes it from the stored document.

use bson::{Bson, de::deserialize_from_bson, oid::ObjectId, ser::serialize_to_bson};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Field name the store uses for the document identifier.
pub const ID_FIELD: &str = "_id";
/// Alias accepted for [`ID_FIELD`] when decoding and querying.
pub const ID_ALIAS: &str = "id";
/// Field holding the creation timestamp (milliseconds since the Unix epoch).
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Field holding the last update timestamp (milliseconds since the Unix epoch).
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Field names owned by the entity record; they never appear inside [`Props`].
pub const RESERVED_FIELDS: [&str; 4] = [ID_FIELD, ID_ALIAS, CREATED_AT_FIELD, UPDATED_AT_FIELD];

/// Returns true if `field` is routed to a dedicated entity attribute.
pub fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// Opaque identifier assigned by the store when an entity is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(ObjectId);

impl EntityId {
    /// Generates a fresh identifier. Backends use this to assign ids on insert.
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    /// Parses the 24 character hex form of an identifier.
    pub fn parse_str(s: &str) -> DocumentStoreResult<Self> {
        ObjectId::parse_str(s)
            .map(Self)
            .map_err(|e| DocumentStoreError::InvalidId(format!("'{s}': {e}")))
    }

    /// Returns the hex form of this identifier.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Returns the underlying BSON object id.
    pub fn object_id(&self) -> ObjectId {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

impl FromStr for EntityId {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl From<ObjectId> for EntityId {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

impl From<EntityId> for Bson {
    fn from(id: EntityId) -> Self {
        Bson::ObjectId(id.0)
    }
}

impl TryFrom<&Bson> for EntityId {
    type Error = DocumentStoreError;

    /// Accepts an object id or its hex string form.
    fn try_from(value: &Bson) -> Result<Self, Self::Error> {
        match value {
            Bson::ObjectId(oid) => Ok(Self(*oid)),
            Bson::String(s) => Self::parse_str(s),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "expected an object id for {ID_FIELD}, found {other}"
            ))),
        }
    }
}

/// Checks that `field` may be stored as a property.
///
/// Reserved names are owned by the entity record. Empty names, names starting with `$`
/// and names containing `.` or NUL collide with the native query syntax.
pub fn validate_field(field: &str) -> DocumentStoreResult<()> {
    if is_reserved(field) {
        return Err(DocumentStoreError::InvalidDocument(format!(
            "'{field}' is a reserved field name"
        )));
    }
    if field.is_empty() || field.starts_with('$') || field.contains('.') || field.contains('\0') {
        return Err(DocumentStoreError::InvalidDocument(format!(
            "'{field}' is not a valid field name"
        )));
    }

    Ok(())
}

/// The schema-less property bag of an entity.
///
/// Each key maps either to a value (`Some`) or to the absent marker (`None`). Absent keys
/// are skipped when encoding and are removed from the stored document by the next update
/// that targets them.
///
/// # Example
///
/// ```ignore
/// let mut props = Props::new();
/// props.set("name", "Alice")?;
/// props.set("age", 30)?;
/// props.unset("nickname")?;
///
/// assert_eq!(props.get_str("name"), Some("Alice"));
/// assert!(props.is_absent("nickname"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props {
    entries: BTreeMap<String, Option<Bson>>,
}

impl Props {
    /// Creates an empty property bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `field` to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] for reserved or malformed names.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Bson>) -> DocumentStoreResult<()> {
        let field = field.into();
        validate_field(&field)?;
        self.entries.insert(field, Some(value.into()));

        Ok(())
    }

    /// Serializes `value` with serde and stores it under `field`.
    pub fn set_as<T: Serialize>(&mut self, field: impl Into<String>, value: &T) -> DocumentStoreResult<()> {
        let bson = serialize_to_bson(value)?;
        self.set(field, bson)
    }

    /// Marks `field` absent so the next update removes it from the stored document.
    pub fn unset(&mut self, field: impl Into<String>) -> DocumentStoreResult<()> {
        let field = field.into();
        validate_field(&field)?;
        self.entries.insert(field, None);

        Ok(())
    }

    /// Forgets `field` locally without scheduling a removal.
    pub fn remove(&mut self, field: &str) -> Option<Bson> {
        self.entries.remove(field).flatten()
    }

    /// Returns the value of `field`, or `None` if it is missing or absent.
    pub fn get(&self, field: &str) -> Option<&Bson> {
        self.entries.get(field).and_then(Option::as_ref)
    }

    /// Deserializes the value of `field` with serde.
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> DocumentStoreResult<Option<T>> {
        self.get(field)
            .cloned()
            .map(deserialize_from_bson::<T>)
            .transpose()
            .map_err(Into::into)
    }

    /// Returns the value of `field` if it is a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Bson::as_str)
    }

    /// Returns the value of `field` if it is an integer of either width.
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        match self.get(field)? {
            Bson::Int32(v) => Some(i64::from(*v)),
            Bson::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns true if `field` is present with the absent marker.
    pub fn is_absent(&self, field: &str) -> bool {
        matches!(self.entries.get(field), Some(None))
    }

    /// Returns true if `field` has an entry, present or absent.
    pub fn contains_key(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    /// Iterates over every key, including absent ones, in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates over present values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bson)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.as_str(), v)))
    }

    /// Number of entries, including absent ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores a decoded value without name validation. The store is trusted.
    pub(crate) fn upsert(&mut self, field: String, value: Bson) {
        self.entries.insert(field, Some(value));
    }

    pub(crate) fn entry(&self, field: &str) -> Option<&Option<Bson>> {
        self.entries.get(field)
    }

    /// Drops absent markers for `fields` once their removal has been written.
    pub(crate) fn prune_absent<'a>(&mut self, fields: impl IntoIterator<Item = &'a str>) {
        for field in fields {
            if self.is_absent(field) {
                self.entries.remove(field);
            }
        }
    }
}
