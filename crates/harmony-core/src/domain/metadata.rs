//! Structured metadata attached to synchronized objects
//!
//! Metadata keys come from a closed enumeration; values are always strings.
//! Loosely typed input (JSON objects) is converted at the boundary by
//! [`MetadataMap::from_json`], which rejects non-string values instead of
//! silently dropping them.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::ValidationError;

/// A recognized metadata key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MetadataKey {
    RecordedObjectType,
    RecordedObjectIdentifier,
    IsLocked,
    PreviousVersionIdentifier,
    PreviousVersionDate,
    Sha1Hash,
    RelationshipIdentifiers,
    Author,
    LocalizedName,
}

impl MetadataKey {
    /// Every recognized key, in declaration order
    pub const ALL: [MetadataKey; 9] = [
        MetadataKey::RecordedObjectType,
        MetadataKey::RecordedObjectIdentifier,
        MetadataKey::IsLocked,
        MetadataKey::PreviousVersionIdentifier,
        MetadataKey::PreviousVersionDate,
        MetadataKey::Sha1Hash,
        MetadataKey::RelationshipIdentifiers,
        MetadataKey::Author,
        MetadataKey::LocalizedName,
    ];

    /// Wire name used as the schema field name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RecordedObjectType => "harmony_recordedObjectType",
            Self::RecordedObjectIdentifier => "harmony_recordedObjectIdentifier",
            Self::IsLocked => "harmony_isLocked",
            Self::PreviousVersionIdentifier => "harmony_previousVersionIdentifier",
            Self::PreviousVersionDate => "harmony_previousVersionDate",
            Self::Sha1Hash => "harmony_sha1Hash",
            Self::RelationshipIdentifiers => "harmony_relationshipIdentifiers",
            Self::Author => "harmony_author",
            Self::LocalizedName => "harmony_localizedName",
        }
    }
}

impl Display for MetadataKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownMetadataKey(s.to_string()))
    }
}

impl TryFrom<String> for MetadataKey {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MetadataKey> for String {
    fn from(key: MetadataKey) -> Self {
        key.as_str().to_string()
    }
}

// ============================================================================
// MetadataMap
// ============================================================================

/// Metadata attached to a record or file
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataMap(BTreeMap<MetadataKey, String>);

impl MetadataMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts a JSON object into a typed map
    ///
    /// # Errors
    /// - [`ValidationError::UnknownMetadataKey`] if a key is not recognized
    /// - [`ValidationError::InvalidMetadataValue`] if a value is not a string
    pub fn from_json(value: &serde_json::Map<String, serde_json::Value>) -> Result<Self, ValidationError> {
        let mut map = BTreeMap::new();
        for (name, value) in value {
            let key: MetadataKey = name.parse()?;
            let value = value
                .as_str()
                .ok_or(ValidationError::InvalidMetadataValue(key))?;
            map.insert(key, value.to_string());
        }
        Ok(Self(map))
    }

    pub fn insert(&mut self, key: MetadataKey, value: impl Into<String>) -> Option<String> {
        self.0.insert(key, value.into())
    }

    #[must_use]
    pub fn get(&self, key: MetadataKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    /// Keys present in this map
    pub fn keys(&self) -> impl Iterator<Item = MetadataKey> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetadataKey, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(MetadataKey, String)> for MetadataMap {
    fn from_iter<I: IntoIterator<Item = (MetadataKey, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(MetadataKey, &str); N]> for MetadataMap {
    fn from(entries: [(MetadataKey, &str); N]) -> Self {
        entries
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect()
    }
}

// ============================================================================
// MetadataUpdate
// ============================================================================

/// A metadata diff: `Some` values are added or updated, `None` values removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataUpdate(BTreeMap<MetadataKey, Option<String>>);

impl MetadataUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`
    #[must_use]
    pub fn set(mut self, key: MetadataKey, value: impl Into<String>) -> Self {
        self.0.insert(key, Some(value.into()));
        self
    }

    /// Marks `key` for removal
    #[must_use]
    pub fn remove(mut self, key: MetadataKey) -> Self {
        self.0.insert(key, None);
        self
    }

    /// Converts a JSON object where `null` marks a removal
    ///
    /// # Errors
    /// Fails on unknown keys and on values that are neither strings nor null.
    pub fn from_json(value: &serde_json::Map<String, serde_json::Value>) -> Result<Self, ValidationError> {
        let mut map = BTreeMap::new();
        for (name, value) in value {
            let key: MetadataKey = name.parse()?;
            let value = match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                _ => return Err(ValidationError::InvalidMetadataValue(key)),
            };
            map.insert(key, value);
        }
        Ok(Self(map))
    }

    /// Every key mentioned by this update
    pub fn keys(&self) -> impl Iterator<Item = MetadataKey> + '_ {
        self.0.keys().copied()
    }

    /// Splits the update into (add-or-update fields, removed keys)
    ///
    /// The two sets are disjoint: each key appears in exactly one of them.
    #[must_use]
    pub fn partition(&self) -> (MetadataMap, Vec<MetadataKey>) {
        let mut updated = MetadataMap::new();
        let mut removed = Vec::new();
        for (key, value) in &self.0 {
            match value {
                Some(value) => {
                    updated.insert(*key, value.clone());
                }
                None => removed.push(*key),
            }
        }
        (updated, removed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<MetadataMap> for MetadataUpdate {
    fn from(map: MetadataMap) -> Self {
        Self(map.0.into_iter().map(|(k, v)| (k, Some(v))).collect())
    }
}
