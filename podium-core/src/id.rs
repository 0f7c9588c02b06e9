use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::PodError;

/// Separator between the collection and key parts of an id.
pub const ID_SEPARATOR: char = '/';

/// A compound document identifier of the form `collection/key`.
///
/// Ids are serialized as their string form, matching the `_id` attribute of
/// wire records.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId {
    collection: String,
    key: String,
}

impl DocumentId {
    /// Builds an id from its parts. Both parts must be non-empty and must not
    /// contain the separator.
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Result<Self, PodError> {
        let collection = collection.into();
        let key = key.into();
        if collection.is_empty()
            || key.is_empty()
            || collection.contains(ID_SEPARATOR)
            || key.contains(ID_SEPARATOR)
        {
            return Err(PodError::MalformedId(format!("{collection}{ID_SEPARATOR}{key}")));
        }
        Ok(DocumentId { collection, key })
    }

    /// Parses `collection/key`. Exactly one separator is allowed.
    pub fn parse(id: &str) -> Result<Self, PodError> {
        let mut parts = id.split(ID_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(collection), Some(key), None) if !collection.is_empty() && !key.is_empty() => {
                Ok(DocumentId {
                    collection: collection.to_string(),
                    key: key.to_string(),
                })
            }
            _ => Err(PodError::MalformedId(id.to_string())),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl FromStr for DocumentId {
    type Err = PodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentId::parse(s)
    }
}

impl TryFrom<&str> for DocumentId {
    type Error = PodError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        DocumentId::parse(value)
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.collection, ID_SEPARATOR, self.key)
    }
}

impl Serialize for DocumentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DocumentId::parse(&raw).map_err(serde::de::Error::custom)
    }
}
