//! # Remote Records
//!
//! Generic key/value rows as the remote store sees them, plus the identity and
//! addressing types every layer above shares.
//!
//! A record is addressed by its [`RecordId`], which embeds the [`PartitionId`]
//! it lives in. The partition in turn names the account that owns it, which is
//! what the partition router needs to decide between the private and shared
//! databases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::backend::domain::errors::DecodeError;

/// Identity of a remote-store account (a parent or a child device login)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two databases every account sees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Database {
    /// Partitions owned by the acting account
    Private,
    /// Partitions owned by someone else and reached through a share grant
    Shared,
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Database::Private => write!(f, "private"),
            Database::Shared => write!(f, "shared"),
        }
    }
}

/// A named partition together with the account that owns it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionId {
    pub name: String,
    pub owner: AccountId,
}

impl PartitionId {
    pub fn new(name: impl Into<String>, owner: AccountId) -> Self {
        Self {
            name: name.into(),
            owner,
        }
    }

    pub fn is_owned_by(&self, account: &AccountId) -> bool {
        &self.owner == account
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.owner)
    }
}

/// Store-assigned record identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub name: String,
    pub partition: PartitionId,
}

impl RecordId {
    pub fn new(name: impl Into<String>, partition: PartitionId) -> Self {
        Self {
            name: name.into(),
            partition,
        }
    }

    /// Fresh random identity inside `partition`
    pub fn generate(partition: PartitionId) -> Self {
        Self::new(Uuid::new_v4().to_string(), partition)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Opaque optimistic-concurrency token. Bumped by the store on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeTag(pub u64);

impl fmt::Display for ChangeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag-{}", self.0)
    }
}

/// Identity plus change tag of a persisted record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: RecordId,
    pub change_tag: ChangeTag,
}

/// Record types known to the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    Kid,
    ScheduledActivity,
    CollectedReward,
}

impl RecordType {
    /// Type name used by the remote schema
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Kid => "Kid",
            RecordType::ScheduledActivity => "ScheduledActivityRegister",
            RecordType::CollectedReward => "CollectedReward",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed value of a single record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Reference(RecordId),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Int(_) => "int",
            FieldValue::Double(_) => "double",
            FieldValue::Bool(_) => "bool",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Reference(_) => "reference",
        }
    }
}

/// A generic row in the remote store.
///
/// `meta` is `None` until the store assigns an identity on first save. `parent`
/// places the record under a share root so that a grant on the root covers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub record_type: RecordType,
    pub meta: Option<RecordMeta>,
    pub parent: Option<RecordId>,
    fields: BTreeMap<String, FieldValue>,
}

impl RemoteRecord {
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            meta: None,
            parent: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Option<&RecordId> {
        self.meta.as_ref().map(|meta| &meta.id)
    }

    pub fn set(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    /// Set the field when `value` is present, clear it otherwise
    pub fn set_optional(&mut self, name: &str, value: Option<FieldValue>) {
        match value {
            Some(value) => self.set(name, value),
            None => {
                self.fields.remove(name);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn string(&self, name: &str) -> Result<String, DecodeError> {
        match self.required(name)? {
            FieldValue::String(value) => Ok(value.clone()),
            other => Err(self.wrong_type(name, "string", other)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, DecodeError> {
        match self.required(name)? {
            FieldValue::Int(value) => Ok(*value),
            other => Err(self.wrong_type(name, "int", other)),
        }
    }

    pub fn double(&self, name: &str) -> Result<f64, DecodeError> {
        match self.required(name)? {
            FieldValue::Double(value) => Ok(*value),
            other => Err(self.wrong_type(name, "double", other)),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool, DecodeError> {
        match self.required(name)? {
            FieldValue::Bool(value) => Ok(*value),
            other => Err(self.wrong_type(name, "bool", other)),
        }
    }

    pub fn timestamp(&self, name: &str) -> Result<DateTime<Utc>, DecodeError> {
        match self.required(name)? {
            FieldValue::Timestamp(value) => Ok(*value),
            other => Err(self.wrong_type(name, "timestamp", other)),
        }
    }

    /// Optional reference field; present-but-wrong-type is still an error
    pub fn reference(&self, name: &str) -> Result<Option<RecordId>, DecodeError> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(FieldValue::Reference(id)) => Ok(Some(id.clone())),
            Some(other) => Err(self.wrong_type(name, "reference", other)),
        }
    }

    fn required(&self, name: &str) -> Result<&FieldValue, DecodeError> {
        self.fields
            .get(name)
            .ok_or_else(|| DecodeError::missing(self.record_type, name))
    }

    fn wrong_type(&self, name: &str, expected: &str, found: &FieldValue) -> DecodeError {
        DecodeError::wrong_type(self.record_type, name, expected, found.type_name())
    }
}

/// Query predicate evaluated by the store
#[derive(Debug, Clone, PartialEq)]
pub enum RecordFilter {
    All,
    Equals(String, FieldValue),
    AnyOf(Vec<RecordFilter>),
}

impl RecordFilter {
    pub fn equals(name: &str, value: FieldValue) -> Self {
        RecordFilter::Equals(name.to_string(), value)
    }

    pub fn matches(&self, record: &RemoteRecord) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::Equals(name, value) => record.get(name) == Some(value),
            RecordFilter::AnyOf(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition() -> PartitionId {
        PartitionId::new("KidZone", AccountId::new("parent"))
    }

    #[test]
    fn test_typed_getters_reject_wrong_types() {
        let mut record = RemoteRecord::new(RecordType::Kid);
        record.set("kidName", FieldValue::Int(3));

        let err = record.string("kidName").unwrap_err();
        assert_eq!(err.field, "kidName");
        assert!(err.reason.contains("expected string"));

        let err = record.int("coins").unwrap_err();
        assert!(err.reason.contains("missing"));
    }

    #[test]
    fn test_optional_reference_absent_is_none() {
        let record = RemoteRecord::new(RecordType::Kid);
        assert_eq!(record.reference("kidReference").unwrap(), None);
    }

    #[test]
    fn test_filter_any_of_matches_either_field() {
        let kid = RecordId::new("kid-1", partition());
        let filter = RecordFilter::AnyOf(vec![
            RecordFilter::equals("kidID", FieldValue::String("kid-1".to_string())),
            RecordFilter::equals("kidReference", FieldValue::Reference(kid.clone())),
        ]);

        let mut by_id = RemoteRecord::new(RecordType::ScheduledActivity);
        by_id.set("kidID", FieldValue::String("kid-1".to_string()));
        let mut by_reference = RemoteRecord::new(RecordType::ScheduledActivity);
        by_reference.set("kidReference", FieldValue::Reference(kid));
        let mut other = RemoteRecord::new(RecordType::ScheduledActivity);
        other.set("kidID", FieldValue::String("kid-2".to_string()));

        assert!(filter.matches(&by_id));
        assert!(filter.matches(&by_reference));
        assert!(!filter.matches(&other));
    }

    #[test]
    fn test_set_optional_clears_field() {
        let mut record = RemoteRecord::new(RecordType::Kid);
        record.set("kidReference", FieldValue::Reference(RecordId::generate(partition())));
        record.set_optional("kidReference", None);
        assert!(record.get("kidReference").is_none());
    }
}
