//! # Record Codec
//!
//! Bidirectional mapping between domain entities and generic [`RemoteRecord`]s.
//!
//! ## Schema
//!
//! | Record type                 | Fields                                                                    |
//! |-----------------------------|---------------------------------------------------------------------------|
//! | `Kid`                       | `kidName:string`, `coins:int`, `kidReference:reference?`                  |
//! | `ScheduledActivityRegister` | `kidID:string`, `activityID:string`, `date:timestamp`, `duration:double`, `status:int`, `kidReference:reference?` |
//! | `CollectedReward`           | `kidID:string`, `rewardID:int`, `dateCollected:timestamp`, `isDelivered:bool`, `kidReference:reference?` |
//!
//! Encoding an entity that already has an identity is refused: updates go
//! through the modify path with the full saved record. Decoding never yields a
//! partial entity; any missing or mistyped field is a [`DecodeError`].

use std::time::Duration;
use uuid::Uuid;

use super::record::{FieldValue, RecordType, RemoteRecord};
use crate::backend::domain::errors::{DecodeError, SyncError, SyncResult};
use crate::backend::domain::models::{
    ActivityId, CollectedReward, Kid, Persisted, RewardId, Saved, ScheduledActivityRegister,
};
use crate::backend::storage::record::RecordId;
use shared::ActivityStatus;

pub const FIELD_KID_NAME: &str = "kidName";
pub const FIELD_COINS: &str = "coins";
pub const FIELD_KID_REFERENCE: &str = "kidReference";
pub const FIELD_KID_ID: &str = "kidID";
pub const FIELD_ACTIVITY_ID: &str = "activityID";
pub const FIELD_DATE: &str = "date";
pub const FIELD_DURATION: &str = "duration";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_REWARD_ID: &str = "rewardID";
pub const FIELD_DATE_COLLECTED: &str = "dateCollected";
pub const FIELD_IS_DELIVERED: &str = "isDelivered";

/// Mapping between one entity type and its remote record
pub trait RecordCodec: Sized + Clone + Send + Sync + 'static {
    const RECORD_TYPE: RecordType;

    /// Write the entity's fields into `record`
    fn encode_fields(&self, record: &mut RemoteRecord);

    /// Read every declared field back out of `record`
    fn decode_fields(record: &RemoteRecord) -> Result<Self, DecodeError>;

    /// Share root this record hangs under, if any
    fn parent(&self) -> Option<RecordId> {
        None
    }

    /// Encode an entity for the create path
    fn to_record(entity: &Persisted<Self>) -> SyncResult<RemoteRecord> {
        match entity {
            Persisted::Unsaved(value) => {
                let mut record = RemoteRecord::new(Self::RECORD_TYPE);
                record.parent = value.parent();
                value.encode_fields(&mut record);
                Ok(record)
            }
            Persisted::Saved(saved) => Err(SyncError::AlreadyPersisted(format!(
                "{} {}",
                Self::RECORD_TYPE,
                saved.id()
            ))),
        }
    }

    /// Encode a saved entity, identity and change tag included, for the modify path
    fn to_saved_record(saved: &Saved<Self>) -> RemoteRecord {
        let mut record = RemoteRecord::new(Self::RECORD_TYPE);
        record.meta = Some(saved.meta.clone());
        record.parent = saved.value.parent();
        saved.value.encode_fields(&mut record);
        record
    }

    /// Decode a record the store returned
    fn from_record(record: RemoteRecord) -> Result<Saved<Self>, DecodeError> {
        if record.record_type != Self::RECORD_TYPE {
            return Err(DecodeError::invalid(
                Self::RECORD_TYPE,
                "recordType",
                format!("is {}", record.record_type),
            ));
        }
        let meta = record
            .meta
            .clone()
            .ok_or_else(|| DecodeError::missing(Self::RECORD_TYPE, "recordID"))?;
        let value = Self::decode_fields(&record)?;
        Ok(Saved::new(meta, value))
    }
}

impl RecordCodec for Kid {
    const RECORD_TYPE: RecordType = RecordType::Kid;

    fn encode_fields(&self, record: &mut RemoteRecord) {
        record.set(FIELD_KID_NAME, FieldValue::String(self.name.clone()));
        record.set(FIELD_COINS, FieldValue::Int(self.coins));
        record.set_optional(FIELD_KID_REFERENCE, self.share.clone().map(FieldValue::Reference));
    }

    fn decode_fields(record: &RemoteRecord) -> Result<Self, DecodeError> {
        let coins = record.int(FIELD_COINS)?;
        if coins < 0 {
            return Err(DecodeError::invalid(Self::RECORD_TYPE, FIELD_COINS, "is negative"));
        }
        Ok(Kid {
            name: record.string(FIELD_KID_NAME)?,
            coins,
            share: record.reference(FIELD_KID_REFERENCE)?,
        })
    }
}

impl RecordCodec for ScheduledActivityRegister {
    const RECORD_TYPE: RecordType = RecordType::ScheduledActivity;

    fn encode_fields(&self, record: &mut RemoteRecord) {
        record.set(FIELD_KID_ID, FieldValue::String(self.kid_id.clone()));
        record.set(FIELD_ACTIVITY_ID, FieldValue::String(self.activity_id.0.to_string()));
        record.set(FIELD_DATE, FieldValue::Timestamp(self.date));
        record.set(FIELD_DURATION, FieldValue::Double(self.duration.as_secs_f64()));
        record.set(FIELD_STATUS, FieldValue::Int(self.status.code()));
        record.set_optional(
            FIELD_KID_REFERENCE,
            self.kid_reference.clone().map(FieldValue::Reference),
        );
    }

    fn decode_fields(record: &RemoteRecord) -> Result<Self, DecodeError> {
        let activity_raw = record.string(FIELD_ACTIVITY_ID)?;
        let activity_id = Uuid::parse_str(&activity_raw).map_err(|e| {
            DecodeError::invalid(Self::RECORD_TYPE, FIELD_ACTIVITY_ID, format!("is not a UUID: {e}"))
        })?;

        let seconds = record.double(FIELD_DURATION)?;
        let duration = Duration::try_from_secs_f64(seconds).map_err(|_| {
            DecodeError::invalid(Self::RECORD_TYPE, FIELD_DURATION, format!("{seconds} is not a valid duration"))
        })?;

        let code = record.int(FIELD_STATUS)?;
        let status = ActivityStatus::from_code(code).ok_or_else(|| {
            DecodeError::invalid(Self::RECORD_TYPE, FIELD_STATUS, format!("has unknown code {code}"))
        })?;

        Ok(ScheduledActivityRegister {
            kid_id: record.string(FIELD_KID_ID)?,
            kid_reference: record.reference(FIELD_KID_REFERENCE)?,
            activity_id: ActivityId(activity_id),
            date: record.timestamp(FIELD_DATE)?,
            duration,
            status,
        })
    }

    fn parent(&self) -> Option<RecordId> {
        self.kid_reference.clone()
    }
}

impl RecordCodec for CollectedReward {
    const RECORD_TYPE: RecordType = RecordType::CollectedReward;

    fn encode_fields(&self, record: &mut RemoteRecord) {
        record.set(FIELD_KID_ID, FieldValue::String(self.kid_id.clone()));
        record.set(FIELD_REWARD_ID, FieldValue::Int(self.reward_id.0));
        record.set(FIELD_DATE_COLLECTED, FieldValue::Timestamp(self.date_collected));
        record.set(FIELD_IS_DELIVERED, FieldValue::Bool(self.is_delivered));
        record.set_optional(
            FIELD_KID_REFERENCE,
            self.kid_reference.clone().map(FieldValue::Reference),
        );
    }

    fn decode_fields(record: &RemoteRecord) -> Result<Self, DecodeError> {
        Ok(CollectedReward {
            kid_id: record.string(FIELD_KID_ID)?,
            kid_reference: record.reference(FIELD_KID_REFERENCE)?,
            reward_id: RewardId(record.int(FIELD_REWARD_ID)?),
            date_collected: record.timestamp(FIELD_DATE_COLLECTED)?,
            is_delivered: record.bool(FIELD_IS_DELIVERED)?,
        })
    }

    fn parent(&self) -> Option<RecordId> {
        self.kid_reference.clone()
    }
}
