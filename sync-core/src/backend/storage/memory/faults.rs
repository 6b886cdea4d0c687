//! One-shot fault injection for the in-memory cloud.
//!
//! Each queued fault fires once, on the first call it matches, and is then
//! consumed. Queue the same fault several times to make it fire repeatedly.

use crate::backend::storage::record::{Database, RecordType};

#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// The next modify of this record type is rejected with a change-tag conflict
    Conflict { record_type: RecordType },
    /// Another device adds `delta` to the integer `field` right before the
    /// next modify of this record type lands, which then conflicts
    ConcurrentWrite {
        record_type: RecordType,
        field: String,
        delta: i64,
    },
    /// The next modify of this record type lands, but its reply takes `delay_ms`
    LateAck { record_type: RecordType, delay_ms: u64 },
    /// Like `LateAck`, and another device adds `delta` to the integer `field`
    /// right after the modify lands
    LateAckThenWrite {
        record_type: RecordType,
        delay_ms: u64,
        field: String,
        delta: i64,
    },
    /// The next modify of this record type waits `delay_ms` before it reaches
    /// the store, so a caller that gives up first never writes
    StalledWrite { record_type: RecordType, delay_ms: u64 },
    /// The next query or fetch against this database fails
    Unavailable { database: Database },
    SaveFails { record_type: RecordType },
    ModifyFails { record_type: RecordType },
    DeleteFails { record_type: RecordType },
    /// The next partition creation reports the partition as unavailable
    PartitionCreateFails,
}

#[derive(Debug, Default)]
pub struct FaultPlan {
    queued: Vec<Fault>,
}

impl FaultPlan {
    pub fn push(&mut self, fault: Fault) {
        self.queued.push(fault);
    }

    /// Remove and return the first queued fault accepted by `matches`
    pub fn take(&mut self, matches: impl Fn(&Fault) -> bool) -> Option<Fault> {
        let index = self.queued.iter().position(matches)?;
        Some(self.queued.remove(index))
    }

    pub fn take_exact(&mut self, fault: &Fault) -> bool {
        self.take(|queued| queued == fault).is_some()
    }

    pub fn pending(&self) -> usize {
        self.queued.len()
    }
}
