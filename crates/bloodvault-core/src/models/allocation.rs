//! Fulfillment ledger models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RequestId, UnitId};

/// One consumed portion of inventory attributed to a fulfilled request.
///
/// `unit_id` always points at a Used record: either a unit consumed whole,
/// or the Used record produced by splitting a larger unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationRecord {
    /// Ledger entry id (UUID v4)
    pub allocation_id: String,
    pub request_id: RequestId,
    pub unit_id: UnitId,
    pub volume_ml: u32,
    pub allocated_at: DateTime<Utc>,
}

impl AllocationRecord {
    pub fn new(request_id: RequestId, unit_id: UnitId, volume_ml: u32, allocated_at: DateTime<Utc>) -> Self {
        Self {
            allocation_id: uuid::Uuid::new_v4().to_string(),
            request_id,
            unit_id,
            volume_ml,
            allocated_at,
        }
    }
}
