//! Request fulfillment / inventory allocation engine.
//!
//! ```text
//! fetch candidates (group + type, Available, unexpired)
//!         │
//!         ▼
//!   plan_allocation ── total < requested ──▶ Insufficient (no writes)
//!         │
//!         ▼
//!   MutationBatch ──▶ store.apply_mutations (one transaction,
//!                      re-verifies every touched unit) ──▶ Fulfilled
//!                                    │
//!                                    └── state moved ──▶ Conflict (retryable)
//! ```

mod memory;
mod plan;

pub use memory::*;
pub use plan::*;

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{
    AllocationRecord, BloodGroup, BloodRequest, ComponentType, InventoryUnit, ModelError,
    NewInventoryUnit, NewRequest, RequestId, RequestStatus, UnitId, Urgency,
};

/// Errors surfaced by inventory and request stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    Invalid(#[from] ModelError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Allocation engine errors. `Insufficient` stock is not an error; see
/// [`FulfillmentResult::Insufficient`].
#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request not found: {0}")]
    RequestNotFound(RequestId),

    #[error("Inventory changed during allocation: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl AllocationError {
    /// Whether retrying with freshly fetched candidates may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AllocationError::Conflict(_))
    }
}

impl From<StoreError> for AllocationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => AllocationError::Conflict(msg),
            // A row vanished between read and write
            StoreError::NotFound(msg) => AllocationError::Conflict(msg),
            StoreError::Invalid(e) => AllocationError::InvalidRequest(e.to_string()),
            StoreError::Unavailable(msg) => AllocationError::StoreUnavailable(msg),
        }
    }
}

impl From<ModelError> for AllocationError {
    fn from(e: ModelError) -> Self {
        AllocationError::InvalidRequest(e.to_string())
    }
}

pub type AllocationResult<T> = Result<T, AllocationError>;

/// Inventory persistence used by the engine.
pub trait InventoryStore {
    /// Record new stock and return its id.
    fn insert_unit(&self, unit: &NewInventoryUnit) -> StoreResult<UnitId>;

    fn get_unit(&self, id: UnitId) -> StoreResult<Option<InventoryUnit>>;

    /// Available units of one pool with `expiry_date >= as_of`, in FEFO order.
    fn fetch_available_units(
        &self,
        blood_group: BloodGroup,
        component: ComponentType,
        as_of: NaiveDate,
    ) -> StoreResult<Vec<InventoryUnit>>;

    /// Apply one allocation atomically: unit updates, split records, the
    /// request's Pending -> Fulfilled flip and the ledger rows.
    ///
    /// Every touched unit must still be Available with its expected volume
    /// and the request must still be Pending, otherwise nothing is written
    /// and [`StoreError::Conflict`] is returned. Returns the ids assigned to
    /// `batch.new_units`, in order.
    fn apply_mutations(&self, batch: &MutationBatch) -> StoreResult<Vec<UnitId>>;
}

/// Order in which pending requests are listed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PendingOrder {
    /// Emergency requests first, then oldest first
    Priority,
    /// Oldest first
    Chronological,
}

impl PendingOrder {
    /// Sort requests in place; ties fall back to id for determinism.
    pub fn sort(&self, requests: &mut [BloodRequest]) {
        match self {
            PendingOrder::Priority => requests.sort_by_key(|r| {
                (r.urgency != Urgency::Emergency, r.request_time, r.id)
            }),
            PendingOrder::Chronological => requests.sort_by_key(|r| (r.request_time, r.id)),
        }
    }
}

/// Request persistence used by the engine.
pub trait RequestStore {
    fn insert_request(&self, request: &NewRequest) -> StoreResult<RequestId>;

    fn get_request(&self, id: RequestId) -> StoreResult<Option<BloodRequest>>;

    fn fetch_pending_requests(&self, order: PendingOrder) -> StoreResult<Vec<BloodRequest>>;

    /// Flip a Pending request to Fulfilled. Conflict if it is not Pending.
    fn mark_fulfilled(&self, id: RequestId) -> StoreResult<()>;

    fn allocations_for_request(&self, id: RequestId) -> StoreResult<Vec<AllocationRecord>>;
}

/// A consumed portion of inventory, as reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumedUnit {
    /// The Used record holding the consumed volume
    pub unit_id: UnitId,
    pub volume_ml: u32,
    pub expiry_date: NaiveDate,
    /// Set when the volume was split off a larger unit
    pub split_from: Option<UnitId>,
}

/// Outcome of a fulfillment attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FulfillmentResult {
    Fulfilled {
        request_id: RequestId,
        units_consumed: Vec<ConsumedUnit>,
        total_volume_allocated: u32,
    },
    /// Matching stock is short; nothing was written and the request stays Pending.
    Insufficient {
        request_id: RequestId,
        available_ml: u64,
        requested_ml: u32,
    },
}

impl FulfillmentResult {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, FulfillmentResult::Fulfilled { .. })
    }

    pub fn request_id(&self) -> RequestId {
        match self {
            FulfillmentResult::Fulfilled { request_id, .. } => *request_id,
            FulfillmentResult::Insufficient { request_id, .. } => *request_id,
        }
    }
}

/// Allocates inventory to requests against an injected store.
pub struct AllocationEngine<'a, S> {
    store: &'a S,
}

impl<'a, S> AllocationEngine<'a, S>
where
    S: InventoryStore + RequestStore,
{
    /// Create an engine over `store`.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Try to fulfil `request` from `candidates`.
    ///
    /// `candidates` must be the request's pool (same group and type,
    /// Available, unexpired). Either the whole request is allocated in one
    /// transaction, or nothing is written.
    pub fn try_fulfill(
        &self,
        request: &BloodRequest,
        candidates: &[InventoryUnit],
    ) -> AllocationResult<FulfillmentResult> {
        validate_request(request)?;

        let batch = match plan_allocation(request, candidates) {
            AllocationPlan::Insufficient {
                available_ml,
                requested_ml,
            } => {
                debug!(
                    request_id = request.id,
                    available_ml, requested_ml, "insufficient stock for request"
                );
                return Ok(FulfillmentResult::Insufficient {
                    request_id: request.id,
                    available_ml,
                    requested_ml,
                });
            }
            AllocationPlan::Allocate(batch) => batch,
        };

        let new_ids = match self.store.apply_mutations(&batch) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(request_id = request.id, error = %e, "allocation not applied");
                return Err(e.into());
            }
        };

        let units_consumed = consumed_units(&batch, &new_ids, candidates);
        info!(
            request_id = request.id,
            blood_group = %request.blood_group,
            component = %request.component,
            volume_ml = request.volume_ml,
            units = units_consumed.len(),
            "request fulfilled"
        );

        Ok(FulfillmentResult::Fulfilled {
            request_id: request.id,
            units_consumed,
            total_volume_allocated: request.volume_ml,
        })
    }

    /// Load a request by id, fetch its pool as of `today`, and try to fulfil it.
    pub fn fulfill(&self, request_id: RequestId, today: NaiveDate) -> AllocationResult<FulfillmentResult> {
        let request = self
            .store
            .get_request(request_id)?
            .ok_or(AllocationError::RequestNotFound(request_id))?;
        validate_request(&request)?;

        let candidates =
            self.store
                .fetch_available_units(request.blood_group, request.component, today)?;
        self.try_fulfill(&request, &candidates)
    }
}

fn validate_request(request: &BloodRequest) -> AllocationResult<()> {
    if request.volume_ml == 0 {
        return Err(AllocationError::InvalidRequest(format!(
            "request {} has zero volume",
            request.id
        )));
    }
    if request.status != RequestStatus::Pending {
        return Err(AllocationError::InvalidRequest(format!(
            "request {} is already fulfilled",
            request.id
        )));
    }
    Ok(())
}

fn consumed_units(batch: &MutationBatch, new_ids: &[UnitId], candidates: &[InventoryUnit]) -> Vec<ConsumedUnit> {
    let expiry_by_id: HashMap<UnitId, NaiveDate> =
        candidates.iter().map(|u| (u.id, u.expiry_date)).collect();

    let whole = batch
        .unit_updates
        .iter()
        .filter(|u| u.consumes_whole())
        .filter_map(|u| {
            expiry_by_id.get(&u.unit_id).map(|expiry| ConsumedUnit {
                unit_id: u.unit_id,
                volume_ml: u.new_volume_ml,
                expiry_date: *expiry,
                split_from: None,
            })
        });
    let split = batch.new_units.iter().zip(new_ids).map(|(u, id)| ConsumedUnit {
        unit_id: *id,
        volume_ml: u.volume_ml,
        expiry_date: u.expiry_date,
        split_from: u.split_from,
    });
    whole.chain(split).collect()
}
