//! In-memory store for tests and embedding without SQLite.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};

use super::{InventoryStore, MutationBatch, PendingOrder, RequestStore, StoreError, StoreResult};
use crate::models::{
    AllocationRecord, BloodGroup, BloodRequest, ComponentType, InventoryUnit, NewInventoryUnit,
    NewRequest, RequestId, RequestStatus, UnitId, UnitStatus,
};

#[derive(Default)]
struct MemoryState {
    units: BTreeMap<UnitId, InventoryUnit>,
    requests: BTreeMap<RequestId, BloodRequest>,
    allocations: Vec<AllocationRecord>,
    last_unit_id: UnitId,
    last_request_id: RequestId,
}

impl MemoryState {
    fn next_unit_id(&mut self) -> UnitId {
        self.last_unit_id += 1;
        self.last_unit_id
    }

    fn next_request_id(&mut self) -> RequestId {
        self.last_request_id += 1;
        self.last_request_id
    }

    fn pending_request_mut(&mut self, id: RequestId) -> StoreResult<&mut BloodRequest> {
        let request = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("request {}", id)))?;
        if request.status != RequestStatus::Pending {
            return Err(StoreError::Conflict(format!("request {} is no longer pending", id)));
        }
        Ok(request)
    }
}

/// Thread-safe store holding everything in memory.
///
/// Every operation runs under one mutex, so `apply_mutations` verifies and
/// applies a batch without any other allocation interleaving.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backing store becoming unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Snapshot of every unit, Available and Used, ordered by id.
    pub fn all_units(&self) -> StoreResult<Vec<InventoryUnit>> {
        Ok(self.state()?.units.values().cloned().collect())
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".into()));
        }
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {}", e)))
    }
}

impl InventoryStore for InMemoryStore {
    fn insert_unit(&self, unit: &NewInventoryUnit) -> StoreResult<UnitId> {
        unit.validate()?;
        let mut state = self.state()?;
        let id = state.next_unit_id();
        state
            .units
            .insert(id, unit.clone().into_unit(id, Utc::now().to_rfc3339()));
        Ok(id)
    }

    fn get_unit(&self, id: UnitId) -> StoreResult<Option<InventoryUnit>> {
        Ok(self.state()?.units.get(&id).cloned())
    }

    fn fetch_available_units(
        &self,
        blood_group: BloodGroup,
        component: ComponentType,
        as_of: NaiveDate,
    ) -> StoreResult<Vec<InventoryUnit>> {
        let mut units: Vec<InventoryUnit> = self
            .state()?
            .units
            .values()
            .filter(|u| u.matches(blood_group, component) && u.is_usable_on(as_of))
            .cloned()
            .collect();
        super::sort_fefo(&mut units);
        Ok(units)
    }

    fn apply_mutations(&self, batch: &MutationBatch) -> StoreResult<Vec<UnitId>> {
        let mut state = self.state()?;

        // Verify everything before touching anything
        state.pending_request_mut(batch.request_id)?;
        for update in &batch.unit_updates {
            let unit = state
                .units
                .get(&update.unit_id)
                .ok_or_else(|| StoreError::NotFound(format!("unit {}", update.unit_id)))?;
            if unit.status != UnitStatus::Available || unit.volume_ml != update.expected_volume_ml {
                return Err(StoreError::Conflict(format!(
                    "unit {} changed since it was read",
                    update.unit_id
                )));
            }
        }

        for update in &batch.unit_updates {
            if let Some(unit) = state.units.get_mut(&update.unit_id) {
                unit.volume_ml = update.new_volume_ml;
                unit.status = update.new_status;
            }
        }

        let now = Utc::now();
        let mut new_ids = Vec::with_capacity(batch.new_units.len());
        for new_unit in &batch.new_units {
            let id = state.next_unit_id();
            state
                .units
                .insert(id, new_unit.clone().into_unit(id, now.to_rfc3339()));
            new_ids.push(id);
        }

        let request = state.pending_request_mut(batch.request_id)?;
        request.status = RequestStatus::Fulfilled;
        request.fulfilled_at = Some(now);

        let records = batch.allocation_records(&new_ids, now);
        state.allocations.extend(records);

        Ok(new_ids)
    }
}

impl RequestStore for InMemoryStore {
    fn insert_request(&self, request: &NewRequest) -> StoreResult<RequestId> {
        request.validate()?;
        let mut state = self.state()?;
        let id = state.next_request_id();
        state.requests.insert(id, request.clone().into_request(id));
        Ok(id)
    }

    fn get_request(&self, id: RequestId) -> StoreResult<Option<BloodRequest>> {
        Ok(self.state()?.requests.get(&id).cloned())
    }

    fn fetch_pending_requests(&self, order: PendingOrder) -> StoreResult<Vec<BloodRequest>> {
        let mut pending: Vec<BloodRequest> = self
            .state()?
            .requests
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect();
        order.sort(&mut pending);
        Ok(pending)
    }

    fn mark_fulfilled(&self, id: RequestId) -> StoreResult<()> {
        let mut state = self.state()?;
        let request = state.pending_request_mut(id)?;
        request.status = RequestStatus::Fulfilled;
        request.fulfilled_at = Some(Utc::now());
        Ok(())
    }

    fn allocations_for_request(&self, id: RequestId) -> StoreResult<Vec<AllocationRecord>> {
        Ok(self
            .state()?
            .allocations
            .iter()
            .filter(|r| r.request_id == id)
            .cloned()
            .collect())
    }
}
