//! Request-id command dispatch.
//!
//! Hosts refer to requests only by id. The dispatcher turns an id into a
//! fulfillment attempt against the injected store, retrying a bounded number
//! of times when a concurrent allocation invalidated the candidates it read.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::allocation::{
    AllocationEngine, AllocationError, AllocationResult, FulfillmentResult, InventoryStore,
    PendingOrder, RequestStore,
};
use crate::config::Config;
use crate::models::RequestId;

/// A host action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Command {
    /// Fulfil one request
    Fulfill { request_id: RequestId },
    /// Try every Pending request, Emergency first then oldest
    ProcessPending,
}

/// Result of dispatching a [`Command`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DispatchOutcome {
    Single(FulfillmentResult),
    Batch(BatchSummary),
}

/// What happened to each request during a pending sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchSummary {
    pub fulfilled: Vec<RequestId>,
    /// Still Pending for lack of stock
    pub insufficient: Vec<RequestId>,
    /// Skipped with the reason (conflicts after retries, invalid requests)
    pub failed: Vec<(RequestId, String)>,
}

impl BatchSummary {
    pub fn attempted(&self) -> usize {
        self.fulfilled.len() + self.insufficient.len() + self.failed.len()
    }
}

/// Dispatches fulfillment commands by request id.
pub struct Dispatcher<'a, S> {
    store: &'a S,
    max_attempts: u32,
}

impl<'a, S> Dispatcher<'a, S>
where
    S: InventoryStore + RequestStore,
{
    /// `max_attempts` is clamped to at least one.
    pub fn new(store: &'a S, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(store: &'a S, config: &Config) -> Self {
        Self::new(store, config.max_fulfill_attempts)
    }

    pub fn dispatch(&self, command: Command, today: NaiveDate) -> AllocationResult<DispatchOutcome> {
        match command {
            Command::Fulfill { request_id } => self.fulfill(request_id, today).map(DispatchOutcome::Single),
            Command::ProcessPending => self.process_pending(today).map(DispatchOutcome::Batch),
        }
    }

    /// Fulfil one request, re-reading candidates after each conflict.
    pub fn fulfill(&self, request_id: RequestId, today: NaiveDate) -> AllocationResult<FulfillmentResult> {
        let engine = AllocationEngine::new(self.store);
        let mut attempt = 1;
        loop {
            match engine.fulfill(request_id, today) {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(request_id, attempt, error = %e, "allocation conflict, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Sweep every Pending request in priority order.
    ///
    /// Per-request failures are collected in the summary; a store outage
    /// stops the sweep.
    pub fn process_pending(&self, today: NaiveDate) -> AllocationResult<BatchSummary> {
        let pending = self.store.fetch_pending_requests(PendingOrder::Priority)?;
        let mut summary = BatchSummary::default();

        for request in pending {
            match self.fulfill(request.id, today) {
                Ok(FulfillmentResult::Fulfilled { .. }) => summary.fulfilled.push(request.id),
                Ok(FulfillmentResult::Insufficient { .. }) => summary.insufficient.push(request.id),
                Err(AllocationError::StoreUnavailable(msg)) => {
                    return Err(AllocationError::StoreUnavailable(msg));
                }
                Err(e) => {
                    warn!(request_id = request.id, error = %e, "request skipped");
                    summary.failed.push((request.id, e.to_string()));
                }
            }
        }

        info!(
            fulfilled = summary.fulfilled.len(),
            insufficient = summary.insufficient.len(),
            failed = summary.failed.len(),
            "pending requests processed"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{InMemoryStore, MutationBatch, StoreResult};
    use crate::models::{
        BloodGroup, BloodRequest, ComponentType, InventoryUnit, NewInventoryUnit, NewRequest,
        UnitId,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add_stock(store: &InMemoryStore, group: BloodGroup, volume: u32) {
        store
            .insert_unit(&NewInventoryUnit::stock(
                ComponentType::Blood,
                group,
                volume,
                date(2025, 6, 1),
            ))
            .unwrap();
    }

    /// Store that reports a conflict for the first `conflicts` apply calls.
    struct FlakyStore {
        inner: InMemoryStore,
        conflicts: AtomicU32,
    }

    impl InventoryStore for FlakyStore {
        fn insert_unit(&self, unit: &NewInventoryUnit) -> StoreResult<UnitId> {
            self.inner.insert_unit(unit)
        }

        fn get_unit(&self, id: UnitId) -> StoreResult<Option<InventoryUnit>> {
            self.inner.get_unit(id)
        }

        fn fetch_available_units(
            &self,
            blood_group: BloodGroup,
            component: ComponentType,
            as_of: NaiveDate,
        ) -> StoreResult<Vec<InventoryUnit>> {
            self.inner.fetch_available_units(blood_group, component, as_of)
        }

        fn apply_mutations(&self, batch: &MutationBatch) -> StoreResult<Vec<UnitId>> {
            let left = self.conflicts.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts.store(left - 1, Ordering::SeqCst);
                return Err(crate::allocation::StoreError::Conflict("simulated".into()));
            }
            self.inner.apply_mutations(batch)
        }
    }

    impl RequestStore for FlakyStore {
        fn insert_request(&self, request: &NewRequest) -> StoreResult<RequestId> {
            self.inner.insert_request(request)
        }

        fn get_request(&self, id: RequestId) -> StoreResult<Option<BloodRequest>> {
            self.inner.get_request(id)
        }

        fn fetch_pending_requests(&self, order: PendingOrder) -> StoreResult<Vec<BloodRequest>> {
            self.inner.fetch_pending_requests(order)
        }

        fn mark_fulfilled(&self, id: RequestId) -> StoreResult<()> {
            self.inner.mark_fulfilled(id)
        }

        fn allocations_for_request(&self, id: RequestId) -> StoreResult<Vec<crate::models::AllocationRecord>> {
            self.inner.allocations_for_request(id)
        }
    }

    fn flaky(conflicts: u32) -> (FlakyStore, RequestId) {
        let store = FlakyStore {
            inner: InMemoryStore::new(),
            conflicts: AtomicU32::new(conflicts),
        };
        add_stock(&store.inner, BloodGroup::APos, 500);
        let id = store
            .insert_request(&NewRequest::new("General", BloodGroup::APos, ComponentType::Blood, 100))
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_retry_recovers_from_conflict() {
        let (store, id) = flaky(2);
        let result = Dispatcher::new(&store, 3).fulfill(id, date(2025, 1, 1)).unwrap();
        assert!(result.is_fulfilled());
    }

    #[test]
    fn test_retry_is_bounded() {
        let (store, id) = flaky(3);
        let err = Dispatcher::new(&store, 3).fulfill(id, date(2025, 1, 1)).unwrap_err();
        assert!(matches!(err, AllocationError::Conflict(_)));
        assert!(store.get_request(id).unwrap().unwrap().is_pending());
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let (store, id) = flaky(0);
        let result = Dispatcher::new(&store, 0).fulfill(id, date(2025, 1, 1)).unwrap();
        assert!(result.is_fulfilled());
    }

    #[test]
    fn test_dispatch_single() {
        let store = InMemoryStore::new();
        add_stock(&store, BloodGroup::OPos, 300);
        let id = store
            .insert_request(&NewRequest::new("General", BloodGroup::OPos, ComponentType::Blood, 300))
            .unwrap();

        let outcome = Dispatcher::from_config(&store, &Config::default())
            .dispatch(Command::Fulfill { request_id: id }, date(2025, 1, 1))
            .unwrap();
        let DispatchOutcome::Single(result) = outcome else {
            panic!("expected single outcome");
        };
        assert_eq!(result.request_id(), id);
        assert!(result.is_fulfilled());
    }

    #[test]
    fn test_unknown_request_is_not_retried() {
        let store = InMemoryStore::new();
        let err = Dispatcher::new(&store, 3).fulfill(12, date(2025, 1, 1)).unwrap_err();
        assert!(matches!(err, AllocationError::RequestNotFound(12)));
    }

    #[test]
    fn test_process_pending_serves_emergency_first() {
        let store = InMemoryStore::new();
        add_stock(&store, BloodGroup::ONeg, 300);
        let t0 = chrono::Utc::now();
        let normal = store
            .insert_request(
                &NewRequest::new("A", BloodGroup::ONeg, ComponentType::Blood, 300)
                    .at(t0 - chrono::Duration::hours(2)),
            )
            .unwrap();
        let emergency = store
            .insert_request(
                &NewRequest::new("B", BloodGroup::ONeg, ComponentType::Blood, 300)
                    .emergency()
                    .at(t0),
            )
            .unwrap();

        let outcome = Dispatcher::new(&store, 3)
            .dispatch(Command::ProcessPending, date(2025, 1, 1))
            .unwrap();
        let DispatchOutcome::Batch(summary) = outcome else {
            panic!("expected batch outcome");
        };

        assert_eq!(summary.fulfilled, vec![emergency]);
        assert_eq!(summary.insufficient, vec![normal]);
        assert!(summary.failed.is_empty());
        assert_eq!(summary.attempted(), 2);
    }

    #[test]
    fn test_process_pending_stops_on_outage() {
        let store = InMemoryStore::new();
        store
            .insert_request(&NewRequest::new("A", BloodGroup::ONeg, ComponentType::Blood, 300))
            .unwrap();
        store.set_offline(true);

        let err = Dispatcher::new(&store, 3).process_pending(date(2025, 1, 1)).unwrap_err();
        assert!(matches!(err, AllocationError::StoreUnavailable(_)));
    }
}
