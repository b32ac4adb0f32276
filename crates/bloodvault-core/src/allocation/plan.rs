//! Pure FEFO allocation planning.
//!
//! Planning never touches a store. It turns a request and a snapshot of
//! candidate units into a [`MutationBatch`] that a store applies atomically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    AllocationRecord, BloodRequest, InventoryUnit, NewInventoryUnit, RequestId, UnitId, UnitStatus,
};

/// Change to an existing unit, guarded by the volume observed at read time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitUpdate {
    pub unit_id: UnitId,
    /// Volume the unit had when candidates were read; the store refuses the
    /// update if the unit no longer has exactly this volume and status Available.
    pub expected_volume_ml: u32,
    pub new_volume_ml: u32,
    pub new_status: UnitStatus,
}

impl UnitUpdate {
    /// Whole unit handed over (status flip, volume unchanged).
    pub fn consumes_whole(&self) -> bool {
        self.new_status == UnitStatus::Used
    }
}

/// Everything one successful allocation writes, applied as a single transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationBatch {
    /// Request flipped Pending -> Fulfilled in the same transaction
    pub request_id: RequestId,
    pub unit_updates: Vec<UnitUpdate>,
    /// Used records carved out of split units
    pub new_units: Vec<NewInventoryUnit>,
}

impl MutationBatch {
    /// Total volume moved to Used by this batch.
    pub fn allocated_volume(&self) -> u64 {
        let whole: u64 = self
            .unit_updates
            .iter()
            .filter(|u| u.consumes_whole())
            .map(|u| u64::from(u.new_volume_ml))
            .sum();
        let split: u64 = self.new_units.iter().map(|u| u64::from(u.volume_ml)).sum();
        whole + split
    }

    /// Ledger rows for this batch, given the ids the store assigned to `new_units`.
    pub fn allocation_records(&self, new_unit_ids: &[UnitId], at: DateTime<Utc>) -> Vec<AllocationRecord> {
        let whole = self
            .unit_updates
            .iter()
            .filter(|u| u.consumes_whole())
            .map(|u| AllocationRecord::new(self.request_id, u.unit_id, u.new_volume_ml, at));
        let split = self
            .new_units
            .iter()
            .zip(new_unit_ids)
            .map(|(u, id)| AllocationRecord::new(self.request_id, *id, u.volume_ml, at));
        whole.chain(split).collect()
    }
}

/// Planner verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum AllocationPlan {
    /// Matching stock cannot cover the request; nothing should change.
    Insufficient { available_ml: u64, requested_ml: u32 },
    /// Apply this batch to fulfil the request.
    Allocate(MutationBatch),
}

/// Sort units earliest-expiry-first, ties broken by ascending id.
pub fn sort_fefo(units: &mut [InventoryUnit]) {
    units.sort_by_key(|u| (u.expiry_date, u.id));
}

/// Plan the allocation of `request` against `candidates`.
///
/// Candidates are assumed to be Available, unexpired, and of the request's
/// group and type; the planner does not filter them again.
pub fn plan_allocation(request: &BloodRequest, candidates: &[InventoryUnit]) -> AllocationPlan {
    let total_available: u64 = candidates.iter().map(|u| u64::from(u.volume_ml)).sum();
    if total_available < u64::from(request.volume_ml) {
        return AllocationPlan::Insufficient {
            available_ml: total_available,
            requested_ml: request.volume_ml,
        };
    }

    let mut ordered: Vec<&InventoryUnit> = candidates.iter().collect();
    ordered.sort_by_key(|u| (u.expiry_date, u.id));

    let mut unit_updates = Vec::new();
    let mut new_units = Vec::new();
    let mut remaining = request.volume_ml;

    for unit in ordered {
        if remaining == 0 {
            break;
        }

        if unit.volume_ml <= remaining {
            unit_updates.push(UnitUpdate {
                unit_id: unit.id,
                expected_volume_ml: unit.volume_ml,
                new_volume_ml: unit.volume_ml,
                new_status: UnitStatus::Used,
            });
            remaining -= unit.volume_ml;
        } else {
            // Split: leftover stays on the original row, consumed part gets its own Used row
            unit_updates.push(UnitUpdate {
                unit_id: unit.id,
                expected_volume_ml: unit.volume_ml,
                new_volume_ml: unit.volume_ml - remaining,
                new_status: UnitStatus::Available,
            });
            new_units.push(NewInventoryUnit {
                component: unit.component,
                blood_group: unit.blood_group,
                volume_ml: remaining,
                expiry_date: unit.expiry_date,
                status: UnitStatus::Used,
                donor_id: unit.donor_id,
                split_from: Some(unit.id),
            });
            remaining = 0;
        }
    }

    AllocationPlan::Allocate(MutationBatch {
        request_id: request.id,
        unit_updates,
        new_units,
    })
}
