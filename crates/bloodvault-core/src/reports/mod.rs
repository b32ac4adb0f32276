//! Reports over inventory and the donor registry.

mod stock;

pub use stock::*;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::db::{Database, DbError, DbResult};
use crate::eligibility::Eligibility;
use crate::models::{ComponentType, Donation, Donor, DonorId};

/// A donor with their donation history and current eligibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DonationHistory {
    pub donor: Donor,
    pub eligibility: Eligibility,
    /// Most recent first
    pub donations: Vec<Donation>,
    pub total_donated_ml: u64,
}

impl DonationHistory {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Builds reports from the database.
pub struct ReportBuilder<'a> {
    db: &'a Database,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn stock(&self, as_of: NaiveDate) -> DbResult<StockReport> {
        Ok(StockReport::new(as_of, self.db.stock_summary(as_of)?))
    }

    /// Available units expiring within `window_days` of `as_of`, expired ones included.
    pub fn expiring(&self, as_of: NaiveDate, window_days: u32) -> DbResult<ExpiryReport> {
        let until = as_of + Duration::days(i64::from(window_days));
        let units = self.db.list_expiring_units(until)?;
        Ok(ExpiryReport::new(as_of, window_days, units))
    }

    pub fn usage(&self) -> DbResult<UsageReport> {
        Ok(UsageReport::new(self.db.usage_summary()?))
    }

    pub fn platelets(&self, as_of: NaiveDate) -> DbResult<PlateletReport> {
        let units = self.db.list_units_by_component(ComponentType::Platelet)?;
        Ok(PlateletReport::new(as_of, units))
    }

    /// Every unit, Available and Used, with split records.
    pub fn history(&self) -> DbResult<InventoryHistoryReport> {
        Ok(InventoryHistoryReport::new(self.db.list_all_units()?))
    }

    pub fn donation_history(&self, donor_id: DonorId, today: NaiveDate) -> DbResult<DonationHistory> {
        let donor = self
            .db
            .get_donor(donor_id)?
            .ok_or_else(|| DbError::NotFound(format!("donor {}", donor_id)))?;
        let donations = self.db.list_donations(donor_id)?;
        let total_donated_ml = donations.iter().map(|d| u64::from(d.volume_ml)).sum();

        Ok(DonationHistory {
            eligibility: donor.eligibility(today),
            donor,
            donations,
            total_donated_ml,
        })
    }
}
