//! BloodVault Core Library
//!
//! Blood bank inventory, hospital request fulfillment and donor registry.
//!
//! # Architecture
//!
//! ```text
//!  Stock entry ──▶ inventory_units (Available)      Hospital ──▶ requests (Pending)
//!                          │                                        │
//!                          └──────────────┬─────────────────────────┘
//!                                         ▼
//!                            Dispatcher (request id, bounded retry)
//!                                         │
//!                                         ▼
//!                 AllocationEngine: FEFO plan ─▶ one transaction
//!                   (consume / split units, request Fulfilled, ledger rows)
//!                                         │
//!                         ┌───────────────┴───────────────┐
//!                         ▼                               ▼
//!                     Reports                      Donor alerts
//!                (stock, expiry, usage)     (bloodvault-alerts crate)
//! ```
//!
//! # Core Principle
//!
//! **No volume is created or destroyed.** A request is either allocated in
//! full inside one transaction or left untouched.
//!
//! # Modules
//!
//! - [`allocation`]: Allocation engine, store traits and in-memory store
//! - [`db`]: SQLite database layer
//! - [`dispatch`]: Request-id command dispatcher with conflict retry
//! - [`eligibility`]: Donor cooldown check
//! - [`models`]: Domain types (InventoryUnit, BloodRequest, Donor, etc.)
//! - [`reports`]: Stock, expiry, usage and donation reports
//! - [`config`] / [`logging`]: Runtime configuration and log setup

pub mod allocation;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod eligibility;
pub mod logging;
pub mod models;
pub mod reports;

// Re-export commonly used types
pub use allocation::{
    AllocationEngine, AllocationError, FulfillmentResult, InMemoryStore, InventoryStore,
    PendingOrder, RequestStore,
};
pub use config::Config;
pub use db::Database;
pub use dispatch::{BatchSummary, Command, Dispatcher};
pub use eligibility::{check_eligibility, Eligibility};
pub use models::{
    BloodGroup, BloodRequest, ComponentType, Donor, InventoryUnit, NewDonor, NewInventoryUnit,
    NewRequest, Urgency,
};
pub use reports::ReportBuilder;

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum BloodVaultError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<db::DbError> for BloodVaultError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(msg) => BloodVaultError::NotFound(msg),
            db::DbError::Invalid(e) => BloodVaultError::InvalidInput(e.to_string()),
            db::DbError::Conflict(msg) => BloodVaultError::Conflict(msg),
            other => BloodVaultError::DatabaseError(other.to_string()),
        }
    }
}

impl From<AllocationError> for BloodVaultError {
    fn from(e: AllocationError) -> Self {
        match e {
            AllocationError::InvalidRequest(msg) => BloodVaultError::InvalidInput(msg),
            AllocationError::RequestNotFound(id) => BloodVaultError::NotFound(format!("request {}", id)),
            AllocationError::Conflict(msg) => BloodVaultError::Conflict(msg),
            AllocationError::StoreUnavailable(msg) => BloodVaultError::StoreUnavailable(msg),
        }
    }
}

impl From<models::ModelError> for BloodVaultError {
    fn from(e: models::ModelError) -> Self {
        BloodVaultError::InvalidInput(e.to_string())
    }
}

impl From<serde_json::Error> for BloodVaultError {
    fn from(e: serde_json::Error) -> Self {
        BloodVaultError::SerializationError(e.to_string())
    }
}

impl From<config::ConfigError> for BloodVaultError {
    fn from(e: config::ConfigError) -> Self {
        BloodVaultError::ConfigError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for BloodVaultError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        BloodVaultError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

fn parse_ffi_date(s: &str) -> Result<NaiveDate, BloodVaultError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| BloodVaultError::InvalidInput(format!("Bad date {:?}: {}", s, e)))
}

/// The host's calendar date; expiry and eligibility are local-date rules.
fn today() -> NaiveDate {
    Local::now().date_naive()
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path with default settings.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<BloodVaultCore>, BloodVaultError> {
    let config = Config {
        database_path: path,
        ..Config::default()
    };
    BloodVaultCore::with_config(config)
}

/// Open the database described by an optional JSON config file plus
/// `BLOODVAULT_*` environment overrides.
#[uniffi::export]
pub fn open_database_from_config(config_path: Option<String>) -> Result<Arc<BloodVaultCore>, BloodVaultError> {
    let config = Config::load(config_path.as_deref().map(std::path::Path::new))?;
    BloodVaultCore::with_config(config)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<BloodVaultCore>, BloodVaultError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(BloodVaultCore {
        db: Arc::new(Mutex::new(db)),
        config: Config::default(),
    }))
}

/// Install the JSON log subscriber (idempotent).
#[uniffi::export]
pub fn enable_logging() {
    logging::init_logging();
}

/// Eligibility from a last donation date (`YYYY-MM-DD`, or none) as of `today`.
#[uniffi::export]
pub fn compute_eligibility(
    last_donation_date: Option<String>,
    today: String,
) -> Result<FfiEligibility, BloodVaultError> {
    let last = last_donation_date.as_deref().map(parse_ffi_date).transpose()?;
    Ok(check_eligibility(last, parse_ffi_date(&today)?).into())
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct BloodVaultCore {
    db: Arc<Mutex<Database>>,
    config: Config,
}

impl BloodVaultCore {
    fn with_config(config: Config) -> Result<Arc<Self>, BloodVaultError> {
        let db = Database::open_with_config(&config)?;
        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            config,
        }))
    }
}

#[uniffi::export]
impl BloodVaultCore {
    // =========================================================================
    // Inventory Operations
    // =========================================================================

    /// Record a new Available unit. Returns its id.
    pub fn add_inventory_unit(
        &self,
        component: String,
        blood_group: String,
        volume_ml: i64,
        expiry_date: String,
        donor_id: Option<i64>,
    ) -> Result<i64, BloodVaultError> {
        let mut unit = NewInventoryUnit::stock(
            component.parse()?,
            blood_group.parse()?,
            models::positive_volume(volume_ml)?,
            parse_ffi_date(&expiry_date)?,
        );
        unit.donor_id = donor_id;

        let db = self.db.lock()?;
        Ok(db.insert_unit(&unit)?)
    }

    /// Get a unit by id.
    pub fn get_inventory_unit(&self, unit_id: i64) -> Result<Option<FfiInventoryUnit>, BloodVaultError> {
        let db = self.db.lock()?;
        let unit = db.get_unit(unit_id)?;
        Ok(unit.map(|u| u.into()))
    }

    /// Administrative edit of an Available unit. Returns false for Used or unknown units.
    pub fn update_inventory_unit(
        &self,
        unit_id: i64,
        volume_ml: i64,
        expiry_date: String,
    ) -> Result<bool, BloodVaultError> {
        let volume_ml = models::positive_volume(volume_ml)?;
        let expiry_date = parse_ffi_date(&expiry_date)?;
        let db = self.db.lock()?;
        Ok(db.update_unit(unit_id, volume_ml, expiry_date)?)
    }

    /// Available, unexpired units of one pool, earliest expiry first.
    pub fn search_stock(
        &self,
        blood_group: String,
        component: String,
    ) -> Result<Vec<FfiInventoryUnit>, BloodVaultError> {
        let blood_group = blood_group.parse()?;
        let component = component.parse()?;
        let db = self.db.lock()?;
        let units = db.list_available_units(blood_group, component, today())?;
        Ok(units.into_iter().map(|u| u.into()).collect())
    }

    // =========================================================================
    // Request Operations
    // =========================================================================

    /// Submit a hospital request. Returns its id.
    pub fn submit_request(
        &self,
        hospital_name: String,
        contact: Option<String>,
        blood_group: String,
        component: String,
        volume_ml: i64,
        urgency: String,
    ) -> Result<i64, BloodVaultError> {
        let mut request = NewRequest::parse(&hospital_name, &blood_group, &component, volume_ml, &urgency)?;
        request.contact = contact.filter(|c| !c.trim().is_empty());

        let db = self.db.lock()?;
        Ok(db.insert_request(&request)?)
    }

    /// Get a request by id.
    pub fn get_request(&self, request_id: i64) -> Result<Option<FfiRequest>, BloodVaultError> {
        let db = self.db.lock()?;
        let request = db.get_request(request_id)?;
        Ok(request.map(|r| r.into()))
    }

    /// Pending requests, Emergency first when `emergency_first` is set.
    pub fn list_pending_requests(&self, emergency_first: bool) -> Result<Vec<FfiRequest>, BloodVaultError> {
        let order = if emergency_first {
            PendingOrder::Priority
        } else {
            PendingOrder::Chronological
        };
        let db = self.db.lock()?;
        let requests = db.list_pending_requests(order)?;
        Ok(requests.into_iter().map(|r| r.into()).collect())
    }

    /// Try to fulfil one request from today's stock.
    pub fn fulfill_request(&self, request_id: i64) -> Result<FfiFulfillment, BloodVaultError> {
        let db = self.db.lock()?;
        let dispatcher = Dispatcher::from_config(&*db, &self.config);
        let result = dispatcher.fulfill(request_id, today())?;
        Ok(result.into())
    }

    /// Try every Pending request in priority order.
    pub fn process_pending_requests(&self) -> Result<FfiBatchSummary, BloodVaultError> {
        let db = self.db.lock()?;
        let dispatcher = Dispatcher::from_config(&*db, &self.config);
        let summary = dispatcher.process_pending(today())?;
        Ok(summary.into())
    }

    /// Ledger entries recorded when a request was fulfilled.
    pub fn get_allocations(&self, request_id: i64) -> Result<Vec<FfiAllocation>, BloodVaultError> {
        let db = self.db.lock()?;
        let records = db.list_allocations(request_id)?;
        Ok(records.into_iter().map(|r| r.into()).collect())
    }

    // =========================================================================
    // Donor Operations
    // =========================================================================

    /// Register a donor. Returns the new id.
    pub fn add_donor(&self, donor: FfiNewDonor) -> Result<i64, BloodVaultError> {
        let new_donor = NewDonor::try_from(donor)?;
        let db = self.db.lock()?;
        Ok(db.insert_donor(&new_donor)?)
    }

    /// Get a donor by id.
    pub fn get_donor(&self, donor_id: i64) -> Result<Option<FfiDonor>, BloodVaultError> {
        let db = self.db.lock()?;
        let donor = db.get_donor(donor_id)?;
        Ok(donor.map(|d| d.into()))
    }

    /// Replace a donor's details.
    pub fn update_donor(&self, donor: FfiDonor) -> Result<(), BloodVaultError> {
        let donor = Donor::try_from(donor)?;
        let db = self.db.lock()?;
        db.update_donor(&donor)?;
        Ok(())
    }

    /// Search donors by name.
    pub fn search_donors(&self, query: String) -> Result<Vec<FfiDonor>, BloodVaultError> {
        let db = self.db.lock()?;
        let donors = db.search_donors_by_name(&query)?;
        Ok(donors.into_iter().map(|d| d.into()).collect())
    }

    /// Donors of a blood group, optionally in one city.
    pub fn list_donors_by_group(
        &self,
        blood_group: String,
        city: Option<String>,
    ) -> Result<Vec<FfiDonor>, BloodVaultError> {
        let blood_group = blood_group.parse()?;
        let db = self.db.lock()?;
        let donors = db.list_donors_by_group(blood_group, city.as_deref())?;
        Ok(donors.into_iter().map(|d| d.into()).collect())
    }

    /// Record a donation (`YYYY-MM-DD`). Returns the donation id.
    pub fn record_donation(
        &self,
        donor_id: i64,
        donation_date: String,
        volume_ml: i64,
    ) -> Result<i64, BloodVaultError> {
        let donation_date = parse_ffi_date(&donation_date)?;
        let volume_ml = models::positive_volume(volume_ml)?;
        let db = self.db.lock()?;
        Ok(db.record_donation(donor_id, donation_date, volume_ml)?)
    }

    /// Remove a donor and their donation history. Collected units stay in stock.
    pub fn delete_donor(&self, donor_id: i64) -> Result<(), BloodVaultError> {
        let db = self.db.lock()?;
        db.delete_donor(donor_id)?;
        Ok(())
    }

    /// Whether a donor may donate today.
    pub fn check_donor_eligibility(&self, donor_id: i64) -> Result<FfiEligibility, BloodVaultError> {
        let db = self.db.lock()?;
        let donor = db
            .get_donor(donor_id)?
            .ok_or_else(|| BloodVaultError::NotFound(format!("donor {}", donor_id)))?;
        Ok(donor.eligibility(today()).into())
    }

    // =========================================================================
    // Report Operations
    // =========================================================================

    /// Available stock by product type and group, as JSON.
    pub fn stock_report_json(&self) -> Result<String, BloodVaultError> {
        let db = self.db.lock()?;
        let report = ReportBuilder::new(&db).stock(today())?;
        Ok(report.to_json()?)
    }

    /// Units expiring within the configured window, as JSON.
    pub fn expiry_report_json(&self) -> Result<String, BloodVaultError> {
        let db = self.db.lock()?;
        let report = ReportBuilder::new(&db).expiring(today(), self.config.expiry_alert_days)?;
        Ok(report.to_json()?)
    }

    /// Consumed volume by product type and group, as JSON.
    pub fn usage_report_json(&self) -> Result<String, BloodVaultError> {
        let db = self.db.lock()?;
        let report = ReportBuilder::new(&db).usage()?;
        Ok(report.to_json()?)
    }

    /// Every platelet unit with shelf totals, as JSON.
    pub fn platelet_report_json(&self) -> Result<String, BloodVaultError> {
        let db = self.db.lock()?;
        let report = ReportBuilder::new(&db).platelets(today())?;
        Ok(report.to_json()?)
    }

    /// Every unit ever recorded, Used and split records included, as JSON.
    pub fn inventory_history_json(&self) -> Result<String, BloodVaultError> {
        let db = self.db.lock()?;
        let report = ReportBuilder::new(&db).history()?;
        Ok(report.to_json()?)
    }

    /// A donor's donation history and eligibility, as JSON.
    pub fn donation_history_json(&self, donor_id: i64) -> Result<String, BloodVaultError> {
        let db = self.db.lock()?;
        let history = ReportBuilder::new(&db).donation_history(donor_id, today())?;
        Ok(history.to_json()?)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe inventory unit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInventoryUnit {
    pub id: i64,
    pub component: String,
    pub blood_group: String,
    pub volume_ml: u32,
    pub expiry_date: String,
    pub status: String,
    pub donor_id: Option<i64>,
    pub split_from: Option<i64>,
}

impl From<InventoryUnit> for FfiInventoryUnit {
    fn from(unit: InventoryUnit) -> Self {
        Self {
            id: unit.id,
            component: unit.component.to_string(),
            blood_group: unit.blood_group.to_string(),
            volume_ml: unit.volume_ml,
            expiry_date: unit.expiry_date.to_string(),
            status: format!("{:?}", unit.status),
            donor_id: unit.donor_id,
            split_from: unit.split_from,
        }
    }
}

/// FFI-safe hospital request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRequest {
    pub id: i64,
    pub hospital_name: String,
    pub contact: Option<String>,
    pub blood_group: String,
    pub component: String,
    pub volume_ml: u32,
    pub urgency: String,
    pub status: String,
    pub request_time: String,
    pub fulfilled_at: Option<String>,
}

impl From<BloodRequest> for FfiRequest {
    fn from(request: BloodRequest) -> Self {
        Self {
            id: request.id,
            hospital_name: request.hospital_name,
            contact: request.contact,
            blood_group: request.blood_group.to_string(),
            component: request.component.to_string(),
            volume_ml: request.volume_ml,
            urgency: request.urgency.to_string(),
            status: format!("{:?}", request.status),
            request_time: request.request_time.to_rfc3339(),
            fulfilled_at: request.fulfilled_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// FFI-safe fulfillment outcome.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFulfillment {
    pub request_id: i64,
    pub fulfilled: bool,
    /// Used records carrying the allocated volume (empty when insufficient)
    pub consumed_unit_ids: Vec<i64>,
    pub total_volume_allocated: u32,
    /// Matching stock at the time of the attempt, when insufficient
    pub available_ml: Option<u64>,
}

impl From<FulfillmentResult> for FfiFulfillment {
    fn from(result: FulfillmentResult) -> Self {
        match result {
            FulfillmentResult::Fulfilled {
                request_id,
                units_consumed,
                total_volume_allocated,
            } => Self {
                request_id,
                fulfilled: true,
                consumed_unit_ids: units_consumed.iter().map(|u| u.unit_id).collect(),
                total_volume_allocated,
                available_ml: None,
            },
            FulfillmentResult::Insufficient {
                request_id,
                available_ml,
                ..
            } => Self {
                request_id,
                fulfilled: false,
                consumed_unit_ids: Vec::new(),
                total_volume_allocated: 0,
                available_ml: Some(available_ml),
            },
        }
    }
}

/// FFI-safe failed request from a pending sweep.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFailedRequest {
    pub request_id: i64,
    pub reason: String,
}

/// FFI-safe pending sweep summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBatchSummary {
    pub fulfilled: Vec<i64>,
    pub insufficient: Vec<i64>,
    pub failed: Vec<FfiFailedRequest>,
}

impl From<BatchSummary> for FfiBatchSummary {
    fn from(summary: BatchSummary) -> Self {
        Self {
            fulfilled: summary.fulfilled,
            insufficient: summary.insufficient,
            failed: summary
                .failed
                .into_iter()
                .map(|(request_id, reason)| FfiFailedRequest { request_id, reason })
                .collect(),
        }
    }
}

/// FFI-safe allocation ledger entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAllocation {
    pub allocation_id: String,
    pub request_id: i64,
    pub unit_id: i64,
    pub volume_ml: u32,
    pub allocated_at: String,
}

impl From<models::AllocationRecord> for FfiAllocation {
    fn from(record: models::AllocationRecord) -> Self {
        Self {
            allocation_id: record.allocation_id,
            request_id: record.request_id,
            unit_id: record.unit_id,
            volume_ml: record.volume_ml,
            allocated_at: record.allocated_at.to_rfc3339(),
        }
    }
}

/// FFI-safe donor registration form.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewDonor {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub blood_group: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub last_donation_date: Option<String>,
}

impl TryFrom<FfiNewDonor> for NewDonor {
    type Error = BloodVaultError;

    fn try_from(donor: FfiNewDonor) -> Result<Self, Self::Error> {
        let mut new_donor = NewDonor::new(donor.name, donor.age, donor.gender.parse()?, donor.blood_group.parse()?);
        new_donor.phone = donor.phone;
        new_donor.email = donor.email;
        new_donor.city = donor.city;
        new_donor.last_donation_date = donor.last_donation_date.as_deref().map(parse_ffi_date).transpose()?;
        Ok(new_donor)
    }
}

/// FFI-safe donor.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDonor {
    pub id: i64,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub blood_group: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub last_donation_date: Option<String>,
    pub registration_date: String,
}

impl From<Donor> for FfiDonor {
    fn from(donor: Donor) -> Self {
        Self {
            id: donor.id,
            name: donor.name,
            age: donor.age,
            gender: donor.gender.as_str().to_string(),
            blood_group: donor.blood_group.to_string(),
            phone: donor.phone,
            email: donor.email,
            city: donor.city,
            last_donation_date: donor.last_donation_date.map(|d| d.to_string()),
            registration_date: donor.registration_date.to_string(),
        }
    }
}

impl TryFrom<FfiDonor> for Donor {
    type Error = BloodVaultError;

    fn try_from(donor: FfiDonor) -> Result<Self, Self::Error> {
        Ok(Donor {
            id: donor.id,
            name: donor.name,
            age: donor.age,
            gender: donor.gender.parse()?,
            blood_group: donor.blood_group.parse()?,
            phone: donor.phone,
            email: donor.email,
            city: donor.city,
            last_donation_date: donor.last_donation_date.as_deref().map(parse_ffi_date).transpose()?,
            registration_date: parse_ffi_date(&donor.registration_date)?,
        })
    }
}

/// FFI-safe eligibility.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEligibility {
    pub eligible: bool,
    pub days_remaining: u32,
}

impl From<Eligibility> for FfiEligibility {
    fn from(e: Eligibility) -> Self {
        Self {
            eligible: e.eligible,
            days_remaining: e.days_remaining,
        }
    }
}
