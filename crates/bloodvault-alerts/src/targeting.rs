//! Selecting which donors get which message.

use bloodvault_core::{BloodGroup, Config, Database, Donor};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::phone::normalize_phone;
use crate::templates::{emergency_message, reminder_message};
use crate::AlertResult;

/// Why a message is being sent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlertKind {
    Emergency,
    Reminder,
}

/// A message ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutgoingMessage {
    pub donor_id: i64,
    pub kind: AlertKind,
    /// International form
    pub phone: String,
    pub body: String,
}

/// Donors who may donate today and can be messaged.
pub fn emergency_candidates(donors: &[Donor], today: NaiveDate) -> Vec<&Donor> {
    donors
        .iter()
        .filter(|d| d.is_reachable() && d.eligibility(today).eligible)
        .collect()
}

/// Donors whose cooldown ends within `window_days`, with the days left.
pub fn reminder_candidates(donors: &[Donor], today: NaiveDate, window_days: u32) -> Vec<(&Donor, u32)> {
    donors
        .iter()
        .filter(|d| d.is_reachable())
        .filter_map(|d| {
            let eligibility = d.eligibility(today);
            eligibility
                .eligible_within(window_days)
                .then_some((d, eligibility.days_remaining))
        })
        .collect()
}

/// Builds alert messages from the donor registry.
pub struct AlertPlanner<'a> {
    db: &'a Database,
    config: &'a Config,
}

impl<'a> AlertPlanner<'a> {
    pub fn new(db: &'a Database, config: &'a Config) -> Self {
        Self { db, config }
    }

    /// Urgent-need messages for eligible donors of `blood_group`, optionally in one city.
    pub fn emergency_alerts(
        &self,
        blood_group: BloodGroup,
        city: Option<&str>,
        today: NaiveDate,
    ) -> AlertResult<Vec<OutgoingMessage>> {
        let donors = self.db.list_donors_by_group(blood_group, city)?;
        let messages = emergency_candidates(&donors, today)
            .into_iter()
            .filter_map(|d| {
                self.message_for(d, AlertKind::Emergency, emergency_message(&d.name, blood_group, city))
            })
            .collect::<Vec<_>>();

        debug!(
            blood_group = %blood_group,
            donors = donors.len(),
            messages = messages.len(),
            "emergency alerts planned"
        );
        Ok(messages)
    }

    /// Reminders for donors who become eligible within the configured window.
    pub fn reminders(&self, today: NaiveDate) -> AlertResult<Vec<OutgoingMessage>> {
        let donors = self.db.list_donors_with_donations()?;
        let messages = reminder_candidates(&donors, today, self.config.reminder_window_days)
            .into_iter()
            .filter_map(|(d, days)| self.message_for(d, AlertKind::Reminder, reminder_message(&d.name, days)))
            .collect::<Vec<_>>();

        debug!(donors = donors.len(), messages = messages.len(), "reminders planned");
        Ok(messages)
    }

    fn message_for(&self, donor: &Donor, kind: AlertKind, body: String) -> Option<OutgoingMessage> {
        let raw = donor.phone.as_deref()?;
        match normalize_phone(raw, &self.config.phone_country_code) {
            Ok(phone) => Some(OutgoingMessage {
                donor_id: donor.id,
                kind,
                phone,
                body,
            }),
            Err(e) => {
                warn!(donor_id = donor.id, error = %e, "donor skipped");
                None
            }
        }
    }
}
