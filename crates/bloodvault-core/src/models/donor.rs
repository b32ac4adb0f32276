//! Donor models.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{BloodGroup, ModelError};
use crate::eligibility::{check_eligibility, Eligibility};

/// Store-assigned donor identifier.
pub type DonorId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "O",
        }
    }
}

impl FromStr for Gender {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "M" | "MALE" => Ok(Gender::Male),
            "F" | "FEMALE" => Ok(Gender::Female),
            "O" | "OTHER" => Ok(Gender::Other),
            _ => Err(ModelError::UnknownGender(s.to_string())),
        }
    }
}

/// A registered donor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Donor {
    /// Store-assigned identifier
    pub id: DonorId,
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub blood_group: BloodGroup,
    /// Phone number as entered (normalized only when messaging)
    pub phone: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    /// Most recent donation, drives the cooldown
    pub last_donation_date: Option<NaiveDate>,
    pub registration_date: NaiveDate,
}

impl Donor {
    /// Eligibility to donate again on `today`.
    pub fn eligibility(&self, today: NaiveDate) -> Eligibility {
        check_eligibility(self.last_donation_date, today)
    }

    /// Whether the donor has a phone number to message.
    pub fn is_reachable(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

/// A donor about to be registered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDonor {
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub blood_group: BloodGroup,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub last_donation_date: Option<NaiveDate>,
    pub registration_date: NaiveDate,
}

impl NewDonor {
    pub fn new(name: impl Into<String>, age: u32, gender: Gender, blood_group: BloodGroup) -> Self {
        Self {
            name: name.into(),
            age,
            gender,
            blood_group,
            phone: None,
            email: None,
            city: None,
            last_donation_date: None,
            registration_date: chrono::Utc::now().date_naive(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::MissingField("name"));
        }
        Ok(())
    }

    pub fn into_donor(self, id: DonorId) -> Donor {
        Donor {
            id,
            name: self.name,
            age: self.age,
            gender: self.gender,
            blood_group: self.blood_group,
            phone: self.phone,
            email: self.email,
            city: self.city,
            last_donation_date: self.last_donation_date,
            registration_date: self.registration_date,
        }
    }
}

/// One entry of a donor's donation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Donation {
    pub id: i64,
    pub donor_id: DonorId,
    pub donation_date: NaiveDate,
    pub volume_ml: u32,
}
