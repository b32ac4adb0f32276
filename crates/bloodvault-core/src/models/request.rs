//! Hospital request models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BloodGroup, ComponentType, ModelError};

/// Store-assigned request identifier.
pub type RequestId = i64;

/// How urgently the hospital needs the product.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Urgency {
    Normal,
    Emergency,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Normal => "Normal",
            Urgency::Emergency => "Emergency",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(Urgency::Normal),
            "emergency" => Ok(Urgency::Emergency),
            _ => Err(ModelError::UnknownUrgency(s.to_string())),
        }
    }
}

/// Request status. Only ever moves Pending -> Fulfilled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    Pending,
    Fulfilled,
}

/// A hospital's request for a blood product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BloodRequest {
    /// Store-assigned identifier
    pub id: RequestId,
    /// Requesting hospital
    pub hospital_name: String,
    /// Contact number at the hospital
    pub contact: Option<String>,
    /// Requested blood group (exact match only)
    pub blood_group: BloodGroup,
    /// Requested product type
    pub component: ComponentType,
    /// Requested volume in millilitres
    pub volume_ml: u32,
    /// Urgency (affects processing order, never matching)
    pub urgency: Urgency,
    /// Current status
    pub status: RequestStatus,
    /// Submission time
    pub request_time: DateTime<Utc>,
    /// When allocation succeeded
    pub fulfilled_at: Option<DateTime<Utc>>,
}

impl BloodRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// A request about to be submitted (no id yet).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewRequest {
    pub hospital_name: String,
    pub contact: Option<String>,
    pub blood_group: BloodGroup,
    pub component: ComponentType,
    pub volume_ml: u32,
    pub urgency: Urgency,
    pub request_time: DateTime<Utc>,
}

impl NewRequest {
    /// Create a Normal-urgency request stamped with the current time.
    pub fn new(
        hospital_name: impl Into<String>,
        blood_group: BloodGroup,
        component: ComponentType,
        volume_ml: u32,
    ) -> Self {
        Self {
            hospital_name: hospital_name.into(),
            contact: None,
            blood_group,
            component,
            volume_ml,
            urgency: Urgency::Normal,
            request_time: Utc::now(),
        }
    }

    /// Build a request from raw form input, rejecting unknown groups,
    /// unknown product types and non-positive volumes.
    pub fn parse(
        hospital_name: &str,
        blood_group: &str,
        component: &str,
        volume_ml: i64,
        urgency: &str,
    ) -> Result<Self, ModelError> {
        let volume_ml = positive_volume(volume_ml)?;
        let mut request = NewRequest::new(
            hospital_name.trim(),
            blood_group.parse()?,
            component.parse()?,
            volume_ml,
        );
        request.urgency = urgency.parse()?;
        Ok(request)
    }

    pub fn emergency(mut self) -> Self {
        self.urgency = Urgency::Emergency;
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn at(mut self, request_time: DateTime<Utc>) -> Self {
        self.request_time = request_time;
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.volume_ml == 0 {
            return Err(ModelError::InvalidVolume(0));
        }
        if self.hospital_name.trim().is_empty() {
            return Err(ModelError::MissingField("hospital_name"));
        }
        Ok(())
    }

    /// Materialize as a Pending request with a store-assigned id.
    pub fn into_request(self, id: RequestId) -> BloodRequest {
        BloodRequest {
            id,
            hospital_name: self.hospital_name,
            contact: self.contact,
            blood_group: self.blood_group,
            component: self.component,
            volume_ml: self.volume_ml,
            urgency: self.urgency,
            status: RequestStatus::Pending,
            request_time: self.request_time,
            fulfilled_at: None,
        }
    }
}

/// Convert a signed volume from an outer layer into a positive millilitre count.
pub fn positive_volume(volume_ml: i64) -> Result<u32, ModelError> {
    if volume_ml <= 0 {
        return Err(ModelError::InvalidVolume(volume_ml));
    }
    u32::try_from(volume_ml).map_err(|_| ModelError::InvalidVolume(volume_ml))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_form_input() {
        let request = NewRequest::parse("City Hospital", "b-", "plasma", 400, "emergency").unwrap();
        assert_eq!(request.blood_group, BloodGroup::BNeg);
        assert_eq!(request.component, ComponentType::Plasma);
        assert_eq!(request.volume_ml, 400);
        assert_eq!(request.urgency, Urgency::Emergency);
    }

    #[test]
    fn test_parse_rejects_bad_volume() {
        assert!(matches!(
            NewRequest::parse("City Hospital", "A+", "Blood", 0, "Normal"),
            Err(ModelError::InvalidVolume(0))
        ));
        assert!(matches!(
            NewRequest::parse("City Hospital", "A+", "Blood", -50, "Normal"),
            Err(ModelError::InvalidVolume(-50))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_group_and_type() {
        assert!(matches!(
            NewRequest::parse("City Hospital", "Z+", "Blood", 100, "Normal"),
            Err(ModelError::UnknownBloodGroup(_))
        ));
        assert!(matches!(
            NewRequest::parse("City Hospital", "A+", "Serum", 100, "Normal"),
            Err(ModelError::UnknownComponent(_))
        ));
    }

    #[test]
    fn test_validate_requires_hospital() {
        let request = NewRequest::new("  ", BloodGroup::OPos, ComponentType::Blood, 100);
        assert!(matches!(request.validate(), Err(ModelError::MissingField(_))));
    }

    #[test]
    fn test_new_request_is_pending() {
        let request = NewRequest::new("General", BloodGroup::OPos, ComponentType::Blood, 100)
            .into_request(7);
        assert!(request.is_pending());
        assert!(request.fulfilled_at.is_none());
    }
}
