//! Inventory unit models.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ModelError;

/// Store-assigned inventory unit identifier.
pub type UnitId = i64;

/// ABO/Rh blood group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APos,
    #[serde(rename = "A-")]
    ANeg,
    #[serde(rename = "B+")]
    BPos,
    #[serde(rename = "B-")]
    BNeg,
    #[serde(rename = "AB+")]
    AbPos,
    #[serde(rename = "AB-")]
    AbNeg,
    #[serde(rename = "O+")]
    OPos,
    #[serde(rename = "O-")]
    ONeg,
}

impl BloodGroup {
    /// Every group, in display order.
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::APos,
        BloodGroup::ANeg,
        BloodGroup::BPos,
        BloodGroup::BNeg,
        BloodGroup::AbPos,
        BloodGroup::AbNeg,
        BloodGroup::OPos,
        BloodGroup::ONeg,
    ];

    /// Conventional label, e.g. "AB-".
    pub fn as_str(&self) -> &'static str {
        match self {
            BloodGroup::APos => "A+",
            BloodGroup::ANeg => "A-",
            BloodGroup::BPos => "B+",
            BloodGroup::BNeg => "B-",
            BloodGroup::AbPos => "AB+",
            BloodGroup::AbNeg => "AB-",
            BloodGroup::OPos => "O+",
            BloodGroup::ONeg => "O-",
        }
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodGroup {
    type Err = ModelError;

    /// Accepts labels in any case with surrounding whitespace ("ab+ " -> AB+).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        BloodGroup::ALL
            .iter()
            .copied()
            .find(|g| g.as_str() == normalized)
            .ok_or_else(|| ModelError::UnknownBloodGroup(s.to_string()))
    }
}

/// Kind of blood product held in a unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentType {
    Blood,
    Plasma,
    Platelet,
}

impl ComponentType {
    /// Every component type, in display order.
    pub const ALL: [ComponentType; 3] = [
        ComponentType::Blood,
        ComponentType::Plasma,
        ComponentType::Platelet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Blood => "Blood",
            ComponentType::Plasma => "Plasma",
            ComponentType::Platelet => "Platelet",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "blood" => Ok(ComponentType::Blood),
            "plasma" => Ok(ComponentType::Plasma),
            "platelet" | "platelets" => Ok(ComponentType::Platelet),
            _ => Err(ModelError::UnknownComponent(s.to_string())),
        }
    }
}

/// Inventory unit status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UnitStatus {
    /// On the shelf, may be allocated
    Available,
    /// Consumed by a fulfilled request (terminal)
    Used,
}

/// A single inventory record of blood, plasma or platelets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryUnit {
    /// Store-assigned identifier (also the FEFO tiebreaker)
    pub id: UnitId,
    /// Product type
    pub component: ComponentType,
    /// Blood group
    pub blood_group: BloodGroup,
    /// Volume in millilitres; for Used records, the amount consumed
    pub volume_ml: u32,
    /// Last day the unit may be issued
    pub expiry_date: NaiveDate,
    /// Current status
    pub status: UnitStatus,
    /// Donor the stock came from, if recorded
    pub donor_id: Option<i64>,
    /// For Used split records: the unit this portion was carved from
    pub split_from: Option<UnitId>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
}

impl InventoryUnit {
    /// Whether the unit can still be issued on `as_of`.
    pub fn is_usable_on(&self, as_of: NaiveDate) -> bool {
        self.status == UnitStatus::Available && self.expiry_date >= as_of
    }

    /// Whether the unit belongs to the given pool.
    pub fn matches(&self, blood_group: BloodGroup, component: ComponentType) -> bool {
        self.blood_group == blood_group && self.component == component
    }
}

/// A unit about to be written to the store (no id yet).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewInventoryUnit {
    pub component: ComponentType,
    pub blood_group: BloodGroup,
    pub volume_ml: u32,
    pub expiry_date: NaiveDate,
    pub status: UnitStatus,
    pub donor_id: Option<i64>,
    pub split_from: Option<UnitId>,
}

impl NewInventoryUnit {
    /// Stock entry: a fresh Available unit.
    pub fn stock(
        component: ComponentType,
        blood_group: BloodGroup,
        volume_ml: u32,
        expiry_date: NaiveDate,
    ) -> Self {
        Self {
            component,
            blood_group,
            volume_ml,
            expiry_date,
            status: UnitStatus::Available,
            donor_id: None,
            split_from: None,
        }
    }

    /// Attach the donor the stock came from.
    pub fn with_donor(mut self, donor_id: i64) -> Self {
        self.donor_id = Some(donor_id);
        self
    }

    /// Reject records that would break the unit invariants.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.volume_ml == 0 {
            return Err(ModelError::InvalidVolume(0));
        }
        Ok(())
    }

    /// Materialize with a store-assigned id.
    pub fn into_unit(self, id: UnitId, created_at: String) -> InventoryUnit {
        InventoryUnit {
            id,
            component: self.component,
            blood_group: self.blood_group,
            volume_ml: self.volume_ml,
            expiry_date: self.expiry_date,
            status: self.status,
            donor_id: self.donor_id,
            split_from: self.split_from,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blood_group_parsing() {
        assert_eq!("A+".parse::<BloodGroup>().unwrap(), BloodGroup::APos);
        assert_eq!(" ab- ".parse::<BloodGroup>().unwrap(), BloodGroup::AbNeg);
        assert_eq!("o-".parse::<BloodGroup>().unwrap(), BloodGroup::ONeg);
        assert!("C+".parse::<BloodGroup>().is_err());
        assert!("A".parse::<BloodGroup>().is_err());
    }

    #[test]
    fn test_blood_group_labels_round_trip() {
        for group in BloodGroup::ALL {
            assert_eq!(group.as_str().parse::<BloodGroup>().unwrap(), group);
        }
    }

    #[test]
    fn test_component_parsing() {
        assert_eq!("plasma".parse::<ComponentType>().unwrap(), ComponentType::Plasma);
        assert_eq!("Blood".parse::<ComponentType>().unwrap(), ComponentType::Blood);
        assert_eq!("PLATELETS".parse::<ComponentType>().unwrap(), ComponentType::Platelet);
        assert!("serum".parse::<ComponentType>().is_err());
    }

    #[test]
    fn test_serde_uses_labels() {
        let json = serde_json::to_string(&BloodGroup::AbPos).unwrap();
        assert_eq!(json, "\"AB+\"");
        let group: BloodGroup = serde_json::from_str("\"O-\"").unwrap();
        assert_eq!(group, BloodGroup::ONeg);
    }

    #[test]
    fn test_usable_on() {
        let expiry = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let unit = NewInventoryUnit::stock(ComponentType::Blood, BloodGroup::APos, 450, expiry)
            .into_unit(1, String::new());

        assert!(unit.is_usable_on(expiry));
        assert!(unit.is_usable_on(expiry.pred_opt().unwrap()));
        assert!(!unit.is_usable_on(expiry.succ_opt().unwrap()));

        let mut used = unit.clone();
        used.status = UnitStatus::Used;
        assert!(!used.is_usable_on(expiry));
    }

    #[test]
    fn test_zero_volume_rejected() {
        let expiry = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let unit = NewInventoryUnit::stock(ComponentType::Plasma, BloodGroup::BNeg, 0, expiry);
        assert!(matches!(unit.validate(), Err(ModelError::InvalidVolume(0))));
    }
}
