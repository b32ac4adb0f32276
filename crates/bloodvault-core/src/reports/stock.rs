//! Inventory reports.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{BloodGroup, ComponentType, InventoryUnit, UnitId, UnitStatus};

/// Available, unexpired stock of one product type and group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockLine {
    pub component: ComponentType,
    pub blood_group: BloodGroup,
    pub total_volume_ml: u64,
    pub unit_count: u32,
}

/// Consumed volume of one product type and group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageLine {
    pub component: ComponentType,
    pub blood_group: BloodGroup,
    pub used_volume_ml: u64,
}

/// Stock on hand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockReport {
    pub as_of: NaiveDate,
    pub lines: Vec<StockLine>,
    pub total_volume_ml: u64,
}

impl StockReport {
    pub fn new(as_of: NaiveDate, lines: Vec<StockLine>) -> Self {
        let total_volume_ml = lines.iter().map(|l| l.total_volume_ml).sum();
        Self {
            as_of,
            lines,
            total_volume_ml,
        }
    }

    /// Volume on hand for one pool (0 when absent).
    pub fn volume_of(&self, component: ComponentType, blood_group: BloodGroup) -> u64 {
        self.lines
            .iter()
            .find(|l| l.component == component && l.blood_group == blood_group)
            .map(|l| l.total_volume_ml)
            .unwrap_or(0)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// An Available unit close to (or past) its expiry date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpiringUnit {
    pub unit: InventoryUnit,
    /// Negative once expired
    pub days_to_expiry: i64,
}

/// Units needing attention before they expire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpiryReport {
    pub as_of: NaiveDate,
    pub window_days: u32,
    pub units: Vec<ExpiringUnit>,
}

impl ExpiryReport {
    pub fn new(as_of: NaiveDate, window_days: u32, units: Vec<InventoryUnit>) -> Self {
        let units = units
            .into_iter()
            .map(|unit| ExpiringUnit {
                days_to_expiry: (unit.expiry_date - as_of).num_days(),
                unit,
            })
            .collect();
        Self {
            as_of,
            window_days,
            units,
        }
    }

    /// Units already past expiry.
    pub fn expired(&self) -> impl Iterator<Item = &ExpiringUnit> {
        self.units.iter().filter(|u| u.days_to_expiry < 0)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Consumption by product type and group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageReport {
    pub lines: Vec<UsageLine>,
    pub total_used_ml: u64,
}

impl UsageReport {
    pub fn new(lines: Vec<UsageLine>) -> Self {
        let total_used_ml = lines.iter().map(|l| l.used_volume_ml).sum();
        Self { lines, total_used_ml }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Every platelet unit with its shelf state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlateletReport {
    pub as_of: NaiveDate,
    pub units: Vec<InventoryUnit>,
    pub available_ml: u64,
    pub expired_count: u32,
}

impl PlateletReport {
    pub fn new(as_of: NaiveDate, units: Vec<InventoryUnit>) -> Self {
        let available_ml = units
            .iter()
            .filter(|u| u.is_usable_on(as_of))
            .map(|u| u64::from(u.volume_ml))
            .sum();
        let expired_count = units
            .iter()
            .filter(|u| u.status == UnitStatus::Available && u.expiry_date < as_of)
            .count() as u32;
        Self {
            as_of,
            units,
            available_ml,
            expired_count,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Full inventory history: every unit ever recorded, by expiry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryHistoryReport {
    pub units: Vec<InventoryUnit>,
    pub available_ml: u64,
    pub used_ml: u64,
    /// Used records split off a larger unit
    pub split_count: u32,
}

impl InventoryHistoryReport {
    pub fn new(units: Vec<InventoryUnit>) -> Self {
        let mut available_ml = 0;
        let mut used_ml = 0;
        for unit in &units {
            match unit.status {
                UnitStatus::Available => available_ml += u64::from(unit.volume_ml),
                UnitStatus::Used => used_ml += u64::from(unit.volume_ml),
            }
        }
        let split_count = units.iter().filter(|u| u.split_from.is_some()).count() as u32;
        Self {
            units,
            available_ml,
            used_ml,
            split_count,
        }
    }

    /// Records split off unit `id`.
    pub fn splits_of(&self, id: UnitId) -> impl Iterator<Item = &InventoryUnit> {
        self.units.iter().filter(move |u| u.split_from == Some(id))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewInventoryUnit;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn unit(id: i64, volume: u32, expiry: NaiveDate, status: UnitStatus) -> InventoryUnit {
        let mut new_unit = NewInventoryUnit::stock(ComponentType::Platelet, BloodGroup::APos, volume, expiry);
        new_unit.status = status;
        new_unit.into_unit(id, String::new())
    }

    #[test]
    fn test_stock_report_totals() {
        let report = StockReport::new(
            date(2025, 1, 1),
            vec![
                StockLine {
                    component: ComponentType::Blood,
                    blood_group: BloodGroup::APos,
                    total_volume_ml: 900,
                    unit_count: 2,
                },
                StockLine {
                    component: ComponentType::Plasma,
                    blood_group: BloodGroup::ONeg,
                    total_volume_ml: 250,
                    unit_count: 1,
                },
            ],
        );
        assert_eq!(report.total_volume_ml, 1150);
        assert_eq!(report.volume_of(ComponentType::Plasma, BloodGroup::ONeg), 250);
        assert_eq!(report.volume_of(ComponentType::Platelet, BloodGroup::ONeg), 0);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"total_volume_ml\": 1150"));
        assert!(json.contains("\"A+\""));
    }

    #[test]
    fn test_expiry_report_days() {
        let today = date(2025, 1, 10);
        let report = ExpiryReport::new(
            today,
            7,
            vec![
                unit(1, 100, date(2025, 1, 8), UnitStatus::Available),
                unit(2, 100, date(2025, 1, 15), UnitStatus::Available),
            ],
        );
        assert_eq!(report.units[0].days_to_expiry, -2);
        assert_eq!(report.units[1].days_to_expiry, 5);
        assert_eq!(report.expired().count(), 1);
    }

    #[test]
    fn test_platelet_report() {
        let today = date(2025, 1, 10);
        let report = PlateletReport::new(
            today,
            vec![
                unit(1, 200, date(2025, 1, 9), UnitStatus::Available),
                unit(2, 150, date(2025, 1, 12), UnitStatus::Available),
                unit(3, 80, date(2025, 1, 12), UnitStatus::Used),
            ],
        );
        assert_eq!(report.available_ml, 150);
        assert_eq!(report.expired_count, 1);
    }

    #[test]
    fn test_history_totals_both_statuses() {
        let mut split = unit(3, 100, date(2025, 2, 1), UnitStatus::Used);
        split.split_from = Some(2);
        let report = InventoryHistoryReport::new(vec![
            unit(1, 200, date(2025, 1, 1), UnitStatus::Used),
            unit(2, 50, date(2025, 2, 1), UnitStatus::Available),
            split,
        ]);

        assert_eq!(report.available_ml, 50);
        assert_eq!(report.used_ml, 300);
        assert_eq!(report.split_count, 1);
        assert_eq!(report.splits_of(2).map(|u| u.id).collect::<Vec<_>>(), vec![3]);
        assert_eq!(report.splits_of(1).count(), 0);
    }
}
