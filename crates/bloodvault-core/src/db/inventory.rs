//! Inventory unit database operations.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use tracing::debug;

use super::{
    format_date, format_timestamp, parse_date, volume_from_db, Database, DbError, DbResult,
};
use crate::allocation::{InventoryStore, MutationBatch, StoreResult};
use crate::models::{
    BloodGroup, ComponentType, InventoryUnit, NewInventoryUnit, UnitId, UnitStatus,
};
use crate::reports::{StockLine, UsageLine};

const UNIT_COLUMNS: &str = r#"
    id, component, blood_group, volume_ml, expiry_date, status, donor_id, split_from, created_at
"#;

impl Database {
    /// Record a unit and return its id.
    pub fn insert_unit(&self, unit: &NewInventoryUnit) -> DbResult<UnitId> {
        unit.validate()?;
        insert_unit_with(&self.conn, unit, &format_timestamp(Utc::now()))
    }

    /// Get a unit by id.
    pub fn get_unit(&self, id: UnitId) -> DbResult<Option<InventoryUnit>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM inventory_units WHERE id = ?", UNIT_COLUMNS),
                [id],
                UnitRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Available, unexpired units of one pool, earliest expiry first.
    pub fn list_available_units(
        &self,
        blood_group: BloodGroup,
        component: ComponentType,
        as_of: NaiveDate,
    ) -> DbResult<Vec<InventoryUnit>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM inventory_units
            WHERE blood_group = ?1 AND component = ?2
              AND status = 'available' AND expiry_date >= ?3
            ORDER BY expiry_date ASC, id ASC
            "#,
            UNIT_COLUMNS
        ))?;

        let rows = stmt.query_map(
            params![
                blood_group.as_str(),
                component_to_string(&component),
                format_date(as_of)
            ],
            UnitRow::from_row,
        )?;
        collect_units(rows)
    }

    /// Available units expiring on or before `until` (already expired included).
    pub fn list_expiring_units(&self, until: NaiveDate) -> DbResult<Vec<InventoryUnit>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM inventory_units
            WHERE status = 'available' AND expiry_date <= ?
            ORDER BY expiry_date ASC, id ASC
            "#,
            UNIT_COLUMNS
        ))?;

        let rows = stmt.query_map([format_date(until)], UnitRow::from_row)?;
        collect_units(rows)
    }

    /// Every unit of one product type regardless of status, by expiry.
    pub fn list_units_by_component(&self, component: ComponentType) -> DbResult<Vec<InventoryUnit>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM inventory_units
            WHERE component = ?
            ORDER BY expiry_date ASC, id ASC
            "#,
            UNIT_COLUMNS
        ))?;

        let rows = stmt.query_map([component_to_string(&component)], UnitRow::from_row)?;
        collect_units(rows)
    }

    /// Every unit, Available and Used, split records included, by expiry.
    pub fn list_all_units(&self) -> DbResult<Vec<InventoryUnit>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM inventory_units ORDER BY expiry_date ASC, id ASC",
            UNIT_COLUMNS
        ))?;

        let rows = stmt.query_map([], UnitRow::from_row)?;
        collect_units(rows)
    }

    /// Administrative edit of a unit's volume and expiry.
    ///
    /// Used units are terminal and cannot be edited.
    pub fn update_unit(&self, id: UnitId, volume_ml: u32, expiry_date: NaiveDate) -> DbResult<bool> {
        if volume_ml == 0 {
            return Err(DbError::Invalid(crate::models::ModelError::InvalidVolume(0)));
        }
        let rows_affected = self.conn.execute(
            r#"
            UPDATE inventory_units SET volume_ml = ?2, expiry_date = ?3
            WHERE id = ?1 AND status = 'available'
            "#,
            params![id, volume_ml, format_date(expiry_date)],
        )?;
        Ok(rows_affected > 0)
    }

    /// Total Available, unexpired volume per product type and group.
    pub fn stock_summary(&self, as_of: NaiveDate) -> DbResult<Vec<StockLine>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT component, blood_group, SUM(volume_ml), COUNT(*)
            FROM inventory_units
            WHERE status = 'available' AND expiry_date >= ?
            GROUP BY component, blood_group
            ORDER BY component, blood_group
            "#,
        )?;

        let rows = stmt.query_map([format_date(as_of)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut lines = Vec::new();
        for row in rows {
            let (component, blood_group, total, count) = row?;
            lines.push(StockLine {
                component: string_to_component(&component)?,
                blood_group: blood_group.parse()?,
                total_volume_ml: u64::try_from(total).unwrap_or_default(),
                unit_count: u32::try_from(count).unwrap_or_default(),
            });
        }
        Ok(lines)
    }

    /// Total consumed volume per product type and group.
    pub fn usage_summary(&self) -> DbResult<Vec<UsageLine>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT component, blood_group, SUM(volume_ml)
            FROM inventory_units
            WHERE status = 'used'
            GROUP BY component, blood_group
            ORDER BY component, blood_group
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut lines = Vec::new();
        for row in rows {
            let (component, blood_group, total) = row?;
            lines.push(UsageLine {
                component: string_to_component(&component)?,
                blood_group: blood_group.parse()?,
                used_volume_ml: u64::try_from(total).unwrap_or_default(),
            });
        }
        Ok(lines)
    }

    /// Apply one allocation batch in a single immediate transaction.
    ///
    /// Each unit update is a compare-and-swap on (status, volume); any miss
    /// rolls the whole batch back and reports a conflict.
    pub fn apply_allocation(&self, batch: &MutationBatch) -> DbResult<Vec<UnitId>> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let now = Utc::now();
        let now_str = format_timestamp(now);

        super::requests::mark_fulfilled_with(&tx, batch.request_id, &now_str)?;

        for update in &batch.unit_updates {
            let rows_affected = tx.execute(
                r#"
                UPDATE inventory_units SET volume_ml = ?2, status = ?3
                WHERE id = ?1 AND status = 'available' AND volume_ml = ?4
                "#,
                params![
                    update.unit_id,
                    update.new_volume_ml,
                    status_to_string(&update.new_status),
                    update.expected_volume_ml,
                ],
            )?;
            if rows_affected != 1 {
                return Err(DbError::Conflict(format!(
                    "unit {} changed since it was read",
                    update.unit_id
                )));
            }
        }

        let mut new_ids = Vec::with_capacity(batch.new_units.len());
        for unit in &batch.new_units {
            new_ids.push(insert_unit_with(&tx, unit, &now_str)?);
        }

        for record in batch.allocation_records(&new_ids, now) {
            tx.execute(
                r#"
                INSERT INTO allocations (allocation_id, request_id, unit_id, volume_ml, allocated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    record.allocation_id,
                    record.request_id,
                    record.unit_id,
                    record.volume_ml,
                    format_timestamp(record.allocated_at),
                ],
            )?;
        }

        tx.commit()?;
        debug!(request_id = batch.request_id, new_units = new_ids.len(), "allocation committed");
        Ok(new_ids)
    }
}

impl InventoryStore for Database {
    fn insert_unit(&self, unit: &NewInventoryUnit) -> StoreResult<UnitId> {
        Ok(Database::insert_unit(self, unit)?)
    }

    fn get_unit(&self, id: UnitId) -> StoreResult<Option<InventoryUnit>> {
        Ok(Database::get_unit(self, id)?)
    }

    fn fetch_available_units(
        &self,
        blood_group: BloodGroup,
        component: ComponentType,
        as_of: NaiveDate,
    ) -> StoreResult<Vec<InventoryUnit>> {
        Ok(self.list_available_units(blood_group, component, as_of)?)
    }

    fn apply_mutations(&self, batch: &MutationBatch) -> StoreResult<Vec<UnitId>> {
        Ok(self.apply_allocation(batch)?)
    }
}

fn insert_unit_with(conn: &Connection, unit: &NewInventoryUnit, created_at: &str) -> DbResult<UnitId> {
    conn.execute(
        r#"
        INSERT INTO inventory_units (
            component, blood_group, volume_ml, expiry_date,
            status, donor_id, split_from, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            component_to_string(&unit.component),
            unit.blood_group.as_str(),
            unit.volume_ml,
            format_date(unit.expiry_date),
            status_to_string(&unit.status),
            unit.donor_id,
            unit.split_from,
            created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn collect_units(
    rows: impl Iterator<Item = rusqlite::Result<UnitRow>>,
) -> DbResult<Vec<InventoryUnit>> {
    let mut units = Vec::new();
    for row in rows {
        units.push(row?.try_into()?);
    }
    Ok(units)
}

/// Intermediate row struct for database mapping.
struct UnitRow {
    id: i64,
    component: String,
    blood_group: String,
    volume_ml: i64,
    expiry_date: String,
    status: String,
    donor_id: Option<i64>,
    split_from: Option<i64>,
    created_at: String,
}

impl UnitRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            component: row.get(1)?,
            blood_group: row.get(2)?,
            volume_ml: row.get(3)?,
            expiry_date: row.get(4)?,
            status: row.get(5)?,
            donor_id: row.get(6)?,
            split_from: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

impl TryFrom<UnitRow> for InventoryUnit {
    type Error = DbError;

    fn try_from(row: UnitRow) -> Result<Self, Self::Error> {
        Ok(InventoryUnit {
            id: row.id,
            component: string_to_component(&row.component)?,
            blood_group: row.blood_group.parse()?,
            volume_ml: volume_from_db(row.volume_ml)?,
            expiry_date: parse_date(&row.expiry_date)?,
            status: string_to_status(&row.status)?,
            donor_id: row.donor_id,
            split_from: row.split_from,
            created_at: row.created_at,
        })
    }
}

pub(super) fn component_to_string(component: &ComponentType) -> &'static str {
    match component {
        ComponentType::Blood => "blood",
        ComponentType::Plasma => "plasma",
        ComponentType::Platelet => "platelet",
    }
}

pub(super) fn string_to_component(s: &str) -> Result<ComponentType, DbError> {
    match s {
        "blood" => Ok(ComponentType::Blood),
        "plasma" => Ok(ComponentType::Plasma),
        "platelet" => Ok(ComponentType::Platelet),
        _ => Err(DbError::Constraint(format!("Unknown component: {}", s))),
    }
}

fn status_to_string(status: &UnitStatus) -> &'static str {
    match status {
        UnitStatus::Available => "available",
        UnitStatus::Used => "used",
    }
}

fn string_to_status(s: &str) -> Result<UnitStatus, DbError> {
    match s {
        "available" => Ok(UnitStatus::Available),
        "used" => Ok(UnitStatus::Used),
        _ => Err(DbError::Constraint(format!("Unknown unit status: {}", s))),
    }
}
