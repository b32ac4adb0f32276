//! Hospital request and allocation ledger operations.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::inventory::{component_to_string, string_to_component};
use super::{format_timestamp, parse_timestamp, volume_from_db, Database, DbError, DbResult};
use crate::allocation::{PendingOrder, RequestStore, StoreResult};
use crate::models::{
    AllocationRecord, BloodRequest, NewRequest, RequestId, RequestStatus, Urgency,
};

const REQUEST_COLUMNS: &str = r#"
    id, hospital_name, contact, blood_group, component, volume_ml,
    urgency, status, request_time, fulfilled_at
"#;

impl Database {
    /// Submit a request. It starts Pending.
    pub fn insert_request(&self, request: &NewRequest) -> DbResult<RequestId> {
        request.validate()?;

        self.conn.execute(
            r#"
            INSERT INTO requests (
                hospital_name, contact, blood_group, component, volume_ml,
                urgency, status, request_time
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)
            "#,
            params![
                request.hospital_name.trim(),
                request.contact,
                request.blood_group.as_str(),
                component_to_string(&request.component),
                request.volume_ml,
                urgency_to_string(&request.urgency),
                format_timestamp(request.request_time),
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Get a request by id.
    pub fn get_request(&self, id: RequestId) -> DbResult<Option<BloodRequest>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM requests WHERE id = ?", REQUEST_COLUMNS),
                [id],
                RequestRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List Pending requests in the given order.
    pub fn list_pending_requests(&self, order: PendingOrder) -> DbResult<Vec<BloodRequest>> {
        let order_by = match order {
            PendingOrder::Priority => {
                "CASE urgency WHEN 'emergency' THEN 0 ELSE 1 END, request_time ASC, id ASC"
            }
            PendingOrder::Chronological => "request_time ASC, id ASC",
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM requests WHERE status = 'pending' ORDER BY {}",
            REQUEST_COLUMNS, order_by
        ))?;

        let rows = stmt.query_map([], RequestRow::from_row)?;
        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?.try_into()?);
        }
        Ok(requests)
    }

    /// Flip a Pending request to Fulfilled.
    pub fn set_request_fulfilled(&self, id: RequestId) -> DbResult<()> {
        mark_fulfilled_with(&self.conn, id, &format_timestamp(Utc::now()))
    }

    /// Ledger entries for one request, in allocation order.
    pub fn list_allocations(&self, request_id: RequestId) -> DbResult<Vec<AllocationRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT allocation_id, request_id, unit_id, volume_ml, allocated_at
            FROM allocations
            WHERE request_id = ?
            ORDER BY rowid ASC
            "#,
        )?;

        let rows = stmt.query_map([request_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (allocation_id, request_id, unit_id, volume_ml, allocated_at) = row?;
            records.push(AllocationRecord {
                allocation_id,
                request_id,
                unit_id,
                volume_ml: volume_from_db(volume_ml)?,
                allocated_at: parse_timestamp(&allocated_at)?,
            });
        }
        Ok(records)
    }
}

impl RequestStore for Database {
    fn insert_request(&self, request: &NewRequest) -> StoreResult<RequestId> {
        Ok(Database::insert_request(self, request)?)
    }

    fn get_request(&self, id: RequestId) -> StoreResult<Option<BloodRequest>> {
        Ok(Database::get_request(self, id)?)
    }

    fn fetch_pending_requests(&self, order: PendingOrder) -> StoreResult<Vec<BloodRequest>> {
        Ok(self.list_pending_requests(order)?)
    }

    fn mark_fulfilled(&self, id: RequestId) -> StoreResult<()> {
        Ok(self.set_request_fulfilled(id)?)
    }

    fn allocations_for_request(&self, id: RequestId) -> StoreResult<Vec<AllocationRecord>> {
        Ok(self.list_allocations(id)?)
    }
}

/// Compare-and-swap Pending -> Fulfilled on `conn` (a connection or an open transaction).
pub(super) fn mark_fulfilled_with(conn: &Connection, id: RequestId, fulfilled_at: &str) -> DbResult<()> {
    let rows_affected = conn.execute(
        r#"
        UPDATE requests SET status = 'fulfilled', fulfilled_at = ?2
        WHERE id = ?1 AND status = 'pending'
        "#,
        params![id, fulfilled_at],
    )?;
    if rows_affected == 1 {
        return Ok(());
    }

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM requests WHERE id = ?)",
        [id],
        |row| row.get(0),
    )?;
    if exists {
        Err(DbError::Conflict(format!("request {} is no longer pending", id)))
    } else {
        Err(DbError::NotFound(format!("request {}", id)))
    }
}

/// Intermediate row struct for database mapping.
struct RequestRow {
    id: i64,
    hospital_name: String,
    contact: Option<String>,
    blood_group: String,
    component: String,
    volume_ml: i64,
    urgency: String,
    status: String,
    request_time: String,
    fulfilled_at: Option<String>,
}

impl RequestRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            hospital_name: row.get(1)?,
            contact: row.get(2)?,
            blood_group: row.get(3)?,
            component: row.get(4)?,
            volume_ml: row.get(5)?,
            urgency: row.get(6)?,
            status: row.get(7)?,
            request_time: row.get(8)?,
            fulfilled_at: row.get(9)?,
        })
    }
}

impl TryFrom<RequestRow> for BloodRequest {
    type Error = DbError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(BloodRequest {
            id: row.id,
            hospital_name: row.hospital_name,
            contact: row.contact,
            blood_group: row.blood_group.parse()?,
            component: string_to_component(&row.component)?,
            volume_ml: volume_from_db(row.volume_ml)?,
            urgency: row.urgency.parse()?,
            status: string_to_request_status(&row.status)?,
            request_time: parse_timestamp(&row.request_time)?,
            fulfilled_at: row.fulfilled_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn urgency_to_string(urgency: &Urgency) -> &'static str {
    match urgency {
        Urgency::Normal => "normal",
        Urgency::Emergency => "emergency",
    }
}

fn string_to_request_status(s: &str) -> Result<RequestStatus, DbError> {
    match s {
        "pending" => Ok(RequestStatus::Pending),
        "fulfilled" => Ok(RequestStatus::Fulfilled),
        _ => Err(DbError::Constraint(format!("Unknown request status: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BloodGroup, ComponentType};
    use chrono::Duration;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get_request() {
        let db = setup_db();
        let id = db
            .insert_request(
                &NewRequest::new("City Hospital", BloodGroup::ONeg, ComponentType::Plasma, 400)
                    .emergency()
                    .with_contact("04 123 4567"),
            )
            .unwrap();

        let request = db.get_request(id).unwrap().unwrap();
        assert_eq!(request.hospital_name, "City Hospital");
        assert_eq!(request.contact.as_deref(), Some("04 123 4567"));
        assert_eq!(request.blood_group, BloodGroup::ONeg);
        assert_eq!(request.component, ComponentType::Plasma);
        assert_eq!(request.urgency, Urgency::Emergency);
        assert!(request.is_pending());
        assert!(request.fulfilled_at.is_none());
    }

    #[test]
    fn test_request_time_round_trips_exactly() {
        let db = setup_db();
        let ts = parse_timestamp("2025-03-01T08:30:15.123456Z").unwrap();
        let id = db
            .insert_request(&NewRequest::new("General", BloodGroup::APos, ComponentType::Blood, 100).at(ts))
            .unwrap();

        let stored = db.get_request(id).unwrap().unwrap();
        assert_eq!(stored.request_time, ts);
    }

    #[test]
    fn test_get_missing_request() {
        let db = setup_db();
        assert!(db.get_request(42).unwrap().is_none());
    }

    #[test]
    fn test_insert_rejects_invalid() {
        let db = setup_db();
        let result = db.insert_request(&NewRequest::new("  ", BloodGroup::APos, ComponentType::Blood, 100));
        assert!(matches!(result, Err(DbError::Invalid(_))));
        let result = db.insert_request(&NewRequest::new("General", BloodGroup::APos, ComponentType::Blood, 0));
        assert!(matches!(result, Err(DbError::Invalid(_))));
    }

    #[test]
    fn test_pending_order() {
        let db = setup_db();
        let t0 = Utc::now();
        let normal_old = db
            .insert_request(
                &NewRequest::new("A", BloodGroup::APos, ComponentType::Blood, 100).at(t0 - Duration::hours(5)),
            )
            .unwrap();
        let emergency_new = db
            .insert_request(
                &NewRequest::new("B", BloodGroup::BPos, ComponentType::Blood, 100)
                    .emergency()
                    .at(t0),
            )
            .unwrap();
        let normal_new = db
            .insert_request(
                &NewRequest::new("C", BloodGroup::OPos, ComponentType::Plasma, 100).at(t0 - Duration::hours(1)),
            )
            .unwrap();

        let ids: Vec<RequestId> = db
            .list_pending_requests(PendingOrder::Priority)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![emergency_new, normal_old, normal_new]);

        let ids: Vec<RequestId> = db
            .list_pending_requests(PendingOrder::Chronological)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![normal_old, normal_new, emergency_new]);
    }

    #[test]
    fn test_mark_fulfilled_cas() {
        let db = setup_db();
        let id = db
            .insert_request(&NewRequest::new("General", BloodGroup::APos, ComponentType::Blood, 100))
            .unwrap();

        db.set_request_fulfilled(id).unwrap();
        let request = db.get_request(id).unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Fulfilled);
        assert!(request.fulfilled_at.is_some());

        assert!(matches!(db.set_request_fulfilled(id), Err(DbError::Conflict(_))));
        assert!(matches!(db.set_request_fulfilled(999), Err(DbError::NotFound(_))));
        assert!(db.list_pending_requests(PendingOrder::Priority).unwrap().is_empty());
    }

    #[test]
    fn test_store_trait_maps_errors() {
        use crate::allocation::StoreError;

        let db = setup_db();
        let store: &dyn RequestStore = &db;
        assert!(matches!(store.mark_fulfilled(7), Err(StoreError::NotFound(_))));
        assert!(store.allocations_for_request(7).unwrap().is_empty());
    }
}
