//! Donor registry and donation history operations.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};
use tracing::debug;

use super::{format_date, parse_date, volume_from_db, Database, DbError, DbResult};
use crate::models::{BloodGroup, Donation, Donor, DonorId, Gender, NewDonor};

const DONOR_COLUMNS: &str = r#"
    id, name, age, gender, blood_group, phone, email, city,
    last_donation_date, registration_date
"#;

impl Database {
    /// Register a donor and return the new id.
    pub fn insert_donor(&self, donor: &NewDonor) -> DbResult<DonorId> {
        donor.validate()?;

        self.conn.execute(
            r#"
            INSERT INTO donors (
                name, age, gender, blood_group, phone, email, city,
                last_donation_date, registration_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                donor.name.trim(),
                donor.age,
                donor.gender.as_str(),
                donor.blood_group.as_str(),
                donor.phone,
                donor.email,
                donor.city,
                donor.last_donation_date.map(format_date),
                format_date(donor.registration_date),
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Get a donor by id.
    pub fn get_donor(&self, id: DonorId) -> DbResult<Option<Donor>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM donors WHERE id = ?", DONOR_COLUMNS),
                [id],
                DonorRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Replace a donor's editable fields.
    pub fn update_donor(&self, donor: &Donor) -> DbResult<()> {
        if donor.name.trim().is_empty() {
            return Err(DbError::Invalid(crate::models::ModelError::MissingField("name")));
        }

        let rows_affected = self.conn.execute(
            r#"
            UPDATE donors SET
                name = ?2, age = ?3, gender = ?4, blood_group = ?5,
                phone = ?6, email = ?7, city = ?8, last_donation_date = ?9
            WHERE id = ?1
            "#,
            params![
                donor.id,
                donor.name.trim(),
                donor.age,
                donor.gender.as_str(),
                donor.blood_group.as_str(),
                donor.phone,
                donor.email,
                donor.city,
                donor.last_donation_date.map(format_date),
            ],
        )?;

        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("donor {}", donor.id)));
        }
        Ok(())
    }

    /// Remove a donor and their donation history.
    ///
    /// Inventory units collected from the donor stay in stock with the donor
    /// link cleared. NotFound if no such donor.
    pub fn delete_donor(&self, id: DonorId) -> DbResult<()> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        let unlinked = tx.execute(
            "UPDATE inventory_units SET donor_id = NULL WHERE donor_id = ?",
            [id],
        )?;
        let donations = tx.execute("DELETE FROM donations WHERE donor_id = ?", [id])?;
        let rows_affected = tx.execute("DELETE FROM donors WHERE id = ?", [id])?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("donor {}", id)));
        }

        tx.commit()?;
        debug!(donor_id = id, donations, unlinked, "donor deleted");
        Ok(())
    }

    /// Case-insensitive substring search on name.
    pub fn search_donors_by_name(&self, query: &str) -> DbResult<Vec<Donor>> {
        let pattern = format!("%{}%", query.trim().to_lowercase());
        self.query_donors(
            &format!(
                "SELECT {} FROM donors WHERE LOWER(name) LIKE ? ORDER BY name, id",
                DONOR_COLUMNS
            ),
            params![pattern],
        )
    }

    /// Donors of one group, optionally restricted to a city (case-insensitive).
    pub fn list_donors_by_group(&self, blood_group: BloodGroup, city: Option<&str>) -> DbResult<Vec<Donor>> {
        match city.map(str::trim).filter(|c| !c.is_empty()) {
            Some(city) => self.query_donors(
                &format!(
                    "SELECT {} FROM donors WHERE blood_group = ?1 AND LOWER(city) = LOWER(?2) ORDER BY id",
                    DONOR_COLUMNS
                ),
                params![blood_group.as_str(), city],
            ),
            None => self.query_donors(
                &format!(
                    "SELECT {} FROM donors WHERE blood_group = ? ORDER BY id",
                    DONOR_COLUMNS
                ),
                params![blood_group.as_str()],
            ),
        }
    }

    /// Donors with at least one recorded donation.
    pub fn list_donors_with_donations(&self) -> DbResult<Vec<Donor>> {
        self.query_donors(
            &format!(
                "SELECT {} FROM donors WHERE last_donation_date IS NOT NULL ORDER BY id",
                DONOR_COLUMNS
            ),
            [],
        )
    }

    /// Record a donation and advance the donor's last donation date.
    ///
    /// The date never moves backwards when an older donation is back-filled.
    pub fn record_donation(&self, donor_id: DonorId, donation_date: NaiveDate, volume_ml: u32) -> DbResult<i64> {
        if volume_ml == 0 {
            return Err(DbError::Invalid(crate::models::ModelError::InvalidVolume(0)));
        }

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let date_str = format_date(donation_date);

        let rows_affected = tx.execute(
            r#"
            UPDATE donors SET last_donation_date = ?2
            WHERE id = ?1
              AND (last_donation_date IS NULL OR last_donation_date < ?2)
            "#,
            params![donor_id, date_str],
        )?;
        if rows_affected == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM donors WHERE id = ?)",
                [donor_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(DbError::NotFound(format!("donor {}", donor_id)));
            }
        }

        tx.execute(
            "INSERT INTO donations (donor_id, donation_date, volume_ml) VALUES (?1, ?2, ?3)",
            params![donor_id, date_str, volume_ml],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// A donor's donation history, most recent first.
    pub fn list_donations(&self, donor_id: DonorId) -> DbResult<Vec<Donation>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, donor_id, donation_date, volume_ml
            FROM donations
            WHERE donor_id = ?
            ORDER BY donation_date DESC, id DESC
            "#,
        )?;

        let rows = stmt.query_map([donor_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut donations = Vec::new();
        for row in rows {
            let (id, donor_id, donation_date, volume_ml) = row?;
            donations.push(Donation {
                id,
                donor_id,
                donation_date: parse_date(&donation_date)?,
                volume_ml: volume_from_db(volume_ml)?,
            });
        }
        Ok(donations)
    }

    fn query_donors(&self, sql: &str, params: impl rusqlite::Params) -> DbResult<Vec<Donor>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, DonorRow::from_row)?;

        let mut donors = Vec::new();
        for row in rows {
            donors.push(row?.try_into()?);
        }
        Ok(donors)
    }
}

/// Intermediate row struct for database mapping.
struct DonorRow {
    id: i64,
    name: String,
    age: i64,
    gender: String,
    blood_group: String,
    phone: Option<String>,
    email: Option<String>,
    city: Option<String>,
    last_donation_date: Option<String>,
    registration_date: String,
}

impl DonorRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            age: row.get(2)?,
            gender: row.get(3)?,
            blood_group: row.get(4)?,
            phone: row.get(5)?,
            email: row.get(6)?,
            city: row.get(7)?,
            last_donation_date: row.get(8)?,
            registration_date: row.get(9)?,
        })
    }
}

impl TryFrom<DonorRow> for Donor {
    type Error = DbError;

    fn try_from(row: DonorRow) -> Result<Self, Self::Error> {
        Ok(Donor {
            id: row.id,
            name: row.name,
            age: u32::try_from(row.age)
                .map_err(|_| DbError::Constraint(format!("Bad age: {}", row.age)))?,
            gender: row.gender.parse::<Gender>()?,
            blood_group: row.blood_group.parse()?,
            phone: row.phone,
            email: row.email,
            city: row.city,
            last_donation_date: row.last_donation_date.as_deref().map(parse_date).transpose()?,
            registration_date: parse_date(&row.registration_date)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn donor(name: &str, group: BloodGroup, city: Option<&str>) -> NewDonor {
        let mut donor = NewDonor::new(name, 30, Gender::Female, group);
        donor.city = city.map(String::from);
        donor.phone = Some("050 123 4567".to_string());
        donor.registration_date = date(2024, 1, 1);
        donor
    }

    #[test]
    fn test_insert_and_get_donor() {
        let db = setup_db();
        let id = db.insert_donor(&donor("Mariam", BloodGroup::AbNeg, Some("Dubai"))).unwrap();

        let stored = db.get_donor(id).unwrap().unwrap();
        assert_eq!(stored.name, "Mariam");
        assert_eq!(stored.gender, Gender::Female);
        assert_eq!(stored.city.as_deref(), Some("Dubai"));
        assert_eq!(stored.registration_date, date(2024, 1, 1));
        assert!(stored.last_donation_date.is_none());
    }

    #[test]
    fn test_update_donor() {
        let db = setup_db();
        let id = db.insert_donor(&donor("Omar", BloodGroup::OPos, None)).unwrap();

        let mut stored = db.get_donor(id).unwrap().unwrap();
        stored.city = Some("Sharjah".to_string());
        stored.age = 31;
        db.update_donor(&stored).unwrap();

        let reloaded = db.get_donor(id).unwrap().unwrap();
        assert_eq!(reloaded.city.as_deref(), Some("Sharjah"));
        assert_eq!(reloaded.age, 31);

        stored.id = 999;
        assert!(matches!(db.update_donor(&stored), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_search_by_name_is_case_insensitive() {
        let db = setup_db();
        db.insert_donor(&donor("Fatima Hassan", BloodGroup::APos, None)).unwrap();
        db.insert_donor(&donor("Ahmed Ali", BloodGroup::APos, None)).unwrap();

        let found = db.search_donors_by_name("HASSAN").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Fatima Hassan");
    }

    #[test]
    fn test_list_by_group_and_city() {
        let db = setup_db();
        db.insert_donor(&donor("A", BloodGroup::BNeg, Some("Dubai"))).unwrap();
        db.insert_donor(&donor("B", BloodGroup::BNeg, Some("Abu Dhabi"))).unwrap();
        db.insert_donor(&donor("C", BloodGroup::BPos, Some("Dubai"))).unwrap();

        assert_eq!(db.list_donors_by_group(BloodGroup::BNeg, None).unwrap().len(), 2);
        let dubai = db.list_donors_by_group(BloodGroup::BNeg, Some("dubai")).unwrap();
        assert_eq!(dubai.len(), 1);
        assert_eq!(dubai[0].name, "A");
        // Blank city means no filter
        assert_eq!(db.list_donors_by_group(BloodGroup::BNeg, Some(" ")).unwrap().len(), 2);
    }

    #[test]
    fn test_record_donation_updates_last_date() {
        let db = setup_db();
        let id = db.insert_donor(&donor("Sara", BloodGroup::ONeg, None)).unwrap();

        db.record_donation(id, date(2024, 6, 1), 450).unwrap();
        db.record_donation(id, date(2024, 3, 1), 450).unwrap(); // back-filled

        let stored = db.get_donor(id).unwrap().unwrap();
        assert_eq!(stored.last_donation_date, Some(date(2024, 6, 1)));

        let history = db.list_donations(id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].donation_date, date(2024, 6, 1));

        assert_eq!(db.list_donors_with_donations().unwrap().len(), 1);
    }

    #[test]
    fn test_record_donation_unknown_donor() {
        let db = setup_db();
        let result = db.record_donation(5, date(2024, 6, 1), 450);
        assert!(matches!(result, Err(DbError::NotFound(_))));
        assert!(db.list_donations(5).unwrap().is_empty());
    }

    #[test]
    fn test_delete_donor_keeps_collected_units() {
        let db = setup_db();
        let id = db.insert_donor(&donor("Khalid", BloodGroup::APos, None)).unwrap();
        let keep = db.insert_donor(&donor("Noura", BloodGroup::APos, None)).unwrap();
        db.record_donation(id, date(2024, 6, 1), 450).unwrap();
        db.record_donation(keep, date(2024, 6, 2), 450).unwrap();
        let unit_id = db
            .insert_unit(
                &crate::models::NewInventoryUnit::stock(
                    crate::models::ComponentType::Blood,
                    BloodGroup::APos,
                    450,
                    date(2024, 7, 1),
                )
                .with_donor(id),
            )
            .unwrap();

        db.delete_donor(id).unwrap();

        assert!(db.get_donor(id).unwrap().is_none());
        assert!(db.list_donations(id).unwrap().is_empty());
        let unit = db.get_unit(unit_id).unwrap().unwrap();
        assert_eq!(unit.donor_id, None);
        assert_eq!(unit.volume_ml, 450);
        assert_eq!(db.list_donations(keep).unwrap().len(), 1);

        assert!(matches!(db.delete_donor(id), Err(DbError::NotFound(_))));
    }
}
