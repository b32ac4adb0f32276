//! SQLite schema definition.

/// Complete database schema for BloodVault.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Donors
-- ============================================================================

CREATE TABLE IF NOT EXISTS donors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    age INTEGER NOT NULL CHECK (age >= 0),
    gender TEXT NOT NULL CHECK (gender IN ('M', 'F', 'O')),
    blood_group TEXT NOT NULL CHECK (blood_group IN ('A+', 'A-', 'B+', 'B-', 'AB+', 'AB-', 'O+', 'O-')),
    phone TEXT,
    email TEXT,
    city TEXT,
    last_donation_date TEXT,                     -- YYYY-MM-DD
    registration_date TEXT NOT NULL              -- YYYY-MM-DD
);

CREATE INDEX IF NOT EXISTS idx_donors_group_city ON donors(blood_group, city);
CREATE INDEX IF NOT EXISTS idx_donors_name ON donors(name);

CREATE TABLE IF NOT EXISTS donations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    donor_id INTEGER NOT NULL REFERENCES donors(id),
    donation_date TEXT NOT NULL,                 -- YYYY-MM-DD
    volume_ml INTEGER NOT NULL CHECK (volume_ml > 0)
);

CREATE INDEX IF NOT EXISTS idx_donations_donor ON donations(donor_id);

-- ============================================================================
-- Inventory Units
-- ============================================================================

CREATE TABLE IF NOT EXISTS inventory_units (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    component TEXT NOT NULL CHECK (component IN ('blood', 'plasma', 'platelet')),
    blood_group TEXT NOT NULL CHECK (blood_group IN ('A+', 'A-', 'B+', 'B-', 'AB+', 'AB-', 'O+', 'O-')),
    volume_ml INTEGER NOT NULL CHECK (volume_ml > 0),
    expiry_date TEXT NOT NULL,                   -- YYYY-MM-DD, sorts lexicographically
    status TEXT NOT NULL DEFAULT 'available' CHECK (status IN ('available', 'used')),
    donor_id INTEGER REFERENCES donors(id),
    split_from INTEGER REFERENCES inventory_units(id),
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- FEFO lookup: one pool, Available, by expiry then id
CREATE INDEX IF NOT EXISTS idx_units_pool ON inventory_units(blood_group, component, status, expiry_date, id);
CREATE INDEX IF NOT EXISTS idx_units_expiry ON inventory_units(status, expiry_date);

-- ============================================================================
-- Requests
-- ============================================================================

CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hospital_name TEXT NOT NULL,
    contact TEXT,
    blood_group TEXT NOT NULL CHECK (blood_group IN ('A+', 'A-', 'B+', 'B-', 'AB+', 'AB-', 'O+', 'O-')),
    component TEXT NOT NULL CHECK (component IN ('blood', 'plasma', 'platelet')),
    volume_ml INTEGER NOT NULL CHECK (volume_ml > 0),
    urgency TEXT NOT NULL CHECK (urgency IN ('normal', 'emergency')),
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'fulfilled')),
    request_time TEXT NOT NULL,                  -- RFC 3339, fixed width
    fulfilled_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status, urgency, request_time);

-- Status is one-way
CREATE TRIGGER IF NOT EXISTS requests_status_one_way BEFORE UPDATE OF status ON requests
WHEN old.status = 'fulfilled' AND new.status <> 'fulfilled'
BEGIN
    SELECT RAISE(ABORT, 'Fulfilled requests cannot be reopened');
END;

-- ============================================================================
-- Allocation Ledger (Append-Only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS allocations (
    allocation_id TEXT PRIMARY KEY,              -- UUID v4
    request_id INTEGER NOT NULL REFERENCES requests(id),
    unit_id INTEGER NOT NULL REFERENCES inventory_units(id),
    volume_ml INTEGER NOT NULL CHECK (volume_ml > 0),
    allocated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_allocations_request ON allocations(request_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_unit_volume_must_be_positive() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO inventory_units (component, blood_group, volume_ml, expiry_date) VALUES ('blood', 'A+', 0, '2025-01-01')",
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(
            "INSERT INTO inventory_units (component, blood_group, volume_ml, expiry_date) VALUES ('blood', 'A+', 450, '2025-01-01')",
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_unknown_group_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO inventory_units (component, blood_group, volume_ml, expiry_date) VALUES ('blood', 'C+', 450, '2025-01-01')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_fulfilled_request_cannot_reopen() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO requests (hospital_name, blood_group, component, volume_ml, urgency, request_time) VALUES ('General', 'O-', 'blood', 300, 'normal', '2025-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();
        conn.execute("UPDATE requests SET status = 'fulfilled' WHERE id = 1", [])
            .unwrap();

        let result = conn.execute("UPDATE requests SET status = 'pending' WHERE id = 1", []);
        assert!(result.is_err());
    }
}
