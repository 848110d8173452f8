//! SQLite-backed vehicle record store.
//!
//! One table, keyed by plate. Every operation is a single point lookup or
//! a single-row write committed before returning.

use crate::plate::Plate;
use crate::types::{CustomerInfo, VehicleRecord};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS vehicles (
    plate         TEXT PRIMARY KEY,
    customer_name TEXT,
    car_model     TEXT,
    visit_count   INTEGER NOT NULL DEFAULT 0,
    entry_time    TEXT NOT NULL,
    exit_time     TEXT,
    amount_due    REAL,
    paid          INTEGER NOT NULL DEFAULT 0
)";

const SELECT_COLUMNS: &str = "plate, customer_name, car_model, visit_count, \
                              entry_time, exit_time, amount_due, paid";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot create database directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("no record for plate {0}")]
    NotFound(String),
    #[error("plate {0} is already registered")]
    AlreadyExists(String),
}

/// Owned handle to the vehicle table.
pub struct VehicleStore {
    conn: Connection,
}

impl VehicleStore {
    /// Open (or create) the database file and ensure the table exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened vehicle store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn get(&self, plate: &Plate) -> Result<Option<VehicleRecord>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM vehicles WHERE plate = ?1");
        let record = self
            .conn
            .query_row(&sql, params![plate.as_str()], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Insert a first-visit record: one visit, unpaid, no exit yet.
    pub fn insert_new(
        &self,
        plate: &Plate,
        customer: Option<&CustomerInfo>,
        entry_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = self.conn.execute(
            "INSERT INTO vehicles (plate, customer_name, car_model, visit_count, entry_time, paid)
             VALUES (?1, ?2, ?3, 1, ?4, 0)",
            params![
                plate.as_str(),
                customer.map(|c| c.name.as_str()),
                customer.map(|c| c.car_model.as_str()),
                entry_time,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::AlreadyExists(plate.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Start a new cycle for a known plate: bump the visit count, refresh
    /// the entry time and mark the cycle unpaid. Returns the new count.
    pub fn record_reentry(
        &self,
        plate: &Plate,
        entry_time: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let visit_count = self
            .conn
            .query_row(
                "UPDATE vehicles SET visit_count = visit_count + 1, entry_time = ?2, paid = 0
                 WHERE plate = ?1
                 RETURNING visit_count",
                params![plate.as_str(), entry_time],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;

        visit_count.ok_or_else(|| StoreError::NotFound(plate.to_string()))
    }

    /// Fill in customer metadata. Fields already set are left alone.
    pub fn set_customer(&self, plate: &Plate, customer: &CustomerInfo) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE vehicles
             SET customer_name = COALESCE(customer_name, ?2),
                 car_model = COALESCE(car_model, ?3)
             WHERE plate = ?1",
            params![plate.as_str(), customer.name, customer.car_model],
        )?;
        expect_one(changed, plate)
    }

    pub fn record_exit(
        &self,
        plate: &Plate,
        exit_time: DateTime<Utc>,
        amount_due: f64,
        paid: bool,
    ) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE vehicles SET exit_time = ?2, amount_due = ?3, paid = ?4 WHERE plate = ?1",
            params![plate.as_str(), exit_time, amount_due, paid],
        )?;
        expect_one(changed, plate)
    }

    pub fn set_paid(&self, plate: &Plate, paid: bool) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE vehicles SET paid = ?2 WHERE plate = ?1",
            params![plate.as_str(), paid],
        )?;
        expect_one(changed, plate)
    }

    /// Amount computed at the latest exit. `None` when the plate is unknown
    /// or has never exited.
    pub fn amount_due(&self, plate: &Plate) -> Result<Option<f64>, StoreError> {
        let amount = self
            .conn
            .query_row(
                "SELECT amount_due FROM vehicles WHERE plate = ?1",
                params![plate.as_str()],
                |row| row.get::<_, Option<f64>>(0),
            )
            .optional()?;
        Ok(amount.flatten())
    }
}

fn expect_one(changed: usize, plate: &Plate) -> Result<(), StoreError> {
    if changed == 0 {
        Err(StoreError::NotFound(plate.to_string()))
    } else {
        Ok(())
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<VehicleRecord> {
    let raw_plate: String = row.get(0)?;
    let plate = Plate::parse(&raw_plate)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

    Ok(VehicleRecord {
        plate,
        customer_name: row.get(1)?,
        car_model: row.get(2)?,
        visit_count: row.get(3)?,
        entry_time: row.get(4)?,
        exit_time: row.get(5)?,
        amount_due: row.get(6)?,
        paid: row.get(7)?,
    })
}
