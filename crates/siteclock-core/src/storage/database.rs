//! SQLite-backed attendance store.
//!
//! Persists sites, assignments, weekly schedules and attendance records.
//! The connection sits behind a mutex so the store can be shared with the
//! tracking loop (`AttendanceStore` is `Send + Sync`).

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard};

use super::{data_dir, AttendanceStore};
use crate::error::StoreError;
use crate::geo::Coordinate;
use crate::model::{Assignment, AttendanceRecord, Site};
use crate::schedule::TrackingSchedule;

/// SQLite database at `~/.config/siteclock/siteclock.db`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database, creating file and schema if needed.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("siteclock.db");
        let conn = Connection::open(&path).map_err(|source| StoreError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (tests, replay dry-runs).
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS sites (
                id        TEXT PRIMARY KEY,
                name      TEXT NOT NULL,
                address   TEXT NOT NULL DEFAULT '',
                latitude  REAL NOT NULL,
                longitude REAL NOT NULL,
                radius_m  REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS assignments (
                employee_id TEXT NOT NULL,
                site_id     TEXT NOT NULL,
                start_date  TEXT,
                end_date    TEXT,
                PRIMARY KEY (employee_id, site_id)
            );

            CREATE TABLE IF NOT EXISTS schedules (
                employee_id   TEXT PRIMARY KEY,
                schedule_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS attendance_records (
                id           TEXT PRIMARY KEY,
                employee_id  TEXT NOT NULL,
                site_id      TEXT NOT NULL,
                clock_in     TEXT NOT NULL,
                clock_out    TEXT,
                clock_in_lat REAL,
                clock_in_lon REAL
            );

            CREATE INDEX IF NOT EXISTS idx_records_employee_open
                ON attendance_records(employee_id, clock_out);
            CREATE INDEX IF NOT EXISTS idx_assignments_employee
                ON assignments(employee_id);",
        )?;
        Ok(())
    }

    // ── Site administration ──────────────────────────────────────────

    pub fn upsert_site(&self, site: &Site) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT INTO sites (id, name, address, latitude, longitude, radius_m)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                address = excluded.address,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                radius_m = excluded.radius_m",
            params![
                site.id,
                site.name,
                site.address,
                site.center.latitude,
                site.center.longitude,
                site.radius_m,
            ],
        )?;
        Ok(())
    }

    pub fn list_sites(&self) -> Result<Vec<Site>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, address, latitude, longitude, radius_m FROM sites ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Site {
                id: row.get(0)?,
                name: row.get(1)?,
                address: row.get(2)?,
                center: Coordinate::new(row.get(3)?, row.get(4)?),
                radius_m: row.get(5)?,
            })
        })?;
        let mut sites = Vec::new();
        for site in rows {
            sites.push(site?);
        }
        Ok(sites)
    }

    /// Remove a site and any assignments pointing at it.
    pub fn remove_site(&self, site_id: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute("DELETE FROM assignments WHERE site_id = ?1", params![site_id])?;
        let n = conn.execute("DELETE FROM sites WHERE id = ?1", params![site_id])?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("site '{site_id}'")));
        }
        Ok(())
    }

    // ── Assignment administration ────────────────────────────────────

    pub fn add_assignment(&self, assignment: &Assignment) -> Result<(), StoreError> {
        let exists: Option<String> = self
            .lock()
            .query_row(
                "SELECT id FROM sites WHERE id = ?1",
                params![assignment.site_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!(
                "site '{}'",
                assignment.site_id
            )));
        }
        self.lock().execute(
            "INSERT INTO assignments (employee_id, site_id, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(employee_id, site_id) DO UPDATE SET
                start_date = excluded.start_date,
                end_date = excluded.end_date",
            params![
                assignment.employee_id,
                assignment.site_id,
                assignment.start_date.map(|d| d.to_string()),
                assignment.end_date.map(|d| d.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn remove_assignment(&self, employee_id: &str, site_id: &str) -> Result<(), StoreError> {
        let n = self.lock().execute(
            "DELETE FROM assignments WHERE employee_id = ?1 AND site_id = ?2",
            params![employee_id, site_id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!(
                "assignment '{employee_id}' -> '{site_id}'"
            )));
        }
        Ok(())
    }

    pub fn assignments(&self, employee_id: &str) -> Result<Vec<Assignment>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT employee_id, site_id, start_date, end_date
             FROM assignments WHERE employee_id = ?1 ORDER BY site_id",
        )?;
        let rows = stmt.query_map(params![employee_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        let mut assignments = Vec::new();
        for row in rows {
            let (employee_id, site_id, start, end) = row?;
            assignments.push(Assignment {
                employee_id,
                site_id,
                start_date: parse_date_opt(start.as_deref())?,
                end_date: parse_date_opt(end.as_deref())?,
            });
        }
        Ok(assignments)
    }

    // ── Schedule administration ──────────────────────────────────────

    pub fn set_schedule(
        &self,
        employee_id: &str,
        schedule: &TrackingSchedule,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(schedule)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        self.lock().execute(
            "INSERT INTO schedules (employee_id, schedule_json) VALUES (?1, ?2)
             ON CONFLICT(employee_id) DO UPDATE SET schedule_json = excluded.schedule_json",
            params![employee_id, json],
        )?;
        Ok(())
    }

    // ── Record queries (reporting / CLI) ─────────────────────────────

    /// Most recent records for an employee, newest first.
    pub fn records(
        &self,
        employee_id: &str,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, employee_id, site_id, clock_in, clock_out, clock_in_lat, clock_in_lon
             FROM attendance_records WHERE employee_id = ?1
             ORDER BY clock_in DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![employee_id, limit], map_record_row)?;
        collect_records(rows)
    }
}

type RawRecord = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<f64>,
    Option<f64>,
);

fn map_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn collect_records(
    rows: impl Iterator<Item = rusqlite::Result<RawRecord>>,
) -> Result<Vec<AttendanceRecord>, StoreError> {
    let mut records = Vec::new();
    for row in rows {
        let (id, employee_id, site_id, clock_in, clock_out, lat, lon) = row?;
        records.push(AttendanceRecord {
            id,
            employee_id,
            site_id,
            clock_in: parse_ts(&clock_in)?,
            clock_out: match clock_out {
                Some(s) => Some(parse_ts(&s)?),
                None => None,
            },
            clock_in_coordinate: match (lat, lon) {
                (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
                _ => None,
            },
        });
    }
    Ok(records)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp '{s}': {e}")))
}

fn parse_date_opt(s: Option<&str>) -> Result<Option<NaiveDate>, StoreError> {
    match s {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| StoreError::QueryFailed(format!("bad date '{s}': {e}"))),
    }
}

impl AttendanceStore for Database {
    fn assigned_sites(&self, employee_id: &str, date: NaiveDate) -> Result<Vec<Site>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.name, s.address, s.latitude, s.longitude, s.radius_m,
                    a.start_date, a.end_date
             FROM sites s JOIN assignments a ON a.site_id = s.id
             WHERE a.employee_id = ?1",
        )?;
        let rows = stmt.query_map(params![employee_id], |row| {
            Ok((
                Site {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    address: row.get(2)?,
                    center: Coordinate::new(row.get(3)?, row.get(4)?),
                    radius_m: row.get(5)?,
                },
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;

        let mut sites = Vec::new();
        for row in rows {
            let (site, start, end) = row?;
            let assignment = Assignment {
                employee_id: employee_id.into(),
                site_id: site.id.clone(),
                start_date: parse_date_opt(start.as_deref())?,
                end_date: parse_date_opt(end.as_deref())?,
            };
            if assignment.covers(date) {
                sites.push(site);
            }
        }
        Ok(sites)
    }

    fn tracking_schedule(
        &self,
        employee_id: &str,
    ) -> Result<Option<TrackingSchedule>, StoreError> {
        let json: Option<String> = self
            .lock()
            .query_row(
                "SELECT schedule_json FROM schedules WHERE employee_id = ?1",
                params![employee_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::QueryFailed(format!("bad schedule json: {e}"))),
        }
    }

    fn open_records(&self, employee_id: &str) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, employee_id, site_id, clock_in, clock_out, clock_in_lat, clock_in_lon
             FROM attendance_records
             WHERE employee_id = ?1 AND clock_out IS NULL
             ORDER BY clock_in",
        )?;
        let rows = stmt.query_map(params![employee_id], map_record_row)?;
        collect_records(rows)
    }

    fn create_record(
        &self,
        employee_id: &str,
        site_id: &str,
        clock_in: DateTime<Utc>,
        coordinate: Option<Coordinate>,
    ) -> Result<AttendanceRecord, StoreError> {
        let record = AttendanceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            employee_id: employee_id.into(),
            site_id: site_id.into(),
            clock_in,
            clock_out: None,
            clock_in_coordinate: coordinate,
        };
        self.lock().execute(
            "INSERT INTO attendance_records
                (id, employee_id, site_id, clock_in, clock_out, clock_in_lat, clock_in_lon)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6)",
            params![
                record.id,
                record.employee_id,
                record.site_id,
                record.clock_in.to_rfc3339(),
                coordinate.map(|c| c.latitude),
                coordinate.map(|c| c.longitude),
            ],
        )?;
        Ok(record)
    }

    fn close_record(&self, record_id: &str, clock_out: DateTime<Utc>) -> Result<(), StoreError> {
        let n = self.lock().execute(
            "UPDATE attendance_records SET clock_out = ?2
             WHERE id = ?1 AND clock_out IS NULL",
            params![record_id, clock_out.to_rfc3339()],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(format!("open record '{record_id}'")));
        }
        Ok(())
    }
}
