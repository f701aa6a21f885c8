use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use tracing::{debug, warn};

use tw_core::{Error, Formula, Tap};

use crate::mapping::{FormulaRecord, TapRecord, formula_from_record, formula_to_record, tap_from_record, tap_to_record};

/// Schema version written by this build.
pub const SCHEMA_VERSION: i64 = 2;

const FORMULA_COLUMNS: &str = "id, tap_id, name, details, homepage, license, local_project_path, upload_type, test_command_kind, test_command_value, extra_build_args";

/// Persistent store for taps and their formulas.
///
/// The only writer of tap/formula records. Deleting a tap cascades to its
/// formulas through the foreign key.
pub struct Database {
    conn: Connection,
}

fn store_err(context: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::StoreCorruption {
        message: format!("{context}: {e}"),
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let conn = Connection::open(path).map_err(|e| Error::StoreCorruption {
            message: format!("failed to open database {}: {e}", path.display()),
        })?;

        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().map_err(store_err("failed to open in-memory database"))?;

        Self::from_connection(conn)
    }

    /// Wrap an existing connection, migrating its schema to the current version.
    pub fn from_connection(mut conn: Connection) -> Result<Self, Error> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(store_err("failed to enable foreign keys"))?;

        Self::migrate(&mut conn)?;

        Ok(Self { conn })
    }

    fn migrate(conn: &mut Connection) -> Result<(), Error> {
        let mut version = Self::read_schema_version(conn)?;

        if version > SCHEMA_VERSION {
            return Err(Error::StoreCorruption {
                message: format!(
                    "database schema version {version} is newer than this build supports ({SCHEMA_VERSION})"
                ),
            });
        }

        while version < SCHEMA_VERSION {
            let tx = conn.transaction().map_err(store_err("failed to start migration"))?;
            match version {
                0 => Self::create_v1(&tx)?,
                1 => Self::migrate_v1_to_v2(&tx)?,
                _ => unreachable!("versions above SCHEMA_VERSION are rejected"),
            }
            version += 1;
            tx.pragma_update(None, "user_version", version)
                .map_err(store_err("failed to record schema version"))?;
            tx.commit().map_err(store_err("failed to commit migration"))?;
            debug!(version, "migrated tap store schema");
        }

        Ok(())
    }

    fn read_schema_version(conn: &Connection) -> Result<i64, Error> {
        conn.query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(store_err("failed to read schema version"))
    }

    fn create_v1(tx: &Transaction<'_>) -> Result<(), Error> {
        tx.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS taps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                local_path TEXT NOT NULL UNIQUE,
                remote_path TEXT UNIQUE
            );

            CREATE TABLE IF NOT EXISTS formulas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tap_id INTEGER NOT NULL REFERENCES taps(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '',
                homepage TEXT NOT NULL DEFAULT '',
                license TEXT NOT NULL DEFAULT '',
                local_project_path TEXT NOT NULL DEFAULT '',
                upload_type TEXT NOT NULL DEFAULT 'binary',
                test_command TEXT,
                UNIQUE (tap_id, name)
            );
            ",
        )
        .map_err(store_err("failed to create schema v1"))
    }

    /// v2 splits the test command into kind/value, adds build arguments and timestamps.
    fn migrate_v1_to_v2(tx: &Transaction<'_>) -> Result<(), Error> {
        let additions = [
            ("test_command_kind", "TEXT"),
            ("test_command_value", "TEXT"),
            ("extra_build_args", "TEXT NOT NULL DEFAULT '[]'"),
            ("created_at", "INTEGER NOT NULL DEFAULT 0"),
            ("updated_at", "INTEGER NOT NULL DEFAULT 0"),
        ];
        for (column, decl) in additions {
            if !Self::has_column(tx, "formulas", column)? {
                tx.execute(&format!("ALTER TABLE formulas ADD COLUMN {column} {decl}"), [])
                    .map_err(store_err("failed to add formula column"))?;
            }
        }

        if Self::has_column(tx, "formulas", "test_command")? {
            tx.execute_batch(
                "
                UPDATE formulas SET test_command_kind = 'default'
                    WHERE test_command = '@default';
                UPDATE formulas SET test_command_kind = 'custom', test_command_value = test_command
                    WHERE test_command IS NOT NULL AND test_command <> '@default';
                ALTER TABLE formulas DROP COLUMN test_command;
                ",
            )
            .map_err(store_err("failed to convert test commands"))?;
        }

        tx.execute(
            "UPDATE formulas SET created_at = ?1, updated_at = ?1 WHERE created_at = 0",
            params![now()],
        )
        .map_err(store_err("failed to backfill timestamps"))?;

        Ok(())
    }

    fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, Error> {
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info(?1) WHERE name = ?2",
            params![table, column],
            |row| row.get(0),
        )
        .map_err(store_err("failed to read table schema"))
    }

    pub fn schema_version(&self) -> Result<i64, Error> {
        Self::read_schema_version(&self.conn)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// All taps with their formulas, ordered by name.
    pub fn load_taps(&self) -> Result<Vec<Tap>, Error> {
        let taps = self.tap_records(None)?;
        let formulas = self.formula_records(None)?;

        Ok(taps.iter().map(|t| tap_from_record(t, &formulas)).collect())
    }

    pub fn get_tap(&self, name: &str) -> Result<Option<Tap>, Error> {
        let Some(record) = self.tap_records(Some(name))?.into_iter().next() else {
            return Ok(None);
        };
        let formulas = self.formula_records(Some(record.id))?;

        Ok(Some(tap_from_record(&record, &formulas)))
    }

    pub fn get_formula(&self, tap: &str, name: &str) -> Result<Option<Formula>, Error> {
        let Some(tap_id) = Self::tap_id(&self.conn, tap)? else {
            return Ok(None);
        };

        self.conn
            .query_row(
                &format!("SELECT {FORMULA_COLUMNS} FROM formulas WHERE tap_id = ?1 AND name = ?2"),
                params![tap_id, name],
                formula_row,
            )
            .optional()
            .map(|record| record.map(|r| formula_from_record(&r, tap)))
            .map_err(store_err("failed to query formula"))
    }

    fn tap_records(&self, name: Option<&str>) -> Result<Vec<TapRecord>, Error> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, local_path, remote_path FROM taps
                 WHERE ?1 IS NULL OR name = ?1 ORDER BY name",
            )
            .map_err(store_err("failed to prepare statement"))?;

        let taps = stmt
            .query_map(params![name], |row| {
                Ok(TapRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    local_path: row.get(2)?,
                    remote_path: row.get(3)?,
                })
            })
            .map_err(store_err("failed to query taps"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err("failed to collect results"))?;

        Ok(taps)
    }

    fn formula_records(&self, tap_id: Option<i64>) -> Result<Vec<FormulaRecord>, Error> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {FORMULA_COLUMNS} FROM formulas WHERE ?1 IS NULL OR tap_id = ?1 ORDER BY name"
            ))
            .map_err(store_err("failed to prepare statement"))?;

        let formulas = stmt
            .query_map(params![tap_id], formula_row)
            .map_err(store_err("failed to query formulas"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_err("failed to collect results"))?;

        Ok(formulas)
    }

    fn tap_id(conn: &Connection, name: &str) -> Result<Option<i64>, Error> {
        conn.query_row("SELECT id FROM taps WHERE name = ?1", params![name], |row| row.get(0))
            .optional()
            .map_err(store_err("failed to look up tap"))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert a tap together with its initial formulas, all or nothing.
    pub fn save_new_tap(&mut self, tap: &Tap, formulas: &[Formula]) -> Result<(), Error> {
        let record = tap_to_record(tap);
        let tx = self.conn.transaction().map_err(store_err("failed to start transaction"))?;

        for (field, column, value) in [
            ("name", "name", Some(record.name.clone())),
            ("local path", "local_path", Some(record.local_path.clone())),
            ("remote path", "remote_path", record.remote_path.clone()),
        ] {
            let Some(value) = value else { continue };
            let taken: bool = tx
                .query_row(
                    &format!("SELECT COUNT(*) > 0 FROM taps WHERE {column} = ?1"),
                    params![value],
                    |row| row.get(0),
                )
                .map_err(store_err("failed to check tap uniqueness"))?;
            if taken {
                return Err(Error::DuplicateTap { field, value });
            }
        }

        tx.execute(
            "INSERT INTO taps (name, local_path, remote_path) VALUES (?1, ?2, ?3)",
            params![record.name, record.local_path, record.remote_path],
        )
        .map_err(store_err("failed to insert tap"))?;
        let tap_id = tx.last_insert_rowid();

        for formula in formulas {
            Self::insert_formula(&tx, formula, tap_id, &tap.name)?;
        }

        tx.commit().map_err(store_err("failed to commit transaction"))
    }

    /// Add a formula to an existing tap.
    ///
    /// Fails with `MissingTap` without writing anything when the tap is unknown.
    pub fn save_new_formula(&mut self, formula: &Formula, tap: &str) -> Result<(), Error> {
        let tx = self.conn.transaction().map_err(store_err("failed to start transaction"))?;
        let tap_id = Self::tap_id(&tx, tap)?.ok_or_else(|| Error::MissingTap {
            name: tap.to_string(),
        })?;

        Self::insert_formula(&tx, formula, tap_id, tap)?;

        tx.commit().map_err(store_err("failed to commit transaction"))
    }

    fn insert_formula(tx: &Transaction<'_>, formula: &Formula, tap_id: i64, tap: &str) -> Result<(), Error> {
        let exists: bool = tx
            .query_row(
                "SELECT COUNT(*) > 0 FROM formulas WHERE tap_id = ?1 AND name = ?2",
                params![tap_id, formula.name],
                |row| row.get(0),
            )
            .map_err(store_err("failed to check formula uniqueness"))?;
        if exists {
            return Err(Error::DuplicateFormula {
                tap: tap.to_string(),
                name: formula.name.clone(),
            });
        }

        let r = formula_to_record(formula, tap_id);
        let ts = now();
        tx.execute(
            "INSERT INTO formulas (tap_id, name, details, homepage, license, local_project_path,
                                   upload_type, test_command_kind, test_command_value,
                                   extra_build_args, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                r.tap_id,
                r.name,
                r.details,
                r.homepage,
                r.license,
                r.local_project_path,
                r.upload_type,
                r.test_command_kind,
                r.test_command_value,
                r.extra_build_args,
                ts
            ],
        )
        .map_err(store_err("failed to insert formula"))?;

        Ok(())
    }

    /// Overwrite the mutable fields of an existing formula, matched by name
    /// within its owning tap.
    ///
    /// Returns `false` without writing when no such record exists or the
    /// formula names no tap; this never creates.
    pub fn update_formula(&mut self, formula: &Formula) -> Result<bool, Error> {
        let Some(tap) = formula.tap.as_deref() else {
            warn!(formula = %formula.name, "update for a formula without an owning tap ignored");
            return Ok(false);
        };
        let Some(tap_id) = Self::tap_id(&self.conn, tap)? else {
            warn!(formula = %formula.name, tap, "update for a formula of an unknown tap ignored");
            return Ok(false);
        };

        let r = formula_to_record(formula, tap_id);
        let rows_affected = self
            .conn
            .execute(
                "UPDATE formulas SET details = ?1, homepage = ?2, license = ?3,
                        local_project_path = ?4, upload_type = ?5, test_command_kind = ?6,
                        test_command_value = ?7, extra_build_args = ?8, updated_at = ?9
                 WHERE name = ?10 AND tap_id = ?11",
                params![
                    r.details,
                    r.homepage,
                    r.license,
                    r.local_project_path,
                    r.upload_type,
                    r.test_command_kind,
                    r.test_command_value,
                    r.extra_build_args,
                    now(),
                    r.name,
                    tap_id
                ],
            )
            .map_err(store_err("failed to update formula"))?;

        if rows_affected == 0 {
            warn!(formula = %formula.name, "no persisted formula to update");
        }

        Ok(rows_affected > 0)
    }

    /// Remove a tap and, through the cascade, all of its formulas.
    pub fn delete_tap(&mut self, name: &str) -> Result<bool, Error> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM taps WHERE name = ?1", params![name])
            .map_err(store_err("failed to delete tap"))?;

        Ok(rows_affected > 0)
    }

    pub fn delete_formula(&mut self, tap: &str, name: &str) -> Result<bool, Error> {
        let Some(tap_id) = Self::tap_id(&self.conn, tap)? else {
            return Err(Error::MissingTap { name: tap.to_string() });
        };

        let rows_affected = self
            .conn
            .execute(
                "DELETE FROM formulas WHERE tap_id = ?1 AND name = ?2",
                params![tap_id, name],
            )
            .map_err(store_err("failed to delete formula"))?;

        Ok(rows_affected > 0)
    }

    /// Total number of formula rows, across all taps.
    pub fn formula_count(&self) -> Result<i64, Error> {
        self.conn
            .query_row("SELECT COUNT(*) FROM formulas", [], |row| row.get(0))
            .map_err(store_err("failed to count formulas"))
    }
}

fn formula_row(row: &Row<'_>) -> rusqlite::Result<FormulaRecord> {
    Ok(FormulaRecord {
        id: row.get(0)?,
        tap_id: row.get(1)?,
        name: row.get(2)?,
        details: row.get(3)?,
        homepage: row.get(4)?,
        license: row.get(5)?,
        local_project_path: row.get(6)?,
        upload_type: row.get(7)?,
        test_command_kind: row.get(8)?,
        test_command_value: row.get(9)?,
        extra_build_args: row.get(10)?,
    })
}
