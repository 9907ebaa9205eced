use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{EtlError, Result};
use crate::pipeline::processing::table::{coerce_fips, CaseRecord, CaseTable};

/// SQLite staging store holding the case table between populate and extract.
pub struct StagingDb {
    conn: Connection,
    table: String,
}

impl StagingDb {
    pub fn open<P: AsRef<Path>>(db_path: P, table: &str) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        debug!(path = %db_path.display(), "Opened staging database");
        Self::with_connection(conn, table)
    }

    pub fn open_in_memory(table: &str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self> {
        // the name is spliced into SQL text
        let valid = !table.is_empty()
            && !table.starts_with(|c: char| c.is_ascii_digit())
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(EtlError::config(format!("invalid table name '{}'", table)));
        }
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    /// Drop and recreate the staging table.
    pub fn recreate_table(&self) -> Result<()> {
        self.conn.execute_batch(&format!(
            r#"
            DROP TABLE IF EXISTS {t};
            CREATE TABLE {t} (
                case_type         TEXT,
                cases             INTEGER,
                difference        INTEGER,
                date              TEXT,
                country_region    TEXT,
                province_state    TEXT,
                admin2            TEXT,
                combined_key      TEXT,
                fips              INTEGER,
                lat               TEXT,
                long              TEXT,
                location          TEXT,
                table_names       TEXT,
                prep_flow_runtime TEXT
            );
            "#,
            t = self.table
        ))?;
        info!(table = %self.table, "Table created");
        Ok(())
    }

    /// Insert every record in one transaction. Returns the number inserted.
    pub fn insert_all(&mut self, table: &CaseTable) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (case_type, cases, difference, date, country_region, province_state, \
                 admin2, combined_key, fips, lat, long, location, table_names, prep_flow_runtime) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                self.table
            ))?;
            for r in &table.records {
                stmt.execute(params![
                    non_blank(&r.case_type),
                    r.cases,
                    r.difference,
                    non_blank(&r.date),
                    non_blank(&r.country_region),
                    non_blank(&r.province_state),
                    non_blank(&r.admin2),
                    non_blank(&r.combined_key),
                    coerce_fips(r.fips.as_deref()),
                    non_blank(&r.lat),
                    non_blank(&r.long),
                    non_blank(&r.location),
                    non_blank(&r.table_names),
                    non_blank(&r.prep_flow_runtime),
                ])?;
            }
        }
        tx.commit()?;
        info!(table = %self.table, rows = table.len(), "Data inserted");
        Ok(table.len())
    }

    /// Read the whole table back in insertion order.
    pub fn read_all(&self) -> Result<CaseTable> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT case_type, cases, difference, date, country_region, province_state, admin2, \
             combined_key, fips, lat, long, location, table_names, prep_flow_runtime \
             FROM {} ORDER BY rowid",
            self.table
        ))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(table = %self.table, rows = records.len(), "Data extracted");
        Ok(CaseTable::new(records))
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<CaseRecord> {
    Ok(CaseRecord {
        case_type: text(row, 0)?,
        cases: row.get(1)?,
        difference: row.get(2)?,
        date: text(row, 3)?,
        country_region: text(row, 4)?,
        province_state: text(row, 5)?,
        admin2: text(row, 6)?,
        combined_key: text(row, 7)?,
        fips: text(row, 8)?,
        lat: text(row, 9)?,
        long: text(row, 10)?,
        location: text(row, 11)?,
        table_names: text(row, 12)?,
        prep_flow_runtime: text(row, 13)?,
    })
}

/// Read any column as text; SQLite may hand back an integer or real for it.
fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    })
}
