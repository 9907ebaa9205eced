use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::constants;
use crate::error::{EtlError, Result};

/// One row of the working table, in staging-table column order.
///
/// Every text field is nullable; an empty CSV cell reads as `None`. `fips`, `lat` and
/// `long` stay as source text because the cleaning stage only ever coerces or drops
/// them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct CaseRecord {
    pub case_type: Option<String>,
    pub cases: Option<i64>,
    pub difference: Option<i64>,
    pub date: Option<String>,
    pub country_region: Option<String>,
    pub province_state: Option<String>,
    pub admin2: Option<String>,
    pub combined_key: Option<String>,
    pub fips: Option<String>,
    pub lat: Option<String>,
    pub long: Option<String>,
    pub location: Option<String>,
    pub table_names: Option<String>,
    pub prep_flow_runtime: Option<String>,
}

/// CSV row as read, before numeric columns are checked.
#[derive(Debug, Deserialize)]
struct RawCaseRow {
    #[serde(default)]
    case_type: Option<String>,
    #[serde(default)]
    cases: Option<String>,
    #[serde(default)]
    difference: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    country_region: Option<String>,
    #[serde(default)]
    province_state: Option<String>,
    #[serde(default)]
    admin2: Option<String>,
    #[serde(default)]
    combined_key: Option<String>,
    #[serde(default)]
    fips: Option<String>,
    #[serde(default)]
    lat: Option<String>,
    #[serde(default)]
    long: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    table_names: Option<String>,
    #[serde(default)]
    prep_flow_runtime: Option<String>,
}

impl RawCaseRow {
    fn into_record(self, row: usize) -> Result<CaseRecord> {
        Ok(CaseRecord {
            case_type: self.case_type,
            cases: parse_count(constants::CASES, row, self.cases)?,
            difference: parse_count(constants::DIFFERENCE, row, self.difference)?,
            date: self.date,
            country_region: self.country_region,
            province_state: self.province_state,
            admin2: self.admin2,
            combined_key: self.combined_key,
            fips: self.fips,
            lat: self.lat,
            long: self.long,
            location: self.location,
            table_names: self.table_names,
            prep_flow_runtime: self.prep_flow_runtime,
        })
    }
}

/// Parse an integer count. Snapshots written by float-typed tools carry `10.0`, so an
/// integral float is accepted; anything else is an unreadable input.
fn parse_count(column: &'static str, row: usize, value: Option<String>) -> Result<Option<i64>> {
    let Some(text) = value else {
        return Ok(None);
    };
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(Some(n));
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Ok(Some(f as i64)),
        _ => Err(EtlError::InvalidNumber {
            column,
            row,
            value: text,
        }),
    }
}

/// Coerce a FIPS code to an integer; missing or unparseable codes become 0.
pub fn coerce_fips(value: Option<&str>) -> i64 {
    let Some(text) = value.map(str::trim).filter(|t| !t.is_empty()) else {
        return 0;
    };
    if let Ok(n) = text.parse::<i64>() {
        return n;
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => f as i64,
        _ => {
            debug!(value = %text, "fips not numeric, using 0");
            0
        }
    }
}

/// The in-memory table the cleaning components pass along.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseTable {
    pub records: Vec<CaseRecord>,
}

impl CaseTable {
    pub fn new(records: Vec<CaseRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column count of the staging schema, for shape logging.
    pub fn width(&self) -> usize {
        constants::STAGING_COLUMNS.len()
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        info!(path = %path.display(), rows = table.len(), "Data read successfully");
        Ok(table)
    }

    /// Read a snapshot. Every column but `combined_key` must be present in the header.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        // serde matches fields against the trimmed names the check below sees
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        for column in constants::REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(EtlError::MissingColumn(column.to_string()));
            }
        }

        let mut records = Vec::new();
        for (idx, result) in rdr.deserialize::<RawCaseRow>().enumerate() {
            // 1-based data row, header excluded
            records.push(result?.into_record(idx + 1)?);
        }
        Ok(Self { records })
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;
        let file = fs::File::create(path)?;
        self.to_writer(file)?;
        info!(path = %path.display(), rows = self.len(), "Data saved");
        Ok(())
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        wtr.write_record(constants::STAGING_COLUMNS)?;
        for record in &self.records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Drop rows equal to an earlier row, keeping first occurrences in order.
    /// Returns the number removed.
    pub fn drop_duplicates(&mut self) -> usize {
        dedupe_in_place(&mut self.records)
    }
}

/// One row of the cleaned output, fields in output-file order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CleanedRecord {
    pub case_type: Option<String>,
    pub cases: i64,
    pub difference: i64,
    /// `None` when the source date could not be parsed
    pub date: Option<NaiveDate>,
    pub fips: i64,
    /// Composite `admin2, province_state, country_region` key
    pub location: String,
    /// Coordinate pair text, `(x, y)`
    pub geo_location: Option<String>,
    pub table_names: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedTable {
    pub records: Vec<CleanedRecord>,
}

impl CleanedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn columns(&self) -> &'static [&'static str] {
        &constants::OUTPUT_COLUMNS
    }

    pub fn width(&self) -> usize {
        constants::OUTPUT_COLUMNS.len()
    }

    pub fn drop_duplicates(&mut self) -> usize {
        dedupe_in_place(&mut self.records)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;
        let file = fs::File::create(path)?;
        self.to_writer(file)?;
        info!(path = %path.display(), rows = self.len(), "Data saved");
        Ok(())
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        wtr.write_record(constants::OUTPUT_COLUMNS)?;
        for record in &self.records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn dedupe_in_place<T: Clone + Eq + std::hash::Hash>(rows: &mut Vec<T>) -> usize {
    let before = rows.len();
    let mut seen = HashSet::with_capacity(before);
    rows.retain(|row| seen.insert(row.clone()));
    before - rows.len()
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
