use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::config::QualityConfig;
use crate::constants;
use crate::observability::metrics;
use crate::pipeline::processing::normalize::combined_key;
use crate::pipeline::processing::table::{coerce_fips, CaseRecord, CaseTable, CleanedRecord, CleanedTable};

/// Quality Gate decision for the reshaped table. Data-quality findings never stop the
/// run, so there is no rejecting outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityDecision {
    Accept,
    AcceptWithWarnings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityIssueType {
    /// Categorical value outside the expected set
    UnexpectedCategory,
    /// Value could not be parsed and was replaced by a default
    CoercedValue,
}

/// Severity levels for quality issues
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualitySeverity {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityIssue {
    pub issue_type: QualityIssueType,
    pub severity: QualitySeverity,
    pub description: String,
    pub field: &'static str,
    /// Number of rows the issue applies to
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityAssessment {
    pub decision: QualityDecision,
    pub issues: Vec<QualityIssue>,
}

impl QualityAssessment {
    fn from_issues(issues: Vec<QualityIssue>) -> Self {
        let decision = if issues.iter().any(|i| i.severity >= QualitySeverity::Warning) {
            QualityDecision::AcceptWithWarnings
        } else {
            QualityDecision::Accept
        };
        Self { decision, issues }
    }
}

/// Parse a date the way the snapshots spell it. Timestamps keep only their date part.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%m-%d-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Drops the columns folded into the composite key, swaps the location names, coerces
/// types, and reports data-quality findings.
pub struct SchemaGate {
    pub config: QualityConfig,
}

impl SchemaGate {
    pub fn new() -> Self {
        Self {
            config: QualityConfig::default(),
        }
    }

    pub fn with_config(config: QualityConfig) -> Self {
        Self { config }
    }

    fn reshape_record(record: CaseRecord, unparsed_dates: &mut usize, coerced_fips: &mut usize) -> CleanedRecord {
        let date = record.date.as_deref().and_then(parse_date);
        if date.is_none() && record.date.is_some() {
            *unparsed_dates += 1;
        }

        let fips = coerce_fips(record.fips.as_deref());
        if fips == 0 && record.fips.as_deref().is_some_and(|f| f.trim().parse::<f64>().is_err()) {
            *coerced_fips += 1;
        }

        // combined_key is normally derived already; recompute if this table skipped that pass
        let location = record.combined_key.unwrap_or_else(|| {
            combined_key(
                record.admin2.as_deref(),
                record.province_state.as_deref(),
                record.country_region.as_deref(),
            )
        });

        CleanedRecord {
            case_type: record.case_type,
            cases: record.cases.unwrap_or(0),
            difference: record.difference.unwrap_or(0),
            date,
            fips,
            location,
            geo_location: record.location,
            table_names: record.table_names,
        }
    }

    /// Reshape into the output schema.
    pub fn reshape(&self, table: CaseTable) -> (CleanedTable, Vec<QualityIssue>) {
        let initial_columns = table.width();
        let mut unparsed_dates = 0;
        let mut coerced_fips = 0;

        let records = table
            .records
            .into_iter()
            .map(|r| Self::reshape_record(r, &mut unparsed_dates, &mut coerced_fips))
            .collect();
        let cleaned = CleanedTable { records };

        info!(
            "Dropped repetitive columns: {} column(s) removed",
            constants::DROPPED_COLUMNS.len()
        );
        info!(
            from = initial_columns,
            to = cleaned.width(),
            "Renamed columns: location -> geo_location, combined_key -> location"
        );

        let mut issues = Vec::new();
        if unparsed_dates > 0 {
            metrics::clean::dates_coerced(unparsed_dates);
            warn!(rows = unparsed_dates, "Unparseable 'date' values set to null");
            issues.push(QualityIssue {
                issue_type: QualityIssueType::CoercedValue,
                severity: QualitySeverity::Info,
                description: format!("{} date value(s) could not be parsed", unparsed_dates),
                field: constants::DATE,
                rows: unparsed_dates,
            });
        }
        if coerced_fips > 0 {
            issues.push(QualityIssue {
                issue_type: QualityIssueType::CoercedValue,
                severity: QualitySeverity::Info,
                description: format!("{} fips value(s) were not numeric and became 0", coerced_fips),
                field: constants::FIPS,
                rows: coerced_fips,
            });
        }

        (cleaned, issues)
    }

    /// Check `case_type` against the expected categories. Offending rows are kept.
    pub fn check_case_types(&self, table: &CleanedTable) -> Option<QualityIssue> {
        let unexpected: BTreeSet<&str> = table
            .records
            .iter()
            .map(|r| r.case_type.as_deref().unwrap_or(""))
            .filter(|v| !self.config.expected_case_types.iter().any(|e| e == v))
            .collect();
        if unexpected.is_empty() {
            return None;
        }

        let rows = table
            .records
            .iter()
            .filter(|r| unexpected.contains(r.case_type.as_deref().unwrap_or("")))
            .count();
        metrics::clean::unexpected_case_types(rows);
        warn!(values = ?unexpected, rows, "Unexpected values found in 'case_type' column");

        Some(QualityIssue {
            issue_type: QualityIssueType::UnexpectedCategory,
            severity: QualitySeverity::Warning,
            description: format!("Unexpected case_type values: {:?}", unexpected),
            field: constants::CASE_TYPE,
            rows,
        })
    }

    pub fn assess(&self, table: CaseTable) -> (CleanedTable, QualityAssessment) {
        let (cleaned, mut issues) = self.reshape(table);
        issues.extend(self.check_case_types(&cleaned));
        (cleaned, QualityAssessment::from_issues(issues))
    }
}

impl Default for SchemaGate {
    fn default() -> Self {
        Self::new()
    }
}
