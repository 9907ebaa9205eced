//! Legacy `POINT(x y)` location text.

use tracing::error;

use crate::constants;
use crate::pipeline::processing::table::CaseTable;

/// Result of converting one location value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointOutcome {
    /// `POINT(x y)` rewritten as `(x, y)`
    Converted(String),
    /// Not in point form; returned as given
    Unchanged(String),
    /// Looked like a point but could not be split into two coordinates
    Malformed { original: String, reason: String },
}

impl PointOutcome {
    /// The value to store: the converted text, or the original when nothing changed.
    pub fn into_value(self) -> String {
        match self {
            PointOutcome::Converted(v) | PointOutcome::Unchanged(v) => v,
            PointOutcome::Malformed { original, .. } => original,
        }
    }
}

/// Convert `POINT(x y)` to `(x, y)`.
pub fn convert_point_format(value: &str) -> PointOutcome {
    if !value.starts_with(constants::POINT_PREFIX) {
        return PointOutcome::Unchanged(value.to_string());
    }

    let inner = value.replace("POINT(", "").replace(')', "");
    let tokens: Vec<&str> = inner.split_whitespace().collect();
    match tokens.as_slice() {
        [x, y] => PointOutcome::Converted(format!("({}, {})", x, y)),
        other => PointOutcome::Malformed {
            original: value.to_string(),
            reason: format!("expected 2 coordinates, found {}", other.len()),
        },
    }
}

/// Nullable wrapper used by the table pass; failures are logged, never raised.
pub fn normalize_point(value: Option<String>) -> (Option<String>, bool) {
    let Some(text) = value else {
        return (None, false);
    };
    match convert_point_format(&text) {
        PointOutcome::Malformed { original, reason } => {
            error!(value = %original, %reason, "Error occurred while converting point format");
            (Some(original), true)
        }
        outcome => (Some(outcome.into_value()), false),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointReport {
    pub converted: usize,
    pub malformed: usize,
}

/// Rewrite every `location` in place.
pub fn normalize_locations(table: &mut CaseTable) -> PointReport {
    let mut report = PointReport::default();
    for record in &mut table.records {
        let before_was_point = record
            .location
            .as_deref()
            .is_some_and(|l| l.starts_with(constants::POINT_PREFIX));
        let (value, malformed) = normalize_point(record.location.take());
        record.location = value;
        if malformed {
            report.malformed += 1;
        } else if before_was_point {
            report.converted += 1;
        }
    }
    report
}
