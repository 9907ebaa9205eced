use tracing::info;

use crate::constants;
use crate::pipeline::processing::table::CaseTable;

/// What the missing/invalid value pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissingValueReport {
    pub negative_dropped: usize,
    pub cases_imputed: usize,
    pub difference_imputed: usize,
    pub admin2_nulled: usize,
}

/// `admin2` values that name no county.
pub fn is_admin2_sentinel(value: &str) -> bool {
    value == constants::ADMIN2_UNASSIGNED || value.starts_with(constants::ADMIN2_OUT_OF_PREFIX)
}

/// Drop negative counts, impute missing counts, null out admin2 placeholders.
///
/// Filtering runs first and looks at the raw `cases` value, so a null count is kept
/// (and imputed to 0) while a negative one is removed.
pub fn handle_negative_and_missing_values(table: &mut CaseTable) -> MissingValueReport {
    info!("Handling negative and missing values...");
    let mut report = MissingValueReport::default();

    let before = table.len();
    table.records.retain(|r| r.cases.map_or(true, |c| c >= 0));
    report.negative_dropped = before - table.len();

    for record in &mut table.records {
        if record.cases.is_none() {
            record.cases = Some(0);
            report.cases_imputed += 1;
        }
        if record.difference.is_none() {
            record.difference = Some(0);
            report.difference_imputed += 1;
        }
        if record.admin2.as_deref().is_some_and(is_admin2_sentinel) {
            record.admin2 = None;
            report.admin2_nulled += 1;
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::table::CaseRecord;

    fn record(cases: Option<i64>, admin2: Option<&str>) -> CaseRecord {
        CaseRecord {
            case_type: Some("Confirmed".to_string()),
            cases,
            admin2: admin2.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_drops_negative_and_imputes_missing() {
        let mut table = CaseTable::new(vec![
            record(Some(-5), None),
            record(None, None),
            record(Some(10), None),
        ]);
        let report = handle_negative_and_missing_values(&mut table);

        assert_eq!(report.negative_dropped, 1);
        assert_eq!(report.cases_imputed, 1);
        assert_eq!(report.difference_imputed, 2);
        assert_eq!(table.len(), 2);
        assert!(table
            .records
            .iter()
            .all(|r| r.cases.is_some_and(|c| c >= 0) && r.difference.is_some()));
        assert_eq!(table.records[0].cases, Some(0));
    }

    #[test]
    fn test_nulls_admin2_sentinels() {
        let mut table = CaseTable::new(vec![
            record(Some(1), Some("Unassigned")),
            record(Some(1), Some("Out of Tri-County Area")),
            record(Some(1), Some("Cook")),
            record(Some(1), Some("out of state")),
        ]);
        let report = handle_negative_and_missing_values(&mut table);

        assert_eq!(report.admin2_nulled, 2);
        assert_eq!(table.records[0].admin2, None);
        assert_eq!(table.records[1].admin2, None);
        assert_eq!(table.records[2].admin2.as_deref(), Some("Cook"));
        // prefix match is case-sensitive
        assert_eq!(table.records[3].admin2.as_deref(), Some("out of state"));
    }
}
