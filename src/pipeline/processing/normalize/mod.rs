use tracing::info;

use crate::pipeline::processing::table::CaseTable;

/// Title-case by word rule: a cased letter is uppercased when the previous character
/// is not a cased letter, lowercased otherwise. `"tri-county"` becomes `"Tri-County"`,
/// `"o'brien"` becomes `"O'Brien"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        let cased = c.is_uppercase() || c.is_lowercase();
        if cased {
            if prev_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
        } else {
            out.push(c);
        }
        prev_cased = cased;
    }
    out
}

/// Title-case a country name, keeping the `US` abbreviation upper case.
/// Surrounding whitespace is ignored for the comparison so the pass stays idempotent.
pub fn custom_title_case(s: &str) -> String {
    if s.trim().to_uppercase() == "US" {
        "US".to_string()
    } else {
        title_case(s)
    }
}

fn normalize_field(value: Option<String>, case: fn(&str) -> String) -> Option<String> {
    value
        .map(|v| case(&v).trim().to_string())
        // blank text would leave an empty member in the composite key
        .filter(|v| !v.is_empty())
}

/// Join the non-null parts, most specific first.
pub fn combined_key(
    admin2: Option<&str>,
    province_state: Option<&str>,
    country_region: Option<&str>,
) -> String {
    [admin2, province_state, country_region]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Canonicalize the geographic text columns and derive `combined_key`.
pub fn normalize_data(table: &mut CaseTable) {
    info!("Normalizing data columns...");
    for record in &mut table.records {
        record.country_region = normalize_field(record.country_region.take(), custom_title_case);
        record.province_state = normalize_field(record.province_state.take(), title_case);
        record.admin2 = normalize_field(record.admin2.take(), title_case);
        record.combined_key = Some(combined_key(
            record.admin2.as_deref(),
            record.province_state.as_deref(),
            record.country_region.as_deref(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::table::CaseRecord;

    #[test]
    fn test_title_case_word_rule() {
        assert_eq!(title_case("united states"), "United States");
        assert_eq!(title_case("NEW YORK"), "New York");
        assert_eq!(title_case("out of tri-county area"), "Out Of Tri-County Area");
        assert_eq!(title_case("o'brien"), "O'Brien");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_custom_title_case_keeps_us() {
        assert_eq!(custom_title_case("us"), "US");
        assert_eq!(custom_title_case("Us"), "US");
        assert_eq!(custom_title_case("united states"), "United States");
        assert_eq!(custom_title_case("usa"), "Usa");
        assert_eq!(custom_title_case(" us "), "US");
    }

    #[test]
    fn test_combined_key_skips_nulls() {
        assert_eq!(
            combined_key(Some("Queens"), Some("New York"), Some("US")),
            "Queens, New York, US"
        );
        assert_eq!(combined_key(None, Some("New York"), Some("US")), "New York, US");
        assert_eq!(combined_key(None, None, None), "");
    }

    #[test]
    fn test_normalize_data() {
        let mut table = CaseTable::new(vec![
            CaseRecord {
                country_region: Some(" us ".to_string()),
                province_state: Some("new york ".to_string()),
                admin2: Some("queens".to_string()),
                ..Default::default()
            },
            CaseRecord {
                country_region: Some("united kingdom".to_string()),
                province_state: Some("   ".to_string()),
                admin2: None,
                ..Default::default()
            },
        ]);
        normalize_data(&mut table);

        let first = &table.records[0];
        assert_eq!(first.country_region.as_deref(), Some("US"));
        assert_eq!(first.province_state.as_deref(), Some("New York"));
        assert_eq!(first.combined_key.as_deref(), Some("Queens, New York, US"));

        let second = &table.records[1];
        assert_eq!(second.province_state, None);
        assert_eq!(second.combined_key.as_deref(), Some("United Kingdom"));

        let once = table.clone();
        normalize_data(&mut table);
        assert_eq!(table, once);
    }
}
