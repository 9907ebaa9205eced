/// Column names shared by the CSV snapshots and the staging table.
/// These keep the stages agreeing on one schema without magic strings.

pub const CASE_TYPE: &str = "case_type";
pub const CASES: &str = "cases";
pub const DIFFERENCE: &str = "difference";
pub const DATE: &str = "date";
pub const COUNTRY_REGION: &str = "country_region";
pub const PROVINCE_STATE: &str = "province_state";
pub const ADMIN2: &str = "admin2";
pub const COMBINED_KEY: &str = "combined_key";
pub const FIPS: &str = "fips";
pub const LAT: &str = "lat";
pub const LONG: &str = "long";
pub const LOCATION: &str = "location";
pub const GEO_LOCATION: &str = "geo_location";
pub const TABLE_NAMES: &str = "table_names";
pub const PREP_FLOW_RUNTIME: &str = "prep_flow_runtime";

/// Staging table columns, in table order.
pub const STAGING_COLUMNS: [&str; 14] = [
    CASE_TYPE,
    CASES,
    DIFFERENCE,
    DATE,
    COUNTRY_REGION,
    PROVINCE_STATE,
    ADMIN2,
    COMBINED_KEY,
    FIPS,
    LAT,
    LONG,
    LOCATION,
    TABLE_NAMES,
    PREP_FLOW_RUNTIME,
];

/// Columns the cleaning stage cannot run without. `combined_key` is derived, so an
/// input that lacks it is fine.
pub const REQUIRED_COLUMNS: [&str; 13] = [
    CASE_TYPE,
    CASES,
    DIFFERENCE,
    DATE,
    COUNTRY_REGION,
    PROVINCE_STATE,
    ADMIN2,
    FIPS,
    LAT,
    LONG,
    LOCATION,
    TABLE_NAMES,
    PREP_FLOW_RUNTIME,
];

/// Columns removed once `combined_key` and `location` have absorbed them.
pub const DROPPED_COLUMNS: [&str; 6] = [
    COUNTRY_REGION,
    PROVINCE_STATE,
    ADMIN2,
    LAT,
    LONG,
    PREP_FLOW_RUNTIME,
];

/// Output columns, in file order.
pub const OUTPUT_COLUMNS: [&str; 8] = [
    CASE_TYPE,
    CASES,
    DIFFERENCE,
    DATE,
    FIPS,
    LOCATION,
    GEO_LOCATION,
    TABLE_NAMES,
];

pub const EXPECTED_CASE_TYPES: [&str; 2] = ["Confirmed", "Deaths"];

// admin2 placeholders that carry no county information
pub const ADMIN2_UNASSIGNED: &str = "Unassigned";
pub const ADMIN2_OUT_OF_PREFIX: &str = "Out of";

pub const POINT_PREFIX: &str = "POINT";

/// Coordinates the source uses when a location is unknown.
pub const DEFAULT_LOCATION_PLACEHOLDER: &str = "(0,0)";

pub const DEFAULT_TABLE_NAME: &str = "covid_cases";
pub const DEFAULT_ROW_LIMIT: u32 = 5000;
