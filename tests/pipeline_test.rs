use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use uuid::Uuid;

use covid_etl::app::ports::DatasetSourcePort;
use covid_etl::config::{Config, StorageBackend};
use covid_etl::infra::FsObjectStore;
use covid_etl::pipeline::processing::quality_gate::QualityIssueType;
use covid_etl::pipeline::tasks::{self, TransformOptions};

const RAW_HEADER: &str = "case_type,cases,difference,date,country_region,province_state,admin2,combined_key,fips,lat,long,location,table_names,prep_flow_runtime";
const OUTPUT_HEADER: &str = "case_type,cases,difference,date,fips,location,geo_location,table_names";

fn raw_csv() -> String {
    [
        RAW_HEADER,
        // negative count: dropped
        "Confirmed,-5,0,2020-04-01,US,New York,,,36061,40.7,-74.0,POINT(1 2),JHU Time Series,2020-04-02",
        "Confirmed,10,2,2020-04-01,us,new york,Unassigned,,36061.0,40.7,-74.0,POINT(-74.0 40.7),JHU Time Series,2020-04-02",
        // exact duplicate of the row above
        "Confirmed,10,2,2020-04-01,us,new york,Unassigned,,36061.0,40.7,-74.0,POINT(-74.0 40.7),JHU Time Series,2020-04-02",
        "Deaths,,,2020-04-01,US,Texas,dallas,,n/a,32.7,-96.7,POINT(-96.7 32.7),JHU Time Series,2020-04-02",
    ]
    .join("\n")
        + "\n"
}

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.data_dir = root.join("data");
    config.paths.log_dir = root.join("logs");
    config.database.path = root.join("data/covid_cases.db");
    config.geocoding.enabled = false;
    config.storage.backend = StorageBackend::Fs;
    config.storage.bucket = Some("covid-etl".to_string());
    config.storage.root = Some(root.join("objects"));
    config.dataset.table_name = Some("covid_19_cases".to_string());
    config
}

#[test]
fn test_transform_from_csv_fixture() -> Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path());
    let input = dir.path().join("input.csv");
    fs::write(&input, raw_csv())?;

    let opts = TransformOptions {
        skip_geocoding: true,
        input: Some(input),
        output: None,
    };
    let summary = tasks::transform_blocking(&config, &opts)?;

    assert_eq!(summary.report.initial_rows, 4);
    assert_eq!(summary.report.final_rows, 2);
    assert_eq!(summary.report.missing.negative_dropped, 1);

    let written = fs::read_to_string(config.paths.transformed_data())?;
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines[0], OUTPUT_HEADER);
    assert_eq!(
        lines[1],
        "Confirmed,10,2,2020-04-01,36061,\"New York, US\",\"(-74.0, 40.7)\",JHU Time Series"
    );
    assert_eq!(
        lines[2],
        "Deaths,0,0,2020-04-01,0,\"Dallas, Texas, US\",\"(-96.7, 32.7)\",JHU Time Series"
    );
    assert_eq!(lines.len(), 3);
    Ok(())
}

#[test]
fn test_transform_uses_configured_case_types() -> Result<()> {
    let dir = tempdir()?;
    let mut config = test_config(dir.path());
    config.quality.expected_case_types = vec!["Confirmed".to_string()];
    let input = dir.path().join("input.csv");
    fs::write(&input, raw_csv())?;

    let summary = tasks::transform_blocking(
        &config,
        &TransformOptions {
            skip_geocoding: true,
            input: Some(input),
            output: None,
        },
    )?;

    let issue = summary
        .report
        .assessment
        .issues
        .iter()
        .find(|i| i.issue_type == QualityIssueType::UnexpectedCategory)
        .expect("Deaths is outside the configured set");
    assert_eq!(issue.rows, 1);
    // flagged rows are kept
    assert_eq!(summary.report.final_rows, 2);
    Ok(())
}

#[test]
fn test_transform_rerun_is_byte_identical() -> Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path());
    let input = dir.path().join("input.csv");
    fs::write(&input, raw_csv())?;

    let first = dir.path().join("first.csv");
    let second = dir.path().join("second.csv");
    for output in [&first, &second] {
        tasks::transform_blocking(
            &config,
            &TransformOptions {
                skip_geocoding: true,
                input: Some(input.clone()),
                output: Some(output.clone()),
            },
        )?;
    }
    assert_eq!(fs::read(&first)?, fs::read(&second)?);
    Ok(())
}

#[test]
fn test_transform_missing_column_fails() -> Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path());
    let input = dir.path().join("input.csv");
    fs::write(&input, "case_type,cases\nConfirmed,1\n")?;

    let err = tasks::transform_blocking(
        &config,
        &TransformOptions {
            skip_geocoding: true,
            input: Some(input),
            output: None,
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("Missing required column"));
    assert!(!config.paths.transformed_data().exists());
    Ok(())
}

#[test]
fn test_populate_then_extract_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path());
    fs::create_dir_all(&config.paths.data_dir)?;
    fs::write(config.paths.raw_data(), raw_csv())?;

    let populated = tasks::populate_blocking(&config)?;
    assert_eq!(populated.rows_inserted, 4);
    assert_eq!(populated.points_converted, 4);
    assert!(config.paths.preprocessed_data().exists());

    // repopulating recreates the table instead of appending
    tasks::populate_blocking(&config)?;
    assert_eq!(tasks::extract_blocking(&config)?, 4);

    let extracted = fs::read_to_string(config.paths.extracted_data())?;
    let lines: Vec<&str> = extracted.lines().collect();
    assert_eq!(lines[0], RAW_HEADER);
    assert!(lines[2].contains("\"(-74.0, 40.7)\""));
    assert!(lines[2].contains(",36061,"));
    assert!(lines[4].contains(",0,"));
    Ok(())
}

struct FixtureSource;

#[async_trait]
impl DatasetSourcePort for FixtureSource {
    async fn query_csv(&self, query: &str) -> covid_etl::error::Result<Vec<u8>> {
        assert_eq!(query, "SELECT * FROM covid_19_cases LIMIT 5000");
        Ok(raw_csv().into_bytes())
    }
}

#[tokio::test]
async fn test_stages_end_to_end_with_fs_store() -> Result<()> {
    let dir = tempdir()?;
    let config = test_config(dir.path());
    let run_id = Uuid::new_v4();

    let fetched = tasks::fetch_with(&config, &FixtureSource).await?;
    assert_eq!(fetched.rows, 4);

    tasks::populate(&config, run_id).await?;
    tasks::extract(&config, run_id).await?;
    let transformed = tasks::transform(
        &config,
        run_id,
        TransformOptions {
            skip_geocoding: true,
            ..TransformOptions::default()
        },
    )
    .await?;
    assert_eq!(transformed.report.final_rows, 2);

    let store = FsObjectStore::new(dir.path().join("objects"));
    let loaded = tasks::load_with(&config, &store, run_id).await?;

    let object = dir.path().join("objects/covid-etl/transformed_data.csv");
    let uploaded = fs::read(&object)?;
    assert_eq!(uploaded, fs::read(config.paths.transformed_data())?);
    assert_eq!(loaded.sha256, tasks::sha256_hex(&uploaded));
    assert_eq!(loaded.bytes, uploaded.len());

    let meta: HashMap<String, String> =
        serde_json::from_slice(&fs::read(dir.path().join("objects/covid-etl/transformed_data.csv.meta.json"))?)?;
    assert_eq!(meta.get("sha256"), Some(&loaded.sha256));
    assert_eq!(meta.get("run-id"), Some(&run_id.to_string()));
    Ok(())
}

#[tokio::test]
async fn test_load_requires_bucket() -> Result<()> {
    let dir = tempdir()?;
    let mut config = test_config(dir.path());
    config.storage.bucket = None;

    let store = FsObjectStore::new(dir.path().join("objects"));
    let err = tasks::load_with(&config, &store, Uuid::new_v4()).await.unwrap_err();
    assert!(err.to_string().contains("BUCKET_NAME"));
    Ok(())
}
