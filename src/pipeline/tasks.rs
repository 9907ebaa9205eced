//! The pipeline stages as the CLI invokes them.
//!
//! Each stage reads its input from disk and writes its output to disk, so any stage can
//! be rerun on its own. Every stage runs inside a span carrying the run id, and records
//! success, failure and duration metrics.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app::ports::{DatasetSourcePort, ObjectStorePort};
use crate::config::{require, Config, StorageBackend};
use crate::error::{EtlError, Result};
use crate::infra::dataworld::{select_query, DataWorldSource};
use crate::infra::{FsObjectStore, S3ObjectStore};
use crate::observability::metrics;
use crate::pipeline::ingestion::{fetch_raw_data, preprocess_for_staging, FetchSummary};
use crate::pipeline::processing::geocode::NominatimGeocoder;
use crate::pipeline::processing::quality_gate::{QualityDecision, SchemaGate};
use crate::pipeline::processing::{CaseTable, Cleaner, CleaningReport};
use crate::pipeline::storage::StagingDb;

/// Overrides for the transform stage.
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    pub skip_geocoding: bool,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateSummary {
    pub rows_inserted: usize,
    pub points_converted: usize,
    pub points_malformed: usize,
}

#[derive(Debug, Clone)]
pub struct TransformSummary {
    pub output: PathBuf,
    pub report: CleaningReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub uri: String,
    pub bytes: usize,
    pub sha256: String,
}

/// Run one stage inside its span and record its outcome.
async fn instrumented<T, F>(stage: &'static str, run_id: Uuid, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let span = info_span!("stage", stage, run_id = %run_id);
    async move {
        info!("Stage started");
        let t0 = Instant::now();
        let result = fut.await;
        let secs = t0.elapsed().as_secs_f64();
        metrics::stage::duration(stage, secs);
        match &result {
            Ok(_) => {
                metrics::stage::success(stage);
                info!(duration_secs = secs, "Stage finished");
            }
            Err(e) => {
                metrics::stage::error(stage);
                error!(error = %e, duration_secs = secs, "Stage failed");
            }
        }
        result
    }
    .instrument(span)
    .await
}

pub async fn fetch(config: &Config, run_id: Uuid) -> Result<FetchSummary> {
    instrumented("fetch", run_id, async {
        let source = DataWorldSource::new(&config.dataset)?;
        fetch_with(config, &source).await
    })
    .await
}

/// Fetch through an explicit source.
pub async fn fetch_with(config: &Config, source: &dyn DatasetSourcePort) -> Result<FetchSummary> {
    let table_name = require(
        &config.dataset.table_name,
        "dataset.table_name (DATASET_TABLE_NAME)",
    )?;
    let query = select_query(table_name, config.dataset.row_limit);
    fetch_raw_data(source, &query, &config.paths.raw_data()).await
}

pub async fn populate(config: &Config, run_id: Uuid) -> Result<PopulateSummary> {
    let config = config.clone();
    instrumented("populate", run_id, async move {
        tokio::task::spawn_blocking(move || populate_blocking(&config)).await?
    })
    .await
}

/// Raw CSV to preprocessed CSV to a freshly created staging table.
pub fn populate_blocking(config: &Config) -> Result<PopulateSummary> {
    let mut table = CaseTable::read_csv(&config.paths.raw_data())?;
    let points = preprocess_for_staging(&mut table);
    table.write_csv(&config.paths.preprocessed_data())?;

    let mut db = StagingDb::open(&config.database.path, &config.database.table)?;
    db.recreate_table()?;
    let inserted = db.insert_all(&table)?;
    let rows_inserted = db.count()?;
    if rows_inserted != inserted {
        warn!(inserted, stored = rows_inserted, "Staging table row count differs from rows inserted");
    }

    Ok(PopulateSummary {
        rows_inserted,
        points_converted: points.converted,
        points_malformed: points.malformed,
    })
}

pub async fn extract(config: &Config, run_id: Uuid) -> Result<usize> {
    let config = config.clone();
    instrumented("extract", run_id, async move {
        tokio::task::spawn_blocking(move || extract_blocking(&config)).await?
    })
    .await
}

/// Staging table to the extracted CSV snapshot. Returns the row count.
pub fn extract_blocking(config: &Config) -> Result<usize> {
    let db = StagingDb::open(&config.database.path, &config.database.table)?;
    let table = db.read_all()?;
    table.write_csv(&config.paths.extracted_data())?;
    Ok(table.len())
}

pub async fn transform(config: &Config, run_id: Uuid, opts: TransformOptions) -> Result<TransformSummary> {
    let config = config.clone();
    instrumented("transform", run_id, async move {
        // the geocoder uses a blocking client
        tokio::task::spawn_blocking(move || transform_blocking(&config, &opts)).await?
    })
    .await
}

pub fn transform_blocking(config: &Config, opts: &TransformOptions) -> Result<TransformSummary> {
    let input = opts
        .input
        .clone()
        .unwrap_or_else(|| config.paths.extracted_data());
    let output = opts
        .output
        .clone()
        .unwrap_or_else(|| config.paths.transformed_data());

    let mut cleaner = Cleaner::new(config.geocoding.clone())
        .with_gate(SchemaGate::with_config(config.quality.clone()));
    if config.geocoding.enabled && !opts.skip_geocoding {
        cleaner = cleaner.with_geocoder(Box::new(NominatimGeocoder::new(&config.geocoding)?));
    }

    let table = CaseTable::read_csv(&input)?;
    let (cleaned, report) = cleaner.clean(table)?;

    if report.assessment.decision == QualityDecision::AcceptWithWarnings {
        for issue in &report.assessment.issues {
            warn!(
                field = issue.field,
                rows = issue.rows,
                issue = ?issue.issue_type,
                "{}",
                issue.description
            );
        }
    }

    cleaned.write_csv(&output)?;
    Ok(TransformSummary { output, report })
}

pub async fn load(config: &Config, run_id: Uuid) -> Result<LoadSummary> {
    instrumented("load", run_id, async {
        let store: Box<dyn ObjectStorePort> = match config.storage.backend {
            StorageBackend::S3 => Box::new(S3ObjectStore::from_config(&config.storage).await?),
            StorageBackend::Fs => Box::new(FsObjectStore::new(
                config
                    .storage
                    .root
                    .clone()
                    .unwrap_or_else(|| config.paths.data_dir.join("object_store")),
            )),
        };
        load_with(config, store.as_ref(), run_id).await
    })
    .await
}

/// Publish the transformed CSV through an explicit store.
pub async fn load_with(config: &Config, store: &dyn ObjectStorePort, run_id: Uuid) -> Result<LoadSummary> {
    let bucket = require(&config.storage.bucket, "storage.bucket (BUCKET_NAME)")?;
    let path = config.paths.transformed_data();
    let key = match &config.storage.object_key {
        Some(key) => key.clone(),
        None => default_object_key(&path)?,
    };

    let bytes = tokio::fs::read(&path).await?;
    let sha256 = sha256_hex(&bytes);
    let size = bytes.len();

    let mut metadata = HashMap::new();
    metadata.insert("sha256".to_string(), sha256.clone());
    metadata.insert("run-id".to_string(), run_id.to_string());

    store.ensure_bucket(bucket).await?;
    let uri = store.put_object(bucket, &key, bytes, metadata).await?;
    metrics::transfer::uploaded(size);
    info!(%uri, bytes = size, %sha256, "File uploaded");

    Ok(LoadSummary {
        uri,
        bytes: size,
        sha256,
    })
}

/// Every stage in order. Stops at the first failure.
pub async fn run_all(config: &Config, run_id: Uuid, skip_geocoding: bool) -> Result<LoadSummary> {
    fetch(config, run_id).await?;
    populate(config, run_id).await?;
    extract(config, run_id).await?;
    transform(
        config,
        run_id,
        TransformOptions {
            skip_geocoding,
            ..TransformOptions::default()
        },
    )
    .await?;
    load(config, run_id).await
}

fn default_object_key(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| EtlError::config(format!("no file name in '{}'", path.display())))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}
