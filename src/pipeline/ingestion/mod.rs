// Ingestion: pulling the raw dataset and preparing it for the staging table

use std::path::Path;
use tracing::{info, warn};

use crate::app::ports::DatasetSourcePort;
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::processing::point::{normalize_locations, PointReport};
use crate::pipeline::processing::table::{coerce_fips, ensure_parent_dir, CaseTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub bytes: usize,
    pub rows: usize,
}

/// Run `query` against the source and write the CSV it returns to `out_path`.
///
/// The response is parsed before it is written so a payload that is not the case
/// table fails here rather than in a later stage.
pub async fn fetch_raw_data(
    source: &dyn DatasetSourcePort,
    query: &str,
    out_path: &Path,
) -> Result<FetchSummary> {
    info!(%query, "Querying dataset");
    let bytes = source.query_csv(query).await?;
    let table = CaseTable::from_reader(bytes.as_slice())?;
    if table.is_empty() {
        warn!("Dataset query returned no rows");
    }

    ensure_parent_dir(out_path)?;
    tokio::fs::write(out_path, &bytes).await?;
    metrics::transfer::fetched(bytes.len());
    info!(
        path = %out_path.display(),
        bytes = bytes.len(),
        rows = table.len(),
        "Raw data written"
    );

    Ok(FetchSummary {
        bytes: bytes.len(),
        rows: table.len(),
    })
}

/// Rewrite a raw table into the shape the staging table accepts: point text
/// becomes `(x, y)` and `fips` becomes an integer, 0 when unusable.
pub fn preprocess_for_staging(table: &mut CaseTable) -> PointReport {
    let points = normalize_locations(table);
    for record in &mut table.records {
        record.fips = Some(coerce_fips(record.fips.as_deref()).to_string());
    }
    info!(
        rows = table.len(),
        converted = points.converted,
        malformed = points.malformed,
        "Preprocessing complete"
    );
    points
}
