use tracing::info;

use crate::config::GeocodingConfig;
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::processing::geocode::{GeocodeReport, GeocodeResolver, Geocoder};
use crate::pipeline::processing::missing::{handle_negative_and_missing_values, MissingValueReport};
use crate::pipeline::processing::normalize::normalize_data;
use crate::pipeline::processing::point::{normalize_locations, PointReport};
use crate::pipeline::processing::quality_gate::{QualityAssessment, SchemaGate};
use crate::pipeline::processing::table::{CaseTable, CleanedTable};

/// Counts from one cleaning run, for logs and the CLI summary.
#[derive(Debug, Clone)]
pub struct CleaningReport {
    pub initial_rows: usize,
    pub final_rows: usize,
    pub duplicates_dropped: usize,
    pub points: PointReport,
    pub missing: MissingValueReport,
    /// `None` when the geocoding pass was skipped
    pub geocode: Option<GeocodeReport>,
    pub assessment: QualityAssessment,
}

/// Runs the cleaning components in order over one table.
pub struct Cleaner {
    /// Fallback geocoder; `None` skips the geocoding pass
    pub geocoder: Option<Box<dyn Geocoder>>,
    pub geocoding: GeocodingConfig,
    pub gate: SchemaGate,
}

impl Cleaner {
    pub fn new(geocoding: GeocodingConfig) -> Self {
        Self {
            geocoder: None,
            geocoding,
            gate: SchemaGate::new(),
        }
    }

    pub fn with_gate(mut self, gate: SchemaGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_geocoder(mut self, geocoder: Box<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    /// The deterministic, network-free part: dedupe, point text, missing values,
    /// text normalization. Running it twice leaves the table unchanged.
    pub fn prepare(&self, table: &mut CaseTable) -> (usize, PointReport, MissingValueReport) {
        let duplicates = table.drop_duplicates();
        info!("Dropped duplicates: {} row(s) removed", duplicates);

        let points = normalize_locations(table);
        if points.malformed > 0 {
            metrics::clean::point_failures(points.malformed);
        }

        let missing = handle_negative_and_missing_values(table);
        info!(
            negative_dropped = missing.negative_dropped,
            cases_imputed = missing.cases_imputed,
            difference_imputed = missing.difference_imputed,
            admin2_nulled = missing.admin2_nulled,
            "Handling negative and missing values... COMPLETE"
        );

        normalize_data(table);
        info!("Normalizing data columns... COMPLETE");

        metrics::clean::duplicates_dropped(duplicates);
        metrics::clean::negative_dropped(missing.negative_dropped);
        metrics::clean::values_imputed(missing.cases_imputed + missing.difference_imputed);
        metrics::clean::sentinels_nulled(missing.admin2_nulled);

        (duplicates, points, missing)
    }

    pub fn clean(&self, mut table: CaseTable) -> Result<(CleanedTable, CleaningReport)> {
        let initial_rows = table.len();
        info!(
            "Initial data shape: {} rows, {} columns",
            initial_rows,
            table.width()
        );
        metrics::clean::rows_read(initial_rows);

        let (mut duplicates_dropped, points, missing) = self.prepare(&mut table);

        let geocode = match self.geocoder.as_deref() {
            Some(geocoder) if self.geocoding.enabled => {
                let report = GeocodeResolver::new(geocoder, &self.geocoding).resolve(&mut table)?;
                info!(
                    candidates = report.candidates,
                    resolved = report.resolved,
                    timed_out = report.timed_out,
                    "Handling missing geo point coordinates... COMPLETE"
                );
                Some(report)
            }
            _ => {
                info!("Geocoding pass skipped");
                None
            }
        };

        let (mut cleaned, assessment) = self.gate.assess(table);

        // normalization can make distinct source rows equal
        let late_duplicates = cleaned.drop_duplicates();
        if late_duplicates > 0 {
            info!("Dropped {} row(s) that became duplicates after cleaning", late_duplicates);
            metrics::clean::duplicates_dropped(late_duplicates);
            duplicates_dropped += late_duplicates;
        }

        let final_rows = cleaned.len();
        info!(
            "Final data shape: {} rows, {} columns",
            final_rows,
            cleaned.width()
        );
        metrics::clean::rows_written(final_rows);

        let report = CleaningReport {
            initial_rows,
            final_rows,
            duplicates_dropped,
            points,
            missing,
            geocode,
            assessment,
        };
        Ok((cleaned, report))
    }
}
