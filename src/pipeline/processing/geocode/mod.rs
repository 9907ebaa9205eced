//! Geocoding fallback for rows whose coordinates are the unknown-location placeholder.
//!
//! The pass is a plain sequential loop: one blocking lookup per placeholder row, with a
//! fixed pause and a bounded number of retries when the service times out. Lookups go
//! through the [`Geocoder`] trait so tests can swap in a deterministic stub.

pub mod nominatim;

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::GeocodingConfig;
use crate::error::{EtlError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::table::CaseTable;

pub use nominatim::NominatimGeocoder;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Debug keeps the fraction on whole degrees: 40.0, not 40
        write!(f, "({:?}, {:?})", self.latitude, self.longitude)
    }
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    /// The service did not answer in time; worth another try
    #[error("geocoding request timed out")]
    Timeout,
    #[error("{0}")]
    Service(String),
}

/// Trait for geocoding composite location keys to coordinates
pub trait Geocoder: Send + Sync {
    fn geocode(&self, query: &str) -> std::result::Result<Option<Coordinates>, GeocodeError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeocodeReport {
    pub candidates: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub timed_out: usize,
}

/// Walks the table and replaces placeholder locations with looked-up coordinates.
pub struct GeocodeResolver<'a> {
    geocoder: &'a dyn Geocoder,
    placeholder: String,
    retry_delay: Duration,
    max_retries: u32,
}

impl<'a> GeocodeResolver<'a> {
    pub fn new(geocoder: &'a dyn Geocoder, config: &GeocodingConfig) -> Self {
        Self {
            geocoder,
            placeholder: config.placeholder.clone(),
            retry_delay: config.retry_delay(),
            max_retries: config.max_retries,
        }
    }

    /// Look up one key, retrying timeouts. `Ok(None)` covers both "no match" and
    /// "gave up after timeouts"; the second is reported through `timed_out`.
    fn lookup(&self, query: &str, timed_out: &mut bool) -> Result<Option<Coordinates>> {
        let mut attempt = 0;
        loop {
            match self.geocoder.geocode(query) {
                Ok(found) => return Ok(found),
                Err(GeocodeError::Timeout) => {
                    metrics::geocode::timeout();
                    std::thread::sleep(self.retry_delay);
                    if attempt >= self.max_retries {
                        warn!(%query, attempts = attempt + 1, "Geocoding timed out, keeping placeholder");
                        *timed_out = true;
                        return Ok(None);
                    }
                    attempt += 1;
                    debug!(%query, attempt, "Retrying geocode after timeout");
                }
                Err(GeocodeError::Service(message)) => {
                    return Err(EtlError::Geocode {
                        query: query.to_string(),
                        message,
                    });
                }
            }
        }
    }

    pub fn resolve(&self, table: &mut CaseTable) -> Result<GeocodeReport> {
        info!("Handling missing geo point coordinates... This may take several minutes for a full dataset.");
        let mut report = GeocodeReport::default();

        for record in &mut table.records {
            if record.location.as_deref() != Some(self.placeholder.as_str()) {
                continue;
            }
            report.candidates += 1;

            let key = record.combined_key.clone().unwrap_or_default();
            let mut timed_out = false;
            match self.lookup(&key, &mut timed_out)? {
                Some(coords) => {
                    record.location = Some(coords.to_string());
                    report.resolved += 1;
                    metrics::geocode::resolved();
                }
                None if timed_out => report.timed_out += 1,
                None => {
                    debug!(query = %key, "No geocoding match");
                    report.not_found += 1;
                    metrics::geocode::not_found();
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::table::CaseRecord;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers from a fixed map; keys listed in `timeouts` time out that many times first.
    struct StubGeocoder {
        answers: HashMap<String, Coordinates>,
        timeouts: Mutex<HashMap<String, u32>>,
        calls: Mutex<Vec<String>>,
    }

    impl StubGeocoder {
        fn new(answers: &[(&str, f64, f64)], timeouts: &[(&str, u32)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(k, lat, lon)| {
                        (
                            k.to_string(),
                            Coordinates {
                                latitude: *lat,
                                longitude: *lon,
                            },
                        )
                    })
                    .collect(),
                timeouts: Mutex::new(timeouts.iter().map(|(k, n)| (k.to_string(), *n)).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Geocoder for StubGeocoder {
        fn geocode(&self, query: &str) -> std::result::Result<Option<Coordinates>, GeocodeError> {
            self.calls.lock().unwrap().push(query.to_string());
            if query == "broken" {
                return Err(GeocodeError::Service("HTTP 500".to_string()));
            }
            let mut timeouts = self.timeouts.lock().unwrap();
            if let Some(left) = timeouts.get_mut(query) {
                if *left > 0 {
                    *left -= 1;
                    return Err(GeocodeError::Timeout);
                }
            }
            Ok(self.answers.get(query).copied())
        }
    }

    fn config() -> GeocodingConfig {
        GeocodingConfig {
            retry_delay_ms: 0,
            ..GeocodingConfig::default()
        }
    }

    fn row(location: &str, key: &str) -> CaseRecord {
        CaseRecord {
            location: Some(location.to_string()),
            combined_key: Some(key.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_coordinates_keep_fraction_on_whole_degrees() {
        let coords = Coordinates {
            latitude: 40.0,
            longitude: -74.0,
        };
        assert_eq!(coords.to_string(), "(40.0, -74.0)");
        let coords = Coordinates {
            latitude: 41.8755616,
            longitude: -87.5,
        };
        assert_eq!(coords.to_string(), "(41.8755616, -87.5)");
    }

    #[test]
    fn test_resolves_only_placeholders() {
        let stub = StubGeocoder::new(&[("Cook, Illinois, US", 41.8, -87.7)], &[]);
        let mut table = CaseTable::new(vec![
            row("(0,0)", "Cook, Illinois, US"),
            row("(40.7, -74.0)", "New York, US"),
            row("(0,0)", "Nowhere"),
        ]);

        let report = GeocodeResolver::new(&stub, &config())
            .resolve(&mut table)
            .unwrap();

        assert_eq!(report.candidates, 2);
        assert_eq!(report.resolved, 1);
        assert_eq!(report.not_found, 1);
        assert_eq!(table.records[0].location.as_deref(), Some("(41.8, -87.7)"));
        assert_eq!(table.records[1].location.as_deref(), Some("(40.7, -74.0)"));
        assert_eq!(table.records[2].location.as_deref(), Some("(0,0)"));
        assert_eq!(*stub.calls.lock().unwrap(), vec!["Cook, Illinois, US", "Nowhere"]);
    }

    #[test]
    fn test_retries_once_after_timeout() {
        let stub = StubGeocoder::new(&[("Kent, Delaware, US", 39.1, -75.5)], &[("Kent, Delaware, US", 1)]);
        let mut table = CaseTable::new(vec![row("(0,0)", "Kent, Delaware, US")]);

        let report = GeocodeResolver::new(&stub, &config())
            .resolve(&mut table)
            .unwrap();

        assert_eq!(report.resolved, 1);
        assert_eq!(report.timed_out, 0);
        assert_eq!(stub.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_gives_up_after_retries_and_continues() {
        let stub = StubGeocoder::new(
            &[("B", 1.0, 2.0), ("A", 3.0, 4.0)],
            &[("A", 5)],
        );
        let mut table = CaseTable::new(vec![row("(0,0)", "A"), row("(0,0)", "B")]);

        let report = GeocodeResolver::new(&stub, &config())
            .resolve(&mut table)
            .unwrap();

        assert_eq!(report.timed_out, 1);
        assert_eq!(report.resolved, 1);
        assert_eq!(table.records[0].location.as_deref(), Some("(0,0)"));
        assert_eq!(table.records[1].location.as_deref(), Some("(1, 2)"));
        // one try plus one retry for A, one call for B
        assert_eq!(stub.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_service_error_is_fatal() {
        let stub = StubGeocoder::new(&[], &[]);
        let mut table = CaseTable::new(vec![row("(0,0)", "broken")]);

        let err = GeocodeResolver::new(&stub, &config())
            .resolve(&mut table)
            .unwrap_err();
        assert!(matches!(err, EtlError::Geocode { ref query, .. } if query == "broken"));
    }
}
