use reqwest::blocking::Client;
use serde::Deserialize;

use super::{Coordinates, GeocodeError, Geocoder};
use crate::config::GeocodingConfig;
use crate::error::Result;

/// OpenStreetMap Nominatim search client.
pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        // Nominatim's usage policy requires an identifying user agent
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

fn parse_places(places: &[Place]) -> std::result::Result<Option<Coordinates>, GeocodeError> {
    let Some(place) = places.first() else {
        return Ok(None);
    };
    let latitude = place
        .lat
        .parse::<f64>()
        .map_err(|e| GeocodeError::Service(format!("bad latitude {:?}: {}", place.lat, e)))?;
    let longitude = place
        .lon
        .parse::<f64>()
        .map_err(|e| GeocodeError::Service(format!("bad longitude {:?}: {}", place.lon, e)))?;
    Ok(Some(Coordinates { latitude, longitude }))
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, query: &str) -> std::result::Result<Option<Coordinates>, GeocodeError> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                GeocodeError::Timeout
            } else {
                GeocodeError::Service(e.to_string())
            }
        };

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .map_err(map_err)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(GeocodeError::Service(format!("HTTP {}: {}", status, body)));
        }

        let places: Vec<Place> = resp.json().map_err(map_err)?;
        parse_places(&places)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_place() {
        let places: Vec<Place> = serde_json::from_str(
            r#"[{"lat":"41.8755616","lon":"-87.6244212","display_name":"Chicago"},{"lat":"0","lon":"0"}]"#,
        )
        .unwrap();
        let coords = parse_places(&places).unwrap().unwrap();
        assert_eq!(coords.latitude, 41.8755616);
        assert_eq!(coords.longitude, -87.6244212);
        assert_eq!(coords.to_string(), "(41.8755616, -87.6244212)");
    }

    #[test]
    fn test_parse_empty_and_bad() {
        assert!(parse_places(&[]).unwrap().is_none());
        let bad = vec![Place {
            lat: "north".to_string(),
            lon: "1".to_string(),
        }];
        assert!(matches!(parse_places(&bad), Err(GeocodeError::Service(_))));
    }
}
