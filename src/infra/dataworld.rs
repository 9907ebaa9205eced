use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};

use crate::app::ports::DatasetSourcePort;
use crate::config::{require, DatasetConfig};
use crate::error::{EtlError, Result};

/// data.world SQL endpoint returning query results as CSV.
pub struct DataWorldSource {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl DataWorldSource {
    pub fn new(config: &DatasetConfig) -> Result<Self> {
        let dataset_key = require(&config.dataset_key, "dataset.dataset_key (DATASET_KEY)")?;
        let token = require(&config.auth_token, "dataset.auth_token (DW_AUTH_TOKEN)")?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: format!(
                "{}/sql/{}",
                config.api_base.trim_end_matches('/'),
                dataset_key.trim_matches('/')
            ),
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl DatasetSourcePort for DataWorldSource {
    async fn query_csv(&self, query: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "text/csv")
            .form(&[("query", query)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EtlError::Fetch {
                message: format!("{} returned {}: {}", self.endpoint, status, body),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// The query the fetch stage runs.
pub fn select_query(table_name: &str, row_limit: u32) -> String {
    format!("SELECT * FROM {} LIMIT {}", table_name, row_limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_key_and_token() {
        let config = DatasetConfig::default();
        let err = DataWorldSource::new(&config).err().unwrap();
        assert!(err.to_string().contains("DATASET_KEY"));

        let config = DatasetConfig {
            dataset_key: Some("covid-19-data-resource-hub/covid-19-case-counts".to_string()),
            ..DatasetConfig::default()
        };
        let err = DataWorldSource::new(&config).err().unwrap();
        assert!(err.to_string().contains("DW_AUTH_TOKEN"));
    }

    #[test]
    fn test_endpoint_and_query() {
        let config = DatasetConfig {
            api_base: "https://api.data.world/v0/".to_string(),
            dataset_key: Some("owner/dataset".to_string()),
            auth_token: Some("t".to_string()),
            ..DatasetConfig::default()
        };
        let source = DataWorldSource::new(&config).unwrap();
        assert_eq!(source.endpoint, "https://api.data.world/v0/sql/owner/dataset");
        assert_eq!(select_query("covid_19_cases", 5000), "SELECT * FROM covid_19_cases LIMIT 5000");
    }
}
