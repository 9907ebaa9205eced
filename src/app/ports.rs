use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

/// Where the raw dataset comes from.
#[async_trait]
pub trait DatasetSourcePort: Send + Sync {
    /// Run `query` against the dataset and return the result as CSV bytes.
    async fn query_csv(&self, query: &str) -> Result<Vec<u8>>;
}

/// Object storage the cleaned artifact is published to.
#[async_trait]
pub trait ObjectStorePort: Send + Sync {
    /// Create the bucket if needed. An existing bucket is not an error.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()>;

    /// Store `bytes` at `bucket/key`, returning a URI for the stored object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<String>;
}
