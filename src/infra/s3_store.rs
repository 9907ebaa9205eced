use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client as S3Client;
use std::collections::HashMap;
use tracing::info;

use crate::app::ports::ObjectStorePort;
use crate::config::StorageConfig;
use crate::error::{EtlError, Result};

/// S3 (or S3-compatible) object store. Credentials come from the standard AWS chain.
pub struct S3ObjectStore {
    client: S3Client,
    region: Option<String>,
}

impl S3ObjectStore {
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let region = sdk_config.region().map(|r| r.to_string());
        Ok(Self {
            client: S3Client::from_conf(builder.build()),
            region,
        })
    }
}

#[async_trait]
impl ObjectStorePort for S3ObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint
        if let Some(region) = self.region.as_deref().filter(|r| *r != "us-east-1") {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(%bucket, "Bucket created");
                Ok(())
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_bucket_already_owned_by_you() || service_err.is_bucket_already_exists() {
                    info!(%bucket, "Bucket already exists");
                    Ok(())
                } else {
                    Err(EtlError::Upload {
                        message: format!(
                            "create bucket '{}': {}",
                            bucket,
                            DisplayErrorContext(&service_err)
                        ),
                    })
                }
            }
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type("text/csv")
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| EtlError::Upload {
                message: format!("put '{}/{}': {}", bucket, key, DisplayErrorContext(&e)),
            })?;

        Ok(format!("s3://{}/{}", bucket, key))
    }
}
