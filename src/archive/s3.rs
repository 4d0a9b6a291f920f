use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

use crate::archive::{ObjectStore, PutObject};

/// Amazon S3 object store backend.
///
/// Object metadata is sent as user-defined `x-amz-meta-*` headers.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a store writing into `bucket`.
    ///
    /// # Arguments
    ///
    /// * `client` - Configured S3 client.
    /// * `bucket` - Target bucket name.
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    type Error = tower::BoxError;

    #[tracing::instrument(skip_all, fields(bucket = %self.bucket, key = %object.key))]
    async fn put(&self, object: PutObject) -> Result<(), Self::Error> {
        let metadata: HashMap<String, String> = object.metadata.into_iter().collect();

        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(object.key)
            .content_type(object.content_type)
            .set_metadata(Some(metadata))
            .body(ByteStream::from(object.body))
            .send()
            .await?;

        tracing::debug!(e_tag = output.e_tag().unwrap_or_default(), "Object written");
        Ok(())
    }
}
