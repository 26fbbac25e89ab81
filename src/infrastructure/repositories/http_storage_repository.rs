use super::storage_repository::StorageRepository;
use crate::domain::resilience::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Supabase-style object storage over its REST API
pub struct HttpStorageRepository {
    client: Client,
    base_url: String,
    service_key: String,
}

impl HttpStorageRepository {
    pub fn new(client: Client, base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        }
    }

    /// Own client with a whole-request timeout, so a stalled upload fails
    /// instead of holding the job until the master timeout
    pub fn with_timeout(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| ProviderError::new(format!("failed to build storage client: {}", e)))?;
        Ok(Self::new(client, base_url, service_key))
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, encode_path(path))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, encode_path(path))
    }
}

/// Percent-encode each segment, keeping the separators
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl StorageRepository for HttpStorageRepository {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, ProviderError> {
        let start_time = std::time::Instant::now();

        let response = self
            .client
            .post(self.object_url(bucket, path))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| {
                let provider = if e.is_timeout() {
                    ProviderError::new(format!("request timeout: {}", e))
                } else {
                    ProviderError::new(format!("connection error: {}", e))
                };
                match e.status() {
                    Some(status) => provider.with_status(status.as_u16()),
                    None => provider,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                bucket = bucket,
                path = path,
                body = %body,
                "Storage upload rejected"
            );
            return Err(
                ProviderError::new(format!("storage upload failed: {}", body)).with_status(status.as_u16()),
            );
        }

        tracing::debug!(
            bucket = bucket,
            path = path,
            size_bytes = bytes.len(),
            latency_ms = start_time.elapsed().as_millis() as u64,
            "Audio uploaded"
        );

        Ok(self.public_url(bucket, path))
    }
}
