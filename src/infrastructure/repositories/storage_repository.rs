use crate::domain::resilience::ProviderError;
use async_trait::async_trait;

/// Object storage for finished episodes
#[async_trait]
pub trait StorageRepository: Send + Sync {
    /// Upload (overwriting) `bytes` and return the public URL
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, ProviderError>;
}
