use async_trait::async_trait;
use parking_lot::Mutex;
use podcast_backend::domain::resilience::ProviderError;
use podcast_backend::domain::script::CompletionRequest;
use podcast_backend::infrastructure::repositories::{
    CompletionRepository, StorageRepository, TtsRepository,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Answers every section with a short two-speaker exchange
#[derive(Default)]
pub struct FakeCompletion {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl CompletionRepository for FakeCompletion {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::new("service unavailable").with_status(503));
        }
        Ok(format!(
            "Alex: Part {} starts here.\nJordan: Tell me more about part {}.",
            call, call
        ))
    }
}

/// Returns the text as audio bytes, optionally slowly or not at all
#[derive(Default)]
pub struct FakeTts {
    pub delay: Mutex<Option<Duration>>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeTts {
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }
}

#[async_trait]
impl TtsRepository for FakeTts {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::new("invalid request: voice rejected").with_status(400));
        }
        Ok(format!("[{}:{}]", voice, text).into_bytes())
    }
}

/// Keeps uploads in memory and hands back a predictable URL
#[derive(Default)]
pub struct FakeStorage {
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl StorageRepository for FakeStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<String, ProviderError> {
        self.uploads.lock().push((path.to_string(), bytes.to_vec()));
        Ok(format!("https://storage.test/{}/{}", bucket, path))
    }
}
