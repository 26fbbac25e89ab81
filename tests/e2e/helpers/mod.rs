use podcast_backend::controllers::podcast::PodcastController;
use podcast_backend::domain::audio::{BatchAudioConfig, BatchAudioGenerator};
use podcast_backend::domain::job::{JobLifecycleTracker, TrackerConfig};
use podcast_backend::domain::podcast::{Orchestrator, OrchestratorConfig, PodcastService};
use podcast_backend::domain::resilience::{
    Backoff, CircuitBreaker, CircuitBreakerConfig, OperationType, RateLimiter, RateLimiterConfig,
    RetryPolicy,
};
use podcast_backend::infrastructure::http::build_router;
use podcast_backend::infrastructure::repositories::{InMemoryJobRepository, JobRepository};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use test_context::AsyncTestContext;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub mod api_client;
pub mod fakes;
pub mod fixtures;

use api_client::TestClient;
use fakes::{FakeCompletion, FakeStorage, FakeTts};

pub struct TestContext {
    pub client: TestClient,
    pub completion: Arc<FakeCompletion>,
    pub tts: Arc<FakeTts>,
    pub storage: Arc<FakeStorage>,
    tracker: Arc<JobLifecycleTracker>,
    shutdown: CancellationToken,
}

impl AsyncTestContext for TestContext {
    fn setup() -> impl std::future::Future<Output = Self> + Send {
        async {
            let job_repo: Arc<dyn JobRepository> = Arc::new(InMemoryJobRepository::new());
            let completion = Arc::new(FakeCompletion::default());
            let tts = Arc::new(FakeTts::default());
            let storage = Arc::new(FakeStorage::default());

            // Short waits so failure paths finish quickly
            let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
                min_backoff: Duration::from_millis(10),
                error_delay: Duration::from_millis(10),
                ..RateLimiterConfig::default()
            }));
            let circuit_breaker = Arc::new(CircuitBreaker::new().with_operation(
                OperationType::AudioSynthesis,
                CircuitBreakerConfig {
                    failure_threshold: 1000,
                    ..CircuitBreakerConfig::default()
                },
            ));

            let audio = BatchAudioGenerator::new(
                tts.clone(),
                rate_limiter.clone(),
                circuit_breaker.clone(),
                BatchAudioConfig {
                    retry: RetryPolicy::new(
                        "audio_synthesis",
                        2,
                        Backoff::Fixed(Duration::from_millis(10)),
                    ),
                    ..BatchAudioConfig::default()
                },
            );
            let orchestrator = Arc::new(Orchestrator::new(
                completion.clone(),
                storage.clone(),
                rate_limiter,
                circuit_breaker,
                audio,
                OrchestratorConfig::default(),
            ));

            let shutdown = CancellationToken::new();
            let tracker = Arc::new(JobLifecycleTracker::new(
                job_repo.clone(),
                TrackerConfig::default(),
                shutdown.clone(),
            ));
            let service = Arc::new(PodcastService::new(
                tracker.clone(),
                orchestrator,
                job_repo.clone(),
            ));
            let controller = Arc::new(PodcastController::new(service));

            let app = build_router(job_repo, controller);

            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .expect("Failed to bind listener");
            let addr = listener.local_addr().expect("Failed to get local addr");
            let base_url = format!("http://{}", addr);

            let server_shutdown = shutdown.clone();
            tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                    .await
                    .unwrap();
            });

            Self {
                client: TestClient::new(&base_url),
                completion,
                tts,
                storage,
                tracker,
                shutdown,
            }
        }
    }

    fn teardown(self) -> impl std::future::Future<Output = ()> + Send {
        async move {
            self.shutdown.cancel();
            self.tracker.shutdown_and_wait(Duration::from_secs(5)).await;
        }
    }
}

impl TestContext {
    /// Poll the job until its status satisfies `done` or five seconds pass
    pub async fn wait_for_job(&self, job_id: Uuid, done: impl Fn(&str) -> bool) -> Value {
        let path = format!("/api/podcasts/{}", job_id);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

        loop {
            let response = self.client.get(&path).await.unwrap();
            if let Some(status) = response.field("status") {
                if done(status) {
                    return response.body.clone().unwrap();
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "Job {} never reached the expected status, last body: {:?}",
                job_id,
                response.body
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn wait_for_terminal(&self, job_id: Uuid) -> Value {
        self.wait_for_job(job_id, |status| {
            matches!(status, "completed" | "failed" | "timeout")
        })
        .await
    }
}
