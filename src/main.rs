use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use podcast_backend::controllers::podcast::PodcastController;
use podcast_backend::domain::audio::{audio_cache, BatchAudioGenerator};
use podcast_backend::domain::job::JobLifecycleTracker;
use podcast_backend::domain::podcast::{Orchestrator, PodcastService};
use podcast_backend::domain::resilience::{CircuitBreaker, OperationType, RateLimiter};
use podcast_backend::infrastructure::config::{Config, LogFormat, TtsProvider};
use podcast_backend::infrastructure::db::{check_connection, create_pool};
use podcast_backend::infrastructure::http::start_http_server;
use podcast_backend::infrastructure::repositories::{
    HttpStorageRepository, InMemoryJobRepository, JobRepository, OpenAiCompletionRepository,
    OpenAiTtsRepository, PgJobRepository, PollyTtsRepository, TtsRepository,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config);

    tracing::info!(
        "Starting Podcast Backend on {}:{}",
        config.host,
        config.port
    );

    // Job store: Postgres when configured, in-process otherwise
    let job_repo: Arc<dyn JobRepository> = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = create_pool(database_url).await?;
            check_connection(&pool).await?;
            tracing::info!("Database connection verified");
            Arc::new(PgJobRepository::new(Arc::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, job records are kept in memory");
            Arc::new(InMemoryJobRepository::new())
        }
    };

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new().with_api_key(config.openai_api_key.clone()),
    ));

    let tts_repo: Arc<dyn TtsRepository> = match config.tts_provider {
        TtsProvider::OpenAi => Arc::new(OpenAiTtsRepository::new(
            openai_client.clone(),
            config.tts_model.clone(),
        )),
        TtsProvider::Polly => {
            tracing::info!("Initializing AWS Polly client with region: {}", config.aws_region);
            let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(config.aws_region.clone()))
                .load()
                .await;
            Arc::new(PollyTtsRepository::new(Arc::new(aws_sdk_polly::Client::new(
                &aws_config,
            ))))
        }
    };
    tracing::info!(provider = ?config.tts_provider, "TTS provider selected");

    let completion_repo = Arc::new(OpenAiCompletionRepository::new(
        openai_client,
        config.completion_model.clone(),
    ));
    let storage_repo = Arc::new(HttpStorageRepository::with_timeout(
        config.storage_url.clone(),
        config.storage_service_key.clone(),
        config.storage_timeout(),
    )?);

    // Process-wide governance shared by every job
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limiter()));
    let circuit_breaker = Arc::new(
        CircuitBreaker::new().with_operation(OperationType::AudioSynthesis, config.audio_circuit()),
    );

    let mut audio = BatchAudioGenerator::new(
        tts_repo,
        rate_limiter.clone(),
        circuit_breaker.clone(),
        config.batch_audio(),
    );
    if config.tts_cache_enabled {
        tracing::info!("TTS cache enabled");
        audio = audio.with_cache(audio_cache());
    }

    let shutdown = CancellationToken::new();
    let tracker = Arc::new(JobLifecycleTracker::new(
        job_repo.clone(),
        config.tracker(),
        shutdown.clone(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        completion_repo,
        storage_repo,
        rate_limiter,
        circuit_breaker,
        audio,
        config.orchestrator(),
    ));

    let podcast_service = Arc::new(PodcastService::new(
        tracker.clone(),
        orchestrator,
        job_repo.clone(),
    ));
    let podcast_controller = Arc::new(PodcastController::new(podcast_service));

    // Ctrl-C stops the server and cancels running jobs
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    let shutdown_grace = config.shutdown_grace();
    start_http_server(Arc::new(config), job_repo, podcast_controller, shutdown).await?;

    // Running jobs are cancelled; give them time to record `failed`
    tracker.shutdown_and_wait(shutdown_grace).await;
    Ok(())
}

fn init_logging(config: &Config) {
    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "podcast_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "podcast_backend=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
