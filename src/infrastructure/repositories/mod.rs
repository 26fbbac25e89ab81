pub mod completion_repository;
pub mod http_storage_repository;
pub mod in_memory_job_repository;
pub mod job_repository;
pub mod openai_completion_repository;
pub mod openai_error;
pub mod openai_tts_repository;
pub mod pg_job_repository;
pub mod polly_tts_repository;
pub mod storage_repository;
pub mod text_chunks;
pub mod tts_repository;

pub use completion_repository::CompletionRepository;
pub use http_storage_repository::HttpStorageRepository;
pub use in_memory_job_repository::InMemoryJobRepository;
pub use job_repository::JobRepository;
pub use openai_completion_repository::OpenAiCompletionRepository;
pub use openai_tts_repository::OpenAiTtsRepository;
pub use pg_job_repository::PgJobRepository;
pub use polly_tts_repository::PollyTtsRepository;
pub use storage_repository::StorageRepository;
pub use tts_repository::TtsRepository;
