pub mod error;
pub mod events;
pub mod model;
pub mod tracker;

pub use error::JobError;
pub use events::{EventPublisher, JobEvent, JobNotification, ProgressSnapshot};
pub use model::{Job, JobEventRecord, JobStatus, StatusUpdate};
pub use tracker::{JobHandle, JobLifecycleTracker, JobResult, TrackerConfig};
