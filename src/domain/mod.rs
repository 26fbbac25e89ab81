pub mod audio;
pub mod job;
pub mod podcast;
pub mod resilience;
pub mod script;
