// End-to-end tests for the podcast API
//
// Each test gets its own server on an ephemeral port, wired with the
// in-memory job store and in-process fakes for the completion, speech
// and storage providers. Tests run in parallel without shared state.

mod helpers;
mod test_health;
mod test_podcast;
