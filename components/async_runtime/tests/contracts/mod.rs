//! Contract tests for async_runtime

#[path = "../common/fake_host.rs"]
mod fake_host;
