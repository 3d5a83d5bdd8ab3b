//! Developer utilities for exercising the binding core without a GPU.
//!
//! - [`RecordingDevice`]: an in-memory [`Device`](gal_core::Device) and
//!   [`DescriptorBackend`](gal_core::DescriptorBackend) that counts every
//!   call and can be told to fail or to stall.
//! - [`init_test_logging`]: routes `log` output through `env_logger` in
//!   test mode.

mod recording_device;
mod storage;

pub use recording_device::{CallCounts, RecordingDevice};
pub use storage::ObjectStorage;

/// Installs `env_logger` for tests. Safe to call from every test.
///
/// The filter defaults to `debug` and can be overridden with `RUST_LOG`.
pub fn init_test_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}
