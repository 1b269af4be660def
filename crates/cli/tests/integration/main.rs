//! CLI integration tests driving the esy binary over sandboxes on disk.

mod common;
mod export_tests;
mod sandbox_tests;
