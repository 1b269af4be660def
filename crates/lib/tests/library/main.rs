//! Library tests driving `esy_lib` through its public API over sandboxes on
//! disk.

mod common;
mod project_tests;
