pub mod mocks;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use mocks::{FailOn, FailingStore, StalledStore};
#[allow(unused_imports)]
pub use setup::{fixed_now, TestSetup, TestSetupBuilder};
