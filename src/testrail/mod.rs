//! TestRail run lifecycle: create, buffer results, upload in one batch,
//! attach evidence, close.

mod service;
mod model;

pub use service::TestRailClient;
pub use model::{ResultStatus, RunState, TestResult, UploadedResult};
