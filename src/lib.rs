//! SOQL query building and TestRail result publishing for Salesforce UI/API
//! test suites.

pub mod config;
pub mod error;
pub mod http;
pub mod query;
pub mod report;
pub mod salesforce;
pub mod testrail;

pub use error::{Error, Result};
