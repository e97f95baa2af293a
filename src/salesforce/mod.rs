//! Salesforce session handling and SOQL execution.

mod auth;
mod executor;

pub use auth::{AccessToken, AuthContext};
pub use executor::QueryExecutor;
