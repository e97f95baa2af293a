use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sfrail::config::{SalesforceConfig, TestRailConfig};
use sfrail::http::ApiClient;
use sfrail::report::{distinct_case_ids, PlaywrightReport};
use sfrail::salesforce::{AuthContext, QueryExecutor};
use sfrail::testrail::TestRailClient;
use sfrail::{Error, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sfrail", version, about = "Publish Playwright results to TestRail and query Salesforce")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a TestRail run from a Playwright JSON report and upload its results
    Publish {
        #[arg(long)]
        report: PathBuf,
        #[arg(long, env = "TESTRAIL_RUN_NAME", default_value = "Automated test run")]
        run_name: String,
        /// Leave the run open after uploading
        #[arg(long)]
        keep_open: bool,
    },
    /// Run a SOQL query and print the rows as JSON
    Query { soql: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Publish {
            report,
            run_name,
            keep_open,
        } => publish(&report, &run_name, !keep_open).await,
        Command::Query { soql } => query(&soql).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn publish(report: &Path, run_name: &str, close: bool) -> Result<()> {
    let config = match TestRailConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            warn!("TestRail reporting disabled: {}", err);
            return Ok(());
        }
    };

    let cases = PlaywrightReport::from_file(report)?.cases();
    if cases.is_empty() {
        warn!("no spec in {} references a TestRail case id", report.display());
        return Ok(());
    }

    let mut client = TestRailClient::new(config);
    let run_id = client.create_run(run_name, distinct_case_ids(&cases)).await?;
    for case in &cases {
        for result in case.to_results() {
            client.push_result(result)?;
        }
    }
    let uploaded = client.upload_results().await;
    if close {
        client.close_run().await;
    }
    let uploaded = uploaded?;
    info!("published {} results to run {}", uploaded.len(), run_id);
    Ok(())
}

async fn query(soql: &str) -> Result<()> {
    let config = SalesforceConfig::from_env()?;
    let mut executor = QueryExecutor::new(AuthContext::new(config, ApiClient::new()));
    let rows = executor.query(soql).await?;
    let output = serde_json::to_string_pretty(&rows)
        .map_err(|e| Error::invalid_response(e.to_string()))?;
    println!("{}", output);
    Ok(())
}
