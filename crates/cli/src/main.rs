//! Segmill CLI - Command-line interface for the segment job daemon

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9630";

#[derive(Parser)]
#[command(name = "segmill")]
#[command(about = "Segmill segment job CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "SEGMILL_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a segment creation job
    Submit {
        /// Credential reference identifying the ESP account
        #[arg(short, long)]
        credential: String,

        /// Segment template ids (comma separated or repeated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        segments: Vec<String>,

        /// Currency symbol used when rendering segment names
        #[arg(long)]
        currency: Option<String>,

        /// Threshold override as key=value (repeatable)
        #[arg(short, long, value_parser = parse_threshold)]
        threshold: Vec<(String, f64)>,
    },

    /// Show one job in detail
    Status {
        /// Job ID
        job_id: String,
    },

    /// List recent jobs
    List {
        /// Filter by status (e.g. IN_PROGRESS, WAITING_RETRY)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of rows
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Poll a job until it reaches a terminal status
    Watch {
        /// Job ID
        job_id: String,

        /// Poll interval in seconds
        #[arg(short, long, default_value = "2")]
        interval: u64,
    },

    /// Cancel a job
    Cancel {
        /// Job ID
        job_id: String,
    },

    /// Show daemon statistics
    Stats,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct SubmitResult {
    job_id: String,
    status: String,
    total_segments: i64,
}

/// Job fields the CLI renders; extra response fields are ignored.
#[derive(Deserialize)]
struct JobView {
    job_id: String,
    credential_ref: String,
    status: String,
    total_segments: i64,
    segments_processed: i64,
    pending_segment_ids: Vec<String>,
    completed_segment_ids: Vec<String>,
    failed_segments: BTreeMap<String, String>,
    retry_at: Option<i64>,
    rate_limit_kind: Option<String>,
    failure_reason: Option<String>,
}

#[derive(Tabled)]
struct JobRow {
    job_id: String,
    credential: String,
    status: String,
    progress: String,
}

impl From<&JobView> for JobRow {
    fn from(view: &JobView) -> Self {
        Self {
            job_id: view.job_id.clone(),
            credential: view.credential_ref.clone(),
            status: view.status.clone(),
            progress: format!("{}/{}", view.segments_processed, view.total_segments),
        }
    }
}

fn parse_threshold(raw: &str) -> Result<(String, f64), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let parsed = value
        .parse::<f64>()
        .map_err(|e| format!("invalid threshold value '{}': {}", value, e))?;
    Ok((key.to_string(), parsed))
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn status_label(status: &str) -> ColoredString {
    match status {
        "COMPLETED" => status.green().bold(),
        "IN_PROGRESS" => status.cyan().bold(),
        "WAITING_RETRY" => status.yellow().bold(),
        "FAILED" => status.red().bold(),
        "CANCELLED" => status.magenta(),
        _ => status.normal(),
    }
}

/// Human hint for a parked job ("minute limit, resumes in ~42s").
fn retry_hint(view: &JobView) -> Option<String> {
    let retry_at = view.retry_at?;
    let kind = view.rate_limit_kind.as_deref().unwrap_or("rate");
    let secs = ((retry_at - now_ms()).max(0) + 999) / 1000;
    Some(format!("{} limit, resumes in ~{}s", kind.to_lowercase(), secs))
}

fn print_detail(view: &JobView) {
    println!("{}", format!("Job {}", view.job_id).cyan().bold());
    println!("  {} {}", "Credential:".bold(), view.credential_ref);
    match retry_hint(view) {
        Some(hint) => println!(
            "  {} {} ({})",
            "Status:".bold(),
            status_label(&view.status),
            hint
        ),
        None => println!("  {} {}", "Status:".bold(), status_label(&view.status)),
    }
    println!(
        "  {} {}/{}",
        "Progress:".bold(),
        view.segments_processed,
        view.total_segments
    );
    if !view.completed_segment_ids.is_empty() {
        println!(
            "  {} {}",
            "Completed:".bold(),
            view.completed_segment_ids.join(", ")
        );
    }
    if !view.failed_segments.is_empty() {
        println!("  {}", "Failed:".bold());
        for (id, reason) in &view.failed_segments {
            println!("    {} {}: {}", "✗".red(), id, reason);
        }
    }
    if !view.pending_segment_ids.is_empty() {
        println!(
            "  {} {}",
            "Pending:".bold(),
            view.pending_segment_ids.join(", ")
        );
    }
    if let Some(reason) = &view.failure_reason {
        println!("  {} {}", "Reason:".bold(), reason.red());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            credential,
            segments,
            currency,
            threshold,
        } => {
            let thresholds: BTreeMap<String, f64> = threshold.into_iter().collect();

            let params = json!({
                "credential_ref": credential,
                "segment_ids": segments,
                "currency_symbol": currency,
                "thresholds": thresholds,
            });

            let result = call_rpc(&cli.rpc_url, "segments.submit.v1", params).await?;
            let submit_result: SubmitResult = serde_json::from_value(result)?;

            println!("{}", "✓ Job submitted".green().bold());
            println!();

            let table = Table::new(vec![submit_result]).to_string();
            println!("{}", table);
        }

        Commands::Status { job_id } => {
            let result = call_rpc(&cli.rpc_url, "segments.status.v1", json!({ "job_id": job_id }))
                .await?;
            let view: JobView = serde_json::from_value(result)?;
            print_detail(&view);
        }

        Commands::List { status, limit } => {
            let params = json!({
                "status": status.map(|s| s.to_uppercase()),
                "limit": limit,
            });

            let result = call_rpc(&cli.rpc_url, "segments.list.v1", params).await?;
            let jobs: Vec<JobView> = serde_json::from_value(result["jobs"].clone())?;

            if jobs.is_empty() {
                println!("{}", "No jobs found".yellow());
            } else {
                let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Watch { job_id, interval } => {
            println!(
                "{}",
                format!("Watching job {} (Ctrl+C to stop)", job_id).cyan().bold()
            );

            let mut last = (String::new(), -1_i64);
            loop {
                let result =
                    call_rpc(&cli.rpc_url, "segments.status.v1", json!({ "job_id": job_id }))
                        .await?;
                let view: JobView = serde_json::from_value(result)?;

                let key = (view.status.clone(), view.segments_processed);
                if key != last {
                    match retry_hint(&view) {
                        Some(hint) => println!(
                            "  {} {}/{} ({})",
                            status_label(&view.status),
                            view.segments_processed,
                            view.total_segments,
                            hint
                        ),
                        None => println!(
                            "  {} {}/{}",
                            status_label(&view.status),
                            view.segments_processed,
                            view.total_segments
                        ),
                    }
                    last = key;
                }

                match view.status.as_str() {
                    "COMPLETED" => {
                        println!();
                        println!("{}", "✓ Job completed".green().bold());
                        break;
                    }
                    "FAILED" => {
                        println!();
                        println!("{}", "✗ Job failed".red().bold());
                        if let Some(reason) = &view.failure_reason {
                            println!("  {}", reason);
                        }
                        break;
                    }
                    "CANCELLED" => {
                        println!();
                        println!("{}", "○ Job cancelled".yellow().bold());
                        break;
                    }
                    _ => {}
                }

                tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
            }
        }

        Commands::Cancel { job_id } => {
            let result =
                call_rpc(&cli.rpc_url, "segments.cancel.v1", json!({ "job_id": job_id })).await?;

            println!("{}", format!("✓ Job {} cancelled", job_id).green().bold());
            if let Some(status) = result.get("status").and_then(|v| v.as_str()) {
                println!("  {} {}", "Status:".bold(), status_label(status));
            }
        }

        Commands::Stats => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Total Jobs:".bold(), stats["total_jobs"]);
                    println!("  {} {}", "Pending:".bold(), stats["pending_jobs"]);
                    println!("  {} {}", "In Progress:".bold(), stats["in_progress_jobs"]);
                    println!("  {} {}", "Waiting Retry:".bold(), stats["waiting_retry_jobs"]);
                    println!("  {} {}", "Completed:".bold(), stats["completed_jobs"]);
                    println!("  {} {}", "Failed:".bold(), stats["failed_jobs"]);
                    println!("  {} {}", "Cancelled:".bold(), stats["cancelled_jobs"]);
                    println!();
                    let db_mb =
                        stats["db_size_bytes"].as_i64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
                    println!("  {} {:.2} MB", "DB Size:".bold(), db_mb);
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
