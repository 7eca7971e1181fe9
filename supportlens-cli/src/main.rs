//! supportlens-cli — terminal frontend for the SupportLens HTTP API
//!
//! # Subcommands
//! - `chat <message>`            — classify a message and print the reply
//! - `traces [--category <c>]`   — list stored traces, newest first
//! - `analytics`                 — print the category breakdown
//! - `status`                    — show server health

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "supportlens-cli",
    version,
    about = "SupportLens support-trace analytics CLI"
)]
struct Cli {
    /// SupportLens HTTP server URL (overrides SUPPORTLENS_HTTP_URL env var)
    #[arg(long, env = "SUPPORTLENS_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send a support message and print the classified reply
    Chat {
        /// The customer message
        message: String,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// List stored traces, newest first
    Traces {
        /// Only traces whose category set contains this label
        #[arg(long)]
        category: Option<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Print aggregate analytics
    Analytics,

    /// Show SupportLens server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatResponse {
    reply: String,
    categories: Vec<String>,
    latency_ms: u64,
    degraded: bool,
    trace_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TraceResponse {
    id: i64,
    user_message: String,
    categories: Vec<String>,
    timestamp: String,
    response_time_ms: u64,
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()?)
}

fn fail_on_error_status(resp: reqwest::blocking::Response) -> reqwest::blocking::Response {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("supportlens-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }
    resp
}

fn do_chat(server: &str, message: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/chat", server);
    let resp = client()?
        .post(&url)
        .json(&serde_json::json!({ "message": message }))
        .send();

    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            eprintln!("supportlens-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };
    let resp = fail_on_error_status(resp);

    if json_output {
        let body: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let chat: ChatResponse = resp.json()?;
    println!("{}", chat.reply);
    println!();
    println!("Categories: {}", chat.categories.join(", "));
    println!("Latency:    {} ms", chat.latency_ms);
    if chat.degraded {
        println!("Degraded:   yes (classification service unavailable)");
    }
    match chat.trace_id {
        Some(id) => println!("Trace:      #{}", id),
        None => println!("Trace:      not recorded"),
    }

    Ok(())
}

fn do_traces(server: &str, category: Option<&str>, json_output: bool) -> anyhow::Result<()> {
    let mut url = format!("{}/traces", server);
    if let Some(c) = category {
        url = format!("{}?category={}", url, c);
    }

    let resp = match client()?.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("supportlens-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };
    let resp = fail_on_error_status(resp);

    if json_output {
        let body: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let traces: Vec<TraceResponse> = resp.json()?;
    if traces.is_empty() {
        eprintln!("No traces found.");
        return Ok(());
    }
    for t in &traces {
        let preview: String = t.user_message.chars().take(60).collect();
        println!(
            "#{:<5} {}  [{}]  {} ms",
            t.id,
            t.timestamp,
            t.categories.join(", "),
            t.response_time_ms
        );
        println!("       {}\n", preview);
    }

    Ok(())
}

fn do_analytics(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/analytics", server);
    let resp = match client()?.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("supportlens-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };
    let resp = fail_on_error_status(resp);

    let body: serde_json::Value = resp.json()?;
    println!("Total traces:      {}", body["total_traces"]);
    println!("Average latency:   {} ms", body["average_response_time_ms"]);
    println!("Category breakdown:");
    if let Some(breakdown) = body["category_breakdown"].as_object() {
        for (label, stat) in breakdown {
            println!(
                "  {:<16} {:>5}  {:>5.1}%",
                label,
                stat["count"],
                stat["percentage"].as_f64().unwrap_or(0.0)
            );
        }
    }

    Ok(())
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = client()?.get(&url).send();

    match resp {
        Ok(r) => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Overall:    {}", body["overall"].as_str().unwrap_or("unknown"));
            println!("Storage:    {}", body["storage"].as_str().unwrap_or("?"));
            println!("Classifier: {}", body["classifier"].as_str().unwrap_or("?"));
            println!("Version:    {}", body["version"].as_str().unwrap_or("?"));
        }
        Err(e) => {
            eprintln!("supportlens-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Chat { message, json } => do_chat(&server, &message, json),
        Commands::Traces { category, json } => do_traces(&server, category.as_deref(), json),
        Commands::Analytics => do_analytics(&server),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("supportlens-cli: {}", e);
        std::process::exit(1);
    }
}
