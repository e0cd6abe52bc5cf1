use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Parser)]
#[command(
    name = "signaldesk",
    version,
    about = "Signaldesk CLI: load behavioral logs, trigger decisions, and run draft dispatch passes"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "SIGNALDESK_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Raw log operations
    Logs {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Derive and persist a decision for one entity
    Decide {
        /// Stable identifier of the organization
        #[arg(long)]
        entity_id: String,
        /// Display name used in the generated copy
        #[arg(long)]
        entity_name: String,
        /// Contact the draft will be addressed to
        #[arg(long)]
        lead_email: String,
        /// Inline raw log line (repeatable). When omitted, the entity's
        /// stored logs are used.
        #[arg(long = "log")]
        logs: Vec<String>,
    },
    /// Decision record operations
    Decisions {
        #[command(subcommand)]
        command: DecisionCommands,
    },
    /// Draft dispatch operations
    Dispatch {
        #[command(subcommand)]
        command: DispatchCommands,
    },
}

#[derive(Subcommand)]
enum LogCommands {
    /// Bulk-load raw log lines from a file (one line per row)
    Load {
        #[arg(long)]
        entity_id: String,
        /// Path to a text file of raw log lines
        #[arg(long)]
        file: String,
    },
}

#[derive(Subcommand)]
enum DecisionCommands {
    /// List decision records
    List {
        /// Filter by status (PENDING, DRAFT_CREATED, FAILED)
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of records to return
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[derive(Subcommand)]
enum DispatchCommands {
    /// Scan PENDING records, create external drafts, and report counts.
    /// Exits non-zero when any record failed this pass.
    Run,
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", serde_json::to_string_pretty(&err).unwrap());
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Health => health(&cli.api_url).await,
        Commands::Logs { command } => match command {
            LogCommands::Load { entity_id, file } => {
                logs_load(&cli.api_url, &entity_id, &file).await
            }
        },
        Commands::Decide {
            entity_id,
            entity_name,
            lead_email,
            logs,
        } => decide(&cli.api_url, &entity_id, &entity_name, &lead_email, &logs).await,
        Commands::Decisions { command } => match command {
            DecisionCommands::List { status, limit } => {
                decisions_list(&cli.api_url, status.as_deref(), limit).await
            }
        },
        Commands::Dispatch { command } => match command {
            DispatchCommands::Run => dispatch_run(&cli.api_url).await,
        },
    };

    if let Err(e) = result {
        exit_error(&e.to_string(), None);
    }
}

async fn health(api_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let resp = client().get(format!("{api_url}/health")).send().await?;
    let body: serde_json::Value = resp.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn logs_load(
    api_url: &str,
    entity_id: &str,
    file: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {file}: {e}"))?;
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        exit_error(
            "file contains no log lines",
            Some("Provide a text file with one raw log line per row"),
        );
    }

    // The API caps batches at 500 lines; chunk larger files.
    let mut total = 0usize;
    for chunk in lines.chunks(500) {
        let body = json!({
            "entity_id": entity_id,
            "lines": chunk.iter().map(|line| json!({ "line": line })).collect::<Vec<_>>()
        });

        let resp = client()
            .post(format!("{api_url}/v1/logs/batch"))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp.json().await?;
        if !status.is_success() {
            eprintln!("{}", serde_json::to_string_pretty(&resp_body)?);
            std::process::exit(1);
        }
        total += resp_body["inserted"].as_u64().unwrap_or(0) as usize;
    }

    println!("{}", serde_json::to_string_pretty(&json!({ "inserted": total }))?);
    Ok(())
}

async fn decide(
    api_url: &str,
    entity_id: &str,
    entity_name: &str,
    lead_email: &str,
    logs: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut body = json!({
        "entity_id": entity_id,
        "entity_name": entity_name,
        "lead_email": lead_email
    });
    if !logs.is_empty() {
        body["log_lines"] = json!(logs);
    }

    let resp = client()
        .post(format!("{api_url}/v1/decisions"))
        .json(&body)
        .send()
        .await?;

    let status = resp.status();
    let resp_body: serde_json::Value = resp.json().await?;

    if !status.is_success() {
        eprintln!("{}", serde_json::to_string_pretty(&resp_body)?);
        std::process::exit(1);
    }

    println!("{}", serde_json::to_string_pretty(&resp_body)?);
    Ok(())
}

async fn decisions_list(
    api_url: &str,
    status: Option<&str>,
    limit: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut url = format!("{api_url}/v1/decisions");
    let mut params = Vec::new();

    if let Some(s) = status {
        params.push(format!("status={s}"));
    }
    if let Some(l) = limit {
        params.push(format!("limit={l}"));
    }
    if !params.is_empty() {
        url = format!("{}?{}", url, params.join("&"));
    }

    let resp = client().get(&url).send().await?;
    let http_status = resp.status();
    let resp_body: serde_json::Value = resp.json().await?;

    if !http_status.is_success() {
        eprintln!("{}", serde_json::to_string_pretty(&resp_body)?);
        std::process::exit(1);
    }

    println!("{}", serde_json::to_string_pretty(&resp_body)?);
    Ok(())
}

async fn dispatch_run(api_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let resp = client()
        .post(format!("{api_url}/v1/dispatch/run"))
        .send()
        .await?;

    let status = resp.status();
    let resp_body: serde_json::Value = resp.json().await?;

    if !status.is_success() {
        eprintln!("{}", serde_json::to_string_pretty(&resp_body)?);
        std::process::exit(1);
    }

    println!("{}", serde_json::to_string_pretty(&resp_body)?);

    // Surface unresolved failures to cron and CI callers.
    if resp_body["failed"].as_u64().unwrap_or(0) > 0 {
        std::process::exit(1);
    }
    Ok(())
}
