//! Operator CLI for the GEC relay gateway.
//!
//! Drives the end-to-end certification sequence against a running
//! gateway: register entities, mint, record consumption, build and
//! anchor the settlement batch, then issue and verify QR tokens.

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gec-cli")]
#[command(about = "Operator CLI for the GEC verification gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:4200")]
    url: String,

    /// Admin bearer key (needed for status and entity registration).
    #[arg(short, long, default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// Show active/consumed QR session counts
    Sessions,
    /// List anchored months
    Anchors,
    /// Register a producer
    AddProducer {
        id: String,
        #[arg(long)]
        eth_address: String,
    },
    /// Register a project under a producer
    AddProject {
        id: String,
        #[arg(long)]
        producer: String,
        #[arg(long)]
        eth_address: String,
    },
    /// Register a consumer
    AddConsumer {
        id: String,
        #[arg(long)]
        eth_address: String,
    },
    /// Mint a month's units to the project address
    Mint {
        project: String,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        units: u64,
    },
    /// Record a consumption entry
    Consume {
        project: String,
        #[arg(long)]
        consumer: String,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        units: u64,
    },
    /// Build the month's Merkle tree
    Build {
        month: u32,
    },
    /// Anchor the built root on-chain
    Anchor {
        month: u32,
    },
    /// Issue a QR token for a consumer/month
    Qr {
        consumer: String,
        #[arg(long)]
        month: u32,
        /// Settlement tx reference to embed (defaults to the anchor tx)
        #[arg(long)]
        tx: Option<String>,
    },
    /// Verify a scanned QR payload
    Verify {
        qr: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut admin_headers = HeaderMap::new();
    if !cli.key.is_empty() {
        admin_headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
        );
    }

    let base = cli.url.trim_end_matches('/');
    match cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{base}/admin/status"))
                .headers(admin_headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Sessions => {
            let res = client
                .get(format!("{base}/admin/sessions"))
                .headers(admin_headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Anchors => {
            let res = client
                .get(format!("{base}/admin/anchors"))
                .headers(admin_headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::AddProducer { id, eth_address } => {
            let res = client
                .post(format!("{base}/admin/entities/producer"))
                .headers(admin_headers)
                .json(&json!({"id": id, "ethAddress": eth_address}))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::AddProject {
            id,
            producer,
            eth_address,
        } => {
            let res = client
                .post(format!("{base}/admin/entities/project"))
                .headers(admin_headers)
                .json(&json!({"id": id, "producerId": producer, "ethAddress": eth_address}))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::AddConsumer { id, eth_address } => {
            let res = client
                .post(format!("{base}/admin/entities/consumer"))
                .headers(admin_headers)
                .json(&json!({"id": id, "ethAddress": eth_address}))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Mint {
            project,
            month,
            units,
        } => {
            let res = client
                .post(format!("{base}/project/mint"))
                .json(&json!({"projectId": project, "monthId": month, "units": units}))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Consume {
            project,
            consumer,
            month,
            units,
        } => {
            let res = client
                .post(format!("{base}/project/consume"))
                .json(&json!({
                    "projectId": project,
                    "consumerId": consumer,
                    "monthId": month,
                    "units": units,
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Build { month } => {
            let res = client
                .post(format!("{base}/settlement/build"))
                .json(&json!({"monthId": month}))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Anchor { month } => {
            let res = client
                .post(format!("{base}/settlement/anchor"))
                .json(&json!({"monthId": month}))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Qr {
            consumer,
            month,
            tx,
        } => {
            let mut body = json!({"consumerId": consumer, "monthId": month});
            if let Some(tx) = tx {
                body["tx"] = json!(tx);
            }
            let res = client
                .post(format!("{base}/settlement/qr"))
                .json(&body)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Verify { qr } => {
            let res = client
                .post(format!("{base}/settlement/verify-qr"))
                .json(&json!({"qr": qr}))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
