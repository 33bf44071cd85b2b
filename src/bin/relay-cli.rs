use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Management CLI for the channel relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "RELAY_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show relay status
    Status,
    /// Show connection, channel and queue counters
    Stats,
    /// Show who is online, globally or in one channel
    Presence {
        #[arg(short, long)]
        channel: Option<String>,
    },
    /// Inspect one connected client
    Client { id: String },
    /// Broadcast an event to a channel
    Broadcast {
        channel: String,
        #[arg(short, long, default_value = "message")]
        event: String,
        /// JSON payload
        #[arg(short, long, default_value = "{}")]
        data: String,
    },
    /// Send an emergency alert to every channel
    Emergency { message: String },
    /// Stop accepting connections and processing client frames
    Pause {
        #[arg(short, long)]
        ttl: Option<u64>,
    },
    /// Lift a pause
    Resume,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Stats => client.get(format!("{base}/admin/stats")),
        Commands::Presence { channel } => {
            let request = client.get(format!("{base}/admin/presence"));
            match channel {
                Some(channel) => request.query(&[("channel", channel)]),
                None => request,
            }
        }
        Commands::Client { id } => client.get(format!("{base}/admin/clients/{id}")),
        Commands::Broadcast { channel, event, data } => {
            let data: Value = serde_json::from_str(&data)?;
            client
                .post(format!("{base}/admin/broadcast"))
                .json(&json!({ "channel": channel, "event": event, "data": data }))
        }
        Commands::Emergency { message } => client
            .post(format!("{base}/admin/emergency"))
            .json(&json!({ "message": message })),
        Commands::Pause { ttl } => client
            .post(format!("{base}/admin/pause"))
            .json(&json!({ "ttl_secs": ttl })),
        Commands::Resume => client.delete(format!("{base}/admin/pause")),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
