//! Sensorcast CLI
//!
//! Command-line companion for a running server:
//! - Watch a topic live
//! - Push readings
//! - Check status
//! - Print the default config

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc;

use sensorcast::client::TopicWatcher;
use sensorcast::config::{generate_default_config, LoggingConfig};
use sensorcast::{logging, Envelope};

#[derive(Parser)]
#[command(name = "sensorcast-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Watch and feed a Sensorcast server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Server URL
    #[arg(long, default_value = "http://localhost:8080", global = true)]
    pub server: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Subscribe to a topic and print every envelope
    Watch {
        /// Topic to subscribe to
        #[arg(default_value = "all")]
        topic: String,
        /// Seconds between reconnect attempts
        #[arg(long, default_value = "5")]
        retry_secs: u64,
    },

    /// Push one reading
    Push {
        /// Sensor id
        id: String,
        /// Sensor display name
        name: String,
        /// Temperature in °F
        temp: f64,
        /// Topic to publish to (default: the server's default topic)
        #[arg(short, long)]
        topic: Option<String>,
        /// Event tag of the published envelope
        #[arg(short, long, default_value = "update")]
        event: String,
    },

    /// Show server status
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { topic, retry_secs } => {
            logging::init(&LoggingConfig {
                level: "warn".to_string(),
                ..LoggingConfig::default()
            });

            let watcher = TopicWatcher::new(&cli.server, topic)?.with_policy(
                sensorcast::client::ReconnectPolicy {
                    delay: std::time::Duration::from_secs(retry_secs.max(1)),
                },
            );
            eprintln!("Watching '{}' on {}", watcher.topic(), watcher.url());

            let (tx, mut rx) = mpsc::channel::<Envelope>(64);
            let format = cli.format.clone();
            let printer = tokio::spawn(async move {
                while let Some(envelope) = rx.recv().await {
                    print_envelope(&envelope, &format);
                }
            });

            tokio::select! {
                result = watcher.run(tx) => result?,
                _ = tokio::signal::ctrl_c() => {}
            }
            printer.abort();
        }

        Commands::Push {
            id,
            name,
            temp,
            topic,
            event,
        } => {
            let body = serde_json::json!({
                "topic": topic,
                "event": event,
                "readings": [{ "id": id, "name": name, "temp": temp }],
            });

            let client = reqwest::Client::new();
            let response = client
                .post(format!("{}/api/v1/readings", cli.server.trim_end_matches('/')))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                let result: serde_json::Value = response.json().await?;
                println!(
                    "Pushed {} ({}) = {:.1}°F to '{}', delivered to {}",
                    name,
                    id,
                    temp,
                    result["topic"].as_str().unwrap_or("-"),
                    result["delivered"].as_u64().unwrap_or(0)
                );
            } else {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                eprintln!("Failed ({}): {}", status, text);
                std::process::exit(1);
            }
        }

        Commands::Status => {
            let response = reqwest::Client::new()
                .get(format!("{}/health", cli.server.trim_end_matches('/')))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: serde_json::Value = resp.json().await?;

                    if cli.format == "json" {
                        println!("{}", serde_json::to_string_pretty(&health)?);
                        return Ok(());
                    }

                    println!(
                        "Sensorcast v{}",
                        health["version"].as_str().unwrap_or("unknown")
                    );
                    println!();
                    println!("Status: {}", health["status"].as_str().unwrap_or("unknown"));
                    println!(
                        "Connections: {}",
                        health["connections"].as_u64().unwrap_or(0)
                    );
                    if let Some(topics) = health["topics"].as_array() {
                        let names: Vec<&str> = topics.iter().filter_map(|t| t.as_str()).collect();
                        println!("Topics: {}", if names.is_empty() { "-".to_string() } else { names.join(", ") });
                    }
                    if let Some(plugins) = health["plugins"].as_array() {
                        let names: Vec<&str> = plugins.iter().filter_map(|p| p.as_str()).collect();
                        println!("Plugins: {}", if names.is_empty() { "-".to_string() } else { names.join(", ") });
                    }
                    println!(
                        "Default handler: {}",
                        if health["default_handler"].as_bool().unwrap_or(false) {
                            "on"
                        } else {
                            "off"
                        }
                    );
                    if let Some(uptime) = health["uptime_seconds"].as_u64() {
                        println!();
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Ok(resp) => {
                    eprintln!("Server returned error: {}", resp.status());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Cannot connect to Sensorcast at {}", cli.server);
                    eprintln!("Error: {}", e);
                    eprintln!();
                    eprintln!("Make sure the server is running:");
                    eprintln!("  cargo run --bin sensorcast");
                    std::process::exit(1);
                }
            }
        }

        Commands::Config { output } => {
            let config = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, config)?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", config),
            }
        }
    }

    Ok(())
}

fn print_envelope(envelope: &Envelope, format: &str) {
    if format == "json" {
        match serde_json::to_string(envelope) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Cannot render envelope: {}", e),
        }
        return;
    }

    let time = chrono::Local::now().format("%H:%M:%S");
    match envelope.data()["all"].as_array() {
        Some(readings) => {
            println!("[{}] {}", time, envelope.event());
            for reading in readings {
                println!(
                    "  {:<8} {:<16} {:>7}",
                    reading["id"].as_str().unwrap_or("-"),
                    reading["name"].as_str().unwrap_or("-"),
                    reading["temp"]
                        .as_f64()
                        .map(|t| format!("{:.1}°F", t))
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
        None => println!("[{}] {} {}", time, envelope.event(), envelope.data()),
    }
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}
