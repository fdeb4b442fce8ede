//! crosspost - Publish one message as a thread on Bluesky and Mastodon

use std::io::{self, Read};
use std::path::PathBuf;

use clap::Parser;
use libcrosspost::config::Config;
use libcrosspost::poster::{create_platforms, select_platforms, DeliveryReport, Orchestrator};
use libcrosspost::{CrosspostError, ImageAsset, Message, Result};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "crosspost")]
#[command(version)]
#[command(about = "Publish one message as a thread on Bluesky and Mastodon", long_about = None)]
#[command(after_help = "EXAMPLES:
    crosspost --bluesky --mastodon \"Hello #world from @alice.bsky.social\"
    echo \"Long text...\" | crosspost -p bluesky
    crosspost -m \"Photo day\" -i cat.png -i dog.jpg --mastodon

EXIT CODES:
    0 - Every platform received the whole thread
    1 - Posting failed on at least one platform
    2 - Authentication failed
    3 - Invalid input (empty message, no platform, unreadable image)")]
struct Cli {
    /// Message to post (reads from stdin if not provided)
    content: Option<String>,

    /// Message to post, as an option
    #[arg(short, long, conflicts_with = "content")]
    message: Option<String>,

    /// Image to attach to the first post (repeatable)
    #[arg(short, long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,

    /// Post to Bluesky
    #[arg(long)]
    bluesky: bool,

    /// Post to Mastodon
    #[arg(long)]
    mastodon: bool,

    /// Target specific platform(s) (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    platform: Vec<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(long, value_name = "PATH", env = "CROSSPOST_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libcrosspost::logging::init_default(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let text = read_message(&cli)?;
    let images = cli
        .images
        .iter()
        .map(ImageAsset::load)
        .collect::<Result<Vec<_>>>()?;
    let message = Message::new(text, images)?;

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let selected = select_platforms(&config, &requested_platforms(&cli))?;
    tracing::info!("Delivering to {}", selected.join(", "));

    let set = create_platforms(&config, &selected)?;
    let mut platforms = set.platforms;
    let mut reports = set.unavailable;

    let orchestrator = Orchestrator::new(config.delivery.clone());
    reports.extend(orchestrator.deliver_all(&mut platforms, &message).await);

    match cli.format.as_str() {
        "json" => {
            let rendered: Vec<_> = reports.iter().map(report_json).collect();
            let output = serde_json::to_string_pretty(&rendered).map_err(|e| {
                CrosspostError::InvalidInput(format!("Failed to format output: {}", e))
            })?;
            println!("{}", output);
        }
        _ => {
            for report in &reports {
                println!("{}", report_line(report));
            }
        }
    }

    Ok(reports
        .iter()
        .map(DeliveryReport::exit_code)
        .find(|code| *code != 0)
        .unwrap_or(0))
}

/// Take the message from the arguments, or from stdin when it is piped
fn read_message(cli: &Cli) -> Result<String> {
    if let Some(text) = cli.content.as_ref().or(cli.message.as_ref()) {
        return Ok(text.clone());
    }

    if atty::is(atty::Stream::Stdin) {
        return Err(CrosspostError::InvalidInput(
            "No message provided. Pass it as an argument, with -m, or on stdin".to_string(),
        ));
    }

    read_piped_message(io::stdin())
}

/// Read a piped message, dropping the surrounding whitespace and trailing newline
fn read_piped_message(mut input: impl Read) -> Result<String> {
    let mut buffer = String::new();
    input
        .read_to_string(&mut buffer)
        .map_err(|e| CrosspostError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
    Ok(buffer.trim().to_string())
}

/// Platform names from `--bluesky`, `--mastodon` and `--platform`
fn requested_platforms(cli: &Cli) -> Vec<String> {
    let mut requested = Vec::new();
    if cli.bluesky {
        requested.push("bluesky".to_string());
    }
    if cli.mastodon {
        requested.push("mastodon".to_string());
    }
    requested.extend(cli.platform.iter().cloned());
    requested
}

fn report_line(report: &DeliveryReport) -> String {
    match &report.failure {
        None => {
            let root = report.thread.root().map(|p| p.id.as_str()).unwrap_or("-");
            format!(
                "{}: ok, {} post(s), {} image(s), root {}",
                report.platform,
                report.thread.len(),
                report.images_attached,
                root
            )
        }
        Some(failure) => match failure.segment {
            Some(segment) => format!(
                "{}: failed at segment {}/{} ({} posted): {}",
                report.platform,
                segment,
                report.segments,
                report.thread.len(),
                failure.error
            ),
            None => format!(
                "{}: failed to {}: {}",
                report.platform, failure.stage, failure.error
            ),
        },
    }
}

fn report_json(report: &DeliveryReport) -> serde_json::Value {
    json!({
        "platform": report.platform,
        "success": report.is_success(),
        "segments": report.segments,
        "posts": report
            .thread
            .posts
            .iter()
            .map(|p| json!({ "id": p.id, "cid": p.cid }))
            .collect::<Vec<_>>(),
        "images_attached": report.images_attached,
        "images_skipped": report
            .images_skipped
            .iter()
            .map(|s| json!({ "image": s.name, "reason": s.reason }))
            .collect::<Vec<_>>(),
        "error": report.failure.as_ref().map(|f| json!({
            "stage": f.stage.to_string(),
            "segment": f.segment,
            "message": f.error.to_string(),
            "exit_code": f.error.exit_code(),
        })),
    })
}
