//! playground-proxy: OpenAI-compatible proxy and command-line client for the
//! hosted AI playground.
//!
//! Usage:
//!   playground-proxy serve                              Run the HTTP proxy
//!   playground-proxy models                             List discovered models
//!   playground-proxy chat <model> <message> [--set k=v]  Stream a chat reply
//!   playground-proxy complete <model> <prompt> [--set k=v]  Stream a completion

use ai_playground_rust::server::{serve, ServerConfig};
use ai_playground_rust::{Message, PlaygroundClient, TextStream};
use anyhow::{bail, Context, Result};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::io::Write;

#[tokio::main]
async fn main() -> Result<()> {
    // Respect `RUST_LOG` if set; otherwise default to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "serve" => cmd_serve().await,
        "models" => cmd_models().await,
        "chat" => cmd_chat(&args[2..]).await,
        "complete" => cmd_complete(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("playground-proxy {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"playground-proxy: client and OpenAI-compatible proxy for the AI playground

USAGE:
    playground-proxy <COMMAND> [OPTIONS]

COMMANDS:
    serve                               Serve /v1/chat/completions, /v1/completions, /v1/models
    models                              List discovered models
    chat <model> <message> [--set k=v]  Stream a chat reply to stdout
    complete <model> <prompt> [--set k=v]
                                        Stream a single-prompt completion to stdout
    version                             Show version information
    help                                Show this help message

ENVIRONMENT:
    PLAYGROUND_BASE_URL                 Service base URL (default https://sdk.vercel.ai)
    PLAYGROUND_HTTP_TIMEOUT_SECS        Upstream timeout (default 60)
    PLAYGROUND_PROXY_URL                Outbound HTTP proxy
    PLAYGROUND_DISCOVERY_CONCURRENCY    Parallel bundle downloads (default 4)
    PLAYGROUND_SANDBOX_MAX_STEPS        Sandbox step budget (default 1000000)
    PLAYGROUND_HOST / PORT              Listener address (default 127.0.0.1:8787)
    RUST_LOG                            Log filter (default info)"#
    );
}

async fn cmd_serve() -> Result<()> {
    let client = PlaygroundClient::new()
        .await
        .context("failed to build playground client")?;
    serve(ServerConfig::from_env(), client).await
}

async fn cmd_models() -> Result<()> {
    let client = PlaygroundClient::new().await?;
    let catalog = client
        .await_ready()
        .await
        .context("model discovery failed")?;
    for (id, spec) in catalog.iter() {
        let defaults = Value::Object(spec.default_params());
        println!("{id}\t{defaults}");
    }
    Ok(())
}

async fn cmd_chat(args: &[String]) -> Result<()> {
    let (model, text, params) = parse_generation_args(args, "chat <model> <message>")?;
    let client = PlaygroundClient::new().await?;
    let stream = client
        .chat(&model, vec![Message::user(text)], params)
        .await?;
    print_stream(stream).await
}

async fn cmd_complete(args: &[String]) -> Result<()> {
    let (model, prompt, params) = parse_generation_args(args, "complete <model> <prompt>")?;
    let client = PlaygroundClient::new().await?;
    let stream = client.generate(&model, &prompt, params).await?;
    print_stream(stream).await
}

async fn print_stream(mut stream: TextStream) -> Result<()> {
    let mut stdout = std::io::stdout();
    while let Some(fragment) = stream.next().await {
        stdout.write_all(fragment?.as_bytes())?;
        stdout.flush()?;
    }
    println!();
    Ok(())
}

/// `<model> <text> [--set key=value]...`; values are parsed as JSON when
/// possible, otherwise taken as strings.
fn parse_generation_args(
    args: &[String],
    usage: &str,
) -> Result<(String, String, Map<String, Value>)> {
    let mut positional = Vec::new();
    let mut params = Map::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--set" {
            let Some(pair) = iter.next() else {
                bail!("--set requires key=value");
            };
            let Some((key, raw)) = pair.split_once('=') else {
                bail!("--set expects key=value, got '{pair}'");
            };
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            params.insert(key.to_string(), value);
        } else {
            positional.push(arg.clone());
        }
    }
    match positional.as_slice() {
        [model, text] => Ok((model.clone(), text.clone(), params)),
        _ => bail!("usage: playground-proxy {usage} [--set key=value]"),
    }
}
