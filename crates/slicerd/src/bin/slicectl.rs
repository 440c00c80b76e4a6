//! slicectl - operator client for the slicerd command channel
//!
//! ```text
//! slicectl true false              # exam on, simulation off
//! slicectl false true --wait-ack   # needs `acknowledge = true` on the server
//! ```

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use slicing_types::{parse_flag, Mode};

/// Switch the slicing controller's operating mode
#[derive(Parser, Debug)]
#[command(name = "slicectl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Exam mode: true or false
    exam: String,

    /// Simulation mode: true or false
    simulation: String,

    /// Controller host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Command channel port
    #[arg(short = 'p', long, default_value = "9999")]
    port: u16,

    /// Wait for the server's one-line acknowledgement
    #[arg(long)]
    wait_ack: bool,

    /// Connect and acknowledgement timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,
}

fn command_payload(exam: bool, simulation: bool) -> String {
    serde_json::json!({
        "exam": exam.to_string(),
        "simulation": simulation.to_string(),
    })
    .to_string()
}

async fn send(args: &Args, payload: &str) -> Result<Option<String>> {
    let timeout = Duration::from_millis(args.timeout_ms);
    let addr = format!("{}:{}", args.host, args.port);

    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
        .await
        .with_context(|| format!("Timed out connecting to {}", addr))?
        .with_context(|| format!("Failed to connect to {}", addr))?;

    stream.write_all(payload.as_bytes()).await?;
    stream.shutdown().await?;

    if !args.wait_ack {
        return Ok(None);
    }

    let mut reply = String::new();
    tokio::time::timeout(timeout, stream.read_to_string(&mut reply))
        .await
        .context("Timed out waiting for acknowledgement")??;
    Ok(Some(reply.trim().to_string()))
}

async fn run(args: Args) -> Result<()> {
    let exam = parse_flag(&args.exam).context("exam")?;
    let simulation = parse_flag(&args.simulation).context("simulation")?;
    let mode = Mode::from_flags(exam, simulation);

    match send(&args, &command_payload(exam, simulation)).await? {
        None => println!("Requested mode {}", mode),
        Some(reply) if reply.starts_with("ok") => println!("{}", reply),
        Some(reply) if reply.is_empty() => {
            bail!("No acknowledgement received; is `acknowledge` enabled on the server?")
        }
        Some(reply) => bail!("Server rejected the command: {}", reply),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("slicectl: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_matches_command_schema() {
        let value: serde_json::Value =
            serde_json::from_str(&command_payload(true, false)).unwrap();
        assert_eq!(value["exam"], "true");
        assert_eq!(value["simulation"], "false");
    }

    #[tokio::test]
    async fn test_rejects_invalid_flags_locally() {
        let args = Args::parse_from(["slicectl", "yes", "false", "--port", "1"]);
        let err = run(args).await.unwrap_err();
        assert!(format!("{:#}", err).contains("exam"));
    }
}
