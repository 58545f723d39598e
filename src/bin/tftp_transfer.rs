//! Command-line front end for the transfer engines

use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::Parser;
use tftp_transfer::{Client, BLKSIZE, TFTP_PORT};

/// TFTP client
#[derive(Parser, Debug)]
#[command(name = "tftp_transfer")]
#[command(about = "Move a single file to or from a TFTP server", long_about = None)]
struct Cli {
    /// TFTP server address, host or host:port
    #[arg(short, long)]
    server: String,

    /// Download this remote file
    #[arg(short, long, conflicts_with = "put")]
    get: Option<String>,

    /// Upload to this remote filename
    #[arg(short, long)]
    put: Option<String>,

    /// Local file path (for get: destination, for put: source)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Requested block size
    #[arg(short, long, default_value_t = BLKSIZE)]
    blksize: usize,

    /// Receive timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    /// Retry budget
    #[arg(short, long, default_value_t = 5)]
    retries: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .init();

    let server = if cli.server.contains(':') {
        cli.server.clone()
    } else {
        format!("{}:{TFTP_PORT}", cli.server)
    };
    let client = Client::new(Duration::from_secs(cli.timeout), cli.retries);

    let outcome = if let Some(remote) = cli.get.as_deref() {
        let local = cli.file.clone().unwrap_or_else(|| PathBuf::from(remote));
        client
            .download(server.as_str(), remote, local, cli.blksize)
            .map(|path| format!("Download completed as {}", path.display()))
    } else if let Some(remote) = cli.put.as_deref() {
        let local = cli.file.clone().unwrap_or_else(|| PathBuf::from(remote));
        client
            .upload(server.as_str(), remote, local, cli.blksize)
            .map(|()| "Upload completed".to_string())
    } else {
        eprintln!("Must specify either --get or --put");
        return ExitCode::FAILURE;
    };

    match outcome {
        Ok(msg) => {
            println!("{msg}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
