//! Purpose: `gravel` CLI entry point.
//! Role: Binary crate root; parses args and runs the server.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `core::error::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde_json::json;

use gravel::core::error::{Error, ErrorKind, to_exit_code};
use gravel::serve::{ServeConfig, serve};

#[derive(Parser, Debug)]
#[command(name = "gravel", version, about = "Partition/sort-key document store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the JSONL item server over an embedded database.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "GRAVEL_PORT", default_value_t = 50051)]
    port: u16,

    /// Directory holding the database files; created if absent.
    #[arg(long, env = "GRAVEL_DB_PATH", default_value = "/tmp/gravel")]
    db_path: PathBuf,

    /// Largest accepted request line, in bytes.
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    max_line_bytes: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let payload = json!({
                "error": {
                    "kind": err.kind().name(),
                    "message": err.wire_message(),
                }
            });
            eprintln!("{payload}");
            ExitCode::from(to_exit_code(err.kind()) as u8)
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Command::Serve(args) => {
            let config = ServeConfig {
                bind: SocketAddr::new(args.host, args.port),
                db_path: args.db_path,
                max_line_bytes: args.max_line_bytes,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start async runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve(config))
        }
    }
}
