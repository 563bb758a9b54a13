//! tally-client — entry point.
//!
//! ```text
//! tally-client                        Start without a server
//! tally-client -H localhost -p 4242   Connect at startup
//! tally-client --config <path>        Load a custom config TOML
//! tally-client --gen-config           Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tally_client::config::ClientConfig;
use tally_client::repl::{ReplCommand, USAGE, parse_line};
use tally_core::{ClientOutput, TallyClient, TcpResolver};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tally-client", about = "tally interactive arithmetic client")]
struct Cli {
    /// Server host to connect to at startup.
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port to connect to at startup.
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "tally-client.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = ClientConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("tally-client v{}", env!("CARGO_PKG_VERSION"));

    let (client, mut outputs) =
        TallyClient::spawn(Arc::new(TcpResolver), config.to_client_options());

    // Printer task: results and notices, as they arrive.
    tokio::spawn(async move {
        while let Some(output) = outputs.recv().await {
            match output {
                ClientOutput::Result { task, value } => println!("{task} = {value}"),
                ClientOutput::Notice(message) => println!("*** {message}"),
            }
        }
    });

    print!("{USAGE}");

    // Initial connect: CLI beats config; config port 0 means none.
    let host = cli.host.unwrap_or_else(|| config.network.host.clone());
    let port = cli.port.unwrap_or(config.network.port);
    if !host.is_empty() && port > 0 {
        client.connect(host, port)?;
    } else {
        println!(
            "*** no server received via config, \
             please use \"connect <host> <port>\" before using the calculator"
        );
    }

    // Read next line, parse it, and feed the client.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Ok(Some(ReplCommand::Quit)) => break,
            Ok(Some(ReplCommand::Connect { host, port })) => client.connect(host, port)?,
            Ok(Some(ReplCommand::Submit(task))) => client.submit(task)?,
            Ok(None) => {}
            Err(message) => {
                println!("{message}");
                print!("{USAGE}");
            }
        }
    }

    info!("... cya");
    Ok(())
}
