//! tally-server — entry point.
//!
//! ```text
//! tally-server -p 4242               Serve on 0.0.0.0:4242
//! tally-server --bind 127.0.0.1      Restrict the bind address
//! ```

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tally_core::ConnectionInfo;
use tally_server::TallyServer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tally-server", about = "tally stateless arithmetic service")]
struct Cli {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Port to serve on.
    #[arg(short, long, default_value_t = 4242)]
    port: u16,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("tally-server v{}", env!("CARGO_PKG_VERSION"));

    let info = ConnectionInfo::new(cli.bind, cli.port);
    let server = TallyServer::bind(&info).await?;
    info!("published at port {}", server.local_addr()?.port());

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received — shutting down");
        }
    }

    Ok(())
}
