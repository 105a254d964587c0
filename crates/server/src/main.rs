use clap::Parser;
use cultigrid_engine::{sqlite::DEFAULT_KEY, ActorId, HistoryConfig};
use cultigrid_server::ServerConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cultigrid-server", about = "Local host for one cart layout session")]
struct Cli {
    #[arg(long, env = "CULTIGRID_ADDR", default_value = "127.0.0.1:39333")]
    addr: SocketAddr,

    /// SQLite file holding the shared layout document.
    #[arg(long, env = "CULTIGRID_DB")]
    db: Option<PathBuf>,

    /// Document key inside the database.
    #[arg(long, env = "CULTIGRID_KEY", default_value = DEFAULT_KEY)]
    key: String,

    /// Actor identity for this session. Without it the session is read-only
    /// until one is posted to /api/session/actor.
    #[arg(long, env = "CULTIGRID_ACTOR")]
    actor: Option<String>,

    #[arg(long, env = "CULTIGRID_POLL_MS", default_value_t = 1000)]
    poll_ms: u64,

    /// Keep at most this many undo snapshots.
    #[arg(long, env = "CULTIGRID_HISTORY_DEPTH")]
    history_depth: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cultigrid")
            .join("cultigrid.db")
    });
    let actor = cli.actor.and_then(ActorId::new);
    if actor.is_none() {
        tracing::warn!("no actor identity configured; commands are refused until one is supplied");
    }

    let config = ServerConfig {
        db_path,
        key: cli.key,
        actor,
        poll_every: Duration::from_millis(cli.poll_ms.max(50)),
        history: HistoryConfig {
            max_depth: cli.history_depth,
        },
    };

    tracing::info!(addr = %cli.addr, "cultigrid server starting");
    cultigrid_server::serve(cli.addr, config).await
}
