use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use viewshop::application::accounts::AccountService;
use viewshop::application::engine::OrderEngine;
use viewshop::application::ledger::Ledger;
use viewshop::application::quotes::QuoteDesk;
use viewshop::config::{ApiConfig, RetryPolicy, parse_id_list};
use viewshop::domain::ports::{LedgerStoreRef, NotifierRef, OrderApiRef};
use viewshop::infrastructure::json_file::JsonFileLedgerStore;
use viewshop::infrastructure::notifier::ChannelNotifier;
use viewshop::infrastructure::smm_api::SmmApiClient;
use viewshop::interfaces::console::command_reader::CommandReader;
use viewshop::interfaces::console::session::{ConsoleSession, flush_notices};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command script (CSV: user, command, arg, extra). Reads stdin when omitted.
    script: Option<PathBuf>,

    /// Directory of the local JSON ledger.
    #[arg(long, env = "VIEWSHOP_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Path to a RocksDB ledger used as primary store (optional).
    #[arg(long, env = "VIEWSHOP_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Comma separated admin user ids, merged into the stored settings.
    #[arg(long, env = "ADMIN_IDS", default_value = "")]
    admin_ids: String,

    #[arg(long, env = "API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    #[arg(long, env = "API_URL", default_value = viewshop::config::DEFAULT_API_URL)]
    api_url: String,

    #[arg(long, env = "API_SERVICE_ID", default_value_t = viewshop::config::DEFAULT_SERVICE_ID)]
    service_id: u32,

    /// Per-attempt timeout of API requests.
    #[arg(long, env = "API_TIMEOUT_SECS", default_value_t = 60)]
    api_timeout_secs: u64,

    /// Attempts per API call, including the first.
    #[arg(long, env = "API_RETRIES", default_value_t = 3)]
    api_retries: u32,

    #[arg(long, env = "API_RETRY_DELAY_MS", default_value_t = 5000)]
    api_retry_delay_ms: u64,

    /// Wait for scheduled dispatches before exiting instead of leaving them
    /// for the next start.
    #[arg(long)]
    drain: bool,
}

impl Cli {
    fn api_config(&self) -> ApiConfig {
        ApiConfig {
            api_key: self.api_key.clone(),
            base_url: self.api_url.clone(),
            service_id: self.service_id,
            retry: RetryPolicy {
                max_attempts: self.api_retries,
                delay: Duration::from_millis(self.api_retry_delay_ms),
                request_timeout: Duration::from_secs(self.api_timeout_secs),
            },
        }
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,viewshop=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init();
}

fn open_store(cli: &Cli) -> Result<LedgerStoreRef> {
    let local = JsonFileLedgerStore::open(&cli.data_dir).into_diagnostic()?;
    info!(dir = %cli.data_dir.display(), "local ledger opened");
    match &cli.db_path {
        Some(db_path) => Ok(open_primary(db_path, local)),
        None => Ok(Arc::new(local)),
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_primary(db_path: &Path, local: JsonFileLedgerStore) -> LedgerStoreRef {
    use viewshop::infrastructure::fallback::{DEGRADED_MARKER, FallbackLedgerStore};
    use viewshop::infrastructure::rocksdb::RocksDbLedgerStore;

    match RocksDbLedgerStore::open(db_path) {
        Ok(primary) => {
            info!(path = %db_path.display(), "RocksDB ledger opened");
            let marker = local.dir().join(DEGRADED_MARKER);
            Arc::new(
                FallbackLedgerStore::new(Arc::new(primary), Arc::new(local)).with_marker(marker),
            )
        }
        Err(e) => {
            warn!(path = %db_path.display(), error = %e, "RocksDB unavailable, using the local ledger only");
            Arc::new(local)
        }
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_primary(db_path: &Path, local: JsonFileLedgerStore) -> LedgerStoreRef {
    warn!(
        path = %db_path.display(),
        "persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled; falling back to the local ledger"
    );
    Arc::new(local)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let api_config = cli.api_config();
    if !api_config.is_configured() {
        warn!("API_KEY is not set; the provider will reject submissions");
    }

    let store = open_store(&cli)?;
    let ledger = Arc::new(Ledger::new(store));
    let (notifier, mut notices) = ChannelNotifier::new();
    let notifier: NotifierRef = Arc::new(notifier);
    let api: OrderApiRef = Arc::new(SmmApiClient::new(api_config).into_diagnostic()?);

    let accounts = AccountService::new(ledger.clone(), notifier.clone());
    let admin_ids = parse_id_list(&cli.admin_ids);
    if !admin_ids.is_empty() {
        accounts.merge_admins(&admin_ids).await.into_diagnostic()?;
    }

    let engine = OrderEngine::new(ledger, api, notifier);
    let resumed = engine.resume_pending().await.into_diagnostic()?;
    if resumed > 0 {
        info!(count = resumed, "pending orders rescheduled");
    }

    let session = ConsoleSession::new(engine.clone(), accounts, QuoteDesk::default());
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = match &cli.script {
        Some(path) => {
            let file = File::open(path).into_diagnostic()?;
            session
                .run(CommandReader::new(file), &mut out, &mut notices)
                .await
        }
        None => {
            session
                .run(CommandReader::new(io::stdin()), &mut out, &mut notices)
                .await
        }
    }
    .into_diagnostic()?;
    info!(handled = summary.handled, rejected = summary.rejected, "script finished");

    let scheduler = engine.scheduler();
    if cli.drain {
        info!(pending = scheduler.pending(), "waiting for scheduled dispatches");
    } else {
        let left = scheduler.shutdown();
        if left > 0 {
            info!(count = left, "scheduled dispatches left pending until next start");
        }
    }
    scheduler.drain().await;
    flush_notices(&mut notices, &mut out).into_diagnostic()?;

    Ok(())
}
