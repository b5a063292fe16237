pub mod config;
pub mod host;
pub mod panel;
pub mod session;
pub mod stream;

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;

use config::OverlayConfig;
use session::{
    spawn_controller, Broadcaster, LedgerStore, SessionLedger, StoredAuthProvider,
};
use stream::HttpAgentTransport;

/// Return the platform-standard data directory for the overlay host.
///
/// - macOS: `~/Library/Application Support/com.nat.overlay/`
/// - Windows: `{FOLDERID_RoamingAppData}\com.nat.overlay\`
/// - Linux: `$XDG_DATA_HOME/com.nat.overlay/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.nat-overlay/` only if none of the above can be resolved.
pub(crate) fn data_dir() -> std::path::PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("com.nat.overlay");
    }
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".nat-overlay")
}

/// Cut `s` to at most `max_bytes`, backing off to a char boundary.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Initialize the tracing subscriber, writing to `host.log` in the data dir.
///
/// Stdout belongs to the extension, so nothing is ever logged there.
/// On each start the previous logs are rotated (keeps the last 3) and a
/// banner with the data directory is written.
fn init_tracing(log_dir: &std::path::Path) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let _ = std::fs::create_dir_all(log_dir);
    let log_path = log_dir.join("host.log");

    rotate_log_file(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .expect("failed to open host.log");

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nat_overlay=info,warn"));

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== overlay host starting ==="
    );
}

/// `host.log` → `host.log.{n}`.
fn rotated(base: &std::path::Path, n: u32) -> std::path::PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{n}"));
    std::path::PathBuf::from(name)
}

/// Shift `host.log` → `.1` → `.2` … keeping at most `keep` old files.
fn rotate_log_file(base_path: &std::path::Path, keep: u32) {
    let _ = std::fs::remove_file(rotated(base_path, keep));
    for n in (1..keep).rev() {
        let _ = std::fs::rename(rotated(base_path, n), rotated(base_path, n + 1));
    }
    if base_path.exists() {
        let _ = std::fs::rename(base_path, rotated(base_path, 1));
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write, so
/// entries are on disk even when the browser kills the host.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(std::sync::Mutex::new(file)),
        }
    }

    fn with_file<R>(
        &self,
        f: impl FnOnce(&mut std::fs::File) -> std::io::Result<R>,
    ) -> std::io::Result<R> {
        let mut file = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("log file lock poisoned: {e}")))?;
        f(&mut file)
    }
}

impl Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.with_file(|file| {
            let n = file.write(buf)?;
            file.flush()?;
            Ok(n)
        })
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.with_file(|file| file.flush())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Resolve the overlay database path, creating its parent directory.
fn resolve_db_path(config: &OverlayConfig, data_dir: &std::path::Path) -> String {
    let path = config.resolve_db_path(data_dir);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    path.to_string_lossy().into_owned()
}

/// Run the native-messaging host on this process's stdin/stdout until the
/// extension disconnects.
pub async fn run() -> anyhow::Result<()> {
    let dir = data_dir();
    init_tracing(&dir);

    let config = config::load_config(&config::config_path(&dir))?;
    let db_path = resolve_db_path(&config, &dir);
    let scope = config.resolve_scope();

    let store = LedgerStore::open(&db_path)
        .with_context(|| format!("failed to open overlay database at {db_path}"))?;
    let ledger = SessionLedger::open(store, &scope, config.ledger_capacity)?;
    let auth = StoredAuthProvider::open(&db_path)?;
    tracing::info!(
        db_path = %db_path,
        scope = %scope,
        undo_available = ledger.len(),
        "undo ledger ready"
    );

    let transport = Arc::new(HttpAgentTransport::from_config(&config)?);
    tracing::info!(
        agent_endpoint = %config.agent_endpoint,
        confirm_endpoint = %config.confirm_endpoint(),
        keepalive_secs = config.keepalive_interval_secs,
        "agent transport configured"
    );

    let handle = spawn_controller(
        transport,
        Box::new(auth),
        ledger,
        Broadcaster::new(),
        config.keepalive_period(),
    );

    host::run_native_host(handle, tokio::io::stdin(), tokio::io::stdout()).await?;
    tracing::info!("=== overlay host exiting ===");
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
