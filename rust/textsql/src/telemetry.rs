use crate::config::AppConfig;
use once_cell::sync::OnceCell;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info,tower_http=debug";

static INIT: OnceCell<()> = OnceCell::new();

pub fn init_tracing() {
    let _ = INIT.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    });
}

/// Logs the effective configuration once at startup. Secrets are reported
/// only as present or missing.
pub fn log_startup(config: &AppConfig) {
    info!(
        listen_addr = %config.listen_addr,
        model = %config.generation.model,
        db_host = %config.database.host,
        db_port = config.database.port,
        db_name = %config.database.name,
        db_sslmode = ?config.database.ssl_mode,
        "textsql configuration loaded"
    );

    let missing = config.missing_secrets();
    if !missing.is_empty() {
        warn!(
            missing = %missing.join(", "),
            "missing environment variables; requests needing them will fail"
        );
    }
}
