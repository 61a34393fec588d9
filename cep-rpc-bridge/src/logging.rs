//! Log setup for the bridge process.
//!
//! Everything the filter admits goes to stderr and to a daily rolling file.
//! Messages the panel forwards on its logging channel are additionally
//! written to a `<prefix>-panel` file of their own.

use crate::bridge::PANEL_LOG_TARGET;
use crate::config::BridgeConfig;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::Targets,
    fmt::{self, time::ChronoUtc},
    prelude::*,
    EnvFilter,
};

const DEFAULT_FILTER: &str = "cep_rpc=debug,cep_bridge=debug,adobe=debug,warn";

/// Extra directives for `SHOTGUN_ADOBE_NETWORK_DEBUG`.
const NETWORK_DEBUG_DIRECTIVES: &str = "cep_rpc_client=trace,cep_rpc_transport=trace";

#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub dir: PathBuf,
    /// File name prefix; the panel file appends `-panel`.
    pub prefix: String,
    pub filter: String,
}

impl LogSettings {
    /// Log files are named after the bridge identifier.
    pub fn for_bridge(config: &BridgeConfig, identifier: &str) -> Self {
        let dir = config
            .log_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("cep-bridge"));
        let mut filter = config
            .log_filter
            .clone()
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        if config.network_debug {
            filter.push(',');
            filter.push_str(NETWORK_DEBUG_DIRECTIVES);
        }
        Self {
            dir,
            prefix: identifier.to_string(),
            filter,
        }
    }

    pub fn panel_prefix(&self) -> String {
        format!("{}-panel", self.prefix)
    }
}

fn rolling_writer(dir: &Path, prefix: &str) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Installs the global subscriber. Fails if one is already installed or the
/// filter does not parse.
pub fn init_logging(settings: &LogSettings) -> anyhow::Result<()> {
    std::fs::create_dir_all(&settings.dir)?;
    let env_filter = EnvFilter::try_new(&settings.filter)?;

    let (file_writer, file_guard) = rolling_writer(&settings.dir, &settings.prefix)?;
    let (panel_writer, panel_guard) = rolling_writer(&settings.dir, &settings.panel_prefix())?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false)
        .with_writer(file_writer);

    let panel_layer = fmt::layer()
        .with_target(false)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false)
        .with_writer(panel_writer)
        .with_filter(Targets::new().with_target(PANEL_LOG_TARGET, Level::TRACE));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .with(panel_layer)
        .try_init()?;

    // Writers flush on drop; they have to live as long as the process.
    std::mem::forget(file_guard);
    std::mem::forget(panel_guard);

    tracing::info!(
        dir = %settings.dir.display(),
        prefix = %settings.prefix,
        filter = %settings.filter,
        "Logging initialized"
    );
    Ok(())
}

/// Console-only logging for tests. Safe to call more than once.
pub fn init_test_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cep_rpc=trace,debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_follow_config() {
        let config = BridgeConfig {
            log_dir: Some(PathBuf::from("/var/log/shotgun")),
            ..BridgeConfig::default()
        };
        let settings = LogSettings::for_bridge(&config, "tk-photoshopcc");
        assert_eq!(settings.dir, PathBuf::from("/var/log/shotgun"));
        assert_eq!(settings.prefix, "tk-photoshopcc");
        assert_eq!(settings.panel_prefix(), "tk-photoshopcc-panel");
        assert_eq!(settings.filter, DEFAULT_FILTER);
    }

    #[test]
    fn test_network_debug_widens_filter() {
        let config = BridgeConfig {
            log_filter: Some("adobe=info".into()),
            network_debug: true,
            ..BridgeConfig::default()
        };
        let settings = LogSettings::for_bridge(&config, "tk-aftereffectscc");
        assert_eq!(
            settings.filter,
            "adobe=info,cep_rpc_client=trace,cep_rpc_transport=trace"
        );
        assert!(EnvFilter::try_new(&settings.filter).is_ok());
    }
}
