//! The relay launcher: a single positional environment argument and nothing
//! else (§6 — "No other flags are consumed by the core"). Resolves the
//! config profile, initializes logging from its `LogOutputs`/`LogFileName`/
//! `Debug` fields, and hands back the resolved path for the embedding
//! application to load its own config document from.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::Parser;
use relay_core::config::{resolve_path, CoreConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Parser, Debug)]
#[command(name = "relay", version, about = "relay — service dispatch kernel launcher")]
pub struct Cli {
    /// Selects `conf.toml` (unset/`prod`) or `conf_<env>.toml`.
    pub env: Option<String>,
}

impl Cli {
    pub fn parse_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Cli::parse_from(args)
    }

    /// The config file path this invocation resolves to, under `base_dir`.
    pub fn config_path(&self, base_dir: &Path) -> PathBuf {
        resolve_path(base_dir, self.env.as_deref())
    }
}

/// Initializes the global `tracing` subscriber from `core`'s log settings.
/// `"stdout"` and `"file"` may both appear in `LogOutputs`; `"file"`
/// requires `LogFileName` to be set.
pub fn init_logging(core: &CoreConfig) {
    let default_level = if core.debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stdout_enabled = core.log_outputs.is_empty() || core.log_outputs.iter().any(|o| o == "stdout");
    let file_writer = if core.log_outputs.iter().any(|o| o == "file") {
        core.log_file_name.as_ref().and_then(|name| open_log_file(name))
    } else {
        None
    };

    let registry = Registry::default().with(env_filter);

    match (stdout_enabled, file_writer) {
        (true, Some(file)) => registry
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false))
            .init(),
        (true, None) => registry.with(tracing_subscriber::fmt::layer()).init(),
        (false, Some(file)) => registry
            .with(tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false))
            .init(),
        (false, None) => registry.init(),
    }
}

fn open_log_file(name: &str) -> Option<Arc<Mutex<File>>> {
    match OpenOptions::new().create(true).append(true).open(name) {
        Ok(file) => Some(Arc::new(Mutex::new(file))),
        Err(e) => {
            eprintln!("relay: failed to open log file '{name}': {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_env_resolves_to_conf_toml() {
        let cli = Cli::parse_args(["relay"]);
        assert_eq!(cli.config_path(Path::new("/base")), PathBuf::from("/base/conf.toml"));
    }

    #[test]
    fn dev_env_resolves_to_conf_dev_toml() {
        let cli = Cli::parse_args(["relay", "dev"]);
        assert_eq!(cli.config_path(Path::new("/base")), PathBuf::from("/base/conf_dev.toml"));
    }
}
