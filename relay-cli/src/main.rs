use std::path::Path;

use relay_cli::{init_logging, Cli};
use relay_core::config::resolve_path;

fn main() {
    let cli = Cli::parse_args(std::env::args_os());
    let base_dir = Path::new(".");
    let path = resolve_path(base_dir, cli.env.as_deref());

    let core = match std::fs::read_to_string(&path) {
        Ok(raw) => toml::from_str(&raw).unwrap_or_default(),
        Err(_) => Default::default(),
    };
    init_logging(&core);

    tracing::info!(env = cli.env.as_deref().unwrap_or("prod"), config = %path.display(), "relay launcher starting");
}
