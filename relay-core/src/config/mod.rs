//! Process-wide configuration store (§6): a TOML document keyed by entity
//! class name, with CLI-selected profile overrides (`conf.toml` vs.
//! `conf_<env>.toml`) and an exclusive writer lock for `save()`.
//!
//! Numeric fields are preserved as `i64`/`f64` via `toml::Value` rather than
//! round-tripped through a lossy intermediate — the number-preserving design
//! called out as authoritative in the framework's design notes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{sentinel, RelayError};

/// Top-level document fields every deployment shares, alongside each
/// entity's own section (keyed by class name).
#[derive(Debug, Clone, Default, Serialize, serde::Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "LogOutputs", default)]
    pub log_outputs: Vec<String>,
    #[serde(rename = "LogFileName", default)]
    pub log_file_name: Option<String>,
    #[serde(rename = "Debug", default)]
    pub debug: bool,
}

/// Resolves the config file path for an environment selector (the CLI's
/// positional argument): `prod`/unset -> `conf.toml`, anything else ->
/// `conf_<env>.toml`.
pub fn resolve_path(base_dir: &Path, env: Option<&str>) -> PathBuf {
    match env {
        None | Some("prod") | Some("production") => base_dir.join("conf.toml"),
        Some(env) => base_dir.join(format!("conf_{env}.toml")),
    }
}

/// The process-wide, TOML-backed config store. `T` is the whole document's
/// shape (usually a struct embedding [`CoreConfig`] plus one field per
/// entity class); `RelayConfig` derefs to it for convenient read access,
/// while `save()` always serializes the entire in-memory document.
pub struct RelayConfig<T> {
    path: PathBuf,
    value: RwLock<T>,
}

impl<T> RelayConfig<T>
where
    T: DeserializeOwned + Serialize,
{
    /// Loads `path`, applying `${VAR}` environment-variable placeholder
    /// substitution to string values before parsing (secrets are supplied
    /// via environment, never committed to the TOML document).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RelayError> {
        let path = path.into();
        let raw = fs::read_to_string(&path)
            .map_err(|e| sentinel::sys_internal(format!("cannot read config {}: {e}", path.display())))?;
        let resolved = resolve_placeholders(&raw);
        let value: T = toml::from_str(&resolved)
            .map_err(|e| sentinel::sys_internal(format!("cannot parse config {}: {e}", path.display())))?;
        Ok(RelayConfig {
            path,
            value: RwLock::new(value),
        })
    }

    pub fn get(&self) -> std::sync::RwLockReadGuard<'_, T> {
        self.value.read().expect("config lock poisoned")
    }

    /// Applies `f` under the writer lock, then serializes the whole document
    /// back to disk.
    pub fn update_and_save(&self, f: impl FnOnce(&mut T)) -> Result<(), RelayError> {
        let mut guard = self.value.write().expect("config lock poisoned");
        f(&mut guard);
        self.save_locked(&guard)
    }

    pub fn save(&self) -> Result<(), RelayError> {
        let guard = self.value.read().expect("config lock poisoned");
        self.save_locked(&guard)
    }

    fn save_locked(&self, value: &T) -> Result<(), RelayError> {
        let text = toml::to_string_pretty(value)
            .map_err(|e| sentinel::sys_internal(format!("cannot serialize config: {e}")))?;
        fs::write(&self.path, text)
            .map_err(|e| sentinel::sys_internal(format!("cannot write config {}: {e}", self.path.display())))?;
        Ok(())
    }
}

/// Replaces `${NAME}` occurrences with the value of the `NAME` environment
/// variable, leaving unresolved placeholders untouched (so a missing secret
/// surfaces as a parse error downstream rather than silently vanishing).
fn resolve_placeholders(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '$' && raw[i..].starts_with("${") {
            if let Some(end) = raw[i..].find('}') {
                let name = &raw[i + 2..i + end];
                if let Ok(val) = std::env::var(name) {
                    out.push_str(&val);
                    for _ in 0..end {
                        chars.next();
                    }
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Doc {
        #[serde(flatten)]
        core: CoreConfig,
        #[serde(rename = "Hello", default)]
        hello: Option<HelloConf>,
    }

    #[derive(Debug, Serialize, Deserialize, Default)]
    struct HelloConf {
        #[serde(rename = "Rate", default)]
        rate: i64,
    }

    #[test]
    fn profile_selects_conf_dev_toml() {
        let dir = Path::new("/tmp");
        assert_eq!(resolve_path(dir, Some("dev")), dir.join("conf_dev.toml"));
        assert_eq!(resolve_path(dir, None), dir.join("conf.toml"));
        assert_eq!(resolve_path(dir, Some("prod")), dir.join("conf.toml"));
    }

    #[test]
    fn load_preserves_integer_fields_and_saves_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.toml");
        fs::write(&path, "Version = \"1\"\nDebug = true\n\n[Hello]\nRate = 42\n").unwrap();

        let cfg: RelayConfig<Doc> = RelayConfig::load(&path).unwrap();
        assert_eq!(cfg.get().hello.as_ref().unwrap().rate, 42);
        assert!(cfg.get().core.debug);

        cfg.update_and_save(|d| d.hello.as_mut().unwrap().rate = 100).unwrap();
        let reloaded: RelayConfig<Doc> = RelayConfig::load(&path).unwrap();
        assert_eq!(reloaded.get().hello.as_ref().unwrap().rate, 100);
    }

    #[test]
    fn env_placeholder_is_substituted_before_parsing() {
        std::env::set_var("RELAY_TEST_SECRET", "shh");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.toml");
        fs::write(&path, "Version = \"${RELAY_TEST_SECRET}\"\nDebug = false\n").unwrap();
        let cfg: RelayConfig<Doc> = RelayConfig::load(&path).unwrap();
        assert_eq!(cfg.get().core.version, "shh");
    }
}
