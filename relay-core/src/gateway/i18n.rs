//! Connector-language `Desc` translation (§4.4 step 5, §7): a per-language
//! dictionary loaded from `./lang/<lang>.json` (§6 asset layout). Only
//! `Desc` is ever translated — `Code` and `Cause` pass through untouched.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{sentinel, RelayError};

#[derive(Debug, Clone, Default)]
pub struct Translator {
    dicts: HashMap<String, HashMap<String, String>>,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dict(mut self, lang: impl Into<String>, dict: HashMap<String, String>) -> Self {
        self.dicts.insert(lang.into(), dict);
        self
    }

    /// Loads every `<lang>.json` file directly under `dir`, keyed by file
    /// stem (`fr.json` -> `"fr"`).
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, RelayError> {
        let dir = dir.as_ref();
        let mut translator = Translator::new();

        let entries = fs::read_dir(dir)
            .map_err(|e| sentinel::sys_internal(format!("cannot read lang dir {}: {e}", dir.display())))?;
        for entry in entries {
            let entry = entry.map_err(|e| sentinel::sys_internal(format!("cannot read lang dir entry: {e}")))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(lang) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = fs::read_to_string(&path)
                .map_err(|e| sentinel::sys_internal(format!("cannot read {}: {e}", path.display())))?;
            let dict: HashMap<String, String> = serde_json::from_str(&raw)
                .map_err(|e| sentinel::sys_internal(format!("cannot parse {}: {e}", path.display())))?;
            translator.dicts.insert(lang.to_string(), dict);
        }

        Ok(translator)
    }

    /// Looks up `text` in `lang`'s dictionary; an unknown language or an
    /// untranslated entry passes `text` through unchanged.
    pub fn translate(&self, lang: &str, text: &str) -> String {
        self.dicts
            .get(lang)
            .and_then(|dict| dict.get(text))
            .cloned()
            .unwrap_or_else(|| text.to_string())
    }
}
