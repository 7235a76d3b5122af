//! services/api/src/localization.rs
//!
//! Multi-language prompt catalogue.
//!
//! Translations are JSON files, one per supported language, loaded once at
//! startup. The service instance is injected through `AppState` wherever
//! prompts are composed; there is no global registry.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use sleep_assistant_core::domain::Language;
use tracing::{error, info, warn};

pub struct LocalizationService {
    translations: HashMap<Language, Value>,
}

impl LocalizationService {
    /// Load every supported language from `dir`. A missing or malformed
    /// file degrades that language to an empty catalogue rather than
    /// failing startup; lookups then fall back to the default language.
    pub fn load(dir: &Path) -> Self {
        let mut translations = HashMap::new();
        for language in Language::ALL {
            let path = dir.join(format!("{}.json", language.as_str()));
            let value = match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str(&raw) {
                    Ok(value) => {
                        info!(
                            language = language.as_str(),
                            file = %path.display(),
                            "translation_loaded"
                        );
                        value
                    }
                    Err(e) => {
                        error!(
                            language = language.as_str(),
                            file = %path.display(),
                            error = %e,
                            "translation_json_error"
                        );
                        Value::Object(Default::default())
                    }
                },
                Err(_) => {
                    error!(
                        language = language.as_str(),
                        file = %path.display(),
                        "translation_file_not_found"
                    );
                    Value::Object(Default::default())
                }
            };
            translations.insert(language, value);
        }
        Self { translations }
    }

    /// Get a localized string by dot-notation key.
    ///
    /// Falls back to the default language when the key is missing, and to
    /// the key itself as a last resort. `{placeholder}` markers are
    /// substituted from `args`.
    pub fn get(&self, key: &str, language: Language, args: &[(&str, String)]) -> String {
        let template = self
            .lookup(key, language)
            .or_else(|| {
                warn!(
                    key,
                    language = language.as_str(),
                    "translation_key_not_found"
                );
                self.lookup(key, Language::default())
            })
            .unwrap_or_else(|| {
                error!(key, language = language.as_str(), "translation_missing");
                key.to_string()
            });

        let mut text = template;
        for (name, value) in args {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }

    fn lookup(&self, key: &str, language: Language) -> Option<String> {
        let mut value = self.translations.get(&language)?;
        for part in key.split('.') {
            value = value.get(part)?;
        }
        value.as_str().map(str::to_string)
    }
}
