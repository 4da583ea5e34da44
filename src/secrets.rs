//! Secrets lookup for `${secret:NAME}` references.
//!
//! The executor only ever reads secrets. [`FileSecrets`] keeps values in a
//! JSON file under the data directory and falls back to the OS keychain for
//! names that were stored there by older installs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::config::trainsh_data_dir;
use crate::error::AppError;

/// The service name used for keyring entries
const KEYRING_SERVICE: &str = "dev.trainsh.secrets";

pub const REDACTED: &str = "[REDACTED]";

pub trait SecretsManager: Send + Sync {
    /// Value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;
}

fn secret_ref_re() -> Result<&'static Regex, AppError> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{secret:([^}]+)\}").ok())
        .as_ref()
        .ok_or_else(|| AppError::internal("Invalid secret reference regex"))
}

/// Replace every `${secret:NAME}` in `template` with its value.
///
/// Every missing name is reported in one `not_found` error.
pub fn interpolate_secrets(template: &str, secrets: &dyn SecretsManager) -> Result<String, AppError> {
    let mut missing = Vec::new();
    let out = secret_ref_re()?.replace_all(template, |caps: &regex::Captures| {
        let name = caps[1].trim();
        match secrets.get(name) {
            Some(value) => value,
            None => {
                missing.push(name.to_string());
                String::new()
            }
        }
    });
    if !missing.is_empty() {
        return Err(AppError::not_found(format!("Secret(s) not found: {}", missing.join(", "))));
    }
    Ok(out.into_owned())
}

/// Extract secret names referenced in a template
pub fn extract_secret_refs(template: &str) -> Vec<String> {
    match secret_ref_re() {
        Ok(re) => re.captures_iter(template).map(|cap| cap[1].trim().to_string()).collect(),
        Err(_) => vec![],
    }
}

/// `template` with secret references masked, for logs.
pub fn redact_secret_refs(template: &str) -> String {
    match secret_ref_re() {
        Ok(re) => re.replace_all(template, REDACTED).into_owned(),
        Err(_) => template.to_string(),
    }
}

/// In-memory secrets, for embedding callers and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl SecretsManager for StaticSecrets {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// JSON file storage with a keychain fallback.
#[derive(Debug, Clone)]
pub struct FileSecrets {
    path: PathBuf,
    use_keyring: bool,
}

impl Default for FileSecrets {
    fn default() -> Self {
        Self {
            path: trainsh_data_dir().join(".secrets_values.json"),
            use_keyring: true,
        }
    }
}

impl FileSecrets {
    /// File-only store at `path` (no keychain access).
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            use_keyring: false,
        }
    }

    fn load(&self) -> HashMap<String, String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn save(&self, values: &HashMap<String, String>) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(values)
            .map_err(|e| AppError::internal(format!("Failed to serialize secrets: {e}")))?;
        std::fs::write(&self.path, json)
            .map_err(|e| AppError::io(format!("Failed to write secrets file: {e}")))
    }

    pub fn set(&self, name: &str, value: &str) -> Result<(), AppError> {
        let mut values = self.load();
        values.insert(name.to_string(), value.to_string());
        self.save(&values)
    }

    pub fn delete(&self, name: &str) -> Result<(), AppError> {
        if self.use_keyring {
            if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, name) {
                let _ = entry.delete_credential();
            }
        }
        let mut values = self.load();
        values.remove(name);
        self.save(&values)
    }

    fn from_keyring(&self, name: &str) -> Option<String> {
        if !self.use_keyring {
            return None;
        }
        match keyring::Entry::new(KEYRING_SERVICE, name).and_then(|e| e.get_password()) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(secret = name, error = ?e, "keyring lookup failed");
                None
            }
        }
    }
}

impl SecretsManager for FileSecrets {
    fn get(&self, key: &str) -> Option<String> {
        self.load().get(key).cloned().or_else(|| self.from_keyring(key))
    }
}
