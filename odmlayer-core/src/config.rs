//! Database configuration.
//!
//! [`DatabaseConfig`] deserializes from any serde format with sensible defaults,
//! so it can be embedded in an application's own configuration file:
//!
//! ```ignore
//! let config: DatabaseConfig = serde_json::from_str(r#"{ "name": "chat", "safe": { "enabled": true } }"#)?;
//! assert_eq!(config.port, 27017);
//! ```

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::InitializationError;

/// Connection parameters and write policy of one logical database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database name.
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Generate record identities on the client.
    #[serde(default = "default_gen_ids")]
    pub gen_ids: bool,

    /// Suppress the debug trace of executed store operations.
    #[serde(default)]
    pub quiet: bool,

    /// Default acknowledged-write policy.
    #[serde(default)]
    pub safe: SafeMode,
}

fn default_name() -> String {
    "test".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    27017
}

fn default_gen_ids() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            name: default_name(),
            host: default_host(),
            port: default_port(),
            gen_ids: default_gen_ids(),
            quiet: false,
            safe: SafeMode::default(),
        }
    }
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>) -> Self {
        DatabaseConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn gen_ids(mut self, gen_ids: bool) -> Self {
        self.gen_ids = gen_ids;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn safe(mut self, safe: SafeMode) -> Self {
        self.safe = safe;
        self
    }

    /// Connection string for the MongoDB driver.
    pub fn dsn(&self) -> String {
        format!("mongodb://{}:{}", self.host, self.port)
    }
}

const SAFE_OPTIONS: &[&str] = &["w", "wtimeout", "j", "fsync"];

/// Acknowledged-write policy.
///
/// When enabled, a write returns only after the store confirms it, following the
/// `w`, `wtimeout`, `j` and `fsync` options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafeMode {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub options: Document,
}

impl From<bool> for SafeMode {
    fn from(enabled: bool) -> Self {
        SafeMode {
            enabled,
            options: Document::new(),
        }
    }
}

impl SafeMode {
    /// Enabled policy with the given options.
    ///
    /// # Errors
    ///
    /// [`InitializationError::SafeOptions`] for unknown options or values of the wrong type.
    pub fn with_options(options: Document) -> Result<Self, InitializationError> {
        let safe = SafeMode {
            enabled: true,
            options,
        };
        safe.validate()?;
        Ok(safe)
    }

    /// Checks option names and value types.
    pub fn validate(&self) -> Result<(), InitializationError> {
        for (option, value) in &self.options {
            let valid = match option.as_str() {
                "w" => matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::String(_)),
                "wtimeout" => matches!(value, Bson::Int32(_) | Bson::Int64(_)),
                "j" | "fsync" => matches!(value, Bson::Boolean(_)),
                _ => {
                    return Err(InitializationError::SafeOptions {
                        option: option.clone(),
                        reason: format!("expected one of {}", SAFE_OPTIONS.join(", ")),
                    });
                }
            };
            if !valid {
                return Err(InitializationError::SafeOptions {
                    option: option.clone(),
                    reason: format!("unexpected value {value}"),
                });
            }
        }
        Ok(())
    }

    /// Applies a per-call override on top of this default.
    ///
    /// An override with options enables acknowledgement and merges its options
    /// over the defaults. A bare flag replaces the default entirely.
    pub fn resolve(&self, overriding: Option<&SafeMode>) -> SafeMode {
        match overriding {
            None => self.clone(),
            Some(overriding) if overriding.options.is_empty() => SafeMode::from(overriding.enabled),
            Some(overriding) => {
                let mut options = self.options.clone();
                for (option, value) in &overriding.options {
                    options.insert(option.clone(), value.clone());
                }
                SafeMode {
                    enabled: true,
                    options,
                }
            }
        }
    }

    /// Trace suffix, e.g. `, safe({"w": 2})`. Empty when disabled.
    pub(crate) fn trace(&self) -> String {
        match (self.enabled, self.options.is_empty()) {
            (false, _) => String::new(),
            (true, true) => ", safe()".to_string(),
            (true, false) => format!(", safe({})", self.options),
        }
    }
}
