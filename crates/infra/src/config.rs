//! Procurement configuration.
//!
//! Layers, lowest precedence first:
//! 1. built-in defaults
//! 2. an optional config file (any format the `config` crate understands)
//! 3. `MEDPROCURE__*` environment variables (`__` separates sections, e.g.
//!    `MEDPROCURE__PO_NUMBER__PREFIX=PUR`)

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use medprocure_observability::LogConfig;
use medprocure_purchasing::PoNumberFormat;

const ENV_PREFIX: &str = "MEDPROCURE";
const DEFAULT_PREFIX: &str = "PO";
const DEFAULT_SEQUENCE_WIDTH: i64 = 4;
const DEFAULT_FROM: &str = "procurement@localhost";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// What to do when a receiving would push a PO line past its ordered quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverReceiptPolicy {
    /// Commit and report the over-received lines as warnings.
    #[default]
    Warn,
    /// Refuse the receiving.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoNumberConfig {
    pub prefix: String,
    pub sequence_width: usize,
}

impl Default for PoNumberConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            sequence_width: DEFAULT_SEQUENCE_WIDTH as usize,
        }
    }
}

impl PoNumberConfig {
    pub fn format(&self) -> PoNumberFormat {
        PoNumberFormat {
            prefix: self.prefix.clone(),
            sequence_width: self.sequence_width,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingConfig {
    pub over_receipt_policy: OverReceiptPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Sender address on outgoing purchase-order emails.
    pub from: String,
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            from: DEFAULT_FROM.to_string(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcurementConfig {
    pub po_number: PoNumberConfig,
    pub receiving: ReceivingConfig,
    pub notifications: NotificationConfig,
    pub log: LogConfig,
}

impl ProcurementConfig {
    /// Load defaults + optional file + environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let mut builder = Config::builder()
            .set_default("po_number.prefix", DEFAULT_PREFIX)?
            .set_default("po_number.sequence_width", DEFAULT_SEQUENCE_WIDTH)?
            .set_default("receiving.over_receipt_policy", "warn")?
            .set_default("notifications.from", DEFAULT_FROM)?
            .set_default("notifications.enabled", true)?
            .set_default("log.filter", "info")?
            .set_default("log.json", false)?;

        if let Some(path) = file {
            info!(path = %path.display(), "loading procurement config file");
            builder = builder.add_source(File::from(path).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: ProcurementConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.po_number.prefix.trim().is_empty() {
            return Err(ConfigLoadError::Invalid("po_number.prefix must not be empty".to_string()));
        }
        if !(1..=9).contains(&self.po_number.sequence_width) {
            return Err(ConfigLoadError::Invalid(format!(
                "po_number.sequence_width must be between 1 and 9 (got {})",
                self.po_number.sequence_width
            )));
        }
        if self.notifications.enabled && self.notifications.from.trim().is_empty() {
            return Err(ConfigLoadError::Invalid(
                "notifications.from is required when notifications are enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ProcurementConfig::load(None).unwrap();
        assert_eq!(cfg.po_number.prefix, "PO");
        assert_eq!(cfg.po_number.sequence_width, 4);
        assert_eq!(cfg.receiving.over_receipt_policy, OverReceiptPolicy::Warn);
        assert_eq!(cfg.notifications.from, "procurement@localhost");
        assert!(cfg.notifications.enabled);
        assert_eq!(cfg.log, LogConfig::default());
        assert_eq!(cfg, ProcurementConfig::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let path = std::env::temp_dir().join(format!("medprocure-{}.toml", uuid::Uuid::now_v7()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[po_number]\nprefix = \"PUR\"\nsequence_width = 6\n\n[receiving]\nover_receipt_policy = \"reject\"\n"
        )
        .unwrap();

        let cfg = ProcurementConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(cfg.po_number.format().prefix, "PUR");
        assert_eq!(cfg.po_number.sequence_width, 6);
        assert_eq!(cfg.receiving.over_receipt_policy, OverReceiptPolicy::Reject);
        assert_eq!(cfg.notifications.from, "procurement@localhost");
    }

    #[test]
    fn validation_rejects_bad_numbering() {
        let mut cfg = ProcurementConfig::default();
        cfg.po_number.prefix = " ".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigLoadError::Invalid(_))));

        let mut cfg = ProcurementConfig::default();
        cfg.po_number.sequence_width = 10;
        assert!(cfg.validate().is_err());

        cfg.po_number.sequence_width = 0;
        assert!(cfg.validate().is_err());
    }
}
