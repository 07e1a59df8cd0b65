//! Analysis configuration
//!
//! Column layout, the current-channel schema and the diagnosis thresholds.
//! Every field has a default so a partial TOML file (or none at all) works.
//!
//! ```toml
//! [loader]
//! module_offset = 1
//! module_count = 20
//! delimiter = ","
//!
//! [loader.current]
//! aliases = ["corriente", "current"]
//! match_mode = "substring"
//!
//! [thresholds]
//! critical_delta_v = 0.5
//! alert_delta_v = 0.3
//! ventilation_factor = 1.4
//! current_noise_floor = 0.1
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::DiagnosticError;

/// How a header is compared against a channel alias
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMatch {
    /// Header contains the alias (case-insensitive)
    #[default]
    Substring,
    /// Header equals the alias (case-insensitive)
    Exact,
}

/// Maps a logical channel to the header strings that may carry it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSchema {
    pub aliases: Vec<String>,
    #[serde(default)]
    pub match_mode: HeaderMatch,
}

impl ChannelSchema {
    /// Whether a header names this channel. Both sides are trimmed and lowercased.
    pub fn matches(&self, header: &str) -> bool {
        let header = header.trim().to_lowercase();
        self.aliases.iter().any(|alias| {
            let alias = alias.trim().to_lowercase();
            match self.match_mode {
                HeaderMatch::Substring => header.contains(&alias),
                HeaderMatch::Exact => header == alias,
            }
        })
    }
}

impl Default for ChannelSchema {
    fn default() -> Self {
        Self {
            aliases: vec!["corriente".to_string(), "current".to_string()],
            match_mode: HeaderMatch::Substring,
        }
    }
}

/// Source table layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Column of the first module channel (column 0 is the index/label column)
    #[serde(default = "default_module_offset")]
    pub module_offset: usize,
    /// Number of contiguous module channels
    #[serde(default = "default_module_count")]
    pub module_count: usize,
    /// Field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Schema for the pack current column
    #[serde(default)]
    pub current: ChannelSchema,
}

fn default_module_offset() -> usize {
    1
}
fn default_module_count() -> usize {
    20
}
fn default_delimiter() -> char {
    ','
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            module_offset: default_module_offset(),
            module_count: default_module_count(),
            delimiter: default_delimiter(),
            current: ChannelSchema::default(),
        }
    }
}

/// Diagnosis thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Pack delta V (V) above which the worst module should be replaced
    #[serde(default = "default_critical_delta_v")]
    pub critical_delta_v: f64,
    /// Pack delta V (V) above which balancing/maintenance is advised
    #[serde(default = "default_alert_delta_v")]
    pub alert_delta_v: f64,
    /// Top resistance over mean resistance ratio that flags cooling problems
    #[serde(default = "default_ventilation_factor")]
    pub ventilation_factor: f64,
    /// Minimum |ΔI| (A) for a transition to count in resistance estimation
    #[serde(default = "default_current_noise_floor")]
    pub current_noise_floor: f64,
}

fn default_critical_delta_v() -> f64 {
    0.5
}
fn default_alert_delta_v() -> f64 {
    0.3
}
fn default_ventilation_factor() -> f64 {
    1.4
}
fn default_current_noise_floor() -> f64 {
    0.1
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            critical_delta_v: default_critical_delta_v(),
            alert_delta_v: default_alert_delta_v(),
            ventilation_factor: default_ventilation_factor(),
            current_noise_floor: default_current_noise_floor(),
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), DiagnosticError> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("critical_delta_v", self.critical_delta_v),
            ("alert_delta_v", self.alert_delta_v),
            ("ventilation_factor", self.ventilation_factor),
            ("current_noise_floor", self.current_noise_floor),
        ] {
            if !value.is_finite() {
                errors.push(format!("thresholds.{name} must be finite"));
            }
        }
        if self.alert_delta_v < 0.0 {
            errors.push("thresholds.alert_delta_v must not be negative".to_string());
        }
        if self.alert_delta_v >= self.critical_delta_v {
            errors.push(format!(
                "thresholds.alert_delta_v ({}) must be below critical_delta_v ({})",
                self.alert_delta_v, self.critical_delta_v
            ));
        }
        if self.ventilation_factor <= 0.0 {
            errors.push("thresholds.ventilation_factor must be positive".to_string());
        }
        if self.current_noise_floor < 0.0 {
            errors.push("thresholds.current_noise_floor must not be negative".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DiagnosticError::Config(errors.join("; ")))
        }
    }
}

/// Full configuration for one analysis run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl AnalysisConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, DiagnosticError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| DiagnosticError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, DiagnosticError> {
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents).map_err(|e| match e {
            DiagnosticError::Config(msg) => {
                DiagnosticError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "Loaded analysis config");
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, DiagnosticError> {
        toml::to_string_pretty(self).map_err(|e| DiagnosticError::Config(e.to_string()))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), DiagnosticError> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Check thresholds and the channel schema.
    ///
    /// A zero `module_count` is left to the loader, which reports it as
    /// degenerate input rather than a configuration mistake.
    pub fn validate(&self) -> Result<(), DiagnosticError> {
        self.thresholds.validate()?;

        let loader = &self.loader;
        if loader.current.aliases.is_empty()
            || loader.current.aliases.iter().any(|a| a.trim().is_empty())
        {
            return Err(DiagnosticError::Config(
                "loader.current.aliases must list at least one non-blank header".to_string(),
            ));
        }
        if matches!(loader.delimiter, '"' | '\n' | '\r') {
            return Err(DiagnosticError::Config(format!(
                "loader.delimiter {:?} is not usable as a field separator",
                loader.delimiter
            )));
        }
        if loader.module_offset == 0 {
            return Err(DiagnosticError::Config(
                "loader.module_offset must be at least 1; column 0 is the index column"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
