//! Permission matrix configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! training_mode = false
//! strict_mode = true        # omitted: strict unless training_mode is set
//! default_allow = false     # permissive mode only
//! log_all_checks = false
//! log_denials = true
//! training_url = "/admin/permissions/training"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{err, Error, Result};

pub const DEFAULT_TRAINING_URL: &str = "/admin/permissions/training";

/// How undefined permissions are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Undefined → denied
    Strict,
    /// Undefined → pending request for operator approval
    Training,
    /// Undefined → `default_allow`
    Permissive { default_allow: bool },
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    training_mode: bool,
    strict_mode: Option<bool>,
    default_allow: bool,
    log_all_checks: bool,
    log_denials: bool,
    training_url: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        RawConfig {
            training_mode: false,
            strict_mode: None,
            default_allow: false,
            log_all_checks: false,
            log_denials: true,
            training_url: DEFAULT_TRAINING_URL.to_string(),
        }
    }
}

/// Validated engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixConfig {
    pub mode: Mode,
    /// Audit every gated check
    pub log_all_checks: bool,
    /// Audit gated checks that end denied
    pub log_denials: bool,
    /// Base URL operators use to resolve pending requests
    pub training_url: String,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self::strict()
    }
}

impl MatrixConfig {
    pub fn strict() -> Self {
        Self::with_mode(Mode::Strict)
    }

    pub fn training() -> Self {
        Self::with_mode(Mode::Training)
    }

    pub fn permissive(default_allow: bool) -> Self {
        Self::with_mode(Mode::Permissive { default_allow })
    }

    fn with_mode(mode: Mode) -> Self {
        MatrixConfig {
            mode,
            log_all_checks: false,
            log_denials: true,
            training_url: DEFAULT_TRAINING_URL.to_string(),
        }
    }

    pub fn log_all_checks(mut self, on: bool) -> Self {
        self.log_all_checks = on;
        self
    }

    pub fn log_denials(mut self, on: bool) -> Self {
        self.log_denials = on;
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        raw.try_into()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path.as_ref()).map_err(err)?;
        Self::from_toml_str(&s)
    }

    /// URL an operator follows to resolve a pending request
    pub fn training_url_for(&self, request_id: u64) -> String {
        format!("{}/{}", self.training_url.trim_end_matches('/'), request_id)
    }
}

impl TryFrom<RawConfig> for MatrixConfig {
    type Error = Error;

    fn try_from(raw: RawConfig) -> Result<Self> {
        let mode = match (raw.training_mode, raw.strict_mode) {
            (true, Some(true)) => {
                return Err(Error::Config("training_mode and strict_mode are mutually exclusive".into()))
            }
            (true, _) => Mode::Training,
            (false, Some(false)) => Mode::Permissive { default_allow: raw.default_allow },
            (false, _) => Mode::Strict,
        };
        if raw.default_allow && !matches!(mode, Mode::Permissive { .. }) {
            return Err(Error::Config("default_allow only applies in permissive mode".into()));
        }
        if raw.training_url.trim().is_empty() {
            return Err(Error::Config("training_url cannot be empty".into()));
        }
        Ok(MatrixConfig {
            mode,
            log_all_checks: raw.log_all_checks,
            log_denials: raw.log_denials,
            training_url: raw.training_url,
        })
    }
}
