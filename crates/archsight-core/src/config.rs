//! Analysis configuration.
//!
//! Settings resolve from several sources with a fixed precedence (highest
//! first):
//! 1. Explicit overrides from the caller
//! 2. Environment variables (`ARCHSIGHT_*`)
//! 3. A JSON configuration file body
//! 4. Built-in defaults
//!
//! [`ResolvedConfig`] keeps the source of every value so callers can report
//! where a setting came from; [`AnalysisConfig`] is the plain value handed to
//! the execution context.

use serde::{Deserialize, Serialize};

use crate::error::{ArchError, Result};

pub const ENV_DEBUG: &str = "ARCHSIGHT_DEBUG";
pub const ENV_PROFILE: &str = "ARCHSIGHT_PROFILE";
pub const ENV_STRICT: &str = "ARCHSIGHT_STRICT";
pub const ENV_MAX_TRACES: &str = "ARCHSIGHT_MAX_TRACES";

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Enables `Debug` actions (the debug tap).
    pub debug: bool,
    /// Records a measurement tree for every executed action.
    pub profile: bool,
    /// Rejects binding one element to two entity types.
    pub strict_entities: bool,
    /// Upper bound on traces kept per element; `None` is unbounded.
    pub max_traces_per_element: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            debug: false,
            profile: false,
            strict_entities: true,
            max_traces_per_element: None,
        }
    }
}

impl AnalysisConfig {
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_strict_entities(mut self, strict: bool) -> Self {
        self.strict_entities = strict;
        self
    }

    /// Cap on stored traces per element; `0` means no cap.
    pub fn with_max_traces_per_element(mut self, max: Option<usize>) -> Self {
        self.max_traces_per_element = max.filter(|&max| max > 0);
        self
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with variables from `lookup`.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut resolved = ResolvedConfig::new();
        resolved.apply_env(lookup)?;
        Ok(resolved.into_config())
    }

    /// Defaults overlaid with a JSON file body. Missing keys keep defaults.
    pub fn from_json(body: &str) -> Result<Self> {
        let mut resolved = ResolvedConfig::new();
        resolved.apply_file(body)?;
        Ok(resolved.into_config())
    }
}

// ============================================================================
// Configuration Sources
// ============================================================================

/// Where a configuration value came from, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    Default = 0,
    File = 1,
    EnvVar = 2,
    Explicit = 3,
}

/// A configuration value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    /// Merge with another value, preferring higher precedence.
    pub fn merge(self, other: Self) -> Self {
        if other.source >= self.source {
            other
        } else {
            self
        }
    }
}

/// File body shape: every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    debug: Option<bool>,
    profile: Option<bool>,
    strict_entities: Option<bool>,
    max_traces_per_element: Option<usize>,
}

/// Caller overrides (highest precedence).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub debug: Option<bool>,
    pub profile: Option<bool>,
    pub strict_entities: Option<bool>,
    pub max_traces_per_element: Option<usize>,
}

/// Configuration with per-value provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub debug: ConfigValue<bool>,
    pub profile: ConfigValue<bool>,
    pub strict_entities: ConfigValue<bool>,
    pub max_traces_per_element: ConfigValue<Option<usize>>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ResolvedConfig::new()
    }
}

impl ResolvedConfig {
    /// Built-in defaults.
    pub fn new() -> Self {
        let defaults = AnalysisConfig::default();
        ResolvedConfig {
            debug: ConfigValue::new(defaults.debug, ConfigSource::Default),
            profile: ConfigValue::new(defaults.profile, ConfigSource::Default),
            strict_entities: ConfigValue::new(defaults.strict_entities, ConfigSource::Default),
            max_traces_per_element: ConfigValue::new(
                defaults.max_traces_per_element,
                ConfigSource::Default,
            ),
        }
    }

    /// Resolve from every source.
    pub fn resolve(
        file_body: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let mut config = ResolvedConfig::new();
        if let Some(body) = file_body {
            config.apply_file(body)?;
        }
        config.apply_env(lookup)?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    fn apply_file(&mut self, body: &str) -> Result<()> {
        let file: FileConfig = serde_json::from_str(body).map_err(|e| ArchError::InvalidConfig {
            message: e.to_string(),
        })?;
        let source = ConfigSource::File;
        if let Some(debug) = file.debug {
            self.set_debug(debug, source);
        }
        if let Some(profile) = file.profile {
            self.set_profile(profile, source);
        }
        if let Some(strict) = file.strict_entities {
            self.set_strict(strict, source);
        }
        if let Some(max) = file.max_traces_per_element {
            self.set_max_traces(Some(max), source);
        }
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let source = ConfigSource::EnvVar;
        if let Some(raw) = lookup(ENV_DEBUG) {
            self.set_debug(parse_flag(ENV_DEBUG, &raw)?, source);
        }
        if let Some(raw) = lookup(ENV_PROFILE) {
            self.set_profile(parse_flag(ENV_PROFILE, &raw)?, source);
        }
        if let Some(raw) = lookup(ENV_STRICT) {
            self.set_strict(parse_flag(ENV_STRICT, &raw)?, source);
        }
        if let Some(raw) = lookup(ENV_MAX_TRACES) {
            let max = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ArchError::InvalidConfig {
                    message: format!("{} must be a positive integer, got '{}'", ENV_MAX_TRACES, raw),
                })?;
            self.set_max_traces(Some(max), source);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let source = ConfigSource::Explicit;
        if let Some(debug) = overrides.debug {
            self.set_debug(debug, source);
        }
        if let Some(profile) = overrides.profile {
            self.set_profile(profile, source);
        }
        if let Some(strict) = overrides.strict_entities {
            self.set_strict(strict, source);
        }
        if let Some(max) = overrides.max_traces_per_element {
            self.set_max_traces(Some(max), source);
        }
    }

    fn set_debug(&mut self, value: bool, source: ConfigSource) {
        self.debug = self.debug.clone().merge(ConfigValue::new(value, source));
    }

    fn set_profile(&mut self, value: bool, source: ConfigSource) {
        self.profile = self.profile.clone().merge(ConfigValue::new(value, source));
    }

    fn set_strict(&mut self, value: bool, source: ConfigSource) {
        self.strict_entities = self
            .strict_entities
            .clone()
            .merge(ConfigValue::new(value, source));
    }

    /// `0` is stored as no cap, whichever layer it comes from.
    fn set_max_traces(&mut self, value: Option<usize>, source: ConfigSource) {
        let value = value.filter(|&max| max > 0);
        self.max_traces_per_element = self
            .max_traces_per_element
            .clone()
            .merge(ConfigValue::new(value, source));
    }

    pub fn into_config(self) -> AnalysisConfig {
        AnalysisConfig {
            debug: self.debug.value,
            profile: self.profile.value,
            strict_entities: self.strict_entities.value,
            max_traces_per_element: self.max_traces_per_element.value,
        }
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ArchError::InvalidConfig {
            message: format!("{} must be a boolean, got '{}'", key, raw),
        }),
    }
}
