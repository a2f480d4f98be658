use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Sentinel for "no storage limit configured".
pub const NO_LIMIT: u64 = u64::MAX;

/// Name of the configuration file inside a repository.
pub const CONFIG_FILE: &str = "config.toml";

/// Persistent repository configuration (`config.toml`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Maximum repository size, e.g. `"10GB"`, `"512MiB"` or `"1048576"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_max: Option<String>,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

/// Tuning for maintenance operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Capacity of the bounded event queue between an operation and its consumer.
    pub event_buffer: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { event_buffer: 16 }
    }
}

impl RepoConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse from TOML text.
    pub fn from_toml(text: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML text.
    pub fn to_toml(&self) -> StoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Write to a TOML file.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    fn validate(&self) -> StoreResult<()> {
        self.storage_max_bytes()?;
        if self.maintenance.event_buffer == 0 {
            return Err(StoreError::Config(
                "maintenance.event_buffer must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Configured maximum in bytes, or [`NO_LIMIT`].
    pub fn storage_max_bytes(&self) -> StoreResult<u64> {
        match &self.storage_max {
            None => Ok(NO_LIMIT),
            Some(s) => parse_size(s),
        }
    }
}

/// Parse a human size such as `"10GB"`, `"1.5 GiB"` or `"4096"`.
///
/// Decimal units (`kB`, `MB`, `GB`, `TB`) are powers of 1000; binary units
/// (`KiB`, `MiB`, `GiB`, `TiB`) are powers of 1024. Units are case-insensitive.
pub fn parse_size(input: &str) -> StoreResult<u64> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let invalid = || StoreError::Config(format!("invalid size: {input:?}"));

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" | "k" => 1_000,
        "mb" | "m" => 1_000_000,
        "gb" | "g" => 1_000_000_000,
        "tb" | "t" => 1_000_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        "tib" => 1 << 40,
        _ => return Err(invalid()),
    };
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= NO_LIMIT as f64 {
        return Err(invalid());
    }
    Ok(bytes as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_limit() {
        let config = RepoConfig::default();
        assert_eq!(config.storage_max_bytes().unwrap(), NO_LIMIT);
        assert_eq!(config.maintenance.event_buffer, 16);
    }

    #[test]
    fn parse_sizes() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("10GB").unwrap(), 10_000_000_000);
        assert_eq!(parse_size("512MiB").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_size("1.5 kib").unwrap(), 1536);
        assert!(parse_size("lots").is_err());
        assert!(parse_size("10XB").is_err());
        assert!(parse_size("").is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let config = RepoConfig {
            storage_max: Some("10GB".into()),
            maintenance: MaintenanceConfig { event_buffer: 4 },
        };
        let text = config.to_toml().unwrap();
        assert_eq!(RepoConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = RepoConfig::from_toml("").unwrap();
        assert_eq!(config, RepoConfig::default());
    }

    #[test]
    fn zero_event_buffer_is_rejected() {
        let err = RepoConfig::from_toml("[maintenance]\nevent_buffer = 0\n").unwrap_err();
        assert!(err.to_string().contains("event_buffer"));
    }

    #[test]
    fn bad_storage_max_is_rejected() {
        assert!(RepoConfig::from_toml("storage_max = \"huge\"\n").is_err());
    }
}
