use eyre::{Error, WrapErr};
use std::path::Path;
use toml::{Table, Value};
use tracing::debug;

#[derive(Debug, Default)]
pub struct Config {
    conf: Table,
}

impl Config {
    /// Load the configuration file. A missing file yields an empty
    /// configuration, so that every key falls back to its default.
    pub fn load(file_name: &Path) -> Result<Config, Error> {
        if !file_name.exists() {
            debug!(file = %file_name.display(), "no configuration file, using defaults");
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(file_name)
            .wrap_err_with(|| format!("cannot read configuration file {}", file_name.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Config, Error> {
        Ok(Config {
            conf: toml::from_str(content).wrap_err("cannot parse configuration file")?,
        })
    }
}

pub fn get_config(config: &Config, section: &str, key: &str) -> Option<String> {
    config
        .conf
        .get(section)
        .and_then(Value::as_table)
        .and_then(|s| s.get(key))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

/// Read and parse a configuration value, or return `default` when absent.
pub fn parse_config<T>(config: &Config, section: &str, key: &str, default: T) -> Result<T, Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get_config(config, section, key) {
        Some(value) => value
            .parse()
            .wrap_err_with(|| format!("cannot parse {section}.{key} configuration parameter")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_read_by_section_and_key() {
        let config = Config::parse(
            r#"
            [database]
            url = "sqlite::memory:"

            [analysis]
            timeout_ms = 1500
            failure_rate = 0.25
            "#,
        )
        .unwrap();
        assert_eq!(
            get_config(&config, "database", "url").as_deref(),
            Some("sqlite::memory:")
        );
        assert_eq!(parse_config(&config, "analysis", "timeout_ms", 0u64).unwrap(), 1500);
        assert_eq!(
            parse_config(&config, "analysis", "failure_rate", 0.0f64).unwrap(),
            0.25
        );
        assert_eq!(get_config(&config, "analysis", "missing"), None);
        assert_eq!(get_config(&config, "nosection", "url"), None);
    }

    #[test]
    fn defaults_apply_when_absent() {
        let config = Config::default();
        assert_eq!(parse_config(&config, "analysis", "delay_ms", 2000u64).unwrap(), 2000);
    }

    #[test]
    fn bad_values_are_reported() {
        let config = Config::parse("[analysis]\ntimeout_ms = \"soon\"\n").unwrap();
        assert!(parse_config(&config, "analysis", "timeout_ms", 0u64).is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(get_config(&config, "database", "url"), None);
    }
}
