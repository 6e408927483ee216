use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use escrow_core::Config;
use escrow_core::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
}

/// `<config_dir>/escrow/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("escrow").join("config.toml"))
}

/// Loads `explicit` or the default location. A missing default file yields
/// defaults; a missing explicit file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigLoadError> {
    match explicit {
        Some(path) => read_config(path),
        None => match default_config_path() {
            Some(path) if path.exists() => read_config(&path),
            _ => Ok(Config::default()),
        },
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigLoadError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&text).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate().map_err(|source| ConfigLoadError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use escrow_core::Address;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn explicit_file_overrides_only_named_fields() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[network]
rpc_url = "http://localhost:8545"

[tracker]
confirmation_timeout_ms = 30000
"#,
        )
        .expect("write");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(config.network.rpc_url, "http://localhost:8545");
        assert_eq!(config.tracker.confirmation_timeout_ms, 30_000);
        assert_eq!(config.tracker.poll_interval_ms, 1_000);
        assert_eq!(config.registries, Config::default().registries);
    }

    #[test]
    fn registry_addresses_parse_from_hex() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[registries]
relationship = "0x0000000000000000000000000000000000000001"
task = "0x0000000000000000000000000000000000000002"
"#,
        )
        .expect("write");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(config.registries.relationship, Address::from_low_u64(1));
        assert_eq!(config.registries.task, Address::from_low_u64(2));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().expect("tmpdir");
        let err = load_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Read { .. }));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[tracker]\npoll_interval_ms = 0\n").expect("write");

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::Invalid {
                source: ConfigError::ZeroDuration {
                    field: "tracker.poll_interval_ms"
                },
                ..
            }
        ));
    }

    #[test]
    fn malformed_toml_reports_path() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[network\n").expect("write");

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse"));
    }
}
