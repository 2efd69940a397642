//! Loading and validating the YAML configuration

use crate::{KgadgetError, Result};
use kgadget_agent::config::AgentConfig;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Load the configuration at `path`, or the defaults when no path is given
pub fn load_config(path: Option<&Path>) -> Result<AgentConfig> {
    let Some(path) = path else {
        debug!("No configuration file given, using defaults");
        return Ok(AgentConfig::default());
    };

    let contents = fs::read_to_string(path).map_err(|e| {
        KgadgetError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let config = parse_config(&contents).map_err(|e| match e {
        KgadgetError::ConfigError(msg) => {
            KgadgetError::ConfigError(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse and validate a YAML document. An empty document yields the defaults.
pub fn parse_config(contents: &str) -> Result<AgentConfig> {
    let config = if contents.trim().is_empty() {
        AgentConfig::default()
    } else {
        serde_yaml::from_str(contents).map_err(|e| KgadgetError::ConfigError(e.to_string()))?
    };

    validate(&config)?;
    Ok(config)
}

fn validate(config: &AgentConfig) -> Result<()> {
    if config.channel_capacity == 0 {
        return Err(KgadgetError::ConfigError(
            "channel_capacity must be greater than 0".to_string(),
        ));
    }

    if let Some(pages) = config.perf_pages {
        if !pages.is_power_of_two() {
            return Err(KgadgetError::ConfigError(format!(
                "perf_pages must be a power of two, got {}",
                pages
            )));
        }
    }

    if !config.pin_path.is_absolute() {
        return Err(KgadgetError::ConfigError(format!(
            "pin_path must be absolute, got {}",
            config.pin_path.display()
        )));
    }

    for entry in &config.containers {
        if entry.id.is_empty() {
            return Err(KgadgetError::ConfigError(
                "every container needs a non-empty id".to_string(),
            ));
        }
    }

    Ok(())
}

/// Render the configuration as YAML
pub fn to_yaml(config: &AgentConfig) -> Result<String> {
    serde_yaml::to_string(config).map_err(|e| KgadgetError::ConfigError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(parse_config("").unwrap(), AgentConfig::default());
        assert_eq!(parse_config("{}").unwrap(), AgentConfig::default());
    }

    #[test]
    fn test_parse_full_document() {
        let config = parse_config(
            r#"
pin_path: /sys/fs/bpf/test
task_offsets:
  task_nsproxy: 2992
channel_capacity: 128
perf_pages: 16
containers:
  - id: c0ffee
    namespace: default
    pod: web-0
    name: nginx
    mntns: 4026532300
  - id: beef
    name: sidecar
    pid: 4242
"#,
        )
        .unwrap();

        assert_eq!(config.pin_path, PathBuf::from("/sys/fs/bpf/test"));
        assert_eq!(config.task_offsets.task_nsproxy, 2992);
        assert_eq!(config.task_offsets.nsproxy_mnt_ns, 24);
        assert_eq!(config.channel_capacity, 128);
        assert_eq!(config.perf_pages, Some(16));
        assert_eq!(config.containers.len(), 2);
        assert_eq!(config.containers[0].mntns, Some(4026532300));
        assert_eq!(config.containers[1].pid, Some(4242));
        assert_eq!(config.containers[1].namespace, "");
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = parse_config("pin_paths: /tmp").unwrap_err();
        assert!(matches!(err, KgadgetError::ConfigError(_)));
    }

    #[test]
    fn test_validation() {
        assert!(parse_config("channel_capacity: 0").is_err());
        assert!(parse_config("perf_pages: 3").is_err());
        assert!(parse_config("pin_path: relative/dir").is_err());
        assert!(parse_config("containers:\n  - id: \"\"\n    mntns: 1\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "channel_capacity: 64").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.channel_capacity, 64);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/kgadget.yaml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/kgadget.yaml"));
    }

    #[test]
    fn test_yaml_round_trip_of_defaults() {
        let yaml = to_yaml(&AgentConfig::default()).unwrap();
        assert_eq!(parse_config(&yaml).unwrap(), AgentConfig::default());
    }
}
