use crate::errors::{DriverError, Result};
use crate::protocol::DEFAULT_MAX_FRAME_BYTES;
use crate::transport::{Rank, TcpTransportConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the optional settings file
pub const CONFIG_ENV: &str = "MULTI_LSTAR_CONFIG";

/// Environment variable naming the coordinator's listen address
pub const COORDINATOR_ENV: &str = "MULTI_LSTAR_COORDINATOR";

/// Listen address used when `MULTI_LSTAR_COORDINATOR` is unset
pub const DEFAULT_COORDINATOR_ADDR: &str = "127.0.0.1:47000";

/// (rank, size) variable pairs checked in order. The first launcher whose
/// rank variable is present wins.
const LAUNCHER_VARS: [(&str, &str); 4] = [
    ("MULTI_LSTAR_RANK", "MULTI_LSTAR_WORLD_SIZE"),
    ("OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    ("PMI_RANK", "PMI_SIZE"),
    ("SLURM_PROCID", "SLURM_NTASKS"),
];

/// Process-group placement handed to us by the launcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub rank: Rank,
    pub world_size: usize,
    pub coordinator_addr: String,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            rank: 0,
            world_size: 1,
            coordinator_addr: DEFAULT_COORDINATOR_ADDR.to_string(),
        }
    }
}

impl GroupConfig {
    /// Read the group placement from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the group placement through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let coordinator_addr =
            lookup(COORDINATOR_ENV).unwrap_or_else(|| DEFAULT_COORDINATOR_ADDR.to_string());

        for (rank_var, size_var) in LAUNCHER_VARS {
            let Some(rank) = lookup(rank_var) else {
                continue;
            };
            let size = lookup(size_var).ok_or_else(|| {
                DriverError::Config(format!("{} is set but {} is not", rank_var, size_var))
            })?;

            let rank = parse_count(rank_var, &rank)?;
            let world_size = parse_count(size_var, &size)?;

            if world_size == 0 {
                return Err(DriverError::Config(format!("{} must be at least 1", size_var)));
            }
            if rank >= world_size {
                return Err(DriverError::Config(format!(
                    "rank {} is outside a group of {}",
                    rank, world_size
                )));
            }

            return Ok(Self {
                rank,
                world_size,
                coordinator_addr,
            });
        }

        Ok(Self {
            coordinator_addr,
            ..Self::default()
        })
    }
}

fn parse_count(var: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        DriverError::Config(format!("{}={:?} is not a non-negative integer", var, value))
    })
}

/// Settings read from the optional TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub logging: LoggingConfig,
    pub transport: TransportConfig,
    pub kernel: KernelConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Write `rank-<n>.log` here in addition to stderr
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Process-group connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_secs: u64,
    pub connect_retry_ms: u64,
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 60,
            connect_retry_ms: 200,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// What the coordinator does when samples fail in the kernel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Persist failed samples as the fill value
    #[default]
    Fill,
    /// Fail the job after gathering, without writing output
    Fail,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub on_failure: FailurePolicy,
}

impl RunConfig {
    /// Load from the file named by `MULTI_LSTAR_CONFIG`, or defaults
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading configuration");

        let content = std::fs::read_to_string(path).map_err(|e| {
            DriverError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        let config: RunConfig = toml::from_str(&content).map_err(|e| {
            DriverError::Config(format!("invalid settings in {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(DriverError::Config(
                    "log level must be one of: trace, debug, info, warn, error".into(),
                ))
            }
        }

        if self.transport.connect_retry_ms == 0 {
            return Err(DriverError::Config(
                "connect_retry_ms must be at least 1".into(),
            ));
        }

        if self.transport.max_frame_bytes < 1024 {
            return Err(DriverError::Config(
                "max_frame_bytes must be at least 1024".into(),
            ));
        }

        Ok(())
    }

    /// TCP settings for joining `group`
    pub fn tcp_transport(&self, group: &GroupConfig) -> TcpTransportConfig {
        TcpTransportConfig {
            coordinator_addr: group.coordinator_addr.clone(),
            connect_timeout: Duration::from_secs(self.transport.connect_timeout_secs),
            connect_retry: Duration::from_millis(self.transport.connect_retry_ms),
            max_frame_bytes: self.transport.max_frame_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_no_launcher_is_single_process() {
        let group = GroupConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(group, GroupConfig::default());
        assert_eq!(group.world_size, 1);
    }

    #[test]
    fn test_own_variables_win() {
        let group = GroupConfig::from_lookup(env(&[
            ("MULTI_LSTAR_RANK", "2"),
            ("MULTI_LSTAR_WORLD_SIZE", "4"),
            ("OMPI_COMM_WORLD_RANK", "0"),
            ("OMPI_COMM_WORLD_SIZE", "8"),
            ("MULTI_LSTAR_COORDINATOR", "10.0.0.5:9000"),
        ]))
        .unwrap();
        assert_eq!(group.rank, 2);
        assert_eq!(group.world_size, 4);
        assert_eq!(group.coordinator_addr, "10.0.0.5:9000");
    }

    #[test]
    fn test_slurm_fallback() {
        let group = GroupConfig::from_lookup(env(&[
            ("SLURM_PROCID", "1"),
            ("SLURM_NTASKS", "3"),
        ]))
        .unwrap();
        assert_eq!((group.rank, group.world_size), (1, 3));
        assert_eq!(group.coordinator_addr, DEFAULT_COORDINATOR_ADDR);
    }

    #[test]
    fn test_invalid_environment() {
        let cases: &[&[(&str, &str)]] = &[
            &[("PMI_RANK", "3"), ("PMI_SIZE", "3")],
            &[("PMI_RANK", "0"), ("PMI_SIZE", "0")],
            &[("PMI_RANK", "one"), ("PMI_SIZE", "2")],
            &[("PMI_RANK", "0")],
        ];
        for case in cases {
            let result = GroupConfig::from_lookup(env(case));
            assert!(
                matches!(result, Err(DriverError::Config(_))),
                "accepted {:?}",
                case
            );
        }
    }

    #[test]
    fn test_run_config_defaults() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.kernel.on_failure, FailurePolicy::Fill);
        assert_eq!(config.transport.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[kernel]\non_failure = \"fail\"\n\n[transport]\nconnect_retry_ms = 50"
        )
        .unwrap();

        let config = RunConfig::load(file.path()).unwrap();
        assert_eq!(config.kernel.on_failure, FailurePolicy::Fail);
        assert_eq!(config.transport.connect_retry_ms, 50);
        assert_eq!(config.transport.connect_timeout_secs, 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation_rejects() {
        let mut config = RunConfig::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.transport.connect_retry_ms = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.transport.max_frame_bytes = 512;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[kernel]\non_failure = \"ignore\"").unwrap();
        assert!(matches!(
            RunConfig::load(file.path()),
            Err(DriverError::Config(_))
        ));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[transport\nmax_frame_bytes = ").unwrap();

        let err = RunConfig::load(file.path()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("invalid settings"));
    }

    #[test]
    fn test_tcp_transport_settings() {
        let mut config = RunConfig::default();
        config.transport.connect_timeout_secs = 5;
        let group = GroupConfig {
            rank: 1,
            world_size: 2,
            coordinator_addr: "node0:47000".into(),
        };
        let tcp = config.tcp_transport(&group);
        assert_eq!(tcp.coordinator_addr, "node0:47000");
        assert_eq!(tcp.connect_timeout, Duration::from_secs(5));
        assert_eq!(tcp.connect_retry, Duration::from_millis(200));
    }
}
