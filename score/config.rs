use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PLINK_EXECUTABLE: &str = "plink";
const DEFAULT_PLINK_TIMEOUT_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML configuration '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration '{path}': {details}")]
    Invalid { path: PathBuf, details: String },
}

/// The complete run configuration, one TOML file per reference panel release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrsConfig {
    pub input: InputConfig,
    pub scores: ScoresConfig,
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub plink: PlinkSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    /// DQ allele rank table (`DQ`, `RANK`).
    pub dq_rank: PathBuf,
    /// DQ allele to tag variant mapping (`ALLELE`, `SNP`, `A1`).
    pub hla_map: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoresConfig {
    /// DQ allele-pair interaction weights (`ALLELE1`, `ALLELE2`, `BETA`).
    pub interaction: PathBuf,
    /// Linear weights over all variants (`ID`, `ALLELE`, `BETA`).
    pub all_variants: PathBuf,
    /// Linear weights over the DQ variants only; enables `DQSCORE`.
    #[serde(default)]
    pub hla_variants: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Reference ROC curve (`threshold`, `CtrlPCentile`, `CasePCentile`, `PPV`).
    pub centiles_file: PathBuf,
    /// Two-sample fit parameters (`Param`, `Estimate`).
    pub params_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlinkSettings {
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_executable() -> String {
    DEFAULT_PLINK_EXECUTABLE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_PLINK_TIMEOUT_SECS
}

impl Default for PlinkSettings {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl PlinkSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl GrsConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &text)
    }

    pub fn from_toml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let config: GrsConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.plink.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                details: "plink.timeout_secs must be positive".to_string(),
            });
        }
        if config.plink.executable.trim().is_empty() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                details: "plink.executable must not be empty".to_string(),
            });
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[input]
dq_rank = "ref/dq_rank.tsv"
hla_map = "ref/hla_map.tsv"

[scores]
interaction = "ref/interaction.tsv"
all_variants = "ref/all.tsv"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = GrsConfig::from_toml(Path::new("t1dgrs.toml"), MINIMAL).unwrap();
        assert_eq!(config.input.dq_rank, PathBuf::from("ref/dq_rank.tsv"));
        assert!(config.scores.hla_variants.is_none());
        assert!(config.metrics.is_none());
        assert_eq!(config.plink, PlinkSettings::default());
        assert_eq!(config.plink.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn full_config_round_trips_all_sections() {
        let text = format!(
            "{MINIMAL}hla_variants = \"ref/dq.tsv\"\n\n[metrics]\ncentiles_file = \"ref/roc.tsv\"\nparams_file = \"ref/fit.tsv\"\n\n[plink]\nexecutable = \"/opt/plink/plink\"\ntimeout_secs = 30\n"
        );
        let config = GrsConfig::from_toml(Path::new("t1dgrs.toml"), &text).unwrap();
        assert_eq!(config.scores.hla_variants, Some(PathBuf::from("ref/dq.tsv")));
        let metrics = config.metrics.unwrap();
        assert_eq!(metrics.params_file, PathBuf::from("ref/fit.tsv"));
        assert_eq!(config.plink.executable, "/opt/plink/plink");
        assert_eq!(config.plink.timeout_secs, 30);
    }

    #[test]
    fn metrics_section_requires_both_files() {
        let text = format!("{MINIMAL}\n[metrics]\ncentiles_file = \"ref/roc.tsv\"\n");
        assert!(matches!(
            GrsConfig::from_toml(Path::new("t1dgrs.toml"), &text),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let text = format!("{MINIMAL}\n[extras]\nfoo = 1\n");
        assert!(matches!(
            GrsConfig::from_toml(Path::new("t1dgrs.toml"), &text),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let text = format!("{MINIMAL}\n[plink]\ntimeout_secs = 0\n");
        assert!(matches!(
            GrsConfig::from_toml(Path::new("t1dgrs.toml"), &text),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
