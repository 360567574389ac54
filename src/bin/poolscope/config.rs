use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings read from `config.toml`.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    /// Loads `explicit`, or the per-user default when none is given. A
    /// missing default file yields an empty config; a missing explicit file
    /// is an error.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let data = match explicit.as_ref() {
            Some(path) if !path.exists() => {
                return Err(ConfigError::Missing { path: path.clone() })
            }
            Some(path) => read_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => RawConfig::default(),
            },
        };
        Ok(Self {
            path: explicit.or_else(default_config_path),
            data,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn default_image(&self) -> Option<&PathBuf> {
        self.data.image.default_path.as_ref()
    }

    pub fn host(&self) -> Option<IpAddr> {
        self.data.serve.host
    }

    pub fn port(&self) -> Option<u16> {
        self.data.serve.port
    }

    pub fn allow_origins(&self) -> &[String] {
        &self.data.serve.allow_origins
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(path, &contents)
}

fn parse(path: &Path, contents: &str) -> Result<RawConfig, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    image: ImageSection,
    #[serde(default)]
    serve: ServeSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ImageSection {
    #[serde(rename = "default")]
    default_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ServeSection {
    host: Option<IpAddr>,
    port: Option<u16>,
    #[serde(default)]
    allow_origins: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path} does not exist")]
    Missing { path: PathBuf },
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("poolscope").join("config.toml"))
}
