use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::protocol::UTILS_HPP;
use crate::transport::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unknown kernel: {0}")]
    UnknownKernel(String),
}

/// Library headers the array and table declarations rely on.
pub const CONTAINER_INCLUDES: [&str; 3] = [
    "#include <xtensor/xarray.hpp>",
    "#include <xframe/xaxis.hpp>",
    "#include <xframe/xvariable.hpp>",
];

/// A C++ kernel the bridge can talk to, with its notebook presentation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpec {
    /// Language name as shown to users, e.g. `C++17`.
    pub language: String,
    /// Jupyter kernel name, e.g. `xeus-cling-cpp17`.
    pub kernel: String,
    pub background_color: String,
}

impl KernelSpec {
    fn new(language: &str, kernel: &str, background_color: &str) -> Self {
        Self {
            language: language.to_string(),
            kernel: kernel.to_string(),
            background_color: background_color.to_string(),
        }
    }
}

/// Everything a session needs besides its transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub kernels: Vec<KernelSpec>,
    /// Sent in order by `Session::initialize`, after the helper header.
    pub init_statements: Vec<String>,
    /// Change-directory command; `{dir}` is replaced by the escaped path.
    pub cd_command: String,
    pub retry: RetryPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            kernels: vec![
                KernelSpec::new("C++11", "xeus-cling-cpp11", "#B3BFFF"),
                KernelSpec::new("C++14", "xeus-cling-cpp14", "#D5CCFF"),
                KernelSpec::new("C++17", "xeus-cling-cpp17", "#EAE6FF"),
            ],
            init_statements: CONTAINER_INCLUDES.iter().map(|s| s.to_string()).collect(),
            cd_command: "#include <unistd.h>\nchdir(\"{dir}\");".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl BridgeConfig {
    /// `~/.cling-bridge/config.json`
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cling-bridge")
            .join("config.json")
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, data).map_err(io)
    }

    /// Find a kernel by language (`C++14`) or kernel name (`xeus-cling-cpp14`),
    /// case-insensitively.
    pub fn kernel(&self, name: &str) -> Result<&KernelSpec, ConfigError> {
        self.kernels
            .iter()
            .find(|k| k.language.eq_ignore_ascii_case(name) || k.kernel.eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnknownKernel(name.to_string()))
    }

    /// The statements `Session::initialize` sends: helper header first.
    pub fn startup_statements(&self) -> impl Iterator<Item = &str> {
        std::iter::once(UTILS_HPP).chain(self.init_statements.iter().map(String::as_str))
    }
}
