//! Receive-side configuration
//!
//! Loaded once at startup and never mutated afterwards. Values come from the
//! built-in defaults, an optional TOML file, then environment and CLI flags
//! (see [`crate::cli::DaemonOpts`]).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use crate::protocol::{defaults, MAX_CHUNK_SIZE, MAX_METADATA_WIDTH};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory received files and the receipt log are written to; has no
    /// default and must be set
    pub directory: PathBuf,
    pub host: String,
    pub port: u16,
    /// Width in bytes of the metadata length prefix
    pub metadata_width: usize,
    /// Upper bound for a single body read
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            metadata_width: defaults::METADATA_WIDTH,
            chunk_size: defaults::CHUNK_SIZE,
        }
    }
}

impl Config {
    pub fn new(directory: impl Into<PathBuf>, host: impl Into<String>, port: u16) -> Self {
        Self {
            directory: directory.into(),
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn from_toml_str(data: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(data).context("Failed to parse config")?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.metadata_width == 0 || self.metadata_width > MAX_METADATA_WIDTH {
            bail!(
                "metadata width must be between 1 and {} bytes, got {}",
                MAX_METADATA_WIDTH,
                self.metadata_width
            );
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            bail!(
                "chunk size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE,
                self.chunk_size
            );
        }
        if self.directory.as_os_str().is_empty() {
            bail!("no target directory given");
        }
        if self.directory.exists() && !self.directory.is_dir() {
            bail!("Target path is not a directory: {}", self.directory.display());
        }
        Ok(())
    }

    /// Resolve `host:port` to the address the listener binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("resolve {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("no address for {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_need_a_directory() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 12345);
        assert_eq!(cfg.host, "0.0.0.0");
        assert!(cfg.validate().is_err());
        Config::new("inbox", defaults::HOST, defaults::PORT).validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = Config::from_toml_str("directory = \"/srv/inbox\"\nchunk_size = 65536\n").unwrap();
        assert_eq!(cfg.directory, PathBuf::from("/srv/inbox"));
        assert_eq!(cfg.chunk_size, 65536);
        assert_eq!(cfg.metadata_width, defaults::METADATA_WIDTH);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(Config::from_toml_str("colour = \"blue\"\n").is_err());
    }

    #[test]
    fn test_validate_bounds() {
        let mut cfg = Config::new("inbox", "127.0.0.1", 0);
        cfg.metadata_width = 0;
        assert!(cfg.validate().is_err());
        cfg.metadata_width = MAX_METADATA_WIDTH + 1;
        assert!(cfg.validate().is_err());
        cfg.metadata_width = 8;
        cfg.chunk_size = 0;
        assert!(cfg.validate().is_err());
        cfg.chunk_size = MAX_CHUNK_SIZE + 1;
        assert!(cfg.validate().is_err());
        cfg.chunk_size = MAX_CHUNK_SIZE;
        cfg.validate().unwrap();
    }

    #[test]
    fn test_huge_chunk_size_in_file_rejected() {
        let cfg = Config::from_toml_str("directory = \"inbox\"\nchunk_size = 4294967296\n").unwrap();
        assert_eq!(cfg.chunk_size, 4 * 1024 * 1024 * 1024);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_directory_must_not_be_a_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        let cfg = Config::new(&file, "127.0.0.1", 0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file_and_bind_addr() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ferryd.toml");
        std::fs::write(&path, "host = \"127.0.0.1\"\nport = 4040\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.bind_addr().unwrap(), "127.0.0.1:4040".parse::<SocketAddr>().unwrap());
    }
}
