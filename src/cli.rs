//! Shared CLI helpers and small reusable Clap fragments

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;
use crate::protocol::{defaults, env};

/// Receive daemon options
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "Ferry receive server - accepts single-file uploads")]
pub struct DaemonOpts {
    /// Directory to save received files (created if missing); may come from --config instead
    #[arg(required_unless_present = "config")]
    pub directory: Option<PathBuf>,

    /// Host to bind the server to [default: 0.0.0.0]
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to bind the server to [default: 12345]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Width in bytes of the metadata length prefix
    #[arg(long, env = env::METADATA_WIDTH)]
    pub metadata_width: Option<usize>,

    /// Maximum bytes read from a socket per call
    #[arg(long, env = env::CHUNK_SIZE)]
    pub chunk_size: Option<usize>,

    /// TOML config file; flags and environment override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl DaemonOpts {
    /// Layer flags and environment over the config file (or defaults).
    pub fn into_config(self) -> Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(directory) = self.directory {
            cfg.directory = directory;
        }
        if let Some(host) = self.host {
            cfg.host = host;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(width) = self.metadata_width {
            cfg.metadata_width = width;
        }
        if let Some(chunk) = self.chunk_size {
            cfg.chunk_size = chunk;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Send client options
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "Ferry send client - uploads one file to a ferry server")]
pub struct SendOpts {
    /// Path to the file to transfer
    pub file_path: PathBuf,

    /// Server IP address or hostname
    pub host: String,

    /// Server port
    #[arg(default_value_t = defaults::PORT)]
    pub port: u16,

    /// Width in bytes of the metadata length prefix (must match the server)
    #[arg(long, env = env::METADATA_WIDTH, default_value_t = defaults::METADATA_WIDTH)]
    pub metadata_width: usize,

    /// Bytes read from the file per socket write
    #[arg(long, env = env::CHUNK_SIZE, default_value_t = defaults::CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Give up if the server has not closed the connection this many seconds
    /// after the body is sent [default: wait indefinitely]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub close_timeout: Option<u64>,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ferryd.toml");
        std::fs::write(&path, "host = \"10.0.0.5\"\nport = 7000\nchunk_size = 1024\n").unwrap();

        let opts = DaemonOpts::try_parse_from([
            "ferryd",
            "inbox",
            "--config",
            path.to_str().unwrap(),
            "-p",
            "7100",
            "--chunk-size",
            "2048",
        ])
        .unwrap();
        let cfg = opts.into_config().unwrap();
        assert_eq!(cfg.directory, PathBuf::from("inbox"));
        assert_eq!(cfg.host, "10.0.0.5");
        assert_eq!(cfg.port, 7100);
        assert_eq!(cfg.chunk_size, 2048);
    }

    #[test]
    fn test_invalid_width_rejected() {
        let opts =
            DaemonOpts::try_parse_from(["ferryd", "inbox", "--metadata-width", "0"]).unwrap();
        assert!(opts.into_config().is_err());
    }

    #[test]
    fn test_directory_required_without_config() {
        assert!(DaemonOpts::try_parse_from(["ferryd", "-p", "9000"]).is_err());
    }

    #[test]
    fn test_directory_from_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ferryd.toml");
        std::fs::write(&path, "directory = \"/srv/inbox\"\n").unwrap();

        let opts = DaemonOpts::try_parse_from(["ferryd", "-c", path.to_str().unwrap()]).unwrap();
        assert!(opts.directory.is_none());
        assert_eq!(opts.into_config().unwrap().directory, PathBuf::from("/srv/inbox"));
    }

    #[test]
    fn test_config_without_directory_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ferryd.toml");
        std::fs::write(&path, "port = 7000\n").unwrap();

        let opts = DaemonOpts::try_parse_from(["ferryd", "-c", path.to_str().unwrap()]).unwrap();
        assert!(opts.into_config().is_err());
    }

    #[test]
    fn test_send_opts_positional() {
        let opts = SendOpts::try_parse_from(["ferry", "notes.txt", "127.0.0.1", "9000", "-q"])
            .unwrap();
        assert_eq!(opts.file_path, PathBuf::from("notes.txt"));
        assert_eq!(opts.host, "127.0.0.1");
        assert_eq!(opts.port, 9000);
        assert!(opts.quiet);
        assert_eq!(opts.close_timeout, None);
        assert!(SendOpts::try_parse_from(["ferry", "a", "h", "--close-timeout", "0"]).is_err());
    }
}
