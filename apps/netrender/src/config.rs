//! # Configuration File
//!
//! Optional TOML settings for the binary. Default location:
//! `/etc/netrender/netrender.toml`. Command-line flags override file values.
//!
//! ```toml
//! root_dir = "/"
//! default_renderer = "networkd"
//! generator_dir = "/run/systemd/generator"
//! output_hint = "90-netrender"
//! ```
//!
//! `default_renderer = "none"` leaves definitions without a renderer
//! unrendered.

use netrender_core::{Backend, NetrenderError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};

/// Where the binary looks when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/netrender/netrender.toml";

/// Binary settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Prefix for every input and output path.
    pub root_dir: PathBuf,

    /// Backend for definitions that name none, when the documents set no
    /// `network.renderer` either. `"none"` clears it.
    #[serde(deserialize_with = "renderer_or_none")]
    pub default_renderer: Option<Backend>,

    /// systemd generator output directory for the networkd enablement links.
    pub generator_dir: Option<PathBuf>,

    /// File name `export` writes the whole state to.
    pub output_hint: String,
}

fn renderer_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Backend>, D::Error> {
    match String::deserialize(deserializer)?.as_str() {
        "none" => Ok(None),
        other => other.parse().map(Some).map_err(D::Error::custom),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/"),
            default_renderer: Some(Backend::Networkd),
            generator_dir: None,
            output_hint: "90-netrender".to_string(),
        }
    }
}

impl Config {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, NetrenderError> {
        toml::from_str(text).map_err(|e| NetrenderError::ParseError(format!("config: {}", e)))
    }

    /// Load `path`, or the default location when `path` is `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self, NetrenderError> {
        let (path, explicit) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        match fs::read_to_string(path) {
            Ok(text) => {
                tracing::debug!("Loaded configuration from {}", path.display());
                Self::from_toml(&text).map_err(|e| match e {
                    NetrenderError::ParseError(msg) => {
                        NetrenderError::ParseError(format!("{}: {}", path.display(), msg))
                    }
                    other => other,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                tracing::debug!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(NetrenderError::IoError(format!("{}: {}", path.display(), e))),
        }
    }
}
