//! Scanner configuration.
//!
//! [`ScannerConfig`] is assembled by [figment] from, in increasing order of
//! precedence:
//!
//! 1. built-in defaults (Hive-style delimited text: `\x01` between fields,
//!    `\n` between rows, `\N` for null),
//! 2. an optional configuration file (TOML, YAML or JSON, chosen by
//!    extension), by default `scanner.toml` in the platform configuration
//!    directory,
//! 3. `TUPLESCAN_`-prefixed environment variables (`TUPLESCAN_BATCH_SIZE=512`).
//!
//! # Example
//!
//! ```
//! use tuplescan_config::ScannerConfig;
//!
//! let config = ScannerConfig { field_delimiter: ',', ..ScannerConfig::default() };
//! config.validate().unwrap();
//! assert_eq!(config.delimiters().field, b',');
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Assumed size of an OS file block. Reads from a byte source happen in
/// multiples of this.
pub const FILE_BLOCK_SIZE: usize = 4096;
/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TUPLESCAN_";
const DEFAULT_FILE_NAME: &str = "scanner.toml";

/// Settings shared by every scanner a scan node creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerConfig {
    /// Separates fields within a row.
    pub field_delimiter: char,
    /// Separates rows.
    pub tuple_delimiter: char,
    /// Makes the following byte literal, including delimiters.
    pub escape_char: Option<char>,
    /// Field content that stands for SQL `NULL`.
    pub null_string: String,
    /// Bytes requested from the byte source per read.
    pub read_block_size: usize,
    /// Rows per output batch when a driver allocates batches.
    pub batch_size: usize,
    /// String data is compacted downstream, so scanners may reference the
    /// read buffers it was parsed from. When off, scanners copy every string
    /// into pool-owned memory as they parse it.
    pub compact_strings: bool,
    /// Fail the current `get_next` call on the first field parse error
    /// instead of nulling the slot and continuing.
    pub abort_on_error: bool,
    /// Parse errors kept verbatim in the runtime error log. Errors past this
    /// are still counted.
    pub max_error_log: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            field_delimiter: '\x01',
            tuple_delimiter: '\n',
            escape_char: None,
            null_string: "\\N".to_string(),
            read_block_size: FILE_BLOCK_SIZE,
            batch_size: 1024,
            compact_strings: true,
            abort_on_error: false,
            max_error_log: 100,
        }
    }
}

/// Single-byte delimiters, as the text scanner consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub field: u8,
    pub tuple: u8,
    pub escape: Option<u8>,
}

impl ScannerConfig {
    /// Location of the default configuration file, if the platform has a
    /// configuration directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tuplescan").map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
    }

    /// The layered figment, exposed so callers can merge their own providers
    /// on top before extracting.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(ScannerConfig::default()));
        if let Some(path) = path {
            figment = match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Load and validate the configuration.
    ///
    /// With no explicit `path`, the default file is used when it exists.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default = Self::default_path().filter(|p| p.is_file());
        let path = path.or(default.as_deref());
        let config: ScannerConfig = Self::figment(path)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(?config, "loaded scanner configuration");
        Ok(config)
    }

    /// Reject settings the scanners cannot work with.
    pub fn validate(&self) -> Result<()> {
        let ascii = |field: &'static str, c: char| -> Result<()> {
            if !c.is_ascii() {
                exn::bail!(ErrorKind::Invalid { field, reason: format!("{c:?} is not a single-byte character") });
            }
            Ok(())
        };
        ascii("field_delimiter", self.field_delimiter)?;
        ascii("tuple_delimiter", self.tuple_delimiter)?;
        if self.field_delimiter == self.tuple_delimiter {
            exn::bail!(ErrorKind::Invalid {
                field: "field_delimiter",
                reason: "must differ from tuple_delimiter".to_string(),
            });
        }
        if let Some(escape) = self.escape_char {
            ascii("escape_char", escape)?;
            if escape == self.field_delimiter || escape == self.tuple_delimiter {
                exn::bail!(ErrorKind::Invalid { field: "escape_char", reason: "must differ from the delimiters".to_string() });
            }
        }
        if self.read_block_size == 0 {
            exn::bail!(ErrorKind::Invalid { field: "read_block_size", reason: "must be positive".to_string() });
        }
        if self.batch_size == 0 {
            exn::bail!(ErrorKind::Invalid { field: "batch_size", reason: "must be positive".to_string() });
        }
        Ok(())
    }

    /// Delimiters as bytes. Only meaningful after [`validate`](Self::validate)
    /// has accepted the configuration; non-ASCII characters are truncated.
    pub fn delimiters(&self) -> Delimiters {
        Delimiters {
            field: self.field_delimiter as u8,
            tuple: self.tuple_delimiter as u8,
            escape: self.escape_char.map(|c| c as u8),
        }
    }
}
