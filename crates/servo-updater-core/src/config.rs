//! Board configuration files and firmware image discovery
//!
//! Board configs are JSON documents installed next to the firmware images:
//!
//! ```json
//! {
//!   "board": "servo_v4",
//!   "vid": "0x18d1",
//!   "pid": "0x501b",
//!   "console": "0",
//!   "regions": { "RO": ["0x0", "0x10000"], "RW": ["0x10000", "0x10000"] }
//! }
//! ```
//!
//! The default layout is `<base>/share/servo_updater/{configs,firmware}/`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::identity::DeviceIdentity;
use crate::partition::PartitionRegion;

/// Default board when none is given
pub const DEFAULT_BOARD: &str = "servo_v4";

/// Install prefixes searched for the data directory, in order
pub const DEFAULT_BASE_PATHS: &[&str] = &["/usr/", "/usr/local/"];

/// Data directory below an install prefix
pub const COMMON_PATH: &str = "share/servo_updater";

const FIRMWARE_DIR: &str = "firmware";
const CONFIGS_DIR: &str = "configs";

/// Offset and size of one firmware bank within the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankRange {
    pub offset: u32,
    pub size: u32,
}

/// Parsed board configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    /// Canonical board name, also the image base name
    pub board: String,
    /// USB vendor ID
    pub vid: u16,
    /// USB product ID
    pub pid: u16,
    /// Console interface number
    pub console: u8,
    /// RO bank location, if the config describes it
    pub ro: Option<BankRange>,
    /// RW bank location, if the config describes it
    pub rw: Option<BankRange>,
}

/// On-disk representation
#[derive(Debug, Deserialize)]
struct RawBoardConfig {
    board: String,
    vid: HexOrInt,
    pid: HexOrInt,
    console: HexOrInt,
    #[serde(default)]
    regions: Option<RawRegions>,
}

#[derive(Debug, Deserialize)]
struct RawRegions {
    #[serde(rename = "RO")]
    ro: Option<(HexOrInt, HexOrInt)>,
    #[serde(rename = "RW")]
    rw: Option<(HexOrInt, HexOrInt)>,
}

/// A number written either as a JSON number or a hex/decimal string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HexOrInt {
    Int(u64),
    Str(String),
}

impl HexOrInt {
    fn value(&self, field: &'static str) -> Result<u64, ConfigError> {
        match self {
            HexOrInt::Int(n) => Ok(*n),
            HexOrInt::Str(s) => parse_number(s).ok_or_else(|| ConfigError::InvalidNumber {
                field,
                value: s.clone(),
            }),
        }
    }

    fn narrow<T: TryFrom<u64>>(&self, field: &'static str) -> Result<T, ConfigError> {
        let n = self.value(field)?;
        T::try_from(n).map_err(|_| ConfigError::InvalidNumber {
            field,
            value: n.to_string(),
        })
    }
}

/// Parse a number that can be hex (0x...) or decimal
pub fn parse_number(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn bank(raw: &Option<(HexOrInt, HexOrInt)>) -> Result<Option<BankRange>, ConfigError> {
    raw.as_ref()
        .map(|(offset, size)| {
            Ok(BankRange {
                offset: offset.narrow("regions.offset")?,
                size: size.narrow("regions.size")?,
            })
        })
        .transpose()
}

impl BoardConfig {
    /// Parse a board config from JSON text
    pub fn from_json_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawBoardConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::InvalidConfig {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let (ro, rw) = match &raw.regions {
            Some(regions) => (bank(&regions.ro)?, bank(&regions.rw)?),
            None => (None, None),
        };

        Ok(Self {
            board: raw.board,
            vid: raw.vid.narrow("vid")?,
            pid: raw.pid.narrow("pid")?,
            console: raw.console.narrow("console")?,
            ro,
            rw,
        })
    }

    /// Load a board config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content, path)
    }

    /// Identity of the device this config describes
    pub fn identity(&self, serial: Option<String>) -> DeviceIdentity {
        DeviceIdentity::new(self.vid, self.pid, self.console, serial)
    }

    /// Configured location of a bank
    pub fn bank(&self, region: PartitionRegion) -> Option<BankRange> {
        match region {
            PartitionRegion::ReadOnly => self.ro,
            PartitionRegion::ReadWrite => self.rw,
        }
    }

    /// Default image file name for this board
    pub fn image_name(&self) -> String {
        format!("{}.bin", self.board)
    }
}

/// Resolved config and image paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFiles {
    pub config: PathBuf,
    pub image: PathBuf,
}

/// Locate the servo_updater data directory
fn find_data_dir(data_dir: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let dir = match data_dir {
        Some(dir) => dir.to_path_buf(),
        None => DEFAULT_BASE_PATHS
            .iter()
            .map(|base| Path::new(base).join(COMMON_PATH))
            .find(|p| p.exists())
            .ok_or(ConfigError::DataDirNotFound)?,
    };

    for sub in [FIRMWARE_DIR, CONFIGS_DIR] {
        let p = dir.join(sub);
        if !p.exists() {
            return Err(ConfigError::MissingPath(p));
        }
    }

    log::debug!("Using data directory {}", dir.display());
    Ok(dir)
}

fn config_in(configs: &Path, board: &str) -> Result<PathBuf, ConfigError> {
    let board_path = Path::new(board);
    if board_path.is_file() {
        return Ok(board_path.to_path_buf());
    }
    let named = configs.join(board);
    if named.is_file() {
        return Ok(named);
    }
    let with_ext = configs.join(format!("{}.json", board));
    if !with_ext.is_file() {
        return Err(ConfigError::ConfigNotFound(with_ext.display().to_string()));
    }
    Ok(with_ext)
}

/// Select only the board config
///
/// Used by operations that never touch an image.
pub fn find_config(board: &str, data_dir: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if Path::new(board).is_file() {
        return Ok(PathBuf::from(board));
    }
    let dir = find_data_dir(data_dir)?;
    config_in(&dir.join(CONFIGS_DIR), board)
}

/// Select the board config and firmware image
///
/// `board` is a board name (`servo_v4`), a config name (`servo_v4.json`) or
/// a path. `image` may be omitted to use `<board>.bin` from the firmware
/// directory, where `<board>` comes from the config. The data directory is
/// only consulted when an argument does not name an existing file.
pub fn find_files(
    board: &str,
    image: Option<&Path>,
    data_dir: Option<&Path>,
) -> Result<ResolvedFiles, ConfigError> {
    let board_path = Path::new(board);
    if let Some(image) = image.filter(|p| p.is_file()) {
        if board_path.is_file() {
            return Ok(ResolvedFiles {
                config: board_path.to_path_buf(),
                image: image.to_path_buf(),
            });
        }
    }

    let dir = find_data_dir(data_dir)?;
    let configs = dir.join(CONFIGS_DIR);
    let firmware = dir.join(FIRMWARE_DIR);

    let config = config_in(&configs, board)?;

    let image = match image {
        None => {
            let name = BoardConfig::from_file(&config)?.image_name();
            let candidate = firmware.join(&name);
            if !candidate.is_file() {
                return Err(ConfigError::ImageNotFound(name));
            }
            candidate
        }
        Some(path) if path.is_file() => path.to_path_buf(),
        Some(path) => {
            let candidate = firmware.join(path);
            if !candidate.is_file() {
                return Err(ConfigError::ImageNotFound(path.display().to_string()));
            }
            candidate
        }
    };

    log::debug!("Config: {}, image: {}", config.display(), image.display());
    Ok(ResolvedFiles { config, image })
}
