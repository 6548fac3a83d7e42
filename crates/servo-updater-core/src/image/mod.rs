//! Firmware image inspection
//!
//! The version of an image is the RO firmware ID (`RO_FRID` FMAP area),
//! which must start with `<board>_v`. Images without an FMAP are scanned for
//! the first such token instead.

mod fmap;

use std::fs;
use std::path::Path;

use regex::bytes::Regex;

use crate::config::BankRange;
use crate::error::ConfigError;
use crate::partition::PartitionRegion;
use crate::version::FirmwareVersion;

pub use fmap::{find_area, fmap_offset, parse_fmap, FmapArea};

/// FMAP area holding the RO firmware ID string
pub const RO_FRID: &str = "RO_FRID";

/// Reads the version string embedded in a candidate image
pub trait ImageVersionReader {
    fn image_version(&self, image: &Path, board: &str) -> Result<FirmwareVersion, ConfigError>;
}

/// Reader for FMAP-bearing EC images
#[derive(Debug, Default, Clone, Copy)]
pub struct FmapVersionReader;

impl ImageVersionReader for FmapVersionReader {
    fn image_version(&self, image: &Path, board: &str) -> Result<FirmwareVersion, ConfigError> {
        let data = fs::read(image).map_err(|source| ConfigError::Io {
            path: image.to_path_buf(),
            source,
        })?;
        version_from_bytes(&data, board)
            .ok_or_else(|| ConfigError::ImageVersionNotFound(image.to_path_buf()))
    }
}

fn version_pattern(board: &str, anchored: bool) -> Option<Regex> {
    let prefix = if anchored { "^" } else { "" };
    let pattern = format!(r"{}{}_v[^\s\x00]+", prefix, regex::escape(board));
    Regex::new(&pattern)
        .map_err(|e| log::warn!("Bad version pattern {:?}: {}", pattern, e))
        .ok()
}

/// Extract `<board>_v...` from raw image bytes
pub fn version_from_bytes(data: &[u8], board: &str) -> Option<FirmwareVersion> {
    let frid = parse_fmap(data)
        .as_deref()
        .and_then(|areas| find_area(areas, RO_FRID))
        .and_then(|area| area.slice(data));

    let found = match frid {
        Some(frid) => {
            log::debug!("Reading version from {} ({} bytes)", RO_FRID, frid.len());
            version_pattern(board, true)?.find(frid)
        }
        None => {
            log::debug!("No {} area, scanning image for {}_v", RO_FRID, board);
            version_pattern(board, false)?.find(data)
        }
    }?;

    Some(FirmwareVersion::new(String::from_utf8_lossy(found.as_bytes())))
}

/// Location of a bank according to the image's own FMAP
pub fn bank_from_fmap(data: &[u8], region: PartitionRegion) -> Option<BankRange> {
    let name = match region {
        PartitionRegion::ReadOnly => "EC_RO",
        PartitionRegion::ReadWrite => "EC_RW",
    };
    let areas = parse_fmap(data)?;
    let area = find_area(&areas, name)?;
    Some(BankRange {
        offset: area.offset,
        size: area.size,
    })
}
