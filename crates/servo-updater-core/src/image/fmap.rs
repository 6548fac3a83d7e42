//! FMAP (Flash Map) parsing
//!
//! EC images embed an FMAP describing named areas such as `EC_RO`, `EC_RW`
//! and `RO_FRID` (the RO firmware ID string). The structure can sit
//! anywhere in the image.
//!
//! Reference: https://chromium.googlesource.com/chromiumos/platform/flashmap

/// FMAP signature: "__FMAP__"
const FMAP_SIGNATURE: &[u8; 8] = b"__FMAP__";

/// Maximum supported FMAP major version
const FMAP_VER_MAJOR: u8 = 1;

/// Size of FMAP header
const FMAP_HEADER_SIZE: usize = 56;

/// Size of FMAP area
const FMAP_AREA_SIZE: usize = 42;

/// One named area of the flash map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FmapArea {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub flags: u16,
}

impl FmapArea {
    /// Slice of `image` covered by this area, if it lies within the image
    pub fn slice<'a>(&self, image: &'a [u8]) -> Option<&'a [u8]> {
        let start = self.offset as usize;
        let end = start.checked_add(self.size as usize)?;
        image.get(start..end)
    }
}

fn le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Check for a plausible FMAP header at the start of `data`
fn is_valid_fmap(data: &[u8]) -> bool {
    if data.len() < FMAP_HEADER_SIZE || &data[0..8] != FMAP_SIGNATURE {
        return false;
    }
    if data[8] > FMAP_VER_MAJOR {
        return false;
    }
    let nareas = le_u16(&data[54..56]) as usize;
    data.len() >= FMAP_HEADER_SIZE + nareas * FMAP_AREA_SIZE
}

/// Search for FMAP signature in data
pub fn fmap_offset(data: &[u8]) -> Option<usize> {
    if data.len() < FMAP_HEADER_SIZE {
        return None;
    }
    (0..=(data.len() - FMAP_HEADER_SIZE)).find(|&offset| is_valid_fmap(&data[offset..]))
}

/// Parse a null-terminated FMAP string
fn parse_fmap_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

/// Parse all FMAP areas in an image; `None` if the image has no FMAP
pub fn parse_fmap(data: &[u8]) -> Option<Vec<FmapArea>> {
    let offset = fmap_offset(data)?;
    let fmap = &data[offset..];
    let nareas = le_u16(&fmap[54..56]) as usize;

    log::trace!(
        "FMAP \"{}\" v{}.{} at 0x{:x} with {} areas",
        parse_fmap_string(&fmap[22..54]),
        fmap[8],
        fmap[9],
        offset,
        nareas
    );

    let areas = (0..nareas)
        .map(|i| {
            let start = FMAP_HEADER_SIZE + i * FMAP_AREA_SIZE;
            let area = &fmap[start..start + FMAP_AREA_SIZE];
            FmapArea {
                offset: le_u32(&area[0..4]),
                size: le_u32(&area[4..8]),
                name: parse_fmap_string(&area[8..40]),
                flags: le_u16(&area[40..42]),
            }
        })
        .filter(|area| area.size != 0)
        .collect();

    Some(areas)
}

/// Find a named area
pub fn find_area<'a>(areas: &'a [FmapArea], name: &str) -> Option<&'a FmapArea> {
    areas.iter().find(|a| a.name == name)
}
