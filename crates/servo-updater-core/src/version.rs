//! Firmware versions and updater generation classification
//!
//! The device does not report which update protocol it speaks. The protocol
//! changed at a known firmware build, so the generation is inferred from the
//! build token with an ordered rule table. Later firmware eras are supported
//! by appending a rule.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::UpdateError;

/// Opaque firmware build token, e.g. `servo_v4_v1.1.6749-74d1a312e`
///
/// Only equality is meaningful; updates happen whenever the available token
/// differs from the running one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FirmwareVersion(String);

impl FirmwareVersion {
    /// Create a version, trimming whitespace and NUL padding
    pub fn new(token: impl AsRef<str>) -> Self {
        Self(token.as_ref().trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Device-side update protocol generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdaterGeneration {
    /// Direct USB bulk transfer (updater protocol 2)
    Legacy,
    /// External `usb_updater2` tool (updater protocol 6)
    Current,
}

impl UpdaterGeneration {
    /// Updater protocol number as used by the firmware
    pub fn protocol(self) -> u8 {
        match self {
            Self::Legacy => 2,
            Self::Current => 6,
        }
    }
}

impl fmt::Display for UpdaterGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy (v{})", self.protocol()),
            Self::Current => write!(f, "current (v{})", self.protocol()),
        }
    }
}

/// First `_v1.1` build that ships the current updater
pub const CURRENT_UPDATER_MIN_BUILD: u32 = 5800;

/// How a matching rule decides the generation
#[derive(Debug, Clone, Copy)]
enum Outcome {
    /// Always this generation
    Always(UpdaterGeneration),
    /// Compare the first capture group against a build number
    BuildAtLeast {
        min: u32,
        below: UpdaterGeneration,
        at_or_above: UpdaterGeneration,
    },
}

/// Generation rules for every known servo firmware era, in match order
const RULE_TABLE: &[(&str, Outcome)] = &[
    // _v2 and later are newer than anything _v1
    (r"_v[2-9]\.\d", Outcome::Always(UpdaterGeneration::Current)),
    (
        r"_v1\.1\.(\d{4})",
        Outcome::BuildAtLeast {
            min: CURRENT_UPDATER_MIN_BUILD,
            below: UpdaterGeneration::Legacy,
            at_or_above: UpdaterGeneration::Current,
        },
    ),
];

static RULES: Lazy<Vec<(Regex, Outcome)>> = Lazy::new(|| {
    RULE_TABLE
        .iter()
        .filter_map(|(pattern, outcome)| match Regex::new(pattern) {
            Ok(re) => Some((re, *outcome)),
            Err(e) => {
                log::error!("Skipping classification rule {:?}: {}", pattern, e);
                None
            }
        })
        .collect()
});

/// Ordered (pattern, outcome) rules; the first match wins
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    rules: &'static [(Regex, Outcome)],
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            rules: RULES.as_slice(),
        }
    }

    /// Classify a running firmware version
    pub fn classify(&self, version: &FirmwareVersion) -> Result<UpdaterGeneration, UpdateError> {
        for (pattern, outcome) in self.rules {
            let Some(caps) = pattern.captures(version.as_str()) else {
                continue;
            };
            match *outcome {
                Outcome::Always(generation) => return Ok(generation),
                Outcome::BuildAtLeast {
                    min,
                    below,
                    at_or_above,
                } => {
                    let build = caps
                        .get(1)
                        .and_then(|m| m.as_str().parse::<u32>().ok())
                        .ok_or_else(|| UpdateError::Classification {
                            version: version.to_string(),
                        })?;
                    return Ok(if build < min { below } else { at_or_above });
                }
            }
        }
        Err(UpdateError::Classification {
            version: version.to_string(),
        })
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify with the default rule table
pub fn classify(version: &FirmwareVersion) -> Result<UpdaterGeneration, UpdateError> {
    Classifier::new().classify(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn generation_of(token: &str) -> UpdaterGeneration {
        classify(&FirmwareVersion::new(token)).unwrap()
    }

    #[test]
    fn test_all_rules_compile() {
        assert_eq!(RULES.len(), RULE_TABLE.len());
    }

    #[test]
    fn test_v2_and_later_are_current() {
        assert_eq!(generation_of("servo_v4_v2.0.1234"), UpdaterGeneration::Current);
        assert_eq!(generation_of("servo_v4_v2.0.100"), UpdaterGeneration::Current);
        assert_eq!(generation_of("servo_micro_v9.3.7-deadbeef"), UpdaterGeneration::Current);
    }

    #[test]
    fn test_build_boundary() {
        assert_eq!(generation_of("servo_v4_v1.1.5799"), UpdaterGeneration::Legacy);
        assert_eq!(generation_of("servo_v4_v1.1.5800"), UpdaterGeneration::Current);
        assert_eq!(generation_of("tigertail_v1.1.6749-74d1a312e"), UpdaterGeneration::Current);
        assert_eq!(generation_of("servo_v4_v1.1.0042-abc"), UpdaterGeneration::Legacy);
    }

    #[test]
    fn test_unrecognized_token() {
        for token in ["garbage_version", "servo_v4_v1.0.6000", "servo_v4_v1.1.58"] {
            let err = classify(&FirmwareVersion::new(token)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Classification);
            assert!(err.to_string().contains(token));
        }
    }

    #[test]
    fn test_version_trims_padding() {
        let v = FirmwareVersion::new("  servo_v4_v2.0.1\0\0\r\n");
        assert_eq!(v.as_str(), "servo_v4_v2.0.1");
        assert_eq!(v, FirmwareVersion::new("servo_v4_v2.0.1"));
    }
}
