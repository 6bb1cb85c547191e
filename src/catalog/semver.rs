//! Semantic versions for module version chains.

use crate::core::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `(major, minor, patch)`; the derived ordering is lexicographic in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemanticVersion {
    /// Every module starts here.
    pub const INITIAL: SemanticVersion = SemanticVersion::new(0, 0, 1);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn bump(self, bump: VersionBump) -> Result<Self, CatalogError> {
        let bumped = match bump {
            VersionBump::Major => self.major.checked_add(1).map(|major| Self::new(major, 0, 0)),
            VersionBump::Minor => self
                .minor
                .checked_add(1)
                .map(|minor| Self::new(self.major, minor, 0)),
            VersionBump::Patch => self
                .patch
                .checked_add(1)
                .map(|patch| Self::new(self.major, self.minor, patch)),
        };
        bumped.ok_or_else(|| {
            CatalogError::InvalidInput(format!("Version {} cannot be bumped further", self))
        })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = CatalogError;

    /// Accepts exactly three dot-separated runs of ASCII digits.
    fn from_str(v: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = v.split('.').collect();
        if parts.len() != 3 {
            return Err(CatalogError::InvalidInput(format!(
                "Invalid semantic version: {}",
                v
            )));
        }

        let mut nums = [0u32; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CatalogError::InvalidInput(format!(
                    "Failed to parse version {}, part {} is not a number",
                    v, part
                )));
            }
            *slot = part.parse().map_err(|_| {
                CatalogError::InvalidInput(format!(
                    "Failed to parse version {}, part {} is out of range",
                    v, part
                ))
            })?;
        }

        Ok(Self::new(nums[0], nums[1], nums[2]))
    }
}

/// Selector for `AddModuleVersion`. The empty string means patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionBump {
    #[default]
    Patch,
    Minor,
    Major,
}

impl FromStr for VersionBump {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "patch" => Ok(VersionBump::Patch),
            "minor" => Ok(VersionBump::Minor),
            "major" => Ok(VersionBump::Major),
            other => Err(CatalogError::InvalidInput(format!(
                "Invalid version update field: {}",
                other
            ))),
        }
    }
}

/// Primary key of a module version row: `<moduleID>-v<major>.<minor>.<patch>`.
pub fn module_version_id(module_id: &str, version: SemanticVersion) -> String {
    format!("{}-v{}", module_id, version)
}

/// Serde adapter writing a version as its `"M.m.p"` string form.
pub mod as_string {
    use super::SemanticVersion;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(v: &SemanticVersion, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(v)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SemanticVersion, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(D::Error::custom)
    }
}
