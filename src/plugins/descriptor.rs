//! Plugin metadata and version handling.

use crate::backend::AcceleratorFlags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic version `major.minor.patch`.
///
/// `#[repr(C)]` because plugins report their versions through the C ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// `true` when a plugin requiring `required` may run on a host of this version.
    #[must_use]
    pub fn satisfies(&self, required: &Version) -> bool {
        required <= self
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, '.');
        let mut next = |what: &str| -> Result<u32, String> {
            parts
                .next()
                .unwrap_or("0")
                .parse()
                .map_err(|_| format!("invalid {what} version in '{s}'"))
        };
        Ok(Self::new(next("major")?, next("minor")?, next("patch")?))
    }
}

/// Reference frame of the Cartesian vectors a propagator writes.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceFrame {
    /// No Cartesian output.
    None = 0,
    /// Cartesian output in an undocumented frame.
    Unspecified = 1,
    /// Earth-centered inertial.
    Eci = 2,
    /// Earth-centered, Earth-fixed.
    Ecef = 3,
    /// True equator, mean equinox.
    Teme = 4,
}

impl ReferenceFrame {
    pub const ALL: [ReferenceFrame; 5] = [
        ReferenceFrame::None,
        ReferenceFrame::Unspecified,
        ReferenceFrame::Eci,
        ReferenceFrame::Ecef,
        ReferenceFrame::Teme,
    ];

    /// Unknown values are treated as `Unspecified`.
    #[must_use]
    pub fn from_raw(raw: i32) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|f| *f as i32 == raw)
            .unwrap_or(Self::Unspecified)
    }
}

impl fmt::Display for ReferenceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Unspecified => "unspecified",
            Self::Eci => "eci",
            Self::Ecef => "ecef",
            Self::Teme => "teme",
        };
        f.write_str(name)
    }
}

/// Immutable metadata of a loaded plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    /// Lookup key in the host registry; never empty.
    pub name: String,
    pub author: String,
    pub description: String,
    pub version: Version,
    pub min_host_version: Version,
    pub accelerators: AcceleratorFlags,
}
