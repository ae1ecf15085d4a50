//! Memory backends and accelerator capability flags.
//!
//! A backend is a memory space that can hold a copy of population data. The host
//! backend always exists; device backends exist only when the host was configured
//! with the matching accelerator.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// A memory space/compute target holding population data.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Host = 0,
    Cuda = 1,
    OpenCl = 2,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Host, Backend::Cuda, Backend::OpenCl];

    /// Number of backend slots a synchronized buffer reserves.
    pub const COUNT: usize = Self::ALL.len();

    /// Slot of this backend in per-backend tables.
    #[must_use]
    pub fn slot(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| *b as i32 == raw)
    }

    /// The accelerator a host must offer before this backend can be used.
    #[must_use]
    pub fn required_accelerator(self) -> AcceleratorFlags {
        match self {
            Self::Host => AcceleratorFlags::empty(),
            Self::Cuda => AcceleratorFlags::CUDA,
            Self::OpenCl => AcceleratorFlags::OPENCL,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Cuda => "cuda",
            Self::OpenCl => "opencl",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Accelerator requirements declared by plugins and offered by hosts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AcceleratorFlags: u32 {
        /// Device type A.
        const CUDA = 0b0001;
        /// Device type B.
        const OPENCL = 0b0010;
    }
}

impl AcceleratorFlags {
    /// Backends usable when these accelerators are present, host first.
    #[must_use]
    pub fn backends(self) -> Vec<Backend> {
        Backend::ALL
            .iter()
            .copied()
            .filter(|b| self.contains(b.required_accelerator()))
            .collect()
    }

    /// Human readable list such as `CUDA|OPENCL`, or `none`.
    #[must_use]
    pub fn describe(self) -> String {
        if self.is_empty() {
            return "none".to_string();
        }
        self.iter_names()
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_backend_always_available() {
        assert_eq!(AcceleratorFlags::empty().backends(), vec![Backend::Host]);
        assert_eq!(
            AcceleratorFlags::CUDA.backends(),
            vec![Backend::Host, Backend::Cuda]
        );
        assert_eq!(AcceleratorFlags::all().backends(), Backend::ALL.to_vec());
    }

    #[test]
    fn test_backend_raw_values() {
        for backend in Backend::ALL {
            assert_eq!(Backend::from_raw(backend as i32), Some(backend));
        }
        assert_eq!(Backend::from_raw(7), None);
    }

    #[test]
    fn test_describe_flags() {
        assert_eq!(AcceleratorFlags::empty().describe(), "none");
        assert_eq!(AcceleratorFlags::all().describe(), "CUDA|OPENCL");
    }
}
