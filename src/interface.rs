//! Machine-readable description of the plugin interface.
//!
//! Binding generators and plugin authors in other languages consume this as
//! JSON (`opi interface`).

use crate::backend::{AcceleratorFlags, Backend};
use crate::error::ErrorCode;
use crate::host::HOST_VERSION;
use crate::orbit::{ObjectProperties, Orbit, Vector3};
use crate::plugins::api::{self, OPI_ABI_VERSION};
use crate::plugins::{ReferenceFrame, Version};
use crate::population::DataCategory;
use serde::Serialize;
use std::mem::size_of;

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceDescription {
    pub abi_version: u32,
    pub host_version: Version,
    pub entry_points: Vec<EntryPointInfo>,
    pub error_codes: Vec<EnumValue>,
    pub backends: Vec<EnumValue>,
    pub accelerators: Vec<EnumValue>,
    pub data_categories: Vec<RecordInfo>,
    pub reference_frames: Vec<EnumValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryPointInfo {
    pub symbol: String,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumValue {
    pub name: String,
    pub value: i64,
}

/// Layout of one per-object record.
#[derive(Debug, Clone, Serialize)]
pub struct RecordInfo {
    pub category: DataCategory,
    pub value: i32,
    pub record_size: usize,
    pub fields: Vec<&'static str>,
}

fn symbol(raw: &[u8], required: bool) -> EntryPointInfo {
    let name = raw.strip_suffix(b"\0").unwrap_or(raw);
    EntryPointInfo {
        symbol: String::from_utf8_lossy(name).into_owned(),
        required,
    }
}

fn enum_value(name: impl ToString, value: impl Into<i64>) -> EnumValue {
    EnumValue {
        name: name.to_string(),
        value: value.into(),
    }
}

fn record(category: DataCategory) -> RecordInfo {
    let (record_size, fields) = match category {
        DataCategory::Orbit => (
            size_of::<Orbit>(),
            vec![
                "semi_major_axis",
                "eccentricity",
                "inclination",
                "raan",
                "arg_of_perigee",
                "mean_anomaly",
            ],
        ),
        DataCategory::Position | DataCategory::Velocity => {
            (size_of::<Vector3>(), vec!["x", "y", "z"])
        }
        DataCategory::Properties => (
            size_of::<ObjectProperties>(),
            vec![
                "id",
                "object_class",
                "mass",
                "diameter",
                "area_to_mass",
                "drag_coefficient",
                "reflectivity",
            ],
        ),
    };
    RecordInfo {
        category,
        value: category as i32,
        record_size,
        fields,
    }
}

/// Describe every entry point, enumeration and record layout of the plugin ABI.
#[must_use]
pub fn describe() -> InterfaceDescription {
    InterfaceDescription {
        abi_version: OPI_ABI_VERSION,
        host_version: HOST_VERSION,
        entry_points: vec![
            symbol(api::SYM_INFO, true),
            symbol(api::SYM_PROPAGATE, true),
            symbol(api::SYM_INIT, false),
            symbol(api::SYM_PROPAGATE_INDEXED, false),
            symbol(api::SYM_PROPAGATE_MULTI_TIME, false),
            symbol(api::SYM_ENABLE, false),
            symbol(api::SYM_DISABLE, false),
            symbol(api::SYM_CARTESIAN_OUTPUT, false),
            symbol(api::SYM_REFERENCE_FRAME, false),
            symbol(api::SYM_BACKWARD_PROPAGATION, false),
            symbol(api::SYM_REQUIRED_ACCELERATORS, false),
        ],
        error_codes: ErrorCode::ALL
            .iter()
            .map(|code| enum_value(code.name(), code.as_raw()))
            .collect(),
        backends: Backend::ALL
            .iter()
            .map(|backend| enum_value(backend.name(), *backend as i32))
            .collect(),
        accelerators: AcceleratorFlags::all()
            .iter_names()
            .map(|(name, flag)| enum_value(name, flag.bits()))
            .collect(),
        data_categories: DataCategory::ALL.iter().copied().map(record).collect(),
        reference_frames: ReferenceFrame::ALL
            .iter()
            .map(|frame| enum_value(frame, *frame as i32))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_points_listed() {
        let description = describe();
        let required: Vec<_> = description
            .entry_points
            .iter()
            .filter(|e| e.required)
            .map(|e| e.symbol.as_str())
            .collect();
        assert_eq!(required, vec!["opi_plugin_info", "opi_plugin_propagate"]);
        assert_eq!(description.entry_points.len(), 11);
    }

    #[test]
    fn test_error_codes_are_stable() {
        let description = describe();
        assert_eq!(description.error_codes.len(), ErrorCode::ALL.len());
        assert_eq!(description.error_codes[0].value, 0);
        assert!(description
            .error_codes
            .iter()
            .any(|c| c.value == ErrorCode::NotImplemented.as_raw() as i64));
    }

    #[test]
    fn test_record_sizes() {
        let description = describe();
        assert_eq!(description.data_categories[0].record_size, 48);
        assert_eq!(description.data_categories[1].record_size, 24);
        assert_eq!(description.accelerators.len(), 2);
    }

    #[test]
    fn test_serializes_to_json() {
        let json = serde_json::to_value(describe()).unwrap();
        assert_eq!(json["abi_version"], 1);
        assert_eq!(json["backends"][2]["name"], "opencl");
    }
}
