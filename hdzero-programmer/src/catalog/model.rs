use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a device in the catalog.
///
/// The catalog uses numeric ids, but nothing in the API guarantees that, so
/// strings are accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceId {
    /// A numeric id.
    Number(i64),
    /// Any other id.
    Text(String),
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

/// A device known to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Catalog id, used to list the device's firmware.
    #[serde(rename = "device_id", default)]
    pub id: Option<DeviceId>,
    /// Human readable name.
    #[serde(default)]
    pub device_name: Option<String>,
    /// Picture of the device.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Older name of `image_url`.
    #[serde(default)]
    pub image: Option<String>,
    /// Everything else the catalog sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Device {
    /// The name shown in the device list.
    pub fn display_name(&self) -> String {
        match (non_empty(&self.device_name), &self.id) {
            (Some(name), _) => name.to_string(),
            (None, Some(id)) => format!("Device {id}"),
            (None, None) => "Device".to_string(),
        }
    }

    /// URL of the device picture, if the catalog has one.
    pub fn image_url(&self) -> Option<&str> {
        non_empty(&self.image_url).or_else(|| non_empty(&self.image))
    }
}

/// A firmware release of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmwareRelease {
    /// Version string.
    #[serde(default)]
    pub version: Option<String>,
    /// Release notes, plain text.
    #[serde(default)]
    pub notes: Option<String>,
    /// Where the firmware `.bin` can be downloaded.
    #[serde(default)]
    pub firmware_url: Option<String>,
    /// The device this release belongs to.
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    /// Everything else the catalog sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FirmwareRelease {
    /// The label shown in the version list.
    pub fn version_label(&self) -> &str {
        non_empty(&self.version).unwrap_or("unknown")
    }

    /// Release notes, empty when there are none.
    pub fn notes_text(&self) -> &str {
        non_empty(&self.notes).unwrap_or_default()
    }

    /// The download URL, if the catalog provided a usable one.
    pub fn firmware_url(&self) -> Option<&str> {
        non_empty(&self.firmware_url)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

/// Body of `GET /api/devices`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct DeviceList {
    #[serde(default)]
    pub devices: Option<Vec<Device>>,
}

/// Body of `GET /api/firmwares/{id}`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct FirmwareList {
    #[serde(default)]
    pub firmwares: Option<Vec<FirmwareRelease>>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    fn device(value: Value) -> Device {
        serde_json::from_value(value).unwrap()
    }

    fn release(value: Value) -> FirmwareRelease {
        serde_json::from_value(value).unwrap()
    }

    #[test_case(json!({ "device_id": 3, "device_name": "Race VTX" }), "Race VTX"; "named")]
    #[test_case(json!({ "device_id": 3 }), "Device 3"; "numeric id")]
    #[test_case(json!({ "device_id": "whoop-lite", "device_name": "" }), "Device whoop-lite"; "empty name")]
    #[test_case(json!({}), "Device"; "nothing")]
    fn device_display_name(value: Value, expected: &str) {
        assert_eq!(device(value).display_name(), expected);
    }

    #[test_case(json!({ "image_url": "https://cdn/a.png", "image": "https://cdn/b.png" }), Some("https://cdn/a.png"); "prefers image_url")]
    #[test_case(json!({ "image": "https://cdn/b.png" }), Some("https://cdn/b.png"); "falls back to image")]
    #[test_case(json!({ "image_url": "", "image": "https://cdn/b.png" }), Some("https://cdn/b.png"); "skips empty image_url")]
    #[test_case(json!({}), None; "no picture")]
    fn device_image_url(value: Value, expected: Option<&str>) {
        assert_eq!(device(value).image_url(), expected);
    }

    #[test]
    fn unknown_device_fields_are_kept() {
        let device = device(json!({ "device_id": 7, "vendor": "Divimath", "bands": [1, 2] }));

        assert_eq!(device.id, Some(DeviceId::Number(7)));
        assert_eq!(device.extra.get("vendor"), Some(&json!("Divimath")));
        assert_eq!(device.extra.get("bands"), Some(&json!([1, 2])));
    }

    #[test]
    fn release_fallbacks() {
        let release = release(json!({ "version": null, "notes": null }));

        assert_eq!(release.version_label(), "unknown");
        assert_eq!(release.notes_text(), "");
        assert_eq!(release.firmware_url(), None);
    }

    #[test]
    fn release_fields() {
        let release = release(json!({
            "version": "1.6.0",
            "notes": "Adds 1080p30 mode",
            "firmware_url": "https://hdzero.go-next.co/fw/HDZERO_TX_1.6.0.bin",
            "device_id": 3,
        }));

        assert_eq!(release.version_label(), "1.6.0");
        assert_eq!(release.notes_text(), "Adds 1080p30 mode");
        assert_eq!(
            release.firmware_url(),
            Some("https://hdzero.go-next.co/fw/HDZERO_TX_1.6.0.bin")
        );
        assert_eq!(release.device_id, Some(DeviceId::Number(3)));
    }

    #[test]
    fn missing_or_null_lists_are_empty() {
        let missing: DeviceList = serde_json::from_value(json!({})).unwrap();
        let null: FirmwareList = serde_json::from_value(json!({ "firmwares": null })).unwrap();

        assert!(missing.devices.unwrap_or_default().is_empty());
        assert!(null.firmwares.unwrap_or_default().is_empty());
    }
}
