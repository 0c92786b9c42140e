//! Device/runtime attributes used as the segment request payload and as telemetry fields.

use serde::{Serialize, Serializer};

/// A single host-reported device attribute.
///
/// Hosts cannot always report every attribute (e.g., DPI is unavailable on some platforms), so
/// missing data is an explicit [`DeviceAttr::Unknown`] rather than an empty-string/zero
/// convention. On the wire, `Unknown` serializes as the type's default value, which is the
/// sentinel the settings server expects.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceAttr<T> {
    /// The host reported a value.
    Known(T),
    /// The host could not report this attribute.
    Unknown,
}

impl<T: Serialize + Default> Serialize for DeviceAttr<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DeviceAttr::Known(value) => value.serialize(serializer),
            DeviceAttr::Unknown => T::default().serialize(serializer),
        }
    }
}

impl<T> Default for DeviceAttr<T> {
    fn default() -> Self {
        DeviceAttr::Unknown
    }
}

impl<T> From<Option<T>> for DeviceAttr<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => DeviceAttr::Known(v),
            None => DeviceAttr::Unknown,
        }
    }
}

impl From<&str> for DeviceAttr<String> {
    fn from(value: &str) -> Self {
        DeviceAttr::Known(value.to_owned())
    }
}

/// Read-only snapshot of device attributes, as reported by the host.
///
/// Field meanings follow the host's device-info conventions: `ram_mb` is system memory in
/// megabytes, `platform_id` is the host's integer platform enum, `screen` is a resolution
/// descriptor string (e.g., `"1920 x 1080 @ 60Hz"`).
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    pub model: DeviceAttr<String>,
    pub ram_mb: DeviceAttr<i32>,
    pub cpu: DeviceAttr<String>,
    pub cpu_count: DeviceAttr<i32>,
    pub gfx_name: DeviceAttr<String>,
    pub gfx_vendor: DeviceAttr<String>,
    pub screen: DeviceAttr<String>,
    pub dpi: DeviceAttr<f32>,
    pub platform_id: DeviceAttr<i32>,
    pub os_version: DeviceAttr<String>,
    pub gfx_shader_level: DeviceAttr<i32>,
    pub gfx_version: DeviceAttr<String>,
    pub max_texture_size: DeviceAttr<i32>,
}

/// A trait for supplying the host's device information.
///
/// The engine takes one snapshot per fetch attempt. Implementations must never block or fail;
/// attributes the host cannot determine are reported as [`DeviceAttr::Unknown`].
pub trait DeviceInfoProvider {
    /// Takes a point-in-time snapshot of device attributes.
    fn snapshot(&self) -> DeviceSnapshot;
}

/// A provider that reports every attribute as unknown.
///
/// Useful for tests and for hosts that have no device information to share.
pub struct UnknownDeviceInfo;
impl DeviceInfoProvider for UnknownDeviceInfo {
    fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot::default()
    }
}

/// Immutable snapshot of device/runtime attributes sent to the settings server to determine
/// segment assignment.
///
/// Built once per fetch attempt from a [`DeviceInfoProvider`] snapshot plus the caller-supplied
/// sheet id and build version; read-only afterwards. Wire field names match the settings-server
/// contract.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceFingerprint {
    pub model: DeviceAttr<String>,
    pub ram: DeviceAttr<i32>,
    pub cpu: DeviceAttr<String>,
    pub cpu_count: DeviceAttr<i32>,
    pub gfx_name: DeviceAttr<String>,
    pub gfx_vendor: DeviceAttr<String>,
    pub screen: DeviceAttr<String>,
    pub dpi: DeviceAttr<f32>,
    #[serde(rename = "platformid")]
    pub platform_id: DeviceAttr<i32>,
    pub os_ver: DeviceAttr<String>,
    pub gfx_shader: DeviceAttr<i32>,
    pub gfx_ver: DeviceAttr<String>,
    pub max_texture_size: DeviceAttr<i32>,
    pub app_build_version: String,
    pub sheet_id: String,
}

impl DeviceFingerprint {
    /// Builds a fingerprint from the host's device info. Pure collection; never fails.
    pub fn build(
        provider: &dyn DeviceInfoProvider,
        sheet_id: &str,
        build_version: &str,
    ) -> DeviceFingerprint {
        let snapshot = provider.snapshot();
        DeviceFingerprint {
            model: snapshot.model,
            ram: snapshot.ram_mb,
            cpu: snapshot.cpu,
            cpu_count: snapshot.cpu_count,
            gfx_name: snapshot.gfx_name,
            gfx_vendor: snapshot.gfx_vendor,
            screen: snapshot.screen,
            dpi: snapshot.dpi,
            platform_id: snapshot.platform_id,
            os_ver: snapshot.os_version,
            gfx_shader: snapshot.gfx_shader_level,
            gfx_ver: snapshot.gfx_version,
            max_texture_size: snapshot.max_texture_size,
            app_build_version: build_version.to_owned(),
            sheet_id: sheet_id.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_attributes_serialize_as_sentinels() {
        let fingerprint =
            DeviceFingerprint::build(&UnknownDeviceInfo, "sheet-1", "1.2.3");

        let json: serde_json::Value = serde_json::to_value(&fingerprint).unwrap();
        assert_eq!(json["model"], "");
        assert_eq!(json["ram"], 0);
        assert_eq!(json["dpi"], 0.0);
        assert_eq!(json["sheet_id"], "sheet-1");
        assert_eq!(json["app_build_version"], "1.2.3");
    }

    #[test]
    fn wire_names_match_server_contract() {
        let mut snapshot = DeviceSnapshot::default();
        snapshot.platform_id = DeviceAttr::Known(11);
        snapshot.gfx_version = "OpenGL ES 3.0".into();

        struct Fixed(DeviceSnapshot);
        impl DeviceInfoProvider for Fixed {
            fn snapshot(&self) -> DeviceSnapshot {
                self.0.clone()
            }
        }

        let fingerprint = DeviceFingerprint::build(&Fixed(snapshot), "s", "b");
        let json: serde_json::Value = serde_json::to_value(&fingerprint).unwrap();
        assert_eq!(json["platformid"], 11);
        assert_eq!(json["gfx_ver"], "OpenGL ES 3.0");
    }
}
