//! The server-assigned segment configuration and its wire formats.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, SettingValue, Settings};

/// Segment id used for the compiled-in client default configuration.
pub const CLIENT_DEFAULT_SEGMENT: &str = "-1";
/// Group id used for the compiled-in client default configuration ("no segment").
pub const CLIENT_DEFAULT_GROUP: i64 = -1;
/// `config_hash` sentinel distinguishing a client default from a server-delivered config.
pub const CLIENT_DEFAULT_HASH: &str = "client_default";

/// An immutable segment configuration.
///
/// Created once per successful server parse, or once at cold start from the cache or the client
/// defaults. Never mutated: a new configuration always replaces the value wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Server-assigned segment identifier.
    pub segment_id: String,
    /// Sub-bucket within the segment, used for A/B style differentiation. Negative means "no
    /// segment".
    pub group_id: i64,
    /// Settings mapping. Never absent; at minimum an empty map.
    pub settings: Settings,
    /// Content hash of the configuration. [`CLIENT_DEFAULT_HASH`] for client defaults, hex md5 of
    /// the raw response body for server-delivered configs.
    pub config_hash: String,
}

/// Wire format of a single `params` entry in the server response.
#[derive(Debug, Deserialize)]
struct ServerParam {
    name: String,
    value: SettingValue,
}

/// Wire format of the settings-server response.
///
/// Note `group` (not `group_id`) and the name/value parameter list: the server contract differs
/// from the cache document.
#[derive(Debug, Deserialize)]
struct ServerResponse {
    segment_id: String,
    group: i64,
    params: Vec<ServerParam>,
}

impl SegmentConfig {
    /// Creates the compiled-in fallback configuration from caller-supplied defaults.
    pub fn client_default(settings: Settings) -> SegmentConfig {
        SegmentConfig {
            segment_id: CLIENT_DEFAULT_SEGMENT.to_owned(),
            group_id: CLIENT_DEFAULT_GROUP,
            settings,
            config_hash: CLIENT_DEFAULT_HASH.to_owned(),
        }
    }

    /// Returns whether this is the compiled-in client default configuration.
    pub fn is_client_default(&self) -> bool {
        self.config_hash == CLIENT_DEFAULT_HASH
    }

    /// Encodes the configuration into a single JSON document with all four keys present.
    pub fn serialize(&self) -> String {
        // SegmentConfig contains no non-serializable values, so encoding cannot fail.
        serde_json::to_string(self).expect("segment config serializes to JSON")
    }

    /// Decodes a configuration from its cache document.
    ///
    /// All-or-nothing: returns [`Error::MalformedCache`] if any required key is missing or has
    /// the wrong shape, never a partially populated config.
    pub fn deserialize(json: &str) -> Result<SegmentConfig> {
        serde_json::from_str(json).map_err(|err| Error::MalformedCache(Arc::new(err)))
    }

    /// Parses a raw settings-server response body.
    ///
    /// Server integers become [`SettingValue::Int`], floating-point values become
    /// [`SettingValue::Float`], strings and booleans are copied as-is. A malformed entry within
    /// an otherwise valid `params` list fails the whole parse; the server contract is strict and
    /// parameters are never silently dropped.
    pub fn from_server_response(raw_json: &str) -> Result<SegmentConfig> {
        let response: ServerResponse = serde_json::from_str(raw_json)
            .map_err(|err| Error::InvalidResponse(Arc::new(err)))?;

        let settings = response
            .params
            .into_iter()
            .map(|param| (param.name, param.value))
            .collect();

        Ok(SegmentConfig {
            segment_id: response.segment_id,
            group_id: response.group,
            settings,
            config_hash: format!("{:x}", md5::compute(raw_json.as_bytes())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_document_round_trips() {
        let config = SegmentConfig {
            segment_id: "seg-12".to_owned(),
            group_id: 3,
            settings: [
                ("totalObjects".to_owned(), 42.into()),
                ("particleScale".to_owned(), 0.5.into()),
                ("quality".to_owned(), "high".into()),
                ("shadows".to_owned(), true.into()),
            ]
            .into_iter()
            .collect(),
            config_hash: "abc123".to_owned(),
        };

        let decoded = SegmentConfig::deserialize(&config.serialize()).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn deserialize_rejects_missing_keys() {
        let result = SegmentConfig::deserialize(r#"{"segment_id": "a", "group_id": 1}"#);
        assert!(matches!(result, Err(Error::MalformedCache(_))));
    }

    #[test]
    fn parses_server_response() {
        let config = SegmentConfig::from_server_response(
            r#"{"segment_id":"abc","group":7,"params":[{"name":"totalObjects","value":42}]}"#,
        )
        .unwrap();

        assert_eq!(config.segment_id, "abc");
        assert_eq!(config.group_id, 7);
        assert_eq!(config.settings["totalObjects"], SettingValue::Int(42));
        assert!(!config.is_client_default());
    }

    #[test]
    fn server_numbers_normalize_by_kind() {
        let config = SegmentConfig::from_server_response(
            r#"{"segment_id":"abc","group":0,"params":[
                {"name":"count","value":10},
                {"name":"scale","value":1.5},
                {"name":"tier","value":"low"},
                {"name":"enabled","value":false}
            ]}"#,
        )
        .unwrap();

        assert_eq!(config.settings["count"], SettingValue::Int(10));
        assert_eq!(config.settings["scale"], SettingValue::Float(1.5));
        assert_eq!(config.settings["tier"], SettingValue::String("low".to_owned()));
        assert_eq!(config.settings["enabled"], SettingValue::Bool(false));
    }

    #[test]
    fn missing_params_is_invalid() {
        let result = SegmentConfig::from_server_response(r#"{"segment_id":"abc","group":7}"#);
        assert!(matches!(result, Err(Error::InvalidResponse(_))));
    }

    #[test]
    fn entry_without_value_fails_whole_parse() {
        let result = SegmentConfig::from_server_response(
            r#"{"segment_id":"abc","group":7,"params":[
                {"name":"ok","value":1},
                {"name":"broken"}
            ]}"#,
        );
        assert!(matches!(result, Err(Error::InvalidResponse(_))));
    }

    #[test]
    fn non_integer_group_is_invalid() {
        let result = SegmentConfig::from_server_response(
            r#"{"segment_id":"abc","group":"7","params":[]}"#,
        );
        assert!(matches!(result, Err(Error::InvalidResponse(_))));
    }

    #[test]
    fn client_default_uses_sentinel_hash() {
        let config = SegmentConfig::client_default(Settings::new());
        assert_eq!(config.segment_id, CLIENT_DEFAULT_SEGMENT);
        assert_eq!(config.group_id, CLIENT_DEFAULT_GROUP);
        assert!(config.is_client_default());
    }
}
