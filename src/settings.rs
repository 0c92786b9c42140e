use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Type alias for a HashMap representing the settings delivered to the host.
///
/// Keys are strings representing setting names.
///
/// # Examples
/// ```
/// # use autotune::{Settings, SettingValue};
/// let settings = [
///     ("totalObjects".to_owned(), 42.into()),
///     ("particleScale".to_owned(), 0.5.into()),
///     ("shadowsEnabled".to_owned(), false.into()),
/// ].into_iter().collect::<Settings>();
/// ```
pub type Settings = HashMap<String, SettingValue>;

/// Enum representing possible values of a single tuning setting.
///
/// Conveniently implements `From` conversions for `i64`, `f64`, `String`, `&str`, and `bool`
/// types, so downstream consumers pattern-match instead of inspecting JSON values at runtime.
///
/// Examples:
/// ```
/// # use autotune::SettingValue;
/// let int_setting: SettingValue = 42.into();
/// let float_setting: SettingValue = 0.25.into();
/// let string_setting: SettingValue = "high".into();
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum SettingValue {
    /// A boolean value.
    Bool(bool),
    /// An integer value.
    Int(i64),
    /// A floating-point value.
    Float(f64),
    /// A string value.
    String(String),
}

impl SettingValue {
    pub fn as_int(&self) -> Option<i64> {
        if let SettingValue::Int(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        if let SettingValue::Float(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let SettingValue::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let SettingValue::Bool(v) = self {
            Some(*v)
        } else {
            None
        }
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}
