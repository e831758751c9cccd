//! Typed pieces of the Tado API used by the session and the accessors.
//!
//! Notes
//! - Most endpoints are passed through verbatim as [`Object`]; only the shapes this
//!   crate interprets (token grants, `me`, zone listings, overlay commands) are typed.
//! - Date/time fields use `chrono` (`DateTime<Utc>`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::TadoError;

/// Any JSON payload as returned by the API.
pub type Object = Value;

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HomeId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub i64);

impl core::fmt::Display for HomeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl core::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =====================
// Core enums
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HomePresence {
    Home,
    Away,
}

impl FromStr for HomePresence {
    type Err = TadoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HOME" => Ok(HomePresence::Home),
            "AWAY" => Ok(HomePresence::Away),
            other => Err(TadoError::Config(format!("unknown presence {:?} (expected HOME or AWAY)", other))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Power {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Key under which temperature objects carry a value in this unit.
    pub fn as_key(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "celsius",
            TemperatureUnit::Fahrenheit => "fahrenheit",
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = TadoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "celsius" | "c" => Ok(TemperatureUnit::Celsius),
            "fahrenheit" | "f" => Ok(TemperatureUnit::Fahrenheit),
            other => Err(TadoError::Config(format!("unknown temperature unit {:?}", other))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneOverlayTerminationType {
    Manual,
    TadoMode,
    Timer,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneType {
    AirConditioning,
    Heating,
    HotWater,
}

// =====================
// OAuth
// =====================

/// Body of a successful grant from the OAuth token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

// =====================
// Users and homes
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HomeBase {
    pub id: Option<HomeId>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub id: Option<String>,
    pub locale: Option<String>,
    pub homes: Option<Vec<HomeBase>>,
}

impl User {
    /// First home of the account, which is the one a session binds to.
    pub fn first_home_id(&self) -> Option<HomeId> {
        self.homes.as_deref().and_then(|h| h.first()).and_then(|h| h.id)
    }
}

// =====================
// Zones
// =====================

/// One entry of a home's zone listing. Vendor fields this crate does not
/// interpret are kept in `extras`.
///
/// A `dateCreated` that is not RFC 3339 leaves `date_created` empty and stays in
/// `extras` as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawZoneInfo")]
pub struct ZoneInfo {
    pub id: ZoneId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct RawZoneInfo {
    id: ZoneId,
    name: String,
    #[serde(flatten)]
    extras: BTreeMap<String, Value>,
}

impl From<RawZoneInfo> for ZoneInfo {
    fn from(raw: RawZoneInfo) -> Self {
        let RawZoneInfo { id, name, mut extras } = raw;
        let parsed = extras
            .get("dateCreated")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));
        if parsed.is_some() {
            extras.remove("dateCreated");
        }
        ZoneInfo {
            id,
            name,
            date_created: parsed,
            extras,
        }
    }
}

// =====================
// Overlay commands
// =====================

/// Below this target (in the home's unit) an overlay switches heating off.
pub const MIN_HEATING_TEMPERATURE: f64 = 5.0;

/// When a manual overlay ends.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Termination {
    /// Until changed by hand.
    #[default]
    Manual,
    /// Until the next automatic schedule change.
    Auto,
    /// For a fixed number of seconds.
    Timer(u64),
}

impl FromStr for Termination {
    type Err = TadoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "MANUAL" => Ok(Termination::Manual),
            "AUTO" => Ok(Termination::Auto),
            other => other
                .parse::<u64>()
                .map(Termination::Timer)
                .map_err(|_| TadoError::Config(format!("termination must be MANUAL, AUTO or seconds, got {:?}", other))),
        }
    }
}

impl From<u64> for Termination {
    fn from(seconds: u64) -> Self {
        Termination::Timer(seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayTemperature {
    pub celsius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySetting {
    pub r#type: ZoneType,
    pub power: Power,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<OverlayTemperature>,
}

impl OverlaySetting {
    pub fn heating(temperature: f64) -> Self {
        if temperature < MIN_HEATING_TEMPERATURE {
            OverlaySetting {
                r#type: ZoneType::Heating,
                power: Power::Off,
                temperature: None,
            }
        } else {
            OverlaySetting {
                r#type: ZoneType::Heating,
                power: Power::On,
                temperature: Some(OverlayTemperature { celsius: temperature }),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayTermination {
    pub r#type: ZoneOverlayTerminationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_in_seconds: Option<u64>,
}

impl From<Termination> for OverlayTermination {
    fn from(value: Termination) -> Self {
        match value {
            Termination::Manual => OverlayTermination {
                r#type: ZoneOverlayTerminationType::Manual,
                duration_in_seconds: None,
            },
            Termination::Auto => OverlayTermination {
                r#type: ZoneOverlayTerminationType::TadoMode,
                duration_in_seconds: None,
            },
            Termination::Timer(seconds) => OverlayTermination {
                r#type: ZoneOverlayTerminationType::Timer,
                duration_in_seconds: Some(seconds),
            },
        }
    }
}

/// Body of `PUT homes/{id}/zones/{zone}/overlay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayRequest {
    pub setting: OverlaySetting,
    pub termination: OverlayTermination,
}

impl OverlayRequest {
    pub fn heating(temperature: f64, termination: Termination) -> Self {
        OverlayRequest {
            setting: OverlaySetting::heating(temperature),
            termination: termination.into(),
        }
    }
}
