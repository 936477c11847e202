#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The canonical traffic incident record.
//!
//! Every upstream alert, whatever its shape, is normalized into an
//! [`Incident`]. The same type is what gets persisted by every storage
//! backend, so its serde representation is the on-disk format of the
//! master collection.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Epoch values below this are treated as seconds rather than
/// milliseconds.
pub const SECONDS_THRESHOLD: i64 = 10_000_000_000;

/// Number of decimal places coordinates are rounded to when deriving a
/// location-based deduplication key (~1 meter).
pub const KEY_COORD_PRECISION: i32 = 5;

/// Fallback incident type when the upstream record has none.
pub const UNKNOWN_TYPE: &str = "unknown";

/// One observed traffic event, normalized from an upstream alert.
///
/// Field order matches the persisted JSON layout. Optional pass-through
/// fields are omitted entirely when the upstream record did not carry
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Alert type (e.g. `"ACCIDENT"`, `"JAM"`).
    #[serde(rename = "type", default = "unknown_type", deserialize_with = "type_or_unknown")]
    pub incident_type: String,
    /// Alert subtype, possibly empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub subtype: String,
    /// Street name, possibly empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub street: String,
    /// City name, possibly empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub city: String,
    /// Country code, possibly empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub country: String,
    /// Upstream reliability score.
    #[serde(default)]
    pub reliability: i64,
    /// Upstream report rating.
    #[serde(default)]
    pub report_rating: i64,
    /// Publication time as received. May be seconds or milliseconds
    /// since the epoch, `0` when unknown. See [`normalize_epoch_millis`].
    #[serde(default)]
    pub pub_millis: i64,
    /// RFC 3339 rendering of [`Self::pub_millis`], `None` when there is
    /// no usable publication time.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Free-form description, copied verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<serde_json::Value>,
    /// Upstream-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Magnetic heading, copied verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magvar: Option<serde_json::Value>,
    /// Road classification, copied verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub road_type: Option<serde_json::Value>,
    /// Reporter name, copied verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_by: Option<serde_json::Value>,
}

impl Incident {
    /// Creates an incident at the given location with every other field
    /// at its default.
    #[must_use]
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            incident_type: UNKNOWN_TYPE.to_string(),
            subtype: String::new(),
            street: String::new(),
            city: String::new(),
            country: String::new(),
            reliability: 0,
            report_rating: 0,
            pub_millis: 0,
            timestamp: None,
            description: None,
            uuid: None,
            magvar: None,
            road_type: None,
            report_by: None,
        }
    }

    /// Returns the stable identity key used for duplicate detection.
    ///
    /// Precedence: a non-empty `uuid`, then location + type + publication
    /// time, then location + type + street. Coordinates are rounded to
    /// [`KEY_COORD_PRECISION`] decimal places so that jitter between
    /// repeated observations of the same event does not split it.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        if let Some(uuid) = self.uuid.as_deref().filter(|u| !u.is_empty()) {
            return format!("uuid:{uuid}");
        }

        let lat = round_coord(self.lat);
        let lng = round_coord(self.lng);

        if self.pub_millis != 0 {
            format!(
                "loc:{lat}:{lng}:type:{}:time:{}",
                self.incident_type, self.pub_millis
            )
        } else {
            format!(
                "loc:{lat}:{lng}:type:{}:street:{}",
                self.incident_type, self.street
            )
        }
    }

    /// Returns the publication instant, applying the seconds/milliseconds
    /// heuristic to [`Self::pub_millis`].
    #[must_use]
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_datetime(self.pub_millis)
    }
}

/// Scales a seconds-since-epoch value to milliseconds. Values at or
/// above [`SECONDS_THRESHOLD`] are assumed to already be milliseconds.
#[must_use]
pub const fn normalize_epoch_millis(raw: i64) -> i64 {
    if raw < SECONDS_THRESHOLD {
        raw.saturating_mul(1000)
    } else {
        raw
    }
}

/// Converts a raw epoch value (seconds or milliseconds) to a UTC instant.
///
/// Returns `None` for `0` and for values outside chrono's representable
/// range.
#[must_use]
pub fn epoch_to_datetime(raw: i64) -> Option<DateTime<Utc>> {
    if raw == 0 {
        return None;
    }
    DateTime::from_timestamp_millis(normalize_epoch_millis(raw))
}

/// Formats an instant the way incidents and statistics render it
/// (`2023-11-14T22:13:20Z`).
#[must_use]
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Rounds to [`KEY_COORD_PRECISION`] places, folding `-0.0` into `0.0`.
fn round_coord(value: f64) -> f64 {
    let scale = 10f64.powi(KEY_COORD_PRECISION);
    (value * scale).round() / scale + 0.0
}

fn unknown_type() -> String {
    UNKNOWN_TYPE.to_string()
}

fn type_or_unknown<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(unknown_type))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
