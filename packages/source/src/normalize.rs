//! Alert normalization.
//!
//! Turns a decoded upstream payload into a lazy stream of canonical
//! [`Incident`]s. Alerts without a usable coordinate pair are filtered
//! out, they never surface as errors.

use serde_json::{Map, Value};
use traffic_incidents_incident_models::{Incident, epoch_to_datetime, format_timestamp};

use crate::parsing::{
    first_non_null, first_present, first_text, present, to_epoch, to_f64, to_i64,
};

/// Latitude keys inside a nested `location` object.
const NESTED_LAT: &[&str] = &["y", "latitude", "lat"];
/// Longitude keys inside a nested `location` object.
const NESTED_LNG: &[&str] = &["x", "longitude", "lng", "lon"];
/// Latitude keys directly on the alert.
const FLAT_LAT: &[&str] = &["lat", "latitude", "y"];
/// Longitude keys directly on the alert.
const FLAT_LNG: &[&str] = &["lng", "longitude", "lon", "x"];

/// Fields copied onto the incident untouched when present.
const PASS_THROUGH: [&str; 4] = ["description", "magvar", "roadType", "reportBy"];

/// Locates the alert array in an upstream payload.
///
/// Accepts `{"alerts": [...]}`, `{"data": {"alerts": [...]}}`,
/// `{"items": [...]}`, or a bare array. Anything else yields no alerts.
#[must_use]
pub fn alerts(payload: &Value) -> &[Value] {
    let found = match payload {
        Value::Array(items) => return items,
        Value::Object(map) => map
            .get("alerts")
            .or_else(|| map.get("data").and_then(|data| data.get("alerts")))
            .or_else(|| map.get("items")),
        _ => None,
    };
    found.and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

/// Normalizes every alert in the payload, preserving upstream order.
///
/// The returned iterator borrows the payload and does its work lazily;
/// alerts that cannot be located are skipped.
pub fn normalize(payload: &Value) -> impl Iterator<Item = Incident> + '_ {
    alerts(payload).iter().filter_map(normalize_alert)
}

/// Normalizes one raw alert, returning `None` if it is not an object or
/// has no resolvable finite coordinates.
#[must_use]
pub fn normalize_alert(alert: &Value) -> Option<Incident> {
    let alert = alert.as_object()?;
    let (lat, lng) = extract_location(alert)?;

    let pub_millis = first_non_null(alert, &["pubMillis", "pub_millis", "timestamp"])
        .and_then(to_epoch)
        .unwrap_or(0);
    let timestamp = epoch_to_datetime(pub_millis).map(|dt| format_timestamp(&dt));

    let int_field = |fields: &[&str]| first_non_null(alert, fields).and_then(to_i64).unwrap_or(0);
    let text_field = |fields: &[&str]| first_text(alert, fields).unwrap_or_default();
    let pass_through = |field: &str| alert.get(field).filter(|v| !v.is_null()).cloned();

    let mut incident = Incident::at(lat, lng);
    if let Some(incident_type) = first_text(alert, &["type", "alertType"]) {
        incident.incident_type = incident_type;
    }
    incident.subtype = text_field(&["subtype", "alertSubtype"]);
    incident.street = text_field(&["street"]);
    incident.city = text_field(&["city"]);
    incident.country = text_field(&["country"]);
    incident.reliability = int_field(&["reliability", "confidence"]);
    incident.report_rating = int_field(&["reportRating", "report_rating"]);
    incident.pub_millis = pub_millis;
    incident.timestamp = timestamp;
    incident.uuid = first_text(alert, &["uuid"]);

    let [description, magvar, road_type, report_by] = PASS_THROUGH.map(pass_through);
    incident.description = description;
    incident.magvar = magvar;
    incident.road_type = road_type;
    incident.report_by = report_by;

    Some(incident)
}

/// Resolves `(lat, lng)` from the first location shape that yields both
/// coordinates, then converts them. A pair that is found but does not
/// convert rejects the alert rather than falling through to later
/// shapes.
fn extract_location(alert: &Map<String, Value>) -> Option<(f64, f64)> {
    let nested = alert
        .get("location")
        .and_then(Value::as_object)
        .and_then(|location| raw_pair(location, NESTED_LAT, NESTED_LNG));

    let (lat, lng) = nested
        .or_else(|| raw_pair(alert, FLAT_LAT, FLAT_LNG))
        .or_else(|| coordinate_array(alert))?;

    Some((to_f64(lat)?, to_f64(lng)?))
}

fn raw_pair<'a>(
    record: &'a Map<String, Value>,
    lat_fields: &[&str],
    lng_fields: &[&str],
) -> Option<(&'a Value, &'a Value)> {
    Some((
        first_present(record, lat_fields)?,
        first_present(record, lng_fields)?,
    ))
}

/// `coordinates: [lng, lat]`.
fn coordinate_array(alert: &Map<String, Value>) -> Option<(&Value, &Value)> {
    let coords = alert.get("coordinates")?.as_array()?;
    let lng = present(coords.first()?)?;
    let lat = present(coords.get(1)?)?;
    Some((lat, lng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use traffic_incidents_incident_models::UNKNOWN_TYPE;

    fn single(alert: Value) -> Option<Incident> {
        normalize_alert(&alert)
    }

    #[test]
    fn finds_alerts_in_every_payload_shape() {
        let alert = json!({"lat": 1.0, "lng": 2.0});
        assert_eq!(alerts(&json!({"alerts": [alert.clone()]})).len(), 1);
        assert_eq!(alerts(&json!({"data": {"alerts": [alert.clone()]}})).len(), 1);
        assert_eq!(alerts(&json!({"items": [alert.clone(), alert.clone()]})).len(), 2);
        assert_eq!(alerts(&json!([alert])).len(), 1);
        assert!(alerts(&json!({"jams": []})).is_empty());
        assert!(alerts(&json!("nope")).is_empty());
    }

    #[test]
    fn reads_nested_location_object() {
        let incident = single(json!({"location": {"x": -73.98, "y": 40.75}})).unwrap();
        assert!((incident.lat - 40.75).abs() < f64::EPSILON);
        assert!((incident.lng - -73.98).abs() < f64::EPSILON);
    }

    #[test]
    fn reads_flat_string_coordinates() {
        let incident = single(json!({"latitude": "40.75", "lon": "-73.98"})).unwrap();
        assert!((incident.lat - 40.75).abs() < f64::EPSILON);
        assert!((incident.lng - -73.98).abs() < f64::EPSILON);
    }

    #[test]
    fn reads_coordinate_array_as_lng_lat() {
        let incident = single(json!({"coordinates": [-73.98, 40.75]})).unwrap();
        assert!((incident.lat - 40.75).abs() < f64::EPSILON);
        assert!((incident.lng - -73.98).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_nested_location_falls_back_to_flat_fields() {
        let incident = single(json!({"location": {"y": 10.0}, "lat": 1.0, "lng": 2.0})).unwrap();
        assert!((incident.lat - 1.0).abs() < f64::EPSILON);
        assert!((incident.lng - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_alerts_without_coordinates() {
        assert!(single(json!({"type": "JAM", "street": "Main St"})).is_none());
        assert!(single(json!({"lat": 40.0})).is_none());
        assert!(single(json!({"lat": "abc", "lng": "def"})).is_none());
        assert!(single(json!({"coordinates": [1.0]})).is_none());
        assert!(single(json!("not an alert")).is_none());
    }

    #[test]
    fn applies_field_fallbacks() {
        let incident = single(json!({
            "lat": 1.0,
            "lng": 2.0,
            "alertType": "HAZARD",
            "confidence": 4,
            "report_rating": 2,
            "pub_millis": 1_700_000_000_000_i64,
        }))
        .unwrap();
        assert_eq!(incident.incident_type, "HAZARD");
        assert_eq!(incident.reliability, 4);
        assert_eq!(incident.report_rating, 2);
        assert_eq!(incident.pub_millis, 1_700_000_000_000);
        assert_eq!(incident.timestamp.as_deref(), Some("2023-11-14T22:13:20Z"));
    }

    #[test]
    fn defaults_missing_fields() {
        let incident = single(json!({"lat": 1.0, "lng": 2.0})).unwrap();
        assert_eq!(incident.incident_type, UNKNOWN_TYPE);
        assert_eq!(incident.subtype, "");
        assert_eq!(incident.reliability, 0);
        assert_eq!(incident.pub_millis, 0);
        assert!(incident.timestamp.is_none());
        assert!(incident.uuid.is_none());
    }

    #[test]
    fn seconds_scale_timestamps_match_millisecond_scale() {
        let seconds = single(json!({"lat": 1.0, "lng": 2.0, "pubMillis": 1_700_000_000})).unwrap();
        let millis =
            single(json!({"lat": 1.0, "lng": 2.0, "pubMillis": 1_700_000_000_000_i64})).unwrap();
        assert_eq!(seconds.pub_millis, 1_700_000_000);
        assert_eq!(seconds.timestamp, millis.timestamp);
        assert!(seconds.timestamp.is_some());
    }

    #[test]
    fn unparsable_time_keeps_record_without_timestamp() {
        let incident = single(json!({"lat": 1.0, "lng": 2.0, "pubMillis": "soon"})).unwrap();
        assert_eq!(incident.pub_millis, 0);
        assert!(incident.timestamp.is_none());
    }

    #[test]
    fn copies_pass_through_fields() {
        let incident = single(json!({
            "lat": 1.0,
            "lng": 2.0,
            "uuid": "u-1",
            "description": "Crash on ramp",
            "magvar": 270,
            "roadType": 3,
            "reportBy": "driver",
        }))
        .unwrap();
        assert_eq!(incident.uuid.as_deref(), Some("u-1"));
        assert_eq!(incident.description, Some(json!("Crash on ramp")));
        assert_eq!(incident.magvar, Some(json!(270)));
        assert_eq!(incident.road_type, Some(json!(3)));
        assert_eq!(incident.report_by, Some(json!("driver")));
    }

    #[test]
    fn preserves_order_and_skips_unlocatable_alerts() {
        let payload = json!({"alerts": [
            {"uuid": "a", "lat": 1.0, "lng": 1.0},
            {"uuid": "b"},
            {"uuid": "c", "location": {"x": 3.0, "y": 3.0}},
        ]});
        let uuids: Vec<_> = normalize(&payload).filter_map(|i| i.uuid).collect();
        assert_eq!(uuids, vec!["a", "c"]);
    }
}
