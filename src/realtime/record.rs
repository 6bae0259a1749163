use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use super::{LineFilter, TripEstimates, VehiclePosition, VehicleStopStatus};
use crate::lookup::{StopNameIndex, TripLineMap};

/// Largest ETA, in whole minutes from now, that is surfaced on a record.
pub const ETA_HORIZON_MINUTES: i64 = 120;
/// Largest time to terminus, in whole minutes from now, that is surfaced.
pub const DESTINATION_HORIZON_MINUTES: i64 = 180;

/// One vehicle as handed to display clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRecord {
    pub id: String,
    pub line: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    pub status: VehicleStopStatus,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleResponse {
    /// Request time, epoch seconds.
    pub timestamp: i64,
    pub vehicles: Vec<VehicleRecord>,
}

/// Everything record assembly reads besides the position itself.
#[derive(Debug, Clone, Copy)]
pub struct RecordContext<'a> {
    pub trip_lines: &'a TripLineMap,
    pub estimates: &'a TripEstimates,
    pub stop_names: &'a StopNameIndex,
    pub filter: &'a LineFilter,
    pub now: DateTime<Utc>,
    pub timezone: Tz,
}

impl RecordContext<'_> {
    fn minutes_until(&self, epoch: i64) -> i64 {
        ((epoch - self.now.timestamp()) as f64 / 60.0).round() as i64
    }

    fn wall_clock(&self, epoch: i64) -> Option<String> {
        self.timezone
            .timestamp_opt(epoch, 0)
            .single()
            .map(|time| time.format("%H:%M").to_string())
    }
}

fn round_to(value: f32, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (f64::from(value) * scale).round() / scale
}

/// Builds the output record for one vehicle, or `None` if its line cannot be
/// resolved or is filtered out.
pub fn assemble_record(
    position: &VehiclePosition,
    ctx: &RecordContext<'_>,
) -> Option<VehicleRecord> {
    let route_id = Some(position.route_id.as_str()).filter(|r| !r.is_empty());
    let entry = ctx.trip_lines.resolve(&position.trip_id, route_id)?;
    if entry.line.is_empty() || !ctx.filter.allows(&entry.line) {
        return None;
    }

    let id = if position.vehicle_id.is_empty() {
        position.entity_id.clone()
    } else {
        position.vehicle_id.clone()
    };

    let mut record = VehicleRecord {
        id,
        line: entry.line,
        lat: round_to(position.latitude, 6),
        lon: round_to(position.longitude, 6),
        bearing: position.bearing.map(|b| round_to(b, 1)),
        speed: position.speed.map(|s| round_to(s, 2)),
        status: position.status,
        timestamp: position.timestamp,
        eta_minutes: None,
        eta_time: None,
        destination: entry.destination,
        dest_minutes: None,
        dest_time: None,
    };

    if let Some(&eta) = ctx.estimates.etas.get(&position.trip_id) {
        let minutes = ctx.minutes_until(eta);
        if (0..=ETA_HORIZON_MINUTES).contains(&minutes) {
            record.eta_minutes = Some(minutes);
            record.eta_time = ctx.wall_clock(eta);
        }
    }

    if let Some(terminus) = ctx.estimates.termini.get(&position.trip_id) {
        let minutes = ctx.minutes_until(terminus.time);
        if (0..=DESTINATION_HORIZON_MINUTES).contains(&minutes) {
            record.dest_minutes = Some(minutes);
            record.dest_time = ctx.wall_clock(terminus.time);
        }
        if record.destination.is_none() {
            record.destination = ctx.stop_names.get(&terminus.stop_id).map(str::to_string);
        }
    }

    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::Terminus;

    const NOW: i64 = 1_773_500_000;

    fn position(trip_id: &str) -> VehiclePosition {
        VehiclePosition {
            entity_id: "e1".to_string(),
            trip_id: trip_id.to_string(),
            route_id: String::new(),
            latitude: 59.3,
            longitude: 18.0,
            bearing: Some(123.456),
            speed: Some(7.891),
            status: VehicleStopStatus::StoppedAt,
            timestamp: NOW as u64,
            vehicle_id: "v1".to_string(),
        }
    }

    struct Fixture {
        trip_lines: TripLineMap,
        estimates: TripEstimates,
        stop_names: StopNameIndex,
        filter: LineFilter,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                trip_lines: [("T1", "4|Danderyd"), ("T2", "6")].into_iter().collect(),
                estimates: TripEstimates::default(),
                stop_names: [("s9", "Ropsten")].into_iter().collect(),
                filter: LineFilter::any(),
            }
        }

        fn ctx(&self) -> RecordContext<'_> {
            RecordContext {
                trip_lines: &self.trip_lines,
                estimates: &self.estimates,
                stop_names: &self.stop_names,
                filter: &self.filter,
                now: DateTime::from_timestamp(NOW, 0).unwrap(),
                timezone: chrono_tz::Europe::Stockholm,
            }
        }
    }

    #[test]
    fn test_rounding_applied_at_assembly() {
        let fx = Fixture::new();
        let record = assemble_record(&position("T1"), &fx.ctx()).unwrap();

        // 59.3 as f32 widens to 59.29999923..., which rounds down at six places.
        assert_eq!(record.lat, 59.299999);
        assert_eq!(record.lon, 18.0);
        assert_eq!(record.bearing, Some(123.5));
        assert_eq!(record.speed, Some(7.89));
    }

    #[test]
    fn test_unresolved_line_is_dropped() {
        let fx = Fixture::new();
        assert!(assemble_record(&position("T404"), &fx.ctx()).is_none());
    }

    #[test]
    fn test_route_fallback_resolves_line() {
        let fx = Fixture::new();
        let mut vp = position("unknown");
        vp.route_id = "9011001001720000".to_string();
        let record = assemble_record(&vp, &fx.ctx()).unwrap();
        assert_eq!(record.line, "172");
        assert_eq!(record.destination, None);
    }

    #[test]
    fn test_filter_drops_other_lines() {
        let mut fx = Fixture::new();
        fx.filter = LineFilter::only(["6"]);
        assert!(assemble_record(&position("T1"), &fx.ctx()).is_none());
        assert!(assemble_record(&position("T2"), &fx.ctx()).is_some());
    }

    #[test]
    fn test_id_falls_back_to_entity_id() {
        let fx = Fixture::new();
        let mut vp = position("T1");
        vp.vehicle_id.clear();
        assert_eq!(assemble_record(&vp, &fx.ctx()).unwrap().id, "e1");
    }

    #[test]
    fn test_eta_window_bounds() {
        for (offset, expected) in [(-60, None), (0, Some(0)), (7200, Some(120)), (7260, None)] {
            let mut fx = Fixture::new();
            fx.estimates.etas.insert("T1".to_string(), NOW + offset);
            let record = assemble_record(&position("T1"), &fx.ctx()).unwrap();
            assert_eq!(record.eta_minutes, expected, "offset {offset}");
            assert_eq!(record.eta_time.is_some(), expected.is_some());
        }
    }

    #[test]
    fn test_eta_time_is_local_wall_clock() {
        let mut fx = Fixture::new();
        // 2026-03-14 15:00 UTC is 16:00 in Stockholm (CET).
        let eta = 1_773_500_400;
        fx.estimates.etas.insert("T1".to_string(), eta);
        let mut ctx = fx.ctx();
        ctx.now = DateTime::from_timestamp(eta - 600, 0).unwrap();

        let record = assemble_record(&position("T1"), &ctx).unwrap();
        assert_eq!(record.eta_minutes, Some(10));
        assert_eq!(record.eta_time.as_deref(), Some("16:00"));
    }

    #[test]
    fn test_destination_window_bounds() {
        for (offset, expected) in [(-120, None), (10800, Some(180)), (10860, None)] {
            let mut fx = Fixture::new();
            fx.estimates.termini.insert(
                "T2".to_string(),
                Terminus {
                    stop_id: "s9".to_string(),
                    time: NOW + offset,
                },
            );
            let record = assemble_record(&position("T2"), &fx.ctx()).unwrap();
            assert_eq!(record.dest_minutes, expected, "offset {offset}");
            assert_eq!(record.destination.as_deref(), Some("Ropsten"));
        }
    }

    #[test]
    fn test_static_destination_wins_over_terminus_name() {
        let mut fx = Fixture::new();
        fx.estimates.termini.insert(
            "T1".to_string(),
            Terminus {
                stop_id: "s9".to_string(),
                time: NOW + 600,
            },
        );
        let record = assemble_record(&position("T1"), &fx.ctx()).unwrap();
        assert_eq!(record.destination.as_deref(), Some("Danderyd"));
        assert_eq!(record.dest_minutes, Some(10));
    }

    #[test]
    fn test_optional_fields_omitted_from_json() {
        let fx = Fixture::new();
        let mut vp = position("T2");
        vp.bearing = None;
        vp.speed = None;
        let json = serde_json::to_value(assemble_record(&vp, &fx.ctx()).unwrap()).unwrap();

        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 6);
        for key in ["id", "line", "lat", "lon", "status", "timestamp"] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(json["status"], "STOPPED_AT");
    }
}
