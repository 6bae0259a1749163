use serde::Serialize;
use tracing::debug;

use super::{RecordContext, VehicleRecord, assemble_record, for_each_entity, parse_trip_descriptor};
use crate::wire::{DecodeError, WireType, walk_message};

/// `VehiclePosition.current_status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStopStatus {
    IncomingAt,
    StoppedAt,
    #[default]
    InTransitTo,
}

impl VehicleStopStatus {
    /// Maps the wire value; values outside the enum read as `InTransitTo`.
    pub fn from_wire(value: u64) -> Self {
        match value {
            0 => Self::IncomingAt,
            1 => Self::StoppedAt,
            _ => Self::InTransitTo,
        }
    }
}

/// Decoded fields of one `vehicle` entity, at full precision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehiclePosition {
    pub entity_id: String,
    pub trip_id: String,
    pub route_id: String,
    pub latitude: f32,
    pub longitude: f32,
    pub bearing: Option<f32>,
    pub speed: Option<f32>,
    pub status: VehicleStopStatus,
    pub timestamp: u64,
    pub vehicle_id: String,
}

/// Decodes every entity carrying a non-empty `vehicle` message.
pub fn decode_vehicle_positions(feed: &[u8]) -> Result<Vec<VehiclePosition>, DecodeError> {
    let mut positions = Vec::new();
    for_each_entity(feed, |entity| {
        let mut entity_id = String::new();
        let mut vehicle: Option<&[u8]> = None;
        walk_message(entity, |tag, cursor| {
            match (tag.field, tag.wire) {
                (1, WireType::LengthDelimited) => entity_id = cursor.read_string()?,
                (4, WireType::LengthDelimited) => vehicle = Some(cursor.read_length_delimited()?),
                _ => cursor.skip_field(tag.wire)?,
            }
            Ok(())
        })?;

        if let Some(buf) = vehicle.filter(|buf| !buf.is_empty()) {
            let mut position = parse_vehicle_position(buf)?;
            position.entity_id = entity_id;
            positions.push(position);
        }
        Ok(())
    })?;
    Ok(positions)
}

fn parse_vehicle_position(buf: &[u8]) -> Result<VehiclePosition, DecodeError> {
    let mut vp = VehiclePosition::default();
    walk_message(buf, |tag, cursor| {
        match (tag.field, tag.wire) {
            (1, WireType::LengthDelimited) => {
                let trip = parse_trip_descriptor(cursor.read_length_delimited()?)?;
                vp.trip_id = trip.trip_id;
                vp.route_id = trip.route_id;
            }
            (2, WireType::LengthDelimited) => {
                parse_position(cursor.read_length_delimited()?, &mut vp)?
            }
            (4, WireType::Varint) => {
                vp.status = VehicleStopStatus::from_wire(cursor.read_varint()?)
            }
            (5, WireType::Varint) => vp.timestamp = cursor.read_varint()?,
            (8, WireType::LengthDelimited) => {
                vp.vehicle_id = parse_vehicle_id(cursor.read_length_delimited()?)?
            }
            _ => cursor.skip_field(tag.wire)?,
        }
        Ok(())
    })?;
    Ok(vp)
}

fn parse_position(buf: &[u8], vp: &mut VehiclePosition) -> Result<(), DecodeError> {
    walk_message(buf, |tag, cursor| {
        match (tag.field, tag.wire) {
            (1, WireType::Fixed32) => vp.latitude = cursor.read_f32()?,
            (2, WireType::Fixed32) => vp.longitude = cursor.read_f32()?,
            (3, WireType::Fixed32) => vp.bearing = Some(cursor.read_f32()?),
            (5, WireType::Fixed32) => vp.speed = Some(cursor.read_f32()?),
            // odometer (4, fixed64) is not surfaced
            _ => cursor.skip_field(tag.wire)?,
        }
        Ok(())
    })
}

fn parse_vehicle_id(buf: &[u8]) -> Result<String, DecodeError> {
    let mut id = String::new();
    walk_message(buf, |tag, cursor| {
        match (tag.field, tag.wire) {
            (1, WireType::LengthDelimited) => id = cursor.read_string()?,
            _ => cursor.skip_field(tag.wire)?,
        }
        Ok(())
    })?;
    Ok(id)
}

/// Decodes a VehiclePositions feed into output records, dropping vehicles
/// whose line does not resolve or is filtered out.
pub fn extract_vehicles(
    feed: &[u8],
    ctx: &RecordContext<'_>,
) -> Result<Vec<VehicleRecord>, DecodeError> {
    let positions = decode_vehicle_positions(feed)?;
    let records: Vec<VehicleRecord> = positions
        .iter()
        .filter_map(|position| assemble_record(position, ctx))
        .collect();
    debug!(
        positions = positions.len(),
        vehicles = records.len(),
        "Vehicle positions extracted"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::{
        FeedEntity, FeedHeader, FeedMessage, Position, TripDescriptor, VehicleDescriptor,
        VehiclePosition as PbVehiclePosition,
    };
    use crate::lookup::{StopNameIndex, TripLineMap};
    use crate::realtime::{LineFilter, TripEstimates};
    use chrono::DateTime;
    use prost::Message;

    fn pb_vehicle(trip_id: &str, route_id: &str, status: Option<i32>) -> PbVehiclePosition {
        PbVehiclePosition {
            trip: Some(TripDescriptor {
                trip_id: Some(trip_id.to_string()),
                route_id: Some(route_id.to_string()),
                ..Default::default()
            }),
            position: Some(Position {
                latitude: 59.3,
                longitude: 18.0,
                bearing: Some(90.0),
                odometer: Some(12_345.5),
                speed: None,
            }),
            current_status: status,
            timestamp: Some(1_773_500_000),
            vehicle: Some(VehicleDescriptor {
                id: Some("9031001004505123".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn feed(vehicles: Vec<PbVehiclePosition>) -> Vec<u8> {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                ..Default::default()
            },
            entity: vehicles
                .into_iter()
                .enumerate()
                .map(|(i, vehicle)| FeedEntity {
                    id: format!("e{i}"),
                    vehicle: Some(vehicle),
                    ..Default::default()
                })
                .collect(),
        }
        .encode_to_vec()
    }

    #[test]
    fn test_decode_vehicle_fields() {
        let bytes = feed(vec![pb_vehicle("T1", "9011001004000000", Some(1))]);
        let positions = decode_vehicle_positions(&bytes).unwrap();

        assert_eq!(
            positions,
            vec![VehiclePosition {
                entity_id: "e0".to_string(),
                trip_id: "T1".to_string(),
                route_id: "9011001004000000".to_string(),
                latitude: 59.3,
                longitude: 18.0,
                bearing: Some(90.0),
                speed: None,
                status: VehicleStopStatus::StoppedAt,
                timestamp: 1_773_500_000,
                vehicle_id: "9031001004505123".to_string(),
            }]
        );
    }

    #[test]
    fn test_absent_status_defaults_to_in_transit() {
        let bytes = feed(vec![pb_vehicle("T1", "", None)]);
        let positions = decode_vehicle_positions(&bytes).unwrap();
        assert_eq!(positions[0].status, VehicleStopStatus::InTransitTo);
    }

    #[test]
    fn test_unknown_status_value_maps_to_in_transit() {
        assert_eq!(VehicleStopStatus::from_wire(7), VehicleStopStatus::InTransitTo);
        assert_eq!(VehicleStopStatus::from_wire(0), VehicleStopStatus::IncomingAt);
    }

    #[test]
    fn test_entities_without_vehicle_are_skipped() {
        let bytes = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                ..Default::default()
            },
            entity: vec![
                FeedEntity {
                    id: "deleted".to_string(),
                    is_deleted: Some(true),
                    ..Default::default()
                },
                FeedEntity {
                    id: "empty".to_string(),
                    vehicle: Some(PbVehiclePosition::default()),
                    ..Default::default()
                },
            ],
        }
        .encode_to_vec();

        assert!(decode_vehicle_positions(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_fields_do_not_change_result() {
        let plain = feed(vec![pb_vehicle("T1", "9011001004000000", Some(0))]);
        let mut extended = pb_vehicle("T1", "9011001004000000", Some(0));
        extended.current_stop_sequence = Some(12);
        extended.stop_id = Some("9022001040205001".to_string());
        extended.congestion_level = Some(1);
        extended.occupancy_percentage = Some(40);
        let extended = feed(vec![extended]);

        assert_ne!(plain, extended);
        assert_eq!(
            decode_vehicle_positions(&plain).unwrap(),
            decode_vehicle_positions(&extended).unwrap()
        );
    }

    #[test]
    fn test_extract_drops_unresolved_vehicles() {
        let bytes = feed(vec![
            pb_vehicle("T1", "", Some(0)),
            pb_vehicle("T2", "90110010", Some(0)),
        ]);
        let trip_lines: TripLineMap = [("T1", "4|Danderyd")].into_iter().collect();
        let estimates = TripEstimates::default();
        let stop_names = StopNameIndex::default();
        let filter = LineFilter::any();
        let ctx = RecordContext {
            trip_lines: &trip_lines,
            estimates: &estimates,
            stop_names: &stop_names,
            filter: &filter,
            now: DateTime::from_timestamp(1_773_500_000, 0).unwrap(),
            timezone: chrono_tz::Europe::Stockholm,
        };

        let records = extract_vehicles(&bytes, &ctx).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].line, "4");
        assert_eq!(records[0].status, VehicleStopStatus::IncomingAt);
    }

    #[test]
    fn test_length_past_end_is_decode_error() {
        // entity field, length 10, only 2 bytes follow
        let bytes = [0x12, 0x0a, 0x0a, 0x00];
        assert!(matches!(
            decode_vehicle_positions(&bytes),
            Err(DecodeError::LengthOutOfBounds { .. })
        ));
    }
}
