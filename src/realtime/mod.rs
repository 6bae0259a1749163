//! GTFS-Realtime interpretation on top of the [`wire`](crate::wire) walker.
//!
//! Field numbers follow `gtfs-realtime.proto`. Each message level is a small
//! function dispatching on `(field, wire type)`; anything else is skipped so
//! fields added upstream never break decoding.

mod record;
mod trip_updates;
mod vehicle_positions;

use std::collections::HashSet;

pub use record::{
    DESTINATION_HORIZON_MINUTES, ETA_HORIZON_MINUTES, RecordContext, VehicleRecord,
    VehicleResponse, assemble_record,
};
pub use trip_updates::{
    StopTimeUpdate, Terminus, TripEstimates, TripUpdate, decode_trip_updates, estimate_trips,
    extract_trip_estimates,
};
pub use vehicle_positions::{
    VehiclePosition, VehicleStopStatus, decode_vehicle_positions, extract_vehicles,
};

use crate::wire::{DecodeError, WireType, walk_message};

/// `FeedMessage.entity`
const FEED_ENTITY: u32 = 2;

/// Optional allow-list of line designators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineFilter {
    allowed: Option<HashSet<String>>,
}

impl LineFilter {
    /// Accepts every line.
    pub fn any() -> Self {
        Self::default()
    }

    /// Accepts only the given lines. An empty list accepts every line.
    pub fn only<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: HashSet<String> = lines.into_iter().map(Into::into).collect();
        Self {
            allowed: (!allowed.is_empty()).then_some(allowed),
        }
    }

    pub fn allows(&self, line: &str) -> bool {
        self.allowed
            .as_ref()
            .is_none_or(|allowed| allowed.contains(line))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TripDescriptor {
    trip_id: String,
    route_id: String,
}

fn parse_trip_descriptor(buf: &[u8]) -> Result<TripDescriptor, DecodeError> {
    let mut descriptor = TripDescriptor::default();
    walk_message(buf, |tag, cursor| {
        match (tag.field, tag.wire) {
            (1, WireType::LengthDelimited) => descriptor.trip_id = cursor.read_string()?,
            (5, WireType::LengthDelimited) => descriptor.route_id = cursor.read_string()?,
            _ => cursor.skip_field(tag.wire)?,
        }
        Ok(())
    })?;
    Ok(descriptor)
}

/// Calls `on_entity` with the payload of every `FeedEntity` in a feed.
fn for_each_entity<'a, F>(feed: &'a [u8], mut on_entity: F) -> Result<(), DecodeError>
where
    F: FnMut(&'a [u8]) -> Result<(), DecodeError>,
{
    walk_message(feed, |tag, cursor| match (tag.field, tag.wire) {
        (FEED_ENTITY, WireType::LengthDelimited) => on_entity(cursor.read_length_delimited()?),
        _ => cursor.skip_field(tag.wire),
    })
}
