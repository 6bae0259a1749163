use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::{LineFilter, for_each_entity, parse_trip_descriptor};
use crate::lookup::TripLineMap;
use crate::wire::{DecodeError, WireType, walk_message};

/// One stop visit of a trip. Times are epoch seconds, `0` when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopTimeUpdate {
    pub stop_id: String,
    pub arrival_time: i64,
    pub departure_time: i64,
}

impl StopTimeUpdate {
    /// Arrival time, or departure time when arrival is absent; `None` unless positive.
    pub fn event_time(&self) -> Option<i64> {
        let time = if self.arrival_time != 0 {
            self.arrival_time
        } else {
            self.departure_time
        };
        (time > 0).then_some(time)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripUpdate {
    pub trip_id: String,
    /// In feed order, which is not necessarily stop sequence order.
    pub stop_time_updates: Vec<StopTimeUpdate>,
}

/// Last stop on a trip that the realtime feed gives a usable time for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminus {
    pub stop_id: String,
    pub time: i64,
}

/// Per-trip realtime estimates derived from a TripUpdates feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripEstimates {
    /// trip id → time at the first matching home stop.
    pub etas: HashMap<String, i64>,
    /// trip id → positionally last timed stop.
    pub termini: HashMap<String, Terminus>,
}

/// Decodes every `TripUpdate` entity in a TripUpdates feed.
pub fn decode_trip_updates(feed: &[u8]) -> Result<Vec<TripUpdate>, DecodeError> {
    let mut updates = Vec::new();
    for_each_entity(feed, |entity| {
        walk_message(entity, |tag, cursor| {
            match (tag.field, tag.wire) {
                (3, WireType::LengthDelimited) => {
                    updates.push(parse_trip_update(cursor.read_length_delimited()?)?)
                }
                _ => cursor.skip_field(tag.wire)?,
            }
            Ok(())
        })
    })?;
    Ok(updates)
}

fn parse_trip_update(buf: &[u8]) -> Result<TripUpdate, DecodeError> {
    let mut update = TripUpdate::default();
    walk_message(buf, |tag, cursor| {
        match (tag.field, tag.wire) {
            (1, WireType::LengthDelimited) => {
                update.trip_id = parse_trip_descriptor(cursor.read_length_delimited()?)?.trip_id
            }
            (2, WireType::LengthDelimited) => update
                .stop_time_updates
                .push(parse_stop_time_update(cursor.read_length_delimited()?)?),
            _ => cursor.skip_field(tag.wire)?,
        }
        Ok(())
    })?;
    Ok(update)
}

fn parse_stop_time_update(buf: &[u8]) -> Result<StopTimeUpdate, DecodeError> {
    let mut stu = StopTimeUpdate::default();
    walk_message(buf, |tag, cursor| {
        match (tag.field, tag.wire) {
            (4, WireType::LengthDelimited) => stu.stop_id = cursor.read_string()?,
            (2, WireType::LengthDelimited) => {
                stu.arrival_time = parse_event_time(cursor.read_length_delimited()?)?
            }
            (3, WireType::LengthDelimited) => {
                stu.departure_time = parse_event_time(cursor.read_length_delimited()?)?
            }
            _ => cursor.skip_field(tag.wire)?,
        }
        Ok(())
    })?;
    Ok(stu)
}

/// `StopTimeEvent.time`; `int64` on the wire, so reinterpret the varint.
fn parse_event_time(buf: &[u8]) -> Result<i64, DecodeError> {
    let mut time = 0;
    walk_message(buf, |tag, cursor| {
        match (tag.field, tag.wire) {
            (2, WireType::Varint) => time = cursor.read_varint()? as i64,
            _ => cursor.skip_field(tag.wire)?,
        }
        Ok(())
    })?;
    Ok(time)
}

/// Computes ETAs at `home_stops` and termini for trips whose line resolves
/// through `trip_lines` and passes `filter`.
///
/// TripUpdates carry no route id, so trips absent from the map are skipped.
pub fn estimate_trips(
    updates: &[TripUpdate],
    trip_lines: &TripLineMap,
    home_stops: &HashSet<String>,
    filter: &LineFilter,
) -> TripEstimates {
    let mut estimates = TripEstimates::default();

    for update in updates {
        let Some(entry) = trip_lines.resolve(&update.trip_id, None) else {
            continue;
        };
        if !filter.allows(&entry.line) {
            continue;
        }

        let mut terminus = None;
        for stu in &update.stop_time_updates {
            let Some(time) = stu.event_time() else {
                continue;
            };
            if home_stops.contains(&stu.stop_id) {
                estimates.etas.entry(update.trip_id.clone()).or_insert(time);
            }
            if !stu.stop_id.is_empty() {
                terminus = Some(Terminus {
                    stop_id: stu.stop_id.clone(),
                    time,
                });
            }
        }

        if let Some(terminus) = terminus {
            estimates.termini.insert(update.trip_id.clone(), terminus);
        }
    }

    estimates
}

/// Decodes a TripUpdates feed and derives [`TripEstimates`] from it.
pub fn extract_trip_estimates(
    feed: &[u8],
    trip_lines: &TripLineMap,
    home_stops: &HashSet<String>,
    filter: &LineFilter,
) -> Result<TripEstimates, DecodeError> {
    let updates = decode_trip_updates(feed)?;
    let estimates = estimate_trips(&updates, trip_lines, home_stops, filter);
    debug!(
        trip_updates = updates.len(),
        etas = estimates.etas.len(),
        termini = estimates.termini.len(),
        "Trip updates extracted"
    );
    Ok(estimates)
}
