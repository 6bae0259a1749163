//! Static lookups consumed by the realtime extractors.

pub mod stop_directory;
pub mod trip_lines;

pub use stop_directory::{StopDirectory, StopNameIndex, gtfs_stop_ids};
pub use trip_lines::{TripLineEntry, TripLineMap, line_from_route_id};
