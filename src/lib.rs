pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod lookup;
pub mod output;
pub mod pipeline;
pub mod realtime;
pub mod stats;
pub mod wire;

/// Prost types for `proto/gtfs-realtime.proto`, used to encode feed fixtures.
pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
