// Ingest side: frame normalization, drop-oldest queueing and activity detection,
// plus the built-in frame sources (UDP listener, pattern generator).

pub mod activity;
pub mod buffer;
pub mod frame;
pub mod generator;
pub mod udp_source;
