// Output side: fixed-rate scheduler, packet framing and the downstream transports.

pub mod scheduler;
pub mod sink;
pub mod transport;
