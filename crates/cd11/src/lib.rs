//! CD-1.1 seismic telemetry.
//!
//! Stations stream waveform data to a data center over TCP using CD-1.1
//! frames. This crate bundles the pieces needed on the receiving side.
//!
//! # Crate Structure
//!
//! - [`frame`]: frame model, CRC, and blocking/async stream framing
//! - [`station`]: connection broker and per-station data receivers (behind `station` feature)

/// Re-export frame types.
pub mod frame {
    pub use cd11_frame::*;
}

/// Re-export station service types (requires `station` feature).
#[cfg(feature = "station")]
pub mod station {
    pub use cd11_station::*;
}
