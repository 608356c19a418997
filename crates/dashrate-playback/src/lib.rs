//! Playback simulation for dashrate.
//!
//! - [`PlaybackBuffer`]: producer/consumer buffer drained by a clock task.
//! - [`Session`]: per-segment loop that asks the [`AbrEngine`](dashrate_abr::AbrEngine)
//!   for a decision, downloads through a [`SegmentFetcher`] and feeds the buffer.
//! - [`SimulatedFetcher`]: bandwidth-schedule network emulation.
//! - [`SessionStats`]: QoE summary (shifts, stalls, per-segment records).

#![forbid(unsafe_code)]

mod buffer;
mod error;
mod fetch;
mod session;
mod sim;
mod stats;

pub use buffer::{BufferConfig, BufferStats, BufferedSegment, PlaybackBuffer};
pub use error::{FetchError, PlaybackError, PlaybackResult};
pub use fetch::{FetchedSegment, SegmentFetcher, SegmentRequest};
pub use session::{Session, SessionCommand, SessionConfig, SessionHandle};
pub use sim::SimulatedFetcher;
pub use stats::{SegmentRecord, SessionStats};
