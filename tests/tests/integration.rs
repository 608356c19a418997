//! All integration tests for dashrate
#![expect(
    clippy::unwrap_used,
    reason = "integration test crate, unwraps are acceptable in test code"
)]

mod common;
mod dashrate_abr;
mod dashrate_events;
mod dashrate_playback;
