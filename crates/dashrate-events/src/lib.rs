#![forbid(unsafe_code)]

//! Event bus shared by the decision engine and the playback simulation.

mod abr;
mod bus;
mod event;
mod playback;

pub use abr::AbrEvent;
pub use bus::{EventBus, drain_ready};
pub use event::Event;
pub use playback::PlaybackEvent;
