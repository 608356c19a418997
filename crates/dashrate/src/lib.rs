#![forbid(unsafe_code)]

//! # dashrate
//!
//! Facade crate for adaptive bitrate selection over segmented media.
//!
//! ## Quick start
//!
//! ```ignore
//! use dashrate::prelude::*;
//!
//! let table = QualityTable::builder()
//!     .family(FamilyId::new(4), Ladder::new(vec![500_000, 1_000_000, 2_000_000])?)
//!     .build()?;
//! let stats = dashrate::simulate(
//!     Arc::new(table),
//!     AbrOptions::default(),
//!     SessionConfig::default().with_segment_count(60),
//!     vec![4_000_000],
//! )
//! .await?;
//! println!("{} up-shifts", stats.up_shifts);
//! ```

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod abr {
    pub use dashrate_abr::*;
}

pub mod events {
    pub use dashrate_events::*;
}

pub mod playback {
    pub use dashrate_playback::*;
}

// ── Simulation ──────────────────────────────────────────────────────────

mod simulate;

pub use simulate::{simulate, simulate_with_estimator};

// ── Prelude ─────────────────────────────────────────────────────────────

pub mod prelude {
    pub use std::sync::Arc;

    pub use dashrate_abr::{
        AbrEngine, AbrOptions, BolaMode, BolaOptions, BufferSnapshot, Decision, DecisionReason,
        FamilyId, Ladder, MedusaOptions, PlaybackState, QualitySource, QualityTable,
        RefineOptions, SegmentMetrics, SharedQualitySource, Strategy,
    };
    pub use dashrate_events::{AbrEvent, Event, EventBus, PlaybackEvent};
    pub use dashrate_playback::{
        BufferConfig, PlaybackError, PlaybackResult, SegmentFetcher, Session, SessionConfig,
        SessionHandle, SessionStats, SimulatedFetcher,
    };
}
