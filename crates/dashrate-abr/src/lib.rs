//! Adaptive bitrate decisions for segmented streaming.
//!
//! ## Strategies
//!
//! - **BOLA**: buffer-based Lyapunov controller over one family's ladder,
//!   with a startup phase that defers to throughput rate matching.
//! - **BOLA + MCOM refinement**: the BOLA pick is re-ranked across parallel
//!   encoding families at the same ladder position using VMAF and size.
//! - **MEDUSA**: joint optimizer over every (family, level) candidate with a
//!   buffer-weighted objective and a download-time feasibility gate.
//!
//! All state of one playback session lives in an [`AbrEngine`]; ladders and
//! per-segment metrics come from a [`QualitySource`].
//!
//! ## Example
//!
//! ```rust
//! use std::{sync::Arc, time::Duration};
//!
//! use dashrate_abr::{
//!     AbrEngine, AbrOptions, BufferSnapshot, FamilyId, Ladder, PlaybackState, QualityTable,
//! };
//! use web_time::Instant;
//!
//! let table = QualityTable::builder()
//!     .family(FamilyId::new(4), Ladder::new(vec![500_000, 1_000_000, 2_000_000])?)
//!     .build()?;
//! let mut engine = AbrEngine::new(Arc::new(table), AbrOptions::default())?;
//!
//! let buffer = BufferSnapshot {
//!     occupancy: 0,
//!     state: PlaybackState::InitialBuffering,
//!     segment_duration: Duration::from_secs(4),
//!     max_segments: Some(10),
//! };
//! let decision = engine.decide(0, &buffer, Instant::now());
//! assert_eq!(decision.level, 0);
//! # Ok::<(), dashrate_abr::AbrError>(())
//! ```

#![forbid(unsafe_code)]

mod bola;
mod engine;
mod error;
mod estimator;
mod ladder;
mod medusa;
mod quality;
mod refine;
mod types;

pub use bola::{BolaController, BolaMode, BolaOptions, BolaParams, BolaPhase, BolaPick};
pub use engine::{AbrEngine, AbrOptions, SharedQualitySource, Strategy};
pub use error::{AbrError, AbrResult};
pub use estimator::{Estimator, ThroughputEstimator, WindowEstimator};
pub use ladder::Ladder;
pub use medusa::{AlphaPolicy, JointOptimizer, JointPick, MedusaOptions};
pub use quality::{QualitySource, QualityTable, QualityTableBuilder, SegmentMetrics};
pub use refine::{RefineInput, RefineOptions, RefineRule, Refinement, Refiner};
pub use types::{
    BufferSnapshot, Decision, DecisionReason, FamilyId, PlaybackState, ThroughputSample,
    ThroughputSampleSource,
};
