use dashrate_abr::{AbrEngine, AbrOptions, Estimator, SharedQualitySource, ThroughputEstimator};
use dashrate_playback::{PlaybackResult, Session, SessionConfig, SessionStats, SimulatedFetcher};
use tracing::debug;

/// Play `config.segment_count` segments of `source` over an emulated link.
///
/// `bandwidth_bps` is the per-request bandwidth schedule; its last entry
/// repeats. Runs on the tokio clock, so paused-time tests finish instantly.
pub async fn simulate(
    source: SharedQualitySource,
    abr: AbrOptions,
    config: SessionConfig,
    bandwidth_bps: Vec<u64>,
) -> PlaybackResult<SessionStats> {
    simulate_with_estimator(source, abr, config, bandwidth_bps, ThroughputEstimator::new()).await
}

/// [`simulate`] with a caller-chosen throughput estimator, e.g.
/// [`WindowEstimator`](dashrate_abr::WindowEstimator).
pub async fn simulate_with_estimator<E: Estimator>(
    source: SharedQualitySource,
    abr: AbrOptions,
    config: SessionConfig,
    bandwidth_bps: Vec<u64>,
    estimator: E,
) -> PlaybackResult<SessionStats> {
    debug!(strategy = ?abr.strategy, schedule_len = bandwidth_bps.len(), "simulate");
    let fetcher = SimulatedFetcher::new(
        source.clone(),
        config.buffer.segment_duration,
        bandwidth_bps.first().copied().unwrap_or(1),
    )
    .with_schedule(bandwidth_bps);
    let engine = AbrEngine::with_estimator(source, abr, estimator)?;
    let (session, _handle) = Session::new(config, engine, fetcher)?;
    session.run().await
}
