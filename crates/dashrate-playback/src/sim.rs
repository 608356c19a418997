//! Network emulation for running sessions without a server.

use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use dashrate_abr::SharedQualitySource;
use parking_lot::Mutex;
use tracing::trace;

use crate::{FetchError, FetchedSegment, SegmentFetcher, SegmentRequest};

/// Fetcher that sleeps for `size * 8 / bandwidth` on the tokio clock.
///
/// Sizes come from the quality table; when a candidate has no metrics the
/// nominal `bitrate * segment_duration` is used. Bandwidth follows a per-request
/// schedule whose last entry repeats.
pub struct SimulatedFetcher {
    source: SharedQualitySource,
    segment_duration: Duration,
    schedule: Vec<u64>,
    failing: HashSet<usize>,
    served: AtomicUsize,
    requests: Mutex<Vec<SegmentRequest>>,
}

impl SimulatedFetcher {
    pub fn new(source: SharedQualitySource, segment_duration: Duration, bandwidth_bps: u64) -> Self {
        Self {
            source,
            segment_duration,
            schedule: vec![bandwidth_bps.max(1)],
            failing: HashSet::new(),
            served: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Bandwidth (bits/s) for the n-th request. An empty schedule is ignored.
    #[must_use]
    pub fn with_schedule(mut self, schedule: Vec<u64>) -> Self {
        if !schedule.is_empty() {
            self.schedule = schedule.into_iter().map(|bps| bps.max(1)).collect();
        }
        self
    }

    /// Make every request for `segment` fail.
    #[must_use]
    pub fn with_failure(mut self, segment: usize) -> Self {
        self.failing.insert(segment);
        self
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<SegmentRequest> {
        self.requests.lock().clone()
    }

    fn size_of(&self, request: &SegmentRequest) -> u64 {
        let metrics = request
            .family
            .and_then(|family| self.source.metrics(family, request.level, request.segment));
        match metrics {
            Some(m) => m.size_bytes,
            None => {
                let millis = u64::try_from(self.segment_duration.as_millis()).unwrap_or(u64::MAX);
                request.bitrate.saturating_mul(millis) / 8_000
            }
        }
    }

    fn bandwidth_for(&self, index: usize) -> u64 {
        self.schedule
            .get(index)
            .or_else(|| self.schedule.last())
            .copied()
            .unwrap_or(1)
    }
}

#[async_trait]
impl SegmentFetcher for SimulatedFetcher {
    async fn fetch(&self, request: &SegmentRequest) -> Result<FetchedSegment, FetchError> {
        let index = self.served.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(*request);

        if self.failing.contains(&request.segment) {
            return Err(FetchError::Failed(format!(
                "segment {} unavailable",
                request.segment
            )));
        }

        let bytes = self.size_of(request);
        let bps = self.bandwidth_for(index);
        #[expect(clippy::cast_precision_loss)] // simulated sizes stay far below 2^52
        let elapsed = Duration::from_secs_f64(bytes as f64 * 8.0 / bps as f64);
        trace!(
            segment = request.segment,
            bytes,
            bps,
            elapsed_secs = elapsed.as_secs_f64(),
            "simulated download"
        );
        tokio::time::sleep(elapsed).await;
        Ok(FetchedSegment { bytes, elapsed })
    }
}
