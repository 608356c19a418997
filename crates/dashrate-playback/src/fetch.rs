use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashrate_abr::FamilyId;

use crate::FetchError;

/// One segment download chosen by the decision loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentRequest {
    pub segment: usize,
    pub family: Option<FamilyId>,
    pub level: usize,
    pub bitrate: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchedSegment {
    pub bytes: u64,
    /// Wall time of the download, fed to the throughput estimator.
    pub elapsed: Duration,
}

/// Transport used by [`Session`](crate::Session) to download segments.
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    async fn fetch(&self, request: &SegmentRequest) -> Result<FetchedSegment, FetchError>;
}

#[async_trait]
impl<F: SegmentFetcher + ?Sized> SegmentFetcher for Arc<F> {
    async fn fetch(&self, request: &SegmentRequest) -> Result<FetchedSegment, FetchError> {
        (**self).fetch(request).await
    }
}
