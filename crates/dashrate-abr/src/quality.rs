use std::collections::{BTreeMap, HashMap};

use crate::{AbrError, AbrResult, FamilyId, Ladder};

/// Per-segment quality score and encoded size of one (family, level).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentMetrics {
    /// Perceptual quality (VMAF, 0..100).
    pub quality: f64,
    pub size_bytes: u64,
}

impl SegmentMetrics {
    pub fn new(quality: f64, size_bytes: u64) -> Self {
        Self {
            quality,
            size_bytes,
        }
    }

    #[expect(clippy::cast_precision_loss)] // segment sizes are far below 2^52
    pub fn size(&self) -> f64 {
        self.size_bytes as f64
    }

    /// Time to download this segment at `throughput_bps`.
    #[expect(clippy::cast_precision_loss)]
    pub fn download_secs(&self, throughput_bps: u64) -> f64 {
        self.size() * 8.0 / (throughput_bps.max(1) as f64)
    }
}

/// Source of ladders and per-segment metrics.
///
/// Abstracts the selectors from whatever produced the data (a parsed
/// manifest, a fixture, a synthetic table).
pub trait QualitySource {
    /// Encoding families in ladder order (ascending id).
    fn families(&self) -> Vec<FamilyId>;

    fn ladder(&self, family: FamilyId) -> Option<&Ladder>;

    /// Metrics for a segment; `None` means "unavailable", never zero.
    fn metrics(&self, family: FamilyId, level: usize, segment: usize) -> Option<SegmentMetrics>;
}

#[derive(Clone, Debug)]
struct Family {
    ladder: Ladder,
    codec: Option<String>,
}

/// Immutable (family, level, segment) → metrics table.
#[derive(Clone, Debug)]
pub struct QualityTable {
    families: BTreeMap<FamilyId, Family>,
    metrics: HashMap<(FamilyId, usize, usize), SegmentMetrics>,
}

impl QualityTable {
    pub fn builder() -> QualityTableBuilder {
        QualityTableBuilder::default()
    }

    pub fn codec(&self, family: FamilyId) -> Option<&str> {
        self.families.get(&family)?.codec.as_deref()
    }
}

impl QualitySource for QualityTable {
    fn families(&self) -> Vec<FamilyId> {
        self.families.keys().copied().collect()
    }

    fn ladder(&self, family: FamilyId) -> Option<&Ladder> {
        self.families.get(&family).map(|f| &f.ladder)
    }

    fn metrics(&self, family: FamilyId, level: usize, segment: usize) -> Option<SegmentMetrics> {
        self.metrics.get(&(family, level, segment)).copied()
    }
}

#[derive(Debug, Default)]
pub struct QualityTableBuilder {
    families: BTreeMap<FamilyId, Family>,
    metrics: Vec<((FamilyId, usize, usize), SegmentMetrics)>,
}

impl QualityTableBuilder {
    #[must_use]
    pub fn family(mut self, id: FamilyId, ladder: Ladder) -> Self {
        self.families.insert(id, Family { ladder, codec: None });
        self
    }

    #[must_use]
    pub fn codec(mut self, id: FamilyId, codec: impl Into<String>) -> Self {
        if let Some(family) = self.families.get_mut(&id) {
            family.codec = Some(codec.into());
        }
        self
    }

    #[must_use]
    pub fn metrics(
        mut self,
        id: FamilyId,
        level: usize,
        segment: usize,
        metrics: SegmentMetrics,
    ) -> Self {
        self.metrics.push(((id, level, segment), metrics));
        self
    }

    /// Add metrics for consecutive segments starting at 0.
    #[must_use]
    pub fn series(
        mut self,
        id: FamilyId,
        level: usize,
        series: impl IntoIterator<Item = SegmentMetrics>,
    ) -> Self {
        for (segment, m) in series.into_iter().enumerate() {
            self.metrics.push(((id, level, segment), m));
        }
        self
    }

    pub fn build(self) -> AbrResult<QualityTable> {
        if self.families.is_empty() {
            return Err(AbrError::NoFamilies);
        }

        let mut metrics = HashMap::with_capacity(self.metrics.len());
        for ((family, level, segment), m) in self.metrics {
            let Some(entry) = self.families.get(&family) else {
                return Err(AbrError::UnknownFamily(family));
            };
            if level >= entry.ladder.len() {
                return Err(AbrError::UnknownLevel { family, level });
            }
            metrics.insert((family, level, segment), m);
        }

        Ok(QualityTable {
            families: self.families,
            metrics,
        })
    }
}
