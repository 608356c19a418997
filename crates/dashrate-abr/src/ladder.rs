use crate::{AbrError, AbrResult};

/// Ordered bitrate levels of one encoding family.
///
/// Invariants (checked in [`Ladder::new`]): non-empty, every bitrate > 0,
/// strictly increasing. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Ladder {
    bitrates: Vec<u64>,
    utilities: Vec<f64>,
}

impl Ladder {
    pub fn new(bitrates: impl Into<Vec<u64>>) -> AbrResult<Self> {
        let bitrates = bitrates.into();
        if bitrates.is_empty() {
            return Err(AbrError::EmptyLadder);
        }
        for (level, &bps) in bitrates.iter().enumerate() {
            if bps == 0 {
                return Err(AbrError::ZeroBitrate { level });
            }
            if level > 0 && bps <= bitrates[level - 1] {
                return Err(AbrError::NonIncreasingLadder { level });
            }
        }

        // ln(bitrate), shifted so that utility[0] == 1.
        #[expect(clippy::cast_precision_loss)] // bitrate precision loss is negligible for ABR
        let logs: Vec<f64> = bitrates.iter().map(|&b| (b as f64).ln()).collect();
        let offset = 1.0 - logs[0];
        let utilities = logs.into_iter().map(|u| u + offset).collect();

        Ok(Self {
            bitrates,
            utilities,
        })
    }

    pub fn len(&self) -> usize {
        self.bitrates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitrates.is_empty()
    }

    pub fn bitrates(&self) -> &[u64] {
        &self.bitrates
    }

    pub fn utilities(&self) -> &[f64] {
        &self.utilities
    }

    pub fn bitrate(&self, level: usize) -> Option<u64> {
        self.bitrates.get(level).copied()
    }

    pub fn level_of(&self, bitrate: u64) -> Option<usize> {
        self.bitrates.binary_search(&bitrate).ok()
    }

    /// Simple rate matching: the highest level whose bitrate does not exceed
    /// the throughput estimate. Level 0 when there is no estimate or nothing fits.
    pub fn level_for_throughput(&self, estimate_bps: Option<u64>) -> usize {
        let Some(estimate) = estimate_bps else {
            return 0;
        };
        self.bitrates
            .iter()
            .rposition(|&b| b <= estimate)
            .unwrap_or(0)
    }

    /// Highest level, which is also the highest-utility one.
    pub fn top(&self) -> usize {
        self.bitrates.len().saturating_sub(1)
    }
}
