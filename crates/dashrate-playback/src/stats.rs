use serde::Serialize;

use crate::BufferStats;

/// One downloaded segment as it entered the buffer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentRecord {
    pub segment: usize,
    /// Encoding family id, `None` for single-family decisions.
    pub family: Option<u32>,
    pub level: usize,
    pub bitrate: u64,
    /// Predicted VMAF of the downloaded candidate.
    pub quality: Option<f64>,
    pub bytes: u64,
    pub download_secs: f64,
}

/// QoE summary of one session.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub segments_decided: usize,
    pub segments_downloaded: usize,
    pub fetch_failures: usize,
    pub up_shifts: usize,
    pub down_shifts: usize,
    pub total_bytes: u64,
    pub interruptions: usize,
    pub interruption_secs: f64,
    pub initial_buffering_secs: f64,
    pub records: Vec<SegmentRecord>,
}

impl SessionStats {
    /// Append a download, counting a shift against the previous one's bitrate.
    pub fn record(&mut self, record: SegmentRecord) {
        if let Some(previous) = self.records.last() {
            if record.bitrate > previous.bitrate {
                self.up_shifts += 1;
            } else if record.bitrate < previous.bitrate {
                self.down_shifts += 1;
            }
        }
        self.segments_downloaded += 1;
        self.total_bytes += record.bytes;
        self.records.push(record);
    }

    pub fn apply_buffer(&mut self, buffer: &BufferStats) {
        self.interruptions = buffer.interruptions;
        self.interruption_secs = buffer.interruption_time.as_secs_f64();
        self.initial_buffering_secs = buffer
            .initial_buffering
            .map_or(0.0, |waited| waited.as_secs_f64());
    }

    /// Mean predicted VMAF over downloads that carried one.
    pub fn average_quality(&self) -> Option<f64> {
        let qualities: Vec<f64> = self.records.iter().filter_map(|r| r.quality).collect();
        if qualities.is_empty() {
            return None;
        }
        #[expect(clippy::cast_precision_loss)] // segment counts are tiny
        let mean = qualities.iter().sum::<f64>() / qualities.len() as f64;
        Some(mean)
    }
}
