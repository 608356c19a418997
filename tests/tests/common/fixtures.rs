use std::{sync::Arc, time::Duration};

use dashrate::abr::{
    BufferSnapshot, FamilyId, Ladder, PlaybackState, QualityTable, SegmentMetrics,
    SharedQualitySource,
};
use rstest::fixture;

pub const AVC: FamilyId = FamilyId::new(1);
pub const HEVC: FamilyId = FamilyId::new(2);
pub const AV1: FamilyId = FamilyId::new(4);

pub const SEGMENT_COUNT: usize = 30;
pub const SEGMENT_DURATION: Duration = Duration::from_secs(4);
pub const LADDER_BPS: [u64; 4] = [500_000, 1_000_000, 2_000_000, 3_000_000];

#[fixture]
pub fn tracing_setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::default()
                .add_directive("warn".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

/// Three families on one ladder.
///
/// Per level, HEVC is one VMAF point above the AV1 baseline and 11% smaller;
/// AVC is eight points below and 11% larger. Quality wobbles by segment.
#[fixture]
pub fn multi_codec_source() -> SharedQualitySource {
    let mut builder = QualityTable::builder();
    for family in [AVC, HEVC, AV1] {
        builder = builder
            .family(family, Ladder::new(LADDER_BPS.to_vec()).unwrap())
            .codec(family, codec_name(family));
    }
    for (level, &bps) in LADDER_BPS.iter().enumerate() {
        let nominal = bps / 2;
        for (family, dq, size) in [
            (AVC, -8.0, nominal),
            (HEVC, 1.0, nominal * 4 / 5),
            (AV1, 0.0, nominal * 9 / 10),
        ] {
            let series = (0..SEGMENT_COUNT).map(move |segment| {
                #[expect(clippy::cast_precision_loss)]
                let quality = 60.0 + 10.0 * level as f64 + dq + 0.5 * (segment % 3) as f64;
                SegmentMetrics::new(quality, size)
            });
            builder = builder.series(family, level, series);
        }
    }
    Arc::new(builder.build().unwrap())
}

/// Baseline family only, no per-segment metrics.
#[fixture]
pub fn ladder_only_source() -> SharedQualitySource {
    let table = QualityTable::builder()
        .family(AV1, Ladder::new(LADDER_BPS.to_vec()).unwrap())
        .build()
        .unwrap();
    Arc::new(table)
}

pub fn snapshot(occupancy: usize) -> BufferSnapshot {
    BufferSnapshot {
        occupancy,
        state: PlaybackState::Playing,
        segment_duration: SEGMENT_DURATION,
        max_segments: Some(10),
    }
}

fn codec_name(family: FamilyId) -> &'static str {
    match family.get() {
        1 => "avc1",
        2 => "hvc1",
        _ => "av01",
    }
}
