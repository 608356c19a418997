#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use dashrate::abr::{
    AbrEngine, AbrOptions, AlphaPolicy, DecisionReason, Estimator, FamilyId, Ladder,
    MedusaOptions, QualityTable, RefineOptions, SegmentMetrics, SharedQualitySource, Strategy,
    ThroughputSample, WindowEstimator,
};
use rstest::rstest;
use web_time::Instant;

use crate::common::{
    AV1, AVC, HEVC, LADDER_BPS, ladder_only_source, multi_codec_source, snapshot, tracing_setup,
};

fn refined(rule: RefineOptions) -> AbrOptions {
    AbrOptions {
        strategy: Strategy::BolaRefined(rule),
        ..AbrOptions::default()
    }
}

fn medusa(families: Vec<FamilyId>) -> AbrOptions {
    AbrOptions {
        strategy: Strategy::Medusa(MedusaOptions {
            families,
            ..MedusaOptions::default()
        }),
        ..AbrOptions::default()
    }
}

#[rstest]
fn strict_improvement_moves_to_cheaper_better_family(_tracing_setup: ()) {
    let table = QualityTable::builder()
        .family(AV1, Ladder::new(vec![1_000_000, 2_000_000]).unwrap())
        .family(HEVC, Ladder::new(vec![1_000_000, 2_000_000]).unwrap())
        .metrics(AV1, 0, 0, SegmentMetrics::new(80.0, 1_000_000))
        .metrics(HEVC, 0, 0, SegmentMetrics::new(82.0, 900_000))
        .build()
        .unwrap();
    let mut engine = AbrEngine::new(Arc::new(table), refined(RefineOptions::dominance())).unwrap();

    let decision = engine.decide(0, &snapshot(0), Instant::now());
    assert_eq!(decision.family, Some(HEVC));
    assert_eq!(decision.level, 0);
    assert_eq!(decision.reason, DecisionReason::Refined);
    assert_eq!(decision.quality, Some(82.0));
}

#[rstest]
#[case::dominance(RefineOptions::dominance())]
#[case::download_time(RefineOptions::download_time())]
#[case::instability(RefineOptions::instability())]
fn every_rule_prefers_the_dominating_family(
    multi_codec_source: SharedQualitySource,
    #[case] rule: RefineOptions,
) {
    let mut engine = AbrEngine::new(multi_codec_source, refined(rule)).unwrap();
    let decision = engine.decide(0, &snapshot(5), Instant::now());
    assert_eq!(decision.family, Some(HEVC));
    assert_eq!(decision.bitrate, LADDER_BPS[decision.level]);
    assert_eq!(decision.reason, DecisionReason::Refined);
    assert_eq!(engine.previous_quality(), None);
    engine.on_segment_downloaded(Instant::now(), decision.quality);
    assert_eq!(engine.previous_quality(), decision.quality);
}

#[rstest]
#[case::dominance(RefineOptions::dominance())]
#[case::instability(RefineOptions::instability())]
fn missing_baseline_metrics_keep_the_bola_pick(
    ladder_only_source: SharedQualitySource,
    #[case] rule: RefineOptions,
) {
    let mut engine = AbrEngine::new(ladder_only_source, refined(rule)).unwrap();
    let decision = engine.decide(0, &snapshot(0), Instant::now());
    assert_eq!(decision.family, Some(AV1));
    assert_eq!(decision.level, 0);
    assert_eq!(decision.quality, None);
    assert_eq!(decision.reason, DecisionReason::MissingMetrics);
}

#[rstest]
fn medusa_low_buffer_takes_the_smallest_good_candidate(multi_codec_source: SharedQualitySource) {
    let mut engine = AbrEngine::new(multi_codec_source, medusa(vec![AVC, HEVC, AV1])).unwrap();
    let decision = engine.decide(0, &snapshot(1), Instant::now());
    assert_eq!((decision.family, decision.level), (Some(HEVC), 0));
    assert_eq!(decision.reason, DecisionReason::JointOptimized);
    assert_eq!(decision.delay, Duration::ZERO);
}

#[rstest]
fn medusa_full_buffer_climbs_when_the_download_fits(multi_codec_source: SharedQualitySource) {
    let mut engine = AbrEngine::new(multi_codec_source, medusa(vec![AVC, HEVC, AV1])).unwrap();
    // 12.5 MB in one second: 100 Mbit/s.
    engine.push_throughput_sample(ThroughputSample::network(
        12_500_000,
        Duration::from_secs(1),
        Instant::now(),
    ));
    let decision = engine.decide(0, &snapshot(8), Instant::now());
    assert_eq!((decision.family, decision.level), (Some(HEVC), 3));
}

#[rstest]
fn medusa_fixed_alpha_ignores_occupancy(multi_codec_source: SharedQualitySource) {
    let opts = AbrOptions {
        strategy: Strategy::Medusa(MedusaOptions {
            families: vec![AV1],
            alpha: AlphaPolicy::Fixed(0.0),
            ..MedusaOptions::default()
        }),
        ..AbrOptions::default()
    };
    let mut engine = AbrEngine::new(multi_codec_source, opts).unwrap();
    let decision = engine.decide(0, &snapshot(6), Instant::now());
    // Size only: the smallest AV1 candidate.
    assert_eq!((decision.family, decision.level), (Some(AV1), 0));
}

#[rstest]
fn medusa_without_metrics_falls_back_to_lowest_baseline(ladder_only_source: SharedQualitySource) {
    let mut engine = AbrEngine::new(ladder_only_source, medusa(vec![AV1])).unwrap();
    let decision = engine.decide(0, &snapshot(5), Instant::now());
    assert_eq!(decision.family, Some(AV1));
    assert_eq!(decision.level, 0);
    assert_eq!(decision.quality, None);
    assert_eq!(decision.reason, DecisionReason::MissingMetrics);
}

#[rstest]
fn window_estimator_drives_startup_level(ladder_only_source: SharedQualitySource) {
    let mut estimator = WindowEstimator::new(3);
    assert_eq!(estimator.estimate_bps(), None);
    let mut engine =
        AbrEngine::with_estimator(ladder_only_source, AbrOptions::default(), estimator.clone())
            .unwrap();

    // 312.5 kB per second: 2.5 Mbit/s.
    for _ in 0..3 {
        let sample = ThroughputSample::network(312_500, Duration::from_secs(1), Instant::now());
        estimator.push_sample(sample);
        engine.push_throughput_sample(sample);
    }
    assert_eq!(estimator.estimate_bps(), Some(2_500_000));
    assert_eq!(engine.estimate_bps(), Some(2_500_000));

    let decision = engine.decide(0, &snapshot(0), Instant::now());
    assert_eq!(decision.level, 2);
    assert_eq!(decision.reason, DecisionReason::Startup);
}

#[rstest]
fn unknown_baseline_is_rejected(multi_codec_source: SharedQualitySource) {
    let opts = AbrOptions {
        baseline: FamilyId::new(9),
        ..AbrOptions::default()
    };
    assert!(AbrEngine::new(multi_codec_source, opts).is_err());
}
