#![forbid(unsafe_code)]

use std::sync::Arc;

use dashrate::{
    abr::{
        AbrEngine, AbrOptions, BolaMode, BolaOptions, MedusaOptions, RefineOptions,
        SharedQualitySource, Strategy,
    },
    events::{AbrEvent, Event, PlaybackEvent, drain_ready},
    playback::{BufferConfig, Session, SessionConfig, SimulatedFetcher},
    simulate,
};
use rstest::rstest;

use crate::common::{
    AV1, AVC, HEVC, LADDER_BPS, SEGMENT_COUNT, SEGMENT_DURATION, multi_codec_source,
    tracing_setup,
};

fn config() -> SessionConfig {
    SessionConfig::default().with_segment_count(SEGMENT_COUNT)
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn constant_fast_link_climbs_to_the_top_level(
    _tracing_setup: (),
    multi_codec_source: SharedQualitySource,
) {
    let stats = simulate(
        multi_codec_source,
        AbrOptions::default(),
        config(),
        vec![10_000_000],
    )
    .await
    .unwrap();

    assert_eq!(stats.segments_downloaded, SEGMENT_COUNT);
    assert_eq!(stats.interruptions, 0);
    assert!(stats.up_shifts >= 1);
    let last = stats.records.last().unwrap();
    assert_eq!(last.level, LADDER_BPS.len() - 1);
    assert_eq!(last.family, Some(AV1.get()));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn slow_link_stays_on_the_lowest_level(
    _tracing_setup: (),
    multi_codec_source: SharedQualitySource,
) {
    let stats = simulate(multi_codec_source, AbrOptions::default(), config(), vec![600_000])
        .await
        .unwrap();

    assert_eq!(stats.segments_downloaded, SEGMENT_COUNT);
    assert!(stats.records.iter().all(|r| r.level == 0));
    assert_eq!(stats.up_shifts, 0);
    assert_eq!(stats.interruptions, 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn bandwidth_drop_forces_a_down_shift(
    _tracing_setup: (),
    multi_codec_source: SharedQualitySource,
) {
    let mut schedule = vec![10_000_000; 10];
    schedule.push(700_000);
    let stats = simulate(multi_codec_source, AbrOptions::default(), config(), schedule)
        .await
        .unwrap();

    assert_eq!(stats.segments_downloaded, SEGMENT_COUNT);
    assert!(stats.down_shifts >= 1);
}

#[rstest]
#[case::dominance(RefineOptions::dominance())]
#[case::download_time(RefineOptions::download_time())]
#[tokio::test(start_paused = true)]
async fn refinement_downloads_the_dominating_family(
    multi_codec_source: SharedQualitySource,
    #[case] rule: RefineOptions,
) {
    let abr = AbrOptions {
        strategy: Strategy::BolaRefined(rule),
        ..AbrOptions::default()
    };
    let stats = simulate(multi_codec_source, abr, config(), vec![10_000_000])
        .await
        .unwrap();

    assert!(stats.records.iter().all(|r| r.family == Some(HEVC.get())));
    assert!(stats.records.iter().all(|r| r.quality.is_some()));
    assert!(stats.average_quality().unwrap() > 60.0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn medusa_session_stays_on_the_dominating_family(multi_codec_source: SharedQualitySource) {
    let abr = AbrOptions {
        strategy: Strategy::Medusa(MedusaOptions {
            families: vec![AVC, HEVC, AV1],
            ..MedusaOptions::default()
        }),
        ..AbrOptions::default()
    };
    let config = config().with_buffer(BufferConfig::default().with_max_segments(10));
    let stats = simulate(multi_codec_source, abr, config, vec![10_000_000])
        .await
        .unwrap();

    assert_eq!(stats.segments_downloaded, SEGMENT_COUNT);
    assert!(stats.records.iter().all(|r| r.family == Some(HEVC.get())));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn basic_mode_with_bounded_buffer_plays_without_stalls(
    multi_codec_source: SharedQualitySource,
) {
    let abr = AbrOptions {
        bola: BolaOptions {
            mode: BolaMode::Basic,
            ..BolaOptions::default()
        },
        ..AbrOptions::default()
    };
    let config = config().with_buffer(BufferConfig::default().with_max_segments(5));
    let stats = simulate(multi_codec_source, abr, config, vec![10_000_000])
        .await
        .unwrap();

    assert_eq!(stats.segments_downloaded, SEGMENT_COUNT);
    assert_eq!(stats.interruptions, 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn seek_and_reconfigure_apply_between_segments(
    _tracing_setup: (),
    multi_codec_source: SharedQualitySource,
) {
    let net = Arc::new(SimulatedFetcher::new(
        multi_codec_source.clone(),
        SEGMENT_DURATION,
        10_000_000,
    ));
    let engine = AbrEngine::new(multi_codec_source, AbrOptions::default()).unwrap();
    let (session, handle) = Session::new(config(), engine, Arc::clone(&net)).unwrap();
    let mut rx = handle.bus().subscribe();
    let runner = tokio::spawn(session.run());

    loop {
        if let Event::Playback(PlaybackEvent::SegmentDownloaded { segment: 2, .. }) =
            rx.recv().await.unwrap()
        {
            break;
        }
    }
    handle.reconfigure(20.0).await.unwrap();
    handle.seek(20).await.unwrap();
    let stats = runner.await.unwrap().unwrap();

    let requested: Vec<usize> = net.requests().iter().map(|r| r.segment).collect();
    assert!(requested.contains(&20));
    assert!(!requested.contains(&15));
    assert_eq!(requested.last(), Some(&(SEGMENT_COUNT - 1)));
    assert!(stats.segments_downloaded < SEGMENT_COUNT);

    let mut seek = false;
    let mut reconfigured = false;
    for event in drain_ready(&mut rx) {
        match event {
            Event::Abr(AbrEvent::Seek { segment: 20 }) => seek = true,
            Event::Abr(AbrEvent::Reconfigured { .. }) => reconfigured = true,
            _ => {}
        }
    }
    assert!(seek);
    assert!(reconfigured);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stats_serialize_for_reporting(multi_codec_source: SharedQualitySource) {
    let stats = simulate(
        multi_codec_source,
        AbrOptions::default(),
        SessionConfig::default().with_segment_count(3),
        vec![10_000_000],
    )
    .await
    .unwrap();

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["segments_downloaded"], 3);
    assert_eq!(json["records"].as_array().unwrap().len(), 3);
    assert_eq!(json["records"][0]["segment"], 0);
    assert!(json["initial_buffering_secs"].as_f64().unwrap() > 0.0);
}
