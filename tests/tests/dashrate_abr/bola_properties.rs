#![forbid(unsafe_code)]

use std::time::Duration;

use dashrate::abr::{
    BolaController, BolaMode, BolaOptions, BolaPhase, BufferSnapshot, DecisionReason, Ladder,
    PlaybackState,
};
use rstest::{fixture, rstest};
use web_time::Instant;

use crate::common::{LADDER_BPS, SEGMENT_DURATION};

fn buffer(occupancy: usize) -> BufferSnapshot {
    BufferSnapshot {
        occupancy,
        state: PlaybackState::Playing,
        segment_duration: SEGMENT_DURATION,
        max_segments: None,
    }
}

// Fixtures

#[fixture]
fn reference_ladder() -> Ladder {
    Ladder::new(LADDER_BPS.to_vec()).unwrap()
}

#[fixture]
fn controller(reference_ladder: Ladder) -> BolaController {
    BolaController::new(reference_ladder, BolaOptions::default()).unwrap()
}

// Test Cases

#[rstest]
#[case::two_levels(vec![300_000, 600_000])]
#[case::reference(LADDER_BPS.to_vec())]
#[case::wide(vec![100_000, 250_000, 750_000, 1_500_000, 4_000_000, 8_000_000])]
#[case::close(vec![1_000_000, 1_000_001])]
fn params_are_positive_and_buffer_bounds_ordered(
    #[case] bitrates: Vec<u64>,
    #[values(BolaMode::Placeholder, BolaMode::Basic)] mode: BolaMode,
) {
    let ladder = Ladder::new(bitrates).unwrap();
    let levels = ladder.len();
    let opts = BolaOptions {
        mode,
        ..BolaOptions::default()
    };
    let c = BolaController::new(ladder, opts).unwrap();

    let params = c.params().unwrap();
    assert!(params.gp > 0.0, "gp = {}", params.gp);
    assert!(params.vp > 0.0, "vp = {}", params.vp);
    for level in 0..levels {
        assert!(
            c.min_buffer_level(level) <= c.max_buffer_level(level),
            "level {level}: {} > {}",
            c.min_buffer_level(level),
            c.max_buffer_level(level)
        );
    }
}

#[rstest]
fn level_is_monotone_in_buffer(controller: BolaController) {
    let mut previous = 0;
    for step in 0..=120_u32 {
        let secs = f64::from(step) * 0.25;
        let level = controller.level_for_buffer(secs);
        assert!(level >= previous, "{secs} s: {level} < {previous}");
        previous = level;
    }
    assert_eq!(controller.level_for_buffer(0.0), 0);
    assert_eq!(previous, LADDER_BPS.len() - 1);
}

#[rstest]
#[case(5.0)]
#[case(10.0)]
#[case(30.0)]
fn reconfigure_is_idempotent(mut controller: BolaController, #[case] target: f64) {
    let now = Instant::now();
    controller.decide(&buffer(1), Some(1_200_000), now);

    controller.reconfigure(target);
    let params = controller.params();
    let placeholder = controller.placeholder_secs();

    controller.reconfigure(target);
    assert_eq!(controller.params(), params);
    assert!((controller.placeholder_secs() - placeholder).abs() < 1e-12);
    assert!((controller.options().stable_buffer_secs - target).abs() < f64::EPSILON);
}

#[rstest]
#[case::tput_matches_last(1_200_000, 1)]
#[case::tput_below_last(600_000, 1)]
fn oscillation_guard_never_exceeds_last_level(
    mut controller: BolaController,
    #[case] later_estimate: u64,
    #[case] last: usize,
) {
    let now = Instant::now();
    let first = controller.decide(&buffer(1), Some(1_200_000), now);
    assert_eq!(first.reason, DecisionReason::Startup);
    assert_eq!(first.level, last);
    assert_eq!(controller.phase(), BolaPhase::Steady);

    for occupancy in 2..8 {
        let pick = controller.decide(&buffer(occupancy), Some(later_estimate), now);
        assert!(
            pick.level <= last,
            "occupancy {occupancy}: level {} above last {last}",
            pick.level
        );
    }
}

#[rstest]
#[case(None, 0)]
#[case(Some(400_000), 0)]
#[case(Some(1_500_000), 1)]
#[case(Some(2_500_000), 2)]
#[case(Some(50_000_000), 3)]
fn empty_buffer_starts_rate_matched(
    controller: BolaController,
    #[case] estimate: Option<u64>,
    #[case] expected: usize,
) {
    let mut c = controller;
    assert_eq!(c.phase(), BolaPhase::Startup);
    let pick = c.decide(&buffer(0), estimate, Instant::now());
    assert_eq!(pick.level, expected);
    assert_eq!(pick.reason, DecisionReason::Startup);
    assert_eq!(pick.delay, Duration::ZERO);
    assert_eq!(c.phase(), BolaPhase::Startup);
}

#[rstest]
#[case(None)]
#[case(Some(100_000_000))]
fn single_bitrate_always_level_zero(#[case] estimate: Option<u64>) {
    let mut c =
        BolaController::new(Ladder::new(vec![2_000_000]).unwrap(), BolaOptions::default()).unwrap();
    assert_eq!(c.phase(), BolaPhase::OneBitrate);
    for occupancy in [0, 3, 50] {
        let pick = c.decide(&buffer(occupancy), estimate, Instant::now());
        assert_eq!(pick.level, 0);
        assert_eq!(pick.reason, DecisionReason::OneBitrate);
    }
}

#[rstest]
fn seek_returns_to_startup(mut controller: BolaController) {
    let now = Instant::now();
    controller.decide(&buffer(2), Some(2_500_000), now);
    assert_eq!(controller.phase(), BolaPhase::Steady);

    controller.clear_on_seek();
    assert_eq!(controller.phase(), BolaPhase::Startup);
    assert!(controller.placeholder_secs().abs() < f64::EPSILON);

    let pick = controller.decide(&buffer(0), Some(600_000), now);
    assert_eq!((pick.level, pick.reason), (0, DecisionReason::Startup));
}
