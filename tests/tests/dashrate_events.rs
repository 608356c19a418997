//! Integration tests for the event bus.

use std::time::Duration;

use dashrate::{
    abr::{DecisionReason, PlaybackState},
    events::{AbrEvent, Event, EventBus, PlaybackEvent, drain_ready},
};

#[test]
fn test_late_subscriber_sees_only_later_events() {
    let bus = EventBus::default();
    bus.publish(AbrEvent::Seek { segment: 1 });
    let mut rx = bus.subscribe();
    bus.publish(PlaybackEvent::Ended);

    assert_eq!(
        drain_ready(&mut rx),
        vec![Event::Playback(PlaybackEvent::Ended)]
    );
}

#[tokio::test]
async fn test_bus_preserves_publish_order() {
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    bus.publish(AbrEvent::Decision {
        segment: 0,
        family: None,
        level: 0,
        bitrate: 500_000,
        quality: None,
        reason: DecisionReason::Startup,
    });
    bus.publish(PlaybackEvent::SegmentDownloaded {
        segment: 0,
        bytes: 250_000,
        duration: Duration::from_millis(400),
    });
    bus.publish(PlaybackEvent::StateChanged {
        from: PlaybackState::InitialBuffering,
        to: PlaybackState::Playing,
    });

    assert!(matches!(
        rx.recv().await.unwrap(),
        Event::Abr(AbrEvent::Decision { segment: 0, .. })
    ));
    assert!(matches!(
        rx.recv().await.unwrap(),
        Event::Playback(PlaybackEvent::SegmentDownloaded { bytes: 250_000, .. })
    ));
    assert!(matches!(
        rx.recv().await.unwrap(),
        Event::Playback(PlaybackEvent::StateChanged {
            to: PlaybackState::Playing,
            ..
        })
    ));
}
