use bedwatch_console::{
    feed::SyntheticScene, timeline, BBox, Detection, Frame, InferenceSnapshot, SessionStore,
    TrackerSnapshot, BUFFER_CAPACITY, EVENT_HISTORY_CAPACITY,
};

const FRAME_INTERVAL_MS: u64 = 150;

fn detection(confidence: f64) -> Detection {
    Detection {
        person_id: 1,
        bbox: BBox::new(200.0, 150.0, 180.0, 320.0),
        keypoints: None,
        confidence,
        imov: None,
    }
}

fn frame(ts: u64, confidences: &[f64], event: Option<&str>) -> Frame {
    Frame::new(
        ts,
        Some(InferenceSnapshot {
            timestamp: ts,
            frame_id: (ts / FRAME_INTERVAL_MS) as i64,
            detections: confidences.iter().copied().map(detection).collect(),
        }),
        Some(TrackerSnapshot {
            timestamp: ts,
            event: event.map(str::to_string),
            ..TrackerSnapshot::default()
        }),
    )
}

fn ingest_run(store: &mut SessionStore, count: u64) {
    for i in 0..count {
        store.ingest(frame(i * FRAME_INTERVAL_MS, &[0.9], None));
    }
}

#[test]
fn buffer_keeps_most_recent_frames_in_arrival_order() {
    let mut store = SessionStore::default();
    let total = BUFFER_CAPACITY as u64 + 80;
    ingest_run(&mut store, total);

    let buffer = store.frames();
    assert_eq!(buffer.len(), BUFFER_CAPACITY);
    assert_eq!(buffer.get(0).unwrap().timestamp, 80 * FRAME_INTERVAL_MS);
    assert_eq!(buffer.latest().unwrap().timestamp, (total - 1) * FRAME_INTERVAL_MS);
    let ordered = buffer
        .iter()
        .zip(buffer.iter().skip(1))
        .all(|(a, b)| a.timestamp < b.timestamp);
    assert!(ordered);
    assert_eq!(store.diagnostics().evicted_frames, 80);
}

#[test]
fn event_history_keeps_last_eventful_trackers() {
    let mut store = SessionStore::default();
    for i in 0..240u64 {
        let event = match i % 3 {
            0 => Some("bed_exit"),
            1 => Some(""),
            _ => None,
        };
        store.ingest(frame(i * FRAME_INTERVAL_MS, &[], event));
    }

    assert_eq!(store.event_history_len(), EVENT_HISTORY_CAPACITY);
    let timestamps: Vec<u64> = store.event_history().map(|t| t.timestamp).collect();
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*timestamps.last().unwrap(), 237 * FRAME_INTERVAL_MS);
    assert!(store.event_history().all(|t| t.event_name() == Some("bed_exit")));
}

#[test]
fn live_view_tracks_newest_frame() {
    let mut store = SessionStore::default();
    for i in 0..10u64 {
        store.ingest(frame(i * FRAME_INTERVAL_MS, &[0.8], None));
        assert!(store.is_live());
        assert_eq!(
            store.current_frame().unwrap().timestamp,
            store.frames().latest().unwrap().timestamp
        );
    }
}

#[test]
fn seek_round_trip_and_out_of_range_noops() {
    let mut store = SessionStore::default();
    ingest_run(&mut store, 20);
    store.toggle_live();
    assert!(!store.is_live());

    for index in [0i64, 7, 19] {
        assert!(store.seek(index));
        assert_eq!(store.current_frame_index(), Some(index as usize));
        assert_eq!(
            store.current_frame().unwrap().timestamp,
            store.frames().get(index as usize).unwrap().timestamp
        );
    }

    let before = store.current_frame().cloned();
    assert!(!store.seek(-1));
    assert!(!store.seek(20));
    assert_eq!(store.current_frame_index(), Some(19));
    assert_eq!(store.current_frame().cloned(), before);
}

#[test]
fn empty_frames_raise_dropped_count_and_drain_confidence() {
    let mut store = SessionStore::default();
    ingest_run(&mut store, 30);
    let mut previous = store.metrics();

    for i in 30..62u64 {
        store.ingest(frame(i * FRAME_INTERVAL_MS, &[], None));
        let metrics = store.metrics();
        assert!(metrics.dropped_frames >= previous.dropped_frames);
        assert!(metrics.avg_confidence <= previous.avg_confidence + 1e-9);
        previous = metrics;
    }

    assert_eq!(previous.dropped_frames, 30);
    assert_eq!(previous.avg_confidence, 0.0);
    assert_eq!(previous.active_detections, 0);
}

#[test]
fn operator_commands_leave_metrics_unchanged() {
    let mut store = SessionStore::default();
    ingest_run(&mut store, 12);
    let before = store.metrics();

    store.toggle_live();
    store.seek(3);
    store.toggle_pause();
    store.create_clip();

    assert_eq!(store.metrics(), before);
}

#[test]
fn steady_stream_metrics() {
    let mut store = SessionStore::default();
    ingest_run(&mut store, 30);

    let metrics = store.metrics();
    assert!((metrics.avg_confidence - 0.9).abs() < 1e-9);
    assert_eq!(metrics.dropped_frames, 0);
    assert_eq!(metrics.active_detections, 1);
    assert!((metrics.fps - 29.0 / 4.35).abs() < 1e-6);
    assert!((metrics.fps - 6.67).abs() < 0.01);
}

#[test]
fn bed_exit_is_recorded() {
    let mut store = SessionStore::default();
    ingest_run(&mut store, 5);
    let before = store.event_history_len();

    let exit = frame(5 * FRAME_INTERVAL_MS, &[0.85], Some("bed_exit"));
    let tracker = exit.tracker.clone().unwrap();
    store.ingest(exit);

    assert_eq!(store.event_history_len(), before + 1);
    assert_eq!(store.event_history().last(), Some(tracker.as_ref()));
    assert_eq!(store.event_log()[0].name, "bed_exit");
}

#[test]
fn paused_view_stays_put_while_buffer_grows() {
    let mut store = SessionStore::default();
    ingest_run(&mut store, 100);
    store.toggle_live();
    let pinned = store.current_frame().cloned().unwrap();
    assert_eq!(store.current_frame_index(), Some(99));

    for i in 100..105u64 {
        store.ingest(frame(i * FRAME_INTERVAL_MS, &[0.9], None));
    }

    assert_eq!(store.frames().len(), 105);
    assert_eq!(store.current_frame().unwrap().timestamp, pinned.timestamp);
    assert_eq!(store.current_frame_index(), Some(99));
}

#[test]
fn partial_frames_count_as_dropped() {
    let mut store = SessionStore::default();
    store.ingest(frame(0, &[0.7], None));
    store.ingest(Frame::new(FRAME_INTERVAL_MS, None, None));
    store.ingest(frame(2 * FRAME_INTERVAL_MS, &[], None));

    assert_eq!(store.diagnostics().partial_frames, 1);
    assert_eq!(store.metrics().dropped_frames, 2);
    assert!(store.regions().is_empty());
}

#[test]
fn timeline_scrub_maps_onto_seek() {
    let mut store = SessionStore::default();
    ingest_run(&mut store, 360);
    store.set_live(false);

    let index = timeline::index_at_position(0.25, store.frames().capacity());
    assert_eq!(index, 180);
    assert!(store.seek(index));
    let beyond = timeline::index_at_position(0.75, store.frames().capacity());
    assert!(!store.seek(beyond));
    assert_eq!(store.current_frame_index(), Some(180));
}

#[test]
fn synthetic_session_stays_bounded() {
    let mut scene = SyntheticScene::new(Some(11));
    let mut store = SessionStore::default();
    for i in 0..(BUFFER_CAPACITY as u64 * 2) {
        store.ingest(scene.next_frame(1_700_000_000_000 + i * FRAME_INTERVAL_MS));
    }
    assert_eq!(store.frames().len(), BUFFER_CAPACITY);
    assert!(store.event_history_len() <= EVENT_HISTORY_CAPACITY);
    assert!(store.regions().contains_key("bed"));
    assert!(store.metrics().fps > 6.0);
}
