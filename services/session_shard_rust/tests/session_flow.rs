use async_trait::async_trait;
use courtcall_core::clients::{GameFeed, HistoryItem, ScriptedFeed};
use courtcall_core::config::EngineConfig;
use courtcall_core::models::{GameState, GestureEvent, ParticipantLabel, ShotEvent, ShotType};
use courtcall_core::odds::OddsModel;
use courtcall_core::roster::Participant;
use courtcall_core::session::FeedMode;
use courtcall_core::store::{InMemoryPointsStore, InMemoryShotRecordStore, PointsStore};
use courtcall_core::time::{ManualClock, TimeSource, WallClock};
use courtcall_core::{Detection, FeedError, SessionEvent, StoreError};
use session_shard_rust::{Persistence, SessionShard, SessionShardConfig, ShardCommand, ShardHandle};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Harness {
    shard: SessionShard,
    handle: ShardHandle,
    clock: Arc<ManualClock>,
    points: Arc<InMemoryPointsStore>,
    shots: Arc<InMemoryShotRecordStore>,
}

fn made_three() -> GameState {
    GameState::new(2, "PT05M23.00S")
        .with_score(54, 51)
        .with_shot(ShotEvent::new("Unknown Guy", "Made", "3PT Jump Shot", Some(3)).with_team("BOS"))
}

fn harness(mode: FeedMode, session_id: Option<&str>, feed: ScriptedFeed, points: Arc<InMemoryPointsStore>) -> Harness {
    let clock = ManualClock::new(1_700_000_000_000);
    let shots = Arc::new(InMemoryShotRecordStore::new());
    let mut config = SessionShardConfig::for_game("0022400123", mode);
    config.session_id = session_id.map(str::to_string);
    config.seats = vec![(ParticipantLabel::Left, Participant::new("user-1", Some("Sam".to_string())))];

    let persistence = Persistence::new(points.clone(), shots.clone()).with_backoff(3, 1);
    let time: Arc<dyn TimeSource> = clock.clone();
    let (shard, handle) = SessionShard::new(
        config,
        EngineConfig::default(),
        OddsModel::default(),
        Arc::new(feed),
        persistence,
        time,
    );
    Harness {
        shard,
        handle,
        clock,
        points,
        shots,
    }
}

fn drain_kinds(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<&'static str> {
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind());
    }
    kinds
}

fn gesture(shot_type: ShotType) -> GestureEvent {
    GestureEvent {
        label: Some(ParticipantLabel::Left),
        shot_type: Some(shot_type),
        timestamp: 0,
    }
}

impl Harness {
    fn step(&mut self, ms: i64) {
        self.clock.advance(ms);
        self.shard.tick();
    }
}

#[tokio::test]
async fn test_live_made_three_scores_and_persists() {
    let feed = ScriptedFeed::new(vec![GameState::new(2, "PT05M40.00S"), made_three()]);
    let mut h = harness(FeedMode::Live, Some("sess-1"), feed, Arc::new(InMemoryPointsStore::new()));
    let mut events = h.handle.subscribe();

    assert_eq!(h.shard.poll_once().await, Some(Detection::NoShot));
    h.clock.advance(1_500);
    assert!(matches!(h.shard.poll_once().await, Some(Detection::Fire(_))));
    assert_eq!(h.shard.session().window_phase().name(), "OPEN");

    assert!(h.handle.send_gesture(gesture(ShotType::Normal)));
    assert!(h.shard.drain_inputs());

    // Polling the same state again must not reopen anything
    h.clock.advance(1_000);
    assert_eq!(h.shard.poll_once().await, Some(Detection::Duplicate));

    h.step(2_000);
    assert_eq!(h.shard.session().window_phase().name(), "RESOLVING");
    h.step(3_000);
    h.shard.wait_for_persistence().await;

    assert_eq!(h.shard.session().total(ParticipantLabel::Left), 2000);
    assert_eq!(h.shard.session().streaks().get(ParticipantLabel::Left), 1);
    assert_eq!(h.points.get("sess-1", 0).await.unwrap(), 2000);

    let records = h.shots.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].participant_id, "user-1");
    assert_eq!(records[0].points, 2000);
    assert_eq!(records[0].matched_gesture, Some(true));
    assert_eq!(records[0].clock.as_deref(), Some("PT05M23.00S"));

    assert_eq!(
        drain_kinds(&mut events),
        vec![
            "window_opened",
            "countdown_tick",
            "countdown_tick",
            "window_closed",
            "shot_result_available",
            "points_earned"
        ]
    );

    let display = h.shard.session().display_state();
    assert_eq!(display.points_earned, 2000);
    assert_eq!(display.points_earned_label.as_deref(), Some("Sam"));

    h.step(2_500);
    assert_eq!(drain_kinds(&mut events), vec!["display_reset"]);
}

#[tokio::test]
async fn test_totals_hydrate_from_store() {
    let points = Arc::new(InMemoryPointsStore::new());
    points.increment("sess-1", 0, 500).await.unwrap();
    let feed = ScriptedFeed::new(vec![made_three()]);
    let mut h = harness(FeedMode::Live, Some("sess-1"), feed, points);

    h.shard.hydrate_totals().await;
    assert_eq!(h.shard.session().total(ParticipantLabel::Left), 500);

    h.shard.poll_once().await;
    h.shard.record_gesture(gesture(ShotType::Dunk));
    h.step(3_000);
    h.step(3_000);
    h.shard.wait_for_persistence().await;

    // Made, wrong gesture: 1000 x 1.0 x 1.0 x 1.0
    assert_eq!(h.shard.session().total(ParticipantLabel::Left), 1500);
    assert_eq!(h.points.get("sess-1", 0).await.unwrap(), 1500);
}

#[tokio::test]
async fn test_no_session_skips_persistence() {
    let feed = ScriptedFeed::new(vec![made_three()]);
    let mut h = harness(FeedMode::Live, None, feed, Arc::new(InMemoryPointsStore::new()));

    h.shard.poll_once().await;
    h.shard.record_gesture(gesture(ShotType::Normal));
    h.step(6_000);
    h.shard.wait_for_persistence().await;

    assert_eq!(h.shard.session().total(ParticipantLabel::Left), 2000);
    assert!(h.shots.records().is_empty());
}

#[tokio::test]
async fn test_feed_failure_is_a_no_op() {
    let feed = ScriptedFeed::new(vec![made_three()]);
    feed.fail_next(2);
    let mut h = harness(FeedMode::Live, None, feed, Arc::new(InMemoryPointsStore::new()));

    assert_eq!(h.shard.poll_once().await, None);
    assert_eq!(h.shard.poll_once().await, None);
    assert!(h.shard.session().timeline().is_empty());
    assert!(matches!(h.shard.poll_once().await, Some(Detection::Fire(_))));
}

#[tokio::test]
async fn test_replay_walks_history_through_window() {
    let history = vec![
        HistoryItem::new(GameState::new(2, "PT06M00.00S"), Some("2024-11-02T01:00:00Z")),
        HistoryItem::new(made_three(), Some("2024-11-02T01:00:30Z")),
        HistoryItem::new(GameState::new(2, "PT05M00.00S"), Some("2024-11-02T01:01:00Z")),
    ];
    let feed = ScriptedFeed::with_history(history);
    let mut h = harness(FeedMode::Replay, None, feed, Arc::new(InMemoryPointsStore::new()));

    h.shard.bootstrap().await;
    assert_eq!(h.shard.session().timeline().len(), 3);
    assert!(h.shard.session().anchor().is_some());

    h.shard.tick();
    assert_eq!(h.shard.session().window_phase().name(), "CLOSED");

    h.step(30_000);
    assert_eq!(h.shard.session().window_phase().name(), "OPEN");
    assert_eq!(
        h.shard.session().displayed_state().map(|s| s.clock.as_str()),
        Some("PT05M23.00S")
    );
}

#[tokio::test]
async fn test_commands_update_session() {
    let feed = ScriptedFeed::new(vec![GameState::new(3, "PT08M00.00S"), GameState::new(3, "PT07M30.00S")]);
    let mut h = harness(FeedMode::Live, None, feed, Arc::new(InMemoryPointsStore::new()));
    h.shard.poll_once().await;
    h.clock.advance(5_000);
    h.shard.poll_once().await;

    h.handle
        .command(ShardCommand::SyncToClock {
            clock: "8:00".to_string(),
            period: Some(3),
        })
        .await
        .unwrap();
    h.handle.command(ShardCommand::SetStreamDelay(2.5)).await.unwrap();
    h.handle
        .command(ShardCommand::AssignSeat(ParticipantLabel::Right, Participant::new("user-2", None)))
        .await
        .unwrap();
    h.handle.command(ShardCommand::VacateSeat(ParticipantLabel::Left)).await.unwrap();
    assert!(h.shard.drain_inputs());

    let session = h.shard.session();
    assert_eq!(session.anchor().map(|a| a.wall_clock_at_reference), Some(h.clock.now_ms()));
    assert_eq!(session.stream_delay_ms(), 2_500);
    assert!(session.roster().is_occupied(ParticipantLabel::Right));
    assert!(!session.roster().is_occupied(ParticipantLabel::Left));

    h.handle.command(ShardCommand::ClearAnchor).await.unwrap();
    h.handle.shutdown().await.unwrap();
    assert!(!h.shard.drain_inputs());
    assert!(h.shard.session().anchor().is_none());
}

/// Points store that fails a fixed number of times before delegating
struct FlakyPointsStore {
    inner: InMemoryPointsStore,
    failures: AtomicU32,
}

#[async_trait]
impl PointsStore for FlakyPointsStore {
    async fn increment(&self, session_id: &str, slot: u8, delta: i64) -> Result<i64, StoreError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.increment(session_id, slot, delta).await
    }

    async fn get(&self, session_id: &str, slot: u8) -> Result<i64, StoreError> {
        self.inner.get(session_id, slot).await
    }
}

#[tokio::test]
async fn test_transient_store_failures_are_retried() {
    let flaky = Arc::new(FlakyPointsStore {
        inner: InMemoryPointsStore::new(),
        failures: AtomicU32::new(2),
    });
    let shots = Arc::new(InMemoryShotRecordStore::new());
    let clock = ManualClock::new(0);
    let mut config = SessionShardConfig::for_game("g", FeedMode::Live);
    config.session_id = Some("sess-9".to_string());
    config.seats = vec![(ParticipantLabel::Center, Participant::new("c", None))];
    let time: Arc<dyn TimeSource> = clock.clone();
    let (mut shard, _handle) = SessionShard::new(
        config,
        EngineConfig::default(),
        OddsModel::default(),
        Arc::new(ScriptedFeed::new(vec![made_three()])),
        Persistence::new(flaky.clone(), shots).with_backoff(3, 1),
        time,
    );

    shard.poll_once().await;
    shard.record_gesture(GestureEvent {
        label: Some(ParticipantLabel::Center),
        shot_type: Some(ShotType::Layup),
        timestamp: 0,
    });
    clock.advance(6_000);
    shard.tick();
    shard.wait_for_persistence().await;

    assert_eq!(flaky.get("sess-9", 1).await.unwrap(), 1000);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let mut config = SessionShardConfig::for_game("g", FeedMode::Simulated);
    config.seats = vec![(ParticipantLabel::Left, Participant::new("u", None))];
    let persistence = Persistence::new(
        Arc::new(InMemoryPointsStore::new()),
        Arc::new(InMemoryShotRecordStore::new()),
    );
    let (shard, handle) = SessionShard::new(
        config,
        EngineConfig::default(),
        OddsModel::default(),
        Arc::new(ScriptedFeed::new(vec![made_three()])),
        persistence,
        Arc::new(WallClock),
    );
    let mut events = handle.subscribe();

    let task = tokio::spawn(shard.run());
    handle.shutdown().await.unwrap();
    tokio_test::assert_ok!(task.await.unwrap());

    // The simulated fetch runs before the loop and opens the window at once
    let first = events.try_recv().unwrap();
    assert_eq!(first.kind(), "window_opened");
}

/// Milliseconds on tokio's clock, so paused-time tests stay consistent
struct TokioClock {
    start: tokio::time::Instant,
}

impl TimeSource for TokioClock {
    fn now_ms(&self) -> i64 {
        1_700_000_000_000 + self.start.elapsed().as_millis() as i64
    }
}

/// Feed that answers the first fetch at once and then takes 4s per fetch
struct SlowFeed {
    calls: AtomicU32,
}

#[async_trait]
impl GameFeed for SlowFeed {
    async fn latest_state(&self, _game_id: &str) -> Result<GameState, FeedError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_secs(4)).await;
        }
        Ok(made_three())
    }

    async fn state_at(&self, game_id: &str, _timestamp: i64) -> Result<GameState, FeedError> {
        self.latest_state(game_id).await
    }

    async fn history(&self, _game_id: &str) -> Result<Vec<HistoryItem>, FeedError> {
        Ok(Vec::new())
    }

    fn feed_name(&self) -> &str {
        "slow"
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_feed_does_not_stall_window() {
    let mut config = SessionShardConfig::for_game("g", FeedMode::Live);
    config.seats = vec![(ParticipantLabel::Left, Participant::new("u", None))];
    let persistence = Persistence::new(
        Arc::new(InMemoryPointsStore::new()),
        Arc::new(InMemoryShotRecordStore::new()),
    );
    let time: Arc<dyn TimeSource> = Arc::new(TokioClock {
        start: tokio::time::Instant::now(),
    });
    let (shard, handle) = SessionShard::new(
        config,
        EngineConfig::default(),
        OddsModel::default(),
        Arc::new(SlowFeed {
            calls: AtomicU32::new(0),
        }),
        persistence,
        time,
    );
    let mut events = handle.subscribe();
    let task = tokio::spawn(shard.run());

    let opened = events.recv().await.unwrap();
    assert_eq!(opened.kind(), "window_opened");
    let opened_at = tokio::time::Instant::now();

    // The second fetch is still hanging while this gesture arrives
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(handle.send_gesture(gesture(ShotType::Normal)));

    let mut closed_after = None;
    let mut earned = None;
    while earned.is_none() {
        match events.recv().await.unwrap() {
            SessionEvent::WindowClosed => closed_after = Some(opened_at.elapsed()),
            SessionEvent::PointsEarned { deltas, .. } => earned = Some(deltas),
            _ => {}
        }
    }

    let closed_after = closed_after.unwrap();
    assert!(closed_after <= Duration::from_millis(3_100), "closed after {:?}", closed_after);
    assert_eq!(earned.unwrap()[&ParticipantLabel::Left], 2000);

    handle.shutdown().await.unwrap();
    tokio_test::assert_ok!(task.await.unwrap());
}
