use crate::config::SessionShardConfig;
use crate::persist::Persistence;
use anyhow::Result;
use courtcall_core::clients::{GameFeed, HttpGameFeed};
use courtcall_core::config::EngineConfig;
use courtcall_core::detector::Detection;
use courtcall_core::events::SessionEvent;
use courtcall_core::models::{GameState, GestureEvent, ParticipantLabel};
use courtcall_core::odds::{OddsModel, PlayerStatsBook};
use courtcall_core::roster::Participant;
use courtcall_core::session::{FeedMode, GameSession};
use courtcall_core::store::{HttpPointsStore, HttpShotRecordStore};
use courtcall_core::time::{TimeSource, WallClock};
use courtcall_core::FeedError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const COMMAND_CHANNEL_CAPACITY: usize = 32;
/// Upper bound on a single idle wait when nothing is scheduled
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Control commands for a running shard
#[derive(Debug, Clone, PartialEq)]
pub enum ShardCommand {
    SyncToClock { clock: String, period: Option<u32> },
    ClearAnchor,
    SetStreamDelay(f64),
    AssignSeat(ParticipantLabel, Participant),
    VacateSeat(ParticipantLabel),
    Shutdown,
}

/// Cloneable handle for talking to a shard task
#[derive(Clone)]
pub struct ShardHandle {
    commands: mpsc::Sender<ShardCommand>,
    gestures: mpsc::Sender<GestureEvent>,
    events: broadcast::Sender<SessionEvent>,
}

impl ShardHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Queue a gesture; dropped when the intake channel is full
    pub fn send_gesture(&self, gesture: GestureEvent) -> bool {
        match self.gestures.try_send(gesture) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Gesture channel full, dropping gesture");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub async fn command(&self, command: ShardCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("session shard has stopped"))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.command(ShardCommand::Shutdown).await
    }
}

/// Single task that owns one `GameSession` and everything feeding it
pub struct SessionShard {
    config: SessionShardConfig,
    session: GameSession,
    feed: Arc<dyn GameFeed>,
    persistence: Persistence,
    time: Arc<dyn TimeSource>,
    gestures: mpsc::Receiver<GestureEvent>,
    commands: mpsc::Receiver<ShardCommand>,
    events: broadcast::Sender<SessionEvent>,
    persist_tasks: Vec<JoinHandle<()>>,
    bootstrapped: bool,
    /// Live fetches run off the owner task and report back here
    poll_tx: mpsc::Sender<Result<GameState, FeedError>>,
    poll_rx: mpsc::Receiver<Result<GameState, FeedError>>,
    poll_in_flight: bool,
}

impl SessionShard {
    pub fn new(
        config: SessionShardConfig,
        engine: EngineConfig,
        odds_model: OddsModel,
        feed: Arc<dyn GameFeed>,
        persistence: Persistence,
        time: Arc<dyn TimeSource>,
    ) -> (Self, ShardHandle) {
        let (gesture_tx, gesture_rx) = mpsc::channel(config.gesture_channel_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let (poll_tx, poll_rx) = mpsc::channel(1);

        let mut session = GameSession::new(
            &config.game_id,
            config.session_id.clone(),
            config.feed_mode,
            engine,
            odds_model,
            time.clone(),
        );
        session.set_stream_delay(config.stream_delay_secs);
        for (label, participant) in &config.seats {
            session.assign_seat(*label, participant.clone());
        }

        let handle = ShardHandle {
            commands: command_tx,
            gestures: gesture_tx,
            events: event_tx.clone(),
        };
        let shard = Self {
            config,
            session,
            feed,
            persistence,
            time,
            gestures: gesture_rx,
            commands: command_rx,
            events: event_tx,
            persist_tasks: Vec::new(),
            bootstrapped: false,
            poll_tx,
            poll_rx,
            poll_in_flight: false,
        };
        (shard, handle)
    }

    /// Wire the HTTP collaborators and the wall clock from configuration
    pub fn from_config(config: SessionShardConfig) -> (Self, ShardHandle) {
        let feed = Arc::new(HttpGameFeed::with_config(
            &config.feed_base_url,
            config.feed_circuit_breaker.clone(),
        ));
        let persistence = Persistence::new(
            Arc::new(HttpPointsStore::new(&config.store_base_url)),
            Arc::new(HttpShotRecordStore::new(&config.store_base_url)),
        );
        let odds_model = OddsModel::new(PlayerStatsBook::load_or_empty(config.player_stats_path.as_deref()));
        Self::new(
            config,
            EngineConfig::default(),
            odds_model,
            feed,
            persistence,
            Arc::new(WallClock),
        )
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub async fn run(mut self) -> Result<()> {
        info!(
            "Starting SessionShard {} for game {} ({} mode, feed {})",
            self.config.shard_id,
            self.config.game_id,
            self.config.feed_mode.as_str(),
            self.feed.feed_name()
        );

        self.hydrate_totals().await;
        self.bootstrap().await;

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut playback = tokio::time::interval(self.config.playback_tick);
        playback.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let polling = self.config.feed_mode == FeedMode::Live || !self.bootstrapped;
            let wait = self.until_next_deadline();

            tokio::select! {
                _ = poll.tick(), if polling => {
                    if self.config.feed_mode == FeedMode::Live {
                        self.spawn_poll();
                    } else {
                        self.bootstrap().await;
                    }
                }
                Some(result) = self.poll_rx.recv() => {
                    self.poll_in_flight = false;
                    self.apply_poll(result);
                }
                _ = playback.tick() => {
                    self.drain_gestures();
                    self.session.playback_tick();
                }
                _ = tokio::time::sleep(wait) => {
                    // Gestures already queued belong to the window being advanced
                    self.drain_gestures();
                    self.session.advance();
                }
                Some(gesture) = self.gestures.recv() => {
                    self.record_gesture(gesture);
                }
                command = self.commands.recv() => match command {
                    Some(ShardCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                _ = heartbeat.tick() => self.log_status(),
            }

            self.flush();
        }

        info!("SessionShard {} shutting down", self.config.shard_id);
        self.flush();
        self.wait_for_persistence().await;
        Ok(())
    }

    fn until_next_deadline(&self) -> Duration {
        match self.session.next_deadline() {
            Some(deadline) => {
                let wait_ms = (deadline - self.time.now_ms()).max(0) as u64;
                Duration::from_millis(wait_ms)
            }
            None => IDLE_WAIT,
        }
    }

    /// Seed in-memory totals from the points store for occupied seats
    pub async fn hydrate_totals(&mut self) {
        let session_id = match self.config.session_id.clone() {
            Some(id) => id,
            None => return,
        };
        for label in self.session.roster().occupied() {
            match self.persistence.points_store().get(&session_id, label.slot()).await {
                Ok(total) => {
                    debug!("Seat {} starts at {} points", label, total);
                    self.session.set_total(label, total);
                }
                Err(e) => warn!("Could not load points for seat {}: {}", label, e),
            }
        }
    }

    /// Initial load for simulated and replay sessions. Retried on the poll
    /// interval until it succeeds.
    pub async fn bootstrap(&mut self) {
        if self.bootstrapped {
            return;
        }
        let game_id = self.config.game_id.clone();
        match self.config.feed_mode {
            FeedMode::Live => {
                self.bootstrapped = true;
            }
            FeedMode::Simulated => {
                let at = self.config.simulated_timestamp.unwrap_or_else(|| self.time.now_ms());
                match self.feed.state_at(&game_id, at).await {
                    Ok(state) => {
                        info!("Simulated state for {} at {}: Q{} {}", game_id, at, state.period, state.clock);
                        self.session.ingest_live_state(state);
                        self.bootstrapped = true;
                    }
                    Err(e) => warn!("Simulated fetch for {} failed: {}", game_id, e),
                }
            }
            FeedMode::Replay => match self.feed.history(&game_id).await {
                Ok(items) if !items.is_empty() => {
                    self.session.load_history(items);
                    self.bootstrapped = true;
                }
                Ok(_) => warn!("No history for {} yet", game_id),
                Err(e) => warn!("History load for {} failed: {}", game_id, e),
            },
        }
        self.flush();
    }

    /// Start a live fetch in the background. At most one is in flight; a slow
    /// feed never holds up timers or gesture intake.
    fn spawn_poll(&mut self) {
        if self.poll_in_flight {
            debug!("Previous feed poll for {} still running", self.config.game_id);
            return;
        }
        self.poll_in_flight = true;
        let feed = self.feed.clone();
        let game_id = self.config.game_id.clone();
        let tx = self.poll_tx.clone();
        tokio::spawn(async move {
            let result = feed.latest_state(&game_id).await;
            // Receiver only goes away when the shard stops
            let _ = tx.send(result).await;
        });
    }

    /// One live poll of the feed, awaited in place
    pub async fn poll_once(&mut self) -> Option<Detection> {
        let result = self.feed.latest_state(&self.config.game_id).await;
        self.apply_poll(result)
    }

    fn apply_poll(&mut self, result: Result<GameState, FeedError>) -> Option<Detection> {
        match result {
            Ok(state) => {
                self.drain_gestures();
                let detection = self.session.ingest_live_state(state);
                self.flush();
                Some(detection)
            }
            Err(FeedError::CircuitOpen(name)) => {
                debug!("Feed circuit {} open, skipping poll", name);
                None
            }
            Err(e) => {
                warn!("Feed poll failed for {}: {}", self.config.game_id, e);
                None
            }
        }
    }

    /// Run playback and due timers at the current time
    pub fn tick(&mut self) {
        self.session.playback_tick();
        self.session.advance();
        self.flush();
    }

    pub fn record_gesture(&mut self, gesture: GestureEvent) -> bool {
        let recorded = self.session.record_prediction(gesture);
        if !recorded {
            debug!("Gesture ignored (window {})", self.session.window_phase().name());
        }
        recorded
    }

    /// Pull every queued gesture and command without blocking.
    ///
    /// Returns false once a shutdown has been received.
    pub fn drain_inputs(&mut self) -> bool {
        self.drain_gestures();
        while let Ok(command) = self.commands.try_recv() {
            if command == ShardCommand::Shutdown {
                return false;
            }
            self.handle_command(command);
        }
        self.flush();
        true
    }

    fn drain_gestures(&mut self) {
        while let Ok(gesture) = self.gestures.try_recv() {
            self.record_gesture(gesture);
        }
    }

    pub fn handle_command(&mut self, command: ShardCommand) {
        match command {
            ShardCommand::SyncToClock { clock, period } => {
                if self.session.sync_to_clock(&clock, period).is_none() {
                    warn!("Could not sync to {} (period {:?}): no matching state", clock, period);
                }
            }
            ShardCommand::ClearAnchor => {
                info!("Clock anchor cleared");
                self.session.clear_anchor();
            }
            ShardCommand::SetStreamDelay(secs) => self.session.set_stream_delay(secs.clamp(0.0, 120.0)),
            ShardCommand::AssignSeat(label, participant) => {
                info!("Seat {} -> {}", label, participant.id);
                self.session.assign_seat(label, participant);
            }
            ShardCommand::VacateSeat(label) => {
                info!("Seat {} vacated", label);
                self.session.vacate_seat(label);
            }
            ShardCommand::Shutdown => {}
        }
    }

    /// Forward drained events and hand resolutions to persistence
    fn flush(&mut self) {
        for event in self.session.drain_events() {
            debug!("Event: {}", event.kind());
            // No subscribers is fine
            let _ = self.events.send(event);
        }
        self.persist_tasks.retain(|task| !task.is_finished());
        for resolved in self.session.drain_resolved() {
            if resolved.session_id.is_none() {
                continue;
            }
            self.persist_tasks.push(self.persistence.spawn(resolved));
        }
    }

    /// Wait for every in-flight persistence write
    pub async fn wait_for_persistence(&mut self) {
        for task in self.persist_tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Persistence task panicked: {}", e);
            }
        }
    }

    fn log_status(&self) {
        info!(
            "[{}] timeline={} anchor={} window={} queued={} seats={}",
            self.config.game_id,
            self.session.timeline().len(),
            self.session.anchor().is_some(),
            self.session.window_phase().name(),
            self.session.pending_shots(),
            self.session.roster().len()
        );
    }
}
