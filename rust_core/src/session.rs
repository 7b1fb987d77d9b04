//! One game session: the single owner of timeline, anchor, detector,
//! prediction window, streaks and display state.
//!
//! Every operation reads "now" from the injected `TimeSource` and never
//! fails. I/O happens outside: the runtime feeds states and gestures in,
//! drains `SessionEvent`s for presentation and `ResolvedShot`s for
//! persistence.

use crate::anchor::{ClockAnchor, ClockSync};
use crate::clients::HistoryItem;
use crate::clock::format_clock;
use crate::config::{EngineConfig, UNTIMED_HISTORY_SPAN_MS};
use crate::detector::{DetectedShot, Detection, DetectionContext, ShotDetector};
use crate::display::{reduce, ActiveShotOdds, ShotDisplay, ShotExperienceState, Transition};
use crate::events::{PointsPopup, SessionEvent};
use crate::models::{GameState, GestureEvent, ParticipantLabel, Prediction, ShotEvent};
use crate::odds::{OddsModel, ShootingOdds};
use crate::roster::{Participant, Roster};
use crate::scoring::{Resolution, ScoringEngine, ShotOutcome, StreakState};
use crate::store::ShotRecord;
use crate::time::TimeSource;
use crate::timeline::GameStateTimeline;
use crate::window::{PredictionSnapshot, PredictionWindow, WindowPhase, WindowStep};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Poll the live game
    Live,
    /// Single fetch of a recorded game at a fixed timestamp; already time-aligned
    Simulated,
    /// Bulk-load the full history and play it back in real time
    Replay,
}

impl FeedMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "live" => Some(FeedMode::Live),
            "simulated" | "test" => Some(FeedMode::Simulated),
            "replay" => Some(FeedMode::Replay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedMode::Live => "live",
            FeedMode::Simulated => "simulated",
            FeedMode::Replay => "replay",
        }
    }
}

/// Shot currently running through the window
#[derive(Debug, Clone)]
struct ActiveShot {
    detected: DetectedShot,
    odds: ShootingOdds,
}

/// Everything persistence needs about one scored shot
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedShot {
    pub session_id: Option<String>,
    pub shot: DetectedShot,
    pub resolution: Resolution,
    /// Non-zero deltas keyed by storage slot
    pub slot_deltas: Vec<(u8, i64)>,
    pub records: Vec<ShotRecord>,
}

pub struct GameSession {
    game_id: String,
    session_id: Option<String>,
    mode: FeedMode,
    config: EngineConfig,
    time: Arc<dyn TimeSource>,

    timeline: GameStateTimeline,
    sync: ClockSync,
    stream_delay_ms: i64,
    displayed_seq: Option<u64>,

    detector: ShotDetector,
    pending_shots: VecDeque<DetectedShot>,
    active_shot: Option<ActiveShot>,
    window: PredictionWindow,

    odds_model: OddsModel,
    scoring: ScoringEngine,
    roster: Roster,
    streaks: StreakState,
    totals: BTreeMap<ParticipantLabel, i64>,

    display: ShotExperienceState,
    timers: Vec<(i64, Transition)>,

    events: Vec<SessionEvent>,
    resolved: Vec<ResolvedShot>,
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("game_id", &self.game_id)
            .field("session_id", &self.session_id)
            .field("mode", &self.mode)
            .field("timeline_len", &self.timeline.len())
            .field("anchor", &self.sync.current())
            .field("window", &self.window.phase().name())
            .field("pending_shots", &self.pending_shots.len())
            .finish()
    }
}

impl GameSession {
    pub fn new(
        game_id: &str,
        session_id: Option<String>,
        mode: FeedMode,
        config: EngineConfig,
        odds_model: OddsModel,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            game_id: game_id.to_string(),
            session_id,
            mode,
            timeline: GameStateTimeline::new(config.timeline_capacity),
            sync: ClockSync::new(),
            stream_delay_ms: 0,
            displayed_seq: None,
            detector: ShotDetector::new(config.seen_shot_memory, config.popup_lead_ms, config.stale_cutoff_ms),
            pending_shots: VecDeque::new(),
            active_shot: None,
            window: PredictionWindow::new(
                config.prediction_buffer,
                config.countdown_ticks,
                config.countdown_tick_ms,
                config.reveal_delay_ms,
            ),
            odds_model,
            scoring: ScoringEngine::new(config.base_points),
            roster: Roster::new(),
            streaks: StreakState::default(),
            totals: BTreeMap::new(),
            display: ShotExperienceState::default(),
            timers: Vec::new(),
            events: Vec::new(),
            resolved: Vec::new(),
            config,
            time,
        }
    }

    fn now(&self) -> i64 {
        self.time.now_ms()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    pub fn timeline(&self) -> &GameStateTimeline {
        &self.timeline
    }

    pub fn anchor(&self) -> Option<&ClockAnchor> {
        self.sync.current()
    }

    pub fn stream_delay_ms(&self) -> i64 {
        self.stream_delay_ms
    }

    pub fn window_phase(&self) -> &WindowPhase {
        self.window.phase()
    }

    pub fn display_state(&self) -> &ShotExperienceState {
        &self.display
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn streaks(&self) -> &StreakState {
        &self.streaks
    }

    pub fn total(&self, label: ParticipantLabel) -> i64 {
        self.totals.get(&label).copied().unwrap_or(0)
    }

    pub fn pending_shots(&self) -> usize {
        self.pending_shots.len()
    }

    /// State the viewer currently sees (delayed playback position)
    pub fn displayed_state(&self) -> Option<&GameState> {
        let seq = self.displayed_seq?;
        self.timeline.iter().find(|s| s.seq == seq).map(|s| &s.state)
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn drain_resolved(&mut self) -> Vec<ResolvedShot> {
        std::mem::take(&mut self.resolved)
    }

    // ------------------------------------------------------------------
    // Feed ingestion
    // ------------------------------------------------------------------

    /// Record a freshly polled state and check it for a new shot.
    pub fn ingest_live_state(&mut self, state: GameState) -> Detection {
        let now = self.now();
        self.timeline.push(state.clone(), now);
        let detection = self.detect(&state, now, false);
        self.handle_detection(&detection);
        self.advance();
        detection
    }

    /// Replace the timeline with a historical load and anchor playback at its start.
    ///
    /// Timestamps keep their relative spacing from `now`; untimed histories are
    /// spread evenly over 15 minutes.
    pub fn load_history(&mut self, items: Vec<HistoryItem>) -> usize {
        let now = self.now();
        let count = items.len();
        if count == 0 {
            warn!("Historical load for {} returned no states", self.game_id);
            return 0;
        }

        let first = items.first().and_then(|i| i.timestamp_ms());
        let last = items.last().and_then(|i| i.timestamp_ms());
        let samples: Vec<(GameState, i64)> = match (first, last) {
            (Some(first), Some(last)) => {
                info!(
                    "Loaded {} historical states ({:.1} minutes)",
                    count,
                    (last - first) as f64 / 60_000.0
                );
                let mut previous = now;
                items
                    .into_iter()
                    .map(|item| {
                        // Items missing a time inherit the previous mapped time
                        let ts = item.timestamp_ms().map(|t| now + (t - first)).unwrap_or(previous);
                        previous = ts;
                        (item.state, ts)
                    })
                    .collect()
            }
            _ => {
                let spacing = UNTIMED_HISTORY_SPAN_MS as f64 / count as f64;
                info!("Loaded {} untimed historical states, spacing {:.0}ms", count, spacing);
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| (item.state, now + (i as f64 * spacing) as i64))
                    .collect()
            }
        };

        self.timeline.reset(samples);
        self.sync.set(ClockAnchor::new(now, now));
        self.displayed_seq = None;
        count
    }

    /// Walk delayed playback forward to the sample the viewer is seeing now.
    ///
    /// Returns true when the displayed sample changed.
    pub fn playback_tick(&mut self) -> bool {
        let now = self.now();
        let projection = self.sync.project(now, self.stream_delay_ms, &self.timeline);
        let sample = match projection {
            Some(p) => self.timeline.find_nearest_by_timestamp(p.target_timestamp),
            None => self.timeline.latest(),
        };
        let (seq, timestamp, state) = match sample {
            Some(s) => (s.seq, s.timestamp, s.state.clone()),
            None => return false,
        };
        if self.displayed_seq == Some(seq) {
            return false;
        }
        self.displayed_seq = Some(seq);

        debug!(
            "Playback -> Q{} {} (score {}-{}){}",
            state.period,
            format_clock(&state.clock),
            state.score.home,
            state.score.away,
            if projection.map(|p| p.clamped).unwrap_or(false) {
                " [clamped to latest]"
            } else {
                ""
            }
        );

        if self.sync.is_active() || self.mode != FeedMode::Live {
            let detection = self.detect(&state, timestamp, true);
            self.handle_detection(&detection);
        }
        self.advance();
        true
    }

    fn detect(&mut self, state: &GameState, timestamp: i64, from_delayed_feed: bool) -> Detection {
        let anchor = self.sync.current().copied();
        let ctx = DetectionContext {
            simulated: self.mode == FeedMode::Simulated,
            anchor: anchor.as_ref(),
            stream_delay_ms: self.stream_delay_ms,
            now: self.now(),
        };
        self.detector.check_for_new_shot(state, timestamp, from_delayed_feed, &ctx)
    }

    fn handle_detection(&mut self, detection: &Detection) {
        let shot = match detection {
            Detection::Fire(shot) => shot.clone(),
            _ => return,
        };
        if self.pending_shots.len() >= self.config.pending_shot_limit.max(1) {
            if let Some(dropped) = self.pending_shots.pop_front() {
                warn!("Shot queue full, dropping {}", dropped.identity.key());
            }
        }
        info!(
            "Shot detected: {} {} at Q{} {} (window in {}ms)",
            shot.identity.player_name,
            shot.identity.shot_result,
            shot.period,
            format_clock(&shot.clock),
            shot.popup_delay_ms
        );
        self.pending_shots.push_back(shot);
    }

    // ------------------------------------------------------------------
    // Anchor control
    // ------------------------------------------------------------------

    pub fn sync_to_clock(&mut self, clock: &str, period: Option<u32>) -> Option<ClockAnchor> {
        let now = self.now();
        let anchor = self.sync.sync_to(clock, period, &self.timeline, now);
        if anchor.is_some() {
            self.playback_tick();
        }
        anchor
    }

    pub fn clear_anchor(&mut self) {
        self.sync.clear();
    }

    pub fn set_stream_delay(&mut self, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        self.stream_delay_ms = (seconds * 1000.0).round() as i64;
        info!("Stream delay set to {:.1}s", seconds);
    }

    // ------------------------------------------------------------------
    // Seats and gestures
    // ------------------------------------------------------------------

    pub fn assign_seat(&mut self, label: ParticipantLabel, participant: Participant) {
        let changed = self
            .roster
            .get(label)
            .map(|p| p.id != participant.id)
            .unwrap_or(true);
        if changed {
            self.streaks.reset(label);
            self.totals.remove(&label);
        }
        self.roster.assign(label, participant);
    }

    pub fn vacate_seat(&mut self, label: ParticipantLabel) {
        if self.roster.vacate(label).is_some() {
            self.streaks.reset(label);
            self.totals.remove(&label);
        }
    }

    /// Seed a seat's running total, e.g. from the points store on startup
    pub fn set_total(&mut self, label: ParticipantLabel, total: i64) {
        self.totals.insert(label, total);
    }

    /// Record a gesture. Dropped unless the window is OPEN and the seat is occupied.
    pub fn record_prediction(&mut self, gesture: GestureEvent) -> bool {
        let label = match gesture.label {
            Some(label) if self.roster.is_occupied(label) => label,
            Some(label) => {
                debug!("Gesture from empty seat {} dropped", label);
                return false;
            }
            None => return false,
        };

        let (period, clock) = self
            .displayed_state()
            .or_else(|| self.timeline.latest().map(|s| &s.state))
            .map(|s| (s.period, s.clock.clone()))
            .unwrap_or((1, String::new()));

        self.window.record(
            Some(label),
            Prediction {
                timestamp: gesture.timestamp,
                period,
                clock,
                shot_type: gesture.shot_type,
            },
        )
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Earliest instant `advance` has work to do
    pub fn next_deadline(&self) -> Option<i64> {
        let window = self.window.next_deadline();
        let shot = if self.window.is_closed() {
            self.pending_shots.front().map(|s| s.opens_at())
        } else {
            None
        };
        let timer = self.timers.first().map(|(at, _)| *at);
        [window, shot, timer].into_iter().flatten().min()
    }

    /// Run every transition that is due, in time order.
    pub fn advance(&mut self) {
        loop {
            let now = self.now();
            let mut progressed = false;

            while let Some(step) = self.window.advance(now) {
                self.on_window_step(step, now);
                progressed = true;
            }
            if self.window.is_closed() && self.open_next_shot(now) {
                progressed = true;
            }
            while let Some((at, _)) = self.timers.first() {
                if *at > now {
                    break;
                }
                let (_, transition) = self.timers.remove(0);
                self.fire_timer(transition);
                progressed = true;
            }

            if !progressed {
                break;
            }
        }
    }

    fn schedule(&mut self, at: i64, transition: Transition) {
        let idx = self.timers.partition_point(|(t, _)| *t <= at);
        self.timers.insert(idx, (at, transition));
    }

    fn apply(&mut self, transition: Transition) {
        let state = std::mem::take(&mut self.display);
        self.display = reduce(state, transition);
    }

    fn fire_timer(&mut self, transition: Transition) {
        if transition == Transition::DisplayReset {
            self.events.push(SessionEvent::DisplayReset);
        }
        self.apply(transition);
    }

    fn open_next_shot(&mut self, now: i64) -> bool {
        while let Some(front) = self.pending_shots.front() {
            let opens_at = front.opens_at();
            if opens_at > now {
                return false;
            }
            let shot = match self.pending_shots.pop_front() {
                Some(shot) => shot,
                None => return false,
            };
            if now - opens_at > self.config.stale_cutoff_ms {
                warn!(
                    "Queued shot {} went stale waiting {}ms, skipping",
                    shot.identity.key(),
                    now - opens_at
                );
                continue;
            }
            self.open_window(shot, now);
            return true;
        }
        false
    }

    fn open_window(&mut self, detected: DetectedShot, now: i64) {
        let odds = self.odds_model.odds_for_shot(&detected.shot);
        let is_three = detected.shot.shot_class().is_three();
        let shooter = detected.identity.player_name.clone();
        let prompt = ActiveShotOdds::new(&shooter, &odds, is_three);

        if !self.window.open(now) {
            return;
        }
        info!(
            "Window open for {} ({}, reward x{:.2} / loss x{:.2})",
            shooter,
            if is_three { "3PT" } else { "2PT" },
            odds.reward_multiplier,
            odds.loss_multiplier
        );

        let countdown = self.window.countdown_ticks();
        self.events.push(SessionEvent::WindowOpened {
            countdown,
            odds: prompt.clone(),
            shooter,
            is_three,
        });
        self.apply(Transition::WindowOpened {
            countdown,
            odds: prompt,
        });
        self.active_shot = Some(ActiveShot { detected, odds });
    }

    fn on_window_step(&mut self, step: WindowStep, now: i64) {
        match step {
            WindowStep::Tick { remaining } => {
                self.events.push(SessionEvent::CountdownTick { remaining });
                self.apply(Transition::CountdownTick { remaining });
            }
            WindowStep::Closed { .. } => {
                self.events.push(SessionEvent::WindowClosed);
                self.apply(Transition::WindowClosed);
            }
            WindowStep::Resolve(snapshot) => match self.active_shot.take() {
                Some(active) => self.resolve_shot(active, &snapshot, now),
                None => warn!("Window resolved with no active shot"),
            },
        }
    }

    fn resolve_shot(&mut self, active: ActiveShot, snapshot: &PredictionSnapshot, now: i64) {
        let shot = &active.detected.shot;
        let outcome = ShotOutcome {
            is_made: shot.is_made(),
            actual_shot_type: shot.gesture_class(),
        };
        let occupied = self.roster.occupied();
        let resolution = self
            .scoring
            .resolve(outcome, snapshot, &occupied, &self.streaks, &active.odds);

        self.streaks = resolution.next_streaks.clone();
        for (label, delta) in &resolution.deltas {
            *self.totals.entry(*label).or_insert(0) += delta;
        }

        info!(
            "Resolved {} {}: {} participant(s), deltas {:?}",
            active.detected.identity.player_name,
            if outcome.is_made { "MADE" } else { "MISSED" },
            resolution.participants.len(),
            resolution.deltas
        );

        self.events.push(SessionEvent::ShotResultAvailable {
            made: outcome.is_made,
            shot_type: outcome.actual_shot_type,
            points: shot.points,
            shooter: active.detected.identity.player_name.clone(),
            team: shot.team_tricode.clone(),
        });

        let popup = resolution.popup.map(|p| PointsPopup {
            label: self.roster.popup_label(p.label),
            value: p.value,
        });
        let participated = !resolution.participants.is_empty();
        if participated {
            self.events.push(SessionEvent::PointsEarned {
                deltas: resolution.deltas.clone(),
                display: resolution.display.clone(),
                popup: popup.clone(),
            });
        }

        self.apply(Transition::OutcomeResolved {
            shot: shot_display(&active.detected),
            made: outcome.is_made,
            seats: resolution.display.clone(),
            streaks: self.streaks.clone(),
            lanes: resolution.lanes.clone(),
            popup: popup.map(|p| (p.label, p.value)),
        });

        self.schedule(now + self.config.result_overlay_ms, Transition::ResultCleared);
        self.schedule(now + self.config.lane_points_reset_ms, Transition::LaneReset);
        if participated {
            self.schedule(now + self.config.player_display_reset_ms, Transition::DisplayReset);
            if resolution.popup.is_some() {
                self.schedule(now + self.config.points_earned_overlay_ms, Transition::PointsEarnedCleared);
            }
            if outcome.is_made {
                self.schedule(now + self.config.money_rain_ms, Transition::MoneyRainCleared);
            }

            let records = self.shot_records(&active.detected, &resolution, snapshot);
            let slot_deltas = resolution
                .deltas
                .iter()
                .filter(|(_, delta)| **delta != 0)
                .map(|(label, delta)| (label.slot(), *delta))
                .collect();
            self.resolved.push(ResolvedShot {
                session_id: self.session_id.clone(),
                shot: active.detected.clone(),
                resolution,
                slot_deltas,
                records,
            });
        }
    }

    fn shot_records(
        &self,
        detected: &DetectedShot,
        resolution: &Resolution,
        snapshot: &PredictionSnapshot,
    ) -> Vec<ShotRecord> {
        let actual = resolution.outcome.actual_shot_type;
        resolution
            .participants
            .iter()
            .filter_map(|label| {
                let participant = self.roster.get(*label)?;
                let predicted = snapshot.latest(*label).and_then(|p| p.shot_type);
                Some(ShotRecord {
                    participant_id: participant.id.clone(),
                    game_id: self.game_id.clone(),
                    session_id: self.session_id.clone(),
                    made: resolution.outcome.is_made,
                    points: resolution.deltas.get(label).copied().unwrap_or(0),
                    shot_type_actual: Some(actual.as_str().to_string()),
                    shot_type_predicted: predicted.map(|t| t.as_str().to_string()),
                    matched_gesture: Some(predicted == Some(actual)),
                    period: Some(detected.period.to_string()),
                    clock: Some(detected.clock.clone()),
                })
            })
            .collect()
    }
}

fn shot_display(detected: &DetectedShot) -> ShotDisplay {
    let shot: &ShotEvent = &detected.shot;
    ShotDisplay {
        player_name: detected.identity.player_name.clone(),
        team_tricode: shot.team_tricode.clone(),
        shot_result: shot.shot_result.clone().unwrap_or_else(|| "Unknown".to_string()),
        shot_type: shot.shot_type.clone(),
        gesture_class: shot.gesture_class(),
        points: shot.points,
    }
}
