//! One active room's lifecycle, owned end to end by a single controller
//! instance: search timeout and bot backfill, the round countdown, answer
//! collection, completion detection racing the hard deadline, score commits,
//! and teardown.
//!
//! The room document is the only shared mutable resource. Every decision
//! re-fetches the freshest document immediately before composing an update;
//! the store offers no compare-and-swap, so concurrent writers remain a
//! documented best-effort limitation. Client-side mutable state is limited to
//! the scoring in-progress flag and the timer handles below, both torn down
//! on every exit path.

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, SystemTime};

use rand::Rng;
use tokio::{
    sync::watch,
    task::AbortHandle,
    time::{Instant, sleep},
};
use tracing::{debug, error, info, warn};

use crate::{
    config::AppConfig,
    dao::{
        models::{ROOM_CAPACITY, RoomEntity, RoomMode, RoomPatch, RoundKind},
        room_store::{RoomSignal, RoomStore, RoomSubscription},
    },
    error::ServiceError,
    oracle::AnswerOracle,
    services::{matchmaking, scoring},
    state::{
        room::{Room, UserIdentity},
        state_machine::{RoomEvent, RoomState, advance},
    },
};

/// Matchmaking search window before empty seats get synthetic players.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
/// UI-transition delay between `starting` and the live round.
const START_COUNTDOWN: Duration = Duration::from_secs(3);
/// Bounds of the random delay before synthetic answers are written.
const BOT_ANSWER_DELAY_SECS: std::ops::RangeInclusive<u64> = 1..=3;
/// Hard deadline after which scoring is forced.
const ROUND_DEADLINE: Duration = Duration::from_secs(22);
/// Minimum time a round stays open even when every human answered.
const MIN_DWELL: Duration = Duration::from_secs(10);
/// How long a finished private room lingers before deletion.
const FINISHED_ROOM_TTL: Duration = Duration::from_secs(5 * 60);

/// Plausible words written directly when the oracle path fails, so a round
/// can never stall waiting on synthetic answers.
const EMERGENCY_ANSWERS: &[&str] = &["su", "elma", "kedi", "mavi"];

/// Matchmaking progress surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchStatus {
    /// Whether a matchmaking search is running.
    pub searching: bool,
    /// Seconds until empty seats are filled with synthetic players.
    pub seconds_left: u32,
}

#[derive(Default)]
struct TimerSlots {
    search: Option<AbortHandle>,
    start: Option<AbortHandle>,
    bots: Option<AbortHandle>,
    deadline: Option<AbortHandle>,
    dwell: Option<AbortHandle>,
    cleanup: Option<AbortHandle>,
    pump: Option<AbortHandle>,
}

impl TimerSlots {
    fn set(slot: &mut Option<AbortHandle>, handle: AbortHandle) {
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    fn abort_round_triggers(&mut self) {
        for slot in [&mut self.bots, &mut self.deadline, &mut self.dwell] {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }

    fn abort_all(&mut self) {
        for slot in [
            &mut self.search,
            &mut self.start,
            &mut self.bots,
            &mut self.deadline,
            &mut self.dwell,
            &mut self.cleanup,
            &mut self.pump,
        ] {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// Clears the scoring in-progress flag on every exit path, including panics,
/// so a failed computation can never wedge the room on the client side.
struct ScoringGuard<'a>(&'a AtomicBool);

impl Drop for ScoringGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Controller driving a single room; one instance per active room, torn down
/// deterministically on leave.
pub struct RoomController {
    store: Arc<dyn RoomStore>,
    oracle: AnswerOracle,
    config: Arc<AppConfig>,
    user: UserIdentity,
    room_id: String,
    snapshot_tx: watch::Sender<Option<Room>>,
    search_tx: watch::Sender<SearchStatus>,
    scoring_in_progress: AtomicBool,
    round_started: Mutex<Option<Instant>>,
    timers: Mutex<TimerSlots>,
}

impl RoomController {
    /// Subscribe to a room document and start folding its change feed into
    /// the snapshot channel.
    pub async fn attach(
        store: Arc<dyn RoomStore>,
        oracle: AnswerOracle,
        config: Arc<AppConfig>,
        user: UserIdentity,
        room_id: String,
        snapshot_tx: watch::Sender<Option<Room>>,
        search_tx: watch::Sender<SearchStatus>,
    ) -> Result<Arc<Self>, ServiceError> {
        let subscription = store.subscribe(&room_id).await?;

        let controller = Arc::new(Self {
            store,
            oracle,
            config,
            user,
            room_id,
            snapshot_tx,
            search_tx,
            scoring_in_progress: AtomicBool::new(false),
            round_started: Mutex::new(None),
            timers: Mutex::new(TimerSlots::default()),
        });

        let pump = tokio::spawn(Arc::clone(&controller).run_pump(subscription));
        TimerSlots::set(&mut controller.timers().pump, pump.abort_handle());
        Ok(controller)
    }

    /// Identifier of the room this controller drives.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    fn timers(&self) -> MutexGuard<'_, TimerSlots> {
        self.timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn round_started(&self) -> MutexGuard<'_, Option<Instant>> {
        self.round_started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- change feed -----------------------------------------------------

    async fn run_pump(self: Arc<Self>, mut subscription: RoomSubscription) {
        while let Some(signal) = subscription.recv().await {
            match signal {
                RoomSignal::Snapshot(room) => self.on_snapshot(room).await,
                RoomSignal::Deleted => {
                    debug!(room_id = %self.room_id, "room deleted; shutting controller down");
                    self.teardown();
                    break;
                }
            }
        }
    }

    async fn on_snapshot(self: &Arc<Self>, room: RoomEntity) {
        let _ = self.snapshot_tx.send(Some(Room::from(&room)));

        if room.state > RoomState::Waiting || room.is_full() {
            self.stop_search();
        }
        if room.state == RoomState::Playing {
            self.round_started().get_or_insert_with(Instant::now);
            self.maybe_complete(&room);
        }
    }

    /// Completion detection: all human answers in and the dwell time served.
    /// Bot answers arriving asynchronously land here as snapshots too.
    fn maybe_complete(self: &Arc<Self>, room: &RoomEntity) {
        if !room.all_humans_answered() {
            return;
        }
        let Some(started) = *self.round_started() else {
            return;
        };
        let elapsed = started.elapsed();
        if elapsed >= MIN_DWELL {
            let controller = Arc::clone(self);
            tokio::spawn(async move {
                controller.try_score(RoomEvent::AllHumansAnswered).await;
            });
        } else {
            // Everyone answered inside the dwell window; re-check right at
            // its boundary instead of waiting for the hard deadline.
            let remaining = MIN_DWELL - elapsed;
            let controller = Arc::clone(self);
            let task = tokio::spawn(async move {
                sleep(remaining).await;
                match controller.store.find(&controller.room_id).await {
                    Ok(Some(room))
                        if room.state == RoomState::Playing && room.all_humans_answered() =>
                    {
                        controller.try_score(RoomEvent::AllHumansAnswered).await;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(room_id = %controller.room_id, error = %err, "dwell re-check failed");
                    }
                }
            });
            TimerSlots::set(&mut self.timers().dwell, task.abort_handle());
        }
    }

    fn teardown(&self) {
        self.timers().abort_all();
        let _ = self.search_tx.send(SearchStatus::default());
        let _ = self.snapshot_tx.send(None);
    }

    // --- matchmaking search ----------------------------------------------

    /// Run the 30-second search countdown, surfacing the remaining seconds,
    /// then fill the remaining seats with synthetic players.
    pub fn start_search_countdown(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            let total = SEARCH_TIMEOUT.as_secs() as u32;
            for remaining in (1..=total).rev() {
                let _ = controller.search_tx.send(SearchStatus {
                    searching: true,
                    seconds_left: remaining,
                });
                sleep(Duration::from_secs(1)).await;
            }
            let _ = controller.search_tx.send(SearchStatus::default());
            if let Err(err) = controller.backfill_with_bots().await {
                warn!(room_id = %controller.room_id, error = %err, "bot backfill failed");
            }
        });
        TimerSlots::set(&mut self.timers().search, task.abort_handle());
    }

    fn stop_search(&self) {
        if let Some(handle) = self.timers().search.take() {
            handle.abort();
            let _ = self.search_tx.send(SearchStatus::default());
        }
    }

    /// Fill every open seat with a synthetic player and start the game.
    ///
    /// The first synthetic player is forced onto a memberless team when one
    /// exists, so a lone human never ends up facing an empty side.
    async fn backfill_with_bots(self: &Arc<Self>) -> Result<(), ServiceError> {
        let Some(mut room) = self.store.find(&self.room_id).await? else {
            return Ok(());
        };
        if room.state != RoomState::Waiting {
            return Ok(());
        }

        let missing = ROOM_CAPACITY.saturating_sub(room.players.len());
        for index in 0..missing {
            let (id, name) = matchmaking::synthetic_identity(index);
            let forced = if index == 0 {
                matchmaking::team_with_no_members(&room)
            } else {
                None
            };
            matchmaking::seat_player(&mut room, &id, &name, true, forced)?;
        }

        if missing > 0 {
            self.store
                .update(
                    &self.room_id,
                    RoomPatch {
                        players: Some(room.players.clone()),
                        teams: Some(room.teams.clone()),
                        ..RoomPatch::default()
                    },
                )
                .await?;
            info!(room_id = %self.room_id, added = missing, "filled open seats with synthetic players");
        }

        self.begin_start(RoomEvent::SearchTimedOut).await
    }

    // --- round lifecycle -------------------------------------------------

    /// Commit `waiting` → `starting` and schedule the round countdown.
    pub async fn begin_start(self: &Arc<Self>, event: RoomEvent) -> Result<(), ServiceError> {
        let Some(room) = self.store.find(&self.room_id).await? else {
            return Ok(());
        };
        if room.state != RoomState::Waiting {
            debug!(room_id = %self.room_id, state = ?room.state, "start already triggered elsewhere");
            return Ok(());
        }

        let next = advance(room.state, event)?;
        self.store
            .update(
                &self.room_id,
                RoomPatch {
                    state: Some(next),
                    ..RoomPatch::default()
                },
            )
            .await?;
        self.stop_search();
        info!(room_id = %self.room_id, ?event, "room starting");

        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            sleep(START_COUNTDOWN).await;
            if let Err(err) = controller.begin_round().await {
                warn!(room_id = %controller.room_id, error = %err, "round start failed");
            }
        });
        TimerSlots::set(&mut self.timers().start, task.abort_handle());
        Ok(())
    }

    /// Commit `starting` → `playing`: pick a question, reset the answer maps,
    /// stamp the round start, and arm the bot and deadline timers.
    async fn begin_round(self: &Arc<Self>) -> Result<(), ServiceError> {
        let Some(room) = self.store.find(&self.room_id).await? else {
            return Ok(());
        };
        if room.state != RoomState::Starting {
            return Ok(());
        }

        let question = self
            .config
            .pick_question(RoundKind::SharedGuess)
            .ok_or_else(|| ServiceError::InvalidState("question pool is empty".into()))?;
        let next = advance(room.state, RoomEvent::CountdownElapsed)?;

        self.store
            .update(
                &self.room_id,
                RoomPatch {
                    state: Some(next),
                    current_question: Some(Some(question.clone())),
                    answers: Some(Default::default()),
                    has_answered: Some(Default::default()),
                    started_at: Some(SystemTime::now()),
                    ..RoomPatch::default()
                },
            )
            .await?;
        *self.round_started() = Some(Instant::now());
        info!(room_id = %self.room_id, question_id = %question.id, "round started");

        let bot_delay = Duration::from_secs(rand::rng().random_range(BOT_ANSWER_DELAY_SECS));
        let controller = Arc::clone(self);
        let bots = tokio::spawn(async move {
            sleep(bot_delay).await;
            controller.write_bot_answers().await;
        });

        let controller = Arc::clone(self);
        let deadline = tokio::spawn(async move {
            sleep(ROUND_DEADLINE).await;
            controller.try_score(RoomEvent::DeadlineReached).await;
        });

        let mut timers = self.timers();
        TimerSlots::set(&mut timers.bots, bots.abort_handle());
        TimerSlots::set(&mut timers.deadline, deadline.abort_handle());
        Ok(())
    }

    // --- synthetic answers -----------------------------------------------

    async fn write_bot_answers(self: &Arc<Self>) {
        match self.generate_bot_answers().await {
            Ok(0) => {}
            Ok(count) => {
                info!(room_id = %self.room_id, count, "synthetic answers recorded");
            }
            Err(err) => {
                warn!(room_id = %self.room_id, error = %err, "synthetic answer generation failed; using emergency words");
                if let Err(err) = self.write_emergency_answers().await {
                    error!(
                        room_id = %self.room_id,
                        error = %err,
                        "emergency answers failed too; round will settle on the deadline"
                    );
                }
            }
        }
    }

    /// Generate answers for every unanswered synthetic player, pairing two
    /// same-team bots through the correlated-answer path.
    async fn generate_bot_answers(&self) -> Result<usize, ServiceError> {
        let Some(room) = self.store.find(&self.room_id).await? else {
            return Ok(0);
        };
        if room.state != RoomState::Playing {
            return Ok(0);
        }
        let Some(question) = room.current_question.clone() else {
            return Ok(0);
        };
        let category = question.category.as_deref();

        let mut answers = room.answers.clone();
        let mut has_answered = room.has_answered.clone();
        let mut written = 0usize;

        for team in &room.teams {
            let pending: Vec<String> = team
                .player_ids
                .iter()
                .filter(|id| {
                    room.player(id)
                        .is_some_and(|player| player.is_synthetic && !answers.contains_key(*id))
                })
                .cloned()
                .collect();

            match pending.as_slice() {
                [] => {}
                [lone] => {
                    let answer = self.oracle.answer(&question.text, category).await;
                    answers.insert(lone.clone(), answer);
                    has_answered.insert(lone.clone(), true);
                    written += 1;
                }
                [first, second, ..] => {
                    let (base, similar) =
                        self.oracle.paired_answers(&question.text, category).await;
                    answers.insert(first.clone(), base);
                    answers.insert(second.clone(), similar);
                    has_answered.insert(first.clone(), true);
                    has_answered.insert(second.clone(), true);
                    written += 2;
                }
            }
        }

        if written == 0 {
            return Ok(0);
        }

        self.store
            .update(
                &self.room_id,
                RoomPatch {
                    answers: Some(answers),
                    has_answered: Some(has_answered),
                    ..RoomPatch::default()
                },
            )
            .await?;
        Ok(written)
    }

    /// Emergency path bypassing the oracle chain: write fixed plausible words
    /// for every unanswered synthetic player.
    async fn write_emergency_answers(&self) -> Result<(), ServiceError> {
        let Some(room) = self.store.find(&self.room_id).await? else {
            return Ok(());
        };
        if room.state != RoomState::Playing {
            return Ok(());
        }

        let mut answers = room.answers.clone();
        let mut has_answered = room.has_answered.clone();
        for (index, player) in room
            .players
            .iter()
            .filter(|player| player.is_synthetic && !room.answers.contains_key(&player.id))
            .enumerate()
        {
            let word = EMERGENCY_ANSWERS[index % EMERGENCY_ANSWERS.len()];
            answers.insert(player.id.clone(), word.to_string());
            has_answered.insert(player.id.clone(), true);
        }

        self.store
            .update(
                &self.room_id,
                RoomPatch {
                    answers: Some(answers),
                    has_answered: Some(has_answered),
                    ..RoomPatch::default()
                },
            )
            .await?;
        Ok(())
    }

    // --- scoring ---------------------------------------------------------

    /// Run the scoring routine at most once per controller, whichever trigger
    /// fires first; the loser sees either the flag or a non-`playing` state.
    async fn try_score(self: &Arc<Self>, trigger: RoomEvent) {
        if self.scoring_in_progress.swap(true, Ordering::SeqCst) {
            debug!(room_id = %self.room_id, ?trigger, "scoring already in progress");
            return;
        }
        let _guard = ScoringGuard(&self.scoring_in_progress);

        if let Err(err) = self.score_once(trigger).await {
            // Deliberate parity with the source: no compensating transition,
            // the room stays in `scoring` until torn down.
            error!(
                room_id = %self.room_id,
                ?trigger,
                error = %err,
                "score computation failed; room left in scoring"
            );
        }
    }

    async fn score_once(self: &Arc<Self>, trigger: RoomEvent) -> Result<(), ServiceError> {
        let Some(room) = self.store.find(&self.room_id).await? else {
            debug!(room_id = %self.room_id, "room gone before scoring; ignoring stale trigger");
            return Ok(());
        };
        if room.state != RoomState::Playing {
            debug!(room_id = %self.room_id, state = ?room.state, "scoring already handled elsewhere");
            return Ok(());
        }

        let scoring_state = advance(room.state, trigger)?;
        self.store
            .update(
                &self.room_id,
                RoomPatch {
                    state: Some(scoring_state),
                    current_question: Some(None),
                    ..RoomPatch::default()
                },
            )
            .await?;

        let outcome = scoring::score_round(&room);
        let mut round_results = room.round_results.clone();
        round_results.push(outcome.result);

        let finished = advance(scoring_state, RoomEvent::ScoresCommitted)?;
        self.store
            .update(
                &self.room_id,
                RoomPatch {
                    state: Some(finished),
                    scores: Some(outcome.scores),
                    round_results: Some(round_results),
                    ..RoomPatch::default()
                },
            )
            .await?;
        info!(room_id = %self.room_id, ?trigger, "round scored");

        self.timers().abort_round_triggers();
        if room.mode == RoomMode::Private {
            self.schedule_cleanup();
        }
        Ok(())
    }

    /// Private rooms are deleted a fixed delay after finishing; the timer
    /// re-checks the document so a stale firing is ignored.
    fn schedule_cleanup(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            sleep(FINISHED_ROOM_TTL).await;
            match controller.store.find(&controller.room_id).await {
                Ok(Some(room)) if room.state == RoomState::Finished => {
                    if let Err(err) = controller.store.delete(&controller.room_id).await {
                        warn!(room_id = %controller.room_id, error = %err, "post-finish cleanup failed");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(room_id = %controller.room_id, error = %err, "post-finish cleanup check failed");
                }
            }
        });
        TimerSlots::set(&mut self.timers().cleanup, task.abort_handle());
    }

    // --- player operations -----------------------------------------------

    /// Record the local user's answer for the current question.
    pub async fn submit_answer(&self, text: &str) -> Result<(), ServiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(self.reject(ServiceError::InvalidInput("answer must not be empty".into())));
        }

        let Some(room) = self.store.find(&self.room_id).await? else {
            return Err(self.reject(ServiceError::NotFound(format!("room `{}`", self.room_id))));
        };
        if !room.has_player(&self.user.id) {
            return Err(self.reject(ServiceError::InvalidState(
                "user is not seated in this room".into(),
            )));
        }
        if room.state != RoomState::Playing {
            return Err(self.reject(ServiceError::InvalidState(
                "answers are only accepted while playing".into(),
            )));
        }
        if room
            .has_answered
            .get(&self.user.id)
            .copied()
            .unwrap_or_default()
        {
            return Err(self.reject(ServiceError::InvalidState(
                "answer already recorded".into(),
            )));
        }

        let mut answers = room.answers.clone();
        let mut has_answered = room.has_answered.clone();
        answers.insert(self.user.id.clone(), text.to_string());
        has_answered.insert(self.user.id.clone(), true);

        self.store
            .update(
                &self.room_id,
                RoomPatch {
                    answers: Some(answers),
                    has_answered: Some(has_answered),
                    ..RoomPatch::default()
                },
            )
            .await?;
        debug!(room_id = %self.room_id, user_id = %self.user.id, "answer recorded");
        Ok(())
    }

    /// Start a private room: absorb waiting humans from the public pool, fill
    /// the rest of the seats with synthetic players, then start the game.
    pub async fn start_private(self: &Arc<Self>) -> Result<(), ServiceError> {
        let Some(room) = self.store.find(&self.room_id).await? else {
            return Err(self.reject(ServiceError::NotFound(format!("room `{}`", self.room_id))));
        };
        if room.mode != RoomMode::Private {
            return Err(self.reject(ServiceError::InvalidState(
                "only private rooms are started explicitly".into(),
            )));
        }
        if room.owner_id.as_deref() != Some(self.user.id.as_str()) {
            return Err(self.reject(ServiceError::Unauthorized(
                "only the room owner can start the game".into(),
            )));
        }
        if room.state != RoomState::Waiting {
            return Err(self.reject(ServiceError::InvalidState(
                "room has already started".into(),
            )));
        }

        matchmaking::absorb_waiting_humans(self.store.as_ref(), &self.room_id).await?;

        let Some(mut room) = self.store.find(&self.room_id).await? else {
            return Err(ServiceError::NotFound(format!("room `{}`", self.room_id)));
        };
        let missing = ROOM_CAPACITY.saturating_sub(room.players.len());
        if missing > 0 {
            for index in 0..missing {
                let (id, name) = matchmaking::synthetic_identity(index);
                matchmaking::seat_player(&mut room, &id, &name, true, None)?;
            }
            self.store
                .update(
                    &self.room_id,
                    RoomPatch {
                        players: Some(room.players.clone()),
                        teams: Some(room.teams.clone()),
                        ..RoomPatch::default()
                    },
                )
                .await?;
        }

        self.begin_start(RoomEvent::OwnerStarted).await
    }

    /// Leave the room: cancel every pending timer, remove the seat, delete
    /// the room when no human remains, and clear the published snapshot.
    pub async fn leave(self: &Arc<Self>) -> Result<(), ServiceError> {
        self.teardown();

        let room = match self.store.find(&self.room_id).await {
            Ok(room) => room,
            Err(err) => {
                warn!(room_id = %self.room_id, error = %err, "could not fetch room while leaving");
                return Ok(());
            }
        };
        let Some(mut room) = room else {
            return Ok(());
        };
        if !room.has_player(&self.user.id) {
            return Ok(());
        }

        matchmaking::unseat_player(&mut room, &self.user.id);
        let humans_remain = room.players.iter().any(|player| !player.is_synthetic);

        if !humans_remain {
            self.store.delete(&self.room_id).await?;
            info!(room_id = %self.room_id, "last human left; room deleted");
        } else {
            self.store
                .update(
                    &self.room_id,
                    RoomPatch {
                        players: Some(room.players.clone()),
                        teams: Some(room.teams.clone()),
                        ..RoomPatch::default()
                    },
                )
                .await?;
            info!(room_id = %self.room_id, user_id = %self.user.id, "player left room");
        }
        Ok(())
    }

    /// Invariant violations are rejected as no-ops with a logged reason; the
    /// UI layer turns them into user-facing messages.
    fn reject(&self, err: ServiceError) -> ServiceError {
        warn!(room_id = %self.room_id, user_id = %self.user.id, error = %err, "operation rejected");
        err
    }
}
