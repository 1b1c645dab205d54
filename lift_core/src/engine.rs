//! Live workout session engine.
//!
//! The engine drives one workout from template selection to a finalized
//! [`SessionRecord`]:
//!
//! ```text
//! Idle → Previewing → Active ⇄ Resting → Completed
//!                       ↕        ↕
//!                     Paused (remembers which one it interrupted)
//! any live state → Cancelled
//! ```
//!
//! Every command either applies its whole transition and record mutation or
//! fails with no side effect. Commands work on a draft copy of the live
//! session which replaces the original only once the command has succeeded,
//! including the log append on the finishing path.

use crate::clock::{Clock, Stopwatch};
use crate::store::WorkoutLogStore;
use crate::types::{ExerciseSpec, SessionRecord, SetRecord, SetTarget, WorkoutPlan};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// States and commands
// ============================================================================

/// Lifecycle state of the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Previewing,
    Active,
    Resting,
    Paused,
    Completed,
    Cancelled,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Previewing => "previewing",
            SessionState::Active => "active",
            SessionState::Resting => "resting",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
        }
    }

    /// A session is running: the clock is relevant and the log may be written
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionState::Active | SessionState::Resting | SessionState::Paused
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The running state a pause interrupted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Active,
    Resting,
}

impl RunPhase {
    fn state(self) -> SessionState {
        match self {
            RunPhase::Active => SessionState::Active,
            RunPhase::Resting => SessionState::Resting,
        }
    }
}

/// Everything a front end can ask the engine to do
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    LoadTemplate(WorkoutPlan),
    Start,
    CompleteSet {
        reps: Option<u32>,
        weight: Option<f64>,
    },
    SkipSet,
    SkipExercise,
    SkipRest,
    Pause,
    Resume,
    ExtendRest(u32),
    AddNote(String),
    EndEarly,
    Cancel,
    RetryPersist,
}

impl Command {
    /// Verb phrase used in error messages
    pub fn describe(&self) -> &'static str {
        match self {
            Command::LoadTemplate(_) => "load a template",
            Command::Start => "start",
            Command::CompleteSet { .. } => "complete a set",
            Command::SkipSet => "skip a set",
            Command::SkipExercise => "skip an exercise",
            Command::SkipRest => "skip rest",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::ExtendRest(_) => "extend rest",
            Command::AddNote(_) => "add a note",
            Command::EndEarly => "end early",
            Command::Cancel => "cancel",
            Command::RetryPersist => "retry saving",
        }
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Immutable view of the engine handed to observers after every change
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub paused_from: Option<RunPhase>,
    pub plan_id: Option<String>,
    pub plan_name: Option<String>,
    pub exercise_index: usize,
    pub exercise_count: usize,
    pub exercise_name: Option<String>,
    pub set_index: usize,
    pub set_count: usize,
    pub target: Option<SetTarget>,
    pub rest_remaining: u32,
    pub elapsed_seconds: u64,
    pub exercise_elapsed_seconds: u64,
    pub sets_done: usize,
    pub sets_total: usize,
    pub note: String,
    /// Id of the session record, once one exists
    pub record_id: Option<Uuid>,
    /// A finalized record is waiting for `RetryPersist`
    pub unpersisted: bool,
}

impl SessionSnapshot {
    fn empty(state: SessionState) -> Self {
        Self {
            state,
            paused_from: None,
            plan_id: None,
            plan_name: None,
            exercise_index: 0,
            exercise_count: 0,
            exercise_name: None,
            set_index: 0,
            set_count: 0,
            target: None,
            rest_remaining: 0,
            elapsed_seconds: 0,
            exercise_elapsed_seconds: 0,
            sets_done: 0,
            sets_total: 0,
            note: String::new(),
            record_id: None,
            unpersisted: false,
        }
    }

    pub fn progress_percent(&self) -> u8 {
        if self.sets_total == 0 {
            return 0;
        }
        ((self.sets_done * 100) / self.sets_total).min(100) as u8
    }
}

/// Callback receiving every snapshot the engine emits
pub type Observer = Box<dyn FnMut(&SessionSnapshot) + Send>;

// ============================================================================
// Live session
// ============================================================================

/// Position of the set being performed (or rested before)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub exercise: usize,
    pub set: usize,
}

/// Where a command leaves the session
enum Step {
    To(SessionState),
    Finalize,
}

/// The in-progress session. While resting, the cursor already points at the
/// upcoming set.
#[derive(Clone, Debug)]
struct LiveSession {
    plan: WorkoutPlan,
    record: SessionRecord,
    cursor: Cursor,
    rest_remaining: u32,
    paused_from: Option<RunPhase>,
    active: Stopwatch,
    exercise_timer: Stopwatch,
}

impl LiveSession {
    fn new(plan: WorkoutPlan, now: DateTime<Utc>) -> Self {
        let record = SessionRecord::skeleton(&plan, now);
        Self {
            plan,
            record,
            cursor: Cursor::default(),
            rest_remaining: 0,
            paused_from: None,
            active: Stopwatch::idle(),
            exercise_timer: Stopwatch::idle(),
        }
    }

    fn spec(&self) -> &ExerciseSpec {
        &self.plan.exercises[self.cursor.exercise]
    }

    fn current_set_mut(&mut self) -> &mut SetRecord {
        &mut self.record.exercises[self.cursor.exercise].sets[self.cursor.set]
    }

    fn mark_skipped(set: &mut SetRecord, now: DateTime<Utc>) {
        set.completed = false;
        set.actual_reps = None;
        set.actual_weight = None;
        set.completed_at = Some(now);
    }

    /// Move past the set at the cursor. A rest window opens only when
    /// `rest` is requested, sets remain, and the exercise has a rest interval.
    fn advance(&mut self, rest: bool, now: DateTime<Utc>) -> Step {
        let spec = self.spec();
        let set_count = spec.sets as usize;
        let rest_seconds = spec.rest_seconds;

        if self.cursor.set + 1 < set_count {
            self.cursor.set += 1;
            if rest && rest_seconds > 0 {
                self.rest_remaining = rest_seconds;
                return Step::To(SessionState::Resting);
            }
            self.rest_remaining = 0;
            return Step::To(SessionState::Active);
        }

        self.next_exercise(now)
    }

    fn next_exercise(&mut self, now: DateTime<Utc>) -> Step {
        self.rest_remaining = 0;
        if self.cursor.exercise + 1 < self.plan.exercises.len() {
            self.cursor.exercise += 1;
            self.cursor.set = 0;
            self.exercise_timer = Stopwatch::started(now);
            Step::To(SessionState::Active)
        } else {
            Step::Finalize
        }
    }

    /// Seal the record. Unreached sets stay untouched.
    fn finalize(mut self, now: DateTime<Utc>) -> SessionRecord {
        self.active.pause(now);
        self.record.ended_at = Some(now);
        self.record.active_duration_seconds = self.active.elapsed_secs(now);
        self.record
    }

    fn sets_done(&self) -> usize {
        self.record.sets().filter(|s| s.is_touched()).count()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// State machine for a single live workout, writing finished sessions to `S`
pub struct SessionEngine<S, C> {
    store: S,
    clock: C,
    state: SessionState,
    live: Option<LiveSession>,
    finished: Option<SessionRecord>,
    unpersisted: Option<SessionRecord>,
    epoch: u64,
    observers: Vec<Observer>,
}

impl<S: WorkoutLogStore, C: Clock> SessionEngine<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            state: SessionState::Idle,
            live: None,
            finished: None,
            unpersisted: None,
            epoch: 0,
            observers: Vec::new(),
        }
    }

    /// Register an observer; it sees every snapshot emitted from now on
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: FnMut(&SessionSnapshot) + Send + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Tick generation. Bumped whenever a session starts or ends so ticks
    /// scheduled for an earlier session are ignored.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.live.as_ref().map(|l| l.cursor)
    }

    pub fn rest_remaining(&self) -> u32 {
        self.live.as_ref().map_or(0, |l| l.rest_remaining)
    }

    /// The in-progress record, if a session is loaded
    pub fn record(&self) -> Option<&SessionRecord> {
        self.live.as_ref().map(|l| &l.record)
    }

    /// The record most recently written to the log
    pub fn last_record(&self) -> Option<&SessionRecord> {
        self.finished.as_ref()
    }

    /// A finalized record the log refused, kept for `retry_persist`
    pub fn unpersisted_record(&self) -> Option<&SessionRecord> {
        self.unpersisted.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Dispatch a command
    pub fn apply(&mut self, command: Command) -> Result<SessionSnapshot> {
        match command {
            Command::LoadTemplate(plan) => self.load_template(plan),
            Command::Start => self.start(),
            Command::CompleteSet { reps, weight } => self.complete_set(reps, weight),
            Command::SkipSet => self.skip_set(),
            Command::SkipExercise => self.skip_exercise(),
            Command::SkipRest => self.skip_rest(),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::ExtendRest(seconds) => self.extend_rest(seconds),
            Command::AddNote(note) => self.add_note(note),
            Command::EndEarly => self.end_early(),
            Command::Cancel => self.cancel(),
            Command::RetryPersist => self.retry_persist(),
        }
    }

    /// Load a plan for preview. Accepted from `Idle` and from either
    /// terminal state, which begins the next session.
    pub fn load_template(&mut self, plan: WorkoutPlan) -> Result<SessionSnapshot> {
        self.ensure(
            "load a template",
            &[
                SessionState::Idle,
                SessionState::Completed,
                SessionState::Cancelled,
            ],
        )?;
        plan.validate()?;

        tracing::debug!("Loaded template '{}' ({} exercises)", plan.id, plan.exercises.len());
        self.live = Some(LiveSession::new(plan, self.clock.now()));
        self.finished = None;
        self.unpersisted = None;
        self.state = SessionState::Previewing;
        Ok(self.emit())
    }

    pub fn start(&mut self) -> Result<SessionSnapshot> {
        self.transact("start", &[SessionState::Previewing], |live, _, now| {
            live.record.started_at = now;
            live.cursor = Cursor::default();
            live.active = Stopwatch::started(now);
            live.exercise_timer = Stopwatch::started(now);
            Step::To(SessionState::Active)
        })?;
        self.epoch += 1;
        if let Some(live) = &self.live {
            tracing::info!("Started session {} ({})", live.record.id, live.plan.id);
        }
        Ok(self.emit())
    }

    /// Record the set at the cursor as done. Omitted actuals default to the
    /// planned reps and the suggested weight.
    pub fn complete_set(
        &mut self,
        reps: Option<u32>,
        weight: Option<f64>,
    ) -> Result<SessionSnapshot> {
        self.transact("complete a set", &[SessionState::Active], |live, _, now| {
            let target = live.spec().target;
            let suggestion = live.spec().weight_suggestion;
            let set = live.current_set_mut();
            set.completed = true;
            set.actual_reps = reps.or(target.reps());
            set.actual_weight = weight.or(suggestion);
            set.completed_at = Some(now);
            live.advance(true, now)
        })?;
        Ok(self.emit())
    }

    /// Skip the set at the cursor; while resting that is the upcoming set.
    /// No rest window follows a skip.
    pub fn skip_set(&mut self) -> Result<SessionSnapshot> {
        self.transact(
            "skip a set",
            &[SessionState::Active, SessionState::Resting],
            |live, _, now| {
                LiveSession::mark_skipped(live.current_set_mut(), now);
                live.advance(false, now)
            },
        )?;
        Ok(self.emit())
    }

    /// Skip every untouched set of the current exercise and move to the next one
    pub fn skip_exercise(&mut self) -> Result<SessionSnapshot> {
        self.transact(
            "skip an exercise",
            &[SessionState::Active, SessionState::Resting],
            |live, _, now| {
                let exercise = live.cursor.exercise;
                for set in live.record.exercises[exercise].sets.iter_mut() {
                    if !set.is_touched() {
                        LiveSession::mark_skipped(set, now);
                    }
                }
                live.next_exercise(now)
            },
        )?;
        Ok(self.emit())
    }

    /// End the rest window early and start the upcoming set
    pub fn skip_rest(&mut self) -> Result<SessionSnapshot> {
        self.transact("skip rest", &[SessionState::Resting], |live, _, _| {
            live.rest_remaining = 0;
            Step::To(SessionState::Active)
        })?;
        Ok(self.emit())
    }

    /// Suspend the session. A rest countdown is frozen until resume.
    pub fn pause(&mut self) -> Result<SessionSnapshot> {
        self.transact(
            "pause",
            &[SessionState::Active, SessionState::Resting],
            |live, state, now| {
                live.paused_from = Some(if state == SessionState::Resting {
                    RunPhase::Resting
                } else {
                    RunPhase::Active
                });
                live.active.pause(now);
                live.exercise_timer.pause(now);
                Step::To(SessionState::Paused)
            },
        )?;
        Ok(self.emit())
    }

    pub fn resume(&mut self) -> Result<SessionSnapshot> {
        self.transact("resume", &[SessionState::Paused], |live, _, now| {
            let phase = live.paused_from.take().unwrap_or(RunPhase::Active);
            live.active.resume(now);
            live.exercise_timer.resume(now);
            Step::To(phase.state())
        })?;
        Ok(self.emit())
    }

    pub fn extend_rest(&mut self, seconds: u32) -> Result<SessionSnapshot> {
        self.transact("extend rest", &[SessionState::Resting], |live, _, _| {
            live.rest_remaining = live.rest_remaining.saturating_add(seconds);
            Step::To(SessionState::Resting)
        })?;
        Ok(self.emit())
    }

    pub fn add_note(&mut self, note: String) -> Result<SessionSnapshot> {
        self.transact(
            "add a note",
            &[
                SessionState::Previewing,
                SessionState::Active,
                SessionState::Resting,
                SessionState::Paused,
            ],
            |live, state, _| {
                live.record.note = note;
                Step::To(state)
            },
        )?;
        Ok(self.emit())
    }

    /// Finish now, leaving every unreached set untouched
    pub fn end_early(&mut self) -> Result<SessionSnapshot> {
        self.transact(
            "end early",
            &[
                SessionState::Active,
                SessionState::Resting,
                SessionState::Paused,
            ],
            |live, _, _| {
                live.rest_remaining = 0;
                Step::Finalize
            },
        )?;
        Ok(self.emit())
    }

    /// Discard the session without writing anything
    pub fn cancel(&mut self) -> Result<SessionSnapshot> {
        self.ensure(
            "cancel",
            &[
                SessionState::Previewing,
                SessionState::Active,
                SessionState::Resting,
                SessionState::Paused,
            ],
        )?;

        if let Some(live) = self.live.take() {
            tracing::info!("Cancelled session {}", live.record.id);
        }
        self.unpersisted = None;
        self.state = SessionState::Cancelled;
        self.epoch += 1;
        Ok(self.emit())
    }

    /// Try again to write a record the log refused earlier
    pub fn retry_persist(&mut self) -> Result<SessionSnapshot> {
        let record = match &self.unpersisted {
            Some(record) => record.clone(),
            None => return Err(self.invalid("retry saving")),
        };
        self.persist(record)?;
        Ok(self.emit())
    }

    /// Apply one clock tick scheduled under `epoch`.
    ///
    /// Only a running rest countdown reacts: it drops by one second and, on
    /// reaching zero, returns to `Active` on the upcoming set. Stale or
    /// irrelevant ticks return `None` and emit nothing.
    pub fn tick(&mut self, epoch: u64) -> Result<Option<SessionSnapshot>> {
        if epoch != self.epoch || self.state != SessionState::Resting {
            return Ok(None);
        }
        let live = match self.live.as_mut() {
            Some(live) => live,
            None => return Ok(None),
        };

        live.rest_remaining = live.rest_remaining.saturating_sub(1);
        if live.rest_remaining == 0 {
            tracing::debug!("Rest finished, back to set {}", live.cursor.set + 1);
            self.state = SessionState::Active;
        }
        Ok(Some(self.emit()))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let now = self.clock.now();

        let live = match &self.live {
            Some(live) => live,
            None => {
                let mut snapshot = SessionSnapshot::empty(self.state);
                if let Some(record) = self.unpersisted.as_ref().or(self.finished.as_ref()) {
                    snapshot.plan_id = Some(record.plan_id.clone());
                    snapshot.exercise_count = record.exercises.len();
                    snapshot.elapsed_seconds = record.active_duration_seconds;
                    snapshot.sets_done =
                        record.sets().filter(|s| s.is_touched()).count();
                    snapshot.sets_total = record.total_sets();
                    snapshot.note = record.note.clone();
                    snapshot.record_id = Some(record.id);
                }
                snapshot.unpersisted = self.unpersisted.is_some();
                return snapshot;
            }
        };

        let spec = live.spec();
        SessionSnapshot {
            state: self.state,
            paused_from: live.paused_from,
            plan_id: Some(live.plan.id.clone()),
            plan_name: Some(live.plan.name.clone()),
            exercise_index: live.cursor.exercise,
            exercise_count: live.plan.exercises.len(),
            exercise_name: Some(spec.name.clone()),
            set_index: live.cursor.set,
            set_count: spec.sets as usize,
            target: Some(spec.target),
            rest_remaining: live.rest_remaining,
            elapsed_seconds: live.active.elapsed_secs(now),
            exercise_elapsed_seconds: live.exercise_timer.elapsed_secs(now),
            sets_done: live.sets_done(),
            sets_total: live.record.total_sets(),
            note: live.record.note.clone(),
            record_id: Some(live.record.id),
            unpersisted: self.unpersisted.is_some(),
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn invalid(&self, command: &'static str) -> Error {
        Error::InvalidTransition {
            command,
            state: self.state,
        }
    }

    fn ensure(&self, command: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid(command))
        }
    }

    /// Run `f` against a draft of the live session and commit only on success
    fn transact<F>(&mut self, command: &'static str, allowed: &[SessionState], f: F) -> Result<()>
    where
        F: FnOnce(&mut LiveSession, SessionState, DateTime<Utc>) -> Step,
    {
        self.ensure(command, allowed)?;
        let mut draft = match &self.live {
            Some(live) => live.clone(),
            None => return Err(self.invalid(command)),
        };

        let now = self.clock.now();
        match f(&mut draft, self.state, now) {
            Step::To(next) => {
                if next != self.state {
                    tracing::debug!("{} → {} ({})", self.state, next, command);
                }
                if next != SessionState::Paused {
                    draft.paused_from = None;
                }
                self.live = Some(draft);
                self.state = next;
            }
            Step::Finalize => {
                let record = draft.finalize(now);
                self.persist(record)?;
            }
        }
        Ok(())
    }

    /// Hand a finalized record to the log. On failure the engine keeps its
    /// prior state and holds the record for `retry_persist`.
    fn persist(&mut self, record: SessionRecord) -> Result<()> {
        match self.store.append(record.clone()) {
            Ok(()) => {
                tracing::info!(
                    "Finalized session {} ({} s active)",
                    record.id,
                    record.active_duration_seconds
                );
                self.live = None;
                self.unpersisted = None;
                self.finished = Some(record);
                self.state = SessionState::Completed;
                self.epoch += 1;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Could not save session {}: {}", record.id, e);
                self.unpersisted = Some(record);
                Err(match e {
                    Error::Persistence(_) | Error::DuplicateId(_) => e,
                    other => Error::Persistence(other.to_string()),
                })
            }
        }
    }

    fn emit(&mut self) -> SessionSnapshot {
        let snapshot = self.snapshot();
        for observer in self.observers.iter_mut() {
            observer(&snapshot);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryLog;
    use crate::types::{Difficulty, SetStatus};
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    type TestEngine = SessionEngine<MemoryLog, ManualClock>;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 3, 7, 30, 0).unwrap()
    }

    fn spec(id: &str, target: SetTarget, sets: u32, rest_seconds: u32) -> ExerciseSpec {
        ExerciseSpec {
            id: id.into(),
            name: id.to_uppercase(),
            muscles: vec![],
            target,
            sets,
            rest_seconds,
            weight_suggestion: None,
        }
    }

    fn plan(exercises: Vec<ExerciseSpec>) -> WorkoutPlan {
        WorkoutPlan {
            id: "plan".into(),
            name: "Plan".into(),
            difficulty: Difficulty::Beginner,
            exercises,
        }
    }

    fn one_exercise_three_sets() -> WorkoutPlan {
        plan(vec![spec("squat", SetTarget::Reps(10), 3, 60)])
    }

    fn four_exercises() -> WorkoutPlan {
        plan(vec![
            spec("a", SetTarget::Reps(10), 2, 30),
            spec("b", SetTarget::Reps(8), 2, 30),
            spec("c", SetTarget::DurationSeconds(30), 2, 30),
            spec("d", SetTarget::Reps(12), 2, 30),
        ])
    }

    fn engine() -> (TestEngine, ManualClock) {
        crate::logging::init_test();
        let clock = ManualClock::new(t0());
        (SessionEngine::new(MemoryLog::new(), clock.clone()), clock)
    }

    fn started(plan: WorkoutPlan) -> (TestEngine, ManualClock) {
        let (mut engine, clock) = engine();
        engine.load_template(plan).unwrap();
        engine.start().unwrap();
        (engine, clock)
    }

    fn finish(engine: &mut TestEngine) {
        while engine.state() != SessionState::Completed {
            match engine.state() {
                SessionState::Active => engine.complete_set(None, None).unwrap(),
                SessionState::Resting => engine.skip_rest().unwrap(),
                other => panic!("unexpected state {other}"),
            };
        }
    }

    #[test]
    fn test_three_sets_alternate_active_and_resting() {
        let (mut engine, _) = engine();
        engine.load_template(one_exercise_three_sets()).unwrap();
        let mut states = vec![engine.start().unwrap().state];

        for _ in 0..3 {
            if engine.state() == SessionState::Resting {
                states.push(engine.skip_rest().unwrap().state);
            }
            states.push(engine.complete_set(None, None).unwrap().state);
        }

        use SessionState::*;
        assert_eq!(
            states,
            vec![Active, Resting, Active, Resting, Active, Completed]
        );
        assert_eq!(engine.store().all().len(), 1);
    }

    #[test]
    fn test_complete_set_twice_is_rejected() {
        let (mut engine, _) = started(one_exercise_three_sets());
        engine.complete_set(Some(9), Some(20.0)).unwrap();
        let before = engine.record().unwrap().clone();

        let err = engine.complete_set(None, None).unwrap_err();

        assert!(matches!(
            err,
            Error::InvalidTransition {
                state: SessionState::Resting,
                ..
            }
        ));
        assert_eq!(engine.state(), SessionState::Resting);
        assert_eq!(engine.record().unwrap(), &before);
    }

    #[test]
    fn test_complete_set_defaults_to_plan() {
        let mut plan = one_exercise_three_sets();
        plan.exercises[0].weight_suggestion = Some(12.5);
        let (mut engine, clock) = started(plan);
        clock.advance_secs(40);

        engine.complete_set(None, None).unwrap();
        engine.skip_rest().unwrap();
        engine.complete_set(Some(7), Some(15.0)).unwrap();

        let sets = &engine.record().unwrap().exercises[0].sets;
        assert_eq!(sets[0].actual_reps, Some(10));
        assert_eq!(sets[0].actual_weight, Some(12.5));
        assert_eq!(sets[0].completed_at, Some(t0() + chrono::Duration::seconds(40)));
        assert_eq!(sets[1].actual_reps, Some(7));
        assert_eq!(sets[1].actual_weight, Some(15.0));
    }

    #[test]
    fn test_duration_target_has_no_default_reps() {
        let (mut engine, _) = started(plan(vec![spec("plank", SetTarget::DurationSeconds(30), 1, 0)]));
        engine.complete_set(None, None).unwrap();
        let set = &engine.last_record().unwrap().exercises[0].sets[0];
        assert!(set.completed);
        assert_eq!(set.actual_reps, None);
    }

    #[test]
    fn test_skip_set_bypasses_rest() {
        let (mut engine, _) = started(one_exercise_three_sets());
        let snapshot = engine.skip_set().unwrap();

        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.set_index, 1);
        let set = &engine.record().unwrap().exercises[0].sets[0];
        assert_eq!(set.status(), SetStatus::Skipped);
        assert_eq!(set.actual_reps, None);
    }

    #[test]
    fn test_skip_set_while_resting_skips_upcoming_set() {
        let (mut engine, _) = started(one_exercise_three_sets());
        engine.complete_set(None, None).unwrap();
        assert_eq!(engine.cursor(), Some(Cursor { exercise: 0, set: 1 }));

        let snapshot = engine.skip_set().unwrap();
        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.rest_remaining, 0);
        assert_eq!(engine.cursor(), Some(Cursor { exercise: 0, set: 2 }));

        let sets = &engine.record().unwrap().exercises[0].sets;
        assert_eq!(sets[0].status(), SetStatus::Completed);
        assert_eq!(sets[1].status(), SetStatus::Skipped);
    }

    #[test]
    fn test_skip_exercise_mid_exercise() {
        let (mut engine, _) = started(four_exercises());
        engine.complete_set(None, None).unwrap();
        let snapshot = engine.skip_exercise().unwrap();

        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(engine.cursor(), Some(Cursor { exercise: 1, set: 0 }));
        let first = &engine.record().unwrap().exercises[0].sets;
        assert_eq!(first[0].status(), SetStatus::Completed);
        assert_eq!(first[1].status(), SetStatus::Skipped);
        assert!(!first[1].completed);
        assert_eq!(first[1].actual_reps, None);
        assert_eq!(first[1].actual_weight, None);
    }

    #[test]
    fn test_skip_last_exercise_completes() {
        let (mut engine, _) = started(plan(vec![spec("only", SetTarget::Reps(5), 3, 30)]));
        let snapshot = engine.skip_exercise().unwrap();
        assert_eq!(snapshot.state, SessionState::Completed);
        let record = engine.last_record().unwrap();
        assert_eq!(record.count_sets(SetStatus::Skipped), 3);
    }

    #[test]
    fn test_no_trailing_rest_between_exercises() {
        let (mut engine, _) = started(four_exercises());
        engine.complete_set(None, None).unwrap();
        engine.skip_rest().unwrap();
        let snapshot = engine.complete_set(None, None).unwrap();

        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.exercise_index, 1);
        assert_eq!(snapshot.set_index, 0);
        assert_eq!(snapshot.rest_remaining, 0);
    }

    #[test]
    fn test_exercise_timer_resets_on_next_exercise() {
        let (mut engine, clock) = started(four_exercises());
        clock.advance_secs(100);
        engine.skip_exercise().unwrap();
        clock.advance_secs(15);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.exercise_elapsed_seconds, 15);
        assert_eq!(snapshot.elapsed_seconds, 115);
    }

    #[test]
    fn test_rest_counts_down_and_returns_to_active() {
        let (mut engine, _) = started(plan(vec![spec("a", SetTarget::Reps(5), 2, 3)]));
        engine.complete_set(None, None).unwrap();
        let epoch = engine.epoch();

        assert_eq!(engine.tick(epoch).unwrap().unwrap().rest_remaining, 2);
        assert_eq!(engine.tick(epoch).unwrap().unwrap().rest_remaining, 1);
        let last = engine.tick(epoch).unwrap().unwrap();

        assert_eq!(last.state, SessionState::Active);
        assert_eq!(last.set_index, 1);
        // Expiry never re-arms a rest window
        assert_eq!(engine.tick(epoch).unwrap(), None);
        assert_eq!(engine.state(), SessionState::Active);
    }

    #[test]
    fn test_ticks_ignored_outside_resting() {
        let (mut engine, _) = started(one_exercise_three_sets());
        let epoch = engine.epoch();
        assert_eq!(engine.tick(epoch).unwrap(), None);
        assert_eq!(engine.state(), SessionState::Active);
    }

    #[test]
    fn test_pause_freezes_rest_countdown() {
        let (mut engine, clock) = started(one_exercise_three_sets());
        engine.complete_set(None, None).unwrap();
        let epoch = engine.epoch();
        engine.tick(epoch).unwrap();

        let paused = engine.pause().unwrap();
        assert_eq!(paused.state, SessionState::Paused);
        assert_eq!(paused.paused_from, Some(RunPhase::Resting));

        clock.advance_secs(600);
        for _ in 0..10 {
            assert_eq!(engine.tick(epoch).unwrap(), None);
        }

        let resumed = engine.resume().unwrap();
        assert_eq!(resumed.state, SessionState::Resting);
        assert_eq!(resumed.rest_remaining, 59);
        assert_eq!(resumed.paused_from, None);
    }

    #[test]
    fn test_paused_time_excluded_from_active_duration() {
        let (mut engine, clock) = started(plan(vec![spec("a", SetTarget::Reps(5), 1, 0)]));
        clock.advance_secs(120);
        engine.pause().unwrap();
        clock.advance_secs(3600);
        engine.resume().unwrap();
        clock.advance_secs(30);
        engine.complete_set(None, None).unwrap();

        let record = engine.last_record().unwrap();
        assert_eq!(record.active_duration_seconds, 150);
        assert_eq!(record.started_at, t0());
        assert_eq!(record.ended_at, Some(t0() + chrono::Duration::seconds(3750)));
    }

    #[test]
    fn test_extend_rest() {
        let (mut engine, _) = started(one_exercise_three_sets());
        assert!(engine.extend_rest(30).unwrap_err().is_recoverable());

        engine.complete_set(None, None).unwrap();
        assert_eq!(engine.extend_rest(30).unwrap().rest_remaining, 90);
    }

    #[test]
    fn test_end_early_keeps_unreached_sets_untouched() {
        let (mut engine, _) = started(four_exercises());
        for _ in 0..2 {
            engine.complete_set(None, None).unwrap();
            engine.skip_rest().unwrap();
            engine.complete_set(None, None).unwrap();
        }
        assert_eq!(engine.cursor(), Some(Cursor { exercise: 2, set: 0 }));

        let snapshot = engine.end_early().unwrap();
        assert_eq!(snapshot.state, SessionState::Completed);

        let stored = &engine.store().all()[0];
        for exercise in &stored.exercises[..2] {
            assert!(exercise.sets.iter().all(|s| s.completed));
        }
        for exercise in &stored.exercises[2..] {
            assert!(exercise
                .sets
                .iter()
                .all(|s| !s.completed && s.completed_at.is_none()));
        }
        assert!(stored.ended_at.is_some());
    }

    #[test]
    fn test_end_early_from_paused() {
        let (mut engine, _) = started(four_exercises());
        engine.pause().unwrap();
        assert_eq!(engine.end_early().unwrap().state, SessionState::Completed);
        assert_eq!(engine.store().all().len(), 1);
    }

    #[test]
    fn test_cancel_discards_session() {
        let (mut engine, _) = started(four_exercises());
        engine.complete_set(None, None).unwrap();
        let epoch = engine.epoch();

        let snapshot = engine.cancel().unwrap();
        assert_eq!(snapshot.state, SessionState::Cancelled);
        assert!(engine.store().all().is_empty());
        assert!(engine.record().is_none());
        // A tick scheduled before the cancel is a no-op
        assert_eq!(engine.tick(epoch).unwrap(), None);
        assert!(engine.cancel().is_err());
    }

    #[test]
    fn test_invalid_template_leaves_engine_idle() {
        let (mut engine, _) = engine();
        let mut bad = four_exercises();
        bad.exercises[2].sets = 0;

        let err = engine.load_template(bad).unwrap_err();
        assert!(matches!(err, Error::InvalidTemplate(_)));
        assert_eq!(engine.state(), SessionState::Idle);
        assert!(engine.record().is_none());
    }

    #[test]
    fn test_commands_outside_valid_states() {
        let (mut engine, _) = engine();
        assert!(engine.start().is_err());
        assert!(engine.complete_set(None, None).is_err());
        assert!(engine.pause().is_err());
        assert!(engine.end_early().is_err());
        assert!(engine.cancel().is_err());
        assert!(engine.retry_persist().is_err());

        engine.load_template(four_exercises()).unwrap();
        assert!(engine.load_template(four_exercises()).is_err());
        assert!(engine.skip_set().is_err());
        assert!(engine.end_early().is_err());
        assert_eq!(engine.state(), SessionState::Previewing);
    }

    #[test]
    fn test_cursor_is_monotonic_and_in_bounds() {
        let (mut engine, _) = started(four_exercises());
        let commands = [
            Command::CompleteSet { reps: None, weight: None },
            Command::Pause,
            Command::SkipSet,
            Command::Resume,
            Command::ExtendRest(10),
            Command::SkipSet,
            Command::CompleteSet { reps: Some(3), weight: None },
            Command::SkipRest,
            Command::SkipExercise,
            Command::CompleteSet { reps: None, weight: None },
            Command::SkipRest,
            Command::CompleteSet { reps: None, weight: None },
            Command::CompleteSet { reps: None, weight: None },
            Command::SkipRest,
            Command::CompleteSet { reps: None, weight: None },
        ];

        let mut last = engine.cursor().unwrap();
        for command in commands {
            let _ = engine.apply(command);
            if let Some(cursor) = engine.cursor() {
                assert!(cursor >= last, "cursor moved back: {:?} → {:?}", last, cursor);
                assert!(cursor.exercise < 4);
                assert!(cursor.set < 2);
                last = cursor;
            }
        }
        assert_eq!(engine.state(), SessionState::Completed);
    }

    #[test]
    fn test_each_successful_command_notifies_once() {
        let (mut engine, _) = engine();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.subscribe(move |snapshot| sink.lock().unwrap().push(snapshot.state));

        engine.load_template(one_exercise_three_sets()).unwrap();
        engine.start().unwrap();
        let _ = engine.resume(); // rejected, no notification
        engine.complete_set(None, None).unwrap();

        use SessionState::*;
        assert_eq!(*seen.lock().unwrap(), vec![Previewing, Active, Resting]);
    }

    #[test]
    fn test_note_and_new_session_after_completion() {
        let (mut engine, _) = started(one_exercise_three_sets());
        engine.add_note("felt strong".into()).unwrap();
        finish(&mut engine);
        assert_eq!(engine.store().all()[0].note, "felt strong");

        engine.load_template(four_exercises()).unwrap();
        engine.start().unwrap();
        finish(&mut engine);
        assert_eq!(engine.store().all().len(), 2);
        assert_ne!(engine.store().all()[0].id, engine.store().all()[1].id);
    }

    /// Log that refuses writes until told otherwise
    struct FlakyLog {
        inner: MemoryLog,
        failing: Arc<Mutex<bool>>,
    }

    impl WorkoutLogStore for FlakyLog {
        fn append(&mut self, record: SessionRecord) -> Result<()> {
            if *self.failing.lock().unwrap() {
                return Err(Error::Persistence("disk full".into()));
            }
            self.inner.append(record)
        }

        fn all(&self) -> &[SessionRecord] {
            self.inner.all()
        }
    }

    #[test]
    fn test_persistence_failure_keeps_state_and_allows_retry() {
        let failing = Arc::new(Mutex::new(true));
        let log = FlakyLog {
            inner: MemoryLog::new(),
            failing: Arc::clone(&failing),
        };
        let mut engine = SessionEngine::new(log, ManualClock::new(t0()));
        engine
            .load_template(plan(vec![spec("a", SetTarget::Reps(5), 1, 0)]))
            .unwrap();
        engine.start().unwrap();

        let err = engine.complete_set(None, None).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(engine.state(), SessionState::Active);
        assert!(!engine.record().unwrap().exercises[0].sets[0].completed);
        let pending = engine.unpersisted_record().unwrap().clone();
        assert!(pending.exercises[0].sets[0].completed);
        assert!(engine.snapshot().unpersisted);

        *failing.lock().unwrap() = false;
        let snapshot = engine.retry_persist().unwrap();
        assert_eq!(snapshot.state, SessionState::Completed);
        assert_eq!(engine.store().all(), &[pending]);
        assert!(engine.unpersisted_record().is_none());
    }
}
