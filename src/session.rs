//! The in-progress workout: scratch editing, the elapsed-time ticker and the
//! hand-off of a finished session to the [`Store`].
//!
//! At most one session is active per [`SessionManager`]. All mutation, the
//! ticker included, goes through one mutex. Finishing clears the scratch
//! state before the durable write starts; the write then runs detached on the
//! Tokio runtime and either lands completely or not at all.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::ExerciseCatalog;
use crate::db::{CommittedSession, Error as DbError, Store, WorkoutType};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
const SEED_EXERCISE_COUNT: usize = 3;
const SEED_SET_COUNT: u32 = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("A {active} workout is already in progress. Resume it or discard it before starting {requested}.")]
    Conflict {
        active: WorkoutType,
        requested: WorkoutType,
    },
}

#[derive(Error, Debug)]
pub enum CommitError {
    #[error("Failed to save workout session: {0}")]
    Storage(#[from] DbError),
    #[error("Workout save task was interrupted: {0}")]
    Interrupted(String),
}

/// The user's answer to a start conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    ResumeExisting,
    DiscardAndStart(WorkoutType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Started,
    Resumed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSet {
    pub id: Uuid,
    pub set_number: u32,
    pub weight: f64,
    pub reps: u32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ActiveSet {
    fn new(set_number: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            set_number,
            weight: 0.0,
            reps: 0,
            is_completed: false,
            completed_at: None,
        }
    }

    /// "-" until a weight is entered.
    pub fn formatted_weight(&self, unit: &str) -> String {
        if self.weight == 0.0 {
            "-".to_string()
        } else {
            format_weight(self.weight, unit)
        }
    }
}

/// Whole weights print without decimals, everything else with one.
pub fn format_weight(weight: f64, unit: &str) -> String {
    if weight.fract() == 0.0 {
        format!("{weight:.0} {unit}")
    } else {
        format!("{weight:.1} {unit}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveExercise {
    pub id: Uuid,
    pub name: String,
    pub sets: Vec<ActiveSet>,
}

impl ActiveExercise {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            sets: (1..=SEED_SET_COUNT).map(ActiveSet::new).collect(),
        }
    }
}

/// Editable state of the workout in progress. Never persisted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionScratch {
    pub workout_type: WorkoutType,
    pub start_time: DateTime<Utc>,
    pub elapsed_seconds: u64,
    pub exercises: Vec<ActiveExercise>,
}

impl SessionScratch {
    pub fn formatted_time(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }

    /// Weight and reps of the set logged just before `set_index`, used as a
    /// starting hint when logging the next one.
    pub fn previous_set(&self, exercise_index: usize, set_index: usize) -> Option<(f64, u32)> {
        let prev = set_index.checked_sub(1)?;
        let set = self.exercises.get(exercise_index)?.sets.get(prev)?;
        Some((set.weight, set.reps))
    }

    pub fn completed_set_count(&self) -> usize {
        self.exercises
            .iter()
            .flat_map(|e| &e.sets)
            .filter(|s| s.is_completed)
            .count()
    }
}

/// `MM:SS`; minutes keep counting past 59.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSet {
    pub set_number: u32,
    pub weight: f64,
    pub reps: u32,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotExercise {
    pub name: String,
    pub muscle_group: String,
    pub is_custom: bool,
    pub sets: Vec<SnapshotSet>,
}

/// Immutable capture of a finished session: only completed sets survive.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub workout_type: WorkoutType,
    pub start_time: DateTime<Utc>,
    pub elapsed_seconds: u64,
    pub exercises: Vec<SnapshotExercise>,
}

impl SessionSnapshot {
    pub fn capture(scratch: &SessionScratch, catalog: &dyn ExerciseCatalog) -> Self {
        let exercises = scratch
            .exercises
            .iter()
            .map(|exercise| {
                let muscle_group = catalog.muscle_group(&exercise.name);
                SnapshotExercise {
                    name: exercise.name.clone(),
                    is_custom: muscle_group.is_none(),
                    muscle_group: muscle_group.unwrap_or_default(),
                    sets: exercise
                        .sets
                        .iter()
                        .filter(|s| s.is_completed)
                        .map(|s| SnapshotSet {
                            set_number: s.set_number,
                            weight: s.weight,
                            reps: s.reps,
                            completed_at: s.completed_at,
                        })
                        .collect(),
                }
            })
            .collect();

        Self {
            workout_type: scratch.workout_type,
            start_time: scratch.start_time,
            elapsed_seconds: scratch.elapsed_seconds,
            exercises,
        }
    }

    pub fn set_count(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub tick_interval: Duration,
    /// Retry a failed durable write once before giving up.
    pub retry_failed_commit: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tick_interval: TICK_INTERVAL,
            retry_failed_commit: true,
        }
    }
}

/// Called once when a finished session could not be saved.
pub type CommitFailureHook = Arc<dyn Fn(&SessionSnapshot, &CommitError) + Send + Sync>;

struct RunningTimer {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ManagerState {
    scratch: Option<SessionScratch>,
    timer: Option<RunningTimer>,
    next_generation: u64,
}

impl ManagerState {
    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel.cancel();
        }
    }

    /// Returns false when the ticker that fired is no longer the live one.
    fn record_tick(&mut self, generation: u64) -> bool {
        match (&self.timer, self.scratch.as_mut()) {
            (Some(timer), Some(scratch)) if timer.generation == generation => {
                scratch.elapsed_seconds += 1;
                true
            }
            _ => false,
        }
    }
}

/// Handle to a durable write dispatched by [`SessionManager::finish`].
///
/// Dropping it does not cancel the write.
pub struct PendingCommit {
    snapshot: Arc<SessionSnapshot>,
    handle: JoinHandle<Result<CommittedSession, CommitError>>,
}

impl PendingCommit {
    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    /// Waits for the write to finish.
    /// # Errors
    /// Returns `CommitError` if the write failed (after the optional retry) or
    /// the background task died.
    pub async fn wait(self) -> Result<CommittedSession, CommitError> {
        self.handle
            .await
            .map_err(|e| CommitError::Interrupted(e.to_string()))?
    }
}

/// Owner of the single in-progress workout.
pub struct SessionManager {
    state: Arc<Mutex<ManagerState>>,
    store: Store,
    catalog: Arc<dyn ExerciseCatalog>,
    options: SessionOptions,
    runtime: Handle,
    commit_failure_hook: Option<CommitFailureHook>,
}

impl SessionManager {
    pub fn new(
        store: Store,
        catalog: Arc<dyn ExerciseCatalog>,
        options: SessionOptions,
        runtime: Handle,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManagerState::default())),
            store,
            catalog,
            options,
            runtime,
            commit_failure_hook: None,
        }
    }

    pub fn set_commit_failure_hook<F>(&mut self, hook: F)
    where
        F: Fn(&SessionSnapshot, &CommitError) + Send + Sync + 'static,
    {
        self.commit_failure_hook = Some(Arc::new(hook));
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().scratch.is_some()
    }

    pub fn active_type(&self) -> Option<WorkoutType> {
        self.state.lock().scratch.as_ref().map(|s| s.workout_type)
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.state
            .lock()
            .scratch
            .as_ref()
            .map_or(0, |s| s.elapsed_seconds)
    }

    pub fn formatted_time(&self) -> String {
        format_elapsed(self.elapsed_seconds())
    }

    pub fn is_timer_running(&self) -> bool {
        self.state.lock().timer.is_some()
    }

    /// A copy of the scratch state for rendering.
    pub fn scratch(&self) -> Option<SessionScratch> {
        self.state.lock().scratch.clone()
    }

    /// Starts a fresh session seeded with the type's first default exercises.
    /// # Errors
    /// Returns `SessionError::Conflict` if a session is already active; the
    /// active session is left untouched.
    pub fn start(&self, workout_type: WorkoutType) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if let Some(active) = &state.scratch {
            return Err(SessionError::Conflict {
                active: active.workout_type,
                requested: workout_type,
            });
        }
        self.begin(&mut state, workout_type);
        Ok(())
    }

    /// Entering the workout view: start when idle, resume the same type.
    /// # Errors
    /// Returns `SessionError::Conflict` when a different type is active.
    pub fn open(&self, workout_type: WorkoutType) -> Result<OpenOutcome, SessionError> {
        let mut state = self.state.lock();
        match state.scratch.as_ref().map(|s| s.workout_type) {
            None => {
                self.begin(&mut state, workout_type);
                Ok(OpenOutcome::Started)
            }
            Some(active) if active == workout_type => {
                self.start_timer(&mut state);
                Ok(OpenOutcome::Resumed)
            }
            Some(active) => Err(SessionError::Conflict {
                active,
                requested: workout_type,
            }),
        }
    }

    /// Applies the user's choice after a conflict. Returns the type now active.
    pub fn resolve(&self, resolution: ConflictResolution) -> Option<WorkoutType> {
        let mut state = self.state.lock();
        match resolution {
            ConflictResolution::ResumeExisting => {
                if state.scratch.is_some() {
                    self.start_timer(&mut state);
                }
            }
            ConflictResolution::DiscardAndStart(workout_type) => {
                state.stop_timer();
                if let Some(discarded) = state.scratch.take() {
                    info!(workout_type = %discarded.workout_type, "Discarded active workout");
                }
                self.begin(&mut state, workout_type);
            }
        }
        state.scratch.as_ref().map(|s| s.workout_type)
    }

    /// Restarts the ticker without resetting elapsed time. No-op when idle or
    /// already ticking.
    pub fn resume(&self) {
        let mut state = self.state.lock();
        if state.scratch.is_some() {
            self.start_timer(&mut state);
        }
    }

    /// Stops the ticker; scratch state stays.
    pub fn pause_timer(&self) {
        self.state.lock().stop_timer();
    }

    pub fn add_exercise(&self, name: &str) {
        let mut state = self.state.lock();
        match state.scratch.as_mut() {
            Some(scratch) => scratch.exercises.push(ActiveExercise::new(name)),
            None => debug!(name, "No active workout; exercise not added"),
        }
    }

    /// Appends the next numbered set. Out-of-range indices are ignored.
    pub fn add_set(&self, exercise_index: usize) {
        let mut state = self.state.lock();
        let Some(exercise) = state
            .scratch
            .as_mut()
            .and_then(|s| s.exercises.get_mut(exercise_index))
        else {
            debug!(exercise_index, "Ignoring add_set for unknown exercise");
            return;
        };
        let next = u32::try_from(exercise.sets.len())
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        exercise.sets.push(ActiveSet::new(next));
    }

    /// Records weight and reps and marks the set completed. Out-of-range
    /// indices and negative or non-finite weights are ignored.
    pub fn update_set(&self, exercise_index: usize, set_index: usize, weight: f64, reps: u32) {
        if !weight.is_finite() || weight < 0.0 {
            debug!(weight, "Ignoring update_set with invalid weight");
            return;
        }
        let mut state = self.state.lock();
        let Some(set) = state
            .scratch
            .as_mut()
            .and_then(|s| s.exercises.get_mut(exercise_index))
            .and_then(|e| e.sets.get_mut(set_index))
        else {
            debug!(exercise_index, set_index, "Ignoring update_set for unknown set");
            return;
        };
        set.weight = weight;
        set.reps = reps;
        set.is_completed = true;
        set.completed_at = Some(Utc::now());
    }

    /// Stops the ticker, clears the scratch state and dispatches the durable
    /// write of its completed sets. Returns `None` when nothing was active.
    pub fn finish(&self) -> Option<PendingCommit> {
        let snapshot = {
            let mut state = self.state.lock();
            state.stop_timer();
            let scratch = state.scratch.take()?;
            SessionSnapshot::capture(&scratch, self.catalog.as_ref())
        };
        info!(
            workout_type = %snapshot.workout_type,
            elapsed_seconds = snapshot.elapsed_seconds,
            exercises = snapshot.exercises.len(),
            sets = snapshot.set_count(),
            "Finished workout"
        );

        let snapshot = Arc::new(snapshot);
        let store = self.store.clone();
        let to_write = Arc::clone(&snapshot);
        let handle = self.runtime.spawn(commit_snapshot(
            Arc::clone(&snapshot),
            self.options.retry_failed_commit,
            self.commit_failure_hook.clone(),
            move || write_snapshot(store.clone(), Arc::clone(&to_write)),
        ));
        Some(PendingCommit { snapshot, handle })
    }

    /// Discards the active session without writing anything.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.stop_timer();
        if let Some(discarded) = state.scratch.take() {
            info!(workout_type = %discarded.workout_type, "Cancelled workout");
        }
    }

    /// Stops the ticker at app exit. An unfinished session is dropped with the
    /// manager.
    pub fn shutdown(&self) {
        self.pause_timer();
    }

    fn begin(&self, state: &mut ManagerState, workout_type: WorkoutType) {
        let exercises = self
            .catalog
            .default_exercises(workout_type)
            .into_iter()
            .take(SEED_EXERCISE_COUNT)
            .map(ActiveExercise::new)
            .collect();
        state.scratch = Some(SessionScratch {
            workout_type,
            start_time: Utc::now(),
            elapsed_seconds: 0,
            exercises,
        });
        self.start_timer(state);
        info!(%workout_type, "Started workout");
    }

    fn start_timer(&self, state: &mut ManagerState) {
        if state.timer.is_some() {
            return;
        }
        let generation = state.next_generation;
        state.next_generation += 1;
        let cancel = CancellationToken::new();
        self.runtime.spawn(run_ticker(
            Arc::clone(&self.state),
            generation,
            self.options.tick_interval,
            cancel.clone(),
        ));
        state.timer = Some(RunningTimer { generation, cancel });
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.state.lock().stop_timer();
    }
}

async fn run_ticker(
    state: Arc<Mutex<ManagerState>>,
    generation: u64,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !state.lock().record_tick(generation) {
                    break;
                }
            }
        }
    }
}

/// Runs `write` once, or twice when `retry` is set and the first attempt
/// fails. The hook sees only the final failure.
async fn commit_snapshot<W, Fut>(
    snapshot: Arc<SessionSnapshot>,
    retry: bool,
    hook: Option<CommitFailureHook>,
    mut write: W,
) -> Result<CommittedSession, CommitError>
where
    W: FnMut() -> Fut,
    Fut: Future<Output = Result<CommittedSession, CommitError>>,
{
    let attempts = if retry { 2 } else { 1 };
    let mut attempt = 1;
    loop {
        match write().await {
            Ok(committed) => {
                info!(
                    session_id = %committed.session_id,
                    sets = committed.set_ids.len(),
                    "Saved workout session"
                );
                return Ok(committed);
            }
            Err(err) if attempt < attempts => {
                warn!(error = %err, attempt, "Saving workout session failed, retrying");
                attempt += 1;
            }
            Err(err) => {
                error!(
                    error = %err,
                    workout_type = %snapshot.workout_type,
                    "Saving workout session failed; the session was not stored"
                );
                if let Some(hook) = &hook {
                    hook(&snapshot, &err);
                }
                return Err(err);
            }
        }
    }
}

async fn write_snapshot(
    store: Store,
    snapshot: Arc<SessionSnapshot>,
) -> Result<CommittedSession, CommitError> {
    task::spawn_blocking(move || store.commit_session(&snapshot))
        .await
        .map_err(|e| CommitError::Interrupted(e.to_string()))?
        .map_err(CommitError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuiltinCatalog;
    use crate::db;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager_with(store: Store) -> SessionManager {
        SessionManager::new(
            store,
            Arc::new(BuiltinCatalog),
            SessionOptions::default(),
            Handle::current(),
        )
    }

    fn manager() -> SessionManager {
        manager_with(Store::open_in_memory().unwrap())
    }

    fn set_numbers(scratch: &SessionScratch, exercise_index: usize) -> Vec<u32> {
        scratch.exercises[exercise_index]
            .sets
            .iter()
            .map(|s| s.set_number)
            .collect()
    }

    async fn advance_millis(millis: u64) {
        time::sleep(Duration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_seeds_default_exercises() {
        let manager = manager();
        manager.start(WorkoutType::Push).unwrap();

        let scratch = manager.scratch().unwrap();
        let names: Vec<&str> = scratch.exercises.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Bench Press", "Incline Dumbbell Press", "Cable Flyes"]
        );
        for index in 0..3 {
            assert_eq!(set_numbers(&scratch, index), vec![1, 2, 3]);
        }
        assert_eq!(scratch.completed_set_count(), 0);
        assert_eq!(scratch.elapsed_seconds, 0);
        assert!(manager.is_timer_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_active_is_a_conflict() {
        let manager = manager();
        manager.start(WorkoutType::Push).unwrap();
        manager.add_exercise("Dips");
        manager.update_set(0, 0, 185.0, 5);
        let before = manager.scratch().unwrap();

        let err = manager.start(WorkoutType::Legs).unwrap_err();
        assert_eq!(
            err,
            SessionError::Conflict {
                active: WorkoutType::Push,
                requested: WorkoutType::Legs
            }
        );
        assert_eq!(manager.scratch().unwrap(), before);

        // Same type is still a conflict for a plain start
        assert!(manager.start(WorkoutType::Push).is_err());
        assert_eq!(manager.scratch().unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_resumes_same_type_and_rejects_another() {
        let manager = manager();
        assert_eq!(manager.open(WorkoutType::Pull), Ok(OpenOutcome::Started));
        manager.pause_timer();
        assert!(!manager.is_timer_running());

        assert_eq!(manager.open(WorkoutType::Pull), Ok(OpenOutcome::Resumed));
        assert!(manager.is_timer_running());

        assert!(matches!(
            manager.open(WorkoutType::Shoulders),
            Err(SessionError::Conflict { .. })
        ));
        assert_eq!(manager.active_type(), Some(WorkoutType::Pull));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_conflict() {
        let manager = manager();
        manager.start(WorkoutType::Push).unwrap();
        manager.add_exercise("Dips");
        manager.pause_timer();

        assert_eq!(
            manager.resolve(ConflictResolution::ResumeExisting),
            Some(WorkoutType::Push)
        );
        assert!(manager.is_timer_running());
        assert_eq!(manager.scratch().unwrap().exercises.len(), 4);

        assert_eq!(
            manager.resolve(ConflictResolution::DiscardAndStart(WorkoutType::Legs)),
            Some(WorkoutType::Legs)
        );
        let scratch = manager.scratch().unwrap();
        assert_eq!(scratch.workout_type, WorkoutType::Legs);
        assert_eq!(scratch.exercises[0].name, "Squat");
        assert_eq!(scratch.exercises.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_set_numbers_sequentially() {
        let manager = manager();
        manager.start(WorkoutType::Shoulders).unwrap();
        for _ in 0..4 {
            manager.add_set(1);
        }
        let scratch = manager.scratch().unwrap();
        assert_eq!(set_numbers(&scratch, 1), vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(set_numbers(&scratch, 0), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_indices_are_ignored() {
        let manager = manager();
        manager.start(WorkoutType::Legs).unwrap();
        let before = manager.scratch().unwrap();

        manager.add_set(3);
        manager.add_set(usize::MAX);
        manager.update_set(7, 0, 100.0, 5);
        manager.update_set(0, 3, 100.0, 5);

        assert_eq!(manager.scratch().unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_set_marks_completed() {
        let manager = manager();
        manager.start(WorkoutType::Pull).unwrap();
        manager.update_set(0, 1, 315.0, 3);
        manager.update_set(0, 2, -5.0, 3);
        manager.update_set(0, 2, f64::NAN, 3);

        let scratch = manager.scratch().unwrap();
        let set = &scratch.exercises[0].sets[1];
        assert!(set.is_completed);
        assert_eq!(set.weight, 315.0);
        assert_eq!(set.reps, 3);
        assert!(set.completed_at.is_some());
        assert!(!scratch.exercises[0].sets[2].is_completed);
        assert_eq!(scratch.previous_set(0, 2), Some((315.0, 3)));
        assert_eq!(scratch.previous_set(0, 0), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_counts_only_while_running() {
        let manager = manager();
        manager.start(WorkoutType::Push).unwrap();

        advance_millis(5_500).await;
        assert_eq!(manager.elapsed_seconds(), 5);

        manager.pause_timer();
        advance_millis(10_000).await;
        assert_eq!(manager.elapsed_seconds(), 5);

        manager.resume();
        advance_millis(3_500).await;
        assert_eq!(manager.elapsed_seconds(), 8);
        assert_eq!(manager.formatted_time(), "00:08");
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_resume_does_not_double_count() {
        let manager = manager();
        manager.start(WorkoutType::Push).unwrap();
        manager.resume();
        manager.resume();
        manager.pause_timer();
        manager.resume();
        manager.resume();

        advance_millis(2_500).await;
        assert_eq!(manager.elapsed_seconds(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_writes_nothing() {
        let store = Store::open_in_memory().unwrap();
        let manager = manager_with(store.clone());
        manager.cancel();

        manager.start(WorkoutType::Legs).unwrap();
        manager.update_set(0, 0, 225.0, 5);
        manager.cancel();
        manager.cancel();

        assert!(!manager.is_active());
        assert!(!manager.is_timer_running());
        assert_eq!(manager.formatted_time(), "00:00");
        assert!(manager.finish().is_none());
        assert!(store.completed_sessions().unwrap().is_empty());

        // A cancelled session leaves the slot free
        manager.start(WorkoutType::Pull).unwrap();
        assert_eq!(manager.active_type(), Some(WorkoutType::Pull));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_commits_only_completed_sets() {
        let store = Store::open_in_memory().unwrap();
        let manager = manager_with(store.clone());
        manager.start(WorkoutType::Push).unwrap();
        manager.update_set(0, 0, 135.0, 8);
        manager.update_set(0, 1, 135.0, 6);
        manager.update_set(2, 0, 20.0, 12);
        manager.add_exercise("Landmine Press");
        advance_millis(3_500).await;

        let pending = manager.finish().expect("active session");
        assert!(!manager.is_active());
        assert!(!manager.is_timer_running());
        assert_eq!(pending.snapshot().set_count(), 3);

        let committed = pending.wait().await.unwrap();
        assert_eq!(committed.exercise_ids.len(), 4);
        assert_eq!(committed.set_ids.len(), 3);

        let sessions = store.completed_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, committed.session_id);
        assert_eq!(sessions[0].duration_seconds, 3);
        assert_eq!(sessions[0].workout_type, WorkoutType::Push);

        let conn = store.lock();
        let sets = db::list_session_sets(&conn, committed.session_id).unwrap();
        assert_eq!(sets.len(), 3);
        assert!(sets.iter().all(|s| s.is_completed && s.completed_at.is_some()));
        assert_eq!(
            sets.iter().map(|s| s.reps).collect::<Vec<_>>(),
            vec![8, 6, 12]
        );

        let exercises = db::list_exercises(&conn).unwrap();
        assert_eq!(exercises.len(), 4);
        assert_eq!(exercises[0].muscle_group, "Chest");
        assert!(!exercises[0].is_custom);
        assert_eq!(exercises[3].name, "Landmine Press");
        assert!(exercises[3].is_custom);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_single_set() {
        let store = Store::open_in_memory().unwrap();
        let manager = manager_with(store.clone());
        manager.start(WorkoutType::Push).unwrap();
        manager.update_set(0, 0, 135.0, 8);
        advance_millis(61_200).await;
        let elapsed = manager.elapsed_seconds();
        assert_eq!(elapsed, 61);

        let committed = manager.finish().unwrap().wait().await.unwrap();

        let conn = store.lock();
        let session = db::get_session(&conn, committed.session_id)
            .unwrap()
            .unwrap();
        assert_eq!(session.duration_seconds, elapsed);
        let sets = db::list_session_sets(&conn, committed.session_id).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].weight, 135.0);
        assert_eq!(sets[0].reps, 8);
        assert_eq!(sets[0].exercise_name, "Bench Press");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_commit_reports_and_stays_cleared() {
        let store = Store::open_in_memory().unwrap();
        store
            .lock()
            .execute_batch("DROP TABLE workout_sets;")
            .unwrap();
        let mut manager = manager_with(store.clone());
        let failures = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&failures);
        manager.set_commit_failure_hook(move |snapshot, err| {
            assert_eq!(snapshot.workout_type, WorkoutType::Legs);
            assert!(matches!(err, CommitError::Storage(_)));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        manager.start(WorkoutType::Legs).unwrap();
        manager.update_set(0, 0, 225.0, 5);
        let result = manager.finish().unwrap().wait().await;

        assert!(matches!(result, Err(CommitError::Storage(_))));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(!manager.is_active());
        assert!(store.completed_sessions().unwrap().is_empty());
    }

    fn sample_snapshot() -> Arc<SessionSnapshot> {
        Arc::new(SessionSnapshot {
            workout_type: WorkoutType::Pull,
            start_time: Utc::now(),
            elapsed_seconds: 1_200,
            exercises: Vec::new(),
        })
    }

    fn sample_committed() -> CommittedSession {
        CommittedSession {
            workout_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            exercise_ids: Vec::new(),
            set_ids: Vec::new(),
        }
    }

    fn storage_failure() -> CommitError {
        CommitError::Storage(DbError::InvalidValue("disk I/O error".to_string()))
    }

    fn counting_hook(calls: &Arc<AtomicUsize>) -> Option<CommitFailureHook> {
        let calls = Arc::clone(calls);
        let hook: CommitFailureHook = Arc::new(move |_: &SessionSnapshot, _: &CommitError| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        Some(hook)
    }

    /// Write that fails its first `failures` attempts, then succeeds.
    fn flaky_write(
        attempts: &Arc<AtomicUsize>,
        failures: usize,
        committed: CommittedSession,
    ) -> impl FnMut() -> std::future::Ready<Result<CommittedSession, CommitError>> {
        let attempts = Arc::clone(attempts);
        move || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if attempt <= failures {
                Err(storage_failure())
            } else {
                Ok(committed.clone())
            })
        }
    }

    #[tokio::test]
    async fn test_commit_retry_recovers_from_one_failure() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let expected = sample_committed();

        let result = commit_snapshot(
            sample_snapshot(),
            true,
            counting_hook(&hook_calls),
            flaky_write(&attempts, 1, expected.clone()),
        )
        .await;

        assert_eq!(result.unwrap(), expected);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_commit_retry_gives_up_after_second_failure() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::new(AtomicUsize::new(0));

        let result = commit_snapshot(
            sample_snapshot(),
            true,
            counting_hook(&hook_calls),
            flaky_write(&attempts, usize::MAX, sample_committed()),
        )
        .await;

        assert!(matches!(result, Err(CommitError::Storage(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_commit_without_retry_tries_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::new(AtomicUsize::new(0));

        let result = commit_snapshot(
            sample_snapshot(),
            false,
            counting_hook(&hook_calls),
            flaky_write(&attempts, 1, sample_committed()),
        )
        .await;

        assert!(matches!(result, Err(CommitError::Storage(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_pending_commit_still_lands() {
        let store = Store::open_in_memory().unwrap();
        let manager = manager_with(store.clone());
        manager.start(WorkoutType::Shoulders).unwrap();
        manager.update_set(1, 0, 25.0, 15);
        drop(manager.finish());

        for _ in 0..100 {
            if !store.completed_sessions().unwrap().is_empty() {
                break;
            }
            task::yield_now().await;
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(store.completed_sessions().unwrap().len(), 1);
    }

    #[test]
    fn test_formatting_helpers() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(125), "02:05");
        assert_eq!(format_elapsed(3_725), "62:05");
        assert_eq!(format_weight(135.0, "lbs"), "135 lbs");
        assert_eq!(format_weight(22.5, "kg"), "22.5 kg");
        assert_eq!(ActiveSet::new(1).formatted_weight("lbs"), "-");
    }
}
