use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use uuid::Uuid;

// --- Declare modules ---
pub mod catalog;
mod config;
pub mod db;
pub mod history;
pub mod session;

// --- Expose public types ---
pub use catalog::{browse, BuiltinCatalog, ExerciseCatalog, ExerciseGroup, CUSTOM_GROUP};
pub use config::{
    get_config_path as get_config_path_util, load_config as load_config_util, parse_color,
    save_config as save_config_util, Config, ConfigError, StandardColor, ThemeConfig, Units,
    WeekStart, CONFIG_ENV_VAR,
};
pub use db::{
    get_db_path as get_db_path_util, CommittedSession, CustomExercise, Error as DbError,
    Exercise, SessionFilters, Store, Workout, WorkoutSession, WorkoutSet, WorkoutType,
};
pub use history::{CalendarDay, CalendarMonth, ExerciseSummary, HistoryError, Totals};
pub use session::{
    ActiveExercise, ActiveSet, CommitError, ConflictResolution, OpenOutcome, PendingCommit,
    SessionError, SessionManager, SessionOptions, SessionScratch, SessionSnapshot,
};

/// A stored session with its sets grouped per exercise.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDetail {
    pub session: WorkoutSession,
    pub exercises: Vec<ExerciseSummary>,
}

impl SessionDetail {
    pub fn exercise_count(&self) -> usize {
        self.exercises.len()
    }

    pub fn set_count(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }
}

/// Owns the app's config, store and the single session manager for the
/// lifetime of the process.
pub struct AppService {
    pub config: Config,
    pub sessions: SessionManager,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    store: Store,
}

impl AppService {
    /// Initializes the application service.
    /// # Errors
    /// Returns `anyhow::Error` if config/db path determination, loading, or
    /// initialization fails, or if called outside a Tokio runtime.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;

        let db_path = db::get_db_path().context("Failed to determine database path")?;
        let store = Store::open(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;

        let runtime = Handle::try_current()
            .context("The application service must be started inside a Tokio runtime")?;

        Ok(Self::from_parts(config, store, db_path, config_path, runtime))
    }

    /// Assembles a service from already opened parts.
    pub fn from_parts(
        config: Config,
        store: Store,
        db_path: PathBuf,
        config_path: PathBuf,
        runtime: Handle,
    ) -> Self {
        let options = SessionOptions {
            retry_failed_commit: config.retry_failed_commit,
            ..SessionOptions::default()
        };
        let sessions = SessionManager::new(
            store.clone(),
            Arc::new(BuiltinCatalog),
            options,
            runtime,
        );
        Self {
            config,
            sessions,
            db_path,
            config_path,
            store,
        }
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn weight_unit(&self) -> &'static str {
        self.config.units.weight_label()
    }

    /// Stops the session timer. Call once at exit.
    pub fn shutdown(&self) {
        self.sessions.shutdown();
    }

    // --- History ---

    /// Completed sessions in stored order.
    /// # Errors
    /// Returns `anyhow::Error` if the query fails.
    pub fn completed_sessions(&self) -> Result<Vec<WorkoutSession>> {
        self.store
            .completed_sessions()
            .context("Failed to load workout history")
    }

    /// Sessions matching `filters`, in stored order.
    /// # Errors
    /// Returns `anyhow::Error` if the query fails.
    pub fn list_sessions(&self, filters: &SessionFilters) -> Result<Vec<WorkoutSession>> {
        db::list_sessions(&self.store.lock(), filters).context("Failed to list workout sessions")
    }

    /// # Errors
    /// Returns `anyhow::Error` if the query fails.
    pub fn last_session_for(&self, workout_type: WorkoutType) -> Result<Option<WorkoutSession>> {
        let sessions = self.completed_sessions()?;
        Ok(history::last_session_for(&sessions, workout_type).cloned())
    }

    /// "Today", "Yesterday", "N days ago" or "Never".
    /// # Errors
    /// Returns `anyhow::Error` if the query fails.
    pub fn last_workout_text(&self, workout_type: WorkoutType) -> Result<String> {
        let sessions = self.completed_sessions()?;
        Ok(history::last_workout_text(
            &sessions,
            workout_type,
            history::today(),
        ))
    }

    /// # Errors
    /// Returns `anyhow::Error` if the query fails.
    pub fn current_streak(&self) -> Result<u32> {
        Ok(history::current_streak(
            &self.completed_sessions()?,
            history::today(),
        ))
    }

    /// # Errors
    /// Returns `anyhow::Error` if the query fails.
    pub fn sessions_on(&self, day: NaiveDate) -> Result<Vec<WorkoutSession>> {
        let sessions = self.completed_sessions()?;
        Ok(history::sessions_on(&sessions, day)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Grid for `month` using the configured first weekday.
    /// # Errors
    /// Returns `anyhow::Error` if the query fails.
    pub fn month_grid(&self, month: CalendarMonth) -> Result<Vec<CalendarDay>> {
        Ok(history::month_grid(
            &self.completed_sessions()?,
            month,
            self.config.week_start.into(),
            history::today(),
        ))
    }

    /// # Errors
    /// Returns `anyhow::Error` if the query fails.
    pub fn totals(&self) -> Result<Totals> {
        Ok(history::totals(
            &self.completed_sessions()?,
            history::today(),
        ))
    }

    /// # Errors
    /// Returns `anyhow::Error` wrapping `DbError::SessionNotFound` for an
    /// unknown id, or if the query fails.
    pub fn session_detail(&self, session_id: Uuid) -> Result<SessionDetail> {
        let conn = self.store.lock();
        let session = db::get_session(&conn, session_id)
            .context("Failed to load workout session")?
            .ok_or(DbError::SessionNotFound(session_id))?;
        let sets = db::list_session_sets(&conn, session_id)
            .with_context(|| format!("Failed to load sets for session {session_id}"))?;
        Ok(SessionDetail {
            session,
            exercises: history::summarize_sets(&sets),
        })
    }

    /// Deletes every workout, session, set and exercise row. Custom exercises
    /// stay. Returns the number of sessions removed.
    /// # Errors
    /// Returns `anyhow::Error` if the delete fails; nothing is removed then.
    pub fn clear_all_data(&self) -> Result<usize> {
        let removed = db::clear_history(&mut self.store.lock())
            .context("Failed to clear workout history")?;
        tracing::info!(removed, "Cleared workout history");
        Ok(removed)
    }

    // --- Exercises ---

    /// # Errors
    /// Returns `anyhow::Error` if the name is blank, already exists for the
    /// type (any case), or the insert fails.
    pub fn add_custom_exercise(&self, workout_type: WorkoutType, name: &str) -> Result<Uuid> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            bail!("Exercise name cannot be empty.");
        }
        let id = db::add_custom_exercise(&self.store.lock(), trimmed, workout_type)?;
        Ok(id)
    }

    /// Custom exercise names for a type, sorted.
    /// # Errors
    /// Returns `anyhow::Error` if the query fails.
    pub fn custom_exercises(&self, workout_type: WorkoutType) -> Result<Vec<String>> {
        self.store
            .custom_exercise_names(workout_type)
            .with_context(|| format!("Failed to list custom exercises for {workout_type}"))
    }

    /// # Errors
    /// Returns `anyhow::Error` wrapping `DbError::CustomExerciseNotFound` if
    /// no such exercise exists for the type.
    pub fn delete_custom_exercise(&self, workout_type: WorkoutType, name: &str) -> Result<usize> {
        let removed = db::delete_custom_exercise(&self.store.lock(), name.trim(), workout_type)?;
        Ok(removed)
    }

    /// Exercise picker: built-in groups plus a trailing "Custom" group,
    /// optionally filtered by `search`.
    /// # Errors
    /// Returns `anyhow::Error` if custom exercises cannot be loaded.
    pub fn browse_exercises(
        &self,
        workout_type: WorkoutType,
        search: Option<&str>,
    ) -> Result<Vec<ExerciseGroup>> {
        let custom = self.custom_exercises(workout_type)?;
        Ok(catalog::browse(workout_type, &custom, search))
    }
}
