//src/db.rs
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{named_params, params, Connection, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strum_macros::EnumIter;
use thiserror::Error;
use uuid::Uuid;

use crate::session::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
pub enum WorkoutType {
    Push,
    Pull,
    Shoulders,
    Legs,
}

impl WorkoutType {
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Push => "Push Day",
            Self::Pull => "Pull Day",
            Self::Shoulders => "Shoulders",
            Self::Legs => "Legs",
        }
    }

    pub const fn muscles(self) -> &'static str {
        match self {
            Self::Push => "Chest · Triceps · Front Delts",
            Self::Pull => "Back · Biceps · Rear Delts",
            Self::Shoulders => "Lateral · Front · Rear",
            Self::Legs => "Quads · Hamstrings · Calves",
        }
    }
}

// Convert string from DB to WorkoutType
impl TryFrom<&str> for WorkoutType {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "push" => Ok(Self::Push),
            "pull" => Ok(Self::Pull),
            "shoulders" => Ok(Self::Shoulders),
            "legs" => Ok(Self::Legs),
            _ => Err(Error::InvalidValue(format!("workout type '{value}'"))),
        }
    }
}

// Raw name is what gets stored
impl fmt::Display for WorkoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "Push"),
            Self::Pull => write!(f, "Pull"),
            Self::Shoulders => write!(f, "Shoulders"),
            Self::Legs => write!(f, "Legs"),
        }
    }
}

/// One category lineage. Owns its sessions (cascade delete).
#[derive(Debug, Clone, PartialEq)]
pub struct Workout {
    pub id: Uuid,
    pub workout_type: WorkoutType,
    pub created_at: DateTime<Utc>,
}

/// A persisted session, joined with the type of its owning workout.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutSession {
    pub id: Uuid,
    pub workout_id: Uuid,
    pub workout_type: WorkoutType,
    pub date: DateTime<Utc>,
    pub duration_seconds: u64,
    pub is_completed: bool,
    pub notes: Option<String>,
    /// SQLite rowid; the store's natural enumeration order.
    pub insertion_order: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutSet {
    pub id: Uuid,
    pub set_number: u32,
    pub weight: f64,
    pub reps: u32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub exercise_id: Uuid,
    pub session_id: Uuid,
    pub exercise_name: String, // Populated by JOIN
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exercise {
    pub id: Uuid,
    pub name: String,
    pub muscle_group: String,
    pub is_custom: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomExercise {
    pub id: Uuid,
    pub name: String,
    pub workout_type: WorkoutType,
    pub created_at: DateTime<Utc>,
}

/// Row ids written by one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedSession {
    pub workout_id: Uuid,
    pub session_id: Uuid,
    pub exercise_ids: Vec<Uuid>,
    pub set_ids: Vec<Uuid>,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database connection failed")]
    Connection(#[from] rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing database file")]
    Io(#[from] std::io::Error),
    #[error("Database query failed: {0}")]
    QueryFailed(rusqlite::Error),
    #[error("Database insert failed: {0}")]
    InsertFailed(rusqlite::Error),
    #[error("Database delete failed: {0}")]
    DeleteFailed(rusqlite::Error),
    #[error("Workout session not found: ID {0}")]
    SessionNotFound(Uuid),
    #[error("Workout not found: ID {0}")]
    WorkoutNotFound(Uuid),
    #[error("Exercise not found: ID {0}")]
    ExerciseNotFound(Uuid),
    #[error("Custom exercise not found: '{0}'")]
    CustomExerciseNotFound(String),
    #[error("Custom exercise '{0}' already exists for {1}")]
    CustomExerciseExists(String, WorkoutType),
    #[error("Invalid value stored in database: {0}")]
    InvalidValue(String),
}

const DB_FILE_NAME: &str = "workouts.sqlite";
const APP_DATA_DIR: &str = "fitlift";

/// Gets the path to the SQLite database file within the app's data directory.
pub fn get_db_path() -> Result<PathBuf, Error> {
    let data_dir = dirs::data_dir().ok_or(Error::DataDir)?;
    let app_dir = data_dir.join(APP_DATA_DIR);
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// Opens a connection to the SQLite database with foreign keys enforced.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<Connection, Error> {
    let conn = Connection::open(path).map_err(Error::Connection)?;
    // Cascades below rely on this; it is per-connection in SQLite.
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

/// Initializes the database tables if they don't exist.
pub fn init_db(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS workouts (
            id TEXT PRIMARY KEY NOT NULL,
            workout_type TEXT NOT NULL CHECK(workout_type IN ('Push', 'Pull', 'Shoulders', 'Legs')),
            created_at TEXT NOT NULL -- RFC3339
        );
        CREATE TABLE IF NOT EXISTS workout_sessions (
            id TEXT PRIMARY KEY NOT NULL,
            workout_id TEXT NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
            date TEXT NOT NULL,
            duration_seconds INTEGER NOT NULL,
            is_completed INTEGER NOT NULL,
            notes TEXT
        );
        CREATE TABLE IF NOT EXISTS exercises (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            muscle_group TEXT NOT NULL,
            is_custom INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS workout_sets (
            id TEXT PRIMARY KEY NOT NULL,
            set_number INTEGER NOT NULL,
            weight REAL NOT NULL,
            reps INTEGER NOT NULL,
            is_completed INTEGER NOT NULL,
            completed_at TEXT,
            exercise_id TEXT NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
            session_id TEXT NOT NULL REFERENCES workout_sessions(id) ON DELETE CASCADE
        );
        CREATE TABLE IF NOT EXISTS custom_exercises (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL COLLATE NOCASE,
            workout_type TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(name, workout_type)
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_workout_id ON workout_sessions(workout_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_date ON workout_sessions(date);
        CREATE INDEX IF NOT EXISTS idx_sets_session_id ON workout_sets(session_id);
        CREATE INDEX IF NOT EXISTS idx_sets_exercise_id ON workout_sets(exercise_id);",
    )
    .map_err(Error::Connection)
}

/// Writes a finished session in one transaction: workout, session, exercises, sets.
/// Either every row lands or none does.
pub fn insert_session_batch(
    conn: &mut Connection,
    snapshot: &SessionSnapshot,
) -> Result<CommittedSession, Error> {
    let now = Utc::now();
    let workout_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();
    let duration = i64::try_from(snapshot.elapsed_seconds).unwrap_or(i64::MAX);

    let tx = conn.transaction().map_err(Error::Connection)?;

    tx.execute(
        "INSERT INTO workouts (id, workout_type, created_at) VALUES (?1, ?2, ?3)",
        params![
            workout_id.to_string(),
            snapshot.workout_type.to_string(),
            now.to_rfc3339()
        ],
    )
    .map_err(Error::InsertFailed)?;

    tx.execute(
        "INSERT INTO workout_sessions (id, workout_id, date, duration_seconds, is_completed, notes)
         VALUES (:id, :workout_id, :date, :duration, 1, NULL)",
        named_params! {
            ":id": session_id.to_string(),
            ":workout_id": workout_id.to_string(),
            ":date": snapshot.start_time.to_rfc3339(),
            ":duration": duration,
        },
    )
    .map_err(Error::InsertFailed)?;

    let mut exercise_ids = Vec::with_capacity(snapshot.exercises.len());
    let mut set_ids = Vec::new();
    for exercise in &snapshot.exercises {
        let exercise_id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO exercises (id, name, muscle_group, is_custom, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                exercise_id.to_string(),
                exercise.name,
                exercise.muscle_group,
                exercise.is_custom,
                now.to_rfc3339()
            ],
        )
        .map_err(Error::InsertFailed)?;

        for set in &exercise.sets {
            let set_id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO workout_sets (id, set_number, weight, reps, is_completed, completed_at, exercise_id, session_id)
                 VALUES (:id, :set_number, :weight, :reps, 1, :completed_at, :exercise_id, :session_id)",
                named_params! {
                    ":id": set_id.to_string(),
                    ":set_number": set.set_number,
                    ":weight": set.weight,
                    ":reps": set.reps,
                    ":completed_at": set.completed_at.map(|ts| ts.to_rfc3339()),
                    ":exercise_id": exercise_id.to_string(),
                    ":session_id": session_id.to_string(),
                },
            )
            .map_err(Error::InsertFailed)?;
            set_ids.push(set_id);
        }
        exercise_ids.push(exercise_id);
    }

    tx.commit().map_err(Error::Connection)?;

    Ok(CommittedSession {
        workout_id,
        session_id,
        exercise_ids,
        set_ids,
    })
}

fn parse_uuid(idx: usize, value: &str) -> Result<Uuid, rusqlite::Error> {
    Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(idx: usize, value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_workout_type(idx: usize, value: &str) -> Result<WorkoutType, rusqlite::Error> {
    WorkoutType::try_from(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::<dyn std::error::Error + Send + Sync>::from(e.to_string()),
        )
    })
}

// Helper function to map a database row to a WorkoutSession struct
fn map_row_to_session(row: &Row) -> Result<WorkoutSession, rusqlite::Error> {
    let id: String = row.get(0)?;
    let workout_id: String = row.get(1)?;
    let type_str: String = row.get(2)?;
    let date_str: String = row.get(3)?;
    let duration: i64 = row.get(4)?;
    let is_completed: bool = row.get(5)?;
    let notes: Option<String> = row.get(6)?;
    let insertion_order: i64 = row.get(7)?;

    Ok(WorkoutSession {
        id: parse_uuid(0, &id)?,
        workout_id: parse_uuid(1, &workout_id)?,
        workout_type: parse_workout_type(2, &type_str)?,
        date: parse_timestamp(3, &date_str)?,
        duration_seconds: u64::try_from(duration).unwrap_or(0),
        is_completed,
        notes,
        insertion_order,
    })
}

fn map_row_to_set(row: &Row) -> Result<WorkoutSet, rusqlite::Error> {
    let id: String = row.get(0)?;
    let completed_at: Option<String> = row.get(5)?;
    let exercise_id: String = row.get(6)?;
    let session_id: String = row.get(7)?;

    Ok(WorkoutSet {
        id: parse_uuid(0, &id)?,
        set_number: row.get(1)?,
        weight: row.get(2)?,
        reps: row.get(3)?,
        is_completed: row.get(4)?,
        completed_at: completed_at
            .as_deref()
            .map(|ts| parse_timestamp(5, ts))
            .transpose()?,
        exercise_id: parse_uuid(6, &exercise_id)?,
        session_id: parse_uuid(7, &session_id)?,
        exercise_name: row.get(8)?,
    })
}

#[derive(Default, Debug, Clone, Copy)]
pub struct SessionFilters {
    pub workout_type: Option<WorkoutType>,
    pub completed_only: bool,
    pub limit: Option<u32>,
}

/// Lists sessions in insertion order (the store's natural enumeration order).
pub fn list_sessions(
    conn: &Connection,
    filters: &SessionFilters,
) -> Result<Vec<WorkoutSession>, Error> {
    let mut sql = "SELECT s.id, s.workout_id, w.workout_type, s.date, s.duration_seconds, s.is_completed, s.notes, s.rowid
                   FROM workout_sessions s JOIN workouts w ON s.workout_id = w.id WHERE 1=1"
        .to_string();
    let mut params_map: HashMap<String, Box<dyn ToSql>> = HashMap::new();

    if let Some(workout_type) = filters.workout_type {
        sql.push_str(" AND w.workout_type = :workout_type");
        params_map.insert(":workout_type".into(), Box::new(workout_type.to_string()));
    }
    if filters.completed_only {
        sql.push_str(" AND s.is_completed = 1");
    }
    sql.push_str(" ORDER BY s.rowid ASC");
    if let Some(limit) = filters.limit {
        sql.push_str(" LIMIT :limit");
        params_map.insert(":limit".into(), Box::new(limit));
    }

    let params_for_query: Vec<(&str, &dyn ToSql)> = params_map
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_ref()))
        .collect();

    let mut stmt = conn.prepare(&sql).map_err(Error::QueryFailed)?;
    let session_iter = stmt
        .query_map(params_for_query.as_slice(), map_row_to_session)
        .map_err(Error::QueryFailed)?;

    session_iter
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

/// Retrieves one session by id.
pub fn get_session(conn: &Connection, id: Uuid) -> Result<Option<WorkoutSession>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.workout_id, w.workout_type, s.date, s.duration_seconds, s.is_completed, s.notes, s.rowid
             FROM workout_sessions s JOIN workouts w ON s.workout_id = w.id WHERE s.id = ?1",
        )
        .map_err(Error::QueryFailed)?;
    stmt.query_row(params![id.to_string()], map_row_to_session)
        .optional()
        .map_err(Error::QueryFailed)
}

/// Lists the sets of a session with their exercise names, in insertion order.
pub fn list_session_sets(conn: &Connection, session_id: Uuid) -> Result<Vec<WorkoutSet>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT ws.id, ws.set_number, ws.weight, ws.reps, ws.is_completed, ws.completed_at,
                    ws.exercise_id, ws.session_id, e.name
             FROM workout_sets ws JOIN exercises e ON ws.exercise_id = e.id
             WHERE ws.session_id = ?1 ORDER BY ws.rowid ASC",
        )
        .map_err(Error::QueryFailed)?;
    let set_iter = stmt
        .query_map(params![session_id.to_string()], map_row_to_set)
        .map_err(Error::QueryFailed)?;
    set_iter
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

pub fn list_workouts(conn: &Connection) -> Result<Vec<Workout>, Error> {
    let mut stmt = conn
        .prepare("SELECT id, workout_type, created_at FROM workouts ORDER BY rowid ASC")
        .map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let type_str: String = row.get(1)?;
            let created_at: String = row.get(2)?;
            Ok(Workout {
                id: parse_uuid(0, &id)?,
                workout_type: parse_workout_type(1, &type_str)?,
                created_at: parse_timestamp(2, &created_at)?,
            })
        })
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

pub fn list_exercises(conn: &Connection) -> Result<Vec<Exercise>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, muscle_group, is_custom, created_at FROM exercises ORDER BY rowid ASC",
        )
        .map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let created_at: String = row.get(4)?;
            Ok(Exercise {
                id: parse_uuid(0, &id)?,
                name: row.get(1)?,
                muscle_group: row.get(2)?,
                is_custom: row.get(3)?,
                created_at: parse_timestamp(4, &created_at)?,
            })
        })
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

/// Deletes a session; its sets go with it.
pub fn delete_session(conn: &Connection, id: Uuid) -> Result<usize, Error> {
    let rows_affected = conn
        .execute(
            "DELETE FROM workout_sessions WHERE id = ?1",
            params![id.to_string()],
        )
        .map_err(Error::DeleteFailed)?;
    if rows_affected == 0 {
        Err(Error::SessionNotFound(id))
    } else {
        Ok(rows_affected)
    }
}

/// Deletes a workout; its sessions and their sets go with it.
pub fn delete_workout(conn: &Connection, id: Uuid) -> Result<usize, Error> {
    let rows_affected = conn
        .execute("DELETE FROM workouts WHERE id = ?1", params![id.to_string()])
        .map_err(Error::DeleteFailed)?;
    if rows_affected == 0 {
        Err(Error::WorkoutNotFound(id))
    } else {
        Ok(rows_affected)
    }
}

/// Deletes an exercise; every set referencing it goes with it.
pub fn delete_exercise(conn: &Connection, id: Uuid) -> Result<usize, Error> {
    let rows_affected = conn
        .execute("DELETE FROM exercises WHERE id = ?1", params![id.to_string()])
        .map_err(Error::DeleteFailed)?;
    if rows_affected == 0 {
        Err(Error::ExerciseNotFound(id))
    } else {
        Ok(rows_affected)
    }
}

/// Wipes all session history. Custom exercise catalog rows are kept.
/// Returns the number of sessions removed.
pub fn clear_history(conn: &mut Connection) -> Result<usize, Error> {
    let tx = conn.transaction().map_err(Error::Connection)?;
    let sessions: usize = tx
        .query_row("SELECT COUNT(*) FROM workout_sessions", [], |row| row.get(0))
        .map_err(Error::QueryFailed)?;
    tx.execute("DELETE FROM workouts", [])
        .map_err(Error::DeleteFailed)?;
    tx.execute("DELETE FROM exercises", [])
        .map_err(Error::DeleteFailed)?;
    tx.commit().map_err(Error::Connection)?;
    Ok(sessions)
}

// ---- Custom Exercise Functions ----

/// Adds a custom exercise name for a workout type. Handles UNIQUE constraint.
pub fn add_custom_exercise(
    conn: &Connection,
    name: &str,
    workout_type: WorkoutType,
) -> Result<Uuid, Error> {
    let id = Uuid::new_v4();
    match conn.execute(
        "INSERT INTO custom_exercises (id, name, workout_type, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            id.to_string(),
            name,
            workout_type.to_string(),
            Utc::now().to_rfc3339()
        ],
    ) {
        Ok(_) => Ok(id),
        Err(e) => {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.code == rusqlite::ErrorCode::ConstraintViolation {
                    return Err(Error::CustomExerciseExists(name.to_string(), workout_type));
                }
            }
            Err(Error::InsertFailed(e))
        }
    }
}

/// Lists custom exercises for a type, sorted by name.
pub fn list_custom_exercises(
    conn: &Connection,
    workout_type: WorkoutType,
) -> Result<Vec<CustomExercise>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, workout_type, created_at FROM custom_exercises
             WHERE workout_type = ?1 ORDER BY name ASC",
        )
        .map_err(Error::QueryFailed)?;
    let iter = stmt
        .query_map(params![workout_type.to_string()], |row| {
            let id: String = row.get(0)?;
            let type_str: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok(CustomExercise {
                id: parse_uuid(0, &id)?,
                name: row.get(1)?,
                workout_type: parse_workout_type(2, &type_str)?,
                created_at: parse_timestamp(3, &created_at)?,
            })
        })
        .map_err(Error::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(Error::QueryFailed)
}

/// Deletes a custom exercise by name (case-insensitive) within a type.
pub fn delete_custom_exercise(
    conn: &Connection,
    name: &str,
    workout_type: WorkoutType,
) -> Result<usize, Error> {
    let rows_affected = conn
        .execute(
            "DELETE FROM custom_exercises WHERE name = ?1 COLLATE NOCASE AND workout_type = ?2",
            params![name, workout_type.to_string()],
        )
        .map_err(Error::DeleteFailed)?;
    if rows_affected == 0 {
        Err(Error::CustomExerciseNotFound(name.to_string()))
    } else {
        Ok(rows_affected)
    }
}

/// Shared handle to the SQLite connection.
///
/// The session manager's background commit runs on a blocking thread. Reads
/// lock the connection directly from whatever thread they are on and hold it
/// for one short query, so a reader waits at most for one open commit
/// transaction.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens (creating if needed) and initializes the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let conn = open_db(path)?;
        init_db(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_db(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Locks the connection for direct use. Blocks while a commit is writing.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    pub fn commit_session(&self, snapshot: &SessionSnapshot) -> Result<CommittedSession, Error> {
        insert_session_batch(&mut self.lock(), snapshot)
    }

    pub fn completed_sessions(&self) -> Result<Vec<WorkoutSession>, Error> {
        let filters = SessionFilters {
            completed_only: true,
            ..Default::default()
        };
        list_sessions(&self.lock(), &filters)
    }

    /// Custom exercise names for a type, sorted.
    pub fn custom_exercise_names(&self, workout_type: WorkoutType) -> Result<Vec<String>, Error> {
        list_custom_exercises(&self.lock(), workout_type)
            .map(|rows| rows.into_iter().map(|row| row.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SnapshotExercise, SnapshotSet};
    use chrono::Duration;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        init_db(&conn).unwrap();
        conn
    }

    fn snapshot(workout_type: WorkoutType, exercises: &[(&str, usize)]) -> SessionSnapshot {
        SessionSnapshot {
            workout_type,
            start_time: Utc::now() - Duration::minutes(45),
            elapsed_seconds: 2700,
            exercises: exercises
                .iter()
                .map(|(name, sets)| SnapshotExercise {
                    name: (*name).to_string(),
                    muscle_group: String::new(),
                    is_custom: false,
                    sets: (1..=*sets)
                        .map(|n| SnapshotSet {
                            set_number: u32::try_from(n).unwrap(),
                            weight: 100.0,
                            reps: 5,
                            completed_at: Some(Utc::now()),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn count(conn: &Connection, table: &str) -> usize {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn test_batch_insert_wires_foreign_keys() {
        let mut conn = test_conn();
        let committed =
            insert_session_batch(&mut conn, &snapshot(WorkoutType::Pull, &[("Deadlift", 2), ("Barbell Row", 3)]))
                .unwrap();

        assert_eq!(committed.exercise_ids.len(), 2);
        assert_eq!(committed.set_ids.len(), 5);

        let session = get_session(&conn, committed.session_id).unwrap().unwrap();
        assert_eq!(session.workout_id, committed.workout_id);
        assert_eq!(session.workout_type, WorkoutType::Pull);
        assert_eq!(session.duration_seconds, 2700);
        assert!(session.is_completed);
        assert_eq!(session.notes, None);

        let sets = list_session_sets(&conn, committed.session_id).unwrap();
        assert_eq!(sets.len(), 5);
        assert!(sets.iter().all(|s| s.session_id == committed.session_id));
        assert_eq!(sets[0].exercise_name, "Deadlift");
        assert_eq!(sets[0].exercise_id, committed.exercise_ids[0]);
        assert_eq!(sets[4].exercise_id, committed.exercise_ids[1]);
    }

    #[test]
    fn test_failed_batch_leaves_nothing_behind() {
        let mut conn = test_conn();
        conn.execute_batch("DROP TABLE workout_sets;").unwrap();

        let result = insert_session_batch(&mut conn, &snapshot(WorkoutType::Push, &[("Bench Press", 1)]));
        assert!(matches!(result, Err(Error::InsertFailed(_))));
        assert_eq!(count(&conn, "workouts"), 0);
        assert_eq!(count(&conn, "workout_sessions"), 0);
        assert_eq!(count(&conn, "exercises"), 0);
    }

    #[test]
    fn test_delete_session_cascades_sets() {
        let mut conn = test_conn();
        let keep = insert_session_batch(&mut conn, &snapshot(WorkoutType::Legs, &[("Squat", 3)])).unwrap();
        let gone = insert_session_batch(&mut conn, &snapshot(WorkoutType::Legs, &[("Leg Press", 2)])).unwrap();

        delete_session(&conn, gone.session_id).unwrap();

        assert_eq!(count(&conn, "workout_sessions"), 1);
        assert_eq!(count(&conn, "workout_sets"), 3);
        assert_eq!(list_session_sets(&conn, keep.session_id).unwrap().len(), 3);
        // Exercises are not owned by sessions
        assert_eq!(count(&conn, "exercises"), 2);

        assert!(matches!(
            delete_session(&conn, gone.session_id),
            Err(Error::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_delete_exercise_cascades_sets() {
        let mut conn = test_conn();
        let committed =
            insert_session_batch(&mut conn, &snapshot(WorkoutType::Push, &[("Bench Press", 2), ("Cable Flyes", 3)]))
                .unwrap();

        delete_exercise(&conn, committed.exercise_ids[0]).unwrap();

        let sets = list_session_sets(&conn, committed.session_id).unwrap();
        assert_eq!(sets.len(), 3);
        assert!(sets.iter().all(|s| s.exercise_name == "Cable Flyes"));
        assert_eq!(count(&conn, "workout_sessions"), 1);
    }

    #[test]
    fn test_delete_workout_cascades_sessions_and_sets() {
        let mut conn = test_conn();
        let committed =
            insert_session_batch(&mut conn, &snapshot(WorkoutType::Shoulders, &[("Shrugs", 4)])).unwrap();

        delete_workout(&conn, committed.workout_id).unwrap();

        assert_eq!(count(&conn, "workouts"), 0);
        assert_eq!(count(&conn, "workout_sessions"), 0);
        assert_eq!(count(&conn, "workout_sets"), 0);
    }

    #[test]
    fn test_clear_history_keeps_custom_exercises() {
        let mut conn = test_conn();
        insert_session_batch(&mut conn, &snapshot(WorkoutType::Push, &[("Bench Press", 3)])).unwrap();
        insert_session_batch(&mut conn, &snapshot(WorkoutType::Pull, &[("Deadlift", 1)])).unwrap();
        add_custom_exercise(&conn, "Landmine Press", WorkoutType::Push).unwrap();

        let removed = clear_history(&mut conn).unwrap();

        assert_eq!(removed, 2);
        for table in ["workouts", "workout_sessions", "exercises", "workout_sets"] {
            assert_eq!(count(&conn, table), 0, "{table} should be empty");
        }
        assert_eq!(count(&conn, "custom_exercises"), 1);
    }

    #[test]
    fn test_list_sessions_filters() {
        let mut conn = test_conn();
        insert_session_batch(&mut conn, &snapshot(WorkoutType::Push, &[])).unwrap();
        insert_session_batch(&mut conn, &snapshot(WorkoutType::Legs, &[])).unwrap();
        insert_session_batch(&mut conn, &snapshot(WorkoutType::Push, &[])).unwrap();
        conn.execute("UPDATE workout_sessions SET is_completed = 0 WHERE rowid = 3", [])
            .unwrap();

        let all = list_sessions(&conn, &SessionFilters::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].insertion_order < w[1].insertion_order));

        let push_done = list_sessions(
            &conn,
            &SessionFilters {
                workout_type: Some(WorkoutType::Push),
                completed_only: true,
                limit: None,
            },
        )
        .unwrap();
        assert_eq!(push_done.len(), 1);

        let limited = list_sessions(
            &conn,
            &SessionFilters {
                limit: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_custom_exercises_unique_per_type() {
        let conn = test_conn();
        add_custom_exercise(&conn, "Zercher Squat", WorkoutType::Legs).unwrap();
        add_custom_exercise(&conn, "Belt Squat", WorkoutType::Legs).unwrap();
        add_custom_exercise(&conn, "hack squat", WorkoutType::Legs).unwrap();
        // Same name under another type is fine
        add_custom_exercise(&conn, "Zercher Squat", WorkoutType::Pull).unwrap();

        let result = add_custom_exercise(&conn, "zercher squat", WorkoutType::Legs);
        assert!(matches!(result, Err(Error::CustomExerciseExists(_, WorkoutType::Legs))));

        let names: Vec<String> = list_custom_exercises(&conn, WorkoutType::Legs)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        // Ordering ignores case
        assert_eq!(names, vec!["Belt Squat", "hack squat", "Zercher Squat"]);

        delete_custom_exercise(&conn, "BELT SQUAT", WorkoutType::Legs).unwrap();
        assert_eq!(list_custom_exercises(&conn, WorkoutType::Legs).unwrap().len(), 2);
        assert!(matches!(
            delete_custom_exercise(&conn, "Belt Squat", WorkoutType::Legs),
            Err(Error::CustomExerciseNotFound(_))
        ));
    }

    #[test]
    fn test_reads_alongside_commit_on_another_thread() {
        let store = Store::open_in_memory().unwrap();
        let writer = store.clone();
        let snap = snapshot(WorkoutType::Push, &[("Bench Press", 3), ("Dips", 2)]);

        std::thread::scope(|scope| {
            let handle = scope.spawn(move || writer.commit_session(&snap));
            // Sees either nothing or the whole session, never part of it
            for _ in 0..50 {
                let seen = store.completed_sessions().unwrap();
                assert!(seen.len() <= 1);
                if !seen.is_empty() {
                    assert_eq!(count(&store.lock(), "workout_sets"), 5);
                }
            }
            handle.join().unwrap().unwrap();
        });

        assert_eq!(store.completed_sessions().unwrap().len(), 1);
    }

    #[test]
    fn test_workout_type_round_trip_through_strings() {
        assert_eq!(WorkoutType::try_from("shoulders").unwrap(), WorkoutType::Shoulders);
        assert_eq!(WorkoutType::Legs.to_string(), "Legs");
        assert!(WorkoutType::try_from("core").is_err());
    }
}
