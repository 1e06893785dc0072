//src/history.rs
//! Read-side views over stored sessions: recency, streaks, the month grid,
//! per-day lookups and totals.
//!
//! Everything here is a pure function of the session list passed in plus an
//! explicit `today`, so callers decide the clock. Calendar days are local
//! days. Only completed sessions count as history.

use chrono::{DateTime, Datelike, Duration, Local, Months, NaiveDate, Utc, Weekday};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::db::{WorkoutSession, WorkoutSet, WorkoutType};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Invalid month '{0}'. Use YYYY-MM.")]
    InvalidMonth(String),
}

/// Local calendar day of a stored timestamp.
pub fn local_day(date: DateTime<Utc>) -> NaiveDate {
    date.with_timezone(&Local).date_naive()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn completed(sessions: &[WorkoutSession]) -> impl Iterator<Item = &WorkoutSession> {
    sessions.iter().filter(|s| s.is_completed)
}

/// Most recent completed session of a type. Equal dates go to the session
/// stored last.
pub fn last_session_for(
    sessions: &[WorkoutSession],
    workout_type: WorkoutType,
) -> Option<&WorkoutSession> {
    completed(sessions)
        .filter(|s| s.workout_type == workout_type)
        .max_by_key(|s| (s.date, s.insertion_order))
}

/// "Today", "Yesterday" or "N days ago", counted in calendar days.
pub fn recency_label(session: &WorkoutSession, today: NaiveDate) -> String {
    match (today - local_day(session.date)).num_days() {
        // Clock skew can put a session slightly in the future
        n if n <= 0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        n => format!("{n} days ago"),
    }
}

pub fn last_workout_text(
    sessions: &[WorkoutSession],
    workout_type: WorkoutType,
    today: NaiveDate,
) -> String {
    last_session_for(sessions, workout_type)
        .map_or_else(|| "Never".to_string(), |s| recency_label(s, today))
}

/// Consecutive days with a completed session, walking back from today. An
/// empty today does not break the streak; the walk then starts yesterday.
pub fn current_streak(sessions: &[WorkoutSession], today: NaiveDate) -> u32 {
    let days: HashSet<NaiveDate> = completed(sessions).map(|s| local_day(s.date)).collect();

    let start = if days.contains(&today) {
        Some(today)
    } else {
        today.pred_opt()
    };

    let mut streak = 0;
    let mut cursor = start;
    while let Some(day) = cursor.filter(|d| days.contains(d)) {
        streak += 1;
        cursor = day.pred_opt();
    }
    streak
}

/// Completed sessions on one calendar day, in stored order.
pub fn sessions_on(sessions: &[WorkoutSession], day: NaiveDate) -> Vec<&WorkoutSession> {
    completed(sessions)
        .filter(|s| local_day(s.date) == day)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarMonth {
    first: NaiveDate,
}

impl CalendarMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first| Self { first })
    }

    pub fn containing(day: NaiveDate) -> Self {
        Self {
            first: day.with_day(1).unwrap_or(day),
        }
    }

    pub fn year(self) -> i32 {
        self.first.year()
    }

    pub fn month(self) -> u32 {
        self.first.month()
    }

    pub fn first_day(self) -> NaiveDate {
        self.first
    }

    pub fn last_day(self) -> NaiveDate {
        self.next()
            .first
            .pred_opt()
            .filter(|d| *d >= self.first)
            .unwrap_or(self.first)
    }

    pub fn next(self) -> Self {
        self.first
            .checked_add_months(Months::new(1))
            .map_or(self, |first| Self { first })
    }

    pub fn previous(self) -> Self {
        self.first
            .checked_sub_months(Months::new(1))
            .map_or(self, |first| Self { first })
    }

    pub fn contains(self, day: NaiveDate) -> bool {
        day.year() == self.year() && day.month() == self.month()
    }

    /// e.g. "October 2026".
    pub fn label(self) -> String {
        self.first.format("%B %Y").to_string()
    }
}

impl fmt::Display for CalendarMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first.format("%Y-%m"))
    }
}

impl FromStr for CalendarMonth {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
            .map(|first| Self { first })
            .map_err(|_| HistoryError::InvalidMonth(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub in_month: bool,
    pub is_today: bool,
    pub workout_type: Option<WorkoutType>,
}

fn column(day: NaiveDate, week_start: Weekday) -> u32 {
    (day.weekday().num_days_from_sunday() + 7 - week_start.num_days_from_sunday()) % 7
}

/// Every day of the whole weeks overlapping `month`, padded with days from
/// the neighbouring months. A day with several sessions shows the type of
/// the first one stored.
pub fn month_grid(
    sessions: &[WorkoutSession],
    month: CalendarMonth,
    week_start: Weekday,
    today: NaiveDate,
) -> Vec<CalendarDay> {
    let first = month.first_day();
    let last = month.last_day();
    let start = first - Duration::days(i64::from(column(first, week_start)));
    let end = last + Duration::days(i64::from(6 - column(last, week_start)));

    let mut ordered: Vec<&WorkoutSession> = completed(sessions).collect();
    ordered.sort_by_key(|s| s.insertion_order);
    let mut types: HashMap<NaiveDate, WorkoutType> = HashMap::new();
    for session in ordered {
        types
            .entry(local_day(session.date))
            .or_insert(session.workout_type);
    }

    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|date| CalendarDay {
            date,
            in_month: month.contains(date),
            is_today: date == today,
            workout_type: types.get(&date).copied(),
        })
        .collect()
}

/// Short weekday names in grid column order.
pub fn weekday_headers(week_start: Weekday) -> Vec<&'static str> {
    const NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
    let offset = week_start.num_days_from_sunday() as usize;
    (0..7).map(|i| NAMES[(offset + i) % 7]).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub total_workouts: usize,
    pub this_month: usize,
    pub total_duration_seconds: u64,
}

impl Totals {
    /// Total time, formatted like a single session's duration.
    pub fn formatted_duration(&self) -> String {
        format_duration(self.total_duration_seconds)
    }
}

pub fn totals(sessions: &[WorkoutSession], today: NaiveDate) -> Totals {
    let month = CalendarMonth::containing(today);
    completed(sessions).fold(Totals::default(), |mut acc, session| {
        acc.total_workouts += 1;
        acc.total_duration_seconds += session.duration_seconds;
        if month.contains(local_day(session.date)) {
            acc.this_month += 1;
        }
        acc
    })
}

/// "N min" under an hour, otherwise "Hh Mm".
pub fn format_duration(seconds: u64) -> String {
    let minutes = seconds / 60;
    if minutes < 60 {
        format!("{minutes} min")
    } else {
        format!("{}h {}m", minutes / 60, minutes % 60)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseSummary {
    pub name: String,
    pub sets: Vec<WorkoutSet>,
}

/// Groups a session's sets by exercise name (sorted), each group ordered by
/// set number. The group count is the session's exercise count.
pub fn summarize_sets(sets: &[WorkoutSet]) -> Vec<ExerciseSummary> {
    let mut grouped: BTreeMap<&str, Vec<WorkoutSet>> = BTreeMap::new();
    for set in sets {
        grouped
            .entry(set.exercise_name.as_str())
            .or_default()
            .push(set.clone());
    }
    grouped
        .into_iter()
        .map(|(name, mut sets)| {
            sets.sort_by_key(|s| s.set_number);
            ExerciseSummary {
                name: name.to_string(),
                sets,
            }
        })
        .collect()
}
