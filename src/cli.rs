// src/cli.rs
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use fitlift::{CalendarMonth, WorkoutType};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "Log push, pull, shoulder and leg workouts and review your history", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    /// Print tables as CSV instead
    #[arg(long, global = true)]
    pub export_csv: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkoutTypeCli {
    Push,
    Pull,
    Shoulders,
    Legs,
}

impl From<WorkoutTypeCli> for WorkoutType {
    fn from(value: WorkoutTypeCli) -> Self {
        match value {
            WorkoutTypeCli::Push => Self::Push,
            WorkoutTypeCli::Pull => Self::Pull,
            WorkoutTypeCli::Shoulders => Self::Shoulders,
            WorkoutTypeCli::Legs => Self::Legs,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive workout session
    Workout {
        #[arg(value_enum)]
        workout_type: WorkoutTypeCli,
    },
    /// When each workout type was last done
    Last,
    /// List completed sessions, newest first
    History {
        /// Only sessions of this type
        #[arg(short = 't', long = "type", value_enum)]
        workout_type: Option<WorkoutTypeCli>,
        /// Show only the last N sessions
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the sets logged in one session
    Show {
        /// Session ID (from `history`)
        session_id: Uuid,
    },
    /// Sessions completed on a day (YYYY-MM-DD)
    Day { date: NaiveDate },
    /// Month calendar with the workout type done each day
    Calendar {
        /// Month to show (YYYY-MM), defaults to the current month
        #[arg(short, long)]
        month: Option<CalendarMonth>,
    },
    /// Streak and totals
    Stats,
    /// Browse exercises for a workout type
    Exercises {
        #[arg(value_enum)]
        workout_type: WorkoutTypeCli,
        /// Case-insensitive name filter
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Add a custom exercise to a workout type
    AddCustom {
        #[arg(value_enum)]
        workout_type: WorkoutTypeCli,
        name: String,
    },
    /// Remove a custom exercise
    DeleteCustom {
        #[arg(value_enum)]
        workout_type: WorkoutTypeCli,
        name: String,
    },
    /// Delete all logged workouts (custom exercises are kept)
    ClearData {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Show the path to the database file
    DbPath,
    /// Show the path to the config file
    ConfigPath,
    /// Generate shell completion scripts
    GenerateCompletion {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}

/// One line typed during an interactive workout. Indices are zero-based here;
/// users type them from 1.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Start(WorkoutType),
    Add(String),
    AddSet { exercise: usize },
    Set { exercise: usize, set: usize, weight: f64, reps: u32 },
    Show,
    Pause,
    Resume,
    Finish,
    Cancel,
    Quit,
    Help,
}

pub const SESSION_HELP: &str = "\
Commands:
  show                              list exercises and sets
  add <exercise name>               add an exercise (3 empty sets)
  addset <exercise#>                add a set to an exercise
  set <exercise#> <set#> <weight> <reps>
                                    log a set
  pause | resume                    stop or restart the timer
  start <push|pull|shoulders|legs>  switch to another workout
  finish                            save completed sets and exit
  cancel                            discard this workout and exit
  quit                              leave; an unfinished workout is not saved
  help                              this message";

fn parse_index(value: Option<&str>, what: &str) -> Result<usize> {
    let raw = value.with_context(|| format!("Missing {what} number"))?;
    let number: usize = raw
        .parse()
        .with_context(|| format!("Invalid {what} number '{raw}'"))?;
    if number == 0 {
        bail!("{what} numbers start at 1");
    }
    Ok(number - 1)
}

pub fn parse_session_command(line: &str) -> Result<SessionCommand> {
    let line = line.trim();
    let (keyword, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let mut args = rest.split_whitespace();

    let command = match keyword.to_lowercase().as_str() {
        "start" => SessionCommand::Start(
            WorkoutType::try_from(rest).map_err(|_| anyhow::anyhow!("Unknown workout type '{rest}'"))?,
        ),
        "add" => {
            if rest.is_empty() {
                bail!("Usage: add <exercise name>");
            }
            SessionCommand::Add(rest.to_string())
        }
        "addset" => SessionCommand::AddSet {
            exercise: parse_index(args.next(), "exercise")?,
        },
        "set" => {
            let exercise = parse_index(args.next(), "exercise")?;
            let set = parse_index(args.next(), "set")?;
            let weight_raw = args.next().context("Missing weight")?;
            let weight: f64 = weight_raw
                .parse()
                .with_context(|| format!("Invalid weight '{weight_raw}'"))?;
            if !weight.is_finite() || weight < 0.0 {
                bail!("Weight must be zero or more");
            }
            let reps_raw = args.next().context("Missing reps")?;
            let reps: u32 = reps_raw
                .parse()
                .with_context(|| format!("Invalid reps '{reps_raw}'"))?;
            SessionCommand::Set { exercise, set, weight, reps }
        }
        "show" | "ls" => SessionCommand::Show,
        "pause" => SessionCommand::Pause,
        "resume" => SessionCommand::Resume,
        "finish" | "done" => SessionCommand::Finish,
        "cancel" => SessionCommand::Cancel,
        "quit" | "exit" => SessionCommand::Quit,
        "help" | "?" => SessionCommand::Help,
        "" => bail!("Type 'help' for commands"),
        other => bail!("Unknown command '{other}'. Type 'help' for commands"),
    };
    Ok(command)
}
