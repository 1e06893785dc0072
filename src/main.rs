//src/main.rs
mod cli; // Keep cli module for parsing args

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::io::{self, stdout, Write};
use strum::IntoEnumIterator;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

use cli::SessionCommand;
use fitlift::history::{self, format_duration, weekday_headers};
use fitlift::session::format_weight;
use fitlift::{
    AppService, CalendarDay, CalendarMonth, ConflictResolution, ExerciseGroup, OpenOutcome,
    SessionDetail, SessionError, SessionFilters, SessionScratch, Totals, WorkoutSession,
    WorkoutType,
};

const LOG_ENV_VAR: &str = "FITLIFT_LOG";

type InputLines = Lines<BufReader<Stdin>>;

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // --- Check for completion generation request FIRST ---
    let cli_args = cli::parse_args();
    let export_csv = cli_args.export_csv;

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();
        eprintln!("Generating completion script for {shell}...");
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    let mut service = AppService::initialize().context("Failed to initialize application service")?;
    service
        .sessions
        .set_commit_failure_hook(|snapshot, err| {
            eprintln!(
                "Your {} workout ({} completed sets) could not be saved: {err}",
                snapshot.workout_type.display_name(),
                snapshot.set_count()
            );
        });
    let header_color = service.config.theme.header_color();
    let unit = service.weight_unit();

    match cli_args.command {
        cli::Commands::GenerateCompletion { .. } => {
            unreachable!("Completion generation should have exited already");
        }
        cli::Commands::Workout { workout_type } => {
            run_workout(&service, workout_type.into(), header_color).await?;
        }
        cli::Commands::Last => {
            let sessions = service.completed_sessions()?;
            let today = history::today();
            let rows: Vec<(WorkoutType, String)> = WorkoutType::iter()
                .map(|t| (t, history::last_workout_text(&sessions, t, today)))
                .collect();
            if export_csv {
                print_last_csv(&rows)?;
            } else {
                print_last_table(&rows, header_color);
            }
        }
        cli::Commands::History { workout_type, limit } => {
            let filters = SessionFilters {
                workout_type: workout_type.map(Into::into),
                completed_only: true,
                limit: None,
            };
            let mut sessions = service.list_sessions(&filters)?;
            sessions.reverse();
            sessions.truncate(limit);
            if sessions.is_empty() {
                println!("No workouts logged yet.");
            } else if export_csv {
                print_sessions_csv(&sessions)?;
            } else {
                print_sessions_table(&sessions, header_color);
            }
        }
        cli::Commands::Show { session_id } => {
            let detail = service.session_detail(session_id)?;
            if export_csv {
                print_detail_csv(&detail, unit)?;
            } else {
                print_detail(&detail, unit, header_color);
            }
        }
        cli::Commands::Day { date } => {
            let sessions = service.sessions_on(date)?;
            if sessions.is_empty() {
                println!("No workouts on {}.", date.format("%A, %B %-d, %Y"));
            } else if export_csv {
                print_sessions_csv(&sessions)?;
            } else {
                println!("{}", date.format("%A, %B %-d, %Y"));
                print_sessions_table(&sessions, header_color);
            }
        }
        cli::Commands::Calendar { month } => {
            let month = month.unwrap_or_else(|| CalendarMonth::containing(history::today()));
            let grid = service.month_grid(month)?;
            if export_csv {
                print_calendar_csv(&grid)?;
            } else {
                print_calendar(&service, month, &grid, header_color);
            }
        }
        cli::Commands::Stats => {
            let streak = service.current_streak()?;
            let totals = service.totals()?;
            if export_csv {
                print_stats_csv(streak, &totals)?;
            } else {
                print_stats_table(streak, &totals, header_color);
            }
        }
        cli::Commands::Exercises { workout_type, search } => {
            let workout_type: WorkoutType = workout_type.into();
            let groups = service.browse_exercises(workout_type, search.as_deref())?;
            if groups.is_empty() {
                println!("No exercises match.");
            } else if export_csv {
                print_exercises_csv(&groups)?;
            } else {
                println!("{} ({})", workout_type.display_name(), workout_type.muscles());
                print_exercises_table(&groups, header_color);
            }
        }
        cli::Commands::AddCustom { workout_type, name } => {
            let workout_type: WorkoutType = workout_type.into();
            match service.add_custom_exercise(workout_type, &name) {
                Ok(_) => println!(
                    "Added custom exercise '{}' to {}.",
                    name.trim(),
                    workout_type.display_name()
                ),
                Err(e) => bail!("Error adding custom exercise: {e}"),
            }
        }
        cli::Commands::DeleteCustom { workout_type, name } => {
            let workout_type: WorkoutType = workout_type.into();
            match service.delete_custom_exercise(workout_type, &name) {
                Ok(_) => println!("Removed custom exercise '{}'.", name.trim()),
                Err(e) => bail!("Error removing custom exercise: {e}"),
            }
        }
        cli::Commands::ClearData { yes } => {
            if !yes {
                bail!("This deletes every logged workout. Re-run with --yes to confirm.");
            }
            let removed = service.clear_all_data()?;
            println!("Deleted {removed} workout session(s). Custom exercises were kept.");
        }
        cli::Commands::DbPath => {
            println!("Database file is located at: {:?}", service.get_db_path());
        }
        cli::Commands::ConfigPath => {
            println!("Config file is located at: {:?}", service.get_config_path());
        }
    }

    service.shutdown();
    Ok(())
}

// --- Interactive workout ---

async fn run_workout(service: &AppService, workout_type: WorkoutType, header_color: Color) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    open_workout(service, workout_type, &mut lines).await?;
    println!("{}", cli::SESSION_HELP);
    print_scratch_from(service, header_color);

    loop {
        print!("[{}] > ", service.sessions.formatted_time());
        stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = match cli::parse_session_command(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match command {
            SessionCommand::Start(next_type) => {
                open_workout(service, next_type, &mut lines).await?;
                print_scratch_from(service, header_color);
            }
            SessionCommand::Add(name) => {
                service.sessions.add_exercise(&name);
                print_scratch_from(service, header_color);
            }
            SessionCommand::AddSet { exercise } => {
                if !has_exercise(service, exercise) {
                    eprintln!("No exercise #{}", exercise + 1);
                    continue;
                }
                service.sessions.add_set(exercise);
                print_scratch_from(service, header_color);
            }
            SessionCommand::Set { exercise, set, weight, reps } => {
                if !has_set(service, exercise, set) {
                    eprintln!("No set #{} on exercise #{}", set + 1, exercise + 1);
                    continue;
                }
                service.sessions.update_set(exercise, set, weight, reps);
                print_scratch_from(service, header_color);
            }
            SessionCommand::Show => print_scratch_from(service, header_color),
            SessionCommand::Pause => {
                service.sessions.pause_timer();
                println!("Timer paused at {}.", service.sessions.formatted_time());
            }
            SessionCommand::Resume => {
                service.sessions.resume();
                println!("Timer running.");
            }
            SessionCommand::Finish => {
                match service.sessions.finish() {
                    Some(pending) => {
                        println!(
                            "Workout finished in {}. Saving {} completed set(s)...",
                            format_duration(pending.snapshot().elapsed_seconds),
                            pending.snapshot().set_count()
                        );
                        // The failure hook has already reported errors
                        if let Ok(committed) = pending.wait().await {
                            println!("Saved session {}.", committed.session_id);
                        }
                    }
                    None => println!("No active workout."),
                }
                break;
            }
            SessionCommand::Cancel => {
                service.sessions.cancel();
                println!("Workout discarded.");
                break;
            }
            SessionCommand::Quit => {
                if service.sessions.is_active() {
                    service.sessions.cancel();
                    println!("Unfinished workout discarded.");
                }
                break;
            }
            SessionCommand::Help => println!("{}", cli::SESSION_HELP),
        }
    }

    if service.sessions.is_active() {
        service.sessions.cancel();
        println!("Unfinished workout discarded.");
    }
    Ok(())
}

async fn open_workout(service: &AppService, workout_type: WorkoutType, lines: &mut InputLines) -> Result<()> {
    match service.sessions.open(workout_type) {
        Ok(OpenOutcome::Started) => {
            println!("Started {} ({}).", workout_type.display_name(), workout_type.muscles());
        }
        Ok(OpenOutcome::Resumed) => {
            println!("Resumed {} at {}.", workout_type.display_name(), service.sessions.formatted_time());
        }
        Err(SessionError::Conflict { active, requested }) => {
            let resolution = prompt_conflict(lines, active, requested).await?;
            if let Some(now_active) = service.sessions.resolve(resolution) {
                println!("Now doing {}.", now_active.display_name());
            }
        }
    }
    Ok(())
}

async fn prompt_conflict(
    lines: &mut InputLines,
    active: WorkoutType,
    requested: WorkoutType,
) -> Result<ConflictResolution> {
    println!(
        "A {} workout is in progress. Resume it (r) or discard it and start {} (d)?",
        active.display_name(),
        requested.display_name()
    );
    loop {
        print!("[r/d] > ");
        stdout().flush()?;
        let line = lines
            .next_line()
            .await?
            .context("Input closed before choosing")?;
        match line.trim().to_lowercase().as_str() {
            "r" | "resume" => return Ok(ConflictResolution::ResumeExisting),
            "d" | "discard" => return Ok(ConflictResolution::DiscardAndStart(requested)),
            _ => println!("Type 'r' to resume or 'd' to discard."),
        }
    }
}

fn has_exercise(service: &AppService, exercise: usize) -> bool {
    service
        .sessions
        .scratch()
        .is_some_and(|s| exercise < s.exercises.len())
}

fn has_set(service: &AppService, exercise: usize, set: usize) -> bool {
    service
        .sessions
        .scratch()
        .and_then(|s| s.exercises.get(exercise).map(|e| set < e.sets.len()))
        .unwrap_or(false)
}

fn print_scratch_from(service: &AppService, header_color: Color) {
    match service.sessions.scratch() {
        Some(scratch) => print_scratch(&scratch, service.weight_unit(), header_color),
        None => println!("No active workout."),
    }
}

fn print_scratch(scratch: &SessionScratch, unit: &str, header_color: Color) {
    println!(
        "{} · {} · {} of {} sets done",
        scratch.workout_type.display_name(),
        scratch.formatted_time(),
        scratch.completed_set_count(),
        scratch.exercises.iter().map(|e| e.sets.len()).sum::<usize>()
    );
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(header_color),
            Cell::new("Exercise").fg(header_color),
            Cell::new("Set").fg(header_color),
            Cell::new("Weight").fg(header_color),
            Cell::new("Reps").fg(header_color),
            Cell::new("Previous").fg(header_color),
        ]);

    for (exercise_index, exercise) in scratch.exercises.iter().enumerate() {
        for (set_index, set) in exercise.sets.iter().enumerate() {
            let name = if set_index == 0 { exercise.name.as_str() } else { "" };
            let reps = if set.is_completed { set.reps.to_string() } else { "-".to_string() };
            let previous = scratch
                .previous_set(exercise_index, set_index)
                .filter(|(weight, reps)| *weight > 0.0 || *reps > 0)
                .map_or("-".to_string(), |(weight, reps)| format!("{} × {reps}", format_weight(weight, unit)));
            let mut set_cell = Cell::new(set.set_number);
            if set.is_completed {
                set_cell = set_cell.add_attribute(Attribute::Bold);
            }
            table.add_row(vec![
                Cell::new(if set_index == 0 { (exercise_index + 1).to_string() } else { String::new() }),
                Cell::new(name),
                set_cell,
                Cell::new(set.formatted_weight(unit)),
                Cell::new(reps),
                Cell::new(previous),
            ]);
        }
    }
    println!("{table}");
}

// --- Tables ---

fn local_timestamp(date: DateTime<Utc>) -> String {
    date.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn print_last_table(rows: &[(WorkoutType, String)], header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Workout").fg(header_color),
            Cell::new("Muscles").fg(header_color),
            Cell::new("Last done").fg(header_color),
        ]);
    for (workout_type, text) in rows {
        table.add_row(vec![
            Cell::new(workout_type.display_name()),
            Cell::new(workout_type.muscles()),
            Cell::new(text),
        ]);
    }
    println!("{table}");
}

fn print_sessions_table(sessions: &[WorkoutSession], header_color: Color) {
    let today = history::today();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(header_color),
            Cell::new("Date").fg(header_color),
            Cell::new("Workout").fg(header_color),
            Cell::new("Duration").fg(header_color),
            Cell::new("When").fg(header_color),
        ]);
    for session in sessions {
        table.add_row(vec![
            Cell::new(session.id),
            Cell::new(local_timestamp(session.date)),
            Cell::new(session.workout_type.display_name()),
            Cell::new(format_duration(session.duration_seconds)),
            Cell::new(history::recency_label(session, today)),
        ]);
    }
    println!("{table}");
}

fn print_detail(detail: &SessionDetail, unit: &str, header_color: Color) {
    let session = &detail.session;
    println!(
        "{} · {} · {} · {} exercise(s), {} set(s)",
        session.workout_type.display_name(),
        local_timestamp(session.date),
        format_duration(session.duration_seconds),
        detail.exercise_count(),
        detail.set_count()
    );
    if let Some(notes) = session.notes.as_deref() {
        println!("Notes: {notes}");
    }
    if detail.exercises.is_empty() {
        println!("No completed sets were logged.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Exercise").fg(header_color),
            Cell::new("Set").fg(header_color),
            Cell::new("Weight").fg(header_color),
            Cell::new("Reps").fg(header_color),
        ]);
    for exercise in &detail.exercises {
        for (index, set) in exercise.sets.iter().enumerate() {
            table.add_row(vec![
                Cell::new(if index == 0 { exercise.name.as_str() } else { "" }),
                Cell::new(set.set_number),
                Cell::new(format_weight(set.weight, unit)),
                Cell::new(set.reps),
            ]);
        }
    }
    println!("{table}");
}

const fn type_code(workout_type: WorkoutType) -> &'static str {
    match workout_type {
        WorkoutType::Push => "PSH",
        WorkoutType::Pull => "PUL",
        WorkoutType::Shoulders => "SHD",
        WorkoutType::Legs => "LEG",
    }
}

fn print_calendar(service: &AppService, month: CalendarMonth, grid: &[CalendarDay], header_color: Color) {
    println!("{}", month.label());
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            weekday_headers(service.config.week_start.into())
                .into_iter()
                .map(|name| Cell::new(name).fg(header_color)),
        );

    for week in grid.chunks(7) {
        table.add_row(week.iter().map(|day| {
            if !day.in_month {
                return Cell::new("");
            }
            let number = day.date.format("%-d").to_string();
            let label = match day.workout_type {
                Some(t) => format!("{number}\n{}", type_code(t)),
                None => number,
            };
            let mut cell = Cell::new(label);
            if day.is_today {
                cell = cell.add_attribute(Attribute::Bold).add_attribute(Attribute::Underlined);
            }
            if day.workout_type.is_some() {
                cell = cell.fg(header_color);
            }
            cell
        }));
    }
    println!("{table}");
    println!(
        "{}",
        WorkoutType::iter()
            .map(|t| format!("{} = {}", type_code(t), t.display_name()))
            .collect::<Vec<_>>()
            .join(", ")
    );
}

fn print_stats_table(streak: u32, totals: &Totals, header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Stat").fg(header_color),
            Cell::new("Value").fg(header_color),
        ]);
    table.add_row(vec![Cell::new("Current streak"), Cell::new(format!("{streak} day(s)"))]);
    table.add_row(vec![Cell::new("Total workouts"), Cell::new(totals.total_workouts)]);
    table.add_row(vec![Cell::new("This month"), Cell::new(totals.this_month)]);
    table.add_row(vec![Cell::new("Total time"), Cell::new(totals.formatted_duration())]);
    println!("{table}");
}

fn print_exercises_table(groups: &[ExerciseGroup], header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Group").fg(header_color),
            Cell::new("Exercise").fg(header_color),
        ]);
    for group in groups {
        for (index, name) in group.exercises.iter().enumerate() {
            table.add_row(vec![
                Cell::new(if index == 0 { group.name.as_str() } else { "" }),
                Cell::new(name),
            ]);
        }
    }
    println!("{table}");
}

// --- CSV ---

fn print_last_csv(rows: &[(WorkoutType, String)]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Workout", "Muscles", "Last_Done"])?;
    for (workout_type, text) in rows {
        writer.write_record([workout_type.display_name(), workout_type.muscles(), text.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_sessions_csv(sessions: &[WorkoutSession]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["ID", "Date_UTC", "Workout_Type", "Duration_Seconds", "Notes"])?;
    for session in sessions {
        writer.write_record([
            session.id.to_string(),
            session.date.to_rfc3339(),
            session.workout_type.to_string(),
            session.duration_seconds.to_string(),
            session.notes.clone().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_detail_csv(detail: &SessionDetail, unit: &str) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    let weight_header = format!("Weight_{unit}");
    writer.write_record([
        "Session_ID",
        "Exercise",
        "Set",
        weight_header.as_str(),
        "Reps",
        "Completed_At_UTC",
    ])?;
    for exercise in &detail.exercises {
        for set in &exercise.sets {
            writer.write_record([
                detail.session.id.to_string(),
                exercise.name.clone(),
                set.set_number.to_string(),
                set.weight.to_string(),
                set.reps.to_string(),
                set.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn print_calendar_csv(grid: &[CalendarDay]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Date", "In_Month", "Is_Today", "Workout_Type"])?;
    for day in grid {
        writer.write_record([
            day.date.format("%Y-%m-%d").to_string(),
            day.in_month.to_string(),
            day.is_today.to_string(),
            day.workout_type.map(|t| t.to_string()).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_stats_csv(streak: u32, totals: &Totals) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Current_Streak_Days", "Total_Workouts", "This_Month", "Total_Duration_Seconds"])?;
    writer.write_record([
        streak.to_string(),
        totals.total_workouts.to_string(),
        totals.this_month.to_string(),
        totals.total_duration_seconds.to_string(),
    ])?;
    writer.flush()?;
    Ok(())
}

fn print_exercises_csv(groups: &[ExerciseGroup]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Group", "Exercise"])?;
    for group in groups {
        for name in &group.exercises {
            writer.write_record([group.name.as_str(), name.as_str()])?;
        }
    }
    writer.flush()?;
    Ok(())
}
