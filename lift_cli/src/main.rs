use chrono::{DateTime, Local, TimeZone, Utc};
use clap::{Parser, Subcommand};
use lift_core::analytics::{self, ProgressSummary};
use lift_core::config::DataConfig;
use lift_core::export;
use lift_core::*;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lift")]
#[command(about = "Guided workout sessions with streak tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available workout plans (default)
    Plans,

    /// Preview a plan and run a live session
    Start {
        /// Plan id, as shown by `lift plans`
        plan: String,

        /// Auto-complete (for testing) - complete every set without resting
        #[arg(long)]
        auto_complete: bool,

        /// Attach a note to the session
        #[arg(long)]
        note: Option<String>,
    },

    /// Show recent sessions
    History {
        /// Number of sessions to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show streaks, weekly progress and achievements
    Stats,

    /// Export the workout log
    Export {
        /// Write one row per logged session to a CSV file, replacing it
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Write a JSON bundle
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Import sessions from a JSON bundle
    Import {
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    lift_core::logging::init();

    let cli = Cli::parse();

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    tracing::debug!("Using data directory {:?}", data_dir);

    match cli.command {
        Some(Commands::Start {
            plan,
            auto_complete,
            note,
        }) => cmd_start(&data_dir, &plan, auto_complete, note, &config),
        Some(Commands::History { limit }) => cmd_history(&data_dir, limit),
        Some(Commands::Stats) => cmd_stats(&data_dir, &config),
        Some(Commands::Export { csv, json }) => cmd_export(&data_dir, csv, json),
        Some(Commands::Import { path }) => cmd_import(&data_dir, &path),
        Some(Commands::Plans) | None => cmd_plans(&data_dir, &config),
    }
}

/// Built-in plans plus any plan files from the data dir and configured dirs
fn load_catalog(data_dir: &Path, config: &Config) -> Result<PlanCatalog> {
    let mut catalog = get_default_catalog().clone();
    catalog.load_dir(&data_dir.join("plans"))?;
    for dir in &config.plans.extra_dirs {
        catalog.load_dir(dir)?;
    }

    let errors = catalog.validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in &errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::InvalidTemplate("Invalid catalog".into()));
    }
    Ok(catalog)
}

fn open_log(data_dir: &Path) -> Result<JsonlLog> {
    let log = JsonlLog::open(DataConfig::log_path(data_dir))?;
    let report = log.load_report();
    if !report.is_clean() {
        eprintln!(
            "Warning: skipped {} unreadable line(s) in {}",
            report.corrupt_lines.len(),
            log.path().display()
        );
    }
    Ok(log)
}

fn cmd_plans(data_dir: &Path, config: &Config) -> Result<()> {
    let catalog = load_catalog(data_dir, config)?;

    println!("Available plans:");
    println!();
    for plan in catalog.list() {
        println!(
            "  {:<22} {:<24} {:>2} exercises  {:>3} sets  ~{} min  ({:?})",
            plan.id,
            plan.name,
            plan.exercises.len(),
            plan.total_sets(),
            plan.estimated_duration_minutes(),
            plan.difficulty
        );
    }
    println!();
    println!("Run `lift start <plan>` to begin.");
    Ok(())
}

fn cmd_start(
    data_dir: &Path,
    plan_id: &str,
    auto_complete: bool,
    note: Option<String>,
    config: &Config,
) -> Result<()> {
    let catalog = load_catalog(data_dir, config)?;
    let plan = catalog
        .get(plan_id)
        .cloned()
        .ok_or_else(|| Error::Other(format!("Unknown plan: {}", plan_id)))?;

    let log = open_log(data_dir)?;
    let mut engine = SessionEngine::new(log, SystemClock);
    engine.load_template(plan.clone())?;
    display_preview(&plan);

    if let Some(note) = note {
        engine.add_note(note)?;
    }

    if auto_complete {
        engine.start()?;
        while !engine.state().is_terminal() {
            match engine.state() {
                SessionState::Resting => engine.skip_rest()?,
                _ => engine.complete_set(None, None)?,
            };
        }
    } else {
        engine = run_interactive(engine, config)?;
    }

    match engine.state() {
        SessionState::Completed => {
            if let Some(record) = engine.last_record() {
                display_record_summary(record);
            }
            println!("\n✓ Session logged!");
        }
        _ => println!("\nSession cancelled - nothing logged."),
    }
    Ok(())
}

fn run_interactive(
    mut engine: SessionEngine<JsonlLog, SystemClock>,
    config: &Config,
) -> Result<SessionEngine<JsonlLog, SystemClock>> {
    let mut last_state = engine.state();
    engine.subscribe(move |snapshot| {
        // Rest countdown is printed every ten seconds and for the last three
        let quiet_tick = snapshot.state == SessionState::Resting
            && last_state == SessionState::Resting
            && snapshot.rest_remaining > 3
            && snapshot.rest_remaining % 10 != 0;
        last_state = snapshot.state;
        if !quiet_tick {
            println!("{}", render(snapshot));
        }
    });

    let runner = RunnerHandle::spawn(engine, IntervalTicker, config.tick_interval());

    println!("Press Enter to start, or type 'cancel'.");
    print_help();

    let stdin = io::stdin();
    let mut started = false;
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => {
                // EOF abandons whatever is in progress
                let state = runner.snapshot()?.state;
                if !state.is_terminal() {
                    runner.send(Command::Cancel)?;
                }
                break;
            }
        };

        let command = if started {
            match parse_command(line.trim(), config) {
                Some(command) => command,
                None => {
                    print_help();
                    continue;
                }
            }
        } else {
            match line.trim() {
                "cancel" | "c" => Command::Cancel,
                _ => Command::Start,
            }
        };
        started = true;

        match runner.send(command) {
            Ok(snapshot) if snapshot.state.is_terminal() => break,
            Ok(_) => {}
            Err(e) if e.is_recoverable() => println!("  ! {}", e),
            Err(Error::Persistence(msg)) => {
                println!("  ! Could not save session: {}", msg);
                println!("  Type 'retry' to try again or 'cancel' to discard it.");
            }
            Err(e) => return Err(e),
        }
    }

    runner.shutdown()
}

fn parse_command(input: &str, config: &Config) -> Option<Command> {
    let mut parts = input.split_whitespace();
    let word = parts.next().unwrap_or("done");

    let command = match word {
        "done" | "d" => {
            let reps = match parts.next() {
                Some(value) => Some(value.parse().ok()?),
                None => None,
            };
            let weight = match parts.next() {
                Some(value) => Some(value.parse().ok()?),
                None => None,
            };
            Command::CompleteSet { reps, weight }
        }
        "skip" | "s" => Command::SkipSet,
        "skip-exercise" | "sx" => Command::SkipExercise,
        "skip-rest" | "sr" => Command::SkipRest,
        "pause" | "p" => Command::Pause,
        "resume" | "r" => Command::Resume,
        "+" => {
            let seconds = match parts.next() {
                Some(value) => value.parse().ok()?,
                None => config.session.rest_extension_seconds,
            };
            Command::ExtendRest(seconds)
        }
        "note" | "n" => {
            let text = input[word.len()..].trim();
            Command::AddNote(text.to_string())
        }
        "end" => Command::EndEarly,
        "cancel" | "c" => Command::Cancel,
        "retry" => Command::RetryPersist,
        _ => return None,
    };
    Some(command)
}

fn print_help() {
    println!("─────────────────────────────────────────");
    println!("  Enter / done [reps] [weight]   complete the set");
    println!("  skip | skip-exercise | skip-rest");
    println!("  pause | resume | + [secs]      extend rest");
    println!("  note TEXT | end | cancel | retry");
}

fn display_preview(plan: &WorkoutPlan) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}", plan.name.to_uppercase());
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!(
        "  {} exercises · {} sets · ~{} min · {:?}",
        plan.exercises.len(),
        plan.total_sets(),
        plan.estimated_duration_minutes(),
        plan.difficulty
    );
    println!();

    for exercise in &plan.exercises {
        let weight = exercise
            .weight_suggestion
            .map(|w| format!(" @ {} kg", w))
            .unwrap_or_default();
        println!(
            "  → {}: {} × {}{} (rest {}s)",
            exercise.name, exercise.sets, exercise.target, weight, exercise.rest_seconds
        );
    }
    println!();
}

fn render(snapshot: &SessionSnapshot) -> String {
    let name = snapshot.exercise_name.as_deref().unwrap_or("-");
    match snapshot.state {
        SessionState::Previewing => format!("[preview] {}", snapshot.plan_name.as_deref().unwrap_or("-")),
        SessionState::Active => format!(
            "[active] {} ({}/{}) · set {}/{} · {} · {} · {}%",
            name,
            snapshot.exercise_index + 1,
            snapshot.exercise_count,
            snapshot.set_index + 1,
            snapshot.set_count,
            snapshot
                .target
                .map(|t| t.to_string())
                .unwrap_or_default(),
            format_duration(snapshot.elapsed_seconds),
            snapshot.progress_percent()
        ),
        SessionState::Resting => format!(
            "[rest] {}s before set {}/{} of {}",
            snapshot.rest_remaining,
            snapshot.set_index + 1,
            snapshot.set_count,
            name
        ),
        SessionState::Paused => format!(
            "[paused] {} · {} elapsed",
            name,
            format_duration(snapshot.elapsed_seconds)
        ),
        SessionState::Completed => format!(
            "[done] {}/{} sets · {}",
            snapshot.sets_done,
            snapshot.sets_total,
            format_duration(snapshot.elapsed_seconds)
        ),
        SessionState::Cancelled => "[cancelled]".to_string(),
        SessionState::Idle => "[idle]".to_string(),
    }
}

fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn display_record_summary(record: &SessionRecord) {
    println!();
    println!("  Plan:      {}", record.plan_id);
    println!("  Active:    {}", format_duration(record.active_duration_seconds));
    println!(
        "  Sets:      {} done, {} skipped, {} total",
        record.count_sets(SetStatus::Completed),
        record.count_sets(SetStatus::Skipped),
        record.total_sets()
    );
    if !record.note.is_empty() {
        println!("  Note:      {}", record.note);
    }
}

fn cmd_history(data_dir: &Path, limit: usize) -> Result<()> {
    let log = open_log(data_dir)?;
    let recent = log.recent(limit);

    if recent.is_empty() {
        println!("No sessions logged yet.");
        return Ok(());
    }

    println!("Recent sessions ({} of {}):", recent.len(), log.total_sessions());
    for record in recent {
        let started: DateTime<Local> = record.started_at.with_timezone(&Local);
        println!(
            "  {}  {:<22} {}  {:>2}/{:<2} sets  {}",
            started.format("%Y-%m-%d %H:%M"),
            record.plan_id,
            format_duration(record.active_duration_seconds),
            record.count_sets(SetStatus::Completed),
            record.total_sets(),
            record.note
        );
    }
    Ok(())
}

fn cmd_stats(data_dir: &Path, config: &Config) -> Result<()> {
    let log = open_log(data_dir)?;
    let now = Utc::now();
    if config.analytics.use_local_time {
        print_stats(log.all(), now, &Local);
    } else {
        print_stats(log.all(), now, &Utc);
    }
    Ok(())
}

fn print_stats<Tz: TimeZone>(records: &[SessionRecord], now: DateTime<Utc>, tz: &Tz) {
    let today = now.with_timezone(tz).date_naive();
    let ProgressSummary {
        total_sessions,
        total_active_hours,
        current_streak,
        longest_streak,
        weekly_progress,
        week_days,
    } = analytics::summary(records, today, tz);

    println!("Sessions:        {}", total_sessions);
    println!("Active time:     {:.1} h", total_active_hours);
    println!("Current streak:  {} day(s)", current_streak);
    println!("Longest streak:  {} day(s)", longest_streak);
    println!("This week:       {}/7 days", weekly_progress);

    let strip: Vec<String> = ["S", "M", "T", "W", "T", "F", "S"]
        .iter()
        .zip(week_days.iter())
        .map(|(label, done)| format!("{}{}", label, if *done { "●" } else { "·" }))
        .collect();
    println!("                 {}", strip.join(" "));

    println!();
    println!("Achievements:");
    for status in analytics::achievement_status(records, tz) {
        let mark = if status.unlocked { "✓" } else { " " };
        let when = status
            .unlocked_at
            .map(|at| format!(" (unlocked {})", at.with_timezone(tz).date_naive()))
            .unwrap_or_default();
        println!(
            "  [{}] {:<17} {}/{}  {}{}",
            mark, status.name, status.progress, status.target, status.description, when
        );
    }
}

fn cmd_export(data_dir: &Path, csv: Option<PathBuf>, json: Option<PathBuf>) -> Result<()> {
    let log = open_log(data_dir)?;

    let csv = match (&csv, &json) {
        (None, None) => Some(DataConfig::csv_path(data_dir)),
        _ => csv,
    };

    if let Some(path) = csv {
        let count = export::export_csv(log.all(), &path)?;
        println!("✓ Exported {} sessions to CSV", count);
        println!("  CSV: {}", path.display());
    }
    if let Some(path) = json {
        export::export_json_file(log.all(), Utc::now(), &path)?;
        println!("✓ Exported {} sessions to JSON", log.total_sessions());
        println!("  JSON: {}", path.display());
    }
    Ok(())
}

fn cmd_import(data_dir: &Path, path: &Path) -> Result<()> {
    let mut log = open_log(data_dir)?;
    let summary = export::import_json_file(path, &mut log)?;
    println!(
        "✓ Imported {} sessions ({} already present)",
        summary.imported, summary.duplicates
    );
    Ok(())
}
