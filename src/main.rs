use clap::{Parser, Subcommand};
use habitus::application::commands::{
    coerce_minutes, create_habit_impl, delete_habit_impl, focus_day_impl, focus_month_impl,
    habit_metrics_impl, list_habits_impl, login_impl, logout_impl, toggle_habit_impl, whoami_impl,
    AppState,
};
use habitus::application::focus_flow::{FlowEvent, FocusFlow};
use habitus::domain::models::{FocusSession, TimerConfig, TimerState};
use habitus::infrastructure::api_client::FocusTimeGateway;
use habitus::infrastructure::error::InfraError;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Parser)]
#[command(name = "habitus", version, about = "Habit tracking and focus timing from the terminal")]
struct Cli {
    /// Workspace root holding config/, state/ and logs/ (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in through GitHub
    Login {
        /// Authorization code from the GitHub redirect
        #[arg(long)]
        code: Option<String>,
    },
    /// Drop the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Manage habits
    #[command(subcommand)]
    Habit(HabitCommand),
    /// Run and inspect focus sessions
    #[command(subcommand)]
    Focus(FocusCommand),
}

#[derive(Subcommand)]
enum HabitCommand {
    /// List habits with today's completion state
    List,
    /// Create a habit
    Add { name: String },
    /// Toggle today's completion for a habit
    Toggle { habit_id: String },
    /// Delete a habit
    Remove { habit_id: String },
    /// Monthly completion summary for a habit
    Metrics {
        habit_id: String,
        /// Month to summarize as YYYY-MM (defaults to the current month)
        #[arg(long)]
        month: Option<String>,
    },
}

#[derive(Subcommand)]
enum FocusCommand {
    /// Run an interactive focus/rest cycle
    Run {
        /// Focus length in minutes (defaults to config/timers.json)
        #[arg(long)]
        focus: Option<String>,
        /// Rest length in minutes (defaults to config/timers.json)
        #[arg(long)]
        rest: Option<String>,
    },
    /// Focused time recorded on a single day
    Day {
        /// Day as YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Completed cycles and marked days for a month
    Month {
        /// Month as YYYY-MM (defaults to the current month)
        #[arg(long)]
        month: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(message) = run(cli).await {
        eprintln!("error: {message}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };
    let state = AppState::new(root).map_err(|error| error.to_string())?;

    match cli.command {
        Command::Login { code } => {
            let response = login_impl(&state, code)
                .await
                .map_err(|error| state.command_error("login", &error))?;
            match (response.authorization_url, response.user) {
                (Some(url), _) => {
                    println!("open this URL in a browser to authorize:");
                    println!("  {url}");
                    println!("then finish with: habitus login --code <code>");
                }
                (None, Some(user)) => println!("logged in as {}", user.name),
                (None, None) => println!("{}", response.status),
            }
        }
        Command::Logout => {
            let had_session =
                logout_impl(&state).map_err(|error| state.command_error("logout", &error))?;
            if had_session {
                println!("logged out");
            } else {
                println!("no active session");
            }
        }
        Command::Whoami => {
            let user = whoami_impl(&state).map_err(|error| state.command_error("whoami", &error))?;
            println!("{} ({})", user.name, user.id);
        }
        Command::Habit(HabitCommand::List) => {
            let habits = list_habits_impl(&state)
                .await
                .map_err(|error| state.command_error("habit_list", &error))?;
            if habits.is_empty() {
                println!("no habits yet; add one with: habitus habit add <name>");
            }
            for habit in habits {
                let mark = if habit.completed_today { "x" } else { " " };
                println!("[{mark}] {}  ({})", habit.name, habit.id);
            }
        }
        Command::Habit(HabitCommand::Add { name }) => {
            let habit = create_habit_impl(&state, name)
                .await
                .map_err(|error| state.command_error("habit_add", &error))?;
            println!("created {}  ({})", habit.name, habit.id);
        }
        Command::Habit(HabitCommand::Toggle { habit_id }) => {
            let habit = toggle_habit_impl(&state, habit_id)
                .await
                .map_err(|error| state.command_error("habit_toggle", &error))?;
            let status = if habit.completed_today {
                "completed today"
            } else {
                "not completed today"
            };
            println!("{}: {status}", habit.name);
        }
        Command::Habit(HabitCommand::Remove { habit_id }) => {
            let removed = delete_habit_impl(&state, habit_id)
                .await
                .map_err(|error| state.command_error("habit_remove", &error))?;
            if removed {
                println!("habit removed");
            } else {
                println!("habit not found");
            }
        }
        Command::Habit(HabitCommand::Metrics { habit_id, month }) => {
            let metrics = habit_metrics_impl(&state, habit_id, month)
                .await
                .map_err(|error| state.command_error("habit_metrics", &error))?;
            println!("{} in {}", metrics.name, metrics.month);
            println!("completed {} days ({})", metrics.completed, metrics.percent);
            for date in metrics.marked_dates {
                println!("  {date}");
            }
        }
        Command::Focus(FocusCommand::Run { focus, rest }) => {
            run_focus(&state, focus, rest)
                .await
                .map_err(|error| state.command_error("focus_run", &error))?;
        }
        Command::Focus(FocusCommand::Day { date }) => {
            let day = focus_day_impl(&state, date)
                .await
                .map_err(|error| state.command_error("focus_day", &error))?;
            println!(
                "{}: {} session(s), {} focused minute(s)",
                day.date, day.session_count, day.total_minutes
            );
        }
        Command::Focus(FocusCommand::Month { month }) => {
            let summary = focus_month_impl(&state, month)
                .await
                .map_err(|error| state.command_error("focus_month", &error))?;
            println!(
                "{}: {} completed cycle(s)",
                summary.month, summary.cycle_count
            );
            for date in summary.marked_dates {
                println!("  {date}");
            }
        }
    }

    Ok(())
}

async fn run_focus(
    state: &AppState,
    focus: Option<String>,
    rest: Option<String>,
) -> Result<(), InfraError> {
    let user = state.session_manager().require_user()?;
    let defaults = state.default_timers();
    let focus_minutes = focus
        .map(|raw| coerce_minutes(&raw))
        .unwrap_or(defaults.focus_minutes);
    let rest_minutes = rest
        .map(|raw| coerce_minutes(&raw))
        .unwrap_or(defaults.rest_minutes);

    let mut flow = FocusFlow::new(state.api(), user.token, state.session_write_retry());
    flow.set_config(TimerConfig::new(focus_minutes, rest_minutes));
    flow.begin_focus()?;

    println!("focus started: {focus_minutes} min focus / {rest_minutes} min rest");
    println!("commands: rest, resume, cancel, quit");

    let mut ticker = interval(Duration::from_secs(1));
    // Remaining time is recomputed from the stored expiry, so skipped
    // ticks after a stall must not replay.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match flow.tick().await {
                    Ok(FlowEvent::Tick) => render_countdown(&flow),
                    Ok(FlowEvent::FocusEnded { persisted }) => {
                        report_persisted(persisted.as_ref());
                        println!("resting; `resume` starts the next focus period");
                    }
                    Ok(FlowEvent::RestFinished) => {
                        println!();
                        println!("rest is over; `resume` starts the next focus period");
                    }
                    Err(error) => {
                        state.log_error("focus_run", &error.to_string());
                        eprintln!();
                        eprintln!("could not save the focus period: {error}");
                        eprintln!("still in focus; `rest` retries the save");
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.map_err(InfraError::Io)? else {
                    break;
                };
                match line.trim() {
                    "rest" => match flow.start_rest().await {
                        Ok(persisted) => {
                            report_persisted(persisted.as_ref());
                        }
                        Err(error) => {
                            state.log_error("focus_run", &error.to_string());
                            eprintln!("could not start rest: {error}");
                        }
                    },
                    "resume" => match flow.resume_focus() {
                        Ok(()) => println!("back to focus"),
                        Err(error) => eprintln!("{error}"),
                    },
                    "cancel" => {
                        flow.cancel();
                        println!("cancelled; the open interval was discarded");
                    }
                    "quit" | "q" => break,
                    "" => {}
                    other => println!("unknown command: {other}"),
                }
            }
        }
    }

    if flow.state() == TimerState::Focus {
        println!("note: the open focus interval was not saved");
    }
    state.log_info("focus_run", "session ended");
    Ok(())
}

fn render_countdown<G: FocusTimeGateway>(flow: &FocusFlow<G>) {
    let (minutes, seconds) = flow.display();
    print!("\r{:<6} {minutes:02}:{seconds:02} ", flow.state().as_str());
    let _ = std::io::stdout().flush();
}

fn report_persisted(session: Option<&FocusSession>) {
    println!();
    match session {
        Some(session) => {
            let minutes = (session.time_to - session.time_from).num_minutes();
            println!("focus period saved ({minutes} min)");
        }
        None => println!("nothing to save"),
    }
}
