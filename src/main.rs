use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use serde::Serialize;

use meetdesk_lib::commands;
use meetdesk_lib::error::ActionError;
use meetdesk_lib::filter::{FilterSpec, Period, ReportFilters, StatusFilter};
use meetdesk_lib::session::Role;
use meetdesk_lib::state::AppState;
use meetdesk_lib::types::{Meeting, MeetingDraft, MeetingPatch, MeetingStatus};

#[derive(Parser)]
#[command(name = "meetdesk")]
#[command(about = "Meeting scheduling and approval client", long_about = None)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and keep the session for later commands
    Login {
        #[arg(long, value_enum, default_value = "user")]
        role: RoleArg,
        #[arg(long)]
        username: String,
        /// Read from stdin when omitted
        #[arg(long, env = "MEETDESK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Logout,
    /// Show the current session
    Whoami,
    /// Show the effective configuration
    Config,
    /// List one status collection, or all of them
    List {
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
    /// Counters, pending requests and upcoming confirmed meetings
    Dashboard,
    /// Query the aggregate view
    Filter(FilterArgs),
    /// Submit a meeting for approval
    Create(CreateArgs),
    /// Pending -> confirmed
    Approve { id: i64 },
    /// Pending -> denied
    Deny { id: i64 },
    /// Denied -> pending
    Restore { id: i64 },
    /// Permanently delete a denied (or confirmed) meeting
    Delete {
        id: i64,
        #[arg(long, value_enum, default_value = "denied")]
        status: StatusArg,
        /// Skip the interactive confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Edit a confirmed meeting
    Edit(EditArgs),
    /// Participant and department report over all meetings
    Report(ReportArgs),
    /// Finish interrupted moves and report duplicated meetings
    Reconcile,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Admin,
    User,
}

impl From<RoleArg> for Role {
    fn from(r: RoleArg) -> Self {
        match r {
            RoleArg::Admin => Role::Admin,
            RoleArg::User => Role::User,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    Confirmed,
    Denied,
}

impl From<StatusArg> for MeetingStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Pending => MeetingStatus::Pending,
            StatusArg::Confirmed => MeetingStatus::Confirmed,
            StatusArg::Denied => MeetingStatus::Denied,
        }
    }
}

#[derive(Args)]
struct FilterArgs {
    /// all, last-10-days, last-20-days, last-month, last-year, upcoming, past, custom, month
    #[arg(long, default_value = "all")]
    period: String,
    /// all, pending, confirmed, denied
    #[arg(long, default_value = "all")]
    status: String,
    #[arg(long)]
    start: Option<String>,
    #[arg(long)]
    end: Option<String>,
    /// YYYY-MM
    #[arg(long)]
    month: Option<String>,
}

impl FilterArgs {
    fn to_spec(&self) -> Result<FilterSpec, String> {
        Ok(FilterSpec {
            period: Period::parse(&self.period)
                .ok_or_else(|| format!("Unknown period: {}", self.period))?,
            status: StatusFilter::parse(&self.status)
                .ok_or_else(|| format!("Unknown status: {}", self.status))?,
            custom_start: self.start.clone(),
            custom_end: self.end.clone(),
            month: self.month.clone(),
        })
    }
}

#[derive(Args)]
struct CreateArgs {
    #[arg(long)]
    title: String,
    /// YYYY-MM-DD
    #[arg(long)]
    date: NaiveDate,
    /// HH:MM
    #[arg(long)]
    start: String,
    #[arg(long)]
    end: Option<String>,
    #[arg(long)]
    location: String,
    #[arg(long)]
    participants: u32,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    responsible: String,
    #[arg(long)]
    department: String,
}

impl From<CreateArgs> for MeetingDraft {
    fn from(a: CreateArgs) -> Self {
        MeetingDraft {
            title: a.title,
            meeting_date: a.date,
            start_time: a.start,
            end_time: a.end,
            location: a.location,
            participants_count: a.participants,
            description: a.description,
            responsible: a.responsible,
            responsible_department: a.department,
        }
    }
}

#[derive(Args)]
struct EditArgs {
    id: i64,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long)]
    start: Option<String>,
    #[arg(long)]
    end: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    participants: Option<u32>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    responsible: Option<String>,
    #[arg(long)]
    department: Option<String>,
}

impl EditArgs {
    fn patch(&self) -> MeetingPatch {
        MeetingPatch {
            title: self.title.clone(),
            meeting_date: self.date,
            start_time: self.start.clone(),
            end_time: self.end.clone(),
            location: self.location.clone(),
            participants_count: self.participants,
            description: self.description.clone(),
            responsible: self.responsible.clone(),
            responsible_department: self.department.clone(),
        }
    }
}

#[derive(Args)]
struct ReportArgs {
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long, default_value = "all")]
    status: String,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    department: Option<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn print_meetings(meetings: &[Meeting]) {
    if meetings.is_empty() {
        println!("(no meetings)");
        return;
    }
    for m in meetings {
        let status = m.status.map(|s| s.to_string()).unwrap_or_default();
        println!(
            "{:>5}  {}  {}-{}  {:<10} {:<24} {} ({}, {} people)",
            m.id,
            m.meeting_date,
            m.start_time,
            m.end_time.as_deref().unwrap_or("?"),
            status,
            m.title,
            m.location,
            m.responsible_department,
            m.participants_count
        );
    }
}

fn read_line(prompt: &str) -> Result<String, String> {
    print!("{}", prompt);
    io::stdout().flush().map_err(|e| e.to_string())?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| format!("Failed to read input: {}", e))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Reads a line with terminal echo off. Piped input is read as a plain line.
fn read_password(prompt: &str) -> Result<String, String> {
    if !io::stdin().is_terminal() {
        return read_line(prompt);
    }
    print!("{}", prompt);
    io::stdout().flush().map_err(|e| e.to_string())?;

    terminal::enable_raw_mode().map_err(|e| format!("Failed to read password: {}", e))?;
    let result = read_hidden();
    let restored = terminal::disable_raw_mode();
    println!();
    restored.map_err(|e| format!("Failed to restore terminal: {}", e))?;
    result
}

fn read_hidden() -> Result<String, String> {
    let mut password = String::new();
    loop {
        let ev = event::read().map_err(|e| format!("Failed to read password: {}", e))?;
        if let Event::Key(key) = ev {
            if let Some(done) = password_key(&mut password, key) {
                return done.map(|()| password);
            }
        }
    }
}

/// Applies one key press. `Some` ends input: `Ok` on Enter, `Err` on cancel.
fn password_key(password: &mut String, key: KeyEvent) -> Option<Result<(), String>> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Enter => Some(Ok(())),
        KeyCode::Esc => Some(Err("Login cancelled".to_string())),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Err("Login cancelled".to_string()))
        }
        KeyCode::Backspace => {
            password.pop();
            None
        }
        KeyCode::Char(c) => {
            password.push(c);
            None
        }
        _ => None,
    }
}

#[derive(Serialize)]
struct Deleted {
    id: i64,
    status: MeetingStatus,
    deleted: bool,
}

fn lifecycle<T>(result: Result<T, ActionError>, json: bool) -> Result<T, String> {
    result.map_err(|e| {
        if json {
            // The plain message still reaches stderr.
            if let Err(err) = print_json(&e) {
                log::warn!("CLI: could not print error as JSON: {}", err);
            }
        }
        e.to_string()
    })
}

async fn run(cli: Cli, today: NaiveDate) -> Result<(), String> {
    let state = AppState::new()?;
    let json = cli.json;

    match cli.command {
        Command::Login {
            role,
            username,
            password,
        } => {
            let password = match password {
                Some(p) => p,
                None => read_password("Password: ")?,
            };
            let session = commands::login(&state, role.into(), &username, &password).await?;
            if json {
                print_json(&session)?;
            } else {
                println!("Logged in as {} ({:?})", session.username, session.role);
            }
        }
        Command::Logout => {
            commands::logout(&state)?;
            println!("Logged out");
        }
        Command::Whoami => match commands::current_session(&state) {
            Some(session) if json => print_json(&session)?,
            Some(session) => println!("{} ({:?})", session.username, session.role),
            None => println!("Not logged in"),
        },
        Command::Config => print_json(&commands::get_config(&state))?,
        Command::List { status } => {
            let meetings = commands::list_meetings(&state, status.map(Into::into), today).await?;
            if json {
                print_json(&meetings)?;
            } else {
                print_meetings(&meetings);
            }
        }
        Command::Dashboard => {
            let view = commands::dashboard(&state, today).await;
            if json {
                print_json(&view)?;
            } else {
                let s = view.statistics;
                println!(
                    "total {}  confirmed {}  pending {}  denied {}  upcoming {}  past {}",
                    s.total, s.confirmed, s.pending, s.denied, s.upcoming, s.past
                );
                println!("\nAwaiting approval:");
                print_meetings(&view.pending);
                println!("\nUpcoming:");
                print_meetings(&view.upcoming);
                if view.stale_rows > 0 {
                    println!(
                        "\n{} interrupted move(s) pending. Run `meetdesk reconcile`.",
                        view.stale_rows
                    );
                }
                for name in &view.degraded {
                    eprintln!("warning: {} could not be loaded", name);
                }
            }
        }
        Command::Filter(args) => {
            let result = commands::filter_meetings(&state, &args.to_spec()?).await?;
            if json {
                print_json(&result)?;
            } else {
                print_meetings(&result.meetings);
                println!("{} meeting(s)", result.count);
            }
        }
        Command::Create(args) => {
            let meeting = lifecycle(commands::create_meeting(&state, &args.into()).await, json)?;
            if json {
                print_json(&meeting)?;
            } else {
                println!("Submitted meeting {} for approval", meeting.id);
            }
        }
        Command::Approve { id } => {
            let meeting = lifecycle(commands::approve_meeting(&state, id).await, json)?;
            if json {
                print_json(&meeting)?;
            } else {
                println!("Approved: meeting {} is now confirmed as {}", id, meeting.id);
            }
        }
        Command::Deny { id } => {
            let meeting = lifecycle(commands::deny_meeting(&state, id).await, json)?;
            if json {
                print_json(&meeting)?;
            } else {
                println!("Denied: meeting {} moved to denied as {}", id, meeting.id);
            }
        }
        Command::Restore { id } => {
            let meeting = lifecycle(commands::restore_meeting(&state, id).await, json)?;
            if json {
                print_json(&meeting)?;
            } else {
                println!("Restored: meeting {} is pending again as {}", id, meeting.id);
            }
        }
        Command::Delete { id, status, yes } => {
            let confirmed = yes || {
                let answer = read_line(&format!(
                    "Meeting {} will be deleted permanently. Type the id to confirm: ",
                    id
                ))?;
                answer.trim() == id.to_string()
            };
            let status: MeetingStatus = status.into();
            lifecycle(
                commands::delete_meeting(&state, status, id, confirmed).await,
                json,
            )?;
            if json {
                print_json(&Deleted {
                    id,
                    status,
                    deleted: true,
                })?;
            } else {
                println!("Deleted meeting {}", id);
            }
        }
        Command::Edit(args) => {
            let meeting = lifecycle(
                commands::edit_meeting(&state, args.id, &args.patch()).await,
                json,
            )?;
            if json {
                print_json(&meeting)?;
            } else {
                println!("Updated meeting {}", meeting.id);
            }
        }
        Command::Report(args) => {
            let filters = ReportFilters {
                start_date: args.from,
                end_date: args.to,
                status: StatusFilter::parse(&args.status)
                    .ok_or_else(|| format!("Unknown status: {}", args.status))?,
                location: args.location,
                department: args.department,
            };
            let summary = commands::report(&state, &filters, today).await?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "{} meeting(s), {} participants, {} on average",
                    summary.meetings.len(),
                    summary.total_participants,
                    summary.avg_participants
                );
                println!("\nBy department:");
                for e in &summary.by_department {
                    println!("  {:<24} {}", e.key, e.count);
                }
                println!("\nBy location:");
                for e in &summary.by_location {
                    println!("  {:<24} {}", e.key, e.count);
                }
                println!("\nParticipants by department:");
                for e in &summary.participants_by_department {
                    println!("  {:<24} {}", e.key, e.count);
                }
                println!("\nLast 30 days:");
                for (day, count) in summary.timeline.iter().filter(|(_, n)| *n > 0) {
                    println!("  {}  {}", day, count);
                }
            }
        }
        Command::Reconcile => {
            let report =
                commands::reconcile_meetings(&state, &FilterSpec::default(), today).await;
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "cleaned {}  still pending {}  duplicates {}",
                    report.cleaned.len(),
                    report.still_stale.len(),
                    report.duplicates.len()
                );
                for dup in &report.duplicates {
                    let copies: Vec<String> = dup
                        .copies
                        .iter()
                        .map(|(status, id)| format!("{} #{}", status, id))
                        .collect();
                    println!("  '{}' appears as {}", dup.title, copies.join(", "));
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli, Local::now().date_naive()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_password_keys() {
        let mut password = String::new();
        for c in "sekrit".chars() {
            assert!(password_key(&mut password, press(KeyCode::Char(c))).is_none());
        }
        assert!(password_key(&mut password, press(KeyCode::Backspace)).is_none());
        assert!(password_key(&mut password, press(KeyCode::Char('t'))).is_none());
        assert_eq!(password_key(&mut password, press(KeyCode::Enter)), Some(Ok(())));
        assert_eq!(password, "sekrit");
    }

    #[test]
    fn test_password_cancel() {
        let mut password = String::new();
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(matches!(password_key(&mut password, ctrl_c), Some(Err(_))));
        assert!(password.is_empty());
        assert!(matches!(password_key(&mut password, press(KeyCode::Esc)), Some(Err(_))));
    }

    #[test]
    fn test_delete_acknowledgement_json() {
        let ack = Deleted {
            id: 42,
            status: MeetingStatus::Denied,
            deleted: true,
        };
        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            serde_json::json!({"id": 42, "status": "denied", "deleted": true})
        );
    }
}
