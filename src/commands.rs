use anyhow::{anyhow, Result};
use log::error;
use tokio::sync::watch;

use crate::{
    db::Database,
    settings::{SettingsStore, TimerSettings},
    timer::{format_clock, PhaseController},
};

/// One line of operator input, parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Reset,
    Status,
    Focus(u32),
    Break(u32),
    Stats,
    Leaderboard,
    Rank,
    Sessions,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Command> {
        let mut parts = line.split_whitespace();
        let word = parts.next().ok_or_else(|| anyhow!("empty command"))?;

        let minutes_arg = |parts: &mut std::str::SplitWhitespace<'_>| -> Result<u32> {
            parts
                .next()
                .ok_or_else(|| anyhow!("expected a minute count"))?
                .parse::<u32>()
                .map_err(|_| anyhow!("minutes must be a whole number"))
        };

        let command = match word {
            "start" => Command::Start,
            "pause" => Command::Pause,
            "reset" => Command::Reset,
            "status" => Command::Status,
            "focus" => Command::Focus(minutes_arg(&mut parts)?),
            "break" => Command::Break(minutes_arg(&mut parts)?),
            "stats" => Command::Stats,
            "leaderboard" => Command::Leaderboard,
            "rank" => Command::Rank,
            "sessions" => Command::Sessions,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(anyhow!("unknown command '{other}' (try 'help')")),
        };

        if parts.next().is_some() {
            return Err(anyhow!("trailing input after command"));
        }
        Ok(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

pub struct CommandContext {
    pub controller: PhaseController,
    pub db: Database,
    pub settings: SettingsStore,
    pub user_id: Option<String>,
    pub camera_error_rx: watch::Receiver<Option<String>>,
}

const HELP: &str = "\
commands:
  start | pause | reset      control the timer
  focus <min> | break <min>  set phase durations (while paused)
  status                     timer + detection status
  stats | rank | sessions    your numbers
  leaderboard                top users by study time
  quit";

/// Execute one operator line, printing the response. Errors are reported to
/// the operator, never escalated; only `quit` ends the loop.
pub async fn handle_line(line: &str, ctx: &CommandContext) -> Outcome {
    let line = line.trim();
    if line.is_empty() {
        return Outcome::Continue;
    }

    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(err) => {
            println!("{err}");
            return Outcome::Continue;
        }
    };

    if let Err(err) = run_command(command, ctx).await {
        println!("{err}");
    }

    if command == Command::Quit {
        Outcome::Quit
    } else {
        Outcome::Continue
    }
}

async fn run_command(command: Command, ctx: &CommandContext) -> Result<()> {
    match command {
        Command::Start => {
            ctx.controller.start().await?;
            print_status(ctx).await;
        }
        Command::Pause => {
            ctx.controller.pause().await;
            print_status(ctx).await;
        }
        Command::Reset => {
            ctx.controller.reset().await;
            print_status(ctx).await;
        }
        Command::Status => print_status(ctx).await,
        Command::Focus(minutes) => {
            let applied = ctx.controller.set_focus_minutes(minutes).await?;
            persist_durations(ctx).await;
            println!("focus duration set to {applied} min");
        }
        Command::Break(minutes) => {
            let applied = ctx.controller.set_break_minutes(minutes).await?;
            persist_durations(ctx).await;
            println!("break duration set to {applied} min");
        }
        Command::Stats => {
            let user_id = attached_user(ctx)?;
            let stats = ctx.db.get_user_stats(user_id).await?;
            println!(
                "today: {} min over {} session(s)\nweek: {} min | month: {} min\nlifetime: {} min over {} session(s), avg {} min\nstreak: {} day(s)",
                stats.today_minutes,
                stats.today_sessions,
                stats.week_minutes,
                stats.month_minutes,
                stats.total_minutes,
                stats.total_sessions,
                stats.average_session_length,
                stats.streak,
            );
        }
        Command::Leaderboard => {
            let entries = ctx.db.get_leaderboard(10).await?;
            if entries.is_empty() {
                println!("no study time recorded yet");
            }
            for entry in entries {
                println!(
                    "#{} {} - {} min over {} session(s)",
                    entry.rank, entry.display_name, entry.total_study_minutes, entry.total_sessions
                );
            }
        }
        Command::Rank => {
            let user_id = attached_user(ctx)?;
            let rank = ctx.db.get_user_rank(user_id).await?;
            if rank == 0 {
                println!("no sessions recorded yet");
            } else {
                println!("rank #{rank}");
            }
        }
        Command::Sessions => {
            let user_id = attached_user(ctx)?;
            let sessions = ctx.db.list_recent_sessions(user_id, 10).await?;
            if sessions.is_empty() {
                println!("no sessions yet");
            }
            for session in sessions {
                println!(
                    "{} {} {} studied, {} distraction minute(s)",
                    session.completed_at.format("%Y-%m-%d %H:%M"),
                    session.session_type.as_str(),
                    format_clock(session.duration_seconds),
                    session.distraction_count,
                );
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

fn attached_user(ctx: &CommandContext) -> Result<&str> {
    ctx.user_id
        .as_deref()
        .ok_or_else(|| anyhow!("no user configured; set \"user\" in settings.json"))
}

async fn print_status(ctx: &CommandContext) {
    let snapshot = ctx.controller.snapshot().await;
    println!(
        "{} {} [{}] | detection: {} | studied {} / distracted {}",
        snapshot.state.phase.as_str(),
        format_clock(snapshot.state.seconds_remaining.into()),
        if snapshot.state.running { "running" } else { "paused" },
        snapshot.status.as_str(),
        format_clock(snapshot.tally.studying_seconds),
        format_clock(snapshot.tally.distracted_seconds),
    );
    if let Some(err) = ctx.camera_error_rx.borrow().as_ref() {
        println!("camera unavailable: {err}");
    }
}

/// The controller holds the authoritative (clamped) durations; mirror them
/// into the settings file so they survive restarts.
async fn persist_durations(ctx: &CommandContext) {
    let snapshot = ctx.controller.snapshot().await;
    let result = ctx.settings.update_timer(TimerSettings {
        focus_minutes: snapshot.state.focus_minutes,
        break_minutes: snapshot.state.break_minutes,
    });
    if let Err(err) = result {
        error!("Failed to persist duration settings: {err:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_commands() {
        assert_eq!(Command::parse("start").unwrap(), Command::Start);
        assert_eq!(Command::parse("  pause ").unwrap(), Command::Pause);
        assert_eq!(Command::parse("leaderboard").unwrap(), Command::Leaderboard);
        assert_eq!(Command::parse("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn parses_duration_commands() {
        assert_eq!(Command::parse("focus 50").unwrap(), Command::Focus(50));
        assert_eq!(Command::parse("break 10").unwrap(), Command::Break(10));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Command::parse("focus").is_err());
        assert!(Command::parse("focus ten").is_err());
        assert!(Command::parse("start now").is_err());
        assert!(Command::parse("frobnicate").is_err());
    }
}
