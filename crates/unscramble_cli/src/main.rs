//! Command-line driver for the high-score core.
//!
//! # Responsibility
//! - Exercise the store and session controller outside any UI.
//! - Take all configuration from `UNSCRAMBLE_*` environment variables.
//!
//! Usage: `unscramble <show|record POINTS|clear|play SCORE|version>`

use std::process::ExitCode;
use unscramble_core::{
    core_version, init_logging_from_config, CoreConfig, GameSessionController, HighScoreStore,
};

enum Command {
    Show,
    Record(u32),
    Clear,
    Play(u32),
    Version,
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    let points = |raw: Option<&String>| -> Result<u32, String> {
        let raw = raw.ok_or("missing score argument")?;
        raw.parse::<u32>()
            .map_err(|_| format!("score must be a non-negative integer, got `{raw}`"))
    };

    match args.first().map(String::as_str) {
        None | Some("show") => Ok(Command::Show),
        Some("record") => Ok(Command::Record(points(args.get(1))?)),
        Some("clear") => Ok(Command::Clear),
        Some("play") => Ok(Command::Play(points(args.get(1))?)),
        Some("version") => Ok(Command::Version),
        Some(other) => Err(format!("unknown command `{other}`")),
    }
}

async fn run(command: Command, config: &CoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::Version = command {
        println!("unscramble_core version={}", core_version());
        return Ok(());
    }

    let store = HighScoreStore::open(&config.store)?;
    match command {
        Command::Show => {
            let snapshot = store.current().await?;
            println!(
                "high_score points={} achieved_at={} revision={}",
                snapshot.record.points, snapshot.record.achieved_at, snapshot.revision
            );
            println!("{}", snapshot.record.challenge_message());
        }
        Command::Record(points) => {
            let revision = store.write(points).await?;
            println!("recorded points={points} revision={revision}");
        }
        Command::Clear => {
            let revision = store.clear().await?;
            println!("cleared revision={revision}");
        }
        Command::Play(score) => {
            let mut session = GameSessionController::new(store);
            session.start()?;
            session.add_points(score)?;
            let outcome = session.finish().await?;
            if outcome.is_new_high_score() {
                println!(
                    "new high score! {} -> {}",
                    outcome.previous.points, outcome.final_score
                );
            } else {
                println!(
                    "you scored {}; high score stays {}",
                    outcome.final_score, outcome.previous.points
                );
            }
            session.close().await?;
        }
        Command::Version => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_command(&args) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!("usage: unscramble <show|record POINTS|clear|play SCORE|version>");
            return ExitCode::from(2);
        }
    };

    let config = match CoreConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };
    if let Err(err) = init_logging_from_config(&config) {
        eprintln!("warning: logging disabled: {err}");
    }

    match run(command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("event=cli_run module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
