use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use studysentry::{
    audio::AlarmHandle,
    commands::{handle_line, CommandContext, Outcome},
    sensing::CommandFrameSource,
    Database, DetectorClient, PhaseController, SensingController, SettingsStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("studysentry starting up...");

    let project_dirs = ProjectDirs::from("", "", "studysentry")
        .ok_or_else(|| anyhow!("could not determine a data directory"))?;
    let data_dir = project_dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let database = Database::new(data_dir.join("studysentry.sqlite3"))?;

    let user = settings.user();
    if let Some(user) = &user {
        database
            .ensure_profile(&user.user_id, user.display_name.as_deref())
            .await?;
        info!("Recording sessions for user {}", user.user_id);
    } else {
        warn!("No user configured; sessions will not be saved");
    }
    let user_id = user.map(|u| u.user_id);

    // The sampler only runs once the detector answers its readiness probe;
    // without it the status stays Loading and the timer works on its own.
    let mut sensing = SensingController::new();
    let detector = DetectorClient::new(settings.detector().endpoint);
    match detector.warm_up().await {
        Ok(()) => {
            let capture = settings.capture();
            let source = CommandFrameSource::new(capture.command, capture.args);
            sensing.start_sampling(Box::new(source), detector)?;
        }
        Err(err) => {
            warn!("Detector unavailable; distraction tracking disabled: {err:#}");
        }
    }

    let timer_settings = settings.timer();
    let controller = PhaseController::new(
        database.clone(),
        user_id.clone(),
        sensing.status_rx(),
        AlarmHandle::new(),
        timer_settings.focus_minutes,
        timer_settings.break_minutes,
    );

    let ctx = CommandContext {
        controller: controller.clone(),
        db: database,
        settings,
        user_id,
        camera_error_rx: sensing.camera_error_rx(),
    };

    println!("studysentry ready (type 'help' for commands)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read stdin")? {
                    Some(line) => {
                        if handle_line(&line, &ctx).await == Outcome::Quit {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    info!("Shutting down");
    controller.teardown().await;
    sensing.stop_sampling().await?;
    Ok(())
}
