pub mod camera;
pub mod cli;
pub mod core;
pub mod shared;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::camera::capture::{FrameCapture, FrameEncoder};
use crate::camera::client::{CameraApi, HttpCameraClient};
use crate::camera::display::{DisplayLoop, DisplayState};
use crate::camera::feed::{FrameSource, PollingSource};
use crate::camera::recorder::commands::{
    describe_artifact, recorder_cleanup, recorder_start, recorder_status, recorder_stop,
    recorder_toggle, ConsoleCommand, HELP,
};
use crate::camera::recorder::timer::format_elapsed;
use crate::camera::recorder::{CoordinatorHandle, RecorderConfig, RecordingCoordinator};
use crate::camera::status::{check_recording_status, StatusPoller, StatusReport};
use crate::camera::types::FeedMode;
use crate::cli::AppArgs;
use crate::core::logging::init_logging;
use crate::core::settings::{get_settings_path, load_settings, save_settings};
use crate::shared::errors::AppError;
use crate::shared::paths::get_log_dir;

pub async fn run(args: AppArgs) -> Result<(), AppError> {
    let _guards = init_logging(&get_log_dir(), args.verbose)?;

    let settings_path = args.config.clone().unwrap_or_else(get_settings_path);
    let mut settings = load_settings(&settings_path);
    args.apply(&mut settings);
    settings.validate()?;

    if args.save_settings {
        save_settings(&settings_path, &settings)?;
        tracing::info!(target: "system", "Settings saved to {:?}", settings_path);
    }

    tracing::info!(target: "system", "Camera {} at {} ({} feed, {} finalize)",
        settings.camera, settings.server_url, match settings.feed_mode {
            FeedMode::Poll => "polled",
            FeedMode::Stream => "streamed",
        }, settings.strategy);

    let client = Arc::new(
        HttpCameraClient::new(
            &settings.server_url,
            settings.camera,
            settings.request_timeout(),
        )
        .map_err(|e| AppError::HttpClient(e.to_string()))?,
    );
    let api: Arc<dyn CameraApi> = client.clone();

    match check_recording_status(api.as_ref()).await {
        Ok(true) => println!("Camera {} is already recording on the server", settings.camera),
        Ok(false) => {}
        Err(e) => tracing::warn!(target: "viewer", "[STATUS] Recording status check failed: {}", e),
    }

    let status = (!args.no_status).then(|| {
        let (poller, report_rx) = StatusPoller::new(
            api.clone(),
            settings.status_interval(),
            settings.max_status_failures,
        );
        (poller.spawn(), report_rx)
    });

    let mut config = RecorderConfig::new(
        settings.camera,
        settings.strategy,
        settings.resolved_output_dir(),
    );
    config.upload_batch_size = settings.upload_batch_size;
    config.start_timeout = settings.start_timeout();

    let (coordinator, handle, control_rx) = RecordingCoordinator::new(api.clone(), config);
    let coordinator_task = tokio::spawn(coordinator.run());

    let source: Box<dyn FrameSource> = match settings.feed_mode {
        FeedMode::Poll => Box::new(PollingSource::new(api.clone())),
        FeedMode::Stream => Box::new(client.open_stream()),
    };
    let capture = FrameCapture::new(
        control_rx,
        settings.capture_fps,
        FrameEncoder::from_quality(settings.jpeg_quality),
    );
    let (display, display_rx) = DisplayLoop::new(source, capture, settings.tick());
    let display = display.spawn();

    let report_rx = status.as_ref().map(|(_, rx)| rx.clone());
    let result = match args.record_for {
        Some(secs) => record_headless(&handle, Duration::from_secs(secs)).await,
        None => run_console(&handle, api.as_ref(), &display_rx, report_rx.as_ref()).await,
    };

    drop(display);
    drop(handle);
    let _ = coordinator_task.await;
    if let Some((task, _)) = status {
        task.abort();
    }

    result
}

async fn run_console(
    handle: &CoordinatorHandle,
    api: &dyn CameraApi,
    display_rx: &watch::Receiver<DisplayState>,
    report_rx: Option<&watch::Receiver<Option<StatusReport>>>,
) -> Result<(), AppError> {
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(target: "system", "Failed to read console input: {}", e);
                        break;
                    }
                };

                if line.trim().is_empty() {
                    continue;
                }

                let command = match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => command,
                    Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                };

                let result = match command {
                    ConsoleCommand::Start => recorder_start(handle).await,
                    ConsoleCommand::Stop => recorder_stop(handle).await,
                    ConsoleCommand::Toggle => recorder_toggle(handle).await,
                    ConsoleCommand::Status => recorder_status(handle).await.map(|recording| {
                        describe_view(&recording, &display_rx.borrow(), report_rx)
                    }),
                    ConsoleCommand::Cleanup(timestamp) => recorder_cleanup(api, &timestamp).await,
                    ConsoleCommand::Help | ConsoleCommand::Quit => Ok(HELP.to_string()),
                };

                match result {
                    Ok(message) => println!("{}", message),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    finish_recording(handle).await;
    Ok(())
}

fn describe_view(
    recording: &str,
    display: &DisplayState,
    report_rx: Option<&watch::Receiver<Option<StatusReport>>>,
) -> String {
    let mut out = format!(
        "{}\nView: {} fps, {}x{}, {} frames drawn",
        recording, display.fps, display.width, display.height, display.frames_drawn
    );

    match report_rx.map(|rx| rx.borrow().clone()) {
        Some(Some(report)) => out.push_str(&format!("\nServer: {}", report)),
        Some(None) => out.push_str("\nServer: no status yet"),
        None => {}
    }

    out
}

/// Saves an active recording before exit.
async fn finish_recording(handle: &CoordinatorHandle) {
    if !handle.status().await.is_recording {
        return;
    }

    println!("Saving recording...");
    match handle.stop().await {
        Ok(artifact) => println!("{}", describe_artifact(&artifact)),
        Err(e) => eprintln!("Error: {}", e),
    }
}

async fn record_headless(handle: &CoordinatorHandle, duration: Duration) -> Result<(), AppError> {
    handle.start().await?;
    eprintln!("Recording for {}s, Ctrl-C to stop early", duration.as_secs());

    let mut elapsed = handle.elapsed();
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            changed = elapsed.changed() => {
                if changed.is_err() {
                    break;
                }
                let secs = *elapsed.borrow_and_update();
                eprint!("\rREC {}", format_elapsed(secs));
            }
        }
    }
    eprintln!();

    let artifact = handle.stop().await?;
    println!("{}", describe_artifact(&artifact));
    Ok(())
}
