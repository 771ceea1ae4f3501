//! Dart Rig Calibrator - console driver
//!
//! Walks the setup wizard from a line-based prompt. Notifications are printed
//! as they arrive.

use anyhow::Context;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use dartrig_calibrator::calibration::{CalibrationApi, CalibrationClient};
use dartrig_calibrator::camera::{DisplaySurface, NokhwaBackend, PreviewSurface, StreamLifecycleManager};
use dartrig_calibrator::config::AppConfig;
use dartrig_calibrator::notify::Notifier;
use dartrig_calibrator::profile::{CalibrationProfile, ProfileStore};
use dartrig_calibrator::telemetry::{init_logging, LogConfig};
use dartrig_calibrator::wizard::{WizardController, WizardStep, REQUIRED_CAPTURES};

const HELP: &str = "\
Commands:
  devices          list detected cameras
  step <1-6>       jump to a wizard step
  next | back      move through the wizard
  camera <n>       select camera n for intrinsic captures
  retry <n>        restart camera n
  capture          capture and submit a calibration image
  reset [n]        clear capture counts for camera n, or for all cameras
  start | stop     start or stop the calibration job
  status           show wizard and calibration state
  save <name>      save the current calibration as a profile
  profiles         list saved profiles
  load <id>        show a saved profile
  activate <id>    make a saved profile the active one
  delete <id>      remove a saved profile
  quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    // Notifications go to stdout; keep the log console for warnings
    let _log_guard = init_logging(&LogConfig {
        default_level: "warn".to_string(),
        ..LogConfig::default()
    })
    .map_err(|e| anyhow::anyhow!("{}", e))
    .context("failed to initialize logging")?;

    let config = AppConfig::load(config_path.as_deref()).context("failed to load configuration")?;
    log::info!("Calibration service at {}", config.backend.base_url);

    let backend = Arc::new(NokhwaBackend::new(
        config.cameras.requested_width,
        config.cameras.requested_height,
    ));
    let surfaces: Vec<Arc<dyn DisplaySurface>> = (0..config.cameras.max_slots)
        .map(|i| Arc::new(PreviewSurface::new(format!("Camera {}", i + 1))) as Arc<dyn DisplaySurface>)
        .collect();

    let (notifier, mut notifications) = Notifier::channel();
    tokio::spawn(async move {
        while let Some(n) = notifications.recv().await {
            println!("[{:?}] {}", n.severity, n);
        }
    });

    let cameras = Arc::new(StreamLifecycleManager::new(
        backend,
        surfaces,
        &config.cameras,
        notifier.clone(),
    ));
    let api: Arc<dyn CalibrationApi> = Arc::new(
        CalibrationClient::new(&config.backend).context("failed to create calibration client")?,
    );
    let wizard = WizardController::new(cameras, api, &config, notifier);
    let store = ProfileStore::new(config.profiles_dir());

    println!("Dart Rig Calibrator. Type 'help' for commands.");
    show(wizard.enter_step(WizardStep::CameraIdentification).await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let number = rest.parse::<usize>().ok();

        match command {
            "" => {}
            "help" => println!("{}", HELP),
            "devices" => {
                let devices = wizard.cameras().devices();
                if devices.is_empty() {
                    println!("No cameras detected yet");
                }
                for device in devices.iter() {
                    println!("  {}: {} ({})", device.index + 1, device.label, device.id);
                }
            }
            "step" => match number.and_then(WizardStep::from_number) {
                Some(step) => show(wizard.enter_step(step).await),
                None => println!("usage: step <1-6>"),
            },
            "next" => show(wizard.advance().await),
            "back" => show(wizard.go_back().await),
            "camera" => match number.filter(|n| *n > 0) {
                Some(n) => show(wizard.select_camera(n - 1)),
                None => println!("usage: camera <n>"),
            },
            "retry" => match number.filter(|n| *n > 0) {
                Some(n) => show(wizard.retry_camera(n - 1).await),
                None => println!("usage: retry <n>"),
            },
            "capture" => {
                if wizard.step() == WizardStep::ExtrinsicCalibration {
                    show(wizard.capture_extrinsic().await);
                } else {
                    show(wizard.capture_intrinsic().await);
                }
            }
            "reset" if rest.is_empty() => wizard.reset_captures(None),
            "reset" => match number.filter(|n| *n > 0) {
                Some(n) => wizard.reset_captures(Some(n - 1)),
                None => println!("usage: reset [n]"),
            },
            "start" => show(wizard.start_calibration().await),
            "stop" => {
                if !wizard.stop_calibration().await {
                    println!("The service did not confirm the stop");
                }
            }
            "status" => print_status(&wizard),
            "save" if rest.is_empty() => println!("usage: save <name>"),
            "save" => {
                let mut profile = wizard.build_profile(rest);
                match store.save(&mut profile) {
                    Ok(path) => println!("Saved {} to {}", profile.name, path.display()),
                    Err(e) => println!("{}", e.notification()),
                }
            }
            "profiles" => match store.list() {
                Ok(profiles) => {
                    for p in profiles {
                        let marker = if p.is_active { "*" } else { " " };
                        println!("{} {} {} ({} cameras)", marker, p.id, p.name, p.cameras.len());
                    }
                }
                Err(e) => println!("{}", e.notification()),
            },
            "load" | "activate" | "delete" => match Uuid::parse_str(rest) {
                Ok(id) => match command {
                    "load" => match store.load(id) {
                        Ok(profile) => print_profile(&profile),
                        Err(e) => println!("{}", e.notification()),
                    },
                    "activate" => match store.set_active(id) {
                        Ok(profile) => println!("Active profile: {}", profile.name),
                        Err(e) => println!("{}", e.notification()),
                    },
                    _ => match store.delete(id) {
                        Ok(true) => println!("Deleted {}", id),
                        Ok(false) => println!("No profile {}", id),
                        Err(e) => println!("{}", e.notification()),
                    },
                },
                Err(_) => println!("usage: {} <profile id>", command),
            },
            "quit" | "exit" => break,
            other => println!("Unknown command {:?}. Type 'help' for commands.", other),
        }
    }

    wizard.close().await;
    Ok(())
}

/// Print a successful result; failures were already announced.
fn show<T: Debug>(result: dartrig_calibrator::Result<T>) {
    match result {
        Ok(value) => println!("-> {:?}", value),
        Err(e) => log::debug!("Command failed: {}", e),
    }
}

fn print_status(wizard: &WizardController) {
    let step = wizard.step();
    println!("{}", step);
    println!("  Cameras live: {:?}", wizard.cameras().bound_slots());

    match step {
        WizardStep::IntrinsicCalibration => {
            let captures = wizard.intrinsic_captures();
            let selected = wizard.selected_camera();
            println!("  Selected camera: {}", selected + 1);
            for slot in wizard.required_slots() {
                println!(
                    "  Camera {}: {}/{} captures{}",
                    slot + 1,
                    captures.count(slot),
                    REQUIRED_CAPTURES,
                    if captures.is_ready(slot) { " (ready)" } else { "" }
                );
            }
        }
        WizardStep::ExtrinsicCalibration => {
            let captures = wizard.extrinsic_captures();
            let pair = wizard.required_slots();
            let count = pair.iter().map(|s| captures.count(*s)).min().unwrap_or(0);
            println!("  Stereo pairs: {}/{}", count, REQUIRED_CAPTURES);
        }
        _ => {}
    }

    let job = wizard.calibration_status();
    println!("  Calibration: {} {:.0}% {}", job.status, job.progress, job.message);
}

fn print_profile(profile: &CalibrationProfile) {
    let marker = if profile.is_active { " (active)" } else { "" };
    println!("{} {}{}", profile.id, profile.name, marker);
    for camera in &profile.cameras {
        let error = camera
            .calibration_error
            .map(|e| format!(", error {:.3}", e))
            .unwrap_or_default();
        println!(
            "  Camera {}: {} {:?}, {} images{}",
            camera.camera_index + 1,
            camera.name,
            camera.status,
            camera.calibration_images,
            error
        );
    }
}
