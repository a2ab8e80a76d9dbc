//! CardioSentinel headless host.
//!
//! Wires the escalation engine to settings, logging and a line-oriented
//! operator console:
//!
//! ```text
//! <any text>   record an activity event
//! panic        manual emergency trigger
//! status       print level, inactivity and subsystem statuses
//! quit         shut the coordinator down and exit
//! ```
//!
//! Without platform camera/speech integrations the host runs on scripted
//! demo devices, so the whole ladder — including dispatch dry-runs — can be
//! exercised from a terminal.

mod settings;

use std::sync::Arc;
use std::time::Duration;

use sentinel_core::contacts::ContactDirectory;
use sentinel_core::coordinator::{EngineDevices, EscalationCoordinator};
use sentinel_core::dictation::stub::UnsupportedRecognizer;
use sentinel_core::dictation::{Announcer, AnnouncerHandle, RecognizerHandle};
use sentinel_core::dispatch::{DispatchHandle, DryRunDispatcher, HttpDispatcher};
use sentinel_core::events::SentinelEvent;
use sentinel_core::intake::{self, IntakeForm};
use sentinel_core::location::{FixedLocation, GeoPoint, LocationHandle, NoLocation};
use sentinel_core::predict::PredictionClient;
use sentinel_core::vision::stub::{ScriptedDetectorBackend, ScriptedFrameSource};
use sentinel_core::vision::{CameraHandle, DetectorBackendHandle, Frame};
use settings::{default_settings_path, load_settings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Announcer for hosts without speech synthesis: prints what would have
/// been spoken.
struct ConsoleAnnouncer;

impl Announcer for ConsoleAnnouncer {
    fn announce(&mut self, text: &str) {
        println!("[announce] {text}");
    }
}

fn demo_devices(app: &settings::AppSettings) -> EngineDevices {
    // No platform camera or speech engine is compiled into this host yet;
    // scripted devices keep every ladder transition observable. Hosts with a
    // real classifier backend plug it in through DetectorBackend, fed by the
    // configured artifact URLs.
    warn!("no platform camera/speech integration — using scripted demo devices");
    info!(
        face_model = %app.face_model_url,
        eye_model = %app.eye_model_url,
        "classifier artifacts configured"
    );

    let camera = CameraHandle::new(ScriptedFrameSource::new(
        vec![Frame::solid(64, 48, 128, 128, 128)],
        Duration::from_millis(33),
        true,
    ));
    let detectors = DetectorBackendHandle::new(ScriptedDetectorBackend::attentive());
    let recognizer = RecognizerHandle::new(UnsupportedRecognizer);
    let announcer = AnnouncerHandle::new(ConsoleAnnouncer);

    let location: LocationHandle = match (app.latitude, app.longitude) {
        (Some(latitude), Some(longitude)) => Arc::new(FixedLocation(GeoPoint {
            latitude,
            longitude,
        })),
        _ => Arc::new(NoLocation),
    };

    let dispatcher: DispatchHandle = match &app.service_base_url {
        Some(base_url) => {
            info!(%base_url, "dispatching through the emergency service");
            Arc::new(HttpDispatcher::new(base_url))
        }
        None => {
            warn!("no service URL configured — emergency dispatch runs dry");
            Arc::new(DryRunDispatcher::new())
        }
    };

    EngineDevices {
        camera,
        detectors,
        recognizer,
        announcer,
        location,
        dispatcher,
    }
}

fn print_event(event: &SentinelEvent) {
    match event {
        SentinelEvent::Level { level, reason, .. } => match reason {
            Some(reason) => println!("[level] {level:?} — {reason}"),
            None => println!("[level] {level:?}"),
        },
        SentinelEvent::Status {
            subsystem,
            status,
            detail,
            ..
        } => match detail {
            Some(detail) => println!("[{subsystem:?}] {status} ({detail})"),
            None => println!("[{subsystem:?}] {status}"),
        },
        SentinelEvent::Notes { text, .. } => println!("[notes] {text}"),
        SentinelEvent::Dispatch {
            delivered, summary, ..
        } => {
            if *delivered {
                println!("[dispatch] {summary}");
            } else {
                println!("[dispatch] FAILED — {summary}");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel=info".parse().unwrap()),
        )
        .init();

    info!("CardioSentinel starting");

    let settings_path = default_settings_path();
    let mut app_settings = load_settings(&settings_path);
    app_settings.apply_env_overrides();
    info!(
        settings_path = ?settings_path,
        vision_after_secs = app_settings.vision_after_secs,
        dictation_after_secs = app_settings.dictation_after_secs,
        silence_countdown_secs = app_settings.silence_countdown_secs,
        contacts = app_settings.emergency_contacts.len(),
        "runtime settings loaded"
    );

    // ── Engine setup ──────────────────────────────────────────────────────
    let contacts = ContactDirectory::new(
        app_settings.emergency_contacts.clone(),
        app_settings.emergency_primary_number.clone(),
    );
    let intake = intake::shared(IntakeForm {
        name: "Demo Patient".into(),
        ..IntakeForm::default()
    });

    let coordinator = EscalationCoordinator::new(
        app_settings.coordinator_config(),
        demo_devices(&app_settings),
        Arc::clone(&intake),
        contacts,
    );

    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event feed lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    coordinator.start()?;
    let handle = coordinator.handle();

    println!("type to register activity; 'panic' = manual trigger; 'status'; 'predict'; 'quit'");

    // ── Operator console ──────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "quit" => break,
            "panic" => {
                handle.trigger_manual();
                println!("manual emergency trigger sent");
            }
            "status" => {
                let board = coordinator.statuses();
                println!(
                    "level: {:?} — inactive for {:?}",
                    handle.level(),
                    handle.elapsed_inactivity()
                );
                println!(
                    "vision: {}{}",
                    board.vision,
                    board
                        .vision_detail
                        .as_deref()
                        .map(|d| format!(" ({d})"))
                        .unwrap_or_default()
                );
                println!(
                    "dictation: {}{}",
                    board.dictation,
                    board
                        .dictation_detail
                        .as_deref()
                        .map(|d| format!(" ({d})"))
                        .unwrap_or_default()
                );
            }
            "predict" => match &app_settings.service_base_url {
                Some(base_url) => {
                    let client = PredictionClient::new(base_url);
                    let form = intake.lock().clone();
                    match tokio::task::spawn_blocking(move || client.predict(&form)).await? {
                        Ok(report) => println!(
                            "risk: {} ({:.1}%) — {}",
                            report.risk_category, report.risk_score, report.advisory_message
                        ),
                        Err(e) => println!("prediction failed: {e}"),
                    }
                }
                None => println!("no service URL configured"),
            },
            "" => {
                handle.record_activity();
            }
            text => {
                intake.lock().append_notes(text);
                handle.record_activity();
                println!("activity recorded");
            }
        }
    }

    coordinator.shutdown();
    info!("CardioSentinel stopped");
    Ok(())
}
