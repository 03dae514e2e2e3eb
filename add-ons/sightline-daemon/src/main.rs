//! Sightline host simulator
//!
//! Runs the coordination engine against a pretend camera, OCR pair, voice and motion
//! sensor. Stdin lines are voice transcripts; lines starting with `:` drive the
//! simulated hardware. Host events are printed to stdout as JSON lines.
//!
//! ```text
//! :see chair 0.9 0.0 0.0 0.6 0.75   put a detection in front of the camera
//! :text EXIT                        put text in front of the camera
//! :clear                            empty the scene
//! :shake                            jolt the phone on the next sensor sample
//! :sos                              press the SOS button
//! :nomatch                          report a failed listen cycle
//! ```

mod host;

use host::{LoggingVoice, Scene, SceneDetector, SceneDevanagariOcr, SceneLatinOcr};
use sightline_engine::{
    EngineBuilder, EngineConfig, EngineHandle, Frame, HostEvent, Language, ListenErrorKind,
    Mode, MotionSample,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type DaemonResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Camera delivery rate. Far faster than analysis on purpose.
const FRAME_INTERVAL_MS: u64 = 100;
const SENSOR_INTERVAL_MS: u64 = 200;

#[tokio::main]
async fn main() -> DaemonResult<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[sightline-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = EngineConfig::load()?;
    let shake_enabled = config.shake.enabled;
    let scene = Arc::new(Scene::default());

    let (speaker, playback) = host::speaker();
    let mut builder = EngineBuilder::new(config)
        .detector(Arc::new(SceneDetector(Arc::clone(&scene))))
        .text_engines(
            Arc::new(SceneLatinOcr(Arc::clone(&scene))),
            Arc::new(SceneDevanagariOcr(Arc::clone(&scene))),
        );
    for language in Language::ALL {
        builder = builder.voice(
            language,
            Arc::new(LoggingVoice::new(language.locale_tag(), speaker.clone())),
        );
    }
    let (coordinator, handle, mut host_events) = builder.build()?;

    tokio::spawn(host::run_playback(playback, handle.speech()));
    let engine = tokio::spawn(coordinator.run());

    let mut trigger = handle.emergency_trigger();
    if !shake_enabled {
        trigger.report_unavailable("shake detection disabled by configuration")?;
    }

    tracing::info!("Sightline daemon started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut camera = tokio::time::interval(Duration::from_millis(FRAME_INTERVAL_MS));
    let mut sensor = tokio::time::interval(Duration::from_millis(SENSOR_INTERVAL_MS));
    let mut jolt_pending = false;

    loop {
        tokio::select! {
            _ = camera.tick() => {
                handle.offer_frame(Frame::new(4, 4, vec![0; 16], chrono::Utc::now().timestamp_millis()));
            }
            _ = sensor.tick() => {
                let sample = motion_sample(jolt_pending);
                match trigger.on_motion_sample(sample) {
                    Ok(true) => jolt_pending = false,
                    Ok(false) => {
                        if handle.snapshot().mode == Mode::Emergency {
                            jolt_pending = false;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "motion sample rejected"),
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if let Err(e) = on_input(line.trim(), &handle, &scene, &mut jolt_pending) {
                            tracing::warn!(error = %e, "input not handled");
                        }
                    }
                    None => {
                        tracing::info!("stdin closed; shutting down");
                        break;
                    }
                }
            }
            event = host_events.recv() => {
                let Some(event) = event else { break };
                println!("{}", serde_json::to_string(&event)?);
                if event == HostEvent::TerminateRequested {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down");
                break;
            }
        }
    }

    handle.shutdown()?;
    engine.await??;
    Ok(())
}

fn motion_sample(jolt: bool) -> MotionSample {
    MotionSample {
        x: if jolt { 5_000.0 } else { 0.0 },
        y: 0.0,
        z: 9.8,
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    }
}

fn on_input(line: &str, handle: &EngineHandle, scene: &Scene, jolt_pending: &mut bool) -> DaemonResult<()> {
    if line.is_empty() {
        return Ok(());
    }
    let Some(command) = line.strip_prefix(':') else {
        handle.transcript(line)?;
        return Ok(());
    };
    let (verb, args) = command.split_once(' ').unwrap_or((command, ""));
    match verb {
        "see" => scene.add_detection(args)?,
        "text" => scene.set_text(args.trim()),
        "clear" => scene.clear(),
        "shake" => *jolt_pending = true,
        "sos" => handle.sos_button()?,
        "nomatch" => handle.listen_error(ListenErrorKind::NoMatch)?,
        other => return Err(format!("unknown command :{}", other).into()),
    }
    Ok(())
}
