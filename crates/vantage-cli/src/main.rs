//! `vantage-cli` – Vantage Command Line Interface
//!
//! Commands:
//!
//! - `vantage localize` – bootstraps a localization session against the
//!   positioning service with mock sensors, sweeps the mock heading through
//!   a scan and prints the corrected camera location.
//! - `vantage play <url|file> [--loops N]` – streams a volumetric sequence
//!   and reports each displayed frame.
//! - `vantage config [--schema | --init]` – shows the effective config,
//!   prints its JSON schema, or runs the first-run wizard.
//!
//! **Ctrl-C** stops playback or an in-progress scan and exits cleanly.

mod config;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tracing::warn;

use vantage_runtime::{LocalizationSession, init_tracing};
use vantage_sensors::{MockGps, MockImu, MockVideo, SensorSet};
use vantage_stream::{
    CachingFetcher, HttpRangeFetcher, MemoryFetcher, RangeCache, RangeFetcher, VolumetricPlayer,
    WallClock,
};
use vantage_transport::{EventBus, Topic};

use crate::config::{Config, GpsProvider};

#[tokio::main]
async fn main() {
    let _telemetry = init_tracing("vantage-cli");
    let args: Vec<String> = std::env::args().skip(1).collect();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will terminate immediately");
    }

    let outcome = match args.first().map(String::as_str) {
        Some("localize") => cmd_localize(&effective_config(), shutdown).await,
        Some("play") => match args.get(1) {
            Some(source) => {
                let loops = parse_loops(&args[2..]);
                cmd_play(&effective_config(), source, loops, shutdown).await
            }
            None => Err("play needs a URL or file path".to_string()),
        },
        Some("config") => cmd_config(args.get(1).map(String::as_str)),
        Some("help") | Some("--help") | Some("-h") | None => {
            print_banner();
            print_usage();
            Ok(())
        }
        Some(other) => Err(format!("Unknown command '{}'. Try `vantage help`.", other)),
    };

    if let Err(e) = outcome {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// The saved config with environment overrides, or defaults.
fn effective_config() -> Config {
    match config::load() {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn parse_loops(rest: &[String]) -> u32 {
    match rest {
        [flag, n, ..] if flag == "--loops" => n.parse().unwrap_or(0),
        _ => 0,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// localize
// ─────────────────────────────────────────────────────────────────────────────

async fn cmd_localize(cfg: &Config, shutdown: Arc<AtomicBool>) -> Result<(), String> {
    if cfg.gps_provider == GpsProvider::Device {
        return Err(
            "gps_provider = \"device\" needs a platform location feed; use \"mock\" from the CLI"
                .to_string(),
        );
    }

    let fix = cfg.mock_fix();
    println!(
        "  Mock GPS at {}, {} (alt {} m)",
        fix.latitude.to_string().bold(),
        fix.longitude.to_string().bold(),
        fix.altitude
    );

    let imu = Arc::new(MockImu::default());
    let sensors = SensorSet::new(
        imu.clone(),
        Arc::new(MockGps::new(fix)),
        Arc::new(MockVideo::default()),
    );
    let bus = EventBus::default();
    let printer = tokio::spawn(print_events(bus.clone()));

    let session = LocalizationSession::connect_to_service(cfg.session_config(), sensors, bus)
        .map_err(|e| e.to_string())?;

    session.start().await.map_err(|e| e.to_string())?;
    println!("  {} Session ready.", "✓".green().bold());
    if let Some(mesh) = session.mesh() {
        let style = session.mesh_style();
        println!(
            "  Environment mesh: {} bytes of glTF (occlusion {}, opacity {})",
            mesh.to_string().len(),
            if style.depth_test { "on" } else { "off" },
            style.opacity
        );
    }

    // Simulated clockwise sweep: one degree per poll until the scan finishes.
    let poll = cfg.session_config().scan_poll_interval;
    let sweep_stop = shutdown.clone();
    let sweep = tokio::spawn(async move {
        let mut yaw = 0.0;
        while !sweep_stop.load(Ordering::SeqCst) {
            tokio::time::sleep(poll).await;
            yaw -= 1.0;
            imu.set_yaw(yaw);
        }
    });

    let result = tokio::select! {
        r = session.localize() => r.map_err(|e| e.to_string()),
        _ = wait_for(shutdown.clone()) => Err("scan cancelled".to_string()),
    };
    sweep.abort();
    printer.abort();
    result?;

    let location = session.camera_location().map_err(|e| e.to_string())?;
    println!(
        "  {} Localized at {:.7}, {:.7} (alt {:.2} m)",
        "✓".green().bold(),
        location.latitude,
        location.longitude,
        location.altitude
    );
    Ok(())
}

async fn print_events(bus: EventBus) {
    let mut session = bus.subscribe_to(Topic::Session);
    let mut localization = bus.subscribe_to(Topic::Localization);
    loop {
        let event = tokio::select! {
            e = session.recv() => e,
            e = localization.recv() => e,
        };
        match event {
            Ok(event) => println!("  {} {:?}", "•".cyan(), event.payload),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "event printer fell behind");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn wait_for(flag: Arc<AtomicBool>) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// play
// ─────────────────────────────────────────────────────────────────────────────

async fn cmd_play(
    cfg: &Config,
    source: &str,
    loops: u32,
    shutdown: Arc<AtomicBool>,
) -> Result<(), String> {
    let inner: Arc<dyn RangeFetcher> =
        if source.starts_with("http://") || source.starts_with("https://") {
            Arc::new(HttpRangeFetcher::new(source))
        } else {
            let bytes = tokio::fs::read(source)
                .await
                .map_err(|e| format!("Failed to read {}: {}", source, e))?;
            Arc::new(MemoryFetcher::new(source, bytes))
        };
    let fetcher = Arc::new(CachingFetcher::new(inner, RangeCache::new()));

    let bus = EventBus::default();
    let completed = Arc::new(AtomicU32::new(0));
    let counter = completed.clone();
    let mut player = VolumetricPlayer::new(fetcher, cfg.player_config(), Arc::new(WallClock::new()))
        .with_bus(bus)
        .on_loop_end(move |control| {
            let done = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if loops > 0 && done >= loops {
                control.destroy();
            }
        });

    println!("  Buffering {} …", source.bold());
    player
        .load(Duration::from_secs(cfg.session_timeout_secs))
        .await
        .map_err(|e| e.to_string())?;

    let (frames, fps) = player
        .sequence_info()
        .map(|s| (s.frame_count, s.frame_rate))
        .ok_or_else(|| "sequence info missing after load".to_string())?;
    println!(
        "  {} {} frames at {} fps{}",
        "▶".green().bold(),
        frames,
        fps,
        if loops > 0 { format!(", {} loop(s)", loops) } else { String::new() }
    );

    let mut decode = tokio::time::interval(player.decode_period());
    let mut render = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(fps)));
    let mut last_shown = i64::MIN;
    while player.is_open() && !shutdown.load(Ordering::SeqCst) {
        tokio::select! {
            _ = decode.tick() => {
                if let Err(e) = player.pump().await {
                    player.destroy();
                    return Err(e.to_string());
                }
            }
            _ = render.tick() => {
                if let Some(frame) = player.update()
                    && frame.frame != last_shown
                {
                    last_shown = frame.frame;
                    println!(
                        "  frame {:>5}/{}  {:>6} vertices  {:>6} faces  {:?}",
                        frame.frame,
                        frames,
                        frame.vertex_count(),
                        frame.face_count(),
                        frame.texture_encoding
                    );
                }
            }
        }
    }
    if player.is_open() {
        player.destroy();
    }
    println!(
        "  {} Stopped after {} loop(s).",
        "✓".green().bold(),
        completed.load(Ordering::SeqCst)
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// config
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_config(flag: Option<&str>) -> Result<(), String> {
    match flag {
        Some("--schema") => {
            println!("{}", config::schema()?);
            Ok(())
        }
        Some("--init") => run_first_run_wizard(),
        None => {
            println!("  {}", config::config_path().display().to_string().bold());
            println!("{:#?}", effective_config());
            Ok(())
        }
        Some(other) => Err(format!("Unknown config flag '{}'", other)),
    }
}

fn run_first_run_wizard() -> Result<(), String> {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║      Vantage First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();

    let mut cfg = config::load()?.unwrap_or_default();

    let key = prompt_line("  Access key [keep current]: ", "");
    if !key.is_empty() {
        cfg.access_key = key;
    }

    println!("  GPS provider:");
    println!("    1) Mock  (fixed position, default)");
    println!("    2) Device (platform location feed)");
    match prompt_line("  Enter choice [1]: ", "1").as_str() {
        "2" => cfg.gps_provider = GpsProvider::Device,
        _ => cfg.gps_provider = GpsProvider::Mock,
    }

    if cfg.gps_provider == GpsProvider::Mock {
        let lat = prompt_line(
            &format!("  Mock latitude [{}]: ", cfg.mock_latitude),
            &cfg.mock_latitude.to_string(),
        );
        if let Ok(v) = lat.parse::<f64>() {
            cfg.mock_latitude = v;
        }
        let lon = prompt_line(
            &format!("  Mock longitude [{}]: ", cfg.mock_longitude),
            &cfg.mock_longitude.to_string(),
        );
        if let Ok(v) = lon.parse::<f64>() {
            cfg.mock_longitude = v;
        }
    }

    config::save(&cfg)?;
    println!(
        "\n  {} Config saved to {}\n",
        "✓".green().bold(),
        config::config_path().display().to_string().bold()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#" _   __          __              "#.bold().cyan());
    println!("{}", r#"| | / /__ ____  / /____ ____ ___ "#.bold().cyan());
    println!("{}", r#"| |/ / _ `/ _ \/ __/ _ `/ _ `/ -_)"#.bold().cyan());
    println!("{}", r#"|___/\_,_/_//_/\__/\_,_/\_, /\__/ "#.bold().cyan());
    println!("{}", r#"                       /___/      "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Vantage".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  AR localization and volumetric playback");
    println!();
}

fn print_usage() {
    println!("  {}", "Usage:".bold());
    println!("    vantage localize                      run a session and one scan");
    println!("    vantage play <url|file> [--loops N]   stream a volumetric sequence");
    println!("    vantage config [--schema | --init]    show, describe or create the config");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
