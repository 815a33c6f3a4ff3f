use std::{sync::Arc, time::Duration};

use clap::{
    ArgAction, CommandFactory, Parser, Subcommand, ValueEnum,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use indicatif::{ProgressBar, ProgressStyle};
use tabled::Table;

use spotdeck::{
    Res,
    backend::{Backend, Poller},
    config::{self, Config},
    error, info, success,
    types::{DeviceTableRow, PlaybackSnapshot, RepeatState},
    warning,
};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Save client credentials and authorize in the browser if needed
    Auth(CredentialOptions),

    /// Accept client credentials against the cached token only
    Reauth(CredentialOptions),

    /// Show authentication and playback status
    Status,

    /// List available playback devices
    Devices,

    /// Keep the playback cache fresh and print changes until Ctrl-C
    Daemon,

    /// Start or resume playback
    Play(DeviceOption),

    /// Pause playback
    Pause(DeviceOption),

    /// Pause when playing, play otherwise
    Toggle(DeviceOption),

    /// Skip to the next track
    Next(DeviceOption),

    /// Go back to the previous track
    Previous(DeviceOption),

    /// Set the volume in percent
    Volume(VolumeOptions),

    /// Turn shuffle on or off
    Shuffle(ShuffleOptions),

    /// Set the repeat mode
    Repeat(RepeatOptions),

    /// Jump to a position in the current track
    Seek(SeekOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct CredentialOptions {
    /// Client id of the Spotify developer application
    #[clap(long)]
    client_id: String,

    /// Local port registered as redirect URI (http://127.0.0.1:<port>)
    #[clap(long)]
    port: String,
}

#[derive(Parser, Debug, Clone)]
pub struct DeviceOption {
    /// Target device id; defaults to the active device
    #[clap(long)]
    device: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct VolumeOptions {
    #[clap(value_parser = clap::value_parser!(u8).range(0..=100))]
    percent: u8,

    #[clap(flatten)]
    target: DeviceOption,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Switch {
    On,
    Off,
}

#[derive(Parser, Debug, Clone)]
pub struct ShuffleOptions {
    state: Switch,

    #[clap(flatten)]
    target: DeviceOption,
}

#[derive(Parser, Debug, Clone)]
pub struct RepeatOptions {
    #[clap(value_parser = parse_repeat)]
    mode: RepeatState,

    #[clap(flatten)]
    target: DeviceOption,
}

#[derive(Parser, Debug, Clone)]
pub struct SeekOptions {
    /// Position in milliseconds
    position_ms: u64,

    #[clap(flatten)]
    target: DeviceOption,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

fn parse_repeat(s: &str) -> Result<RepeatState, String> {
    s.parse::<RepeatState>().map_err(|e| e.to_string())
}

fn setup_logging(config: &Config, verbose: u8) -> Res<()> {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    std::fs::create_dir_all(&config.data_dir)?;
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .level_for("hyper_util", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .chain(fern::log_file(config.log_path())?)
        .apply()?;
    Ok(())
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb
}

/// Fills the cache once so commands without `--device` find the active one.
async fn prime_cache(backend: &Arc<Backend>) {
    backend.set_action_active();
    Poller::new(Arc::clone(backend)).tick().await;
}

async fn require_auth(backend: &Arc<Backend>) {
    if !backend.is_authenticated().await {
        error!("Not authenticated. Run `spotdeck auth --client-id <id> --port <port>` first.");
    }
}

fn describe(playback: &PlaybackSnapshot) -> String {
    let state = if playback.is_playing { "playing" } else { "paused" };
    let track = playback
        .item
        .as_ref()
        .map(|item| format!("{} - {}", item.artist_names(), item.name))
        .unwrap_or_else(|| "unknown track".to_string());
    format!(
        "{state}: {track} (shuffle {}, repeat {})",
        if playback.shuffle_state { "on" } else { "off" },
        playback.repeat_state
    )
}

async fn run_daemon(backend: Arc<Backend>) {
    let poller = Poller::new(Arc::clone(&backend)).start();
    let tick = backend.config().tick_interval;
    let mut last: Option<String> = None;

    info!("Polling playback state, press Ctrl-C to stop");
    loop {
        backend.set_action_active();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(tick) => {}
        }

        let current = backend.get_playback().map(|p| describe(&p));
        if current != last {
            match &current {
                Some(line) => info!("{}", line),
                None => info!("Nothing playing"),
            }
            last = current;
        }
    }

    backend.shutdown();
    let _ = poller.await;
    success!("Stopped");
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();
    let config = Config::from_env();
    if let Err(e) = setup_logging(&config, cli.verbose) {
        warning!("Logging disabled: {}", e);
    }

    if let Command::Completions(opt) = &cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(opt.shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    let backend = Backend::from_config(config).await;

    let result = match cli.command {
        Command::Auth(opt) => {
            let pb = spinner("Waiting for authorization in the browser...");
            let result = backend
                .try_update_client_credentials(&opt.client_id, &opt.port)
                .await;
            pb.finish_and_clear();
            result.map(|_| success!("Authenticated"))
        }
        Command::Reauth(opt) => backend
            .try_reauthenticate(&opt.client_id, &opt.port)
            .await
            .map(|_| success!("Cached token accepted")),
        Command::Status => {
            if backend.is_authenticated().await {
                success!("Authenticated");
                prime_cache(&backend).await;
                match backend.get_playback() {
                    Some(playback) => info!("{}", describe(&playback)),
                    None => info!("Nothing playing"),
                }
                if let Some(name) = backend.get_active_device_name() {
                    info!("Active device: {}", name);
                }
            } else {
                warning!("Not authenticated");
            }
            Ok(())
        }
        Command::Devices => {
            require_auth(&backend).await;
            prime_cache(&backend).await;
            let rows: Vec<DeviceTableRow> = backend.get_devices().iter().map(Into::into).collect();
            if rows.is_empty() {
                warning!("No devices available. Open Spotify on one of your devices.");
            } else {
                println!("{}", Table::new(rows));
            }
            Ok(())
        }
        Command::Daemon => {
            require_auth(&backend).await;
            run_daemon(backend).await;
            Ok(())
        }
        command => {
            require_auth(&backend).await;
            prime_cache(&backend).await;
            run_command(&backend, command).await
        }
    };

    if let Err(e) = result {
        error!("{}", e);
    }
}

async fn run_command(backend: &Arc<Backend>, command: Command) -> spotdeck::error::Result<()> {
    let explicit = match &command {
        Command::Play(t) | Command::Pause(t) | Command::Toggle(t) | Command::Next(t) | Command::Previous(t) => {
            t.device.clone()
        }
        Command::Volume(o) => o.target.device.clone(),
        Command::Shuffle(o) => o.target.device.clone(),
        Command::Repeat(o) => o.target.device.clone(),
        Command::Seek(o) => o.target.device.clone(),
        _ => None,
    };
    let device = explicit.as_deref();

    if device.is_none() && backend.get_active_device_id().is_none() {
        warning!("No active device, command skipped");
        return Ok(());
    }

    match command {
        Command::Play(_) => backend.play(device).await,
        Command::Pause(_) => backend.pause(device).await,
        Command::Toggle(_) => backend.toggle_playback(device).await,
        Command::Next(_) => backend.next_track(device).await,
        Command::Previous(_) => backend.previous_track(device).await,
        Command::Volume(o) => backend
            .set_volume(o.percent, device)
            .await
            .map(|_| success!("Volume set to {}%", o.percent)),
        Command::Shuffle(o) => backend.shuffle(matches!(o.state, Switch::On), device).await,
        Command::Repeat(o) => backend.repeat(o.mode, device).await,
        Command::Seek(o) => backend.seek(o.position_ms, device).await,
        _ => Ok(()),
    }
}
