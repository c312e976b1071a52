mod animator;
mod channel;
mod cli;
mod compose;
mod config;
mod error;
mod params;
mod playback;
mod protocol;
mod recording;
mod scheduler;
mod session;
mod surface;
mod telemetry;
mod tui;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use clap::Parser;
use cli::{Cli, Command, RequestKind, RunArgs};

use crate::animator::Animator;
use crate::channel::{ChannelEvent, ConnectionState, ProtocolChannel};
use crate::config::Config;
use crate::params::ParameterSet;
use crate::protocol::{Request, Response, SynthesiseData};
use crate::session::Session;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args),
        Command::Describe { config } => {
            env_logger::init();
            describe(&config)
        }
        Command::Request(kind) => {
            env_logger::init();
            request(kind)
        }
    }
}

/// Logger that appends timestamped lines to a file, so log output never
/// lands on the terminal the interface is drawing to.
struct FileLogger {
    file: Mutex<File>,
}

impl log::Log for FileLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S%.3f");
            let mut file = self.file.lock().unwrap_or_else(|p| p.into_inner());
            let _ = writeln!(
                file,
                "[{now} {}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

static FILE_LOGGER: OnceLock<FileLogger> = OnceLock::new();

fn init_file_logger(path: &Path) -> anyhow::Result<()> {
    let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            anyhow::anyhow!("Failed to open log file {}: {e}", path.display())
        })?;
    let logger = FILE_LOGGER.get_or_init(|| FileLogger {
        file: Mutex::new(file),
    });
    log::set_logger(logger).ok();
    log::set_max_level(
        std::env::var("RUST_LOG")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
    );
    Ok(())
}

fn build_session(config: &Config) -> anyhow::Result<Session> {
    let params = ParameterSet::from_defs(&config.tts_params)?;
    let mut animator = Animator::new(config.animation.eased_rate);
    animator.set_enabled(config.animation.enabled);
    Ok(Session::new(params, config.surface, animator)?)
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    init_file_logger(&args.log_file)?;

    let config = config::load(&args.config)?;
    let session = build_session(&config)?;
    log::info!("Keyboard layout: {}", config.layout());

    let url = args.url.unwrap_or_else(|| config.socket_url.clone());
    tui::run(session, &config, &url)
}

fn describe(path: &Path) -> anyhow::Result<()> {
    let config = config::load(path)?;
    let mut params = ParameterSet::from_defs(&config.tts_params)?;
    let groups = params.group()?;

    println!("{}", path.display());
    println!("  Service:    {}", config.socket_url);
    println!("  Layout:     {}", config.layout());
    let animation = if config.animation.enabled {
        "on"
    } else {
        "off"
    };
    println!(
        "  Animation:  {animation} (rate {})",
        config.animation.eased_rate
    );
    if params.is_empty() {
        println!("  Groups:     none (no tts_params defined)");
        return Ok(());
    }
    println!("  Groups:     {}", groups.len());
    for group in &groups {
        println!("    {}", group.tag);
        for (axis, key) in ["X", "Y"].iter().zip(group.keys()) {
            let Some(p) = params.get(key) else { continue };
            print!(
                "      {axis} {} \"{}\" (min={}, max={}, default={}, value={}{})",
                p.key,
                p.display_name,
                p.min,
                p.max,
                p.default,
                p.value(),
                if p.has_value() { "" } else { " unset" }
            );
            match &p.url_param {
                Some(u) => println!(" url_param={u}"),
                None => println!(),
            }
        }
    }
    Ok(())
}

fn request(kind: RequestKind) -> anyhow::Result<()> {
    let target = kind.target();
    let config = target.config.as_deref().map(config::load).transpose()?;
    let url = target
        .url
        .clone()
        .or_else(|| config.as_ref().map(|c| c.socket_url.clone()))
        .unwrap_or_else(|| config::DEFAULT_SOCKET_URL.to_string());
    let deadline = Instant::now() + Duration::from_secs(target.timeout);

    let request = match kind {
        RequestKind::Predict { text, .. } => Request::Predict { text },
        RequestKind::Autocomplete { input, .. } => Request::Autocomplete { input },
        RequestKind::Synthesise {
            text,
            mood,
            basic,
            ..
        } => {
            let tts_data = match &config {
                Some(config) => {
                    let mut params = ParameterSet::from_defs(&config.tts_params)?;
                    params.group()?;
                    params.values()
                }
                None => BTreeMap::new(),
            };
            Request::Synthesise(SynthesiseData {
                text,
                mood,
                tts_data,
                is_advanced: !basic,
            })
        }
        RequestKind::Transcribe { file, mime, .. } => {
            let bytes = std::fs::read(&file)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", file.display()))?;
            let mime = mime.unwrap_or_else(|| recording::mime_for(&file).to_string());
            log::info!("Sending {} bytes of {mime}", bytes.len());
            Request::AudioData {
                audio: recording::data_url(&mime, &bytes),
            }
        }
    };

    let channel_config = config.map(|c| c.channel).unwrap_or_default();
    let channel = ProtocolChannel::connect(&url, &channel_config)?;

    loop {
        match channel.events().recv_deadline(deadline) {
            Ok(ChannelEvent::State(ConnectionState::Connected)) => break,
            Ok(_) => continue,
            Err(_) => anyhow::bail!("Timed out connecting to {url}"),
        }
    }
    channel.send(&request)?;

    let wanted = request.request_type();
    let response = loop {
        match channel.events().recv_deadline(deadline) {
            Ok(ChannelEvent::Response(r)) if r.request_type() == wanted => break r,
            Ok(ChannelEvent::State(ConnectionState::Disconnected)) => {
                anyhow::bail!("Connection to {url} lost before the reply")
            }
            Ok(_) => continue,
            Err(_) => anyhow::bail!("Timed out waiting for {wanted} reply"),
        }
    };
    channel.shutdown();

    match response {
        Response::Predict { options } | Response::Autocomplete { options } => {
            for option in options {
                println!("{option}");
            }
        }
        Response::Synthesise { audio_url } => println!("{audio_url}"),
        Response::AudioData { transcription } => println!("{transcription}"),
        Response::Event(data) => println!("{data}"),
    }
    Ok(())
}
