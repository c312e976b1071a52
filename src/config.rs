use std::path::Path;

use serde::Deserialize;

use crate::channel::ChannelConfig;
use crate::error::ConfigError;
use crate::params::ParameterDefs;
use crate::playback::AudioConfig;
use crate::surface::SurfaceGeometry;
use crate::telemetry::TelemetryConfig;

pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:8765";
pub const FALLBACK_LAYOUT: &str = "english";

/// Keyboard layouts the front-end knows by name.
pub const KNOWN_LAYOUTS: &[&str] = &[
    "arabic", "czech", "english", "farsi", "french", "georgian", "german", "greek", "hebrew",
    "hindi", "italian", "japanese", "korean", "norwegian", "polish", "russian", "spanish",
    "swedish", "thai", "turkish", "ukrainian", "urdu",
];

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(alias = "socketUrl")]
    pub socket_url: String,
    #[serde(alias = "keyboardLayout")]
    pub keyboard_layout: Option<String>,
    #[serde(alias = "ttsParams")]
    pub tts_params: ParameterDefs,
    pub animation: AnimationConfig,
    pub surface: SurfaceGeometry,
    pub telemetry: TelemetryConfig,
    pub channel: ChannelConfig,
    pub audio: AudioConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            keyboard_layout: None,
            tts_params: ParameterDefs::default(),
            animation: AnimationConfig::default(),
            surface: SurfaceGeometry::default(),
            telemetry: TelemetryConfig::default(),
            channel: ChannelConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub enabled: bool,
    pub eased_rate: f64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        AnimationConfig {
            enabled: true,
            eased_rate: crate::animator::EASED_RATE,
        }
    }
}

impl Config {
    /// Keyboard layout to use. Unknown or missing names fall back to `english`.
    pub fn layout(&self) -> &str {
        match self.keyboard_layout.as_deref() {
            None => FALLBACK_LAYOUT,
            Some(name) => match KNOWN_LAYOUTS.iter().find(|l| l.eq_ignore_ascii_case(name)) {
                Some(known) => known,
                None => {
                    log::warn!("Unknown keyboard layout '{name}', using {FALLBACK_LAYOUT}");
                    FALLBACK_LAYOUT
                }
            },
        }
    }
}

/// Load a config file. `.json` files are read as JSON, anything else as TOML.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let extension = path.extension().unwrap_or_default();
    let parsed = if extension.eq_ignore_ascii_case("json") {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    } else {
        toml::from_str(&content).map_err(|e| e.to_string())
    };
    let config: Config = parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })?;

    if SurfaceGeometry::new(config.surface.size, config.surface.margin).is_none() {
        return Err(ConfigError::Parse {
            path: path.to_path_buf(),
            message: format!(
                "surface size {} with margin {} leaves no clickable area",
                config.surface.size, config.surface.margin
            ),
        });
    }
    if config.tts_params.is_empty() {
        log::warn!("{} defines no tts_params, there is nothing to tune", path.display());
    }
    log::info!(
        "Loaded config {} ({} parameter(s))",
        path.display(),
        config.tts_params.len()
    );
    Ok(config)
}
