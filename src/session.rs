use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::json;

use crate::animator::{Animator, Point};
use crate::channel::ConnectionState;
use crate::compose::Composer;
use crate::error::ConfigError;
use crate::params::{ParameterGroup, ParameterSet};
use crate::protocol::{Mood, Request, Response, SynthesiseData};
use crate::surface::{self, SurfaceGeometry};

/// Number of completion slots shown to the user.
pub const COMPLETION_SLOTS: usize = 3;

/// Interaction markers kept; older ones are dropped first.
pub const MAX_INTERACTIONS: usize = 512;

/// Cursor distance, in surface pixels, that counts as arrived.
const SETTLED_PX: f64 = 0.5;
/// Remaining value distance, as a fraction of the parameter's range, that counts as arrived.
const SETTLED_FRACTION: f64 = 1e-3;

/// Something that happened to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A virtual-keyboard button, e.g. `"a"` or `"{bksp}"`.
    Key(String),
    Clear,
    AddSuggestion(usize),
    Predict,
    Speak(usize),
    SetMood(usize, Mood),
    SurfaceClick { group: String, position: Point },
    AnimationTick,
    ToggleAnimation,
    ToggleAdvanced,
    ToggleRecording,
    /// A recorded segment, as a base64 data URL.
    AudioReady(String),
    Response(Response),
    PlaybackFinished,
    Connection(ConnectionState),
}

/// Work for the caller to carry out after an update.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(Request),
    Play(String),
    /// Start (`true`) or stop the audio recorder.
    Record(bool),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub mood: Mood,
}

/// Marker recorded for each user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    /// Milliseconds since the previous marker; 0 for the first.
    pub time_since_ms: i64,
    pub button: String,
}

/// Everything the front-end shows, updated only through [`Session::update`].
#[derive(Debug, Clone)]
pub struct Session {
    params: ParameterSet,
    groups: Vec<ParameterGroup>,
    animator: Animator,
    geometry: SurfaceGeometry,
    composer: Composer,
    completions: [Completion; COMPLETION_SLOTS],
    suggestions: Vec<String>,
    transcription: String,
    audio_playing: bool,
    advanced: bool,
    recording: bool,
    connection: ConnectionState,
    interactions: Vec<Interaction>,
    last_interaction: Option<DateTime<Utc>>,
    rng: StdRng,
}

impl Session {
    /// Group `params` and place every group's cursor from the current values.
    pub fn new(
        mut params: ParameterSet,
        geometry: SurfaceGeometry,
        mut animator: Animator,
    ) -> Result<Self, ConfigError> {
        let groups = params.group()?;
        for group in &groups {
            if let Some(state) = surface::initial_state(&geometry, group, &params) {
                animator.insert(&group.tag, state);
            }
        }
        log::info!(
            "Session ready: {} parameter(s) in {} group(s)",
            params.len(),
            groups.len()
        );

        Ok(Session {
            params,
            groups,
            animator,
            geometry,
            composer: Composer::default(),
            completions: Default::default(),
            suggestions: Vec::new(),
            transcription: String::new(),
            audio_playing: false,
            advanced: true,
            recording: false,
            connection: ConnectionState::Disconnected,
            interactions: Vec::new(),
            last_interaction: None,
            rng: StdRng::from_entropy(),
        })
    }

    /// Fix the mood generator, for reproducible runs.
    #[cfg(test)]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn update(mut self, event: Event, at: DateTime<Utc>) -> (Self, Vec<Effect>) {
        let mut effects = Vec::new();
        match event {
            Event::Key(button) => self.press(button, at, &mut effects),
            Event::Clear => {
                self.composer.clear();
                self.mark("CLEAR", at);
                effects.push(telemetry("button_click", json!({"button": "Clear"}), at));
            }
            Event::AddSuggestion(i) => {
                let Some(suggestion) = self.suggestions.get(i).cloned() else {
                    log::debug!("No suggestion in slot {i}");
                    return (self, effects);
                };
                self.mark(&suggestion, at);
                effects.push(telemetry(
                    "button_click",
                    json!({"button": "Suggestion", "suggestion": suggestion}),
                    at,
                ));
                self.composer.add_suggestion(&suggestion);
                effects.push(Effect::Send(Request::Autocomplete {
                    input: self.composer.text().to_string(),
                }));
            }
            Event::Predict => {
                self.mark("PREDICT", at);
                effects.push(Effect::Send(Request::Predict {
                    text: self.composer.text().to_string(),
                }));
                effects.push(telemetry("button_click", json!({"button": "Create"}), at));
            }
            Event::Speak(i) => match self.completions.get(i) {
                Some(c) if !c.text.is_empty() => {
                    effects.push(Effect::Send(Request::Synthesise(SynthesiseData {
                        text: c.text.clone(),
                        mood: c.mood,
                        tts_data: self.params.values(),
                        is_advanced: self.advanced,
                    })));
                }
                _ => log::debug!("Nothing to speak in slot {i}"),
            },
            Event::SetMood(i, mood) => {
                if let Some(c) = self.completions.get_mut(i) {
                    c.mood = mood;
                }
            }
            Event::SurfaceClick { group, position } => {
                self.surface_click(&group, position, at, &mut effects)
            }
            Event::AnimationTick => self.animator.tick(),
            Event::ToggleAnimation => {
                let enabled = !self.animator.is_enabled();
                self.animator.set_enabled(enabled);
                self.mark("AnimationsToggled", at);
                effects.push(telemetry("animation_toggle", json!({"enabled": enabled}), at));
            }
            Event::ToggleAdvanced => self.advanced = !self.advanced,
            Event::ToggleRecording => {
                self.recording = !self.recording;
                effects.push(Effect::Record(self.recording));
            }
            Event::AudioReady(audio) => {
                if self.recording && !self.audio_playing {
                    effects.push(Effect::Send(Request::AudioData { audio }));
                } else {
                    log::debug!("Discarding recorded audio (recording off or playback active)");
                }
            }
            Event::Response(response) => self.dispatch(response, &mut effects),
            Event::PlaybackFinished => self.audio_playing = false,
            Event::Connection(state) => {
                log::info!("Connection {state:?}");
                self.connection = state;
            }
        }
        (self, effects)
    }

    fn press(&mut self, button: String, at: DateTime<Utc>, effects: &mut Vec<Effect>) {
        self.mark(&button, at);
        let changed = self.composer.press(&button);
        effects.push(telemetry("key_press", json!({"button": button}), at));
        if changed {
            let input = self.composer.text().to_string();
            effects.push(telemetry("keyboard_input", json!({"input": input}), at));
            if !input.is_empty() {
                effects.push(Effect::Send(Request::Autocomplete { input }));
            }
        }
    }

    fn surface_click(
        &mut self,
        tag: &str,
        position: Point,
        at: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        let Some(group) = self.groups.iter().find(|g| g.tag == tag) else {
            log::debug!("Click on unknown group '{tag}'");
            return;
        };
        let Some(click) = surface::apply_click(
            &self.geometry,
            group,
            &mut self.params,
            &mut self.animator,
            position,
        ) else {
            return;
        };
        effects.push(telemetry(
            &format!("{tag}_graph_click"),
            json!({
                "x": click.position.x,
                "y": click.position.y,
                "xPercent": click.x_percent,
                "yPercent": click.y_percent,
            }),
            at,
        ));
        self.mark(&format!("{tag}GraphClicked"), at);
    }

    fn dispatch(&mut self, response: Response, effects: &mut Vec<Effect>) {
        match response {
            Response::Predict { options } => {
                if options.len() != COMPLETION_SLOTS {
                    log::warn!(
                        "Expected {COMPLETION_SLOTS} completion options, got {}",
                        options.len()
                    );
                }
                let mut options = options.into_iter();
                for slot in &mut self.completions {
                    slot.text = options.next().unwrap_or_default();
                    slot.mood = Mood::ALL.choose(&mut self.rng).copied().unwrap_or_default();
                }
            }
            Response::Synthesise { audio_url } => {
                self.audio_playing = true;
                effects.push(Effect::Play(audio_url));
            }
            Response::Autocomplete { options } => self.suggestions = options,
            Response::AudioData { transcription } => self.transcription = transcription,
            Response::Event(_) => {}
        }
    }

    /// True once every group is within tolerance of its target and further
    /// ticks would change nothing visible.
    pub fn is_settled(&self) -> bool {
        self.animator.states().all(|(_, state)| {
            let tolerance = state.keys.each_ref().map(|key| {
                self.params
                    .get(key)
                    .map_or(f64::INFINITY, |p| (p.max - p.min) * SETTLED_FRACTION)
            });
            state.is_settled(SETTLED_PX, tolerance)
        })
    }

    fn mark(&mut self, button: &str, at: DateTime<Utc>) {
        let time_since_ms = self
            .last_interaction
            .map_or(0, |last| (at - last).num_milliseconds());
        self.last_interaction = Some(at);
        log::debug!("Marker {button} after {time_since_ms} ms");
        if self.interactions.len() >= MAX_INTERACTIONS {
            self.interactions.remove(0);
        }
        self.interactions.push(Interaction {
            time_since_ms,
            button: button.to_string(),
        });
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn groups(&self) -> &[ParameterGroup] {
        &self.groups
    }

    pub fn animator(&self) -> &Animator {
        &self.animator
    }

    pub fn geometry(&self) -> &SurfaceGeometry {
        &self.geometry
    }

    pub fn text(&self) -> &str {
        self.composer.text()
    }

    pub fn layout_name(&self) -> &str {
        self.composer.layout_name()
    }

    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn transcription(&self) -> &str {
        &self.transcription
    }

    pub fn is_audio_playing(&self) -> bool {
        self.audio_playing
    }

    pub fn is_advanced(&self) -> bool {
        self.advanced
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn last_interaction(&self) -> Option<&Interaction> {
        self.interactions.last()
    }

    #[cfg(test)]
    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }
}

fn telemetry(event_type: &str, data: serde_json::Value, at: DateTime<Utc>) -> Effect {
    Effect::Send(Request::event(event_type, data, at))
}
