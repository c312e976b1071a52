use std::io;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event as TermEvent, KeyCode, KeyEventKind,
    KeyModifiers, MouseButton, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use view::{ButtonRow, Surface, TextLine};

use crate::animator::{Point, TICK_PERIOD};
use crate::channel::{ChannelEvent, ConnectionState, ProtocolChannel};
use crate::config::Config;
use crate::playback::Player;
use crate::protocol::Mood;
use crate::recording::Recorder;
use crate::scheduler::{Scheduler, TimerKind};
use crate::session::{COMPLETION_SLOTS, Effect, Event, Session};
use crate::telemetry::PointerTracker;

const MAX_POLL: Duration = Duration::from_millis(100);
const SUGGESTION_SEP: &str = " ";
const HELP: &str = concat!(
    "Enter predict │ F1-F3 speak │ F5-F7 mood │ Alt+1-9 suggestion │ ",
    "^L clear │ ^S shift │ ^A animation │ ^V advanced │ ^R record │ ^Q quit",
);

/// What a key press asks for.
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Quit,
    Session(Event),
    CycleMood(usize),
}

/// Screen regions from the last frame, for mouse hit-testing.
#[derive(Default)]
struct Areas {
    suggestions: Rect,
    completions: Rect,
    surfaces: Vec<(String, Rect)>,
}

struct App {
    channel: ProtocolChannel,
    player: Player,
    recorder: Recorder,
    tracker: PointerTracker,
    scheduler: Scheduler,
    areas: Areas,
    /// Last pointer position, for hover highlighting.
    hover: Option<(u16, u16)>,
    quit: bool,
}

pub fn run(session: Session, config: &Config, url: &str) -> anyhow::Result<()> {
    let channel = ProtocolChannel::connect(url, &config.channel)?;
    let now = Instant::now();
    let mut scheduler = Scheduler::new();
    scheduler.add(TimerKind::Animation, TICK_PERIOD, now);
    scheduler.add(
        TimerKind::Flush,
        Duration::from_millis(config.telemetry.flush_interval_ms),
        now,
    );

    let mut app = App {
        channel,
        player: Player::new(&config.audio),
        recorder: Recorder::new(&config.audio),
        tracker: PointerTracker::from_config(&config.telemetry, now),
        scheduler,
        areas: Areas::default(),
        hover: None,
        quit: false,
    };

    // Set up terminal.
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    log::info!("Interface started, service at {url}");
    let result = event_loop(&mut terminal, &mut app, session);

    app.shutdown();

    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    crossterm::terminal::disable_raw_mode()?;

    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    mut session: Session,
) -> anyhow::Result<()> {
    loop {
        while let Ok(ev) = app.channel.events().try_recv() {
            let event = match ev {
                ChannelEvent::State(state) => Event::Connection(state),
                ChannelEvent::Response(response) => Event::Response(response),
            };
            session = app.dispatch(session, event);
        }

        while let Ok(done) = app.player.completions().try_recv() {
            log::debug!("Finished playing {}", done.url);
            session = app.dispatch(session, Event::PlaybackFinished);
        }

        while let Ok(audio) = app.recorder.segments().try_recv() {
            session = app.dispatch(session, Event::AudioReady(audio));
        }

        for kind in app.scheduler.poll(Instant::now()) {
            match kind {
                TimerKind::Animation => {
                    if !session.is_settled() {
                        session = app.dispatch(session, Event::AnimationTick);
                    }
                }
                TimerKind::Flush => app.flush_telemetry(),
            }
        }

        terminal.draw(|frame| render(frame, &session, &mut app.areas, app.hover))?;
        if app.quit {
            break;
        }

        // Sleep until input or the next timer, whichever comes first.
        let timeout = app
            .scheduler
            .until_next(Instant::now())
            .unwrap_or(MAX_POLL)
            .min(MAX_POLL);
        if !event::poll(timeout)? {
            continue;
        }
        session = app.process_event(session, event::read()?);
        while event::poll(Duration::ZERO)? {
            session = app.process_event(session, event::read()?);
        }
    }
    Ok(())
}

impl App {
    /// Run `event` through the session and carry out its effects.
    fn dispatch(&mut self, session: Session, event: Event) -> Session {
        let (mut session, effects) = session.update(event, Utc::now());
        for effect in effects {
            match effect {
                Effect::Send(request) => {
                    if let Err(e) = self.channel.send(&request) {
                        log::debug!("Dropped {} request: {e}", request.request_type());
                    }
                }
                Effect::Play(url) => {
                    if let Err(e) = self.player.play(&url) {
                        log::warn!("{e}");
                        session = session.update(Event::PlaybackFinished, Utc::now()).0;
                    }
                }
                Effect::Record(true) => {
                    if let Err(e) = self.recorder.start() {
                        log::warn!("{e}");
                    }
                }
                Effect::Record(false) => self.recorder.stop(),
            }
        }
        session
    }

    fn flush_telemetry(&self) {
        if let Some(request) = self.tracker.batcher().flush(Utc::now()) {
            if let Err(e) = self.channel.send(&request) {
                log::debug!("Dropped pointer batch: {e}");
            }
        }
    }

    fn process_event(&mut self, session: Session, ev: TermEvent) -> Session {
        match ev {
            TermEvent::Key(key) if key.kind == KeyEventKind::Press => {
                match action_for(key.code, key.modifiers) {
                    Some(Action::Quit) => {
                        self.quit = true;
                        session
                    }
                    Some(Action::Session(event)) => self.dispatch(session, event),
                    Some(Action::CycleMood(i)) => match session.completions().get(i) {
                        Some(c) => {
                            let mood = next_mood(c.mood);
                            self.dispatch(session, Event::SetMood(i, mood))
                        }
                        None => session,
                    },
                    None => session,
                }
            }
            TermEvent::Mouse(mouse) => {
                self.handle_mouse(session, mouse.kind, mouse.column, mouse.row)
            }
            _ => session,
        }
    }

    fn handle_mouse(&mut self, session: Session, kind: MouseEventKind, x: u16, y: u16) -> Session {
        match kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let labels: Vec<&str> = session.suggestions().iter().map(String::as_str).collect();
                if let Some(i) =
                    ButtonRow::button_at(x, y, self.areas.suggestions, &labels, SUGGESTION_SEP)
                {
                    return self.dispatch(session, Event::AddSuggestion(i));
                }

                if self.areas.completions.contains((x, y).into()) {
                    let row = (y - self.areas.completions.y) as usize;
                    return self.dispatch(session, Event::Speak(row));
                }

                let size = session.geometry().size;
                let hit = self.areas.surfaces.iter().find_map(|(tag, area)| {
                    Surface::fraction_at(x, y, *area).map(|f| (tag.clone(), surface_point(f, size)))
                });
                match hit {
                    Some((group, position)) => {
                        self.dispatch(session, Event::SurfaceClick { group, position })
                    }
                    None => session,
                }
            }
            MouseEventKind::Moved | MouseEventKind::Drag(_) => {
                self.hover = Some((x, y));
                self.tracker
                    .record(Instant::now(), Utc::now(), f64::from(x), f64::from(y));
                session
            }
            _ => session,
        }
    }

    fn shutdown(mut self) {
        self.scheduler.cancel_all();
        self.player.stop();
        self.recorder.stop();
        self.channel.shutdown();
    }
}

fn action_for(code: KeyCode, modifiers: KeyModifiers) -> Option<Action> {
    if modifiers.contains(KeyModifiers::CONTROL) {
        return match code {
            KeyCode::Char('c') | KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('l') => Some(Action::Session(Event::Clear)),
            KeyCode::Char('s') => Some(Action::Session(Event::Key("{shift}".into()))),
            KeyCode::Char('a') => Some(Action::Session(Event::ToggleAnimation)),
            KeyCode::Char('v') => Some(Action::Session(Event::ToggleAdvanced)),
            KeyCode::Char('r') => Some(Action::Session(Event::ToggleRecording)),
            _ => None,
        };
    }
    if modifiers.contains(KeyModifiers::ALT) {
        return match code {
            KeyCode::Char(c @ '1'..='9') => Some(Action::Session(Event::AddSuggestion(
                c as usize - '1' as usize,
            ))),
            _ => None,
        };
    }

    let button = match code {
        KeyCode::Esc => return Some(Action::Quit),
        KeyCode::Enter => return Some(Action::Session(Event::Predict)),
        KeyCode::F(n @ 1..=3) => return Some(Action::Session(Event::Speak(usize::from(n - 1)))),
        KeyCode::F(n @ 5..=7) => return Some(Action::CycleMood(usize::from(n - 5))),
        KeyCode::Backspace => "{bksp}".to_string(),
        KeyCode::Tab => "{tab}".to_string(),
        KeyCode::Char(' ') => "{space}".to_string(),
        KeyCode::Char(c) => c.to_string(),
        _ => return None,
    };
    Some(Action::Session(Event::Key(button)))
}

fn next_mood(mood: Mood) -> Mood {
    match mood {
        Mood::Conversation => Mood::Mixed,
        Mood::Mixed => Mood::Reading,
        Mood::Reading => Mood::Conversation,
    }
}

/// Surface pixel for a fractional position inside the surface widget.
fn surface_point(fraction: (f64, f64), size: f64) -> Point {
    Point::new(fraction.0 * size, fraction.1 * size)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(frame: &mut ratatui::Frame, s: &Session, areas: &mut Areas, hover: Option<(u16, u16)>) {
    let [
        status_area,
        text_area,
        suggestion_area,
        completion_area,
        transcript_area,
        surface_area,
        help_area,
    ] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Length(COMPLETION_SLOTS as u16 + 2),
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_status(frame, status_area, s);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Text ({}) ", s.layout_name()));
    let inner = block.inner(text_area);
    frame.render_widget(block, text_area);
    frame.render_widget(
        TextLine::new(s.text()).placeholder("type, or press Enter for phrases"),
        inner,
    );

    let labels: Vec<&str> = s.suggestions().iter().map(String::as_str).collect();
    let hovered = hover.and_then(|(x, y)| {
        ButtonRow::button_at(x, y, suggestion_area, &labels, SUGGESTION_SEP)
    });
    frame.render_widget(
        ButtonRow::new(&labels)
            .separator(SUGGESTION_SEP)
            .highlighted(hovered),
        suggestion_area,
    );
    areas.suggestions = suggestion_area;

    areas.completions = render_completions(frame, completion_area, s);

    let heard = if s.transcription().is_empty() {
        Line::from(Span::styled("(nothing recorded)", Style::default().fg(Color::DarkGray)))
    } else {
        Line::from(vec![Span::raw("Heard: "), Span::raw(s.transcription())])
    };
    frame.render_widget(Paragraph::new(heard), transcript_area);

    areas.surfaces = render_surfaces(frame, surface_area, s);

    frame.render_widget(
        Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
        help_area,
    );
}

fn render_status(frame: &mut ratatui::Frame, area: Rect, s: &Session) {
    let (label, color) = match s.connection() {
        ConnectionState::Connected => ("connected", Color::Green),
        ConnectionState::Connecting => ("connecting", Color::Yellow),
        ConnectionState::Disconnected => ("disconnected", Color::Red),
    };
    let flag = |on: bool, name: &'static str| {
        let style = if on {
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Span::styled(format!("  {name}"), style)
    };
    let mut spans = vec![
        Span::styled(label, Style::default().fg(color)),
        flag(s.animator().is_enabled(), "animation"),
        flag(s.is_advanced(), "advanced"),
        flag(s.is_recording(), "recording"),
    ];
    if s.is_audio_playing() {
        spans.push(Span::styled("  ♪ playing", Style::default().fg(Color::Cyan)));
    }
    if let Some(last) = s.last_interaction() {
        spans.push(Span::styled(
            format!("  last: {} (+{} ms)", last.button, last.time_since_ms),
            Style::default().fg(Color::DarkGray),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Returns the inner area, one row per completion slot.
fn render_completions(frame: &mut ratatui::Frame, area: Rect, s: &Session) -> Rect {
    let block = Block::default().borders(Borders::ALL).title(" Phrases ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines: Vec<Line> = s
        .completions()
        .iter()
        .enumerate()
        .map(|(i, c)| {
            Line::from(vec![
                Span::styled(
                    format!(" F{} ", i + 1),
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::DarkGray)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!(" {:<12} ", c.mood.as_str()),
                    Style::default().fg(Color::Cyan),
                ),
                Span::raw(c.text.as_str()),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
    inner
}

fn render_surfaces(frame: &mut ratatui::Frame, area: Rect, s: &Session) -> Vec<(String, Rect)> {
    let groups = s.groups();
    if groups.is_empty() || area.height < 3 {
        return Vec::new();
    }
    let columns = Layout::horizontal(vec![Constraint::Fill(1); groups.len()]).split(area);
    let geometry = s.geometry();

    let mut hit_areas = Vec::with_capacity(groups.len());
    for (group, column) in groups.iter().zip(columns.iter()) {
        let Some(state) = s.animator().get(&group.tag) else {
            continue;
        };
        let name = |key: &str| {
            s.params()
                .get(key)
                .map_or(key.to_string(), |p| p.display_name.clone())
        };
        let (x_name, y_name) = (name(&group.x), name(&group.y));

        let block = Block::default().borders(Borders::ALL).title(format!(
            " {x_name} {:.2} │ {y_name} {:.2} ",
            state.current_values[0], state.current_values[1]
        ));
        let inner = block.inner(*column);
        frame.render_widget(block, *column);

        let fraction = |p: Point| (p.x / geometry.size, p.y / geometry.size);
        frame.render_widget(
            Surface::new(fraction(state.current_position))
                .target(fraction(state.target_position))
                .margin(geometry.margin / geometry.size)
                .labels(&x_name, &y_name),
            inner,
        );
        hit_areas.push((group.tag.clone(), inner));
    }
    hit_areas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_keys_map_to_buttons() {
        let key = |code| action_for(code, KeyModifiers::NONE);
        assert_eq!(
            key(KeyCode::Char('a')),
            Some(Action::Session(Event::Key("a".into())))
        );
        assert_eq!(
            key(KeyCode::Char(' ')),
            Some(Action::Session(Event::Key("{space}".into())))
        );
        assert_eq!(
            key(KeyCode::Backspace),
            Some(Action::Session(Event::Key("{bksp}".into())))
        );
        assert_eq!(key(KeyCode::Enter), Some(Action::Session(Event::Predict)));
        assert_eq!(key(KeyCode::F(2)), Some(Action::Session(Event::Speak(1))));
        assert_eq!(key(KeyCode::F(7)), Some(Action::CycleMood(2)));
        assert_eq!(key(KeyCode::F(4)), None);
        assert_eq!(key(KeyCode::Esc), Some(Action::Quit));
    }

    #[test]
    fn modified_keys_map_to_controls() {
        assert_eq!(
            action_for(KeyCode::Char('q'), KeyModifiers::CONTROL),
            Some(Action::Quit)
        );
        assert_eq!(
            action_for(KeyCode::Char('a'), KeyModifiers::CONTROL),
            Some(Action::Session(Event::ToggleAnimation))
        );
        assert_eq!(
            action_for(KeyCode::Char('3'), KeyModifiers::ALT),
            Some(Action::Session(Event::AddSuggestion(2)))
        );
        assert_eq!(action_for(KeyCode::Char('x'), KeyModifiers::ALT), None);
    }

    #[test]
    fn moods_cycle() {
        let mut mood = Mood::Conversation;
        for expected in [Mood::Mixed, Mood::Reading, Mood::Conversation] {
            mood = next_mood(mood);
            assert_eq!(mood, expected);
        }
    }

    #[test]
    fn surface_fraction_scales_to_pixels() {
        assert_eq!(surface_point((0.5, 0.1), 500.0), Point::new(250.0, 50.0));
    }
}
