use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Widget;

/// A single row of clickable labels, e.g. word suggestions.
///
/// Each label is drawn as ` label ` with a separator between neighbours.
/// Empty labels still take up their padding so positions stay stable.
pub struct ButtonRow<'a> {
    labels: &'a [&'a str],
    highlighted: Option<usize>,
    style: Style,
    highlight_style: Style,
    separator: &'a str,
}

impl<'a> ButtonRow<'a> {
    pub fn new(labels: &'a [&'a str]) -> Self {
        Self {
            labels,
            highlighted: None,
            style: Style::default().fg(Color::Black).bg(Color::DarkGray),
            highlight_style: Style::default()
                .fg(Color::Black)
                .bg(Color::White)
                .add_modifier(Modifier::BOLD),
            separator: " ",
        }
    }

    pub fn highlighted(mut self, index: Option<usize>) -> Self {
        self.highlighted = index;
        self
    }

    pub fn separator(mut self, sep: &'a str) -> Self {
        self.separator = sep;
        self
    }

    /// Hit-test: which label a click at (x, y) landed on.
    /// `area` is the Rect the row was rendered into.
    pub fn button_at(
        x: u16,
        y: u16,
        area: Rect,
        labels: &[&str],
        separator: &str,
    ) -> Option<usize> {
        if y != area.y || x < area.x || x >= area.right() {
            return None;
        }
        let rel_x = (x - area.x) as usize;
        let sep_len = separator.chars().count();
        let mut pos = 0;
        for (i, label) in labels.iter().enumerate() {
            if i > 0 {
                pos += sep_len;
            }
            let len = label.chars().count() + 2;
            if rel_x >= pos && rel_x < pos + len {
                return Some(i);
            }
            pos += len;
        }
        None
    }
}

impl Widget for ButtonRow<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }

        let mut x = area.x;
        let y = area.y;
        let mut put = |x: &mut u16, ch: char, style: Style| {
            if *x < area.right() {
                if let Some(cell) = buf.cell_mut((*x, y)) {
                    cell.set_char(ch);
                    cell.set_style(style);
                }
                *x += 1;
            }
        };

        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                for ch in self.separator.chars() {
                    put(&mut x, ch, Style::default());
                }
            }
            let style = if self.highlighted == Some(i) {
                self.highlight_style
            } else {
                self.style
            };
            put(&mut x, ' ', style);
            for ch in label.chars() {
                put(&mut x, ch, style);
            }
            put(&mut x, ' ', style);
        }
    }
}
