use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Widget;

/// Single-line display of text being composed, with a block cursor at the end.
///
/// When the text is wider than the area the tail stays visible.
pub struct TextLine<'a> {
    text: &'a str,
    placeholder: &'a str,
    style: Style,
    placeholder_style: Style,
    cursor_style: Style,
}

impl<'a> TextLine<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            placeholder: "",
            style: Style::default(),
            placeholder_style: Style::default().fg(Color::DarkGray),
            cursor_style: Style::default()
                .fg(Color::Black)
                .bg(Color::White)
                .add_modifier(Modifier::BOLD),
        }
    }

    /// Shown dimmed after the cursor while the text is empty.
    pub fn placeholder(mut self, text: &'a str) -> Self {
        self.placeholder = text;
        self
    }
}

impl Widget for TextLine<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }

        let y = area.y;
        // Leave one column for the cursor.
        let room = area.width.saturating_sub(1) as usize;
        let len = self.text.chars().count();
        let skip = len.saturating_sub(room);

        let mut x = area.x;
        for ch in self.text.chars().skip(skip) {
            let ch = if ch.is_control() { ' ' } else { ch };
            if let Some(cell) = buf.cell_mut((x, y)) {
                cell.set_char(ch);
                cell.set_style(self.style);
            }
            x += 1;
        }

        if let Some(cell) = buf.cell_mut((x, y)) {
            cell.set_char(' ');
            cell.set_style(self.cursor_style);
        }
        x += 1;

        if self.text.is_empty() {
            for ch in self.placeholder.chars() {
                if x >= area.right() {
                    break;
                }
                if let Some(cell) = buf.cell_mut((x, y)) {
                    cell.set_char(ch);
                    cell.set_style(self.placeholder_style);
                }
                x += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(text: &str, width: u16) -> String {
        let area = Rect::new(0, 0, width, 1);
        let mut buf = Buffer::empty(area);
        TextLine::new(text).render(area, &mut buf);
        (0..width).map(|x| buf[(x, 0)].symbol().to_string()).collect()
    }

    #[test]
    fn long_text_keeps_tail_visible() {
        assert_eq!(rendered("hello world", 6), "world ");
        assert_eq!(rendered("hi", 6), "hi    ");
    }

    #[test]
    fn tabs_render_as_spaces() {
        assert_eq!(rendered("a\tb", 4), "a b ");
    }
}
