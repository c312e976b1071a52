use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Widget;

/// A square two-axis control surface drawn in a terminal rectangle.
///
/// Positions are fractions of the whole area: `(0, 0)` is the top-left
/// corner and `(1, 1)` the bottom-right. The band within `margin` of the
/// edge is drawn dimmed; clicks there are not meant to register.
pub struct Surface<'a> {
    cursor: (f64, f64),
    target: Option<(f64, f64)>,
    margin: f64,
    x_label: &'a str,
    y_label: &'a str,
    style: Style,
    margin_style: Style,
    cursor_style: Style,
    target_style: Style,
}

impl<'a> Surface<'a> {
    pub fn new(cursor: (f64, f64)) -> Self {
        Self {
            cursor,
            target: None,
            margin: 0.0,
            x_label: "",
            y_label: "",
            style: Style::default().fg(Color::DarkGray),
            margin_style: Style::default().fg(Color::Black).bg(Color::Black),
            cursor_style: Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
            target_style: Style::default().fg(Color::Cyan),
        }
    }

    /// Where the cursor is heading, drawn until the cursor gets there.
    pub fn target(mut self, target: (f64, f64)) -> Self {
        self.target = Some(target);
        self
    }

    /// Dead band as a fraction of the side length.
    pub fn margin(mut self, margin: f64) -> Self {
        self.margin = margin.clamp(0.0, 0.5);
        self
    }

    pub fn labels(mut self, x_label: &'a str, y_label: &'a str) -> Self {
        self.x_label = x_label;
        self.y_label = y_label;
        self
    }

    /// Hit-test: fractional position of a click at (x, y) inside `area`,
    /// measured at the cell centre.
    pub fn fraction_at(x: u16, y: u16, area: Rect) -> Option<(f64, f64)> {
        if area.width == 0 || area.height == 0 || !area.contains((x, y).into()) {
            return None;
        }
        let fx = (f64::from(x - area.x) + 0.5) / f64::from(area.width);
        let fy = (f64::from(y - area.y) + 0.5) / f64::from(area.height);
        Some((fx, fy))
    }

    fn cell_for(fraction: (f64, f64), area: Rect) -> (u16, u16) {
        let col = (fraction.0.clamp(0.0, 1.0) * f64::from(area.width)) as u16;
        let row = (fraction.1.clamp(0.0, 1.0) * f64::from(area.height)) as u16;
        (
            area.x + col.min(area.width - 1),
            area.y + row.min(area.height - 1),
        )
    }
}

impl Widget for Surface<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }

        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                let Some((fx, fy)) = Self::fraction_at(x, y, area) else {
                    continue;
                };
                let inside = (self.margin..=1.0 - self.margin).contains(&fx)
                    && (self.margin..=1.0 - self.margin).contains(&fy);
                if let Some(cell) = buf.cell_mut((x, y)) {
                    if inside {
                        cell.set_char('·');
                        cell.set_style(self.style);
                    } else {
                        cell.set_char(' ');
                        cell.set_style(self.margin_style);
                    }
                }
            }
        }

        let (cx, cy) = Self::cell_for(self.cursor, area);

        // Crosshair through the cursor.
        for x in area.left()..area.right() {
            if let Some(cell) = buf.cell_mut((x, cy)) {
                cell.set_char('─');
                cell.set_style(self.style);
            }
        }
        for y in area.top()..area.bottom() {
            if let Some(cell) = buf.cell_mut((cx, y)) {
                cell.set_char('│');
                cell.set_style(self.style);
            }
        }

        if let Some(target) = self.target {
            let (tx, ty) = Self::cell_for(target, area);
            if (tx, ty) != (cx, cy) {
                if let Some(cell) = buf.cell_mut((tx, ty)) {
                    cell.set_char('○');
                    cell.set_style(self.target_style);
                }
            }
        }

        if let Some(cell) = buf.cell_mut((cx, cy)) {
            cell.set_char('●');
            cell.set_style(self.cursor_style);
        }

        // Axis labels: X along the bottom row, Y down the left column.
        let bottom = area.bottom() - 1;
        let start = area.right().saturating_sub(self.x_label.chars().count() as u16);
        for (i, ch) in self.x_label.chars().enumerate() {
            if let Some(cell) = buf.cell_mut((start.max(area.x) + i as u16, bottom)) {
                cell.set_char(ch);
                cell.set_style(self.style);
            }
        }
        for (i, ch) in self.y_label.chars().take(area.height as usize).enumerate() {
            if let Some(cell) = buf.cell_mut((area.x, area.y + i as u16)) {
                cell.set_char(ch);
                cell.set_style(self.style);
            }
        }
    }
}
