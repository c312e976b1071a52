/// Layout names toggled by `{shift}` and `{lock}`.
pub const DEFAULT_LAYOUT: &str = "default";
pub const SHIFT_LAYOUT: &str = "shift";

/// Text being composed on the virtual keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composer {
    text: String,
    layout_name: &'static str,
}

impl Default for Composer {
    fn default() -> Self {
        Composer {
            text: String::new(),
            layout_name: DEFAULT_LAYOUT,
        }
    }
}

impl Composer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn layout_name(&self) -> &'static str {
        self.layout_name
    }

    /// Apply one keyboard button. Returns `true` if the text changed.
    ///
    /// Single characters append. `{...}` tokens are control buttons; the ones
    /// not handled here leave the text alone.
    pub fn press(&mut self, button: &str) -> bool {
        match button {
            "{shift}" | "{lock}" => {
                self.layout_name = if self.layout_name == DEFAULT_LAYOUT {
                    SHIFT_LAYOUT
                } else {
                    DEFAULT_LAYOUT
                };
                false
            }
            "{bksp}" => self.text.pop().is_some(),
            "{space}" => {
                self.text.push(' ');
                true
            }
            "{tab}" => {
                self.text.push('\t');
                true
            }
            "" => false,
            b if b.starts_with('{') && b.ends_with('}') && b.len() > 1 => false,
            b => {
                self.text.push_str(b);
                true
            }
        }
    }

    /// Append a suggestion as a whole word followed by a space.
    pub fn add_suggestion(&mut self, suggestion: &str) {
        if !self.text.is_empty() && !self.text.ends_with(' ') {
            self.text.push(' ');
        }
        self.text.push_str(suggestion);
        self.text.push(' ');
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}
