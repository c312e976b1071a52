pub mod button_row;
pub mod surface;
pub mod text_line;

pub use button_row::ButtonRow;
pub use surface::Surface;
pub use text_line::TextLine;
