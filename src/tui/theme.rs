use ratatui::style::{Color, Modifier, Style};

/// Colors for the TUI
#[derive(Debug, Clone)]
pub struct Theme {
    pub background: Color,
    pub text: Color,
    pub text_bright: Color,
    pub highlight: Color,
    pub dim: Color,
    pub red: Color,
    pub yellow: Color,
    pub green: Color,
    pub selection_bg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            background: Color::Rgb(0x0C, 0x00, 0x1B),
            text: Color::Rgb(0xB0, 0xAA, 0xFF),
            text_bright: Color::Rgb(0xFF, 0xFF, 0xFF),
            highlight: Color::Rgb(0xFB, 0x41, 0x96),
            dim: Color::Rgb(0x7D, 0x78, 0xBF),
            red: Color::Rgb(0xFF, 0x44, 0x44),
            yellow: Color::Rgb(0xFF, 0xD7, 0x00),
            green: Color::Rgb(0x44, 0xFF, 0x88),
            selection_bg: Color::Rgb(0x3D, 0x14, 0x38),
        }
    }
}

impl Theme {
    pub fn base(&self) -> Style {
        Style::default().fg(self.text).bg(self.background)
    }

    /// Style for a task row
    pub fn todo_style(&self, completed: bool, selected: bool) -> Style {
        let mut style = self.base();
        if completed {
            style = style.fg(self.dim).add_modifier(Modifier::CROSSED_OUT);
        }
        if selected {
            style = style.bg(self.selection_bg);
            if !completed {
                style = style.fg(self.text_bright);
            }
        }
        style
    }

    /// Color of the connectivity indicator; `None` means not checked yet
    pub fn connection_color(&self, online: Option<bool>) -> Color {
        match online {
            Some(true) => self.green,
            Some(false) => self.red,
            None => self.dim,
        }
    }
}
