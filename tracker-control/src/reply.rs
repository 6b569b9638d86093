use std::fmt::Display;

/// Text a command produces for the reply mail.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reply {
    lines: Vec<String>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&mut self, message: impl Into<String>) {
        self.lines.push(message.into());
    }

    pub fn warn(&mut self, message: impl Display) {
        self.lines.push(format!("Warning: {message}"));
    }

    pub fn error(&mut self, message: impl Display) {
        self.lines.push(format!("Error: {message}"));
    }

    /// One `* item` line per item.
    pub fn list<I>(&mut self, items: I)
    where
        I: IntoIterator,
        I::Item: Display,
    {
        self.lines
            .extend(items.into_iter().map(|item| format!("* {item}")));
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}
