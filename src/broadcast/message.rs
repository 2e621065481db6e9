// src/broadcast/message.rs

use std::fmt;

use serde::Serialize;

/// Severity / origin label carried by every broadcast line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Info,
    BuildError,
    RuntimeOutput,
    RuntimeError,
    Lifecycle,
}

impl Category {
    /// Prefix put in front of every rendered line of this category.
    pub fn prefix(self) -> &'static str {
        match self {
            Category::Info | Category::Lifecycle => "",
            Category::BuildError => "[build error] ",
            Category::RuntimeOutput => "[runtime] ",
            Category::RuntimeError => "[runtime error] ",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Info => "info",
            Category::BuildError => "build-error",
            Category::RuntimeOutput => "runtime-output",
            Category::RuntimeError => "runtime-error",
            Category::Lifecycle => "lifecycle",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable block of text published to every connected viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    category: Category,
    text: String,
}

impl BroadcastMessage {
    pub fn new(category: Category, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Category::Info, text)
    }

    pub fn lifecycle(text: impl Into<String>) -> Self {
        Self::new(Category::Lifecycle, text)
    }

    pub fn build_error(text: impl Into<String>) -> Self {
        Self::new(Category::BuildError, text)
    }

    pub fn runtime_output(text: impl Into<String>) -> Self {
        Self::new(Category::RuntimeOutput, text)
    }

    pub fn runtime_error(text: impl Into<String>) -> Self {
        Self::new(Category::RuntimeError, text)
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Split into individually deliverable lines, preserving order.
    ///
    /// `\r\n`, `\n` and a lone `\r` each terminate a line, so no line ever
    /// carries a carriage return into an SSE frame. A trailing terminator does
    /// not produce an extra empty line. An empty message is one empty line.
    pub fn lines(&self) -> Vec<Line> {
        let normalized = self.text.replace("\r\n", "\n").replace('\r', "\n");
        let mut lines: Vec<Line> = normalized
            .split('\n')
            .map(|l| Line {
                category: self.category,
                text: l.to_string(),
            })
            .collect();

        if lines.len() > 1 && normalized.ends_with('\n') {
            lines.pop();
        }
        lines
    }
}

/// One delivered line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub category: Category,
    pub text: String,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.category.prefix(), self.text)
    }
}
