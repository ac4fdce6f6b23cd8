//! Stage-progress logging over the `log` facade.
//!
//! Every pipeline stage reports through these helpers so the console output
//! keeps one shape: indent, level marker, message. The binary decides where
//! the records go (`env_logger`); tests simply drop them.

use serde::{Deserialize, Serialize};

/// Level shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    fn marker(self) -> &'static str {
        match self {
            LogLevel::Info => "  ",
            LogLevel::Success => "✓ ",
            LogLevel::Warning => "⚠️ ",
            LogLevel::Error => "❌",
        }
    }

    fn level(self) -> log::Level {
        match self {
            LogLevel::Info | LogLevel::Success => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting depth under the current stage
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    /// Rendered line, without the level prefix added by the logger.
    pub fn render(&self) -> String {
        format!(
            "{}{} {}",
            "   ".repeat(self.indent as usize),
            self.level.marker(),
            self.message
        )
    }

    pub fn emit(&self) {
        log::log!(target: "tpr_report", self.level.level(), "{}", self.render());
    }
}

pub fn log_info(msg: impl Into<String>) {
    LogEntry::info(msg).emit();
}

pub fn log_success(msg: impl Into<String>) {
    LogEntry::success(msg).emit();
}

pub fn log_warning(msg: impl Into<String>) {
    LogEntry::warning(msg).emit();
}

pub fn log_error(msg: impl Into<String>) {
    LogEntry::error(msg).emit();
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    LogEntry::info(msg).with_indent(indent).emit();
}

pub fn log_success_indent(msg: impl Into<String>, indent: u8) {
    LogEntry::success(msg).with_indent(indent).emit();
}
