//! Operator feedback: transient notices and the dashboard log.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use common::events::LogLevel;
use tracing::{error, info, warn};

const MAX_NOTICES: usize = 20;

/// Dashboard log keeps the most recent entries only.
pub const MAX_LOG_LINES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub raised_at: Instant,
}

/// Toast-style notices that dismiss themselves after `ttl`.
#[derive(Debug)]
pub struct Notifier {
    ttl: Duration,
    notices: VecDeque<Notice>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Notifier {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            notices: VecDeque::new(),
        }
    }

    pub fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Success | NoticeLevel::Info => info!(notice = ?level, "{}", message),
            NoticeLevel::Warning => warn!(notice = ?level, "{}", message),
            NoticeLevel::Error => error!(notice = ?level, "{}", message),
        }
        self.notices.push_back(Notice {
            level,
            message,
            raised_at: Instant::now(),
        });
        while self.notices.len() > MAX_NOTICES {
            self.notices.pop_front();
        }
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.notify(NoticeLevel::Success, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.notify(NoticeLevel::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.notify(NoticeLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.notify(NoticeLevel::Error, message);
    }

    /// Notices still on screen at `now`.
    pub fn visible(&self, now: Instant) -> impl Iterator<Item = &Notice> {
        let ttl = self.ttl;
        self.notices
            .iter()
            .filter(move |n| now.saturating_duration_since(n.raised_at) < ttl)
    }

    /// Drops expired notices.
    pub fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.notices
            .retain(|n| now.saturating_duration_since(n.raised_at) < ttl);
    }

    pub fn latest(&self) -> Option<&Notice> {
        self.notices.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

/// Ring buffer behind the dashboard log panel, newest last.
#[derive(Debug, Default)]
pub struct LogBook {
    lines: VecDeque<LogLine>,
}

impl LogBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        if level.is_error() {
            error!(level = %level, "{}", message);
        } else if level == LogLevel::Warning {
            warn!(level = %level, "{}", message);
        } else {
            info!(level = %level, "{}", message);
        }
        self.lines.push_back(LogLine {
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            level,
            message,
        });
        while self.lines.len() > MAX_LOG_LINES {
            self.lines.pop_front();
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn last(&self) -> Option<&LogLine> {
        self.lines.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_expire_after_ttl() {
        let mut notifier = Notifier::new(Duration::from_millis(100));
        notifier.success("saved");
        let raised = notifier.latest().unwrap().raised_at;

        assert_eq!(notifier.visible(raised).count(), 1);
        assert_eq!(notifier.visible(raised + Duration::from_millis(150)).count(), 0);

        notifier.prune(raised + Duration::from_millis(150));
        assert!(notifier.latest().is_none());
    }

    #[test]
    fn notice_queue_is_bounded() {
        let mut notifier = Notifier::default();
        for i in 0..(MAX_NOTICES + 5) {
            notifier.info(format!("notice {}", i));
        }
        assert_eq!(notifier.history().count(), MAX_NOTICES);
        assert_eq!(notifier.latest().unwrap().message, format!("notice {}", MAX_NOTICES + 4));
    }

    #[test]
    fn log_book_keeps_last_hundred() {
        let mut log = LogBook::new();
        for i in 0..150 {
            log.push(LogLevel::Info, format!("line {}", i));
        }
        assert_eq!(log.len(), MAX_LOG_LINES);
        assert_eq!(log.lines().next().unwrap().message, "line 50");
        assert_eq!(log.last().unwrap().message, "line 149");
    }
}
