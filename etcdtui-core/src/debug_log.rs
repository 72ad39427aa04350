use std::collections::VecDeque;
use std::time::SystemTime;

/// Entries kept by the in-app debug log.
pub const DEBUG_LOG_CAP: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogRecord {
    pub at: SystemTime,
    pub level: LogLevel,
    pub text: String,
}

/// Ring buffer behind the F1 debug panel.
///
/// Every record is mirrored to `tracing`, so the file log (when enabled)
/// holds the same history.
#[derive(Debug)]
pub struct DebugLog {
    cap: usize,
    records: VecDeque<LogRecord>,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(DEBUG_LOG_CAP)
    }
}

impl DebugLog {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            records: VecDeque::new(),
        }
    }

    pub fn push(&mut self, level: LogLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            LogLevel::Debug => tracing::debug!(target: "etcdtui::ui", "{}", text),
            LogLevel::Info => tracing::info!(target: "etcdtui::ui", "{}", text),
            LogLevel::Warn => tracing::warn!(target: "etcdtui::ui", "{}", text),
            LogLevel::Error => tracing::error!(target: "etcdtui::ui", "{}", text),
        }
        self.records.push_back(LogRecord {
            at: SystemTime::now(),
            level,
            text,
        });
        while self.records.len() > self.cap {
            self.records.pop_front();
        }
    }

    pub fn debug(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Debug, text);
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Info, text);
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Warn, text);
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(LogLevel::Error, text);
    }

    pub fn records(&self) -> &VecDeque<LogRecord> {
        &self.records
    }

    /// The newest `n` records, oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &LogRecord> {
        self.records.iter().skip(self.records.len().saturating_sub(n))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_drops_oldest() {
        let mut log = DebugLog::new(3);
        for i in 0..5 {
            log.info(format!("line {}", i));
        }
        let texts: Vec<_> = log.records().iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_tail() {
        let mut log = DebugLog::default();
        log.debug("a");
        log.warn("b");
        log.error("c");
        let tail: Vec<_> = log.tail(2).map(|r| (r.level, r.text.as_str())).collect();
        assert_eq!(tail, vec![(LogLevel::Warn, "b"), (LogLevel::Error, "c")]);
        assert_eq!(log.tail(10).count(), 3);
    }

    #[test]
    fn test_level_display() {
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
        assert!(LogLevel::Error > LogLevel::Info);
    }
}
