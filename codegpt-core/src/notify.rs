use std::sync::Mutex;

/// User-facing notifications. Implementations must not block for long; they
/// are called from inside the streaming loop.
pub trait Notifier: Send + Sync {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Routes notifications into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn info(&self, msg: &str) {
        tracing::info!(target: "codegpt::notify", "{msg}");
    }
    fn warn(&self, msg: &str) {
        tracing::warn!(target: "codegpt::notify", "{msg}");
    }
    fn error(&self, msg: &str) {
        tracing::error!(target: "codegpt::notify", "{msg}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<(Level, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Level, String)> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn count(&self, level: Level) -> usize {
        self.entries().iter().filter(|(l, _)| *l == level).count()
    }

    fn push(&self, level: Level, msg: &str) {
        if let Ok(mut v) = self.seen.lock() {
            v.push((level, msg.to_string()));
        }
    }
}

impl Notifier for RecordingNotifier {
    fn info(&self, msg: &str) {
        self.push(Level::Info, msg);
    }
    fn warn(&self, msg: &str) {
        self.push(Level::Warn, msg);
    }
    fn error(&self, msg: &str) {
        self.push(Level::Error, msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_keeps_order_and_levels() {
        let n = RecordingNotifier::new();
        n.info("a");
        n.error("b");
        n.warn("c");
        assert_eq!(
            n.entries(),
            vec![
                (Level::Info, "a".to_string()),
                (Level::Error, "b".to_string()),
                (Level::Warn, "c".to_string())
            ]
        );
        assert_eq!(n.count(Level::Error), 1);
    }
}
