use log::Level;
use std::sync::{Arc, RwLock};

/// Sink for the diagnostic messages of the capacity model.
///
/// Record level problems (discarded reservations, trimmed hosts, lookup misses) are
/// never returned as errors. They are reported here instead.
pub trait DiagnosticEmitter: std::fmt::Debug + Send + Sync {
    fn emit(&self, level: Level, message: &str);
}

/// Forwards every message to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEmitter;

impl DiagnosticEmitter for LogEmitter {
    fn emit(&self, level: Level, message: &str) {
        log::log!(target: "torque_maui_capacity", level, "{}", message);
    }
}

/// Keeps every message in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmitter {
    messages: Arc<RwLock<Vec<(Level, String)>>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.read().expect("RwLock poisoned").clone()
    }

    /// Returns true if any recorded message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.read().expect("RwLock poisoned").iter().any(|(_, message)| message.contains(needle))
    }
}

impl DiagnosticEmitter for RecordingEmitter {
    fn emit(&self, level: Level, message: &str) {
        self.messages.write().expect("RwLock poisoned").push((level, message.to_string()));
    }
}
