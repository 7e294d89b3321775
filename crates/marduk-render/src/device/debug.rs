use std::fmt;

/// Severity of a message reported by the GPU debug layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    Notification,
    Low,
    Medium,
    High,
}

/// A message drained from the context's debug output.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DebugMessage {
    pub severity: Severity,
    pub message: String,
}

impl DebugMessage {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

/// Most severe problem observed while a task rendered.
///
/// Produced by the worker from the debug messages of one `render()` call and
/// handed to `Task::finish`. Only the first high severity message is kept.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    /// Splits drained messages into the reported diagnostic and the rest.
    ///
    /// Messages that do not become the diagnostic are logged at debug level;
    /// notifications are dropped.
    pub fn from_messages(messages: Vec<DebugMessage>) -> Option<Self> {
        let mut first = None;
        for msg in messages {
            match msg.severity {
                Severity::High if first.is_none() => {
                    first = Some(Diagnostic {
                        severity: msg.severity,
                        message: msg.message,
                    });
                }
                Severity::Notification => {}
                _ => log::debug!("gpu: {}", msg.message),
            }
        }
        first
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.severity, self.message)
    }
}

impl From<DebugMessage> for Diagnostic {
    fn from(msg: DebugMessage) -> Self {
        Self {
            severity: msg.severity,
            message: msg.message,
        }
    }
}
