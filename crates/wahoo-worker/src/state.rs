use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Error(_) => "error",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Error(reason) => write!(f, "error: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Result of `SessionManager::send_message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub ok: bool,
    pub detail: String,
}

impl SendOutcome {
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: detail.into(),
        }
    }
}
