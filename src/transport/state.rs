/// Lifecycle of one logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Not started, or stopped
    #[default]
    Idle,
    Connecting,
    Open,
    /// Socket gone, waiting out the retry delay
    ClosedPendingRetry,
}

impl TransportState {
    pub fn is_open(&self) -> bool {
        matches!(self, TransportState::Open)
    }

    /// Status line shown to users
    pub fn description(&self) -> &'static str {
        match self {
            TransportState::Idle => "not connected",
            TransportState::Connecting => "connecting",
            TransportState::Open => "connected",
            TransportState::ClosedPendingRetry => "reconnecting",
        }
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
