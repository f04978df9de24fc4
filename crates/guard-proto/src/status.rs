use serde::{Deserialize, Serialize};

/// Transport state of one stream connection. `Closed` is terminal for that connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Text of the connection indicator.
    pub fn indicator(self) -> &'static str {
        match self {
            ConnectionState::Open => "System Online",
            ConnectionState::Connecting | ConnectionState::Closed => "Connecting…",
        }
    }
}
