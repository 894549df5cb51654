use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Ошибки ядра; сигнальные ошибки возвращаются инициатору операции
/// и никогда не валят другие peer-соединения.
#[derive(Debug, Error)]
pub enum Error {
    #[error("signaling exchange timed out")]
    Timeout,

    #[error("relay rejected the exchange with status {status}")]
    RelayRejected { status: u16, body: String },

    #[error("relay unreachable: {0}")]
    RelayUnreachable(#[source] reqwest::Error),

    #[error("target address must not be empty")]
    InvalidTarget,

    #[error("refusing to send an empty message")]
    EmptySend,

    #[error("data channel is closed")]
    ChannelClosed,

    #[error("no active connection for peer {0}")]
    UnknownPeer(String),

    #[error("negotiation failed: {0}")]
    Negotiation(&'static str),

    #[error(transparent)]
    Webrtc(#[from] webrtc::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
