pub mod config;
pub mod error;
pub mod events;
pub mod logger;
pub mod messages;
pub mod mirror;
pub mod peer;
pub mod remote_users;
pub mod session;
pub mod signaling;
pub mod types;
pub mod utils;

pub use error::{Error, Result};
pub use events::ClientEvent;
pub use messages::{DirectMessage, MessageDirection, MessageStore, SELF_PEER};
pub use mirror::{LocalUser, MirrorState, MirrorSync};
pub use peer::{ChannelHandle, ChannelMessage, IceCandidate, PeerManager, PeerState, PeerStatus, SignalMessage};
pub use remote_users::RemoteUserCache;
pub use session::Session;
pub use signaling::{RelayedResponse, SignalingRelay};
pub use types::{Channel, ChannelKind, Ips, ProfileConfig, User};
