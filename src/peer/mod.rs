pub mod connection;
pub mod data_channel;
pub mod ice;
pub mod manager;
pub mod state;
pub mod types;

pub use data_channel::ChannelHandle;
pub use manager::PeerManager;
pub use state::{PeerState, PeerStatus};
pub use types::{ChannelMessage, IceCandidate, SignalMessage};
