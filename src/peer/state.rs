use crate::peer::data_channel::ChannelHandle;
use crate::types::ProfileConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use webrtc::peer_connection::RTCPeerConnection;

/// Состояние соединения с одним пиром
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    Idle,
    Offering,
    Answering,
    Connecting,
    Connected,
    Disconnected,
    Closed,
}

/// Запись о пире; живёт в активном наборе менеджера.
/// Единственный владелец соединения и канала — менеджер,
/// остальные сервисы только одалживают ChannelHandle на время вызова.
pub struct PeerRecord {
    pub state: PeerState,
    pub is_offer: bool,
    pub latency_ms: Option<u32>,
    pub profile: Option<ProfileConfig>,
    pub(crate) pc: Option<Arc<RTCPeerConnection>>,
    pub(crate) channel: Option<ChannelHandle>,
    pub(crate) ping_sent_at: Option<Instant>,
    pub(crate) ping_task: Option<JoinHandle<()>>,
    pub(crate) disconnect_task: Option<JoinHandle<()>>,
}

impl PeerRecord {
    pub(crate) fn new(is_offer: bool, state: PeerState) -> Self {
        Self {
            state,
            is_offer,
            latency_ms: None,
            profile: None,
            pc: None,
            channel: None,
            ping_sent_at: None,
            ping_task: None,
            disconnect_task: None,
        }
    }

    /// Переход в терминальное состояние: гасит фоновые задачи, отпускает
    /// канал и замеры, возвращает соединение для закрытия вне блокировки.
    pub(crate) fn shutdown(mut self) -> Option<Arc<RTCPeerConnection>> {
        if let Some(task) = self.ping_task.take() {
            task.abort();
        }
        if let Some(task) = self.disconnect_task.take() {
            task.abort();
        }
        self.state = PeerState::Closed;
        self.channel = None;
        self.latency_ms = None;
        self.ping_sent_at = None;
        self.pc.take()
    }
}

/// Публичный снимок записи для внешнего слоя
#[derive(Debug, Clone, Serialize)]
pub struct PeerStatus {
    pub state: PeerState,
    pub is_offer: bool,
    pub latency_ms: Option<u32>,
    pub profile: Option<ProfileConfig>,
}
