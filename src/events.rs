use crate::messages::DirectMessage;
use tokio::sync::broadcast;
use tracing::debug;

/// События ядра для внешнего слоя (UI)
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected { peer: String },
    Disconnected { peer: String },
    ConnectionProblem { peer: String },
    ConnectionRecovering { peer: String },
    ConnectionRecovered { peer: String },
    ConnectionFailed { peer: String },
    Message(DirectMessage),
    StatusSynced { peer: String },
    ProfileReceived { peer: String },
}

/// Широковещательная шина событий; подписчиков может не быть вовсе,
/// отправка в пустую шину не считается ошибкой.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        debug!(?event, "emit");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
