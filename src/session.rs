use crate::error::Result;
use crate::events::{ClientEvent, EventBus};
use crate::messages::{DirectMessage, MessageStore};
use crate::mirror::{LocalUser, MirrorSync};
use crate::peer::manager::PeerManager;
use crate::peer::types::SignalMessage;
use crate::remote_users::RemoteUserCache;
use crate::signaling::SignalingRelay;
use crate::types::{Ips, ProfileConfig, User};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Корень ядра: явно создаётся один раз на сессию, владеет менеджером
/// соединений, журналом сообщений, кэшем пиров и зеркальной синхронизацией.
/// Никаких глобальных синглтонов — всё передаётся по ссылке.
pub struct Session {
    local: LocalUser,
    events: EventBus,
    messages: Arc<MessageStore>,
    remote_users: Arc<RemoteUserCache>,
    manager: Arc<PeerManager>,
    sync: Mutex<Option<MirrorSync>>,
}

impl Session {
    pub fn new(self_addr: impl Into<String>) -> Self {
        Self::with_relay(self_addr, SignalingRelay::new())
    }

    /// Конструктор с явным релеем (для нестандартного окружения)
    pub fn with_relay(self_addr: impl Into<String>, relay: SignalingRelay) -> Self {
        let events = EventBus::new();
        let messages = Arc::new(MessageStore::new());
        let remote_users = Arc::new(RemoteUserCache::new());
        let local = LocalUser::new();
        let manager = Arc::new(PeerManager::new(
            self_addr.into(),
            relay,
            events.clone(),
            messages.clone(),
            remote_users.clone(),
            local.subscribe(),
        ));
        Self {
            local,
            events,
            messages,
            remote_users,
            manager,
            sync: Mutex::new(None),
        }
    }

    /// Запускает зеркальную синхронизацию; повторный вызов — no-op
    pub fn start(&self) {
        let mut sync = self.sync.lock().unwrap();
        if sync.is_none() {
            *sync = Some(MirrorSync::start(self.manager.clone(), self.local.subscribe()));
            info!(addr = %self.manager.self_addr(), "session started");
        }
    }

    /// Останавливает синхронизацию и закрывает все соединения
    pub async fn stop(&self) {
        if let Some(mut sync) = self.sync.lock().unwrap().take() {
            sync.stop();
        }
        self.manager.hangup_all().await;
        info!("session stopped");
    }

    pub async fn connect(&self, peer: &str) -> Result<()> {
        self.manager.connect(peer).await
    }

    /// Входящее сигнальное сообщение от локального приёмника релея
    pub async fn handle_signal(&self, from: &str, message: SignalMessage) -> Result<()> {
        self.manager.handle_signal(from, message).await
    }

    pub async fn hangup(&self, peer: &str) -> Result<()> {
        self.manager.hangup(peer).await
    }

    /// Локальная отправка: сначала запись в журнал, потом доставка
    /// адресатам. Пустой текст отклоняется до любых сетевых вызовов;
    /// неудачная доставка одному пиру не мешает остальным.
    pub async fn send_message(&self, content: &str, targets: &[String]) -> Result<DirectMessage> {
        let message = self.messages.send(content)?;
        for peer in targets {
            if let Err(e) = self.manager.send_dm(peer, &message).await {
                warn!(peer = %peer, error = %e, "dm delivery failed");
            }
        }
        Ok(message)
    }

    /// Профиль приходит из внешнего хранилища настроек; здесь он
    /// попадает в зеркальный статус и раздаётся пирам при подключении
    pub fn set_profile(&self, config: ProfileConfig) {
        self.manager.set_profile(config.clone());
        self.local.set_user(Some(User {
            id: config.id,
            name: config.user_name,
            avatar: config.user_avatar,
            ips: Ips {
                ipv4: self.manager.self_addr().to_string(),
                ipv6: String::new(),
            },
        }));
    }

    pub fn local(&self) -> &LocalUser {
        &self.local
    }

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn remote_users(&self) -> &RemoteUserCache {
        &self.remote_users
    }

    pub fn manager(&self) -> &PeerManager {
        &self.manager
    }
}
