use crate::config;
use crate::error::{Error, Result};
use crate::events::{ClientEvent, EventBus};
use crate::messages::{DirectMessage, MessageDirection, MessageStore};
use crate::mirror::MirrorState;
use crate::peer::connection::new_peer;
use crate::peer::data_channel::ChannelHandle;
use crate::peer::ice;
use crate::peer::state::{PeerRecord, PeerState, PeerStatus};
use crate::peer::types::{ChannelMessage, IceCandidate, SignalMessage};
use crate::remote_users::RemoteUserCache;
use crate::signaling::SignalingRelay;
use crate::types::ProfileConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{interval, sleep};
use tracing::{debug, info, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// Разделяемое ядро менеджера; до него дотягиваются обработчики
/// webrtc-колбэков через Arc.
pub(crate) struct ManagerInner {
    self_addr: String,
    relay: SignalingRelay,
    peers: Mutex<HashMap<String, PeerRecord>>,
    events: EventBus,
    messages: Arc<MessageStore>,
    users: Arc<RemoteUserCache>,
    mirror: watch::Receiver<MirrorState>,
    profile: Mutex<Option<ProfileConfig>>,
}

/// Менеджер жизненного цикла соединений: по одной записи на пира,
/// переговоры по схеме «собрали кандидатов — отправили одним пакетом».
/// Создаётся явно один раз на сессию и передаётся по ссылке.
pub struct PeerManager {
    inner: Arc<ManagerInner>,
}

impl PeerManager {
    pub fn new(
        self_addr: String,
        relay: SignalingRelay,
        events: EventBus,
        messages: Arc<MessageStore>,
        users: Arc<RemoteUserCache>,
        mirror: watch::Receiver<MirrorState>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                self_addr,
                relay,
                peers: Mutex::new(HashMap::new()),
                events,
                messages,
                users,
                mirror,
                profile: Mutex::new(None),
            }),
        }
    }

    pub fn self_addr(&self) -> &str {
        &self.inner.self_addr
    }

    /// Профиль уезжает пиру при каждом открытии канала
    pub fn set_profile(&self, config: ProfileConfig) {
        *self.inner.profile.lock().unwrap() = Some(config);
    }

    /// Инициация соединения локальным пользователем. Если запись уже
    /// есть и переговоры идут, вызов игнорируется; застрявший offer
    /// можно повторить этим же вызовом.
    pub async fn connect(&self, peer: &str) -> Result<()> {
        if peer.trim().is_empty() {
            return Err(Error::InvalidTarget);
        }
        {
            let mut peers = self.inner.peers.lock().unwrap();
            match peers.get(peer) {
                None => {
                    peers.insert(peer.to_string(), PeerRecord::new(true, PeerState::Offering));
                }
                Some(r) if r.is_offer && r.state == PeerState::Offering => {
                    debug!(peer = %peer, "retrying stalled offer");
                }
                Some(r) => {
                    debug!(peer = %peer, state = ?r.state, "connect ignored, negotiation in progress");
                    return Ok(());
                }
            }
        }
        ManagerInner::start_offer(&self.inner, peer).await
    }

    /// Входящее сигнальное сообщение от релея
    pub async fn handle_signal(&self, from: &str, message: SignalMessage) -> Result<()> {
        if from.trim().is_empty() {
            return Err(Error::InvalidTarget);
        }
        match message {
            SignalMessage::LocalOffer { offer, ice } => self.handle_offer(from, offer, ice).await,
            SignalMessage::LocalAnswer { answer, ice } => self.handle_answer(from, answer, ice).await,
            SignalMessage::AskOffer => {
                let is_offer = {
                    let peers = self.inner.peers.lock().unwrap();
                    peers.get(from).map(|r| r.is_offer)
                };
                if is_offer == Some(true) {
                    info!(peer = %from, "peer asked for a fresh offer");
                    ManagerInner::start_offer(&self.inner, from).await
                } else {
                    debug!(peer = %from, "ignoring ask_offer, not the offer side");
                    Ok(())
                }
            }
        }
    }

    async fn handle_offer(
        &self,
        from: &str,
        offer: RTCSessionDescription,
        ice: Vec<IceCandidate>,
    ) -> Result<()> {
        {
            let mut peers = self.inner.peers.lock().unwrap();
            if let Some(r) = peers.get(from) {
                // glare: обе стороны инициировали одновременно; побеждает
                // offer стороны с лексикографически меньшим адресом
                if r.is_offer && matches!(r.state, PeerState::Offering | PeerState::Connecting) {
                    if self.inner.self_addr.as_str() < from {
                        info!(peer = %from, "glare: local offer wins, remote offer dropped");
                        return Ok(());
                    }
                    info!(peer = %from, "glare: remote offer wins, discarding local offer");
                }
            } else {
                peers.insert(from.to_string(), PeerRecord::new(false, PeerState::Answering));
            }
        }
        ManagerInner::answer_offer(&self.inner, from, offer, ice).await
    }

    async fn handle_answer(
        &self,
        from: &str,
        answer: RTCSessionDescription,
        ice: Vec<IceCandidate>,
    ) -> Result<()> {
        let pc = {
            let peers = self.inner.peers.lock().unwrap();
            peers.get(from).and_then(|r| r.pc.clone())
        }
        .ok_or_else(|| Error::UnknownPeer(from.to_string()))?;

        pc.set_remote_description(answer).await?;
        ice::apply_bundled(&pc, &ice).await;
        Ok(())
    }

    /// Явное завершение пользователем: из любого незакрытого состояния
    /// сразу в closed, запись покидает активный набор.
    pub async fn hangup(&self, peer: &str) -> Result<()> {
        if self.inner.close_peer(peer).await {
            self.inner.events.emit(ClientEvent::Disconnected {
                peer: peer.to_string(),
            });
        }
        Ok(())
    }

    pub async fn hangup_all(&self) {
        for peer in self.active_peers() {
            let _ = self.hangup(&peer).await;
        }
    }

    pub fn status(&self, peer: &str) -> Option<PeerStatus> {
        let peers = self.inner.peers.lock().unwrap();
        peers.get(peer).map(|r| PeerStatus {
            state: r.state,
            is_offer: r.is_offer,
            latency_ms: r.latency_ms,
            profile: r.profile.clone(),
        })
    }

    pub fn active_peers(&self) -> Vec<String> {
        self.inner.peers.lock().unwrap().keys().cloned().collect()
    }

    pub fn is_connected(&self, peer: &str) -> bool {
        let peers = self.inner.peers.lock().unwrap();
        peers
            .get(peer)
            .map(|r| r.state == PeerState::Connected)
            .unwrap_or(false)
    }

    /// Рассылка зеркального статуса по всем открытым каналам;
    /// неудача по одному пиру не блокирует остальных
    pub async fn broadcast_status(&self, status: &MirrorState) {
        self.inner.broadcast_status(status).await;
    }

    /// Отправка личного сообщения одному пиру
    pub async fn send_dm(&self, peer: &str, message: &DirectMessage) -> Result<()> {
        let handle = {
            let peers = self.inner.peers.lock().unwrap();
            peers
                .get(peer)
                .filter(|r| r.state == PeerState::Connected)
                .and_then(|r| r.channel.clone())
        }
        .ok_or_else(|| Error::UnknownPeer(peer.to_string()))?;

        handle
            .try_send(&ChannelMessage::Dm {
                message: message.clone(),
            })
            .await
    }
}

impl ManagerInner {
    /// Offer-сторона: описание + все отобранные кандидаты одним пакетом.
    /// Ошибка отправки оставляет запись как есть — повтор за пользователем,
    /// молчаливых ретраев нет, чтобы не плодить дубликаты offer.
    async fn start_offer(inner: &Arc<Self>, peer: &str) -> Result<()> {
        if let Some(old) = inner.detach_transport(peer, true)? {
            let _ = old.close().await;
        }

        let (pc, gather) = new_peer(inner.clone(), peer.to_string(), true).await?;
        inner.store_transport(peer, pc.clone())?;

        let offer = pc.create_offer(None).await?;
        pc.set_local_description(offer).await?;
        gather.wait(config::GATHER_TIMEOUT).await;

        let desc = pc
            .local_description()
            .await
            .ok_or(Error::Negotiation("local description missing"))?;
        let ice = gather.take();
        debug!(peer = %peer, candidates = ice.len(), "sending bundled offer");

        inner
            .relay
            .exchange(
                peer,
                &SignalMessage::LocalOffer { offer: desc, ice },
                config::SIGNALING_TIMEOUT,
            )
            .await?;

        let mut peers = inner.peers.lock().unwrap();
        if let Some(r) = peers.get_mut(peer) {
            if r.is_offer && r.state == PeerState::Offering {
                r.state = PeerState::Connecting;
            }
        }
        Ok(())
    }

    /// Answer-сторона: применяем удалённое описание и пачку кандидатов,
    /// отвечаем тем же паттерном «собрали — отправили один раз».
    async fn answer_offer(
        inner: &Arc<Self>,
        peer: &str,
        offer: RTCSessionDescription,
        remote_ice: Vec<IceCandidate>,
    ) -> Result<()> {
        if let Some(old) = inner.detach_transport(peer, false)? {
            let _ = old.close().await;
        }

        let (pc, gather) = new_peer(inner.clone(), peer.to_string(), false).await?;
        inner.store_transport(peer, pc.clone())?;

        pc.set_remote_description(offer).await?;
        ice::apply_bundled(&pc, &remote_ice).await;

        let answer = pc.create_answer(None).await?;
        pc.set_local_description(answer).await?;
        gather.wait(config::GATHER_TIMEOUT).await;

        let desc = pc
            .local_description()
            .await
            .ok_or(Error::Negotiation("local description missing"))?;
        let ice = gather.take();
        debug!(peer = %peer, candidates = ice.len(), "sending bundled answer");

        inner
            .relay
            .exchange(
                peer,
                &SignalMessage::LocalAnswer { answer: desc, ice },
                config::SIGNALING_TIMEOUT,
            )
            .await?;

        let mut peers = inner.peers.lock().unwrap();
        if let Some(r) = peers.get_mut(peer) {
            if !r.is_offer && r.state == PeerState::Answering {
                r.state = PeerState::Connecting;
            }
        }
        Ok(())
    }

    /// Сбрасывает транспорт записи перед новым раундом переговоров;
    /// старое соединение возвращается для закрытия вне блокировки
    fn detach_transport(
        &self,
        peer: &str,
        is_offer: bool,
    ) -> Result<Option<Arc<RTCPeerConnection>>> {
        let mut peers = self.peers.lock().unwrap();
        let r = peers
            .get_mut(peer)
            .ok_or_else(|| Error::UnknownPeer(peer.to_string()))?;
        r.is_offer = is_offer;
        r.state = if is_offer {
            PeerState::Offering
        } else {
            PeerState::Answering
        };
        r.channel = None;
        r.latency_ms = None;
        r.ping_sent_at = None;
        if let Some(task) = r.ping_task.take() {
            task.abort();
        }
        if let Some(task) = r.disconnect_task.take() {
            task.abort();
        }
        Ok(r.pc.take())
    }

    fn store_transport(&self, peer: &str, pc: Arc<RTCPeerConnection>) -> Result<()> {
        let mut peers = self.peers.lock().unwrap();
        match peers.get_mut(peer) {
            Some(r) => {
                r.pc = Some(pc);
                Ok(())
            }
            // запись успели закрыть, пока строился транспорт
            None => Err(Error::UnknownPeer(peer.to_string())),
        }
    }

    /// Убирает запись из активного набора и закрывает транспорт.
    /// true, если запись существовала.
    pub(crate) async fn close_peer(&self, peer: &str) -> bool {
        let record = { self.peers.lock().unwrap().remove(peer) };
        match record {
            Some(record) => {
                if let Some(pc) = record.shutdown() {
                    if let Err(e) = pc.close().await {
                        debug!(peer = %peer, error = %e, "error closing peer connection");
                    }
                }
                info!(peer = %peer, "peer closed and removed");
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_channel(&self, peer: &str, handle: ChannelHandle) {
        let mut peers = self.peers.lock().unwrap();
        if let Some(r) = peers.get_mut(peer) {
            r.channel = Some(handle);
        }
    }

    fn channel_of(&self, peer: &str) -> Option<ChannelHandle> {
        self.peers.lock().unwrap().get(peer).and_then(|r| r.channel.clone())
    }

    async fn broadcast_status(&self, status: &MirrorState) {
        let targets: Vec<(String, ChannelHandle)> = {
            let peers = self.peers.lock().unwrap();
            peers
                .iter()
                .filter(|(_, r)| r.state == PeerState::Connected)
                .filter_map(|(addr, r)| r.channel.clone().map(|c| (addr.clone(), c)))
                .collect()
        };
        if targets.is_empty() {
            return;
        }
        debug!(peers = targets.len(), "broadcasting mirror status");
        let message = ChannelMessage::SyncStatus {
            status: status.clone(),
        };
        for (peer, handle) in targets {
            if let Err(e) = handle.try_send(&message).await {
                warn!(peer = %peer, error = %e, "status sync failed");
            }
        }
    }

    /// Канал открыт: пир получает наш профиль и свежий статус,
    /// затем запускается ping-петля для замера латентности
    pub(crate) async fn on_channel_open(self: &Arc<Self>, peer: &str, handle: ChannelHandle) {
        info!(peer = %peer, "data channel open");

        let profile = self.profile.lock().unwrap().clone();
        if let Some(config) = profile {
            if let Err(e) = handle.try_send(&ChannelMessage::UserConfig { config }).await {
                warn!(peer = %peer, error = %e, "profile push failed");
            }
        }
        let status = self.mirror.borrow().clone();
        if let Err(e) = handle.try_send(&ChannelMessage::SyncStatus { status }).await {
            warn!(peer = %peer, error = %e, "initial status sync failed");
        }

        let task = tokio::spawn({
            let inner = self.clone();
            let peer = peer.to_string();
            let handle = handle.clone();
            async move {
                let mut ticker = interval(config::PING_INTERVAL);
                loop {
                    ticker.tick().await;
                    {
                        let mut peers = inner.peers.lock().unwrap();
                        let Some(r) = peers.get_mut(&peer) else { break };
                        // pong так и не пришёл — замер недействителен
                        if let Some(at) = r.ping_sent_at {
                            if at.elapsed() >= config::PING_TIMEOUT {
                                r.latency_ms = None;
                            }
                        }
                    }
                    if handle.try_send(&ChannelMessage::Ping).await.is_err() {
                        debug!(peer = %peer, "ping loop stopped, channel closed");
                        break;
                    }
                    let mut peers = inner.peers.lock().unwrap();
                    match peers.get_mut(&peer) {
                        Some(r) => r.ping_sent_at = Some(Instant::now()),
                        None => break,
                    }
                }
            }
        });

        let mut peers = self.peers.lock().unwrap();
        match peers.get_mut(peer) {
            Some(r) => {
                if let Some(old) = r.ping_task.replace(task) {
                    old.abort();
                }
            }
            None => task.abort(),
        }
    }

    pub(crate) async fn on_channel_message(self: &Arc<Self>, peer: &str, message: ChannelMessage) {
        match message {
            ChannelMessage::Ping => {
                if let Some(handle) = self.channel_of(peer) {
                    if handle.try_send(&ChannelMessage::Pong).await.is_err() {
                        debug!(peer = %peer, "pong reply failed");
                    }
                }
            }
            ChannelMessage::Pong => {
                let mut peers = self.peers.lock().unwrap();
                if let Some(r) = peers.get_mut(peer) {
                    if let Some(at) = r.ping_sent_at.take() {
                        r.latency_ms = Some(at.elapsed().as_millis() as u32);
                    }
                }
            }
            ChannelMessage::SyncStatus { status } => {
                self.users.set_mirrored_status(peer, status);
                self.events.emit(ClientEvent::StatusSynced {
                    peer: peer.to_string(),
                });
            }
            ChannelMessage::UserConfig { config } => {
                {
                    let mut peers = self.peers.lock().unwrap();
                    if let Some(r) = peers.get_mut(peer) {
                        r.profile = Some(config.clone());
                    }
                }
                self.users.set_profile(peer, config);
                self.events.emit(ClientEvent::ProfileReceived {
                    peer: peer.to_string(),
                });
            }
            ChannelMessage::Dm { message } => {
                // направление и адрес фиксируются на принимающей стороне
                let message = DirectMessage {
                    peer_address: peer.to_string(),
                    direction: MessageDirection::Received,
                    ..message
                };
                self.messages.record(peer, message.clone());
                self.events.emit(ClientEvent::Message(message));
            }
        }
    }

    pub(crate) fn on_channel_closed(&self, peer: &str) {
        let mut peers = self.peers.lock().unwrap();
        if let Some(r) = peers.get_mut(peer) {
            r.channel = None;
            r.ping_sent_at = None;
            if let Some(task) = r.ping_task.take() {
                task.abort();
            }
        }
    }

    /// Переходы состояния от транспорта. Переходы одного пира
    /// сериализуются блокировкой записи; разные пиры независимы.
    pub(crate) async fn on_connection_state(self: &Arc<Self>, peer: &str, st: RTCPeerConnectionState) {
        debug!(peer = %peer, state = ?st, "transport state change");
        match st {
            RTCPeerConnectionState::Connected => {
                let recovered = {
                    let mut peers = self.peers.lock().unwrap();
                    match peers.get_mut(peer) {
                        Some(r) => {
                            if let Some(task) = r.disconnect_task.take() {
                                task.abort();
                            }
                            let was = r.state;
                            r.state = PeerState::Connected;
                            was == PeerState::Disconnected
                        }
                        None => return,
                    }
                };
                if recovered {
                    self.events.emit(ClientEvent::ConnectionRecovered {
                        peer: peer.to_string(),
                    });
                }
                info!(peer = %peer, "peer connection established");
                self.events.emit(ClientEvent::Connected {
                    peer: peer.to_string(),
                });
            }

            RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                let start_grace = {
                    let mut peers = self.peers.lock().unwrap();
                    match peers.get_mut(peer) {
                        Some(r) if r.state != PeerState::Closed => {
                            // уже ждём? — ничего не делаем
                            if r.disconnect_task.is_some() {
                                false
                            } else {
                                r.state = PeerState::Disconnected;
                                true
                            }
                        }
                        _ => false,
                    }
                };
                if !start_grace {
                    return;
                }
                self.events.emit(ClientEvent::ConnectionProblem {
                    peer: peer.to_string(),
                });
                self.events.emit(ClientEvent::ConnectionRecovering {
                    peer: peer.to_string(),
                });

                let task = tokio::spawn({
                    let inner = self.clone();
                    let peer = peer.to_string();
                    async move {
                        debug!(peer = %peer, "grace period started, waiting {}s", config::GRACE_PERIOD.as_secs());
                        sleep(config::GRACE_PERIOD).await;
                        let still_down = {
                            let mut peers = inner.peers.lock().unwrap();
                            match peers.get_mut(&peer) {
                                Some(r) => {
                                    r.disconnect_task = None;
                                    r.state == PeerState::Disconnected
                                }
                                None => false,
                            }
                        };
                        if still_down {
                            warn!(peer = %peer, "no recovery within grace period, closing");
                            inner.close_peer(&peer).await;
                            inner.events.emit(ClientEvent::ConnectionFailed { peer });
                        }
                    }
                });
                let mut peers = self.peers.lock().unwrap();
                match peers.get_mut(peer) {
                    Some(r) => r.disconnect_task = Some(task),
                    None => task.abort(),
                }
            }

            RTCPeerConnectionState::Closed => {
                if self.close_peer(peer).await {
                    self.events.emit(ClientEvent::Disconnected {
                        peer: peer.to_string(),
                    });
                }
            }

            _ => {}
        }
    }
}
