use crate::config;
use crate::error::Result;
use crate::peer::data_channel::attach_channel;
use crate::peer::ice;
use crate::peer::manager::ManagerInner;
use crate::peer::types::IceCandidate;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::debug;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

/// Буфер кандидатов одного раунда переговоров. Кандидаты не шлются
/// поодиночке: копятся здесь и уезжают одним пакетом после окончания
/// сбора (сигнал — пустой кандидат от ICE-агента).
pub(crate) struct CandidateGather {
    candidates: Arc<Mutex<Vec<IceCandidate>>>,
    done: Arc<Notify>,
}

impl CandidateGather {
    fn new() -> Self {
        Self {
            candidates: Arc::new(Mutex::new(Vec::new())),
            done: Arc::new(Notify::new()),
        }
    }

    /// Ждёт конца сбора, но не дольше лимита: лучше отправить то,
    /// что уже есть, чем зависнуть на переговорах.
    pub(crate) async fn wait(&self, limit: Duration) {
        if timeout(limit, self.done.notified()).await.is_err() {
            debug!("candidate gathering timed out, bundling what we have");
        }
    }

    pub(crate) fn take(&self) -> Vec<IceCandidate> {
        std::mem::take(&mut *self.candidates.lock().unwrap())
    }
}

/// Создаёт peer connection для одного пира; если `initiator`, то сами
/// делаем data-channel, иначе ждём канал от удалённой стороны.
pub(crate) async fn new_peer(
    inner: Arc<ManagerInner>,
    peer: String,
    initiator: bool,
) -> Result<(Arc<RTCPeerConnection>, CandidateGather)> {
    let api = APIBuilder::new().build();
    // STUN/TURN не нужны: достижимость даёт оверлейная сеть,
    // host-кандидатов приватного диапазона достаточно
    let pc = Arc::new(api.new_peer_connection(RTCConfiguration::default()).await?);

    let gather = CandidateGather::new();
    {
        let buffer = gather.candidates.clone();
        let done = gather.done.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let buffer = buffer.clone();
            let done = done.clone();
            Box::pin(async move {
                match cand {
                    Some(c) => {
                        if let Some(accepted) = ice::filter_local(&c) {
                            buffer.lock().unwrap().push(accepted);
                        }
                    }
                    // пустой кандидат означает конец сбора
                    None => done.notify_one(),
                }
            })
        }));
    }

    {
        let inner = inner.clone();
        let peer = peer.clone();
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            let inner = inner.clone();
            let peer = peer.clone();
            Box::pin(async move {
                inner.on_connection_state(&peer, st).await;
            })
        }));
    }

    if initiator {
        let dc = pc
            .create_data_channel(config::DATA_CHANNEL_LABEL, Some(RTCDataChannelInit::default()))
            .await?;
        attach_channel(&inner, &peer, dc);
    } else {
        let inner = inner.clone();
        let peer = peer.clone();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            attach_channel(&inner, &peer, dc);
            Box::pin(async {})
        }));
    }

    Ok((pc, gather))
}
