use crate::error::{Error, Result};
use crate::peer::manager::ManagerInner;
use crate::peer::types::ChannelMessage;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;

/// Узкая «капабилити» поверх data-channel: единственная операция —
/// попытка отправки. Владение каналом остаётся у менеджера, сервисы
/// держат хэндл только на время вызова.
#[derive(Clone)]
pub struct ChannelHandle {
    dc: Arc<RTCDataChannel>,
}

impl ChannelHandle {
    pub(crate) fn new(dc: Arc<RTCDataChannel>) -> Self {
        Self { dc }
    }

    /// Отправка одного сообщения; закрытый канал — `ChannelClosed`
    pub async fn try_send(&self, message: &ChannelMessage) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.dc
            .send(&Bytes::from(payload))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        Ok(())
    }
}

/// Общая обвязка data-channel: при открытии пир получает наш профиль и
/// свежий зеркальный статус, дальше канал несёт ping/pong, статусы и DM.
pub(crate) fn attach_channel(inner: &Arc<ManagerInner>, peer: &str, dc: Arc<RTCDataChannel>) {
    let handle = ChannelHandle::new(dc.clone());
    inner.set_channel(peer, handle.clone());

    dc.on_open(Box::new({
        let inner = inner.clone();
        let peer = peer.to_string();
        move || {
            let inner = inner.clone();
            let peer = peer.clone();
            let handle = handle.clone();
            Box::pin(async move {
                inner.on_channel_open(&peer, handle).await;
            })
        }
    }));

    dc.on_message(Box::new({
        let inner = inner.clone();
        let peer = peer.to_string();
        move |msg: DataChannelMessage| {
            let inner = inner.clone();
            let peer = peer.clone();
            Box::pin(async move {
                match serde_json::from_slice::<ChannelMessage>(&msg.data) {
                    Ok(parsed) => inner.on_channel_message(&peer, parsed).await,
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "unknown data channel message");
                    }
                }
            })
        }
    }));

    dc.on_close(Box::new({
        let inner = inner.clone();
        let peer = peer.to_string();
        move || {
            let inner = inner.clone();
            let peer = peer.clone();
            Box::pin(async move {
                debug!(peer = %peer, "data channel closed");
                inner.on_channel_closed(&peer);
            })
        }
    }));
}
