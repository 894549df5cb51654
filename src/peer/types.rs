use crate::messages::DirectMessage;
use crate::mirror::MirrorState;
use crate::types::ProfileConfig;
use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// ICE кандидат в сериализуемом виде
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

impl From<RTCIceCandidateInit> for IceCandidate {
    fn from(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
        }
    }
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(c: IceCandidate) -> Self {
        RTCIceCandidateInit {
            candidate: c.candidate,
            sdp_mid: c.sdp_mid,
            sdp_mline_index: c.sdp_mline_index,
            username_fragment: None,
        }
    }
}

/// Сигнальные сообщения, идущие через релей.
/// Описание и все собранные кандидаты едут одним пакетом.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    LocalOffer {
        offer: RTCSessionDescription,
        ice: Vec<IceCandidate>,
    },
    LocalAnswer {
        answer: RTCSessionDescription,
        ice: Vec<IceCandidate>,
    },
    /// Просьба к offer-стороне заново инициировать соединение
    AskOffer,
}

/// Сообщения поверх открытого data-channel
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    Ping,
    Pong,
    SyncStatus { status: MirrorState },
    UserConfig { config: ProfileConfig },
    Dm { message: DirectMessage },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_messages_use_the_tagged_wire_shape() {
        let json = serde_json::to_value(&ChannelMessage::Ping).unwrap();
        assert_eq!(json, serde_json::json!({"type": "ping"}));

        let json = serde_json::to_value(&ChannelMessage::SyncStatus {
            status: MirrorState::default(),
        })
        .unwrap();
        assert_eq!(json["type"], "sync_status");
        assert!(json["status"].is_object());
    }

    #[test]
    fn signal_offer_carries_description_and_bundled_ice() {
        let offer = SignalMessage::LocalOffer {
            offer: RTCSessionDescription::default(),
            ice: vec![IceCandidate {
                candidate: "candidate:1 1 udp 1 192.168.1.42 51000 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            }],
        };
        let json = serde_json::to_value(&offer).unwrap();
        assert_eq!(json["type"], "local_offer");
        assert_eq!(json["ice"][0]["sdpMLineIndex"], 0);
        assert!(json["offer"].is_object());
    }
}
