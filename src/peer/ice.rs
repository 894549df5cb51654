use crate::peer::types::IceCandidate;
use std::net::Ipv4Addr;
use tracing::{debug, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_candidate_type::RTCIceCandidateType;
use webrtc::peer_connection::RTCPeerConnection;

/// Политика отбора локальных кандидатов: оверлейная сеть сама даёт
/// сквозную достижимость по приватному диапазону, поэтому наружу идут
/// только host-кандидаты с приватным IPv4-адресом. Reflexive/relay и
/// IPv6 не несут пользы и раскрывают топологию.
pub fn accept_candidate(typ: RTCIceCandidateType, address: &str) -> bool {
    if typ != RTCIceCandidateType::Host {
        return false;
    }
    address
        .parse::<Ipv4Addr>()
        .map(|ip| ip.is_private())
        .unwrap_or(false)
}

/// Пропускает кандидат через политику и переводит в сериализуемый вид
pub(crate) fn filter_local(cand: &RTCIceCandidate) -> Option<IceCandidate> {
    if !accept_candidate(cand.typ, &cand.address) {
        debug!(
            typ = %cand.typ,
            address = %cand.address,
            "candidate rejected by overlay policy"
        );
        return None;
    }
    match cand.to_json() {
        Ok(init) => Some(init.into()),
        Err(e) => {
            warn!(error = %e, "failed to serialize local candidate");
            None
        }
    }
}

/// Применяет пачку удалённых кандидатов; remote description уже
/// должен быть установлен. Ошибка по одному кандидату не прерывает
/// остальные.
pub(crate) async fn apply_bundled(pc: &RTCPeerConnection, candidates: &[IceCandidate]) {
    for candidate in candidates {
        if let Err(e) = pc.add_ice_candidate(candidate.clone().into()).await {
            warn!(error = %e, "failed to apply remote candidate");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_private_host_candidates() {
        assert!(accept_candidate(RTCIceCandidateType::Host, "192.168.1.42"));
        assert!(accept_candidate(RTCIceCandidateType::Host, "10.0.0.7"));
        assert!(accept_candidate(RTCIceCandidateType::Host, "172.16.3.1"));
    }

    #[test]
    fn rejects_public_addresses() {
        assert!(!accept_candidate(RTCIceCandidateType::Host, "8.8.8.8"));
        assert!(!accept_candidate(RTCIceCandidateType::Host, "172.32.0.1"));
    }

    #[test]
    fn rejects_non_host_types() {
        assert!(!accept_candidate(RTCIceCandidateType::Relay, "192.168.1.42"));
        assert!(!accept_candidate(RTCIceCandidateType::Srflx, "192.168.1.42"));
        assert!(!accept_candidate(RTCIceCandidateType::Prflx, "10.0.0.7"));
    }

    #[test]
    fn rejects_ipv6_and_garbage() {
        assert!(!accept_candidate(RTCIceCandidateType::Host, "fe80::1"));
        assert!(!accept_candidate(RTCIceCandidateType::Host, "::1"));
        assert!(!accept_candidate(RTCIceCandidateType::Host, "not-an-ip"));
        assert!(!accept_candidate(RTCIceCandidateType::Host, ""));
    }
}
