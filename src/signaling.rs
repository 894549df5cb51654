use crate::config;
use crate::error::{Error, Result};
use crate::peer::types::SignalMessage;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Ответ релея на сигнальный обмен
#[derive(Debug, Clone)]
pub struct RelayedResponse {
    pub status: u16,
    pub body: String,
}

/// Клиент локального форвардера сигналинга. Релей слушает на localhost
/// и пробрасывает тело запроса до сигнального порта пира по оверлейной
/// сети; адресат кодируется query-параметром.
pub struct SignalingRelay {
    http: reqwest::Client,
    base_url: String,
    signaling_port: u16,
}

impl SignalingRelay {
    pub fn new() -> Self {
        Self::with_endpoint(config::RELAY_URL, config::SIGNALING_PORT)
    }

    pub fn with_endpoint(base_url: impl Into<String>, signaling_port: u16) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            signaling_port,
        }
    }

    /// Ровно одна попытка обмена: гонка запроса с таймером. По истечении
    /// таймера запрос снимается; политика повторов — на вызывающей стороне.
    pub async fn exchange(
        &self,
        target: &str,
        payload: &SignalMessage,
        deadline: Duration,
    ) -> Result<RelayedResponse> {
        if target.trim().is_empty() {
            return Err(Error::InvalidTarget);
        }

        let url = format!(
            "{}?target={}:{}/RTC",
            self.base_url, target, self.signaling_port
        );
        debug!(url = %url, "relay exchange");

        let request = self.http.post(&url).json(payload).send();
        let response = match timeout(deadline, request).await {
            // сброс future отменяет запрос целиком
            Err(_) => {
                warn!(target = %target, "relay exchange timed out after {:?}", deadline);
                return Err(Error::Timeout);
            }
            Ok(Err(e)) => return Err(Error::RelayUnreachable(e)),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::RelayRejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(RelayedResponse {
            status: status.as_u16(),
            body,
        })
    }
}

impl Default for SignalingRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Мини-релей: отвечает заготовленным HTTP-ответом на любой запрос
    async fn spawn_relay(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = sock.read(&mut buf).await;
                    let _ = sock.write_all(response.as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        format!("http://{addr}/")
    }

    // Релей, который принимает соединение и молчит
    async fn spawn_silent_relay() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = sock.read(&mut buf).await;
                    tokio::time::sleep(Duration::from_secs(600)).await;
                });
            }
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn successful_exchange_returns_the_relayed_response() {
        let base = spawn_relay("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await;
        let relay = SignalingRelay::with_endpoint(base, 8848);
        let response = relay
            .exchange("10.0.0.9", &SignalMessage::AskOffer, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "ok");
    }

    #[tokio::test]
    async fn rejection_carries_status_and_body() {
        let base =
            spawn_relay("HTTP/1.1 502 Bad Gateway\r\nContent-Length: 4\r\n\r\ndown").await;
        let relay = SignalingRelay::with_endpoint(base, 8848);
        let err = relay
            .exchange("10.0.0.9", &SignalMessage::AskOffer, Duration::from_secs(2))
            .await
            .unwrap_err();
        match err {
            Error::RelayRejected { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "down");
            }
            other => panic!("expected RelayRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_relay_times_out_within_the_deadline() {
        let base = spawn_silent_relay().await;
        let relay = SignalingRelay::with_endpoint(base, 8848);
        let started = Instant::now();
        let err = relay
            .exchange("10.0.0.9", &SignalMessage::AskOffer, Duration::from_millis(100))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();
        assert!(matches!(err, Error::Timeout), "got {err:?}");
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(1), "cancel was not prompt: {elapsed:?}");
    }

    #[tokio::test]
    async fn unreachable_relay_is_a_network_error() {
        // порт из discard-диапазона, никто не слушает
        let relay = SignalingRelay::with_endpoint("http://127.0.0.1:9/", 8848);
        let err = relay
            .exchange("10.0.0.9", &SignalMessage::AskOffer, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RelayUnreachable(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn empty_target_is_rejected_locally() {
        let relay = SignalingRelay::with_endpoint("http://127.0.0.1:9/", 8848);
        let err = relay
            .exchange("", &SignalMessage::AskOffer, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTarget));
        let err = relay
            .exchange("   ", &SignalMessage::AskOffer, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTarget));
    }
}
