use crate::config;
use crate::peer::manager::PeerManager;
use crate::types::{Channel, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// Минимальный снимок локального присутствия, видимый пирам.
/// Чисто локальная бухгалтерия (например, источник списка каналов)
/// сюда намеренно не входит, чтобы не гонять лишний трафик.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MirrorState {
    pub user: Option<User>,
    pub in_voice_channel: Option<Channel>,
    pub is_screen_sharing: bool,
    pub is_muted: bool,
    pub is_deafened: bool,
    pub custom_status: Option<String>,
}

/// Владелец зеркального состояния. Мутации идут только через сеттеры
/// локального пользователя; подписчики получают неизменяемые снимки.
pub struct LocalUser {
    tx: watch::Sender<MirrorState>,
}

impl LocalUser {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(MirrorState::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<MirrorState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> MirrorState {
        self.tx.borrow().clone()
    }

    pub fn set_user(&self, user: Option<User>) {
        self.update(|s| s.user = user);
    }

    pub fn set_voice_channel(&self, channel: Option<Channel>) {
        self.update(|s| s.in_voice_channel = channel);
    }

    pub fn set_screen_sharing(&self, on: bool) {
        self.update(|s| s.is_screen_sharing = on);
    }

    pub fn set_muted(&self, on: bool) {
        self.update(|s| s.is_muted = on);
    }

    pub fn set_deafened(&self, on: bool) {
        self.update(|s| s.is_deafened = on);
    }

    pub fn set_custom_status(&self, status: Option<String>) {
        self.update(|s| s.custom_status = status);
    }

    fn update(&self, f: impl FnOnce(&mut MirrorState)) {
        self.tx.send_modify(f);
    }
}

impl Default for LocalUser {
    fn default() -> Self {
        Self::new()
    }
}

/// Ждёт следующее изменение и поглощает всплеск быстрых записей:
/// таймер перезапускается каждой новой записью, побеждает последняя.
/// None — издатель ушёл, синхронизация завершается.
async fn next_coalesced(rx: &mut watch::Receiver<MirrorState>) -> Option<MirrorState> {
    rx.changed().await.ok()?;
    loop {
        tokio::select! {
            _ = sleep(config::MIRROR_DEBOUNCE) => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    Some(rx.borrow_and_update().clone())
}

/// Рассылает зеркальный статус по всем открытым каналам.
/// Доставка best-effort: неудача по одному пиру не трогает остальных.
pub struct MirrorSync {
    task: Option<JoinHandle<()>>,
}

impl MirrorSync {
    pub fn start(manager: Arc<PeerManager>, mut rx: watch::Receiver<MirrorState>) -> Self {
        let task = tokio::spawn(async move {
            while let Some(status) = next_coalesced(&mut rx).await {
                manager.broadcast_status(&status).await;
            }
            debug!("mirror sync stopped");
        });
        Self { task: Some(task) }
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for MirrorSync {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test(start_paused = true)]
    async fn burst_of_writes_coalesces_to_the_last_value() {
        let local = LocalUser::new();
        let mut rx = local.subscribe();

        local.set_muted(true);
        local.set_deafened(true);
        local.set_custom_status(Some("brb".to_string()));

        let snapshot = next_coalesced(&mut rx).await.expect("publisher alive");
        assert!(snapshot.is_muted);
        assert!(snapshot.is_deafened);
        assert_eq!(snapshot.custom_status.as_deref(), Some("brb"));

        // всплеск слит в одну рассылку: новых снимков нет
        let more = timeout(Duration::from_millis(50), next_coalesced(&mut rx)).await;
        assert!(more.is_err(), "expected exactly one coalesced snapshot");
    }

    #[tokio::test(start_paused = true)]
    async fn writes_outside_the_window_produce_separate_snapshots() {
        let local = LocalUser::new();
        let mut rx = local.subscribe();

        local.set_muted(true);
        let first = next_coalesced(&mut rx).await.unwrap();
        assert!(first.is_muted);

        tokio::time::sleep(Duration::from_millis(20)).await;
        local.set_muted(false);
        let second = next_coalesced(&mut rx).await.unwrap();
        assert!(!second.is_muted);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_publisher_ends_the_stream() {
        let local = LocalUser::new();
        let mut rx = local.subscribe();
        drop(local);
        assert_eq!(next_coalesced(&mut rx).await, None);
    }

    #[test]
    fn local_bookkeeping_is_not_serialized() {
        let state = MirrorState::default();
        let json = serde_json::to_value(&state).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys.len(),
            6,
            "mirror payload carries exactly the shared facts: {keys:?}"
        );
        assert!(json.get("isPresetChannels").is_none());
    }
}
