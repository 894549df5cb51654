use crate::mirror::MirrorState;
use crate::types::ProfileConfig;
use std::collections::HashMap;
use std::sync::Mutex;

/// Кэш последних известных фактов об удалённых пользователях.
/// Две независимые карты по адресу пира: эфемерный зеркальный статус
/// и долговечный профиль. Значения заменяются целиком, без слияния;
/// записи живут до явного удаления.
#[derive(Default)]
pub struct RemoteUserCache {
    statuses: Mutex<HashMap<String, MirrorState>>,
    profiles: Mutex<HashMap<String, ProfileConfig>>,
}

impl RemoteUserCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mirrored_status(&self, peer: &str, status: MirrorState) {
        self.statuses.lock().unwrap().insert(peer.to_string(), status);
    }

    pub fn get_status(&self, peer: &str) -> Option<MirrorState> {
        self.statuses.lock().unwrap().get(peer).cloned()
    }

    pub fn all_statuses(&self) -> HashMap<String, MirrorState> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn set_profile(&self, peer: &str, config: ProfileConfig) {
        self.profiles.lock().unwrap().insert(peer.to_string(), config);
    }

    pub fn get_profile(&self, peer: &str) -> Option<ProfileConfig> {
        self.profiles.lock().unwrap().get(peer).cloned()
    }

    pub fn all_profiles(&self) -> HashMap<String, ProfileConfig> {
        self.profiles.lock().unwrap().clone()
    }

    /// Удаляет пира из обеих карт
    pub fn remove_peer(&self, peer: &str) {
        self.statuses.lock().unwrap().remove(peer);
        self.profiles.lock().unwrap().remove(peer);
    }

    pub fn clear(&self) {
        self.statuses.lock().unwrap().clear();
        self.profiles.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> ProfileConfig {
        ProfileConfig {
            id: 1,
            user_name: name.to_string(),
            user_avatar: String::new(),
            user_state: "online".to_string(),
            created_at: None,
        }
    }

    #[test]
    fn updates_replace_the_whole_value() {
        let cache = RemoteUserCache::new();
        let mut status = MirrorState::default();
        status.is_muted = true;
        status.custom_status = Some("afk".to_string());
        cache.set_mirrored_status("10.0.0.2", status);

        // новая запись без custom_status полностью вытесняет старую
        let mut next = MirrorState::default();
        next.is_deafened = true;
        cache.set_mirrored_status("10.0.0.2", next.clone());

        assert_eq!(cache.get_status("10.0.0.2"), Some(next));
    }

    #[test]
    fn remove_peer_clears_both_maps() {
        let cache = RemoteUserCache::new();
        cache.set_mirrored_status("10.0.0.2", MirrorState::default());
        cache.set_profile("10.0.0.2", profile("alice"));
        cache.set_profile("10.0.0.3", profile("bob"));

        cache.remove_peer("10.0.0.2");

        assert_eq!(cache.get_status("10.0.0.2"), None);
        assert_eq!(cache.get_profile("10.0.0.2"), None);
        assert_eq!(cache.all_profiles().len(), 1);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = RemoteUserCache::new();
        cache.set_mirrored_status("10.0.0.2", MirrorState::default());
        cache.set_profile("10.0.0.2", profile("alice"));

        cache.clear();

        assert!(cache.all_statuses().is_empty());
        assert!(cache.all_profiles().is_empty());
    }
}
