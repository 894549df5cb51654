use serde::{Deserialize, Serialize};

/// Адреса узла в оверлейной сети
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Ips {
    pub ipv4: String,
    pub ipv6: String,
}

/// Снимок личности локального или удалённого пользователя
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub avatar: String,
    #[serde(rename = "IPs")]
    pub ips: Ips,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Text,
    Voice,
}

/// Канал (комната); временные голосовые каналы помечаются флагом
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary: Option<bool>,
}

/// Персистентный профиль пользователя; хранится вне ядра,
/// сюда попадает только для раздачи пирам и кэширования.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProfileConfig {
    pub id: i64,
    pub user_name: String,
    pub user_avatar: String,
    pub user_state: String,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}
