use crate::error::{Error, Result};
use crate::utils::{now_millis, random_id};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Ключ, под которым индексируются собственные отправленные сообщения
pub const SELF_PEER: &str = "self";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    #[serde(rename = "self")]
    Sent,
    #[serde(rename = "remote")]
    Received,
}

/// Личное сообщение; после вставки в журнал не изменяется
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub message_id: String,
    pub peer_address: String,
    pub content: String,
    pub direction: MessageDirection,
    pub timestamp_ms: i64,
}

#[derive(Default)]
struct StoreInner {
    // message_id -> сообщение
    history: HashMap<String, DirectMessage>,
    // id в порядке неубывания timestamp_ms
    timeline: Vec<String>,
    // адрес пира -> id в порядке вставки
    by_peer: HashMap<String, Vec<String>>,
    total: usize,
}

/// Журнал личных сообщений: общая временная шкала плюс срез по каждому пиру.
/// Вставка идемпотентна по message_id, записи не удаляются до конца сессии.
#[derive(Default)]
pub struct MessageStore {
    inner: Mutex<StoreInner>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Локальная отправка: пустой (после trim) текст отклоняется до любых
    /// побочных эффектов и не доходит ни до журнала, ни до сети.
    pub fn send(&self, content: &str) -> Result<DirectMessage> {
        let text = content.trim();
        if text.is_empty() {
            warn!("no message to send");
            return Err(Error::EmptySend);
        }

        let message = DirectMessage {
            message_id: random_id(),
            peer_address: SELF_PEER.to_string(),
            content: text.to_string(),
            direction: MessageDirection::Sent,
            timestamp_ms: now_millis(),
        };
        self.record(SELF_PEER, message.clone());
        Ok(message)
    }

    /// Вставка с сохранением порядка по времени; дубликат по id — no-op.
    /// Позиция ищется бинарным поиском по верхней границе, поэтому равные
    /// метки времени сохраняют порядок вставки.
    pub fn record(&self, peer: &str, message: DirectMessage) {
        let inner = &mut *self.inner.lock().unwrap();

        if inner.history.contains_key(&message.message_id) {
            debug!(id = %message.message_id, "duplicate message, ignored");
            return;
        }

        let ts = message.timestamp_ms;
        let id = message.message_id.clone();
        let pos = inner
            .timeline
            .partition_point(|other| inner.history.get(other).map_or(true, |m| m.timestamp_ms <= ts));

        inner.history.insert(id.clone(), message);
        inner.timeline.insert(pos, id.clone());
        inner.by_peer.entry(peer.to_string()).or_default().push(id);
        inner.total += 1;
    }

    pub fn messages_for(&self, peer: &str) -> Vec<DirectMessage> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_peer
            .get(peer)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.history.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all_messages(&self) -> Vec<DirectMessage> {
        let inner = self.inner.lock().unwrap();
        inner
            .timeline
            .iter()
            .filter_map(|id| inner.history.get(id).cloned())
            .collect()
    }

    pub fn latest_for(&self, peer: &str) -> Option<DirectMessage> {
        let inner = self.inner.lock().unwrap();
        let id = inner.by_peer.get(peer)?.last()?;
        inner.history.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn msg(id: &str, peer: &str, ts: i64) -> DirectMessage {
        DirectMessage {
            message_id: id.to_string(),
            peer_address: peer.to_string(),
            content: format!("msg {id}"),
            direction: MessageDirection::Received,
            timestamp_ms: ts,
        }
    }

    fn timestamps(store: &MessageStore) -> Vec<i64> {
        store.all_messages().iter().map(|m| m.timestamp_ms).collect()
    }

    #[test]
    fn timeline_stays_sorted_on_out_of_order_inserts() {
        let store = MessageStore::new();
        store.record("10.0.0.2", msg("a", "10.0.0.2", 300));
        store.record("10.0.0.2", msg("b", "10.0.0.2", 100));
        store.record("10.0.0.3", msg("c", "10.0.0.3", 200));
        store.record("10.0.0.3", msg("d", "10.0.0.3", 100));

        assert_eq!(timestamps(&store), vec![100, 100, 200, 300]);
        // при равных метках сохраняется порядок вставки
        let all = store.all_messages();
        assert_eq!(all[0].message_id, "b");
        assert_eq!(all[1].message_id, "d");
    }

    #[test]
    fn duplicate_insert_is_a_noop() {
        let store = MessageStore::new();
        store.record("10.0.0.2", msg("a", "10.0.0.2", 100));
        store.record("10.0.0.2", msg("a", "10.0.0.2", 999));

        assert_eq!(store.len(), 1);
        assert_eq!(store.all_messages().len(), 1);
        assert_eq!(store.messages_for("10.0.0.2").len(), 1);
        assert_eq!(store.all_messages()[0].timestamp_ms, 100);
    }

    #[test]
    fn per_peer_view_is_an_ordered_subsequence_of_the_timeline() {
        let store = MessageStore::new();
        store.record("a", msg("1", "a", 50));
        store.record("b", msg("2", "b", 10));
        store.record("a", msg("3", "a", 30));
        store.record("a", msg("4", "a", 30));

        let all: Vec<String> = store.all_messages().iter().map(|m| m.message_id.clone()).collect();
        let for_a: Vec<String> = store.messages_for("a").iter().map(|m| m.message_id.clone()).collect();

        let mut cursor = all.iter();
        for id in &for_a {
            assert!(cursor.any(|x| x == id), "{id} out of timeline order");
        }
    }

    #[test]
    fn empty_and_whitespace_sends_are_rejected_without_mutation() {
        let store = MessageStore::new();
        assert!(matches!(store.send(""), Err(Error::EmptySend)));
        assert!(matches!(store.send("   "), Err(Error::EmptySend)));
        assert!(store.is_empty());
        assert!(store.all_messages().is_empty());
    }

    #[test]
    fn send_trims_and_records_under_self() {
        let store = MessageStore::new();
        let sent = store.send("  hello  ").unwrap();
        assert_eq!(sent.content, "hello");
        assert_eq!(sent.direction, MessageDirection::Sent);
        assert_eq!(store.messages_for(SELF_PEER), vec![sent.clone()]);
        assert_eq!(store.latest_for(SELF_PEER), Some(sent));
    }

    #[test]
    fn latest_for_unknown_peer_is_none() {
        let store = MessageStore::new();
        assert_eq!(store.latest_for("10.9.9.9"), None);
        assert!(store.messages_for("10.9.9.9").is_empty());
    }

    proptest! {
        // после любой последовательности вставок шкала отсортирована
        #[test]
        fn timeline_sorted_after_arbitrary_records(entries in prop::collection::vec((0u8..8, 0i64..1000), 0..64)) {
            let store = MessageStore::new();
            for (i, (peer, ts)) in entries.iter().enumerate() {
                let peer = format!("10.0.0.{peer}");
                store.record(&peer, msg(&format!("id-{i}"), &peer, *ts));
                let stamps = timestamps(&store);
                prop_assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
            }
            prop_assert_eq!(store.len(), entries.len());
        }
    }
}
