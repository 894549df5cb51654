use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Текущее время в миллисекундах unix-эпохи
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
