// Конфигурация ядра: фиксированный локальный релей и тайминги.
// Релей слушает на localhost и пробрасывает сигнальные сообщения
// до порта сигналинга пира внутри оверлейной сети.

use std::time::Duration;

/// Базовый URL локального форвардера сигналинга
pub const RELAY_URL: &str = "http://127.0.0.1:8849/";

/// Порт сигналинга на стороне пира
pub const SIGNALING_PORT: u16 = 8848;

/// Таймаут одного сигнального обмена через релей
pub const SIGNALING_TIMEOUT: Duration = Duration::from_millis(5000);

/// Максимальное ожидание окончания сбора кандидатов
pub const GATHER_TIMEOUT: Duration = Duration::from_secs(10);

/// Период ожидания перед принудительным отключением
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Окно слияния быстрых изменений зеркального статуса
pub const MIRROR_DEBOUNCE: Duration = Duration::from_millis(5);

/// Интервал ping по data-channel
pub const PING_INTERVAL: Duration = Duration::from_secs(1);

/// Если pong не пришёл за это время, замер латентности сбрасывается
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Метка data-channel
pub const DATA_CHANNEL_LABEL: &str = "ovc-data";
