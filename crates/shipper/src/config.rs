//! 전송 파이프라인 설정
//!
//! [`ShipperConfig`]는 core의 [`CanarywireConfig`](canarywire_core::config::CanarywireConfig)에서
//! 파생되며, 파이프라인이 실제로 사용하는 값으로 정규화합니다
//! (프로토콜 문자열 -> enum, "auto" 호스트명 해석 등).
//!
//! # 사용 예시
//! ```ignore
//! use canarywire_core::config::CanarywireConfig;
//! use canarywire_shipper::config::ShipperConfig;
//!
//! let core_config = CanarywireConfig::default();
//! let config = ShipperConfig::from_core(&core_config);
//! ```

use serde::{Deserialize, Serialize};

use canarywire_core::config::{MAX_QUEUE_CAPACITY, MIN_QUEUE_CAPACITY};
use canarywire_core::types::Protocol;

use crate::error::ShipperError;

/// 위협 평판 enrichment 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// 원격 평판 조회 활성화 여부
    pub enabled: bool,
    /// 평판 API 키
    pub api_key: String,
    /// 평판 API 엔드포인트
    pub api_url: String,
    /// 평판 조회 HTTP 타임아웃 (초)
    pub lookup_timeout_secs: u64,
    /// verdict 캐시 TTL (초)
    pub cache_ttl_secs: u64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            api_url: "https://api.abuseipdb.com/api/v2/check".to_owned(),
            lookup_timeout_secs: 5,
            cache_ttl_secs: 86_400,
        }
    }
}

/// 전송 파이프라인 설정
///
/// core 설정의 general/watcher/delivery/enrichment 섹션에서 파생됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipperConfig {
    /// 이벤트에 찍을 호스트명 (이미 해석된 값)
    pub hostname: String,
    /// SQLite 스토어 디렉토리
    pub data_dir: String,
    /// 감시할 루트 디렉토리
    pub watch_dir: String,
    /// 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 감시 대상 파일 접미사
    pub file_suffix: String,
    /// 한 라인의 최대 길이 (바이트)
    pub max_line_length: usize,
    /// 전송 프로토콜
    pub protocol: Protocol,
    /// 수신 서버 주소
    pub host: String,
    /// TCP 포트
    pub tcp_port: u16,
    /// UDP 포트
    pub udp_port: u16,
    /// 초당 최대 전송 이벤트 수 (TCP pacing)
    pub rate_limit: u32,
    /// dispatch queue 용량
    pub queue_capacity: usize,
    /// 큐에서 이벤트를 기다리는 최대 시간 (초)
    pub dequeue_timeout_secs: u64,
    /// TCP 연결 실패 후 재시도 대기 시간 (초)
    pub connect_backoff_secs: u64,
    /// TCP 전송 실패 후 대기 시간 (초)
    pub send_cooldown_secs: u64,
    /// enrichment 설정
    pub enrichment: EnrichmentSettings,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            hostname: "unknown".to_owned(),
            data_dir: "/var/lib/canarywire".to_owned(),
            watch_dir: "/var/tmp".to_owned(),
            poll_interval_ms: 1000,
            file_suffix: ".log".to_owned(),
            max_line_length: 64 * 1024,
            protocol: Protocol::Tcp,
            host: "127.0.0.1".to_owned(),
            tcp_port: 12104,
            udp_port: 12105,
            rate_limit: 100,
            queue_capacity: 10_000,
            dequeue_timeout_secs: 2,
            connect_backoff_secs: 5,
            send_cooldown_secs: 3,
            enrichment: EnrichmentSettings::default(),
        }
    }
}

impl ShipperConfig {
    /// core의 `CanarywireConfig`에서 파이프라인 설정을 생성합니다.
    ///
    /// `hostname = "auto"`는 이 시점에 실제 호스트명으로 해석됩니다.
    pub fn from_core(core: &canarywire_core::config::CanarywireConfig) -> Self {
        Self {
            hostname: resolve_hostname(&core.general.hostname),
            data_dir: core.general.data_dir.clone(),
            watch_dir: core.watcher.watch_dir.clone(),
            poll_interval_ms: core.watcher.poll_interval_ms,
            file_suffix: core.watcher.file_suffix.clone(),
            max_line_length: core.watcher.max_line_length,
            protocol: Protocol::from_str_loose(&core.delivery.protocol).unwrap_or_default(),
            host: core.delivery.host.clone(),
            tcp_port: core.delivery.tcp_port,
            udp_port: core.delivery.udp_port,
            rate_limit: core.delivery.rate_limit,
            queue_capacity: core.delivery.queue_capacity,
            dequeue_timeout_secs: core.delivery.dequeue_timeout_secs,
            connect_backoff_secs: core.delivery.connect_backoff_secs,
            send_cooldown_secs: core.delivery.send_cooldown_secs,
            enrichment: EnrichmentSettings {
                enabled: core.enrichment.enabled,
                api_key: core.enrichment.api_key.clone(),
                api_url: core.enrichment.api_url.clone(),
                lookup_timeout_secs: core.enrichment.lookup_timeout_secs,
                cache_ttl_secs: core.enrichment.cache_ttl_secs,
            },
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ShipperError> {
        if self.host.is_empty() {
            return Err(ShipperError::Config {
                field: "host".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.watch_dir.is_empty() {
            return Err(ShipperError::Config {
                field: "watch_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.data_dir.is_empty() {
            return Err(ShipperError::Config {
                field: "data_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.rate_limit == 0 {
            return Err(ShipperError::Config {
                field: "rate_limit".to_owned(),
                reason: "must be at least 1 event/sec".to_owned(),
            });
        }

        if self.queue_capacity < MIN_QUEUE_CAPACITY || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ShipperError::Config {
                field: "queue_capacity".to_owned(),
                reason: format!("must be {MIN_QUEUE_CAPACITY}-{MAX_QUEUE_CAPACITY}"),
            });
        }

        if self.dequeue_timeout_secs == 0 {
            return Err(ShipperError::Config {
                field: "dequeue_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.enrichment.enabled && self.enrichment.api_key.is_empty() {
            return Err(ShipperError::Config {
                field: "enrichment.api_key".to_owned(),
                reason: "must not be empty when enrichment is enabled".to_owned(),
            });
        }

        if self.enrichment.cache_ttl_secs == 0 {
            return Err(ShipperError::Config {
                field: "enrichment.cache_ttl_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        Ok(())
    }
}

/// 설정된 호스트명을 실제 호스트명으로 해석합니다.
///
/// `"auto"` 또는 빈 문자열이면 `$HOSTNAME`, `/proc/sys/kernel/hostname`
/// 순으로 시도하고, 모두 실패하면 `"unknown"`을 반환합니다.
pub fn resolve_hostname(configured: &str) -> String {
    if !configured.is_empty() && configured != "auto" {
        return configured.to_owned();
    }

    if let Ok(name) = std::env::var("HOSTNAME") {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            return trimmed.to_owned();
        }
    }

    if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            return trimmed.to_owned();
        }
    }

    "unknown".to_owned()
}

/// 파이프라인 설정 빌더
///
/// 필드가 많으므로 테스트와 임베딩 환경에서는 빌더 패턴을 사용합니다.
#[derive(Default)]
pub struct ShipperConfigBuilder {
    config: ShipperConfig,
}

impl ShipperConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 호스트명을 설정합니다 (해석 없이 그대로 사용).
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = hostname.into();
        self
    }

    /// 스토어 디렉토리를 설정합니다.
    pub fn data_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    /// 감시 디렉토리를 설정합니다.
    pub fn watch_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.watch_dir = dir.into();
        self
    }

    /// 폴링 주기(밀리초)를 설정합니다.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// 감시 대상 파일 접미사를 설정합니다.
    pub fn file_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.file_suffix = suffix.into();
        self
    }

    /// 전송 프로토콜을 설정합니다.
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// 수신 서버 주소를 설정합니다.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// TCP 포트를 설정합니다.
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.config.tcp_port = port;
        self
    }

    /// UDP 포트를 설정합니다.
    pub fn udp_port(mut self, port: u16) -> Self {
        self.config.udp_port = port;
        self
    }

    /// 초당 최대 전송 이벤트 수를 설정합니다.
    pub fn rate_limit(mut self, limit: u32) -> Self {
        self.config.rate_limit = limit;
        self
    }

    /// dispatch queue 용량을 설정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// dequeue 대기 시간(초)을 설정합니다.
    pub fn dequeue_timeout_secs(mut self, secs: u64) -> Self {
        self.config.dequeue_timeout_secs = secs;
        self
    }

    /// 연결 재시도 대기 시간(초)을 설정합니다.
    pub fn connect_backoff_secs(mut self, secs: u64) -> Self {
        self.config.connect_backoff_secs = secs;
        self
    }

    /// 전송 실패 대기 시간(초)을 설정합니다.
    pub fn send_cooldown_secs(mut self, secs: u64) -> Self {
        self.config.send_cooldown_secs = secs;
        self
    }

    /// enrichment 설정을 지정합니다.
    pub fn enrichment(mut self, settings: EnrichmentSettings) -> Self {
        self.config.enrichment = settings;
        self
    }

    /// 설정을 검증하고 `ShipperConfig`를 생성합니다.
    pub fn build(self) -> Result<ShipperConfig, ShipperError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
