//! 설정 관리 -- canarywire.toml 파싱 및 런타임 설정
//!
//! [`CanarywireConfig`]는 전체 파이프라인 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`CANARYWIRE_DELIVERY_HOST=10.0.0.2` 형식)
//! 3. 설정 파일 (`canarywire.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), canarywire_core::error::CanarywireError> {
//! use canarywire_core::config::CanarywireConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = CanarywireConfig::load("canarywire.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = CanarywireConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CanarywireError, ConfigError};
use crate::types::Protocol;

/// dispatch queue 용량 허용 범위
pub const MIN_QUEUE_CAPACITY: usize = 1;
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// 라인 길이 제한 허용 범위 (바이트)
pub const MIN_LINE_LENGTH: usize = 256;
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Canarywire 통합 설정
///
/// `canarywire.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanarywireConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 로그 파일 감시 설정
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// 이벤트 전송 설정
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// 위협 평판 enrichment 설정
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    /// Prometheus 메트릭 노출 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl CanarywireConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CanarywireError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CanarywireError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CanarywireError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CanarywireError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, CanarywireError> {
        toml::from_str(toml_str).map_err(|e| {
            CanarywireError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `CANARYWIRE_{SECTION}_{FIELD}`
    /// 예: `CANARYWIRE_DELIVERY_HOST=10.0.0.2`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "CANARYWIRE_GENERAL_LOG_LEVEL");
        override_string(
            &mut self.general.log_format,
            "CANARYWIRE_GENERAL_LOG_FORMAT",
        );
        override_string(&mut self.general.hostname, "CANARYWIRE_GENERAL_HOSTNAME");
        override_string(&mut self.general.data_dir, "CANARYWIRE_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "CANARYWIRE_GENERAL_PID_FILE");

        // Watcher
        override_string(&mut self.watcher.watch_dir, "CANARYWIRE_WATCHER_WATCH_DIR");
        override_u64(
            &mut self.watcher.poll_interval_ms,
            "CANARYWIRE_WATCHER_POLL_INTERVAL_MS",
        );
        override_string(
            &mut self.watcher.file_suffix,
            "CANARYWIRE_WATCHER_FILE_SUFFIX",
        );
        override_usize(
            &mut self.watcher.max_line_length,
            "CANARYWIRE_WATCHER_MAX_LINE_LENGTH",
        );

        // Delivery
        override_string(&mut self.delivery.protocol, "CANARYWIRE_DELIVERY_PROTOCOL");
        override_string(&mut self.delivery.host, "CANARYWIRE_DELIVERY_HOST");
        override_u16(&mut self.delivery.tcp_port, "CANARYWIRE_DELIVERY_TCP_PORT");
        override_u16(&mut self.delivery.udp_port, "CANARYWIRE_DELIVERY_UDP_PORT");
        override_u32(
            &mut self.delivery.rate_limit,
            "CANARYWIRE_DELIVERY_RATE_LIMIT",
        );
        override_usize(
            &mut self.delivery.queue_capacity,
            "CANARYWIRE_DELIVERY_QUEUE_CAPACITY",
        );
        override_u64(
            &mut self.delivery.dequeue_timeout_secs,
            "CANARYWIRE_DELIVERY_DEQUEUE_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.delivery.connect_backoff_secs,
            "CANARYWIRE_DELIVERY_CONNECT_BACKOFF_SECS",
        );
        override_u64(
            &mut self.delivery.send_cooldown_secs,
            "CANARYWIRE_DELIVERY_SEND_COOLDOWN_SECS",
        );

        // Enrichment
        override_bool(&mut self.enrichment.enabled, "CANARYWIRE_ENRICHMENT_ENABLED");
        override_string(&mut self.enrichment.api_key, "CANARYWIRE_ENRICHMENT_API_KEY");
        override_string(&mut self.enrichment.api_url, "CANARYWIRE_ENRICHMENT_API_URL");
        override_u64(
            &mut self.enrichment.lookup_timeout_secs,
            "CANARYWIRE_ENRICHMENT_LOOKUP_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.enrichment.cache_ttl_secs,
            "CANARYWIRE_ENRICHMENT_CACHE_TTL_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "CANARYWIRE_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "CANARYWIRE_METRICS_LISTEN_ADDR",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CanarywireError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        // watcher 검증
        if self.watcher.watch_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "watcher.watch_dir".to_owned(),
                reason: "watch_dir must not be empty".to_owned(),
            }
            .into());
        }
        if self.watcher.max_line_length < MIN_LINE_LENGTH
            || self.watcher.max_line_length > MAX_LINE_LENGTH
        {
            return Err(ConfigError::InvalidValue {
                field: "watcher.max_line_length".to_owned(),
                reason: format!("must be within {MIN_LINE_LENGTH}..={MAX_LINE_LENGTH} bytes"),
            }
            .into());
        }

        // delivery 검증
        if Protocol::from_str_loose(&self.delivery.protocol).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "delivery.protocol".to_owned(),
                reason: "must be one of: tcp, udp".to_owned(),
            }
            .into());
        }
        if self.delivery.tcp_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "delivery.tcp_port".to_owned(),
                reason: "port must not be 0".to_owned(),
            }
            .into());
        }
        if self.delivery.udp_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "delivery.udp_port".to_owned(),
                reason: "port must not be 0".to_owned(),
            }
            .into());
        }
        if self.delivery.rate_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "delivery.rate_limit".to_owned(),
                reason: "rate_limit must be at least 1 event/sec".to_owned(),
            }
            .into());
        }
        if self.delivery.queue_capacity < MIN_QUEUE_CAPACITY
            || self.delivery.queue_capacity > MAX_QUEUE_CAPACITY
        {
            return Err(ConfigError::InvalidValue {
                field: "delivery.queue_capacity".to_owned(),
                reason: format!("must be within {MIN_QUEUE_CAPACITY}..={MAX_QUEUE_CAPACITY}"),
            }
            .into());
        }

        // enrichment 검증
        if self.enrichment.cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "enrichment.cache_ttl_secs".to_owned(),
                reason: "cache TTL must be at least 1 second".to_owned(),
            }
            .into());
        }
        if self.enrichment.enabled && self.enrichment.api_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "enrichment.api_key".to_owned(),
                reason: "api_key must not be empty when enrichment is enabled".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

// Default는 derive 매크로로 자동 생성 (각 필드가 Default를 구현하므로)

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 이벤트에 찍을 호스트명 ("auto"면 시스템에서 해석)
    pub hostname: String,
    /// SQLite 스토어가 위치하는 데이터 디렉토리
    pub data_dir: String,
    /// PID 파일 경로 (빈 문자열이면 사용 안 함)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            hostname: "auto".to_owned(),
            data_dir: "/var/lib/canarywire".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 로그 파일 감시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// 감시할 루트 디렉토리 (재귀 탐색)
    pub watch_dir: String,
    /// 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,
    /// 감시 대상 파일 접미사
    pub file_suffix: String,
    /// 한 라인의 최대 길이 (바이트, 초과분은 잘림)
    pub max_line_length: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_dir: "/var/tmp".to_owned(),
            poll_interval_ms: 1000,
            file_suffix: ".log".to_owned(),
            max_line_length: 64 * 1024,
        }
    }
}

/// 이벤트 전송 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// 전송 프로토콜 (tcp, udp)
    pub protocol: String,
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
    /// 큐에서 이벤트를 기다리는 최대 시간 (초, 종료 신호 확인 주기)
    pub dequeue_timeout_secs: u64,
    /// TCP 연결 실패 후 재시도 대기 시간 (초)
    pub connect_backoff_secs: u64,
    /// TCP 전송 실패 후 대기 시간 (초)
    pub send_cooldown_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            protocol: "tcp".to_owned(),
            host: "127.0.0.1".to_owned(),
            tcp_port: 12104,
            udp_port: 12105,
            rate_limit: 100,
            queue_capacity: 10_000,
            dequeue_timeout_secs: 2,
            connect_backoff_secs: 5,
            send_cooldown_secs: 3,
        }
    }
}

/// 위협 평판 enrichment 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
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

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            api_url: "https://api.abuseipdb.com/api/v2/check".to_owned(),
            lookup_timeout_secs: 5,
            cache_ttl_secs: 86_400, // 24시간
        }
    }
}

/// Prometheus 메트릭 노출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 메트릭 HTTP 리스너 활성화 여부
    pub enabled: bool,
    /// 메트릭 리스너 주소
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9400".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
