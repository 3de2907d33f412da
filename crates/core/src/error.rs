//! 에러 타입 -- 도메인별 에러 정의

/// Canarywire 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum CanarywireError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 영속 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중인 파이프라인을 다시 시작하려 함
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아닌 파이프라인을 정지하려 함
    #[error("pipeline is not running")]
    NotRunning,

    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),
}

/// 영속 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 스토어 열기/스키마 초기화 실패
    #[error("store open failed: {path}: {reason}")]
    Open { path: String, reason: String },

    /// 쿼리 실행 실패
    #[error("store operation '{operation}' failed: {reason}")]
    Operation { operation: String, reason: String },
}
