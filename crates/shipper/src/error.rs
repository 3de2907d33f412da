//! 전송 파이프라인 에러 타입
//!
//! [`ShipperError`]는 shipper 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<ShipperError> for CanarywireError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use canarywire_core::error::{CanarywireError, PipelineError};

/// 전송 파이프라인 도메인 에러
///
/// 스토어 I/O, 설정, 채널 통신, HTTP 조회 등 파이프라인 내부의
/// 모든 에러 상황을 포괄합니다.
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    /// SQLite 스토어 연산 실패
    #[error("store error: {operation}: {reason}")]
    Store {
        /// 실패한 연산 (open, mark, append 등)
        operation: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// HTTP 클라이언트 에러
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ShipperError> for CanarywireError {
    fn from(err: ShipperError) -> Self {
        CanarywireError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let err = ShipperError::Store {
            operation: "mark".to_owned(),
            reason: "database is locked".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("mark"));
        assert!(msg.contains("database is locked"));
    }

    #[test]
    fn config_error_display() {
        let err = ShipperError::Config {
            field: "delivery.host".to_owned(),
            reason: "must not be empty".to_owned(),
        };
        assert!(err.to_string().contains("delivery.host"));
    }

    #[test]
    fn converts_to_canarywire_error() {
        let err = ShipperError::Channel("receiver closed".to_owned());
        let top: CanarywireError = err.into();
        assert!(matches!(top, CanarywireError::Pipeline(_)));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ShipperError = io.into();
        assert!(matches!(err, ShipperError::Io(_)));
    }
}
