//! 파이프라인 trait -- 모듈 생명주기 확장 포인트 정의
//!
//! 데몬은 파이프라인을 이 trait을 통해 시작/정지하고 상태를 조회합니다.

use serde::Serialize;
use std::fmt;

use crate::error::CanarywireError;

/// 파이프라인 건강 상태
///
/// `health_check()`가 반환하며, 데몬의 주기적 상태 로그에 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "detail")]
pub enum HealthStatus {
    /// 정상 동작 중
    Healthy,
    /// 동작 중이지만 주의가 필요한 상태 (사유 포함)
    Degraded(String),
    /// 동작 불가 상태 (사유 포함)
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded(reason) => write!(f, "degraded: {reason}"),
            HealthStatus::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 모듈 파이프라인의 공통 생명주기 trait
///
/// 데몬은 구체 타입을 직접 소유하므로 dyn 없이 async fn을 사용합니다.
#[allow(async_fn_in_trait)]
pub trait Pipeline {
    /// 파이프라인을 시작합니다. 이미 실행 중이면 에러를 반환합니다.
    async fn start(&mut self) -> Result<(), CanarywireError>;

    /// 파이프라인을 정지하고 백그라운드 태스크를 정리합니다.
    async fn stop(&mut self) -> Result<(), CanarywireError>;

    /// 현재 건강 상태를 반환합니다.
    async fn health_check(&self) -> HealthStatus;
}
