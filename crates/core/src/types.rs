//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입

use std::fmt;

use serde::{Deserialize, Serialize};

/// 이벤트 전송 프로토콜
///
/// Sender의 동작 모드를 결정합니다. 시작 시 한 번 선택되며
/// 런타임 중 전환은 지원하지 않습니다.
///
/// - `Tcp`: 연결 지향. 전송 실패 시 오프라인 큐에 적재 후 재연결 시 재전송
/// - `Udp`: best-effort 데이터그램. 실패한 이벤트는 버려집니다
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP 스트림 전송
    #[default]
    Tcp,
    /// UDP 데이터그램 전송
    Udp,
}

impl Protocol {
    /// 문자열에서 프로토콜을 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            _ => None,
        }
    }

    /// 이 프로토콜이 전송 확인(delivery confirmation)을 제공하는지 여부
    ///
    /// UDP는 전송 확인이 없으므로 오프라인 큐 경로가 존재하지 않습니다.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Tcp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}
