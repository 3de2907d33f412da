//! 이벤트 타입 -- 전송 파이프라인을 흐르는 이벤트의 공통 정의
//!
//! 원시 로그 라인은 enrichment를 거쳐 [`WireEvent`]로 직렬화되어
//! dispatch queue와 sender 사이를 이동합니다. enrichment가 추가하는
//! 필드명과 입력 라인에서 인식하는 키는 이 모듈의 상수로 고정됩니다.

use std::fmt;

use bytes::Bytes;

// --- enrichment가 추가하는 필드명 상수 ---
// 중첩 객체가 아닌 평탄한(flat) 키를 그대로 사용합니다.

/// 이벤트 발생 시각 (UTC, RFC3339)
pub const FIELD_TIMESTAMP: &str = "@timestamp";
/// 이벤트를 수집한 호스트명
pub const FIELD_HOST_NAME: &str = "host.name";
/// 출발지 주소의 위협 verdict
pub const FIELD_SOURCE_THREAT: &str = "source.threat";
/// 목적지 주소의 위협 verdict
pub const FIELD_DESTINATION_THREAT: &str = "destination.threat";
/// 태그 목록 (`[module, "opencanary"]`)
pub const FIELD_TAGS: &str = "tags";
/// 사람이 읽을 수 있는 요약 메시지
pub const FIELD_MESSAGE: &str = "message";

// --- 입력 라인에서 인식하는 선택적 키 ---

/// 출발지 주소 키
pub const KEY_SRC_HOST: &str = "src_host";
/// 목적지 주소 키
pub const KEY_DST_HOST: &str = "dst_host";
/// 이벤트 종류 키
pub const KEY_LOGTYPE: &str = "logtype";
/// 노드 식별자 키 (예: `"honeypod-ssh"`)
pub const KEY_NODE_ID: &str = "node_id";

// --- verdict / 태그 상수 ---

/// 위협 없음을 나타내는 verdict
pub const VERDICT_NEUTRAL: &str = "neutral";
/// 모든 이벤트에 공통으로 붙는 스위트 태그
pub const TAG_SUITE: &str = "opencanary";

/// 원시 라인의 fingerprint를 계산합니다.
///
/// blake3 해시의 hex 문자열로, 프로세스 재시작과 무관하게 안정적입니다.
/// 동일한 바이트 열은 언제나 동일한 fingerprint를 갖습니다.
pub fn fingerprint(raw_line: &str) -> String {
    blake3::hash(raw_line.as_bytes()).to_hex().to_string()
}

/// `node_id`에서 모듈명을 추출합니다.
///
/// 마지막 하이픈 뒤의 세그먼트를 반환하며, 하이픈이 없으면 전체 문자열을
/// 그대로 반환합니다 (`"honeypod-ssh"` -> `"ssh"`, `"ftp"` -> `"ftp"`).
pub fn module_from_node_id(node_id: &str) -> &str {
    node_id.rsplit('-').next().unwrap_or(node_id)
}

/// 직렬화가 끝난 전송 대기 이벤트
///
/// `payload`는 개행 없이 압축 직렬화된 JSON 한 건이며, wire에 쓰일 때
/// 프로토콜에 맞게 프레이밍됩니다 (TCP: 개행 추가, UDP: 데이터그램 단위).
/// enrichment 완료 후에는 불변입니다.
#[derive(Debug, Clone)]
pub struct WireEvent {
    /// 압축 직렬화된 JSON 바이트
    pub payload: Bytes,
    /// 원시 라인에서 계산한 fingerprint (hex)
    pub fingerprint: String,
}

impl WireEvent {
    /// 새 전송 이벤트를 생성합니다.
    pub fn new(payload: impl Into<Bytes>, fingerprint: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            fingerprint: fingerprint.into(),
        }
    }

    /// payload 크기를 바이트 단위로 반환합니다.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// payload가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Display for WireEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WireEvent[{}] {} bytes",
            &self.fingerprint[..8.min(self.fingerprint.len())],
            self.payload.len(),
        )
    }
}
