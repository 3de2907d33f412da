//! 이벤트 인리치 단계
//!
//! 테일러가 읽은 원시 JSON 라인을 받아 중복을 거르고, 출발지/목적지
//! 주소의 위협 verdict와 전송 메타데이터를 스탬프한 뒤 디스패치 큐에
//! 넣습니다. 라인 하나가 이벤트 하나입니다.

use std::sync::Arc;

use chrono::SecondsFormat;
use metrics::counter;
use serde_json::Value;
use tracing::{debug, error, warn};

use canarywire_core::event::{
    FIELD_DESTINATION_THREAT, FIELD_HOST_NAME, FIELD_MESSAGE, FIELD_SOURCE_THREAT, FIELD_TAGS,
    FIELD_TIMESTAMP, KEY_DST_HOST, KEY_LOGTYPE, KEY_NODE_ID, KEY_SRC_HOST, TAG_SUITE,
};
use canarywire_core::metrics::{EVENTS_DROPPED_TOTAL, EVENTS_INGESTED_TOTAL, LABEL_REASON};
use canarywire_core::{event, WireEvent};

use crate::cache::ThreatCache;
use crate::dedup::DedupRegistry;
use crate::dispatch::{DispatchQueue, EnqueueOutcome};

/// 라인 하나의 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 스탬프 후 큐 투입 완료
    Enqueued,
    /// JSON 오브젝트로 파싱되지 않아 버림
    DroppedMalformed,
    /// 이미 처리한 이벤트라 버림
    DroppedDuplicate,
    /// 디스패치 큐가 가득 차서 버림
    DroppedQueueFull,
    /// 파이프라인이 종료 중이라 버림
    DroppedShutdown,
}

/// 원시 라인을 전송 가능한 이벤트로 가공하는 단계
#[derive(Debug)]
pub struct Enricher {
    registry: Arc<DedupRegistry>,
    cache: Arc<ThreatCache>,
    queue: DispatchQueue,
    hostname: String,
}

impl Enricher {
    pub fn new(
        registry: Arc<DedupRegistry>,
        cache: Arc<ThreatCache>,
        queue: DispatchQueue,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            cache,
            queue,
            hostname: hostname.into(),
        }
    }

    /// 원시 라인 하나를 처리합니다.
    ///
    /// 중복 판정은 스탬프 전의 라인 내용으로 하므로, 같은 이벤트가 다시
    /// 들어오면 타임스탬프가 달라도 걸러집니다. 중복 스토어가 고장난
    /// 경우에는 유실보다 중복 전송을 택합니다.
    pub async fn ingest(&self, raw: &str) -> IngestOutcome {
        let line = raw.trim();
        if line.is_empty() {
            counter!(EVENTS_DROPPED_TOTAL, LABEL_REASON => "malformed").increment(1);
            return IngestOutcome::DroppedMalformed;
        }

        let mut parsed = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!(kind = json_kind(&other), "dropping non-object event line");
                counter!(EVENTS_DROPPED_TOTAL, LABEL_REASON => "malformed").increment(1);
                return IngestOutcome::DroppedMalformed;
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed event line");
                counter!(EVENTS_DROPPED_TOTAL, LABEL_REASON => "malformed").increment(1);
                return IngestOutcome::DroppedMalformed;
            }
        };

        let fingerprint = event::fingerprint(line);
        match self.registry.first_sighting(&fingerprint) {
            Ok(true) => {}
            Ok(false) => {
                debug!(fingerprint = fingerprint.as_str(), "dropping duplicate event");
                counter!(EVENTS_DROPPED_TOTAL, LABEL_REASON => "duplicate").increment(1);
                return IngestOutcome::DroppedDuplicate;
            }
            Err(e) => {
                error!(error = %e, "dedup check failed, shipping event anyway");
            }
        }

        let src_host = text_field(&parsed, KEY_SRC_HOST);
        let dst_host = text_field(&parsed, KEY_DST_HOST);
        let logtype =
            text_field(&parsed, KEY_LOGTYPE).unwrap_or_else(|| "unknown".to_owned());
        let node_id = text_field(&parsed, KEY_NODE_ID).unwrap_or_default();

        let src_threat = self
            .cache
            .verdict_for(src_host.as_deref().unwrap_or(""))
            .await;
        let dst_threat = self
            .cache
            .verdict_for(dst_host.as_deref().unwrap_or(""))
            .await;

        let module = event::module_from_node_id(&node_id);
        let message = format!(
            "[{}] event {} from {}",
            module.to_uppercase(),
            logtype,
            src_host.as_deref().unwrap_or("unknown"),
        );
        let timestamp = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        parsed.insert(FIELD_TIMESTAMP.to_owned(), Value::from(timestamp));
        parsed.insert(FIELD_HOST_NAME.to_owned(), Value::from(self.hostname.clone()));
        parsed.insert(FIELD_SOURCE_THREAT.to_owned(), Value::from(src_threat));
        parsed.insert(FIELD_DESTINATION_THREAT.to_owned(), Value::from(dst_threat));
        parsed.insert(
            FIELD_TAGS.to_owned(),
            Value::from(vec![module.to_owned(), TAG_SUITE.to_owned()]),
        );
        parsed.insert(FIELD_MESSAGE.to_owned(), Value::from(message));

        let payload = match serde_json::to_vec(&parsed) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "failed to serialize stamped event");
                counter!(EVENTS_DROPPED_TOTAL, LABEL_REASON => "malformed").increment(1);
                return IngestOutcome::DroppedMalformed;
            }
        };

        match self.queue.try_enqueue(WireEvent::new(payload, fingerprint)) {
            EnqueueOutcome::Enqueued => {
                counter!(EVENTS_INGESTED_TOTAL).increment(1);
                IngestOutcome::Enqueued
            }
            EnqueueOutcome::Full => {
                warn!(
                    capacity = self.queue.capacity(),
                    "dispatch queue full, dropping event"
                );
                counter!(EVENTS_DROPPED_TOTAL, LABEL_REASON => "queue_full").increment(1);
                IngestOutcome::DroppedQueueFull
            }
            EnqueueOutcome::Closed => {
                debug!("dispatch queue closed, dropping event");
                IngestOutcome::DroppedShutdown
            }
        }
    }
}

/// 필드 값을 텍스트로 꺼냅니다. 문자열이 아닌 값은 JSON 표기 그대로
/// 사용하고, 없거나 null이면 `None`입니다.
fn text_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
