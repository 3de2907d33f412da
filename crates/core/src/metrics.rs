//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `canarywire_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(canarywire_core::metrics::EVENTS_INGESTED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 프로토콜 레이블 키 (tcp, udp)
pub const LABEL_PROTOCOL: &str = "protocol";

/// 드롭 사유 레이블 키 (malformed, duplicate, queue_full, udp_send)
pub const LABEL_REASON: &str = "reason";

// ─── Ingest / Enrichment 메트릭 ────────────────────────────────────

/// 큐에 들어간 이벤트 수 (counter)
pub const EVENTS_INGESTED_TOTAL: &str = "canarywire_events_ingested_total";

/// 드롭된 이벤트 수 (counter, label: reason)
pub const EVENTS_DROPPED_TOTAL: &str = "canarywire_events_dropped_total";

// ─── Delivery 메트릭 ───────────────────────────────────────────────

/// 전송 성공한 이벤트 수 (counter, label: protocol)
pub const EVENTS_SENT_TOTAL: &str = "canarywire_events_sent_total";

/// TCP 전송 실패 수 (counter)
pub const SEND_FAILURES_TOTAL: &str = "canarywire_send_failures_total";

/// TCP 재연결 성공 수 (counter)
pub const RECONNECTS_TOTAL: &str = "canarywire_reconnects_total";

// ─── Offline Queue 메트릭 ──────────────────────────────────────────

/// 오프라인 큐에 적재된 이벤트 수 (counter)
pub const OFFLINE_APPENDED_TOTAL: &str = "canarywire_offline_appended_total";

/// 오프라인 큐에서 재전송된 이벤트 수 (counter)
pub const OFFLINE_DRAINED_TOTAL: &str = "canarywire_offline_drained_total";

/// 현재 오프라인 큐 깊이 (gauge)
pub const OFFLINE_QUEUE_DEPTH: &str = "canarywire_offline_queue_depth";

// ─── Threat Cache 메트릭 ───────────────────────────────────────────

/// 캐시 적중 수 (counter)
pub const CACHE_HITS_TOTAL: &str = "canarywire_cache_hits_total";

/// 캐시 미스 수 (counter)
pub const CACHE_MISSES_TOTAL: &str = "canarywire_cache_misses_total";

/// 원격 평판 조회 실패 수 (counter)
pub const LOOKUP_FAILURES_TOTAL: &str = "canarywire_lookup_failures_total";

// ─── Tailer 메트릭 ─────────────────────────────────────────────────

/// 읽은 로그 라인 수 (counter)
pub const TAILER_LINES_READ_TOTAL: &str = "canarywire_tailer_lines_read_total";

/// 현재 감시 중인 파일 수 (gauge)
pub const TAILER_FILES_WATCHED: &str = "canarywire_tailer_files_watched";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "canarywire_daemon_build_info";

/// 데몬 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "canarywire_daemon_uptime_seconds";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// `metrics::describe_counter!()`, `describe_gauge!()`를 호출하여
/// Prometheus HELP 텍스트를 설정합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `canarywire-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Ingest / Enrichment
    describe_counter!(
        EVENTS_INGESTED_TOTAL,
        "Total number of events accepted into the dispatch queue"
    );
    describe_counter!(
        EVENTS_DROPPED_TOTAL,
        "Total number of events dropped before delivery, by reason"
    );

    // Delivery
    describe_counter!(
        EVENTS_SENT_TOTAL,
        "Total number of events successfully written to the wire, by protocol"
    );
    describe_counter!(
        SEND_FAILURES_TOTAL,
        "Total number of failed TCP send attempts"
    );
    describe_counter!(
        RECONNECTS_TOTAL,
        "Total number of successful TCP reconnections"
    );

    // Offline Queue
    describe_counter!(
        OFFLINE_APPENDED_TOTAL,
        "Total number of events appended to the offline queue"
    );
    describe_counter!(
        OFFLINE_DRAINED_TOTAL,
        "Total number of offline events redelivered after reconnect"
    );
    describe_gauge!(
        OFFLINE_QUEUE_DEPTH,
        "Current number of events waiting in the offline queue"
    );

    // Threat Cache
    describe_counter!(CACHE_HITS_TOTAL, "Total number of verdict cache hits");
    describe_counter!(CACHE_MISSES_TOTAL, "Total number of verdict cache misses");
    describe_counter!(
        LOOKUP_FAILURES_TOTAL,
        "Total number of failed remote reputation lookups"
    );

    // Tailer
    describe_counter!(
        TAILER_LINES_READ_TOTAL,
        "Total number of log lines read from watched files"
    );
    describe_gauge!(
        TAILER_FILES_WATCHED,
        "Number of log files currently being watched"
    );

    // Daemon
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
}
