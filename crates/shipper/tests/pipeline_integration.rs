//! 파이프라인 통합 테스트
//!
//! 실제 파일 쓰기와 실제 소켓으로 테일링 -> 인리치 -> 전송 경로 전체를
//! 검증합니다. 수신 서버는 테스트가 직접 띄우는 TCP/UDP 리스너입니다.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;

use canarywire_core::pipeline::{HealthStatus, Pipeline};
use canarywire_core::types::Protocol;
use canarywire_shipper::store::CacheStore;
use canarywire_shipper::{EnrichmentSettings, ShipperConfig, ShipperPipeline, ThreatCache};

const SAMPLE_LINE: &str =
    r#"{"src_host":"10.0.0.5","dst_host":"127.0.0.1","logtype":"login","node_id":"honeypod-ssh"}"#;

struct TestDirs {
    watch: tempfile::TempDir,
    data: tempfile::TempDir,
}

fn test_dirs() -> TestDirs {
    TestDirs {
        watch: tempfile::tempdir().unwrap(),
        data: tempfile::tempdir().unwrap(),
    }
}

fn base_config(dirs: &TestDirs, tcp_port: u16) -> ShipperConfig {
    ShipperConfig {
        hostname: "honeypot-01".to_owned(),
        watch_dir: dirs.watch.path().display().to_string(),
        data_dir: dirs.data.path().display().to_string(),
        host: "127.0.0.1".to_owned(),
        tcp_port,
        poll_interval_ms: 25,
        rate_limit: 200,
        dequeue_timeout_secs: 1,
        connect_backoff_secs: 0,
        send_cooldown_secs: 0,
        ..ShipperConfig::default()
    }
}

fn append_line(path: &Path, line: &str) {
    use std::io::Write as _;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    writeln!(file, "{line}").unwrap();
}

/// 파이프라인 기동 직후 첫 스캔이 끝날 시간을 줌
async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

async fn read_json_line(reader: &mut BufReader<TcpStream>) -> Value {
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for event")
        .expect("read failed");
    serde_json::from_str(line.trim_end()).expect("event is not valid JSON")
}

async fn assert_no_line(reader: &mut BufReader<TcpStream>) {
    let mut line = String::new();
    let waited =
        tokio::time::timeout(Duration::from_millis(300), reader.read_line(&mut line)).await;
    assert!(waited.is_err(), "unexpected event arrived: {line}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_to_tcp_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let dirs = test_dirs();
    let mut pipeline = ShipperPipeline::builder()
        .config(base_config(&dirs, port))
        .build()
        .unwrap();
    pipeline.start().await.unwrap();
    settle().await;

    append_line(&dirs.watch.path().join("canary.log"), SAMPLE_LINE);

    let (stream, _) = listener.accept().await.unwrap();
    let mut reader = BufReader::new(stream);
    let event = read_json_line(&mut reader).await;

    assert_eq!(event["host.name"], "honeypot-01");
    assert_eq!(event["source.threat"], "neutral");
    assert_eq!(event["destination.threat"], "neutral");
    assert_eq!(event["tags"], serde_json::json!(["ssh", "opencanary"]));
    assert_eq!(event["message"], "[SSH] event login from 10.0.0.5");
    // 원본 필드 보존
    assert_eq!(event["src_host"], "10.0.0.5");
    assert_eq!(event["logtype"], "login");
    let ts = event["@timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());

    assert!(pipeline.health_check().await.is_healthy());
    pipeline.stop().await.unwrap();
    assert_eq!(pipeline.state_name(), "stopped");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delivery_retries_until_listener_appears() {
    // 포트만 예약하고 닫아 connection refused 상태를 만든다
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let dirs = test_dirs();
    let mut pipeline = ShipperPipeline::builder()
        .config(base_config(&dirs, port))
        .build()
        .unwrap();
    pipeline.start().await.unwrap();
    settle().await;

    append_line(&dirs.watch.path().join("canary.log"), SAMPLE_LINE);

    // 워커가 같은 이벤트로 재시도하는 동안 기다렸다가 리스너를 올림
    tokio::time::sleep(Duration::from_millis(150)).await;
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let (stream, _) = listener.accept().await.unwrap();
    let mut reader = BufReader::new(stream);
    let event = read_json_line(&mut reader).await;
    assert_eq!(event["logtype"], "login");

    // 연결 실패 동안 이벤트는 메모리에 보관되었으므로 오프라인 큐는 비어 있음
    assert!(pipeline.health_check().await.is_healthy());
    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_lines_are_deduped_across_restart() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let dirs = test_dirs();
    let log = dirs.watch.path().join("canary.log");
    let first = r#"{"logtype":"scan","node_id":"honeypod-http","src_host":"198.51.100.7"}"#;
    let second = r#"{"logtype":"login","node_id":"honeypod-http","src_host":"198.51.100.7"}"#;

    // 1차 실행: first 전송
    let mut pipeline = ShipperPipeline::builder()
        .config(base_config(&dirs, port))
        .build()
        .unwrap();
    pipeline.start().await.unwrap();
    settle().await;

    append_line(&log, first);
    let (stream, _) = listener.accept().await.unwrap();
    let mut reader = BufReader::new(stream);
    assert_eq!(read_json_line(&mut reader).await["logtype"], "scan");
    pipeline.stop().await.unwrap();

    // 2차 실행: 같은 data_dir. first는 재등장해도 걸러지고 second만 전송
    let mut pipeline = ShipperPipeline::builder()
        .config(base_config(&dirs, port))
        .build()
        .unwrap();
    pipeline.start().await.unwrap();
    settle().await;

    append_line(&log, first);
    append_line(&log, second);

    let (stream, _) = listener.accept().await.unwrap();
    let mut reader = BufReader::new(stream);
    assert_eq!(read_json_line(&mut reader).await["logtype"], "login");
    assert_no_line(&mut reader).await;
    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn udp_pipeline_delivers_bare_datagrams() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = receiver.local_addr().unwrap().port();

    let dirs = test_dirs();
    let mut config = base_config(&dirs, 1);
    config.protocol = Protocol::Udp;
    config.udp_port = port;

    let mut pipeline = ShipperPipeline::builder().config(config).build().unwrap();
    pipeline.start().await.unwrap();
    settle().await;

    append_line(&dirs.watch.path().join("canary.log"), SAMPLE_LINE);

    let mut buf = vec![0u8; 65536];
    let (n, _) = tokio::time::timeout(Duration::from_secs(5), receiver.recv_from(&mut buf))
        .await
        .expect("timed out waiting for datagram")
        .unwrap();
    // datagram 하나가 이벤트 하나. 개행 프레이밍 없음
    assert_ne!(buf[n - 1], b'\n');
    let event: Value = serde_json::from_slice(&buf[..n]).unwrap();
    assert_eq!(event["message"], "[SSH] event login from 10.0.0.5");

    pipeline.stop().await.unwrap();
}

// ─────────────────────────────────────────────
// 위협 평판 조회 (스텁 HTTP 서버)
// ─────────────────────────────────────────────

struct ReputationStub {
    url: String,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl ReputationStub {
    async fn spawn(score: i64, country: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/check", listener.local_addr().unwrap());
        let body = format!(
            r#"{{"data":{{"abuseConfidenceScore":{score},"countryCode":"{country}"}}}}"#
        );
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                serve_one(stream, &body, &counter).await;
            }
        });

        Self { url, hits, handle }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for ReputationStub {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_one(mut stream: TcpStream, body: &str, hits: &AtomicUsize) {
    // 요청 헤더 끝까지 읽고 응답
    let mut buf = vec![0u8; 4096];
    let mut total = 0;
    loop {
        match stream.read(&mut buf[total..]).await {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                if buf[..total].windows(4).any(|w| w == b"\r\n\r\n") || total == buf.len() {
                    break;
                }
            }
            Err(_) => return,
        }
    }
    hits.fetch_add(1, Ordering::SeqCst);

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len(),
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn stub_settings(url: &str) -> EnrichmentSettings {
    EnrichmentSettings {
        enabled: true,
        api_key: "test-key".to_owned(),
        api_url: url.to_owned(),
        lookup_timeout_secs: 2,
        cache_ttl_secs: 60,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_verdict_is_fetched_once_and_cached() {
    let stub = ReputationStub::spawn(77, "KR").await;
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path().join("cache.db")).unwrap();
    let cache = ThreatCache::new(stub_settings(&stub.url), store).unwrap();

    assert_eq!(cache.verdict_for("203.0.113.50").await, "High Risk 77% (KR)");
    assert_eq!(stub.hits(), 1);

    // 두 번째 조회는 캐시에서
    assert_eq!(cache.verdict_for("203.0.113.50").await, "High Risk 77% (KR)");
    assert_eq!(stub.hits(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_cache_entry_is_refreshed_from_remote() {
    let stub = ReputationStub::spawn(20, "US").await;
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::open(dir.path().join("cache.db")).unwrap();

    // TTL 60초를 넘긴 기존 verdict
    let now = chrono::Utc::now().timestamp();
    store
        .put("203.0.113.60", "High Risk 99% (XX)", now - 61)
        .unwrap();

    let cache = ThreatCache::new(stub_settings(&stub.url), store).unwrap();
    assert_eq!(cache.verdict_for("203.0.113.60").await, "Low Risk");
    assert_eq!(stub.hits(), 1);

    // 갱신 직후에는 다시 캐시 히트
    assert_eq!(cache.verdict_for("203.0.113.60").await, "Low Risk");
    assert_eq!(stub.hits(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn enrichment_verdicts_flow_through_pipeline() {
    let stub = ReputationStub::spawn(77, "KR").await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let dirs = test_dirs();
    let mut config = base_config(&dirs, port);
    config.enrichment = stub_settings(&stub.url);

    let mut pipeline = ShipperPipeline::builder().config(config).build().unwrap();
    pipeline.start().await.unwrap();
    settle().await;

    let line = r#"{"src_host":"203.0.113.77","dst_host":"10.0.0.1","logtype":"login","node_id":"honeypod-ssh"}"#;
    append_line(&dirs.watch.path().join("canary.log"), line);

    let (stream, _) = listener.accept().await.unwrap();
    let mut reader = BufReader::new(stream);
    let event = read_json_line(&mut reader).await;

    // 공인 주소만 원격 조회, 사설 주소는 즉시 neutral
    assert_eq!(event["source.threat"], "High Risk 77% (KR)");
    assert_eq!(event["destination.threat"], "neutral");
    assert_eq!(stub.hits(), 1);

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_reflects_offline_backlog() {
    // 리스너가 한 건 받고 연결을 끊으면 다음 이벤트는 오프라인 큐로 간다
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let dirs = test_dirs();
    let log = dirs.watch.path().join("canary.log");
    let mut pipeline = ShipperPipeline::builder()
        .config(base_config(&dirs, port))
        .build()
        .unwrap();
    pipeline.start().await.unwrap();
    settle().await;

    append_line(&log, r#"{"logtype":"one","node_id":"honeypod-ssh"}"#);
    let (stream, _) = listener.accept().await.unwrap();
    let mut reader = BufReader::new(stream);
    assert_eq!(read_json_line(&mut reader).await["logtype"], "one");

    // RST로 즉시 끊고, 리스너도 닫아 재연결이 계속 실패하게 만든다
    let stream = reader.into_inner();
    stream.set_linger(Some(Duration::ZERO)).unwrap();
    drop(stream);
    drop(listener);
    tokio::time::sleep(Duration::from_millis(100)).await;

    append_line(&log, r#"{"logtype":"two","node_id":"honeypod-ssh"}"#);

    // 전송 실패가 오프라인 큐에 쌓여 degraded로 보고될 때까지 대기
    let mut degraded = false;
    for _ in 0..50 {
        if let HealthStatus::Degraded(_) = pipeline.health_check().await {
            degraded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(degraded, "offline backlog never surfaced in health");

    pipeline.stop().await.unwrap();
}
