//! 송신 워커
//!
//! 디스패치 큐에서 이벤트를 꺼내 수신 서버로 전송하는 단일 태스크입니다.
//!
//! TCP 모드는 연결이 끊겨도 이벤트를 잃지 않습니다. 연결 실패 시 같은
//! 이벤트를 들고 재시도하고, 전송 실패 시 이벤트를 오프라인 큐에 넣은 뒤
//! 연결을 닫습니다. 재연결에 성공하면 오프라인 큐를 먼저 비우고 나서
//! 새 이벤트를 보냅니다. UDP 모드는 best-effort입니다. 실패한 datagram은
//! 버려지고 오프라인 큐를 거치지 않습니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use metrics::counter;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use canarywire_core::metrics::{
    EVENTS_DROPPED_TOTAL, EVENTS_SENT_TOTAL, LABEL_PROTOCOL, LABEL_REASON, RECONNECTS_TOTAL,
    SEND_FAILURES_TOTAL,
};
use canarywire_core::types::Protocol;
use canarywire_core::WireEvent;

use crate::config::ShipperConfig;
use crate::dispatch::{Dequeue, DispatchReceiver};
use crate::offline::OfflineQueue;

/// 워커 누적 통계. 파이프라인과 공유됩니다.
#[derive(Debug, Default)]
pub struct WorkerStats {
    sent: AtomicU64,
    failed: AtomicU64,
    reconnects: AtomicU64,
}

impl WorkerStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }
}

/// 이벤트 송신 워커
#[derive(Debug)]
pub struct DeliveryWorker {
    protocol: Protocol,
    host: String,
    tcp_port: u16,
    udp_port: u16,
    rate_limit: u32,
    dequeue_timeout: Duration,
    connect_backoff: Duration,
    send_cooldown: Duration,
    rx: DispatchReceiver,
    offline: Arc<OfflineQueue>,
    cancel: CancellationToken,
    stats: Arc<WorkerStats>,
    /// 연결 실패로 아직 전송하지 못한 이벤트
    pending: Option<WireEvent>,
}

impl DeliveryWorker {
    pub fn new(
        config: &ShipperConfig,
        rx: DispatchReceiver,
        offline: Arc<OfflineQueue>,
        cancel: CancellationToken,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            protocol: config.protocol,
            host: config.host.clone(),
            tcp_port: config.tcp_port,
            udp_port: config.udp_port,
            rate_limit: config.rate_limit,
            dequeue_timeout: Duration::from_secs(config.dequeue_timeout_secs),
            connect_backoff: Duration::from_secs(config.connect_backoff_secs),
            send_cooldown: Duration::from_secs(config.send_cooldown_secs),
            rx,
            offline,
            cancel,
            stats,
            pending: None,
        }
    }

    /// 취소 토큰이 눌리거나 큐가 닫힐 때까지 이벤트를 전송합니다.
    pub async fn run(mut self) {
        info!(
            protocol = %self.protocol,
            host = self.host.as_str(),
            "delivery worker started"
        );
        match self.protocol {
            Protocol::Tcp => self.run_tcp().await,
            Protocol::Udp => self.run_udp().await,
        }
        info!(
            sent = self.stats.sent(),
            failed = self.stats.failed(),
            reconnects = self.stats.reconnects(),
            "delivery worker stopped"
        );
    }

    async fn run_tcp(&mut self) {
        let mut conn: Option<TcpStream> = None;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let event = match self.pending.take() {
                Some(event) => event,
                None => match self.next_event().await {
                    NextEvent::Event(event) => event,
                    NextEvent::Idle => continue,
                    NextEvent::Stop => break,
                },
            };

            if conn.is_none() {
                match self.connect().await {
                    Some(mut stream) => match self.offline.drain_into(&mut stream).await {
                        Ok(0) => {
                            conn = Some(stream);
                        }
                        Ok(remaining) => {
                            // 백로그 송신 중 연결이 다시 끊김. 현재 이벤트는
                            // 백로그 뒤에 붙여 순서를 지킨다.
                            warn!(remaining, "offline drain interrupted, reconnecting");
                            counter!(SEND_FAILURES_TOTAL).increment(1);
                            self.stats.record_failure();
                            self.buffer_offline(&event);
                            self.pause(self.send_cooldown).await;
                            continue;
                        }
                        Err(e) => {
                            error!(error = %e, "offline store failure during drain");
                            self.pending = Some(event);
                            self.pause(self.send_cooldown).await;
                            continue;
                        }
                    },
                    None => {
                        self.pending = Some(event);
                        self.pause(self.connect_backoff).await;
                        continue;
                    }
                }
            }
            let Some(stream) = conn.as_mut() else {
                continue;
            };

            let mut frame = BytesMut::with_capacity(event.payload.len() + 1);
            frame.extend_from_slice(&event.payload);
            frame.put_u8(b'\n');

            match stream.write_all(&frame).await {
                Ok(()) => {
                    counter!(EVENTS_SENT_TOTAL, LABEL_PROTOCOL => "tcp").increment(1);
                    self.stats.record_sent();
                    debug!(bytes = frame.len(), event = %event, "event sent");
                    self.pace().await;
                }
                Err(e) => {
                    warn!(error = %e, event = %event, "TCP send failed, buffering event offline");
                    counter!(SEND_FAILURES_TOTAL).increment(1);
                    self.stats.record_failure();
                    self.buffer_offline(&event);
                    conn = None;
                    self.pause(self.send_cooldown).await;
                }
            }
        }
    }

    async fn run_udp(&mut self) {
        let socket = match UdpSocket::bind(("0.0.0.0", 0)).await {
            Ok(socket) => socket,
            Err(e) => {
                error!(error = %e, "failed to bind UDP socket, delivery worker exiting");
                return;
            }
        };

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let event = match self.next_event().await {
                NextEvent::Event(event) => event,
                NextEvent::Idle => continue,
                NextEvent::Stop => break,
            };

            match socket
                .send_to(&event.payload, (self.host.as_str(), self.udp_port))
                .await
            {
                Ok(bytes) => {
                    counter!(EVENTS_SENT_TOTAL, LABEL_PROTOCOL => "udp").increment(1);
                    self.stats.record_sent();
                    debug!(bytes, event = %event, "event sent");
                }
                Err(e) => {
                    // UDP는 best-effort. 실패한 datagram은 버린다.
                    warn!(error = %e, bytes = event.len(), event = %event, "UDP send failed, event dropped");
                    counter!(EVENTS_DROPPED_TOTAL, LABEL_REASON => "udp_send").increment(1);
                    self.stats.record_failure();
                }
            }
        }
    }

    /// 큐에서 다음 이벤트를 기다립니다. 타임아웃마다 취소 여부를 다시
    /// 확인할 수 있도록 [`NextEvent::Idle`]로 돌아옵니다.
    async fn next_event(&mut self) -> NextEvent {
        tokio::select! {
            _ = self.cancel.cancelled() => NextEvent::Stop,
            dequeued = self.rx.recv_timeout(self.dequeue_timeout) => match dequeued {
                Dequeue::Event(event) => NextEvent::Event(event),
                Dequeue::TimedOut => NextEvent::Idle,
                Dequeue::Closed => NextEvent::Stop,
            },
        }
    }

    async fn connect(&self) -> Option<TcpStream> {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            result = TcpStream::connect((self.host.as_str(), self.tcp_port)) => result,
        };
        match result {
            Ok(stream) => {
                info!(
                    host = self.host.as_str(),
                    port = self.tcp_port,
                    "TCP connected"
                );
                counter!(RECONNECTS_TOTAL).increment(1);
                self.stats.record_reconnect();
                Some(stream)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    host = self.host.as_str(),
                    port = self.tcp_port,
                    backoff_secs = self.connect_backoff.as_secs(),
                    "TCP connect failed, will retry"
                );
                None
            }
        }
    }

    fn buffer_offline(&self, event: &WireEvent) {
        if let Err(e) = self.offline.append(&event.payload) {
            error!(error = %e, event = %event, "failed to buffer event offline, event lost");
        }
    }

    /// 전송 속도 제한. 성공한 TCP 전송 후에만 호출됩니다.
    async fn pace(&self) {
        self.pause(Duration::from_secs_f64(1.0 / f64::from(self.rate_limit)))
            .await;
    }

    /// 취소 가능한 대기
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}

#[derive(Debug)]
enum NextEvent {
    Event(WireEvent),
    Idle,
    Stop,
}
