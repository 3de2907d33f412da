//! 유한 디스패치 큐
//!
//! 인리치 단계와 송신 워커 사이의 유한 mpsc 채널입니다. 큐가 가득 차면
//! 블로킹하지 않고 즉시 [`EnqueueOutcome::Full`]을 돌려주므로, 송신이
//! 밀려도 테일러가 멈추지 않습니다. 수신 측은 타임아웃이 있는 대기를
//! 사용해 주기적으로 종료 신호를 확인할 수 있습니다.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use canarywire_core::WireEvent;

/// 유한 디스패치 채널을 만듭니다.
pub fn channel(capacity: usize) -> (DispatchQueue, DispatchReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (DispatchQueue { tx, capacity }, DispatchReceiver { rx })
}

/// 큐 투입 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// 큐에 들어감
    Enqueued,
    /// 큐가 가득 차서 이벤트가 버려짐
    Full,
    /// 수신 측이 내려가서 이벤트가 버려짐
    Closed,
}

/// 큐에서 꺼내기 결과
#[derive(Debug)]
pub enum Dequeue {
    /// 이벤트 수신
    Event(WireEvent),
    /// 타임아웃까지 이벤트 없음
    TimedOut,
    /// 송신 측이 모두 내려감
    Closed,
}

/// 송신(투입) 핸들. 복제해서 여러 태스크에서 사용할 수 있습니다.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<WireEvent>,
    capacity: usize,
}

impl DispatchQueue {
    /// 이벤트를 블로킹 없이 큐에 넣습니다.
    pub fn try_enqueue(&self, event: WireEvent) -> EnqueueOutcome {
        match self.tx.try_send(event) {
            Ok(()) => EnqueueOutcome::Enqueued,
            Err(TrySendError::Full(_)) => EnqueueOutcome::Full,
            Err(TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// 수신 핸들. 송신 워커가 단독으로 소유합니다.
#[derive(Debug)]
pub struct DispatchReceiver {
    rx: mpsc::Receiver<WireEvent>,
}

impl DispatchReceiver {
    /// 이벤트를 기다리되 `timeout`이 지나면 [`Dequeue::TimedOut`]을
    /// 반환합니다. 워커는 이 주기로 취소 토큰을 확인합니다.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Dequeue {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(event)) => Dequeue::Event(event),
            Ok(None) => Dequeue::Closed,
            Err(_) => Dequeue::TimedOut,
        }
    }
}
