//! 오프라인 이벤트 큐
//!
//! 송신 실패한 이벤트를 [`OfflineStore`]에 보관했다가 연결이 복구되면
//! FIFO 순서로 재전송합니다. 항목은 전송이 성공한 직후 개별 삭제되므로
//! 배출 도중 프로세스가 죽어도 미전송 이벤트는 남습니다.

use bytes::{BufMut, BytesMut};
use metrics::{counter, gauge};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use canarywire_core::metrics::{
    OFFLINE_APPENDED_TOTAL, OFFLINE_DRAINED_TOTAL, OFFLINE_QUEUE_DEPTH,
};

use crate::error::ShipperError;
use crate::store::OfflineStore;

/// 디스크 기반 오프라인 이벤트 큐
#[derive(Debug)]
pub struct OfflineQueue {
    store: OfflineStore,
}

impl OfflineQueue {
    pub fn new(store: OfflineStore) -> Self {
        Self { store }
    }

    /// 이벤트 페이로드를 큐 끝에 추가합니다.
    pub fn append(&self, payload: &[u8]) -> Result<(), ShipperError> {
        let queued_at = chrono::Utc::now().timestamp();
        let id = self.store.append(payload, queued_at)?;
        counter!(OFFLINE_APPENDED_TOTAL).increment(1);
        debug!(id, bytes = payload.len(), "event buffered offline");
        self.update_depth_gauge();
        Ok(())
    }

    /// 큐에 남아 있는 이벤트 수
    pub fn len(&self) -> Result<usize, ShipperError> {
        self.store.len()
    }

    pub fn is_empty(&self) -> Result<bool, ShipperError> {
        Ok(self.store.len()? == 0)
    }

    /// 큐를 앞에서부터 `sink`로 배출합니다. 각 페이로드 뒤에는 개행이
    /// 붙습니다.
    ///
    /// 항목은 쓰기가 성공한 직후 삭제됩니다. 쓰기가 실패하면 해당 항목을
    /// 남겨둔 채 중단하고 남은 항목 수를 반환합니다. 완전히 배출되면
    /// `Ok(0)`입니다. 스토어 오류는 `Err`로 전파됩니다.
    pub async fn drain_into<W>(&self, sink: &mut W) -> Result<usize, ShipperError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut drained = 0usize;
        loop {
            let Some((id, payload)) = self.store.front()? else {
                break;
            };
            let mut framed = BytesMut::with_capacity(payload.len() + 1);
            framed.extend_from_slice(&payload);
            framed.put_u8(b'\n');
            if let Err(e) = sink.write_all(&framed).await {
                debug!(error = %e, drained, "offline drain interrupted by send failure");
                self.update_depth_gauge();
                return Ok(self.store.len()?);
            }
            self.store.remove(id)?;
            counter!(OFFLINE_DRAINED_TOTAL).increment(1);
            drained += 1;
        }
        if drained > 0 {
            info!(drained, "offline queue drained");
        }
        self.update_depth_gauge();
        Ok(0)
    }

    fn update_depth_gauge(&self) {
        if let Ok(depth) = self.store.len() {
            gauge!(OFFLINE_QUEUE_DEPTH).set(depth as f64);
        }
    }
}
