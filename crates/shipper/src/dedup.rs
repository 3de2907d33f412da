//! 영속 중복 제거
//!
//! 원시 라인의 fingerprint를 [`DedupStore`]에 기록하여 같은 이벤트가
//! 두 번 전송되지 않도록 합니다. 파일 로테이션 재독이나 프로세스
//! 재시작으로 같은 라인이 다시 들어와도 여기서 걸러집니다.

use crate::error::ShipperError;
use crate::store::DedupStore;

/// fingerprint 기반 중복 제거 레지스트리
#[derive(Debug)]
pub struct DedupRegistry {
    store: DedupStore,
}

impl DedupRegistry {
    /// 스토어를 감싸는 레지스트리를 생성합니다.
    pub fn new(store: DedupStore) -> Self {
        Self { store }
    }

    /// fingerprint를 기록하고, 처음 본 것인지 여부를 반환합니다.
    ///
    /// `true`면 이 이벤트는 계속 진행해야 하고, `false`면 이미 처리한
    /// 중복입니다. 검사와 기록은 단일 스토어 연산으로 원자적입니다.
    pub fn first_sighting(&self, fingerprint: &str) -> Result<bool, ShipperError> {
        self.store.mark(fingerprint, chrono::Utc::now().timestamp())
    }

    /// 지금까지 기록된 fingerprint 수를 반환합니다.
    pub fn count(&self) -> Result<usize, ShipperError> {
        self.store.len()
    }
}
