//! 전송 파이프라인 조립과 생명주기
//!
//! 빌더가 영속 스토어와 단계 사이 채널을 준비하고, `start()`가 테일러와
//! 송신 워커를 백그라운드 태스크로 띄웁니다. `stop()`은 취소 토큰을
//! 누르고 모든 태스크가 내려갈 때까지 기다립니다.
//!
//! # 사용 예시
//! ```ignore
//! use canarywire_core::Pipeline;
//! use canarywire_shipper::{ShipperConfig, ShipperPipeline};
//!
//! let mut pipeline = ShipperPipeline::builder()
//!     .config(ShipperConfig::default())
//!     .build()?;
//! pipeline.start().await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use canarywire_core::error::{CanarywireError, PipelineError};
use canarywire_core::pipeline::{HealthStatus, Pipeline};

use crate::cache::ThreatCache;
use crate::config::ShipperConfig;
use crate::dedup::DedupRegistry;
use crate::dispatch::{self, DispatchReceiver};
use crate::enrich::Enricher;
use crate::error::ShipperError;
use crate::offline::OfflineQueue;
use crate::sender::{DeliveryWorker, WorkerStats};
use crate::store::{CacheStore, DedupStore, OfflineStore};
use crate::tailer::FileTailer;

/// 파이프라인 생명주기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// 빌드 완료, 시작 전
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// [`ShipperPipeline`] 빌더
///
/// 설정 검증과 영속 스토어 열기는 빌드 시점에 일어나므로, 스토어를 열 수
/// 없는 환경에서는 파이프라인이 아예 만들어지지 않습니다.
#[derive(Debug, Default)]
pub struct ShipperPipelineBuilder {
    config: Option<ShipperConfig>,
}

impl ShipperPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: ShipperConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 설정을 검증하고 파이프라인을 조립합니다.
    pub fn build(self) -> Result<ShipperPipeline, ShipperError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        std::fs::create_dir_all(&config.data_dir)?;
        let data_dir = Path::new(&config.data_dir);

        let registry = Arc::new(DedupRegistry::new(DedupStore::open(
            data_dir.join("dedup.db"),
        )?));
        let offline = Arc::new(OfflineQueue::new(OfflineStore::open(
            data_dir.join("offline.db"),
        )?));
        let cache = Arc::new(ThreatCache::new(
            config.enrichment.clone(),
            CacheStore::open(data_dir.join("cache.db"))?,
        )?);

        let (queue, receiver) = dispatch::channel(config.queue_capacity);
        let enricher = Arc::new(Enricher::new(
            registry,
            cache,
            queue,
            config.hostname.clone(),
        ));

        Ok(ShipperPipeline {
            config,
            state: PipelineState::Initialized,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            enricher,
            offline,
            stats: Arc::new(WorkerStats::default()),
            receiver: Some(receiver),
        })
    }
}

/// 로그 테일링부터 전송까지 담당하는 파이프라인
#[derive(Debug)]
pub struct ShipperPipeline {
    config: ShipperConfig,
    state: PipelineState,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    enricher: Arc<Enricher>,
    offline: Arc<OfflineQueue>,
    stats: Arc<WorkerStats>,
    receiver: Option<DispatchReceiver>,
}

impl ShipperPipeline {
    pub fn builder() -> ShipperPipelineBuilder {
        ShipperPipelineBuilder::new()
    }

    /// 현재 생명주기 상태 이름
    pub fn state_name(&self) -> &'static str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 워커 누적 통계
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }
}

impl Pipeline for ShipperPipeline {
    async fn start(&mut self) -> Result<(), CanarywireError> {
        if self.state == PipelineState::Running {
            return Err(CanarywireError::Pipeline(PipelineError::AlreadyRunning));
        }
        let Some(receiver) = self.receiver.take() else {
            return Err(CanarywireError::Pipeline(PipelineError::InitFailed(
                "pipeline cannot be restarted after stop".to_owned(),
            )));
        };

        let worker = DeliveryWorker::new(
            &self.config,
            receiver,
            Arc::clone(&self.offline),
            self.cancel.child_token(),
            Arc::clone(&self.stats),
        );
        let tailer = FileTailer::new(
            &self.config,
            Arc::clone(&self.enricher),
            self.cancel.child_token(),
        );
        self.tasks.push(tokio::spawn(worker.run()));
        self.tasks.push(tokio::spawn(tailer.run()));

        self.state = PipelineState::Running;
        info!(
            protocol = %self.config.protocol,
            watch_dir = self.config.watch_dir.as_str(),
            host = self.config.host.as_str(),
            "shipper pipeline started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CanarywireError> {
        if self.state != PipelineState::Running {
            return Err(CanarywireError::Pipeline(PipelineError::NotRunning));
        }

        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "pipeline task ended abnormally");
            }
        }

        self.state = PipelineState::Stopped;
        info!(
            sent = self.stats.sent(),
            failed = self.stats.failed(),
            offline_backlog = self.offline.len().unwrap_or(0),
            "shipper pipeline stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
            PipelineState::Running => match self.offline.len() {
                Ok(0) => HealthStatus::Healthy,
                Ok(depth) => HealthStatus::Degraded(format!("offline queue depth: {depth}")),
                Err(e) => HealthStatus::Unhealthy(format!("offline store unavailable: {e}")),
            },
        }
    }
}
