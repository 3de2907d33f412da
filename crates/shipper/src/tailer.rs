//! 로그 파일 테일러
//!
//! 감시 디렉토리를 주기적으로 스캔하면서 접미사가 일치하는 파일의 새
//! 라인을 인리치 단계로 넘깁니다. 파일별 오프셋을 기억해 완성된 라인만
//! 소비하고, 파일이 줄어들면 로테이션으로 보고 처음부터 다시 읽습니다.
//!
//! 기동 시 첫 스캔은 기존 파일을 현재 크기로만 등록합니다. 과거 내용을
//! 다시 전송하지 않기 위함입니다. 이후에 나타난 파일은 처음부터 읽습니다.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use canarywire_core::metrics::{TAILER_FILES_WATCHED, TAILER_LINES_READ_TOTAL};

use crate::config::ShipperConfig;
use crate::enrich::Enricher;

/// 디렉토리 폴링 기반 파일 테일러
#[derive(Debug)]
pub struct FileTailer {
    watch_dir: PathBuf,
    suffix: String,
    poll_interval: Duration,
    max_line_length: usize,
    enricher: Arc<Enricher>,
    cancel: CancellationToken,
    /// 파일별 소비 오프셋 (바이트)
    offsets: HashMap<PathBuf, u64>,
    initialized: bool,
}

impl FileTailer {
    pub fn new(config: &ShipperConfig, enricher: Arc<Enricher>, cancel: CancellationToken) -> Self {
        Self {
            watch_dir: PathBuf::from(&config.watch_dir),
            suffix: config.file_suffix.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_line_length: config.max_line_length,
            enricher,
            cancel,
            offsets: HashMap::new(),
            initialized: false,
        }
    }

    /// 취소 토큰이 눌릴 때까지 감시 디렉토리를 폴링합니다.
    pub async fn run(mut self) {
        info!(
            dir = %self.watch_dir.display(),
            suffix = self.suffix.as_str(),
            "file tailer started"
        );
        self.scan_pass().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => self.scan_pass().await,
            }
        }
        info!(files = self.offsets.len(), "file tailer stopped");
    }

    /// 감시 디렉토리 전체를 한 번 스캔합니다.
    async fn scan_pass(&mut self) {
        let mut live: HashSet<PathBuf> = HashSet::new();
        let mut stack = vec![self.watch_dir.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "failed to read watch directory");
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "failed to list directory entry");
                        break;
                    }
                };
                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(ft) => ft,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to stat entry");
                        continue;
                    }
                };

                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                if !file_type.is_file()
                    || !entry.file_name().to_string_lossy().ends_with(&self.suffix)
                {
                    continue;
                }

                let size = match entry.metadata().await {
                    Ok(meta) => meta.len(),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to read file metadata");
                        continue;
                    }
                };
                live.insert(path.clone());
                self.tail_file(path, size).await;
            }
        }

        // 사라진 파일의 오프셋은 잊는다. 같은 이름이 다시 생기면 새 파일이다.
        self.offsets.retain(|path, _| live.contains(path));
        gauge!(TAILER_FILES_WATCHED).set(self.offsets.len() as f64);

        if !self.initialized {
            self.initialized = true;
            info!(
                files = self.offsets.len(),
                "initial scan complete, tailing from current offsets"
            );
        }
    }

    /// 파일 하나의 새 라인을 소비합니다.
    async fn tail_file(&mut self, path: PathBuf, size: u64) {
        // 첫 스캔에서 발견된 파일은 읽지 않고 현재 크기부터 시작
        if !self.initialized {
            self.offsets.insert(path, size);
            return;
        }

        let mut offset = self.offsets.get(&path).copied().unwrap_or(0);
        if size < offset {
            debug!(path = %path.display(), "file shrank, rereading from start");
            offset = 0;
        }
        if size > offset {
            match self.consume_lines(&path, offset).await {
                Ok(consumed) => offset += consumed,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read log file");
                }
            }
        }
        self.offsets.insert(path, offset);
    }

    /// `offset` 이후의 완성된 라인을 읽어 인리치 단계로 넘기고, 소비한
    /// 바이트 수를 반환합니다. 개행으로 끝나지 않은 꼬리는 남겨둡니다.
    async fn consume_lines(&self, path: &Path, offset: u64) -> std::io::Result<u64> {
        let mut file = File::open(path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;

        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(0);
        };

        for raw_line in buf[..=last_newline].split(|&b| b == b'\n') {
            if raw_line.is_empty() {
                continue;
            }
            let line = if raw_line.len() > self.max_line_length {
                warn!(
                    path = %path.display(),
                    length = raw_line.len(),
                    max = self.max_line_length,
                    "truncating oversized line"
                );
                &raw_line[..self.max_line_length]
            } else {
                raw_line
            };
            counter!(TAILER_LINES_READ_TOTAL).increment(1);
            let text = String::from_utf8_lossy(line);
            self.enricher.ingest(&text).await;
        }

        Ok(last_newline as u64 + 1)
    }
}
