//! 위협 평판 verdict 캐시
//!
//! 주소별 위협 verdict를 [`CacheStore`]에 TTL과 함께 보관하고, 캐시
//! 미스 시에만 원격 평판 API를 조회합니다. 조회 실패도 `"neutral"`로
//! 캐시되어 장애 중인 API를 반복 호출하지 않습니다.
//!
//! 사설/루프백 주소와 빈 주소는 조회 없이 즉시 `"neutral"`입니다.

use std::net::IpAddr;

use metrics::counter;
use serde::Deserialize;
use tracing::{debug, warn};

use canarywire_core::event::VERDICT_NEUTRAL;
use canarywire_core::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, LOOKUP_FAILURES_TOTAL};

use crate::config::EnrichmentSettings;
use crate::error::ShipperError;
use crate::store::CacheStore;

/// 평판 API 응답 본문
#[derive(Debug, Deserialize)]
struct LookupResponse {
    data: LookupData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupData {
    abuse_confidence_score: i64,
    country_code: Option<String>,
}

/// TTL 기반 위협 verdict 캐시
#[derive(Debug)]
pub struct ThreatCache {
    settings: EnrichmentSettings,
    store: CacheStore,
    client: reqwest::Client,
}

impl ThreatCache {
    /// 캐시를 생성합니다. HTTP 클라이언트는 조회 타임아웃을 적용해 구성됩니다.
    pub fn new(settings: EnrichmentSettings, store: CacheStore) -> Result<Self, ShipperError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.lookup_timeout_secs))
            .build()?;
        Ok(Self {
            settings,
            store,
            client,
        })
    }

    /// 주소의 위협 verdict를 반환합니다.
    ///
    /// enrichment가 비활성화이거나 주소가 비어 있거나 로컬 주소이면
    /// 즉시 `"neutral"`입니다. 그 외에는 캐시를 먼저 확인하고, TTL이
    /// 지났거나 엔트리가 없으면 원격 조회 후 결과를 캐시합니다.
    /// 이 함수는 실패하지 않습니다. 조회 실패는 `"neutral"`로 수렴합니다.
    pub async fn verdict_for(&self, address: &str) -> String {
        if !self.settings.enabled || address.is_empty() || is_local_address(address) {
            return VERDICT_NEUTRAL.to_owned();
        }

        let now = chrono::Utc::now().timestamp();
        match self.store.get(address) {
            Ok(Some((verdict, observed_at)))
                if now - observed_at < self.settings.cache_ttl_secs as i64 =>
            {
                counter!(CACHE_HITS_TOTAL).increment(1);
                debug!(address, verdict = verdict.as_str(), "verdict cache hit");
                return verdict;
            }
            Ok(_) => {} // 엔트리 없음 또는 TTL 만료
            Err(e) => {
                warn!(address, error = %e, "verdict cache read failed, treating as miss");
            }
        }

        counter!(CACHE_MISSES_TOTAL).increment(1);
        let verdict = match self.remote_verdict(address).await {
            Some(verdict) => verdict,
            None => {
                counter!(LOOKUP_FAILURES_TOTAL).increment(1);
                VERDICT_NEUTRAL.to_owned()
            }
        };

        if let Err(e) = self.store.put(address, &verdict, now) {
            warn!(address, error = %e, "verdict cache write failed");
        }
        verdict
    }

    /// 원격 평판 API를 조회합니다. 모든 실패는 `None`입니다.
    async fn remote_verdict(&self, address: &str) -> Option<String> {
        let response = self
            .client
            .get(&self.settings.api_url)
            .header("Key", &self.settings.api_key)
            .header("Accept", "application/json")
            .query(&[("ipAddress", address)])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                debug!(address, error = %e, "reputation lookup request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(
                address,
                status = %response.status(),
                "reputation lookup returned non-success status"
            );
            return None;
        }

        match response.json::<LookupResponse>().await {
            Ok(body) => Some(verdict_from(
                body.data.abuse_confidence_score,
                body.data.country_code.as_deref(),
            )),
            Err(e) => {
                debug!(address, error = %e, "reputation response decode failed");
                None
            }
        }
    }
}

/// 평판 점수를 verdict 문자열로 변환합니다.
fn verdict_from(score: i64, country_code: Option<&str>) -> String {
    if score > 50 {
        let country = country_code.unwrap_or("Unknown");
        format!("High Risk {score}% ({country})")
    } else if score > 0 {
        "Low Risk".to_owned()
    } else {
        VERDICT_NEUTRAL.to_owned()
    }
}

/// 조회할 가치가 없는 로컬 주소인지 판별합니다.
///
/// IP로 파싱되지 않는 값(호스트명 등)은 로컬로 간주하지 않습니다.
fn is_local_address(address: &str) -> bool {
    if address == "localhost" {
        return true;
    }
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        Ok(IpAddr::V6(v6)) => v6.is_loopback() || v6.is_unspecified(),
        Err(_) => false,
    }
}
