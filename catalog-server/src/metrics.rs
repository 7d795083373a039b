// Copyright 2025 Catalog Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Prometheus counters/gauges for the ambient operational surface (spec
//! §9 supplement): queue depth, compute-lock contention, CDN flush
//! count. Sampled periodically from the long-lived collaborators rather
//! than threaded through every call site, the way a `prometheus::Registry`
//! is wired once per process and read back on scrape.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use catalog_queue::{ComputeLock, Queue};
use catalog_workers::CdnInvalidator;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

pub struct Metrics {
    registry: Registry,
    harvest_queue_depth: IntGauge,
    upgrade_queue_depth: IntGauge,
    compute_lock_contention_total: IntCounter,
    cdn_flushed_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let harvest_queue_depth = IntGauge::new("catalog_harvest_queue_depth", "Outstanding messages on the harvest-update queue").expect("metric name is valid");
        let upgrade_queue_depth = IntGauge::new("catalog_upgrade_queue_depth", "Outstanding messages on the schema-upgrade queue").expect("metric name is valid");
        let compute_lock_contention_total =
            IntCounter::new("catalog_compute_lock_contention_total", "Poll iterations spent waiting on an already-held compute lock").expect("metric name is valid");
        let cdn_flushed_total = IntCounter::new("catalog_cdn_flushed_tags_total", "CDN invalidation tags flushed").expect("metric name is valid");

        for collector in [
            Box::new(harvest_queue_depth.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(upgrade_queue_depth.clone()),
            Box::new(compute_lock_contention_total.clone()),
            Box::new(cdn_flushed_total.clone()),
        ] {
            registry.register(collector).expect("metric registered exactly once");
        }

        Self {
            registry,
            harvest_queue_depth,
            upgrade_queue_depth,
            compute_lock_contention_total,
            cdn_flushed_total,
        }
    }

    /// Re-sample the gauges/counters from their sources. Counters only
    /// move forward, so this adds the delta since the last sample rather
    /// than re-setting an absolute value.
    async fn sample(
        &self,
        harvest_queue: &dyn Queue,
        upgrade_queue: &dyn Queue,
        compute_lock: &ComputeLock,
        cdn: &CdnInvalidator,
        last_contention: &mut u64,
        last_flushed: &mut u64,
    ) {
        if let Ok(depth) = harvest_queue.depth().await {
            self.harvest_queue_depth.set(depth as i64);
        }
        if let Ok(depth) = upgrade_queue.depth().await {
            self.upgrade_queue_depth.set(depth as i64);
        }

        let contention = compute_lock.contention_total();
        self.compute_lock_contention_total.inc_by(contention.saturating_sub(*last_contention));
        *last_contention = contention;

        let flushed = cdn.flushed_total();
        self.cdn_flushed_total.inc_by(flushed.saturating_sub(*last_flushed));
        *last_flushed = flushed;
    }

    /// Spawn the periodic sampler. Returns a handle the caller can abort
    /// on shutdown, matching the CDN timer and queue processor tasks.
    pub fn spawn_sampler(
        self: Arc<Self>,
        harvest_queue: Arc<dyn Queue>,
        upgrade_queue: Arc<dyn Queue>,
        compute_lock: Arc<ComputeLock>,
        cdn: Arc<CdnInvalidator>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut last_contention = 0u64;
            let mut last_flushed = 0u64;
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sample(harvest_queue.as_ref(), upgrade_queue.as_ref(), &compute_lock, &cdn, &mut last_contention, &mut last_flushed)
                    .await;
            }
        })
    }

    fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).expect("prometheus text encoding never fails");
        String::from_utf8(buffer).expect("prometheus text encoding is always valid utf8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn get_metrics(State(metrics): State<Arc<Metrics>>) -> Response {
    let body = metrics.encode();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], StatusCode::OK, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_queue::InMemoryQueue;

    #[tokio::test]
    async fn sample_reflects_queue_depth_and_lock_contention() {
        let metrics = Metrics::new();
        let harvest_queue = InMemoryQueue::new(Duration::from_secs(30));
        harvest_queue.enqueue("{}").await.unwrap();
        let upgrade_queue = InMemoryQueue::new(Duration::from_secs(30));
        let lock = ComputeLock::new();
        let cdn = CdnInvalidator::new(Arc::new(catalog_workers::NoopCdnFlushClient), 2000);

        let mut last_contention = 0;
        let mut last_flushed = 0;
        metrics.sample(&harvest_queue, &upgrade_queue, &lock, &cdn, &mut last_contention, &mut last_flushed).await;

        assert_eq!(metrics.harvest_queue_depth.get(), 1);
        assert_eq!(metrics.upgrade_queue_depth.get(), 0);

        let encoded = metrics.encode();
        assert!(encoded.contains("catalog_harvest_queue_depth 1"));
    }
}
