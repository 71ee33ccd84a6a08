use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::dedup::DedupStore;
use crate::dispatcher::Dispatcher;
use crate::extractor::OfferExtractor;
use crate::filters::RuleMatcher;
use crate::models::Offer;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Dispatching,
    Stopped,
}

/// What one scan cycle did.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleReport {
    pub offers_found: usize,
    pub already_seen: usize,
    pub without_id: usize,
    pub dispatched: usize,
    pub failed_sends: usize,
    pub recorded: usize,
    pub record_failures: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopStats {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub offers_dispatched: u64,
    pub started_at: DateTime<Utc>,
}

/// Periodic extract → dedup → match → dispatch → record pipeline. Owns the
/// dedup set and the rules; nothing else touches them.
pub struct ScanLoop {
    extractor: OfferExtractor,
    matcher: Box<dyn RuleMatcher>,
    dedup: Box<dyn DedupStore>,
    dispatcher: Dispatcher,
    scan_interval: Duration,
    cancel: CancellationToken,
    state: ScanState,
    stats: LoopStats,
}

impl ScanLoop {
    pub fn new(
        extractor: OfferExtractor,
        matcher: Box<dyn RuleMatcher>,
        dedup: Box<dyn DedupStore>,
        dispatcher: Dispatcher,
        scan_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            extractor,
            matcher,
            dedup,
            dispatcher,
            scan_interval,
            cancel,
            state: ScanState::Idle,
            stats: LoopStats {
                cycles_completed: 0,
                cycles_failed: 0,
                offers_dispatched: 0,
                started_at: Utc::now(),
            },
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn dedup(&self) -> &dyn DedupStore {
        self.dedup.as_ref()
    }

    /// Runs cycles until the token is cancelled. The token is checked before
    /// each cycle and before each wait; a running cycle is never interrupted.
    pub async fn run(&mut self) {
        tracing::info!(interval_secs = self.scan_interval.as_secs(), "Scan loop started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.run_guarded_cycle().await {
                Ok(report) if report.offers_found == 0 => tracing::info!("No new offers"),
                Ok(report) => tracing::info!(
                    found = report.offers_found,
                    dispatched = report.dispatched,
                    failed = report.failed_sends,
                    "Scan cycle finished"
                ),
                Err(e) => tracing::error!("Scan cycle failed: {}", e),
            }

            if self.cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.scan_interval) => {}
            }
        }

        self.state = ScanState::Stopped;
        tracing::info!(
            cycles = self.stats.cycles_completed,
            failed = self.stats.cycles_failed,
            dispatched = self.stats.offers_dispatched,
            "Scan loop stopped"
        );
    }

    /// One cycle with panics contained, so a bug in a single cycle never
    /// takes the loop down.
    pub async fn run_guarded_cycle(&mut self) -> Result<CycleReport> {
        let outcome = AssertUnwindSafe(self.run_cycle()).catch_unwind().await;
        match outcome {
            Ok(report) => {
                self.stats.cycles_completed += 1;
                self.stats.offers_dispatched += report.dispatched as u64;
                Ok(report)
            }
            Err(panic) => {
                self.state = ScanState::Idle;
                self.stats.cycles_failed += 1;
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(AppError::Internal(format!("scan cycle panicked: {}", message)))
            }
        }
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        self.state = ScanState::Scanning;
        tracing::info!("Scanning listing page");
        let offers = self.extractor.extract().await;

        self.state = ScanState::Dispatching;
        let report = self.process_offers(&offers).await;

        self.state = ScanState::Idle;
        report
    }

    /// Dispatches every new offer to each rule it matches, then records the
    /// offer id once, whether or not anything matched.
    pub async fn process_offers(&mut self, offers: &[Offer]) -> CycleReport {
        let mut report = CycleReport {
            offers_found: offers.len(),
            ..CycleReport::default()
        };
        self.dispatcher.begin_cycle();

        for offer in offers {
            let Some(id) = offer.id() else {
                // Cannot be deduplicated; it is re-evaluated on every cycle it appears
                tracing::debug!(link = %offer.link, "Offer link has no id, skipping");
                report.without_id += 1;
                continue;
            };

            if self.dedup.has(id) {
                report.already_seen += 1;
                continue;
            }

            for rule_match in self.matcher.evaluate(offer) {
                if !rule_match.should_send {
                    continue;
                }

                let destination_id = rule_match.rule.destination_id;
                match self.dispatcher.send(offer, destination_id).await {
                    Ok(_) => report.dispatched += 1,
                    Err(e) => {
                        report.failed_sends += 1;
                        tracing::warn!(offer_id = id, destination_id, "Failed to send offer: {}", e);
                    }
                }
            }

            match self.dedup.record(id).await {
                Ok(()) => report.recorded += 1,
                Err(e) => {
                    report.record_failures += 1;
                    tracing::error!(offer_id = id, "Failed to persist sent offer id, it will be reconsidered: {}", e);
                }
            }
        }

        report
    }
}
