//! Two-stage aggregation of the remote catalog.
//!
//! Stage 1 pages through the listing endpoint strictly sequentially. Stage 2
//! splits the collected references into fixed-size groups; requests inside a
//! group run concurrently and the group is a barrier: every request settles
//! before the next group starts. A failed detail request drops that item and
//! nothing else.

use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::catalog::{CatalogClient, DetailPayload};
use crate::domain::{BaseField, CatalogItemRef, NormalizedRecord, ProgressState};
use crate::error::LabError;

pub const DEFAULT_PAGE_SIZE: usize = 200;
pub const DEFAULT_DETAIL_GROUP_SIZE: usize = 50;
pub const DEFAULT_FALLBACK_TOTAL: usize = 1302;
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub page_size: usize,
    pub detail_group_size: usize,
    /// Courtesy pause after every listing page and every detail group.
    pub delay: Duration,
    /// Used only when the listing response carries no `count`.
    pub fallback_total: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            detail_group_size: DEFAULT_DETAIL_GROUP_SIZE,
            delay: DEFAULT_REQUEST_DELAY,
            fallback_total: DEFAULT_FALLBACK_TOTAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

/// Listing requests covering `[0, total)` in increasing offset order.
pub fn page_plan(total: usize, page_size: usize) -> Vec<PageRequest> {
    if page_size == 0 {
        return Vec::new();
    }
    (0..total.div_ceil(page_size))
        .map(|batch| {
            let offset = batch * page_size;
            PageRequest {
                offset,
                limit: page_size.min(total - offset),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct Aggregation {
    pub records: Vec<NormalizedRecord>,
    pub listed: usize,
    pub failed: Vec<String>,
}

pub struct Pipeline<'a, C: CatalogClient> {
    client: &'a C,
    options: PipelineOptions,
}

impl<'a, C: CatalogClient> Pipeline<'a, C> {
    pub fn new(client: &'a C, options: PipelineOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Runs both stages. Fails only when a listing page fails.
    pub fn run(&self, sink: &dyn ProgressSink) -> Result<Vec<NormalizedRecord>, LabError> {
        Ok(self.run_with_report(sink)?.records)
    }

    pub fn run_with_report(&self, sink: &dyn ProgressSink) -> Result<Aggregation, LabError> {
        let items = self.enumerate(sink)?;
        Ok(self.fetch_details(&items, sink))
    }

    /// Stage 1. The total comes from the first page's `count`.
    pub fn enumerate(&self, sink: &dyn ProgressSink) -> Result<Vec<CatalogItemRef>, LabError> {
        let page_size = self.options.page_size;
        let first = self.client.list(page_size, 0)?;
        let total = match first.count {
            Some(count) => count,
            None => {
                warn!(
                    fallback = self.options.fallback_total,
                    "listing response has no count, using fallback total"
                );
                self.options.fallback_total
            }
        };
        let plan = page_plan(total, page_size);
        let pages = plan.len().max(1);

        let mut items = first.results;
        debug!(page = 1, pages, received = items.len(), "listing page");
        sink.event(ProgressEvent::Listing {
            page: 1,
            pages,
            collected: items.len(),
            total,
        });
        self.pause();

        for (index, request) in plan.iter().enumerate().skip(1) {
            let page = self.client.list(request.limit, request.offset)?;
            debug!(
                page = index + 1,
                pages,
                offset = request.offset,
                limit = request.limit,
                received = page.results.len(),
                "listing page"
            );
            items.extend(page.results);
            sink.event(ProgressEvent::Listing {
                page: index + 1,
                pages,
                collected: items.len(),
                total,
            });
            self.pause();
        }

        Ok(items)
    }

    /// Stage 2. Never fails; unreachable items are logged and skipped.
    pub fn fetch_details(&self, items: &[CatalogItemRef], sink: &dyn ProgressSink) -> Aggregation {
        let group_size = self.options.detail_group_size.max(1);
        let total = items.len();
        let total_batches = total.div_ceil(group_size);
        let mut records = Vec::with_capacity(total);
        let mut failed = Vec::new();

        for (index, group) in items.chunks(group_size).enumerate() {
            let settled = self.fetch_group(group);
            for (item, result) in group.iter().zip(settled) {
                match result {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        warn!(item = %item.name, error = %err, "dropping detail fetch");
                        failed.push(item.name.clone());
                    }
                }
            }
            debug!(
                batch = index + 1,
                total_batches,
                fetched = records.len(),
                "detail group settled"
            );
            sink.event(ProgressEvent::Details(ProgressState {
                fetched: records.len(),
                total,
                is_complete: false,
                current_batch: index + 1,
                total_batches,
            }));
            self.pause();
        }

        sink.event(ProgressEvent::Details(ProgressState {
            fetched: records.len(),
            total,
            is_complete: true,
            current_batch: total_batches,
            total_batches,
        }));
        if !failed.is_empty() {
            info!("{} of {} detail fetches failed", failed.len(), total);
        }

        Aggregation {
            records,
            listed: total,
            failed,
        }
    }

    fn fetch_group(&self, group: &[CatalogItemRef]) -> Vec<Result<NormalizedRecord, LabError>> {
        thread::scope(|scope| {
            let handles = group
                .iter()
                .map(|item| {
                    scope.spawn(move || {
                        self.client
                            .detail(&item.name)
                            .map(|payload| normalize_detail(&payload))
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(LabError::CatalogHttp("detail worker panicked".to_string()))
                    })
                })
                .collect()
        })
    }

    fn pause(&self) {
        if !self.options.delay.is_zero() {
            thread::sleep(self.options.delay);
        }
    }
}

/// Flattens a detail payload. A stat missing from the payload stays `None`.
pub fn normalize_detail(payload: &DetailPayload) -> NormalizedRecord {
    let mut record = NormalizedRecord::new(payload.id.to_string(), payload.name.clone());
    record.types = payload
        .types
        .iter()
        .map(|slot| slot.kind.name.as_str())
        .collect::<Vec<_>>()
        .join(" / ");
    for field in BaseField::STATS {
        let value = field.catalog_stat_name().and_then(|name| {
            payload
                .stats
                .iter()
                .find(|slot| slot.stat.name == name)
                .map(|slot| slot.base_stat)
        });
        record.set_stat(field, value);
    }
    record
}
