use chrono::{Duration as ChronoDuration, NaiveDate};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use crate::config::{ApiConfig, ConfigError};
use crate::data::document::{parse_document, write_publication, DocumentError, MarketDocument, PUBLICATION_NAMESPACE};
use crate::data::http::{HttpError, ResilientClient, Transport};
use crate::data::market::MarketArea;
use crate::data::types::TimeSeriesRecord;
use crate::output::writer::ArtifactKind;

/// Caller-driven abort flag, checked before every sub-window and page.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Inclusive range of delivery days requested in one API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SubWindow {
    /// `periodStart`: midnight UTC of the first day.
    pub fn period_start(&self) -> String {
        format!("{}0000", self.start.format("%Y%m%d"))
    }

    /// `periodEnd`: midnight UTC after the last day. The extra span pulls in
    /// adjacent local days, which the delivery-day filter discards.
    pub fn period_end(&self) -> String {
        let next = self.end + ChronoDuration::days(1);
        format!("{}0000", next.format("%Y%m%d"))
    }
}

impl fmt::Display for SubWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Split `[start, end]` into windows of at most `max_days` days.
pub fn segment_window(start: NaiveDate, end: NaiveDate, max_days: u32) -> Vec<SubWindow> {
    let span = ChronoDuration::days(i64::from(max_days.max(1)) - 1);
    let mut windows = Vec::new();
    let mut current = start;

    while current <= end {
        let window_end = (current + span).min(end);
        windows.push(SubWindow { start: current, end: window_end });
        current = window_end + ChronoDuration::days(1);
    }

    windows
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Fetch for {area} window {window} failed at offset {offset}: {source}")]
    Http {
        area: String,
        window: SubWindow,
        offset: u32,
        #[source]
        source: HttpError,
    },

    #[error("Malformed page for {area} window {window} at offset {offset}: {source}")]
    MalformedPage {
        area: String,
        window: SubWindow,
        offset: u32,
        #[source]
        source: DocumentError,
    },

    #[error("Fetch for {area} cancelled before window {window} offset {offset}")]
    Cancelled {
        area: String,
        window: SubWindow,
        offset: u32,
    },

    #[error("Failed to assemble merged document: {0}")]
    Assemble(#[source] DocumentError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub windows: usize,
    pub pages: usize,
    pub received: usize,
    pub duplicates: usize,
    pub outside_window: usize,
    pub non_primary: usize,
    pub kept: usize,
}

#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub file_name: String,
    pub xml: Vec<u8>,
    pub stats: FetchStats,
}

/// Series accumulated across all windows and pages of one fetch.
#[derive(Default)]
struct Accumulator {
    seen: HashSet<(String, String)>,
    records: Vec<TimeSeriesRecord>,
    namespace: Option<String>,
    stats: FetchStats,
}

impl Accumulator {
    /// First occurrence of a (mRID, start) key wins. Returns how many
    /// records were new.
    fn merge(&mut self, page: Vec<TimeSeriesRecord>) -> usize {
        let mut fresh = 0;
        for record in page {
            if self.seen.insert(record.dedup_key()) {
                self.records.push(record);
                fresh += 1;
            } else {
                self.stats.duplicates += 1;
            }
        }
        fresh
    }
}

pub struct DayAheadFetcher<T: Transport> {
    client: ResilientClient<T>,
    api: ApiConfig,
    token: String,
}

impl<T: Transport> DayAheadFetcher<T> {
    pub fn new(client: ResilientClient<T>, api: ApiConfig, token: String) -> Result<Self, ConfigError> {
        if token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if api.max_days_per_request == 0 {
            return Err(ConfigError::InvalidApiSetting {
                field: "max_days_per_request",
                reason: "must be at least 1".to_string(),
            });
        }
        if api.page_size == 0 {
            return Err(ConfigError::InvalidApiSetting {
                field: "page_size",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self { client, api, token })
    }

    pub fn client(&self) -> &ResilientClient<T> {
        &self.client
    }

    /// Fetch day-ahead prices for the delivery days `[start, end]` and merge
    /// them into one publication document. Any failure discards everything
    /// gathered so far.
    pub async fn fetch_day_ahead_prices(
        &self,
        area: &MarketArea,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancelSignal,
    ) -> Result<FetchedDocument, FetchError> {
        if start > end {
            return Err(ConfigError::InvalidDateRange { start, end }.into());
        }

        let mut acc = Accumulator::default();

        for window in segment_window(start, end, self.api.max_days_per_request) {
            info!("[{}] Fetching window {}", area.code, window);
            acc.stats.windows += 1;
            self.fetch_window(area, window, cancel, &mut acc).await?;
        }

        let Accumulator { records, namespace, mut stats, .. } = acc;

        let received = records.len();
        let in_window: Vec<TimeSeriesRecord> = records
            .into_iter()
            .filter(|record| match record.start() {
                Some(instant) => {
                    let day = area.delivery_date(instant);
                    start <= day && day <= end
                }
                None => {
                    warn!(
                        "[{}] Series {:?} has no period start, dropped",
                        area.code, record.mrid
                    );
                    false
                }
            })
            .collect();
        stats.outside_window = received - in_window.len();
        info!(
            "[{}] Delivery-day filter kept {} of {} series",
            area.code,
            in_window.len(),
            received
        );

        let before = in_window.len();
        let primary: Vec<TimeSeriesRecord> = in_window
            .into_iter()
            .filter(|record| {
                if !record.is_primary() {
                    debug!(
                        "[{}] Skipping series {:?} with classification {:?}",
                        area.code, record.mrid, record.classification_sequence
                    );
                }
                record.is_primary()
            })
            .collect();
        stats.non_primary = before - primary.len();
        stats.kept = primary.len();

        let namespace = namespace.unwrap_or_else(|| PUBLICATION_NAMESPACE.to_string());
        let xml = write_publication(&namespace, &primary).map_err(FetchError::Assemble)?;

        info!(
            "[{}] Merged {} series ({} pages, {} duplicates, {} outside window, {} non-primary)",
            area.code, stats.kept, stats.pages, stats.duplicates, stats.outside_window, stats.non_primary
        );

        Ok(FetchedDocument {
            file_name: ArtifactKind::Xml.file_name(&area.code, start, end),
            xml,
            stats,
        })
    }

    async fn fetch_window(
        &self,
        area: &MarketArea,
        window: SubWindow,
        cancel: &CancelSignal,
        acc: &mut Accumulator,
    ) -> Result<(), FetchError> {
        let page_size = self.api.page_size;
        let mut offset = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled {
                    area: area.code.clone(),
                    window,
                    offset,
                });
            }

            debug!("[{}] Requesting {} offset={}", area.code, window, offset);
            let query = self.query(area, window, offset);
            let response = self
                .client
                .get(&self.api.base_url, &query)
                .await
                .map_err(|source| {
                    warn!(
                        "[{}] {} offset={} failed (status {:?})",
                        area.code,
                        window,
                        offset,
                        source.status()
                    );
                    FetchError::Http {
                        area: area.code.clone(),
                        window,
                        offset,
                        source,
                    }
                })?;
            acc.stats.pages += 1;

            let document = parse_document(&response.body).map_err(|source| FetchError::MalformedPage {
                area: area.code.clone(),
                window,
                offset,
                source,
            })?;

            let page = match document {
                MarketDocument::Acknowledgement { reason_code, reason_text } => {
                    info!(
                        "[{}] No more data for {} at offset {} (reason {}: {})",
                        area.code,
                        window,
                        offset,
                        reason_code.as_deref().unwrap_or("-"),
                        reason_text.as_deref().unwrap_or("-")
                    );
                    return Ok(());
                }
                MarketDocument::Publication { namespace, series } => {
                    if acc.namespace.is_none() {
                        acc.namespace = namespace;
                    }
                    series
                }
            };

            let received = page.len();
            acc.stats.received += received;
            let fresh = acc.merge(page);
            info!(
                "[{}] {} offset={}: {} series, {} new",
                area.code, window, offset, received, fresh
            );

            if received < page_size as usize {
                return Ok(());
            }
            if fresh == 0 {
                warn!(
                    "[{}] Page at offset {} added no new series, stopping pagination",
                    area.code, offset
                );
                return Ok(());
            }

            offset += page_size;
            if self.api.page_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.api.page_delay_ms)).await;
            }
        }
    }

    fn query(&self, area: &MarketArea, window: SubWindow, offset: u32) -> Vec<(String, String)> {
        vec![
            ("documentType".to_string(), self.api.document_type.clone()),
            ("in_Domain".to_string(), area.eic.clone()),
            ("out_Domain".to_string(), area.eic.clone()),
            ("periodStart".to_string(), window.period_start()),
            ("periodEnd".to_string(), window.period_end()),
            ("securityToken".to_string(), self.token.clone()),
            ("offset".to_string(), offset.to_string()),
        ]
    }
}
