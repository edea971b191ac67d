use chrono::NaiveDate;
use tracing::info;
use crate::config::{Config, ConfigError, EnvConfig, ProcessingConfig};
use crate::data::entsoe_api::{CancelSignal, DayAheadFetcher, FetchError, FetchedDocument};
use crate::data::http::{ReqwestTransport, ResilientClient, RetryPolicy, Transport, TransportError};
use crate::data::market::{MarketArea, MarketAreas};
use crate::data::types::DataQualityWarning;
use crate::processing::error::ProcessingError;
use crate::processing::hourly::{aggregate_hourly, read_hourly_csv, write_hourly_csv};
use crate::processing::mtu::{parse_to_mtu, read_mtu_csv, write_mtu_csv};
use crate::processing::stats::{self, StatsSummary};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] TransportError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

/// CSV bytes plus the data-quality findings raised while producing them.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvOutput {
    pub csv: Vec<u8>,
    pub warnings: Vec<DataQualityWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsOutput {
    pub csv: Vec<u8>,
    pub summary: StatsSummary,
}

/// Offline stages: XML to MTU CSV, MTU CSV to hourly CSV, hourly CSV to
/// daily statistics.
#[derive(Debug, Clone)]
pub struct Processor {
    areas: MarketAreas,
    processing: ProcessingConfig,
}

impl Processor {
    pub fn new(areas: MarketAreas, processing: ProcessingConfig) -> Self {
        Self { areas, processing }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let areas = MarketAreas::from_config(&config.market_areas)?;
        Ok(Self::new(areas, config.processing.clone()))
    }

    pub fn areas(&self) -> &MarketAreas {
        &self.areas
    }

    pub fn area(&self, code: &str) -> Result<&MarketArea, ConfigError> {
        self.areas.resolve(code)
    }

    pub fn to_mtu(&self, area_code: &str, xml: &[u8]) -> Result<CsvOutput, PipelineError> {
        let area = self.area(area_code)?;
        let table = parse_to_mtu(area, xml, &self.processing)?;
        info!("[{}] {} MTU rows, {} warnings", area.code, table.rows.len(), table.warnings.len());

        Ok(CsvOutput {
            csv: write_mtu_csv(&table.rows)?,
            warnings: table.warnings,
        })
    }

    pub fn to_hourly(&self, mtu_csv: &[u8]) -> Result<CsvOutput, PipelineError> {
        let rows = read_mtu_csv(mtu_csv)?;
        let table = aggregate_hourly(&rows, self.processing.skip_unsupported_days)?;
        info!("{} hourly rows, {} warnings", table.rows.len(), table.warnings.len());

        Ok(CsvOutput {
            csv: write_hourly_csv(&table.rows)?,
            warnings: table.warnings,
        })
    }

    pub fn daily_stats(&self, hourly_csv: &[u8]) -> Result<StatsOutput, PipelineError> {
        let rows = read_hourly_csv(hourly_csv)?;
        let report = stats::daily_stats(&rows)?;

        Ok(StatsOutput {
            csv: stats::write_stats_csv(&report.days)?,
            summary: report.summary,
        })
    }
}

/// Fetch stage in front of a `Processor`, keyed by market area code.
pub struct Pipeline<T: Transport> {
    processor: Processor,
    fetcher: DayAheadFetcher<T>,
}

impl Pipeline<ReqwestTransport> {
    pub fn from_config(config: &Config, env: &EnvConfig) -> Result<Self, PipelineError> {
        let processor = Processor::from_config(config)?;

        let mut api = config.api.clone();
        if let Some(base_url) = &env.entsoe_api_base_url {
            info!("Using API base URL override: {}", base_url);
            api.base_url = base_url.clone();
        }

        let transport = ReqwestTransport::from_config(&api)?;
        let client = ResilientClient::new(transport, RetryPolicy::from_config(&config.retry));
        let fetcher = DayAheadFetcher::new(client, api, env.entsoe_api_token.clone())?;

        Ok(Self::new(processor, fetcher))
    }
}

impl<T: Transport> Pipeline<T> {
    pub fn new(processor: Processor, fetcher: DayAheadFetcher<T>) -> Self {
        Self { processor, fetcher }
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    #[cfg(test)]
    pub fn fetcher(&self) -> &DayAheadFetcher<T> {
        &self.fetcher
    }

    /// Unknown areas fail here, before any request is sent.
    pub async fn fetch(
        &self,
        area_code: &str,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancelSignal,
    ) -> Result<FetchedDocument, PipelineError> {
        let area = self.processor.area(area_code)?;
        Ok(self.fetcher.fetch_day_ahead_prices(area, start, end, cancel).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::data::fixtures::{publication, SeriesXml};
    use crate::data::http::mock::MockTransport;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn pipeline(transport: MockTransport) -> Pipeline<MockTransport> {
        let config = Config::default();
        let api = ApiConfig {
            page_delay_ms: 0,
            ..ApiConfig::default()
        };
        let fetcher = DayAheadFetcher::new(
            ResilientClient::new(transport, RetryPolicy::immediate(2)),
            api,
            "token".to_string(),
        )
        .unwrap();
        Pipeline::new(Processor::from_config(&config).unwrap(), fetcher)
    }

    fn france_day() -> String {
        let prices: Vec<(u32, f64)> = (1..=24).map(|p| (p, 40.0 + p as f64 * 1.25)).collect();
        publication(&[
            SeriesXml::hourly("1", "2024-01-14T23:00Z", "2024-01-15T23:00Z")
                .classification(1)
                .points(&prices),
        ])
    }

    async fn run(p: &Pipeline<MockTransport>) -> (Vec<u8>, Vec<u8>) {
        let doc = p
            .fetch("FR", date("2024-01-15"), date("2024-01-15"), &CancelSignal::new())
            .await
            .unwrap();
        let mtu = p.processor().to_mtu("FR", &doc.xml).unwrap();
        let hourly = p.processor().to_hourly(&mtu.csv).unwrap();
        (mtu.csv, hourly.csv)
    }

    #[tokio::test]
    async fn test_france_hourly_day_end_to_end() {
        let p = pipeline(MockTransport::new().reply(200, france_day()));

        let (mtu_csv, hourly_csv) = run(&p).await;

        let mtu = read_mtu_csv(&mtu_csv).unwrap();
        let hourly = read_hourly_csv(&hourly_csv).unwrap();
        assert_eq!(mtu.len(), 24);
        assert_eq!(hourly.len(), 24);
        for (m, h) in mtu.iter().zip(&hourly) {
            assert_eq!(h.price, m.price);
            assert_eq!(h.hour + 1, m.mtu);
            assert!(h.is_complete());
        }
    }

    #[tokio::test]
    async fn test_reruns_are_byte_identical() {
        let first = run(&pipeline(MockTransport::new().reply(200, france_day()))).await;
        let second = run(&pipeline(MockTransport::new().reply(200, france_day()))).await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_area_fails_before_network() {
        let p = pipeline(MockTransport::new());

        let err = p
            .fetch("XX", date("2024-01-15"), date("2024-01-15"), &CancelSignal::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Config(ConfigError::UnknownMarketArea(code)) if code == "XX"));
        assert_eq!(p.fetcher().client().transport().request_count(), 0);
    }

    #[test]
    fn test_processing_warnings_are_returned() {
        let p = pipeline(MockTransport::new());
        let xml = publication(&[
            SeriesXml::hourly("1", "2024-01-14T23:00Z", "2024-01-15T23:00Z").points(&[(2, 10.0)]),
        ]);

        let mtu = p.processor().to_mtu("FR", xml.as_bytes()).unwrap();
        assert_eq!(mtu.warnings.len(), 1);

        let hourly = p.processor().to_hourly(&mtu.csv).unwrap();
        assert_eq!(hourly.warnings.len(), 1);
        let rows = read_hourly_csv(&hourly.csv).unwrap();
        assert_eq!(rows[0].price, None);
        assert!(!rows[0].is_complete());
        assert!(rows[1].is_complete());
    }

    #[test]
    fn test_daily_stats_from_hourly_csv() {
        let p = pipeline(MockTransport::new());
        let hourly = b"Date,Hour,Price,Status\n2024-01-15,0,10,ok\n2024-01-15,1,30,ok\n";

        let out = p.processor().daily_stats(hourly).unwrap();

        assert_eq!(out.summary.avg_price, 20.0);
        assert_eq!(out.summary.max_spread, 20.0);
        assert!(String::from_utf8(out.csv).unwrap().contains("2024-01-15,20.00,20.00,14.14,30.00,10.00"));
    }

    #[test]
    fn test_hourly_rejects_malformed_csv() {
        let p = pipeline(MockTransport::new());
        let err = p.processor().to_hourly(b"Date,Price\n2024-01-15,1\n").unwrap_err();
        assert!(matches!(err, PipelineError::Processing(ProcessingError::MissingColumns(_))));
    }
}
