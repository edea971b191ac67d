use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use crate::config::ProcessingConfig;
use crate::data::document::parse_series;
use crate::data::market::MarketArea;
use crate::data::types::{DataQualityWarning, MtuRow, PricePoint, Resolution, SeriesPeriod};
use crate::processing::error::ProcessingError;

pub const MTU_COLUMNS: [&str; 3] = ["Date", "MTU", "Price"];

static RESOLUTION_CODE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MtuTable {
    pub rows: Vec<MtuRow>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Dense prices for positions `1..=expected` of one period.
#[derive(Debug, Clone, PartialEq)]
pub struct FilledPeriod {
    pub prices: Vec<Option<f64>>,
    pub first_explicit: Option<u32>,
    pub out_of_range: Vec<u32>,
}

/// Parse an ISO-8601 duration such as `PT15M` or `PT1H` and check it
/// against the supported set.
pub fn parse_resolution(code: &str, supported: &[u32]) -> Result<Resolution, ProcessingError> {
    let unsupported = || ProcessingError::UnsupportedResolution(code.to_string());

    let re = RESOLUTION_CODE
        .get_or_init(|| Regex::new(r"^PT(\d+)([MH])$"))
        .as_ref()
        .map_err(|_| unsupported())?;
    let normalized = code.trim().to_uppercase();
    let caps = re.captures(&normalized).ok_or_else(unsupported)?;

    let value = caps[1].parse::<u32>().map_err(|_| unsupported())?;
    let minutes = if &caps[2] == "H" {
        value.checked_mul(60).ok_or_else(unsupported)?
    } else {
        value
    };

    Resolution::from_minutes(minutes)
        .filter(|r| supported.contains(&r.minutes()))
        .ok_or_else(unsupported)
}

/// Number of positions a period should carry. Taken from its interval, so
/// 23- and 25-hour days get 92/100 quarter-hours; a full day otherwise.
pub fn expected_positions(period: &SeriesPeriod, resolution: Resolution) -> u32 {
    let fallback = resolution.points_per_day();
    match period.end {
        Some(end) if end > period.start => {
            let minutes = (end - period.start).num_minutes();
            let count = minutes / i64::from(resolution.minutes());
            u32::try_from(count).ok().filter(|&n| n > 0).unwrap_or(fallback)
        }
        _ => fallback,
    }
}

/// Rebuild the dense series from explicit points. Upstream only emits a
/// point when the price changes, so each missing position repeats the last
/// explicit price. Positions before the first explicit point stay `None`.
pub fn fill_positions(points: &[PricePoint], expected: u32) -> FilledPeriod {
    let mut explicit = points.to_vec();
    explicit.sort_by_key(|p| p.position);
    explicit.dedup_by_key(|p| p.position);

    let in_range = |p: &PricePoint| p.position >= 1 && p.position <= expected;
    let out_of_range = explicit
        .iter()
        .filter(|p| !in_range(*p))
        .map(|p| p.position)
        .collect();
    let first_explicit = explicit.iter().find(|p| in_range(*p)).map(|p| p.position);

    let mut pending = explicit.into_iter().filter(in_range).peekable();
    let prices = (1..=expected)
        .scan(None, |last: &mut Option<f64>, position| {
            if let Some(point) = pending.next_if(|p| p.position == position) {
                *last = Some(point.price);
            }
            Some(*last)
        })
        .collect();

    FilledPeriod {
        prices,
        first_explicit,
        out_of_range,
    }
}

/// Turn a merged publication document into MTU rows ordered by delivery
/// date, then MTU index. A period belongs as a whole to the delivery day of
/// its start; MTUs are numbered `1..=expected` from there.
pub fn parse_to_mtu(
    area: &MarketArea,
    xml: &[u8],
    config: &ProcessingConfig,
) -> Result<MtuTable, ProcessingError> {
    let series = parse_series(xml)?;
    let mut days: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
    let mut warnings = Vec::new();

    for record in &series {
        let mrid = record.mrid.clone().unwrap_or_else(|| "UNKNOWN".to_string());

        if !record.is_primary() {
            info!(
                "Skipping series {} (classification {:?})",
                mrid, record.classification_sequence
            );
            continue;
        }

        for period in &record.periods {
            if period.points.is_empty() {
                warnings.push(DataQualityWarning::EmptySeries { mrid: mrid.clone() });
                continue;
            }

            let resolution = parse_resolution(&period.resolution, &config.supported_resolutions)?;
            let expected = expected_positions(period, resolution);
            let filled = fill_positions(&period.points, expected);
            let date = area.delivery_date(period.start);

            if days.contains_key(&date) {
                warnings.push(DataQualityWarning::DuplicateDeliveryDay {
                    date,
                    mrid: mrid.clone(),
                });
                continue;
            }

            for position in &filled.out_of_range {
                warnings.push(DataQualityWarning::PositionOutOfRange {
                    date,
                    position: *position,
                    expected,
                });
            }
            if filled.prices.first().map_or(false, Option::is_none) {
                warnings.push(DataQualityWarning::MissingLeadingPoint {
                    date,
                    first_explicit: filled.first_explicit,
                });
            }

            debug!("{} {}: {} MTUs at {}", mrid, date, filled.prices.len(), resolution);
            days.insert(date, filled.prices);
        }
    }

    for warning in &warnings {
        warn!("{}", warning);
    }

    let rows: Vec<MtuRow> = days
        .into_iter()
        .flat_map(|(date, prices)| {
            prices.into_iter().zip(1u32..).map(move |(price, mtu)| MtuRow { date, mtu, price })
        })
        .collect();

    if rows.is_empty() {
        return Err(ProcessingError::NoData("MTU"));
    }

    Ok(MtuTable { rows, warnings })
}

pub fn write_mtu_csv(rows: &[MtuRow]) -> Result<Vec<u8>, ProcessingError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(MTU_COLUMNS)?;
    for row in rows {
        writer.write_record([
            row.date.format("%Y-%m-%d").to_string(),
            row.mtu.to_string(),
            row.price.map(|p| p.to_string()).unwrap_or_default(),
        ])?;
    }
    writer.into_inner().map_err(|e| ProcessingError::Encode(e.to_string()))
}

pub fn read_mtu_csv(bytes: &[u8]) -> Result<Vec<MtuRow>, ProcessingError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);
    require_columns(reader.headers()?, &MTU_COLUMNS)?;

    let rows = reader
        .deserialize()
        .collect::<Result<Vec<MtuRow>, csv::Error>>()?;
    Ok(rows)
}

pub(crate) fn require_columns(headers: &csv::StringRecord, columns: &[&str]) -> Result<(), ProcessingError> {
    let missing: Vec<String> = columns
        .iter()
        .filter(|c| !headers.iter().any(|h| h == **c))
        .map(|c| c.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProcessingError::MissingColumns(missing))
    }
}
