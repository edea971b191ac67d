use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use crate::data::types::{DataQualityWarning, HourStatus, HourlyRow, MtuRow, Resolution};
use crate::processing::error::ProcessingError;
use crate::processing::mtu::require_columns;

pub const HOURLY_COLUMNS: [&str; 4] = ["Date", "Hour", "Price", "Status"];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HourlyTable {
    pub rows: Vec<HourlyRow>,
    pub warnings: Vec<DataQualityWarning>,
}

/// MTUs per hour implied by the highest MTU index of a day. The bounds leave
/// room for the extra hour of an autumn DST day.
pub fn points_per_hour_for(max_mtu: u32) -> Option<u32> {
    let resolution = match max_mtu {
        1..=25 => Resolution::Minutes60,
        26..=50 => Resolution::Minutes30,
        51..=100 => Resolution::Minutes15,
        _ => return None,
    };
    Some(resolution.points_per_hour())
}

#[derive(Default)]
struct HourBucket {
    sum: f64,
    valid: u32,
}

pub fn aggregate_hourly(rows: &[MtuRow], skip_unsupported: bool) -> Result<HourlyTable, ProcessingError> {
    let mut days: BTreeMap<NaiveDate, Vec<&MtuRow>> = BTreeMap::new();
    for row in rows {
        days.entry(row.date).or_default().push(row);
    }

    let mut table = HourlyTable::default();

    for (date, day_rows) in days {
        let max_mtu = day_rows.iter().map(|r| r.mtu).max().unwrap_or(0);
        let Some(per_hour) = points_per_hour_for(max_mtu) else {
            if !skip_unsupported {
                return Err(ProcessingError::UnsupportedDay { date, max_mtu });
            }
            table.warnings.push(DataQualityWarning::UnsupportedDay { date, max_mtu });
            continue;
        };

        let mut hours: BTreeMap<u32, HourBucket> = BTreeMap::new();
        for row in day_rows.iter().filter(|r| r.mtu >= 1) {
            let bucket = hours.entry((row.mtu - 1) / per_hour).or_default();
            if let Some(price) = row.price {
                bucket.sum += price;
                bucket.valid += 1;
            }
        }
        debug!("{}: {} hours from {} MTUs ({} per hour)", date, hours.len(), day_rows.len(), per_hour);

        for (hour, bucket) in hours {
            let price = (bucket.valid > 0).then(|| bucket.sum / f64::from(bucket.valid));
            let status = if bucket.valid < per_hour {
                table.warnings.push(DataQualityWarning::IncompleteHour {
                    date,
                    hour,
                    present: bucket.valid,
                    expected: per_hour,
                });
                HourStatus::Incomplete
            } else {
                HourStatus::Ok
            };

            table.rows.push(HourlyRow { date, hour, price, status });
        }
    }

    for warning in &table.warnings {
        warn!("{}", warning);
    }

    if table.rows.is_empty() {
        return Err(ProcessingError::NoData("hourly"));
    }

    Ok(table)
}

pub fn write_hourly_csv(rows: &[HourlyRow]) -> Result<Vec<u8>, ProcessingError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HOURLY_COLUMNS)?;
    for row in rows {
        let status = match row.status {
            HourStatus::Ok => "ok",
            HourStatus::Incomplete => "incomplete",
        };
        writer.write_record([
            row.date.format("%Y-%m-%d").to_string(),
            row.hour.to_string(),
            row.price.map(|p| p.to_string()).unwrap_or_default(),
            status.to_string(),
        ])?;
    }
    writer.into_inner().map_err(|e| ProcessingError::Encode(e.to_string()))
}

pub fn read_hourly_csv(bytes: &[u8]) -> Result<Vec<HourlyRow>, ProcessingError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);
    require_columns(reader.headers()?, &HOURLY_COLUMNS)?;

    let rows = reader
        .deserialize()
        .collect::<Result<Vec<HourlyRow>, csv::Error>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ProcessingConfig};
    use crate::data::fixtures::{publication, SeriesXml};
    use crate::data::market::MarketAreas;
    use crate::processing::mtu::parse_to_mtu;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn day(d: &str, prices: &[Option<f64>]) -> Vec<MtuRow> {
        prices
            .iter()
            .zip(1u32..)
            .map(|(&price, mtu)| MtuRow { date: date(d), mtu, price })
            .collect()
    }

    #[test]
    fn test_points_per_hour_bounds() {
        assert_eq!(points_per_hour_for(23), Some(1));
        assert_eq!(points_per_hour_for(25), Some(1));
        assert_eq!(points_per_hour_for(48), Some(2));
        assert_eq!(points_per_hour_for(92), Some(4));
        assert_eq!(points_per_hour_for(100), Some(4));
        assert_eq!(points_per_hour_for(101), None);
        assert_eq!(points_per_hour_for(0), None);
    }

    #[test]
    fn test_hourly_resolution_passes_prices_through() {
        let prices: Vec<Option<f64>> = (1..=24).map(|p| Some(p as f64 * 1.5)).collect();
        let table = aggregate_hourly(&day("2024-01-15", &prices), true).unwrap();

        assert_eq!(table.rows.len(), 24);
        assert!(table.warnings.is_empty());
        for (row, price) in table.rows.iter().zip(&prices) {
            assert_eq!(row.price, *price);
            assert!(row.is_complete());
        }
        assert_eq!(table.rows[0].hour, 0);
        assert_eq!(table.rows[23].hour, 23);
    }

    #[test]
    fn test_quarter_hours_average_into_hours() {
        let prices: Vec<Option<f64>> = (1..=96).map(|p| Some(p as f64)).collect();
        let table = aggregate_hourly(&day("2024-01-15", &prices), true).unwrap();

        assert_eq!(table.rows.len(), 24);
        for row in &table.rows {
            let h = row.hour as f64;
            let expected = ((4.0 * h + 1.0) + (4.0 * h + 2.0) + (4.0 * h + 3.0) + (4.0 * h + 4.0)) / 4.0;
            assert_eq!(row.price, Some(expected));
        }
    }

    #[test]
    fn test_half_hours_average_into_hours() {
        let prices: Vec<Option<f64>> = (1..=48).map(|p| Some(if p % 2 == 0 { 20.0 } else { 10.0 })).collect();
        let table = aggregate_hourly(&day("2024-01-15", &prices), true).unwrap();

        assert_eq!(table.rows.len(), 24);
        assert!(table.rows.iter().all(|r| r.price == Some(15.0) && r.is_complete()));
    }

    #[test]
    fn test_partial_hourly_day() {
        let prices: Vec<Option<f64>> = (1..=20).map(|p| Some(p as f64)).collect();
        let table = aggregate_hourly(&day("2024-01-15", &prices), true).unwrap();

        assert_eq!(table.rows.len(), 20);
        assert!(table.rows.iter().all(HourlyRow::is_complete));
    }

    #[test]
    fn test_partial_quarter_hour_day() {
        let prices: Vec<Option<f64>> = (1..=80).map(|p| Some(p as f64)).collect();
        let table = aggregate_hourly(&day("2024-01-15", &prices), true).unwrap();

        assert_eq!(table.rows.len(), 20);
        assert!(table.warnings.is_empty());
        assert!(table.rows.iter().all(HourlyRow::is_complete));
        assert_eq!(table.rows[19].hour, 19);
        assert_eq!(table.rows[19].price, Some(78.5));
    }

    #[test]
    fn test_fall_back_day_yields_25_hours() {
        let points: Vec<(u32, f64)> = (1..=100).map(|p| (p, p as f64)).collect();
        let xml = publication(&[SeriesXml::hourly("1", "2024-10-26T22:00Z", "2024-10-27T23:00Z")
            .resolution("PT15M")
            .points(&points)]);
        let area = MarketAreas::from_config(&Config::default().market_areas)
            .unwrap()
            .resolve("NL")
            .unwrap()
            .clone();
        let mtu = parse_to_mtu(&area, xml.as_bytes(), &ProcessingConfig::default()).unwrap();

        let table = aggregate_hourly(&mtu.rows, true).unwrap();

        assert_eq!(table.rows.len(), 25);
        assert!(table.warnings.is_empty());
        assert!(table.rows.iter().all(|r| r.date == date("2024-10-27") && r.is_complete()));
        assert_eq!(table.rows[24].hour, 24);
        assert_eq!(table.rows[24].price, Some(98.5));
    }

    #[test]
    fn test_short_hour_flagged_incomplete() {
        let mut rows = day("2024-01-15", &vec![Some(8.0); 96]);
        rows.retain(|r| r.mtu != 6 && r.mtu != 7);

        let table = aggregate_hourly(&rows, true).unwrap();

        assert_eq!(table.rows.len(), 24);
        let hour1 = &table.rows[1];
        assert_eq!(hour1.status, HourStatus::Incomplete);
        assert_eq!(hour1.price, Some(8.0));
        assert_eq!(
            table.warnings,
            vec![DataQualityWarning::IncompleteHour {
                date: date("2024-01-15"),
                hour: 1,
                present: 2,
                expected: 4,
            }]
        );
    }

    #[test]
    fn test_invalid_prices_excluded_from_mean() {
        let mut prices = vec![Some(10.0); 96];
        prices[0] = None;
        prices[1] = None;
        prices[2] = None;
        prices[3] = None;
        prices[4] = None;
        let table = aggregate_hourly(&day("2024-01-15", &prices), true).unwrap();

        assert_eq!(table.rows[0].price, None);
        assert_eq!(table.rows[0].status, HourStatus::Incomplete);
        assert_eq!(table.rows[1].price, Some(10.0));
        assert_eq!(table.rows[1].status, HourStatus::Incomplete);
        assert!(table.rows[2].is_complete());
    }

    #[test]
    fn test_unsupported_day_skipped_or_rejected() {
        let mut rows = day("2024-01-15", &vec![Some(1.0); 24]);
        rows.extend(day("2024-01-16", &vec![Some(2.0); 120]));

        let table = aggregate_hourly(&rows, true).unwrap();
        assert_eq!(table.rows.len(), 24);
        assert_eq!(
            table.warnings,
            vec![DataQualityWarning::UnsupportedDay { date: date("2024-01-16"), max_mtu: 120 }]
        );

        let err = aggregate_hourly(&rows, false).unwrap_err();
        assert!(matches!(err, ProcessingError::UnsupportedDay { max_mtu: 120, .. }));
    }

    #[test]
    fn test_rows_sorted_by_date_then_hour() {
        let mut rows = day("2024-01-16", &vec![Some(2.0); 24]);
        rows.extend(day("2024-01-15", &vec![Some(1.0); 24]));
        rows.reverse();

        let table = aggregate_hourly(&rows, true).unwrap();

        let keys: Vec<(NaiveDate, u32)> = table.rows.iter().map(|r| (r.date, r.hour)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(table.rows[0].date, date("2024-01-15"));
    }

    #[test]
    fn test_csv_layout_and_read_back() {
        let rows = vec![
            HourlyRow { date: date("2024-01-15"), hour: 0, price: Some(42.25), status: HourStatus::Ok },
            HourlyRow { date: date("2024-01-15"), hour: 1, price: None, status: HourStatus::Incomplete },
        ];

        let csv = write_hourly_csv(&rows).unwrap();
        assert_eq!(
            String::from_utf8(csv.clone()).unwrap(),
            "Date,Hour,Price,Status\n2024-01-15,0,42.25,ok\n2024-01-15,1,,incomplete\n"
        );
        assert_eq!(read_hourly_csv(&csv).unwrap(), rows);
    }

    #[test]
    fn test_empty_input_is_error() {
        assert!(matches!(aggregate_hourly(&[], true), Err(ProcessingError::NoData("hourly"))));
    }
}
