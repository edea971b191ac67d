use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use crate::data::types::HourlyRow;
use crate::processing::error::ProcessingError;

pub const STATS_COLUMNS: [&str; 6] = ["Date", "Average", "Spread", "Volatility", "Max", "Min"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub average: f64,
    pub max: f64,
    pub min: f64,
    pub spread: f64,
    /// Sample standard deviation of the hourly prices.
    pub volatility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub avg_price: f64,
    pub avg_spread: f64,
    pub avg_volatility: f64,
    pub max_spread: f64,
    pub max_spread_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyReport {
    pub days: Vec<DailyStats>,
    pub summary: StatsSummary,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Per-day statistics over hourly prices. Hours without a price are ignored.
pub fn daily_stats(rows: &[HourlyRow]) -> Result<DailyReport, ProcessingError> {
    let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for row in rows {
        if let Some(price) = row.price {
            by_day.entry(row.date).or_default().push(price);
        }
    }

    let days: Vec<DailyStats> = by_day
        .into_iter()
        .map(|(date, prices)| {
            let average = mean(&prices);
            let max = prices.iter().copied().fold(f64::MIN, f64::max);
            let min = prices.iter().copied().fold(f64::MAX, f64::min);
            DailyStats {
                date,
                average,
                max,
                min,
                spread: max - min,
                volatility: sample_std(&prices, average),
            }
        })
        .collect();

    let (first, last) = match (days.first(), days.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(ProcessingError::NoData("daily stats")),
    };

    // First day wins on equal spreads.
    let widest = days
        .iter()
        .fold(first, |best, day| if day.spread > best.spread { day } else { best });

    let averages: Vec<f64> = days.iter().map(|d| d.average).collect();
    let spreads: Vec<f64> = days.iter().map(|d| d.spread).collect();
    let volatilities: Vec<f64> = days.iter().map(|d| d.volatility).collect();

    let summary = StatsSummary {
        start_date: first.date,
        end_date: last.date,
        avg_price: round2(mean(&averages)),
        avg_spread: round2(mean(&spreads)),
        avg_volatility: round2(mean(&volatilities)),
        max_spread: round2(widest.spread),
        max_spread_date: widest.date,
    };

    Ok(DailyReport { days, summary })
}

pub fn write_stats_csv(days: &[DailyStats]) -> Result<Vec<u8>, ProcessingError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(STATS_COLUMNS)?;
    for day in days {
        writer.write_record([
            day.date.format("%Y-%m-%d").to_string(),
            format!("{:.2}", day.average),
            format!("{:.2}", day.spread),
            format!("{:.2}", day.volatility),
            format!("{:.2}", day.max),
            format!("{:.2}", day.min),
        ])?;
    }
    writer.into_inner().map_err(|e| ProcessingError::Encode(e.to_string()))
}
