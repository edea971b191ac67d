use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One explicit `<Point>` of a period. Upstream omits points whose price
/// repeats the previous one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub position: u32,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPeriod {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub resolution: String,
    pub points: Vec<PricePoint>,
}

/// A `<TimeSeries>` block as returned by one API page.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRecord {
    pub mrid: Option<String>,
    pub classification_sequence: Option<u32>,
    pub periods: Vec<SeriesPeriod>,
    /// Verbatim bytes of the element, replayed when re-serialising.
    pub raw: Vec<u8>,
}

impl TimeSeriesRecord {
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.periods.first().map(|p| p.start)
    }

    /// Dedup key across pages: (mRID, first period start).
    pub fn dedup_key(&self) -> (String, String) {
        let mrid = self.mrid.clone().unwrap_or_else(|| "UNKNOWN".to_string());
        let start = self
            .start()
            .map(|s| s.to_rfc3339())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        (mrid, start)
    }

    /// Absent classification counts as the primary series.
    pub fn is_primary(&self) -> bool {
        self.classification_sequence.map_or(true, |seq| seq == 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resolution {
    Minutes15,
    Minutes30,
    Minutes60,
}

impl Resolution {
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        match minutes {
            15 => Some(Self::Minutes15),
            30 => Some(Self::Minutes30),
            60 => Some(Self::Minutes60),
            _ => None,
        }
    }

    pub fn minutes(self) -> u32 {
        match self {
            Self::Minutes15 => 15,
            Self::Minutes30 => 30,
            Self::Minutes60 => 60,
        }
    }

    pub fn points_per_day(self) -> u32 {
        1440 / self.minutes()
    }

    pub fn points_per_hour(self) -> u32 {
        60 / self.minutes()
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Minutes15 => "PT15M",
            Self::Minutes30 => "PT30M",
            Self::Minutes60 => "PT60M",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One market time unit of a delivery day. `price` is `None` when the value
/// could not be reconstructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MtuRow {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "MTU")]
    pub mtu: u32,
    #[serde(rename = "Price")]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HourStatus {
    Ok,
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyRow {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Hour")]
    pub hour: u32,
    #[serde(rename = "Price")]
    pub price: Option<f64>,
    #[serde(rename = "Status")]
    pub status: HourStatus,
}

impl HourlyRow {
    #[cfg(test)]
    pub fn is_complete(&self) -> bool {
        self.status == HourStatus::Ok
    }
}

/// Non-fatal findings collected while processing. The affected rows are
/// still emitted, marked where applicable.
#[derive(Debug, Clone, PartialEq)]
pub enum DataQualityWarning {
    MissingLeadingPoint {
        date: NaiveDate,
        first_explicit: Option<u32>,
    },
    IncompleteHour {
        date: NaiveDate,
        hour: u32,
        present: u32,
        expected: u32,
    },
    DuplicateDeliveryDay {
        date: NaiveDate,
        mrid: String,
    },
    PositionOutOfRange {
        date: NaiveDate,
        position: u32,
        expected: u32,
    },
    EmptySeries {
        mrid: String,
    },
    UnsupportedDay {
        date: NaiveDate,
        max_mtu: u32,
    },
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLeadingPoint { date, first_explicit } => match first_explicit {
                Some(pos) => write!(
                    f,
                    "{}: no price before position {}, leading MTUs marked invalid",
                    date, pos
                ),
                None => write!(f, "{}: no usable price points, all MTUs marked invalid", date),
            },
            Self::IncompleteHour { date, hour, present, expected } => write!(
                f,
                "{} hour {}: {} of {} MTU prices present",
                date, hour, present, expected
            ),
            Self::DuplicateDeliveryDay { date, mrid } => write!(
                f,
                "{}: series {} repeats an already processed delivery day, skipped",
                date, mrid
            ),
            Self::PositionOutOfRange { date, position, expected } => write!(
                f,
                "{}: position {} outside 1..={}, dropped",
                date, position, expected
            ),
            Self::EmptySeries { mrid } => write!(f, "series {} has no price points, skipped", mrid),
            Self::UnsupportedDay { date, max_mtu } => write!(
                f,
                "{}: MTU index {} matches no supported resolution, day skipped",
                date, max_mtu
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mrid: Option<&str>, seq: Option<u32>) -> TimeSeriesRecord {
        TimeSeriesRecord {
            mrid: mrid.map(str::to_string),
            classification_sequence: seq,
            periods: vec![SeriesPeriod {
                start: "2024-03-01T23:00:00Z".parse().unwrap(),
                end: None,
                resolution: "PT60M".to_string(),
                points: vec![],
            }],
            raw: vec![],
        }
    }

    #[test]
    fn test_dedup_key_uses_first_period_start() {
        let key = record(Some("7"), None).dedup_key();
        assert_eq!(key, ("7".to_string(), "2024-03-01T23:00:00+00:00".to_string()));
    }

    #[test]
    fn test_dedup_key_marks_missing_fields() {
        let mut rec = record(None, None);
        rec.periods.clear();
        assert_eq!(rec.dedup_key(), ("UNKNOWN".to_string(), "UNKNOWN".to_string()));
    }

    #[test]
    fn test_primary_classification() {
        assert!(record(Some("1"), None).is_primary());
        assert!(record(Some("1"), Some(1)).is_primary());
        assert!(!record(Some("1"), Some(2)).is_primary());
    }

    #[test]
    fn test_resolution_geometry() {
        assert_eq!(Resolution::Minutes60.points_per_day(), 24);
        assert_eq!(Resolution::Minutes30.points_per_day(), 48);
        assert_eq!(Resolution::Minutes15.points_per_day(), 96);
        assert_eq!(Resolution::Minutes15.points_per_hour(), 4);
        assert_eq!(Resolution::from_minutes(20), None);
    }
}
