use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use crate::config::{ConfigError, MarketAreaConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct MarketArea {
    pub code: String,
    pub eic: String,
    pub timezone: Tz,
    pub name: Option<String>,
}

impl MarketArea {
    /// Local calendar date (delivery day) of a UTC instant in this area.
    pub fn delivery_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        delivery_date(self, instant)
    }
}

/// Map a UTC instant to the area's local calendar date. Uses the zone rules
/// in effect at that instant, so DST transitions shift the boundary.
pub fn delivery_date(area: &MarketArea, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&area.timezone).date_naive()
}

/// Immutable registry of configured market areas, keyed by code.
#[derive(Debug, Clone)]
pub struct MarketAreas {
    areas: HashMap<String, MarketArea>,
}

impl MarketAreas {
    pub fn from_config(configs: &[MarketAreaConfig]) -> Result<Self, ConfigError> {
        let mut areas = HashMap::with_capacity(configs.len());

        for cfg in configs {
            let timezone: Tz = cfg.timezone.parse().map_err(|e| ConfigError::InvalidTimezone {
                area: cfg.code.clone(),
                zone: cfg.timezone.clone(),
                reason: format!("{}", e),
            })?;

            let area = MarketArea {
                code: cfg.code.clone(),
                eic: cfg.eic.clone(),
                timezone,
                name: cfg.name.clone(),
            };

            if areas.insert(cfg.code.clone(), area).is_some() {
                return Err(ConfigError::DuplicateMarketArea(cfg.code.clone()));
            }
        }

        Ok(Self { areas })
    }

    pub fn resolve(&self, code: &str) -> Result<&MarketArea, ConfigError> {
        self.areas
            .get(code)
            .ok_or_else(|| ConfigError::UnknownMarketArea(code.to_string()))
    }

    /// Area codes in sorted order
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.areas.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

}
