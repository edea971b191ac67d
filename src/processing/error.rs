use chrono::NaiveDate;
use crate::data::document::DocumentError;

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Unsupported resolution '{0}'")]
    UnsupportedResolution(String),

    #[error("{date}: MTU index {max_mtu} matches no supported resolution")]
    UnsupportedDay { date: NaiveDate, max_mtu: u32 },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV is missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Failed to encode CSV: {0}")]
    Encode(String),

    #[error("No {0} rows produced, check the input")]
    NoData(&'static str),
}
