pub mod error;
pub mod hourly;
pub mod mtu;
pub mod stats;

pub use error::ProcessingError;
