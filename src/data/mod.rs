pub mod document;
pub mod entsoe_api;
pub mod http;
pub mod market;
pub mod types;

#[cfg(test)]
pub mod fixtures;
