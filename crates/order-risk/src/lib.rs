pub mod alerts;
pub mod config;
pub mod error;
pub mod locks;
pub mod monitoring;
pub mod preauth;
pub mod risk;
pub mod store;
pub mod telemetry;
