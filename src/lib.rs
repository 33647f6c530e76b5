// Library for tests to access modules

pub mod broadcaster;
pub mod cache;
pub mod collector;
pub mod config;
pub mod invalidator;
pub mod logstream;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod runtime;
pub mod sysinfo_repo;
pub mod telemetry;
pub mod version;
