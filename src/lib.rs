//! xui-exporter - Prometheus exporter for 3X-UI / X-UI panels
//!
//! This library polls a panel's HTTP API on an interval, authenticates with
//! a cached session cookie, and republishes traffic counters, online user
//! counts, process statistics and the Xray version as Prometheus gauges.

pub mod app;
pub mod cli;
pub mod collector;
pub mod config;
pub mod panel;
pub mod sink;
pub mod task_manager;
