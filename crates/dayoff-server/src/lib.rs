//! HTTP transport for the day-off prediction pipeline

pub mod api;
pub mod config;
