//! # API Dashboard backend
//!
//! Credential storage, an HTTP request proxy that injects stored credentials,
//! per-provider rate-limit accounting and dashboard statistics.

pub mod config;
pub mod dao;
pub mod dashboard;
pub mod error;
pub mod logger;
pub mod proxy;
pub mod stores;
pub mod web;
