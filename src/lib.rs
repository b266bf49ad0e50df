//! Portalen - CMS, product catalogue and customer portal backend
//!
//! This library provides the HTTP API, services and persistence behind the
//! corporate site and its customer account area.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
