// src/lib.rs

//! Appends a dated metric column to a CSV of entity names by scraping one
//! page per entity under a bounded worker pool.

pub mod config;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod runner;
pub mod table;
