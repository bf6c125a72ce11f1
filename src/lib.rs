//! # leasescan
//!
//! Reads an ISC dhcpd lease log, folds repeated lease blocks into one record
//! per address and reports each lease with its lifecycle state and hardware
//! vendor.
//!
//! ## Features
//!
//! - Two-state line parser for `lease <ip> { ... }` blocks, strict or lenient
//! - Reconciliation that keeps the latest grant per address and counts every block
//! - Abandoned / future / current / past classification against one snapshot
//! - SQLite-backed OUI vendor directory built from the IEEE registry export
//! - Lease log and vendor directory loaded in parallel with Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::{Local, Utc};
//! use leasescan::{Config, Report};
//!
//! #[tokio::main]
//! async fn main() -> leasescan::Result<()> {
//!     let mut config = Config::load_or_default("leasescan.json")?;
//!     config.apply_env();
//!     let report = Report::generate(&config, Utc::now()).await?;
//!     print!("{}", report.render(&Local));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`LeaseParser`] - Lease log state machine
//! - [`Leases`] - Reconciled lease table keyed by IP address
//! - [`LeaseState`] - Lifecycle classification
//! - [`VendorDirectoryBuilder`] / [`VendorDirectory`] - OUI store build and lookup
//! - [`Report`] - Sorted rows joined with vendor names

pub mod config;
pub mod error;
pub mod lease;
pub mod oui;
pub mod parser;
pub mod report;
pub mod vendor;

pub use config::{Config, TimestampZone};
pub use error::{Error, Result};
pub use lease::{LeaseRecord, LeaseState, Leases};
pub use oui::VendorEntry;
pub use parser::{LeaseParser, ParseStats, read_leases_file};
pub use report::{Report, ReportRow, StateCounts};
pub use vendor::{
    BuildStats, UNKNOWN_ORGANIZATION, VendorDirectory, VendorDirectoryBuilder,
    create_vendor_database,
};
