//! Report assembly: sorted rows joined with vendor names, plus a per-state
//! summary.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lease::{LeaseState, Leases};
use crate::parser::read_leases_file;
use crate::vendor::{UNKNOWN_ORGANIZATION, VendorDirectory};

/// Display format for lease timestamps.
pub const OUTPUT_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S %z";

/// Column titles and minimum widths. The last column is not padded; the
/// others are followed by one space.
const COLUMNS: [(&str, usize); 8] = [
    ("IP", 17),
    ("MAC", 19),
    ("Count", 6),
    ("Hostname", 22),
    ("State", 11),
    ("End Time", 27),
    ("Last Transaction Time", 27),
    ("Organization", 24),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub ip_address: IpAddr,
    pub mac_address: String,
    pub count: u32,
    pub hostname: String,
    pub state: LeaseState,
    pub starts: Option<DateTime<Utc>>,
    pub ends: Option<DateTime<Utc>>,
    pub cltt: Option<DateTime<Utc>>,
    pub organization: String,
}

/// Number of leases in each lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub abandoned: usize,
    pub future: usize,
    pub current: usize,
    pub past: usize,
}

impl StateCounts {
    pub fn record(&mut self, state: LeaseState) {
        match state {
            LeaseState::Abandoned => self.abandoned += 1,
            LeaseState::Future => self.future += 1,
            LeaseState::Current => self.current += 1,
            LeaseState::Past => self.past += 1,
        }
    }

    pub fn get(&self, state: LeaseState) -> usize {
        match state {
            LeaseState::Abandoned => self.abandoned,
            LeaseState::Future => self.future,
            LeaseState::Current => self.current,
            LeaseState::Past => self.past,
        }
    }

    pub fn total(&self) -> usize {
        self.abandoned + self.future + self.current + self.past
    }
}

impl fmt::Display for StateCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Total leases: {} (", self.total())?;
        for (index, state) in LeaseState::ALL.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", state.to_string().to_lowercase(), self.get(*state))?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// The single instant every row was classified against.
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<ReportRow>,
    pub summary: StateCounts,
}

impl Report {
    /// Sorts the reconciled leases by address, classifies each one at `now`
    /// and resolves its vendor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Database`](crate::Error::Database) if a vendor lookup fails.
    pub fn assemble(leases: Leases, vendors: &VendorDirectory, now: DateTime<Utc>) -> Result<Self> {
        let mut summary = StateCounts::default();
        let mut rows = Vec::with_capacity(leases.len());

        for record in leases.into_sorted() {
            let state = record.state_at(now);
            summary.record(state);

            let organization = match record.oui_prefix() {
                Some(prefix) => vendors.lookup(&prefix)?,
                None => UNKNOWN_ORGANIZATION.to_string(),
            };

            rows.push(ReportRow {
                ip_address: record.ip_address,
                mac_address: record.mac_string(),
                count: record.count,
                hostname: record.hostname,
                state,
                starts: record.starts,
                ends: record.ends,
                cltt: record.cltt,
                organization,
            });
        }

        Ok(Self {
            generated_at: now,
            rows,
            summary,
        })
    }

    /// Reads the lease log and opens the vendor directory in parallel, then
    /// assembles the report once both are ready.
    pub async fn generate(config: &Config, now: DateTime<Utc>) -> Result<Self> {
        let lease_config = config.clone();
        let leases = tokio::task::spawn_blocking(move || read_leases_file(&lease_config));

        let database = config.oui_database.clone();
        let vendors = tokio::task::spawn_blocking(move || VendorDirectory::open_read_only(database));

        let (leases, vendors) = tokio::try_join!(join_task(leases), join_task(vendors))?;
        debug!("Assembling report for {} addresses", leases.len());

        Self::assemble(leases, &vendors, now)
    }

    /// Renders the text table with timestamps shown in `tz`.
    pub fn render<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let mut out = String::new();

        let header: Vec<String> = COLUMNS.iter().map(|(title, _)| title.to_string()).collect();
        out.push_str(&format_line(&header));
        out.push('\n');
        let separator_width: usize =
            COLUMNS.iter().map(|(_, width)| width).sum::<usize>() + COLUMNS.len() - 1;
        out.push_str(&"#".repeat(separator_width));
        out.push('\n');

        for row in &self.rows {
            let cells = vec![
                row.ip_address.to_string(),
                row.mac_address.clone(),
                row.count.to_string(),
                row.hostname.clone(),
                row.state.to_string(),
                format_time(row.ends, tz),
                format_time(row.cltt, tz),
                row.organization.clone(),
            ];
            out.push_str(&format_line(&cells));
            out.push('\n');
        }

        out.push('\n');
        out.push_str(&self.summary.to_string());
        out.push('\n');
        out
    }
}

/// Awaits a blocking task, folding a panic or cancellation into [`Error::Task`].
pub async fn join_task<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    match handle.await {
        Ok(result) => result,
        Err(error) => Err(Error::Task(error.to_string())),
    }
}

fn format_line(cells: &[String]) -> String {
    let last = COLUMNS.len() - 1;
    cells
        .iter()
        .zip(COLUMNS.iter())
        .enumerate()
        .map(|(index, (cell, (_, width)))| {
            if index == last {
                cell.clone()
            } else {
                format!("{:<width$} ", cell, width = *width)
            }
        })
        .collect()
}

fn format_time<Tz>(time: Option<DateTime<Utc>>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    time.map(|time| time.with_timezone(tz).format(OUTPUT_TIME_FORMAT).to_string())
        .unwrap_or_default()
}
