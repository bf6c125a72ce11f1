//! Line-oriented parser for ISC dhcpd lease logs.
//!
//! The log is a flat sequence of blocks:
//!
//! ```text
//! lease 10.0.0.5 {
//!   starts 2 2024/01/02 00:00:00;
//!   ends 2 2024/01/02 01:00:00;
//!   cltt 2 2024/01/02 00:00:00;
//!   hardware ethernet 00:50:c2:12:34:56;
//!   client-hostname "laptop";
//! }
//! ```
//!
//! [`LeaseParser`] walks the lines with a two-state machine (outside or inside
//! a block) and emits one [`LeaseRecord`] per closing `}`. Inside a block each
//! line is matched against a fixed prefix table, first match wins; anything
//! else is ignored. A block left open at end of input is dropped.
//!
//! Malformed addresses and timestamps abort the parse in strict mode. In
//! lenient mode the offending block is discarded and parsing resumes after
//! its closing brace.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use macaddr::MacAddr6;
use tracing::{debug, info, warn};

use crate::config::{Config, TimestampZone};
use crate::error::{Error, Result};
use crate::lease::{LeaseRecord, Leases};

/// Lease timestamp layout, including the directive's trailing semicolon.
const LEASE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S;";

/// Width of `YYYY/MM/DD HH:MM:SS;`. Every field is zero-padded.
const LEASE_TIME_LENGTH: usize = 20;

const LEASE_HEADER_PREFIX: &str = "lease ";
const LEASE_HEADER_SUFFIX: &str = " {";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Starts,
    Ends,
    Cltt,
    HardwareEthernet,
    ClientHostname,
    Abandoned,
    Close,
}

/// Prefix table for lines inside a block, checked in order.
const DIRECTIVES: [(&str, Directive); 7] = [
    ("starts", Directive::Starts),
    ("ends", Directive::Ends),
    ("cltt", Directive::Cltt),
    ("hardware ethernet ", Directive::HardwareEthernet),
    ("client-hostname ", Directive::ClientHostname),
    ("abandoned;", Directive::Abandoned),
    ("}", Directive::Close),
];

fn match_directive(line: &str) -> Option<Directive> {
    DIRECTIVES
        .iter()
        .find(|(prefix, _)| line.starts_with(prefix))
        .map(|(_, directive)| *directive)
}

#[derive(Debug)]
enum ParserState {
    Outside,
    Inside(LeaseRecord),
    /// Discarding a malformed block until its closing brace (lenient mode).
    Skipping,
}

/// Counters reported once the input is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines: usize,
    pub blocks: usize,
    pub skipped_blocks: usize,
    pub dropped_trailing_block: bool,
}

#[derive(Debug)]
pub struct LeaseParser {
    state: ParserState,
    zone: TimestampZone,
    strict: bool,
    stats: ParseStats,
}

impl LeaseParser {
    pub fn new(zone: TimestampZone, strict: bool) -> Self {
        Self {
            state: ParserState::Outside,
            zone,
            strict,
            stats: ParseStats::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.timestamp_zone, config.strict)
    }

    /// Consumes one line, returning a record when the line closes a block.
    pub fn feed_line(&mut self, raw: &str) -> Result<Option<LeaseRecord>> {
        self.stats.lines += 1;
        let line = raw.trim();

        match std::mem::replace(&mut self.state, ParserState::Outside) {
            ParserState::Outside => {
                if let Some(address) = header_address(line) {
                    match address.parse::<IpAddr>() {
                        Ok(ip_address) => {
                            self.state =
                                ParserState::Inside(LeaseRecord::new(ip_address.to_canonical()));
                        }
                        Err(_) => self.recover(Error::InvalidAddress {
                            line: self.stats.lines,
                            value: address.to_string(),
                        })?,
                    }
                }
                Ok(None)
            }
            ParserState::Inside(mut record) => match match_directive(line) {
                Some(Directive::Close) => {
                    self.stats.blocks += 1;
                    Ok(Some(record))
                }
                Some(directive) => {
                    match self.apply(directive, line, &mut record) {
                        Ok(()) => self.state = ParserState::Inside(record),
                        Err(error) => self.recover(error)?,
                    }
                    Ok(None)
                }
                None => {
                    self.state = ParserState::Inside(record);
                    Ok(None)
                }
            },
            ParserState::Skipping => {
                if !line.starts_with('}') {
                    self.state = ParserState::Skipping;
                }
                Ok(None)
            }
        }
    }

    /// Ends the input. An unterminated block is dropped.
    pub fn finish(self) -> ParseStats {
        let mut stats = self.stats;
        if let ParserState::Inside(record) = self.state {
            debug!(
                "Dropping unterminated lease block for {} at end of input",
                record.ip_address
            );
            stats.dropped_trailing_block = true;
        }
        stats
    }

    /// Parses a whole lease log into a reconciled table.
    pub fn parse<R: BufRead>(mut self, reader: R) -> Result<(Leases, ParseStats)> {
        let mut leases = Leases::new();
        for line in reader.lines() {
            if let Some(record) = self.feed_line(&line?)? {
                leases.merge(record);
            }
        }
        Ok((leases, self.finish()))
    }

    fn apply(&self, directive: Directive, line: &str, record: &mut LeaseRecord) -> Result<()> {
        match directive {
            Directive::Starts => record.starts = Some(self.timestamp(line, "starts")?),
            Directive::Ends => record.ends = Some(self.timestamp(line, "ends")?),
            Directive::Cltt => record.cltt = Some(self.timestamp(line, "cltt")?),
            Directive::HardwareEthernet => {
                let value = line["hardware ethernet ".len()..]
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim();
                let mac = value
                    .parse::<MacAddr6>()
                    .map_err(|_| Error::InvalidHardwareAddress {
                        line: self.stats.lines,
                        value: value.to_string(),
                    })?;
                record.mac_address = Some(mac);
            }
            Directive::ClientHostname => {
                record.hostname = line.split('"').nth(1).unwrap_or_default().to_string();
            }
            Directive::Abandoned => record.abandoned = true,
            Directive::Close => {}
        }
        Ok(())
    }

    /// Extracts `<date> <time>;` from `<keyword> <weekday> <date> <time>;`.
    fn timestamp(&self, line: &str, field: &'static str) -> Result<DateTime<Utc>> {
        let tokens: Vec<&str> = line.split(' ').collect();
        let invalid = |value: String| Error::InvalidTimestamp {
            line: self.stats.lines,
            field,
            value,
        };

        if tokens.len() < 4 {
            return Err(invalid(tokens[1..].join(" ")));
        }

        let value = format!("{} {}", tokens[2], tokens[3]);
        if value.len() != LEASE_TIME_LENGTH {
            return Err(invalid(value));
        }

        NaiveDateTime::parse_from_str(&value, LEASE_TIME_FORMAT)
            .ok()
            .and_then(|naive| self.zone.to_utc(naive))
            .ok_or_else(|| invalid(value))
    }

    fn recover(&mut self, error: Error) -> Result<()> {
        if self.strict {
            return Err(error);
        }
        warn!("Skipping lease block: {}", error);
        self.stats.skipped_blocks += 1;
        self.state = ParserState::Skipping;
        Ok(())
    }
}

fn header_address(line: &str) -> Option<&str> {
    if line.starts_with(LEASE_HEADER_PREFIX) && line.ends_with(LEASE_HEADER_SUFFIX) {
        Some(line.split(' ').nth(1).unwrap_or_default())
    } else {
        None
    }
}

/// Reads and reconciles the lease log named by `config.leases_file`.
pub fn read_leases_file(config: &Config) -> Result<Leases> {
    let path: &Path = &config.leases_file;
    info!("Reading {}", path.display());

    let file = File::open(path).map_err(|source| Error::OpenFile {
        path: path.to_path_buf(),
        source,
    })?;

    let (leases, stats) = LeaseParser::from_config(config).parse(BufReader::new(file))?;

    if stats.skipped_blocks > 0 {
        warn!("Skipped {} malformed lease blocks", stats.skipped_blocks);
    }
    info!(
        "Read {} lines ({} blocks, {} addresses) from {}",
        stats.lines,
        stats.blocks,
        leases.len(),
        path.display()
    );

    Ok(leases)
}
