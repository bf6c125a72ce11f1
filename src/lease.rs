//! Lease records, lifecycle classification and reconciliation.
//!
//! A lease log holds one block per grant or renewal, so a busy address shows
//! up many times. [`Leases`] folds those observations into a single record
//! per IP address:
//!
//! - the block with the strictly latest `ends` time wins
//! - ties keep the record that was seen first
//! - `count` always sums every observation for the address
//!
//! [`LeaseState`] is derived at report time from a single "now" snapshot and
//! is never stored.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use macaddr::MacAddr6;
use serde::Serialize;

/// One lease, either a raw block observation or the reconciled result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    pub ip_address: IpAddr,

    /// Hardware address from `hardware ethernet`, if the block had one.
    pub mac_address: Option<MacAddr6>,

    /// Client-supplied hostname, empty when the block had none.
    pub hostname: String,

    pub starts: Option<DateTime<Utc>>,
    pub ends: Option<DateTime<Utc>>,

    /// Client last transaction time.
    pub cltt: Option<DateTime<Utc>>,

    /// Number of lease blocks folded into this record.
    pub count: u32,

    pub abandoned: bool,
}

impl LeaseRecord {
    /// Creates an empty observation for `ip_address` with a count of one.
    pub fn new(ip_address: IpAddr) -> Self {
        Self {
            ip_address,
            mac_address: None,
            hostname: String::new(),
            starts: None,
            ends: None,
            cltt: None,
            count: 1,
            abandoned: false,
        }
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> LeaseState {
        LeaseState::classify(self.abandoned, self.starts, self.ends, now)
    }

    /// Lowercase colon-separated hardware address, or an empty string.
    pub fn mac_string(&self) -> String {
        self.mac_address
            .map(|mac| format_octets(mac.as_bytes()))
            .unwrap_or_default()
    }

    /// The `xx:xx:xx` vendor prefix of the hardware address.
    pub fn oui_prefix(&self) -> Option<String> {
        self.mac_address
            .map(|mac| format_octets(&mac.as_bytes()[..3]))
    }
}

fn format_octets(octets: &[u8]) -> String {
    octets
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(":")
}

/// Lifecycle of a lease relative to a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseState {
    Abandoned,
    Future,
    Current,
    Past,
}

impl LeaseState {
    /// All states in report order.
    pub const ALL: [LeaseState; 4] = [
        LeaseState::Abandoned,
        LeaseState::Future,
        LeaseState::Current,
        LeaseState::Past,
    ];

    /// Classifies a lease at `now`.
    ///
    /// The abandoned flag takes priority over the timestamps. A missing
    /// timestamp counts as the earliest possible instant, so a lease without
    /// an `ends` time is always in the past.
    pub fn classify(
        abandoned: bool,
        starts: Option<DateTime<Utc>>,
        ends: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        if abandoned {
            return LeaseState::Abandoned;
        }

        let starts = starts.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let ends = ends.unwrap_or(DateTime::<Utc>::MIN_UTC);

        if now < starts {
            LeaseState::Future
        } else if now <= ends {
            LeaseState::Current
        } else {
            LeaseState::Past
        }
    }
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LeaseState::Abandoned => "Abandoned",
            LeaseState::Future => "Future",
            LeaseState::Current => "Current",
            LeaseState::Past => "Past",
        };
        f.write_str(name)
    }
}

/// Reconciled lease table, one record per IP address.
#[derive(Debug, Clone, Default)]
pub struct Leases {
    records: HashMap<IpAddr, LeaseRecord>,
}

impl Leases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one observation into the table.
    ///
    /// The incoming record replaces the incumbent only when its `ends` time
    /// is strictly later; either way the surviving record carries the summed
    /// count.
    pub fn merge(&mut self, record: LeaseRecord) {
        match self.records.entry(record.ip_address) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                let total = existing.count + record.count;
                if record.ends > existing.ends {
                    *existing = LeaseRecord {
                        count: total,
                        ..record
                    };
                } else {
                    existing.count = total;
                }
            }
        }
    }

    pub fn get(&self, ip_address: &IpAddr) -> Option<&LeaseRecord> {
        self.records.get(ip_address)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LeaseRecord> {
        self.records.values()
    }

    /// Returns the records ordered by binary address.
    pub fn into_sorted(self) -> Vec<LeaseRecord> {
        let mut records: Vec<LeaseRecord> = self.records.into_values().collect();
        records.sort_by_key(|record| address_sort_key(&record.ip_address));
        records
    }
}

impl FromIterator<LeaseRecord> for Leases {
    fn from_iter<I: IntoIterator<Item = LeaseRecord>>(iter: I) -> Self {
        let mut leases = Leases::new();
        for record in iter {
            leases.merge(record);
        }
        leases
    }
}

/// 16-byte form of an address; IPv4 is mapped into `::ffff:0:0/96`.
pub fn address_sort_key(ip_address: &IpAddr) -> [u8; 16] {
    match ip_address {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
    }

    fn observation(ip: [u8; 4], starts: DateTime<Utc>, ends: DateTime<Utc>) -> LeaseRecord {
        LeaseRecord {
            starts: Some(starts),
            ends: Some(ends),
            ..LeaseRecord::new(IpAddr::V4(Ipv4Addr::from(ip)))
        }
    }

    #[test]
    fn test_new_record_defaults() {
        let record = LeaseRecord::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(record.count, 1);
        assert!(record.mac_address.is_none());
        assert!(record.hostname.is_empty());
        assert!(!record.abandoned);
        assert_eq!(record.mac_string(), "");
        assert_eq!(record.oui_prefix(), None);
    }

    #[test]
    fn test_classify_boundaries() {
        let starts = Some(at(2, 0, 0));
        let ends = Some(at(2, 1, 0));

        assert_eq!(LeaseState::classify(false, starts, ends, at(1, 23, 59)), LeaseState::Future);
        assert_eq!(LeaseState::classify(false, starts, ends, at(2, 0, 0)), LeaseState::Current);
        assert_eq!(LeaseState::classify(false, starts, ends, at(2, 0, 30)), LeaseState::Current);
        assert_eq!(LeaseState::classify(false, starts, ends, at(2, 1, 0)), LeaseState::Current);
        assert_eq!(LeaseState::classify(false, starts, ends, at(2, 1, 1)), LeaseState::Past);
    }

    #[test]
    fn test_abandoned_takes_priority() {
        let starts = Some(at(2, 0, 0));
        let ends = Some(at(2, 1, 0));
        for now in [at(1, 0, 0), at(2, 0, 30), at(3, 0, 0)] {
            assert_eq!(LeaseState::classify(true, starts, ends, now), LeaseState::Abandoned);
        }
    }

    #[test]
    fn test_missing_timestamps_are_past() {
        assert_eq!(LeaseState::classify(false, None, None, at(2, 0, 0)), LeaseState::Past);
    }

    #[test]
    fn test_merge_later_end_replaces() {
        let mut leases = Leases::new();
        leases.merge(observation([10, 0, 0, 5], at(1, 0, 0), at(1, 1, 0)));

        let mut newer = observation([10, 0, 0, 5], at(2, 0, 0), at(2, 1, 0));
        newer.hostname = "laptop".to_string();
        leases.merge(newer);

        let record = leases.get(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))).unwrap();
        assert_eq!(leases.len(), 1);
        assert_eq!(record.count, 2);
        assert_eq!(record.ends, Some(at(2, 1, 0)));
        assert_eq!(record.hostname, "laptop");
        assert_eq!(record.state_at(at(2, 0, 30)), LeaseState::Current);
    }

    #[test]
    fn test_merge_earlier_end_keeps_incumbent() {
        let mut leases = Leases::new();
        let mut newer = observation([10, 0, 0, 5], at(2, 0, 0), at(2, 1, 0));
        newer.hostname = "kept".to_string();
        leases.merge(newer);
        leases.merge(observation([10, 0, 0, 5], at(1, 0, 0), at(1, 1, 0)));

        let record = leases.get(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))).unwrap();
        assert_eq!(record.count, 2);
        assert_eq!(record.hostname, "kept");
        assert_eq!(record.starts, Some(at(2, 0, 0)));
    }

    #[test]
    fn test_merge_tie_keeps_first_seen() {
        let mut first = observation([10, 0, 0, 7], at(1, 0, 0), at(1, 1, 0));
        first.hostname = "first".to_string();
        let mut second = observation([10, 0, 0, 7], at(1, 0, 30), at(1, 1, 0));
        second.hostname = "second".to_string();
        second.abandoned = true;

        let leases: Leases = vec![first, second].into_iter().collect();
        let record = leases.get(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))).unwrap();
        assert_eq!(record.count, 2);
        assert_eq!(record.hostname, "first");
        assert!(!record.abandoned);
    }

    #[test]
    fn test_merge_sums_prior_counts() {
        let mut leases = Leases::new();
        let mut heavy = observation([10, 0, 0, 9], at(1, 0, 0), at(1, 1, 0));
        heavy.count = 3;
        leases.merge(heavy);
        leases.merge(observation([10, 0, 0, 9], at(3, 0, 0), at(3, 1, 0)));

        let record = leases.get(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9))).unwrap();
        assert_eq!(record.count, 4);
        assert_eq!(record.ends, Some(at(3, 1, 0)));
    }

    #[test]
    fn test_sorted_by_binary_address() {
        let leases: Leases = [
            [10, 0, 0, 10],
            [10, 0, 0, 9],
            [192, 168, 1, 1],
            [10, 0, 0, 100],
        ]
        .into_iter()
        .map(|ip| observation(ip, at(1, 0, 0), at(1, 1, 0)))
        .collect();

        let order: Vec<String> = leases
            .into_sorted()
            .iter()
            .map(|record| record.ip_address.to_string())
            .collect();
        assert_eq!(order, vec!["10.0.0.9", "10.0.0.10", "10.0.0.100", "192.168.1.1"]);
    }

    #[test]
    fn test_sort_key_mixes_families() {
        let loopback_v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let v4 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let global_v6: IpAddr = "2001:db8::1".parse().unwrap();

        assert!(address_sort_key(&loopback_v6) < address_sort_key(&v4));
        assert!(address_sort_key(&v4) < address_sort_key(&global_v6));
    }

    #[test]
    fn test_oui_prefix_is_lowercase() {
        let record = LeaseRecord {
            mac_address: Some(MacAddr6::new(0x00, 0x50, 0xC2, 0xAB, 0xCD, 0xEF)),
            ..LeaseRecord::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
        };
        assert_eq!(record.oui_prefix().as_deref(), Some("00:50:c2"));
        assert_eq!(record.mac_string(), "00:50:c2:ab:cd:ef");
    }
}
