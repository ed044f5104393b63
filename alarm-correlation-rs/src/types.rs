use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Trap OID of the NBI keep-alive heartbeat. Heartbeats carry no fault state
/// and are excluded from the primary scan at the store.
pub const KEEPALIVE_TRAP_OID: &str = "nbiEventKeepAlive";

/// Separator between the components of correlation keys and signatures.
pub const KEY_SEPARATOR: &str = "**";

/// Suffix that keeps recovery keys distinct from fault keys.
pub const RECOVERY_SUFFIX: &str = "_rec";

/// Replacement for literal dots in signature components. The signature ends
/// up as a nested-map key in the persisted record, where a raw dot could be
/// read as a path separator.
pub const ESCAPED_DOT: &str = "\\u002e";

pub const SEVERITY_WARNING: &str = "Warning";
pub const SEVERITY_CLEARED: &str = "Cleared";

/// Fault classification of a primary event. Any other raw flag value makes
/// the event ineligible for correlation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FaultFlag {
    Fault,
    Recovery,
}

impl FaultFlag {
    pub fn parse(raw: &str) -> Option<FaultFlag> {
        match raw {
            "Fault" => Some(FaultFlag::Fault),
            "Recovery" => Some(FaultFlag::Recovery),
            _ => None,
        }
    }
}

/// One record from the primary fault/recovery stream.
#[derive(Clone, Debug)]
pub struct PrimaryEvent {
    pub ne_name: String,
    pub managed_object: String,
    pub alarm_name: String,
    pub fault_flag: String,
    pub event_date: NaiveDate,
    pub event_time: NaiveTime,
}

impl PrimaryEvent {
    /// `None` for flags outside Fault/Recovery; those events are skipped.
    pub fn fault_class(&self) -> Option<FaultFlag> {
        FaultFlag::parse(&self.fault_flag)
    }

    /// Composite identity of the fault condition. Recoveries get a distinct
    /// key so faults and clears of the same condition accumulate separately.
    pub fn correlation_key(&self) -> String {
        let mut key = [
            self.ne_name.as_str(),
            self.managed_object.as_str(),
            self.alarm_name.as_str(),
        ]
        .join(KEY_SEPARATOR);
        if self.fault_class() == Some(FaultFlag::Recovery) {
            key.push_str(RECOVERY_SUFFIX);
        }
        key
    }
}

/// One record from the candidate alarm stream.
#[derive(Clone, Debug)]
pub struct CandidateEvent {
    pub node_name: String,
    pub object_full_name: String,
    pub alarm_name: String,
    pub detected_date: NaiveDate,
    pub detected_time: NaiveTime,
    pub severity: String,
}

impl CandidateEvent {
    /// Composite identity of the candidate alarm, dots escaped per component.
    pub fn signature(&self) -> String {
        [
            escape_dots(&self.node_name),
            escape_dots(&self.object_full_name),
            escape_dots(&self.alarm_name),
        ]
        .join(KEY_SEPARATOR)
    }
}

fn escape_dots(component: &str) -> String {
    component.replace('.', ESCAPED_DOT)
}

/// Which candidate severities a primary event may correlate with: active
/// faults match anything except warnings and clears, recoveries match
/// clears only.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeverityFilter {
    ActiveAlarms,
    ClearsOnly,
}

impl From<FaultFlag> for SeverityFilter {
    fn from(flag: FaultFlag) -> SeverityFilter {
        match flag {
            FaultFlag::Fault => SeverityFilter::ActiveAlarms,
            FaultFlag::Recovery => SeverityFilter::ClearsOnly,
        }
    }
}

impl SeverityFilter {
    /// Reference predicate for the store-side severity filter. Store
    /// backends must apply exactly this.
    pub fn matches(&self, severity: &str) -> bool {
        match self {
            SeverityFilter::ActiveAlarms => {
                severity != SEVERITY_WARNING && severity != SEVERITY_CLEARED
            }
            SeverityFilter::ClearsOnly => severity == SEVERITY_CLEARED,
        }
    }
}

/// One persisted row of the correlation matrix.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub key1: String,
    pub count: i64,
    pub nested_count: HashMap<String, i64>,
}
