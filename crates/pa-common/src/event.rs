//! Event records emitted by the edge stream processor.
//!
//! One classification event is produced per processed edge. Degree changes
//! (kinds 0 and 1) are bookkeeping events: they are only delivered to sinks
//! that subscribe to them, and they are what the rank replay consumes to
//! rebuild the degree distribution offline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of an emitted event. The numeric codes are part of the event log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EventKind {
    /// A target's degree decreased because one of its edges expired.
    DegreeDecrease = 0,
    /// A target's degree increased because an edge became active.
    DegreeIncrease = 1,
    /// A new edge between a source that has sent before and a target.
    NewEdge = 2,
    /// An edge whose source has never sent before.
    NewNodeEdge = 3,
    /// A transaction on an edge that is still active.
    RefreshActiveEdge = 4,
    /// A transaction on an edge that had expired earlier.
    ReactivatedEdge = 5,
}

impl EventKind {
    /// The four classification kinds, in code order.
    pub const CLASSIFICATIONS: [EventKind; 4] = [
        EventKind::NewEdge,
        EventKind::NewNodeEdge,
        EventKind::RefreshActiveEdge,
        EventKind::ReactivatedEdge,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(EventKind::DegreeDecrease),
            1 => Some(EventKind::DegreeIncrease),
            2 => Some(EventKind::NewEdge),
            3 => Some(EventKind::NewNodeEdge),
            4 => Some(EventKind::RefreshActiveEdge),
            5 => Some(EventKind::ReactivatedEdge),
            _ => None,
        }
    }

    /// True for the per-edge classification kinds (2-5).
    pub fn is_classification(self) -> bool {
        !self.is_bookkeeping()
    }

    /// True for degree change kinds (0 and 1).
    pub fn is_bookkeeping(self) -> bool {
        matches!(self, EventKind::DegreeDecrease | EventKind::DegreeIncrease)
    }

    /// Position of a classification kind inside [`EventKind::CLASSIFICATIONS`].
    pub fn classification_slot(self) -> Option<usize> {
        match self {
            EventKind::NewEdge => Some(0),
            EventKind::NewNodeEdge => Some(1),
            EventKind::RefreshActiveEdge => Some(2),
            EventKind::ReactivatedEdge => Some(3),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A single emitted event.
///
/// For classification kinds `degree` is the target's degree before the edge
/// is applied. For bookkeeping kinds it is the degree after the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub kind: EventKind,
    pub degree: u32,
    pub timestamp: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<u8>,
}

impl EventRecord {
    pub fn new(kind: EventKind, degree: u32, timestamp: u32) -> Self {
        Self {
            kind,
            degree,
            timestamp,
            contract: None,
        }
    }

    pub fn with_contract(mut self, contract: Option<u8>) -> Self {
        self.contract = contract;
        self
    }
}

impl fmt::Display for EventRecord {
    /// Tab-separated event log line (without trailing newline).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.kind, self.degree, self.timestamp)?;
        if let Some(c) = self.contract {
            write!(f, "\t{}", c)?;
        }
        Ok(())
    }
}

/// Rank of a target's degree within the current degree distribution.
///
/// `weighted[i]` is the normalized weighted rank for exponent `i`, in `[0, 1]`.
/// `count` and `norm_count` are the unweighted prefix count and total count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankSample {
    pub weighted: Vec<f64>,
    pub count: u64,
    pub norm_count: u64,
}

impl RankSample {
    /// A sample sized for `width` exponents, all zero.
    pub fn zeroed(width: usize) -> Self {
        Self {
            weighted: vec![0.0; width],
            count: 0,
            norm_count: 0,
        }
    }

    /// Reset to "rank zero" without reallocating.
    pub fn clear(&mut self) {
        self.weighted.iter_mut().for_each(|x| *x = 0.0);
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_roundtrip() {
        for code in 0..6 {
            let kind = EventKind::from_code(code).expect("valid code");
            assert_eq!(kind.code() as u32, code);
        }
        assert!(EventKind::from_code(6).is_none());
    }

    #[test]
    fn test_bookkeeping_split() {
        assert!(EventKind::DegreeDecrease.is_bookkeeping());
        assert!(EventKind::DegreeIncrease.is_bookkeeping());
        for kind in EventKind::CLASSIFICATIONS {
            assert!(kind.is_classification());
        }
        assert_eq!(EventKind::ReactivatedEdge.classification_slot(), Some(3));
        assert_eq!(EventKind::DegreeIncrease.classification_slot(), None);
    }

    #[test]
    fn test_record_tsv_display() {
        let rec = EventRecord::new(EventKind::DegreeDecrease, 0, 30);
        assert_eq!(rec.to_string(), "0\t0\t30");
        let rec = EventRecord::new(EventKind::NewEdge, 4, 99).with_contract(Some(2));
        assert_eq!(rec.to_string(), "2\t4\t99\t2");
    }

    #[test]
    fn test_record_json_omits_missing_contract() {
        let rec = EventRecord::new(EventKind::ReactivatedEdge, 1, 50);
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"reactivated_edge","degree":1,"timestamp":50}"#
        );
    }

    #[test]
    fn test_rank_sample_clear_keeps_width() {
        let mut s = RankSample::zeroed(3);
        s.weighted[1] = 0.5;
        s.count = 4;
        s.norm_count = 9;
        s.clear();
        assert_eq!(s.weighted, vec![0.0; 3]);
        assert_eq!(s.count, 0);
        assert_eq!(s.norm_count, 9);
    }
}
