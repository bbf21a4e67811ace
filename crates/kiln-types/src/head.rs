//! The clock head: the set of current DAG tips.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cid::Cid;

/// Ordered, deduplicated sequence of content identifiers naming the current
/// tips of the Merkle DAG.
///
/// Tips are pairwise incomparable under reachability. The merge step may
/// transiently violate that and restores it by union-and-sort.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClockHead(Vec<Cid>);

impl ClockHead {
    /// An empty head (genesis).
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// A head with a single tip.
    pub fn single(cid: Cid) -> Self {
        Self(vec![cid])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.0.contains(cid)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cid> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Cid] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Cid> {
        self.0
    }

    /// Drop repeated entries, keeping the first occurrence of each.
    pub fn unique(self) -> Self {
        let mut seen = HashSet::with_capacity(self.0.len());
        Self(self.0.into_iter().filter(|c| seen.insert(*c)).collect())
    }

    /// Sort by canonical string form.
    pub fn sorted(mut self) -> Self {
        self.0.sort();
        self
    }

    /// Set equality, ignoring order and duplicates.
    pub fn same_tips(&self, other: &ClockHead) -> bool {
        let a: HashSet<&Cid> = self.0.iter().collect();
        let b: HashSet<&Cid> = other.0.iter().collect();
        a == b
    }
}

impl From<Vec<Cid>> for ClockHead {
    fn from(cids: Vec<Cid>) -> Self {
        Self(cids)
    }
}

impl FromIterator<Cid> for ClockHead {
    fn from_iter<I: IntoIterator<Item = Cid>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ClockHead {
    type Item = Cid;
    type IntoIter = std::vec::IntoIter<Cid>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ClockHead {
    type Item = &'a Cid;
    type IntoIter = std::slice::Iter<'a, Cid>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Debug for ClockHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl fmt::Display for ClockHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(Cid::short).collect();
        write!(f, "[{}]", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u8) -> Cid {
        Cid::from_hash([n; 32])
    }

    #[test]
    fn unique_keeps_first_occurrence() {
        let head = ClockHead::from(vec![cid(3), cid(1), cid(3), cid(2), cid(1)]);
        assert_eq!(head.unique(), ClockHead::from(vec![cid(3), cid(1), cid(2)]));
    }

    #[test]
    fn sorted_uses_canonical_order() {
        let head = ClockHead::from(vec![cid(9), cid(0), cid(4)]).sorted();
        assert_eq!(head.as_slice(), &[cid(0), cid(4), cid(9)]);
    }

    #[test]
    fn same_tips_ignores_order() {
        let a = ClockHead::from(vec![cid(1), cid(2)]);
        let b = ClockHead::from(vec![cid(2), cid(1)]);
        assert_ne!(a, b);
        assert!(a.same_tips(&b));
        assert!(!a.same_tips(&ClockHead::single(cid(1))));
    }

    #[test]
    fn serde_is_a_plain_list() {
        let head = ClockHead::single(cid(5));
        let json = serde_json::to_string(&head).unwrap();
        assert!(json.starts_with("[\"b"));
        let parsed: ClockHead = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, head);
    }

    #[test]
    fn empty_head() {
        let head = ClockHead::new();
        assert!(head.is_empty());
        assert_eq!(format!("{head}"), "[]");
    }
}
