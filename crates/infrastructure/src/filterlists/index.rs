use compact_str::CompactString;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;
use std::collections::HashMap;

/// A node in the reversed-label suffix trie.
#[derive(Default)]
struct TrieNode {
    children: HashMap<CompactString, TrieNode, FxBuildHasher>,
    /// List bitmask for exact entries terminating at this node.
    exact_mask: u64,
    /// List bitmask for zone entries (`.ads.example`): the node's domain
    /// and everything below it.
    zone_mask: u64,
}

impl TrieNode {
    fn new() -> Self {
        Self {
            children: HashMap::with_hasher(FxBuildHasher),
            exact_mask: 0,
            zone_mask: 0,
        }
    }
}

/// Suffix trie over reversed domain labels mapping domains to the filter
/// lists they are on.
///
/// `ads.example.com.` is stored as the path ["com", "example", "ads"];
/// zone entries set `zone_mask` so every sub-domain inherits the match.
/// Built once during compilation and swapped atomically.
#[derive(Default)]
pub struct DomainListIndex {
    root: TrieNode,
}

impl DomainListIndex {
    pub fn new() -> Self {
        Self {
            root: TrieNode::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Insert a domain entry. A leading dot makes it a zone entry that
    /// also matches all sub-domains.
    pub fn insert(&mut self, pattern: &str, list_mask: u64) {
        let (zone, domain) = match pattern.strip_prefix('.') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        let domain = domain.strip_suffix('.').unwrap_or(domain);

        let mut node = &mut self.root;
        for label in domain.split('.').rev() {
            node = node.children.entry(CompactString::new(label)).or_default();
        }
        if zone {
            node.zone_mask |= list_mask;
        } else {
            node.exact_mask |= list_mask;
        }
    }

    /// Combined list bitmask of all entries matching `domain`.
    #[inline]
    pub fn lookup(&self, domain: &str) -> u64 {
        let domain = domain.strip_suffix('.').unwrap_or(domain);
        let labels: SmallVec<[&str; 8]> = domain.split('.').rev().collect();
        let n = labels.len();
        let mut node = &self.root;
        let mut result: u64 = 0;

        for (i, label) in labels.iter().enumerate() {
            match node.children.get(*label) {
                Some(child) => {
                    // Zone entries match at their own node and below.
                    result |= child.zone_mask;
                    if i + 1 == n {
                        result |= child.exact_mask;
                    }
                    node = child;
                }
                None => break,
            }
        }

        result
    }
}
