//! The claim system: prioritized, preemptible reservations over a tree of
//! resource nodes.
//!
//! Claim symbols are allocated hierarchically — each program's symbol
//! extends its parent's with a monotonically increasing counter — so that
//! comparing two symbols only ever needs their ancestry, never a global
//! clock.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

/// An index into the claim arena. Opaque; compared only through
/// [`ClaimRegistry::dominates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimSymbol(usize);

#[derive(Debug, Clone, Copy)]
struct ClaimNode {
    parent: Option<ClaimSymbol>,
    counter: u64,
}

/// Arena allocating [`ClaimSymbol`]s and comparing their ancestry.
#[derive(Debug, Default)]
pub struct ClaimArena {
    nodes: Vec<ClaimNode>,
    next_counter: u64,
}

impl ClaimArena {
    /// A fresh, empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the root claim symbol (no parent).
    pub fn root(&mut self) -> ClaimSymbol {
        self.alloc(None)
    }

    /// Allocate a new symbol as a child of `parent`.
    pub fn child_of(&mut self, parent: ClaimSymbol) -> ClaimSymbol {
        self.alloc(Some(parent))
    }

    fn alloc(&mut self, parent: Option<ClaimSymbol>) -> ClaimSymbol {
        let counter = self.next_counter;
        self.next_counter += 1;
        self.nodes.push(ClaimNode { parent, counter });
        ClaimSymbol(self.nodes.len() - 1)
    }

    fn path(&self, mut symbol: ClaimSymbol) -> Vec<ClaimSymbol> {
        let mut path = vec![symbol];
        while let Some(parent) = self.nodes[symbol.0].parent {
            path.push(parent);
            symbol = parent;
        }
        path.reverse();
        path
    }

    /// Whether `a` dominates `b`: `a` is an ancestor of `b`, or at the point
    /// where their ancestries diverge, `a`'s branch was created later
    /// (has a higher counter) than `b`'s.
    pub fn dominates(&self, a: ClaimSymbol, b: ClaimSymbol) -> bool {
        if a == b {
            return false;
        }
        let pa = self.path(a);
        let pb = self.path(b);
        let mut i = 0;
        while i < pa.len() && i < pb.len() && pa[i] == pb[i] {
            i += 1;
        }
        if i == pa.len() {
            // a's full ancestry is a prefix of b's: a is an ancestor of b.
            return true;
        }
        if i == pb.len() {
            // b is an ancestor of a: a can never dominate its own ancestor.
            return false;
        }
        self.nodes[pa[i].0].counter > self.nodes[pb[i].0].counter
    }

    /// Total order consistent with [`ClaimArena::dominates`]: `a.cmp(b) ==
    /// Greater` iff `a` dominates `b`.
    pub fn compare(&self, a: ClaimSymbol, b: ClaimSymbol) -> Ordering {
        if a == b {
            Ordering::Equal
        } else if self.dominates(a, b) {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    }
}

/// Error returned by a claim attempt that neither acquires nor waits — this
/// never happens in the current model (every attempt either preempts,
/// waits, or is granted) but is kept for forward compatibility with
/// resource kinds that reject reservation outright (e.g. read-only nodes).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ClaimError {
    /// The targeted node does not accept claims.
    #[error("node does not accept claims")]
    NotClaimable,
}

/// Outcome of [`ClaimRegistry::attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claim was granted immediately.
    Granted,
    /// The claim preempted a weaker active claim, which is now notified.
    Preempted,
    /// The claim is queued; it becomes active once released claims clear.
    Waiting,
}

/// Per-node claim bookkeeping: the active holder, if any, and a queue of
/// waiters ordered by dominance (highest priority first).
#[derive(Debug, Default)]
struct NodeClaims {
    active: Option<ClaimSymbol>,
    waiting: VecDeque<ClaimSymbol>,
}

/// Tracks, for every node identified by `K`, which claim symbol currently
/// holds it and which are waiting.
#[derive(Debug)]
pub struct ClaimRegistry<K> {
    arena: Mutex<ClaimArena>,
    nodes: Mutex<BTreeMap<K, NodeClaims>>,
}

impl<K: Ord + Clone> Default for ClaimRegistry<K> {
    fn default() -> Self {
        Self { arena: Mutex::new(ClaimArena::new()), nodes: Mutex::new(BTreeMap::new()) }
    }
}

impl<K: Ord + Clone> ClaimRegistry<K> {
    /// A fresh, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a root claim symbol.
    pub fn root_symbol(&self) -> ClaimSymbol {
        self.arena.lock().root()
    }

    /// Allocate a claim symbol as a child of `parent`.
    pub fn child_symbol(&self, parent: ClaimSymbol) -> ClaimSymbol {
        self.arena.lock().child_of(parent)
    }

    /// Attempt to claim `node` with `symbol`. Returns whether the claim was
    /// granted outright, preempted a weaker holder, or must wait.
    pub fn attempt(&self, node: K, symbol: ClaimSymbol) -> ClaimOutcome {
        let arena = self.arena.lock();
        let mut nodes = self.nodes.lock();
        let entry = nodes.entry(node).or_default();

        match entry.active {
            None => {
                entry.active = Some(symbol);
                ClaimOutcome::Granted
            }
            Some(active) if arena.dominates(symbol, active) => {
                entry.waiting.push_back(active);
                entry.active = Some(symbol);
                ClaimOutcome::Preempted
            }
            Some(_) => {
                let pos = entry
                    .waiting
                    .iter()
                    .position(|other| arena.compare(symbol, *other) == Ordering::Greater)
                    .unwrap_or(entry.waiting.len());
                entry.waiting.insert(pos, symbol);
                ClaimOutcome::Waiting
            }
        }
    }

    /// Release `symbol`'s claim on `node`. If `symbol` was the active
    /// holder, the highest-priority waiter (if any) becomes active and is
    /// returned.
    pub fn release(&self, node: &K, symbol: ClaimSymbol) -> Option<ClaimSymbol> {
        let mut nodes = self.nodes.lock();
        let entry = nodes.get_mut(node)?;

        if entry.active == Some(symbol) {
            entry.active = entry.waiting.pop_front();
            entry.active
        } else {
            entry.waiting.retain(|s| *s != symbol);
            None
        }
    }

    /// The currently active claim on `node`, if any.
    pub fn active(&self, node: &K) -> Option<ClaimSymbol> {
        self.nodes.lock().get(node).and_then(|entry| entry.active)
    }
}
