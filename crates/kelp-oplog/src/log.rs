//! The operation log: an in-memory DAG with head tracking and merge.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use kelp_store::ObjectStore;
use kelp_types::{LamportClock, ObjectId, ReplicaId};
use tracing::{debug, warn};

use crate::access::AccessController;
use crate::entry::Entry;
use crate::error::OplogError;

type Result<T> = std::result::Result<T, OplogError>;

/// Source of entries during a merge: resolves a hash to a verified-decodable
/// entry, typically out of the shared object store.
#[async_trait::async_trait]
pub trait EntryFetcher: Send + Sync {
    /// Fetch the entry stored under `id`.
    async fn fetch(&self, id: ObjectId) -> Result<Entry>;
}

/// Any content-addressed object store can resolve entries: the canonical
/// encoding of an entry hashes to the entry's own address.
#[async_trait::async_trait]
impl<S: ObjectStore + ?Sized> EntryFetcher for S {
    async fn fetch(&self, id: ObjectId) -> Result<Entry> {
        let bytes = self
            .get(id)
            .await?
            .ok_or(OplogError::MissingEntry(id))?;
        let entry = Entry::from_bytes(&bytes)?;

        if entry.hash != id {
            return Err(OplogError::Integrity(id));
        }

        Ok(entry)
    }
}

/// Options for a log traversal.
#[derive(Clone, Debug)]
pub struct TraverseOptions {
    /// Exclusive lower boundary (an entry hash).
    pub gt: Option<ObjectId>,
    /// Inclusive lower boundary.
    pub gte: Option<ObjectId>,
    /// Exclusive upper boundary.
    pub lt: Option<ObjectId>,
    /// Inclusive upper boundary.
    pub lte: Option<ObjectId>,
    /// Maximum number of entries; negative means unbounded.
    pub limit: i64,
    /// Flip the output order (newest first).
    pub reverse: bool,
}

impl Default for TraverseOptions {
    fn default() -> Self {
        Self {
            gt: None,
            gte: None,
            lt: None,
            lte: None,
            limit: -1,
            reverse: false,
        }
    }
}

/// Outcome of a merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeReport {
    /// Number of entries inserted.
    pub added: usize,
    /// The head set after the merge, sorted.
    pub heads: Vec<ObjectId>,
}

/// Append-only DAG of signed entries with a known head set.
///
/// Heads are maintained incrementally: every parent referenced by an
/// inserted entry is marked as having a child and evicted from the head
/// set; the entry itself becomes a head unless some previously inserted
/// entry already references it. Entries are never removed.
pub struct OpLog {
    /// The database address this log belongs to.
    id: String,
    /// All known entries, keyed by hash.
    entries: HashMap<ObjectId, Entry>,
    /// Entries with no known child.
    heads: BTreeSet<ObjectId>,
    /// Every hash referenced as a parent by some entry.
    has_child: HashSet<ObjectId>,
    /// Maximum observed logical time.
    max_time: u64,
}

impl OpLog {
    /// Create an empty log for the given database address.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: HashMap::new(),
            heads: BTreeSet::new(),
            has_child: HashSet::new(),
            max_time: 0,
        }
    }

    /// The database address this log belongs to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of entries in the log.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the log contains an entry.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.entries.contains_key(id)
    }

    /// Look up an entry by hash.
    pub fn get(&self, id: &ObjectId) -> Option<&Entry> {
        self.entries.get(id)
    }

    /// The current head set, sorted.
    pub fn heads(&self) -> Vec<ObjectId> {
        self.heads.iter().copied().collect()
    }

    /// Maximum observed logical time.
    pub fn max_time(&self) -> u64 {
        self.max_time
    }

    /// The clock a new local entry would carry: one past the newest head.
    pub fn next_clock(&self, identity: ReplicaId) -> LamportClock {
        let newest_head = self
            .heads
            .iter()
            .filter_map(|h| self.entries.get(h))
            .map(|e| e.clock.time)
            .max()
            .unwrap_or(0);
        LamportClock::new(identity, newest_head + 1)
    }

    /// Build a signed entry on top of the current heads.
    ///
    /// Does not insert it — the host store persists the entry to the
    /// object store first, then applies it with [`OpLog::append`].
    pub fn create_entry(&self, payload: Bytes, signing_key: &SigningKey) -> Entry {
        let identity = ReplicaId::from(signing_key.verifying_key());
        Entry::create(
            payload,
            self.heads(),
            self.next_clock(identity),
            signing_key,
        )
    }

    /// Apply a locally built entry.
    ///
    /// Fails (and inserts nothing) when the entry does not verify or its
    /// author is not permitted; local appends are all-or-nothing.
    pub fn append(&mut self, entry: Entry, access: &AccessController) -> Result<()> {
        if !entry.verify_hash() {
            return Err(OplogError::Integrity(entry.hash));
        }
        if !access.can_append(&entry) {
            return Err(OplogError::AccessDenied(entry.identity));
        }

        self.insert(entry);
        Ok(())
    }

    /// Insert an entry into the DAG, updating heads and the clock.
    ///
    /// Idempotent: returns `false` if the entry was already present.
    pub fn insert(&mut self, entry: Entry) -> bool {
        if self.entries.contains_key(&entry.hash) {
            return false;
        }

        for parent in &entry.parents {
            self.has_child.insert(*parent);
            self.heads.remove(parent);
        }

        if !self.has_child.contains(&entry.hash) {
            self.heads.insert(entry.hash);
        }

        self.max_time = self.max_time.max(entry.clock.time);
        self.entries.insert(entry.hash, entry);
        true
    }

    /// Merge the DAG rooted at `foreign_heads` into this log.
    ///
    /// Unknown ancestors are resolved through `fetcher`. Each candidate is
    /// verified (hash, signature, access list); offenders are dropped with
    /// a warning along with any descendant that can no longer be causally
    /// anchored, while independent verified branches are kept. A fetch
    /// failure aborts the merge — the log is untouched until the whole
    /// batch has been collected.
    ///
    /// Merging is commutative, associative, and idempotent.
    pub async fn merge<F>(
        &mut self,
        foreign_heads: &[ObjectId],
        fetcher: &F,
        access: &AccessController,
    ) -> Result<MergeReport>
    where
        F: EntryFetcher + ?Sized,
    {
        // Phase 1: walk backward from the foreign heads, fetching every
        // entry we don't already hold.
        let mut queue: VecDeque<ObjectId> = foreign_heads
            .iter()
            .copied()
            .filter(|h| !self.entries.contains_key(h))
            .collect();
        let mut fetched: HashMap<ObjectId, Entry> = HashMap::new();
        let mut rejected: HashSet<ObjectId> = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if self.entries.contains_key(&id) || fetched.contains_key(&id) || rejected.contains(&id)
            {
                continue;
            }

            let entry = fetcher.fetch(id).await?;

            // Traversal continues through a rejected entry: its ancestors
            // are candidates in their own right.
            for parent in &entry.parents {
                if !self.entries.contains_key(parent) {
                    queue.push_back(*parent);
                }
            }

            if entry.hash != id || !entry.verify_hash() {
                warn!(log = %self.id, hash = %id, "rejecting entry with invalid hash");
                rejected.insert(id);
                continue;
            }

            if !access.can_append(&entry) {
                warn!(
                    log = %self.id,
                    hash = %id,
                    identity = %entry.identity,
                    "rejecting entry denied by access controller"
                );
                rejected.insert(id);
                continue;
            }

            fetched.insert(id, entry);
        }

        if fetched.is_empty() {
            return Ok(MergeReport {
                added: 0,
                heads: self.heads(),
            });
        }

        // Phase 2: Kahn's topological sort so parents are inserted before
        // children. In-degree counts only parents inside the batch; a
        // simple reverse-BFS is wrong for diamond-shaped histories.
        let batch: HashSet<ObjectId> = fetched.keys().copied().collect();
        let mut in_degree: HashMap<ObjectId, usize> = HashMap::new();
        let mut children: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();

        for (hash, entry) in &fetched {
            let deg = entry
                .parents
                .iter()
                .filter(|p| batch.contains(*p))
                .count();
            in_degree.insert(*hash, deg);

            for parent in &entry.parents {
                if batch.contains(parent) {
                    children.entry(*parent).or_default().push(*hash);
                }
            }
        }

        let mut ready: VecDeque<ObjectId> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(h, _)| *h)
            .collect();

        let mut added = 0;

        while let Some(hash) = ready.pop_front() {
            if let Some(entry) = fetched.remove(&hash) {
                // A parent that is neither in the log nor in the batch was
                // rejected above; the entry cannot be causally anchored.
                if entry
                    .parents
                    .iter()
                    .any(|p| !self.entries.contains_key(p))
                {
                    warn!(log = %self.id, hash = %hash, "dropping entry with rejected ancestor");
                } else if self.insert(entry) {
                    added += 1;
                }
            }

            if let Some(kids) = children.get(&hash) {
                for kid in kids {
                    if let Some(deg) = in_degree.get_mut(kid) {
                        *deg -= 1;

                        if *deg == 0 {
                            ready.push_back(*kid);
                        }
                    }
                }
            }
        }

        debug!(log = %self.id, added, heads = self.heads.len(), "merged foreign heads");

        Ok(MergeReport {
            added,
            heads: self.heads(),
        })
    }

    /// Deterministic linearization of the log.
    ///
    /// Entries are ordered by `(clock.time, clock.id, hash)`, which is
    /// consistent with causal order because every entry's time exceeds its
    /// parents'. Two logs holding identical entry sets produce identical
    /// output for identical options.
    ///
    /// Boundaries name entry hashes; a boundary not present in the log is
    /// an error. A bounded traversal walks backward from the heads, so a
    /// non-negative `limit` keeps the newest entries of the window before
    /// the (oldest-first) output is assembled.
    pub fn traverse(&self, options: &TraverseOptions) -> Result<Vec<Entry>> {
        let mut ordered: Vec<&Entry> = self.entries.values().collect();
        ordered.sort_by_key(|e| e.sort_key());

        let position = |id: ObjectId| -> Result<usize> {
            ordered
                .iter()
                .position(|e| e.hash == id)
                .ok_or(OplogError::UnknownBoundary(id))
        };

        let mut start = 0usize;
        let mut end = ordered.len();

        if let Some(id) = options.gt {
            start = start.max(position(id)? + 1);
        }
        if let Some(id) = options.gte {
            start = start.max(position(id)?);
        }
        if let Some(id) = options.lt {
            end = end.min(position(id)?);
        }
        if let Some(id) = options.lte {
            end = end.min(position(id)? + 1);
        }

        let end = end.max(start);
        let mut result: Vec<Entry> = ordered[start..end].iter().map(|e| (*e).clone()).collect();

        if options.limit >= 0 {
            let keep = options.limit as usize;
            if result.len() > keep {
                result.drain(..result.len() - keep);
            }
        }

        if options.reverse {
            result.reverse();
        }

        Ok(result)
    }
}
