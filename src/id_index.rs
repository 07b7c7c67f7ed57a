//! Identifier Index - wide-fanout B+ tree mapping external order ids to
//! compact internal ids.
//!
//! Insertion happens once per accepted order and uses plain scalar scans.
//! Lookup happens on every modify, cancel and acknowledgement, so the leaf
//! scan (the dominant cost at realistic fanouts) compares four keys per step
//! with AVX2 when the CPU has it, and falls back to a four-lane loop the
//! compiler can vectorize otherwise.
//!
//! Every node lives in a [`Slab`] injected at construction; the tree stores
//! only [`SlabIndex`] handles.

use std::fmt;

use tracing::debug;

use crate::slab::{Slab, SlabIndex};

/// Default number of slots per node.
pub const DEFAULT_FANOUT: usize = 64;

/// Keys compared per vector step (4 x 64-bit lanes = 256 bits).
const LANES: usize = 4;

/// A tree node: leaf (key → value pairs) or internal (separators + children).
///
/// Slots at or beyond `len` may hold stale data left behind by a split.
pub enum Node<const M: usize> {
    Leaf(Leaf<M>),
    Internal(Internal<M>),
}

/// Sorted (external id, internal id) pairs. Holds up to `M` pairs.
pub struct Leaf<const M: usize> {
    keys: [u64; M],
    values: [u32; M],
    len: usize,
}

/// Sorted separators. Holds up to `M - 1` keys and `M` children.
pub struct Internal<const M: usize> {
    keys: [u64; M],
    children: [SlabIndex; M],
    len: usize,
}

/// Slab type the index allocates its nodes from.
pub type NodePool<const M: usize> = Slab<Node<M>>;

enum LeafInsert<const M: usize> {
    Replaced,
    Inserted,
    Split(Leaf<M>),
}

enum InternalInsert<const M: usize> {
    Inserted,
    Split(u64, Internal<M>),
}

impl<const M: usize> Leaf<M> {
    fn empty() -> Self {
        Self {
            keys: [0; M],
            values: [0; M],
            len: 0,
        }
    }

    /// First slot whose key is >= `key`.
    #[inline]
    fn lower_bound(&self, key: u64) -> usize {
        let mut i = 0;
        while i < self.len && self.keys[i] < key {
            i += 1;
        }
        i
    }

    /// Exact-match slot, searched four keys at a time.
    #[inline]
    fn position(&self, key: u64) -> Option<usize> {
        // Rounded up to whole vectors; reading stale slots past `len` is fine
        // because any hit there is rejected by the bound check.
        let limit = self.len.div_ceil(LANES) * LANES;
        scan_equal(&self.keys[..limit], self.len, key)
    }

    fn insert_at(&mut self, pos: usize, key: u64, value: u32) {
        debug_assert!(self.len < M);
        self.keys.copy_within(pos..self.len, pos + 1);
        self.values.copy_within(pos..self.len, pos + 1);
        self.keys[pos] = key;
        self.values[pos] = value;
        self.len += 1;
    }

    fn insert(&mut self, key: u64, value: u32) -> LeafInsert<M> {
        let pos = self.lower_bound(key);
        if pos < self.len && self.keys[pos] == key {
            self.values[pos] = value;
            return LeafInsert::Replaced;
        }

        if self.len < M {
            self.insert_at(pos, key, value);
            return LeafInsert::Inserted;
        }

        // Full: move the upper half to a new right sibling, then insert
        // into whichever half owns the key.
        let mid = M / 2;
        let moving = self.len - mid;
        let mut right = Leaf::empty();
        right.keys[..moving].copy_from_slice(&self.keys[mid..self.len]);
        right.values[..moving].copy_from_slice(&self.values[mid..self.len]);
        right.len = moving;
        self.len = mid;

        if key < right.keys[0] {
            self.insert_at(pos, key, value);
        } else {
            right.insert_at(pos - mid, key, value);
        }
        LeafInsert::Split(right)
    }
}

impl<const M: usize> Internal<M> {
    fn empty() -> Self {
        Self {
            keys: [0; M],
            children: [SlabIndex::default(); M],
            len: 0,
        }
    }

    /// Child slot to descend into for `key`.
    #[inline]
    fn child_slot(&self, key: u64) -> usize {
        let mut i = 0;
        while i < self.len && key >= self.keys[i] {
            i += 1;
        }
        i
    }

    /// Insert `separator` at key slot `slot` with `child` to its right.
    fn insert_at(&mut self, slot: usize, separator: u64, child: SlabIndex) {
        debug_assert!(self.len < M - 1);
        self.keys.copy_within(slot..self.len, slot + 1);
        self.children.copy_within(slot + 1..self.len + 1, slot + 2);
        self.keys[slot] = separator;
        self.children[slot + 1] = child;
        self.len += 1;
    }

    fn insert(&mut self, slot: usize, separator: u64, child: SlabIndex) -> InternalInsert<M> {
        if self.len < M - 1 {
            self.insert_at(slot, separator, child);
            return InternalInsert::Inserted;
        }

        // Full: the middle key moves up, everything right of it moves to a
        // new sibling.
        let mid = (M - 1) / 2;
        let median = self.keys[mid];
        let moving = self.len - mid - 1;
        let mut right = Internal::empty();
        right.keys[..moving].copy_from_slice(&self.keys[mid + 1..self.len]);
        right.children[..=moving].copy_from_slice(&self.children[mid + 1..=self.len]);
        right.len = moving;
        self.len = mid;

        if slot <= mid {
            self.insert_at(slot, separator, child);
        } else {
            right.insert_at(slot - mid - 1, separator, child);
        }
        InternalInsert::Split(median, right)
    }
}

/// Ordered map from external order id (u64) to internal id (u32).
///
/// Not thread-safe; owned by the gateway stage.
pub struct IdIndex<const M: usize = DEFAULT_FANOUT> {
    pool: NodePool<M>,
    root: SlabIndex,
    len: usize,
    height: usize,
}

impl<const M: usize> IdIndex<M> {
    const FANOUT_CHECK: () = assert!(
        M >= LANES && M % LANES == 0,
        "fanout must be a non-zero multiple of 4"
    );

    /// Build an empty index whose nodes come from `pool`.
    ///
    /// The pool should be dedicated to this index.
    pub fn new(mut pool: NodePool<M>) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::FANOUT_CHECK;

        let root = pool.allocate(Node::Leaf(Leaf::empty()));
        Self {
            pool,
            root,
            len: 0,
            height: 1,
        }
    }

    /// Build an empty index with a fresh pool of `nodes` slots.
    pub fn with_node_capacity(nodes: u32) -> Self {
        Self::new(Slab::new(nodes))
    }

    /// Look up the internal id stored for `key`.
    #[inline]
    pub fn find(&self, key: u64) -> Option<u32> {
        let mut current = self.root;
        loop {
            match self.pool.get(current) {
                Node::Internal(node) => current = node.children[node.child_slot(key)],
                Node::Leaf(leaf) => return leaf.position(key).map(|i| leaf.values[i]),
            }
        }
    }

    /// Insert `key → value`, overwriting any existing mapping for `key`.
    pub fn insert(&mut self, key: u64, value: u32) {
        if let Some((separator, sibling)) = self.insert_into(self.root, key, value) {
            let mut root = Internal::empty();
            root.keys[0] = separator;
            root.children[0] = self.root;
            root.children[1] = sibling;
            root.len = 1;
            self.root = self.pool.allocate(Node::Internal(root));
            self.height += 1;
            debug!(height = self.height, nodes = self.pool.len(), "id index root split");
        }
    }

    /// Recursive insert; returns the separator and new right sibling if
    /// `node` split.
    fn insert_into(&mut self, node: SlabIndex, key: u64, value: u32) -> Option<(u64, SlabIndex)> {
        let (slot, child) = match self.pool.get_mut(node) {
            Node::Leaf(leaf) => {
                return match leaf.insert(key, value) {
                    LeafInsert::Replaced => None,
                    LeafInsert::Inserted => {
                        self.len += 1;
                        None
                    }
                    LeafInsert::Split(right) => {
                        self.len += 1;
                        let separator = right.keys[0];
                        Some((separator, self.pool.allocate(Node::Leaf(right))))
                    }
                };
            }
            Node::Internal(internal) => {
                let slot = internal.child_slot(key);
                (slot, internal.children[slot])
            }
        };

        let (separator, sibling) = self.insert_into(child, key, value)?;

        let Node::Internal(internal) = self.pool.get_mut(node) else {
            unreachable!("node {node:?} changed kind during insert");
        };
        match internal.insert(slot, separator, sibling) {
            InternalInsert::Inserted => None,
            InternalInsert::Split(median, right) => {
                Some((median, self.pool.allocate(Node::Internal(right))))
            }
        }
    }

    /// Drop every mapping, recycling all nodes back into the pool.
    pub fn clear(&mut self) {
        let mut pending = vec![self.root];
        while let Some(index) = pending.pop() {
            if let Node::Internal(internal) = self.pool.get(index) {
                pending.extend_from_slice(&internal.children[..=internal.len]);
            }
            self.pool.deallocate(index);
        }

        self.root = self.pool.allocate(Node::Leaf(Leaf::empty()));
        self.len = 0;
        self.height = 1;
    }

    /// Number of distinct keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no keys are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Levels from root to leaf (1 for a lone leaf).
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Nodes currently allocated from the pool.
    #[inline]
    pub fn node_count(&self) -> u32 {
        self.pool.len()
    }

    /// Pre-fault the node pool.
    pub fn warm_up(&mut self) {
        self.pool.warm_up();
    }
}

impl<const M: usize> fmt::Debug for IdIndex<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdIndex")
            .field("fanout", &M)
            .field("len", &self.len)
            .field("height", &self.height)
            .field("pool", &self.pool)
            .finish()
    }
}

/// First slot in `keys[..len]` equal to `key`. `keys.len()` must be a
/// multiple of [`LANES`].
#[inline]
fn scan_equal(keys: &[u64], len: usize, key: u64) -> Option<usize> {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 support was just checked.
            return unsafe { scan_equal_avx2(keys, len, key) };
        }
    }
    scan_equal_lanes(keys, len, key)
}

/// Portable four-lane compare; builds the same bit mask the AVX2 path gets
/// from `movemask`.
#[inline]
fn scan_equal_lanes(keys: &[u64], len: usize, key: u64) -> Option<usize> {
    for (block, chunk) in keys.chunks_exact(LANES).enumerate() {
        let mut mask = 0u32;
        for (lane, &candidate) in chunk.iter().enumerate() {
            mask |= ((candidate == key) as u32) << lane;
        }
        if mask != 0 {
            let found = block * LANES + mask.trailing_zeros() as usize;
            return (found < len).then_some(found);
        }
    }
    None
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn scan_equal_avx2(keys: &[u64], len: usize, key: u64) -> Option<usize> {
    use std::arch::x86_64::{
        __m256i, _mm256_castsi256_pd, _mm256_cmpeq_epi64, _mm256_loadu_si256,
        _mm256_movemask_pd, _mm256_set1_epi64x,
    };

    let target = _mm256_set1_epi64x(key as i64);
    for (block, chunk) in keys.chunks_exact(LANES).enumerate() {
        let lanes = _mm256_loadu_si256(chunk.as_ptr().cast::<__m256i>());
        let equal = _mm256_cmpeq_epi64(lanes, target);
        let mask = _mm256_movemask_pd(_mm256_castsi256_pd(equal)) as u32;
        if mask != 0 {
            let found = block * LANES + mask.trailing_zeros() as usize;
            return (found < len).then_some(found);
        }
    }
    None
}
