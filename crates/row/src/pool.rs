//! Tuple storage: buffers a scanner writes into, the blocks they become once
//! committed, and the pool that hands out and retains both.

use crate::error::{ErrorKind, Result};
use crate::{TemplateTuple, TupleDescriptor, TupleView, TupleWriter};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::{Arc, Mutex, PoisonError};

/// Storage for up to `capacity` tuples, exclusively owned by the scanner
/// that allocated it.
///
/// The tuple region is one contiguous, zero-filled allocation. Tuples are
/// addressed by index; variable-length data lives either in the buffer's own
/// heap (copied) or in attached, reference-counted heaps (referenced in
/// place).
pub struct TupleBuffer {
    desc: Arc<TupleDescriptor>,
    data: Vec<u8>,
    capacity: usize,
    len: usize,
    owned: Vec<u8>,
    attached: Vec<Arc<[u8]>>,
}

impl TupleBuffer {
    fn new(desc: &Arc<TupleDescriptor>, capacity: usize) -> Self {
        Self {
            desc: Arc::clone(desc),
            data: vec![0; capacity.saturating_mul(desc.byte_size())],
            capacity,
            len: 0,
            owned: Vec::new(),
            attached: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        &self.desc
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Finished tuples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.len
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Size of the tuple region in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Start writing the next tuple.
    ///
    /// The tuple only counts once [`finish_tuple`](Self::finish_tuple) is
    /// called; beginning again without finishing reuses the same storage,
    /// which is how rejected rows are discarded.
    pub fn begin_tuple(&mut self) -> Result<TupleWriter<'_>> {
        if self.is_full() {
            exn::bail!(ErrorKind::BufferFull);
        }
        let size = self.desc.byte_size();
        let start = self.len * size;
        Ok(TupleWriter::new(&self.desc, &mut self.data[start..start + size], &mut self.owned, &mut self.attached))
    }

    pub fn finish_tuple(&mut self) {
        if self.len < self.capacity {
            self.len += 1;
        }
    }

    /// The tuple currently being written (after `begin_tuple`, before
    /// `finish_tuple`).
    pub fn pending(&self) -> Option<TupleView<'_>> {
        self.view(self.len)
    }

    pub fn view(&self, index: usize) -> Option<TupleView<'_>> {
        let size = self.desc.byte_size();
        let bytes = self.data.get(index * size..(index + 1) * size)?;
        (index < self.capacity).then(|| TupleView::new(&self.desc, bytes, &self.owned, &self.attached))
    }

    /// Append up to `count` copies of `template` (or all-null tuples),
    /// returning how many fit.
    pub fn push_copies(&mut self, template: Option<&TemplateTuple>, count: usize) -> Result<usize> {
        let count = count.min(self.remaining());
        for _ in 0..count {
            self.begin_tuple()?.init(template)?;
            self.finish_tuple();
        }
        Ok(count)
    }
}

impl Debug for TupleBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TupleBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len)
            .field("bytes", &self.data.len())
            .field("heaps", &(self.attached.len() + 1))
            .finish()
    }
}

/// A committed, immutable run of tuples, shared by the pool and every row
/// batch referencing it.
pub struct TupleBlock {
    desc: Arc<TupleDescriptor>,
    data: Box<[u8]>,
    len: usize,
    owned: Box<[u8]>,
    attached: Vec<Arc<[u8]>>,
}

impl TupleBlock {
    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        &self.desc
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<TupleView<'_>> {
        if index >= self.len {
            return None;
        }
        let size = self.desc.byte_size();
        let bytes = self.data.get(index * size..(index + 1) * size)?;
        Some(TupleView::new(&self.desc, bytes, &self.owned, &self.attached))
    }

    pub fn iter(&self) -> impl Iterator<Item = TupleView<'_>> {
        (0..self.len).filter_map(|index| self.get(index))
    }

    /// Bytes of variable-length data copied into this block.
    pub fn owned_heap_bytes(&self) -> usize {
        self.owned.len()
    }

    /// Number of external buffers this block keeps alive.
    pub fn attached_heaps(&self) -> usize {
        self.attached.len()
    }
}

impl Debug for TupleBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TupleBlock")
            .field("len", &self.len)
            .field("bytes", &self.data.len())
            .field("owned_heap", &self.owned.len())
            .field("attached_heaps", &self.attached.len())
            .finish()
    }
}

/// Allocation counters of a [`TuplePool`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Calls to [`TuplePool::allocate`].
    pub allocations: u64,
    /// Bytes of tuple storage handed out.
    pub tuple_bytes: u64,
    /// Bytes of string data copied into committed blocks.
    pub string_bytes: u64,
    /// Blocks committed.
    pub blocks: u64,
}

#[derive(Debug, Default)]
struct PoolState {
    stats: PoolStats,
    blocks: Vec<Arc<TupleBlock>>,
}

/// Shared arena for tuple storage, owned by the scan node and outliving
/// every scanner that allocates from it.
///
/// Safe to use from many scanner threads at once.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tuplescan_row::{SlotType, TupleDescriptor, TuplePool, Value};
///
/// let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::Int).build().unwrap());
/// let pool = TuplePool::new();
/// let mut buffer = pool.allocate(&desc, 4);
/// let mut tuple = buffer.begin_tuple().unwrap();
/// tuple.init(None).unwrap();
/// tuple.set_value(0, Value::Int(7)).unwrap();
/// buffer.finish_tuple();
/// let block = pool.commit(buffer);
/// assert_eq!(block.get(0).unwrap().get(0), Some(Value::Int(7)));
/// assert_eq!(pool.stats().tuple_bytes, 4 * desc.byte_size() as u64);
/// ```
#[derive(Debug, Default)]
pub struct TuplePool {
    state: Mutex<PoolState>,
}

impl TuplePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// One allocation with room for `tuples` tuples of `desc`'s layout.
    pub fn allocate(&self, desc: &Arc<TupleDescriptor>, tuples: usize) -> TupleBuffer {
        let buffer = TupleBuffer::new(desc, tuples);
        let mut state = self.lock();
        state.stats.allocations += 1;
        state.stats.tuple_bytes += buffer.byte_len() as u64;
        buffer
    }

    /// Freeze a buffer into a shared block. The pool retains the block until
    /// it is [`released`](Self::release).
    pub fn commit(&self, buffer: TupleBuffer) -> Arc<TupleBlock> {
        let block = Arc::new(TupleBlock {
            desc: buffer.desc,
            data: buffer.data.into_boxed_slice(),
            len: buffer.len,
            owned: buffer.owned.into_boxed_slice(),
            attached: buffer.attached,
        });
        tracing::trace!(tuples = block.len, owned_heap = block.owned.len(), attached = block.attached.len(), "committed tuple block");
        let mut state = self.lock();
        state.stats.blocks += 1;
        state.stats.string_bytes += block.owned.len() as u64;
        state.blocks.push(Arc::clone(&block));
        block
    }

    pub fn stats(&self) -> PoolStats {
        self.lock().stats
    }

    /// Number of blocks currently retained.
    pub fn retained_blocks(&self) -> usize {
        self.lock().blocks.len()
    }

    /// Drop the pool's references to committed blocks. Row batches still
    /// holding a block keep it alive.
    pub fn release(&self) {
        self.lock().blocks.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        // Counters stay consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
