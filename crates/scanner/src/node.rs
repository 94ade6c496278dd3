//! The scan node: what every scanner it creates has in common.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tuplescan_row::{RowBatch, TupleDescriptor, TuplePool, TupleView};

/// A predicate evaluated against each materialized tuple. Tuples it rejects
/// are neither emitted nor counted.
pub trait Conjunct: Send + Sync {
    fn eval(&self, tuple: &TupleView<'_>) -> bool;
}

impl<F> Conjunct for F
where
    F: Fn(&TupleView<'_>) -> bool + Send + Sync,
{
    fn eval(&self, tuple: &TupleView<'_>) -> bool {
        self(tuple)
    }
}

/// Parent of a set of scanners.
///
/// Owns the tuple layout, the shared [`TuplePool`], row accounting, the
/// optional row limit and the cancellation flag. Shared between scanner
/// threads behind an [`Arc`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tuplescan_row::{SlotType, TupleDescriptor};
/// use tuplescan_scanner::ScanNode;
///
/// let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::Int).build().unwrap());
/// let node = ScanNode::new(desc).with_limit(2);
/// node.incr_num_rows_returned();
/// assert!(!node.should_stop());
/// node.incr_num_rows_returned();
/// assert!(node.should_stop());
/// ```
pub struct ScanNode {
    desc: Arc<TupleDescriptor>,
    tuple_idx: usize,
    row_width: usize,
    pool: Arc<TuplePool>,
    rows_returned: AtomicU64,
    limit: Option<u64>,
    cancelled: AtomicBool,
    conjuncts: Vec<Box<dyn Conjunct>>,
}

impl ScanNode {
    /// A node producing single-tuple rows of `desc`, with its own pool.
    pub fn new(desc: Arc<TupleDescriptor>) -> Self {
        Self {
            desc,
            tuple_idx: 0,
            row_width: 1,
            pool: Arc::new(TuplePool::new()),
            rows_returned: AtomicU64::new(0),
            limit: None,
            cancelled: AtomicBool::new(false),
            conjuncts: Vec::new(),
        }
    }

    /// Write tuples at `tuple_idx` of rows that are `row_width` tuples wide.
    pub fn with_row_layout(mut self, tuple_idx: usize, row_width: usize) -> Self {
        self.tuple_idx = tuple_idx;
        self.row_width = row_width;
        self
    }

    pub fn with_pool(mut self, pool: Arc<TuplePool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_conjunct(mut self, conjunct: impl Conjunct + 'static) -> Self {
        self.conjuncts.push(Box::new(conjunct));
        self
    }

    /// Add a closure as a conjunct.
    pub fn with_predicate<F>(self, predicate: F) -> Self
    where
        F: Fn(&TupleView<'_>) -> bool + Send + Sync + 'static,
    {
        self.with_conjunct(predicate)
    }

    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        &self.desc
    }

    pub fn tuple_idx(&self) -> usize {
        self.tuple_idx
    }

    pub fn row_width(&self) -> usize {
        self.row_width
    }

    pub fn pool(&self) -> &Arc<TuplePool> {
        &self.pool
    }

    /// An empty batch shaped for this node's rows.
    pub fn new_row_batch(&self, capacity: usize) -> RowBatch {
        RowBatch::new(capacity, self.row_width)
    }

    /// Account for one emitted row, returning the new total.
    pub fn incr_num_rows_returned(&self) -> u64 {
        self.rows_returned.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn num_rows_returned(&self) -> u64 {
        self.rows_returned.load(Ordering::Relaxed)
    }

    pub fn reached_limit(&self) -> bool {
        self.limit.is_some_and(|limit| self.num_rows_returned() >= limit)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Whether callers should stop asking scanners for more rows. Checked
    /// between batches and between ranges, never mid-batch.
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.reached_limit()
    }

    pub fn has_conjuncts(&self) -> bool {
        !self.conjuncts.is_empty()
    }

    /// Whether every conjunct accepts `tuple`.
    pub fn eval_conjuncts(&self, tuple: &TupleView<'_>) -> bool {
        self.conjuncts.iter().all(|c| c.eval(tuple))
    }
}

impl Debug for ScanNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ScanNode")
            .field("tuple_idx", &self.tuple_idx)
            .field("row_width", &self.row_width)
            .field("rows_returned", &self.num_rows_returned())
            .field("limit", &self.limit)
            .field("cancelled", &self.is_cancelled())
            .field("conjuncts", &self.conjuncts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuplescan_row::{SlotType, TemplateTuple, Value};

    fn descriptor() -> Arc<TupleDescriptor> {
        Arc::new(TupleDescriptor::builder().partition_key(SlotType::Int).build().unwrap())
    }

    #[test]
    fn conjuncts_must_all_pass() {
        let desc = descriptor();
        let node = ScanNode::new(Arc::clone(&desc))
            .with_predicate(|t| !t.is_null(0))
            .with_predicate(|t| t.get(0) != Some(Value::Int(3)));
        let tuple = |n| TemplateTuple::builder(&desc).set(0, Value::Int(n)).unwrap().build();
        assert!(node.eval_conjuncts(&tuple(1).view()));
        assert!(!node.eval_conjuncts(&tuple(3).view()));
        assert!(!node.eval_conjuncts(&TemplateTuple::builder(&desc).build().view()));
    }

    #[test]
    fn cancellation_stops_without_limit() {
        let node = ScanNode::new(descriptor());
        assert!(!node.should_stop());
        node.cancel();
        assert!(node.should_stop());
        assert!(!node.reached_limit());
    }

    #[test]
    fn row_accounting_is_shared_between_threads() {
        let node = Arc::new(ScanNode::new(descriptor()).with_limit(1000));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let node = Arc::clone(&node);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        node.incr_num_rows_returned();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(node.num_rows_returned(), 1000);
        assert!(node.reached_limit());
    }

    #[test]
    fn row_batches_follow_row_layout() {
        let node = ScanNode::new(descriptor()).with_row_layout(1, 3);
        let batch = node.new_row_batch(8);
        assert_eq!((batch.capacity(), batch.row_width()), (8, 3));
        assert_eq!(node.tuple_idx(), 1);
    }
}
