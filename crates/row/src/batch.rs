//! Row batches: the unit of output handed from scanners to the engine.

use crate::error::{ErrorKind, Result};
use crate::{TupleBlock, TupleView};
use std::sync::Arc;

/// Shared handle to one tuple of a committed block.
#[derive(Debug, Clone)]
pub struct TupleRef {
    block: Arc<TupleBlock>,
    index: usize,
}

impl TupleRef {
    /// `None` if `index` is past the end of `block`.
    pub fn new(block: Arc<TupleBlock>, index: usize) -> Option<Self> {
        (index < block.len()).then_some(Self { block, index })
    }

    pub fn view(&self) -> Option<TupleView<'_>> {
        self.block.get(self.index)
    }

    pub fn block(&self) -> &Arc<TupleBlock> {
        &self.block
    }
}

/// One output row: a fixed number of tuple positions, of which a scanner
/// fills exactly one.
#[derive(Debug, Clone)]
pub struct TupleRow {
    tuples: Box<[Option<TupleRef>]>,
}

impl TupleRow {
    pub fn new(width: usize) -> Self {
        Self { tuples: vec![None; width].into_boxed_slice() }
    }

    pub fn width(&self) -> usize {
        self.tuples.len()
    }

    pub fn set(&mut self, tuple_idx: usize, tuple: TupleRef) -> Result<()> {
        let width = self.width();
        match self.tuples.get_mut(tuple_idx) {
            Some(slot) => *slot = Some(tuple),
            None => exn::bail!(ErrorKind::TupleIndex { index: tuple_idx, width }),
        }
        Ok(())
    }

    pub fn tuple(&self, tuple_idx: usize) -> Option<TupleView<'_>> {
        self.tuples.get(tuple_idx)?.as_ref()?.view()
    }
}

/// A bounded batch of rows.
///
/// # Examples
///
/// ```
/// use tuplescan_row::RowBatch;
///
/// let batch = RowBatch::new(1024, 1);
/// assert_eq!(batch.remaining_capacity(), 1024);
/// assert!(!batch.is_full());
/// ```
#[derive(Debug)]
pub struct RowBatch {
    capacity: usize,
    row_width: usize,
    rows: Vec<TupleRow>,
}

impl RowBatch {
    pub fn new(capacity: usize, row_width: usize) -> Self {
        Self { capacity, row_width, rows: Vec::with_capacity(capacity) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn row_width(&self) -> usize {
        self.row_width
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.rows.len())
    }

    pub fn is_full(&self) -> bool {
        self.remaining_capacity() == 0
    }

    pub fn rows(&self) -> &[TupleRow] {
        &self.rows
    }

    pub fn add_row(&mut self, row: TupleRow) -> Result<()> {
        if self.is_full() {
            exn::bail!(ErrorKind::BatchFull);
        }
        if row.width() != self.row_width {
            exn::bail!(ErrorKind::TupleIndex { index: row.width(), width: self.row_width });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Add one row per tuple of `block`, each holding its tuple at
    /// `tuple_idx`. Adds nothing unless the whole block fits.
    pub fn add_block(&mut self, tuple_idx: usize, block: &Arc<TupleBlock>) -> Result<usize> {
        if block.len() > self.remaining_capacity() {
            exn::bail!(ErrorKind::BatchFull);
        }
        if tuple_idx >= self.row_width {
            exn::bail!(ErrorKind::TupleIndex { index: tuple_idx, width: self.row_width });
        }
        for index in 0..block.len() {
            let mut row = TupleRow::new(self.row_width);
            row.tuples[tuple_idx] = Some(TupleRef { block: Arc::clone(block), index });
            self.rows.push(row);
        }
        Ok(block.len())
    }

    /// Views of the tuple at `tuple_idx` in every row that has one.
    pub fn tuples(&self, tuple_idx: usize) -> impl Iterator<Item = TupleView<'_>> {
        self.rows.iter().filter_map(move |row| row.tuple(tuple_idx))
    }

    /// Empty the batch for reuse, releasing its block references.
    pub fn reset(&mut self) {
        self.rows.clear();
    }
}
