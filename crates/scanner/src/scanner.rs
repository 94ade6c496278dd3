//! The scanner contract and the state every format-specific scanner shares.

use crate::error::{ErrorKind, Result};
use crate::{RuntimeState, ScanNode};
use derive_more::Display;
use exn::ResultExt;
use std::sync::Arc;
use tracing::instrument;
use tuplescan_config::ScannerConfig;
use tuplescan_row::{RowBatch, SlotDescriptor, TemplateTuple, TupleBuffer, TupleDescriptor};
use tuplescan_storage::{BoxByteSource, ScanRange};

/// Whether a range continues the file of the range before it.
///
/// Per-file state (the parse error counter) is reset only on
/// [`NewFile`](Self::NewFile).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileBoundary {
    NewFile,
    SameFile,
}

impl FileBoundary {
    /// Boundary for `next` when `previous` was the last range scanned by the
    /// same scanner.
    pub fn between(previous: Option<&ScanRange>, next: &ScanRange) -> Self {
        match previous {
            Some(previous) if previous.same_file(next) => Self::SameFile,
            _ => Self::NewFile,
        }
    }
}

/// Where a scanner is in its lifecycle.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    #[display("uninitialized")]
    Uninitialized,
    #[display("prepared")]
    Prepared,
    #[display("scanning a range")]
    RangeActive,
    #[display("at the end of a range")]
    RangeExhausted,
    #[display("terminated")]
    Terminated,
}

/// Converts byte ranges of one file format into tuples.
///
/// A scanner is created once per scan node thread and reused for many
/// ranges:
///
/// 1. [`prepare`](Self::prepare) once,
/// 2. [`init_current_scan_range`](Self::init_current_scan_range) per range,
/// 3. [`get_next`](Self::get_next) until it returns `true`,
/// 4. back to 2 for the next range, or [`close`](Self::close).
///
/// Scanners are not reentrant; drive each from a single thread.
pub trait Scanner: Send {
    /// One-time setup of everything constant across ranges. A failure here
    /// makes the instance unusable.
    fn prepare(&mut self) -> Result<()>;

    /// Release the previous range and position `source` at the start of
    /// `range`. `template` holds the file's partition-key values, if any.
    fn init_current_scan_range(
        &mut self,
        range: ScanRange,
        template: Option<Arc<TemplateTuple>>,
        source: BoxByteSource,
        boundary: FileBoundary,
    ) -> Result<()>;

    /// Append as many tuples as fit in `batch`'s remaining capacity or the
    /// range holds, whichever is fewer. Returns `true` once the range is
    /// exhausted, in which case the batch may be anything but full.
    fn get_next(&mut self, batch: &mut RowBatch) -> Result<bool>;

    /// Release the byte source. Every later call fails.
    fn close(&mut self);

    fn core(&self) -> &ScannerCore;

    fn lifecycle(&self) -> Lifecycle {
        self.core().lifecycle()
    }

    /// Parse errors reported since the current file's first range.
    fn num_errors_in_file(&self) -> u64 {
        self.core().num_errors_in_file()
    }
}

/// State and helpers shared by all scanner implementations.
///
/// Format scanners embed a core and delegate the lifecycle bookkeeping,
/// tuple buffer allocation, row publication and error accounting to it.
pub struct ScannerCore {
    node: Arc<ScanNode>,
    state: Arc<RuntimeState>,
    config: Arc<ScannerConfig>,
    tuple_byte_size: usize,
    tuple_idx: usize,
    lifecycle: Lifecycle,
    source: Option<BoxByteSource>,
    range: Option<ScanRange>,
    template: Option<Arc<TemplateTuple>>,
    num_errors_in_file: u64,
    has_noncompact_strings: bool,
    parse_status: Option<String>,
}

impl ScannerCore {
    pub fn new(node: Arc<ScanNode>, state: Arc<RuntimeState>, config: Arc<ScannerConfig>) -> Self {
        let tuple_byte_size = node.descriptor().byte_size();
        let tuple_idx = node.tuple_idx();
        Self {
            node,
            state,
            config,
            tuple_byte_size,
            tuple_idx,
            lifecycle: Lifecycle::Uninitialized,
            source: None,
            range: None,
            template: None,
            num_errors_in_file: 0,
            has_noncompact_strings: false,
            parse_status: None,
        }
    }

    pub fn prepare(&mut self) -> Result<()> {
        self.require("prepare", &[Lifecycle::Uninitialized])?;
        self.has_noncompact_strings = self.descriptor().has_var_len_file_slots() && !self.config.compact_strings;
        self.lifecycle = Lifecycle::Prepared;
        tracing::debug!(
            tuple_byte_size = self.tuple_byte_size,
            has_noncompact_strings = self.has_noncompact_strings,
            "prepared scanner"
        );
        Ok(())
    }

    /// Mark the instance unusable after a failed [`prepare`](Self::prepare).
    pub fn fail(&mut self) {
        self.lifecycle = Lifecycle::Terminated;
    }

    #[instrument(skip_all, fields(path = %range.path.display(), offset = range.offset, len = range.len, ?boundary))]
    pub fn init_range(
        &mut self,
        range: ScanRange,
        template: Option<Arc<TemplateTuple>>,
        mut source: BoxByteSource,
        boundary: FileBoundary,
    ) -> Result<()> {
        self.require("initialize a range on", &[Lifecycle::Prepared, Lifecycle::RangeActive, Lifecycle::RangeExhausted])?;
        self.release_range();
        self.lifecycle = Lifecycle::Prepared;
        if let Some(template) = &template
            && **template.descriptor() != **self.descriptor()
        {
            exn::bail!(ErrorKind::TemplateMismatch);
        }
        if boundary == FileBoundary::NewFile {
            self.num_errors_in_file = 0;
        }
        source.position_at(&range).or_raise(|| ErrorKind::Io)?;
        self.source = Some(source);
        self.range = Some(range);
        self.template = template;
        self.lifecycle = Lifecycle::RangeActive;
        Ok(())
    }

    /// Check that `get_next` may run. `Ok(false)` means the range is
    /// already exhausted and there is nothing to do.
    pub fn begin_get_next(&self) -> Result<bool> {
        self.require("read from", &[Lifecycle::RangeActive, Lifecycle::RangeExhausted])?;
        Ok(self.lifecycle == Lifecycle::RangeActive)
    }

    pub fn set_exhausted(&mut self) {
        if self.lifecycle == Lifecycle::RangeActive {
            self.lifecycle = Lifecycle::RangeExhausted;
        }
    }

    /// Abandon the current range after an unrecoverable error.
    pub fn abandon_range(&mut self) {
        self.release_range();
        self.set_exhausted();
    }

    pub fn close(&mut self) {
        self.release_range();
        self.lifecycle = Lifecycle::Terminated;
    }

    fn release_range(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        self.range = None;
        self.template = None;
        self.parse_status = None;
    }

    fn require(&self, operation: &'static str, allowed: &[Lifecycle]) -> Result<()> {
        if !allowed.contains(&self.lifecycle) {
            exn::bail!(ErrorKind::Lifecycle { operation, state: self.lifecycle });
        }
        Ok(())
    }

    /// One allocation with room for every tuple `batch` can still take.
    pub fn allocate_tuple_buffer(&self, batch: &RowBatch) -> TupleBuffer {
        self.node.pool().allocate(self.descriptor(), batch.remaining_capacity())
    }

    /// Add `count` tuples holding nothing but the template (all-null without
    /// one), for scans that materialize nothing from file content.
    ///
    /// Returns how many were added: `count` capped at the batch's remaining
    /// capacity, or zero if the conjuncts reject the template.
    pub fn write_empty_tuples(&mut self, batch: &mut RowBatch, count: usize) -> Result<usize> {
        let count = count.min(batch.remaining_capacity());
        if count == 0 {
            return Ok(0);
        }
        let mut buffer = self.allocate_tuple_buffer(batch);
        let template = self.template.as_deref();
        buffer.begin_tuple().or_raise(|| ErrorKind::Tuple)?.init(template).or_raise(|| ErrorKind::Tuple)?;
        if let Some(tuple) = buffer.pending()
            && !self.node.eval_conjuncts(&tuple)
        {
            return Ok(0);
        }
        buffer.finish_tuple();
        buffer.push_copies(template, count - 1).or_raise(|| ErrorKind::Tuple)?;
        self.commit(batch, buffer)
    }

    /// Publish the finished tuples of `buffer` into `batch`, counting each
    /// as a returned row.
    pub fn commit(&mut self, batch: &mut RowBatch, buffer: TupleBuffer) -> Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }
        let block = self.node.pool().commit(buffer);
        let added = batch.add_block(self.tuple_idx, &block).or_raise(|| ErrorKind::Tuple)?;
        for _ in 0..added {
            self.node.incr_num_rows_returned();
        }
        Ok(added)
    }

    /// Record that `data` could not be converted for `slot`. The slot is left
    /// null by the caller and the scan continues, unless the runtime state
    /// asks to abort, in which case [`take_parse_status`](Self::take_parse_status)
    /// returns the failure.
    pub fn report_column_parse_error(&mut self, slot: &SlotDescriptor, data: &[u8]) {
        self.num_errors_in_file += 1;
        let column = slot.column().unwrap_or(slot.id);
        let message =
            format!("Error converting column: {column} TO {} (Data is: {})", slot.ty, String::from_utf8_lossy(data));
        if self.state.log_has_space() {
            let path = self.range.as_ref().map(|r| r.path.display().to_string()).unwrap_or_default();
            tracing::warn!(%path, errors_in_file = self.num_errors_in_file, "{message}");
        }
        if self.state.abort_on_error() && self.parse_status.is_none() {
            self.parse_status = Some(message.clone());
        }
        self.state.log_error(message);
    }

    pub fn parse_aborted(&self) -> bool {
        self.parse_status.is_some()
    }

    pub fn take_parse_status(&mut self) -> Option<String> {
        self.parse_status.take()
    }

    pub fn source_mut(&mut self) -> Result<&mut BoxByteSource> {
        match self.source.as_mut() {
            Some(source) => Ok(source),
            None => exn::bail!(ErrorKind::Lifecycle { operation: "read from", state: self.lifecycle }),
        }
    }

    pub fn node(&self) -> &Arc<ScanNode> {
        &self.node
    }

    pub fn state(&self) -> &Arc<RuntimeState> {
        &self.state
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        self.node.descriptor()
    }

    pub fn range(&self) -> Option<&ScanRange> {
        self.range.as_ref()
    }

    pub fn template(&self) -> Option<&Arc<TemplateTuple>> {
        self.template.as_ref()
    }

    pub fn tuple_byte_size(&self) -> usize {
        self.tuple_byte_size
    }

    pub fn tuple_idx(&self) -> usize {
        self.tuple_idx
    }

    pub fn has_noncompact_strings(&self) -> bool {
        self.has_noncompact_strings
    }

    pub fn num_errors_in_file(&self) -> u64 {
        self.num_errors_in_file
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }
}
