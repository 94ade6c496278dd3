//! Delimited text files.
//!
//! Each [`get_next`](Scanner::get_next) call works in two passes over the
//! current read window. The first pass finds complete tuples and records
//! where their materialized fields lie. The second writes those fields into
//! one tuple buffer. Bytes of a tuple that straddles the end of the window
//! are carried into the next read.
//!
//! A range owns every tuple that *starts* within it. A range that doesn't
//! begin at the start of its file first skips to just past the first
//! unescaped tuple delimiter, and the last tuple a range owns is read to its
//! end even if that lies beyond the range. An escape byte consumes the byte
//! after it, so whether a range's first byte is escaped depends on the run
//! of escape bytes just before the range, which is read before skipping.

mod convert;

use crate::error::{ErrorKind, Result};
use crate::field::FieldLocation;
use crate::scanner::{FileBoundary, Scanner, ScannerCore};
use crate::{RuntimeState, ScanNode};
use exn::ResultExt;
use memchr::{memchr, memchr2, memchr3};
use std::sync::Arc;
use tuplescan_config::{Delimiters, ScannerConfig};
use tuplescan_row::{RowBatch, SlotDescriptor, SlotType, TemplateTuple, TupleBuffer, TupleWriter, Value};
use tuplescan_storage::{BoxByteSource, ScanRange};

/// Scanner for text files of delimiter-separated fields, one tuple per
/// line (or per configured tuple delimiter).
///
/// Fields are matched to columns by position. Missing trailing fields are
/// null, extra fields are ignored. A field equal to the configured null
/// string is null, as is an empty field of any non-string type. Fields that
/// fail to convert are null and reported as parse errors.
/// Bytes read per step when looking back for escapes before a range.
const LOOK_BEHIND: usize = 64;

pub struct DelimitedTextScanner {
    core: ScannerCore,
    delimiters: Delimiters,
    null_string: Vec<u8>,
    read_block_size: usize,
    /// Slots filled from file content, in column order.
    file_slots: Vec<SlotDescriptor>,
    /// Indexed by column: whether the column is materialized.
    materialized: Vec<bool>,
    window: Arc<[u8]>,
    /// Next unconsumed byte of `window`.
    pos: usize,
    /// File offset of `window[0]`.
    window_offset: u64,
    /// Last offset at which an owned tuple may start.
    range_end: u64,
    eof: bool,
    skipping: bool,
    /// The next byte seen while skipping is escaped.
    skip_escaped: bool,
    done: bool,
    locations: Vec<FieldLocation>,
    /// Materialized fields recorded per tuple, in `locations` order.
    fields_per_tuple: Vec<usize>,
    scratch: Vec<u8>,
}

impl DelimitedTextScanner {
    pub fn new(node: Arc<ScanNode>, state: Arc<RuntimeState>, config: Arc<ScannerConfig>) -> Self {
        let delimiters = config.delimiters();
        let null_string = config.null_string.as_bytes().to_vec();
        let read_block_size = config.read_block_size;
        Self {
            core: ScannerCore::new(node, state, config),
            delimiters,
            null_string,
            read_block_size,
            file_slots: Vec::new(),
            materialized: Vec::new(),
            window: Arc::default(),
            pos: 0,
            window_offset: 0,
            range_end: 0,
            eof: false,
            skipping: false,
            skip_escaped: false,
            done: false,
            locations: Vec::new(),
            fields_per_tuple: Vec::new(),
            scratch: Vec::new(),
        }
    }

    fn resolve_slots(&mut self) -> Result<()> {
        self.core.config().validate().or_raise(|| ErrorKind::Initialization)?;
        let desc = Arc::clone(self.core.descriptor());
        let file_slots = desc.file_slots();
        if let Some(slot) = file_slots.iter().find(|s| s.ty == SlotType::Binary) {
            exn::bail!(ErrorKind::UnsupportedType { slot: slot.id, ty: slot.ty, format: "text" });
        }
        let columns = file_slots.iter().filter_map(|s| s.column()).max().map_or(0, |c| c + 1);
        self.materialized = vec![false; columns];
        for column in file_slots.iter().filter_map(|s| s.column()) {
            self.materialized[column] = true;
        }
        self.file_slots = file_slots.into_iter().cloned().collect();
        Ok(())
    }

    /// Read the next block, keeping the unconsumed tail of the window.
    fn refill(&mut self) -> Result<()> {
        if self.eof {
            self.done = true;
            return Ok(());
        }
        let carry = &self.window[self.pos..];
        let mut next = Vec::with_capacity(carry.len() + self.read_block_size);
        next.extend_from_slice(carry);
        let filled = next.len();
        next.resize(filled + self.read_block_size, 0);
        let n = self.core.source_mut()?.read(&mut next[filled..]).or_raise(|| ErrorKind::Io)?;
        next.truncate(filled + n);
        if n == 0 {
            self.eof = true;
        }
        self.window_offset += self.pos as u64;
        self.pos = 0;
        self.window = Arc::from(next);
        Ok(())
    }

    /// Whether the byte at `offset` is escaped, i.e. the run of escape bytes
    /// just before it has odd length. Leaves the source at `offset`.
    fn escaped_at(&mut self, offset: u64, escape: u8) -> Result<bool> {
        let source = self.core.source_mut()?;
        let mut chunk = [0; LOOK_BEHIND];
        let mut run = 0;
        let mut end = offset;
        while end > 0 {
            let start = end.saturating_sub(LOOK_BEHIND as u64);
            let len = (end - start) as usize;
            source.seek(start).or_raise(|| ErrorKind::Io)?;
            let n = source.read_full(&mut chunk[..len]).or_raise(|| ErrorKind::Io)?;
            let trailing = chunk[..n].iter().rev().take_while(|&&b| b == escape).count();
            run += trailing;
            if trailing < len {
                break;
            }
            end = start;
        }
        source.seek(offset).or_raise(|| ErrorKind::Io)?;
        Ok(run % 2 == 1)
    }

    /// Move `pos` to the start of the next tuple the range owns, skipping the
    /// partial tuple a mid-file range begins in. `false` means there is no
    /// such tuple in the window; `done` is set if there is none at all.
    fn next_tuple_start(&mut self, bytes: &[u8]) -> bool {
        if self.skipping {
            match find_tuple_end(bytes, self.pos, self.delimiters, &mut self.skip_escaped) {
                Some(end) => {
                    self.pos = end + 1;
                    self.skipping = false;
                },
                None => self.pos = bytes.len(),
            }
        }
        if self.pos == bytes.len() {
            self.done = self.eof;
            return false;
        }
        if self.window_offset + self.pos as u64 > self.range_end {
            self.done = true;
            return false;
        }
        true
    }

    /// First pass: find up to `max` complete tuples owned by the range and
    /// record their materialized fields. Returns how many were found.
    fn find_tuples(&mut self, max: usize) -> usize {
        self.locations.clear();
        self.fields_per_tuple.clear();
        let window = Arc::clone(&self.window);
        let bytes = &window[..];
        let mut found = 0;
        while found < max && !self.done {
            if !self.next_tuple_start(bytes) {
                break;
            }
            let mark = self.locations.len();
            match self.tokenize(bytes, self.pos) {
                Some((next, fields)) => {
                    self.fields_per_tuple.push(fields);
                    self.pos = next;
                    found += 1;
                },
                None => {
                    self.locations.truncate(mark);
                    break;
                },
            }
        }
        found
    }

    /// Like [`find_tuples`](Self::find_tuples) for scans that materialize no
    /// fields: tuples are only delimited and counted.
    fn count_tuples(&mut self, max: usize) -> usize {
        let window = Arc::clone(&self.window);
        let bytes = &window[..];
        let mut found = 0;
        while found < max && !self.done {
            if !self.next_tuple_start(bytes) {
                break;
            }
            let mut escaped = false;
            match find_tuple_end(bytes, self.pos, self.delimiters, &mut escaped) {
                Some(end) => self.pos = end + 1,
                None if self.eof => self.pos = bytes.len(),
                None => break,
            }
            found += 1;
        }
        found
    }

    /// Split the tuple starting at `start` into fields. Returns the position
    /// just past the tuple and the number of fields recorded, or `None` if
    /// the tuple does not end within `bytes` yet.
    fn tokenize(&mut self, bytes: &[u8], start: usize) -> Option<(usize, usize)> {
        let Delimiters { field, tuple, escape } = self.delimiters;
        let mut column = 0;
        let mut recorded = 0;
        let mut field_start = start;
        let mut needs_unescape = false;
        let mut i = start;
        loop {
            let hit = match escape {
                Some(escape) => memchr3(field, tuple, escape, &bytes[i..]),
                None => memchr2(field, tuple, &bytes[i..]),
            };
            let end = match hit {
                Some(offset) => i + offset,
                None if self.eof => bytes.len(),
                None => return None,
            };
            let delimiter = bytes.get(end).copied();
            if delimiter.is_some() && delimiter == escape {
                needs_unescape = true;
                i = (end + 2).min(bytes.len());
                continue;
            }
            if self.materialized.get(column).copied().unwrap_or(false) {
                self.locations.push(FieldLocation::new(field_start..end, needs_unescape));
                recorded += 1;
            }
            column += 1;
            match delimiter {
                Some(b) if b == field => {
                    field_start = end + 1;
                    needs_unescape = false;
                    i = end + 1;
                },
                Some(_) => return Some((end + 1, recorded)),
                None => return Some((bytes.len(), recorded)),
            }
        }
    }

    /// Second pass: write the tuples found by [`find_tuples`](Self::find_tuples).
    fn materialize(&mut self, buffer: &mut TupleBuffer) -> Result<()> {
        let window = Arc::clone(&self.window);
        let template = self.core.template().cloned();
        let writer = FieldWriter {
            null_string: &self.null_string,
            escape: self.delimiters.escape,
            window: &window,
            copy_strings: self.core.has_noncompact_strings(),
        };
        let mut next = 0;
        for &count in &self.fields_per_tuple {
            let fields = &self.locations[next..next + count];
            next += count;
            let mut tuple = buffer.begin_tuple().or_raise(|| ErrorKind::Tuple)?;
            tuple.init(template.as_deref()).or_raise(|| ErrorKind::Tuple)?;
            for (location, slot) in fields.iter().zip(&self.file_slots) {
                writer.write(&mut self.core, &mut self.scratch, &mut tuple, slot, *location)?;
            }
            if buffer.pending().is_some_and(|t| self.core.node().eval_conjuncts(&t)) {
                buffer.finish_tuple();
            }
            if self.core.parse_aborted() {
                break;
            }
        }
        Ok(())
    }

    fn next_materialized(&mut self, batch: &mut RowBatch) -> Result<()> {
        let mut buffer = self.core.allocate_tuple_buffer(batch);
        while !buffer.is_full() && !self.done && !self.core.parse_aborted() {
            if self.find_tuples(buffer.remaining()) == 0 {
                if !self.done {
                    self.refill()?;
                }
                continue;
            }
            self.materialize(&mut buffer)?;
        }
        self.core.commit(batch, buffer)?;
        Ok(())
    }

    /// Nothing is read from the file: count tuples and emit template copies.
    fn next_empty(&mut self, batch: &mut RowBatch) -> Result<()> {
        let capacity = batch.remaining_capacity();
        let mut count = 0;
        while count < capacity && !self.done {
            match self.count_tuples(capacity - count) {
                0 if !self.done => self.refill()?,
                found => count += found,
            }
        }
        self.core.write_empty_tuples(batch, count)?;
        Ok(())
    }
}

impl Scanner for DelimitedTextScanner {
    fn prepare(&mut self) -> Result<()> {
        self.core.prepare()?;
        if let Err(err) = self.resolve_slots() {
            self.core.fail();
            return Err(err);
        }
        tracing::debug!(file_slots = self.file_slots.len(), delimiters = ?self.delimiters, "prepared text scanner");
        Ok(())
    }

    fn init_current_scan_range(
        &mut self,
        range: ScanRange,
        template: Option<Arc<TemplateTuple>>,
        source: BoxByteSource,
        boundary: FileBoundary,
    ) -> Result<()> {
        let offset = range.offset;
        // Decoded files may be longer than their on-disk length.
        let range_end = if range.is_file_end() { u64::MAX } else { range.end() };
        self.window = Arc::default();
        self.pos = 0;
        self.done = true;
        self.core.init_range(range, template, source, boundary)?;
        self.skip_escaped = match self.delimiters.escape {
            Some(escape) if offset > 0 => match self.escaped_at(offset, escape) {
                Ok(escaped) => escaped,
                Err(err) => {
                    self.core.abandon_range();
                    return Err(err);
                },
            },
            _ => false,
        };
        self.window_offset = offset;
        self.range_end = range_end;
        self.eof = false;
        self.skipping = offset > 0;
        self.done = false;
        Ok(())
    }

    fn get_next(&mut self, batch: &mut RowBatch) -> Result<bool> {
        if !self.core.begin_get_next()? {
            return Ok(true);
        }
        let result = if self.file_slots.is_empty() { self.next_empty(batch) } else { self.next_materialized(batch) };
        if let Err(err) = result {
            self.done = true;
            self.core.abandon_range();
            return Err(err);
        }
        if let Some(message) = self.core.take_parse_status() {
            self.done = true;
            self.core.abandon_range();
            exn::bail!(ErrorKind::ParseAborted(message));
        }
        if self.done {
            self.core.set_exhausted();
        }
        tracing::debug!(rows = batch.len(), eos = self.done, "text batch");
        Ok(self.done)
    }

    fn close(&mut self) {
        self.core.close();
        self.window = Arc::default();
        self.locations = Vec::new();
        self.fields_per_tuple = Vec::new();
        self.done = true;
    }

    fn core(&self) -> &ScannerCore {
        &self.core
    }
}

/// Position of the first unescaped tuple delimiter at or after `from`.
///
/// An escape byte consumes the byte after it, including another escape.
/// `escaped` says whether `bytes[from]` is consumed that way and is left set
/// when `bytes` ends with an escape, so a search can resume in the next
/// window.
fn find_tuple_end(bytes: &[u8], from: usize, delimiters: Delimiters, escaped: &mut bool) -> Option<usize> {
    let mut i = from;
    loop {
        if *escaped {
            if i >= bytes.len() {
                return None;
            }
            *escaped = false;
            i += 1;
        }
        let rest = &bytes[i..];
        let at = i + match delimiters.escape {
            Some(escape) => memchr2(delimiters.tuple, escape, rest),
            None => memchr(delimiters.tuple, rest),
        }?;
        if bytes[at] == delimiters.tuple {
            return Some(at);
        }
        *escaped = true;
        i = at + 1;
    }
}

/// Writes one located field into a tuple slot.
struct FieldWriter<'a> {
    null_string: &'a [u8],
    escape: Option<u8>,
    window: &'a Arc<[u8]>,
    copy_strings: bool,
}

impl FieldWriter<'_> {
    fn write(
        &self,
        core: &mut ScannerCore,
        scratch: &mut Vec<u8>,
        tuple: &mut TupleWriter<'_>,
        slot: &SlotDescriptor,
        location: FieldLocation,
    ) -> Result<()> {
        let raw = location.raw(self.window);
        if raw == self.null_string {
            return Ok(());
        }
        if slot.ty == SlotType::String {
            if location.needs_unescape() || self.copy_strings {
                let value = location.value(self.window, self.escape, scratch);
                tuple.set_value(slot.id, Value::String(value)).or_raise(|| ErrorKind::Tuple)?;
            } else {
                tuple.set_heap_ref(slot.id, self.window, location.start, location.len()).or_raise(|| ErrorKind::Tuple)?;
            }
            return Ok(());
        }
        let value = location.value(self.window, self.escape, scratch);
        if value.is_empty() {
            return Ok(());
        }
        match convert::parse_fixed(slot.ty, value) {
            Some(value) => tuple.set_value(slot.id, value).or_raise(|| ErrorKind::Tuple)?,
            None => core.report_column_parse_error(slot, raw),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Lifecycle;
    use rstest::rstest;
    use tuplescan_row::{TupleDescriptor, TuplePool};
    use tuplescan_storage::{Codec, DecompressingByteSource, MockByteSource};

    fn config() -> ScannerConfig {
        ScannerConfig { field_delimiter: ',', escape_char: Some('\\'), read_block_size: 8, ..ScannerConfig::default() }
    }

    fn scanner(node: ScanNode, state: RuntimeState, config: ScannerConfig) -> DelimitedTextScanner {
        let mut scanner = DelimitedTextScanner::new(Arc::new(node), Arc::new(state), Arc::new(config));
        scanner.prepare().unwrap();
        scanner
    }

    fn int_and_string() -> Arc<TupleDescriptor> {
        Arc::new(TupleDescriptor::builder().column(0, SlotType::Int).column(1, SlotType::String).build().unwrap())
    }

    fn files(files: &[(&str, &[u8])]) -> MockByteSource {
        MockByteSource::with_files(files.iter().map(|(path, data)| (path.to_string(), data.to_vec())))
    }

    fn scan(
        scanner: &mut DelimitedTextScanner,
        source: &MockByteSource,
        range: ScanRange,
        template: Option<Arc<TemplateTuple>>,
        boundary: FileBoundary,
        batch_size: usize,
    ) -> Result<Vec<RowBatch>> {
        scanner.init_current_scan_range(range, template, Box::new(source.clone()), boundary)?;
        let mut batches = Vec::new();
        loop {
            let mut batch = scanner.core().node().new_row_batch(batch_size);
            let eos = scanner.get_next(&mut batch)?;
            batches.push(batch);
            if eos {
                return Ok(batches);
            }
        }
    }

    fn render(value: Option<Value<'_>>) -> Option<String> {
        match value? {
            Value::String(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Value::Int(n) => Some(n.to_string()),
            Value::BigInt(n) => Some(n.to_string()),
            other => Some(format!("{other:?}")),
        }
    }

    fn column(batches: &[RowBatch], slot: usize) -> Vec<Option<String>> {
        batches.iter().flat_map(|b| b.tuples(0)).map(|t| render(t.get(slot))).collect()
    }

    fn strings(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn malformed_fields_are_null_and_reported() {
        let data: String = (1..=10).map(|i| if i == 5 { "x5,name5\n".to_string() } else { format!("{i},name{i}\n") }).collect();
        let source = files(&[("t/a.txt", data.as_bytes())]);
        let desc = int_and_string();
        let slot = desc.slots().iter().find(|s| s.column() == Some(0)).unwrap().id;
        let mut scanner = scanner(ScanNode::new(desc), RuntimeState::default(), config());
        let range = ScanRange::whole_file("t/a.txt", data.len() as u64);
        let batches = scan(&mut scanner, &source, range, None, FileBoundary::NewFile, 64).unwrap();

        let ints = column(&batches, slot);
        assert_eq!(ints.len(), 10);
        assert_eq!(ints[4], None);
        assert_eq!(ints[5].as_deref(), Some("6"));
        assert_eq!(scanner.num_errors_in_file(), 1);
        assert_eq!(scanner.core().state().error_log(), ["Error converting column: 0 TO INT (Data is: x5)"]);
        assert_eq!(scanner.core().node().num_rows_returned(), 10);
        assert_eq!(scanner.lifecycle(), Lifecycle::RangeExhausted);
    }

    #[test]
    fn partition_keys_come_from_the_template() {
        let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::Int).partition_key(SlotType::String).build().unwrap());
        let key = desc.partition_key_slots().next().unwrap().id;
        let template = Arc::new(TemplateTuple::builder(&desc).set(key, Value::from("2024-06")).unwrap().build());
        let source = files(&[("t/a.txt", b"1\n2\n3\n")]);
        let mut scanner = scanner(ScanNode::new(desc), RuntimeState::default(), config());
        let range = ScanRange::whole_file("t/a.txt", 6);
        let batches = scan(&mut scanner, &source, range, Some(template), FileBoundary::NewFile, 2).unwrap();
        assert_eq!(column(&batches, key), strings(&[Some("2024-06"); 3]));
    }

    #[test]
    fn partition_key_only_scans_allocate_once() {
        let desc = Arc::new(TupleDescriptor::builder().partition_key(SlotType::Int).build().unwrap());
        let template = Arc::new(TemplateTuple::builder(&desc).set(0, Value::Int(7)).unwrap().build());
        let data: String = (0..10).map(|i| format!("{i},ignored\n")).collect();
        let source = files(&[("t/a.txt", data.as_bytes())]);
        let mut scanner = scanner(ScanNode::new(Arc::clone(&desc)), RuntimeState::default(), config());
        let range = ScanRange::whole_file("t/a.txt", data.len() as u64);
        scanner.init_current_scan_range(range, Some(template), Box::new(source), FileBoundary::NewFile).unwrap();

        let mut batch = scanner.core().node().new_row_batch(32);
        assert!(scanner.get_next(&mut batch).unwrap());
        assert_eq!(batch.len(), 10);
        assert!(batch.tuples(0).all(|t| t.get(0) == Some(Value::Int(7))));
        let stats = scanner.core().node().pool().stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.tuple_bytes, (32 * desc.byte_size()) as u64);
    }

    #[test]
    fn every_call_allocates_for_the_remaining_capacity() {
        let desc = int_and_string();
        let data: String = (0..10).map(|i| format!("{i},v\n")).collect();
        let source = files(&[("t/a.txt", data.as_bytes())]);
        let mut scanner = scanner(ScanNode::new(Arc::clone(&desc)), RuntimeState::default(), config());
        let range = ScanRange::whole_file("t/a.txt", data.len() as u64);
        scanner.init_current_scan_range(range, None, Box::new(source), FileBoundary::NewFile).unwrap();

        let mut calls = 0;
        let mut rows = 0;
        loop {
            let mut batch = scanner.core().node().new_row_batch(3);
            let eos = scanner.get_next(&mut batch).unwrap();
            calls += 1;
            rows += batch.len();
            if !eos {
                assert!(batch.is_full());
            }
            let stats = scanner.core().node().pool().stats();
            assert_eq!(stats.allocations, calls);
            assert_eq!(stats.tuple_bytes, calls * 3 * desc.byte_size() as u64);
            if eos {
                break;
            }
        }
        assert_eq!(rows, 10);
    }

    #[test]
    fn error_counts_follow_files_not_ranges() {
        let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::Int).build().unwrap());
        let source = files(&[("t/a.txt", b"1\nx\n3\ny\n"), ("t/b.txt", b"5\n")]);
        let mut scanner = scanner(ScanNode::new(desc), RuntimeState::default(), config());

        let first = scan(&mut scanner, &source, ScanRange::new("t/a.txt", 0, 4, 8), None, FileBoundary::NewFile, 8).unwrap();
        assert_eq!(column(&first, 0), strings(&[Some("1"), None, Some("3")]));
        assert_eq!(scanner.num_errors_in_file(), 1);

        let second = scan(&mut scanner, &source, ScanRange::new("t/a.txt", 4, 4, 8), None, FileBoundary::SameFile, 8).unwrap();
        assert_eq!(column(&second, 0), strings(&[None]));
        assert_eq!(scanner.num_errors_in_file(), 2);

        scan(&mut scanner, &source, ScanRange::whole_file("t/b.txt", 2), None, FileBoundary::NewFile, 8).unwrap();
        assert_eq!(scanner.num_errors_in_file(), 0);
        assert_eq!(scanner.core().state().num_parse_errors(), 2);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(5)]
    #[case(7)]
    #[case(13)]
    #[case(1024)]
    fn split_ranges_yield_every_row_once(#[case] target_len: u64) {
        let mut data: String = (0..12).map(|i| format!("r{i},{}\n", "v".repeat(i % 4))).collect();
        data.push_str("last,row");
        let source = files(&[("t/a.txt", data.as_bytes())]);
        let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::String).build().unwrap());
        let mut scanner = scanner(ScanNode::new(desc), RuntimeState::default(), config());

        let mut seen = Vec::new();
        let mut previous: Option<ScanRange> = None;
        for range in ScanRange::split("t/a.txt", data.len() as u64, target_len) {
            let boundary = FileBoundary::between(previous.as_ref(), &range);
            previous = Some(range.clone());
            let batches = scan(&mut scanner, &source, range, None, boundary, 4).unwrap();
            seen.extend(column(&batches, 0).into_iter().flatten());
        }
        let mut expected: Vec<String> = (0..12).map(|i| format!("r{i}")).collect();
        expected.push("last".to_string());
        assert_eq!(seen, expected);
    }

    /// Scan `path` as two ranges split at `at`.
    fn scan_split_at(scanner: &mut DelimitedTextScanner, source: &MockByteSource, path: &str, len: u64, at: u64) -> Vec<RowBatch> {
        let mut batches = scan(scanner, source, ScanRange::new(path, 0, at, len), None, FileBoundary::NewFile, 4).unwrap();
        let second = ScanRange::new(path, at, len - at, len);
        batches.extend(scan(scanner, source, second, None, FileBoundary::SameFile, 4).unwrap());
        batches
    }

    #[rstest]
    #[case(b"a,x\\\\\nb,y\nc,z\n", &["a", "b", "c"])]
    #[case(b"a\\\nb,1\nc,2\n", &["a\nb", "c"])]
    #[case(b"\\\\\\\nq\n\\\\\nr", &["\\\nq", "\\", "r"])]
    fn splits_inside_escape_runs_yield_every_row_once(#[case] data: &[u8], #[case] expected: &[&str]) {
        let source = files(&[("t/a.txt", data)]);
        let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::String).build().unwrap());
        let mut scanner = scanner(ScanNode::new(desc), RuntimeState::default(), config());
        let len = data.len() as u64;
        let expected: Vec<_> = expected.iter().map(|v| Some(v.to_string())).collect();
        for at in 1..len {
            let batches = scan_split_at(&mut scanner, &source, "t/a.txt", len, at);
            assert_eq!(column(&batches, 0), expected, "split at {at}");
        }
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    #[case(6)]
    #[case(9)]
    #[case(1024)]
    fn escaped_rows_survive_any_split(#[case] target_len: u64) {
        let row = |i: usize| match i % 3 {
            0 => format!("k{i},a\\\\\n"),
            1 => format!("k{i},x\\\ny\n"),
            _ => format!("k{i},\\\\\\\nz\n"),
        };
        let data: String = (0..12).map(row).collect();
        let source = files(&[("t/a.txt", data.as_bytes())]);
        let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::String).column(1, SlotType::String).build().unwrap());
        let key = desc.slots().iter().find(|s| s.column() == Some(0)).unwrap().id;
        let value = desc.slots().iter().find(|s| s.column() == Some(1)).unwrap().id;
        let mut scanner = scanner(ScanNode::new(desc), RuntimeState::default(), config());

        let (mut keys, mut values) = (Vec::new(), Vec::new());
        let mut previous: Option<ScanRange> = None;
        for range in ScanRange::split("t/a.txt", data.len() as u64, target_len) {
            let boundary = FileBoundary::between(previous.as_ref(), &range);
            previous = Some(range.clone());
            let batches = scan(&mut scanner, &source, range, None, boundary, 4).unwrap();
            keys.extend(column(&batches, key).into_iter().flatten());
            values.extend(column(&batches, value).into_iter().flatten());
        }
        let expected_keys: Vec<String> = (0..12).map(|i| format!("k{i}")).collect();
        let expected_values: Vec<String> =
            (0..12).map(|i| ["a\\", "x\ny", "\\\nz"][i % 3].to_string()).collect();
        assert_eq!(keys, expected_keys);
        assert_eq!(values, expected_values);
    }

    #[test]
    fn partition_key_only_scans_count_rows_across_splits() {
        let desc = Arc::new(TupleDescriptor::builder().partition_key(SlotType::Int).build().unwrap());
        let template = Arc::new(TemplateTuple::builder(&desc).set(0, Value::Int(1)).unwrap().build());
        let data = b"a\\\nb,1\nc\\,d\n\\\\\ne";
        let source = files(&[("t/a.txt", data)]);
        let mut scanner = scanner(ScanNode::new(desc), RuntimeState::default(), config());
        let len = data.len() as u64;
        for at in 1..len {
            let mut rows = 0;
            for (range, boundary) in [
                (ScanRange::new("t/a.txt", 0, at, len), FileBoundary::NewFile),
                (ScanRange::new("t/a.txt", at, len - at, len), FileBoundary::SameFile),
            ] {
                let batches = scan(&mut scanner, &source, range, Some(Arc::clone(&template)), boundary, 3).unwrap();
                rows += batches.iter().map(RowBatch::len).sum::<usize>();
            }
            assert_eq!(rows, 4, "split at {at}");
            assert!(scanner.locations.is_empty() && scanner.fields_per_tuple.is_empty());
        }
    }

    #[test]
    fn escaped_delimiters_stay_in_the_field() {
        let data = b"a\\,b,1\nline\\\ntwo,2\n";
        let source = files(&[("t/a.txt", data)]);
        let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::String).column(1, SlotType::Int).build().unwrap());
        let text = desc.slots().iter().find(|s| s.column() == Some(0)).unwrap().id;
        let int = desc.slots().iter().find(|s| s.column() == Some(1)).unwrap().id;
        let mut scanner = scanner(ScanNode::new(desc), RuntimeState::default(), config());
        let range = ScanRange::whole_file("t/a.txt", data.len() as u64);
        let batches = scan(&mut scanner, &source, range, None, FileBoundary::NewFile, 8).unwrap();
        assert_eq!(column(&batches, text), strings(&[Some("a,b"), Some("line\ntwo")]));
        assert_eq!(column(&batches, int), strings(&[Some("1"), Some("2")]));
    }

    #[test]
    fn null_markers_and_ragged_rows() {
        let data = b"\\N,1\nonly\na,2,extra,fields\nb,\n,3\n";
        let source = files(&[("t/a.txt", data)]);
        let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::String).column(1, SlotType::Int).build().unwrap());
        let text = desc.slots().iter().find(|s| s.column() == Some(0)).unwrap().id;
        let int = desc.slots().iter().find(|s| s.column() == Some(1)).unwrap().id;
        let config = ScannerConfig { escape_char: None, ..config() };
        let mut scanner = scanner(ScanNode::new(desc), RuntimeState::default(), config);
        let range = ScanRange::whole_file("t/a.txt", data.len() as u64);
        let batches = scan(&mut scanner, &source, range, None, FileBoundary::NewFile, 8).unwrap();
        assert_eq!(column(&batches, text), strings(&[None, Some("only"), Some("a"), Some("b"), Some("")]));
        assert_eq!(column(&batches, int), strings(&[Some("1"), None, Some("2"), None, Some("3")]));
        assert_eq!(scanner.core().state().num_parse_errors(), 0);
    }

    #[test]
    fn skipped_columns_are_not_materialized() {
        let data = b"1,a,x\n2,b,y\n";
        let source = files(&[("t/a.txt", data)]);
        let desc = Arc::new(
            TupleDescriptor::builder()
                .unmaterialized_column(0, SlotType::Int)
                .column(2, SlotType::String)
                .build()
                .unwrap(),
        );
        let slot = desc.slots().iter().find(|s| s.column() == Some(2)).unwrap().id;
        let skipped = desc.slots().iter().find(|s| s.column() == Some(0)).unwrap().id;
        let mut scanner = scanner(ScanNode::new(desc), RuntimeState::default(), config());
        let range = ScanRange::whole_file("t/a.txt", data.len() as u64);
        let batches = scan(&mut scanner, &source, range, None, FileBoundary::NewFile, 8).unwrap();
        assert_eq!(column(&batches, slot), strings(&[Some("x"), Some("y")]));
        assert_eq!(column(&batches, skipped), strings(&[None, None]));
    }

    #[rstest]
    #[case(true, 0)]
    #[case(false, 5)]
    fn strings_reference_read_buffers_unless_copying(#[case] compact_strings: bool, #[case] copied: u64) {
        let data = b"1,abc\n2,de\n";
        let source = files(&[("t/a.txt", data)]);
        let pool = Arc::new(TuplePool::new());
        let node = ScanNode::new(int_and_string()).with_pool(Arc::clone(&pool));
        let config = ScannerConfig { compact_strings, read_block_size: 64, ..config() };
        let mut scanner = scanner(node, RuntimeState::default(), config);
        assert_eq!(scanner.core().has_noncompact_strings(), !compact_strings);
        let range = ScanRange::whole_file("t/a.txt", data.len() as u64);
        let batches = scan(&mut scanner, &source, range, None, FileBoundary::NewFile, 8).unwrap();
        assert_eq!(batches.iter().map(RowBatch::len).sum::<usize>(), 2);
        assert_eq!(pool.stats().string_bytes, copied);
    }

    #[test]
    fn compressed_files_are_decoded() {
        let data: String = (0..50).map(|i| format!("{i},row{i}\n")).collect();
        let compressed = Codec::Gzip.compress(data.as_bytes()).unwrap();
        let mock = files(&[("t/a.txt.gz", &compressed)]);
        let desc = int_and_string();
        let int = desc.slots().iter().find(|s| s.column() == Some(0)).unwrap().id;
        let mut scanner = scanner(ScanNode::new(desc), RuntimeState::default(), config());

        let range = ScanRange::whole_file("t/a.txt.gz", compressed.len() as u64).with_codec(Codec::Gzip);
        let source = Box::new(DecompressingByteSource::new(mock.clone()));
        scanner.init_current_scan_range(range, None, source, FileBoundary::NewFile).unwrap();
        let mut ints = Vec::new();
        loop {
            let mut batch = scanner.core().node().new_row_batch(16);
            let eos = scanner.get_next(&mut batch).unwrap();
            ints.extend(column(std::slice::from_ref(&batch), int));
            if eos {
                break;
            }
        }
        let expected: Vec<_> = (0..50).map(|i| Some(i.to_string())).collect();
        assert_eq!(ints, expected);

        let mid = ScanRange::new("t/a.txt.gz", 4, 4, compressed.len() as u64);
        let source = Box::new(DecompressingByteSource::new(mock));
        let err = scanner.init_current_scan_range(mid, None, source, FileBoundary::SameFile).unwrap_err();
        assert_eq!(*err, ErrorKind::Io);
    }

    #[test]
    fn read_failures_abandon_the_range() {
        let data: String = (0..20).map(|i| format!("{i},v\n")).collect();
        let source = files(&[("t/a.txt", data.as_bytes())]).failing_at("t/a.txt", 20);
        let mut scanner = scanner(ScanNode::new(int_and_string()), RuntimeState::default(), config());
        let range = ScanRange::whole_file("t/a.txt", data.len() as u64);
        let err = scan(&mut scanner, &source, range, None, FileBoundary::NewFile, 64).unwrap_err();
        assert_eq!(*err, ErrorKind::Io);
        assert!(err.is_retryable());
        assert_eq!(scanner.lifecycle(), Lifecycle::RangeExhausted);
        let mut batch = scanner.core().node().new_row_batch(4);
        assert!(scanner.get_next(&mut batch).unwrap());
        assert!(batch.is_empty());
    }

    #[test]
    fn abort_on_error_fails_the_call() {
        let data = b"1\n2\nx\n4\n";
        let source = files(&[("t/a.txt", data)]);
        let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::Int).build().unwrap());
        let mut scanner = scanner(ScanNode::new(desc), RuntimeState::new(10, true), config());
        let range = ScanRange::whole_file("t/a.txt", data.len() as u64);
        scanner.init_current_scan_range(range, None, Box::new(source), FileBoundary::NewFile).unwrap();

        let mut batch = scanner.core().node().new_row_batch(16);
        let err = scanner.get_next(&mut batch).unwrap_err();
        assert_eq!(*err, ErrorKind::ParseAborted("Error converting column: 0 TO INT (Data is: x)".to_string()));
        assert_eq!(column(std::slice::from_ref(&batch), 0), strings(&[Some("1"), Some("2"), None]));
        assert_eq!(scanner.lifecycle(), Lifecycle::RangeExhausted);
    }

    #[test]
    fn conjuncts_drop_rows_before_counting() {
        let data: String = (1..=6).map(|i| format!("{i}\n")).collect();
        let source = files(&[("t/a.txt", data.as_bytes())]);
        let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::Int).build().unwrap());
        let node = ScanNode::new(desc).with_predicate(|t| matches!(t.get(0), Some(Value::Int(n)) if n % 2 == 0));
        let mut scanner = scanner(node, RuntimeState::default(), config());
        let range = ScanRange::whole_file("t/a.txt", data.len() as u64);
        let batches = scan(&mut scanner, &source, range, None, FileBoundary::NewFile, 8).unwrap();
        assert_eq!(column(&batches, 0), strings(&[Some("2"), Some("4"), Some("6")]));
        assert_eq!(scanner.core().node().num_rows_returned(), 3);
    }

    #[test]
    fn empty_files_end_immediately() {
        let source = files(&[("t/a.txt", b"")]);
        let mut scanner = scanner(ScanNode::new(int_and_string()), RuntimeState::default(), config());
        let batches = scan(&mut scanner, &source, ScanRange::whole_file("t/a.txt", 0), None, FileBoundary::NewFile, 8).unwrap();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_empty());
    }

    #[test]
    fn binary_columns_cannot_be_scanned() {
        let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::Binary).build().unwrap());
        let mut scanner = DelimitedTextScanner::new(
            Arc::new(ScanNode::new(desc)),
            Arc::new(RuntimeState::default()),
            Arc::new(config()),
        );
        let err = scanner.prepare().unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedType { ty: SlotType::Binary, format: "text", .. }));
        assert_eq!(scanner.lifecycle(), Lifecycle::Terminated);
    }

    #[test]
    fn invalid_configs_fail_preparation() {
        let config = ScannerConfig { field_delimiter: '\n', ..ScannerConfig::default() };
        let mut scanner = DelimitedTextScanner::new(
            Arc::new(ScanNode::new(int_and_string())),
            Arc::new(RuntimeState::default()),
            Arc::new(config),
        );
        assert_eq!(*scanner.prepare().unwrap_err(), ErrorKind::Initialization);
        assert_eq!(scanner.lifecycle(), Lifecycle::Terminated);
    }

    #[test]
    fn calls_out_of_order_are_rejected() {
        let source = files(&[("t/a.txt", b"1,a\n")]);
        let mut scanner = DelimitedTextScanner::new(
            Arc::new(ScanNode::new(int_and_string())),
            Arc::new(RuntimeState::default()),
            Arc::new(config()),
        );
        let mut batch = scanner.core().node().new_row_batch(4);
        assert!(matches!(&*scanner.get_next(&mut batch).unwrap_err(), ErrorKind::Lifecycle { .. }));
        scanner.prepare().unwrap();
        assert!(scanner.get_next(&mut batch).is_err());
        let range = ScanRange::whole_file("t/a.txt", 4);
        scanner.init_current_scan_range(range.clone(), None, Box::new(source.clone()), FileBoundary::NewFile).unwrap();
        assert!(scanner.get_next(&mut batch).unwrap());
        assert_eq!(batch.len(), 1);
        scanner.close();
        assert!(scanner.get_next(&mut batch).is_err());
        assert!(scanner.init_current_scan_range(range, None, Box::new(source), FileBoundary::NewFile).is_err());
    }

    #[test]
    fn scanners_share_a_node_across_threads() {
        let desc = int_and_string();
        let node = Arc::new(ScanNode::new(desc));
        let state = Arc::new(RuntimeState::default());
        let paths: Vec<String> = (0..4).map(|n| format!("t/part-{n}.txt")).collect();
        let contents: Vec<String> = (0..4).map(|n| (0..25).map(|i| format!("{},f{n}\n", n * 100 + i)).collect()).collect();
        let source = MockByteSource::with_files(paths.iter().cloned().zip(contents.iter().cloned()));

        let handles: Vec<_> = paths
            .into_iter()
            .zip(contents.iter().map(|c| c.len() as u64))
            .map(|(path, len)| {
                let (node, state, source) = (Arc::clone(&node), Arc::clone(&state), source.clone());
                std::thread::spawn(move || {
                    let mut scanner = DelimitedTextScanner::new(node, state, Arc::new(config()));
                    scanner.prepare().unwrap();
                    let batches =
                        scan(&mut scanner, &source, ScanRange::whole_file(path, len), None, FileBoundary::NewFile, 10).unwrap();
                    batches.iter().map(RowBatch::len).sum::<usize>()
                })
            })
            .collect();
        let rows: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(rows, 100);
        assert_eq!(node.num_rows_returned(), 100);
    }
}
