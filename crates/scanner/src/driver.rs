//! Running one scanner over a sequence of ranges.
//!
//! This is what a scan node thread does with its scanner: prepare it once,
//! then feed it ranges in order, deriving file boundaries from consecutive
//! ranges and stopping between batches once the node has enough rows or
//! has been cancelled.

use crate::error::Result;
use crate::scanner::{FileBoundary, Lifecycle, Scanner};
use std::sync::Arc;
use tracing::instrument;
use tuplescan_row::{RowBatch, TemplateTuple};
use tuplescan_storage::{BoxByteSource, ScanRange};

/// A range to scan and the partition-key values of its file.
#[derive(Debug, Clone)]
pub struct RangeInput {
    pub range: ScanRange,
    pub template: Option<Arc<TemplateTuple>>,
}

impl RangeInput {
    pub fn new(range: ScanRange) -> Self {
        Self { range, template: None }
    }

    pub fn with_template(mut self, template: Arc<TemplateTuple>) -> Self {
        self.template = Some(template);
        self
    }
}

impl From<ScanRange> for RangeInput {
    fn from(range: ScanRange) -> Self {
        Self::new(range)
    }
}

/// What [`scan_ranges`] did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Ranges initialized.
    pub ranges: usize,
    /// Non-empty batches handed to the sink.
    pub batches: usize,
    pub rows: usize,
    /// The node's limit or cancellation ended the scan before the last range
    /// was exhausted.
    pub stopped_early: bool,
}

/// Scan `ranges` in order with `scanner`, handing every non-empty batch of
/// at most `batch_size` rows to `sink`.
///
/// `open_source` supplies a byte source for each range. The scanner is
/// prepared first if it hasn't been. The first error ends the scan; batches
/// already handed to `sink` stay there.
#[instrument(skip_all, fields(batch_size = batch_size))]
pub fn scan_ranges<I, S, F>(
    scanner: &mut dyn Scanner,
    ranges: I,
    mut open_source: S,
    batch_size: usize,
    mut sink: F,
) -> Result<ScanSummary>
where
    I: IntoIterator,
    I::Item: Into<RangeInput>,
    S: FnMut(&ScanRange) -> BoxByteSource,
    F: FnMut(RowBatch),
{
    if scanner.lifecycle() == Lifecycle::Uninitialized {
        scanner.prepare()?;
    }
    let node = Arc::clone(scanner.core().node());
    let mut summary = ScanSummary::default();
    let mut previous: Option<ScanRange> = None;
    'ranges: for input in ranges {
        let RangeInput { range, template } = input.into();
        if node.should_stop() {
            summary.stopped_early = true;
            break;
        }
        let boundary = FileBoundary::between(previous.as_ref(), &range);
        let source = open_source(&range);
        previous = Some(range.clone());
        scanner.init_current_scan_range(range, template, source, boundary)?;
        summary.ranges += 1;
        loop {
            if node.should_stop() {
                summary.stopped_early = true;
                break 'ranges;
            }
            let mut batch = node.new_row_batch(batch_size);
            let eos = scanner.get_next(&mut batch)?;
            if !batch.is_empty() {
                summary.batches += 1;
                summary.rows += batch.len();
                sink(batch);
            }
            if eos {
                break;
            }
        }
    }
    tracing::debug!(
        ranges = summary.ranges,
        rows = summary.rows,
        stopped_early = summary.stopped_early,
        errors_in_file = scanner.num_errors_in_file(),
        "scan finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileFormat, RuntimeState, ScanNode};
    use rstest::rstest;
    use tuplescan_config::ScannerConfig;
    use tuplescan_row::{SlotType, TupleDescriptor, Value};
    use tuplescan_storage::{Codec, DecompressingByteSource, LocalByteSource, MockByteSource};

    fn rows(n: usize) -> String {
        (0..n).map(|i| format!("{i}\n")).collect()
    }

    fn setup(node: ScanNode, files: &[(&str, String)]) -> (Box<dyn Scanner>, MockByteSource) {
        let config = Arc::new(ScannerConfig { read_block_size: 16, ..ScannerConfig::default() });
        let scanner = FileFormat::Text.create_scanner(Arc::new(node), Arc::new(RuntimeState::default()), config);
        let source = MockByteSource::with_files(files.iter().map(|(p, d)| (p.to_string(), d.clone())));
        (scanner, source)
    }

    fn as_int(value: Option<Value<'_>>) -> Option<i32> {
        match value? {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    fn int_node() -> ScanNode {
        ScanNode::new(Arc::new(TupleDescriptor::builder().column(0, SlotType::Int).build().unwrap()))
    }

    #[test]
    fn scans_ranges_in_order() {
        let data = rows(40);
        let (mut scanner, source) = setup(int_node(), &[("t/a.txt", data.clone())]);
        let ranges = ScanRange::split("t/a.txt", data.len() as u64, 25);
        let mut seen = Vec::new();
        let summary = scan_ranges(
            scanner.as_mut(),
            ranges.clone(),
            |_| Box::new(source.clone()),
            7,
            |batch| seen.extend(batch.tuples(0).map(|t| as_int(t.get(0)))),
        )
        .unwrap();
        let expected: Vec<_> = (0..40).map(Some).collect();
        assert_eq!(seen, expected);
        assert_eq!(summary.ranges, ranges.len());
        assert_eq!(summary.rows, 40);
        assert!(!summary.stopped_early);
        assert_eq!(scanner.lifecycle(), Lifecycle::RangeExhausted);
    }

    #[rstest]
    #[case(&["t/a.txt", "t/a.txt"], 2)]
    #[case(&["t/a.txt", "t/a.txt", "t/b.txt"], 1)]
    fn boundaries_come_from_consecutive_ranges(#[case] paths: &[&str], #[case] errors_in_file: u64) {
        let a = "1\nx\n3\ny\n".to_string();
        let b = "z\n".to_string();
        let (mut scanner, source) = setup(int_node(), &[("t/a.txt", a.clone()), ("t/b.txt", b.clone())]);
        let mut a_ranges = ScanRange::split("t/a.txt", a.len() as u64, 4).into_iter();
        let ranges: Vec<ScanRange> = paths
            .iter()
            .map(|p| match *p {
                "t/a.txt" => a_ranges.next().unwrap(),
                _ => ScanRange::whole_file(*p, b.len() as u64),
            })
            .collect();
        scan_ranges(scanner.as_mut(), ranges, |_| Box::new(source.clone()), 16, |_| {}).unwrap();
        assert_eq!(scanner.num_errors_in_file(), errors_in_file);
    }

    #[test]
    fn stops_between_batches_at_the_limit() {
        let (mut scanner, source) = setup(int_node().with_limit(5), &[("t/a.txt", rows(10)), ("t/b.txt", rows(10))]);
        let ranges = [ScanRange::whole_file("t/a.txt", 20), ScanRange::whole_file("t/b.txt", 20)];
        let summary = scan_ranges(scanner.as_mut(), ranges, |_| Box::new(source.clone()), 2, |_| {}).unwrap();
        assert!(summary.stopped_early);
        assert_eq!(summary.rows, 6);
        assert_eq!(summary.ranges, 1);
        assert_eq!(scanner.core().node().num_rows_returned(), 6);
    }

    #[test]
    fn cancelled_nodes_scan_nothing() {
        let (mut scanner, source) = setup(int_node(), &[("t/a.txt", rows(3))]);
        scanner.core().node().cancel();
        let mut opened = 0;
        let summary = scan_ranges(
            scanner.as_mut(),
            [ScanRange::whole_file("t/a.txt", 6)],
            |_| {
                opened += 1;
                Box::new(source.clone())
            },
            4,
            |_| {},
        )
        .unwrap();
        assert!(summary.stopped_early);
        assert_eq!((summary.ranges, summary.rows, opened), (0, 0, 0));
    }

    #[test]
    fn templates_travel_with_their_range() {
        let desc = Arc::new(TupleDescriptor::builder().column(0, SlotType::Int).partition_key(SlotType::Int).build().unwrap());
        let key = desc.partition_key_slots().next().unwrap().id;
        let template = |n| Arc::new(TemplateTuple::builder(&desc).set(key, Value::Int(n)).unwrap().build());
        let (mut scanner, source) =
            setup(ScanNode::new(Arc::clone(&desc)), &[("t/a.txt", rows(2)), ("t/b.txt", rows(3))]);
        let ranges = [
            RangeInput::new(ScanRange::whole_file("t/a.txt", 4)).with_template(template(1)),
            RangeInput::new(ScanRange::whole_file("t/b.txt", 6)).with_template(template(2)),
        ];
        let mut keys = Vec::new();
        scan_ranges(scanner.as_mut(), ranges, |_| Box::new(source.clone()), 8, |batch| {
            keys.extend(batch.tuples(0).map(|t| as_int(t.get(key))))
        })
        .unwrap();
        assert_eq!(keys, [Some(1), Some(1), Some(2), Some(2), Some(2)]);
    }

    #[test]
    fn reads_plain_and_compressed_files_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("year=2024")).unwrap();
        let plain = rows(30);
        let compressed = Codec::Gzip.compress(rows(20).as_bytes()).unwrap();
        std::fs::write(dir.path().join("year=2024/part-0000.txt"), &plain).unwrap();
        std::fs::write(dir.path().join("year=2024/part-0001.txt.gz"), &compressed).unwrap();

        let (mut scanner, _) = setup(int_node(), &[]);
        let mut ranges = ScanRange::split("year=2024/part-0000.txt", plain.len() as u64, 32);
        ranges.extend(ScanRange::split("year=2024/part-0001.txt.gz", compressed.len() as u64, 32));
        assert_eq!(ranges.last().map(|r| r.codec), Some(Codec::Gzip));
        let root = dir.path().to_path_buf();
        let summary = scan_ranges(
            scanner.as_mut(),
            ranges,
            |_| Box::new(DecompressingByteSource::new(LocalByteSource::new("local", &root).unwrap())),
            16,
            |_| {},
        )
        .unwrap();
        assert_eq!(summary.rows, 50);
        assert_eq!(scanner.core().state().num_parse_errors(), 0);
    }

    #[test]
    fn errors_end_the_scan() {
        let (mut scanner, source) = setup(int_node(), &[("t/a.txt", rows(3))]);
        let ranges = [ScanRange::whole_file("t/missing.txt", 6)];
        let err = scan_ranges(scanner.as_mut(), ranges, |_| Box::new(source.clone()), 4, |_| {}).unwrap_err();
        assert_eq!(*err, crate::error::ErrorKind::Io);
    }
}
