//! Tuple and slot descriptors: the fixed byte layout of one tuple.

use crate::SlotType;
use crate::error::{ErrorKind, Result};
use std::cmp::Reverse;
use std::collections::HashSet;

/// Where a slot's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// The nth column of each row in the file.
    Column(usize),
    /// A per-file constant derived from the file's location, pre-populated
    /// in the template tuple.
    PartitionKey,
}

/// Layout of one slot within a tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDescriptor {
    pub id: usize,
    pub ty: SlotType,
    pub kind: SlotKind,
    /// Whether the query reads this slot at all. Unmaterialized slots keep
    /// their layout but are always null.
    pub materialized: bool,
    /// Byte holding the slot's null indicator.
    pub null_byte: usize,
    /// Bit within [`null_byte`](Self::null_byte); set means null.
    pub null_mask: u8,
    /// Byte offset of the value.
    pub offset: usize,
}

impl SlotDescriptor {
    pub fn column(&self) -> Option<usize> {
        match self.kind {
            SlotKind::Column(col) => Some(col),
            SlotKind::PartitionKey => None,
        }
    }

    pub fn is_partition_key(&self) -> bool {
        self.kind == SlotKind::PartitionKey
    }

    /// Whether a scanner must parse this slot out of file content.
    pub fn is_materialized_from_file(&self) -> bool {
        self.materialized && self.column().is_some()
    }

    pub(crate) fn value_range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.ty.size()
    }
}

/// Immutable layout of a tuple: null indicator bytes first, then slot values
/// ordered by descending size with natural alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleDescriptor {
    slots: Vec<SlotDescriptor>,
    null_bytes: usize,
    byte_size: usize,
}

impl TupleDescriptor {
    pub fn builder() -> TupleDescriptorBuilder {
        TupleDescriptorBuilder::default()
    }

    pub fn slots(&self) -> &[SlotDescriptor] {
        &self.slots
    }

    pub fn slot(&self, id: usize) -> Result<&SlotDescriptor> {
        match self.slots.get(id) {
            Some(slot) => Ok(slot),
            None => exn::bail!(ErrorKind::UnknownSlot(id)),
        }
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Fixed size of every tuple with this layout.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn null_bytes(&self) -> usize {
        self.null_bytes
    }

    /// Slots parsed from file content, ordered by column.
    pub fn file_slots(&self) -> Vec<&SlotDescriptor> {
        let mut slots: Vec<_> = self.slots.iter().filter(|s| s.is_materialized_from_file()).collect();
        slots.sort_by_key(|s| s.column());
        slots
    }

    pub fn partition_key_slots(&self) -> impl Iterator<Item = &SlotDescriptor> {
        self.slots.iter().filter(|s| s.is_partition_key())
    }

    /// Whether any slot parsed from file content holds variable-length data.
    pub fn has_var_len_file_slots(&self) -> bool {
        self.slots.iter().any(|s| s.is_materialized_from_file() && s.ty.is_var_len())
    }
}

/// Slots are numbered in the order they are added.
///
/// # Examples
///
/// ```
/// use tuplescan_row::{SlotType, TupleDescriptor};
///
/// let desc = TupleDescriptor::builder()
///     .column(0, SlotType::Int)
///     .column(1, SlotType::String)
///     .partition_key(SlotType::SmallInt)
///     .build()
///     .unwrap();
/// // One null byte, the string reference at 4..16, the int at 16..20 and the
/// // smallint at 20..22.
/// assert_eq!(desc.byte_size(), 22);
/// assert_eq!(desc.slot(1).unwrap().offset, 4);
/// ```
#[derive(Debug, Default)]
pub struct TupleDescriptorBuilder {
    specs: Vec<(SlotType, SlotKind, bool)>,
}

impl TupleDescriptorBuilder {
    /// A slot filled from column `col` of the file.
    pub fn column(mut self, col: usize, ty: SlotType) -> Self {
        self.specs.push((ty, SlotKind::Column(col), true));
        self
    }

    /// A column slot the query never reads.
    pub fn unmaterialized_column(mut self, col: usize, ty: SlotType) -> Self {
        self.specs.push((ty, SlotKind::Column(col), false));
        self
    }

    pub fn partition_key(mut self, ty: SlotType) -> Self {
        self.specs.push((ty, SlotKind::PartitionKey, true));
        self
    }

    pub fn build(self) -> Result<TupleDescriptor> {
        let mut columns = HashSet::new();
        for (_, kind, _) in &self.specs {
            if let SlotKind::Column(col) = kind
                && !columns.insert(*col)
            {
                exn::bail!(ErrorKind::DuplicateColumn(*col));
            }
        }
        let null_bytes = self.specs.len().div_ceil(8);
        let mut order: Vec<usize> = (0..self.specs.len()).collect();
        order.sort_by_key(|&i| Reverse(self.specs[i].0.size()));
        let mut offsets = vec![0; self.specs.len()];
        let mut end = null_bytes;
        for i in order {
            let ty = self.specs[i].0;
            let offset = end.next_multiple_of(ty.align());
            offsets[i] = offset;
            end = offset + ty.size();
        }
        let slots = self
            .specs
            .into_iter()
            .enumerate()
            .map(|(id, (ty, kind, materialized))| SlotDescriptor {
                id,
                ty,
                kind,
                materialized,
                null_byte: id / 8,
                null_mask: 1 << (id % 8),
                offset: offsets[id],
            })
            .collect();
        Ok(TupleDescriptor { slots, null_bytes, byte_size: end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn layout_orders_by_size_and_aligns() {
        let desc = TupleDescriptor::builder()
            .column(0, SlotType::Boolean)
            .column(1, SlotType::Timestamp)
            .column(2, SlotType::Int)
            .column(3, SlotType::BigInt)
            .build()
            .unwrap();
        let offsets: Vec<_> = desc.slots().iter().map(|s| s.offset).collect();
        // null byte, pad to 8, timestamp 8..24, bigint 24..32, int 32..36, bool 36
        assert_eq!(offsets, [36, 8, 32, 24]);
        assert_eq!(desc.byte_size(), 37);
        assert_eq!(desc.null_bytes(), 1);
    }

    #[test]
    fn slots_never_overlap() {
        let types = [SlotType::Double, SlotType::TinyInt, SlotType::String, SlotType::SmallInt, SlotType::Float];
        let mut builder = TupleDescriptor::builder();
        for (col, ty) in types.iter().cycle().take(11).enumerate() {
            builder = builder.column(col, *ty);
        }
        let desc = builder.build().unwrap();
        assert_eq!(desc.null_bytes(), 2);
        let mut ranges: Vec<_> = desc.slots().iter().map(|s| s.value_range()).collect();
        ranges.sort_by_key(|r| r.start);
        assert!(ranges[0].start >= desc.null_bytes());
        assert!(ranges.windows(2).all(|w| w[0].end <= w[1].start));
        assert_eq!(ranges.last().unwrap().end, desc.byte_size());
        for slot in desc.slots() {
            assert_eq!(slot.offset % slot.ty.align(), 0);
        }
    }

    #[rstest]
    #[case(0, 0)]
    #[case(8, 1)]
    #[case(9, 2)]
    fn null_indicators(#[case] slots: usize, #[case] null_bytes: usize) {
        let mut builder = TupleDescriptor::builder();
        for col in 0..slots {
            builder = builder.column(col, SlotType::TinyInt);
        }
        let desc = builder.build().unwrap();
        assert_eq!(desc.null_bytes(), null_bytes);
        assert_eq!(desc.byte_size(), null_bytes + slots);
        if slots == 9 {
            assert_eq!((desc.slots()[8].null_byte, desc.slots()[8].null_mask), (1, 1));
        }
    }

    #[test]
    fn file_slots_follow_column_order() {
        let desc = TupleDescriptor::builder()
            .column(2, SlotType::Int)
            .partition_key(SlotType::String)
            .unmaterialized_column(1, SlotType::String)
            .column(0, SlotType::String)
            .build()
            .unwrap();
        let ids: Vec<_> = desc.file_slots().iter().map(|s| s.id).collect();
        assert_eq!(ids, [3, 0]);
        assert_eq!(desc.partition_key_slots().count(), 1);
        assert!(desc.has_var_len_file_slots());
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = TupleDescriptor::builder().column(0, SlotType::Int).column(0, SlotType::Int).build().unwrap_err();
        assert_eq!(*err, ErrorKind::DuplicateColumn(0));
        assert!(matches!(&*TupleDescriptor::builder().build().unwrap().slot(0).unwrap_err(), ErrorKind::UnknownSlot(0)));
    }
}
