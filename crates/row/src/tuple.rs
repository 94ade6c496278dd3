//! Reading and writing individual tuples, and template tuples.

use crate::error::{ErrorKind, Result};
use crate::value::{HeapRef, decode, encode_fixed};
use crate::{SlotDescriptor, TupleDescriptor, Value};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

/// Heap index of the bytes copied into a buffer's own heap. Attached heaps
/// are numbered from 1.
pub(crate) const OWNED_HEAP: u32 = 0;

/// Read-only view of one tuple.
#[derive(Clone, Copy)]
pub struct TupleView<'a> {
    desc: &'a TupleDescriptor,
    bytes: &'a [u8],
    owned: &'a [u8],
    attached: &'a [Arc<[u8]>],
}

impl<'a> TupleView<'a> {
    pub(crate) fn new(desc: &'a TupleDescriptor, bytes: &'a [u8], owned: &'a [u8], attached: &'a [Arc<[u8]>]) -> Self {
        Self { desc, bytes, owned, attached }
    }

    /// Whether `slot` is null. Unknown slots read as null.
    pub fn is_null(&self, slot: usize) -> bool {
        self.desc.slots().get(slot).is_none_or(|s| is_null(self.bytes, s))
    }

    /// Value of `slot`, or `None` if it is null.
    pub fn get(&self, slot: usize) -> Option<Value<'a>> {
        let s = self.desc.slots().get(slot)?;
        if is_null(self.bytes, s) {
            return None;
        }
        let (owned, attached) = (self.owned, self.attached);
        decode(s.ty, self.bytes.get(s.value_range())?, move |r| {
            let heap: &'a [u8] = match r.heap {
                OWNED_HEAP => owned,
                n => &attached.get(n as usize - 1)?[..],
            };
            heap.get(r.offset as usize..(r.offset as usize).checked_add(r.len as usize)?)
        })
    }

    /// Raw tuple bytes, null indicators included.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn descriptor(&self) -> &'a TupleDescriptor {
        self.desc
    }
}

impl Debug for TupleView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_list().entries((0..self.desc.num_slots()).map(|slot| self.get(slot))).finish()
    }
}

fn is_null(bytes: &[u8], slot: &SlotDescriptor) -> bool {
    bytes.get(slot.null_byte).is_none_or(|b| b & slot.null_mask != 0)
}

/// Zero `bytes` and set every slot's null bit.
fn init_null(desc: &TupleDescriptor, bytes: &mut [u8]) {
    bytes.fill(0);
    for slot in desc.slots() {
        bytes[slot.null_byte] |= slot.null_mask;
    }
}

/// Mutable access to one tuple while it is being materialized.
///
/// Obtained from [`TupleBuffer::begin_tuple`](crate::TupleBuffer::begin_tuple).
/// Nothing written here is visible to anyone else until the buffer is
/// committed.
#[derive(Debug)]
pub struct TupleWriter<'b> {
    desc: &'b TupleDescriptor,
    bytes: &'b mut [u8],
    owned: &'b mut Vec<u8>,
    attached: &'b mut Vec<Arc<[u8]>>,
}

impl<'b> TupleWriter<'b> {
    pub(crate) fn new(
        desc: &'b TupleDescriptor,
        bytes: &'b mut [u8],
        owned: &'b mut Vec<u8>,
        attached: &'b mut Vec<Arc<[u8]>>,
    ) -> Self {
        Self { desc, bytes, owned, attached }
    }

    /// Initialize every byte of the tuple: a copy of `template` when there
    /// is one, otherwise zeroes with every slot null.
    pub fn init(&mut self, template: Option<&TemplateTuple>) -> Result<()> {
        let Some(template) = template else {
            init_null(self.desc, self.bytes);
            return Ok(());
        };
        if template.bytes.len() != self.bytes.len() {
            exn::bail!(ErrorKind::TemplateMismatch);
        }
        self.bytes.copy_from_slice(&template.bytes);
        if template.heap.is_empty() {
            return Ok(());
        }
        let heap = self.attach(&template.heap);
        let desc = self.desc;
        for slot in desc.slots() {
            if slot.ty.is_var_len() && !is_null(self.bytes, slot) {
                self.bytes[slot.offset..slot.offset + 4].copy_from_slice(&heap.to_le_bytes());
            }
        }
        Ok(())
    }

    /// Write a value, copying variable-length bytes into the buffer's own
    /// heap.
    pub fn set_value(&mut self, slot: usize, value: Value<'_>) -> Result<()> {
        let s = self.slot_of(slot, value.slot_type())?;
        let range = s.value_range();
        let (null_byte, null_mask) = (s.null_byte, s.null_mask);
        match value.var_len_bytes() {
            Some(bytes) => {
                let offset = self.owned.len();
                let r = heap_ref(OWNED_HEAP, offset, bytes.len())?;
                self.owned.extend_from_slice(bytes);
                r.write(&mut self.bytes[range]);
            },
            None => encode_fixed(&value, &mut self.bytes[range]),
        }
        self.bytes[null_byte] &= !null_mask;
        Ok(())
    }

    /// Point a variable-length slot at `heap[start..start + len]` without
    /// copying. The heap is kept alive by the block the tuple is committed
    /// into.
    pub fn set_heap_ref(&mut self, slot: usize, heap: &Arc<[u8]>, start: usize, len: usize) -> Result<()> {
        let s = self.slot(slot)?;
        if !s.ty.is_var_len() {
            exn::bail!(ErrorKind::TypeMismatch { slot, expected: s.ty, actual: crate::SlotType::String });
        }
        let range = s.value_range();
        let (null_byte, null_mask) = (s.null_byte, s.null_mask);
        let index = self.attach(heap);
        heap_ref(index, start, len)?.write(&mut self.bytes[range]);
        self.bytes[null_byte] &= !null_mask;
        Ok(())
    }

    pub fn set_null(&mut self, slot: usize) -> Result<()> {
        let s = self.slot(slot)?;
        self.bytes[s.null_byte] |= s.null_mask;
        Ok(())
    }

    /// View of the tuple as written so far.
    pub fn view(&self) -> TupleView<'_> {
        TupleView::new(self.desc, self.bytes, self.owned, self.attached)
    }

    fn slot(&self, slot: usize) -> Result<&'b SlotDescriptor> {
        let desc: &'b TupleDescriptor = self.desc;
        desc.slot(slot)
    }

    fn slot_of(&self, slot: usize, actual: crate::SlotType) -> Result<&'b SlotDescriptor> {
        let s = self.slot(slot)?;
        if s.ty != actual {
            exn::bail!(ErrorKind::TypeMismatch { slot, expected: s.ty, actual });
        }
        Ok(s)
    }

    /// Index of `heap`, attaching it if this buffer doesn't reference it yet.
    fn attach(&mut self, heap: &Arc<[u8]>) -> u32 {
        let position = match self.attached.iter().position(|h| Arc::ptr_eq(h, heap)) {
            Some(position) => position,
            None => {
                self.attached.push(Arc::clone(heap));
                self.attached.len() - 1
            },
        };
        position as u32 + 1
    }
}

fn heap_ref(heap: u32, offset: usize, len: usize) -> Result<HeapRef> {
    let too_long = || ErrorKind::StringTooLong(len);
    let offset = u32::try_from(offset).map_err(|_| too_long())?;
    let len32 = u32::try_from(len).map_err(|_| too_long())?;
    if offset.checked_add(len32).is_none() {
        exn::bail!(too_long());
    }
    Ok(HeapRef { heap, offset, len: len32 })
}

/// A tuple holding only partition-key values, every other slot null.
///
/// Built once per file and copied as the starting point of every tuple a
/// scanner produces from that file.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tuplescan_row::{SlotType, TemplateTuple, TupleDescriptor, Value};
///
/// let desc = Arc::new(
///     TupleDescriptor::builder().column(0, SlotType::Int).partition_key(SlotType::String).build().unwrap(),
/// );
/// let template = TemplateTuple::builder(&desc).set(1, Value::from("2024-06")).unwrap().build();
/// assert_eq!(template.view().get(1), Some(Value::from("2024-06")));
/// assert!(template.view().is_null(0));
/// ```
pub struct TemplateTuple {
    desc: Arc<TupleDescriptor>,
    bytes: Box<[u8]>,
    heap: Arc<[u8]>,
}

impl TemplateTuple {
    pub fn builder(desc: &Arc<TupleDescriptor>) -> TemplateTupleBuilder {
        let mut bytes = vec![0; desc.byte_size()];
        init_null(desc, &mut bytes);
        TemplateTupleBuilder { desc: Arc::clone(desc), bytes, heap: Vec::new() }
    }

    pub fn descriptor(&self) -> &Arc<TupleDescriptor> {
        &self.desc
    }

    pub fn view(&self) -> TupleView<'_> {
        TupleView::new(&self.desc, &self.bytes, &self.heap, &[])
    }
}

impl Debug for TemplateTuple {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_tuple("TemplateTuple").field(&self.view()).finish()
    }
}

#[derive(Debug)]
pub struct TemplateTupleBuilder {
    desc: Arc<TupleDescriptor>,
    bytes: Vec<u8>,
    heap: Vec<u8>,
}

impl TemplateTupleBuilder {
    /// Set a partition-key slot.
    pub fn set(mut self, slot: usize, value: Value<'_>) -> Result<Self> {
        if !self.desc.slot(slot)?.is_partition_key() {
            exn::bail!(ErrorKind::NotPartitionKey(slot));
        }
        let mut attached = Vec::new();
        TupleWriter::new(&self.desc, &mut self.bytes, &mut self.heap, &mut attached).set_value(slot, value)?;
        Ok(self)
    }

    pub fn build(self) -> TemplateTuple {
        TemplateTuple { desc: self.desc, bytes: self.bytes.into_boxed_slice(), heap: Arc::from(self.heap) }
    }
}
