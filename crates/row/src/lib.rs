//! Tuples and row batches.
//!
//! A [`TupleDescriptor`] fixes the byte layout of a tuple: null indicator
//! bits first, then one fixed-width value per [`SlotDescriptor`].
//! Variable-length values (strings, binary) are stored as a
//! `(heap, offset, len)` reference into a heap owned or kept alive by the
//! tuple's block, never as a pointer.
//!
//! Scanners allocate a [`TupleBuffer`] from the shared [`TuplePool`], write
//! tuples into it through a [`TupleWriter`] (usually starting from a copy of
//! the file's [`TemplateTuple`]) and commit it into an immutable, shared
//! [`TupleBlock`], whose tuples are then referenced from [`RowBatch`] rows.

mod batch;
mod descriptor;
pub mod error;
mod pool;
mod tuple;
mod types;
mod value;

pub use crate::batch::{RowBatch, TupleRef, TupleRow};
pub use crate::descriptor::{SlotDescriptor, SlotKind, TupleDescriptor, TupleDescriptorBuilder};
pub use crate::pool::{PoolStats, TupleBlock, TupleBuffer, TuplePool};
pub use crate::tuple::{TemplateTuple, TemplateTupleBuilder, TupleView, TupleWriter};
pub use crate::types::{SlotType, Timestamp};
pub use crate::value::Value;
