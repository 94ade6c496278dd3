//! Scanners: turning byte ranges of data files into tuples.
//!
//! A [`ScanNode`] owns what a set of scanners share (tuple layout, tuple
//! pool, row limit, conjuncts). Each scanner thread gets its own
//! [`Scanner`], created for the node's [`FileFormat`], and drives it over
//! [`ScanRange`](tuplescan_storage::ScanRange)s:
//!
//! ```
//! use std::sync::Arc;
//! use tuplescan_config::ScannerConfig;
//! use tuplescan_row::{SlotType, TupleDescriptor};
//! use tuplescan_scanner::{FileFormat, RuntimeState, ScanNode, driver};
//! use tuplescan_storage::{MockByteSource, ScanRange};
//!
//! let desc = TupleDescriptor::builder().column(0, SlotType::Int).build().unwrap();
//! let node = Arc::new(ScanNode::new(Arc::new(desc)));
//! let config = Arc::new(ScannerConfig::default());
//! let mut scanner = FileFormat::Text.create_scanner(node, Arc::new(RuntimeState::default()), config);
//!
//! let source = MockByteSource::with_files([("t/part-0000.txt", b"1\n2\n3\n")]);
//! let ranges = [ScanRange::whole_file("t/part-0000.txt", 6)];
//! let summary = driver::scan_ranges(scanner.as_mut(), ranges, |_| Box::new(source.clone()), 1024, |_| {}).unwrap();
//! assert_eq!(summary.rows, 3);
//! ```
//!
//! Conversion failures of individual fields are not errors: the field is
//! left null, the failure is counted and logged to the [`RuntimeState`],
//! and the scan continues.

pub mod driver;
pub mod error;
mod field;
mod node;
mod scanner;
mod state;
mod text;

pub use crate::field::{FieldLocation, unescape};
pub use crate::node::{Conjunct, ScanNode};
pub use crate::scanner::{FileBoundary, Lifecycle, Scanner, ScannerCore};
pub use crate::state::RuntimeState;
pub use crate::text::DelimitedTextScanner;

use crate::error::{Error, ErrorKind};
use derive_more::Display;
use std::str::FromStr;
use std::sync::Arc;
use tuplescan_config::ScannerConfig;

/// File formats a scanner can be created for.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Delimited text, one tuple per line.
    #[display("text")]
    Text,
}

impl FileFormat {
    /// A new, unprepared scanner for this format.
    pub fn create_scanner(
        self,
        node: Arc<ScanNode>,
        state: Arc<RuntimeState>,
        config: Arc<ScannerConfig>,
    ) -> Box<dyn Scanner> {
        match self {
            Self::Text => Box::new(DelimitedTextScanner::new(node, state, config)),
        }
    }
}

impl FromStr for FileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "textfile" => Ok(Self::Text),
            _ => Err(Error::from(ErrorKind::UnknownFormat(s.to_string()))),
        }
    }
}
