//! Slot types and the timestamp value type.

use crate::error::{Error, ErrorKind};
use derive_more::Display;
use std::fmt::{Display as FmtDisplay, Formatter, Result as FmtResult};
use std::str::FromStr;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

/// Storage type of one slot.
///
/// The display form is the SQL type name used in parse error messages.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotType {
    #[display("BOOLEAN")]
    Boolean,
    #[display("TINYINT")]
    TinyInt,
    #[display("SMALLINT")]
    SmallInt,
    #[display("INT")]
    Int,
    #[display("BIGINT")]
    BigInt,
    #[display("FLOAT")]
    Float,
    #[display("DOUBLE")]
    Double,
    #[display("STRING")]
    String,
    #[display("BINARY")]
    Binary,
    #[display("TIMESTAMP")]
    Timestamp,
}

impl SlotType {
    /// Bytes the slot occupies inside a tuple.
    ///
    /// Variable-length types store a `(heap, offset, len)` reference; the
    /// bytes themselves live in a heap attached to the tuple's block.
    pub const fn size(self) -> usize {
        match self {
            Self::Boolean | Self::TinyInt => 1,
            Self::SmallInt => 2,
            Self::Int | Self::Float => 4,
            Self::BigInt | Self::Double => 8,
            Self::String | Self::Binary => 12,
            Self::Timestamp => 16,
        }
    }

    pub const fn align(self) -> usize {
        match self {
            Self::Boolean | Self::TinyInt => 1,
            Self::SmallInt => 2,
            Self::Int | Self::Float | Self::String | Self::Binary => 4,
            Self::BigInt | Self::Double | Self::Timestamp => 8,
        }
    }

    /// Whether values live out of line, in a heap.
    pub const fn is_var_len(self) -> bool {
        matches!(self, Self::String | Self::Binary)
    }
}

const DATE: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");
const DATE_TIME: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const DATE_TIME_FRACTION: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]");
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_DAY: i64 = 86_400 * NANOS_PER_SECOND;

/// A timestamp without time zone, with nanosecond precision.
///
/// Stored in a slot as nanoseconds since midnight followed by the Julian day
/// number.
///
/// # Examples
///
/// ```
/// use tuplescan_row::Timestamp;
///
/// let ts: Timestamp = "2024-02-29 23:59:01.25".parse().unwrap();
/// assert_eq!(ts.to_string(), "2024-02-29 23:59:01.250000000");
/// assert_eq!("2024-02-29".parse::<Timestamp>().unwrap().to_string(), "2024-02-29 00:00:00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(PrimitiveDateTime);

impl Timestamp {
    pub fn new(datetime: PrimitiveDateTime) -> Self {
        Self(datetime)
    }

    pub fn datetime(&self) -> PrimitiveDateTime {
        self.0
    }

    /// `(nanoseconds since midnight, Julian day)`.
    pub(crate) fn to_parts(self) -> (i64, i32) {
        let (h, m, s, nanos) = self.0.time().as_hms_nano();
        let seconds = (i64::from(h) * 60 + i64::from(m)) * 60 + i64::from(s);
        (seconds * NANOS_PER_SECOND + i64::from(nanos), self.0.date().to_julian_day())
    }

    pub(crate) fn from_parts(nanos_of_day: i64, julian_day: i32) -> Option<Self> {
        if !(0..NANOS_PER_DAY).contains(&nanos_of_day) {
            return None;
        }
        let date = Date::from_julian_day(julian_day).ok()?;
        let seconds = nanos_of_day / NANOS_PER_SECOND;
        let nanos = (nanos_of_day % NANOS_PER_SECOND) as u32;
        let time = Time::from_hms_nano((seconds / 3600) as u8, (seconds / 60 % 60) as u8, (seconds % 60) as u8, nanos).ok()?;
        Some(Self(PrimitiveDateTime::new(date, time)))
    }
}

impl From<PrimitiveDateTime> for Timestamp {
    fn from(datetime: PrimitiveDateTime) -> Self {
        Self(datetime)
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    /// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and
    /// `YYYY-MM-DD HH:MM:SS.fffffffff` (one to nine fractional digits).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.len() {
            10 => Date::parse(s, DATE).map(Date::midnight),
            19 => PrimitiveDateTime::parse(s, DATE_TIME),
            _ => PrimitiveDateTime::parse(s, DATE_TIME_FRACTION),
        };
        parsed.map(Self).map_err(|_| Error::from(ErrorKind::InvalidTimestamp(s.to_string())))
    }
}

impl FmtDisplay for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let formatted = self.0.format(DATE_TIME).map_err(|_| std::fmt::Error)?;
        match self.0.nanosecond() {
            0 => write!(f, "{formatted}"),
            nanos => write!(f, "{formatted}.{nanos:09}"),
        }
    }
}
