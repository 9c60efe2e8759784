//! # gridcalc-core
//!
//! Core value types shared by the gridcalc crates:
//! - [`CellValue`] - values held by cells (numbers, text, booleans, errors, formulas)
//! - [`CellError`] - spreadsheet error values such as `#DIV/0!`
//! - [`CellAddress`] and [`CellRange`] - A1-style addressing
//!
//! ## Example
//!
//! ```rust
//! use gridcalc_core::{CellAddress, CellRange, CellValue};
//!
//! let addr = CellAddress::parse("B3").unwrap();
//! assert_eq!((addr.row, addr.col), (2, 1));
//!
//! let range = CellRange::parse("A1:B2").unwrap();
//! assert_eq!(range.cell_count(), 4);
//!
//! assert_eq!(CellValue::from(2.5).as_number(), Some(2.5));
//! ```

pub mod cell;
pub mod error;

pub use cell::{CellAddress, CellError, CellRange, CellValue, SharedString};
pub use error::{Error, Result};

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
