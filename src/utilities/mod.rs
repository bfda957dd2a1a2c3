//! Small shared helpers.

pub mod printer;

pub use printer::{Printer, PrinterColor};
