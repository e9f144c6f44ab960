//! Pure helpers: unit conversion and byte codecs

pub mod codec;
pub mod units;

pub use codec::{is_address, parse_address};
pub use units::{format_ether, format_units, parse_ether, parse_units};
