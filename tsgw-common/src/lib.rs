//! Common functionality shared by the tsgw crates.

#![warn(missing_docs)]

pub mod time;

pub use self::time::UnixTimestamp;
