//! Core types for the mywire MySQL/MariaDB wire protocol engine.
//!
//! This crate holds the driver-neutral pieces shared by the protocol engine
//! and its consumers:
//!
//! - `Error` and the error taxonomy (transport, authentication, server,
//!   protocol violation, out-of-sequence)
//! - `Value`, the closed set of wire values
//! - `Date`, `Time` and `DateTime` calendar values
//! - `Row` and `FromValue` for typed access to result cells

pub mod error;
pub mod row;
pub mod temporal;
pub mod value;

pub use error::{Error, Result};
pub use row::{ColumnInfo, FromValue, Row};
pub use temporal::{Date, DateTime, Time};
pub use value::Value;
