//! This library is the foundation for the `echogram-in` crate. It holds the
//! per-channel sample store for Simrad EK60/ES60/ES70 echosounder data and
//! the conversions from raw power and electrical angles to calibrated
//! quantities. It can be built either with serialization support, or in a
//! slightly more lightweight manner without it (see features).
//!
//! The byte-level datagram parser is deliberately not part of this
//! workspace: ingestion consumes already-parsed [`DatagramRecord`] values
//! through the source trait defined in `echogram-in`.
#![allow(clippy::derive_partial_eq_without_eq)]
extern crate chrono;
extern crate log;
extern crate ndarray;
extern crate num;
#[macro_use]
extern crate num_derive;

#[cfg(any(feature = "to_json", feature = "serde"))]
extern crate serde;
#[cfg(feature = "to_json")]
extern crate serde_json;

pub mod calibration;
pub mod convert;
pub mod datagram_structs;
pub mod enums;
pub mod errors;
pub mod grid;
pub mod resample;
pub mod sample_codec;
pub mod settings;
pub mod store;
pub mod timestamp;
#[cfg(test)]
mod tests;

pub use errors::EchoError;

pub use calibration::{CalParam, CalValue, Calibration};
pub use convert::{AngleOptions, BottomLine, BottomOptions, SpOptions, SvOptions, TVG_CORRECTION};
pub use datagram_structs::*;
pub use enums::*;
pub use grid::{GetOptions, ProcessedData};
pub use settings::ReadSettings;
pub use store::{ChannelStore, PingSelection, StorageOptions};
pub use timestamp::{TimeValue, DEFAULT_TIME_FORMAT, NOT_A_TIME};
