//! This contains the enums used to interpret raw datagrams and to label
//! converted outputs.
//!
//! The Simrad raw format encodes a handful of per-channel and per-ping
//! properties as small integer codes. As with most instrument formats these
//! codes may only have certain values, which lends itself well to being
//! represented by enums. Codes that arrive once per file (the transceiver
//! configuration) return an `Invalid` variant on an unexpected value so that
//! a single odd transceiver entry cannot abort a whole file, while codes that
//! arrive on every sample datagram return an error because a bad value there
//! means the stream itself is corrupt.
use num::FromPrimitive;
#[cfg(any(feature = "to_json", feature = "serde"))]
use serde::{Deserialize, Serialize};

use crate::errors::*;

/// The transducer beam type from the channel configuration header.
#[derive(Debug, Clone, Copy, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(C)]
#[cfg_attr(
    any(feature = "to_json", feature = "serde"),
    derive(Serialize, Deserialize)
)]
pub enum BeamType {
    Single = 0,
    Split = 1,
    Invalid,
}

impl BeamType {
    /// NB: Configuration headers occasionally carry vendor-specific beam
    /// codes, so an unknown value maps to `Invalid` instead of failing.
    pub fn new(source: i32) -> Self {
        Self::from_i32(source).unwrap_or(BeamType::Invalid)
    }
}

impl std::fmt::Display for BeamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        write!(f, "{:?}", self)
    }
}

/// The datagram transceiver mode: which sample blocks a RAW record carries.
#[derive(Debug, Clone, Copy, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(C)]
#[cfg_attr(
    any(feature = "to_json", feature = "serde"),
    derive(Serialize, Deserialize)
)]
pub enum SampleMode {
    PowerOnly = 1,
    AngleOnly = 2,
    PowerAndAngle = 3,
}

impl SampleMode {
    /// NB: We give a result here to make life simpler for ourselves down the line.
    pub fn new(source: u16) -> Result<Self, EchoError> {
        SampleMode::from_u16(source).ok_or(EchoError::ParseEnum {
            f: "SampleMode".to_string(),
            code: source,
        })
    }

    /// Whether a datagram in this mode carries power samples.
    pub fn has_power(self) -> bool {
        self != SampleMode::AngleOnly
    }

    /// Whether a datagram in this mode carries angle samples.
    pub fn has_angles(self) -> bool {
        self != SampleMode::PowerOnly
    }
}

/// The physical quantity held by a [`crate::grid::ProcessedData`] grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
#[cfg_attr(
    any(feature = "to_json", feature = "serde"),
    derive(Serialize, Deserialize)
)]
pub enum DataKind {
    /// Received power, dB re 1 W.
    Power,
    /// Volume backscattering strength, dB re 1/m.
    Sv,
    /// Volume backscattering coefficient, 1/m.
    SvLinear,
    /// Point backscattering strength (target strength), dB re 1 m².
    Sp,
    /// Point backscattering coefficient, 1/m².
    SpLinear,
    /// Alongship angle in mechanical degrees.
    AnglesAlongship,
    /// Athwartship angle in mechanical degrees.
    AnglesAthwartship,
    /// Alongship angle in electrical units.
    AnglesAlongshipE,
    /// Athwartship angle in electrical units.
    AnglesAthwartshipE,
}

impl DataKind {
    /// The conventional label for this quantity. Log and linear
    /// backscatter are distinguished by case, following the field's usage.
    pub fn label(self) -> &'static str {
        match self {
            DataKind::Power => "power",
            DataKind::Sv => "Sv",
            DataKind::SvLinear => "sv",
            DataKind::Sp => "Sp",
            DataKind::SpLinear => "sp",
            DataKind::AnglesAlongship => "angles_alongship",
            DataKind::AnglesAthwartship => "angles_athwartship",
            DataKind::AnglesAlongshipE => "angles_alongship_e",
            DataKind::AnglesAthwartshipE => "angles_athwartship_e",
        }
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        write!(f, "{}", self.label())
    }
}

/// A raw sample property that can be pulled out of a store as a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub enum SampleProperty {
    Power,
    AnglesAlongshipE,
    AnglesAthwartshipE,
}

impl SampleProperty {
    pub fn name(self) -> &'static str {
        match self {
            SampleProperty::Power => "power",
            SampleProperty::AnglesAlongshipE => "angles_alongship_e",
            SampleProperty::AnglesAthwartshipE => "angles_athwartship_e",
        }
    }
}

/// The target sample interval for regridding pings recorded with mixed
/// sampling rates.
///
/// The named `RATE_*` constants are the standard EK60 sampling intervals
/// when operated with the ER60 software, as well as ES60/70 systems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResampleInterval {
    /// Resample everything to the shortest (finest) interval present.
    Shortest,
    /// Resample everything to the longest (coarsest) interval present.
    Longest,
    /// Resample to an explicit interval in seconds. Must be an integer
    /// ratio of every interval present in the selected pings.
    Rate(f64),
}

impl ResampleInterval {
    pub const RATE_16US: ResampleInterval = ResampleInterval::Rate(16e-6);
    pub const RATE_32US: ResampleInterval = ResampleInterval::Rate(32e-6);
    pub const RATE_64US: ResampleInterval = ResampleInterval::Rate(64e-6);
    pub const RATE_128US: ResampleInterval = ResampleInterval::Rate(128e-6);
    pub const RATE_256US: ResampleInterval = ResampleInterval::Rate(256e-6);
    pub const RATE_512US: ResampleInterval = ResampleInterval::Rate(512e-6);
    pub const RATE_1024US: ResampleInterval = ResampleInterval::Rate(1024e-6);
    pub const RATE_2048US: ResampleInterval = ResampleInterval::Rate(2048e-6);
}

impl Default for ResampleInterval {
    fn default() -> Self {
        ResampleInterval::Shortest
    }
}
