//! User-supplied calibration overrides for the conversion methods.
//!
//! When converting raw samples to Sv/sv, Sp/sp or physical angles the caller
//! may pass a [`Calibration`] holding the parameter values to use instead of
//! those captured at recording time. A parameter may be given as a single
//! scalar applied to every ping or as a per-ping vector; any parameter left
//! unset falls back to the recorded value, so a partially filled object is
//! perfectly fine.
use crate::datagram_structs::is_close;
use crate::errors::*;
use crate::store::ChannelStore;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Every parameter the calibration resolver knows how to produce.
///
/// Routing resolution through this enum instead of attribute names means a
/// typo in a parameter is a compile error rather than a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
#[cfg_attr(
    any(feature = "to_json", feature = "serde"),
    derive(Serialize, Deserialize)
)]
pub enum CalParam {
    SampleInterval,
    SoundVelocity,
    SampleOffset,
    TransducerDepth,
    Heave,
    Gain,
    TransmitPower,
    EquivalentBeamAngle,
    PulseLength,
    AbsorptionCoefficient,
    SaCorrection,
    AngleSensitivityAlongship,
    AngleSensitivityAthwartship,
    AngleOffsetAlongship,
    AngleOffsetAthwartship,
}

impl CalParam {
    /// All parameters, in the order [`Calibration::from_store`] fills them.
    pub const ALL: [CalParam; 15] = [
        CalParam::SampleInterval,
        CalParam::SoundVelocity,
        CalParam::SampleOffset,
        CalParam::TransducerDepth,
        CalParam::Heave,
        CalParam::Gain,
        CalParam::TransmitPower,
        CalParam::EquivalentBeamAngle,
        CalParam::PulseLength,
        CalParam::AbsorptionCoefficient,
        CalParam::SaCorrection,
        CalParam::AngleSensitivityAlongship,
        CalParam::AngleSensitivityAthwartship,
        CalParam::AngleOffsetAlongship,
        CalParam::AngleOffsetAthwartship,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CalParam::SampleInterval => "sample_interval",
            CalParam::SoundVelocity => "sound_velocity",
            CalParam::SampleOffset => "sample_offset",
            CalParam::TransducerDepth => "transducer_depth",
            CalParam::Heave => "heave",
            CalParam::Gain => "gain",
            CalParam::TransmitPower => "transmit_power",
            CalParam::EquivalentBeamAngle => "equivalent_beam_angle",
            CalParam::PulseLength => "pulse_length",
            CalParam::AbsorptionCoefficient => "absorption_coefficient",
            CalParam::SaCorrection => "sa_correction",
            CalParam::AngleSensitivityAlongship => "angle_sensitivity_alongship",
            CalParam::AngleSensitivityAthwartship => "angle_sensitivity_athwartship",
            CalParam::AngleOffsetAlongship => "angle_offset_alongship",
            CalParam::AngleOffsetAthwartship => "angle_offset_athwartship",
        }
    }
}

impl std::fmt::Display for CalParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One calibration parameter value: a scalar for every ping, or one value
/// per ping.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    any(feature = "to_json", feature = "serde"),
    derive(Serialize, Deserialize)
)]
pub enum CalValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl From<f64> for CalValue {
    fn from(v: f64) -> Self {
        CalValue::Scalar(v)
    }
}

impl From<Vec<f64>> for CalValue {
    fn from(v: Vec<f64>) -> Self {
        CalValue::Vector(v)
    }
}

/// A record of calibration overrides, one optional slot per [`CalParam`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    any(feature = "to_json", feature = "serde"),
    derive(Serialize, Deserialize)
)]
pub struct Calibration {
    /// The channel ids this calibration was built from, if any.
    pub channel_id: Option<Vec<String>>,
    pub sample_interval: Option<CalValue>,
    pub sound_velocity: Option<CalValue>,
    pub sample_offset: Option<CalValue>,
    pub transducer_depth: Option<CalValue>,
    pub heave: Option<CalValue>,
    pub gain: Option<CalValue>,
    pub transmit_power: Option<CalValue>,
    pub equivalent_beam_angle: Option<CalValue>,
    pub pulse_length: Option<CalValue>,
    pub absorption_coefficient: Option<CalValue>,
    pub sa_correction: Option<CalValue>,
    pub angle_sensitivity_alongship: Option<CalValue>,
    pub angle_sensitivity_athwartship: Option<CalValue>,
    pub angle_offset_alongship: Option<CalValue>,
    pub angle_offset_athwartship: Option<CalValue>,
}

impl Calibration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the override slot for a parameter.
    pub fn get(&self, param: CalParam) -> Option<&CalValue> {
        match param {
            CalParam::SampleInterval => self.sample_interval.as_ref(),
            CalParam::SoundVelocity => self.sound_velocity.as_ref(),
            CalParam::SampleOffset => self.sample_offset.as_ref(),
            CalParam::TransducerDepth => self.transducer_depth.as_ref(),
            CalParam::Heave => self.heave.as_ref(),
            CalParam::Gain => self.gain.as_ref(),
            CalParam::TransmitPower => self.transmit_power.as_ref(),
            CalParam::EquivalentBeamAngle => self.equivalent_beam_angle.as_ref(),
            CalParam::PulseLength => self.pulse_length.as_ref(),
            CalParam::AbsorptionCoefficient => self.absorption_coefficient.as_ref(),
            CalParam::SaCorrection => self.sa_correction.as_ref(),
            CalParam::AngleSensitivityAlongship => self.angle_sensitivity_alongship.as_ref(),
            CalParam::AngleSensitivityAthwartship => self.angle_sensitivity_athwartship.as_ref(),
            CalParam::AngleOffsetAlongship => self.angle_offset_alongship.as_ref(),
            CalParam::AngleOffsetAthwartship => self.angle_offset_athwartship.as_ref(),
        }
    }

    /// Set the override slot for a parameter.
    /// ```
    /// use echogram_core::calibration::{CalParam, CalValue, Calibration};
    ///
    /// let mut cal = Calibration::new();
    /// cal.set(CalParam::Gain, CalValue::Scalar(26.5));
    /// assert_eq!(cal.get(CalParam::Gain), Some(&CalValue::Scalar(26.5)));
    /// ```
    pub fn set(&mut self, param: CalParam, value: CalValue) {
        *self.slot_mut(param) = Some(value);
    }

    /// Clear the override slot for a parameter, falling back to recorded
    /// values on the next conversion.
    pub fn clear(&mut self, param: CalParam) {
        *self.slot_mut(param) = None;
    }

    fn slot_mut(&mut self, param: CalParam) -> &mut Option<CalValue> {
        match param {
            CalParam::SampleInterval => &mut self.sample_interval,
            CalParam::SoundVelocity => &mut self.sound_velocity,
            CalParam::SampleOffset => &mut self.sample_offset,
            CalParam::TransducerDepth => &mut self.transducer_depth,
            CalParam::Heave => &mut self.heave,
            CalParam::Gain => &mut self.gain,
            CalParam::TransmitPower => &mut self.transmit_power,
            CalParam::EquivalentBeamAngle => &mut self.equivalent_beam_angle,
            CalParam::PulseLength => &mut self.pulse_length,
            CalParam::AbsorptionCoefficient => &mut self.absorption_coefficient,
            CalParam::SaCorrection => &mut self.sa_correction,
            CalParam::AngleSensitivityAlongship => &mut self.angle_sensitivity_alongship,
            CalParam::AngleSensitivityAthwartship => &mut self.angle_sensitivity_athwartship,
            CalParam::AngleOffsetAlongship => &mut self.angle_offset_alongship,
            CalParam::AngleOffsetAthwartship => &mut self.angle_offset_athwartship,
        }
    }

    /// Populate every parameter slot from the values recorded in a store.
    ///
    /// Each parameter is resolved for the selected pings (all pings when
    /// `indices` is `None`); a vector whose entries are all close to its
    /// first entry collapses to a scalar.
    pub fn from_store(
        &mut self,
        store: &ChannelStore,
        indices: Option<&[usize]>,
    ) -> Result<(), EchoError> {
        let all_indices: Vec<usize> = (0..store.n_pings()).collect();
        let indices = indices.unwrap_or(&all_indices);

        self.channel_id = Some(store.channel_id().to_vec());
        for &param in CalParam::ALL.iter() {
            let resolved = store.calibration_param(None, param, indices)?;
            *self.slot_mut(param) = Some(collapse(resolved));
        }
        Ok(())
    }
}

/// Collapse a per-ping vector to a scalar when every entry is close to the
/// first one.
fn collapse(values: Vec<f64>) -> CalValue {
    match values.first() {
        Some(&first) if values.iter().all(|&v| is_close(v, first)) => CalValue::Scalar(first),
        _ => CalValue::Vector(values),
    }
}
