//! Conversion of gridded power and angle data to calibrated quantities.
//!
//! The conversions implement the standard Simrad power-budget equations:
//!
//! ```text
//! Sv = P + 20 log10(r) + 2 alpha r
//!        - 10 log10(Pt (10^(G/10))^2 lambda^2 c tau 10^(psi/10) / (32 pi^2))
//!        - 2 Sa
//! Sp = P + 40 log10(r) + 2 alpha r
//!        - 10 log10(Pt (10^(G/10))^2 lambda^2 / (16 pi^2))
//! ```
//!
//! with the receiver-delay range correction of two sample thicknesses
//! applied to `r` for Sv/sv. Every per-ping parameter is routed through the
//! calibration resolver, so user overrides and recorded values mix freely.
use std::f64::consts::PI;

use ndarray::Array2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::calibration::{CalParam, Calibration};
use crate::datagram_structs::is_close;
use crate::enums::{DataKind, ResampleInterval, SampleProperty};
use crate::errors::*;
use crate::grid::ProcessedData;
use crate::store::{gather, ChannelStore, PingSelection};

/// The range correction, in samples, compensating for receiver delay and
/// TVG start delay in EK60-era hardware. Applied only for Sv/sv.
pub const TVG_CORRECTION: f64 = 2.0;

/// Options for [`ChannelStore::get_sv`].
#[derive(Debug, Clone, PartialEq)]
pub struct SvOptions {
    /// Return linear sv instead of log Sv.
    pub linear: bool,
    /// Apply the two-sample TVG range correction (on by default for Sv).
    pub tvg_correction: bool,
    /// Apply heave correction; implies a depth vertical axis.
    pub heave_correct: bool,
    /// Reference the vertical axis to the surface instead of the
    /// transducer face.
    pub return_depth: bool,
    pub resample_interval: ResampleInterval,
    pub selection: PingSelection,
}

impl Default for SvOptions {
    fn default() -> Self {
        SvOptions {
            linear: false,
            tvg_correction: true,
            heave_correct: false,
            return_depth: false,
            resample_interval: ResampleInterval::default(),
            selection: PingSelection::default(),
        }
    }
}

/// Options for [`ChannelStore::get_sp`].
///
/// By default no TVG range correction is applied, which matches the Simrad
/// "P" telegram and target-strength exports of recent Echoview versions.
/// Single-target detection work needs the correction applied at some point,
/// either here or in the detector itself.
#[derive(Debug, Clone, PartialEq)]
pub struct SpOptions {
    pub linear: bool,
    pub tvg_correction: bool,
    pub heave_correct: bool,
    pub return_depth: bool,
    pub resample_interval: ResampleInterval,
    pub selection: PingSelection,
}

impl Default for SpOptions {
    fn default() -> Self {
        SpOptions {
            linear: false,
            tvg_correction: false,
            heave_correct: false,
            return_depth: false,
            resample_interval: ResampleInterval::default(),
            selection: PingSelection::default(),
        }
    }
}

/// Options for the angle queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AngleOptions {
    pub heave_correct: bool,
    pub return_depth: bool,
    pub resample_interval: ResampleInterval,
    pub selection: PingSelection,
}

/// Options for [`ChannelStore::get_bottom`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BottomOptions {
    /// Kept for consistency with the sample queries: the bottom line is
    /// not itself heave corrected, but asking for heave correction implies
    /// a depth reference.
    pub heave_correct: bool,
    pub return_depth: bool,
    pub selection: PingSelection,
}

/// A per-ping line, such as the sounder-detected bottom.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BottomLine {
    pub ping_time: Vec<i64>,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PowerConversion {
    Sv,
    Sp,
}

impl ChannelStore {
    /// Get volume backscattering strength Sv in dB re 1/m (or the linear
    /// coefficient sv when `options.linear` is set).
    pub fn get_sv(
        &self,
        calibration: Option<&Calibration>,
        options: &SvOptions,
    ) -> Result<ProcessedData, EchoError> {
        let (mut grid, indices) = self.sample_data(
            SampleProperty::Power,
            calibration,
            options.resample_interval,
            &options.selection,
        )?;
        grid.data = self.convert_power(
            &grid,
            calibration,
            PowerConversion::Sv,
            options.linear,
            &indices,
            options.tvg_correction,
        )?;
        grid.data_type = if options.linear {
            DataKind::SvLinear
        } else {
            DataKind::Sv
        };
        grid.is_log = !options.linear;
        if options.heave_correct || options.return_depth {
            self.to_depth(&mut grid, calibration, options.heave_correct, &indices)?;
        }
        Ok(grid)
    }

    /// Convenience wrapper for [`Self::get_sv`] that forces linear output.
    pub fn get_sv_linear(
        &self,
        calibration: Option<&Calibration>,
        options: &SvOptions,
    ) -> Result<ProcessedData, EchoError> {
        let mut options = options.clone();
        options.linear = true;
        self.get_sv(calibration, &options)
    }

    /// Get point backscattering strength Sp (target strength) in dB re
    /// 1 m² (or the linear coefficient sp when `options.linear` is set).
    pub fn get_sp(
        &self,
        calibration: Option<&Calibration>,
        options: &SpOptions,
    ) -> Result<ProcessedData, EchoError> {
        let (mut grid, indices) = self.sample_data(
            SampleProperty::Power,
            calibration,
            options.resample_interval,
            &options.selection,
        )?;
        grid.data = self.convert_power(
            &grid,
            calibration,
            PowerConversion::Sp,
            options.linear,
            &indices,
            options.tvg_correction,
        )?;
        grid.data_type = if options.linear {
            DataKind::SpLinear
        } else {
            DataKind::Sp
        };
        grid.is_log = !options.linear;
        if options.heave_correct || options.return_depth {
            self.to_depth(&mut grid, calibration, options.heave_correct, &indices)?;
        }
        Ok(grid)
    }

    /// Convenience wrapper for [`Self::get_sp`] that forces linear output.
    pub fn get_sp_linear(
        &self,
        calibration: Option<&Calibration>,
        options: &SpOptions,
    ) -> Result<ProcessedData, EchoError> {
        let mut options = options.clone();
        options.linear = true;
        self.get_sp(calibration, &options)
    }

    /// Get the unconverted electrical angles as a pair of grids,
    /// (alongship, athwartship).
    pub fn get_electrical_angles(
        &self,
        calibration: Option<&Calibration>,
        options: &AngleOptions,
    ) -> Result<(ProcessedData, ProcessedData), EchoError> {
        let (mut alongship, indices) = self.sample_data(
            SampleProperty::AnglesAlongshipE,
            calibration,
            options.resample_interval,
            &options.selection,
        )?;
        let same_rows = PingSelection::indices(indices.clone());
        let (mut athwartship, _) = self.sample_data(
            SampleProperty::AnglesAthwartshipE,
            calibration,
            options.resample_interval,
            &same_rows,
        )?;
        if options.heave_correct || options.return_depth {
            self.to_depth(&mut alongship, calibration, options.heave_correct, &indices)?;
            self.to_depth(&mut athwartship, calibration, options.heave_correct, &indices)?;
        }
        Ok((alongship, athwartship))
    }

    /// Get the physical (mechanical-degree) angles as a pair of grids,
    /// (alongship, athwartship), by normalizing the electrical angles with
    /// each ping's angle sensitivity and offset.
    pub fn get_physical_angles(
        &self,
        calibration: Option<&Calibration>,
        options: &AngleOptions,
    ) -> Result<(ProcessedData, ProcessedData), EchoError> {
        let (mut alongship, mut athwartship) = self.get_electrical_angles(calibration, options)?;
        let indices = self.get_indices(&options.selection)?;

        let sensitivity_alongship =
            self.calibration_param(calibration, CalParam::AngleSensitivityAlongship, &indices)?;
        let sensitivity_athwartship =
            self.calibration_param(calibration, CalParam::AngleSensitivityAthwartship, &indices)?;
        let offset_alongship =
            self.calibration_param(calibration, CalParam::AngleOffsetAlongship, &indices)?;
        let offset_athwartship =
            self.calibration_param(calibration, CalParam::AngleOffsetAthwartship, &indices)?;

        for (i, mut row) in alongship.data.outer_iter_mut().enumerate() {
            for value in row.iter_mut() {
                *value = *value / sensitivity_alongship[i] - offset_alongship[i];
            }
        }
        for (i, mut row) in athwartship.data.outer_iter_mut().enumerate() {
            for value in row.iter_mut() {
                *value = *value / sensitivity_athwartship[i] - offset_athwartship[i];
            }
        }
        alongship.data_type = DataKind::AnglesAlongship;
        athwartship.data_type = DataKind::AnglesAthwartship;
        Ok((alongship, athwartship))
    }

    /// Get the sounder-detected bottom as a per-ping line.
    ///
    /// The detections were computed with the sound speed in effect at
    /// recording time; when the calibration asks for a different speed each
    /// depth is rescaled by `requested / recorded`. Unless a depth
    /// reference is requested the transducer draft is subtracted, turning
    /// depth into range from the transducer.
    pub fn get_bottom(
        &self,
        calibration: Option<&Calibration>,
        options: &BottomOptions,
    ) -> Result<BottomLine, EchoError> {
        let indices = self.get_indices(&options.selection)?;
        let return_depth = options.return_depth || options.heave_correct;

        let detected = self
            .detected_bottom
            .as_ref()
            .ok_or_else(|| EchoError::UnknownProperty {
                name: "detected_bottom".to_string(),
            })?;

        let recorded_speed = gather(&self.sound_velocity, &indices);
        let requested_speed =
            self.calibration_param(calibration, CalParam::SoundVelocity, &indices)?;
        let transducer_depth =
            self.calibration_param(calibration, CalParam::TransducerDepth, &indices)?;

        let data = indices
            .iter()
            .enumerate()
            .map(|(row, &idx)| {
                let mut depth = detected[idx];
                if !is_close(recorded_speed[row], requested_speed[row]) {
                    depth *= requested_speed[row] / recorded_speed[row];
                }
                if return_depth {
                    depth
                } else {
                    depth - transducer_depth[row]
                }
            })
            .collect();

        Ok(BottomLine {
            ping_time: indices.iter().map(|&i| self.ping_time[i]).collect(),
            data,
        })
    }

    /// Convert a gridded power block to Sv/sv or Sp/sp.
    fn convert_power(
        &self,
        grid: &ProcessedData,
        calibration: Option<&Calibration>,
        conversion: PowerConversion,
        linear: bool,
        indices: &[usize],
        tvg_correction: bool,
    ) -> Result<Array2<f64>, EchoError> {
        let gain = self.calibration_param(calibration, CalParam::Gain, indices)?;
        let transmit_power = self.calibration_param(calibration, CalParam::TransmitPower, indices)?;
        let beam_angle =
            self.calibration_param(calibration, CalParam::EquivalentBeamAngle, indices)?;
        let pulse_length = self.calibration_param(calibration, CalParam::PulseLength, indices)?;
        let absorption =
            self.calibration_param(calibration, CalParam::AbsorptionCoefficient, indices)?;
        let sa_correction = self.calibration_param(calibration, CalParam::SaCorrection, indices)?;

        // The grid's sound speed wins over any recorded value: regridding
        // may already have moved the data onto its range vector.
        let sound_velocity = grid.sound_velocity;
        let wavelength = sound_velocity / grid.frequency;

        let system_gain: Vec<f64> = (0..indices.len())
            .map(|i| {
                let rx = 10f64.powf(gain[i] / 10.0);
                match conversion {
                    PowerConversion::Sv => {
                        let psi = 10f64.powf(beam_angle[i] / 10.0);
                        10.0 * (transmit_power[i] * rx * rx * wavelength * wavelength
                            * sound_velocity
                            * pulse_length[i]
                            * psi
                            / (32.0 * PI * PI))
                            .log10()
                    }
                    PowerConversion::Sp => {
                        10.0 * (transmit_power[i] * rx * rx * wavelength * wavelength
                            / (16.0 * PI * PI))
                            .log10()
                    }
                }
            })
            .collect();

        // The corrected range drives both TVG and absorption.
        let corrected_range: Vec<f64> = if tvg_correction {
            grid.range
                .iter()
                .map(|&r| (r - TVG_CORRECTION * grid.sample_thickness).max(0.0))
                .collect()
        } else {
            grid.range.clone()
        };
        let tvg: Vec<f64> = corrected_range
            .iter()
            .map(|&r| {
                let r = r.max(1.0);
                match conversion {
                    PowerConversion::Sv => 20.0 * r.log10(),
                    PowerConversion::Sp => 40.0 * r.log10(),
                }
            })
            .collect();

        let mut data = grid.data.clone();
        for (i, mut row) in data.outer_iter_mut().enumerate() {
            let two_alpha = 2.0 * absorption[i];
            let row_gain = system_gain[i];
            let sa = match conversion {
                PowerConversion::Sv => 2.0 * sa_correction[i],
                PowerConversion::Sp => 0.0,
            };
            for (k, value) in row.iter_mut().enumerate() {
                *value += tvg[k] + two_alpha * corrected_range[k] - row_gain - sa;
                if linear {
                    *value = 10f64.powf(*value / 10.0);
                }
            }
        }
        Ok(data)
    }

    /// Re-reference a grid's vertical axis to depth below the surface,
    /// optionally heave corrected.
    ///
    /// The smallest per-ping shift moves the range vector; the per-ping
    /// residual is an index translation of the row with NaN filling the
    /// head. Samples pushed past the end of the row are dropped.
    fn to_depth(
        &self,
        grid: &mut ProcessedData,
        calibration: Option<&Calibration>,
        heave_correct: bool,
        indices: &[usize],
    ) -> Result<(), EchoError> {
        let transducer_depth =
            self.calibration_param(calibration, CalParam::TransducerDepth, indices)?;
        let heave = self.calibration_param(calibration, CalParam::Heave, indices)?;

        let shifts: Vec<f64> = (0..indices.len())
            .map(|i| transducer_depth[i] + if heave_correct { heave[i] } else { 0.0 })
            .collect();
        let min_shift = shifts
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(f64::INFINITY, f64::min);
        let min_shift = if min_shift.is_finite() { min_shift } else { 0.0 };

        for r in grid.range.iter_mut() {
            *r += min_shift;
        }
        grid.range_is_depth = true;

        if grid.sample_thickness > 0.0 {
            for (i, mut row) in grid.data.outer_iter_mut().enumerate() {
                let residual = shifts[i] - min_shift;
                if residual.is_nan() {
                    continue;
                }
                let n = (residual / grid.sample_thickness).round() as usize;
                if n == 0 {
                    continue;
                }
                let cols = row.len();
                for k in (n..cols).rev() {
                    row[k] = row[k - n];
                }
                for k in 0..n.min(cols) {
                    row[k] = f64::NAN;
                }
            }
        }
        Ok(())
    }
}
