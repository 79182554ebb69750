//! Regridding of stored sample data into rectangular, range-aligned blocks.
//!
//! A query on a [`ChannelStore`] goes through three steps, each performed
//! only when the data actually needs it: resampling to a common sample
//! interval, shifting to a common sample offset, and re-interpolating onto
//! the range grid of a common sound speed. The result is a
//! [`ProcessedData`] block with a single range vector valid for every ping.
use ndarray::Array2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::calibration::{CalParam, Calibration};
use crate::enums::{DataKind, ResampleInterval, SampleProperty};
use crate::errors::*;
use crate::resample;
use crate::store::{gather_rows, ChannelStore, PingSelection};

/// Options for the plain sample queries ([`ChannelStore::get_power`],
/// [`ChannelStore::get_electrical_angles`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetOptions {
    pub resample_interval: ResampleInterval,
    pub selection: PingSelection,
}

/// A rectangular block of converted sample data with one range vector.
///
/// All rows share `sample_thickness`, `sample_offset` and `sound_velocity`;
/// `data_type` and `is_log` describe the physical quantity in `data`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProcessedData {
    /// The identifiers of the channel(s) the data came from.
    pub channel_id: Vec<String>,
    /// Transmit frequency in Hz (of the first stored ping).
    pub frequency: f64,
    /// Millisecond UTC timestamp per row.
    pub ping_time: Vec<i64>,
    /// The sample data, one row per selected ping.
    pub data: Array2<f64>,
    /// Range in meters from the transducer face per column (or depth,
    /// once a conversion relabeled the vertical axis).
    pub range: Vec<f64>,
    /// Whether `range` is depth below the surface rather than range from
    /// the transducer.
    pub range_is_depth: bool,
    /// The common sound speed in m/s.
    pub sound_velocity: f64,
    /// The vertical size of one sample in meters.
    pub sample_thickness: f64,
    /// The common sample offset all rows were aligned to.
    pub sample_offset: f64,
    /// The physical quantity in `data`.
    pub data_type: DataKind,
    /// Whether `data` is in log (dB) units.
    pub is_log: bool,
}

impl ProcessedData {
    /// The number of pings (rows).
    pub fn n_pings(&self) -> usize {
        self.data.nrows()
    }

    /// The number of samples per ping (columns).
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    #[cfg(feature = "to_json")]
    pub fn to_json(&self) -> Result<String, EchoError> {
        serde_json::to_string(&self).map_err(EchoError::SerdeError)
    }
}

impl std::fmt::Display for ProcessedData {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            fmt,
            "{} data for {:?}: {} pings x {} samples",
            self.data_type,
            self.channel_id,
            self.n_pings(),
            self.n_samples()
        )
    }
}

impl ChannelStore {
    /// Get the stored power as a rectangular grid.
    ///
    /// All pings are resampled to one sample thickness, aligned to one
    /// sample offset and regridded to one sound speed, so the rows of the
    /// result are directly comparable. Calls return much faster when the
    /// raw data already share those three parameters.
    pub fn get_power(
        &self,
        calibration: Option<&Calibration>,
        options: &GetOptions,
    ) -> Result<ProcessedData, EchoError> {
        let (grid, _indices) = self.sample_data(
            SampleProperty::Power,
            calibration,
            options.resample_interval,
            &options.selection,
        )?;
        Ok(grid)
    }

    /// Build the rectangular grid for one stored sample property, also
    /// returning the selected row indices for further per-ping resolution.
    pub fn sample_data(
        &self,
        property: SampleProperty,
        calibration: Option<&Calibration>,
        resample_interval: ResampleInterval,
        selection: &PingSelection,
    ) -> Result<(ProcessedData, Vec<usize>), EchoError> {
        let indices = self.get_indices(selection)?;

        let matrix = match property {
            SampleProperty::Power => self.power.as_ref(),
            SampleProperty::AnglesAlongshipE => self.angles_alongship_e.as_ref(),
            SampleProperty::AnglesAthwartshipE => self.angles_athwartship_e.as_ref(),
        }
        .ok_or_else(|| EchoError::UnknownProperty {
            name: property.name().to_string(),
        })?;

        let data_type = match property {
            SampleProperty::Power => DataKind::Power,
            SampleProperty::AnglesAlongshipE => DataKind::AnglesAlongshipE,
            SampleProperty::AnglesAthwartshipE => DataKind::AnglesAthwartshipE,
        };
        let is_log = property == SampleProperty::Power;

        if indices.is_empty() {
            let grid = ProcessedData {
                channel_id: self.channel_id.clone(),
                frequency: self.frequency.first().copied().unwrap_or(f64::NAN),
                ping_time: Vec::new(),
                data: Array2::from_elem((0, 0), f64::NAN),
                range: Vec::new(),
                range_is_depth: false,
                sound_velocity: f64::NAN,
                sample_thickness: f64::NAN,
                sample_offset: 0.0,
                data_type,
                is_log,
            };
            return Ok((grid, indices));
        }

        let intervals = self.calibration_param(calibration, CalParam::SampleInterval, &indices)?;
        let sound_velocities =
            self.calibration_param(calibration, CalParam::SoundVelocity, &indices)?;
        let offsets = self.calibration_param(calibration, CalParam::SampleOffset, &indices)?;

        let unique_offsets = unique_non_nan(&offsets);
        let min_offset = unique_offsets.first().copied().unwrap_or(0.0);
        let unique_intervals = unique_non_nan(&intervals);

        let gathered = gather_rows(matrix, &indices);

        // Step one and two: a common sample interval and a common offset.
        let (mut output, sample_interval) = if unique_intervals.len() > 1 {
            resample::vertical_resample(
                &gathered,
                &intervals,
                &unique_intervals,
                resample_interval,
                &offsets,
                min_offset,
                property == SampleProperty::Power,
            )?
        } else {
            let sample_interval = unique_intervals.first().copied().unwrap_or(f64::NAN);
            if unique_offsets.len() > 1 {
                (
                    resample::vertical_shift(&gathered, &offsets, &unique_offsets, min_offset),
                    sample_interval,
                )
            } else {
                (gathered, sample_interval)
            }
        };

        // Step three: a common sound speed. With mixed speeds the speed
        // carried by the most pings wins (ties to the smallest), and every
        // other row is interpolated onto its range grid.
        let unique_speeds = unique_non_nan(&sound_velocities);
        let sound_velocity = if unique_speeds.len() > 1 {
            let mut best = unique_speeds[0];
            let mut best_count = 0usize;
            for &speed in &unique_speeds {
                let count = sound_velocities.iter().filter(|&&v| v == speed).count();
                if count > best_count {
                    best_count = count;
                    best = speed;
                }
            }
            let columns = output.ncols();
            let range = range_vector(columns, sample_interval, best, min_offset);
            for (row, &speed) in sound_velocities.iter().enumerate() {
                if speed.is_nan() || speed == best {
                    continue;
                }
                let row_range = range_vector(columns, sample_interval, speed, min_offset);
                let values: Vec<f64> = output.row(row).to_vec();
                let interpolated = resample::interp_row(&range, &row_range, &values);
                for (col, value) in interpolated.into_iter().enumerate() {
                    output[[row, col]] = value;
                }
            }
            best
        } else {
            unique_speeds.first().copied().unwrap_or(f64::NAN)
        };

        let range = range_vector(output.ncols(), sample_interval, sound_velocity, min_offset);
        let sample_thickness = sample_interval * sound_velocity / 2.0;

        let grid = ProcessedData {
            channel_id: self.channel_id.clone(),
            frequency: self.frequency.first().copied().unwrap_or(f64::NAN),
            ping_time: indices.iter().map(|&i| self.ping_time[i]).collect(),
            data: output,
            range,
            range_is_depth: false,
            sound_velocity,
            sample_thickness,
            sample_offset: min_offset,
            data_type,
            is_log,
        };
        Ok((grid, indices))
    }
}

/// The non-corrected range vector for a sample grid.
pub(crate) fn range_vector(
    num_samples: usize,
    sample_interval: f64,
    sound_speed: f64,
    sample_offset: f64,
) -> Vec<f64> {
    let thickness = sample_interval * sound_speed / 2.0;
    (0..num_samples)
        .map(|k| (k as f64 + sample_offset) * thickness)
        .collect()
}

/// The distinct non-NaN values of a vector, ascending.
pub(crate) fn unique_non_nan(values: &[f64]) -> Vec<f64> {
    let mut unique: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    unique.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    unique.dedup();
    unique
}
