//! Vertical operations on the sample axis.
//!
//! Pings recorded with different sampling intervals, sample offsets or
//! sound speeds cannot be stacked directly. The functions here bring every
//! row of a gathered sample block onto one vertical grid: integer
//! up/down-sampling to a common interval, index shifts to a common offset,
//! and linear re-interpolation onto the range vector of a common sound
//! speed. Power rows are pooled in the linear domain so that downsampling
//! conserves energy; angle rows are pooled as plain means.
use ndarray::Array2;

use crate::datagram_structs::is_close;
use crate::enums::ResampleInterval;
use crate::errors::*;

/// Tolerance for deciding that one interval is an integer multiple of
/// another. Recorded intervals are quantized, so this only has to absorb
/// float noise.
const RATIO_EPS: f64 = 1e-6;

/// The integer ratio `a / b`, when there is one.
fn integer_ratio(a: f64, b: f64) -> Option<usize> {
    let ratio = a / b;
    let rounded = ratio.round();
    if rounded >= 1.0 && (ratio - rounded).abs() <= RATIO_EPS * rounded {
        Some(rounded as usize)
    } else {
        None
    }
}

/// Pick the target interval and check it is an integer ratio of every
/// interval present.
pub(crate) fn resolve_target_interval(
    unique_intervals: &[f64],
    target: ResampleInterval,
) -> Result<f64, EchoError> {
    let target = match target {
        ResampleInterval::Shortest => unique_intervals[0],
        ResampleInterval::Longest => unique_intervals[unique_intervals.len() - 1],
        ResampleInterval::Rate(rate) => rate,
    };
    for &interval in unique_intervals {
        let ok = if target >= interval {
            integer_ratio(target, interval).is_some()
        } else {
            integer_ratio(interval, target).is_some()
        };
        if !ok {
            return Err(EchoError::InvalidResampleRate {
                requested: target,
                interval,
            });
        }
    }
    Ok(target)
}

/// Resample every row to a common sample interval, applying each row's
/// sample-offset shift along the way so all rows start at the minimum
/// offset. Returns the resampled block and the interval it now has.
///
/// Downsampling by an integer factor pools adjacent samples (through the
/// linear domain for power, as a plain mean otherwise) and upsampling
/// repeats each sample, so the linear-domain sample sum scales exactly
/// with the resample ratio.
pub fn vertical_resample(
    data: &Array2<f64>,
    intervals: &[f64],
    unique_intervals: &[f64],
    target: ResampleInterval,
    offsets: &[f64],
    min_offset: f64,
    is_power: bool,
) -> Result<(Array2<f64>, f64), EchoError> {
    let target = resolve_target_interval(unique_intervals, target)?;

    let mut rows: Vec<(usize, Vec<f64>)> = Vec::with_capacity(data.nrows());
    let mut capacity = 0usize;
    for (i, row) in data.outer_iter().enumerate() {
        let interval = intervals[i];
        if interval.is_nan() {
            rows.push((0, Vec::new()));
            continue;
        }
        let samples: Vec<f64> = row.to_vec();
        let resampled = if is_close(interval, target) {
            samples
        } else if target > interval {
            let factor = integer_ratio(target, interval).unwrap_or(1);
            pool(&samples, factor, is_power)
        } else {
            let factor = integer_ratio(interval, target).unwrap_or(1);
            repeat(&samples, factor)
        };
        let offset = if offsets[i].is_nan() {
            min_offset
        } else {
            offsets[i]
        };
        let shift = ((offset - min_offset) * interval / target).round().max(0.0) as usize;
        capacity = capacity.max(shift + resampled.len());
        rows.push((shift, resampled));
    }

    let mut out = Array2::from_elem((data.nrows(), capacity), f64::NAN);
    for (i, (shift, resampled)) in rows.into_iter().enumerate() {
        let mut target_row = out.row_mut(i);
        for (k, value) in resampled.into_iter().enumerate() {
            target_row[shift + k] = value;
        }
    }
    Ok((out, target))
}

/// Shift every row down so all rows start at the minimum sample offset.
/// The output gains as many columns as the largest shift requires.
pub fn vertical_shift(
    data: &Array2<f64>,
    offsets: &[f64],
    unique_offsets: &[f64],
    min_offset: f64,
) -> Array2<f64> {
    let max_offset = unique_offsets
        .iter()
        .copied()
        .fold(min_offset, f64::max);
    let grow = (max_offset - min_offset).round().max(0.0) as usize;
    let cols = data.ncols() + grow;

    let mut out = Array2::from_elem((data.nrows(), cols), f64::NAN);
    for (i, row) in data.outer_iter().enumerate() {
        let offset = if offsets[i].is_nan() {
            min_offset
        } else {
            offsets[i]
        };
        let shift = (offset - min_offset).round().max(0.0) as usize;
        let mut target_row = out.row_mut(i);
        for (k, &value) in row.iter().enumerate() {
            target_row[shift + k] = value;
        }
    }
    out
}

/// Pool adjacent samples by an integer factor. A trailing partial group is
/// pooled over what remains.
fn pool(samples: &[f64], factor: usize, is_power: bool) -> Vec<f64> {
    let factor = factor.max(1);
    samples
        .chunks(factor)
        .map(|group| {
            if is_power {
                let linear: f64 =
                    group.iter().map(|&v| 10f64.powf(v / 10.0)).sum::<f64>() / group.len() as f64;
                10.0 * linear.log10()
            } else {
                group.iter().sum::<f64>() / group.len() as f64
            }
        })
        .collect()
}

/// Expand samples by an integer factor, repeating each value.
fn repeat(samples: &[f64], factor: usize) -> Vec<f64> {
    let factor = factor.max(1);
    let mut out = Vec::with_capacity(samples.len() * factor);
    for &value in samples {
        for _ in 0..factor {
            out.push(value);
        }
    }
    out
}

/// Linear interpolation of one row onto a new range vector, with
/// end-value clamping outside the source range.
pub fn interp_row(target_x: &[f64], source_x: &[f64], source_y: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(target_x.len());
    if source_x.is_empty() {
        out.resize(target_x.len(), f64::NAN);
        return out;
    }
    let last = source_x.len() - 1;
    for &x in target_x {
        if x <= source_x[0] {
            out.push(source_y[0]);
        } else if x >= source_x[last] {
            out.push(source_y[last]);
        } else {
            let j = source_x.partition_point(|&v| v <= x);
            let (x0, x1) = (source_x[j - 1], source_x[j]);
            let (y0, y1) = (source_y[j - 1], source_y[j]);
            let w = (x - x0) / (x1 - x0);
            out.push(y0 + w * (y1 - y0));
        }
    }
    out
}
