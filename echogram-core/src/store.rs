//! The per-channel sample store.
//!
//! A [`ChannelStore`] holds every ping read for one channel as a pair of
//! row-major matrices (power in dB, electrical angles) plus per-ping vectors
//! for the recording parameters. The recording parameters may change from
//! ping to ping, so rows are NaN-padded to a common sample capacity; the
//! grid and conversion methods later turn this jagged-but-rectangular block
//! into a regular grid.
//!
//! NOTE: power is stored in log form. Code that manipulates power values
//! directly must keep them in log form.
//!
//! Two growth regimes exist. In the default regime the ping axis grows in
//! `chunk_width` increments and the sample axis grows to fit the largest
//! ping seen. In the rolling regime the arrays are allocated up front with a
//! fixed shape and, once full, the oldest ping is dropped for each new one;
//! this supports streaming sources with bounded memory.
use log::debug;
use ndarray::{s, Array2};

use crate::calibration::{CalParam, CalValue, Calibration};
use crate::datagram_structs::{ChannelMetadata, MetadataHandle, SampleDatagram};
use crate::errors::*;
use crate::sample_codec;
use crate::timestamp::NOT_A_TIME;

/// Storage behaviour options for a new [`ChannelStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StorageOptions {
    /// Ping capacity of a rolling store, and the initial capacity hint
    /// otherwise.
    pub n_pings: usize,
    /// Sample capacity of a rolling store.
    pub n_samples: usize,
    /// Fixed-size rolling storage instead of growing storage.
    pub rolling: bool,
    /// How many ping slots to add per growth step of a non-rolling store.
    pub chunk_width: usize,
    pub store_power: bool,
    pub store_angles: bool,
    /// Cap on the sample axis; samples beyond it are dropped on append.
    pub max_sample_number: Option<usize>,
}

impl Default for StorageOptions {
    fn default() -> Self {
        StorageOptions {
            n_pings: 100,
            n_samples: 1000,
            rolling: false,
            chunk_width: 500,
            store_power: true,
            store_angles: true,
            max_sample_number: None,
        }
    }
}

/// Row selection for the query methods: either explicit row indices, or
/// bounds on ping time and 1-based ping number within the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingSelection {
    /// Explicit row indices, used verbatim and in the given order.
    pub return_indices: Option<Vec<usize>>,
    /// Inclusive millisecond UTC lower bound on ping time.
    pub start_time: Option<i64>,
    /// Inclusive upper bound on ping time.
    pub end_time: Option<i64>,
    /// Inclusive 1-based lower bound on the row number.
    pub start_ping: Option<usize>,
    /// Inclusive upper bound on the row number.
    pub end_ping: Option<usize>,
}

impl PingSelection {
    /// Select every stored ping.
    pub fn all() -> Self {
        Self::default()
    }

    /// Select explicit rows in the given order.
    pub fn indices(indices: Vec<usize>) -> Self {
        PingSelection {
            return_indices: Some(indices),
            ..Default::default()
        }
    }
}

/// A single channel's sample data and per-ping recording parameters.
pub struct ChannelStore {
    pub(crate) channel_id: Vec<String>,
    pub(crate) store_power: bool,
    pub(crate) store_angles: bool,
    pub(crate) rolling: bool,
    pub(crate) chunk_width: usize,
    pub(crate) max_sample_number: Option<usize>,
    /// The number of pings logically stored; the physical arrays may be
    /// longer due to chunked allocation.
    pub(crate) n_pings: usize,
    /// Sample capacity of the matrices.
    pub(crate) n_samples: usize,
    allocated: bool,
    /// The metadata installed for the file currently being read. Must be
    /// updated before appending pings from a new file.
    pub(crate) current_metadata: Option<MetadataHandle>,

    pub(crate) ping_time: Vec<i64>,
    pub(crate) channel_metadata: Vec<Option<MetadataHandle>>,
    pub(crate) transducer_depth: Vec<f64>,
    pub(crate) frequency: Vec<f64>,
    pub(crate) transmit_power: Vec<f64>,
    pub(crate) pulse_length: Vec<f64>,
    pub(crate) bandwidth: Vec<f64>,
    pub(crate) sample_interval: Vec<f64>,
    pub(crate) sound_velocity: Vec<f64>,
    pub(crate) absorption_coefficient: Vec<f64>,
    pub(crate) heave: Vec<f64>,
    pub(crate) pitch: Vec<f64>,
    pub(crate) roll: Vec<f64>,
    pub(crate) temperature: Vec<f64>,
    pub(crate) heading: Vec<f64>,
    pub(crate) transmit_mode: Vec<f64>,
    pub(crate) sample_offset: Vec<usize>,
    pub(crate) sample_count: Vec<usize>,

    pub(crate) power: Option<Array2<f64>>,
    pub(crate) angles_alongship_e: Option<Array2<f64>>,
    pub(crate) angles_athwartship_e: Option<Array2<f64>>,

    /// Sounder-detected bottom depth per ping, created on the first BOT or
    /// DEP datagram. Depths are referenced to the recorded sound speed.
    pub(crate) detected_bottom: Option<Vec<f64>>,
    /// Bottom reflectivity per ping, created on the first DEP datagram.
    pub(crate) bottom_reflectivity: Option<Vec<f64>>,
}

impl ChannelStore {
    /// Create a new, empty store for one channel.
    ///
    /// A rolling store allocates its fixed-shape arrays immediately so a
    /// consumer can display them right away; a growing store defers
    /// allocation until the first ping arrives, when the sample capacity is
    /// known.
    pub fn new(channel_id: &str, options: StorageOptions) -> Self {
        let mut store = ChannelStore {
            channel_id: vec![channel_id.to_string()],
            store_power: options.store_power,
            store_angles: options.store_angles,
            rolling: options.rolling,
            chunk_width: options.chunk_width,
            max_sample_number: options.max_sample_number,
            n_pings: 0,
            n_samples: 0,
            allocated: false,
            current_metadata: None,
            ping_time: Vec::new(),
            channel_metadata: Vec::new(),
            transducer_depth: Vec::new(),
            frequency: Vec::new(),
            transmit_power: Vec::new(),
            pulse_length: Vec::new(),
            bandwidth: Vec::new(),
            sample_interval: Vec::new(),
            sound_velocity: Vec::new(),
            absorption_coefficient: Vec::new(),
            heave: Vec::new(),
            pitch: Vec::new(),
            roll: Vec::new(),
            temperature: Vec::new(),
            heading: Vec::new(),
            transmit_mode: Vec::new(),
            sample_offset: Vec::new(),
            sample_count: Vec::new(),
            power: None,
            angles_alongship_e: None,
            angles_athwartship_e: None,
            detected_bottom: None,
            bottom_reflectivity: None,
        };
        if options.rolling {
            let n_samples = match options.max_sample_number {
                Some(cap) => cap.min(options.n_samples),
                None => options.n_samples,
            };
            store.create_arrays(options.n_pings, n_samples);
        }
        store
    }

    /// The identifiers of the channel(s) stored in this object.
    pub fn channel_id(&self) -> &[String] {
        &self.channel_id
    }

    /// The number of pings logically stored.
    pub fn n_pings(&self) -> usize {
        self.n_pings
    }

    /// The sample capacity of the matrices.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn store_power(&self) -> bool {
        self.store_power
    }

    pub fn store_angles(&self) -> bool {
        self.store_angles
    }

    pub fn rolling(&self) -> bool {
        self.rolling
    }

    /// Ping timestamps (millisecond UTC) for the stored pings.
    pub fn ping_time(&self) -> &[i64] {
        &self.ping_time[..self.n_pings]
    }

    /// Transmit frequencies per ping in Hz.
    pub fn frequency(&self) -> &[f64] {
        &self.frequency[..self.n_pings]
    }

    /// Recorded sound speed per ping in m/s.
    pub fn sound_velocity(&self) -> &[f64] {
        &self.sound_velocity[..self.n_pings]
    }

    /// Recorded sample interval per ping in seconds.
    pub fn sample_interval(&self) -> &[f64] {
        &self.sample_interval[..self.n_pings]
    }

    /// The number of valid samples per ping.
    pub fn sample_count(&self) -> &[usize] {
        &self.sample_count[..self.n_pings]
    }

    /// The sample offset (blanked leading samples) per ping.
    pub fn sample_offset(&self) -> &[usize] {
        &self.sample_offset[..self.n_pings]
    }

    /// The configuration metadata referenced by each ping.
    pub fn channel_metadata(&self) -> &[Option<MetadataHandle>] {
        &self.channel_metadata[..self.n_pings]
    }

    /// Sounder-detected bottom depths, present once a BOT or DEP datagram
    /// has been ingested.
    pub fn detected_bottom(&self) -> Option<&[f64]> {
        self.detected_bottom.as_ref().map(|v| &v[..self.n_pings])
    }

    /// Bottom reflectivity, present once a DEP datagram has been ingested.
    pub fn bottom_reflectivity(&self) -> Option<&[f64]> {
        self.bottom_reflectivity.as_ref().map(|v| &v[..self.n_pings])
    }

    /// The stored power matrix in dB, rows beyond `n_pings` excluded.
    pub fn power(&self) -> Option<ndarray::ArrayView2<'_, f64>> {
        self.power.as_ref().map(|a| a.slice(s![..self.n_pings, ..]))
    }

    /// The stored alongship electrical angle matrix.
    pub fn angles_alongship_e(&self) -> Option<ndarray::ArrayView2<'_, f64>> {
        self.angles_alongship_e
            .as_ref()
            .map(|a| a.slice(s![..self.n_pings, ..]))
    }

    /// The stored athwartship electrical angle matrix.
    pub fn angles_athwartship_e(&self) -> Option<ndarray::ArrayView2<'_, f64>> {
        self.angles_athwartship_e
            .as_ref()
            .map(|a| a.slice(s![..self.n_pings, ..]))
    }

    /// Install the metadata that subsequent [`Self::append_ping`] calls
    /// reference. Must be called when a new file's header has been read.
    pub fn set_current_metadata(&mut self, metadata: MetadataHandle) {
        self.current_metadata = Some(metadata);
    }

    pub fn current_metadata(&self) -> Option<&MetadataHandle> {
        self.current_metadata.as_ref()
    }

    /// Append one ping's worth of data.
    ///
    /// This is the only way sample data enters a store. It manages the
    /// array sizes: a growing store extends the ping axis by `chunk_width`
    /// slots when full and widens the sample axis when a ping carries more
    /// samples than any before it; a rolling store instead drops its oldest
    /// ping once full and truncates oversized pings to the fixed sample
    /// capacity.
    ///
    /// When `start_sample`/`end_sample` give a sub-sample window, only that
    /// (inclusive) slice of the incoming samples is kept and the ping's
    /// `sample_offset` records where it started.
    pub fn append_ping(
        &mut self,
        datagram: &SampleDatagram,
        start_sample: Option<usize>,
        end_sample: Option<usize>,
    ) {
        let mut power_block: &[i16] = datagram.power.as_deref().unwrap_or(&[]);
        let mut angle_block: &[u16] = datagram.angle.as_deref().unwrap_or(&[]);

        // Deferred allocation: the first ping fixes the initial sample
        // capacity of a growing store.
        if !self.allocated && !self.rolling {
            let n_samples = match self.max_sample_number {
                Some(cap) => cap,
                None => power_block.len().max(angle_block.len()),
            };
            self.create_arrays(self.chunk_width, n_samples);
        }

        if let Some(cap) = self.max_sample_number {
            if power_block.len() > cap {
                debug!(
                    "truncating ping at {} from {} to {} power samples",
                    datagram.timestamp,
                    power_block.len(),
                    cap
                );
                power_block = &power_block[..cap];
            }
            if angle_block.len() > cap {
                angle_block = &angle_block[..cap];
            }
        }
        let max_new_samples = power_block.len().max(angle_block.len());

        let this_ping = if self.rolling {
            if self.n_pings == self.ping_capacity() {
                self.roll_arrays();
                self.n_pings - 1
            } else {
                self.n_pings += 1;
                self.n_pings - 1
            }
        } else {
            let mut ping_dims = self.ping_capacity();
            let mut sample_dims = self.n_samples;
            if self.n_pings == ping_dims {
                ping_dims += self.chunk_width;
            }
            if max_new_samples > sample_dims {
                sample_dims = max_new_samples;
            }
            if ping_dims != self.ping_capacity() || sample_dims != self.n_samples {
                self.resize_arrays(ping_dims, sample_dims);
            }
            self.n_pings += 1;
            self.n_pings - 1
        };

        self.channel_metadata[this_ping] = self.current_metadata.clone();

        self.ping_time[this_ping] = datagram.timestamp;
        self.transducer_depth[this_ping] = datagram.transducer_depth;
        self.frequency[this_ping] = datagram.frequency;
        self.transmit_power[this_ping] = datagram.transmit_power;
        self.pulse_length[this_ping] = datagram.pulse_length;
        self.bandwidth[this_ping] = datagram.bandwidth;
        self.sample_interval[this_ping] = datagram.sample_interval;
        self.sound_velocity[this_ping] = datagram.sound_velocity;
        self.absorption_coefficient[this_ping] = datagram.absorption_coefficient;
        self.heave[this_ping] = datagram.heave;
        self.pitch[this_ping] = datagram.pitch;
        self.roll[this_ping] = datagram.roll;
        self.temperature[this_ping] = datagram.temperature;
        self.heading[this_ping] = datagram.heading;
        self.transmit_mode[this_ping] = f64::from(datagram.transmit_mode);

        // Sub-sample window bookkeeping. The window is inclusive of
        // end_sample and falls back to the recorded count.
        let (offset, count) = match (start_sample, end_sample) {
            (Some(start), Some(end)) => (start, end.saturating_sub(start) + 1),
            (Some(start), None) => (start, datagram.count.saturating_sub(start)),
            (None, Some(end)) => (0, end + 1),
            (None, None) => (0, datagram.count),
        };
        self.sample_offset[this_ping] = offset;
        self.sample_count[this_ping] = count.min(self.n_samples);

        if datagram.mode.has_power() && self.store_power {
            let slice = window(power_block, offset, count);
            let decoded = sample_codec::power_index_to_db(slice);
            if let Some(power) = self.power.as_mut() {
                write_row(power, this_ping, &decoded);
            }
        }

        if datagram.mode.has_angles() && self.store_angles {
            let slice = window(angle_block, offset, count);
            let (alongship, athwartship) = sample_codec::unpack_angles(slice);
            if let Some(angles) = self.angles_alongship_e.as_mut() {
                write_row(angles, this_ping, &alongship);
            }
            if let Some(angles) = self.angles_athwartship_e.as_mut() {
                write_row(angles, this_ping, &athwartship);
            }
        }
    }

    /// Record a sounder-detected bottom depth for the ping(s) recorded at
    /// `detection_time`.
    ///
    /// The corresponding ping must already have been appended: a detection
    /// whose timestamp matches no stored ping time is dropped. When reading
    /// `.out` files the reflectivity value can be passed along.
    pub fn append_bottom(
        &mut self,
        detection_time: i64,
        detection_depth: f64,
        reflectivity: Option<f64>,
    ) {
        let capacity = self.ping_capacity();
        if self.detected_bottom.is_none() {
            self.detected_bottom = Some(vec![f64::NAN; capacity]);
        }
        if reflectivity.is_some() && self.bottom_reflectivity.is_none() {
            self.bottom_reflectivity = Some(vec![f64::NAN; capacity]);
        }

        let mut matched = false;
        for idx in 0..self.n_pings {
            if self.ping_time[idx] != detection_time {
                continue;
            }
            matched = true;
            if let Some(bottom) = self.detected_bottom.as_mut() {
                bottom[idx] = detection_depth;
            }
            if let (Some(r), Some(refl)) = (reflectivity, self.bottom_reflectivity.as_mut()) {
                refl[idx] = r;
            }
        }
        if !matched {
            debug!(
                "dropping bottom detection at {} with no matching ping",
                detection_time
            );
        }
    }

    /// Shrink the physical ping axis to the number of pings actually stored.
    pub fn trim(&mut self) {
        let n = self.n_pings;
        self.ping_time.truncate(n);
        self.channel_metadata.truncate(n);
        self.transducer_depth.truncate(n);
        self.frequency.truncate(n);
        self.transmit_power.truncate(n);
        self.pulse_length.truncate(n);
        self.bandwidth.truncate(n);
        self.sample_interval.truncate(n);
        self.sound_velocity.truncate(n);
        self.absorption_coefficient.truncate(n);
        self.heave.truncate(n);
        self.pitch.truncate(n);
        self.roll.truncate(n);
        self.temperature.truncate(n);
        self.heading.truncate(n);
        self.transmit_mode.truncate(n);
        self.sample_offset.truncate(n);
        self.sample_count.truncate(n);
        for matrix in [
            self.power.as_mut(),
            self.angles_alongship_e.as_mut(),
            self.angles_athwartship_e.as_mut(),
        ]
        .iter_mut()
        .flatten()
        {
            **matrix = matrix.slice(s![..n, ..]).to_owned();
        }
        if let Some(bottom) = self.detected_bottom.as_mut() {
            bottom.truncate(n);
        }
        if let Some(refl) = self.bottom_reflectivity.as_mut() {
            refl.truncate(n);
        }
    }

    /// Return a store with the same shape characteristics but `n_pings`
    /// rows of nothing but NaN (and not-a-time timestamps).
    pub fn empty_like(&self, n_pings: usize) -> ChannelStore {
        let mut empty = ChannelStore::new(
            &self.channel_id[0],
            StorageOptions {
                n_pings,
                n_samples: self.n_samples,
                rolling: false,
                chunk_width: n_pings.max(1),
                store_power: self.store_power,
                store_angles: self.store_angles,
                max_sample_number: self.max_sample_number,
            },
        );
        empty.channel_id = self.channel_id.clone();
        empty.create_arrays(n_pings, self.n_samples);
        empty.n_pings = n_pings;
        if self.detected_bottom.is_some() {
            empty.detected_bottom = Some(vec![f64::NAN; n_pings]);
        }
        if self.bottom_reflectivity.is_some() {
            empty.bottom_reflectivity = Some(vec![f64::NAN; n_pings]);
        }
        empty
    }

    /// Splice a shape-compatible store into this one ahead of row `at`.
    ///
    /// Both stores must store the same sample kinds; the sample axes are
    /// widened to the larger of the two capacities. Matching of ping times
    /// and offsets across the seam is the caller's concern, as is keeping
    /// any intended time ordering.
    pub fn insert(&mut self, other: &ChannelStore, at: usize) -> Result<(), EchoError> {
        if self.rolling {
            return Err(EchoError::IncompatibleStores {
                msg: "cannot splice into a rolling store".to_string(),
            });
        }
        if self.store_power != other.store_power || self.store_angles != other.store_angles {
            return Err(EchoError::IncompatibleStores {
                msg: "stores do not hold the same sample kinds".to_string(),
            });
        }
        if at > self.n_pings {
            return Err(EchoError::IndexOutOfRange {
                idx: at,
                n_pings: self.n_pings,
            });
        }

        let n_samples = self.n_samples.max(other.n_samples);
        let total = self.n_pings + other.n_pings;

        splice(&mut self.ping_time, &other.ping_time, self.n_pings, other.n_pings, at);
        splice(
            &mut self.channel_metadata,
            &other.channel_metadata,
            self.n_pings,
            other.n_pings,
            at,
        );
        splice(&mut self.transducer_depth, &other.transducer_depth, self.n_pings, other.n_pings, at);
        splice(&mut self.frequency, &other.frequency, self.n_pings, other.n_pings, at);
        splice(&mut self.transmit_power, &other.transmit_power, self.n_pings, other.n_pings, at);
        splice(&mut self.pulse_length, &other.pulse_length, self.n_pings, other.n_pings, at);
        splice(&mut self.bandwidth, &other.bandwidth, self.n_pings, other.n_pings, at);
        splice(&mut self.sample_interval, &other.sample_interval, self.n_pings, other.n_pings, at);
        splice(&mut self.sound_velocity, &other.sound_velocity, self.n_pings, other.n_pings, at);
        splice(
            &mut self.absorption_coefficient,
            &other.absorption_coefficient,
            self.n_pings,
            other.n_pings,
            at,
        );
        splice(&mut self.heave, &other.heave, self.n_pings, other.n_pings, at);
        splice(&mut self.pitch, &other.pitch, self.n_pings, other.n_pings, at);
        splice(&mut self.roll, &other.roll, self.n_pings, other.n_pings, at);
        splice(&mut self.temperature, &other.temperature, self.n_pings, other.n_pings, at);
        splice(&mut self.heading, &other.heading, self.n_pings, other.n_pings, at);
        splice(&mut self.transmit_mode, &other.transmit_mode, self.n_pings, other.n_pings, at);
        splice(&mut self.sample_offset, &other.sample_offset, self.n_pings, other.n_pings, at);
        splice(&mut self.sample_count, &other.sample_count, self.n_pings, other.n_pings, at);

        self.power = splice_matrix(
            self.power.as_ref(),
            other.power.as_ref(),
            self.n_pings,
            other.n_pings,
            at,
            n_samples,
        );
        self.angles_alongship_e = splice_matrix(
            self.angles_alongship_e.as_ref(),
            other.angles_alongship_e.as_ref(),
            self.n_pings,
            other.n_pings,
            at,
            n_samples,
        );
        self.angles_athwartship_e = splice_matrix(
            self.angles_athwartship_e.as_ref(),
            other.angles_athwartship_e.as_ref(),
            self.n_pings,
            other.n_pings,
            at,
            n_samples,
        );

        if self.detected_bottom.is_some() || other.detected_bottom.is_some() {
            let mut ours = self
                .detected_bottom
                .take()
                .map(|v| v[..self.n_pings].to_vec())
                .unwrap_or_else(|| vec![f64::NAN; self.n_pings]);
            let theirs = other
                .detected_bottom
                .as_ref()
                .map(|v| v[..other.n_pings].to_vec())
                .unwrap_or_else(|| vec![f64::NAN; other.n_pings]);
            splice(&mut ours, &theirs, self.n_pings, other.n_pings, at);
            self.detected_bottom = Some(ours);
        }
        if self.bottom_reflectivity.is_some() || other.bottom_reflectivity.is_some() {
            let mut ours = self
                .bottom_reflectivity
                .take()
                .map(|v| v[..self.n_pings].to_vec())
                .unwrap_or_else(|| vec![f64::NAN; self.n_pings]);
            let theirs = other
                .bottom_reflectivity
                .as_ref()
                .map(|v| v[..other.n_pings].to_vec())
                .unwrap_or_else(|| vec![f64::NAN; other.n_pings]);
            splice(&mut ours, &theirs, self.n_pings, other.n_pings, at);
            self.bottom_reflectivity = Some(ours);
        }

        self.n_pings = total;
        self.n_samples = n_samples;
        self.allocated = true;
        Ok(())
    }

    /// Splice `n_pings` rows of NaN into this store ahead of row `at`.
    pub fn insert_empty(&mut self, n_pings: usize, at: usize) -> Result<(), EchoError> {
        let gap = self.empty_like(n_pings);
        self.insert(&gap, at)
    }

    /// Resolve a [`PingSelection`] to row indices.
    ///
    /// Explicit indices are validated against `n_pings` and returned in
    /// their given order; otherwise rows are filtered by the time and
    /// ping-number bounds in storage order.
    pub fn get_indices(&self, selection: &PingSelection) -> Result<Vec<usize>, EchoError> {
        if let Some(indices) = &selection.return_indices {
            for &idx in indices {
                if idx >= self.n_pings {
                    return Err(EchoError::IndexOutOfRange {
                        idx,
                        n_pings: self.n_pings,
                    });
                }
            }
            return Ok(indices.clone());
        }
        let mut indices = Vec::new();
        for idx in 0..self.n_pings {
            let time = self.ping_time[idx];
            if let Some(start) = selection.start_time {
                if time < start {
                    continue;
                }
            }
            if let Some(end) = selection.end_time {
                if time > end {
                    continue;
                }
            }
            let number = idx + 1;
            if let Some(start) = selection.start_ping {
                if number < start {
                    continue;
                }
            }
            if let Some(end) = selection.end_ping {
                if number > end {
                    continue;
                }
            }
            indices.push(idx);
        }
        Ok(indices)
    }

    /// Resolve one calibration parameter to a vector with one value per
    /// requested ping.
    ///
    /// A value set in `calibration` wins; it may be a scalar (broadcast), a
    /// vector of length 1 (broadcast), of length `n_pings` (gathered by the
    /// indices) or of the indices' length (used as given); anything else is
    /// an [`EchoError::InvalidCalibrationShape`]. Without an override the
    /// parameter comes from the per-ping vectors, or failing that from the
    /// per-file [`ChannelMetadata`] each ping references; pings without
    /// metadata yield NaN. `sa_correction` is special: it is calibrated per
    /// pulse length, so it is looked up in the metadata tables using each
    /// ping's pulse length.
    pub fn calibration_param(
        &self,
        calibration: Option<&Calibration>,
        param: CalParam,
        indices: &[usize],
    ) -> Result<Vec<f64>, EchoError> {
        for &idx in indices {
            if idx >= self.n_pings {
                return Err(EchoError::IndexOutOfRange {
                    idx,
                    n_pings: self.n_pings,
                });
            }
        }

        if let Some(value) = calibration.and_then(|c| c.get(param)) {
            return match value {
                CalValue::Scalar(v) => Ok(vec![*v; indices.len()]),
                CalValue::Vector(v) if v.len() == 1 => Ok(vec![v[0]; indices.len()]),
                CalValue::Vector(v) if v.len() == self.n_pings => {
                    Ok(indices.iter().map(|&i| v[i]).collect())
                }
                CalValue::Vector(v) if v.len() == indices.len() => Ok(v.clone()),
                CalValue::Vector(v) => Err(EchoError::InvalidCalibrationShape {
                    param: param.name(),
                    len: v.len(),
                    n_pings: self.n_pings,
                    n_indices: indices.len(),
                }),
            };
        }

        if let Some(vector) = self.ping_vector(param) {
            return Ok(indices.iter().map(|&i| vector[i]).collect());
        }

        let mut resolved = Vec::with_capacity(indices.len());
        for &idx in indices {
            let value = match self.channel_metadata[idx].as_deref() {
                Some(metadata) => self.metadata_param(metadata, param, idx),
                None => f64::NAN,
            };
            resolved.push(value);
        }
        Ok(resolved)
    }

    /// The per-ping vector behind a parameter, when the store carries one.
    fn ping_vector(&self, param: CalParam) -> Option<Vec<f64>> {
        match param {
            CalParam::SampleInterval => Some(self.sample_interval.clone()),
            CalParam::SoundVelocity => Some(self.sound_velocity.clone()),
            CalParam::TransducerDepth => Some(self.transducer_depth.clone()),
            CalParam::Heave => Some(self.heave.clone()),
            CalParam::TransmitPower => Some(self.transmit_power.clone()),
            CalParam::PulseLength => Some(self.pulse_length.clone()),
            CalParam::AbsorptionCoefficient => Some(self.absorption_coefficient.clone()),
            CalParam::SampleOffset => {
                Some(self.sample_offset.iter().map(|&v| v as f64).collect())
            }
            _ => None,
        }
    }

    /// Extract a parameter from a ping's file metadata.
    fn metadata_param(&self, metadata: &ChannelMetadata, param: CalParam, idx: usize) -> f64 {
        match param {
            CalParam::Gain => metadata.gain,
            CalParam::EquivalentBeamAngle => metadata.equivalent_beam_angle,
            CalParam::AngleSensitivityAlongship => metadata.angle_sensitivity_alongship,
            CalParam::AngleSensitivityAthwartship => metadata.angle_sensitivity_athwartship,
            CalParam::AngleOffsetAlongship => metadata.angle_offset_alongship,
            CalParam::AngleOffsetAthwartship => metadata.angle_offset_athwartship,
            CalParam::SaCorrection => metadata
                .sa_correction_for_pulse_length(self.pulse_length[idx])
                .unwrap_or(f64::NAN),
            // The remaining parameters always have per-ping vectors.
            _ => f64::NAN,
        }
    }

    pub(crate) fn ping_capacity(&self) -> usize {
        self.ping_time.len()
    }

    /// Allocate the data arrays with everything initialized to no-data.
    fn create_arrays(&mut self, n_pings: usize, n_samples: usize) {
        self.ping_time = vec![NOT_A_TIME; n_pings];
        self.channel_metadata = vec![None; n_pings];
        self.transducer_depth = vec![f64::NAN; n_pings];
        self.frequency = vec![f64::NAN; n_pings];
        self.transmit_power = vec![f64::NAN; n_pings];
        self.pulse_length = vec![f64::NAN; n_pings];
        self.bandwidth = vec![f64::NAN; n_pings];
        self.sample_interval = vec![f64::NAN; n_pings];
        self.sound_velocity = vec![f64::NAN; n_pings];
        self.absorption_coefficient = vec![f64::NAN; n_pings];
        self.heave = vec![f64::NAN; n_pings];
        self.pitch = vec![f64::NAN; n_pings];
        self.roll = vec![f64::NAN; n_pings];
        self.temperature = vec![f64::NAN; n_pings];
        self.heading = vec![f64::NAN; n_pings];
        self.transmit_mode = vec![0.0; n_pings];
        self.sample_offset = vec![0; n_pings];
        self.sample_count = vec![0; n_pings];
        if self.store_power {
            self.power = Some(Array2::from_elem((n_pings, n_samples), f64::NAN));
        }
        if self.store_angles {
            self.angles_alongship_e = Some(Array2::from_elem((n_pings, n_samples), f64::NAN));
            self.angles_athwartship_e = Some(Array2::from_elem((n_pings, n_samples), f64::NAN));
        }
        self.n_samples = n_samples;
        self.allocated = true;
    }

    /// Grow the physical arrays, preserving contents and filling new slots
    /// with no-data values.
    fn resize_arrays(&mut self, ping_dims: usize, sample_dims: usize) {
        self.ping_time.resize(ping_dims, NOT_A_TIME);
        self.channel_metadata.resize(ping_dims, None);
        self.transducer_depth.resize(ping_dims, f64::NAN);
        self.frequency.resize(ping_dims, f64::NAN);
        self.transmit_power.resize(ping_dims, f64::NAN);
        self.pulse_length.resize(ping_dims, f64::NAN);
        self.bandwidth.resize(ping_dims, f64::NAN);
        self.sample_interval.resize(ping_dims, f64::NAN);
        self.sound_velocity.resize(ping_dims, f64::NAN);
        self.absorption_coefficient.resize(ping_dims, f64::NAN);
        self.heave.resize(ping_dims, f64::NAN);
        self.pitch.resize(ping_dims, f64::NAN);
        self.roll.resize(ping_dims, f64::NAN);
        self.temperature.resize(ping_dims, f64::NAN);
        self.heading.resize(ping_dims, f64::NAN);
        self.transmit_mode.resize(ping_dims, 0.0);
        self.sample_offset.resize(ping_dims, 0);
        self.sample_count.resize(ping_dims, 0);
        for matrix in [
            self.power.as_mut(),
            self.angles_alongship_e.as_mut(),
            self.angles_athwartship_e.as_mut(),
        ]
        .iter_mut()
        .flatten()
        {
            **matrix = grown(matrix, ping_dims, sample_dims);
        }
        if let Some(bottom) = self.detected_bottom.as_mut() {
            bottom.resize(ping_dims, f64::NAN);
        }
        if let Some(refl) = self.bottom_reflectivity.as_mut() {
            refl.resize(ping_dims, f64::NAN);
        }
        self.n_samples = sample_dims;
    }

    /// Drop the oldest ping of a full rolling store: everything moves one
    /// row towards index 0 and the last row becomes writable.
    fn roll_arrays(&mut self) {
        roll_vec(&mut self.ping_time, NOT_A_TIME);
        roll_vec(&mut self.channel_metadata, None);
        roll_vec(&mut self.transducer_depth, f64::NAN);
        roll_vec(&mut self.frequency, f64::NAN);
        roll_vec(&mut self.transmit_power, f64::NAN);
        roll_vec(&mut self.pulse_length, f64::NAN);
        roll_vec(&mut self.bandwidth, f64::NAN);
        roll_vec(&mut self.sample_interval, f64::NAN);
        roll_vec(&mut self.sound_velocity, f64::NAN);
        roll_vec(&mut self.absorption_coefficient, f64::NAN);
        roll_vec(&mut self.heave, f64::NAN);
        roll_vec(&mut self.pitch, f64::NAN);
        roll_vec(&mut self.roll, f64::NAN);
        roll_vec(&mut self.temperature, f64::NAN);
        roll_vec(&mut self.heading, f64::NAN);
        roll_vec(&mut self.transmit_mode, 0.0);
        roll_vec(&mut self.sample_offset, 0);
        roll_vec(&mut self.sample_count, 0);
        for matrix in [
            self.power.as_mut(),
            self.angles_alongship_e.as_mut(),
            self.angles_athwartship_e.as_mut(),
        ]
        .iter_mut()
        .flatten()
        {
            roll_matrix(matrix);
        }
        if let Some(bottom) = self.detected_bottom.as_mut() {
            roll_vec(bottom, f64::NAN);
        }
        if let Some(refl) = self.bottom_reflectivity.as_mut() {
            roll_vec(refl, f64::NAN);
        }
    }
}

impl std::fmt::Display for ChannelStore {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(fmt, "channel(s): {:?}", self.channel_id)?;
        if self.n_pings > 0 {
            writeln!(fmt, "    frequency (first ping): {}", self.frequency[0])?;
            writeln!(fmt, "    data start time: {}", self.ping_time[0])?;
            writeln!(fmt, "    data end time: {}", self.ping_time[self.n_pings - 1])?;
            writeln!(fmt, "    number of pings: {}", self.n_pings)?;
            writeln!(fmt, "    sample capacity: {}", self.n_samples)?;
        } else {
            writeln!(fmt, "    store contains no data")?;
        }
        Ok(())
    }
}

/// Select the `[offset, offset + count)` window of an incoming sample
/// block, clipped to the available data.
fn window<T>(block: &[T], offset: usize, count: usize) -> &[T] {
    let start = offset.min(block.len());
    let end = offset.saturating_add(count).min(block.len());
    &block[start..end]
}

/// Write one decoded row, NaN-padding the tail and dropping samples beyond
/// the fixed capacity of a rolling store.
fn write_row(matrix: &mut Array2<f64>, row: usize, values: &[f64]) {
    let capacity = matrix.ncols();
    let n = values.len().min(capacity);
    let mut target = matrix.row_mut(row);
    for (col, slot) in target.iter_mut().enumerate() {
        *slot = if col < n { values[col] } else { f64::NAN };
    }
}

fn grown(old: &Array2<f64>, rows: usize, cols: usize) -> Array2<f64> {
    let mut out = Array2::from_elem((rows, cols), f64::NAN);
    let r = old.nrows().min(rows);
    let c = old.ncols().min(cols);
    out.slice_mut(s![..r, ..c]).assign(&old.slice(s![..r, ..c]));
    out
}

fn roll_vec<T: Clone>(v: &mut [T], fill: T) {
    if v.is_empty() {
        return;
    }
    v.rotate_left(1);
    let last = v.len() - 1;
    v[last] = fill;
}

fn roll_matrix(matrix: &mut Array2<f64>) {
    let rows = matrix.nrows();
    if rows < 2 {
        return;
    }
    let shifted = matrix.slice(s![1.., ..]).to_owned();
    matrix.slice_mut(s![..rows - 1, ..]).assign(&shifted);
    matrix.row_mut(rows - 1).fill(f64::NAN);
}

/// Splice `theirs[..n_theirs]` into `ours` ahead of `at`, trimming `ours`
/// to its logical length first.
fn splice<T: Clone>(ours: &mut Vec<T>, theirs: &[T], n_ours: usize, n_theirs: usize, at: usize) {
    ours.truncate(n_ours);
    let tail: Vec<T> = ours.split_off(at);
    ours.extend_from_slice(&theirs[..n_theirs]);
    ours.extend(tail);
}

fn splice_matrix(
    ours: Option<&Array2<f64>>,
    theirs: Option<&Array2<f64>>,
    n_ours: usize,
    n_theirs: usize,
    at: usize,
    n_samples: usize,
) -> Option<Array2<f64>> {
    if ours.is_none() && theirs.is_none() {
        return None;
    }
    let mut out = Array2::from_elem((n_ours + n_theirs, n_samples), f64::NAN);
    if let Some(ours) = ours {
        let cols = ours.ncols().min(n_samples);
        out.slice_mut(s![..at, ..cols])
            .assign(&ours.slice(s![..at, ..cols]));
        out.slice_mut(s![at + n_theirs.., ..cols])
            .assign(&ours.slice(s![at..n_ours, ..cols]));
    }
    if let Some(theirs) = theirs {
        let cols = theirs.ncols().min(n_samples);
        out.slice_mut(s![at..at + n_theirs, ..cols])
            .assign(&theirs.slice(s![..n_theirs, ..cols]));
    }
    Some(out)
}

/// Gather per-ping values by row index.
pub(crate) fn gather(values: &[f64], indices: &[usize]) -> Vec<f64> {
    indices.iter().map(|&i| values[i]).collect()
}

/// Gather matrix rows by index into a fresh owned matrix.
pub(crate) fn gather_rows(matrix: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    let mut out = Array2::from_elem((indices.len(), matrix.ncols()), f64::NAN);
    for (row, &idx) in indices.iter().enumerate() {
        out.row_mut(row).assign(&matrix.row(idx));
    }
    out
}
