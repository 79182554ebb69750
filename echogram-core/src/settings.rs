//! This module contains the [`ReadSettings`] structure which customises what
//! is kept while ingesting raw files.
//!
//! NB: Raw recordings are frequently much larger than the slice of them an
//! analysis needs. The settings let a reader restrict ingestion by time,
//! ping number, sample window, frequency and channel id before anything is
//! stored, which bounds memory for long deployments.
use crate::errors::*;
use crate::timestamp::{self, TimeValue, DEFAULT_TIME_FORMAT};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The read-filter surface applied while ingesting raw files.
///
/// This structure does not allow direct manipulation of fields as several of
/// them constrain each other (a start bound must not exceed its end bound,
/// and time bounds are parsed with the configured format string at set
/// time). Therefore using setter and getter functions is generally safer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct ReadSettings {
    /// Skip records before this millisecond UTC timestamp.
    pub(crate) start_time: Option<i64>,
    /// Skip records after this millisecond UTC timestamp.
    pub(crate) end_time: Option<i64>,
    /// Skip pings numbered (1-based, engine-wide) below this.
    pub(crate) start_ping: Option<u64>,
    /// Skip pings numbered above this.
    pub(crate) end_ping: Option<u64>,
    /// First sample to keep of every ping.
    pub(crate) start_sample: Option<usize>,
    /// Last sample (inclusive) to keep of every ping.
    pub(crate) end_sample: Option<usize>,
    /// Store only channels transmitting at one of these frequencies (Hz).
    /// Empty means all frequencies pass.
    pub(crate) frequencies: Vec<f64>,
    /// Store only these channel ids. Empty means all channels pass.
    pub(crate) channel_ids: Vec<String>,
    /// Cap the per-ping sample count; samples beyond it are dropped.
    pub(crate) max_sample_count: Option<usize>,
    /// Whether power samples are stored at all.
    pub(crate) store_power: bool,
    /// Whether angle samples are stored at all.
    pub(crate) store_angles: bool,
    /// strftime-style format for time bounds passed as text.
    pub(crate) time_format_string: String,
}

impl Default for ReadSettings {
    /// Creates the default instance: nothing is filtered, both sample kinds
    /// are stored and time strings parse as `%Y-%m-%d %H:%M:%S` UTC.
    fn default() -> Self {
        ReadSettings {
            start_time: None,
            end_time: None,
            start_ping: None,
            end_ping: None,
            start_sample: None,
            end_sample: None,
            frequencies: Vec::new(),
            channel_ids: Vec::new(),
            max_sample_count: None,
            store_power: true,
            store_angles: true,
            time_format_string: DEFAULT_TIME_FORMAT.to_string(),
        }
    }
}

impl ReadSettings {
    #[cfg(feature = "to_json")]
    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(&self).map_err(|e| e.to_string())
    }

    /// Sets the format string used to parse time bounds given as text.
    /// NB: Set this before the time bounds it should apply to.
    pub fn set_time_format_string(&mut self, format: &str) {
        self.time_format_string = format.to_string();
    }

    /// Sets the inclusive lower time bound. Accepts any [`TimeValue`] form.
    /// ```
    /// # use echogram_core::settings::ReadSettings;
    /// let mut settings = ReadSettings::default();
    /// settings.set_start_time("1970-01-01 00:01:00".into()).unwrap();
    /// assert_eq!(settings.get_start_time(), Some(60_000));
    ///
    /// let res = settings.set_start_time("yesterday-ish".into());
    /// assert!(res.is_err());
    /// ```
    pub fn set_start_time(&mut self, time: TimeValue) -> Result<(), EchoError> {
        let ms = timestamp::to_millis(&time, &self.time_format_string)?;
        if let Some(end) = self.end_time {
            if ms > end {
                return Err(EchoError::SettingsError {
                    msg: "start_time must not exceed end_time".to_string(),
                });
            }
        }
        self.start_time = Some(ms);
        Ok(())
    }

    /// Sets the inclusive upper time bound. Accepts any [`TimeValue`] form.
    pub fn set_end_time(&mut self, time: TimeValue) -> Result<(), EchoError> {
        let ms = timestamp::to_millis(&time, &self.time_format_string)?;
        if let Some(start) = self.start_time {
            if ms < start {
                return Err(EchoError::SettingsError {
                    msg: "end_time must not precede start_time".to_string(),
                });
            }
        }
        self.end_time = Some(ms);
        Ok(())
    }

    /// Sets the inclusive lower ping-number bound (1-based, engine-wide).
    pub fn set_start_ping(&mut self, ping: u64) -> Result<(), EchoError> {
        if let Some(end) = self.end_ping {
            if ping > end {
                return Err(EchoError::SettingsError {
                    msg: "start_ping must not exceed end_ping".to_string(),
                });
            }
        }
        self.start_ping = Some(ping);
        Ok(())
    }

    /// Sets the inclusive upper ping-number bound.
    pub fn set_end_ping(&mut self, ping: u64) -> Result<(), EchoError> {
        if let Some(start) = self.start_ping {
            if ping < start {
                return Err(EchoError::SettingsError {
                    msg: "end_ping must not precede start_ping".to_string(),
                });
            }
        }
        self.end_ping = Some(ping);
        Ok(())
    }

    /// Sets the first stored sample of every ping.
    pub fn set_start_sample(&mut self, sample: usize) -> Result<(), EchoError> {
        if let Some(end) = self.end_sample {
            if sample > end {
                return Err(EchoError::SettingsError {
                    msg: "start_sample must not exceed end_sample".to_string(),
                });
            }
        }
        self.start_sample = Some(sample);
        Ok(())
    }

    /// Sets the last stored sample (inclusive) of every ping.
    pub fn set_end_sample(&mut self, sample: usize) -> Result<(), EchoError> {
        if let Some(start) = self.start_sample {
            if sample < start {
                return Err(EchoError::SettingsError {
                    msg: "end_sample must not precede start_sample".to_string(),
                });
            }
        }
        self.end_sample = Some(sample);
        Ok(())
    }

    /// Restrict ingestion to channels transmitting at one of the given
    /// frequencies in Hz. An empty list passes everything.
    pub fn set_frequencies(&mut self, frequencies: Vec<f64>) {
        self.frequencies = frequencies;
    }

    /// Restrict ingestion to the given channel ids. An empty list passes
    /// everything.
    pub fn set_channel_ids(&mut self, channel_ids: Vec<String>) {
        self.channel_ids = channel_ids;
    }

    /// Cap the number of samples stored per ping.
    pub fn set_max_sample_count(&mut self, count: usize) {
        self.max_sample_count = Some(count);
    }

    /// Choose whether power samples are stored.
    pub fn set_store_power(&mut self, store: bool) {
        self.store_power = store;
    }

    /// Choose whether angle samples are stored.
    pub fn set_store_angles(&mut self, store: bool) {
        self.store_angles = store;
    }

    pub fn get_start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn get_end_time(&self) -> Option<i64> {
        self.end_time
    }

    pub fn get_start_ping(&self) -> Option<u64> {
        self.start_ping
    }

    pub fn get_end_ping(&self) -> Option<u64> {
        self.end_ping
    }

    pub fn get_start_sample(&self) -> Option<usize> {
        self.start_sample
    }

    pub fn get_end_sample(&self) -> Option<usize> {
        self.end_sample
    }

    pub fn get_frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn get_channel_ids(&self) -> &[String] {
        &self.channel_ids
    }

    pub fn get_max_sample_count(&self) -> Option<usize> {
        self.max_sample_count
    }

    pub fn get_store_power(&self) -> bool {
        self.store_power
    }

    pub fn get_store_angles(&self) -> bool {
        self.store_angles
    }

    pub fn get_time_format_string(&self) -> &str {
        &self.time_format_string
    }

    /// Check whether a channel with the given id and frequency passes the
    /// channel and frequency filters. With both filter lists empty the
    /// return is [`true`].
    /// ```
    /// # use echogram_core::settings::ReadSettings;
    /// let mut settings = ReadSettings::default();
    /// assert!(settings.channel_selected("GPT 38 kHz", 38_000.0));
    ///
    /// settings.set_frequencies(vec![120_000.0]);
    /// assert_ne!(settings.channel_selected("GPT 38 kHz", 38_000.0), true);
    /// assert!(settings.channel_selected("GPT 120 kHz", 120_000.0));
    ///
    /// settings.set_channel_ids(vec!["GPT 38 kHz".to_string()]);
    /// assert_ne!(settings.channel_selected("GPT 120 kHz", 120_000.0), true);
    /// ```
    pub fn channel_selected(&self, channel_id: &str, frequency: f64) -> bool {
        let id_ok =
            self.channel_ids.is_empty() || self.channel_ids.iter().any(|id| id == channel_id);
        let freq_ok = self.frequencies.is_empty() || self.frequencies.contains(&frequency);
        id_ok && freq_ok
    }

    /// Check whether a record timestamp passes the time bounds.
    pub fn time_in_bounds(&self, timestamp: i64) -> bool {
        let start_ok = self.start_time.map_or(true, |start| timestamp >= start);
        let end_ok = self.end_time.map_or(true, |end| timestamp <= end);
        start_ok && end_ok
    }

    /// Check whether an engine-wide ping number passes the ping bounds.
    pub fn ping_in_bounds(&self, ping_number: u64) -> bool {
        let start_ok = self.start_ping.map_or(true, |start| ping_number >= start);
        let end_ok = self.end_ping.map_or(true, |end| ping_number <= end);
        start_ok && end_ok
    }
}
