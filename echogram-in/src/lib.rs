//! This is a library for reading Simrad EK60/ES60/ES70 echosounder
//! recordings into per-channel sample stores. It sequences the datagrams of
//! one or many raw files (and their `.bot`/`.out` bottom-detection
//! companions) into [`ChannelStore`] objects, applying the configured time,
//! ping, frequency and channel filters along the way.
//!
//! The byte-level file format is handled by an external parser consumed
//! through the [`DatagramSource`] trait, so this crate never touches raw
//! bytes itself.
extern crate echogram_core;
extern crate fnv;
extern crate log;

pub mod nmea;
pub mod source;
#[cfg(test)]
mod tests;

use std::path::Path;

use fnv::{FnvHashMap, FnvHashSet};
use log::{debug, warn};

pub use echogram_core::datagram_structs::*;
pub use echogram_core::enums;
pub use echogram_core::errors::*;
pub use echogram_core::settings::ReadSettings;
pub use echogram_core::store::{ChannelStore, StorageOptions};
pub use nmea::NmeaBuffer;
pub use source::{DatagramSource, IterSource};

use echogram_core::datagram_structs::MetadataHandle;
use std::sync::Arc;

/// A multi-file echosounder dataset: one [`ChannelStore`] per selected
/// channel, the NMEA buffer, and the time/ping span of everything read.
///
/// Raw files must be read before the `.bot`/`.out` files that belong to
/// them: bottom detections attach to already stored pings by timestamp and
/// are dropped when no ping matches.
pub struct EchoData {
    /// Millisecond UTC timestamp of the first file's header.
    start_time: Option<i64>,
    /// The largest record timestamp seen so far.
    end_time: Option<i64>,
    /// The engine-wide number of the first stored ping.
    start_ping: Option<u64>,
    /// The engine-wide number of the last stored ping.
    end_ping: Option<u64>,
    /// The engine-wide ping counter, incremented on channel-1 RAW records.
    n_pings: u64,
    /// The distinct frequencies of the stored channels, in Hz.
    frequencies: Vec<f64>,
    /// The ids of the stored channels in the order they were first seen.
    channel_ids: Vec<String>,
    /// Engine channel number (1-based, assignment order) to channel id.
    channel_id_map: FnvHashMap<usize, String>,
    stores: FnvHashMap<String, ChannelStore>,
    nmea: NmeaBuffer,
    /// TAG annotations with their timestamps, kept verbatim.
    annotations: Vec<(i64, String)>,
    settings: ReadSettings,
    /// Channel id per 1-based channel number of the file currently being
    /// read, including channels that are not being stored.
    file_channel_map: Vec<String>,
    /// Channel number to channel id, for the channels actively stored from
    /// the current file.
    active_channel_map: FnvHashMap<usize, String>,
}

impl Default for EchoData {
    fn default() -> Self {
        Self::new(ReadSettings::default())
    }
}

impl EchoData {
    /// Create an empty dataset that will ingest with the given settings.
    pub fn new(settings: ReadSettings) -> Self {
        EchoData {
            start_time: None,
            end_time: None,
            start_ping: None,
            end_ping: None,
            n_pings: 0,
            frequencies: Vec::new(),
            channel_ids: Vec::new(),
            channel_id_map: FnvHashMap::default(),
            stores: FnvHashMap::default(),
            nmea: NmeaBuffer::new(),
            annotations: Vec::new(),
            settings,
            file_channel_map: Vec::new(),
            active_channel_map: FnvHashMap::default(),
        }
    }

    /// The read settings in effect for subsequent reads.
    pub fn settings(&self) -> &ReadSettings {
        &self.settings
    }

    /// Mutable access to the read settings. Changes apply to subsequent
    /// [`Self::read_raw`] calls, not retroactively.
    pub fn settings_mut(&mut self) -> &mut ReadSettings {
        &mut self.settings
    }

    /// Read one or many raw files in the given order.
    ///
    /// `open` is called once per path and must yield the parser for that
    /// file. Datagrams are filtered by the configured time, ping, channel
    /// and frequency bounds; whatever passes is appended to the per-channel
    /// stores. After the last file every store and the NMEA buffer are
    /// trimmed to their logical size.
    pub fn read_raw<P, S, F>(&mut self, files: &[P], mut open: F) -> Result<(), EchoError>
    where
        P: AsRef<Path>,
        S: DatagramSource,
        F: FnMut(&Path) -> Result<S, EchoError>,
    {
        for path in files {
            let path = path.as_ref();
            let mut source = open(path)?;
            self.read_file(path, &mut source)?;
        }
        for channel_id in &self.channel_ids {
            if let Some(store) = self.stores.get_mut(channel_id) {
                store.trim();
            }
        }
        self.nmea.trim();
        Ok(())
    }

    /// Read `.bot`/`.out` bottom-detection files.
    ///
    /// This simply forwards to [`Self::read_raw`] with the time bounds set
    /// to the span of the data already read, so detections outside that
    /// span are skipped immediately instead of being checked against every
    /// ping time. The raw files backing a bottom file must have been read
    /// first.
    pub fn read_bot<P, S, F>(&mut self, files: &[P], open: F) -> Result<(), EchoError>
    where
        P: AsRef<Path>,
        S: DatagramSource,
        F: FnMut(&Path) -> Result<S, EchoError>,
    {
        if let Some(end) = self.end_time {
            self.settings.set_end_time(end.into())?;
        }
        if let Some(start) = self.start_time {
            self.settings.set_start_time(start.into())?;
        }
        self.read_raw(files, open)
    }

    /// Ingest a single already-opened file.
    fn read_file<S: DatagramSource>(
        &mut self,
        path: &Path,
        source: &mut S,
    ) -> Result<(), EchoError> {
        let config = match source.next_record()? {
            Some(DatagramRecord::Configuration(config)) => config,
            Some(other) => {
                return Err(EchoError::DatagramParse {
                    msg: format!(
                        "file {} does not start with a configuration header (got {} record)",
                        path.display(),
                        record_kind(&other)
                    ),
                })
            }
            None => {
                return Err(EchoError::DatagramParse {
                    msg: format!("file {} is empty", path.display()),
                })
            }
        };

        if self.start_time.is_none() {
            self.start_time = Some(config.timestamp);
        }

        // The file channel map covers every transceiver in the file, stored
        // or not: bottom datagrams index their depth vectors with it.
        self.file_channel_map = config
            .transceivers
            .iter()
            .map(|t| t.channel_id.clone())
            .collect();

        // An ME70 file follows its header with an extended configuration
        // block; hold on to it for the metadata.
        let mut extended: Option<String> = None;
        let mut pending = source.next_record()?;
        if let Some(DatagramRecord::ExtendedConfiguration { xml, .. }) = &pending {
            extended = Some(xml.clone());
            pending = source.next_record()?;
        }

        self.active_channel_map.clear();
        for (position, transceiver) in config.transceivers.iter().enumerate() {
            let channel_number = position + 1;
            if !self
                .settings
                .channel_selected(&transceiver.channel_id, transceiver.frequency)
            {
                continue;
            }

            if !self.stores.contains_key(&transceiver.channel_id) {
                let store = ChannelStore::new(
                    &transceiver.channel_id,
                    StorageOptions {
                        store_power: self.settings.get_store_power(),
                        store_angles: self.settings.get_store_angles(),
                        max_sample_number: self.settings.get_max_sample_count(),
                        ..Default::default()
                    },
                );
                self.stores.insert(transceiver.channel_id.clone(), store);
                self.channel_ids.push(transceiver.channel_id.clone());
                self.channel_id_map
                    .insert(self.channel_ids.len(), transceiver.channel_id.clone());
                if !self.frequencies.contains(&transceiver.frequency) {
                    self.frequencies.push(transceiver.frequency);
                }
            }
            self.active_channel_map
                .insert(channel_number, transceiver.channel_id.clone());

            let store = match self.stores.get_mut(&transceiver.channel_id) {
                Some(store) => store,
                None => continue,
            };
            let metadata: MetadataHandle = Arc::new(ChannelMetadata::new(
                path,
                transceiver,
                &config,
                store.n_pings() as u64,
                extended.clone(),
            ));
            store.set_current_metadata(metadata);
        }

        // Kinds already reported for this file, to log each only once.
        let mut warned_kinds: FnvHashSet<String> = FnvHashSet::default();

        let mut next = pending;
        while let Some(record) = next {
            next = source.next_record()?;

            let timestamp = record.timestamp();
            if !self.settings.time_in_bounds(timestamp) {
                continue;
            }
            match self.end_time {
                Some(end) if end >= timestamp => {}
                // Data cannot be assumed to be in time order.
                _ => self.end_time = Some(timestamp),
            }

            match record {
                DatagramRecord::Sample(datagram) => self.dispatch_sample(&datagram),
                DatagramRecord::Nmea(datagram) => {
                    self.nmea.add_datagram(datagram.timestamp, &datagram.nmea_string);
                }
                DatagramRecord::Tag(datagram) => {
                    self.annotations.push((datagram.timestamp, datagram.text));
                }
                DatagramRecord::Bottom(datagram) => self.dispatch_bottom(&datagram),
                DatagramRecord::Configuration(_) => {
                    warn!(
                        "ignoring unexpected configuration header inside {}",
                        path.display()
                    );
                }
                DatagramRecord::ExtendedConfiguration { .. } => {
                    debug!(
                        "ignoring extended configuration block inside {}",
                        path.display()
                    );
                }
                DatagramRecord::Unknown { kind, .. } => {
                    if warned_kinds.insert(kind.clone()) {
                        warn!("unknown datagram type: {}", kind);
                    }
                }
            }
        }
        Ok(())
    }

    /// Handle one RAW record: count it, filter it, store it.
    fn dispatch_sample(&mut self, datagram: &SampleDatagram) {
        // The engine-wide ping counter follows channel 1, which records on
        // every ping of these systems.
        if datagram.channel == 1 {
            self.n_pings += 1;
        }
        if !self.settings.ping_in_bounds(self.n_pings) {
            return;
        }
        if let Some(channel_id) = self.active_channel_map.get(&datagram.channel) {
            if self.start_ping.is_none() {
                self.start_ping = Some(self.n_pings);
            }
            self.end_ping = Some(self.n_pings);
            if let Some(store) = self.stores.get_mut(channel_id) {
                store.append_ping(
                    datagram,
                    self.settings.get_start_sample(),
                    self.settings.get_end_sample(),
                );
            }
        }
    }

    /// Handle one BOT/DEP record: fan the per-transceiver depths out to
    /// every stored channel present in the current file.
    fn dispatch_bottom(&mut self, datagram: &BottomDatagram) {
        for channel_id in &self.channel_ids {
            let idx = match self.file_channel_map.iter().position(|id| id == channel_id) {
                Some(idx) => idx,
                None => continue,
            };
            let depth = match datagram.depths.get(idx) {
                Some(&depth) => depth,
                None => continue,
            };
            let reflectivity = datagram
                .reflectivity
                .as_ref()
                .and_then(|r| r.get(idx).copied());
            if let Some(store) = self.stores.get_mut(channel_id) {
                store.append_bottom(datagram.timestamp, depth, reflectivity);
            }
        }
    }

    /// The number of stored channels.
    pub fn n_channels(&self) -> usize {
        self.channel_ids.len()
    }

    /// The ids of the stored channels in assignment order.
    pub fn channel_ids(&self) -> &[String] {
        &self.channel_ids
    }

    /// The distinct frequencies of the stored channels, in Hz.
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Millisecond UTC timestamp of the first file's header.
    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    /// The largest record timestamp ingested.
    pub fn end_time(&self) -> Option<i64> {
        self.end_time
    }

    /// The engine-wide number of the first stored ping.
    pub fn start_ping(&self) -> Option<u64> {
        self.start_ping
    }

    /// The engine-wide number of the last stored ping.
    pub fn end_ping(&self) -> Option<u64> {
        self.end_ping
    }

    /// The engine-wide ping count (channel-1 RAW records seen).
    pub fn n_pings(&self) -> u64 {
        self.n_pings
    }

    /// The NMEA sentences ingested so far.
    pub fn nmea(&self) -> &NmeaBuffer {
        &self.nmea
    }

    /// The TAG annotations ingested so far.
    pub fn annotations(&self) -> &[(i64, String)] {
        &self.annotations
    }

    /// Get a channel's store by its id.
    pub fn channel_data(&self, channel_id: &str) -> Result<&ChannelStore, EchoError> {
        self.stores
            .get(channel_id)
            .ok_or_else(|| EchoError::InvalidChannelSelector {
                selector: channel_id.to_string(),
            })
    }

    /// Get a channel's store by its engine channel number (1-based, in
    /// assignment order).
    pub fn channel_data_by_number(&self, number: usize) -> Result<&ChannelStore, EchoError> {
        self.channel_id_map
            .get(&number)
            .and_then(|id| self.stores.get(id))
            .ok_or_else(|| EchoError::InvalidChannelSelector {
                selector: number.to_string(),
            })
    }

    /// Iterate over the stored channels in assignment order.
    pub fn channels(&self) -> impl Iterator<Item = (&str, &ChannelStore)> {
        self.channel_ids
            .iter()
            .filter_map(move |id| self.stores.get(id).map(|store| (id.as_str(), store)))
    }
}

impl std::fmt::Display for EchoData {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.channel_ids.is_empty() {
            return writeln!(fmt, "dataset contains no data");
        }
        writeln!(fmt, "dataset with {} channel(s):", self.n_channels())?;
        for (number, id) in self.channel_ids.iter().enumerate() {
            writeln!(fmt, "    {}: {}", number + 1, id)?;
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            writeln!(fmt, "    data start time: {}", start)?;
            writeln!(fmt, "    data end time: {}", end)?;
        }
        if let (Some(start), Some(end)) = (self.start_ping, self.end_ping) {
            writeln!(fmt, "    number of pings: {}", end - start + 1)?;
        }
        Ok(())
    }
}

/// A short name for a record variant, for diagnostics.
fn record_kind(record: &DatagramRecord) -> &'static str {
    match record {
        DatagramRecord::Configuration(_) => "configuration",
        DatagramRecord::ExtendedConfiguration { .. } => "extended configuration",
        DatagramRecord::Sample(_) => "sample",
        DatagramRecord::Nmea(_) => "nmea",
        DatagramRecord::Tag(_) => "tag",
        DatagramRecord::Bottom(_) => "bottom",
        DatagramRecord::Unknown { .. } => "unknown",
    }
}
