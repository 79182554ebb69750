//! This file contains the definitions of the parsed datagram records handed
//! over by the byte-level parser, and the per-file channel configuration
//! metadata derived from them.
//!
//! The parser itself lives outside this workspace: it walks the raw file,
//! validates datagram framing and produces one of the record variants below
//! per datagram. Everything here is already in host representation with
//! timestamps converted to millisecond UTC.
use std::path::Path;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::enums::{BeamType, SampleMode};

/// One RAW datagram: a single ping received on a single channel.
///
/// The `power` and `angle` blocks are present according to `mode`; a parser
/// may also legitimately omit a block it was asked not to decode.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleDatagram {
    /// Millisecond UTC timestamp of the ping.
    pub timestamp: i64,
    /// The 1-based transceiver channel number within the file.
    pub channel: usize,
    /// Which sample blocks the transceiver recorded.
    pub mode: SampleMode,
    /// Transducer draft below the surface in meters.
    pub transducer_depth: f64,
    /// Transmit frequency in Hz.
    pub frequency: f64,
    /// Transmit power in W.
    pub transmit_power: f64,
    /// Pulse length in seconds.
    pub pulse_length: f64,
    /// Bandwidth in Hz.
    pub bandwidth: f64,
    /// Time between successive samples in seconds.
    pub sample_interval: f64,
    /// Sound speed used by the sounder in m/s.
    pub sound_velocity: f64,
    /// Absorption coefficient in dB/m.
    pub absorption_coefficient: f64,
    /// Heave in meters, positive up.
    pub heave: f64,
    /// Pitch in degrees.
    pub pitch: f64,
    /// Roll in degrees.
    pub roll: f64,
    /// Water temperature in degrees C.
    pub temperature: f64,
    /// Vessel heading in degrees.
    pub heading: f64,
    /// Transceiver transmit mode code.
    pub transmit_mode: u8,
    /// The number of samples recorded for this ping.
    pub count: usize,
    /// Indexed power samples, absent when `mode` is angle-only.
    pub power: Option<Vec<i16>>,
    /// Packed alongship|athwartship electrical angles, absent when `mode`
    /// is power-only.
    pub angle: Option<Vec<u16>>,
}

/// The per-transceiver section of the configuration header.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransceiverConfig {
    /// The unique channel identifier string, e.g. "GPT  38 kHz 009072033fa2 1-1 ES38B".
    pub channel_id: String,
    /// Split or single beam.
    pub beam_type: BeamType,
    /// Transmit frequency in Hz.
    pub frequency: f64,
    /// The on-axis system gain in dB at the time of recording.
    pub gain: f64,
    /// Equivalent (two-way) beam angle in dB re 1 steradian.
    pub equivalent_beam_angle: f64,
    /// Alongship -3 dB beamwidth in degrees.
    pub beamwidth_alongship: f64,
    /// Athwartship -3 dB beamwidth in degrees.
    pub beamwidth_athwartship: f64,
    /// Alongship angle sensitivity (electrical per mechanical degree).
    pub angle_sensitivity_alongship: f64,
    /// Athwartship angle sensitivity.
    pub angle_sensitivity_athwartship: f64,
    /// Alongship angle offset in degrees.
    pub angle_offset_alongship: f64,
    /// Athwartship angle offset in degrees.
    pub angle_offset_athwartship: f64,
    /// Transducer installation position in meters.
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
    /// Transducer installation direction.
    pub dir_x: f64,
    pub dir_y: f64,
    pub dir_z: f64,
    /// The pulse lengths the recording system can be set to, in seconds.
    pub pulse_length_table: Vec<f64>,
    /// The gain calibrated for each entry of `pulse_length_table`.
    pub gain_table: Vec<f64>,
    /// The sa correction calibrated for each entry of `pulse_length_table`.
    pub sa_correction_table: Vec<f64>,
    /// The GPT firmware version used when recording.
    pub gpt_software_version: String,
}

/// The configuration header datagram that opens every raw file, one
/// [`TransceiverConfig`] per installed transceiver in channel-number order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConfigDatagram {
    /// Millisecond UTC timestamp of the header.
    pub timestamp: i64,
    pub survey_name: String,
    pub transect_name: String,
    pub sounder_name: String,
    /// Sounder software version.
    pub version: String,
    /// Transceiver sections keyed 1-based by position.
    pub transceivers: Vec<TransceiverConfig>,
}

impl ConfigDatagram {
    /// The number of transceivers installed when the file was recorded.
    pub fn transceiver_count(&self) -> usize {
        self.transceivers.len()
    }
}

/// An NMEA-0183 text datagram.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NmeaDatagram {
    pub timestamp: i64,
    pub nmea_string: String,
}

/// A time-stamped annotation inserted by the recording software.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TagDatagram {
    pub timestamp: i64,
    pub text: String,
}

/// A sounder-detected bottom datagram from a `.bot` or `.out` file.
///
/// `depths` holds one depth per transceiver of the originating file in
/// channel-number order; `.out` files additionally carry a parallel
/// `reflectivity` vector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BottomDatagram {
    pub timestamp: i64,
    pub depths: Vec<f64>,
    pub reflectivity: Option<Vec<f64>>,
}

/// One parsed datagram in file order, as discriminated by the parser.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DatagramRecord {
    /// The CON0 configuration header.
    Configuration(ConfigDatagram),
    /// The CON1 extended configuration block of ME70 files, kept verbatim.
    ExtendedConfiguration { timestamp: i64, xml: String },
    /// A RAW sample datagram.
    Sample(SampleDatagram),
    /// An NME text datagram.
    Nmea(NmeaDatagram),
    /// A TAG annotation datagram.
    Tag(TagDatagram),
    /// A BOT or DEP bottom-detection datagram.
    Bottom(BottomDatagram),
    /// A datagram kind this library does not interpret.
    Unknown { timestamp: i64, kind: String },
}

impl DatagramRecord {
    /// The millisecond UTC timestamp carried by any record kind.
    pub fn timestamp(&self) -> i64 {
        match self {
            DatagramRecord::Configuration(d) => d.timestamp,
            DatagramRecord::ExtendedConfiguration { timestamp, .. } => *timestamp,
            DatagramRecord::Sample(d) => d.timestamp,
            DatagramRecord::Nmea(d) => d.timestamp,
            DatagramRecord::Tag(d) => d.timestamp,
            DatagramRecord::Bottom(d) => d.timestamp,
            DatagramRecord::Unknown { timestamp, .. } => *timestamp,
        }
    }
}

/// The configuration of one channel as captured from one file header.
///
/// One of these is created per selected channel for every raw file read, and
/// every ping appended from that file holds a shared handle to it. The
/// struct is immutable once built; pings reference it, they never copy it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelMetadata {
    /// The base name of the originating file.
    pub data_file: String,
    /// The directory part of the originating file path.
    pub data_file_path: String,
    pub survey_name: String,
    pub transect_name: String,
    pub sounder_name: String,
    /// Sounder software version from the header.
    pub version: String,
    /// The engine ping count when this file was opened.
    pub start_ping: u64,
    /// Millisecond UTC timestamp of the file header.
    pub start_time: i64,
    /// The ME70 extended configuration block, if the file carried one.
    pub extended_configuration: Option<String>,
    pub gpt_firmware_version: String,
    pub beam_type: BeamType,
    pub frequency_hz: f64,
    pub gain: f64,
    pub equivalent_beam_angle: f64,
    pub beamwidth_alongship: f64,
    pub beamwidth_athwartship: f64,
    pub angle_sensitivity_alongship: f64,
    pub angle_sensitivity_athwartship: f64,
    pub angle_offset_alongship: f64,
    pub angle_offset_athwartship: f64,
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
    pub dir_x: f64,
    pub dir_y: f64,
    pub dir_z: f64,
    pub pulse_length_table: Vec<f64>,
    pub gain_table: Vec<f64>,
    pub sa_correction_table: Vec<f64>,
}

impl ChannelMetadata {
    /// Build the metadata for one channel from a file's configuration
    /// header and the transceiver section for that channel.
    pub fn new(
        file: &Path,
        transceiver: &TransceiverConfig,
        config: &ConfigDatagram,
        start_ping: u64,
        extended_configuration: Option<String>,
    ) -> Self {
        let data_file = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let data_file_path = file
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        ChannelMetadata {
            data_file,
            data_file_path,
            survey_name: config.survey_name.clone(),
            transect_name: config.transect_name.clone(),
            sounder_name: config.sounder_name.clone(),
            version: config.version.clone(),
            start_ping,
            start_time: config.timestamp,
            extended_configuration,
            gpt_firmware_version: transceiver.gpt_software_version.clone(),
            beam_type: transceiver.beam_type,
            frequency_hz: transceiver.frequency,
            gain: transceiver.gain,
            equivalent_beam_angle: transceiver.equivalent_beam_angle,
            beamwidth_alongship: transceiver.beamwidth_alongship,
            beamwidth_athwartship: transceiver.beamwidth_athwartship,
            angle_sensitivity_alongship: transceiver.angle_sensitivity_alongship,
            angle_sensitivity_athwartship: transceiver.angle_sensitivity_athwartship,
            angle_offset_alongship: transceiver.angle_offset_alongship,
            angle_offset_athwartship: transceiver.angle_offset_athwartship,
            pos_x: transceiver.pos_x,
            pos_y: transceiver.pos_y,
            pos_z: transceiver.pos_z,
            dir_x: transceiver.dir_x,
            dir_y: transceiver.dir_y,
            dir_z: transceiver.dir_z,
            pulse_length_table: transceiver.pulse_length_table.clone(),
            gain_table: transceiver.gain_table.clone(),
            sa_correction_table: transceiver.sa_correction_table.clone(),
        }
    }

    /// Look up the sa correction calibrated for a given pulse length, with
    /// floating tolerance on the table match.
    pub fn sa_correction_for_pulse_length(&self, pulse_length: f64) -> Option<f64> {
        self.pulse_length_table
            .iter()
            .position(|&table_entry| is_close(table_entry, pulse_length))
            .and_then(|idx| self.sa_correction_table.get(idx).copied())
    }
}

/// A shared, immutable handle to a channel's file configuration.
pub type MetadataHandle = Arc<ChannelMetadata>;

/// Relative-tolerance float comparison used for table lookups and
/// calibration equality checks.
pub(crate) fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}
