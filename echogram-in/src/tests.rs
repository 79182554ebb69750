use crate::source::IterSource;
use crate::EchoData;

use echogram_core::datagram_structs::*;
use echogram_core::enums::SampleMode;
use echogram_core::errors::EchoError;
use echogram_core::grid::GetOptions;
use echogram_core::settings::ReadSettings;

/// Build a source that replays the given records in order.
fn replay(
    records: Vec<DatagramRecord>,
) -> IterSource<impl Iterator<Item = Result<DatagramRecord, EchoError>>> {
    IterSource::new(records.into_iter().map(Ok))
}

fn read_single_file(records: Vec<DatagramRecord>, settings: ReadSettings) -> EchoData {
    let mut data = EchoData::new(settings);
    let mut records = Some(records);
    data.read_raw(&["D2011-01.raw"], move |_path| {
        Ok(replay(records.take().unwrap_or_default()))
    })
    .unwrap();
    data
}

fn transceiver(channel_id: &str, frequency: f64) -> TransceiverConfig {
    TransceiverConfig {
        channel_id: channel_id.to_string(),
        beam_type: echogram_core::enums::BeamType::Split,
        frequency,
        gain: 25.0,
        equivalent_beam_angle: -20.7,
        beamwidth_alongship: 7.1,
        beamwidth_athwartship: 7.1,
        angle_sensitivity_alongship: 21.9,
        angle_sensitivity_athwartship: 21.9,
        angle_offset_alongship: -0.1,
        angle_offset_athwartship: 0.05,
        pos_x: 0.0,
        pos_y: 0.0,
        pos_z: 0.0,
        dir_x: 0.0,
        dir_y: 0.0,
        dir_z: 0.0,
        pulse_length_table: vec![256e-6, 512e-6, 1_024e-6],
        gain_table: vec![22.0, 24.0, 25.0],
        sa_correction_table: vec![-0.1, -0.3, -0.5],
        gpt_software_version: "070413".to_string(),
    }
}

fn config(timestamp: i64, channels: &[(&str, f64)]) -> DatagramRecord {
    DatagramRecord::Configuration(ConfigDatagram {
        timestamp,
        survey_name: "survey".to_string(),
        transect_name: "transect".to_string(),
        sounder_name: "ER60".to_string(),
        version: "2.4.3".to_string(),
        transceivers: channels
            .iter()
            .map(|(id, frequency)| transceiver(id, *frequency))
            .collect(),
    })
}

fn raw(timestamp: i64, channel: usize, frequency: f64, count: usize) -> DatagramRecord {
    DatagramRecord::Sample(SampleDatagram {
        timestamp,
        channel,
        mode: SampleMode::PowerAndAngle,
        transducer_depth: 5.0,
        frequency,
        transmit_power: 1_000.0,
        pulse_length: 1_024e-6,
        bandwidth: 2_425.0,
        sample_interval: 64e-6,
        sound_velocity: 1_500.0,
        absorption_coefficient: 0.01,
        heave: 0.0,
        pitch: 0.0,
        roll: 0.0,
        temperature: 10.0,
        heading: 90.0,
        transmit_mode: 0,
        count,
        power: Some(vec![0i16; count]),
        angle: Some(vec![0u16; count]),
    })
}

const CH18: &str = "GPT  18 kHz 009072033fa2 1-1 ES18";
const CH38: &str = "GPT  38 kHz 00907203422d 2-1 ES38B";

/// One file, two channels, 100 pings each with fixed parameters.
fn two_channel_records(n_pings: usize, count: usize) -> Vec<DatagramRecord> {
    let mut records = vec![config(0, &[(CH18, 18_000.0), (CH38, 38_000.0)])];
    for i in 0..n_pings {
        let timestamp = (i as i64 + 1) * 1_000;
        records.push(raw(timestamp, 1, 18_000.0, count));
        records.push(raw(timestamp, 2, 38_000.0, count));
    }
    records
}

#[test]
fn two_channels_ingest_to_rectangular_stores() {
    let data = read_single_file(two_channel_records(100, 500), ReadSettings::default());

    assert_eq!(data.n_channels(), 2);
    assert_eq!(data.n_pings(), 100);
    assert_eq!(data.start_ping(), Some(1));
    assert_eq!(data.end_ping(), Some(100));
    assert_eq!(data.frequencies(), &[18_000.0, 38_000.0]);

    let store = data.channel_data(CH38).unwrap();
    assert_eq!(store.n_pings(), 100);
    assert_eq!(store.n_samples(), 500);

    let grid = store.get_power(None, &GetOptions::default()).unwrap();
    assert_eq!(grid.data.dim(), (100, 500));
    assert!(grid.data.iter().all(|v| !v.is_nan()));

    // range[k] steps by interval * c / 2 from min_offset * interval * c / 2.
    let thickness = 64e-6 * 1_500.0 / 2.0;
    assert!((grid.range[0] - 0.0).abs() < 1e-12);
    for k in 1..grid.range.len() {
        assert!((grid.range[k] - grid.range[k - 1] - thickness).abs() < 1e-9);
    }
}

#[test]
fn produced_ping_times_equal_the_raw_timestamps() {
    let data = read_single_file(two_channel_records(25, 10), ReadSettings::default());
    let store = data.channel_data(CH18).unwrap();
    let expected: Vec<i64> = (1..=25).map(|i| i * 1_000).collect();
    assert_eq!(store.ping_time(), expected.as_slice());
    assert!(store
        .ping_time()
        .iter()
        .all(|&t| t <= data.end_time().unwrap()));
}

#[test]
fn mixed_sample_intervals_regrid_on_query() {
    let mut records = vec![config(0, &[(CH38, 38_000.0)])];
    for i in 0..100usize {
        let timestamp = (i as i64 + 1) * 1_000;
        let mut record = raw(timestamp, 1, 38_000.0, 20);
        if let DatagramRecord::Sample(datagram) = &mut record {
            if i >= 50 {
                datagram.sample_interval = 128e-6;
            }
        }
        records.push(record);
    }
    let data = read_single_file(records, ReadSettings::default());
    let store = data.channel_data(CH38).unwrap();

    let grid = store.get_power(None, &GetOptions::default()).unwrap();
    assert_eq!(grid.data.dim(), (100, 40));
    let thickness = 64e-6 * 1_500.0 / 2.0;
    assert!((grid.sample_thickness - thickness).abs() < 1e-12);
    // Coarse rows are expanded by sample duplication.
    assert_eq!(grid.data[[50, 0]], grid.data[[50, 1]]);
    // Fine rows keep their length and gain a NaN tail.
    assert!(grid.data[[0, 20]].is_nan());
}

#[test]
fn time_bounds_skip_records_outside_the_range() {
    let mut settings = ReadSettings::default();
    settings.set_start_time(3_000.into()).unwrap();
    settings.set_end_time(7_000.into()).unwrap();
    let data = read_single_file(two_channel_records(10, 5), settings);

    let store = data.channel_data(CH18).unwrap();
    assert_eq!(store.n_pings(), 5);
    assert!(store.ping_time().iter().all(|&t| (3_000..=7_000).contains(&t)));
    assert_eq!(data.end_time(), Some(7_000));
}

#[test]
fn ping_bounds_follow_the_channel_one_counter() {
    let mut settings = ReadSettings::default();
    settings.set_start_ping(3).unwrap();
    settings.set_end_ping(5).unwrap();
    let data = read_single_file(two_channel_records(10, 5), settings);

    assert_eq!(data.n_pings(), 10);
    assert_eq!(data.start_ping(), Some(3));
    assert_eq!(data.end_ping(), Some(5));
    let store = data.channel_data(CH38).unwrap();
    assert_eq!(store.n_pings(), 3);
    assert_eq!(store.ping_time(), &[3_000, 4_000, 5_000][..]);
}

#[test]
fn frequency_filter_drops_unselected_channels() {
    let mut settings = ReadSettings::default();
    settings.set_frequencies(vec![38_000.0]);
    let data = read_single_file(two_channel_records(5, 5), settings);

    assert_eq!(data.n_channels(), 1);
    assert_eq!(data.channel_ids(), &[CH38.to_string()][..]);
    assert!(matches!(
        data.channel_data(CH18),
        Err(EchoError::InvalidChannelSelector { .. })
    ));
}

#[test]
fn channel_id_filter_drops_unselected_channels() {
    let mut settings = ReadSettings::default();
    settings.set_channel_ids(vec![CH18.to_string()]);
    let data = read_single_file(two_channel_records(5, 5), settings);

    assert_eq!(data.n_channels(), 1);
    let store = data.channel_data_by_number(1).unwrap();
    assert_eq!(store.channel_id(), &[CH18.to_string()][..]);
    assert!(matches!(
        data.channel_data_by_number(2),
        Err(EchoError::InvalidChannelSelector { .. })
    ));
}

#[test]
fn bottom_datagrams_fan_out_through_the_file_channel_map() {
    let mut records = two_channel_records(3, 5);
    records.push(DatagramRecord::Bottom(BottomDatagram {
        timestamp: 2_000,
        depths: vec![101.0, 102.0],
        reflectivity: None,
    }));
    records.push(DatagramRecord::Bottom(BottomDatagram {
        timestamp: 3_000,
        depths: vec![103.0, 104.0],
        reflectivity: Some(vec![-30.0, -31.0]),
    }));
    // A detection with no matching ping is silently dropped.
    records.push(DatagramRecord::Bottom(BottomDatagram {
        timestamp: 999_000,
        depths: vec![1.0, 2.0],
        reflectivity: None,
    }));
    let data = read_single_file(records, ReadSettings::default());

    let bottom18 = data.channel_data(CH18).unwrap().detected_bottom().unwrap();
    assert!(bottom18[0].is_nan());
    assert_eq!(bottom18[1], 101.0);
    assert_eq!(bottom18[2], 103.0);

    let store38 = data.channel_data(CH38).unwrap();
    assert_eq!(store38.detected_bottom().unwrap()[2], 104.0);
    assert_eq!(store38.bottom_reflectivity().unwrap()[2], -31.0);
}

#[test]
fn read_bot_bounds_to_the_ingested_time_span() {
    let mut data = EchoData::new(ReadSettings::default());
    let mut raw_records = Some(two_channel_records(3, 5));
    data.read_raw(&["D2011-01.raw"], move |_| {
        Ok(replay(raw_records.take().unwrap_or_default()))
    })
    .unwrap();

    let bot_records = vec![
        config(0, &[(CH18, 18_000.0), (CH38, 38_000.0)]),
        DatagramRecord::Bottom(BottomDatagram {
            timestamp: 2_000,
            depths: vec![50.0, 51.0],
            reflectivity: None,
        }),
        // Outside the raw time span: skipped by the derived bounds.
        DatagramRecord::Bottom(BottomDatagram {
            timestamp: 500_000,
            depths: vec![60.0, 61.0],
            reflectivity: None,
        }),
    ];
    let mut bot_records = Some(bot_records);
    data.read_bot(&["D2011-01.bot"], move |_| {
        Ok(replay(bot_records.take().unwrap_or_default()))
    })
    .unwrap();

    let bottom = data.channel_data(CH18).unwrap().detected_bottom().unwrap();
    assert_eq!(bottom[1], 50.0);
    assert!(bottom[0].is_nan());
    assert!(bottom[2].is_nan());
    // The span itself was not disturbed by the bottom file.
    assert_eq!(data.end_time(), Some(3_000));
}

#[test]
fn nmea_tag_and_unknown_records_are_collected_or_skipped() {
    let mut records = two_channel_records(2, 5);
    records.insert(
        2,
        DatagramRecord::Nmea(NmeaDatagram {
            timestamp: 1_100,
            nmea_string: "$GPGGA,000001.00,5530.000,N,01230.000,E,1,08,1.0,5.0,M,,,,*47"
                .to_string(),
        }),
    );
    records.push(DatagramRecord::Tag(TagDatagram {
        timestamp: 2_500,
        text: "transect start".to_string(),
    }));
    records.push(DatagramRecord::Unknown {
        timestamp: 2_600,
        kind: "XML0".to_string(),
    });
    let data = read_single_file(records, ReadSettings::default());

    assert_eq!(data.nmea().len(), 1);
    assert_eq!(data.nmea().get(0).unwrap().0, 1_100);
    assert_eq!(data.annotations(), &[(2_500, "transect start".to_string())][..]);
    // The unknown record changed nothing but the end time.
    assert_eq!(data.channel_data(CH18).unwrap().n_pings(), 2);
}

#[test]
fn stores_are_trimmed_after_reading() {
    let data = read_single_file(two_channel_records(7, 5), ReadSettings::default());
    let store = data.channel_data(CH18).unwrap();
    // Physical length equals the logical ping count after the final trim.
    assert_eq!(store.power().unwrap().nrows(), 7);
    assert_eq!(store.ping_time().len(), 7);
}

#[test]
fn metadata_tracks_the_originating_file() {
    let mut data = EchoData::new(ReadSettings::default());
    let mut files = vec![
        Some(two_channel_records(2, 5)),
        Some({
            let mut records = vec![config(10_000, &[(CH18, 18_000.0), (CH38, 38_000.0)])];
            records.push(raw(11_000, 1, 18_000.0, 5));
            records.push(raw(11_000, 2, 38_000.0, 5));
            records
        }),
    ];
    let mut file_no = 0;
    data.read_raw(&["a.raw", "b.raw"], move |_| {
        let records = files[file_no].take().unwrap_or_default();
        file_no += 1;
        Ok(replay(records))
    })
    .unwrap();

    let store = data.channel_data(CH18).unwrap();
    assert_eq!(store.n_pings(), 3);
    let first = store.channel_metadata()[0].as_ref().unwrap();
    let last = store.channel_metadata()[2].as_ref().unwrap();
    assert_eq!(first.data_file, "a.raw");
    assert_eq!(last.data_file, "b.raw");
    assert_eq!(last.start_ping, 2);
    // start_time stays latched to the first file's header.
    assert_eq!(data.start_time(), Some(0));
}

#[test]
fn extended_configuration_is_retained_on_the_metadata() {
    let mut records = vec![
        config(0, &[(CH18, 18_000.0)]),
        DatagramRecord::ExtendedConfiguration {
            timestamp: 0,
            xml: "<configuration/>".to_string(),
        },
    ];
    records.push(raw(1_000, 1, 18_000.0, 5));
    let data = read_single_file(records, ReadSettings::default());

    let store = data.channel_data(CH18).unwrap();
    let metadata = store.channel_metadata()[0].as_ref().unwrap();
    assert_eq!(
        metadata.extended_configuration.as_deref(),
        Some("<configuration/>")
    );
}

#[test]
fn a_file_without_a_header_is_a_parse_error() {
    let mut data = EchoData::new(ReadSettings::default());
    let mut records = Some(vec![raw(1_000, 1, 18_000.0, 5)]);
    let res = data.read_raw(&["bad.raw"], move |_| {
        Ok(replay(records.take().unwrap_or_default()))
    });
    assert!(matches!(res, Err(EchoError::DatagramParse { .. })));

    let mut data = EchoData::new(ReadSettings::default());
    let res = data.read_raw(&["empty.raw"], |_| Ok(replay(Vec::new())));
    assert!(matches!(res, Err(EchoError::DatagramParse { .. })));
}
