use std::path::Path;
use std::sync::Arc;

use crate::calibration::{CalParam, CalValue, Calibration};
use crate::convert::{BottomOptions, SpOptions, SvOptions};
use crate::datagram_structs::*;
use crate::enums::*;
use crate::grid::GetOptions;
use crate::store::{ChannelStore, PingSelection, StorageOptions};

/// A sample datagram with sane EK60-ish parameters; tests tweak fields.
fn test_datagram(timestamp: i64, count: usize) -> SampleDatagram {
    SampleDatagram {
        timestamp,
        channel: 1,
        mode: SampleMode::PowerAndAngle,
        transducer_depth: 5.0,
        frequency: 38_000.0,
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
    }
}

fn test_transceiver(channel_id: &str, frequency: f64) -> TransceiverConfig {
    TransceiverConfig {
        channel_id: channel_id.to_string(),
        beam_type: BeamType::Split,
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

fn test_metadata(channel_id: &str) -> MetadataHandle {
    let transceiver = test_transceiver(channel_id, 38_000.0);
    let config = ConfigDatagram {
        timestamp: 0,
        survey_name: "survey".to_string(),
        transect_name: "transect".to_string(),
        sounder_name: "ER60".to_string(),
        version: "2.4.3".to_string(),
        transceivers: vec![transceiver.clone()],
    };
    Arc::new(ChannelMetadata::new(
        Path::new("/data/cruise/D2011-01.raw"),
        &transceiver,
        &config,
        0,
        None,
    ))
}

mod sample_codec {
    use crate::sample_codec::*;

    #[test]
    fn power_round_trip_within_one_step() {
        for index in [-12_000i16, -256, -1, 0, 1, 255, 256, 8_191] {
            let db = power_index_to_db(&[index])[0];
            let back = power_db_to_index(db);
            assert!((back - index).abs() <= 1, "index {} came back as {}", index, back);
        }
    }

    #[test]
    fn electrical_angle_scale_is_exact() {
        assert_eq!(INDEX2ELEC, 180.0 / 128.0);
        let (alongship, athwartship) = unpack_angles(&[pack_angles(127, -128)]);
        assert_eq!(alongship[0], 127.0 * INDEX2ELEC);
        assert_eq!(athwartship[0], -128.0 * INDEX2ELEC);
    }

    #[test]
    fn angle_bytes_round_trip() {
        for alongship in [-128i8, -17, 0, 5, 127] {
            for athwartship in [-90i8, 0, 64] {
                let word = pack_angles(alongship, athwartship);
                let (a, b) = unpack_angles(&[word]);
                assert_eq!(a[0], f64::from(alongship) * INDEX2ELEC);
                assert_eq!(b[0], f64::from(athwartship) * INDEX2ELEC);
            }
        }
    }
}

mod timestamp {
    use crate::errors::EchoError;
    use crate::timestamp::*;

    #[test]
    fn parses_default_format_as_utc() {
        let ms = parse_time_str("1970-01-02 00:00:00", DEFAULT_TIME_FORMAT).unwrap();
        assert_eq!(ms, 86_400_000);
    }

    #[test]
    fn bad_time_string_is_an_error() {
        let res = parse_time_str("not a time", DEFAULT_TIME_FORMAT);
        assert!(matches!(res, Err(EchoError::InvalidTimeString { .. })));
    }

    #[test]
    fn millis_pass_through() {
        let ms = to_millis(&TimeValue::Millis(1234), DEFAULT_TIME_FORMAT).unwrap();
        assert_eq!(ms, 1234);
    }

    #[test]
    fn not_a_time_has_no_datetime() {
        assert!(millis_to_datetime(NOT_A_TIME).is_none());
        assert!(millis_to_datetime(0).is_some());
    }
}

mod settings {
    use crate::errors::EchoError;
    use crate::settings::ReadSettings;

    #[test]
    fn default_stores_everything() {
        let settings = ReadSettings::default();
        assert!(settings.get_store_power());
        assert!(settings.get_store_angles());
        assert!(settings.time_in_bounds(i64::MAX));
        assert!(settings.ping_in_bounds(1));
    }

    #[test]
    fn crossed_bounds_are_rejected() {
        let mut settings = ReadSettings::default();
        settings.set_end_ping(10).unwrap();
        let res = settings.set_start_ping(11);
        assert!(matches!(res, Err(EchoError::SettingsError { .. })));

        settings.set_start_sample(5).unwrap();
        assert!(settings.set_end_sample(4).is_err());
    }

    #[test]
    fn time_bounds_filter_inclusively() {
        let mut settings = ReadSettings::default();
        settings.set_start_time(1_000.into()).unwrap();
        settings.set_end_time(2_000.into()).unwrap();
        assert!(settings.time_in_bounds(1_000));
        assert!(settings.time_in_bounds(2_000));
        assert_ne!(settings.time_in_bounds(999), true);
        assert_ne!(settings.time_in_bounds(2_001), true);
    }
}

mod store {
    use super::*;
    use crate::sample_codec::INDEX2POWER;
    use crate::timestamp::NOT_A_TIME;

    #[test]
    fn ping_axis_grows_in_chunks() {
        let mut store = ChannelStore::new(
            "ch1",
            StorageOptions {
                chunk_width: 3,
                ..Default::default()
            },
        );
        for i in 0..7 {
            store.append_ping(&test_datagram(i * 1_000, 5), None, None);
        }
        assert_eq!(store.n_pings(), 7);
        assert_eq!(store.ping_capacity(), 9);
        assert_eq!(store.n_samples(), 5);

        store.trim();
        assert_eq!(store.ping_capacity(), 7);
        assert_eq!(store.power().unwrap().nrows(), 7);
    }

    #[test]
    fn sample_axis_grows_with_nan_pad() {
        let mut store = ChannelStore::new("ch1", Default::default());
        let mut short = test_datagram(0, 4);
        short.power = Some(vec![100i16; 4]);
        store.append_ping(&short, None, None);
        store.append_ping(&test_datagram(1_000, 6), None, None);

        assert_eq!(store.n_samples(), 6);
        let power = store.power().unwrap();
        assert_eq!(power[[0, 0]], 100.0 * INDEX2POWER);
        assert!(power[[0, 4]].is_nan());
        assert!(power[[0, 5]].is_nan());
        assert_eq!(power[[1, 5]], 0.0);
    }

    #[test]
    fn max_sample_number_truncates() {
        let mut store = ChannelStore::new(
            "ch1",
            StorageOptions {
                max_sample_number: Some(10),
                ..Default::default()
            },
        );
        store.append_ping(&test_datagram(0, 50), None, None);
        assert_eq!(store.n_samples(), 10);
        assert_eq!(store.sample_count()[0], 10);
    }

    #[test]
    fn rolling_store_drops_the_oldest_pings() {
        let mut store = ChannelStore::new(
            "ch1",
            StorageOptions {
                n_pings: 10,
                n_samples: 20,
                rolling: true,
                ..Default::default()
            },
        );
        for i in 0..15 {
            store.append_ping(&test_datagram(i * 1_000, 20), None, None);
        }
        assert_eq!(store.n_pings(), 10);
        assert_eq!(store.ping_capacity(), 10);
        // The first five appends were rolled out.
        assert_eq!(store.ping_time()[0], 5_000);
        assert_eq!(store.ping_time()[9], 14_000);
    }

    #[test]
    fn rolling_store_truncates_oversized_pings() {
        let mut store = ChannelStore::new(
            "ch1",
            StorageOptions {
                n_pings: 4,
                n_samples: 8,
                rolling: true,
                ..Default::default()
            },
        );
        store.append_ping(&test_datagram(0, 30), None, None);
        assert_eq!(store.n_samples(), 8);
        assert_eq!(store.sample_count()[0], 8);
        assert_eq!(store.power().unwrap().ncols(), 8);
    }

    #[test]
    fn sub_sample_window_sets_offset_and_count() {
        let mut store = ChannelStore::new("ch1", Default::default());
        let mut datagram = test_datagram(0, 10);
        datagram.power = Some((0..10).collect::<Vec<i16>>());
        store.append_ping(&datagram, Some(2), Some(5));

        assert_eq!(store.sample_offset()[0], 2);
        assert_eq!(store.sample_count()[0], 4);
        let power = store.power().unwrap();
        for k in 0..4 {
            assert_eq!(power[[0, k]], (k as f64 + 2.0) * INDEX2POWER);
        }
        assert!(power[[0, 4]].is_nan());
    }

    #[test]
    fn samples_beyond_count_are_nan() {
        let mut store = ChannelStore::new("ch1", Default::default());
        store.append_ping(&test_datagram(0, 8), None, None);
        store.append_ping(&test_datagram(1_000, 5), None, None);
        let power = store.power().unwrap();
        for k in store.sample_count()[1]..store.n_samples() {
            assert!(power[[1, k]].is_nan());
        }
    }

    #[test]
    fn bottom_attaches_to_matching_ping_times_only() {
        let mut store = ChannelStore::new("ch1", Default::default());
        for i in 0..3 {
            store.append_ping(&test_datagram(i * 1_000, 4), None, None);
        }
        store.append_bottom(1_000, 55.5, None);
        let bottom = store.detected_bottom().unwrap();
        assert!(bottom[0].is_nan());
        assert_eq!(bottom[1], 55.5);
        assert!(bottom[2].is_nan());

        // A detection preceding its raw ping is silently dropped.
        store.append_bottom(99_999, 12.0, None);
        let bottom = store.detected_bottom().unwrap();
        assert!(bottom.iter().all(|&d| d.is_nan() || d == 55.5));

        store.append_bottom(2_000, 60.0, Some(-32.0));
        let reflectivity = store.bottom_reflectivity().unwrap();
        assert!(reflectivity[1].is_nan());
        assert_eq!(reflectivity[2], -32.0);
    }

    #[test]
    fn metadata_is_shared_not_copied() {
        let mut store = ChannelStore::new("ch1", Default::default());
        let metadata = test_metadata("ch1");
        store.set_current_metadata(Arc::clone(&metadata));
        for i in 0..4 {
            store.append_ping(&test_datagram(i * 1_000, 4), None, None);
        }
        for handle in store.channel_metadata() {
            assert!(Arc::ptr_eq(handle.as_ref().unwrap(), &metadata));
        }
    }

    #[test]
    fn get_indices_respects_bounds_and_order() {
        let mut store = ChannelStore::new("ch1", Default::default());
        for i in 0..5 {
            store.append_ping(&test_datagram(i * 1_000, 4), None, None);
        }

        let by_time = store
            .get_indices(&PingSelection {
                start_time: Some(1_000),
                end_time: Some(3_000),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_time, vec![1, 2, 3]);

        let by_ping = store
            .get_indices(&PingSelection {
                start_ping: Some(2),
                end_ping: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_ping, vec![1, 2]);

        let explicit = store
            .get_indices(&PingSelection::indices(vec![4, 0, 2]))
            .unwrap();
        assert_eq!(explicit, vec![4, 0, 2]);

        let res = store.get_indices(&PingSelection::indices(vec![7]));
        assert!(matches!(
            res,
            Err(crate::errors::EchoError::IndexOutOfRange { idx: 7, n_pings: 5 })
        ));
    }

    #[test]
    fn insert_splices_rows() {
        let mut store = ChannelStore::new("ch1", Default::default());
        for i in 0..4 {
            store.append_ping(&test_datagram(i * 1_000, 4), None, None);
        }
        let mut other = ChannelStore::new("ch1", Default::default());
        other.append_ping(&test_datagram(10_000, 4), None, None);
        other.append_ping(&test_datagram(11_000, 4), None, None);

        store.insert(&other, 2).unwrap();
        assert_eq!(store.n_pings(), 6);
        assert_eq!(
            store.ping_time(),
            &[0, 1_000, 10_000, 11_000, 2_000, 3_000]
        );
        assert_eq!(store.power().unwrap().nrows(), 6);
    }

    #[test]
    fn insert_empty_leaves_a_nan_gap() {
        let mut store = ChannelStore::new("ch1", Default::default());
        for i in 0..3 {
            store.append_ping(&test_datagram(i * 1_000, 4), None, None);
        }
        store.insert_empty(2, 1).unwrap();
        assert_eq!(store.n_pings(), 5);
        assert_eq!(store.ping_time()[1], NOT_A_TIME);
        assert!(store.power().unwrap().row(1).iter().all(|v| v.is_nan()));
        assert_eq!(store.ping_time()[3], 1_000);
    }
}

mod calibration {
    use super::*;
    use crate::errors::EchoError;

    fn three_ping_store() -> ChannelStore {
        let mut store = ChannelStore::new("ch1", Default::default());
        store.set_current_metadata(test_metadata("ch1"));
        for i in 0..3 {
            let mut datagram = test_datagram(i * 1_000, 4);
            datagram.pulse_length = 512e-6;
            store.append_ping(&datagram, None, None);
        }
        store
    }

    #[test]
    fn scalar_override_broadcasts() {
        let store = three_ping_store();
        let mut cal = Calibration::new();
        cal.set(CalParam::Gain, CalValue::Scalar(27.0));
        let gain = store
            .calibration_param(Some(&cal), CalParam::Gain, &[0, 1, 2])
            .unwrap();
        assert_eq!(gain, vec![27.0, 27.0, 27.0]);
    }

    #[test]
    fn vector_override_shapes() {
        let store = three_ping_store();
        let mut cal = Calibration::new();

        cal.set(CalParam::Gain, CalValue::Vector(vec![26.0]));
        let gain = store
            .calibration_param(Some(&cal), CalParam::Gain, &[0, 2])
            .unwrap();
        assert_eq!(gain, vec![26.0, 26.0]);

        cal.set(CalParam::Gain, CalValue::Vector(vec![1.0, 2.0, 3.0]));
        let gain = store
            .calibration_param(Some(&cal), CalParam::Gain, &[2, 0])
            .unwrap();
        assert_eq!(gain, vec![3.0, 1.0]);

        cal.set(CalParam::Gain, CalValue::Vector(vec![8.0, 9.0]));
        let gain = store
            .calibration_param(Some(&cal), CalParam::Gain, &[2, 0])
            .unwrap();
        assert_eq!(gain, vec![8.0, 9.0]);

        cal.set(CalParam::Gain, CalValue::Vector(vec![1.0, 2.0, 3.0, 4.0, 5.0]));
        let res = store.calibration_param(Some(&cal), CalParam::Gain, &[0, 1, 2]);
        assert!(matches!(
            res,
            Err(EchoError::InvalidCalibrationShape { len: 5, .. })
        ));
    }

    #[test]
    fn store_vectors_and_metadata_are_fallbacks() {
        let store = three_ping_store();
        let interval = store
            .calibration_param(None, CalParam::SampleInterval, &[0, 1])
            .unwrap();
        assert_eq!(interval, vec![64e-6, 64e-6]);

        let gain = store
            .calibration_param(None, CalParam::Gain, &[0, 1, 2])
            .unwrap();
        assert_eq!(gain, vec![25.0, 25.0, 25.0]);
    }

    #[test]
    fn sa_correction_follows_the_pulse_length_table() {
        let store = three_ping_store();
        let sa = store
            .calibration_param(None, CalParam::SaCorrection, &[0])
            .unwrap();
        // pulse_length 512us matches the second table entry.
        assert_eq!(sa, vec![-0.3]);
    }

    #[test]
    fn missing_metadata_yields_nan() {
        let mut store = ChannelStore::new("ch1", Default::default());
        store.append_ping(&test_datagram(0, 4), None, None);
        let gain = store
            .calibration_param(None, CalParam::Gain, &[0])
            .unwrap();
        assert!(gain[0].is_nan());
    }

    #[test]
    fn from_store_collapses_constant_vectors() {
        let mut store = ChannelStore::new("ch1", Default::default());
        store.set_current_metadata(test_metadata("ch1"));
        for i in 0..3 {
            let mut datagram = test_datagram(i * 1_000, 4);
            if i == 2 {
                datagram.sound_velocity = 1_480.0;
            }
            store.append_ping(&datagram, None, None);
        }
        let mut cal = Calibration::new();
        cal.from_store(&store, None).unwrap();

        assert_eq!(
            cal.get(CalParam::SampleInterval),
            Some(&CalValue::Scalar(64e-6))
        );
        assert_eq!(
            cal.get(CalParam::SoundVelocity),
            Some(&CalValue::Vector(vec![1_500.0, 1_500.0, 1_480.0]))
        );
        assert_eq!(cal.channel_id, Some(vec!["ch1".to_string()]));
    }
}

mod resample {
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    use crate::enums::ResampleInterval;
    use crate::errors::EchoError;
    use crate::resample::*;

    #[test]
    fn expansion_repeats_samples() {
        let data: Array2<f64> = array![[1.0, 2.0, 3.0, 4.0], [5.0, 6.0, f64::NAN, f64::NAN]];
        let intervals = [64e-6, 128e-6];
        let unique = [64e-6, 128e-6];
        let offsets = [0.0, 0.0];
        let (out, target) = vertical_resample(
            &data,
            &intervals,
            &unique,
            ResampleInterval::Shortest,
            &offsets,
            0.0,
            true,
        )
        .unwrap();
        assert_eq!(target, 64e-6);
        assert_eq!(out.ncols(), 8);
        // The fine row is unchanged, the coarse row doubled.
        assert_eq!(out[[0, 3]], 4.0);
        assert!(out[[0, 4]].is_nan());
        assert_eq!(out[[1, 0]], 5.0);
        assert_eq!(out[[1, 1]], 5.0);
        assert_eq!(out[[1, 2]], 6.0);
        assert_eq!(out[[1, 3]], 6.0);
    }

    #[test]
    fn power_pooling_conserves_linear_energy() {
        let row = [10.0, 20.0, 30.0, 40.0];
        let data: Array2<f64> = array![[row[0], row[1], row[2], row[3]]];
        let (out, target) = vertical_resample(
            &data,
            &[64e-6],
            &[64e-6, 128e-6],
            ResampleInterval::Longest,
            &[0.0],
            0.0,
            true,
        )
        .unwrap();
        assert_eq!(target, 128e-6);
        assert_eq!(out.ncols(), 2);

        let linear = |db: f64| 10f64.powf(db / 10.0);
        let sum_in: f64 = row.iter().map(|&v| linear(v)).sum();
        let sum_out: f64 = out.row(0).iter().map(|&v| linear(v)).sum();
        assert_relative_eq!(sum_out, sum_in / 2.0, max_relative = 1e-12);
    }

    #[test]
    fn non_integer_target_is_rejected() {
        let data: Array2<f64> = array![[0.0, 0.0]];
        let res = vertical_resample(
            &data,
            &[64e-6],
            &[64e-6],
            ResampleInterval::Rate(48e-6),
            &[0.0],
            0.0,
            true,
        );
        assert!(matches!(res, Err(EchoError::InvalidResampleRate { .. })));
    }

    #[test]
    fn shift_aligns_offsets_with_nan_heads() {
        let data: Array2<f64> = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let out = vertical_shift(&data, &[0.0, 2.0], &[0.0, 2.0], 0.0);
        assert_eq!(out.ncols(), 5);
        assert_eq!(out[[0, 0]], 1.0);
        assert!(out[[0, 3]].is_nan());
        assert!(out[[1, 0]].is_nan());
        assert!(out[[1, 1]].is_nan());
        assert_eq!(out[[1, 2]], 4.0);
        assert_eq!(out[[1, 4]], 6.0);
    }

    #[test]
    fn interpolation_clamps_at_the_edges() {
        let target = [0.0, 1.0, 2.0, 5.0];
        let out = interp_row(&target, &[0.0, 2.0], &[0.0, 4.0]);
        assert_eq!(out, vec![0.0, 2.0, 4.0, 4.0]);
    }
}

mod grid {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn uniform_store_passes_through_unchanged() {
        let mut store = ChannelStore::new("ch1", Default::default());
        for i in 0..3 {
            let mut datagram = test_datagram(i * 1_000, 4);
            datagram.power = Some(vec![100, 200, 300, 400]);
            store.append_ping(&datagram, None, None);
        }
        let grid = store.get_power(None, &GetOptions::default()).unwrap();

        assert_eq!(grid.data.dim(), (3, 4));
        assert_eq!(grid.data_type, DataKind::Power);
        assert!(grid.is_log);
        let stored = store.power().unwrap();
        for i in 0..3 {
            for k in 0..4 {
                assert_eq!(grid.data[[i, k]], stored[[i, k]]);
            }
        }

        let thickness = 64e-6 * 1_500.0 / 2.0;
        assert_relative_eq!(grid.sample_thickness, thickness, max_relative = 1e-12);
        assert_eq!(grid.sample_offset, 0.0);
        for k in 1..grid.range.len() {
            assert_relative_eq!(
                grid.range[k] - grid.range[k - 1],
                thickness,
                max_relative = 1e-12
            );
        }
    }

    #[test]
    fn mixed_intervals_resample_to_the_shortest() {
        let mut store = ChannelStore::new("ch1", Default::default());
        for i in 0..4 {
            let mut datagram = test_datagram(i * 1_000, 4);
            if i >= 2 {
                datagram.sample_interval = 128e-6;
            }
            datagram.power = Some(vec![100 * (i as i16 + 1); 4]);
            store.append_ping(&datagram, None, None);
        }
        let grid = store.get_power(None, &GetOptions::default()).unwrap();

        assert_eq!(grid.data.ncols(), 8);
        let thickness = 64e-6 * 1_500.0 / 2.0;
        assert_relative_eq!(grid.sample_thickness, thickness, max_relative = 1e-12);
        // Coarse rows duplicate each sample, fine rows gain a NaN tail.
        assert_eq!(grid.data[[2, 0]], grid.data[[2, 1]]);
        assert!(grid.data[[0, 7]].is_nan());
    }

    #[test]
    fn majority_sound_speed_wins() {
        let mut store = ChannelStore::new("ch1", Default::default());
        for i in 0..3 {
            let mut datagram = test_datagram(i * 1_000, 4);
            if i == 2 {
                datagram.sound_velocity = 1_480.0;
            }
            datagram.power = Some(vec![700; 4]);
            store.append_ping(&datagram, None, None);
        }
        let grid = store.get_power(None, &GetOptions::default()).unwrap();
        assert_eq!(grid.sound_velocity, 1_500.0);
        // A constant row survives interpolation onto the common grid.
        for k in 0..4 {
            assert_relative_eq!(grid.data[[2, k]], grid.data[[0, k]], max_relative = 1e-12);
        }
    }

    #[test]
    fn empty_selection_yields_an_empty_grid() {
        let mut store = ChannelStore::new("ch1", Default::default());
        store.append_ping(&test_datagram(0, 4), None, None);
        let options = GetOptions {
            selection: PingSelection {
                start_time: Some(999_999),
                ..Default::default()
            },
            ..Default::default()
        };
        let grid = store.get_power(None, &options).unwrap();
        assert_eq!(grid.n_pings(), 0);
        assert!(grid.range.is_empty());
    }

    #[test]
    fn unstored_property_is_an_error() {
        let mut store = ChannelStore::new(
            "ch1",
            StorageOptions {
                store_power: false,
                ..Default::default()
            },
        );
        store.append_ping(&test_datagram(0, 4), None, None);
        let res = store.get_power(None, &GetOptions::default());
        assert!(matches!(
            res,
            Err(crate::errors::EchoError::UnknownProperty { .. })
        ));
    }
}

mod convert {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    /// One ping of 0 dB power with 0.1 m samples, so range 100 m lands on
    /// column 1000 exactly.
    fn sv_test_store() -> ChannelStore {
        let mut store = ChannelStore::new("ch1", Default::default());
        let mut datagram = test_datagram(0, 1_001);
        datagram.sample_interval = 0.1 / 750.0;
        store.append_ping(&datagram, None, None);
        store
    }

    fn sv_test_calibration() -> Calibration {
        let mut cal = Calibration::new();
        cal.set(CalParam::Gain, CalValue::Scalar(27.0));
        cal.set(CalParam::TransmitPower, CalValue::Scalar(1_000.0));
        cal.set(CalParam::EquivalentBeamAngle, CalValue::Scalar(-20.7));
        cal.set(CalParam::PulseLength, CalValue::Scalar(1_024e-6));
        cal.set(CalParam::AbsorptionCoefficient, CalValue::Scalar(0.01));
        cal.set(CalParam::SaCorrection, CalValue::Scalar(-0.5));
        cal.set(CalParam::SoundVelocity, CalValue::Scalar(1_500.0));
        cal
    }

    #[test]
    fn sv_matches_the_closed_form() {
        let store = sv_test_store();
        let cal = sv_test_calibration();
        let grid = store.get_sv(Some(&cal), &SvOptions::default()).unwrap();
        assert_eq!(grid.data_type, DataKind::Sv);
        assert!(grid.is_log);

        let c = 1_500.0;
        let wavelength: f64 = c / 38_000.0;
        let thickness = 0.1;
        let system_gain = 10.0
            * (1_000.0
                * 10f64.powf(27.0 / 10.0).powi(2)
                * wavelength.powi(2)
                * c
                * 1_024e-6
                * 10f64.powf(-20.7 / 10.0)
                / (32.0 * PI * PI))
                .log10();
        let corrected_range: f64 = 100.0 - 2.0 * thickness;
        let expected = 20.0 * corrected_range.log10() + 2.0 * 0.01 * corrected_range
            - system_gain
            - 2.0 * (-0.5);

        assert_relative_eq!(grid.range[1_000], 100.0, max_relative = 1e-12);
        assert_relative_eq!(grid.data[[0, 1_000]], expected, epsilon = 1e-6);
    }

    #[test]
    fn linear_sv_is_the_delogged_log_result() {
        let store = sv_test_store();
        let cal = sv_test_calibration();
        let log_grid = store.get_sv(Some(&cal), &SvOptions::default()).unwrap();
        let linear_grid = store
            .get_sv_linear(Some(&cal), &SvOptions::default())
            .unwrap();
        assert_eq!(linear_grid.data_type, DataKind::SvLinear);
        assert_ne!(linear_grid.is_log, true);
        assert_relative_eq!(
            linear_grid.data[[0, 500]],
            10f64.powf(log_grid.data[[0, 500]] / 10.0),
            max_relative = 1e-12
        );
    }

    #[test]
    fn sp_skips_the_tvg_range_correction_by_default() {
        let store = sv_test_store();
        let cal = sv_test_calibration();
        let grid = store.get_sp(Some(&cal), &SpOptions::default()).unwrap();
        assert_eq!(grid.data_type, DataKind::Sp);

        let c = 1_500.0;
        let wavelength: f64 = c / 38_000.0;
        let system_gain = 10.0
            * (1_000.0 * 10f64.powf(27.0 / 10.0).powi(2) * wavelength.powi(2) / (16.0 * PI * PI))
                .log10();
        let expected = 40.0 * 100f64.log10() + 2.0 * 0.01 * 100.0 - system_gain;
        assert_relative_eq!(grid.data[[0, 1_000]], expected, epsilon = 1e-6);
    }

    #[test]
    fn repeated_queries_are_identical() {
        let store = sv_test_store();
        let cal = sv_test_calibration();
        let first = store.get_sv(Some(&cal), &SvOptions::default()).unwrap();
        let second = store.get_sv(Some(&cal), &SvOptions::default()).unwrap();
        for (a, b) in first.data.iter().zip(second.data.iter()) {
            assert!((a.is_nan() && b.is_nan()) || a == b);
        }
    }

    #[test]
    fn heave_correction_moves_the_first_sample_to_draft_plus_heave() {
        let mut store = ChannelStore::new("ch1", Default::default());
        let mut datagram = test_datagram(0, 100);
        datagram.transducer_depth = 5.0;
        datagram.heave = 0.5;
        store.append_ping(&datagram, None, None);

        let options = SvOptions {
            heave_correct: true,
            ..Default::default()
        };
        let cal = sv_test_calibration();
        let grid = store.get_sv(Some(&cal), &options).unwrap();
        assert!(grid.range_is_depth);
        assert_relative_eq!(grid.range[0], 5.5, max_relative = 1e-12);
    }

    #[test]
    fn bottom_rescales_with_the_requested_sound_speed() {
        let mut store = ChannelStore::new("ch1", Default::default());
        for i in 0..2 {
            store.append_ping(&test_datagram(i * 1_000, 4), None, None);
            store.append_bottom(i * 1_000, 100.0, None);
        }

        // Same sound speed and depth reference: the recorded value verbatim.
        let recorded = store
            .get_bottom(
                None,
                &BottomOptions {
                    return_depth: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(recorded.data, vec![100.0, 100.0]);

        let mut cal = Calibration::new();
        cal.set(CalParam::SoundVelocity, CalValue::Scalar(1_450.0));
        let rescaled = store
            .get_bottom(
                Some(&cal),
                &BottomOptions {
                    return_depth: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_relative_eq!(
            rescaled.data[0],
            100.0 * 1_450.0 / 1_500.0,
            max_relative = 1e-12
        );

        // Range reference subtracts the transducer draft.
        let as_range = store.get_bottom(None, &BottomOptions::default()).unwrap();
        assert_relative_eq!(as_range.data[0], 95.0, max_relative = 1e-12);
    }

    #[test]
    fn physical_angles_normalize_the_electrical_values() {
        let mut store = ChannelStore::new("ch1", Default::default());
        let mut datagram = test_datagram(0, 4);
        datagram.angle = Some(vec![crate::sample_codec::pack_angles(10, -5); 4]);
        store.append_ping(&datagram, None, None);

        let mut cal = Calibration::new();
        cal.set(CalParam::AngleSensitivityAlongship, CalValue::Scalar(20.0));
        cal.set(CalParam::AngleSensitivityAthwartship, CalValue::Scalar(20.0));
        cal.set(CalParam::AngleOffsetAlongship, CalValue::Scalar(0.5));
        cal.set(CalParam::AngleOffsetAthwartship, CalValue::Scalar(-0.25));

        let (alongship, athwartship) = store
            .get_physical_angles(Some(&cal), &Default::default())
            .unwrap();
        assert_eq!(alongship.data_type, DataKind::AnglesAlongship);
        assert_eq!(athwartship.data_type, DataKind::AnglesAthwartship);

        let electrical_alongship = 10.0 * crate::sample_codec::INDEX2ELEC;
        let electrical_athwartship = -5.0 * crate::sample_codec::INDEX2ELEC;
        assert_relative_eq!(
            alongship.data[[0, 0]],
            electrical_alongship / 20.0 - 0.5,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            athwartship.data[[0, 0]],
            electrical_athwartship / 20.0 + 0.25,
            max_relative = 1e-12
        );
    }
}
