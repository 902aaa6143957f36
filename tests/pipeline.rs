//! End-to-end tracking of synthetic signals.

use std::f64::consts::PI;

use rapt::{estimate_pitch, estimate_pitch_detailed, AudioSignal, Error, RaptParams};

const RATE: u32 = 16000;

fn sine(frequency: f64, amplitude: f64, n_samples: usize) -> Vec<f64> {
    sine_at(RATE, frequency, amplitude, n_samples)
}

fn sine_at(rate: u32, frequency: f64, amplitude: f64, n_samples: usize) -> Vec<f64> {
    (0..n_samples)
        .map(|i| amplitude * (2.0 * PI * frequency * i as f64 / rate as f64).sin())
        .collect()
}

/// Deterministic pseudo-random noise in [-amplitude, amplitude].
fn noise(amplitude: f64, n_samples: usize) -> Vec<f64> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    (0..n_samples)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            amplitude * ((state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0)
        })
        .collect()
}

#[test]
fn steady_sine_is_tracked() {
    let signal = AudioSignal::new(sine(150.0, 10000.0, RATE as usize), RATE);
    let track = estimate_pitch(&signal, &RaptParams::default()).unwrap();

    assert_eq!(track.n_frames(), 99);
    for (i, &value) in track.values().iter().enumerate() {
        if value > 0.0 {
            assert!((value - 150.0).abs() <= 5.0, "frame {}: {} Hz", i, value);
        }
    }
    for i in 5..90 {
        assert!(track.is_voiced(i), "frame {} unvoiced", i);
    }
}

#[test]
fn steady_sine_is_tracked_at_common_wav_rates() {
    for &rate in &[44100u32, 22050, 11025] {
        let signal = AudioSignal::new(sine_at(rate, 150.0, 10000.0, rate as usize), rate);
        let track = estimate_pitch(&signal, &RaptParams::default()).unwrap();

        assert_eq!(track.n_frames(), 99, "{} Hz", rate);
        for i in 5..90 {
            let value = track.values()[i];
            assert!((value - 150.0).abs() <= 5.0, "{} Hz, frame {}: {} Hz", rate, i, value);
        }
    }
}

#[test]
fn late_frequency_change_is_tracked_on_time() {
    // At 13 kHz the coarse step is 18 samples at 1857 Hz (9.69 ms), so
    // coarse and fine frames drift apart over a long signal
    let rate = 13000u32;
    let samples: Vec<f64> = (0..10 * rate as usize)
        .map(|i| {
            let t = i as f64 / rate as f64;
            let f = if t < 8.0 { 100.0 } else { 250.0 };
            10000.0 * (2.0 * PI * f * t).sin()
        })
        .collect();
    let signal = AudioSignal::new(samples, rate);
    let analysis = estimate_pitch_detailed(&signal, &RaptParams::default()).unwrap();
    assert_eq!(analysis.downsampled_rate, 1857);

    let track = analysis.track;
    for i in 100..780 {
        let value = track.values()[i];
        assert!((value - 100.0).abs() <= 5.0, "frame {}: {} Hz", i, value);
    }
    for i in 810..990 {
        let value = track.values()[i];
        assert!((value - 250.0).abs() <= 8.0, "frame {}: {} Hz", i, value);
    }
}

#[test]
fn silence_is_unvoiced() {
    for &n in &[1600usize, 12345, 16000, 40000] {
        let signal = AudioSignal::new(vec![0.0; n], RATE);
        let track = estimate_pitch(&signal, &RaptParams::default()).unwrap();
        assert_eq!(track.n_frames(), n / 160 - 1);
        assert!(track.values().iter().all(|&v| v == 0.0));
    }
}

#[test]
fn frame_count_follows_frame_step() {
    let params = RaptParams::default().with_frame_step(0.005);
    let signal = AudioSignal::new(sine(200.0, 8000.0, 8000), RATE);
    let track = estimate_pitch(&signal, &params).unwrap();
    assert_eq!(track.n_frames(), 8000 / 80 - 1);
    assert!((track.frame_step() - 0.005).abs() < 1e-12);
}

#[test]
fn too_short_for_one_frame() {
    let signal = AudioSignal::new(sine(150.0, 10000.0, 100), RATE);
    let track = estimate_pitch(&signal, &RaptParams::default()).unwrap();
    assert_eq!(track.n_frames(), 0);
}

#[test]
fn octave_step_is_followed() {
    let mut samples = sine(120.0, 10000.0, 8000);
    samples.extend(sine(240.0, 10000.0, 8000));
    let signal = AudioSignal::new(samples, RATE);
    let track = estimate_pitch(&signal, &RaptParams::default()).unwrap();

    for i in 10..40 {
        let value = track.values()[i];
        assert!((value - 120.0).abs() <= 5.0, "frame {}: {} Hz", i, value);
    }
    for i in 60..90 {
        let value = track.values()[i];
        assert!((value - 240.0).abs() <= 8.0, "frame {}: {} Hz", i, value);
    }
}

#[test]
fn voicing_stops_with_the_tone() {
    let mut samples = sine(150.0, 10000.0, 8000);
    samples.extend(std::iter::repeat(0.0).take(8000));
    let signal = AudioSignal::new(samples, RATE);
    let track = estimate_pitch(&signal, &RaptParams::default()).unwrap();

    for i in 5..45 {
        assert!(track.is_voiced(i), "frame {} unvoiced", i);
    }
    for i in 60..track.n_frames() {
        assert_eq!(track.values()[i], 0.0, "frame {} voiced", i);
    }
}

#[test]
fn repeated_runs_agree() {
    let samples: Vec<f64> = sine(180.0, 6000.0, 12000)
        .into_iter()
        .zip(noise(3000.0, 12000))
        .map(|(s, n)| s + n)
        .collect();
    let signal = AudioSignal::new(samples, RATE);
    let params = RaptParams::default();

    let first = estimate_pitch(&signal, &params).unwrap();
    for _ in 0..3 {
        assert_eq!(estimate_pitch(&signal, &params).unwrap(), first);
    }
}

#[test]
fn values_stay_in_search_range() {
    let samples: Vec<f64> = sine(130.0, 5000.0, 16000)
        .into_iter()
        .zip(noise(4000.0, 16000))
        .map(|(s, n)| s + n)
        .collect();
    let signal = AudioSignal::new(samples, RATE);
    let params = RaptParams::default().with_frequency_range(80.0, 400.0);
    let track = estimate_pitch(&signal, &params).unwrap();

    // Refined lags may sit just outside the coarse range
    for &value in track.values().iter().filter(|&&v| v > 0.0) {
        assert!(value > 0.0 && value.is_finite());
        assert!(value >= 16000.0 / 200.0 - 1.0, "{} Hz", value);
        assert!(value <= 16000.0 / 28.0, "{} Hz", value);
    }
}

#[test]
fn detailed_run_matches_plain_run() {
    let signal = AudioSignal::new(sine(200.0, 10000.0, 8000), RATE);
    let params = RaptParams::default();
    let analysis = estimate_pitch_detailed(&signal, &params).unwrap();

    assert_eq!(analysis.track, estimate_pitch(&signal, &params).unwrap());
    assert_eq!(analysis.downsampled_rate, 2000);
    assert_eq!(analysis.first_pass.framing().shortest_lag_per_frame, 4);
    assert_eq!(analysis.second_pass.framing().longest_lag_per_frame, 320);
    for (frame, marked) in analysis.second_pass.candidates().iter().enumerate() {
        assert!(marked.len() < params.max_hypotheses_per_frame);
        assert!(marked.iter().all(|c| c.lag > 0 && c.lag < 320), "frame {}", frame);
    }
}

#[test]
fn empty_signal_is_an_input_error() {
    let signal = AudioSignal::new(Vec::new(), RATE);
    assert!(matches!(
        estimate_pitch(&signal, &RaptParams::default()),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn invalid_configurations_are_rejected() {
    let signal = AudioSignal::new(sine(150.0, 10000.0, 4000), RATE);

    let tiny_window = RaptParams {
        correlation_window_size: 1e-5,
        ..RaptParams::default()
    };
    assert!(matches!(
        estimate_pitch(&signal, &tiny_window),
        Err(Error::InvalidConfiguration(_))
    ));

    let no_step = RaptParams::default().with_frame_step(0.0);
    assert!(matches!(
        estimate_pitch(&signal, &no_step),
        Err(Error::InvalidConfiguration(_))
    ));

    let low_rate = AudioSignal::new(vec![0.0; 400], 200);
    assert!(matches!(
        estimate_pitch(&low_rate, &RaptParams::default()),
        Err(Error::InvalidConfiguration(_))
    ));
}
