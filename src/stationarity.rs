//! Stationarity - Spectral and amplitude change between adjacent frames.
//!
//! Documentation sources:
//! - Talkin (1995), section 3.4: voicing transition costs
//! - Itakura (1975): minimum prediction residual distance
//!
//! Voicing changes are cheap only where the signal's envelope supports a
//! real onset or offset. Two per-frame measures capture that:
//!
//! - Spectral stationarity `S_t = 0.2 / (I_t - 0.8)`, where `I_t` is the
//!   Itakura ratio between the LPC models of frames `t-1` and `t`.
//!   `S_t` is 1 for identical spectra and falls toward 0 as they diverge.
//! - Amplitude ratio `r_t = rms_t / rms_{t-1}`.
//!
//! Both are computed on Hanning-windowed segments of the original-rate
//! signal centred on each frame.

use ndarray::Array1;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::nccf::FramingParams;
use crate::params::RaptParams;
use crate::signal::AudioSignal;

/// Bounds of the RMS ratio; silence on either side saturates here.
const MAX_RMS_RATIO: f64 = 1.0e3;

/// White-noise correction applied to `r[0]` before Levinson-Durbin.
const NOISE_FLOOR: f64 = 1.0e-4;

/// Per-frame transition measures.
#[derive(Debug, Clone)]
pub struct Stationarity {
    /// Spectral stationarity per frame, in `[0, 1]`.
    spectral: Array1<f64>,
    /// RMS of frame `t` over RMS of frame `t-1`.
    amplitude_ratio: Array1<f64>,
}

impl Stationarity {
    /// Create from precomputed measures of equal length.
    pub fn new(spectral: Array1<f64>, amplitude_ratio: Array1<f64>) -> Self {
        Self {
            spectral,
            amplitude_ratio,
        }
    }

    /// Measures of a perfectly stationary signal with `n_frames` frames.
    pub fn uniform(n_frames: usize) -> Self {
        Self::new(Array1::ones(n_frames), Array1::ones(n_frames))
    }

    /// Get the spectral stationarity of every frame.
    #[inline]
    pub fn spectral(&self) -> &Array1<f64> {
        &self.spectral
    }

    /// Get the RMS ratio of every frame.
    #[inline]
    pub fn amplitude_ratio(&self) -> &Array1<f64> {
        &self.amplitude_ratio
    }

    /// Get the number of frames.
    #[inline]
    pub fn n_frames(&self) -> usize {
        self.spectral.len()
    }
}

/// LPC model and level of one analysis segment.
struct FrameModel {
    /// Autocorrelation, lags 0 to order.
    autocorrelation: Vec<f64>,
    /// Prediction error filter, `a[0] = 1`.
    lpc: Vec<f64>,
    /// Prediction residual energy.
    residual: f64,
    rms: f64,
}

/// Compute stationarity measures for every frame of `framing`.
///
/// Frame 0 has no predecessor and gets `S = 1`, `r = 1`.
///
/// # Errors
///
/// `Error::InvalidConfiguration` if the analysis window is shorter than two
/// samples.
pub fn compute_stationarity(
    signal: &AudioSignal,
    params: &RaptParams,
    framing: &FramingParams,
) -> Result<Stationarity> {
    let rate = signal.sample_rate() as f64;
    let window_samples = (params.stationarity_window_size * rate).round() as usize;
    if window_samples < 2 {
        return Err(Error::InvalidConfiguration(format!(
            "stationarity window of {}s is shorter than two samples at {} Hz",
            params.stationarity_window_size, rate
        )));
    }
    let order = params.lpc_order.min(window_samples - 1);
    let window = hanning_window(window_samples);
    let samples = signal.samples();

    let models: Vec<FrameModel> = (0..framing.max_frame_count)
        .into_par_iter()
        .map(|frame| {
            let center = framing.frame_start(frame) + framing.samples_per_frame / 2;
            let segment = extract_segment(samples, center, window_samples);
            let windowed: Vec<f64> = segment
                .iter()
                .zip(window.iter())
                .map(|(&s, &w)| s * w)
                .collect();
            frame_model(&windowed, order)
        })
        .collect();

    let mut spectral = Array1::ones(models.len());
    let mut amplitude_ratio = Array1::ones(models.len());
    for t in 1..models.len() {
        let (previous, current) = (&models[t - 1], &models[t]);
        let ratio = itakura_ratio(previous, current);
        spectral[t] = (0.2 / (ratio - 0.8)).clamp(0.0, 1.0);
        amplitude_ratio[t] = rms_ratio(previous.rms, current.rms);
    }

    Ok(Stationarity::new(spectral, amplitude_ratio))
}

/// Generate Hanning window.
fn hanning_window(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0];
    }

    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

/// Copy `len` samples centred on `center`, zero-padding at the boundaries.
fn extract_segment(samples: &[f64], center: usize, len: usize) -> Vec<f64> {
    let start = center as isize - (len / 2) as isize;
    let end = start + len as isize;
    let mut segment = vec![0.0; len];

    let src_start = 0.max(start) as usize;
    let src_end = (samples.len() as isize).min(end).max(0) as usize;
    if src_start < src_end {
        let dst_start = (src_start as isize - start) as usize;
        segment[dst_start..dst_start + (src_end - src_start)]
            .copy_from_slice(&samples[src_start..src_end]);
    }
    segment
}

/// Compute autocorrelation for lags 0 to max_lag.
fn compute_autocorrelation(samples: &[f64], max_lag: usize) -> Vec<f64> {
    let n = samples.len();
    let mut r = vec![0.0; max_lag + 1];

    for lag in 0..=max_lag.min(n.saturating_sub(1)) {
        r[lag] = samples[..n - lag]
            .iter()
            .zip(samples[lag..].iter())
            .map(|(&a, &b)| a * b)
            .sum();
    }

    r
}

fn frame_model(windowed: &[f64], order: usize) -> FrameModel {
    let mut autocorrelation = compute_autocorrelation(windowed, order);
    let rms = (autocorrelation[0] / windowed.len() as f64).sqrt();
    autocorrelation[0] *= 1.0 + NOISE_FLOOR;
    let (lpc, residual) = levinson_durbin(&autocorrelation, order);

    FrameModel {
        autocorrelation,
        lpc,
        residual,
        rms,
    }
}

/// Solve the autocorrelation normal equations.
///
/// Returns the prediction error filter (`a[0] = 1`) and its residual
/// energy. A silent segment yields the identity filter and zero residual.
fn levinson_durbin(r: &[f64], order: usize) -> (Vec<f64>, f64) {
    let mut a = vec![0.0; order + 1];
    a[0] = 1.0;

    let mut error = r[0];
    if error <= 0.0 {
        return (a, 0.0);
    }

    for i in 1..=order {
        let acc: f64 = r[i] + (1..i).map(|j| a[j] * r[i - j]).sum::<f64>();
        let k = -acc / error;

        let previous = a.clone();
        for j in 1..i {
            a[j] = previous[j] + k * previous[i - j];
        }
        a[i] = k;

        error *= 1.0 - k * k;
        if error <= 0.0 {
            break;
        }
    }

    (a, error.max(0.0))
}

/// `a^T R a` for the Toeplitz matrix built from `r`.
fn quadratic_form(a: &[f64], r: &[f64]) -> f64 {
    let mut total = 0.0;
    for (i, &ai) in a.iter().enumerate() {
        for (j, &aj) in a.iter().enumerate() {
            total += ai * aj * r[i.abs_diff(j)];
        }
    }
    total
}

/// Residual of the previous frame's model on the current frame, relative
/// to the current frame's own optimum. At least 1; 1 for silence.
fn itakura_ratio(previous: &FrameModel, current: &FrameModel) -> f64 {
    if current.residual <= 0.0 {
        return 1.0;
    }
    let cross = quadratic_form(&previous.lpc, &current.autocorrelation);
    (cross / current.residual).max(1.0)
}

fn rms_ratio(previous: f64, current: f64) -> f64 {
    match (previous > 0.0, current > 0.0) {
        (false, false) => 1.0,
        (false, true) => MAX_RMS_RATIO,
        (true, false) => 1.0 / MAX_RMS_RATIO,
        (true, true) => (current / previous).clamp(1.0 / MAX_RMS_RATIO, MAX_RMS_RATIO),
    }
}
