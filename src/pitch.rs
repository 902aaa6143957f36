//! Pitch - The RAPT fundamental frequency tracker.
//!
//! Documentation sources:
//! - Talkin (1995): "A Robust Algorithm for Pitch Tracking (RAPT)"
//!
//! Pipeline for one signal:
//! 1. Choose a coarse rate (about four samples per period of `F0_max`)
//!    and downsample
//! 2. First NCCF pass over every lag of the coarse signal
//! 3. Second NCCF pass on the original signal, near the coarse candidates
//! 4. Spectral/amplitude stationarity per original-rate frame
//! 5. Dynamic programming over the marked candidates
//!
//! The result is one value per frame: the F0 in Hz, or 0.0 where the
//! frame was judged unvoiced.

use std::path::Path;

use ndarray::Array1;

use crate::dp::{find_best_path, CostContext};
use crate::error::{Error, Result};
use crate::nccf::{first_pass_nccf, second_pass_nccf, FirstPassNccf, SecondPassNccf};
use crate::params::RaptParams;
use crate::signal::{calculate_downsampling_rate, AudioSignal};
use crate::stationarity::{compute_stationarity, Stationarity};

/// Interpolation method for getting values at specific times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Value of the nearest frame.
    Nearest,

    /// Linear interpolation between the two adjacent frames.
    Linear,

    /// Cubic (Catmull-Rom) interpolation over four surrounding frames.
    ///
    /// Falls back to linear when any of the four frames is unvoiced.
    Cubic,
}

/// F0 contour, one value per analysis frame.
///
/// Frame `i` starts at `i × frame_step` seconds. Unvoiced frames hold 0.0.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyTrack {
    /// F0 in Hz, 0.0 where unvoiced.
    values: Array1<f64>,

    /// Time between frame starts in seconds.
    frame_step: f64,
}

impl FrequencyTrack {
    /// Create a new track.
    pub fn new(values: Array1<f64>, frame_step: f64) -> Self {
        Self { values, frame_step }
    }

    /// Get the per-frame values in Hz.
    #[inline]
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Get the number of frames.
    #[inline]
    pub fn n_frames(&self) -> usize {
        self.values.len()
    }

    /// Get the time step between frames.
    #[inline]
    pub fn frame_step(&self) -> f64 {
        self.frame_step
    }

    /// Get array of frame start times.
    pub fn times(&self) -> Array1<f64> {
        Array1::from_iter((0..self.n_frames()).map(|i| i as f64 * self.frame_step))
    }

    /// Number of voiced frames.
    pub fn voiced_count(&self) -> usize {
        self.values.iter().filter(|&&v| v > 0.0).count()
    }

    /// Whether frame `index` is voiced (false when out of range).
    pub fn is_voiced(&self, index: usize) -> bool {
        self.values.get(index).is_some_and(|&v| v > 0.0)
    }

    /// Copy the values into a plain vector.
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.to_vec()
    }

    /// Get the F0 at a specific time.
    ///
    /// # Returns
    ///
    /// F0 in Hz, or None if the time is outside the analysis range or no
    /// voiced frame is close enough to answer.
    ///
    /// # Boundary Behavior
    ///
    /// Returns None if time is more than half a frame step before the first
    /// frame or after the last frame. Unvoiced frames are never averaged in;
    /// a partially voiced neighbourhood answers with the nearest voiced frame.
    pub fn get_value_at_time(&self, time: f64, interpolation: Interpolation) -> Option<f64> {
        let n = self.n_frames();
        if n == 0 || !(self.frame_step > 0.0) {
            return None;
        }

        let idx_float = time / self.frame_step;
        if idx_float < -0.5 || idx_float > n as f64 - 0.5 {
            return None;
        }

        let voiced = |i: usize| Some(self.values[i]).filter(|&v| v > 0.0);
        let clamp = |i: isize| i.clamp(0, n as isize - 1) as usize;

        let idx = idx_float.floor() as isize;
        let frac = idx_float - idx as f64;
        let (i1, i2) = (clamp(idx), clamp(idx + 1));

        let linear = || match (voiced(i1), voiced(i2)) {
            (Some(f1), Some(f2)) => Some(f1 * (1.0 - frac) + f2 * frac),
            (Some(f1), None) if frac < 0.5 => Some(f1),
            (_, Some(f2)) => Some(f2),
            (f1, None) => f1,
        };

        match interpolation {
            Interpolation::Nearest => voiced((idx_float.round() as usize).min(n - 1)),
            Interpolation::Linear => linear(),
            Interpolation::Cubic => {
                let points = (
                    voiced(clamp(idx - 1)),
                    voiced(i1),
                    voiced(i2),
                    voiced(clamp(idx + 2)),
                );
                match points {
                    (Some(y0), Some(y1), Some(y2), Some(y3)) => {
                        let t = frac;
                        let t2 = t * t;
                        let t3 = t2 * t;
                        Some(
                            0.5 * ((2.0 * y1)
                                + (-y0 + y2) * t
                                + (2.0 * y0 - 5.0 * y1 + 4.0 * y2 - y3) * t2
                                + (-y0 + 3.0 * y1 - 3.0 * y2 + y3) * t3),
                        )
                    }
                    _ => linear(),
                }
            }
        }
    }
}

/// Intermediate results of one tracker run.
#[derive(Debug, Clone)]
pub struct RaptAnalysis {
    /// Sample rate of the coarse signal.
    pub downsampled_rate: u32,
    /// Coarse correlations over every lag.
    pub first_pass: FirstPassNccf,
    /// Refined candidates on the original signal.
    pub second_pass: SecondPassNccf,
    /// Transition-cost modifiers per frame.
    pub stationarity: Stationarity,
    /// Final contour.
    pub track: FrequencyTrack,
}

/// Estimate the F0 contour of `signal`.
///
/// The track has `floor(n_samples / z) - 1` frames, with `z` the frame
/// step in samples.
///
/// # Errors
///
/// - `Error::InvalidConfiguration` for invalid parameters, or a sample rate
///   too low for `maximum_allowed_freq`
/// - `Error::InvalidInput` for an empty signal or a zero sample rate
///
/// # Example
///
/// ```
/// use rapt::{estimate_pitch, AudioSignal, RaptParams};
///
/// let signal = AudioSignal::new(vec![0.0; 16000], 16000);
/// let track = estimate_pitch(&signal, &RaptParams::default()).unwrap();
/// assert_eq!(track.n_frames(), 99);
/// assert_eq!(track.voiced_count(), 0);
/// ```
pub fn estimate_pitch(signal: &AudioSignal, params: &RaptParams) -> Result<FrequencyTrack> {
    estimate_pitch_detailed(signal, params).map(|analysis| analysis.track)
}

/// Like [`estimate_pitch`], but keep every intermediate stage.
pub fn estimate_pitch_detailed(signal: &AudioSignal, params: &RaptParams) -> Result<RaptAnalysis> {
    params.validate()?;
    if signal.is_empty() {
        return Err(Error::InvalidInput("signal has no samples".to_string()));
    }
    if signal.sample_rate() == 0 {
        return Err(Error::InvalidInput("sample rate is zero".to_string()));
    }

    let rate = signal.sample_rate();
    let downsampled_rate = calculate_downsampling_rate(rate, params.maximum_allowed_freq)?;
    tracing::debug!(sample_rate = rate, downsampled_rate, "downsampling for first pass");

    let coarse = signal.downsample(downsampled_rate)?;
    let first_pass = first_pass_nccf(&coarse, params)?;

    let ratio = downsampled_rate as f64 / rate as f64;
    let second_pass = second_pass_nccf(signal, params, &first_pass, ratio)?;
    let framing = *second_pass.framing();
    tracing::debug!(
        samples_correlated_per_lag = framing.samples_correlated_per_lag,
        longest_lag = framing.longest_lag_per_frame,
        samples_per_frame = framing.samples_per_frame,
        frames = framing.max_frame_count,
        "second pass framing"
    );

    let stationarity = compute_stationarity(signal, params, &framing)?;

    let context = CostContext {
        params,
        longest_lag: framing.longest_lag_per_frame,
        max_correlations: second_pass.max_correlations(),
        stationarity: &stationarity,
    };
    let path = find_best_path(second_pass.candidates(), &context)?;

    let values: Array1<f64> = path.iter().map(|c| c.frequency(rate as f64)).collect();
    let track = FrequencyTrack::new(values, framing.samples_per_frame as f64 / rate as f64);
    tracing::debug!(
        frames = track.n_frames(),
        voiced = track.voiced_count(),
        "pitch tracking complete"
    );

    Ok(RaptAnalysis {
        downsampled_rate,
        first_pass,
        second_pass,
        stationarity,
        track,
    })
}

/// Load a WAV file and track its F0.
///
/// Stereo files are mixed to mono first.
pub fn rapt<P: AsRef<Path>>(path: P, params: &RaptParams) -> Result<FrequencyTrack> {
    let signal = AudioSignal::from_file(path)?;
    estimate_pitch(&signal, params)
}
