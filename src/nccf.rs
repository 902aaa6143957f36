//! NCCF - Normalized cross-correlation in two passes.
//!
//! Documentation sources:
//! - Talkin (1995), section 3.3: NCCF definition (Eq. 3), two-pass search
//!
//! For frame `i` and lag `k`, with `m = i × z` and window length `n`:
//!
//! ```text
//!            Σ_{j<n} (x[m+j] − μ_0)(x[m+j+k] − μ_k)
//! φ(i, k) = ─────────────────────────────────────────
//!                   sqrt(e_0 · e_k + A)
//! ```
//!
//! where `μ_0`/`μ_k` are the means of the two windows, `e_0`/`e_k` their
//! demeaned energies and `A` is zero on the first pass and
//! `additive_constant` on the second.
//!
//! The first pass runs over the downsampled signal and every lag in
//! `[sample_rate / F0_max, sample_rate / F0_min)`. The second pass runs over
//! the original signal, but only on lags near the first pass's marked
//! candidates. Frames are independent and computed in parallel.

use std::collections::BTreeSet;

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;

use crate::candidates::{select_candidates, Candidate};
use crate::error::{Error, Result};
use crate::params::RaptParams;
use crate::signal::AudioSignal;

/// Tolerance for converting second-based durations to sample counts.
///
/// Keeps products such as `0.0075 × 2000` from truncating to 14.
const SAMPLE_EPSILON: f64 = 1e-9;

/// Which NCCF pass a framing is derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NccfPass {
    /// Coarse pass on the downsampled signal; lags start at `rate / F0_max`.
    First,
    /// Refinement pass on the original signal; lags start at 0.
    Second,
}

/// Sample-domain quantities of one NCCF pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingParams {
    /// "n": samples correlated per lag.
    pub samples_correlated_per_lag: usize,
    /// First lag evaluated ("k" start).
    pub shortest_lag_per_frame: usize,
    /// One past the last lag evaluated ("K").
    pub longest_lag_per_frame: usize,
    /// "z": frame step in samples.
    pub samples_per_frame: usize,
    /// "M": number of frames.
    pub max_frame_count: usize,
}

impl FramingParams {
    /// Derive the framing of `pass` for `signal`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidConfiguration` if the correlation window or frame step
    /// is shorter than one sample, if the first pass would start at lag 0,
    /// or if the lag range is empty.
    pub fn new(signal: &AudioSignal, params: &RaptParams, pass: NccfPass) -> Result<Self> {
        params.validate()?;
        let rate = signal.sample_rate() as f64;

        let samples_correlated_per_lag = to_samples(params.correlation_window_size * rate);
        if samples_correlated_per_lag == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "correlation window of {}s is shorter than one sample at {} Hz",
                params.correlation_window_size, rate
            )));
        }

        let samples_per_frame = to_samples(params.frame_step_size * rate);
        if samples_per_frame == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "frame step of {}s is shorter than one sample at {} Hz",
                params.frame_step_size, rate
            )));
        }

        let shortest_lag_per_frame = match pass {
            NccfPass::First => {
                let lag = to_samples(rate / params.maximum_allowed_freq);
                if lag == 0 {
                    return Err(Error::InvalidConfiguration(format!(
                        "sample rate {} Hz is too low for maximum_allowed_freq {} Hz",
                        rate, params.maximum_allowed_freq
                    )));
                }
                lag
            }
            NccfPass::Second => 0,
        };

        let longest_lag_per_frame = to_samples(rate / params.minimum_allowed_freq);
        if longest_lag_per_frame <= shortest_lag_per_frame {
            return Err(Error::InvalidConfiguration(format!(
                "empty lag range [{}, {}) at {} Hz",
                shortest_lag_per_frame, longest_lag_per_frame, rate
            )));
        }

        let max_frame_count = (signal.n_samples() / samples_per_frame).saturating_sub(1);

        Ok(Self {
            samples_correlated_per_lag,
            shortest_lag_per_frame,
            longest_lag_per_frame,
            samples_per_frame,
            max_frame_count,
        })
    }

    /// Number of lags in `[shortest, longest)`.
    #[inline]
    pub fn lag_count(&self) -> usize {
        self.longest_lag_per_frame - self.shortest_lag_per_frame
    }

    /// First sample of frame `frame` ("m").
    #[inline]
    pub fn frame_start(&self, frame: usize) -> usize {
        frame * self.samples_per_frame
    }
}

/// Truncate a non-negative sample count, tolerating float round-off.
fn to_samples(value: f64) -> usize {
    if value.is_finite() && value > 0.0 {
        (value + SAMPLE_EPSILON).floor() as usize
    } else {
        0
    }
}

/// Demeaned reference window at offset 0 of a frame, with its energy.
struct ReferenceWindow {
    demeaned: Vec<f64>,
    energy: f64,
}

impl ReferenceWindow {
    /// Extract the window starting at `start`, or `None` past the end.
    fn new(samples: &[f64], start: usize, n: usize) -> Option<Self> {
        let window = samples.get(start..start + n)?;
        let mean = window.iter().sum::<f64>() / n as f64;
        let demeaned: Vec<f64> = window.iter().map(|&s| s - mean).collect();
        let energy = demeaned.iter().map(|&d| d * d).sum();
        Some(Self { demeaned, energy })
    }

    /// Correlate against the window `lag` samples later.
    ///
    /// Returns 0.0 when the lagged window runs past the end of the signal
    /// or when the denominator vanishes.
    fn correlate(&self, samples: &[f64], start: usize, lag: usize, additive_constant: f64) -> f64 {
        let n = self.demeaned.len();
        let lagged = match samples.get(start + lag..start + lag + n) {
            Some(window) => window,
            None => return 0.0,
        };

        let mean = lagged.iter().sum::<f64>() / n as f64;
        let mut numerator = 0.0;
        let mut energy = 0.0;
        for (&r, &s) in self.demeaned.iter().zip(lagged) {
            let d = s - mean;
            numerator += r * d;
            energy += d * d;
        }

        let denominator = (self.energy * energy + additive_constant).sqrt();
        if denominator > 0.0 {
            numerator / denominator
        } else {
            0.0
        }
    }
}

/// Dense result of the coarse pass.
#[derive(Debug, Clone)]
pub struct FirstPassNccf {
    /// Framing on the downsampled signal.
    framing: FramingParams,
    /// Correlations, frames × lags; column `c` is lag `shortest + c`.
    correlations: Array2<f64>,
    /// Per-frame maximum correlation (never below 0).
    max_correlations: Array1<f64>,
}

impl FirstPassNccf {
    /// Get the framing of this pass.
    #[inline]
    pub fn framing(&self) -> &FramingParams {
        &self.framing
    }

    /// Get the frames × lags correlation matrix.
    #[inline]
    pub fn correlations(&self) -> &Array2<f64> {
        &self.correlations
    }

    /// Get the per-frame maxima.
    #[inline]
    pub fn max_correlations(&self) -> ArrayView1<'_, f64> {
        self.max_correlations.view()
    }

    /// Get the number of frames.
    #[inline]
    pub fn n_frames(&self) -> usize {
        self.correlations.nrows()
    }

    /// All `(lag, correlation)` pairs of one frame.
    pub fn frame_correlations(&self, frame: usize) -> Vec<Candidate> {
        let shortest = self.framing.shortest_lag_per_frame;
        self.correlations
            .row(frame)
            .iter()
            .enumerate()
            .map(|(c, &correlation)| Candidate::new(shortest + c, correlation))
            .collect()
    }

    /// Marked candidates of one frame, in the downsampled lag domain.
    pub fn marked(&self, frame: usize, params: &RaptParams) -> Vec<Candidate> {
        select_candidates(
            &self.frame_correlations(frame),
            self.max_correlations[frame],
            params,
        )
    }

    /// Frame whose start is nearest to `position`, in coarse samples.
    ///
    /// A position up to one frame step past the last frame still maps to the
    /// last frame; anything further has no coarse frame.
    pub fn frame_near(&self, position: f64) -> Option<usize> {
        let n_frames = self.n_frames();
        if n_frames == 0 || !(position >= 0.0) {
            return None;
        }
        let frame = (position / self.framing.samples_per_frame as f64).round() as usize;
        match frame.cmp(&n_frames) {
            std::cmp::Ordering::Less => Some(frame),
            std::cmp::Ordering::Equal => Some(n_frames - 1),
            std::cmp::Ordering::Greater => None,
        }
    }
}

/// Run the coarse NCCF over every frame and every lag of `signal`.
///
/// Frame/lag cells whose windows would read past the end of the signal are
/// left at 0.0.
///
/// # Example
///
/// ```
/// use rapt::{first_pass_nccf, AudioSignal, RaptParams};
///
/// let coarse = AudioSignal::new(vec![0.0; 3600], 2000);
/// let pass = first_pass_nccf(&coarse, &RaptParams::default()).unwrap();
/// assert_eq!(pass.correlations().dim(), (179, 36));
/// ```
pub fn first_pass_nccf(signal: &AudioSignal, params: &RaptParams) -> Result<FirstPassNccf> {
    let framing = FramingParams::new(signal, params, NccfPass::First)?;
    let samples = signal.samples();
    let n_frames = framing.max_frame_count;
    let n_lags = framing.lag_count();

    let rows: Vec<Vec<f64>> = (0..n_frames)
        .into_par_iter()
        .map(|frame| {
            let start = framing.frame_start(frame);
            let mut row = vec![0.0; n_lags];
            if let Some(reference) =
                ReferenceWindow::new(samples, start, framing.samples_correlated_per_lag)
            {
                for (c, value) in row.iter_mut().enumerate() {
                    let lag = framing.shortest_lag_per_frame + c;
                    *value = reference.correlate(samples, start, lag, 0.0);
                }
            }
            row
        })
        .collect();

    let mut correlations = Array2::zeros((n_frames, n_lags));
    let mut max_correlations = Array1::zeros(n_frames);
    for (frame, row) in rows.into_iter().enumerate() {
        max_correlations[frame] = row.iter().copied().fold(0.0f64, f64::max);
        correlations.row_mut(frame).assign(&Array1::from(row));
    }

    tracing::debug!(
        frames = n_frames,
        lags = n_lags,
        shortest_lag = framing.shortest_lag_per_frame,
        "first NCCF pass complete"
    );

    Ok(FirstPassNccf {
        framing,
        correlations,
        max_correlations,
    })
}

/// Marked candidates of the refinement pass.
#[derive(Debug, Clone)]
pub struct SecondPassNccf {
    /// Framing on the original signal.
    framing: FramingParams,
    /// Marked candidates per frame, original-rate lags.
    candidates: Vec<Vec<Candidate>>,
    /// Per-frame maximum over the evaluated lags (never below 0).
    max_correlations: Array1<f64>,
}

impl SecondPassNccf {
    /// Get the framing of this pass.
    #[inline]
    pub fn framing(&self) -> &FramingParams {
        &self.framing
    }

    /// Get the marked candidates of every frame.
    #[inline]
    pub fn candidates(&self) -> &[Vec<Candidate>] {
        &self.candidates
    }

    /// Get the per-frame maxima.
    #[inline]
    pub fn max_correlations(&self) -> ArrayView1<'_, f64> {
        self.max_correlations.view()
    }

    /// Get the number of frames.
    #[inline]
    pub fn n_frames(&self) -> usize {
        self.candidates.len()
    }
}

/// Refine the first pass on the original-rate signal.
///
/// Each coarse candidate lag `k` maps to the original-rate lags between
/// `(k - 1) / ratio` and `(k + 1) / ratio`, where `ratio` is
/// `downsampled_rate / original_rate`. Only those lags are evaluated, with
/// `additive_constant` regularizing the denominator, and the results go
/// through the same selection rule as the first pass.
///
/// Frames are matched by time, not by index: the coarse frame step is
/// truncated to whole coarse samples and drifts from the original one.
/// Frames past the end of the first pass have no coarse candidates and
/// come out empty.
pub fn second_pass_nccf(
    signal: &AudioSignal,
    params: &RaptParams,
    first_pass: &FirstPassNccf,
    sample_rate_ratio: f64,
) -> Result<SecondPassNccf> {
    if !(sample_rate_ratio > 0.0) {
        return Err(Error::InvalidConfiguration(format!(
            "sample rate ratio must be positive, got {}",
            sample_rate_ratio
        )));
    }

    let framing = FramingParams::new(signal, params, NccfPass::Second)?;
    let samples = signal.samples();
    let n_frames = framing.max_frame_count;

    let coarse_frames: Vec<Option<usize>> = (0..n_frames)
        .map(|frame| first_pass.frame_near(framing.frame_start(frame) as f64 * sample_rate_ratio))
        .collect();
    let uncovered = coarse_frames.iter().filter(|c| c.is_none()).count();
    if uncovered > 0 {
        tracing::debug!(
            first_pass_frames = first_pass.n_frames(),
            second_pass_frames = n_frames,
            uncovered,
            "trailing frames have no coarse candidates"
        );
    }

    let results: Vec<(Vec<Candidate>, f64)> = (0..n_frames)
        .into_par_iter()
        .map(|frame| {
            let coarse_frame = match coarse_frames[frame] {
                Some(coarse_frame) => coarse_frame,
                None => return (Vec::new(), 0.0),
            };

            let lags = refinement_lags(
                &first_pass.marked(coarse_frame, params),
                sample_rate_ratio,
                framing.longest_lag_per_frame,
            );
            let start = framing.frame_start(frame);
            let reference =
                match ReferenceWindow::new(samples, start, framing.samples_correlated_per_lag) {
                    Some(reference) => reference,
                    None => return (Vec::new(), 0.0),
                };

            let evaluated: Vec<Candidate> = lags
                .into_iter()
                .map(|lag| {
                    let correlation =
                        reference.correlate(samples, start, lag, params.additive_constant);
                    Candidate::new(lag, correlation)
                })
                .collect();
            let max_correlation = evaluated
                .iter()
                .map(|c| c.correlation)
                .fold(0.0f64, f64::max);

            let marked = select_candidates(&evaluated, max_correlation, params);
            tracing::trace!(frame, marked = marked.len(), max_correlation, "second pass frame");
            (marked, max_correlation)
        })
        .collect();

    let mut candidates = Vec::with_capacity(n_frames);
    let mut max_correlations = Array1::zeros(n_frames);
    for (frame, (marked, max_correlation)) in results.into_iter().enumerate() {
        candidates.push(marked);
        max_correlations[frame] = max_correlation;
    }

    tracing::debug!(
        frames = n_frames,
        longest_lag = framing.longest_lag_per_frame,
        "second NCCF pass complete"
    );

    Ok(SecondPassNccf {
        framing,
        candidates,
        max_correlations,
    })
}

/// Original-rate lags to evaluate around coarse candidates, ascending.
///
/// Lag 0 is the unvoiced sentinel and is never produced.
fn refinement_lags(coarse: &[Candidate], ratio: f64, longest_lag: usize) -> BTreeSet<usize> {
    let mut lags = BTreeSet::new();
    for candidate in coarse {
        let k = candidate.lag as f64;
        let low = (((k - 1.0) / ratio).floor().max(1.0)) as usize;
        let high = (((k + 1.0) / ratio).ceil() as usize).min(longest_lag.saturating_sub(1));
        lags.extend(low..=high);
    }
    lags
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn sine(freq: f64, rate: u32, len: usize, amplitude: f64) -> AudioSignal {
        let samples = (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / rate as f64).sin())
            .collect();
        AudioSignal::new(samples, rate)
    }

    #[test]
    fn first_pass_framing_closed_form() {
        let signal = AudioSignal::new(vec![0.0; 3600], 2000);
        let framing = FramingParams::new(&signal, &RaptParams::default(), NccfPass::First).unwrap();
        assert_eq!(framing.samples_correlated_per_lag, 15);
        assert_eq!(framing.shortest_lag_per_frame, 4);
        assert_eq!(framing.longest_lag_per_frame, 40);
        assert_eq!(framing.samples_per_frame, 20);
        assert_eq!(framing.max_frame_count, 179);
        assert_eq!(framing.lag_count(), 36);
    }

    #[test]
    fn second_pass_framing_starts_at_zero() {
        let signal = AudioSignal::new(vec![0.0; 16000], 16000);
        let framing =
            FramingParams::new(&signal, &RaptParams::default(), NccfPass::Second).unwrap();
        assert_eq!(framing.shortest_lag_per_frame, 0);
        assert_eq!(framing.longest_lag_per_frame, 320);
        assert_eq!(framing.samples_correlated_per_lag, 120);
        assert_eq!(framing.samples_per_frame, 160);
        assert_eq!(framing.max_frame_count, 99);
    }

    #[test]
    fn rate_too_low_for_max_freq_fails_fast() {
        let signal = AudioSignal::new(vec![0.0; 1000], 400);
        let result = FramingParams::new(&signal, &RaptParams::default(), NccfPass::First);
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn zero_floor_fails_fast() {
        let signal = AudioSignal::new(vec![0.0; 1000], 2000);
        let params = RaptParams::default().with_frequency_range(0.0, 500.0);
        assert!(FramingParams::new(&signal, &params, NccfPass::First).is_err());
    }

    #[test]
    fn all_zero_signal_gives_zero_matrix() {
        let signal = AudioSignal::new(vec![0.0; 3600], 2000);
        let pass = first_pass_nccf(&signal, &RaptParams::default()).unwrap();
        assert_eq!(pass.correlations().dim(), (179, 36));
        assert!(pass.correlations().iter().all(|&v| v == 0.0));
        assert!(pass.max_correlations().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn short_signal_has_no_frames() {
        let signal = AudioSignal::new(vec![1.0; 30], 2000);
        let pass = first_pass_nccf(&signal, &RaptParams::default()).unwrap();
        assert_eq!(pass.n_frames(), 0);
    }

    #[test]
    fn trailing_frames_zero_past_the_end() {
        let signal = sine(100.0, 2000, 3600, 1000.0);
        let pass = first_pass_nccf(&signal, &RaptParams::default()).unwrap();
        let last = pass.n_frames() - 1;
        // m = 3560, n = 15: lags above 25 read past 3600
        let row = pass.correlations().row(last);
        for c in 0..row.len() {
            let lag = 4 + c;
            if 3560 + lag + 15 > 3600 {
                assert_eq!(row[c], 0.0, "lag {}", lag);
            }
        }
    }

    #[test]
    fn periodic_signal_peaks_at_its_period() {
        // 100 Hz at 2000 Hz: period of 20 samples
        let signal = sine(100.0, 2000, 4000, 1000.0);
        let pass = first_pass_nccf(&signal, &RaptParams::default()).unwrap();
        let row = pass.correlations().row(50);
        assert_abs_diff_eq!(row[20 - 4], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pass.max_correlations()[50], 1.0, epsilon = 1e-9);
        let marked = pass.marked(50, &RaptParams::default());
        assert_eq!(marked[0].lag, 20);
    }

    #[test]
    fn correlations_are_bounded() {
        let signal = sine(173.0, 2000, 4000, 1000.0);
        let pass = first_pass_nccf(&signal, &RaptParams::default()).unwrap();
        assert!(pass
            .correlations()
            .iter()
            .all(|&v| (-1.0 - 1e-9..=1.0 + 1e-9).contains(&v)));
    }

    #[test]
    fn refinement_lags_cover_scaled_neighbourhood() {
        let lags = refinement_lags(&[Candidate::new(13, 0.9)], 0.125, 320);
        assert_eq!(lags.iter().next(), Some(&96));
        assert_eq!(lags.iter().last(), Some(&112));
        assert!(!lags.contains(&0));
    }

    #[test]
    fn refinement_lags_clip_to_range() {
        let lags = refinement_lags(&[Candidate::new(40, 0.9)], 0.125, 320);
        assert_eq!(lags.iter().last(), Some(&319));
    }

    #[test]
    fn second_pass_refines_to_original_resolution() {
        let params = RaptParams::default();
        let original = sine(150.0, 16000, 16000, 10000.0);
        let coarse = original.downsample(2000).unwrap();
        let first = first_pass_nccf(&coarse, &params).unwrap();
        let second = second_pass_nccf(&original, &params, &first, 2000.0 / 16000.0).unwrap();

        assert_eq!(second.n_frames(), 99);
        // True period is 106.67 samples; its double competes at 213
        let marked = &second.candidates()[50];
        assert!(marked
            .iter()
            .any(|c| (106..=107).contains(&c.lag) && c.correlation > 0.95));
        assert!(marked[0].correlation > 0.95);
    }

    #[test]
    fn second_pass_regularizer_suppresses_near_silence() {
        let params = RaptParams::default();
        let original = sine(150.0, 16000, 16000, 0.01);
        let coarse = original.downsample(2000).unwrap();
        let first = first_pass_nccf(&coarse, &params).unwrap();
        let second = second_pass_nccf(&original, &params, &first, 2000.0 / 16000.0).unwrap();
        assert!(second.max_correlations().iter().all(|&v| v < 0.01));
    }

    #[test]
    fn coarse_frames_are_matched_by_time() {
        // 1857 Hz gives an 18-sample step (9.69 ms), not 10 ms
        let coarse = AudioSignal::new(vec![0.0; 18570], 1857);
        let first = first_pass_nccf(&coarse, &RaptParams::default()).unwrap();
        assert_eq!(first.framing().samples_per_frame, 18);
        assert_eq!(first.n_frames(), 1030);

        let ratio = 1857.0 / 13000.0;
        assert_eq!(first.frame_near(0.0), Some(0));
        assert_eq!(first.frame_near(810.0 * 130.0 * ratio), Some(836));
        assert_eq!(first.frame_near(1030.0 * 18.0), Some(1029));
        assert_eq!(first.frame_near(1040.0 * 18.0), None);
    }

    #[test]
    fn second_pass_follows_late_frequency_change() {
        let tone = |rate: u32, len: usize| {
            let samples = (0..len)
                .map(|i| {
                    let t = i as f64 / rate as f64;
                    let f = if t < 8.0 { 100.0 } else { 250.0 };
                    10000.0 * (2.0 * PI * f * t).sin()
                })
                .collect();
            AudioSignal::new(samples, rate)
        };
        let params = RaptParams::default();
        let original = tone(13000, 130000);
        let coarse = tone(1857, 18570);

        let first = first_pass_nccf(&coarse, &params).unwrap();
        let second = second_pass_nccf(&original, &params, &first, 1857.0 / 13000.0).unwrap();

        // 250 Hz is a 52-sample period at 13 kHz
        for frame in 810..990 {
            assert!(
                second.candidates()[frame]
                    .iter()
                    .any(|c| (51..=53).contains(&c.lag)),
                "frame {}: {:?}",
                frame,
                second.candidates()[frame]
            );
        }
    }

    #[test]
    fn non_positive_ratio_rejected() {
        let params = RaptParams::default();
        let signal = AudioSignal::new(vec![0.0; 4000], 2000);
        let first = first_pass_nccf(&signal, &params).unwrap();
        assert!(second_pass_nccf(&signal, &params, &first, 0.0).is_err());
    }
}
