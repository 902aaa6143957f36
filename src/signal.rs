//! AudioSignal - Mono samples with an integer sample rate.
//!
//! This is the input type of the pitch tracker and the output of the
//! preprocessing stage. Two instances coexist during one run: the
//! original-rate signal and the coarse, downsampled copy used by the first
//! NCCF pass.
//!
//! # Amplitude Domain
//!
//! Samples are stored as `f64` but keep the amplitude domain of 16-bit PCM:
//! integer WAV data is not normalized, and float WAV data is scaled by 32768.
//! The second-pass regularizer (`additive_constant`) is sized for that
//! domain, so callers building signals by hand should do the same.
//!
//! # Downsampling
//!
//! The coarse rate is chosen so that the highest allowed F0 is covered by
//! roughly four samples per period (Talkin 1995, section 3.3). Resampling
//! uses `rubato`'s FFT resampler, which low-pass filters at the new Nyquist
//! frequency.

use std::path::Path;

use rubato::{FftFixedIn, Resampler};

use crate::error::{Error, Result};

/// Scale applied to float WAV samples to reach the 16-bit integer domain.
const FLOAT_TO_PCM16: f64 = 32768.0;

/// Input chunk requested from the FFT resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// Audio samples with sample rate.
///
/// Immutable once built. Only mono audio is held; multi-channel input is
/// mixed down by [`AudioSignal::from_interleaved`] and [`AudioSignal::from_file`].
///
/// # Example
///
/// ```
/// use rapt::AudioSignal;
///
/// let signal = AudioSignal::from_slice(&[0.0; 16000], 16000);
/// assert_eq!(signal.n_samples(), 16000);
/// assert!((signal.duration() - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSignal {
    /// Mono amplitude values.
    samples: Vec<f64>,

    /// Sample rate in Hz.
    sample_rate: u32,
}

impl AudioSignal {
    /// Create a signal from owned samples and a sample rate.
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Create a signal by copying a slice of samples.
    pub fn from_slice(samples: &[f64], sample_rate: u32) -> Self {
        Self::new(samples.to_vec(), sample_rate)
    }

    /// Mix interleaved floating-point samples down to mono.
    ///
    /// Each output sample is the mean of the channels of one frame. A
    /// trailing partial frame is dropped.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` if `channels` is zero.
    pub fn from_interleaved(samples: &[f64], channels: usize, sample_rate: u32) -> Result<Self> {
        let mono = mix_to_mono(samples, channels)?;
        Ok(Self::new(mono, sample_rate))
    }

    /// Mix interleaved integer samples down to mono.
    ///
    /// Like [`from_interleaved`](Self::from_interleaved), but each mean is
    /// truncated toward zero so the result stays in the integer domain of
    /// the input. No dithering is applied.
    pub fn from_interleaved_int(samples: &[i32], channels: usize, sample_rate: u32) -> Result<Self> {
        let as_float: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        let mut mono = mix_to_mono(&as_float, channels)?;
        if channels > 1 {
            mono.iter_mut().for_each(|s| *s = s.trunc());
        }
        Ok(Self::new(mono, sample_rate))
    }

    /// Load audio from a WAV file.
    ///
    /// Multi-channel files are mixed to mono.
    ///
    /// # Sample Format Handling
    ///
    /// - **Integer formats**: raw integer amplitudes, not normalized
    /// - **Float formats**: scaled by 32768 into the 16-bit domain
    ///
    /// # Errors
    ///
    /// - `Error::AudioRead` if the file cannot be read
    /// - `Error::UnsupportedFormat` for files declaring zero channels
    /// - `Error::InvalidInput` for a zero sample rate
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels as usize;

        if channels == 0 {
            return Err(Error::UnsupportedFormat(
                "WAV header declares zero channels".to_string(),
            ));
        }
        if spec.sample_rate == 0 {
            return Err(Error::InvalidInput("WAV sample rate is zero".to_string()));
        }

        match spec.sample_format {
            hound::SampleFormat::Float => {
                let samples = reader
                    .into_samples::<f32>()
                    .map(|s| s.map(|v| v as f64 * FLOAT_TO_PCM16))
                    .collect::<std::result::Result<Vec<f64>, _>>()?;
                Self::from_interleaved(&samples, channels, spec.sample_rate)
            }
            hound::SampleFormat::Int => {
                let samples = reader
                    .into_samples::<i32>()
                    .collect::<std::result::Result<Vec<i32>, _>>()?;
                Self::from_interleaved_int(&samples, channels, spec.sample_rate)
            }
        }
    }

    /// Get the audio samples.
    #[inline]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Get the sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of samples.
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Whether the signal holds no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the total duration in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.n_samples() as f64 / self.sample_rate as f64
    }

    /// Resample to `target_rate` with a band-limited FFT resampler.
    ///
    /// The output holds `round(n_samples × target_rate / sample_rate)`
    /// samples. The resampler's group delay is removed so that sample `i`
    /// of the output lines up in time with sample `i × ratio` of the input.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidInput` if the signal is empty
    /// - `Error::InvalidConfiguration` if either rate is zero
    /// - `Error::Resample` if `rubato` rejects the rates
    pub fn downsample(&self, target_rate: u32) -> Result<AudioSignal> {
        if self.is_empty() {
            return Err(Error::InvalidInput(
                "cannot resample an empty signal".to_string(),
            ));
        }
        if target_rate == 0 || self.sample_rate == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "cannot resample from {} Hz to {} Hz",
                self.sample_rate, target_rate
            )));
        }
        if target_rate == self.sample_rate {
            return Ok(self.clone());
        }

        let ratio = target_rate as f64 / self.sample_rate as f64;
        let new_length = (self.n_samples() as f64 * ratio).round() as usize;
        if new_length == 0 {
            return Ok(AudioSignal::new(Vec::new(), target_rate));
        }

        let mut resampler = FftFixedIn::<f64>::new(
            self.sample_rate as usize,
            target_rate as usize,
            RESAMPLE_CHUNK,
            2, // Sub-chunks
            1, // Channels
        )
        .map_err(|e| Error::Resample(e.to_string()))?;

        let delay = resampler.output_delay();
        let wanted = delay + new_length;
        // The FFT stage may buffer up to about one second of input before
        // emitting anything when the two rates share only a small divisor.
        let input_limit = (wanted as f64 / ratio).ceil() as usize
            + 2 * (self.sample_rate as usize + RESAMPLE_CHUNK);
        let mut output = Vec::with_capacity(wanted + RESAMPLE_CHUNK);
        let mut pos = 0;

        while output.len() < wanted {
            if pos > input_limit {
                return Err(Error::Resample(format!(
                    "resampler produced {} of {} frames after {} input frames",
                    output.len(),
                    wanted,
                    pos
                )));
            }
            let frames = resampler.input_frames_next();

            // Zero-pad past the end to flush the filter
            let mut chunk = vec![0.0; frames];
            if pos < self.samples.len() {
                let end = (pos + frames).min(self.samples.len());
                chunk[..end - pos].copy_from_slice(&self.samples[pos..end]);
            }
            pos += frames;

            let result = resampler
                .process(&[chunk], None)
                .map_err(|e| Error::Resample(e.to_string()))?;
            // Empty while the FFT stage is still filling up
            if let Some(channel) = result.first() {
                output.extend_from_slice(channel);
            }
        }

        let samples: Vec<f64> = output.into_iter().skip(delay).take(new_length).collect();
        Ok(AudioSignal::new(samples, target_rate))
    }
}

impl std::fmt::Display for AudioSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AudioSignal({} samples, {} Hz, {:.3}s)",
            self.n_samples(),
            self.sample_rate,
            self.duration()
        )
    }
}

/// Average interleaved channels frame by frame.
fn mix_to_mono(samples: &[f64], channels: usize) -> Result<Vec<f64>> {
    if channels == 0 {
        return Err(Error::InvalidInput(
            "channel count must be at least 1".to_string(),
        ));
    }
    if channels == 1 {
        return Ok(samples.to_vec());
    }

    Ok(samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().map(|&s| s / channels as f64).sum())
        .collect())
}

/// Compute the sample rate of the coarse first pass.
///
/// `round(rate / round(rate / (4 × maximum_f0)))`, which gives roughly four
/// samples per period of the highest allowed F0.
///
/// # Errors
///
/// `Error::InvalidConfiguration` when the inner divisor rounds to zero,
/// i.e. the sample rate is too low for `maximum_f0`.
///
/// # Example
///
/// ```
/// assert_eq!(rapt::calculate_downsampling_rate(48000, 500.0).unwrap(), 2000);
/// assert!(rapt::calculate_downsampling_rate(500, 500.0).is_err());
/// ```
pub fn calculate_downsampling_rate(sample_rate: u32, maximum_f0: f64) -> Result<u32> {
    if !(maximum_f0 > 0.0) {
        return Err(Error::InvalidConfiguration(format!(
            "maximum F0 must be positive, got {}",
            maximum_f0
        )));
    }

    let divisor = (sample_rate as f64 / (4.0 * maximum_f0)).round();
    if divisor <= 0.0 {
        return Err(Error::InvalidConfiguration(format!(
            "ratio of sample rate ({} Hz) to max F0 ({} Hz) leads to a zero downsampling divisor",
            sample_rate, maximum_f0
        )));
    }

    Ok((sample_rate as f64 / divisor).round() as u32)
}
