//! Error types for rapt.
//!
//! Every fallible operation in the crate returns [`Result<T>`]. Failures are
//! terminal for the invocation: the tracker is a pure function of its inputs,
//! so there is nothing to retry.
//!
//! Frame/lag combinations that would read past the end of the signal are not
//! errors. The NCCF engine records a correlation of `0.0` for such cells.

use thiserror::Error;

/// Result type alias using rapt's Error type.
///
/// # Example
///
/// ```no_run
/// use rapt::{AudioSignal, RaptParams, Result};
///
/// fn track(path: &str) -> Result<Vec<f64>> {
///     let signal = AudioSignal::from_file(path)?;
///     let track = rapt::estimate_pitch(&signal, &RaptParams::default())?;
///     Ok(track.to_vec())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while tracking pitch.
#[derive(Error, Debug)]
pub enum Error {
    /// A derived quantity (downsampling divisor, lag range, frame size)
    /// evaluates to zero or a negative value.
    ///
    /// Raised before any correlation work begins. Common causes:
    /// - `minimum_allowed_freq <= 0` or `minimum_allowed_freq >= maximum_allowed_freq`
    /// - sample rate too low relative to `maximum_allowed_freq`
    /// - frame step or correlation window shorter than one sample
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The sample buffer is empty or otherwise unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error reading audio file.
    ///
    /// This wraps errors from the `hound` WAV library.
    #[error("Failed to read audio file: {0}")]
    AudioRead(#[from] hound::Error),

    /// Audio file has a sample layout the reader cannot interpret.
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Resampling for the coarse pass failed.
    #[error("Resampling failed: {0}")]
    Resample(String),
}
