//! # rapt
//!
//! Fundamental frequency (F0) tracking with the Robust Algorithm for Pitch
//! Tracking (RAPT).
//!
//! The implementation follows the published description of the algorithm:
//!
//! - Talkin (1995): "A Robust Algorithm for Pitch Tracking (RAPT)", in
//!   *Speech Coding and Synthesis*
//! - The parameter defaults of the ESPS `get_f0` tool described there
//!
//! # Pipeline
//!
//! - **Signal**: Audio loading, mono mixing and band-limited downsampling
//! - **NCCF**: Normalized cross-correlation, coarse pass over all lags and
//!   refinement pass near the coarse peaks
//! - **Candidates**: Thresholded, bounded per-frame hypothesis lists
//! - **Stationarity**: Spectral and amplitude change between frames
//! - **DP**: Lowest-cost voicing/period path through the hypotheses
//! - **Pitch**: The `estimate_pitch` entry point and the resulting track
//!
//! # Quick Start
//!
//! ```no_run
//! use rapt::{AudioSignal, RaptParams};
//!
//! // Load a WAV file (stereo is mixed to mono)
//! let signal = AudioSignal::from_file("speech.wav").unwrap();
//!
//! // Track F0 between 60 and 400 Hz, one value every 10 ms
//! let params = RaptParams::default().with_frequency_range(60.0, 400.0);
//! let track = rapt::estimate_pitch(&signal, &params).unwrap();
//!
//! // 0.0 marks unvoiced frames
//! println!("{} of {} frames voiced", track.voiced_count(), track.n_frames());
//! ```
//!
//! # Amplitude Domain
//!
//! Samples are expected in 16-bit PCM scale. `additive_constant` regularizes
//! the second-pass correlation for that scale; see [`AudioSignal`].
//!
//! # Features
//!
//! - `serialization`: `serde` support for [`RaptParams`]

// Module declarations
pub mod candidates;
pub mod dp;
pub mod error;
pub mod nccf;
pub mod params;
pub mod pitch;
pub mod signal;
pub mod stationarity;

// Re-export main types at crate root for convenient access
//
//   use rapt::{AudioSignal, RaptParams, estimate_pitch};
//
// Lower-level stages stay reachable through their modules:
//   use rapt::dp::{build_lattice, CostContext};

/// Error types for rapt operations.
pub use error::{Error, Result};

/// Tracker configuration.
pub use params::RaptParams;

/// Input signal and preprocessing.
///
/// - `AudioSignal`: Mono samples with sample rate
/// - `calculate_downsampling_rate`: Coarse rate for the first pass
pub use signal::{calculate_downsampling_rate, AudioSignal};

/// Normalized cross-correlation passes.
///
/// - `FramingParams`: Sample-domain window/lag/frame sizes of one pass
/// - `first_pass_nccf`: Coarse pass over every lag
/// - `second_pass_nccf`: Refinement near the coarse candidates
pub use nccf::{
    first_pass_nccf, second_pass_nccf, FirstPassNccf, FramingParams, NccfPass, SecondPassNccf,
};

/// Per-frame hypotheses.
pub use candidates::{select_candidates, Candidate};

/// Transition-cost modifiers.
pub use stationarity::{compute_stationarity, Stationarity};

/// Pitch tracking entry points and result types.
///
/// - `FrequencyTrack`: One F0 value per frame (0.0 = unvoiced)
/// - `estimate_pitch`: Track a signal
/// - `estimate_pitch_detailed`: Track a signal, keeping intermediate stages
/// - `rapt`: Track a WAV file
pub use pitch::{
    estimate_pitch, estimate_pitch_detailed, rapt, FrequencyTrack, Interpolation, RaptAnalysis,
};
