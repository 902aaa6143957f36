//! RaptParams - Tunable constants for the pitch tracker.
//!
//! Documentation sources:
//! - Talkin (1995): "A Robust Algorithm for Pitch Tracking (RAPT)", in
//!   Kleijn & Paliwal (eds.), Speech Coding and Synthesis, Table 1
//! - ESPS `get_f0` defaults
//!
//! The parameter set is created once per invocation and passed by reference
//! through every stage. Nothing in the pipeline mutates it.

use crate::error::{Error, Result};

/// Parameters for the RAPT pitch tracker.
///
/// The [`Default`] implementation carries the published defaults, tuned for
/// ordinary human speech sampled as 16-bit PCM.
///
/// # Example
///
/// ```
/// use rapt::RaptParams;
///
/// let params = RaptParams::default()
///     .with_frequency_range(75.0, 400.0)
///     .with_doubling_cost(15.0);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct RaptParams {
    /// Highest F0 searched for, in Hz ("F0_max").
    ///
    /// Also fixes the coarse-pass sample rate at roughly four samples per
    /// period of this frequency. The default is `500.0`.
    pub maximum_allowed_freq: f64,

    /// Lowest F0 searched for, in Hz ("F0_min").
    ///
    /// The default is `50.0`.
    pub minimum_allowed_freq: f64,

    /// Analysis frame step, in seconds ("t").
    ///
    /// The default is `0.01`.
    pub frame_step_size: f64,

    /// Correlation window, in seconds ("w").
    ///
    /// The default is `0.0075`.
    pub correlation_window_size: f64,

    /// Hypotheses per frame, counting the unvoiced hypothesis ("N_CANDS").
    ///
    /// The default is `20`.
    pub max_hypotheses_per_frame: usize,

    /// Fraction of a frame's maximum correlation a lag must reach to be
    /// marked as a candidate ("CAND_TR").
    ///
    /// The default is `0.3`.
    pub min_acceptable_peak_val: f64,

    /// Regularizer added under the square root of the second-pass
    /// denominator ("A_FACT").
    ///
    /// Sized for 16-bit integer amplitudes. The default is `10000.0`.
    pub additive_constant: f64,

    /// Cost of an octave jump between consecutive voiced frames ("DOUBLE_C").
    ///
    /// The default is `0.35`.
    pub doubling_cost: f64,

    /// Bias added to the unvoiced local cost ("VO_BIAS").
    ///
    /// Positive values make unvoiced decisions more expensive. The default
    /// is `0.0`.
    pub voicing_bias: f64,

    /// Weight penalizing long lags in the voiced local cost ("LAG_WT").
    ///
    /// The default is `0.3`.
    pub lag_weight: f64,

    /// Weight of the frequency-change term between voiced frames ("FREQ_WT").
    ///
    /// The default is `0.02`.
    pub freq_weight: f64,

    /// Fixed cost of any voicing-state change ("VTRAN_C").
    ///
    /// The default is `0.005`.
    pub transition_cost: f64,

    /// Weight of the spectral-stationarity term on voicing changes ("VTR_S_C").
    ///
    /// The default is `0.5`.
    pub spec_mod_transition_cost: f64,

    /// Weight of the RMS-ratio term on voicing changes ("VTR_A_C").
    ///
    /// The default is `0.5`.
    pub amp_mod_transition_cost: f64,

    /// Hanning window used for the spectral and amplitude measures, in seconds.
    ///
    /// The default is `0.03`.
    pub stationarity_window_size: f64,

    /// LPC order of the spectral-stationarity measure.
    ///
    /// The default is `12`.
    pub lpc_order: usize,
}

impl Default for RaptParams {
    fn default() -> Self {
        Self {
            maximum_allowed_freq: 500.0,
            minimum_allowed_freq: 50.0,
            frame_step_size: 0.01,
            correlation_window_size: 0.0075,
            max_hypotheses_per_frame: 20,
            min_acceptable_peak_val: 0.3,
            additive_constant: 10000.0,
            doubling_cost: 0.35,
            voicing_bias: 0.0,
            lag_weight: 0.3,
            freq_weight: 0.02,
            transition_cost: 0.005,
            spec_mod_transition_cost: 0.5,
            amp_mod_transition_cost: 0.5,
            stationarity_window_size: 0.03,
            lpc_order: 12,
        }
    }
}

impl RaptParams {
    /// Set the F0 search range in Hz.
    pub fn with_frequency_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum_allowed_freq = minimum;
        self.maximum_allowed_freq = maximum;
        self
    }

    /// Set the frame step in seconds.
    pub fn with_frame_step(mut self, seconds: f64) -> Self {
        self.frame_step_size = seconds;
        self
    }

    /// Set the octave-jump cost.
    pub fn with_doubling_cost(mut self, cost: f64) -> Self {
        self.doubling_cost = cost;
        self
    }

    /// Set the fixed voicing-transition cost.
    pub fn with_transition_cost(mut self, cost: f64) -> Self {
        self.transition_cost = cost;
        self
    }

    /// Set the unvoiced bias.
    pub fn with_voicing_bias(mut self, bias: f64) -> Self {
        self.voicing_bias = bias;
        self
    }

    /// Check parameter values that do not depend on the signal.
    ///
    /// Signal-dependent checks (e.g. a sample rate too low for
    /// `maximum_allowed_freq`) happen when the framing is derived.
    pub fn validate(&self) -> Result<()> {
        if !(self.minimum_allowed_freq > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "minimum_allowed_freq must be positive, got {}",
                self.minimum_allowed_freq
            )));
        }
        if !(self.maximum_allowed_freq > self.minimum_allowed_freq) {
            return Err(Error::InvalidConfiguration(format!(
                "maximum_allowed_freq ({}) must exceed minimum_allowed_freq ({})",
                self.maximum_allowed_freq, self.minimum_allowed_freq
            )));
        }
        if !(self.frame_step_size > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "frame_step_size must be positive, got {}",
                self.frame_step_size
            )));
        }
        if !(self.correlation_window_size > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "correlation_window_size must be positive, got {}",
                self.correlation_window_size
            )));
        }
        if self.max_hypotheses_per_frame < 1 {
            return Err(Error::InvalidConfiguration(
                "max_hypotheses_per_frame must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_acceptable_peak_val) {
            return Err(Error::InvalidConfiguration(format!(
                "min_acceptable_peak_val must lie in [0, 1], got {}",
                self.min_acceptable_peak_val
            )));
        }
        if self.additive_constant < 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "additive_constant must be non-negative, got {}",
                self.additive_constant
            )));
        }
        if !(self.stationarity_window_size > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "stationarity_window_size must be positive, got {}",
                self.stationarity_window_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = RaptParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.max_hypotheses_per_frame, 20);
        assert_eq!(params.maximum_allowed_freq, 500.0);
        assert_eq!(params.minimum_allowed_freq, 50.0);
    }

    #[test]
    fn rejects_non_positive_floor() {
        let params = RaptParams::default().with_frequency_range(0.0, 500.0);
        assert!(matches!(
            params.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn rejects_inverted_range() {
        let params = RaptParams::default().with_frequency_range(400.0, 100.0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_zero_hypotheses() {
        let params = RaptParams {
            max_hypotheses_per_frame: 0,
            ..RaptParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_nan_peak_threshold() {
        let params = RaptParams {
            min_acceptable_peak_val: f64::NAN,
            ..RaptParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[cfg(feature = "serialization")]
    #[test]
    fn partial_json_falls_back_to_defaults() {
        let params: RaptParams =
            serde_json::from_str(r#"{"doubling_cost": 15.0, "transition_cost": 0.5}"#).unwrap();
        assert_eq!(params.doubling_cost, 15.0);
        assert_eq!(params.transition_cost, 0.5);
        assert_eq!(params.minimum_allowed_freq, 50.0);
    }
}
