//! Phoneme timing events to smoothed viseme weights.
//!
//! Each event runs through four steps: table lookup, normalization,
//! coarticulation smear against the previous output and a single-pole
//! low-pass filter approximating a critically damped mouth.

use serde::{Deserialize, Serialize};

use crate::category::category_for;
use crate::weights::VisemeWeights;

/// One unit of timing reported by the speech provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampEvent {
    pub t_ms: u64,
    /// `None` for silence and punctuation.
    pub phoneme: Option<String>,
    pub word: Option<String>,
    pub pitch: f32,
    pub energy: f32,
}

impl TimestampEvent {
    pub fn new(t_ms: u64, phoneme: Option<&str>) -> Self {
        Self {
            t_ms,
            phoneme: phoneme.map(str::to_string),
            word: None,
            pitch: 0.0,
            energy: 0.0,
        }
    }
}

/// Output of the mapper for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisemeFrame {
    pub t_ms: u64,
    pub weights: VisemeWeights,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    /// Natural frequency of the approximated second-order response, rad/s.
    pub omega_n: f32,
    /// Control loop period in seconds.
    pub dt: f32,
    /// Fraction of the previous weight carried into the next frame.
    pub coarticulation: f32,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            omega_n: 14.0,
            dt: 1.0 / 60.0,
            coarticulation: 0.85,
        }
    }
}

impl SmoothingParams {
    pub fn with_omega(omega_n: f32) -> Self {
        Self {
            omega_n,
            ..Self::default()
        }
    }

    /// Filter gain `1 - e^(-ωn·dt)`.
    pub fn alpha(&self) -> f32 {
        1.0 - (-self.omega_n * self.dt).exp()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmoothingState {
    pub last_weights: VisemeWeights,
    pub last_t: Option<u64>,
}

/// Raw lookup: a single category at weight 1.0.
pub fn raw_weights(phoneme: &str) -> Option<VisemeWeights> {
    category_for(phoneme).map(VisemeWeights::single)
}

/// Scale weights so they sum to one. Empty or all-zero vectors are left alone.
pub fn normalize(weights: &mut VisemeWeights) {
    let sum = weights.sum();
    if sum <= 0.0 {
        return;
    }
    *weights = weights.iter().map(|(k, v)| (k, v / sum)).collect();
}

/// Carry decayed weight of every previously active category into `weights`.
///
/// Never lowers an entry: `weights[k] = max(weights[k], prior[k] * decay)`.
pub fn coarticulate(weights: &mut VisemeWeights, prior: &VisemeWeights, decay: f32) {
    for (category, previous) in prior.iter() {
        let carried = previous * decay;
        if carried > weights.get(category) {
            weights.set(category, carried);
        }
    }
}

/// Move every category of `prior ∪ target` a fraction `alpha` toward the target.
pub fn smooth(prior: &VisemeWeights, target: &VisemeWeights, alpha: f32) -> VisemeWeights {
    prior
        .categories()
        .chain(target.categories())
        .map(|k| {
            let from = prior.get(k);
            (k, from + alpha * (target.get(k) - from))
        })
        .collect()
}

/// Per-session mapper. Owns its smoothing state; never shared.
#[derive(Debug, Clone, Default)]
pub struct VisemeMapper {
    params: SmoothingParams,
    state: SmoothingState,
}

impl VisemeMapper {
    pub fn new(params: SmoothingParams) -> Self {
        Self {
            params,
            state: SmoothingState::default(),
        }
    }

    pub fn params(&self) -> &SmoothingParams {
        &self.params
    }

    pub fn state(&self) -> &SmoothingState {
        &self.state
    }

    /// Map one event. Returns `None` when the phoneme is absent or unknown;
    /// the smoothing state is left untouched in that case, so the previous
    /// expression holds through silence.
    pub fn process(&mut self, event: &TimestampEvent) -> Option<VisemeFrame> {
        let mut weights = raw_weights(event.phoneme.as_deref()?)?;
        normalize(&mut weights);
        coarticulate(&mut weights, &self.state.last_weights, self.params.coarticulation);

        let smoothed = smooth(&self.state.last_weights, &weights, self.params.alpha());
        self.state.last_weights = smoothed.clone();
        self.state.last_t = Some(event.t_ms);

        Some(VisemeFrame {
            t_ms: event.t_ms,
            weights: smoothed,
        })
    }
}
