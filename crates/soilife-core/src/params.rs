use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::KernelError;

/// Tunables shared by every kernel operation.
///
/// Changes take effect from the next tick. The neighbor weight is never
/// stored; it is always `1 - self_weight`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SoilParams {
    /// Fertility seeded into every cell on init and reset.
    #[serde(rename = "f0")]
    pub initial_fertility: f32,
    /// Minimum effective fertility for a birth.
    #[serde(rename = "tau")]
    pub birth_threshold: f32,
    /// Minimum effective fertility for survival.
    #[serde(rename = "sigma")]
    pub survival_floor: f32,
    /// Soil deposited when a live cell dies.
    #[serde(rename = "alpha")]
    pub death_deposit: f32,
    /// Soil consumed by a birth.
    #[serde(rename = "beta")]
    pub birth_cost: f32,
    /// Soil consumed by a surviving cell each tick.
    #[serde(rename = "kappa")]
    pub survival_cost: f32,
    /// Relaxation rate toward the neighbor average.
    #[serde(rename = "d")]
    pub diffusion_rate: f32,
    /// Proportional decay applied after diffusion.
    #[serde(rename = "delta")]
    pub decay_rate: f32,
    #[serde(rename = "w0", deserialize_with = "deserialize_weight")]
    self_weight: f32,
}

impl Default for SoilParams {
    fn default() -> Self {
        Self {
            initial_fertility: 0.7,
            birth_threshold: 0.5,
            survival_floor: 0.1,
            death_deposit: 1.0,
            birth_cost: 0.4,
            survival_cost: 0.03,
            diffusion_rate: 0.3,
            decay_rate: 0.008,
            self_weight: 0.6,
        }
    }
}

impl SoilParams {
    /// Weight of a cell's own fertility in the effective fertility blend.
    #[must_use]
    pub const fn self_weight(&self) -> f32 {
        self.self_weight
    }

    /// Weight of the neighbor average, derived as `1 - self_weight`.
    #[must_use]
    pub fn neighbor_weight(&self) -> f32 {
        1.0 - self.self_weight
    }

    /// Sets the self weight, clamped to `[0, 1]`. NaN leaves the weight unchanged.
    pub fn set_self_weight(&mut self, weight: f32) {
        if weight.is_nan() {
            return;
        }
        self.self_weight = weight.clamp(0.0, 1.0);
    }

    /// Merges the provided fields of `patch`; absent fields keep their value.
    ///
    /// Non-finite values are dropped field by field.
    pub fn apply_patch(&mut self, patch: &ParamsPatch) {
        merge(&mut self.initial_fertility, patch.f0, "f0");
        merge(&mut self.birth_threshold, patch.tau, "tau");
        merge(&mut self.survival_floor, patch.sigma, "sigma");
        merge(&mut self.death_deposit, patch.alpha, "alpha");
        merge(&mut self.birth_cost, patch.beta, "beta");
        merge(&mut self.survival_cost, patch.kappa, "kappa");
        merge(&mut self.diffusion_rate, patch.d, "d");
        merge(&mut self.decay_rate, patch.delta, "delta");
        let mut weight = self.self_weight;
        merge(&mut weight, patch.w0, "w0");
        self.set_self_weight(weight);
    }

    /// Checks that every value is finite and that amounts and rates are non-negative.
    pub fn validate(&self) -> Result<(), KernelError> {
        let all = [
            self.initial_fertility,
            self.birth_threshold,
            self.survival_floor,
            self.death_deposit,
            self.birth_cost,
            self.survival_cost,
            self.diffusion_rate,
            self.decay_rate,
            self.self_weight,
        ];
        if all.iter().any(|value| !value.is_finite()) {
            return Err(KernelError::InvalidParameter(
                "all parameters must be finite",
            ));
        }
        if self.initial_fertility < 0.0 {
            return Err(KernelError::InvalidParameter(
                "f0 must be non-negative",
            ));
        }
        if self.death_deposit < 0.0 || self.birth_cost < 0.0 || self.survival_cost < 0.0 {
            return Err(KernelError::InvalidParameter(
                "alpha, beta and kappa must be non-negative",
            ));
        }
        if self.diffusion_rate < 0.0 || self.decay_rate < 0.0 || self.decay_rate > 1.0 {
            return Err(KernelError::InvalidParameter(
                "d must be non-negative and delta in [0, 1]",
            ));
        }
        Ok(())
    }
}

fn merge(slot: &mut f32, value: Option<f32>, name: &'static str) {
    match value {
        Some(value) if value.is_finite() => *slot = value,
        Some(value) => warn!(param = name, value, "ignoring non-finite parameter"),
        None => {}
    }
}

fn deserialize_weight<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let weight = f32::deserialize(deserializer)?;
    Ok(if weight.is_nan() {
        SoilParams::default().self_weight
    } else {
        weight.clamp(0.0, 1.0)
    })
}

/// Partial parameter set; `None` fields are left untouched on merge.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParamsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f0: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tau: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigma: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kappa: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w0: Option<f32>,
}

impl ParamsPatch {
    /// Returns true if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
