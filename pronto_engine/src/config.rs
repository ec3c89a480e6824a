use std::env;

use log::info;

/// Preference radius for the proximity tier of rider dispatch, in metres.
pub const DEFAULT_ASSIGNMENT_RADIUS_M: f64 = 5_000.0;
/// How many candidates a single dispatch attempt will try to claim before giving up on a tier.
pub const DEFAULT_MAX_CANDIDATES: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub assignment_radius_m: f64,
    pub max_candidates: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { assignment_radius_m: DEFAULT_ASSIGNMENT_RADIUS_M, max_candidates: DEFAULT_MAX_CANDIDATES }
    }
}

impl DispatchConfig {
    /// Reads the configuration from `PRONTO_ASSIGNMENT_RADIUS_M` and `PRONTO_MAX_CANDIDATES`,
    /// falling back to the defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let assignment_radius_m = env::var("PRONTO_ASSIGNMENT_RADIUS_M")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or_else(|| {
                info!("PRONTO_ASSIGNMENT_RADIUS_M is not set. Using the default of {DEFAULT_ASSIGNMENT_RADIUS_M}m.");
                DEFAULT_ASSIGNMENT_RADIUS_M
            });
        let max_candidates = env::var("PRONTO_MAX_CANDIDATES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_CANDIDATES);
        Self { assignment_radius_m, max_candidates }
    }

    pub fn with_radius(mut self, meters: f64) -> Self {
        self.assignment_radius_m = meters;
        self
    }
}
