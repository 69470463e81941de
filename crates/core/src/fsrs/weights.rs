/// Scheduler parameter set: the 17 weights plus retention target.
use codetop_config::FsrsDefaults;
use codetop_domain::UserParameters;

/// Bounds for the requested retention target.
pub const RETENTION_MIN: f64 = 0.70;
pub const RETENTION_MAX: f64 = 0.97;

/// Effective parameters for one user's scheduling session.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerParams {
    pub weights: [f64; 17],
    pub request_retention: f64,
    pub maximum_interval: i32,
}

impl SchedulerParams {
    pub fn from_defaults(defaults: &FsrsDefaults) -> Self {
        Self {
            weights: defaults.weights,
            request_retention: defaults
                .request_retention
                .clamp(RETENTION_MIN, RETENTION_MAX),
            maximum_interval: defaults.maximum_interval,
        }
    }

    pub fn from_user_parameters(params: &UserParameters) -> Self {
        Self {
            weights: params.weights,
            request_retention: params.request_retention.clamp(RETENTION_MIN, RETENTION_MAX),
            maximum_interval: params.maximum_interval,
        }
    }

    /// Weight accessor; index is the conventional w0..w16 naming.
    #[inline]
    pub fn w(&self, index: usize) -> f64 {
        self.weights[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codetop_config::DEFAULT_FSRS_WEIGHTS;

    #[test]
    fn test_from_defaults_clamps_retention() {
        let mut defaults = FsrsDefaults::default();
        defaults.request_retention = 0.99;
        let params = SchedulerParams::from_defaults(&defaults);
        assert_eq!(params.request_retention, RETENTION_MAX);

        defaults.request_retention = 0.5;
        let params = SchedulerParams::from_defaults(&defaults);
        assert_eq!(params.request_retention, RETENTION_MIN);
    }

    #[test]
    fn test_default_weights_carried() {
        let params = SchedulerParams::from_defaults(&FsrsDefaults::default());
        assert_eq!(params.weights, DEFAULT_FSRS_WEIGHTS);
        assert_eq!(params.w(2), 2.4);
    }
}
