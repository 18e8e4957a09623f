//! # Residual service
//!
//! How the service left over by a higher-priority queue is handed to the
//! next queue down. The exact leftover may be multi-segment; two of the
//! policies collapse it back to a rate-latency curve.

use serde::Deserialize;

use crate::curve::{approx_eq, leftover_service, Curve, RateLatency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualMode {
    /// Keep the leftover's latency, use the slope right after it.
    LeastLatency,
    /// Project the leftover's final segment onto the time axis.
    #[default]
    HighestSlope,
    /// Keep the exact leftover.
    RealCurve,
}

impl ResidualMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResidualMode::LeastLatency => "least_latency",
            ResidualMode::HighestSlope => "highest_slope",
            ResidualMode::RealCurve => "real_curve",
        }
    }

    /// Service curve for the next queue once `arrival` is served by
    /// `service`.
    pub fn residual_service_curve(&self, service: &Curve, arrival: &Curve) -> Curve {
        let leftover = leftover_service(service, arrival);
        if let [only] = leftover.segments().as_ref() {
            if only.x == 0.0 && approx_eq(only.y, 0.0) && only.slope >= 0.0 {
                return RateLatency::from_parts(only.slope, 0.0).into();
            }
        }

        match self {
            ResidualMode::RealCurve => leftover,
            ResidualMode::LeastLatency => {
                let latency = leftover.latency();
                if !latency.is_finite() {
                    return RateLatency::from_parts(0.0, 0.0).into();
                }
                RateLatency::from_parts(leftover.slope_at(latency), latency).into()
            }
            ResidualMode::HighestSlope => {
                let segments = leftover.segments();
                let Some(last) = segments.last() else {
                    return RateLatency::from_parts(0.0, 0.0).into();
                };
                if last.slope <= 0.0 {
                    return RateLatency::from_parts(0.0, 0.0).into();
                }
                let latency = (last.x - last.y / last.slope).max(0.0);
                RateLatency::from_parts(last.slope, latency).into()
            }
        }
    }
}
