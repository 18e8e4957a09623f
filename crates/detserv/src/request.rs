//! Flow requests as seen by the evaluator.

use crate::curve::{Curve, TokenBucket};
use crate::error::{ensure_non_negative, DnmError, Result};

/// Traffic envelope and end-to-end deadline of a flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestEnvelope {
    token_bucket: TokenBucket,
    deadline: f64,
}

impl RequestEnvelope {
    pub fn new(token_bucket: TokenBucket, deadline: f64) -> Result<Self> {
        Ok(Self {
            token_bucket,
            deadline: ensure_non_negative("deadline", deadline)?,
        })
    }

    /// Fails with [`DnmError::NotATokenBucket`] for any other shape.
    pub fn from_curve(curve: &Curve, deadline: f64) -> Result<Self> {
        Self::new(TokenBucket::try_from(curve)?, deadline)
    }

    pub fn token_bucket(&self) -> TokenBucket {
        self.token_bucket
    }

    /// Seconds.
    pub fn deadline(&self) -> f64 {
        self.deadline
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowRequest {
    pub id: u64,
    envelope: Option<RequestEnvelope>,
}

impl FlowRequest {
    pub fn new(id: u64, envelope: RequestEnvelope) -> Self {
        Self {
            id,
            envelope: Some(envelope),
        }
    }

    /// A request this evaluator does not handle.
    pub fn without_envelope(id: u64) -> Self {
        Self { id, envelope: None }
    }

    pub fn envelope(&self) -> Result<&RequestEnvelope> {
        self.envelope.as_ref().ok_or(DnmError::MissingEnvelope)
    }

    pub fn has_envelope(&self) -> bool {
        self.envelope.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::RateLatency;

    #[test]
    fn envelope_from_curve() {
        let tb = TokenBucket::new(1e6, 1500.0).unwrap();
        let env = RequestEnvelope::from_curve(&tb.into(), 0.01).unwrap();
        assert_eq!(env.token_bucket(), tb);

        let rl: Curve = RateLatency::new(1e6, 0.1).unwrap().into();
        assert!(matches!(
            RequestEnvelope::from_curve(&rl, 0.01),
            Err(DnmError::NotATokenBucket(_))
        ));
        assert!(RequestEnvelope::new(tb, -1.0).is_err());
    }

    #[test]
    fn missing_envelope() {
        let req = FlowRequest::without_envelope(7);
        assert!(!req.has_envelope());
        assert_eq!(req.envelope().unwrap_err(), DnmError::MissingEnvelope);
    }
}
