//! # Curve algebra
//!
//! Non-decreasing, piecewise-linear, right-continuous functions of time
//! starting at `t = 0`. A curve is stored as a list of [`Segment`]s; each
//! segment is valid from its own `x` up to the next segment's `x`, the last
//! one extends to infinity.
//!
//! Curves are kept in their right-limit form: the instantaneous burst of a
//! token bucket is folded into the value at `t = 0`, so `TB(r, b)` is the
//! single segment `(0, b, r)`.
//!
//! Two shapes dominate admission control and get dedicated variants:
//!
//! - [`TokenBucket`] `γ(r, b)(t) = b + r·t`
//! - [`RateLatency`] `β(R, T)(t) = R·max(0, t − T)`
//!
//! Every other shape is a [`Curve::General`]. [`Curve::from_segments`]
//! canonicalizes, so a general curve that happens to be a token bucket or a
//! rate-latency curve is always stored as one.

mod bounds;

use std::borrow::Cow;
use std::fmt;
use std::ops::Add;

pub use bounds::{backlog_bound, delay_bound, leftover_service, x_intersection};

use crate::error::{ensure_non_negative, DnmError, Result};

/// Relative tolerance used when comparing curve coordinates.
pub const EPSILON: f64 = 1e-9;

/// `a ≈ b` relative to their magnitude, with an absolute floor of
/// [`EPSILON`] around zero. Equal infinities compare equal.
pub fn approx_eq(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() <= EPSILON * a.abs().max(b.abs()).max(1.0)
}

// ─── Primitive shapes ───────────────────────────────────────────────────────

/// A linear piece `y + slope·(t − x)`, valid from `x` to the next breakpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x: f64,
    pub y: f64,
    pub slope: f64,
}

impl Segment {
    pub const fn new(x: f64, y: f64, slope: f64) -> Self {
        Self { x, y, slope }
    }

    pub fn value_at(&self, t: f64) -> f64 {
        if self.slope == 0.0 {
            self.y
        } else {
            self.y + self.slope * (t - self.x)
        }
    }
}

/// `γ(r, b)`: at most `b + r·t` bytes in any window of length `t`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
}

impl TokenBucket {
    pub fn new(rate: f64, burst: f64) -> Result<Self> {
        Ok(Self {
            rate: ensure_non_negative("token bucket rate", rate)?,
            burst: ensure_non_negative("token bucket burst", burst)?,
        })
    }

    pub const fn zero() -> Self {
        Self {
            rate: 0.0,
            burst: 0.0,
        }
    }

    /// Callers guarantee finite, non-negative parameters.
    pub(crate) const fn from_parts(rate: f64, burst: f64) -> Self {
        Self { rate, burst }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// Same rate, burst grown by `extra` bytes.
    pub fn with_extra_burst(self, extra: f64) -> Self {
        Self {
            rate: self.rate,
            burst: self.burst + extra.max(0.0),
        }
    }

    /// Component-wise `≤`, exact.
    pub fn fits_within(&self, cap: &TokenBucket) -> bool {
        self.rate <= cap.rate && self.burst <= cap.burst
    }
}

impl Add for TokenBucket {
    type Output = TokenBucket;

    fn add(self, rhs: TokenBucket) -> TokenBucket {
        TokenBucket {
            rate: self.rate + rhs.rate,
            burst: self.burst + rhs.burst,
        }
    }
}

impl fmt::Display for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TB(r={}, b={})", self.rate, self.burst)
    }
}

/// `β(R, T)`: service of at least `R·(t − T)` once the latency `T` elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RateLatency {
    rate: f64,
    latency: f64,
}

impl RateLatency {
    pub fn new(rate: f64, latency: f64) -> Result<Self> {
        Ok(Self {
            rate: ensure_non_negative("rate-latency rate", rate)?,
            latency: ensure_non_negative("rate-latency latency", latency)?,
        })
    }

    pub(crate) const fn from_parts(rate: f64, latency: f64) -> Self {
        Self { rate, latency }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn latency(&self) -> f64 {
        self.latency
    }
}

impl fmt::Display for RateLatency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RL(R={}, T={})", self.rate, self.latency)
    }
}

// ─── Curve ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Curve {
    TokenBucket(TokenBucket),
    RateLatency(RateLatency),
    /// At least two segments, first one at `x = 0`, strictly increasing `x`.
    General(Vec<Segment>),
}

impl From<TokenBucket> for Curve {
    fn from(tb: TokenBucket) -> Self {
        Curve::TokenBucket(tb)
    }
}

impl From<RateLatency> for Curve {
    fn from(rl: RateLatency) -> Self {
        Curve::RateLatency(rl)
    }
}

impl TryFrom<&Curve> for TokenBucket {
    type Error = DnmError;

    fn try_from(curve: &Curve) -> Result<Self> {
        curve
            .as_token_bucket()
            .ok_or_else(|| DnmError::NotATokenBucket(curve.to_string()))
    }
}

impl Curve {
    /// The zero function.
    pub const fn zero() -> Self {
        Curve::TokenBucket(TokenBucket::zero())
    }

    /// Build a curve from raw segments.
    ///
    /// The segments must start at `x = 0`, have strictly increasing `x`,
    /// and describe a non-negative, non-decreasing function.
    pub fn from_segments(segments: Vec<Segment>) -> Result<Self> {
        let Some(first) = segments.first() else {
            return Err(DnmError::Config("curve without segments".into()));
        };
        if first.x != 0.0 {
            return Err(DnmError::InvalidValue {
                what: "first breakpoint",
                value: first.x,
            });
        }
        let mut previous: Option<&Segment> = None;
        for seg in &segments {
            ensure_non_negative("curve value", seg.y)?;
            ensure_non_negative("curve slope", seg.slope)?;
            if let Some(prev) = previous {
                if seg.x <= prev.x {
                    return Err(DnmError::InvalidValue {
                        what: "breakpoint order",
                        value: seg.x,
                    });
                }
                let reached = prev.value_at(seg.x);
                if seg.y < reached && !approx_eq(seg.y, reached) {
                    return Err(DnmError::InvalidValue {
                        what: "decreasing curve value",
                        value: seg.y,
                    });
                }
            }
            previous = Some(seg);
        }
        Ok(Self::canonical(segments))
    }

    /// Simplify and pick the narrowest variant. Internal callers only hand
    /// over segments produced by curve operations.
    pub(crate) fn canonical(segments: Vec<Segment>) -> Self {
        let segments = simplify(segments);
        match segments.as_slice() {
            [] => Curve::zero(),
            [only] if approx_eq(only.y, 0.0) => {
                Curve::RateLatency(RateLatency::from_parts(only.slope.max(0.0), 0.0))
            }
            [only] => Curve::TokenBucket(TokenBucket::from_parts(only.slope.max(0.0), only.y)),
            [flat, rising]
                if approx_eq(flat.y, 0.0) && flat.slope == 0.0 && approx_eq(rising.y, 0.0) =>
            {
                Curve::RateLatency(RateLatency::from_parts(rising.slope, rising.x))
            }
            _ => Curve::General(segments),
        }
    }

    pub fn segments(&self) -> Cow<'_, [Segment]> {
        match self {
            Curve::TokenBucket(tb) => Cow::Owned(vec![Segment::new(0.0, tb.burst, tb.rate)]),
            Curve::RateLatency(rl) if rl.latency == 0.0 => {
                Cow::Owned(vec![Segment::new(0.0, 0.0, rl.rate)])
            }
            Curve::RateLatency(rl) => Cow::Owned(vec![
                Segment::new(0.0, 0.0, 0.0),
                Segment::new(rl.latency, 0.0, rl.rate),
            ]),
            Curve::General(segs) => Cow::Borrowed(segs),
        }
    }

    pub fn value_at(&self, t: f64) -> f64 {
        eval(&self.segments(), t)
    }

    /// Slope to the right of `t`.
    pub fn slope_at(&self, t: f64) -> f64 {
        locate(&self.segments(), t).slope
    }

    /// Slope of the last segment.
    pub fn ultimate_rate(&self) -> f64 {
        self.segments().last().map_or(0.0, |s| s.slope)
    }

    /// First time the curve leaves zero, `∞` for the zero function.
    pub fn latency(&self) -> f64 {
        self.segments()
            .iter()
            .find(|s| !approx_eq(s.y, 0.0) || s.slope > 0.0)
            .map_or(f64::INFINITY, |s| s.x)
    }

    pub fn is_token_bucket(&self) -> bool {
        self.as_token_bucket().is_some()
    }

    pub fn is_rate_latency(&self) -> bool {
        self.as_rate_latency().is_some()
    }

    /// A single segment starting at the origin is a token bucket (possibly
    /// with zero burst).
    pub fn as_token_bucket(&self) -> Option<TokenBucket> {
        match self {
            Curve::TokenBucket(tb) => Some(*tb),
            Curve::RateLatency(rl) if rl.latency == 0.0 => {
                Some(TokenBucket::from_parts(rl.rate, 0.0))
            }
            _ => None,
        }
    }

    pub fn as_rate_latency(&self) -> Option<RateLatency> {
        match self {
            Curve::RateLatency(rl) => Some(*rl),
            Curve::TokenBucket(tb) if tb.burst == 0.0 => Some(RateLatency::from_parts(tb.rate, 0.0)),
            _ => None,
        }
    }

    /// Pointwise sum.
    pub fn add(&self, other: &Curve) -> Curve {
        if let (Curve::TokenBucket(a), Curve::TokenBucket(b)) = (self, other) {
            return Curve::TokenBucket(*a + *b);
        }
        let (f, g) = (self.segments(), other.segments());
        let segments = breakpoints(&f, &g)
            .into_iter()
            .map(|x| {
                let (sf, sg) = (locate(&f, x), locate(&g, x));
                Segment::new(x, sf.value_at(x) + sg.value_at(x), sf.slope + sg.slope)
            })
            .collect();
        Curve::canonical(segments)
    }

    /// Pointwise minimum.
    pub fn min(&self, other: &Curve) -> Curve {
        let (f, g) = (self.segments(), other.segments());
        let xs = breakpoints(&f, &g);
        let mut segments = Vec::with_capacity(xs.len() * 2);
        for (i, &x0) in xs.iter().enumerate() {
            let x1 = xs.get(i + 1).copied().unwrap_or(f64::INFINITY);
            let (sf, sg) = (locate(&f, x0), locate(&g, x0));
            let (yf, yg) = (sf.value_at(x0), sg.value_at(x0));
            let f_below = if approx_eq(yf, yg) {
                sf.slope <= sg.slope
            } else {
                yf < yg
            };
            let (lo, hi) = if f_below { (sf, sg) } else { (sg, sf) };
            let (y_lo, y_hi) = (lo.value_at(x0), hi.value_at(x0));
            segments.push(Segment::new(x0, y_lo, lo.slope));
            if lo.slope > hi.slope {
                let crossing = x0 + (y_hi - y_lo).max(0.0) / (lo.slope - hi.slope);
                if crossing > x0 && crossing < x1 && !approx_eq(crossing, x1) {
                    segments.push(Segment::new(crossing, hi.value_at(crossing), hi.slope));
                }
            }
        }
        Curve::canonical(segments)
    }

    /// Same function within tolerance, regardless of the variant.
    pub fn approx_eq(&self, other: &Curve) -> bool {
        let (a, b) = (simplify(self.segments().into_owned()), simplify(other.segments().into_owned()));
        a.len() == b.len()
            && a.iter().zip(&b).all(|(p, q)| {
                approx_eq(p.x, q.x) && approx_eq(p.y, q.y) && approx_eq(p.slope, q.slope)
            })
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Curve::TokenBucket(tb) => fmt::Display::fmt(tb, f),
            Curve::RateLatency(rl) => fmt::Display::fmt(rl, f),
            Curve::General(segs) => {
                f.write_str("PWL[")?;
                for (i, s) in segs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "({}, {}, {})", s.x, s.y, s.slope)?;
                }
                f.write_str("]")
            }
        }
    }
}

// ─── Segment helpers ────────────────────────────────────────────────────────

/// Segment covering `t`; `t < 0` maps onto the first one.
pub(crate) fn locate(segments: &[Segment], t: f64) -> &Segment {
    let idx = segments.partition_point(|s| s.x <= t).saturating_sub(1);
    &segments[idx]
}

pub(crate) fn eval(segments: &[Segment], t: f64) -> f64 {
    locate(segments, t).value_at(t)
}

/// Start of the segment after `idx`, `∞` for the last one.
pub(crate) fn segment_end(segments: &[Segment], idx: usize) -> f64 {
    segments.get(idx + 1).map_or(f64::INFINITY, |s| s.x)
}

/// Sorted union of both breakpoint sets.
pub(crate) fn breakpoints(f: &[Segment], g: &[Segment]) -> Vec<f64> {
    let mut xs: Vec<f64> = f.iter().chain(g).map(|s| s.x).collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup_by(|a, b| approx_eq(*a, *b));
    xs
}

/// Drop duplicate breakpoints and merge collinear neighbours.
fn simplify(segments: Vec<Segment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
    for seg in segments {
        if out.last().is_some_and(|last| approx_eq(last.x, seg.x)) {
            out.pop();
        }
        if let Some(last) = out.last() {
            if approx_eq(last.slope, seg.slope) && approx_eq(last.value_at(seg.x), seg.y) {
                continue;
            }
        }
        out.push(seg);
    }
    if let Some(first) = out.first_mut() {
        first.x = 0.0;
    }
    out
}
