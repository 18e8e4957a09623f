//! Network-calculus bounds between an arrival curve and a service curve.
//!
//! All functions accept arbitrary curves; the closed forms for the
//! token-bucket / rate-latency pair fall out of the general algorithms
//! (`T + b/R` for the delay, `b + r·T` for the backlog).

use super::{approx_eq, breakpoints, eval, locate, segment_end, Curve, Segment};

/// `sc − ac` over the union of breakpoints. The result may be negative.
fn difference(sc: &[Segment], ac: &[Segment]) -> Vec<Segment> {
    breakpoints(sc, ac)
        .into_iter()
        .map(|x| {
            let (s, a) = (locate(sc, x), locate(ac, x));
            Segment::new(x, s.value_at(x) - a.value_at(x), s.slope - a.slope)
        })
        .collect()
}

/// Service left to lower-priority traffic once `ac` has been served by `sc`:
/// `t ↦ max(0, sup_{0≤s≤t} (sc(s) − ac(s)))`.
pub fn leftover_service(sc: &Curve, ac: &Curve) -> Curve {
    let h = difference(&sc.segments(), &ac.segments());
    let mut out = Vec::with_capacity(h.len() + 1);
    let mut level = 0.0_f64;
    for (i, seg) in h.iter().enumerate() {
        let end = segment_end(&h, i);
        level = level.max(seg.y);
        if seg.slope > 0.0 {
            let reach = seg.x + (level - seg.y) / seg.slope;
            if reach > seg.x {
                out.push(Segment::new(seg.x, level, 0.0));
            }
            if reach < end {
                out.push(Segment::new(reach, level, seg.slope));
                if end.is_finite() {
                    level = seg.value_at(end);
                }
            }
        } else {
            out.push(Segment::new(seg.x, level, 0.0));
        }
    }
    Curve::canonical(out)
}

/// First time `sc` catches up with `ac`; `∞` if it never does.
pub fn x_intersection(ac: &Curve, sc: &Curve) -> f64 {
    let h = difference(&sc.segments(), &ac.segments());
    for (i, seg) in h.iter().enumerate() {
        if seg.y >= 0.0 || approx_eq(seg.y, 0.0) {
            return seg.x;
        }
        if seg.slope > 0.0 {
            let t = seg.x - seg.y / seg.slope;
            if t < segment_end(&h, i) {
                return t;
            }
        }
    }
    f64::INFINITY
}

/// Smallest `t` with `f(t) ≥ y`.
fn lower_inverse(segments: &[Segment], y: f64) -> f64 {
    for (i, seg) in segments.iter().enumerate() {
        if seg.y >= y || approx_eq(seg.y, y) {
            return seg.x;
        }
        if seg.slope > 0.0 {
            let t = seg.x + (y - seg.y) / seg.slope;
            if t < segment_end(segments, i) {
                return t;
            }
        }
    }
    f64::INFINITY
}

/// Largest `t` with `f(t) ≤ y`, i.e. the infimum of `{t : f(t) > y}`.
fn upper_inverse(segments: &[Segment], y: f64) -> f64 {
    for (i, seg) in segments.iter().enumerate() {
        if seg.y > y && !approx_eq(seg.y, y) {
            return seg.x;
        }
        if seg.slope > 0.0 {
            let t = seg.x + (y - seg.y) / seg.slope;
            if t < segment_end(segments, i) {
                return t.max(seg.x);
            }
        }
    }
    f64::INFINITY
}

fn outpaces(ac: &Curve, sc: &Curve) -> bool {
    let (a, s) = (ac.ultimate_rate(), sc.ultimate_rate());
    a > s && !approx_eq(a, s)
}

/// Maximum horizontal deviation between `ac` and `sc`.
///
/// `∞` when the arrival's long-term rate exceeds the service rate.
pub fn delay_bound(ac: &Curve, sc: &Curve) -> f64 {
    if outpaces(ac, sc) {
        return f64::INFINITY;
    }
    let (a, s) = (ac.segments(), sc.segments());

    // The deviation peaks at a breakpoint of `ac` or where `ac` crosses the
    // level of a breakpoint of `sc`.
    let mut candidates: Vec<f64> = a.iter().map(|seg| seg.x).collect();
    for seg in s.iter() {
        for t in [lower_inverse(&a, seg.y), upper_inverse(&a, seg.y)] {
            if t.is_finite() {
                candidates.push(t);
            }
        }
    }

    let mut worst = 0.0_f64;
    for t in candidates {
        let demand = eval(&a, t);
        // Right after a rising point the arrival is strictly above `demand`,
        // so the service has to get past the whole level.
        let rising = t == 0.0 || locate(&a, t).slope > 0.0;
        let served = if rising {
            upper_inverse(&s, demand)
        } else {
            lower_inverse(&s, demand)
        };
        worst = worst.max(served - t);
        if worst.is_infinite() {
            break;
        }
    }
    worst
}

/// Maximum vertical deviation between `ac` and `sc`.
///
/// `∞` when the arrival's long-term rate exceeds the service rate.
pub fn backlog_bound(ac: &Curve, sc: &Curve) -> f64 {
    if outpaces(ac, sc) {
        return f64::INFINITY;
    }
    difference(&ac.segments(), &sc.segments())
        .iter()
        .map(|seg| seg.y)
        .fold(0.0, f64::max)
}
