/// Slack used when comparing simulation times against save points.
pub const TIME_EPSILON: f64 = 1e-12;

/// Absolute and relative slack for comparing simulated quantities.
///
/// Two values agree when they are within `abs` of each other, or within
/// `rel` of the larger magnitude.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerances {
    pub abs: f64,
    pub rel: f64,
}

impl Tolerances {
    pub const fn new(abs: f64, rel: f64) -> Self {
        Self { abs, rel }
    }

    /// Same slack in both senses.
    pub const fn uniform(tol: f64) -> Self {
        Self { abs: tol, rel: tol }
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self::new(1e-12, 1e-9)
    }
}

/// True when `a` and `b` agree within `tol`. NaN never agrees with anything;
/// infinities agree only with themselves.
pub fn nearly_equal(a: f64, b: f64, tol: Tolerances) -> bool {
    if a == b {
        return true;
    }
    if !a.is_finite() || !b.is_finite() {
        return false;
    }
    let diff = (a - b).abs();
    diff <= tol.abs || diff <= tol.rel * a.abs().max(b.abs())
}

/// True when `t` has reached `target`, allowing for accumulated round-off.
pub fn time_reached(t: f64, target: f64) -> bool {
    if !target.is_finite() {
        return t >= target;
    }
    t + TIME_EPSILON * target.abs().max(1.0) >= target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearly_equal_uses_either_bound() {
        let tol = Tolerances::default();
        assert!(nearly_equal(1.0, 1.0 + 1e-12, tol));
        assert!(nearly_equal(0.0, 1e-13, tol));
        assert!(nearly_equal(1e6, 1e6 + 1e-4, tol));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, tol));
        assert!(nearly_equal(1.0, 1.05, Tolerances::uniform(0.1)));
    }

    #[test]
    fn non_finite_values_only_match_themselves() {
        let loose = Tolerances::uniform(1e3);
        assert!(nearly_equal(f64::INFINITY, f64::INFINITY, loose));
        assert!(!nearly_equal(f64::INFINITY, 1.0, loose));
        assert!(!nearly_equal(f64::INFINITY, f64::NEG_INFINITY, loose));
        assert!(!nearly_equal(f64::NAN, f64::NAN, loose));
    }

    #[test]
    fn time_reached_absorbs_round_off() {
        let mut t = 0.0;
        for _ in 0..10 {
            t += 0.1;
        }
        assert!(time_reached(t, 1.0));
        assert!(!time_reached(0.9, 1.0));
        assert!(!time_reached(1e300, f64::INFINITY));
    }
}
