//! Derivative-free and gradient-based minimizers for noisy objectives.
//!
//! Objectives return a plain `f64`; NaN is treated as `+inf`, so candidate
//! points where the model cannot be evaluated simply lose every comparison.
//! Every method reports the best point it ever evaluated, which is not
//! necessarily the last one.

use crate::error::EstimateError;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const GOLDEN: f64 = 1.618_033_988_749_895;
const INV_GOLDEN: f64 = 0.618_033_988_749_895;
const LINE_SEARCH_ITERS: usize = 60;
const BRACKET_ITERS: usize = 40;

/// Optimizer selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerMethod {
    #[default]
    #[serde(rename = "Nelder-Mead")]
    NelderMead,
    Powell,
    #[serde(rename = "CG")]
    ConjugateGradient,
}

impl fmt::Display for OptimizerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptimizerMethod::NelderMead => "Nelder-Mead",
            OptimizerMethod::Powell => "Powell",
            OptimizerMethod::ConjugateGradient => "CG",
        })
    }
}

impl FromStr for OptimizerMethod {
    type Err = EstimateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nelder-mead" | "nelder_mead" | "neldermead" => Ok(OptimizerMethod::NelderMead),
            "powell" => Ok(OptimizerMethod::Powell),
            "cg" | "conjugate-gradient" => Ok(OptimizerMethod::ConjugateGradient),
            _ => Err(EstimateError::UnsupportedOptimizer {
                method: s.to_string(),
            }),
        }
    }
}

/// Optimizer configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Maximum outer iterations
    pub max_iterations: usize,
    /// Maximum objective evaluations (hard budget)
    pub max_evaluations: usize,
    /// Absolute tolerance on the point
    pub x_tol: f64,
    /// Absolute tolerance on the objective
    pub f_tol: f64,
    /// Initial simplex / direction size, relative to each coordinate
    pub initial_step: f64,
    /// Finite-difference step, relative to each coordinate
    pub gradient_step: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            max_evaluations: 5000,
            x_tol: 1e-6,
            f_tol: 1e-10,
            initial_step: 0.05,
            gradient_step: 1e-6,
        }
    }
}

/// Optimizer result.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerResult {
    /// Best point evaluated
    pub x: DVector<f64>,
    /// Objective at `x` (`+inf` if no evaluation was finite)
    pub fx: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

/// Objective wrapper: counts evaluations, maps NaN to +inf, remembers the best point.
struct Objective<F> {
    f: F,
    evaluations: usize,
    max_evaluations: usize,
    best_x: DVector<f64>,
    best_fx: f64,
}

impl<F: FnMut(&DVector<f64>) -> f64> Objective<F> {
    fn new(f: F, x0: &DVector<f64>, max_evaluations: usize) -> Self {
        Self {
            f,
            evaluations: 0,
            max_evaluations,
            best_x: x0.clone(),
            best_fx: f64::INFINITY,
        }
    }

    /// Returns +inf without evaluating once the budget is spent.
    fn eval(&mut self, x: &DVector<f64>) -> f64 {
        if self.exhausted() {
            return f64::INFINITY;
        }
        self.evaluations += 1;
        let v = (self.f)(x);
        let v = if v.is_nan() { f64::INFINITY } else { v };
        if v < self.best_fx {
            self.best_fx = v;
            self.best_x = x.clone();
        }
        v
    }

    fn exhausted(&self) -> bool {
        self.evaluations >= self.max_evaluations
    }

    fn finish(self, iterations: usize, converged: bool) -> OptimizerResult {
        OptimizerResult {
            x: self.best_x,
            fx: self.best_fx,
            iterations,
            evaluations: self.evaluations,
            converged,
        }
    }
}

/// Minimize `f` from `x0`.
pub fn minimize<F>(
    method: OptimizerMethod,
    x0: DVector<f64>,
    f: F,
    cfg: &OptimizerConfig,
) -> OptimizerResult
where
    F: FnMut(&DVector<f64>) -> f64,
{
    let mut obj = Objective::new(f, &x0, cfg.max_evaluations.max(1));
    let (iterations, converged) = match method {
        OptimizerMethod::NelderMead => nelder_mead(&mut obj, x0, cfg),
        OptimizerMethod::Powell => powell(&mut obj, x0, cfg),
        OptimizerMethod::ConjugateGradient => conjugate_gradient(&mut obj, x0, cfg),
    };
    let result = obj.finish(iterations, converged);
    debug!(
        %method,
        iterations = result.iterations,
        evaluations = result.evaluations,
        fx = result.fx,
        converged = result.converged,
        "minimize finished"
    );
    result
}

/// Central-difference gradient.
///
/// A non-finite side falls back to the one-sided difference; both sides
/// non-finite gives a zero component.
pub fn central_difference_gradient<F>(
    x: &DVector<f64>,
    fx: f64,
    mut f: F,
    epsilon: f64,
) -> DVector<f64>
where
    F: FnMut(&DVector<f64>) -> f64,
{
    let n = x.len();
    let mut grad = DVector::zeros(n);

    for j in 0..n {
        let dx = epsilon * x[j].abs().max(1.0);

        let mut x_plus = x.clone();
        x_plus[j] += dx;
        let f_plus = f(&x_plus);

        let mut x_minus = x.clone();
        x_minus[j] -= dx;
        let f_minus = f(&x_minus);

        grad[j] = match (f_plus.is_finite(), f_minus.is_finite()) {
            (true, true) => (f_plus - f_minus) / (2.0 * dx),
            (true, false) if fx.is_finite() => (f_plus - fx) / dx,
            (false, true) if fx.is_finite() => (fx - f_minus) / dx,
            _ => 0.0,
        };
    }

    grad
}

fn initial_steps(x0: &DVector<f64>, rel: f64) -> DVector<f64> {
    x0.map(|v| if v != 0.0 { rel * v.abs() } else { 0.00025 })
}

fn nelder_mead<F>(obj: &mut Objective<F>, x0: DVector<f64>, cfg: &OptimizerConfig) -> (usize, bool)
where
    F: FnMut(&DVector<f64>) -> f64,
{
    let n = x0.len();
    if n == 0 {
        obj.eval(&x0);
        return (0, true);
    }
    let steps = initial_steps(&x0, cfg.initial_step);

    let mut simplex: Vec<(DVector<f64>, f64)> = Vec::with_capacity(n + 1);
    let f0 = obj.eval(&x0);
    simplex.push((x0.clone(), f0));
    for i in 0..n {
        let mut v = x0.clone();
        v[i] += steps[i];
        let fv = obj.eval(&v);
        simplex.push((v, fv));
    }

    for iter in 0..cfg.max_iterations {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        let best = &simplex[0];
        let x_spread = simplex[1..]
            .iter()
            .map(|(v, _)| (v - &best.0).amax())
            .fold(0.0, f64::max);
        let f_spread = simplex[1..]
            .iter()
            .map(|(_, fv)| (fv - best.1).abs())
            .fold(0.0, f64::max);
        if best.1.is_finite() && x_spread <= cfg.x_tol && f_spread <= cfg.f_tol {
            return (iter, true);
        }
        if obj.exhausted() {
            return (iter, false);
        }

        let mut centroid = DVector::zeros(n);
        for (v, _) in &simplex[..n] {
            centroid += v;
        }
        centroid /= n as f64;

        let (worst, f_worst) = simplex[n].clone();
        let f_second = simplex[n - 1].1;
        let f_best = simplex[0].1;

        let xr = &centroid + (&centroid - &worst);
        let fr = obj.eval(&xr);

        if fr < f_best {
            let xe = &centroid + 2.0 * (&centroid - &worst);
            let fe = obj.eval(&xe);
            simplex[n] = if fe < fr { (xe, fe) } else { (xr, fr) };
            continue;
        }
        if fr < f_second {
            simplex[n] = (xr, fr);
            continue;
        }

        let accepted = if fr < f_worst {
            let xc = &centroid + 0.5 * (&xr - &centroid);
            let fc = obj.eval(&xc);
            (fc <= fr).then_some((xc, fc))
        } else {
            let xc = &centroid + 0.5 * (&worst - &centroid);
            let fc = obj.eval(&xc);
            (fc < f_worst).then_some((xc, fc))
        };

        match accepted {
            Some(vertex) => simplex[n] = vertex,
            None => {
                let anchor = simplex[0].0.clone();
                for vertex in simplex.iter_mut().skip(1) {
                    let v = &anchor + 0.5 * (&vertex.0 - &anchor);
                    let fv = obj.eval(&v);
                    *vertex = (v, fv);
                }
            }
        }
    }

    (cfg.max_iterations, false)
}

/// Minimize along `d` from `x` (where `f(x) = fx`). Returns the step and its value.
///
/// Brackets a minimum by golden-ratio expansion, then narrows it by
/// golden-section search. Returns `(0, fx)` when no step improves on `fx`.
fn line_minimize<F>(
    obj: &mut Objective<F>,
    x: &DVector<f64>,
    fx: f64,
    d: &DVector<f64>,
    cfg: &OptimizerConfig,
) -> (f64, f64)
where
    F: FnMut(&DVector<f64>) -> f64,
{
    let d_norm = d.amax();
    if d_norm == 0.0 {
        return (0.0, fx);
    }
    let phi = |alpha: f64, obj: &mut Objective<F>| obj.eval(&(x + alpha * d));

    // Bracket: fb is no higher than either end, with b between a and c.
    let (mut a, mut b) = (0.0, 1.0);
    let mut fb = phi(b, obj);
    if fb > fx {
        std::mem::swap(&mut a, &mut b);
        fb = fx;
    }
    let mut c = b + GOLDEN * (b - a);
    let mut fc = phi(c, obj);
    let mut expansions = 0;
    while fc < fb && expansions < BRACKET_ITERS && !obj.exhausted() {
        a = b;
        b = c;
        fb = fc;
        c = b + GOLDEN * (b - a);
        fc = phi(c, obj);
        expansions += 1;
    }

    let (mut lo, mut hi) = if a < c { (a, c) } else { (c, a) };
    let tol = cfg.x_tol * (1.0 + x.amax()) / d_norm;

    let mut x1 = hi - INV_GOLDEN * (hi - lo);
    let mut x2 = lo + INV_GOLDEN * (hi - lo);
    let mut f1 = phi(x1, obj);
    let mut f2 = phi(x2, obj);
    for _ in 0..LINE_SEARCH_ITERS {
        if (hi - lo).abs() <= tol || obj.exhausted() {
            break;
        }
        if f1 < f2 {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - INV_GOLDEN * (hi - lo);
            f1 = phi(x1, obj);
        } else {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + INV_GOLDEN * (hi - lo);
            f2 = phi(x2, obj);
        }
    }

    let (alpha, f_alpha) = [(b, fb), (x1, f1), (x2, f2)]
        .into_iter()
        .min_by(|p, q| p.1.total_cmp(&q.1))
        .unwrap_or((0.0, fx));
    if f_alpha < fx { (alpha, f_alpha) } else { (0.0, fx) }
}

fn f_converged(f_old: f64, f_new: f64, cfg: &OptimizerConfig) -> bool {
    f_old.is_finite() && f_new.is_finite() && (f_old - f_new).abs() <= cfg.f_tol
}

fn powell<F>(obj: &mut Objective<F>, x0: DVector<f64>, cfg: &OptimizerConfig) -> (usize, bool)
where
    F: FnMut(&DVector<f64>) -> f64,
{
    let n = x0.len();
    let steps = initial_steps(&x0, cfg.initial_step);
    let mut directions: Vec<DVector<f64>> = (0..n)
        .map(|i| {
            let mut d = DVector::zeros(n);
            d[i] = steps[i];
            d
        })
        .collect();

    let mut x = x0;
    let mut fx = obj.eval(&x);

    for iter in 0..cfg.max_iterations {
        if obj.exhausted() {
            return (iter, false);
        }
        let x_start = x.clone();
        let f_start = fx;
        let mut biggest = (0, 0.0);

        for (i, d) in directions.iter().enumerate() {
            let (alpha, f_new) = line_minimize(obj, &x, fx, d, cfg);
            if alpha != 0.0 {
                x += alpha * d;
                let drop = if fx.is_finite() { fx - f_new } else { f64::MAX };
                if drop > biggest.1 {
                    biggest = (i, drop);
                }
                fx = f_new;
            }
        }

        let moved = (&x - &x_start).amax();
        if f_converged(f_start, fx, cfg) || (fx.is_finite() && moved <= cfg.x_tol) {
            return (iter + 1, true);
        }

        let d_new = &x - &x_start;
        if d_new.amax() > 0.0 {
            let (alpha, f_new) = line_minimize(obj, &x, fx, &d_new, cfg);
            if alpha != 0.0 {
                x += alpha * &d_new;
                fx = f_new;
            }
            directions[biggest.0] = d_new;
        }
    }

    (cfg.max_iterations, false)
}

fn conjugate_gradient<F>(
    obj: &mut Objective<F>,
    x0: DVector<f64>,
    cfg: &OptimizerConfig,
) -> (usize, bool)
where
    F: FnMut(&DVector<f64>) -> f64,
{
    let mut x = x0;
    let mut fx = obj.eval(&x);
    let eps = cfg.gradient_step;
    let mut g = central_difference_gradient(&x, fx, |p| obj.eval(p), eps);
    let mut d = -&g;

    for iter in 0..cfg.max_iterations {
        if g.amax() == 0.0 && fx.is_finite() {
            return (iter, true);
        }
        if obj.exhausted() {
            return (iter, false);
        }

        // Scale the first trial step to `initial_step` of the point's magnitude.
        let scale = cfg.initial_step * x.amax().max(1.0) / d.amax().max(f64::MIN_POSITIVE);
        let step = scale * &d;
        let (alpha, f_new) = line_minimize(obj, &x, fx, &step, cfg);

        if alpha == 0.0 {
            let steepest = -&g;
            if d == steepest {
                // No descent even along the negative gradient.
                return (iter + 1, fx.is_finite());
            }
            d = steepest;
            continue;
        }

        let x_new = &x + alpha * &step;
        let moved = (&x_new - &x).amax();
        let f_old = fx;
        x = x_new;
        fx = f_new;

        let g_new = central_difference_gradient(&x, fx, |p| obj.eval(p), eps);
        if f_converged(f_old, fx, cfg) || moved <= cfg.x_tol {
            return (iter + 1, true);
        }

        let g_dot = g.dot(&g);
        let beta = if g_dot > 0.0 {
            (g_new.dot(&(&g_new - &g)) / g_dot).max(0.0)
        } else {
            0.0
        };
        d = -&g_new + beta * &d;
        if d.dot(&g_new) >= 0.0 {
            d = -&g_new;
        }
        g = g_new;
    }

    (cfg.max_iterations, false)
}
