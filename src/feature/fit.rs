//! Nonlinear elution-profile fitting.
//!
//! Two models share the [`TraceFitter`] contract: a symmetric Gaussian and
//! the asymmetric exponential-Gaussian hybrid (EGH) of Lan & Jorgenson.
//! Both are solved with a small Levenberg-Marquardt loop over the stacked
//! peaks of all traces, using analytic Jacobians; non-convergence is a
//! normal outcome and is handled by the downstream quality checks.

use nalgebra::{DMatrix, DVector};

use crate::feature::config::RtShape;
use crate::feature::traces::{MassTrace, MassTraces};

/// Gaussian FWHM factor: `2 * sqrt(2 * ln 2)`
const GAUSS_FWHM_FACTOR: f64 = 2.354_820_045_030_949_4;

/// `sqrt(2 * pi)`
const SQRT_TWO_PI: f64 = 2.506_628_274_631_000_2;

/// Profile fraction at 2.5 Gaussian sigma: `exp(-0.5 * 2.5^2)`
const EGH_BOUND_ALPHA: f64 = 0.043_936_933_623_407_4;

/// Epsilon polynomial of the EGH area approximation (Lan & Jorgenson)
const EGH_EPSILON_COEFS: [f64; 7] = [
    4.0, -6.293724, 9.232834, -11.342910, 9.123978, -4.173753, 0.827797,
];

/// Convergence and iteration limits of the fit
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    /// Maximum number of Levenberg-Marquardt iterations
    pub max_iterations: usize,
    /// Absolute epsilon on the parameter step
    pub epsilon_abs: f64,
    /// Relative epsilon on the parameter step
    pub epsilon_rel: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            epsilon_abs: 0.0001,
            epsilon_rel: 0.0001,
        }
    }
}

/// Common interface of the elution-profile fitters
pub trait TraceFitter {
    /// Solve for the profile parameters minimizing the squared residuals
    /// over all peaks of all traces
    fn fit(&mut self, traces: &MassTraces, options: &FitOptions);

    /// Fitted elution apex position
    fn center(&self) -> f64;

    /// Fitted height above the baseline
    fn height(&self) -> f64;

    /// Fitted width parameter
    fn sigma(&self) -> f64;

    /// Asymmetry time constant (0 for symmetric profiles)
    fn tau(&self) -> f64 {
        0.0
    }

    /// Full width at half maximum of the fitted profile
    fn fwhm(&self) -> f64;

    /// Area under the fitted profile
    fn area(&self) -> f64;

    /// Lower RT bound of the feature region (2.5-sigma equivalent)
    fn lower_rt_bound(&self) -> f64;

    /// Upper RT bound of the feature region (2.5-sigma equivalent)
    fn upper_rt_bound(&self) -> f64;

    /// Model value (excluding baseline) at the k-th peak of a trace
    fn compute_theoretical(&self, trace: &MassTrace, k: usize) -> f64;

    /// True if the fitted model is wider than `max_rt_span` times the
    /// extended region
    fn check_maximal_rt_span(&self, max_rt_span: f64) -> bool;

    /// True if the cropped feature covers less than `min_rt_span` of the
    /// fitted width
    fn check_minimal_rt_span(&self, rt_bounds: (f64, f64), min_rt_span: f64) -> bool;
}

/// Symmetric Gaussian profile fitter
#[derive(Debug, Clone, Default)]
pub struct GaussTraceFitter {
    height: f64,
    x0: f64,
    sigma: f64,
    region_rt_span: f64,
}

impl GaussTraceFitter {
    /// New fitter with zeroed parameters
    pub fn new() -> Self {
        Self::default()
    }

    fn profile(&self, rt: f64) -> f64 {
        (-0.5 * ((rt - self.x0) / self.sigma).powi(2)).exp()
    }
}

impl TraceFitter for GaussTraceFitter {
    fn fit(&mut self, traces: &MassTraces, options: &FitOptions) {
        let (max_rt, max_intensity, region_rt_span) = anchor_estimates(traces);
        self.region_rt_span = region_rt_span;

        let mut params = [
            max_intensity - traces.baseline,
            max_rt,
            region_rt_span / 20.0,
        ];
        levenberg_marquardt(&mut params, options, traces, |p, rt, scale| {
            let (height, x0, sigma) = (p[0], p[1], p[2]);
            let delta = rt - x0;
            let e = (-0.5 * (delta / sigma).powi(2)).exp();
            let value = scale * height * e;
            (
                value,
                [
                    scale * e,
                    value * delta / (sigma * sigma),
                    value * delta * delta / (sigma * sigma * sigma),
                ],
            )
        });
        self.height = params[0];
        self.x0 = params[1];
        self.sigma = params[2].abs();
    }

    fn center(&self) -> f64 {
        self.x0
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }

    fn fwhm(&self) -> f64 {
        GAUSS_FWHM_FACTOR * self.sigma
    }

    fn area(&self) -> f64 {
        self.height * self.sigma * SQRT_TWO_PI
    }

    fn lower_rt_bound(&self) -> f64 {
        self.x0 - 2.5 * self.sigma
    }

    fn upper_rt_bound(&self) -> f64 {
        self.x0 + 2.5 * self.sigma
    }

    fn compute_theoretical(&self, trace: &MassTrace, k: usize) -> f64 {
        trace.theoretical_int * self.height * self.profile(trace.peaks[k].rt)
    }

    fn check_maximal_rt_span(&self, max_rt_span: f64) -> bool {
        5.0 * self.sigma > max_rt_span * self.region_rt_span
    }

    fn check_minimal_rt_span(&self, rt_bounds: (f64, f64), min_rt_span: f64) -> bool {
        rt_bounds.1 - rt_bounds.0 < min_rt_span * 5.0 * self.sigma
    }
}

/// Exponential-Gaussian hybrid profile fitter (Lan & Jorgenson)
#[derive(Debug, Clone, Default)]
pub struct EghTraceFitter {
    height: f64,
    x0: f64,
    sigma: f64,
    tau: f64,
    region_rt_span: f64,
}

impl EghTraceFitter {
    /// New fitter with zeroed parameters
    pub fn new() -> Self {
        Self::default()
    }

    fn profile(&self, rt: f64) -> f64 {
        let delta = rt - self.x0;
        let denominator = 2.0 * self.sigma * self.sigma + self.tau * delta;
        if denominator > 0.0 {
            (-delta * delta / denominator).exp()
        } else {
            0.0
        }
    }

    /// RT positions where the profile equals `alpha * height`
    fn alpha_boundaries(&self, alpha: f64) -> (f64, f64) {
        let l = alpha.ln();
        let s = ((l * self.tau) * (l * self.tau) / 4.0 - 2.0 * l * self.sigma * self.sigma).sqrt();
        let s1 = -(l * self.tau) / 2.0 + s;
        let s2 = -(l * self.tau) / 2.0 - s;
        (self.x0 + s1.min(s2), self.x0 + s1.max(s2))
    }
}

impl TraceFitter for EghTraceFitter {
    fn fit(&mut self, traces: &MassTraces, options: &FitOptions) {
        let (max_rt, max_intensity, region_rt_span) = anchor_estimates(traces);
        self.region_rt_span = region_rt_span;

        let mut params = [
            max_intensity - traces.baseline,
            max_rt,
            region_rt_span / 20.0,
            0.0,
        ];
        levenberg_marquardt(&mut params, options, traces, |p, rt, scale| {
            let (height, x0, sigma, tau) = (p[0], p[1], p[2], p[3]);
            let delta = rt - x0;
            let denominator = 2.0 * sigma * sigma + tau * delta;
            if denominator <= 0.0 {
                return (0.0, [0.0; 4]);
            }
            let e = (-delta * delta / denominator).exp();
            let value = scale * height * e;
            let d2 = denominator * denominator;
            (
                value,
                [
                    scale * e,
                    value * (2.0 * delta * denominator - delta * delta * tau) / d2,
                    value * 4.0 * sigma * delta * delta / d2,
                    value * delta * delta * delta / d2,
                ],
            )
        });
        self.height = params[0];
        self.x0 = params[1];
        self.sigma = params[2].abs();
        self.tau = params[3];
    }

    fn center(&self) -> f64 {
        self.x0
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn sigma(&self) -> f64 {
        self.sigma
    }

    fn tau(&self) -> f64 {
        self.tau
    }

    fn fwhm(&self) -> f64 {
        let bounds = self.alpha_boundaries(0.5);
        bounds.1 - bounds.0
    }

    fn area(&self) -> f64 {
        let tau_abs = self.tau.abs();
        let phi = (tau_abs / self.sigma).atan();
        let mut epsilon = 0.0;
        let mut phi_pow = 1.0;
        for coef in EGH_EPSILON_COEFS {
            epsilon += phi_pow * coef;
            phi_pow *= phi;
        }
        self.height * (self.sigma * (std::f64::consts::PI / 8.0).sqrt() + tau_abs) * epsilon
    }

    fn lower_rt_bound(&self) -> f64 {
        self.alpha_boundaries(EGH_BOUND_ALPHA).0
    }

    fn upper_rt_bound(&self) -> f64 {
        self.alpha_boundaries(EGH_BOUND_ALPHA).1
    }

    fn compute_theoretical(&self, trace: &MassTrace, k: usize) -> f64 {
        trace.theoretical_int * self.height * self.profile(trace.peaks[k].rt)
    }

    fn check_maximal_rt_span(&self, max_rt_span: f64) -> bool {
        2.5 * self.fwhm() > max_rt_span * self.region_rt_span
    }

    fn check_minimal_rt_span(&self, rt_bounds: (f64, f64), min_rt_span: f64) -> bool {
        rt_bounds.1 - rt_bounds.0 < min_rt_span * (self.upper_rt_bound() - self.lower_rt_bound())
    }
}

/// Tagged union over the two profile fitters
#[derive(Debug, Clone)]
pub enum ProfileFitter {
    /// Symmetric Gaussian model
    Gauss(GaussTraceFitter),
    /// Asymmetric EGH model
    Egh(EghTraceFitter),
}

impl ProfileFitter {
    /// Fitter for the configured profile shape
    pub fn for_shape(shape: RtShape) -> Self {
        match shape {
            RtShape::Symmetric => Self::Gauss(GaussTraceFitter::new()),
            RtShape::Asymmetric => Self::Egh(EghTraceFitter::new()),
        }
    }

    /// True for the asymmetric model
    pub fn is_asymmetric(&self) -> bool {
        matches!(self, Self::Egh(_))
    }

    fn as_dyn(&self) -> &dyn TraceFitter {
        match self {
            Self::Gauss(fitter) => fitter,
            Self::Egh(fitter) => fitter,
        }
    }
}

impl TraceFitter for ProfileFitter {
    fn fit(&mut self, traces: &MassTraces, options: &FitOptions) {
        match self {
            Self::Gauss(fitter) => fitter.fit(traces, options),
            Self::Egh(fitter) => fitter.fit(traces, options),
        }
    }

    fn center(&self) -> f64 {
        self.as_dyn().center()
    }

    fn height(&self) -> f64 {
        self.as_dyn().height()
    }

    fn sigma(&self) -> f64 {
        self.as_dyn().sigma()
    }

    fn tau(&self) -> f64 {
        self.as_dyn().tau()
    }

    fn fwhm(&self) -> f64 {
        self.as_dyn().fwhm()
    }

    fn area(&self) -> f64 {
        self.as_dyn().area()
    }

    fn lower_rt_bound(&self) -> f64 {
        self.as_dyn().lower_rt_bound()
    }

    fn upper_rt_bound(&self) -> f64 {
        self.as_dyn().upper_rt_bound()
    }

    fn compute_theoretical(&self, trace: &MassTrace, k: usize) -> f64 {
        self.as_dyn().compute_theoretical(trace, k)
    }

    fn check_maximal_rt_span(&self, max_rt_span: f64) -> bool {
        self.as_dyn().check_maximal_rt_span(max_rt_span)
    }

    fn check_minimal_rt_span(&self, rt_bounds: (f64, f64), min_rt_span: f64) -> bool {
        self.as_dyn().check_minimal_rt_span(rt_bounds, min_rt_span)
    }
}

/// Apex RT, apex intensity and RT span of the anchor trace
fn anchor_estimates(traces: &MassTraces) -> (f64, f64, f64) {
    let anchor = &traces[traces.max_trace];
    let mut max_rt = 0.0;
    let mut max_intensity = 0.0f64;
    for peak in &anchor.peaks {
        if peak.intensity as f64 > max_intensity {
            max_intensity = peak.intensity as f64;
            max_rt = peak.rt;
        }
    }
    let span = match (anchor.peaks.first(), anchor.peaks.last()) {
        (Some(first), Some(last)) => last.rt - first.rt,
        _ => 0.0,
    };
    (max_rt, max_intensity, span)
}

/// Levenberg-Marquardt over the stacked peaks of all traces.
///
/// `model` evaluates one data point: given the parameters, the peak RT and
/// the theoretical intensity scale of its trace, it returns the model value
/// (excluding baseline) and the partial derivatives. The step-delta test of
/// the GSL solver is used for convergence: every parameter step must fall
/// below `epsilon_abs + epsilon_rel * |parameter|`.
fn levenberg_marquardt<const P: usize>(
    params: &mut [f64; P],
    options: &FitOptions,
    traces: &MassTraces,
    model: impl Fn(&[f64; P], f64, f64) -> (f64, [f64; P]),
) {
    let data_count = traces.peak_count();
    if data_count == 0 {
        return;
    }

    let mut residuals = DVector::zeros(data_count);
    let mut jacobian = DMatrix::zeros(data_count, P);
    let evaluate = |p: &[f64; P], residuals: &mut DVector<f64>, jacobian: &mut DMatrix<f64>| {
        let mut row = 0;
        for trace in &traces.traces {
            for peak in &trace.peaks {
                let (value, gradient) = model(p, peak.rt, trace.theoretical_int);
                residuals[row] = traces.baseline + value - peak.intensity as f64;
                for (column, g) in gradient.iter().enumerate() {
                    jacobian[(row, column)] = *g;
                }
                row += 1;
            }
        }
    };

    evaluate(params, &mut residuals, &mut jacobian);
    let mut cost = residuals.norm_squared();
    let mut lambda = 1e-3;

    for _ in 0..options.max_iterations {
        let jt = jacobian.transpose();
        let mut normal = &jt * &jacobian;
        let gradient = &jt * &residuals;
        for i in 0..P {
            normal[(i, i)] += lambda * normal[(i, i)].max(1e-12);
        }

        let Some(step) = normal.lu().solve(&gradient) else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
            continue;
        };

        let mut trial = *params;
        for (i, value) in trial.iter_mut().enumerate() {
            *value -= step[i];
        }

        let mut trial_residuals = DVector::zeros(data_count);
        let mut trial_jacobian = DMatrix::zeros(data_count, P);
        evaluate(&trial, &mut trial_residuals, &mut trial_jacobian);
        let trial_cost = trial_residuals.norm_squared();

        if trial_cost < cost {
            *params = trial;
            residuals = trial_residuals;
            jacobian = trial_jacobian;
            cost = trial_cost;
            lambda = (lambda * 0.1).max(1e-12);

            let converged = (0..P).all(|i| {
                step[i].abs() < options.epsilon_abs + options.epsilon_rel * params[i].abs()
            });
            if converged {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
        }
    }
}
