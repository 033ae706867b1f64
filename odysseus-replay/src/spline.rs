//! Natural cubic splines with analytic derivatives
//!
//! Used by the splined trajectory so that velocity and acceleration come from the
//! spline itself rather than from finite differences of sampled positions.

use nalgebra::Vector3;

/// Scalar natural cubic spline through (time, value) knots
///
/// The second derivative is zero at both ends. With two knots the spline is
/// a straight line.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    /// Second derivative at each knot
    moments: Vec<f64>,
}

impl CubicSpline {
    /// Fit a natural cubic spline
    ///
    /// Callers guarantee at least two knots with strictly increasing times.
    pub fn new(knots: Vec<f64>, values: Vec<f64>) -> Self {
        debug_assert!(knots.len() >= 2 && knots.len() == values.len());
        let moments = solve_moments(&knots, &values);
        Self {
            knots,
            values,
            moments,
        }
    }

    pub fn start(&self) -> f64 {
        self.knots[0]
    }

    pub fn end(&self) -> f64 {
        self.knots[self.knots.len() - 1]
    }

    /// Index i such that knots[i] <= t <= knots[i + 1], clamped to the valid range
    fn interval(&self, t: f64) -> usize {
        let upper = self.knots.partition_point(|&k| k <= t);
        upper.saturating_sub(1).min(self.knots.len() - 2)
    }

    /// (h, A, B) for the interval containing t
    fn weights(&self, i: usize, t: f64) -> (f64, f64, f64) {
        let h = self.knots[i + 1] - self.knots[i];
        let a = (self.knots[i + 1] - t) / h;
        let b = (t - self.knots[i]) / h;
        (h, a, b)
    }

    /// Evaluate the spline at t
    pub fn evaluate(&self, t: f64) -> f64 {
        let i = self.interval(t);
        let (h, a, b) = self.weights(i, t);
        let (y0, y1) = (self.values[i], self.values[i + 1]);
        let (m0, m1) = (self.moments[i], self.moments[i + 1]);

        a * y0 + b * y1 + ((a * a * a - a) * m0 + (b * b * b - b) * m1) * h * h / 6.0
    }

    /// Analytic first derivative at t
    pub fn derivative(&self, t: f64) -> f64 {
        let i = self.interval(t);
        let (h, a, b) = self.weights(i, t);
        let (y0, y1) = (self.values[i], self.values[i + 1]);
        let (m0, m1) = (self.moments[i], self.moments[i + 1]);

        (y1 - y0) / h - (3.0 * a * a - 1.0) / 6.0 * h * m0 + (3.0 * b * b - 1.0) / 6.0 * h * m1
    }

    /// Analytic second derivative at t (piecewise linear in t)
    pub fn second_derivative(&self, t: f64) -> f64 {
        let i = self.interval(t);
        let (_, a, b) = self.weights(i, t);
        a * self.moments[i] + b * self.moments[i + 1]
    }
}

/// Solve the tridiagonal system for the knot second derivatives (Thomas algorithm)
fn solve_moments(knots: &[f64], values: &[f64]) -> Vec<f64> {
    let n = knots.len();
    let mut moments = vec![0.0; n];
    if n < 3 {
        return moments;
    }

    let h: Vec<f64> = knots.windows(2).map(|w| w[1] - w[0]).collect();

    // Interior unknowns M_1..M_{n-2}
    let m = n - 2;
    let mut diag = vec![0.0; m];
    let mut upper = vec![0.0; m];
    let mut rhs = vec![0.0; m];

    for j in 0..m {
        let i = j + 1;
        diag[j] = 2.0 * (h[i - 1] + h[i]);
        upper[j] = h[i];
        rhs[j] = 6.0 * ((values[i + 1] - values[i]) / h[i] - (values[i] - values[i - 1]) / h[i - 1]);
    }

    // Forward sweep; sub-diagonal entry for row j is h[j]
    for j in 1..m {
        let factor = h[j] / diag[j - 1];
        diag[j] -= factor * upper[j - 1];
        rhs[j] -= factor * rhs[j - 1];
    }

    // Back substitution
    moments[m] = rhs[m - 1] / diag[m - 1];
    for j in (0..m - 1).rev() {
        moments[j + 1] = (rhs[j] - upper[j] * moments[j + 2]) / diag[j];
    }

    moments
}

/// Three independent cubic splines, one per axis
#[derive(Debug, Clone)]
pub struct VectorSpline {
    axes: [CubicSpline; 3],
}

impl VectorSpline {
    pub fn new(knots: &[f64], points: &[Vector3<f64>]) -> Self {
        let axis = |k: usize| {
            CubicSpline::new(knots.to_vec(), points.iter().map(|p| p[k]).collect())
        };
        Self {
            axes: [axis(0), axis(1), axis(2)],
        }
    }

    pub fn evaluate(&self, t: f64) -> Vector3<f64> {
        Vector3::new(
            self.axes[0].evaluate(t),
            self.axes[1].evaluate(t),
            self.axes[2].evaluate(t),
        )
    }

    pub fn derivative(&self, t: f64) -> Vector3<f64> {
        Vector3::new(
            self.axes[0].derivative(t),
            self.axes[1].derivative(t),
            self.axes[2].derivative(t),
        )
    }

    pub fn second_derivative(&self, t: f64) -> Vector3<f64> {
        Vector3::new(
            self.axes[0].second_derivative(t),
            self.axes[1].second_derivative(t),
            self.axes[2].second_derivative(t),
        )
    }
}
