//! Discretization adapter.
//!
//! A trait rather than a bare closure, so the solver can hold heterogeneous
//! user models behind a `&dyn DiscreteDynamics` the same way constraints and
//! cost are dispatched through traits rather than duck-typed callables.
//!
//! Implementors only have to provide `fd`; the default `fd_jacobian` falls
//! back to a central-difference approximation. Models that can provide an
//! analytic Jacobian should override it: finite differences are a
//! correctness fallback, not the primary path.

use nalgebra::{DMatrix, DVector};

const FD_EPSILON: f64 = 1e-5;

/// A discrete-time dynamics model `x_{k+1} = fd(x_k, u_k, dt_k)`, together
/// with its Jacobian and (for foh) the continuous dynamics needed to
/// compute interval midpoints.
pub trait DiscreteDynamics {
    /// State dimension `n`.
    fn state_dim(&self) -> usize;
    /// Plant control dimension `m`.
    fn control_dim(&self) -> usize;

    /// `x_{k+1} = fd(x_k, u_k, dt_k)`.
    fn fd(&self, x: &DVector<f64>, u: &DVector<f64>, dt: f64) -> DVector<f64>;

    /// `(A, B) = (∂fd/∂x, ∂fd/∂u)` at `(x, u, dt)`.
    fn fd_jacobian(&self, x: &DVector<f64>, u: &DVector<f64>, dt: f64) -> (DMatrix<f64>, DMatrix<f64>) {
        finite_difference_jacobian(
            |xx, uu| self.fd(xx, uu, dt),
            x,
            u,
            self.state_dim(),
            self.control_dim(),
        )
    }

    /// `∂fd/∂dt` at `(x, u, dt)`, needed by the minimum-time embedding.
    /// Falls back to a central difference in `dt`.
    fn fd_dt_jacobian(&self, x: &DVector<f64>, u: &DVector<f64>, dt: f64) -> DVector<f64> {
        let plus = self.fd(x, u, dt + FD_EPSILON);
        let minus = self.fd(x, u, (dt - FD_EPSILON).max(0.0));
        (plus - minus) / (2.0 * FD_EPSILON)
    }

    /// Whether this model supports first-order-hold integration (i.e.
    /// implements [`Self::fc`]). Defaults to `false`.
    fn supports_foh(&self) -> bool {
        false
    }

    /// Continuous dynamics `fc(x, u) = dx/dt`, required for foh.
    fn fc(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> DVector<f64> {
        panic!("fc() is required for first-order-hold integration but was not implemented")
    }

    /// `(Ac, Bc) = (∂fc/∂x, ∂fc/∂u)`. Falls back to finite differences.
    fn fc_jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
        finite_difference_jacobian(|xx, uu| self.fc(xx, uu), x, u, self.state_dim(), self.control_dim())
    }

    /// foh discrete step `x_{k+1} = fd(x_k, u_k, u_{k+1}, dt_k)`, implemented
    /// via an explicit third-order Runge-Kutta step with the control held
    /// at its linear interpolant between `u` and `u_next` (a standard
    /// explicit foh integrator).
    fn fd_foh(&self, x: &DVector<f64>, u: &DVector<f64>, u_next: &DVector<f64>, dt: f64) -> DVector<f64> {
        rk3_foh_step(self, x, u, u_next, dt).1
    }

    /// `(A, B, C) = (∂x⁺/∂x, ∂x⁺/∂u, ∂x⁺/∂u⁺)` for the foh step.
    fn fd_foh_jacobian(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        u_next: &DVector<f64>,
        dt: f64,
    ) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>)
    where
        Self: Sized,
    {
        let n = self.state_dim();
        let m = self.control_dim();
        let mut a = DMatrix::zeros(n, n);
        let mut b = DMatrix::zeros(n, m);
        let mut c = DMatrix::zeros(n, m);
        let f0 = self.fd_foh(x, u, u_next, dt);
        for i in 0..n {
            let mut xp = x.clone();
            xp[i] += FD_EPSILON;
            let mut xm = x.clone();
            xm[i] -= FD_EPSILON;
            let d = (self.fd_foh(&xp, u, u_next, dt) - self.fd_foh(&xm, u, u_next, dt)) / (2.0 * FD_EPSILON);
            a.set_column(i, &d);
        }
        for i in 0..m {
            let mut up = u.clone();
            up[i] += FD_EPSILON;
            let mut um = u.clone();
            um[i] -= FD_EPSILON;
            let d = (self.fd_foh(x, &up, u_next, dt) - self.fd_foh(x, &um, u_next, dt)) / (2.0 * FD_EPSILON);
            b.set_column(i, &d);

            let mut unp = u_next.clone();
            unp[i] += FD_EPSILON;
            let mut unm = u_next.clone();
            unm[i] -= FD_EPSILON;
            let d = (self.fd_foh(x, u, &unp, dt) - self.fd_foh(x, u, &unm, dt)) / (2.0 * FD_EPSILON);
            c.set_column(i, &d);
        }
        let _ = f0;
        (a, b, c)
    }
}

/// Central-difference Jacobian of `f(x, u)` with respect to both arguments.
pub fn finite_difference_jacobian(
    f: impl Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64>,
    x: &DVector<f64>,
    u: &DVector<f64>,
    n: usize,
    m: usize,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let mut a = DMatrix::zeros(n, n);
    let mut b = DMatrix::zeros(n, m);

    for i in 0..n {
        let mut xp = x.clone();
        xp[i] += FD_EPSILON;
        let mut xm = x.clone();
        xm[i] -= FD_EPSILON;
        let d = (f(&xp, u) - f(&xm, u)) / (2.0 * FD_EPSILON);
        a.set_column(i, &d);
    }
    for i in 0..m {
        let mut up = u.clone();
        up[i] += FD_EPSILON;
        let mut um = u.clone();
        um[i] -= FD_EPSILON;
        let d = (f(x, &up) - f(x, &um)) / (2.0 * FD_EPSILON);
        b.set_column(i, &d);
    }

    (a, b)
}

/// Explicit third-order Runge-Kutta step with the control linearly
/// interpolated between `u` and `u_next` over the interval, a standard
/// explicit first-order-hold integrator. Returns `(midpoint, x_next)`; the
/// midpoint is what the trajectory container stores as `xm_k`.
pub fn rk3_foh_step<D: DiscreteDynamics + ?Sized>(
    model: &D,
    x: &DVector<f64>,
    u: &DVector<f64>,
    u_next: &DVector<f64>,
    dt: f64,
) -> (DVector<f64>, DVector<f64>) {
    let um = 0.5 * (u + u_next);
    let k1 = model.fc(x, u);
    let xm = x + &k1 * (dt / 2.0);
    let k2 = model.fc(&xm, &um);
    let x3 = x - &k1 * dt + &k2 * (2.0 * dt);
    let k3 = model.fc(&x3, u_next);
    let x_next = x + (k1 + k2 * 4.0 + k3) * (dt / 6.0);
    (xm, x_next)
}
