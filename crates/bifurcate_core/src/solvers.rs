use crate::traits::{Scalar, VectorField};

/// Classic Runge-Kutta 4th Order Solver
///
/// Generic over the scalar type so the same integrator propagates dual
/// numbers, which is how the shooting problems obtain exact derivatives of
/// the discrete flow with respect to the initial state, period and parameter.
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![T::zero(); dim],
            k2: vec![T::zero(); dim],
            k3: vec![T::zero(); dim],
            k4: vec![T::zero(); dim],
            tmp: vec![T::zero(); dim],
        }
    }

    /// Performs one step of size `dt`, updating `t` and `state` in place.
    pub fn step<S: VectorField + ?Sized>(
        &mut self,
        system: &S,
        params: &[T],
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) {
        let half = T::from_f64(0.5);
        let sixth = T::from_f64(1.0 / 6.0);
        let two = T::from_f64(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.evaluate(t0, state, params, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.evaluate(t0 + dt * half, &self.tmp, params, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.evaluate(t0 + dt * half, &self.tmp, params, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.evaluate(t0 + dt, &self.tmp, params, &mut self.k4);

        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }

    /// Integrates `state` over `[0, duration]` with `steps` equal steps.
    pub fn integrate<S: VectorField + ?Sized>(
        &mut self,
        system: &S,
        params: &[T],
        state: &mut [T],
        duration: T,
        steps: usize,
    ) {
        let dt = duration / T::from_f64(steps as f64);
        let mut t = T::zero();
        for _ in 0..steps {
            self.step(system, params, &mut t, state, dt);
        }
    }
}
