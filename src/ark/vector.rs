//! Vector operations supplied by the caller.
//!
//! The stepper never owns data. It works on opaque handles and asks the
//! provider to clone, combine and measure them, so the caller decides where
//! vectors live (a slot in a state container, a plain `Vec`, a device buffer).

use crate::ark::ArkError;

/// Allocation of provider-owned vectors.
///
/// Creating an integrator needs only this half of the provider.
pub trait VectorPool {
    /// Opaque vector handle.
    type Handle: Copy + Eq + std::fmt::Debug;

    /// Allocate a new vector shaped like `template`. Contents are unspecified.
    fn clone_vector(&mut self, template: Self::Handle) -> Result<Self::Handle, ArkError>;

    /// Give a vector back to the provider.
    fn destroy_vector(&mut self, v: Self::Handle);
}

/// Operations on provider-owned vectors.
///
/// Every output argument `z` may alias any input.
pub trait VectorOps: VectorPool {
    /// z = a x + b y
    fn linear_sum(
        &mut self,
        a: f64,
        x: Self::Handle,
        b: f64,
        y: Self::Handle,
        z: Self::Handle,
    ) -> Result<(), ArkError>;

    /// z = c x
    fn scale(&mut self, c: f64, x: Self::Handle, z: Self::Handle) -> Result<(), ArkError>;

    /// z = c
    fn constant(&mut self, c: f64, z: Self::Handle) -> Result<(), ArkError>;

    /// z = |x|
    fn abs(&mut self, x: Self::Handle, z: Self::Handle) -> Result<(), ArkError>;

    /// z = 1 / x
    fn inv(&mut self, x: Self::Handle, z: Self::Handle) -> Result<(), ArkError>;

    /// z = x + b
    fn add_const(&mut self, x: Self::Handle, b: f64, z: Self::Handle) -> Result<(), ArkError>;

    /// Dot product.
    fn dot(&self, x: Self::Handle, y: Self::Handle) -> Result<f64, ArkError>;

    /// Weighted root-mean-square norm, sqrt(sum((x w)^2) / n).
    fn wrms_norm(&self, x: Self::Handle, w: Self::Handle) -> Result<f64, ArkError>;

    /// Maximum absolute entry.
    fn max_norm(&self, x: Self::Handle) -> Result<f64, ArkError>;

    /// z = sum c_k x_k
    ///
    /// The default chains [`linear_sum`](Self::linear_sum); providers with a
    /// fused kernel should override it.
    fn linear_combination(
        &mut self,
        terms: &[(f64, Self::Handle)],
        z: Self::Handle,
    ) -> Result<(), ArkError> {
        let Some((&(c0, x0), rest)) = terms.split_first() else {
            return self.constant(0.0, z);
        };
        // If z is one of the later terms it must be folded in first.
        if let Some(pos) = rest.iter().position(|&(_, x)| x == z) {
            let (cz, _) = rest[pos];
            self.scale(cz, z, z)?;
            self.linear_sum(c0, x0, 1.0, z, z)?;
            for (k, &(c, x)) in rest.iter().enumerate() {
                if k != pos {
                    self.linear_sum(c, x, 1.0, z, z)?;
                }
            }
            return Ok(());
        }
        self.scale(c0, x0, z)?;
        for &(c, x) in rest {
            self.linear_sum(c, x, 1.0, z, z)?;
        }
        Ok(())
    }
}

/// Clone `count` vectors from `template`, releasing them all if one fails.
pub(crate) fn clone_vectors<S: VectorPool + ?Sized>(
    sys: &mut S,
    template: S::Handle,
    count: usize,
) -> Result<Vec<S::Handle>, ArkError> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        match sys.clone_vector(template) {
            Ok(v) => out.push(v),
            Err(e) => {
                for v in out {
                    sys.destroy_vector(v);
                }
                return Err(e);
            }
        }
    }
    Ok(out)
}

/// The ODE y' = f(t, y) + g(t, y), with vectors held by the system itself.
pub trait ArkSystem: VectorOps {
    /// ydot = f(t, y), the non-stiff part.
    fn explicit_rhs(&mut self, t: f64, y: Self::Handle, ydot: Self::Handle) -> Result<(), ArkError>;

    /// ydot = g(t, y), the stiff part.
    fn implicit_rhs(&mut self, t: f64, y: Self::Handle, ydot: Self::Handle) -> Result<(), ArkError>;

    /// ydot = f(t, y) + g(t, y).
    fn full_rhs(&mut self, t: f64, y: Self::Handle, ydot: Self::Handle) -> Result<(), ArkError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Vectors in a `Vec<Vec<f64>>`; handle 0 is the solution.
    ///
    /// The right-hand side is the linear test problem
    /// y' = lambda_e y + lambda_i y + forcing(t).
    pub struct VecSystem {
        pub slots: Vec<Option<Vec<f64>>>,
        pub lambda_e: f64,
        pub lambda_i: f64,
        pub forcing: fn(f64) -> f64,
        pub capacity: usize,
        pub rhs_calls: usize,
    }

    impl VecSystem {
        pub fn new(y0: Vec<f64>, lambda_e: f64, lambda_i: f64) -> Self {
            Self {
                slots: vec![Some(y0)],
                lambda_e,
                lambda_i,
                forcing: |_| 0.0,
                capacity: usize::MAX,
                rhs_calls: 0,
            }
        }

        pub fn live(&self) -> usize {
            self.slots.iter().filter(|s| s.is_some()).count()
        }

        pub fn y(&self) -> &[f64] {
            self.get(0)
        }

        fn get(&self, h: usize) -> &[f64] {
            self.slots[h].as_deref().expect("live vector")
        }

        fn map1(&mut self, x: usize, z: usize, f: impl Fn(f64) -> f64) {
            let out: Vec<f64> = self.get(x).iter().map(|&v| f(v)).collect();
            self.slots[z] = Some(out);
        }

        fn eval(&mut self, lambda: f64, forced: bool, t: f64, y: usize, ydot: usize) {
            self.rhs_calls += 1;
            let q = if forced { (self.forcing)(t) } else { 0.0 };
            self.map1(y, ydot, |v| lambda * v + q);
        }
    }

    impl VectorPool for VecSystem {
        type Handle = usize;

        fn clone_vector(&mut self, template: usize) -> Result<usize, ArkError> {
            if self.live() >= self.capacity {
                return Err(ArkError::MemoryFail("test pool exhausted".into()));
            }
            let v = vec![0.0; self.get(template).len()];
            if let Some(free) = self.slots.iter().position(Option::is_none) {
                self.slots[free] = Some(v);
                Ok(free)
            } else {
                self.slots.push(Some(v));
                Ok(self.slots.len() - 1)
            }
        }

        fn destroy_vector(&mut self, v: usize) {
            self.slots[v] = None;
        }
    }

    impl VectorOps for VecSystem {
        fn linear_sum(&mut self, a: f64, x: usize, b: f64, y: usize, z: usize) -> Result<(), ArkError> {
            let out: Vec<f64> = self
                .get(x)
                .iter()
                .zip(self.get(y))
                .map(|(p, q)| a * p + b * q)
                .collect();
            self.slots[z] = Some(out);
            Ok(())
        }

        fn scale(&mut self, c: f64, x: usize, z: usize) -> Result<(), ArkError> {
            self.map1(x, z, |v| c * v);
            Ok(())
        }

        fn constant(&mut self, c: f64, z: usize) -> Result<(), ArkError> {
            self.map1(z, z, |_| c);
            Ok(())
        }

        fn abs(&mut self, x: usize, z: usize) -> Result<(), ArkError> {
            self.map1(x, z, f64::abs);
            Ok(())
        }

        fn inv(&mut self, x: usize, z: usize) -> Result<(), ArkError> {
            self.map1(x, z, |v| 1.0 / v);
            Ok(())
        }

        fn add_const(&mut self, x: usize, b: f64, z: usize) -> Result<(), ArkError> {
            self.map1(x, z, |v| v + b);
            Ok(())
        }

        fn dot(&self, x: usize, y: usize) -> Result<f64, ArkError> {
            Ok(self.get(x).iter().zip(self.get(y)).map(|(p, q)| p * q).sum())
        }

        fn wrms_norm(&self, x: usize, w: usize) -> Result<f64, ArkError> {
            let x = self.get(x);
            let sum: f64 = x.iter().zip(self.get(w)).map(|(p, q)| (p * q).powi(2)).sum();
            Ok((sum / x.len() as f64).sqrt())
        }

        fn max_norm(&self, x: usize) -> Result<f64, ArkError> {
            Ok(self.get(x).iter().fold(0.0, |m, v| m.max(v.abs())))
        }
    }

    impl ArkSystem for VecSystem {
        fn explicit_rhs(&mut self, t: f64, y: usize, ydot: usize) -> Result<(), ArkError> {
            self.eval(self.lambda_e, true, t, y, ydot);
            Ok(())
        }

        fn implicit_rhs(&mut self, t: f64, y: usize, ydot: usize) -> Result<(), ArkError> {
            self.eval(self.lambda_i, false, t, y, ydot);
            Ok(())
        }

        fn full_rhs(&mut self, t: f64, y: usize, ydot: usize) -> Result<(), ArkError> {
            self.eval(self.lambda_e + self.lambda_i, true, t, y, ydot);
            Ok(())
        }
    }
}
