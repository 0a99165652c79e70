//! Restart-free GMRES on provider vectors.
//!
//! Modified Gram-Schmidt builds the Krylov basis; Givens rotations keep the
//! Hessenberg matrix triangular so the residual norm is known at every
//! iteration without forming the iterate.

use faer::Mat;

use crate::ark::{ArkError, VectorOps};

/// Outcome of one linear solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GmresOutcome {
    /// Krylov iterations performed
    pub iterations: usize,
    /// Final residual norm relative to the right-hand side norm
    pub relative_residual: f64,
    /// Whether the relative tolerance was met
    pub converged: bool,
}

/// GMRES workspace holding `max_krylov + 1` basis vectors.
pub(crate) struct Gmres<H> {
    basis: Vec<H>,
    hessenberg: Mat<f64>,
    rotations: Vec<(f64, f64)>,
    rhs: Vec<f64>,
    rel_tol: f64,
}

impl<H: Copy + Eq + std::fmt::Debug> Gmres<H> {
    #[cfg(test)]
    pub(crate) fn new<S: VectorOps<Handle = H>>(
        sys: &mut S,
        template: H,
        max_krylov: usize,
        rel_tol: f64,
    ) -> Result<Self, ArkError> {
        let basis = crate::ark::vector::clone_vectors(sys, template, max_krylov + 1)?;
        Ok(Self::with_basis(basis, rel_tol))
    }

    /// Use already allocated basis vectors; the Krylov dimension is one less
    /// than their number.
    pub(crate) fn with_basis(basis: Vec<H>, rel_tol: f64) -> Self {
        let max_krylov = basis.len().saturating_sub(1);
        Self {
            basis,
            hessenberg: Mat::zeros(max_krylov + 1, max_krylov),
            rotations: vec![(1.0, 0.0); max_krylov],
            rhs: vec![0.0; max_krylov + 1],
            rel_tol,
        }
    }

    pub(crate) fn vectors(&self) -> impl Iterator<Item = H> + '_ {
        self.basis.iter().copied()
    }

    fn max_krylov(&self) -> usize {
        self.basis.len() - 1
    }

    /// Solve `A x = b` from a zero initial guess.
    ///
    /// `matvec(sys, v, av)` writes `A v` into `av`. A partial reduction of the
    /// residual is still returned in `x`; the caller decides whether it is
    /// good enough.
    pub(crate) fn solve<S, F>(
        &mut self,
        sys: &mut S,
        b: H,
        x: H,
        mut matvec: F,
    ) -> Result<GmresOutcome, ArkError>
    where
        S: VectorOps<Handle = H>,
        F: FnMut(&mut S, H, H) -> Result<(), ArkError>,
    {
        let beta = sys.dot(b, b)?.sqrt();
        if beta == 0.0 {
            sys.constant(0.0, x)?;
            return Ok(GmresOutcome {
                iterations: 0,
                relative_residual: 0.0,
                converged: true,
            });
        }
        if !beta.is_finite() {
            return Ok(GmresOutcome {
                iterations: 0,
                relative_residual: f64::INFINITY,
                converged: false,
            });
        }

        let maxl = self.max_krylov();
        let h = &mut self.hessenberg;
        for j in 0..maxl {
            for i in 0..=maxl {
                h[(i, j)] = 0.0;
            }
        }
        self.rhs.iter_mut().for_each(|g| *g = 0.0);
        self.rhs[0] = beta;
        sys.scale(1.0 / beta, b, self.basis[0])?;

        let mut k = 0;
        let mut residual = beta;
        for j in 0..maxl {
            let (vj, w) = (self.basis[j], self.basis[j + 1]);
            matvec(sys, vj, w)?;

            for i in 0..=j {
                let hij = sys.dot(w, self.basis[i])?;
                h[(i, j)] = hij;
                sys.linear_sum(1.0, w, -hij, self.basis[i], w)?;
            }
            let h_next = sys.dot(w, w)?.sqrt();
            h[(j + 1, j)] = h_next;

            for (i, &(c, s)) in self.rotations[..j].iter().enumerate() {
                let (a, bb) = (h[(i, j)], h[(i + 1, j)]);
                h[(i, j)] = c * a + s * bb;
                h[(i + 1, j)] = -s * a + c * bb;
            }
            let (a, bb) = (h[(j, j)], h[(j + 1, j)]);
            let r = a.hypot(bb);
            let (c, s) = if r == 0.0 { (1.0, 0.0) } else { (a / r, bb / r) };
            self.rotations[j] = (c, s);
            h[(j, j)] = r;
            h[(j + 1, j)] = 0.0;
            self.rhs[j + 1] = -s * self.rhs[j];
            self.rhs[j] *= c;

            k = j + 1;
            residual = self.rhs[j + 1].abs();
            if residual <= self.rel_tol * beta || h_next == 0.0 || !residual.is_finite() {
                break;
            }
            sys.scale(1.0 / h_next, w, w)?;
        }

        // Back substitution on the triangular factor
        let mut y = vec![0.0; k];
        for i in (0..k).rev() {
            let mut sum = self.rhs[i];
            for l in i + 1..k {
                sum -= h[(i, l)] * y[l];
            }
            y[i] = if h[(i, i)] != 0.0 { sum / h[(i, i)] } else { 0.0 };
        }
        let terms: Vec<(f64, H)> = y.iter().copied().zip(self.basis.iter().copied()).collect();
        sys.linear_combination(&terms, x)?;

        let relative_residual = residual / beta;
        log::trace!("GMRES: {k} iterations, relative residual {relative_residual:.3e}");
        Ok(GmresOutcome {
            iterations: k,
            relative_residual,
            converged: relative_residual <= self.rel_tol,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ark::VectorPool;
    use crate::ark::vector::testing::VecSystem;

    #[test]
    fn test_diagonal_system() {
        // A = diag(1, 2, 3, 4), b = (1, 1, 1, 1)
        let mut sys = VecSystem::new(vec![1.0; 4], 0.0, 0.0);
        let b = sys.clone_vector(0).unwrap();
        sys.constant(1.0, b).unwrap();
        let x = sys.clone_vector(0).unwrap();
        let mut gmres = Gmres::new(&mut sys, 0, 4, 1e-12).unwrap();

        let out = gmres
            .solve(&mut sys, b, x, |s, v, av| {
                let scaled: Vec<f64> = s.slots[v]
                    .as_ref()
                    .unwrap()
                    .iter()
                    .enumerate()
                    .map(|(i, val)| (i + 1) as f64 * val)
                    .collect();
                s.slots[av] = Some(scaled);
                Ok(())
            })
            .unwrap();

        assert!(out.converged);
        assert!(out.iterations <= 4);
        let sol = sys.slots[x].as_ref().unwrap();
        for (i, v) in sol.iter().enumerate() {
            assert!((v - 1.0 / (i + 1) as f64).abs() < 1e-10, "x[{i}] = {v}");
        }
    }

    #[test]
    fn test_identity_converges_in_one_iteration() {
        let mut sys = VecSystem::new(vec![2.0, -1.0], 0.0, 0.0);
        let x = sys.clone_vector(0).unwrap();
        let mut gmres = Gmres::new(&mut sys, 0, 3, 1e-10).unwrap();
        let out = gmres.solve(&mut sys, 0, x, |s, v, av| s.scale(1.0, v, av)).unwrap();
        assert_eq!(out.iterations, 1);
        let sol = sys.slots[x].as_ref().unwrap();
        assert!((sol[0] - 2.0).abs() < 1e-14 && (sol[1] + 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_zero_rhs() {
        let mut sys = VecSystem::new(vec![0.0; 3], 0.0, 0.0);
        let x = sys.clone_vector(0).unwrap();
        sys.constant(5.0, x).unwrap();
        let mut gmres = Gmres::new(&mut sys, 0, 2, 1e-10).unwrap();
        let out = gmres.solve(&mut sys, 0, x, |s, v, av| s.scale(1.0, v, av)).unwrap();
        assert_eq!(out.iterations, 0);
        assert_eq!(sys.slots[x].as_ref().unwrap(), &vec![0.0; 3]);
    }
}
