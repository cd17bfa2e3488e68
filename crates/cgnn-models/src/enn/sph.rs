//! Real spherical harmonics of relative atomic positions.
use candle_core::{DType, Result, Tensor, D};
use std::f64::consts::PI;

/// Spherical harmonics `Y_lm(r̂_ij)` of all pairwise displacements `r_ij = p1_i - p2_j`.
#[derive(Clone, Debug)]
pub struct SphericalHarmonicsRel {
    maxl: usize,
}

impl SphericalHarmonicsRel {
    pub fn new(maxl: usize) -> Self {
        Self { maxl }
    }

    pub fn maxl(&self) -> usize {
        self.maxl
    }

    /// `pos1`, `pos2`: `[B, N, 3]`.
    ///
    /// Returns one `[B, N, N, 2l + 1]` tensor per order `l = 0..=maxl` together with
    /// the pairwise norms `[B, N, N]`. Zero displacements (self pairs, padding) get
    /// harmonics of the unit vector `0`, so callers mask them with `norms > 0`.
    pub fn forward(&self, pos1: &Tensor, pos2: &Tensor) -> Result<(Vec<Tensor>, Tensor)> {
        let rel = pos1.unsqueeze(2)?.broadcast_sub(&pos2.unsqueeze(1)?)?;
        let norms = rel.sqr()?.sum(D::Minus1)?.sqrt()?;
        let is_zero = norms.eq(0f64)?.to_dtype(norms.dtype())?;
        let safe = norms.add(&is_zero)?;
        let unit = rel.broadcast_div(&safe.unsqueeze(D::Minus1)?)?;

        let x = unit.narrow(D::Minus1, 0, 1)?.squeeze(D::Minus1)?;
        let y = unit.narrow(D::Minus1, 1, 1)?.squeeze(D::Minus1)?;
        let z = unit.narrow(D::Minus1, 2, 1)?.squeeze(D::Minus1)?;
        let sph = real_spherical_harmonics(self.maxl, &x, &y, &z)?;
        Ok((sph, norms))
    }
}

fn normalization(l: usize, m: usize) -> f64 {
    // (l - m)! / (l + m)!
    let ratio: f64 = ((l - m + 1)..=(l + m)).map(|k| 1.0 / k as f64).product();
    ((2 * l + 1) as f64 / (4.0 * PI) * ratio).sqrt()
}

/// Real, orthonormal spherical harmonics of unit vectors `(x, y, z)`.
///
/// Built from the associated Legendre recurrence with the `sin(θ)^m` factor folded
/// into `(x + iy)^m`, so no trigonometric functions are evaluated. Entry `l` has
/// the input shape plus a trailing axis of size `2l + 1`, ordered `m = -l..=l`.
pub fn real_spherical_harmonics(
    maxl: usize,
    x: &Tensor,
    y: &Tensor,
    z: &Tensor,
) -> Result<Vec<Tensor>> {
    let ones = z.ones_like()?;

    // (x + iy)^m = cos_m + i sin_m
    let mut cos_m = vec![ones.clone()];
    let mut sin_m = vec![z.zeros_like()?];
    for m in 1..=maxl {
        let c = x.mul(&cos_m[m - 1])?.sub(&y.mul(&sin_m[m - 1])?)?;
        let s = x.mul(&sin_m[m - 1])?.add(&y.mul(&cos_m[m - 1])?)?;
        cos_m.push(c);
        sin_m.push(s);
    }

    // legendre[l][m] = P_l^m(z) / (1 - z^2)^(m/2)
    let mut legendre: Vec<Vec<Tensor>> = Vec::with_capacity(maxl + 1);
    for l in 0..=maxl {
        let mut row = Vec::with_capacity(l + 1);
        for m in 0..=l {
            let p = if m == l {
                // (-1)^m (2m - 1)!!
                let dfact: f64 = (1..=m).map(|k| (2 * k - 1) as f64).product();
                let sign = if m % 2 == 0 { 1.0 } else { -1.0 };
                ones.affine(sign * dfact, 0.0)?
            } else if m + 1 == l {
                z.mul(&legendre[l - 1][m])?
                    .affine((2 * m + 1) as f64, 0.0)?
            } else {
                let a = z
                    .mul(&legendre[l - 1][m])?
                    .affine((2 * l - 1) as f64, 0.0)?;
                let b = legendre[l - 2][m].affine((l + m - 1) as f64, 0.0)?;
                a.sub(&b)?.affine(1.0 / (l - m) as f64, 0.0)?
            };
            row.push(p);
        }
        legendre.push(row);
    }

    let axis = z.rank();
    (0..=maxl)
        .map(|l| {
            let mut components = Vec::with_capacity(2 * l + 1);
            for m in (1..=l).rev() {
                let n = normalization(l, m) * 2f64.sqrt();
                components.push(legendre[l][m].mul(&sin_m[m])?.affine(n, 0.0)?);
            }
            components.push(legendre[l][0].affine(normalization(l, 0), 0.0)?);
            for m in 1..=l {
                let n = normalization(l, m) * 2f64.sqrt();
                components.push(legendre[l][m].mul(&cos_m[m])?.affine(n, 0.0)?);
            }
            Tensor::stack(&components, axis)?.to_dtype(DType::F32)
        })
        .collect()
}
