#![allow(dead_code)]

use candle_core::{Result, Tensor};

/// Bernoulli log-likelihood of binary-ish data in [0,1]
///
/// llik(i) = sum_d x(i,d) * log p(i,d) + (1 - x(i,d)) * log(1 - p(i,d))
///
/// The mean is clamped to [1e-5, 1 - 1e-5] so a saturated sigmoid output
/// cannot produce log(0).
///
/// * `x_nd` - data tensor (observed data)
/// * `prob_nd` - Bernoulli mean tensor (reconstruction)
///
pub fn log_bernoulli(x_nd: &Tensor, prob_nd: &Tensor) -> Result<Tensor> {
    let eps = 1e-5;
    let prob_nd = prob_nd.clamp(eps, 1. - eps)?;

    let on_nd = x_nd.mul(&prob_nd.log()?)?;
    let off_nd = x_nd.affine(-1., 1.)?.mul(&prob_nd.affine(-1., 1.)?.log()?)?;

    (on_nd + off_nd)?.sum(x_nd.rank() - 1)
}

/// Diagonal-Gaussian log-density, up to the additive `-0.5 k ln(2π)`
/// constant shared with [`log_normal_standard`] (the two only ever enter
/// this crate as a difference, so the constant cancels exactly)
///
/// log q(i) = -0.5 * sum_k [ lnvar(i,k) + (x(i,k) - mu(i,k))^2 / exp(lnvar(i,k)) ]
///
pub fn log_normal_diag(x_nk: &Tensor, mean_nk: &Tensor, lnvar_nk: &Tensor) -> Result<Tensor> {
    let dev_nk = x_nk.sub(mean_nk)?.powf(2.)?;
    let scaled_nk = dev_nk.mul(&lnvar_nk.neg()?.exp()?)?;
    (lnvar_nk + scaled_nk)?.sum(x_nk.rank() - 1)? * (-0.5)
}

/// Standard-normal log-density, same convention as [`log_normal_diag`]
///
/// log p(i) = -0.5 * sum_k x(i,k)^2
///
pub fn log_normal_standard(x_nk: &Tensor) -> Result<Tensor> {
    x_nk.powf(2.)?.sum(x_nk.rank() - 1)? * (-0.5)
}

/// Stable log-sum-exp over host-side log-weights: subtract the running
/// max before exponentiating, so log-densities of arbitrary magnitude
/// never overflow. Returns `-inf` on an empty slice.
pub fn log_sum_exp(log_weights: &[f64]) -> f64 {
    let max = log_weights
        .iter()
        .fold(f64::NEG_INFINITY, |m, &a| m.max(a));

    if !max.is_finite() {
        return max;
    }

    let sum: f64 = log_weights.iter().map(|&a| (a - max).exp()).sum();
    max + sum.ln()
}
