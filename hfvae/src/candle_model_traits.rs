#![allow(dead_code)]

use candle_core::{Result, Tensor};

/// Diagonal-Gaussian posterior parameters of one encoder pass, together
/// with the last hidden feature. The hidden feature is exposed on purpose:
/// the flow's first reflection direction is conditioned on the same
/// high-level features that produced the posterior parameters, not on a
/// latent sample.
pub struct GaussianPosterior {
    pub z_mean_nk: Tensor,
    pub z_lnvar_nk: Tensor,
    pub h_last_nl: Tensor,
}

pub trait GaussianEncoderModule {
    /// An encoder that maps data to posterior parameters
    ///
    /// # Arguments
    /// * `x_nd` - input data (n x d)
    ///
    /// # Returns [`GaussianPosterior`]
    /// * `z_mean_nk` - posterior mean (n x k)
    /// * `z_lnvar_nk` - posterior log-variance (n x k)
    /// * `h_last_nl` - last hidden feature (n x l), the flow seed
    fn encode(&self, x_nd: &Tensor) -> Result<GaussianPosterior>;

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;

    /// width of the hidden feature handed to the flow
    fn dim_hidden(&self) -> usize;
}

pub trait BernoulliDecoderModule {
    /// A decoder that spits out the Bernoulli reconstruction mean in (0,1)
    fn forward(&self, z_nk: &Tensor) -> Result<Tensor>;

    /// A decoder that spits out reconstruction and log-likelihood
    /// * `z_nk` - latent states
    /// * `x_nd` - observed data to validate with
    /// * `llik` - fn (observed, reconstruction) -> log-likelihood
    fn forward_with_llik<LlikFn>(
        &self,
        z_nk: &Tensor,
        x_nd: &Tensor,
        llik: &LlikFn,
    ) -> Result<(Tensor, Tensor)>
    where
        LlikFn: Fn(&Tensor, &Tensor) -> Result<Tensor>;

    /// fixed scalar log-variance of the output distribution
    fn lnvar(&self) -> f64;

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}
