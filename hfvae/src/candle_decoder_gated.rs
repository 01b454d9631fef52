use crate::candle_aux_layers::*;
use crate::candle_model_traits::*;
use candle_core::{Result, Tensor};
use candle_nn::{ops, Linear, Module, VarBuilder};

/// p(x | z) mirroring the encoder: two gated hidden layers and one affine
/// head pushed through a sigmoid, so the reconstruction mean stays in
/// (0,1). The output log-variance is a fixed scalar 0 (known-variance
/// Bernoulli decoder).
pub struct GatedDecoder {
    n_features: usize,
    n_latent: usize,
    fc: GatedStack,
    x_mean: Linear,
}

impl GatedDecoder {
    /// Will create a new gated decoder module with these variables:
    ///
    /// * `nn.dec.fc.{0,1}.{pre,gate}` gated layers `k -> l -> l`
    /// * `nn.dec.x.mean` affine head `l -> d`
    pub fn new(
        n_features: usize,
        n_latent: usize,
        n_hidden: usize,
        vs: VarBuilder,
    ) -> Result<Self> {
        let fc = gated_stack(n_latent, &[n_hidden, n_hidden], vs.pp("nn.dec.fc"))?;
        let x_mean = xavier_linear(n_hidden, n_features, vs.pp("nn.dec.x.mean"))?;

        Ok(Self {
            n_features,
            n_latent,
            fc,
            x_mean,
        })
    }
}

impl BernoulliDecoderModule for GatedDecoder {
    fn forward(&self, z_nk: &Tensor) -> Result<Tensor> {
        let h_nl = self.fc.forward(z_nk)?;
        ops::sigmoid(&self.x_mean.forward(&h_nl)?)
    }

    fn forward_with_llik<LlikFn>(
        &self,
        z_nk: &Tensor,
        x_nd: &Tensor,
        llik: &LlikFn,
    ) -> Result<(Tensor, Tensor)>
    where
        LlikFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
    {
        let recon_nd = self.forward(z_nk)?;
        let llik_n = llik(x_nd, &recon_nd)?;
        Ok((recon_nd, llik_n))
    }

    fn lnvar(&self) -> f64 {
        0.
    }

    fn dim_obs(&self) -> usize {
        self.n_features
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}
