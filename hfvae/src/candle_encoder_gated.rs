use crate::candle_aux_layers::*;
use crate::candle_model_traits::*;
use candle_core::{Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

/// q(z | x) with two gated hidden layers and two affine heads
pub struct GatedEncoder {
    n_features: usize,
    n_latent: usize,
    n_hidden: usize,
    fc: GatedStack,
    z_mean: Linear,
    z_lnvar: Linear,
}

impl GaussianEncoderModule for GatedEncoder {
    fn encode(&self, x_nd: &Tensor) -> Result<GaussianPosterior> {
        debug_assert_eq!(x_nd.dims().len(), 2);

        let h_nl = self.fc.forward(x_nd)?;
        let z_mean_nk = self.z_mean.forward(&h_nl)?;
        let z_lnvar_nk = self.z_lnvar.forward(&h_nl)?;

        Ok(GaussianPosterior {
            z_mean_nk,
            z_lnvar_nk,
            h_last_nl: h_nl,
        })
    }

    fn dim_obs(&self) -> usize {
        self.n_features
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }

    fn dim_hidden(&self) -> usize {
        self.n_hidden
    }
}

impl GatedEncoder {
    /// Will create a new gated encoder module with these variables:
    ///
    /// * `nn.enc.fc.{0,1}.{pre,gate}` gated layers `d -> l -> l`
    /// * `nn.enc.z.mean` affine head `l -> k`
    /// * `nn.enc.z.lnvar` affine head `l -> k`
    ///
    /// # Arguments
    /// * `n_features` - the number of observed features
    /// * `n_latent` - the latent dimension
    /// * `n_hidden` - hidden width of both gated layers
    /// * `vs` - variable builder
    pub fn new(
        n_features: usize,
        n_latent: usize,
        n_hidden: usize,
        vs: VarBuilder,
    ) -> Result<Self> {
        let fc = gated_stack(n_features, &[n_hidden, n_hidden], vs.pp("nn.enc.fc"))?;
        let z_mean = xavier_linear(n_hidden, n_latent, vs.pp("nn.enc.z.mean"))?;
        let z_lnvar = xavier_linear(n_hidden, n_latent, vs.pp("nn.enc.z.lnvar"))?;

        Ok(Self {
            n_features,
            n_latent,
            n_hidden,
            fc,
            z_mean,
            z_lnvar,
        })
    }
}
