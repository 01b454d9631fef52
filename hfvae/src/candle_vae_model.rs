use crate::candle_decoder_gated::GatedDecoder;
use crate::candle_encoder_gated::GatedEncoder;
use crate::candle_flow_householder::{FlowConfig, HouseholderFlow, LatentTrajectory};
use crate::candle_model_traits::*;
use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{VarBuilder, VarMap};

/// hidden width of every gated layer in the encoder and decoder
pub const N_HIDDEN: usize = 300;

/// Model-building configuration; constructed once, never mutated.
#[derive(Debug, Clone)]
pub struct VaeConfig {
    pub input_size: usize,
    pub z1_size: usize,
    pub number_of_flows: usize,
    pub use_accelerator: bool,
}

impl VaeConfig {
    pub fn flow(&self) -> FlowConfig {
        FlowConfig::from_steps(self.number_of_flows)
    }

    /// GPU when asked for and available, CPU otherwise
    pub fn device(&self) -> Result<Device> {
        if self.use_accelerator {
            Device::cuda_if_available(0)
        } else {
            Ok(Device::Cpu)
        }
    }
}

/// The six quantities of one forward pass. All of them are needed
/// downstream: the estimators evaluate the proposal density at `z0_nk`
/// and the prior density at `zt_nk`, so neither can be dropped.
pub struct VaeForward {
    pub x_mean_nd: Tensor,
    pub x_lnvar: f64,
    pub z0_nk: Tensor,
    pub zt_nk: Tensor,
    pub z_mean_nk: Tensor,
    pub z_lnvar_nk: Tensor,
}

/// Encode -> sample -> flow -> decode, stateless across calls.
pub struct HouseholderVae {
    encoder: GatedEncoder,
    decoder: GatedDecoder,
    flow: HouseholderFlow,
    device: Device,
}

impl HouseholderVae {
    /// Assemble encoder, decoder and flow on the variable builder's
    /// device. Each component prefixes its own variable namespace
    /// (`nn.enc.*`, `nn.dec.*`, `nn.flow.*`) in its constructor.
    pub fn new(config: &VaeConfig, vb: VarBuilder) -> Result<Self> {
        let device = vb.device().clone();

        let encoder = GatedEncoder::new(config.input_size, config.z1_size, N_HIDDEN, vb.clone())?;
        let decoder = GatedDecoder::new(config.input_size, config.z1_size, N_HIDDEN, vb.clone())?;
        let flow = HouseholderFlow::new(N_HIDDEN, config.z1_size, config.flow(), vb)?;

        Ok(Self {
            encoder,
            decoder,
            flow,
            device,
        })
    }

    /// Build a freshly initialized model together with its variable map.
    pub fn build(config: &VaeConfig) -> Result<(Self, VarMap)> {
        let device = config.device()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = Self::new(config, vb)?;
        Ok((model, varmap))
    }

    pub fn encoder(&self) -> &GatedEncoder {
        &self.encoder
    }

    pub fn decoder(&self) -> &GatedDecoder {
        &self.decoder
    }

    pub fn flow(&self) -> &HouseholderFlow {
        &self.flow
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn dim_obs(&self) -> usize {
        self.encoder.dim_obs()
    }

    pub fn dim_latent(&self) -> usize {
        self.encoder.dim_latent()
    }

    ///
    /// z = mu + sigma * eps
    /// where eps ~ N(0, 1)
    ///
    /// A fresh draw on every invocation; this is the only source of
    /// stochasticity in the forward pass.
    fn reparameterize(&self, z_mean: &Tensor, z_lnvar: &Tensor) -> Result<Tensor> {
        let eps = Tensor::randn_like(z_mean, 0., 1.)?;
        z_mean + (z_lnvar * 0.5)?.exp()? * eps
    }

    /// One full pass: encode, sample, flow, decode. The latent trajectory
    /// is consumed internally; only `z_0` and `z_T` survive in the output.
    pub fn forward(&self, x_nd: &Tensor) -> Result<VaeForward> {
        let (out, _) = self.forward_with_trajectory(x_nd)?;
        Ok(out)
    }

    /// Same pass, with the full latent trajectory kept for inspection.
    pub fn forward_with_trajectory(&self, x_nd: &Tensor) -> Result<(VaeForward, LatentTrajectory)> {
        let posterior = self.encoder.encode(x_nd)?;
        let z0_nk = self.reparameterize(&posterior.z_mean_nk, &posterior.z_lnvar_nk)?;
        let (zt_nk, trajectory) = self.flow.run(&z0_nk, &posterior.h_last_nl)?;
        let x_mean_nd = self.decoder.forward(&zt_nk)?;

        let out = VaeForward {
            x_mean_nd,
            x_lnvar: self.decoder.lnvar(),
            z0_nk,
            zt_nk,
            z_mean_nk: posterior.z_mean_nk,
            z_lnvar_nk: posterior.z_lnvar_nk,
        };

        Ok((out, trajectory))
    }

    /// Same pass, validating the reconstruction against `x_nd` through
    /// the decoder's likelihood seam, so the decoder runs once per pass.
    ///
    /// # Returns `(out, llik_n)`
    /// * `out` - the six forward-pass fields
    /// * `llik_n` - per-row `llik(x, x_mean)`
    pub fn forward_with_llik<LlikFn>(
        &self,
        x_nd: &Tensor,
        llik: &LlikFn,
    ) -> Result<(VaeForward, Tensor)>
    where
        LlikFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
    {
        let posterior = self.encoder.encode(x_nd)?;
        let z0_nk = self.reparameterize(&posterior.z_mean_nk, &posterior.z_lnvar_nk)?;
        let (zt_nk, _) = self.flow.run(&z0_nk, &posterior.h_last_nl)?;
        let (x_mean_nd, llik_n) = self.decoder.forward_with_llik(&zt_nk, x_nd, llik)?;

        let out = VaeForward {
            x_mean_nd,
            x_lnvar: self.decoder.lnvar(),
            z0_nk,
            zt_nk,
            z_mean_nk: posterior.z_mean_nk,
            z_lnvar_nk: posterior.z_lnvar_nk,
        };

        Ok((out, llik_n))
    }
}
