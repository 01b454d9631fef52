#![allow(dead_code)]

use crate::candle_aux_layers::xavier_linear;
use candle_core::{bail, Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

/// One Householder step, the closed form
///
/// `z_new = (I - 2 v vᵀ / ‖v‖²) z = z - 2 (v vᵀ z) / ‖v‖²`
///
/// This map is orthogonal, so its Jacobian determinant is ±1 and no
/// log-det term enters any objective built on it.
///
/// * `v_nk` - reflection-generating vectors (n x k)
/// * `z_nk` - latent states (n x k)
///
/// A row of `v_nk` with zero norm leaves the reflection undefined; that is
/// an invariant violation and surfaces as an error, not an identity map.
pub fn householder_reflect(v_nk: &Tensor, z_nk: &Tensor) -> Result<Tensor> {
    // v vᵀ : batched (n x k x 1) * (n x 1 x k) = n x k x k
    let vvt_nkk = v_nk.unsqueeze(2)?.matmul(&v_nk.unsqueeze(1)?)?;
    // (v vᵀ) z : batched (n x k x k) * (n x k x 1) = n x k
    let vvtz_nk = vvt_nkk.matmul(&z_nk.unsqueeze(2)?)?.squeeze(2)?;
    // ‖v‖² per row : n x 1
    let norm_sq_n1 = v_nk.mul(v_nk)?.sum_keepdim(1)?;

    if norm_sq_n1.min_all()?.to_scalar::<f32>()? <= 0_f32 {
        bail!("degenerate reflection: a reflection vector has zero norm");
    }

    z_nk - (vvtz_nk * 2.)?.broadcast_div(&norm_sq_n1)?
}

/// Whether the posterior is sharpened by a flow at all; selected once at
/// model construction and dispatched here rather than by scattered checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowConfig {
    NoFlow,
    Flow(usize),
}

impl FlowConfig {
    /// `t = 0` means no flow, the model falls back to a plain VAE
    pub fn from_steps(t: usize) -> Self {
        if t == 0 {
            Self::NoFlow
        } else {
            Self::Flow(t)
        }
    }

    pub fn num_steps(&self) -> usize {
        match self {
            Self::NoFlow => 0,
            Self::Flow(t) => *t,
        }
    }
}

/// The latent states `z_0 .. z_T` of one forward pass together with the
/// reflection vectors `v_1 .. v_T` that produced them. Owned by the pass
/// that created it and discarded once `z_0` and `z_T` are taken out.
pub struct LatentTrajectory {
    z: Vec<Tensor>,
    v: Vec<Tensor>,
}

impl LatentTrajectory {
    fn seeded(z0_nk: Tensor) -> Self {
        Self {
            z: vec![z0_nk],
            v: vec![],
        }
    }

    fn push_step(&mut self, v_nk: Tensor, z_nk: Tensor) {
        self.v.push(v_nk);
        self.z.push(z_nk);
    }

    /// number of flow steps taken (`T`)
    pub fn num_steps(&self) -> usize {
        self.v.len()
    }

    /// number of stored latents (`T + 1`, including `z_0`)
    pub fn num_latents(&self) -> usize {
        self.z.len()
    }

    /// latent state after step `t`, with `latent(0)` the base sample
    pub fn latent(&self, t: usize) -> Option<&Tensor> {
        self.z.get(t)
    }

    /// reflection vector used in step `t`, for `t` in `1..=T`
    pub fn reflection(&self, t: usize) -> Option<&Tensor> {
        if t == 0 {
            None
        } else {
            self.v.get(t - 1)
        }
    }

    pub fn first(&self) -> &Tensor {
        &self.z[0]
    }

    pub fn last(&self) -> &Tensor {
        &self.z[self.z.len() - 1]
    }
}

/// A chain of `T` Householder reflections. The first reflection vector is
/// a learned map of the encoder's last hidden feature; every later one is
/// a learned map of the previous reflection vector.
pub struct HouseholderFlow {
    config: FlowConfig,
    n_seed: usize,
    n_latent: usize,
    v_layers: Vec<Linear>,
}

impl HouseholderFlow {
    /// Will create one affine map per flow step with these variables:
    /// * `nn.flow.v.0` taking the seed feature (`n_seed` wide)
    /// * `nn.flow.v.{t}` for `t >= 1` taking the previous reflection
    ///   vector (`n_latent` wide)
    pub fn new(
        n_seed: usize,
        n_latent: usize,
        config: FlowConfig,
        vs: VarBuilder,
    ) -> Result<Self> {
        let mut v_layers = Vec::with_capacity(config.num_steps());

        if let FlowConfig::Flow(t) = config {
            v_layers.push(xavier_linear(n_seed, n_latent, vs.pp("nn.flow.v.0"))?);
            for i in 1..t {
                let name = format!("nn.flow.v.{}", i);
                v_layers.push(xavier_linear(n_latent, n_latent, vs.pp(name))?);
            }
        }

        Ok(Self {
            config,
            n_seed,
            n_latent,
            v_layers,
        })
    }

    pub fn config(&self) -> FlowConfig {
        self.config
    }

    pub fn dim_seed(&self) -> usize {
        self.n_seed
    }

    pub fn dim_latent(&self) -> usize {
        self.n_latent
    }

    /// Transform the base sample `z_0` through all reflections.
    ///
    /// * `z0_nk` - reparameterized base sample (n x k)
    /// * `h_seed_nl` - encoder's last hidden feature (n x l)
    ///
    /// # Returns `(z_T, trajectory)`
    /// * `z_T` - the flowed latent consumed by the decoder
    /// * `trajectory` - all intermediate `z_t` and `v_t`
    pub fn run(&self, z0_nk: &Tensor, h_seed_nl: &Tensor) -> Result<(Tensor, LatentTrajectory)> {
        let mut trajectory = LatentTrajectory::seeded(z0_nk.clone());

        if self.v_layers.is_empty() {
            return Ok((z0_nk.clone(), trajectory));
        }

        let mut v_nk = self.v_layers[0].forward(h_seed_nl)?;
        let mut z_nk = householder_reflect(&v_nk, z0_nk)?;
        trajectory.push_step(v_nk.clone(), z_nk.clone());

        for v_layer in self.v_layers.iter().skip(1) {
            v_nk = v_layer.forward(&v_nk)?;
            z_nk = householder_reflect(&v_nk, &z_nk)?;
            trajectory.push_step(v_nk.clone(), z_nk.clone());
        }

        Ok((z_nk, trajectory))
    }
}
