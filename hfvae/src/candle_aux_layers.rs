#![allow(dead_code)]

use candle_core::{Result, Tensor};
use candle_nn::{ops, Linear, Module, VarBuilder};

/// `Linear` with Xavier-normal weights, `stdev = sqrt(2 / (fan_in + fan_out))`,
/// and uniform `±1/sqrt(fan_in)` bias. Every affine map in this crate is
/// built through here; the nonzero bias keeps reflection vectors generic
/// even for degenerate (all-zero) inputs.
pub fn xavier_linear(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Linear> {
    let stdev = (2. / (in_dim + out_dim) as f64).sqrt();
    let init_ws = candle_nn::Init::Randn { mean: 0., stdev };
    let ws = vb.get_with_hints((out_dim, in_dim), "weight", init_ws)?;

    let bound = (1. / in_dim as f64).sqrt();
    let init_bs = candle_nn::Init::Uniform {
        lo: -bound,
        up: bound,
    };
    let bs = vb.get_with_hints(out_dim, "bias", init_bs)?;

    Ok(Linear::new(ws, Some(bs)))
}

///////////////////////////////////
// Linear module with a sigmoid  //
// gate on a parallel affine map //
///////////////////////////////////

/// `h = pre(x) ⊙ sigmoid(gate(x))`
///
/// Two independent affine maps over the same input; the gate keeps each
/// coordinate of the pre-activation scaled by a factor in (0, 1).
pub struct GatedLinear {
    in_dim: usize,
    out_dim: usize,
    pre: Linear,
    gate: Linear,
}

impl GatedLinear {
    pub fn dim_in(&self) -> usize {
        self.in_dim
    }

    pub fn dim_out(&self) -> usize {
        self.out_dim
    }

    pub fn pre(&self) -> &Linear {
        &self.pre
    }

    pub fn gate(&self) -> &Linear {
        &self.gate
    }
}

impl Module for GatedLinear {
    fn forward(&self, x_nd: &Tensor) -> Result<Tensor> {
        let pre_nh = self.pre.forward(x_nd)?;
        let gate_nh = ops::sigmoid(&self.gate.forward(x_nd)?)?;
        pre_nh.mul(&gate_nh)
    }
}

/// Will create a gated affine layer with these variables:
/// * `{prefix}.pre.{weight,bias}`
/// * `{prefix}.gate.{weight,bias}`
pub fn gated_linear(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<GatedLinear> {
    let pre = xavier_linear(in_dim, out_dim, vb.pp("pre"))?;
    let gate = xavier_linear(in_dim, out_dim, vb.pp("gate"))?;
    Ok(GatedLinear {
        in_dim,
        out_dim,
        pre,
        gate,
    })
}

/// A stack of chained [`GatedLinear`] layers applied in order.
pub struct GatedStack {
    layers: Vec<GatedLinear>,
}

impl Module for GatedStack {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut x = input.clone();
        for layer in self.layers.iter() {
            x = layer.forward(&x)?;
        }
        Ok(x)
    }
}

impl GatedStack {
    pub fn dim_out(&self) -> Option<usize> {
        self.layers.last().map(|l| l.dim_out())
    }
}

/// Will create a stack of gated layers named `{prefix}.{layer index}`
/// following the widths `in_dim -> dims[0] -> ... -> dims[last]`.
pub fn gated_stack(in_dim: usize, dims: &[usize], vb: VarBuilder) -> Result<GatedStack> {
    let mut layers = Vec::with_capacity(dims.len());
    let mut prev_dim = in_dim;
    for (j, &next_dim) in dims.iter().enumerate() {
        layers.push(gated_linear(prev_dim, next_dim, vb.pp(j))?);
        prev_dim = next_dim;
    }
    Ok(GatedStack { layers })
}
