#![allow(dead_code)]

use candle_core::{Device, Tensor};
use ndarray::Array2;
use rayon::prelude::*;

///
/// Convert rows of an in-memory 2d matrix into one batched `Tensor`.
/// Each row is a feature vector; the number of samples is the number
/// of rows.
///
pub trait RowsToTensor {
    fn to_batched_tensor(&self, device: &Device) -> anyhow::Result<Tensor>;
}

impl RowsToTensor for Array2<f32> {
    fn to_batched_tensor(&self, device: &Device) -> anyhow::Result<Tensor> {
        let mut idx_rows = self
            .axis_iter(ndarray::Axis(0))
            .enumerate()
            .par_bridge()
            .map(|(i, row)| -> anyhow::Result<(usize, Tensor)> {
                let v = Tensor::from_iter(row.iter().copied(), &Device::Cpu)?
                    .reshape((1, row.len()))?;
                Ok((i, v))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        idx_rows.sort_by_key(|(i, _)| *i);
        let rows = idx_rows.into_iter().map(|(_, t)| t).collect::<Vec<_>>();

        Ok(Tensor::cat(&rows, 0)?.to_device(device)?)
    }
}
