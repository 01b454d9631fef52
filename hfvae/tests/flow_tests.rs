use approx::assert_abs_diff_eq;
use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{VarBuilder, VarMap};
use hfvae::candle_flow_householder::*;

fn row_tensor(rows: &[Vec<f32>]) -> Result<Tensor> {
    let n = rows.len();
    let k = rows[0].len();
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::from_vec(flat, (n, k), &Device::Cpu)
}

fn row_norms(x_nk: &Tensor) -> Result<Vec<f32>> {
    x_nk.powf(2.)?
        .sum(1)?
        .sqrt()?
        .to_vec1::<f32>()
}

#[test]
fn reflection_preserves_norm() -> Result<()> {
    let v = row_tensor(&[vec![0.3, -1.2, 0.7], vec![2.0, 0.1, -0.5]])?;
    let z = row_tensor(&[vec![1.0, 2.0, -3.0], vec![-0.4, 0.9, 1.6]])?;

    let z_new = householder_reflect(&v, &z)?;

    for (before, after) in row_norms(&z)?.iter().zip(row_norms(&z_new)?.iter()) {
        assert_abs_diff_eq!(*before, *after, epsilon = 1e-4);
    }
    Ok(())
}

#[test]
fn reflection_is_an_involution() -> Result<()> {
    let v = row_tensor(&[vec![-0.8, 0.2, 1.5], vec![0.6, 0.6, -0.1]])?;
    let z = row_tensor(&[vec![0.5, -1.0, 2.5], vec![3.0, 0.0, -0.7]])?;

    let twice = householder_reflect(&v, &householder_reflect(&v, &z)?)?;

    let expect = z.to_vec2::<f32>()?;
    let got = twice.to_vec2::<f32>()?;
    for (row_e, row_g) in expect.iter().zip(got.iter()) {
        for (e, g) in row_e.iter().zip(row_g.iter()) {
            assert_abs_diff_eq!(*e, *g, epsilon = 1e-4);
        }
    }
    Ok(())
}

#[test]
fn zero_norm_reflection_vector_is_fatal() -> Result<()> {
    let v = row_tensor(&[vec![0.0, 0.0, 0.0]])?;
    let z = row_tensor(&[vec![1.0, 2.0, 3.0]])?;

    assert!(householder_reflect(&v, &z).is_err());
    Ok(())
}

#[test]
fn no_flow_is_an_exact_identity() -> Result<()> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);

    let flow = HouseholderFlow::new(7, 3, FlowConfig::from_steps(0), vb)?;
    assert_eq!(flow.config(), FlowConfig::NoFlow);

    let z0 = row_tensor(&[vec![0.1, -0.2, 0.3], vec![1.0, 1.0, 1.0]])?;
    let h = Tensor::zeros((2, 7), DType::F32, &Device::Cpu)?;

    let (zt, trajectory) = flow.run(&z0, &h)?;

    assert_eq!(z0.to_vec2::<f32>()?, zt.to_vec2::<f32>()?);
    assert_eq!(trajectory.num_steps(), 0);
    assert_eq!(trajectory.num_latents(), 1);
    Ok(())
}

#[test]
fn three_step_flow_tracks_trajectory_and_preserves_norm() -> Result<()> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);

    let flow = HouseholderFlow::new(7, 3, FlowConfig::from_steps(3), vb)?;

    let z0 = row_tensor(&[vec![0.4, -1.1, 2.0], vec![-0.3, 0.8, 0.5]])?;
    let h = row_tensor(&[
        vec![0.2, -0.1, 0.9, 0.3, -0.6, 0.5, 0.1],
        vec![1.0, 0.4, -0.2, 0.7, 0.0, -0.9, 0.6],
    ])?;

    let (zt, trajectory) = flow.run(&z0, &h)?;

    assert_eq!(trajectory.num_steps(), 3);
    assert_eq!(trajectory.num_latents(), 4);
    assert_eq!(trajectory.first().to_vec2::<f32>()?, z0.to_vec2::<f32>()?);
    assert_eq!(trajectory.last().to_vec2::<f32>()?, zt.to_vec2::<f32>()?);

    // a composition of reflections is still orthogonal
    for (before, after) in row_norms(&z0)?.iter().zip(row_norms(&zt)?.iter()) {
        assert_abs_diff_eq!(*before, *after, epsilon = 1e-3);
    }

    // each step's reflection vector is recorded alongside its latent
    for t in 1..=3 {
        assert!(trajectory.reflection(t).is_some());
        assert!(trajectory.latent(t).is_some());
    }
    assert!(trajectory.reflection(0).is_none());
    Ok(())
}
