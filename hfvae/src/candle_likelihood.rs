#![allow(dead_code)]

use crate::candle_loss_functions::{
    log_bernoulli, log_normal_diag, log_normal_standard, log_sum_exp,
};
use crate::candle_vae_model::HouseholderVae;

use candle_core::Tensor;
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;

/// Evaluation configuration in the spirit of a training config: plain
/// data, owned by the caller.
pub struct EvalConfig {
    /// total importance samples per data point (S)
    pub num_samples: usize,
    /// forward-pass batch of replicates; S > this runs several repetitions
    pub microbatch_size: usize,
    /// minibatch size of the ELBO sweep
    pub batch_size: usize,
    pub show_progress: bool,
    pub verbose: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            num_samples: 5000,
            microbatch_size: 500,
            batch_size: 500,
            show_progress: true,
            verbose: false,
        }
    }
}

/// External collaborator that renders per-point negative log-likelihoods;
/// where and how (file path, mode string) is its own contract, opaque here.
pub trait NllVisualizer {
    fn plot_histogram(&self, neg_llik: &[f64]) -> anyhow::Result<()>;
}

/// Monte-Carlo estimators of marginal log-likelihood and ELBO over a
/// trained (read-only) model.
pub struct LikelihoodEstimator<'a> {
    pub model: &'a HouseholderVae,
}

impl<'a> LikelihoodEstimator<'a> {
    pub fn new(model: &'a HouseholderVae) -> Self {
        Self { model }
    }

    /// One microbatch of importance log-weights for a single data point:
    ///
    /// `a_s = log p(x | z_T) + log p(z_T) - log q(z_0 | x)`
    ///
    /// where `z_0` is the fresh reparameterized draw of replicate `s` and
    /// `z_T` its flowed image.
    fn importance_log_weights(
        &self,
        x_single_1d: &Tensor,
        num_replicates: usize,
    ) -> anyhow::Result<Vec<f64>> {
        let dim = x_single_1d.dim(1)?;
        let x_nd = x_single_1d.expand((num_replicates, dim))?;

        let (out, re_n) = self.model.forward_with_llik(&x_nd, &log_bernoulli)?;

        let log_p_n = log_normal_standard(&out.zt_nk)?;
        let log_q_n = log_normal_diag(&out.z0_nk, &out.z_mean_nk, &out.z_lnvar_nk)?;

        // a = RE - KL with KL = -(log p(z_T) - log q(z_0))
        let a_n = ((log_p_n - log_q_n)? + re_n)?;

        Ok(a_n.to_vec1::<f32>()?.into_iter().map(f64::from).collect())
    }

    /// Importance-sampling estimate of the mean negative log-likelihood
    /// over all rows of `x_nd`:
    ///
    /// `log p(x) ≈ logsumexp(a_1 .. a_S) - log S`
    ///
    /// per point, with `R = ceil(S / MB)` forward repetitions when the
    /// sample budget exceeds the microbatch. Per-point values go to the
    /// optional visualizer as a side channel.
    pub fn estimate_log_likelihood(
        &self,
        x_nd: &Tensor,
        config: &EvalConfig,
        visual: Option<&dyn NllVisualizer>,
    ) -> anyhow::Result<f64> {
        let n_test = x_nd.dim(0)?;
        if n_test == 0 {
            anyhow::bail!("empty evaluation set");
        }
        if config.num_samples == 0 || config.microbatch_size == 0 {
            anyhow::bail!(
                "invalid sample budget: S = {}, MB = {}",
                config.num_samples,
                config.microbatch_size
            );
        }

        let (num_rep, mb) = if config.num_samples <= config.microbatch_size {
            (1, config.num_samples)
        } else {
            (
                config.num_samples.div_ceil(config.microbatch_size),
                config.microbatch_size,
            )
        };

        let pb = ProgressBar::new(n_test as u64);
        if !config.show_progress || config.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut neg_llik = Vec::with_capacity(n_test);

        for j in 0..n_test {
            let x_single = x_nd.narrow(0, j, 1)?;

            let mut a = Vec::with_capacity(num_rep * mb);
            for _ in 0..num_rep {
                a.extend(self.importance_log_weights(&x_single, mb)?);
            }

            let log_px = log_sum_exp(&a) - (a.len() as f64).ln();
            neg_llik.push(-log_px);

            pb.inc(1);
            if config.verbose && (j + 1) % 100 == 0 {
                info!("{:.2}% of the evaluation set", (j + 1) as f64 / n_test as f64 * 100.);
            }
        }
        pb.finish_and_clear();

        if let Some(visual) = visual {
            visual.plot_histogram(&neg_llik)?;
        }

        let mean_nll = neg_llik.iter().sum::<f64>() / n_test as f64;

        if config.verbose {
            info!("mean negative log-likelihood: {:.4}", mean_nll);
        }

        Ok(mean_nll)
    }

    /// Analytic (single-sample) negative ELBO averaged over all rows of
    /// `x_nd`, streamed in `batch_size` minibatches. A remainder batch
    /// smaller than `batch_size` is processed too, so every row counts.
    pub fn estimate_elbo(&self, x_nd: &Tensor, config: &EvalConfig) -> anyhow::Result<f64> {
        let n_full = x_nd.dim(0)?;
        if n_full == 0 {
            anyhow::bail!("empty evaluation set");
        }
        let mb = config.batch_size;
        if mb == 0 {
            anyhow::bail!("invalid minibatch size: 0");
        }
        let num_batches = n_full.div_ceil(mb);

        let mut re_all = 0_f64;
        let mut kl_all = 0_f64;
        let mut neg_elbo = 0_f64;

        for b in 0..num_batches {
            let lb = b * mb;
            let len = mb.min(n_full - lb);
            let x_b = x_nd.narrow(0, lb, len)?;

            let (out, re_n) = self.model.forward_with_llik(&x_b, &log_bernoulli)?;

            let log_p_n = log_normal_standard(&out.zt_nk)?;
            let log_q_n = log_normal_diag(&out.z0_nk, &out.z_mean_nk, &out.z_lnvar_nk)?;
            let kl_n = (log_q_n - log_p_n)?;

            let re = f64::from(re_n.sum_all()?.to_scalar::<f32>()?);
            let kl = f64::from(kl_n.sum_all()?.to_scalar::<f32>()?);

            re_all += re;
            kl_all += kl;
            neg_elbo += -re + kl;
        }

        neg_elbo /= n_full as f64;

        if config.verbose {
            info!(
                "RE: {:.4}, KL: {:.4}, negative ELBO: {:.4}",
                re_all / n_full as f64,
                kl_all / n_full as f64,
                neg_elbo
            );
        }

        Ok(neg_elbo)
    }
}
