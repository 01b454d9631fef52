pub mod candle_aux_layers;
pub mod candle_data_util;
pub mod candle_decoder_gated;
pub mod candle_encoder_gated;
pub mod candle_flow_householder;
pub mod candle_likelihood;
pub mod candle_loss_functions;
pub mod candle_model_traits;
pub mod candle_vae_model;

pub use candle_core;
pub use candle_nn;
