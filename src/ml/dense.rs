//! Dense network inference loaded from JSON.
//!
//! Output 0 is the trade score, squashed into [0, 1]. An optional output 1
//! is the suggested lot size.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::Predictor;
use crate::error::{BotError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// [out_dim][in_dim]
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    fn out_dim(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let sum = row.iter().zip(x).fold(*b, |acc, (w, v)| acc + w * v);
                self.activation.apply(sum)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    pub input_dim: usize,
    pub layers: Vec<DenseLayer>,
    /// Free-form training metadata
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl DenseNetwork {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let model: Self = serde_json::from_str(&content)?;
        model.validate().map_err(BotError::Validation)?;
        Ok(model)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_dim == 0 {
            return Err("input_dim must be > 0".to_string());
        }
        if self.layers.is_empty() {
            return Err("model has no layers".to_string());
        }

        let mut expected_in = self.input_dim;
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.out_dim() == 0 || layer.bias.len() != layer.out_dim() {
                return Err(format!(
                    "layer[{idx}] has {} rows but {} biases",
                    layer.out_dim(),
                    layer.bias.len()
                ));
            }
            if let Some(r) = layer.weights.iter().position(|row| row.len() != expected_in) {
                return Err(format!(
                    "layer[{idx}] row {r} expects {expected_in} inputs"
                ));
            }
            let finite = layer
                .weights
                .iter()
                .flatten()
                .chain(&layer.bias)
                .all(|v| v.is_finite());
            if !finite {
                return Err(format!("layer[{idx}] contains non-finite parameters"));
            }
            expected_in = layer.out_dim();
        }
        Ok(())
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(|l| l.out_dim()).unwrap_or(0)
    }

    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.input_dim {
            return Err(BotError::Validation(format!(
                "model expects {} features, got {}",
                self.input_dim,
                input.len()
            )));
        }
        Ok(self
            .layers
            .iter()
            .fold(input.to_vec(), |x, layer| layer.forward(&x)))
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

/// `Predictor` backed by a `DenseNetwork`
pub struct DensePredictor {
    network: DenseNetwork,
    fallback_lot_size: f64,
}

impl DensePredictor {
    pub fn new(network: DenseNetwork, fallback_lot_size: f64) -> Self {
        Self {
            network,
            fallback_lot_size,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.network.input_dim
    }
}

impl Predictor for DensePredictor {
    fn predict(&self, features: &[f64]) -> Result<f64> {
        let out = self.network.forward(features)?;
        let raw = out
            .first()
            .copied()
            .ok_or_else(|| BotError::Internal("model produced no output".to_string()))?;
        if (0.0..=1.0).contains(&raw) {
            Ok(raw)
        } else {
            Ok(sigmoid(raw))
        }
    }

    fn predict_lot_size(&self, features: &[f64]) -> Result<f64> {
        let out = self.network.forward(features)?;
        Ok(out.get(1).copied().unwrap_or(self.fallback_lot_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_layer(weights: Vec<f64>, outputs: usize) -> DenseNetwork {
        DenseNetwork {
            input_dim: weights.len(),
            layers: vec![DenseLayer {
                weights: vec![weights; outputs],
                bias: vec![0.0; outputs],
                activation: Activation::Sigmoid,
            }],
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn score_is_sigmoid_of_weighted_sum() {
        let predictor = DensePredictor::new(single_layer(vec![1.0, 2.0], 1), 0.001);
        let neutral = predictor.predict(&[0.0, 0.0]).expect("forward");
        assert!((neutral - 0.5).abs() < 1e-12);
        assert!(predictor.predict(&[1.0, 0.0]).expect("forward") > 0.5);
        assert_eq!(predictor.predict_lot_size(&[1.0, 0.0]).expect("forward"), 0.001);
    }

    #[test]
    fn second_output_is_lot_size() {
        let predictor = DensePredictor::new(single_layer(vec![0.0, 0.0], 2), 0.001);
        let lot = predictor.predict_lot_size(&[3.0, 4.0]).expect("forward");
        assert!((lot - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let mut bad = single_layer(vec![1.0, 2.0], 1);
        bad.input_dim = 3;
        assert!(bad.validate().is_err());

        let net = single_layer(vec![1.0, 2.0], 1);
        assert!(net.forward(&[1.0]).is_err());
    }

    #[test]
    fn parses_json_model() {
        let raw = r#"{
            "input_dim": 2,
            "layers": [
                {"weights": [[0.5, -0.5], [1.0, 1.0]], "bias": [0.0, 0.1], "activation": "relu"},
                {"weights": [[1.0, 1.0]], "bias": [0.0]}
            ]
        }"#;
        let net: DenseNetwork = serde_json::from_str(raw).expect("model parses");
        assert!(net.validate().is_ok());
        assert_eq!(net.output_dim(), 1);
        let out = net.forward(&[1.0, 1.0]).expect("forward");
        assert!((out[0] - 2.1).abs() < 1e-12);
    }
}
