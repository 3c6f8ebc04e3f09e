//! Per-genome LSTM controller weights and the deterministic single-step
//! forward pass.

use ndarray::{s, Array1, Array2, ArrayView1};
use rand::Rng;

/// Controller tensor shapes, fixed for the lifetime of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Architecture {
    /// Width of the full controller input (base sensory vector plus
    /// history window)
    pub n_inputs: usize,
    /// Hidden units per layer
    pub hidden: usize,
    /// Stacked LSTM layers
    pub layers: usize,
    /// Action logits produced by the readout
    pub n_actions: usize,
}

/// One stacked LSTM layer. Gate rows are ordered input, forget, cell,
/// output.
#[derive(Debug, Clone)]
pub struct LstmLayer {
    /// `[4 * hidden, input]`
    pub w_ih: Array2<f32>,
    /// `[4 * hidden, hidden]`
    pub w_hh: Array2<f32>,
    /// `[4 * hidden]`
    pub bias: Array1<f32>,
}

/// The heritable weight set of one genome: stacked LSTM layers plus a
/// linear readout producing action logits.
#[derive(Debug, Clone)]
pub struct ControllerWeights {
    pub arch: Architecture,
    pub layers: Vec<LstmLayer>,
    /// `[n_actions, hidden]`
    pub w_out: Array2<f32>,
    /// `[n_actions]`
    pub b_out: Array1<f32>,
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax.
fn softmax(mut logits: Array1<f32>) -> Array1<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    logits.mapv_inplace(|v| (v - max).exp());
    let sum = logits.sum();
    if sum > 0.0 {
        logits.mapv_inplace(|v| v / sum);
    } else {
        logits.fill(1.0 / logits.len() as f32);
    }
    logits
}

impl ControllerWeights {
    /// Fresh random weights, uniform within ±1/sqrt(hidden).
    pub fn random<R: Rng>(rng: &mut R, arch: Architecture) -> Self {
        let span = 1.0 / (arch.hidden as f32).sqrt();
        let mut layers = Vec::with_capacity(arch.layers);
        for layer in 0..arch.layers {
            let input = if layer == 0 { arch.n_inputs } else { arch.hidden };
            layers.push(LstmLayer {
                w_ih: Array2::from_shape_fn((4 * arch.hidden, input), |_| {
                    rng.gen_range(-span..span)
                }),
                w_hh: Array2::from_shape_fn((4 * arch.hidden, arch.hidden), |_| {
                    rng.gen_range(-span..span)
                }),
                bias: Array1::zeros(4 * arch.hidden),
            });
        }
        Self {
            arch,
            layers,
            w_out: Array2::from_shape_fn((arch.n_actions, arch.hidden), |_| {
                rng.gen_range(-span..span)
            }),
            b_out: Array1::zeros(arch.n_actions),
        }
    }

    /// One deterministic forward step for a single agent.
    ///
    /// `hidden` and `cell` are that agent's `[layers, hidden]` recurrent
    /// matrices; both are updated in place. Returns the action probability
    /// distribution.
    pub fn step(&self, input: ArrayView1<f32>, hidden: &mut Array2<f32>, cell: &mut Array2<f32>) -> Array1<f32> {
        let h = self.arch.hidden;
        let mut x = input.to_owned();
        for (layer_idx, layer) in self.layers.iter().enumerate() {
            let h_prev = hidden.row(layer_idx).to_owned();
            let c_prev = cell.row(layer_idx).to_owned();

            let gates = layer.w_ih.dot(&x) + layer.w_hh.dot(&h_prev) + &layer.bias;
            let i_gate = gates.slice(s![0..h]).mapv(sigmoid);
            let f_gate = gates.slice(s![h..2 * h]).mapv(sigmoid);
            let g_gate = gates.slice(s![2 * h..3 * h]).mapv(f32::tanh);
            let o_gate = gates.slice(s![3 * h..4 * h]).mapv(sigmoid);

            let c_new = &f_gate * &c_prev + &i_gate * &g_gate;
            let h_new = &o_gate * &c_new.mapv(f32::tanh);

            hidden.row_mut(layer_idx).assign(&h_new);
            cell.row_mut(layer_idx).assign(&c_new);
            x = h_new;
        }
        softmax(self.w_out.dot(&x) + &self.b_out)
    }

    /// Derive a perturbed copy: each weight independently mutates with
    /// probability `rate`, shifted by at most `strength` and clamped to
    /// ±`limit`. The parent is never modified.
    pub fn mutated<R: Rng>(&self, rng: &mut R, rate: f32, strength: f32, limit: f32) -> Self {
        let mut perturb = |w: f32| {
            if rng.gen::<f32>() < rate {
                (w + rng.gen_range(-strength..=strength)).clamp(-limit, limit)
            } else {
                w
            }
        };
        let layers = self
            .layers
            .iter()
            .map(|layer| LstmLayer {
                w_ih: layer.w_ih.mapv(&mut perturb),
                w_hh: layer.w_hh.mapv(&mut perturb),
                bias: layer.bias.mapv(&mut perturb),
            })
            .collect();
        Self {
            arch: self.arch,
            layers,
            w_out: self.w_out.mapv(&mut perturb),
            b_out: self.b_out.mapv(&mut perturb),
        }
    }

    /// Total number of weights and biases.
    pub fn parameter_count(&self) -> usize {
        let lstm: usize = self
            .layers
            .iter()
            .map(|l| l.w_ih.len() + l.w_hh.len() + l.bias.len())
            .sum();
        lstm + self.w_out.len() + self.b_out.len()
    }

    /// Check all tensors are finite.
    pub fn is_valid(&self) -> bool {
        self.layers.iter().all(|l| {
            l.w_ih.iter().all(|w| w.is_finite())
                && l.w_hh.iter().all(|w| w.is_finite())
                && l.bias.iter().all(|b| b.is_finite())
        }) && self.w_out.iter().all(|w| w.is_finite())
            && self.b_out.iter().all(|b| b.is_finite())
    }

    /// Hash of sampled weight bits, used as a cheap genome identity for
    /// diversity summaries.
    pub fn fingerprint(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.arch.n_inputs.hash(&mut hasher);
        self.arch.hidden.hash(&mut hasher);
        self.arch.layers.hash(&mut hasher);
        for layer in &self.layers {
            for (i, w) in layer.w_ih.iter().enumerate() {
                if i % 10 == 0 {
                    w.to_bits().hash(&mut hasher);
                }
            }
            for (i, w) in layer.w_hh.iter().enumerate() {
                if i % 10 == 0 {
                    w.to_bits().hash(&mut hasher);
                }
            }
        }
        for w in self.w_out.iter() {
            w.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn arch() -> Architecture {
        Architecture {
            n_inputs: 12,
            hidden: 8,
            layers: 2,
            n_actions: 5,
        }
    }

    #[test]
    fn test_step_produces_distribution() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let weights = ControllerWeights::random(&mut rng, arch());
        let mut hidden = Array2::zeros((2, 8));
        let mut cell = Array2::zeros((2, 8));
        let input = Array1::from_elem(12, 0.5);

        let probs = weights.step(input.view(), &mut hidden, &mut cell);

        assert_eq!(probs.len(), 5);
        assert!((probs.sum() - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
        // The recurrent state moved away from zero.
        assert!(hidden.iter().any(|&v| v.abs() > 0.0));
    }

    #[test]
    fn test_step_is_deterministic() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let weights = ControllerWeights::random(&mut rng, arch());
        let input = Array1::from_elem(12, 0.3);

        let mut h1 = Array2::zeros((2, 8));
        let mut c1 = Array2::zeros((2, 8));
        let mut h2 = Array2::zeros((2, 8));
        let mut c2 = Array2::zeros((2, 8));

        let p1 = weights.step(input.view(), &mut h1, &mut c1);
        let p2 = weights.step(input.view(), &mut h2, &mut c2);

        assert_eq!(p1, p2);
        assert_eq!(h1, h2);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_mutation_is_pure_and_bounded() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let parent = ControllerWeights::random(&mut rng, arch());
        let before = parent.layers[0].w_ih.clone();

        let mut child = parent.mutated(&mut rng, 1.0, 10.0, 5.0);
        for _ in 0..20 {
            child = child.mutated(&mut rng, 1.0, 10.0, 5.0);
        }

        // Parent untouched.
        assert_eq!(parent.layers[0].w_ih, before);
        // Every descendant weight stays inside the clamp.
        assert!(child.layers.iter().all(|l| {
            l.w_ih.iter().all(|w| w.abs() <= 5.0) && l.w_hh.iter().all(|w| w.abs() <= 5.0)
        }));
        assert!(child.is_valid());
    }

    #[test]
    fn test_zero_rate_mutation_is_identity() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let parent = ControllerWeights::random(&mut rng, arch());
        let child = parent.mutated(&mut rng, 0.0, 1.0, 5.0);
        assert_eq!(parent.layers[0].w_ih, child.layers[0].w_ih);
        assert_eq!(parent.w_out, child.w_out);
    }

    #[test]
    fn test_parameter_count() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let weights = ControllerWeights::random(&mut rng, arch());
        // Layer 0: 4*8*12 + 4*8*8 + 32; layer 1: 4*8*8 + 4*8*8 + 32;
        // readout: 5*8 + 5.
        assert_eq!(weights.parameter_count(), 384 + 256 + 32 + 256 + 256 + 32 + 40 + 5);
    }
}
