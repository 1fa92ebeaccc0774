//! Activations, dropout and the train/eval switch

use ndarray::{Array2, Zip};
use rand::rngs::StdRng;
use rand::Rng;

/// Forward-pass mode. Dropout only fires in `Train`, drawing from the given RNG.
pub enum Mode<'a> {
    Train(&'a mut StdRng),
    Eval,
}

pub fn relu(x: &Array2<f32>) -> Array2<f32> {
    x.mapv(|v| v.max(0.0))
}

/// Zero the gradient wherever the pre-activation was not positive
pub fn relu_backward(grad: &mut Array2<f32>, pre: &Array2<f32>) {
    Zip::from(grad).and(pre).for_each(|g, &p| {
        if p <= 0.0 {
            *g = 0.0;
        }
    });
}

/// Inverted dropout. Returns the scaled mask so the backward pass can reuse it.
pub fn dropout(x: Array2<f32>, p: f32, mode: &mut Mode<'_>) -> (Array2<f32>, Option<Array2<f32>>) {
    match mode {
        Mode::Train(rng) if p > 0.0 => {
            let keep = 1.0 - p;
            let scale = 1.0 / keep;
            let mask = Array2::from_shape_fn(x.raw_dim(), |_| {
                if rng.gen::<f32>() < keep {
                    scale
                } else {
                    0.0
                }
            });
            (x * &mask, Some(mask))
        }
        _ => (x, None),
    }
}
