//! Finite difference utilities for gradient verification.
//!
//! Central differences over plain `f64` points, and over the elements of a
//! scalar or tensor [`Value`] so graph gradients can be checked directly.

use std::convert::Infallible;

use ag_tensor::{Dtype, Scalar, Value};

use crate::error::{Error, Result};

/// Compute gradients using central finite differences.
///
/// # Arguments
/// * `f` - Function of a slice of variable values returning a scalar
/// * `point` - The point at which to compute gradients
/// * `eps` - Step size (typically 1e-7 to 1e-5)
///
/// # Example
/// ```
/// use ag_ops::finite_diff_grad;
///
/// // f(x, y) = x^2 + y^2
/// let f = |v: &[f64]| v[0] * v[0] + v[1] * v[1];
/// let grads = finite_diff_grad(f, &[3.0, 4.0], 1e-7);
///
/// assert!((grads[0] - 6.0).abs() < 1e-5);
/// assert!((grads[1] - 8.0).abs() < 1e-5);
/// ```
pub fn finite_diff_grad<F>(f: F, point: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    match central_differences(|v| Ok::<_, Infallible>(f(v)), point, eps) {
        Ok(grads) => grads,
        Err(never) => match never {},
    }
}

/// `(f(x + eps·eᵢ) - f(x - eps·eᵢ)) / 2eps` for every coordinate `i`.
fn central_differences<F, E>(f: F, point: &[f64], eps: f64) -> std::result::Result<Vec<f64>, E>
where
    F: Fn(&[f64]) -> std::result::Result<f64, E>,
{
    let mut shifted = point.to_vec();
    let mut grads = Vec::with_capacity(point.len());
    for (i, &x) in point.iter().enumerate() {
        shifted[i] = x + eps;
        let up = f(&shifted)?;
        shifted[i] = x - eps;
        let down = f(&shifted)?;
        shifted[i] = x;
        grads.push((up - down) / (2.0 * eps));
    }
    Ok(grads)
}

/// Rebuild a value of `like`'s kind, dtype and shape from row-major `data`.
pub fn value_from_f64(like: &Value, data: Vec<f64>) -> Result<Value> {
    match like {
        Value::Scalar(s) => {
            let v = data.first().copied().unwrap_or_default();
            Ok(Value::Scalar(Scalar::from_f64(s.dtype(), v)))
        }
        Value::Tensor(t) => {
            let dims = t.shape().dims().to_vec();
            let v = match t.dtype() {
                Dtype::Float32 => Value::tensor(data.iter().map(|&v| v as f32).collect(), dims)?,
                Dtype::Float64 => Value::tensor(data, dims)?,
                Dtype::Bool => return Err(Error::not_implemented("perturbation", Dtype::Bool)),
            };
            Ok(v)
        }
    }
}

/// Central differences of `f` with respect to every element of `point`.
///
/// The result is row-major, one entry per element.
pub fn finite_diff_value_grad<F>(f: F, point: &Value, eps: f64) -> Result<Vec<f64>>
where
    F: Fn(&Value) -> Result<f64>,
{
    central_differences(|v| f(&value_from_f64(point, v.to_vec())?), &point.to_f64_vec(), eps)
}

/// Maximum absolute difference between two gradient vectors.
///
/// Panics when the lengths differ.
pub fn max_grad_error(expected: &[f64], actual: &[f64]) -> f64 {
    assert_eq!(expected.len(), actual.len(), "gradient lengths differ");
    expected
        .iter()
        .zip(actual)
        .fold(0.0_f64, |worst, (a, b)| worst.max((a - b).abs()))
}
