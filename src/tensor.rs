//! Tensor algebra facade used by the amplitude solver
//!
//! The solver never looks inside an amplitude tensor. Everything it needs is
//! expressed through [`AmplitudeTensor`]: copy (via `Clone`), scaled add,
//! clear, real part of the inner product and the largest element by modulus.
//! Serialization for checkpoints goes through `serde`.
//!
//! [`DenseTensor`] is the in-memory implementation, a row-major `DVector`
//! with an explicit shape. It works for real (`f64`) and complex
//! (`Complex64`) amplitudes alike.

extern crate nalgebra as na;

use crate::error::SolverError;
use na::{ComplexField, DVector};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Largest element of a tensor by modulus, with its multi-index
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtremalElement {
    pub magnitude: f64,
    pub index: Vec<usize>,
}

/// Algebraic primitives the solver relies on
///
/// Scaling coefficients are always real, even for complex tensors: the
/// extrapolation weights come from a real Pulay system.
pub trait AmplitudeTensor: Clone {
    /// Number of stored elements
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set every element to zero, keeping the shape
    fn clear(&mut self);

    /// self *= alpha
    fn scale(&mut self, alpha: f64);

    /// self += alpha * other
    fn scaled_add(&mut self, alpha: f64, other: &Self);

    /// Re⟨self|other⟩, with the left operand conjugated
    fn inner_product_re(&self, other: &Self) -> f64;

    /// Element with the largest modulus
    fn max_abs_element(&self) -> ExtremalElement;

    /// Bytes held by the element storage
    fn size_in_bytes(&self) -> usize;

    /// Overwrite self with the contents of other
    fn copy_from(&mut self, other: &Self) {
        *self = other.clone();
    }

    /// Element of `self - other` with the largest modulus
    fn max_abs_difference(&self, other: &Self) -> ExtremalElement {
        let mut diff = self.clone();
        diff.scaled_add(-1.0, other);
        diff.max_abs_element()
    }
}

/// Dense row-major tensor of arbitrary rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseTensor<T: na::Scalar> {
    shape: Vec<usize>,
    data: DVector<T>,
}

impl<T: ComplexField<RealField = f64>> DenseTensor<T> {
    /// Zero tensor of the given shape
    pub fn zeros(shape: &[usize]) -> Self {
        let len = shape.iter().product();
        DenseTensor {
            shape: shape.to_vec(),
            data: DVector::from_element(len, T::zero()),
        }
    }

    /// Wrap row-major data, checking the element count against the shape
    pub fn from_vec(shape: &[usize], values: Vec<T>) -> Result<Self, SolverError> {
        let len: usize = shape.iter().product();
        if values.len() != len {
            return Err(SolverError::ShapeMismatch {
                expected: shape.to_vec(),
                found: vec![values.len()],
            });
        }
        Ok(DenseTensor {
            shape: shape.to_vec(),
            data: DVector::from_vec(values),
        })
    }

    /// Build a tensor by evaluating `f` at every multi-index
    pub fn from_fn<F: FnMut(&[usize]) -> T>(shape: &[usize], mut f: F) -> Self {
        let len: usize = shape.iter().product();
        let mut index = vec![0; shape.len()];
        let values = (0..len)
            .map(|flat| {
                unravel_into(shape, flat, &mut index);
                f(index.as_slice())
            })
            .collect::<Vec<_>>();
        DenseTensor {
            shape: shape.to_vec(),
            data: DVector::from_vec(values),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }

    /// Element at a multi-index
    pub fn get(&self, index: &[usize]) -> T {
        self.data[self.flat_index(index)].clone()
    }

    pub fn set(&mut self, index: &[usize], value: T) {
        let flat = self.flat_index(index);
        self.data[flat] = value;
    }

    /// Row-major offset of a multi-index
    pub fn flat_index(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.shape.len());
        index
            .iter()
            .zip(self.shape.iter())
            .fold(0, |acc, (&i, &dim)| acc * dim + i)
    }

    /// Multi-index of a row-major offset
    pub fn unravel(&self, flat: usize) -> Vec<usize> {
        let mut index = vec![0; self.shape.len()];
        unravel_into(&self.shape, flat, &mut index);
        index
    }
}

fn unravel_into(shape: &[usize], mut flat: usize, index: &mut [usize]) {
    for (slot, &dim) in index.iter_mut().zip(shape.iter()).rev() {
        *slot = flat % dim;
        flat /= dim;
    }
}

impl<T: ComplexField<RealField = f64>> AmplitudeTensor for DenseTensor<T> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.fill(T::zero());
    }

    fn scale(&mut self, alpha: f64) {
        for x in self.data.iter_mut() {
            *x = x.clone().scale(alpha);
        }
    }

    fn scaled_add(&mut self, alpha: f64, other: &Self) {
        debug_assert_eq!(self.shape, other.shape);
        for (y, x) in self.data.iter_mut().zip(other.data.iter()) {
            *y += x.clone().scale(alpha);
        }
    }

    fn inner_product_re(&self, other: &Self) -> f64 {
        debug_assert_eq!(self.shape, other.shape);
        self.data.dotc(&other.data).real()
    }

    fn max_abs_element(&self) -> ExtremalElement {
        if self.data.is_empty() {
            return ExtremalElement::default();
        }
        let mut best = 0usize;
        let mut magnitude = 0.0f64;
        for (i, x) in self.data.iter().enumerate() {
            let m = x.clone().modulus();
            // NaN compares false, so let it through to trip the divergence check
            if m > magnitude || m.is_nan() {
                best = i;
                magnitude = m;
                if m.is_nan() {
                    break;
                }
            }
        }
        ExtremalElement {
            magnitude,
            index: self.unravel(best),
        }
    }

    fn size_in_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<T>()
    }

    fn copy_from(&mut self, other: &Self) {
        if self.shape == other.shape {
            self.data.copy_from(&other.data);
        } else {
            *self = other.clone();
        }
    }
}

/// Scalars the model problems can be instantiated with
pub trait PhasedScalar: ComplexField<RealField = f64> + Copy + Send + Sync {
    /// `magnitude · e^{i·angle}` for complex scalars; the magnitude alone for real ones
    fn with_phase(magnitude: f64, angle: f64) -> Self;
}

impl PhasedScalar for f64 {
    fn with_phase(magnitude: f64, _angle: f64) -> Self {
        magnitude
    }
}

impl PhasedScalar for Complex64 {
    fn with_phase(magnitude: f64, angle: f64) -> Self {
        Complex64::from_polar(magnitude, angle)
    }
}
