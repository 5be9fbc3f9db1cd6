//! Random tensor construction.

use rand::Rng;
use rand::distr::StandardUniform;
use rand_distr::StandardNormal;

use crate::scalar::Scalar;
use crate::tensor::Tensor;

/// Trait for types that can be randomly sampled from a uniform distribution.
pub trait RandomUniform: Scalar {
    /// Sample a random value from the uniform distribution [0, 1).
    fn sample_uniform<R: Rng>(rng: &mut R) -> Self;
}

impl RandomUniform for f32 {
    fn sample_uniform<R: Rng>(rng: &mut R) -> Self {
        rng.sample(StandardUniform)
    }
}

impl RandomUniform for f64 {
    fn sample_uniform<R: Rng>(rng: &mut R) -> Self {
        rng.sample(StandardUniform)
    }
}

/// Trait for types that can be randomly sampled from a normal distribution.
pub trait RandomNormal: Scalar {
    /// Sample a random value from the standard normal distribution.
    fn sample_normal<R: Rng>(rng: &mut R) -> Self;
}

impl RandomNormal for f32 {
    fn sample_normal<R: Rng>(rng: &mut R) -> Self {
        rng.sample(StandardNormal)
    }
}

impl RandomNormal for f64 {
    fn sample_normal<R: Rng>(rng: &mut R) -> Self {
        rng.sample(StandardNormal)
    }
}

impl<T: RandomUniform> Tensor<T> {
    /// Create a tensor with uniform random values in [0, 1).
    ///
    /// # Example
    ///
    /// ```
    /// use adtensors::Tensor;
    ///
    /// let t: Tensor<f64> = Tensor::random(&[2, 3]);
    /// assert_eq!(t.shape(), &[2, 3]);
    /// for i in 0..t.len() {
    ///     let v = *t.get_linear(i).unwrap();
    ///     assert!((0.0..1.0).contains(&v));
    /// }
    /// ```
    pub fn random(shape: &[usize]) -> Self {
        Self::random_with_rng(shape, &mut rand::rng())
    }

    /// Create a tensor with uniform random values using a specific RNG.
    ///
    /// Useful for reproducible results with a seeded RNG.
    pub fn random_with_rng<R: Rng>(shape: &[usize], rng: &mut R) -> Self {
        let mut t = Self::zeros(shape);
        for x in t.data_mut() {
            *x = T::sample_uniform(rng);
        }
        t
    }
}

impl<T: RandomNormal> Tensor<T> {
    /// Create a tensor with standard normal random values.
    pub fn randn(shape: &[usize]) -> Self {
        Self::randn_with_rng(shape, &mut rand::rng())
    }

    /// Create a tensor with standard normal random values using a specific RNG.
    pub fn randn_with_rng<R: Rng>(shape: &[usize], rng: &mut R) -> Self {
        let mut t = Self::zeros(shape);
        for x in t.data_mut() {
            *x = T::sample_normal(rng);
        }
        t
    }
}
