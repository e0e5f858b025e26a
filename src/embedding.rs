//! Embedding vectors and the seam to the vision model.
//!
//! The model itself lives outside this crate. Anything that can turn an
//! image into a fixed-length vector implements [`Embedder`]; closures work
//! too, which keeps tests free of model weights.

use image::DynamicImage;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{PhotoMatchError, Result};

/// Fixed-length image embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cosine similarity with another embedding, see [`cosine_similarity`].
    pub fn cosine(&self, other: &Embedding) -> f64 {
        cosine_similarity(&self.0, &other.0)
    }

    /// Reject empty vectors and non-finite components.
    pub fn check(&self, label: &str) -> Result<()> {
        if self.is_empty() {
            return Err(PhotoMatchError::embedding(label, "embedding is empty"));
        }
        if let Some(pos) = self.0.iter().position(|x| !x.is_finite()) {
            return Err(PhotoMatchError::embedding(
                label,
                format!("component {} is not finite", pos),
            ));
        }
        Ok(())
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Cosine similarity of two vectors, accumulated in f64.
///
/// Bounded to [-1, 1]. A zero-norm vector scores 0.0 against anything.
/// Extra components of the longer vector are ignored.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a > 1e-20 && norm_b > 1e-20 {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    } else {
        0.0
    }
}

/// An image → vector function.
///
/// Implementations are expected to be deterministic and free of side
/// effects. Failures should be reported as `EmbeddingFailure`.
pub trait Embedder: Send + Sync {
    fn embed(&self, image: &DynamicImage) -> Result<Embedding>;
}

impl<F> Embedder for F
where
    F: Fn(&DynamicImage) -> Result<Embedding> + Send + Sync,
{
    fn embed(&self, image: &DynamicImage) -> Result<Embedding> {
        self(image)
    }
}

/// Wraps an expensive-to-create embedder and builds it on first use.
///
/// The handle is created once and reused for every later call. If creation
/// fails the error is returned and the next call tries again.
pub struct LazyEmbedder<E, F> {
    cell: OnceCell<E>,
    init: F,
}

impl<E, F> LazyEmbedder<E, F>
where
    E: Embedder,
    F: Fn() -> Result<E> + Send + Sync,
{
    pub fn new(init: F) -> Self {
        Self {
            cell: OnceCell::new(),
            init,
        }
    }

    /// Whether the underlying embedder has been created.
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<E, F> Embedder for LazyEmbedder<E, F>
where
    E: Embedder,
    F: Fn() -> Result<E> + Send + Sync,
{
    fn embed(&self, image: &DynamicImage) -> Result<Embedding> {
        let inner = self.cell.get_or_try_init(|| {
            log::info!("[Embedder] Initializing model handle");
            (self.init)()
        })?;
        inner.embed(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_cosine_identical() {
        let v = [0.3f32, -1.2, 4.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_opposite_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_magnitude_independent() {
        let a = [1.0f32, 2.0, 3.0];
        let b = [2.0f32, 4.0, 6.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-12);
        let (ea, eb) = (Embedding::from(a.to_vec()), Embedding::from(b.to_vec()));
        assert_eq!(ea.cosine(&eb), cosine_similarity(&a, &b));
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_check_rejects_bad_vectors() {
        assert!(Embedding::new(vec![]).check("x").is_err());
        assert!(Embedding::new(vec![1.0, f32::NAN]).check("x").is_err());
        assert!(Embedding::new(vec![1.0, 2.0]).check("x").is_ok());
    }

    #[test]
    fn test_closure_embedder() {
        let embedder = |image: &DynamicImage| -> Result<Embedding> {
            Ok(Embedding::new(vec![image.width() as f32, 1.0]))
        };
        let image = DynamicImage::new_rgb8(4, 2);
        assert_eq!(embedder.embed(&image).unwrap().as_slice(), &[4.0, 1.0]);
    }

    #[test]
    fn test_lazy_embedder_initializes_once() {
        let inits = Arc::new(AtomicUsize::new(0));
        let counter = inits.clone();
        let lazy = LazyEmbedder::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(|_: &DynamicImage| -> Result<Embedding> { Ok(Embedding::new(vec![1.0])) })
        });
        assert!(!lazy.is_initialized());

        let image = DynamicImage::new_rgb8(1, 1);
        lazy.embed(&image).unwrap();
        lazy.embed(&image).unwrap();

        assert!(lazy.is_initialized());
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }
}
