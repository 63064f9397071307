//! Flat cosine-similarity index over the category vocabulary.
//!
//! Rows are unit-normalized once at construction, so similarity is a
//! matrix-vector product. Search is exact; the vocabulary is small.

use indexmap::IndexMap;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use tracing::{debug, info};

use prodcat_core::{Catalog, Error, Result};

/// Scale `v` to unit L2 norm. Zero vectors are returned unchanged.
pub fn l2_normalize(v: Vec<f32>) -> Vec<f32> {
    let arr = Array1::from(v);
    let norm = arr.dot(&arr).sqrt();
    if norm > 1e-9 {
        (arr / norm).to_vec()
    } else {
        arr.to_vec()
    }
}

pub struct CategoryVectorIndex {
    /// Row i of `matrix` is the vector for `words[i]`.
    words: Vec<String>,
    /// Normalized vectors, shape (N, dim).
    matrix: Array2<f32>,
    dim: usize,
}

impl CategoryVectorIndex {
    /// Build from a word → raw vector mapping, keeping the mapping's order.
    pub fn new(vectors: &IndexMap<String, Vec<f32>>, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::Index("Dimension must be positive".into()));
        }
        if vectors.is_empty() {
            return Err(Error::Index("Cannot build an index from an empty vocabulary".into()));
        }

        let mut matrix = Array2::zeros((vectors.len(), dim));
        let mut words = Vec::with_capacity(vectors.len());
        for (i, (word, raw)) in vectors.iter().enumerate() {
            if raw.len() != dim {
                return Err(Error::Index(format!(
                    "Vector for '{}' has {} dimensions, expected {}",
                    word,
                    raw.len(),
                    dim
                )));
            }
            matrix.row_mut(i).assign(&ArrayView1::from(raw.as_slice()));
            words.push(word.clone());
        }

        for mut row in matrix.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 1e-9 {
                row /= norm;
            }
        }

        info!("CategoryVectorIndex built: {} words, dim={}", words.len(), dim);
        Ok(Self { words, matrix, dim })
    }

    pub fn from_catalog(catalog: &Catalog, dim: usize) -> Result<Self> {
        Self::new(&catalog.category_vectors, dim)
    }

    /// Search with a single query vector.
    pub fn search(&self, query: &[f32], k: usize, threshold: f32) -> Result<Vec<(String, f32)>> {
        let queries = Array2::from_shape_vec((1, query.len()), query.to_vec())
            .map_err(|e| Error::Index(e.to_string()))?;
        Ok(self
            .search_batch(&queries, k, threshold)?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// Search with one query per row. For each query, returns at most `k`
    /// `(word, score)` pairs with score strictly above `threshold`, best first.
    pub fn search_batch(
        &self,
        queries: &Array2<f32>,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<Vec<(String, f32)>>> {
        if k == 0 {
            return Err(Error::Index("k must be positive".into()));
        }
        if queries.ncols() != self.dim {
            return Err(Error::Index(format!(
                "Query has {} dimensions, index has {}",
                queries.ncols(),
                self.dim
            )));
        }

        let mut results = Vec::with_capacity(queries.nrows());
        for query in queries.axis_iter(Axis(0)) {
            let norm = query.dot(&query).sqrt();
            if norm < 1e-9 {
                results.push(Vec::new());
                continue;
            }
            let q = &query / norm;
            let similarities = self.matrix.dot(&q);

            let mut hits: Vec<(usize, f32)> = similarities
                .iter()
                .enumerate()
                .filter(|&(_, &s)| s > threshold)
                .map(|(i, &s)| (i, s))
                .collect();
            // Stable: equal scores keep vocabulary order.
            hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(k);

            results.push(
                hits.into_iter()
                    .map(|(i, s)| (self.words[i].clone(), s))
                    .collect(),
            );
        }

        debug!("Vector search: {} queries, k={}, threshold={}", queries.nrows(), k, threshold);
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> IndexMap<String, Vec<f32>> {
        let mut m = IndexMap::new();
        m.insert("shoe".to_string(), vec![2.0, 0.0, 0.0]);
        m.insert("boot".to_string(), vec![1.0, 1.0, 0.0]);
        m.insert("book".to_string(), vec![0.0, 0.0, 5.0]);
        m
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = CategoryVectorIndex::new(&vocab(), 3).unwrap();
        let hits = index.search(&[1.0, 0.2, 0.0], 3, 0.0).unwrap();
        let words: Vec<&str> = hits.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(words, vec!["shoe", "boot"]);
        assert!(hits[0].1 > hits[1].1);
        assert!(hits[0].1 <= 1.0 + 1e-6);
    }

    #[test]
    fn test_k_truncates() {
        let index = CategoryVectorIndex::new(&vocab(), 3).unwrap();
        let hits = index.search(&[1.0, 0.2, 0.0], 1, 0.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "shoe");
    }

    #[test]
    fn test_threshold_is_strict_and_monotone() {
        let index = CategoryVectorIndex::new(&vocab(), 3).unwrap();
        let query = [1.0, 0.0, 0.0];
        // Exactly 1.0 for "shoe", ~0.707 for "boot".
        assert!(index.search(&query, 3, 1.0).unwrap().is_empty());

        let loose = index.search(&query, 3, 0.1).unwrap();
        let strict = index.search(&query, 3, 0.8).unwrap();
        for hit in &strict {
            assert!(loose.iter().any(|(w, _)| w == &hit.0));
        }
        assert_eq!(loose.len(), 2);
        assert_eq!(strict.len(), 1);
    }

    #[test]
    fn test_unnormalized_query_gives_cosine() {
        let index = CategoryVectorIndex::new(&vocab(), 3).unwrap();
        let hits = index.search(&[0.0, 0.0, 42.0], 1, 0.0).unwrap();
        assert_eq!(hits[0].0, "book");
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_batch_search() {
        let index = CategoryVectorIndex::new(&vocab(), 3).unwrap();
        let queries = ndarray::array![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let res = index.search_batch(&queries, 1, 0.4).unwrap();
        assert_eq!(res.len(), 2);
        assert_eq!(res[0][0].0, "shoe");
        assert_eq!(res[1][0].0, "book");
    }

    #[test]
    fn test_fails_fast() {
        assert!(CategoryVectorIndex::new(&IndexMap::new(), 3).is_err());
        assert!(CategoryVectorIndex::new(&vocab(), 0).is_err());
        assert!(CategoryVectorIndex::new(&vocab(), 4).is_err());

        let index = CategoryVectorIndex::new(&vocab(), 3).unwrap();
        assert!(matches!(index.search(&[1.0, 0.0], 1, 0.0), Err(Error::Index(_))));
        assert!(matches!(index.search(&[1.0, 0.0, 0.0], 0, 0.0), Err(Error::Index(_))));
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
