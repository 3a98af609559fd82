use crate::error::VecError;
use crate::l2::{l2_distance, normalize};

/// Match is the closest stored vector for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Identity paired with the matched vector.
    pub id: String,

    /// Euclidean distance between the normalized query and the stored vector.
    /// Lower values indicate higher similarity.
    pub distance: f32,
}

/// FlatIndex is an exact nearest-neighbour index over unit vectors.
///
/// Vectors live in one dense row-major buffer; `ids[i]` names row `i`.
/// Rows keep insertion order, which is also the tie-break order for
/// equidistant candidates.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
    ids: Vec<String>,
}

impl FlatIndex {
    /// Creates an empty index for vectors of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
            ids: Vec::new(),
        }
    }

    /// Creates an empty index with room for `capacity` rows.
    pub fn with_capacity(dim: usize, capacity: usize) -> Self {
        Self {
            dim,
            data: Vec::with_capacity(dim * capacity),
            ids: Vec::with_capacity(capacity),
        }
    }

    /// Normalizes `vector` and appends it under `id`.
    pub fn insert(&mut self, id: &str, vector: &[f32]) -> Result<(), VecError> {
        if vector.len() != self.dim {
            return Err(VecError::DimensionMismatch {
                got: vector.len(),
                want: self.dim,
            });
        }
        let unit = normalize(vector)?;
        self.data.extend_from_slice(&unit);
        self.ids.push(id.to_string());
        Ok(())
    }

    /// Returns the stored row closest to the normalized `query`, or `None`
    /// when the index is empty.
    ///
    /// The scan is exhaustive. On equal distances the earliest row wins.
    pub fn nearest(&self, query: &[f32]) -> Result<Option<Match>, VecError> {
        if query.len() != self.dim {
            return Err(VecError::DimensionMismatch {
                got: query.len(),
                want: self.dim,
            });
        }
        let q = normalize(query)?;

        let mut best: Option<(usize, f32)> = None;
        for (i, row) in self.data.chunks_exact(self.dim).enumerate() {
            let d = l2_distance(&q, row)?;
            match best {
                Some((_, bd)) if d >= bd => {}
                _ => best = Some((i, d)),
            }
        }

        Ok(best.map(|(i, distance)| Match {
            id: self.ids[i].clone(),
            distance,
        }))
    }

    /// Embedding dimension shared by every row.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identities in row order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// The normalized vector stored at row `i`.
    #[cfg(test)]
    fn row(&self, i: usize) -> Option<&[f32]> {
        if i >= self.ids.len() {
            return None;
        }
        Some(&self.data[i * self.dim..(i + 1) * self.dim])
    }
}
