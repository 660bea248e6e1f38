//! Synthetic vector generation and batch partitioning

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::VectorEncoding;

/// Flat, row-major vector storage
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    /// 32-bit float elements
    Float32(Vec<f32>),
    /// Unsigned byte elements
    Uint8(Vec<u8>),
}

impl VectorData {
    /// Number of scalar elements
    pub fn element_count(&self) -> usize {
        match self {
            VectorData::Float32(values) => values.len(),
            VectorData::Uint8(values) => values.len(),
        }
    }

    /// Encoding of the elements
    pub fn encoding(&self) -> VectorEncoding {
        match self {
            VectorData::Float32(_) => VectorEncoding::Float32,
            VectorData::Uint8(_) => VectorEncoding::Uint8,
        }
    }
}

/// Borrowed view of one vector, serialised as a plain JSON number array
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VectorRow<'a> {
    /// Float elements
    Float32(&'a [f32]),
    /// Byte elements
    Uint8(&'a [u8]),
}

impl VectorRow<'_> {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            VectorRow::Float32(values) => values.len(),
            VectorRow::Uint8(values) => values.len(),
        }
    }

    /// Whether the row has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One upload batch: consecutive ids starting at `first_id`
#[derive(Debug, Clone, PartialEq)]
pub struct VectorBatch {
    /// Position of this batch in the load phase
    pub index: usize,
    /// Id of the first vector
    pub first_id: u64,
    /// Vector dimensionality
    pub dimension: usize,
    /// Row-major elements, `len() * dimension` of them
    pub data: VectorData,
}

impl VectorBatch {
    /// Number of vectors in the batch
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.element_count() / self.dimension
        }
    }

    /// Whether the batch holds no vectors
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the vectors in order
    pub fn ids(&self) -> std::ops::Range<u64> {
        self.first_id..self.first_id + self.len() as u64
    }

    /// The `i`-th vector
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn row(&self, i: usize) -> VectorRow<'_> {
        let range = i * self.dimension..(i + 1) * self.dimension;
        match &self.data {
            VectorData::Float32(values) => VectorRow::Float32(&values[range]),
            VectorData::Uint8(values) => VectorRow::Uint8(&values[range]),
        }
    }

    /// Iterate over `(id, vector)` pairs
    pub fn points(&self) -> impl Iterator<Item = (u64, VectorRow<'_>)> + '_ {
        self.ids().zip((0..self.len()).map(move |i| self.row(i)))
    }
}

/// A single query vector
#[derive(Debug, Clone, PartialEq)]
pub struct QueryVector {
    /// Elements
    pub data: VectorData,
}

impl QueryVector {
    /// Borrowed view for serialisation
    pub fn row(&self) -> VectorRow<'_> {
        match &self.data {
            VectorData::Float32(values) => VectorRow::Float32(values),
            VectorData::Uint8(values) => VectorRow::Uint8(values),
        }
    }
}

/// Random vector source
///
/// Floats are uniform in `[0, 1)`, bytes uniform over `0..=255`.
pub struct VectorGenerator {
    rng: StdRng,
    dimension: usize,
    encoding: VectorEncoding,
}

impl VectorGenerator {
    /// Create a generator; a seed makes the output reproducible
    pub fn new(dimension: usize, encoding: VectorEncoding, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            dimension,
            encoding,
        }
    }

    fn elements(&mut self, count: usize) -> VectorData {
        match self.encoding {
            VectorEncoding::Float32 => {
                VectorData::Float32((0..count).map(|_| self.rng.gen::<f32>()).collect())
            }
            VectorEncoding::Uint8 => {
                VectorData::Uint8((0..count).map(|_| self.rng.gen::<u8>()).collect())
            }
        }
    }

    /// Generate `count` vectors with ids starting at `first_id`
    pub fn batch(&mut self, index: usize, first_id: u64, count: usize) -> VectorBatch {
        VectorBatch {
            index,
            first_id,
            dimension: self.dimension,
            data: self.elements(count * self.dimension),
        }
    }

    /// Generate one query vector
    pub fn query_vector(&mut self) -> QueryVector {
        QueryVector {
            data: self.elements(self.dimension),
        }
    }
}

impl std::fmt::Debug for VectorGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorGenerator")
            .field("dimension", &self.dimension)
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// One slot of a [`BatchPlan`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSlot {
    /// Batch position
    pub index: usize,
    /// Offset of the first item
    pub start: usize,
    /// Items in this batch
    pub count: usize,
}

/// Partition of `total` items into batches of `batch_size`
///
/// Every batch is full except possibly the last.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    total: usize,
    batch_size: usize,
    next: usize,
}

impl BatchPlan {
    /// Create a plan; a zero `batch_size` yields no batches
    pub fn new(total: usize, batch_size: usize) -> Self {
        Self {
            total,
            batch_size,
            next: 0,
        }
    }

    /// Number of batches the plan yields
    pub fn batch_count(&self) -> usize {
        if self.batch_size == 0 {
            0
        } else {
            self.total.div_ceil(self.batch_size)
        }
    }
}

impl Iterator for BatchPlan {
    type Item = BatchSlot;

    fn next(&mut self) -> Option<Self::Item> {
        if self.batch_size == 0 || self.next >= self.batch_count() {
            return None;
        }
        let index = self.next;
        let start = index * self.batch_size;
        let count = self.batch_size.min(self.total - start);
        self.next += 1;
        Some(BatchSlot {
            index,
            start,
            count,
        })
    }
}
