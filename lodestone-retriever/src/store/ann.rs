//! Approximate nearest-neighbor index for the chunk table.
//!
//! An IVF (inverted file) coarse quantizer partitions the stored vectors
//! around k-means centroids; a small product-quantization codebook encodes
//! each vector as one byte per subspace so candidate ranking never touches
//! the full vectors. The index is only worth building once there is enough
//! data to train it - below [`MIN_INDEX_ROWS`] searches fall back to a full
//! scan.
//!
//! The index is trained for cosine distance over normalized vectors; the
//! query-time distance metric is a separate choice made during exact
//! re-ranking of the candidates this index returns.

/// Minimum number of embedded rows before an index is trained.
pub const MIN_INDEX_ROWS: usize = 256;

const KMEANS_ITERATIONS: usize = 8;
const PQ_CODEBOOK_SIZE: usize = 16;

/// Training shape derived from the table size and embedding dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexParams {
    /// Number of IVF partitions: clamp(round(sqrt(rows)), 4, 100)
    pub partitions: usize,
    /// Number of PQ subspaces: clamp(round(dim / 24), 1, 16)
    pub sub_vectors: usize,
}

impl IndexParams {
    /// Compute parameters for a table, or `None` below the training
    /// threshold.
    pub fn for_table(rows: usize, dimension: usize) -> Option<Self> {
        if rows < MIN_INDEX_ROWS || dimension == 0 {
            return None;
        }
        let partitions = ((rows as f64).sqrt().round() as usize).clamp(4, 100);
        let sub_vectors = ((dimension as f64 / 24.0).round() as usize).clamp(1, 16);
        Some(Self {
            partitions,
            sub_vectors,
        })
    }
}

/// Trained IVF/PQ index over row ids.
pub struct VectorIndex {
    params: IndexParams,
    /// Coarse centroids, one per partition
    centroids: Vec<Vec<f32>>,
    /// Positions (into `ids`/`codes`) per partition
    lists: Vec<Vec<usize>>,
    /// Row ids, aligned with code rows
    ids: Vec<i64>,
    /// PQ codes, `sub_vectors` bytes per row
    codes: Vec<u8>,
    /// Per-subspace codebooks: sub_vectors x codebook_size x sub_dim
    codebooks: Vec<Vec<Vec<f32>>>,
    /// Byte ranges of each subspace within a full vector
    sub_ranges: Vec<std::ops::Range<usize>>,
}

impl VectorIndex {
    /// Train an index over `(id, vector)` rows. All vectors must share one
    /// dimension; training is deterministic for a given input order.
    pub fn build(ids: Vec<i64>, vectors: &[Vec<f32>], params: IndexParams) -> Self {
        debug_assert_eq!(ids.len(), vectors.len());

        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        let sub_ranges = subspace_ranges(dimension, params.sub_vectors);

        // Coarse quantizer
        let centroids = kmeans(vectors, params.partitions, KMEANS_ITERATIONS);
        let mut lists: Vec<Vec<usize>> = vec![Vec::new(); centroids.len()];
        for (position, vector) in vectors.iter().enumerate() {
            lists[nearest(vector, &centroids)].push(position);
        }

        // PQ codebooks per subspace
        let mut codebooks = Vec::with_capacity(sub_ranges.len());
        for range in &sub_ranges {
            let sub_vectors: Vec<Vec<f32>> = vectors
                .iter()
                .map(|v| v[range.clone()].to_vec())
                .collect();
            codebooks.push(kmeans(&sub_vectors, PQ_CODEBOOK_SIZE, KMEANS_ITERATIONS));
        }

        // Encode every row
        let mut codes = Vec::with_capacity(vectors.len() * sub_ranges.len());
        for vector in vectors {
            for (range, codebook) in sub_ranges.iter().zip(&codebooks) {
                codes.push(nearest(&vector[range.clone()], codebook) as u8);
            }
        }

        Self {
            params,
            centroids,
            lists,
            ids,
            codes,
            codebooks,
            sub_ranges,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn params(&self) -> IndexParams {
        self.params
    }

    /// Return up to `limit` candidate row ids, ranked by approximate
    /// distance to the query. Probes the partitions nearest the query and
    /// ranks their members through the PQ lookup tables.
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<i64> {
        if self.ids.is_empty() || limit == 0 {
            return Vec::new();
        }

        // Rank partitions by centroid distance
        let mut partition_order: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, l2_squared(query, c)))
            .collect();
        partition_order.sort_by(|a, b| a.1.total_cmp(&b.1));

        let nprobe = ((self.centroids.len() as f64).sqrt().round() as usize).max(1);

        // Distance lookup table per subspace
        let luts: Vec<Vec<f32>> = self
            .sub_ranges
            .iter()
            .zip(&self.codebooks)
            .map(|(range, codebook)| {
                let sub_query = &query[range.clone()];
                codebook
                    .iter()
                    .map(|entry| l2_squared(sub_query, entry))
                    .collect()
            })
            .collect();

        let sub_count = self.sub_ranges.len();
        let mut candidates: Vec<(i64, f32)> = Vec::new();

        for &(partition, _) in partition_order.iter().take(nprobe) {
            for &position in &self.lists[partition] {
                let code_row = &self.codes[position * sub_count..(position + 1) * sub_count];
                let distance: f32 = code_row
                    .iter()
                    .enumerate()
                    .map(|(sub, &code)| luts[sub][code as usize])
                    .sum();
                candidates.push((self.ids[position], distance));
            }
        }

        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        candidates.truncate(limit);
        candidates.into_iter().map(|(id, _)| id).collect()
    }
}

fn subspace_ranges(dimension: usize, sub_vectors: usize) -> Vec<std::ops::Range<usize>> {
    let sub_vectors = sub_vectors.clamp(1, dimension.max(1));
    let base = dimension / sub_vectors;
    let remainder = dimension % sub_vectors;

    let mut ranges = Vec::with_capacity(sub_vectors);
    let mut start = 0;
    for i in 0..sub_vectors {
        let len = base + usize::from(i < remainder);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn nearest(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let distance = l2_squared(vector, centroid);
        if distance < best_distance {
            best_distance = distance;
            best = i;
        }
    }
    best
}

// Plain Lloyd's iterations with deterministic spread initialization: the
// i-th centroid starts from the (i * n / k)-th input vector. Empty clusters
// keep their previous centroid.
fn kmeans(vectors: &[Vec<f32>], k: usize, iterations: usize) -> Vec<Vec<f32>> {
    let k = k.min(vectors.len()).max(1);
    let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);

    let mut centroids: Vec<Vec<f32>> = (0..k)
        .map(|i| vectors[i * vectors.len() / k].clone())
        .collect();

    for _ in 0..iterations {
        let mut sums = vec![vec![0.0f32; dimension]; k];
        let mut counts = vec![0usize; k];

        for vector in vectors {
            let assignment = nearest(vector, &centroids);
            counts[assignment] += 1;
            for (sum, value) in sums[assignment].iter_mut().zip(vector) {
                *sum += value;
            }
        }

        for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
            if count > 0 {
                *centroid = sum.into_iter().map(|s| s / count as f32).collect();
            }
        }
    }

    centroids
}
