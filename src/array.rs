//! Lazy selections over a chunked array and their materialization
//!
//! An `ArrayView` records which elements of the stored `[time, lat, lon]` array
//! a task needs and which dimensions are dropped (point selection) or averaged.
//! Nothing is read until `materialize` fetches every chunk the selection
//! intersects and reduces it into a `ConcreteArray`.

use futures::stream::{self, StreamExt};
use std::ops::Range;

use crate::constants::ELEMENT_SIZE_BYTES;
use crate::error::{BenchError, Result};
use crate::store::{ArrayMeta, ChunkStore, DIM_NAMES};

pub const TIME: usize = 0;
pub const LAT: usize = 1;
pub const LON: usize = 2;

/// What happens to a dimension in the result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimMode {
    /// Dimension is kept
    Keep,
    /// Single index selected, dimension dropped
    Squeeze,
    /// Dimension averaged away
    Mean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimSelection {
    pub start: usize,
    pub len: usize,
    pub mode: DimMode,
}

impl DimSelection {
    fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// Chunk geometry reported with every execution
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkGeometry {
    /// Chunks touched along each retained result dimension
    pub chunk_counts: Vec<usize>,
    /// Byte size of the selection's result
    pub view_nbytes: u64,
    /// Byte size of the unselected variable
    pub source_nbytes: u64,
    /// Chunk count of the unselected variable
    pub source_chunks: usize,
}

impl ChunkGeometry {
    /// Product of per-dimension chunk counts (1 for a scalar result)
    pub fn num_chunks(&self) -> usize {
        self.chunk_counts.iter().product()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayView {
    shape: [usize; 3],
    chunks: [usize; 3],
    dims: [DimSelection; 3],
}

impl ArrayView {
    /// Unselected view over the whole variable
    pub fn full(meta: &ArrayMeta) -> Self {
        let dim = |d: usize| DimSelection { start: 0, len: meta.shape[d], mode: DimMode::Keep };
        Self {
            shape: meta.shape,
            chunks: meta.chunks,
            dims: [dim(0), dim(1), dim(2)],
        }
    }

    pub fn dims(&self) -> &[DimSelection; 3] {
        &self.dims
    }

    /// Restrict dimension `d` to absolute indices `start..start + len`
    pub fn slice(mut self, d: usize, start: usize, len: usize) -> Self {
        let start = start.min(self.shape[d]);
        let len = len.min(self.shape[d] - start);
        self.dims[d].start = start;
        self.dims[d].len = len;
        self
    }

    /// Select a single index on `d` and drop the dimension
    pub fn point(mut self, d: usize, idx: usize) -> Result<Self> {
        if idx >= self.shape[d] {
            return Err(BenchError::Selection(format!("{} index {} out of bounds", DIM_NAMES[d], idx)));
        }
        self.dims[d] = DimSelection { start: idx, len: 1, mode: DimMode::Squeeze };
        Ok(self)
    }

    /// Keep only the first element of the current selection on `d`, dropping the dimension
    pub fn first(mut self, d: usize) -> Result<Self> {
        if self.dims[d].len == 0 {
            return Err(BenchError::Selection(format!("no {} values in selection", DIM_NAMES[d])));
        }
        self.dims[d].len = 1;
        self.dims[d].mode = DimMode::Squeeze;
        Ok(self)
    }

    /// Average over `d`; already-dropped dimensions are left alone
    pub fn mean(mut self, d: usize) -> Self {
        if self.dims[d].mode == DimMode::Keep {
            self.dims[d].mode = DimMode::Mean;
        }
        self
    }

    /// Shape of the materialized result
    pub fn shape(&self) -> Vec<usize> {
        self.dims
            .iter()
            .filter(|s| s.mode == DimMode::Keep)
            .map(|s| s.len)
            .collect()
    }

    pub fn nbytes(&self) -> u64 {
        self.shape().iter().product::<usize>() as u64 * ELEMENT_SIZE_BYTES as u64
    }

    /// True when no element is selected on some dimension
    pub fn is_empty(&self) -> bool {
        self.dims.iter().any(|s| s.len == 0)
    }

    /// Chunk index range intersected along `d` (partial overlap counts)
    fn chunk_range(&self, d: usize) -> Range<usize> {
        let sel = self.dims[d];
        if sel.len == 0 {
            return 0..0;
        }
        let chunk = self.chunks[d];
        sel.start / chunk..(sel.start + sel.len - 1) / chunk + 1
    }

    /// Chunks touched along each retained result dimension
    pub fn chunk_counts(&self) -> Vec<usize> {
        (0..3)
            .filter(|&d| self.dims[d].mode == DimMode::Keep)
            .map(|d| self.chunk_range(d).len())
            .collect()
    }

    /// Every stored chunk the selection intersects, over all three dimensions
    pub fn touched_chunks(&self) -> Vec<[usize; 3]> {
        let [rt, ry, rx] = [self.chunk_range(0), self.chunk_range(1), self.chunk_range(2)];
        let mut out = Vec::with_capacity(rt.len() * ry.len() * rx.len());
        for t in rt {
            for y in ry.clone() {
                for x in rx.clone() {
                    out.push([t, y, x]);
                }
            }
        }
        out
    }

    pub fn geometry(&self) -> ChunkGeometry {
        let source_chunks = (0..3).map(|d| self.shape[d].div_ceil(self.chunks[d])).product();
        ChunkGeometry {
            chunk_counts: self.chunk_counts(),
            view_nbytes: self.nbytes(),
            source_nbytes: self.shape.iter().product::<usize>() as u64 * ELEMENT_SIZE_BYTES as u64,
            source_chunks,
        }
    }
}

/// Fully realized result of a selection
#[derive(Debug, Clone, PartialEq)]
pub struct ConcreteArray {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ConcreteArray {
    pub fn nbytes(&self) -> u64 {
        (self.data.len() * ELEMENT_SIZE_BYTES) as u64
    }
}

/// Fetch every intersected chunk and reduce it into the view's result.
///
/// Up to `fetch_concurrency` chunk reads are in flight at once; values are
/// accumulated in f64 and averaged over the `Mean` dimensions.
pub async fn materialize(store: &dyn ChunkStore, view: &ArrayView, fetch_concurrency: usize) -> Result<ConcreteArray> {
    let meta = store.meta();
    if meta.shape != view.shape || meta.chunks != view.chunks {
        return Err(BenchError::Selection(format!(
            "view geometry {:?}/{:?} does not match store {:?}/{:?}",
            view.shape, view.chunks, meta.shape, meta.chunks
        )));
    }

    let shape = view.shape();
    let out_len: usize = shape.iter().product();

    // Output strides over retained dims; dropped/averaged dims contribute 0
    let mut strides = [0usize; 3];
    let mut acc = 1;
    for d in (0..3).rev() {
        if view.dims[d].mode == DimMode::Keep {
            strides[d] = acc;
            acc *= view.dims[d].len;
        }
    }
    let reduced: usize = view
        .dims
        .iter()
        .filter(|s| s.mode == DimMode::Mean)
        .map(|s| s.len)
        .product();

    let mut sums = vec![0f64; out_len];
    if !view.is_empty() {
        let mut fetches = stream::iter(view.touched_chunks())
            .map(|idx| async move { store.read_chunk(idx).await.map(|data| (idx, data)) })
            .buffer_unordered(fetch_concurrency.max(1));

        while let Some(fetched) = fetches.next().await {
            let (idx, data) = fetched?;
            accumulate(meta, view, idx, &data, &strides, &mut sums)?;
        }
    }

    let data = match reduced {
        0 => vec![f32::NAN; out_len],
        1 => sums.into_iter().map(|s| s as f32).collect(),
        n => sums.into_iter().map(|s| (s / n as f64) as f32).collect(),
    };
    Ok(ConcreteArray { shape, data })
}

fn accumulate(
    meta: &ArrayMeta,
    view: &ArrayView,
    idx: [usize; 3],
    data: &[f32],
    strides: &[usize; 3],
    sums: &mut [f64],
) -> Result<()> {
    let ext = meta.chunk_extent(idx);
    let expected: usize = ext.iter().map(|r| r.len()).product();
    if data.len() != expected {
        return Err(BenchError::Selection(format!(
            "chunk {:?} has {} values, expected {}",
            idx,
            data.len(),
            expected
        )));
    }

    let sel = [view.dims[0].range(), view.dims[1].range(), view.dims[2].range()];
    let overlap = |d: usize| ext[d].start.max(sel[d].start)..ext[d].end.min(sel[d].end);
    let (ey, ex) = (ext[1].len(), ext[2].len());

    for t in overlap(0) {
        let chunk_t = (t - ext[0].start) * ey;
        let out_t = (t - sel[0].start) * strides[0];
        for y in overlap(1) {
            let row = (chunk_t + y - ext[1].start) * ex;
            let out_y = out_t + (y - sel[1].start) * strides[1];
            for x in overlap(2) {
                sums[out_y + (x - sel[2].start) * strides[2]] += data[row + x - ext[2].start] as f64;
            }
        }
    }
    Ok(())
}
