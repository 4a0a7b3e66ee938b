//! Nested tensor containers for trajectory storage.
//!
//! Trajectory slices are stored as a recursive keyed container: a leaf is a
//! flat array with a shape, a node is an ordered mapping of named children.
//! String keys always address substructure; numeric indices recurse through
//! every leaf and address the leading axis. All leaf writes are in-place
//! copies into the existing allocation - the backing storage of a slice is
//! shared with downstream consumers and must never be reallocated while a
//! slice is checked out.

use thiserror::Error;

/// Fatal container errors.
///
/// These indicate programmer errors (wrong structure or shape written into
/// a slice) and are propagated immediately rather than retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TensorError {
    /// Write targeted a key the receiving container does not have.
    #[error("key `{0}` not present in target container")]
    MissingKey(String),

    /// Write tried to put a node where a leaf lives, or vice versa.
    #[error("structure mismatch at key `{key}`: cannot write a {src} into a {dst}")]
    StructureMismatch {
        key: String,
        src: &'static str,
        dst: &'static str,
    },

    /// Element counts do not line up for an in-place copy.
    #[error("shape mismatch: writing {src} elements into a region of {dst}")]
    ShapeMismatch { src: usize, dst: usize },

    /// Leading-axis index past the end of the tensor.
    #[error("index {index} out of bounds for leading axis of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Memory residency of a tensor.
///
/// The arena itself is host-backed; the tag exists so that action tensors
/// can be routed according to the environment's declared capabilities and
/// the routing stays observable in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// Host (CPU) memory.
    Host,
    /// Accelerator memory.
    Device,
}

/// Element storage backends.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I32(Vec<i32>),
}

impl TensorData {
    fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::I32(v) => v.len(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            TensorData::F32(_) => "f32",
            TensorData::I32(_) => "i32",
        }
    }
}

/// A leaf array: shape, element storage and residency tag.
///
/// Indexing addresses the leading axis. Writes convert between the f32 and
/// i32 backends transparently, mirroring how foreign numeric arrays are
/// accepted into native trajectory storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
    device: Device,
}

impl Tensor {
    /// Zero-filled f32 tensor on the host.
    pub fn zeros(shape: &[usize]) -> Self {
        let n: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: TensorData::F32(vec![0.0; n]),
            device: Device::Host,
        }
    }

    /// Zero-filled i32 tensor on the host.
    pub fn zeros_i32(shape: &[usize]) -> Self {
        let n: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: TensorData::I32(vec![0; n]),
            device: Device::Host,
        }
    }

    /// f32 tensor from existing data. Panics in debug builds if the element
    /// count does not match the shape; construction sites are static.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self {
            shape: shape.to_vec(),
            data: TensorData::F32(data),
            device: Device::Host,
        }
    }

    /// i32 tensor from existing data.
    pub fn from_vec_i32(shape: &[usize], data: Vec<i32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self {
            shape: shape.to_vec(),
            data: TensorData::I32(data),
            device: Device::Host,
        }
    }

    /// i32 tensor with every element set to `value`.
    pub fn full_i32(shape: &[usize], value: i32) -> Self {
        let n: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: TensorData::I32(vec![value; n]),
            device: Device::Host,
        }
    }

    /// f32 tensor of 0.0/1.0 flags from booleans.
    pub fn from_bools(flags: &[bool]) -> Self {
        Self::from_vec(
            &[flags.len()],
            flags.iter().map(|&d| if d { 1.0 } else { 0.0 }).collect(),
        )
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Retag the tensor's residency. With host-backed storage this is a
    /// metadata move; the arena never actually leaves host memory.
    pub fn to_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Borrow elements as f32 (None for the i32 backend).
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            TensorData::I32(_) => None,
        }
    }

    /// Mutably borrow elements as f32 (None for the i32 backend).
    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        match &mut self.data {
            TensorData::F32(v) => Some(v),
            TensorData::I32(_) => None,
        }
    }

    /// Borrow elements as i32 (None for the f32 backend).
    pub fn as_i32(&self) -> Option<&[i32]> {
        match &self.data {
            TensorData::I32(v) => Some(v),
            TensorData::F32(_) => None,
        }
    }

    /// Mutably borrow elements as i32 (None for the f32 backend).
    pub fn as_i32_mut(&mut self) -> Option<&mut [i32]> {
        match &mut self.data {
            TensorData::I32(v) => Some(v),
            TensorData::F32(_) => None,
        }
    }

    /// Elements as f32, converting if necessary.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match &self.data {
            TensorData::F32(v) => v.clone(),
            TensorData::I32(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }

    /// Elements as i32, converting (truncating) if necessary.
    pub fn to_i32_vec(&self) -> Vec<i32> {
        match &self.data {
            TensorData::I32(v) => v.clone(),
            TensorData::F32(v) => v.iter().map(|&x| x as i32).collect(),
        }
    }

    /// Convert to the i32 backend, keeping shape and residency.
    pub fn to_i32(self) -> Self {
        let data = TensorData::I32(self.to_i32_vec());
        Self { data, ..self }
    }

    /// Backend name, for error reporting.
    pub fn dtype(&self) -> &'static str {
        self.data.kind()
    }

    /// Number of elements in one leading-axis row (1 for a scalar).
    pub fn row_len(&self) -> usize {
        self.shape.get(1..).map_or(1, |s| s.iter().product())
    }

    /// Owned copy of the sub-tensor at `index` along the leading axis.
    pub fn index(&self, index: usize) -> Result<Tensor, TensorError> {
        let rows = self.shape.first().copied().unwrap_or(0);
        if index >= rows {
            return Err(TensorError::IndexOutOfBounds { index, len: rows });
        }
        let stride = self.row_len();
        let (start, end) = (index * stride, (index + 1) * stride);
        let data = match &self.data {
            TensorData::F32(v) => TensorData::F32(v[start..end].to_vec()),
            TensorData::I32(v) => TensorData::I32(v[start..end].to_vec()),
        };
        Ok(Tensor {
            shape: self.shape[1..].to_vec(),
            data,
            device: self.device,
        })
    }

    /// In-place copy of `src` into the leading-axis row at `index`,
    /// converting between backends as needed. Never reallocates.
    pub fn copy_from_at(&mut self, index: usize, src: &Tensor) -> Result<(), TensorError> {
        let rows = self.shape.first().copied().unwrap_or(0);
        if index >= rows {
            return Err(TensorError::IndexOutOfBounds { index, len: rows });
        }
        let stride = self.row_len();
        if src.len() != stride {
            return Err(TensorError::ShapeMismatch {
                src: src.len(),
                dst: stride,
            });
        }
        let start = index * stride;
        match (&mut self.data, &src.data) {
            (TensorData::F32(dst), TensorData::F32(s)) => dst[start..start + stride].copy_from_slice(s),
            (TensorData::I32(dst), TensorData::I32(s)) => dst[start..start + stride].copy_from_slice(s),
            (TensorData::F32(dst), TensorData::I32(s)) => {
                for (d, &x) in dst[start..start + stride].iter_mut().zip(s) {
                    *d = x as f32;
                }
            }
            (TensorData::I32(dst), TensorData::F32(s)) => {
                for (d, &x) in dst[start..start + stride].iter_mut().zip(s) {
                    *d = x as i32;
                }
            }
        }
        Ok(())
    }

    /// Zero every element in place.
    pub fn zero_(&mut self) {
        match &mut self.data {
            TensorData::F32(v) => v.iter_mut().for_each(|x| *x = 0.0),
            TensorData::I32(v) => v.iter_mut().for_each(|x| *x = 0),
        }
    }
}

/// A child of a [`TensorDict`]: either a leaf array or a nested container.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorTree {
    Leaf(Tensor),
    Node(TensorDict),
}

impl TensorTree {
    fn kind(&self) -> &'static str {
        match self {
            TensorTree::Leaf(_) => "leaf",
            TensorTree::Node(_) => "node",
        }
    }
}

/// Ordered mapping from string keys to tensors or nested containers.
///
/// String-keyed access always means "get/set substructure"; numeric indices
/// go through [`TensorDict::recursive_get`] and
/// [`TensorDict::recursive_set`], which apply the same leading-axis index to
/// every leaf while preserving the nested shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TensorDict {
    entries: Vec<(String, TensorTree)>,
}

impl TensorDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a child.
    pub fn insert(&mut self, key: impl Into<String>, value: TensorTree) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Insert or replace a leaf child.
    pub fn insert_leaf(&mut self, key: impl Into<String>, tensor: Tensor) {
        self.insert(key, TensorTree::Leaf(tensor));
    }

    /// Insert or replace a nested child.
    pub fn insert_node(&mut self, key: impl Into<String>, dict: TensorDict) {
        self.insert(key, TensorTree::Node(dict));
    }

    pub fn get(&self, key: &str) -> Option<&TensorTree> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut TensorTree> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// The leaf at `key`, if that child exists and is a leaf.
    pub fn leaf(&self, key: &str) -> Option<&Tensor> {
        match self.get(key) {
            Some(TensorTree::Leaf(t)) => Some(t),
            _ => None,
        }
    }

    /// The nested container at `key`, if that child exists and is a node.
    pub fn node(&self, key: &str) -> Option<&TensorDict> {
        match self.get(key) {
            Some(TensorTree::Node(d)) => Some(d),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TensorTree)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply a leading-axis index to every leaf, returning a new container
    /// with the same keys and nesting.
    pub fn recursive_get(&self, index: usize) -> Result<TensorDict, TensorError> {
        let mut out = TensorDict::new();
        for (key, value) in &self.entries {
            let child = match value {
                TensorTree::Leaf(t) => TensorTree::Leaf(t.index(index)?),
                TensorTree::Node(d) => TensorTree::Node(d.recursive_get(index)?),
            };
            out.insert(key.clone(), child);
        }
        Ok(out)
    }

    /// Broadcast-write `value` into this container at a leading-axis index.
    ///
    /// Recurses key-by-key: every key of `value` must already exist here,
    /// with matching structure (leaf vs node). Leaves are written in place
    /// with backend conversion. Keys of `self` absent from `value` are left
    /// untouched.
    pub fn recursive_set(&mut self, index: usize, value: &TensorDict) -> Result<(), TensorError> {
        for (key, new_value) in &value.entries {
            let target = self
                .get_mut(key)
                .ok_or_else(|| TensorError::MissingKey(key.clone()))?;
            match (target, new_value) {
                (TensorTree::Leaf(dst), TensorTree::Leaf(src)) => dst.copy_from_at(index, src)?,
                (TensorTree::Node(dst), TensorTree::Node(src)) => dst.recursive_set(index, src)?,
                (dst, src) => {
                    return Err(TensorError::StructureMismatch {
                        key: key.clone(),
                        src: src.kind(),
                        dst: dst.kind(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Zero every leaf in place.
    pub fn zero_(&mut self) {
        for (_, value) in &mut self.entries {
            match value {
                TensorTree::Leaf(t) => t.zero_(),
                TensorTree::Node(d) => d.zero_(),
            }
        }
    }

    /// Flat list of (dotted path, leaf) pairs in container order.
    pub fn leaves(&self) -> Vec<(String, &Tensor)> {
        let mut out = Vec::new();
        self.collect_leaves("", &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Tensor)>) {
        for (key, value) in &self.entries {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            match value {
                TensorTree::Leaf(t) => out.push((path, t)),
                TensorTree::Node(d) => d.collect_leaves(&path, out),
            }
        }
    }
}
