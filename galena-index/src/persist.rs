//! Binary save/load of the index.
//!
//! Format (version 3), little-endian, `size_t` fields at native width:
//!
//! ```text
//! magic           4 bytes  "HNSW"
//! version         u32      3
//! type_tag        size_t   descriptor type hash ^ point size
//! node_size       size_t   in-memory node size, compatibility marker
//! dim             u32
//! m_l             f32
//! m               u32
//! ef_construction u32
//! alpha           f32
//! n               u32
//! n times:        level u32, external_id u32
//! n times:        per layer 0..=level: degree size_t, ids u32...
//! entrance        size size_t, ids u32...
//! ```
//!
//! Points are not serialized; the point store lives outside the index and is
//! re-attached on load through a caller-supplied getter from external id to
//! point.

use crate::graph::{GraphStore, Node, NodeId};
use crate::index::HnswIndex;
use crate::parallel::SearchStats;
use crate::params::HnswParams;
use crate::{IndexError, Result};
use galena_core::Descriptor;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"HNSW";
const VERSION: u32 = 3;

impl<D: Descriptor> HnswIndex<D> {
    /// Tag identifying the descriptor type in saved files. Stable across
    /// runs of the same build; load rejects files written with a different
    /// descriptor.
    fn type_tag() -> usize {
        (fnv1a64(std::any::type_name::<D>().as_bytes()) ^ std::mem::size_of::<D::Point>() as u64)
            as usize
    }

    fn node_size() -> usize {
        std::mem::size_of::<Node<D::Point>>()
    }

    /// Write the index to `path`.
    ///
    /// # Errors
    ///
    /// `Io` on any underlying write failure.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);

        w.write_all(MAGIC)?;
        write_u32(&mut w, VERSION)?;
        write_usize(&mut w, Self::type_tag())?;
        write_usize(&mut w, Self::node_size())?;

        write_u32(&mut w, self.params.dim)?;
        write_f32(&mut w, self.params.m_l)?;
        write_u32(&mut w, self.params.m)?;
        write_u32(&mut w, self.params.ef_construction)?;
        write_f32(&mut w, self.params.alpha)?;
        write_u32(&mut w, self.graph.len() as u32)?;

        for node in self.graph.nodes() {
            write_u32(&mut w, node.level)?;
            write_u32(&mut w, D::id(&node.point))?;
        }
        for node in self.graph.nodes() {
            for layer in 0..=node.level {
                let nbh = node.read_neighbors(layer);
                write_usize(&mut w, nbh.len())?;
                for &v in nbh.iter() {
                    write_u32(&mut w, v)?;
                }
            }
        }

        let entrance = self.graph.entrance();
        write_usize(&mut w, entrance.len())?;
        for &e in entrance {
            write_u32(&mut w, e)?;
        }

        w.flush()?;
        Ok(())
    }

    /// Read an index from `path`, resolving points through `getter`.
    ///
    /// # Errors
    ///
    /// `InvalidFormat` on a wrong magic, an unsupported version, a
    /// descriptor or node-size mismatch, a truncated file, or ids the file
    /// cannot account for; no partial index is returned. `Io` on other read
    /// failures.
    pub fn load<P: AsRef<Path>, F>(path: P, mut getter: F) -> Result<Self>
    where
        F: FnMut(u32) -> Option<D::Point>,
    {
        let file = File::open(path)?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 4];
        read_exact(&mut r, &mut magic)?;
        if &magic != MAGIC {
            return Err(IndexError::InvalidFormat("not an index file".into()));
        }
        let version = read_u32(&mut r)?;
        if version != VERSION {
            return Err(IndexError::InvalidFormat(format!(
                "unsupported version: {version}"
            )));
        }
        let type_tag = read_usize(&mut r)?;
        if type_tag != Self::type_tag() {
            return Err(IndexError::InvalidFormat(
                "descriptor type mismatch".into(),
            ));
        }
        let node_size = read_usize(&mut r)?;
        if node_size != Self::node_size() {
            return Err(IndexError::InvalidFormat("node size mismatch".into()));
        }

        let dim = read_u32(&mut r)?;
        let m_l = read_f32(&mut r)?;
        let m = read_u32(&mut r)?;
        let ef_construction = read_u32(&mut r)?;
        let alpha = read_f32(&mut r)?;
        let n = read_u32(&mut r)?;

        let params = HnswParams {
            dim,
            m,
            m_l,
            ef_construction,
            alpha,
            batch_base: 2.0,
        };
        params
            .validate()
            .map_err(|e| IndexError::InvalidFormat(format!("bad parameter block: {e}")))?;

        let mut records = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let level = read_u32(&mut r)?;
            let external_id = read_u32(&mut r)?;
            records.push((level, external_id));
        }

        let mut adjacency: Vec<Vec<Vec<NodeId>>> = Vec::with_capacity(n as usize);
        for &(level, _) in &records {
            let mut layers = Vec::with_capacity(level as usize + 1);
            for _ in 0..=level {
                let degree = read_usize(&mut r)?;
                if degree > n as usize {
                    return Err(IndexError::InvalidFormat(format!(
                        "degree {degree} exceeds node count {n}"
                    )));
                }
                let mut list = Vec::with_capacity(degree);
                for _ in 0..degree {
                    let v = read_u32(&mut r)?;
                    if v >= n {
                        return Err(IndexError::InvalidFormat(format!(
                            "neighbor id {v} out of range"
                        )));
                    }
                    list.push(v);
                }
                layers.push(list);
            }
            adjacency.push(layers);
        }

        let entrance_len = read_usize(&mut r)?;
        if n > 0 && (entrance_len == 0 || entrance_len > n as usize) {
            return Err(IndexError::InvalidFormat(format!(
                "bad entrance size {entrance_len}"
            )));
        }
        let mut entrance = Vec::with_capacity(entrance_len);
        for _ in 0..entrance_len {
            let e = read_u32(&mut r)?;
            if e >= n {
                return Err(IndexError::InvalidFormat(format!(
                    "entrance id {e} out of range"
                )));
            }
            entrance.push(e);
        }

        let mut nodes = Vec::with_capacity(n as usize);
        for ((level, external_id), layers) in records.into_iter().zip(adjacency) {
            let point = getter(external_id).ok_or_else(|| {
                IndexError::InvalidFormat(format!("no point for external id {external_id}"))
            })?;
            nodes.push(Node::with_neighbors(level, point, layers));
        }

        Ok(Self {
            params,
            graph: GraphStore::from_parts(nodes, entrance),
            stats: SearchStats::new(),
        })
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_f32<W: Write>(w: &mut W, v: f32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_usize<W: Write>(w: &mut W, v: usize) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// A short read means the file was truncated, which is a format error
/// rather than an I/O failure.
fn read_exact<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            IndexError::InvalidFormat("truncated file".into())
        } else {
            IndexError::Io(e)
        }
    })
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R) -> Result<f32> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_usize<R: Read>(r: &mut R) -> Result<usize> {
    let mut buf = [0u8; size_of::<usize>()];
    read_exact(r, &mut buf)?;
    Ok(usize::from_le_bytes(buf))
}
