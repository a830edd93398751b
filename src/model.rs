// Static mesh loaded from the raw model format
//
// Little-endian layout:
//
//   u32 flags          bit 0 = normal (3 floats), bit 1 = uv (2 floats)
//   u32 vertex_count
//   f32 vertices[vertex_count * (3 + normal + uv)]
//   u32 index_count
//   u32 indices[index_count]

use crate::backend::{Buffer, DeviceContext};
use crate::error::{RenderError, RenderResult};
use ash::vk;
use std::path::Path;
use std::sync::Arc;

const HAS_NORMAL: u32 = 1 << 0;
const HAS_UV: u32 = 1 << 1;

/// Parsed model, still in host memory
#[derive(Debug, Clone, PartialEq)]
pub struct ModelData {
    pub vertices: Vec<u8>,
    pub indices: Vec<u8>,
    pub index_count: u32,
    pub floats_per_vertex: usize,
}

pub fn floats_per_vertex(flags: u32) -> usize {
    let mut count = 3;
    if flags & HAS_NORMAL != 0 {
        count += 3;
    }
    if flags & HAS_UV != 0 {
        count += 2;
    }
    count
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &str) -> RenderResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                RenderError::MalformedModel(format!(
                    "truncated {} at byte {} ({} bytes wanted, {} available)",
                    what,
                    self.pos,
                    len,
                    self.bytes.len() - self.pos
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self, what: &str) -> RenderResult<u32> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4, what)?);
        Ok(u32::from_le_bytes(word))
    }
}

/// Split a raw model file into vertex and index bytes
pub fn parse(bytes: &[u8]) -> RenderResult<ModelData> {
    let mut reader = Reader { bytes, pos: 0 };

    let flags = reader.u32("flags")?;
    let floats_per_vertex = floats_per_vertex(flags);

    let vertex_count = reader.u32("vertex count")? as usize;
    let vertex_len = vertex_count
        .checked_mul(floats_per_vertex * 4)
        .ok_or_else(|| RenderError::MalformedModel(format!("vertex count {vertex_count} overflows")))?;
    let vertices = reader.take(vertex_len, "vertex data")?.to_vec();

    let index_count = reader.u32("index count")?;
    let index_len = (index_count as usize)
        .checked_mul(4)
        .ok_or_else(|| RenderError::MalformedModel(format!("index count {index_count} overflows")))?;
    let indices = reader.take(index_len, "index data")?.to_vec();

    Ok(ModelData {
        vertices,
        indices,
        index_count,
        floats_per_vertex,
    })
}

/// Host-visible vertex and index buffers, immutable after creation
pub struct Model {
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub index_count: u32,
    pub floats_per_vertex: usize,
}

impl Model {
    pub fn from_file(ctx: Arc<DeviceContext>, path: &Path) -> RenderResult<Self> {
        let bytes = std::fs::read(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let data = parse(&bytes)?;
        log::info!(
            "Loaded model {:?}: {} vertices, {} indices",
            path,
            data.vertices.len() / (data.floats_per_vertex * 4),
            data.index_count
        );
        Self::upload(ctx, &data)
    }

    pub fn upload(ctx: Arc<DeviceContext>, data: &ModelData) -> RenderResult<Self> {
        // Zero-sized buffers are invalid in Vulkan
        if data.vertices.is_empty() || data.indices.is_empty() {
            return Err(RenderError::MalformedModel("model has no geometry".into()));
        }

        let vertex_buffer = Buffer::with_data(
            ctx.clone(),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &data.vertices,
        )?;
        let index_buffer =
            Buffer::with_data(ctx, vk::BufferUsageFlags::INDEX_BUFFER, &data.indices)?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: data.index_count,
            floats_per_vertex: data.floats_per_vertex,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(flags: u32, vertices: &[f32], indices: &[u32]) -> Vec<u8> {
        let stride = floats_per_vertex(flags);
        let mut out = Vec::new();
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&((vertices.len() / stride) as u32).to_le_bytes());
        for v in vertices {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&(indices.len() as u32).to_le_bytes());
        for i in indices {
            out.extend_from_slice(&i.to_le_bytes());
        }
        out
    }

    #[test]
    fn position_only_model_sizes() {
        let vertices = [0.0f32; 12];
        let bytes = encode(0, &vertices, &[0, 1, 2, 0, 2, 3]);
        let model = parse(&bytes).unwrap();
        assert_eq!(model.vertices.len(), 48);
        assert_eq!(model.indices.len(), 24);
        assert_eq!(model.index_count, 6);
        assert_eq!(model.floats_per_vertex, 3);
    }

    #[test]
    fn flags_select_vertex_stride() {
        assert_eq!(floats_per_vertex(0), 3);
        assert_eq!(floats_per_vertex(HAS_NORMAL), 6);
        assert_eq!(floats_per_vertex(HAS_UV), 5);
        assert_eq!(floats_per_vertex(HAS_NORMAL | HAS_UV), 8);
    }

    #[test]
    fn normal_and_uv_model_sizes() {
        let vertices = [1.5f32; 3 * 8];
        let bytes = encode(HAS_NORMAL | HAS_UV, &vertices, &[0, 1, 2]);
        let model = parse(&bytes).unwrap();
        assert_eq!(model.vertices.len(), 3 * 8 * 4);
        assert_eq!(model.index_count, 3);
        assert_eq!(&model.vertices[0..4], &1.5f32.to_le_bytes());
    }

    #[test]
    fn indices_keep_their_values() {
        let bytes = encode(HAS_UV, &[0.0; 10], &[1, 0]);
        let model = parse(&bytes).unwrap();
        let indices: Vec<u32> = model
            .indices
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        assert_eq!(indices, vec![1, 0]);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let bytes = encode(0, &[0.0; 12], &[0, 1, 2, 0, 2, 3]);
        for len in [0, 3, 8, 20, bytes.len() - 1] {
            let err = parse(&bytes[..len]).unwrap_err();
            assert!(matches!(err, RenderError::MalformedModel(_)), "len {len}: {err}");
        }
    }

    #[test]
    fn bundled_square_model_parses() {
        let bytes = std::fs::read(concat!(env!("CARGO_MANIFEST_DIR"), "/model/square.raw")).unwrap();
        let model = parse(&bytes).unwrap();
        assert_eq!(model.floats_per_vertex, 5);
        assert_eq!(model.vertices.len(), 4 * 5 * 4);
        assert_eq!(model.index_count, 6);
    }
}
