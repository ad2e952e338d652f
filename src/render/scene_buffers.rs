//! Scene-owned GPU buffers.
//!
//! `SceneBuffers::new` concatenates every model's vertex and index arrays
//! into device-local buffers, builds the per-model offset table and sizes
//! the per-frame proxy / indirect-draw buffers for an upper bound of
//! [`MAX_NODES`] entries. Per-frame writes go through the queue on the main
//! thread only.

use bytemuck::{Pod, Zeroable};
use glam::UVec2;
use wgpu::util::DeviceExt;

use crate::errors::{EmberError, Result};
use crate::gi::probe::AmbientCube;
use crate::render::uniforms::{
    IndirectDrawCommand, MAX_NODES, NodeProxy, SHADOWMAP_SIZE, UniformBufferObject,
};
use crate::scene::scene::Scene;

/// Per-model `(first index, first vertex)` offsets into the shared mesh
/// buffers.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MeshOffset {
    pub offsets: UVec2,
}

fn device_buffer<T: Pod>(
    device: &wgpu::Device,
    label: &str,
    usage: wgpu::BufferUsages,
    data: &[T],
) -> wgpu::Buffer {
    // Zero-sized buffers cannot be bound; keep a one-element floor.
    if data.is_empty() {
        return device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<T>().max(16) as u64,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
    }
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(data),
        usage: usage | wgpu::BufferUsages::COPY_DST,
    })
}

/// Device-side scene data: mesh, material and light tables plus the sized
/// per-frame buffers.
pub struct SceneBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    material_buffer: wgpu::Buffer,
    offset_buffer: wgpu::Buffer,
    light_buffer: wgpu::Buffer,

    node_proxy_buffer: wgpu::Buffer,
    indirect_draw_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,

    probe_buffer_near: wgpu::Buffer,
    probe_buffer_far: wgpu::Buffer,
    shadow_map: wgpu::Texture,

    vertex_count: u32,
    index_count: u32,
}

impl SceneBuffers {
    /// Rebuilds the mesh buffers from the scene's retained models. The
    /// ray-tracing flag widens buffer usage so acceleration-structure
    /// builds can read the geometry.
    pub fn new(
        device: &wgpu::Device,
        scene: &Scene,
        ray_tracing_supported: bool,
        near_probe_count: usize,
        far_probe_count: usize,
    ) -> Result<Self> {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut offsets = Vec::with_capacity(scene.models().len());

        for model in scene.models() {
            offsets.push(MeshOffset {
                offsets: UVec2::new(indices.len() as u32, vertices.len() as u32),
            });
            vertices.extend_from_slice(model.vertices());
            indices.extend_from_slice(model.indices());
        }

        let storage = wgpu::BufferUsages::STORAGE;
        let geometry_extra = if ray_tracing_supported {
            wgpu::BufferUsages::BLAS_INPUT
        } else {
            wgpu::BufferUsages::empty()
        };

        let vertex_buffer = device_buffer(
            device,
            "SceneVertices",
            wgpu::BufferUsages::VERTEX | storage | geometry_extra,
            &vertices,
        );
        let index_buffer = device_buffer(
            device,
            "SceneIndices",
            wgpu::BufferUsages::INDEX | storage | geometry_extra,
            &indices,
        );
        let material_buffer = device_buffer(device, "SceneMaterials", storage, scene.materials());
        let offset_buffer = device_buffer(device, "SceneOffsets", storage, &offsets);
        let light_buffer = device_buffer(device, "SceneLights", storage, scene.lights());

        let node_proxy_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SceneNodeProxies"),
            size: (std::mem::size_of::<NodeProxy>() * MAX_NODES) as u64,
            usage: storage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let indirect_draw_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SceneIndirectDraws"),
            size: (std::mem::size_of::<IndirectDrawCommand>() * MAX_NODES) as u64,
            usage: storage | wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FrameUniforms"),
            size: std::mem::size_of::<UniformBufferObject>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let probe_size = std::mem::size_of::<AmbientCube>();
        let probe_buffer_near = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("AmbientCubesNear"),
            size: (probe_size * near_probe_count.max(1)) as u64,
            usage: storage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let probe_buffer_far = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("AmbientCubesFar"),
            size: (probe_size * far_probe_count.max(1)) as u64,
            usage: storage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let shadow_map = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("CpuShadowMap"),
            size: wgpu::Extent3d {
                width: SHADOWMAP_SIZE as u32,
                height: SHADOWMAP_SIZE as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        Ok(Self {
            vertex_buffer,
            index_buffer,
            material_buffer,
            offset_buffer,
            light_buffer,
            node_proxy_buffer,
            indirect_draw_buffer,
            uniform_buffer,
            probe_buffer_near,
            probe_buffer_far,
            shadow_map,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
        })
    }

    /// Writes the flattened proxy and indirect-draw arrays for this frame.
    pub fn upload_nodes(
        &self,
        queue: &wgpu::Queue,
        proxies: &[NodeProxy],
        draws: &[IndirectDrawCommand],
    ) -> Result<()> {
        if proxies.len() > MAX_NODES {
            return Err(EmberError::Capacity {
                context: "node proxy buffer",
                requested: proxies.len(),
                capacity: MAX_NODES,
            });
        }
        if draws.len() > MAX_NODES {
            return Err(EmberError::Capacity {
                context: "indirect draw buffer",
                requested: draws.len(),
                capacity: MAX_NODES,
            });
        }

        if !proxies.is_empty() {
            queue.write_buffer(&self.node_proxy_buffer, 0, bytemuck::cast_slice(proxies));
        }
        if !draws.is_empty() {
            queue.write_buffer(&self.indirect_draw_buffer, 0, bytemuck::cast_slice(draws));
        }
        Ok(())
    }

    /// Writes the per-frame uniform block.
    pub fn upload_uniforms(&self, queue: &wgpu::Queue, ubo: &UniformBufferObject) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(ubo));
    }

    /// Uploads both full ambient-cube arrays to their GPU-visible buffers.
    pub fn upload_probes(&self, queue: &wgpu::Queue, near: &[AmbientCube], far: &[AmbientCube]) {
        if !near.is_empty() {
            queue.write_buffer(&self.probe_buffer_near, 0, bytemuck::cast_slice(near));
        }
        if !far.is_empty() {
            queue.write_buffer(&self.probe_buffer_far, 0, bytemuck::cast_slice(far));
        }
    }

    /// Uploads one finished shadow-map tile into the GPU image.
    pub fn upload_shadow_tile(
        &self,
        queue: &wgpu::Queue,
        origin: (u32, u32),
        tile_size: u32,
        depths: &[f32],
    ) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.shadow_map,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: origin.0,
                    y: origin.1,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(depths),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(tile_size * 4),
                rows_per_image: Some(tile_size),
            },
            wgpu::Extent3d {
                width: tile_size,
                height: tile_size,
                depth_or_array_layers: 1,
            },
        );
    }

    #[must_use]
    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertex_buffer
    }

    #[must_use]
    pub fn index_buffer(&self) -> &wgpu::Buffer {
        &self.index_buffer
    }

    #[must_use]
    pub fn material_buffer(&self) -> &wgpu::Buffer {
        &self.material_buffer
    }

    #[must_use]
    pub fn offset_buffer(&self) -> &wgpu::Buffer {
        &self.offset_buffer
    }

    #[must_use]
    pub fn light_buffer(&self) -> &wgpu::Buffer {
        &self.light_buffer
    }

    #[must_use]
    pub fn node_proxy_buffer(&self) -> &wgpu::Buffer {
        &self.node_proxy_buffer
    }

    #[must_use]
    pub fn indirect_draw_buffer(&self) -> &wgpu::Buffer {
        &self.indirect_draw_buffer
    }

    #[must_use]
    pub fn uniform_buffer(&self) -> &wgpu::Buffer {
        &self.uniform_buffer
    }

    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[must_use]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}
