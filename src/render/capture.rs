//! Screen capture.
//!
//! On request the presented back buffer is blitted into a host-visible
//! linear buffer; the mapped bytes are copied off-GPU on the main thread
//! and handed to a priority-1 worker that encodes the PNG and writes the
//! file. Priority 1 keeps encoding from ever starving the priority-0
//! probe-bake workers.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::{EmberError, Result};
use crate::tasks::TaskCoordinator;

/// Worker priority used for encode jobs.
const CAPTURE_PRIORITY: u8 = 1;

/// Pending capture request, drained by the renderer at present time.
#[derive(Default)]
pub struct ScreenCapture {
    pending: Option<String>,
}

impl ScreenCapture {
    /// Schedules a capture for the next presented frame. An empty name gets
    /// a timestamped default.
    pub fn request(&mut self, filename: Option<String>) {
        let filename = filename.unwrap_or_else(|| {
            let stamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs());
            format!("screenshot_{stamp}")
        });
        self.pending = Some(filename);
    }

    #[must_use]
    pub fn take_pending(&mut self) -> Option<String> {
        self.pending.take()
    }
}

/// Copies `texture` into host memory and queues PNG encoding on a worker.
/// Blocks only for the GPU copy and map, never for the encode.
pub fn capture_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    filename: &str,
    coordinator: &TaskCoordinator,
) -> Result<()> {
    let size = texture.size();
    let width = size.width;
    let height = size.height;

    let bytes_per_pixel = 4u32;
    let unpadded_row = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_row = unpadded_row.div_ceil(align) * align;

    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("ScreenCaptureReadback"),
        size: u64::from(padded_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("ScreenCaptureBlit"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: Some(height),
            },
        },
        size,
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = readback.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    let _ = device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .map_err(|_| EmberError::DeviceLost("capture map callback dropped".into()))?
        .map_err(|e| EmberError::DeviceLost(format!("capture map failed: {e:?}")))?;

    // Unpad into a tight RGBA byte array.
    let mut pixels = Vec::with_capacity((unpadded_row * height) as usize);
    {
        let data = slice.get_mapped_range();
        for row in 0..height {
            let start = (row * padded_row) as usize;
            pixels.extend_from_slice(&data[start..start + unpadded_row as usize]);
        }
    }
    readback.unmap();

    let bgra = matches!(
        texture.format(),
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
    );
    let path = format!("{filename}.png");

    let _ = coordinator.add_task(
        move |_| {
            let mut rgba = pixels.clone();
            if bgra {
                for px in rgba.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
            }
            match image::RgbaImage::from_raw(width, height, rgba) {
                Some(img) => {
                    if let Err(e) = img.save(&path) {
                        log::error!("failed to write screenshot {path}: {e}");
                    } else {
                        log::info!("saved screenshot {path}");
                    }
                }
                None => log::error!("screenshot buffer size mismatch for {path}"),
            }
        },
        None,
        CAPTURE_PRIORITY,
    );

    Ok(())
}
