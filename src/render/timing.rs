//! Frame timing: GPU timestamp queries and a CPU wall-clock timer.
//!
//! Both are snapshot once per frame. The GPU side records named marks into
//! a query set; consecutive marks become named durations after resolve.

use std::time::{Duration, Instant};

/// Maximum GPU timestamps recorded per frame.
const MAX_TIMESTAMPS: u32 = 32;

/// CPU frame timer over monotonic clocks.
pub struct CpuTimer {
    start_time: Instant,
    last_update: Instant,
    /// Time since the last tick.
    pub delta: Duration,
    /// Total elapsed time since creation.
    pub elapsed: Duration,
    /// Total number of ticks.
    pub frame_count: u64,
}

impl Default for CpuTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuTimer {
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update: now,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Advances the timer; called once per frame.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_update;
        self.elapsed = now - self.start_time;
        self.last_update = now;
        self.frame_count += 1;
    }

    #[must_use]
    pub fn dt_seconds(&self) -> f64 {
        self.delta.as_secs_f64()
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// GPU timer over timestamp query pools. Inert when the device lacks
/// timestamp support.
pub struct GpuTimer {
    query_set: Option<wgpu::QuerySet>,
    resolve_buffer: Option<wgpu::Buffer>,
    readback_buffer: Option<wgpu::Buffer>,
    period_ns: f32,
    labels: Vec<&'static str>,
    durations: Vec<(&'static str, f32)>,
}

impl GpuTimer {
    #[must_use]
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let supported = device.features().contains(
            wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS,
        );

        let (query_set, resolve_buffer, readback_buffer) = if supported {
            let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("GpuTimerQueries"),
                ty: wgpu::QueryType::Timestamp,
                count: MAX_TIMESTAMPS,
            });
            let size = u64::from(MAX_TIMESTAMPS) * 8;
            let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("GpuTimerResolve"),
                size,
                usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            });
            let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("GpuTimerReadback"),
                size,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            (Some(query_set), Some(resolve_buffer), Some(readback_buffer))
        } else {
            log::info!("timestamp queries unsupported; GPU timer disabled");
            (None, None, None)
        };

        Self {
            query_set,
            resolve_buffer,
            readback_buffer,
            period_ns: queue.get_timestamp_period(),
            labels: Vec::new(),
            durations: Vec::new(),
        }
    }

    /// Starts a new frame of marks.
    pub fn begin_frame(&mut self) {
        self.labels.clear();
    }

    /// Records a named timestamp. The duration reported for a label spans
    /// from its mark to the next one.
    pub fn mark(&mut self, encoder: &mut wgpu::CommandEncoder, label: &'static str) {
        let Some(query_set) = &self.query_set else {
            return;
        };
        let index = self.labels.len() as u32;
        if index >= MAX_TIMESTAMPS {
            return;
        }
        encoder.write_timestamp(query_set, index);
        self.labels.push(label);
    }

    /// Resolves this frame's marks into the readback buffer.
    pub fn resolve(&mut self, encoder: &mut wgpu::CommandEncoder) {
        let (Some(query_set), Some(resolve), Some(readback)) = (
            &self.query_set,
            &self.resolve_buffer,
            &self.readback_buffer,
        ) else {
            return;
        };
        let count = self.labels.len() as u32;
        if count < 2 {
            return;
        }
        encoder.resolve_query_set(query_set, 0..count, resolve, 0);
        encoder.copy_buffer_to_buffer(resolve, 0, readback, 0, u64::from(count) * 8);
    }

    /// Reads back the resolved timestamps; blocks on the device. Call after
    /// submit, once per frame.
    pub fn read(&mut self, device: &wgpu::Device) {
        self.durations.clear();
        let Some(readback) = &self.readback_buffer else {
            return;
        };
        if self.labels.len() < 2 {
            return;
        }

        let slice = readback.slice(..(self.labels.len() * 8) as u64);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);

        if let Ok(Ok(())) = receiver.recv() {
            let data = slice.get_mapped_range();
            let stamps: &[u64] = bytemuck::cast_slice(&data);
            for window in 0..self.labels.len() - 1 {
                let ticks = stamps[window + 1].saturating_sub(stamps[window]);
                let ms = ticks as f32 * self.period_ns / 1_000_000.0;
                self.durations.push((self.labels[window], ms));
            }
            drop(data);
            readback.unmap();
        }
    }

    /// Named durations from the last [`read`](Self::read).
    #[must_use]
    pub fn durations(&self) -> &[(&'static str, f32)] {
        &self.durations
    }
}
