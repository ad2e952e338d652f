//! Renderer and user settings.

use crate::render::backend::BackendKind;

/// Configuration for GPU/device creation, fixed at engine start.
#[derive(Debug, Clone)]
pub struct RendererSettings {
    /// GPU adapter selection preference.
    pub power_preference: wgpu::PowerPreference,
    /// Enable vertical synchronization.
    pub vsync: bool,
    /// Background clear color for back-ends that only record a clear.
    pub clear_color: wgpu::Color,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            vsync: true,
            clear_color: wgpu::Color {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                a: 1.0,
            },
        }
    }
}

/// Per-session user settings, surfaced in the uniform buffer every frame.
#[derive(Debug, Clone)]
pub struct UserSettings {
    pub renderer: BackendKind,
    pub scene_index: usize,
    pub camera_index: usize,

    pub max_bounces: u32,
    pub bounces: u32,
    pub samples: u32,
    pub temporal_frames: u32,

    pub adaptive_sample: bool,
    pub adaptive_variance: f32,
    pub adaptive_steps: u32,
    pub taa: bool,

    pub show_heatmap: bool,
    pub heatmap_scale: f32,
    pub use_checkerboard: bool,
    pub show_edge: bool,

    pub paper_white_nit: f32,

    pub denoiser: bool,
    pub denoise_sigma: f32,
    pub denoise_sigma_lum: f32,
    pub denoise_sigma_normal: f32,
    pub denoise_size: u32,

    pub bake_with_gpu: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            renderer: BackendKind::PathTracing,
            scene_index: 0,
            camera_index: 0,

            max_bounces: 4,
            bounces: 4,
            samples: 8,
            temporal_frames: 8,

            adaptive_sample: false,
            adaptive_variance: 0.1,
            adaptive_steps: 8,
            taa: true,

            show_heatmap: false,
            heatmap_scale: 1.0,
            use_checkerboard: false,
            show_edge: false,

            paper_white_nit: 600.0,

            denoiser: false,
            denoise_sigma: 1.0,
            denoise_sigma_lum: 4.0,
            denoise_sigma_normal: 0.1,
            denoise_size: 5,

            bake_with_gpu: false,
        }
    }
}

impl UserSettings {
    /// Applies the benchmark-harness command line: `--renderer N`,
    /// `--samples N`, `--temporal N`, `--bounces N` and a bare scene index.
    /// Unknown flags are ignored.
    pub fn apply_cli<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let arg = arg.as_ref();
            let mut next_u32 = || args.next().and_then(|v| v.as_ref().parse::<u32>().ok());
            match arg {
                "--renderer" => {
                    if let Some(v) = next_u32() {
                        self.renderer = BackendKind::from_index(v);
                    }
                }
                "--samples" => {
                    if let Some(v) = next_u32() {
                        self.samples = v;
                    }
                }
                "--temporal" => {
                    if let Some(v) = next_u32() {
                        self.temporal_frames = v.max(1);
                    }
                }
                "--bounces" => {
                    if let Some(v) = next_u32() {
                        self.bounces = v;
                        self.max_bounces = self.max_bounces.max(v);
                    }
                }
                other => {
                    if let Ok(index) = other.parse::<usize>() {
                        self.scene_index = index;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_sets_fields() {
        let mut settings = UserSettings::default();
        settings.apply_cli(["--renderer", "2", "--samples", "16", "--bounces", "6", "3"]);
        assert_eq!(settings.renderer, BackendKind::ModernDeferred);
        assert_eq!(settings.samples, 16);
        assert_eq!(settings.bounces, 6);
        assert_eq!(settings.scene_index, 3);
    }
}
