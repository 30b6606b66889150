//! GPU subsystems: context bootstrap, buffer registry, and the compute
//! and render stages of both the per-frame and the transition pipeline.

pub mod buffers;
pub mod kmeans;
pub mod nca;
pub mod physics;
pub mod render;
pub mod shader;
pub mod splat;
pub mod trail;

use std::sync::Arc;

use winit::window::Window;

use crate::error::GpuError;

/// Device, queue, and surface for the display window.
///
/// Owned by the orchestrator for the process lifetime. A lost device is
/// logged and the process stops submitting work; no recovery is attempted.
pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Bring up adapter, device, queue, and a configured surface.
    pub async fn new(window: Arc<Window>) -> Result<Self, GpuError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            return Err(GpuError::NoComputeSupport);
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        device.set_device_lost_callback(|reason, message| {
            log::error!("GPU device lost ({:?}): {}", reason, message);
        });

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        log::info!(
            "GPU ready: {} ({:?}, {})",
            adapter.get_info().name,
            adapter.get_info().backend,
            if surface_format.is_srgb() { "srgb" } else { "linear" },
        );

        Ok(Self { surface, device, queue, config })
    }

    /// Reconfigure the surface after a window resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }
}

/// Block until a mapped staging buffer is ready, then copy it out.
///
/// The readback idiom used by the NCA alpha extraction and the k-means
/// centroid/label downloads: map_async + poll(Wait) on a buffer that was
/// filled by a copy in an already-submitted encoder.
pub fn read_staging(
    device: &wgpu::Device,
    staging: &wgpu::Buffer,
    out: &mut [u8],
) -> Result<(), GpuError> {
    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(GpuError::BufferMapping(e.to_string())),
        Err(_) => return Err(GpuError::BufferMapping("map callback dropped".into())),
    }
    {
        let data = slice.get_mapped_range();
        out.copy_from_slice(&data[..out.len()]);
    }
    staging.unmap();
    Ok(())
}
