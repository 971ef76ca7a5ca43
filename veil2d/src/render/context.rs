use thiserror::Error;
use wgpu::{DeviceDescriptor, Instance, RequestAdapterOptions};

/// Failure to acquire a headless GPU device.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("no compatible GPU adapter: {0}")]
    Adapter(String),
    #[error("device request failed: {0}")]
    Device(String),
}

/// Explicit GPU context handed to every component at construction.
///
/// Owns the device/queue pair for all offscreen work; there is no window
/// surface and no process-wide renderer singleton. `wgpu` resources are
/// internally reference counted, so the context is cheap to clone.
#[derive(Clone)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Acquires a headless adapter and device.
    pub fn new() -> Result<Self, ContextError> {
        let instance = Instance::default();

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| ContextError::Adapter(e.to_string()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("veil2d-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| ContextError::Device(e.to_string()))?;

        Ok(Self { device, queue })
    }
}
