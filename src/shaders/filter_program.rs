// SPDX-License-Identifier: GPL-3.0-only

//! GPU filter program
//!
//! One compiled render pipeline per [`ProgramKind`]. The kind is fixed at
//! build time; kernel, color bias and source size can be changed in place and
//! are uploaded on the next [`FilterProgram::draw`].

use super::effects::{
    IDENTITY_MATRIX, KERNEL_SIZE, Kernel, ProgramKind, TexMatrix, texel_offsets,
};
use super::gpu_processor::CachedDimensions;
use crate::errors::{PipelineResult, SetupError};
use crate::gpu::{self, wgpu};
use std::sync::Arc;
use tracing::{debug, info};

/// WGSL source for every filter variant
pub const FILTER_SHADER: &str = include_str!("filter.wgsl");

/// Uniform block matching `FilterUniforms` in `filter.wgsl`
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FilterUniforms {
    tex_matrix: [f32; 16],
    kernel: [[f32; 4]; 3],
    tex_offsets: [[f32; 4]; KERNEL_SIZE],
    video_size: [f32; 2],
    color_bias: f32,
    circle_mask: f32,
}

impl FilterUniforms {
    fn new(
        tex_matrix: &TexMatrix,
        kernel: &Kernel,
        offsets: &[[f32; 2]; KERNEL_SIZE],
        video_size: CachedDimensions,
        color_bias: f32,
        circle_mask: bool,
    ) -> Self {
        let mut packed_kernel = [[0.0; 4]; 3];
        for (i, k) in kernel.iter().enumerate() {
            packed_kernel[i / 4][i % 4] = *k;
        }
        Self {
            tex_matrix: *tex_matrix,
            kernel: packed_kernel,
            tex_offsets: offsets.map(|[x, y]| [x, y, 0.0, 0.0]),
            video_size: [video_size.width as f32, video_size.height as f32],
            color_bias,
            circle_mask: if circle_mask { 1.0 } else { 0.0 },
        }
    }
}

/// Destination rectangle of a draw, in target pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Largest centered square inside a `width` x `height` target
    pub fn centered_square(width: u32, height: u32) -> Self {
        let (x, y, side) = super::effects::centered_viewport(width, height);
        Self {
            x,
            y,
            width: side,
            height: side,
        }
    }
}

/// Compiled filter variant and its mutable parameters
pub struct FilterProgram {
    kind: ProgramKind,
    kernel: Kernel,
    color_bias: f32,
    texture_size: CachedDimensions,
    tex_offsets: [[f32; 2]; KERNEL_SIZE],
    circle_mask: bool,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
}

impl FilterProgram {
    /// Compile and link the variant for `kind`, rendering into `target_format`
    ///
    /// Compile or link failures are returned as `PipelineError::Setup`.
    pub fn build(
        device: &Arc<wgpu::Device>,
        queue: &Arc<wgpu::Queue>,
        kind: ProgramKind,
        target_format: wgpu::TextureFormat,
    ) -> PipelineResult<Self> {
        info!(program = kind.label(), format = ?target_format, "Building filter program");

        let (pipeline, bind_group_layout) = gpu::with_validation(device, || {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("shadercam filter shader"),
                source: wgpu::ShaderSource::Wgsl(FILTER_SHADER.into()),
            });

            let bind_group_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("shadercam filter bind group layout"),
                    entries: &[
                        // Source texture
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        // Sampler
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                        // Uniforms
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: wgpu::BufferSize::new(
                                    std::mem::size_of::<FilterUniforms>() as u64,
                                ),
                            },
                            count: None,
                        },
                    ],
                });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("shadercam filter pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(kind.label()),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(kind.fragment_entry()),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                multiview: None,
                cache: None,
            });

            (pipeline, bind_group_layout)
        })
        .map_err(|message| SetupError::ShaderCompile {
            program: kind.label().to_string(),
            message,
        })?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadercam filter sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shadercam filter uniforms"),
            size: std::mem::size_of::<FilterUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut identity = [0.0; KERNEL_SIZE];
        identity[KERNEL_SIZE / 2] = 1.0;

        Ok(Self {
            kind,
            kernel: identity,
            color_bias: 0.0,
            texture_size: CachedDimensions::default(),
            tex_offsets: [[0.0; 2]; KERNEL_SIZE],
            circle_mask: false,
            device: Arc::clone(device),
            queue: Arc::clone(queue),
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
        })
    }

    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    pub fn kernel(&self) -> (Kernel, f32) {
        (self.kernel, self.color_bias)
    }

    pub fn texture_size(&self) -> CachedDimensions {
        self.texture_size
    }

    /// Replace kernel and color bias; ignored for non-convolution variants
    pub fn set_kernel(&mut self, kernel: Kernel, color_bias: f32) {
        if self.kind != ProgramKind::Convolution {
            debug!(program = self.kind.label(), "Ignoring kernel for non-convolution program");
            return;
        }
        self.kernel = kernel;
        self.color_bias = color_bias;
    }

    /// Record the source texture size and recompute texel offsets from it
    pub fn set_texture_size(&mut self, width: u32, height: u32) {
        if !self.texture_size.needs_update(width, height) {
            return;
        }
        self.texture_size.update(width, height);
        self.tex_offsets = texel_offsets(width, height);
        debug!(program = self.kind.label(), width, height, "Texel offsets updated");
    }

    pub fn set_circle_mask(&mut self, enabled: bool) {
        self.circle_mask = enabled;
    }

    /// Draw a full-target quad sampling `source` into `target`
    ///
    /// The render pass begins and ends inside this call. Uniforms are staged
    /// with `queue.write_buffer`, so a program draws at most once per
    /// submission.
    pub fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
        tex_matrix: &TexMatrix,
        target: &wgpu::TextureView,
        viewport: Viewport,
    ) {
        let uniforms = FilterUniforms::new(
            tex_matrix,
            &self.kernel,
            &self.tex_offsets,
            self.texture_size,
            self.color_bias,
            self.circle_mask,
        );
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadercam filter bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(self.kind.label()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_viewport(
            viewport.x as f32,
            viewport.y as f32,
            viewport.width as f32,
            viewport.height as f32,
            0.0,
            1.0,
        );
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..6, 0..1);
    }

    /// Draw with the identity texture transform
    pub fn draw_identity(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
        target: &wgpu::TextureView,
        viewport: Viewport,
    ) {
        self.draw(encoder, source, &IDENTITY_MATRIX, target, viewport);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout_matches_wgsl() {
        assert_eq!(std::mem::size_of::<FilterUniforms>(), 272);
        assert_eq!(std::mem::offset_of!(FilterUniforms, kernel), 64);
        assert_eq!(std::mem::offset_of!(FilterUniforms, tex_offsets), 112);
        assert_eq!(std::mem::offset_of!(FilterUniforms, video_size), 256);
        assert_eq!(std::mem::offset_of!(FilterUniforms, color_bias), 264);
    }

    #[test]
    fn test_kernel_packing() {
        let kernel = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let u = FilterUniforms::new(
            &IDENTITY_MATRIX,
            &kernel,
            &texel_offsets(4, 2),
            CachedDimensions::new(4, 2),
            0.5,
            true,
        );
        assert_eq!(u.kernel[0], [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(u.kernel[2], [9.0, 0.0, 0.0, 0.0]);
        assert_eq!(u.tex_offsets[2], [0.25, -0.5, 0.0, 0.0]);
        assert_eq!(u.circle_mask, 1.0);
    }

    #[test]
    fn test_centered_square_viewport() {
        assert_eq!(
            Viewport::centered_square(800, 600),
            Viewport {
                x: 100,
                y: 0,
                width: 600,
                height: 600
            }
        );
    }

    /// Validate a WGSL shader using naga
    fn validate_shader(name: &str, source: &str) {
        match naga::front::wgsl::parse_str(source) {
            Ok(module) => {
                let info = naga::valid::Validator::new(
                    naga::valid::ValidationFlags::all(),
                    naga::valid::Capabilities::all(),
                )
                .validate(&module);

                if let Err(e) = info {
                    panic!("Shader '{}' validation failed: {:?}", name, e);
                }
            }
            Err(e) => {
                panic!("Shader '{}' parse failed: {}", name, e.emit_to_string(source));
            }
        }
    }

    #[test]
    fn test_filter_shader_validates() {
        validate_shader("filter", FILTER_SHADER);
    }

    #[test]
    fn test_every_variant_has_an_entry_point() {
        let module = naga::front::wgsl::parse_str(FILTER_SHADER).expect("WGSL parse failed");
        for kind in [
            ProgramKind::Passthrough,
            ProgramKind::Grayscale,
            ProgramKind::Convolution,
            ProgramKind::Blit,
        ] {
            assert!(
                module
                    .entry_points
                    .iter()
                    .any(|ep| ep.name == kind.fragment_entry()),
                "missing {}",
                kind.fragment_entry()
            );
        }
    }
}
