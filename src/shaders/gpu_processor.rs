// SPDX-License-Identifier: GPL-3.0-only

//! Shared GPU readback infrastructure
//!
//! - Dimension caching so textures/buffers are only reallocated on change
//! - Row padding helpers for texture -> buffer copies
//! - Async buffer readback (map, poll, read, unmap)
//!
//! Used by the headless surface (display snapshots) and the encoder's
//! readback of the codec input texture.

use crate::gpu::wgpu;

/// Cached resource dimensions - avoids reallocation when dimensions match
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub struct CachedDimensions {
    pub width: u32,
    pub height: u32,
}

impl CachedDimensions {
    /// Create new cached dimensions
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Check if dimensions have changed and need update
    pub fn needs_update(&self, width: u32, height: u32) -> bool {
        self.width != width || self.height != height
    }

    /// Update cached dimensions
    pub fn update(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Check if dimensions are initialized (non-zero)
    pub fn is_initialized(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Bytes per row of an RGBA8 texture copy, rounded up to
/// `COPY_BYTES_PER_ROW_ALIGNMENT`
#[inline]
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Strip row padding from a mapped RGBA8 readback
pub fn unpad_rows(padded: &[u8], width: u32, height: u32, padded_row: u32) -> Vec<u8> {
    let row = (width * 4) as usize;
    let padded_row = padded_row as usize;
    if row == padded_row {
        return padded[..row * height as usize].to_vec();
    }
    let mut out = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * padded_row;
        out.extend_from_slice(&padded[start..start + row]);
    }
    out
}

/// Staging buffer sized for an RGBA8 texture readback
pub fn create_readback_buffer(device: &wgpu::Device, width: u32, height: u32, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: padded_bytes_per_row(width) as u64 * height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Record a copy of a whole RGBA8 texture into a readback buffer
pub fn copy_texture_to_buffer(
    encoder: &mut wgpu::CommandEncoder,
    texture: &wgpu::Texture,
    buffer: &wgpu::Buffer,
    width: u32,
    height: u32,
) {
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row(width)),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

/// Helper for async buffer readback (map, poll, read, unmap)
///
/// # Arguments
/// * `device` - The wgpu device for polling
/// * `buffer` - The buffer to read from (must be MAP_READ)
///
/// # Returns
/// The buffer contents as a Vec<u8>
pub async fn read_buffer_async(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
) -> Result<Vec<u8>, String> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();

    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    let _ = device.poll(wgpu::PollType::wait_indefinitely());

    receiver
        .await
        .map_err(|_| "Failed to receive buffer mapping".to_string())?
        .map_err(|e| format!("Failed to map buffer: {:?}", e))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_dimensions() {
        let mut dims = CachedDimensions::default();
        assert!(!dims.is_initialized());
        assert!(dims.needs_update(640, 480));

        dims.update(640, 480);
        assert!(dims.is_initialized());
        assert!(!dims.needs_update(640, 480));
        assert!(dims.needs_update(1280, 720));
    }

    #[test]
    fn test_padded_bytes_per_row() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(1), 256);
    }

    #[test]
    fn test_unpad_rows() {
        let width = 2;
        let height = 2;
        let padded_row = padded_bytes_per_row(width);
        let mut padded = vec![0u8; (padded_row * height) as usize];
        padded[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let second = padded_row as usize;
        padded[second..second + 8].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let out = unpad_rows(&padded, width, height, padded_row);
        assert_eq!(out, (1..=16).collect::<Vec<u8>>());
    }
}
