// SPDX-License-Identifier: MPL-2.0

//! Frame producers
//!
//! ```text
//! ┌──────────────────────┐      deliver()      ┌──────────────────────┐
//! │    FrameProducer     │ ──────────────────▶ │ ExternalFrameTexture │
//! │ (GStreamer, test)    │   latest-wins slot  │   (render thread)    │
//! └──────────────────────┘                     └──────────────────────┘
//! ```
//!
//! A producer is opened for a facing, negotiates the closest supported size,
//! and is bound to the render context's external texture once the surface is
//! ready. Rebinding after a surface recreation swaps the binding in place
//! without restarting the stream.

pub mod external_texture;
pub mod gst_camera;
pub mod synthetic;
pub mod types;

pub use external_texture::{ExternalFrameTexture, ExternalTextureBinding, FrameListener};
pub use gst_camera::GstCameraProducer;
pub use synthetic::{SyntheticPattern, SyntheticProducer};
pub use types::*;

use tracing::debug;

/// Source of camera frames
pub trait FrameProducer: Send {
    /// Open a device pointing the given way
    ///
    /// # Returns
    /// * `Ok(Self)` - Device opened, not yet streaming
    /// * `Err(BackendError::DeviceNotFound)` - No usable device
    fn open(facing: CameraFacing) -> BackendResult<Self>
    where
        Self: Sized;

    /// Pick the supported size closest to the desired one
    ///
    /// The result becomes the capture size for the next `start`.
    fn negotiate_size(&mut self, width: u32, height: u32) -> (u32, u32);

    /// Route delivered frames into the given texture binding
    ///
    /// Replaces any previous binding; frames already in flight for the old
    /// binding are discarded by its closed flag.
    fn bind_texture(&mut self, binding: ExternalTextureBinding);

    /// Begin delivering frames. Starting a running producer is a no-op.
    fn start(&mut self) -> BackendResult<()>;

    /// Stop delivering frames. Stopping a stopped producer is a no-op.
    fn stop(&mut self) -> BackendResult<()>;

    /// Whether frames are currently being delivered
    fn is_running(&self) -> bool;

    /// Human readable device name
    fn name(&self) -> &str;
}

/// Choose the supported size closest to `(width, height)`
///
/// An exact match wins. Otherwise the size with the smallest
/// `|dw| + |dh|` is chosen, ties going to the larger area. Returns `None` if
/// `supported` is empty.
pub fn choose_closest_size(supported: &[(u32, u32)], width: u32, height: u32) -> Option<(u32, u32)> {
    if supported.contains(&(width, height)) {
        return Some((width, height));
    }

    let chosen = supported.iter().copied().min_by(|a, b| {
        let dist = |(w, h): (u32, u32)| w.abs_diff(width) as u64 + h.abs_diff(height) as u64;
        let area = |(w, h): (u32, u32)| w as u64 * h as u64;
        dist(*a).cmp(&dist(*b)).then_with(|| area(*b).cmp(&area(*a)))
    });

    debug!(
        desired_width = width,
        desired_height = height,
        ?chosen,
        "Negotiated capture size"
    );
    chosen
}

/// Guess which way a device points from its V4L2 card name
pub fn guess_facing(card: &str) -> CameraFacing {
    let card = card.to_ascii_lowercase();
    if ["front", "user", "integrated", "webcam", "facetime"]
        .iter()
        .any(|hint| card.contains(hint))
    {
        CameraFacing::Front
    } else {
        CameraFacing::Back
    }
}

/// Enumerate V4L2 capture devices
///
/// Scans `/dev/video*` and keeps nodes that report video capture capability.
pub fn enumerate_cameras() -> Vec<CameraDevice> {
    use v4l::capability::Flags;
    use v4l::video::Capture;

    let mut paths: Vec<_> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("video"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut cameras = Vec::new();
    for path in paths {
        let path_str = path.to_string_lossy().to_string();
        let Ok(dev) = v4l::Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            debug!(path = %path_str, "Skipping non-capture node");
            continue;
        }

        // Metadata nodes report capture capability but no formats
        let has_formats = dev.enum_formats().map(|f| !f.is_empty()).unwrap_or(false);
        if !has_formats {
            continue;
        }

        cameras.push(CameraDevice {
            facing: guess_facing(&caps.card),
            name: caps.card,
            path: path_str,
            driver: caps.driver,
        });
    }

    debug!(count = cameras.len(), "Enumerated cameras");
    cameras
}

/// Enumerate the capture sizes a V4L2 device supports
///
/// Stepwise ranges are sampled at common resolutions.
pub fn enumerate_sizes(device_path: &str) -> Vec<CameraFormat> {
    use v4l::video::Capture;

    const STEPWISE_SAMPLES: [(u32, u32); 6] = [
        (320, 240),
        (640, 480),
        (800, 600),
        (1280, 720),
        (1280, 960),
        (1920, 1080),
    ];

    let Ok(dev) = v4l::Device::with_path(device_path) else {
        return Vec::new();
    };

    let mut formats: Vec<CameraFormat> = Vec::new();
    let mut push = |format: CameraFormat| {
        if !formats
            .iter()
            .any(|f| f.width == format.width && f.height == format.height)
        {
            formats.push(format);
        }
    };

    let Ok(descriptions) = dev.enum_formats() else {
        return Vec::new();
    };
    for desc in descriptions {
        let Ok(sizes) = dev.enum_framesizes(desc.fourcc) else {
            continue;
        };
        for size in sizes {
            match size.size {
                v4l::framesize::FrameSizeEnum::Discrete(discrete) => {
                    let framerate = dev
                        .enum_frameintervals(desc.fourcc, discrete.width, discrete.height)
                        .ok()
                        .and_then(|intervals| {
                            intervals.into_iter().find_map(|i| match i.interval {
                                v4l::frameinterval::FrameIntervalEnum::Discrete(frac)
                                    if frac.numerator > 0 =>
                                {
                                    Some(Framerate::new(frac.denominator, frac.numerator))
                                }
                                _ => None,
                            })
                        });
                    push(CameraFormat {
                        width: discrete.width,
                        height: discrete.height,
                        framerate,
                    });
                }
                v4l::framesize::FrameSizeEnum::Stepwise(step) => {
                    for (w, h) in STEPWISE_SAMPLES {
                        if (step.min_width..=step.max_width).contains(&w)
                            && (step.min_height..=step.max_height).contains(&h)
                        {
                            push(CameraFormat {
                                width: w,
                                height: h,
                                framerate: None,
                            });
                        }
                    }
                }
            }
        }
    }

    formats
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZES: [(u32, u32); 4] = [(320, 240), (640, 480), (1280, 720), (1920, 1080)];

    #[test]
    fn test_exact_size_wins() {
        assert_eq!(choose_closest_size(&SIZES, 640, 480), Some((640, 480)));
    }

    #[test]
    fn test_nearest_size_is_chosen() {
        assert_eq!(choose_closest_size(&SIZES, 1200, 700), Some((1280, 720)));
        assert_eq!(choose_closest_size(&SIZES, 100, 100), Some((320, 240)));
        assert_eq!(choose_closest_size(&SIZES, 4000, 3000), Some((1920, 1080)));
    }

    #[test]
    fn test_tie_prefers_larger_area() {
        // 680x510 is 70 away from both
        let sizes = [(640, 480), (720, 540)];
        assert_eq!(choose_closest_size(&sizes, 680, 510), Some((720, 540)));
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(choose_closest_size(&[], 640, 480), None);
    }

    #[test]
    fn test_guess_facing() {
        assert_eq!(guess_facing("Integrated Camera: Integrated C"), CameraFacing::Front);
        assert_eq!(guess_facing("USB Capture HDMI"), CameraFacing::Back);
    }
}
