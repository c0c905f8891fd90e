// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use shadercam::constants::{BitratePreset, encoder, format_bitrate, render};

#[test]
fn test_bitrate_preset_values() {
    assert_eq!(BitratePreset::ALL.len(), 3);
    assert_eq!(BitratePreset::default(), BitratePreset::Standard);
}

#[test]
fn test_default_bitrate_is_one_megabit() {
    for side in [240, 480, 720, 1080] {
        assert_eq!(BitratePreset::Standard.bitrate_bps(side), 1_000_000);
    }
    assert_eq!(encoder::DEFAULT_BITRATE_BPS, 1_000_000);
}

#[test]
fn test_bitrate_preset_ordering() {
    for side in [240, 720, 2160] {
        let mut prev_bitrate = 0u32;
        for preset in BitratePreset::ALL {
            let bitrate = preset.bitrate_bps(side);
            assert!(
                bitrate >= prev_bitrate,
                "Presets should be ordered from lowest to highest"
            );
            prev_bitrate = bitrate;
        }
    }
}

#[test]
fn test_bitrate_preset_display_names() {
    for preset in BitratePreset::ALL {
        assert!(
            !preset.display_name().is_empty(),
            "Preset {:?} has empty display name",
            preset
        );
    }
}

#[test]
fn test_format_bitrate() {
    assert_eq!(format_bitrate(1_000_000), "1 Mbps");
    assert_eq!(format_bitrate(2_500_000), "2.5 Mbps");
}

#[test]
fn test_ring_is_at_least_double_buffered() {
    assert!(render::MIN_TARGET_RING_DEPTH >= 2);
    assert!(render::DEFAULT_TARGET_RING_DEPTH >= render::MIN_TARGET_RING_DEPTH);
}
