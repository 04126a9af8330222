use flash_shield_common::frame::Frame;

// Rec. 601 luma weights, the same perceptual weighting the rest of the
// ecosystem's grayscale conversions use.
const R_WEIGHT: f64 = 0.299;
const G_WEIGHT: f64 = 0.587;
const B_WEIGHT: f64 = 0.114;

/// Mean perceived brightness of a frame, truncated to [0, 255].
///
/// Precondition: the frame is non-empty. A zero-area frame is a programming
/// error upstream (capture always produces the configured resolution), not a
/// runtime condition.
pub fn mean_brightness(frame: &Frame) -> u8 {
    debug_assert!(frame.pixel_count() > 0, "brightness of an empty frame is undefined");

    let sum: f64 = frame
        .rgb_pixels()
        .map(|(r, g, b)| R_WEIGHT * r as f64 + G_WEIGHT * g as f64 + B_WEIGHT * b as f64)
        .sum();
    (sum / frame.pixel_count() as f64) as u8
}
