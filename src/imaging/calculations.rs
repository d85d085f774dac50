//! Pure calculation functions for thumbnail dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Dimensions of a thumbnail whose height is capped at `max_height`.
///
/// The aspect ratio is preserved and images already within the cap keep
/// their size. Width never rounds down to zero.
///
/// ```text
/// 800x600, cap 170 → 227x170
/// 100x80,  cap 170 → 100x80
/// ```
pub fn fit_to_height(source: (u32, u32), max_height: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    if src_h <= max_height || src_h == 0 {
        return source;
    }
    let w = (src_w as f64 * max_height as f64 / src_h as f64).round() as u32;
    (w.max(1), max_height)
}

/// `00:00:01.0` style timestamp for a frame offset in seconds.
pub fn frame_timestamp(offset_secs: f64) -> String {
    let offset = offset_secs.max(0.0);
    let whole = offset.trunc() as u64;
    let tenths = ((offset - offset.trunc()) * 10.0).round() as u64;
    let (whole, tenths) = if tenths == 10 { (whole + 1, 0) } else { (whole, tenths) };
    format!(
        "{:02}:{:02}:{:02}.{}",
        whole / 3600,
        (whole / 60) % 60,
        whole % 60,
        tenths
    )
}
