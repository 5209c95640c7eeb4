//! FFmpeg video filters for the vertical canvas.

use shortify_models::Layout;

/// Fit inside 1080x1920 and pad with centered black bars.
pub const FILTER_FIT_PAD: &str = concat!(
    "scale=1080:1920:force_original_aspect_ratio=decrease,",
    "pad=1080:1920:(ow-iw)/2:(oh-ih)/2:color=black,",
    "setsar=1"
);

/// Cover 1080x1920 and crop the overflow around the center.
pub const FILTER_FILL_CROP: &str = concat!(
    "scale=1080:1920:force_original_aspect_ratio=increase,",
    "crop=1080:1920,",
    "setsar=1"
);

/// Center square crop, scaled to full width, padded vertically.
pub const FILTER_SQUARE: &str = concat!(
    "crop=min(iw\\,ih):min(iw\\,ih),",
    "scale=1080:1080,",
    "pad=1080:1920:0:(oh-ih)/2:color=black,",
    "setsar=1"
);

/// Build the video filter for a layout.
pub fn layout_filter(layout: Layout) -> &'static str {
    match layout {
        Layout::Auto | Layout::Fit => FILTER_FIT_PAD,
        Layout::Fill => FILTER_FILL_CROP,
        Layout::Square => FILTER_SQUARE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_layout_targets_vertical_canvas() {
        for layout in Layout::ALL {
            let filter = layout_filter(*layout);
            assert!(filter.contains("1080"), "{layout}");
            assert!(filter.contains("1920"), "{layout}");
        }
    }

    #[test]
    fn test_auto_pads_centered() {
        let filter = layout_filter(Layout::Auto);
        assert!(filter.contains("force_original_aspect_ratio=decrease"));
        assert!(filter.contains("(ow-iw)/2:(oh-ih)/2"));
    }
}
