use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba};

/// Wraps an RGBA buffer as a GPU image.
pub(super) fn rgba_to_image(mut rgba: Vec<u8>, width: u32, height: u32) -> Option<Arc<RenderImage>> {
    // GPUI expects BGRA; convert in place to avoid the async asset pipeline and flicker.
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, rgba)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}
