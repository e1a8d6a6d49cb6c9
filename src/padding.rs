use image::{imageops, ImageBuffer, Pixel, Primitive};
use num_traits::AsPrimitive;

/// Offset that centers a `size` image inside a `pad_size` canvas.
///
/// `None` when the image does not fit.
pub fn center_offset(size: [u32; 2], pad_size: [u32; 2]) -> Option<(i64, i64)> {
    let [width, height] = size;
    let [pad_width, pad_height] = pad_size;

    if width > pad_width || height > pad_height {
        return None;
    }

    let x = (pad_width - width) / 2;
    let y = (pad_height - height) / 2;
    Some((x.as_(), y.as_()))
}

pub trait Padding<P, S>
where
    P: Pixel<Subpixel = S>,
    S: Primitive,
{
    /// Paste onto a square canvas of side `max(width, height)` filled with
    /// `color`, centered. The pasted pixels are copied as-is.
    fn padding_square(&self, color: P) -> ImageBuffer<P, Vec<S>>;
}

impl<P, S> Padding<P, S> for ImageBuffer<P, Vec<S>>
where
    P: Pixel<Subpixel = S>,
    S: Primitive,
{
    fn padding_square(&self, color: P) -> ImageBuffer<P, Vec<S>> {
        let (width, height) = self.dimensions();
        let max_dim = width.max(height);
        let mut canvas = ImageBuffer::from_pixel(max_dim, max_dim, color);
        if let Some((x, y)) = center_offset([width, height], [max_dim, max_dim]) {
            imageops::replace(&mut canvas, self, x, y);
        }
        canvas
    }
}
