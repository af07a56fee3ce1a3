//! Frame → input tensor: decode, center crop, nearest-neighbour resample,
//! quantize.

use image::{ImageFormat, RgbImage};

use crate::error::VisionError;
use crate::frame::{FrameView, PixelEncoding};
use crate::vision::quant::InputQuantizer;

/// Square region cut from the middle of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CenterCrop {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

/// Largest centred square that fits in `width` × `height`.
pub fn center_crop(width: u32, height: u32) -> CenterCrop {
    let size = width.min(height);
    CenterCrop {
        x: (width - size) / 2,
        y: (height - size) / 2,
        size,
    }
}

/// Decode a frame into an interleaved RGB888 raster at native resolution.
pub fn decode_rgb(frame: &FrameView<'_>) -> Result<RgbImage, VisionError> {
    match frame.encoding {
        PixelEncoding::Jpeg => {
            let image = image::load_from_memory_with_format(frame.data, ImageFormat::Jpeg)
                .map_err(|e| {
                    log::warn!("JPEG decode failed ({} bytes): {e}", frame.data.len());
                    VisionError::DecodeFailed
                })?;
            Ok(image.into_rgb8())
        }
        PixelEncoding::Raw => Err(VisionError::InvalidState(
            "raw frames are not supported, camera must deliver JPEG",
        )),
    }
}

/// Write `raster` into `input` as `input_h` × `input_w` × 3 quantized values,
/// row-major and channel-interleaved.
///
/// Source pixel for output `(x, y)` is
/// `crop_origin + coord * crop.size / input_dim`, truncating.
pub fn fill_input(
    raster: &RgbImage,
    input_w: u32,
    input_h: u32,
    quantizer: &InputQuantizer,
    input: &mut [i8],
) -> Result<(), VisionError> {
    let expected = input_w as usize * input_h as usize * 3;
    if input.len() != expected {
        return Err(VisionError::InferenceFailed("input tensor size mismatch"));
    }
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        return Err(VisionError::DecodeFailed);
    }
    let crop = center_crop(width, height);
    let src = raster.as_raw();
    let stride = width as usize * 3;

    let mut out = input.chunks_exact_mut(3);
    for y in 0..input_h {
        let sy = (crop.y + (u64::from(y) * u64::from(crop.size) / u64::from(input_h)) as u32) as usize;
        let row = &src[sy * stride..(sy + 1) * stride];
        for x in 0..input_w {
            let sx = (crop.x + (u64::from(x) * u64::from(crop.size) / u64::from(input_w)) as u32) as usize;
            let px = &row[sx * 3..sx * 3 + 3];
            if let Some(dst) = out.next() {
                dst[0] = quantizer.quantize(px[0]);
                dst[1] = quantizer.quantize(px[1]);
                dst[2] = quantizer.quantize(px[2]);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::quant::QuantParams;
    use image::Rgb;

    fn identity_quantizer() -> InputQuantizer {
        // 0..=255 maps onto -128..=127
        InputQuantizer::new(QuantParams::new(1.0 / 255.0, -128))
    }

    #[test]
    fn crop_landscape_and_portrait() {
        assert_eq!(center_crop(160, 120), CenterCrop { x: 20, y: 0, size: 120 });
        assert_eq!(center_crop(120, 160), CenterCrop { x: 0, y: 20, size: 120 });
        assert_eq!(center_crop(7, 7), CenterCrop { x: 0, y: 0, size: 7 });
        assert_eq!(center_crop(5, 2), CenterCrop { x: 1, y: 0, size: 2 });
    }

    #[test]
    fn raw_frame_is_invalid_state() {
        let data = [0u8; 12];
        let frame = FrameView::raw(&data, 2, 2);
        assert!(matches!(
            decode_rgb(&frame),
            Err(VisionError::InvalidState(_))
        ));
    }

    #[test]
    fn garbage_jpeg_fails_decode() {
        let data = [0xFFu8, 0xD8, 0x00, 0x01, 0x02];
        let frame = FrameView::jpeg(&data, 160, 120);
        assert_eq!(decode_rgb(&frame).unwrap_err(), VisionError::DecodeFailed);
    }

    #[test]
    fn resample_picks_centre_of_wide_frame() {
        // 4x2 frame: columns 0 and 3 are letterbox, crop keeps columns 1..3.
        let mut img = RgbImage::new(4, 2);
        for y in 0..2 {
            img.put_pixel(0, y, Rgb([0, 0, 0]));
            img.put_pixel(1, y, Rgb([255, 0, 0]));
            img.put_pixel(2, y, Rgb([0, 255, 0]));
            img.put_pixel(3, y, Rgb([0, 0, 0]));
        }
        let mut input = [0i8; 2 * 2 * 3];
        fill_input(&img, 2, 2, &identity_quantizer(), &mut input).unwrap();
        assert_eq!(
            input,
            [127, -128, -128, -128, 127, -128, 127, -128, -128, -128, 127, -128]
        );
    }

    #[test]
    fn upsampling_repeats_source_pixels() {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 0, Rgb([255, 255, 255]));
        let mut input = [0i8; 4 * 4 * 3];
        fill_input(&img, 4, 4, &identity_quantizer(), &mut input).unwrap();
        // Top-left 2x2 block comes from the white pixel.
        for (y, x) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            let i = (y * 4 + x) * 3;
            assert_eq!(&input[i..i + 3], &[127, 127, 127]);
        }
        assert_eq!(&input[(3 * 4 + 3) * 3..], &[-128, -128, -128]);
    }

    #[test]
    fn wrong_input_length_is_rejected() {
        let img = RgbImage::new(2, 2);
        let mut input = [0i8; 5];
        assert!(fill_input(&img, 2, 2, &identity_quantizer(), &mut input).is_err());
    }
}
