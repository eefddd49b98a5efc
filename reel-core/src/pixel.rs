// PIXEL HANDOFF - raw plane selection between decoder and frame slot
//
// Decoders hand back planar pictures with per-plane strides. This module
// describes the slot buffer layout, selects the source plane pointers and
// strides, and copies rows into the slot's storage layout. Color conversion
// itself is the host's transform step and stays outside the core.

use serde::{Deserialize, Serialize};

// ============================================================================
// Formats and Layout
// ============================================================================

/// Slot buffer format the pixel transform writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0 (decoder-native, three planes)
    I420,
    /// Luma plane only
    Gray8,
}

/// Cropped decode region inside the full picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubFrame {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Picture geometry reported by the demuxer at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PictureLayout {
    pub width: u32,
    pub height: u32,
    pub sub_frame: SubFrame,
}

impl PictureLayout {
    /// Full-picture layout with no crop, the common case.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sub_frame: SubFrame {
                x: 0,
                y: 0,
                width,
                height,
            },
        }
    }
}

/// Storage geometry of one frame slot buffer. The stride may exceed the
/// display width when power-of-two padding is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
}

impl FrameLayout {
    pub fn new(picture: &PictureLayout, format: PixelFormat, power_of_two_stride: bool) -> Self {
        let stride = if power_of_two_stride {
            picture.width.next_power_of_two()
        } else {
            picture.width
        };
        Self {
            width: picture.width,
            height: picture.height,
            stride,
            format,
        }
    }

    pub fn chroma_stride(&self) -> u32 {
        (self.stride + 1) / 2
    }

    pub fn chroma_height(&self) -> u32 {
        (self.height + 1) / 2
    }

    /// Bytes needed for one frame at this layout.
    pub fn buffer_size(&self) -> usize {
        let luma = self.stride as usize * self.height as usize;
        match self.format {
            PixelFormat::I420 => {
                luma + 2 * (self.chroma_stride() as usize * self.chroma_height() as usize)
            }
            PixelFormat::Gray8 => luma,
        }
    }

    /// Slice one plane out of a frame buffer laid out by this descriptor.
    pub fn plane<'a>(&self, data: &'a [u8], index: usize) -> &'a [u8] {
        let luma = self.stride as usize * self.height as usize;
        match self.format {
            PixelFormat::I420 => {
                let chroma = self.chroma_stride() as usize * self.chroma_height() as usize;
                match index {
                    0 => &data[..luma],
                    1 => &data[luma..luma + chroma],
                    2 => &data[luma + chroma..luma + 2 * chroma],
                    _ => &[],
                }
            }
            PixelFormat::Gray8 => match index {
                0 => &data[..luma],
                _ => &[],
            },
        }
    }
}

// ============================================================================
// Decoder Plane Handoff
// ============================================================================

/// Borrowed decoder output: up to three planes with independent strides.
/// Chroma slices may be empty for luma-only pictures.
#[derive(Debug)]
pub struct PlaneSet<'a> {
    pub y: &'a [u8],
    pub y_stride: usize,
    pub u: &'a [u8],
    pub u_stride: usize,
    pub v: &'a [u8],
    pub v_stride: usize,
}

/// Populates a frame slot buffer from a decoder's plane set.
pub trait PixelTransform: Send + Sync {
    fn apply(&self, src: &PlaneSet<'_>, layout: &FrameLayout, dst: &mut [u8]);
}

/// Stride-aware plane copy with no color conversion.
pub struct PlanarCopy;

impl PixelTransform for PlanarCopy {
    fn apply(&self, src: &PlaneSet<'_>, layout: &FrameLayout, dst: &mut [u8]) {
        let w = layout.width as usize;
        let h = layout.height as usize;
        let stride = layout.stride as usize;
        let luma = stride * h;

        copy_plane(src.y, src.y_stride, &mut dst[..luma], stride, w, h);

        if layout.format == PixelFormat::I420 {
            let cw = (w + 1) / 2;
            let ch = layout.chroma_height() as usize;
            let cstride = layout.chroma_stride() as usize;
            let chroma = cstride * ch;
            copy_plane(
                src.u,
                src.u_stride,
                &mut dst[luma..luma + chroma],
                cstride,
                cw,
                ch,
            );
            copy_plane(
                src.v,
                src.v_stride,
                &mut dst[luma + chroma..luma + 2 * chroma],
                cstride,
                cw,
                ch,
            );
        }
    }
}

fn copy_plane(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    width: usize,
    rows: usize,
) {
    for row in 0..rows {
        let s = row * src_stride;
        if s >= src.len() {
            break;
        }
        let n = width.min(src.len() - s);
        let d = row * dst_stride;
        dst[d..d + n].copy_from_slice(&src[s..s + n]);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_i420() {
        let layout = FrameLayout::new(&PictureLayout::full(4, 4), PixelFormat::I420, false);
        // 16 luma + 2 * (2*2) chroma
        assert_eq!(layout.buffer_size(), 24);
    }

    #[test]
    fn test_power_of_two_stride() {
        let layout = FrameLayout::new(&PictureLayout::full(100, 50), PixelFormat::Gray8, true);
        assert_eq!(layout.stride, 128);
        assert_eq!(layout.width, 100);
        assert_eq!(layout.buffer_size(), 128 * 50);
    }

    #[test]
    fn test_planar_copy_with_padded_source_stride() {
        let layout = FrameLayout::new(&PictureLayout::full(2, 2), PixelFormat::I420, false);
        // Source luma rows padded to 4 bytes.
        let y = [1u8, 2, 0, 0, 3, 4, 0, 0];
        let u = [9u8];
        let v = [8u8];
        let src = PlaneSet {
            y: &y,
            y_stride: 4,
            u: &u,
            u_stride: 1,
            v: &v,
            v_stride: 1,
        };

        let mut dst = vec![0u8; layout.buffer_size()];
        PlanarCopy.apply(&src, &layout, &mut dst);

        assert_eq!(layout.plane(&dst, 0), &[1, 2, 3, 4]);
        assert_eq!(layout.plane(&dst, 1), &[9]);
        assert_eq!(layout.plane(&dst, 2), &[8]);
    }
}
