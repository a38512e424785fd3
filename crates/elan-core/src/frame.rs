//! Capture images and raw frame assembly.
//!
//! The sensor delivers a frame as two 0x2400-byte half-frames of
//! little-endian 16-bit samples. Each half maps to 48 rows of the 96x96
//! grayscale capture image through a fixed tone curve.

use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};

use crate::protocol::constants::*;

/// Image attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageFlags {
    /// Ridges are bright and valleys dark (the sensor's native polarity).
    pub colors_inverted: bool,
}

/// An 8-bit grayscale image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureImage {
    width: u32,
    height: u32,
    flags: ImageFlags,
    data: Vec<u8>,
}

impl CaptureImage {
    /// Blank image.
    pub fn new(width: u32, height: u32, flags: ImageFlags) -> Self {
        Self {
            width,
            height,
            flags,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Blank 96x96 frame tagged with inverted colors, ready for assembly.
    pub fn new_frame() -> Self {
        Self::new(
            IMG_WIDTH as u32,
            IMG_HEIGHT as u32,
            ImageFlags {
                colors_inverted: true,
            },
        )
    }

    /// Wrap existing pixels. Returns `None` if the length does not match.
    pub fn from_raw(width: u32, height: u32, flags: ImageFlags, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            flags,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn flags(&self) -> ImageFlags {
        self.flags
    }

    pub fn colors_inverted(&self) -> bool {
        self.flags.colors_inverted
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Top and bottom halves, in that order.
    pub fn halves_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        let mid = self.data.len() / 2;
        self.data.split_at_mut(mid)
    }

    fn to_gray(&self) -> GrayImage {
        let width = self.width as usize;
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            Luma([self.data[y as usize * width + x as usize]])
        })
    }

    /// Scale both dimensions by `factor` with a Gaussian filter. Flags carry over.
    pub fn enlarge(&self, factor: u32) -> Self {
        let resized = imageops::resize(
            &self.to_gray(),
            self.width * factor,
            self.height * factor,
            FilterType::Gaussian,
        );
        Self {
            width: resized.width(),
            height: resized.height(),
            flags: self.flags,
            data: resized.into_raw(),
        }
    }

    /// Copy with normal polarity (dark ridges on a light background).
    pub fn standardized(&self) -> Self {
        if !self.flags.colors_inverted {
            return self.clone();
        }
        Self {
            width: self.width,
            height: self.height,
            flags: ImageFlags {
                colors_inverted: false,
            },
            data: self.data.iter().map(|&p| 255 - p).collect(),
        }
    }

    /// Save as an 8-bit grayscale file; format follows the extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> image::ImageResult<()> {
        image::save_buffer(
            path,
            &self.data,
            self.width,
            self.height,
            image::ColorType::L8,
        )
    }
}

/// Map one raw sample to a pixel value.
pub const fn tone(raw: u16) -> u8 {
    let v = raw / TONE_DIVISOR;
    let v = if v > TONE_FLOOR { v - TONE_FLOOR } else { 0 };
    if v >= TONE_SATURATION {
        255
    } else {
        (v * TONE_GAIN) as u8
    }
}

/// Convert one half-frame of raw samples into one half of a capture image.
///
/// Writes `min(out.len(), raw.len() / 2)` pixels in scan order.
pub fn assemble_half(raw: &[u8], out: &mut [u8]) {
    for (pixel, sample) in out.iter_mut().zip(raw.chunks_exact(2)) {
        *pixel = tone(LittleEndian::read_u16(sample));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Raw sample whose `/128` quotient is exactly `v`.
    fn raw_for(v: u16) -> u16 {
        v * 128
    }

    #[test]
    fn test_tone_boundaries() {
        assert_eq!(tone(0), 0);
        assert_eq!(tone(raw_for(40)), 0);
        assert_eq!(tone(raw_for(40) + 127), 0);
        assert_eq!(tone(raw_for(41)), 4);
        assert_eq!(tone(raw_for(72)), 128);
        assert_eq!(tone(raw_for(103)), 252);
        assert_eq!(tone(raw_for(104)), 255);
        assert_eq!(tone(raw_for(105)), 255);
        assert_eq!(tone(u16::MAX), 255);
    }

    #[test]
    fn test_tone_matches_formula() {
        for raw in (0..=u16::MAX).step_by(61) {
            let v = raw / 128;
            let expected = if v <= 40 {
                0
            } else if v - 40 >= 64 {
                255
            } else {
                4 * (v - 40)
            };
            assert_eq!(tone(raw) as u16, expected, "raw={}", raw);
        }
    }

    #[test]
    fn test_assemble_little_endian() {
        // 41*128 = 0x1480 -> lo 0x80, hi 0x14
        let raw = [0x80, 0x14, 0x00, 0x00, 0xFF, 0xFF];
        let mut out = [9u8; 3];
        assemble_half(&raw, &mut out);
        assert_eq!(out, [4, 0, 255]);
    }

    #[test]
    fn test_assemble_fills_half_frame() {
        let mut img = CaptureImage::new_frame();
        let first = vec![0xFFu8; BUFFER_TRANSMIT];
        let second = vec![0x00u8; BUFFER_TRANSMIT];
        {
            let (top, bottom) = img.halves_mut();
            assert_eq!(top.len(), HALF_FRAME_PIXELS);
            assert_eq!(bottom.len(), HALF_FRAME_PIXELS);
            bottom.fill(7);
            assemble_half(&first, top);
        }
        assert!(img.data()[..HALF_FRAME_PIXELS].iter().all(|&p| p == 255));
        assert!(img.data()[HALF_FRAME_PIXELS..].iter().all(|&p| p == 7));

        assemble_half(&second, img.halves_mut().1);
        assert!(img.data()[HALF_FRAME_PIXELS..].iter().all(|&p| p == 0));
    }

    #[test]
    fn test_new_frame_geometry() {
        let img = CaptureImage::new_frame();
        assert_eq!(img.width(), 96);
        assert_eq!(img.height(), 96);
        assert!(img.colors_inverted());
        assert_eq!(img.data().len(), IMG_SIZE);
    }

    #[test]
    fn test_enlarge_keeps_flags() {
        let mut img = CaptureImage::new_frame();
        img.data_mut().fill(200);
        let big = img.enlarge(ENLARGE_FACTOR);
        assert_eq!(big.width(), 288);
        assert_eq!(big.height(), 288);
        assert_eq!(big.data().len(), 288 * 288);
        assert!(big.colors_inverted());
        // Uniform input stays uniform.
        assert!(big.data().iter().all(|&p| (199..=201).contains(&p)));
    }

    #[test]
    fn test_standardized_inverts() {
        let img = CaptureImage::from_raw(
            2,
            1,
            ImageFlags {
                colors_inverted: true,
            },
            vec![0, 200],
        )
        .unwrap();
        let std = img.standardized();
        assert_eq!(std.data(), &[255, 55]);
        assert!(!std.colors_inverted());
        assert_eq!(std.standardized(), std);
    }

    #[test]
    fn test_from_raw_rejects_bad_length() {
        assert!(CaptureImage::from_raw(2, 2, ImageFlags::default(), vec![0; 3]).is_none());
    }
}
