//! Finger presence detection.
//!
//! We take 32x32 pixels at the center of the frame and count the pixels
//! above a brightness threshold. A finger covers at least ~20% of the box.

use crate::protocol::constants::*;

/// Decide whether a finger is on the sensor.
///
/// `frame` is a finished 96x96 image in row-major order. Returns as soon as
/// the count passes [`FINGER_PIXEL_THRESHOLD`]; the counter only grows, so the
/// verdict equals the one from a full count.
pub fn finger_is_present(frame: &[u8]) -> bool {
    if frame.len() < IMG_SIZE {
        return false;
    }
    let mut above: u16 = 0;

    for row in DETBOX_ROW_START..DETBOX_ROW_END {
        let start = row * IMG_WIDTH;
        let rowdata = &frame[start + DETBOX_COL_START..start + DETBOX_COL_END];

        for &pixel in rowdata {
            if pixel > FINGER_PRESENCE_THRESHOLD {
                above += 1;
                if above > FINGER_PIXEL_THRESHOLD {
                    return true;
                }
            }
        }
    }
    false
}

/// Summary of one frame, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub min: u8,
    pub max: u8,
    /// Share of all pixels above the presence threshold, in percent.
    pub above_threshold_pct: f32,
}

impl FrameStats {
    pub fn from_frame(frame: &[u8]) -> Self {
        if frame.is_empty() {
            return Self {
                min: 0,
                max: 0,
                above_threshold_pct: 0.0,
            };
        }
        let min = frame.iter().copied().min().unwrap_or(0);
        let max = frame.iter().copied().max().unwrap_or(0);
        let above = frame
            .iter()
            .filter(|&&p| p > FINGER_PRESENCE_THRESHOLD)
            .count();
        Self {
            min,
            max,
            above_threshold_pct: above as f32 * 100.0 / frame.len() as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frame with the first `count` pixels of the detection box set to `value`.
    fn frame_with_box_pixels(count: usize, value: u8) -> Vec<u8> {
        let mut frame = vec![0u8; IMG_SIZE];
        let mut placed = 0;
        'outer: for row in DETBOX_ROW_START..DETBOX_ROW_END {
            for col in DETBOX_COL_START..DETBOX_COL_END {
                if placed == count {
                    break 'outer;
                }
                frame[row * IMG_WIDTH + col] = value;
                placed += 1;
            }
        }
        frame
    }

    #[test]
    fn test_threshold_201_present() {
        assert!(finger_is_present(&frame_with_box_pixels(201, 141)));
    }

    #[test]
    fn test_threshold_200_absent() {
        assert!(!finger_is_present(&frame_with_box_pixels(200, 255)));
    }

    #[test]
    fn test_brightness_must_exceed_140() {
        assert!(!finger_is_present(&frame_with_box_pixels(1024, 140)));
        assert!(finger_is_present(&frame_with_box_pixels(1024, 141)));
    }

    #[test]
    fn test_pixels_outside_box_ignored() {
        let mut frame = vec![255u8; IMG_SIZE];
        for row in DETBOX_ROW_START..DETBOX_ROW_END {
            for col in DETBOX_COL_START..DETBOX_COL_END {
                frame[row * IMG_WIDTH + col] = 0;
            }
        }
        assert!(!finger_is_present(&frame));
    }

    #[test]
    fn test_full_box_no_wraparound() {
        // 1024 bright pixels; a narrow counter would wrap before deciding.
        assert!(finger_is_present(&vec![255u8; IMG_SIZE]));
    }

    /// xorshift32, enough to vary frames between seeds.
    fn next(state: &mut u32) -> u32 {
        *state ^= *state << 13;
        *state ^= *state >> 17;
        *state ^= *state << 5;
        *state
    }

    #[test]
    fn test_monotonic_in_brightness() {
        for seed in [0x1234_5678u32, 0xdead_beef, 0x0bad_f00d, 7, 99_991] {
            let mut rng = seed;
            // Starts below 200 bright pixels and climbs past it.
            let mut frame: Vec<u8> = (0..IMG_SIZE)
                .map(|_| 40 + (next(&mut rng) % 110) as u8)
                .collect();
            assert!(!finger_is_present(&frame));

            for _ in 0..2000 {
                let row = DETBOX_ROW_START + next(&mut rng) as usize % DETBOX_ROWS;
                let col = DETBOX_COL_START + next(&mut rng) as usize % DETBOX_COLS;
                let idx = row * IMG_WIDTH + col;
                let before = finger_is_present(&frame);
                frame[idx] = frame[idx].saturating_add((next(&mut rng) % 64) as u8);
                let after = finger_is_present(&frame);
                assert!(
                    !before || after,
                    "seed {:#x}: brightening pixel {} flipped verdict",
                    seed,
                    idx
                );
            }
            assert!(finger_is_present(&frame), "seed {:#x} never crossed", seed);
        }
    }

    #[test]
    fn test_brightening_reaches_present() {
        let mut frame = frame_with_box_pixels(DETBOX_ROWS * DETBOX_COLS, 100);
        assert!(!finger_is_present(&frame));
        for pixel in frame.iter_mut() {
            *pixel = pixel.saturating_add(60);
        }
        assert!(finger_is_present(&frame));
    }

    #[test]
    fn test_frame_stats() {
        let mut frame = vec![10u8; 100];
        frame[0] = 0;
        frame[1] = 250;
        frame[2] = 141;
        let stats = FrameStats::from_frame(&frame);
        assert_eq!(stats.min, 0);
        assert_eq!(stats.max, 250);
        assert!((stats.above_threshold_pct - 2.0).abs() < f32::EPSILON);
    }
}
