//! Static driver description.

use std::fmt;

use super::constants::{ENLARGE_FACTOR, IMG_HEIGHT, IMG_WIDTH, SUPPORTED_IDS};

/// How the finger is presented to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    /// Finger rests on the sensor.
    Press,
    /// Finger is swiped across the sensor.
    Swipe,
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanType::Press => write!(f, "press"),
            ScanType::Swipe => write!(f, "swipe"),
        }
    }
}

/// Identity and geometry advertised to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverInfo {
    pub name: &'static str,
    pub full_name: &'static str,
    pub id_table: &'static [(u16, u16)],
    pub scan_type: ScanType,
    /// Width of the delivered (enlarged) image.
    pub img_width: u32,
    /// Height of the delivered (enlarged) image.
    pub img_height: u32,
}

impl DriverInfo {
    /// Check whether a USB device is handled by this driver.
    pub fn supports(&self, vid: u16, pid: u16) -> bool {
        self.id_table.iter().any(|&(v, p)| v == vid && p == pid)
    }
}

pub const DRIVER_INFO: DriverInfo = DriverInfo {
    name: "elan",
    full_name: "Elan Fingerprint",
    id_table: SUPPORTED_IDS,
    scan_type: ScanType::Press,
    img_width: IMG_WIDTH as u32 * ENLARGE_FACTOR,
    img_height: IMG_HEIGHT as u32 * ENLARGE_FACTOR,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_info() {
        assert_eq!(DRIVER_INFO.img_width, 288);
        assert_eq!(DRIVER_INFO.img_height, 288);
        assert!(DRIVER_INFO.supports(0x04f3, 0x0c03));
        assert!(!DRIVER_INFO.supports(0x04f3, 0x0c04));
        assert_eq!(DRIVER_INFO.scan_type.to_string(), "press");
    }
}
