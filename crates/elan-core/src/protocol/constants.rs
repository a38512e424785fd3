//! Protocol constants for the Elan 04f3:0c03 press sensor.
//!
//! All values are fixed by the hardware. They are not tuning knobs.

// ============================================================================
// Device Identification
// ============================================================================

/// Elan Microelectronics Vendor ID
pub const ELAN_VENDOR_ID: u16 = 0x04F3;

/// Elan 96x96 press sensor Product ID
pub const ELAN_PRODUCT_ID: u16 = 0x0C03;

/// All supported (VID, PID) pairs.
pub const SUPPORTED_IDS: &[(u16, u16)] = &[(ELAN_VENDOR_ID, ELAN_PRODUCT_ID)];

/// USB interface carrying all three bulk endpoints.
pub const INTERFACE_NUMBER: u8 = 0;

// ============================================================================
// Endpoints
// ============================================================================

/// EP1 OUT - command writes
pub const EP_COMMAND_OUT: u8 = 0x01;

/// EP2 IN - raw frame data
pub const EP_DATA_IN: u8 = 0x82;

/// EP3 IN - status probe
pub const EP_STATUS_IN: u8 = 0x83;

// ============================================================================
// Transfer Sizes and Timing
// ============================================================================

/// Per-operation bulk timeout in milliseconds.
pub const BULK_TIMEOUT_MS: u64 = 1000;

/// One half-frame (one DMA chunk) in bytes. Also the scratch buffer size.
pub const BUFFER_TRANSMIT: usize = 0x2400;

/// Size of a status probe read.
pub const PROBE_LEN: usize = 0x40;

// ============================================================================
// Image Geometry
// ============================================================================

pub const IMG_WIDTH: usize = 96;
pub const IMG_HEIGHT: usize = 96;
pub const IMG_SIZE: usize = IMG_WIDTH * IMG_HEIGHT;

/// Pixels produced by one half-frame (2 bytes per sample).
pub const HALF_FRAME_PIXELS: usize = BUFFER_TRANSMIT / 2;

/// Each dimension is enlarged by this factor before delivery.
pub const ENLARGE_FACTOR: u32 = 3;

// ============================================================================
// Tone Curve
// ============================================================================

/// Raw 16-bit samples are divided by this before clamping.
pub const TONE_DIVISOR: u16 = 128;

/// Scaled values at or below this floor map to black.
pub const TONE_FLOOR: u16 = 40;

/// Values above floor + this saturate to white.
pub const TONE_SATURATION: u16 = 64;

/// Gain applied below saturation.
pub const TONE_GAIN: u16 = 4;

// ============================================================================
// Finger Detection
// ============================================================================

/// 32x32 box at the center of the frame.
pub const DETBOX_ROW_START: usize = 32;
pub const DETBOX_COL_START: usize = 32;
pub const DETBOX_ROWS: usize = 32;
pub const DETBOX_COLS: usize = 32;
pub const DETBOX_ROW_END: usize = DETBOX_ROW_START + DETBOX_ROWS;
pub const DETBOX_COL_END: usize = DETBOX_COL_START + DETBOX_COLS;

/// A pixel brighter than this counts towards presence.
pub const FINGER_PRESENCE_THRESHOLD: u8 = 140;

/// More than this many bright pixels means a finger is present (~20% of the box).
pub const FINGER_PIXEL_THRESHOLD: u16 = 200;

// ============================================================================
// Commands (Host -> Device, EP1 OUT)
// ============================================================================

/// Sensor reset / wake.
pub const CMD_RESET: &[u8] = &[0x00, 0x0C];

/// Trigger one scan; the frame follows on EP2 as two half-frames.
pub const CMD_SCAN: &[u8] = &[0x00, 0x09];

pub const CMD_INIT_7D: &[u8] = &[0x40, 0x7D];
pub const CMD_INIT_BD_12: &[u8] = &[0x40, 0xBD, 0x12];
pub const CMD_INIT_A8_78: &[u8] = &[0x40, 0xA8, 0x78];
pub const CMD_INIT_68: &[u8] = &[0x40, 0x68];
pub const CMD_INIT_67: &[u8] = &[0x40, 0x67];
pub const CMD_INIT_47: &[u8] = &[0x40, 0x47];
pub const CMD_INIT_87_C0: &[u8] = &[0x40, 0x87, 0xC0];
pub const CMD_INIT_A8_97: &[u8] = &[0x40, 0xA8, 0x97];
pub const CMD_INIT_8B_72: &[u8] = &[0x40, 0x8B, 0x72];

/// Longest command payload.
pub const MAX_COMMAND_LEN: usize = 3;
