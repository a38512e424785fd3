//! The fixed step table driven by the sequencer.
//!
//! Steps 0..[`CYCLE_START`] bring the sensor up once per activation. Steps
//! [`CYCLE_START`].. form the capture cycle; after the last one the cursor jumps
//! back to [`CYCLE_START`] instead of running off the end of the table.

use std::fmt;

use super::constants::*;

/// Which part of a frame a frame read delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePart {
    /// Read during initialization and thrown away.
    Discard,
    /// Rows 0..48 of the capture image.
    FirstHalf,
    /// Rows 48..96 of the capture image.
    SecondHalf,
}

/// What a step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Write a 2- or 3-byte command to EP1 OUT.
    SendCommand(&'static [u8]),
    /// Read and discard [`PROBE_LEN`] bytes from EP3 IN.
    ProbeRead,
    /// Read one half-frame from EP2 IN into the scratch buffer.
    FrameRead(FramePart),
    /// Assemble the second half, classify, report. No transfer.
    AssembleAndReport,
}

/// Direction of a bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Out => write!(f, "OUT"),
            Direction::In => write!(f, "IN"),
        }
    }
}

/// One bulk operation against the scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub endpoint: u8,
    pub direction: Direction,
    pub len: usize,
}

impl Action {
    /// The bulk operation this action issues, if any.
    pub fn transfer(&self) -> Option<Transfer> {
        match self {
            Action::SendCommand(bytes) => Some(Transfer {
                endpoint: EP_COMMAND_OUT,
                direction: Direction::Out,
                len: bytes.len(),
            }),
            Action::ProbeRead => Some(Transfer {
                endpoint: EP_STATUS_IN,
                direction: Direction::In,
                len: PROBE_LEN,
            }),
            Action::FrameRead(_) => Some(Transfer {
                endpoint: EP_DATA_IN,
                direction: Direction::In,
                len: BUFFER_TRANSMIT,
            }),
            Action::AssembleAndReport => None,
        }
    }
}

/// A named entry of the step table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub name: &'static str,
    pub action: Action,
}

const fn cmd(name: &'static str, bytes: &'static [u8]) -> Step {
    Step {
        name,
        action: Action::SendCommand(bytes),
    }
}

const fn probe(name: &'static str) -> Step {
    Step {
        name,
        action: Action::ProbeRead,
    }
}

const fn frame(name: &'static str, part: FramePart) -> Step {
    Step {
        name,
        action: Action::FrameRead(part),
    }
}

pub const STEP_COUNT: usize = 22;

/// Index of the scan command that opens every capture cycle.
pub const CYCLE_START: usize = 18;

pub const STEPS: [Step; STEP_COUNT] = [
    cmd("INIT_001", CMD_RESET),
    probe("INIT_002"),
    cmd("INIT_CMD_SCAN", CMD_SCAN),
    frame("INIT_CAPTURE_1", FramePart::Discard),
    frame("INIT_CAPTURE_2", FramePart::Discard),
    cmd("INIT_003", CMD_INIT_7D),
    probe("INIT_004"),
    cmd("INIT_005", CMD_INIT_BD_12),
    cmd("INIT_006", CMD_INIT_A8_78),
    cmd("INIT_007", CMD_INIT_68),
    probe("INIT_008"),
    cmd("INIT_009", CMD_INIT_67),
    probe("INIT_010"),
    cmd("INIT_011", CMD_INIT_47),
    probe("INIT_012"),
    cmd("INIT_013", CMD_INIT_87_C0),
    cmd("INIT_014", CMD_INIT_A8_97),
    cmd("INIT_015", CMD_INIT_8B_72),
    // Capture cycle
    cmd("LOOP_CMD_SCAN", CMD_SCAN),
    frame("LOOP_CAPTURE_1", FramePart::FirstHalf),
    frame("LOOP_CAPTURE_2", FramePart::SecondHalf),
    Step {
        name: "LOOP_CAPTURE_DONE",
        action: Action::AssembleAndReport,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_start_is_scan() {
        assert_eq!(STEPS[CYCLE_START].action, Action::SendCommand(CMD_SCAN));
        assert_eq!(STEPS[CYCLE_START].name, "LOOP_CMD_SCAN");
        assert_eq!(STEPS[STEP_COUNT - 1].action, Action::AssembleAndReport);
    }

    #[test]
    fn test_init_command_order() {
        let commands: Vec<&[u8]> = STEPS[..CYCLE_START]
            .iter()
            .filter_map(|s| match s.action {
                Action::SendCommand(bytes) => Some(bytes),
                _ => None,
            })
            .collect();

        let expected: Vec<&[u8]> = vec![
            &[0x00, 0x0c],
            &[0x00, 0x09],
            &[0x40, 0x7d],
            &[0x40, 0xbd, 0x12],
            &[0x40, 0xa8, 0x78],
            &[0x40, 0x68],
            &[0x40, 0x67],
            &[0x40, 0x47],
            &[0x40, 0x87, 0xc0],
            &[0x40, 0xa8, 0x97],
            &[0x40, 0x8b, 0x72],
        ];
        assert_eq!(commands, expected);
    }

    #[test]
    fn test_transfers_fit_scratch_buffer() {
        for step in STEPS.iter() {
            if let Some(t) = step.action.transfer() {
                assert!(t.len <= BUFFER_TRANSMIT, "{} too long", step.name);
            }
            if let Action::SendCommand(bytes) = step.action {
                assert!((2..=MAX_COMMAND_LEN).contains(&bytes.len()), "{}", step.name);
            }
        }
    }

    #[test]
    fn test_probe_and_frame_endpoints() {
        let probe = STEPS[1].action.transfer().unwrap();
        assert_eq!(probe.endpoint, EP_STATUS_IN);
        assert_eq!(probe.len, 0x40);

        let frame = STEPS[CYCLE_START + 1].action.transfer().unwrap();
        assert_eq!(frame.endpoint, EP_DATA_IN);
        assert_eq!(frame.direction, Direction::In);
        assert_eq!(frame.len, 0x2400);

        assert!(STEPS[STEP_COUNT - 1].action.transfer().is_none());
    }
}
