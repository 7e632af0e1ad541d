/// Start and stop markers share the same byte value.
pub const FRAME_START: u8 = 0x7E;
pub const FRAME_STOP: u8 = 0x7E;

/// reserved + address + command
const HEADER_LEN: usize = 3;
/// start + length(2) + stop; not covered by the length field
const FRAMING_LEN: usize = 4;
/// start + length(2) + type + addr + cmd
pub const MIN_RESPONSE_LEN: usize = 6;
/// Largest payload whose length still fits the 16-bit length field.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - HEADER_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub length: u16,
    pub kind: u8,
    pub can_addr: u8,
    pub cmd_id: u8,
    pub payload: Vec<u8>,
    pub raw: Vec<u8>,
}

/// Build a command frame:
/// `0x7E | len:u16le | 0x00 | addr | cmd | payload | 0x7E`, with `len = 3 + payload.len()`.
///
/// Payloads must not exceed [`MAX_PAYLOAD_LEN`]. Debug builds assert it; release builds
/// saturate the length field at `u16::MAX`.
pub fn build_frame(addr: u8, cmd: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(
        payload.len() <= MAX_PAYLOAD_LEN,
        "payload of {} bytes does not fit the length field",
        payload.len()
    );
    let len = u16::try_from(HEADER_LEN + payload.len()).unwrap_or(u16::MAX);
    let mut out = Vec::with_capacity(payload.len() + HEADER_LEN + FRAMING_LEN);
    out.push(FRAME_START);
    out.extend_from_slice(&len.to_le_bytes());
    out.push(0x00);
    out.push(addr);
    out.push(cmd);
    out.extend_from_slice(payload);
    out.push(FRAME_STOP);
    out
}

/// Shape check only: markers and minimum size. The declared length is reported as-is and
/// never compared against the actual payload size.
pub fn parse_frame(data: &[u8]) -> Option<ResponseFrame> {
    if data.len() < MIN_RESPONSE_LEN {
        return None;
    }
    if data[0] != FRAME_START || data[data.len() - 1] != FRAME_STOP {
        return None;
    }
    let payload = if data.len() > 7 {
        data[6..data.len() - 1].to_vec()
    } else {
        Vec::new()
    };
    Some(ResponseFrame {
        length: u16::from_le_bytes([data[1], data[2]]),
        kind: data[3],
        can_addr: data[4],
        cmd_id: data[5],
        payload,
        raw: data.to_vec(),
    })
}

/// Counts complete frames in a byte stream that may split or coalesce them arbitrarily.
///
/// Frames are delimited by the length field. Bytes before a start marker are skipped. When
/// the byte where the stop marker should be is something else, the candidate start is
/// dropped and the scan resumes one byte later.
#[derive(Debug, Default)]
pub struct FrameCounter {
    pending: Vec<u8>,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return how many frames they completed. A trailing partial frame
    /// is kept for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        self.pending.extend_from_slice(bytes);
        let buf = &self.pending;
        let mut pos = 0;
        let mut complete = 0;

        while let Some(off) = buf[pos..].iter().position(|&b| b == FRAME_START) {
            pos += off;
            if buf.len() - pos < 3 {
                break;
            }
            let declared = u16::from_le_bytes([buf[pos + 1], buf[pos + 2]]) as usize;
            let total = declared + FRAMING_LEN;
            if total < MIN_RESPONSE_LEN {
                pos += 1;
                continue;
            }
            if buf.len() - pos < total {
                break;
            }
            if buf[pos + total - 1] == FRAME_STOP {
                complete += 1;
                pos += total;
            } else {
                pos += 1;
            }
        }
        if !buf[pos..].contains(&FRAME_START) {
            pos = buf.len();
        }
        self.pending.drain(..pos);
        complete
    }
}
