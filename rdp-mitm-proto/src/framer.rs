//! PDU framer and classifier.
//!
//! RDP traffic is a stream of concatenated PDUs in one of three shapes —
//! TPKT, BER/X.224, and Fast-Path. [`split_pdus`] peels complete PDUs off a
//! buffer, tolerant of both truncation (a partial trailing PDU is left
//! unconsumed, not errored on) and multiple concatenated PDUs in one read.

/// Which framing shape a PDU's leading bytes indicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// `03 00 len_hi len_lo ...`, length is big-endian at offset 2.
    Tpkt,
    /// `30 ...` BER/X.224-embedded length encoding.
    Ber,
    /// Post-connection compressed I/O PDU, `byte[0] % 4 == 0`.
    FastPath,
}

/// Classify the leading bytes of `buf` without consuming anything.
pub fn classify(buf: &[u8]) -> Option<FrameKind> {
    match buf.first()? {
        0x03 if buf.get(1) == Some(&0x00) => Some(FrameKind::Tpkt),
        0x30 => Some(FrameKind::Ber),
        b if b % 4 == 0 => Some(FrameKind::FastPath),
        _ => None,
    }
}

/// Length in bytes of the single complete PDU starting at `buf`, or `None`
/// if `buf` doesn't hold enough bytes yet to know the length.
pub fn pdu_len(buf: &[u8]) -> Option<usize> {
    match classify(buf)? {
        FrameKind::Tpkt => {
            if buf.len() < 4 {
                return None;
            }
            Some(u16::from_be_bytes([buf[2], buf[3]]) as usize)
        }
        FrameKind::Ber => {
            if buf.len() < 2 {
                return None;
            }
            let b1 = buf[1];
            if b1 < 0x80 {
                Some(2 + b1 as usize)
            } else {
                let n = (b1 & 0x7f) as usize;
                if buf.len() < 2 + n {
                    return None;
                }
                let mut len = 0usize;
                for &byte in &buf[2..2 + n] {
                    len = (len << 8) | byte as usize;
                }
                Some(2 + n + len)
            }
        }
        FrameKind::FastPath => {
            if buf.len() < 2 {
                return None;
            }
            if buf[1] >= 0x80 {
                if buf.len() < 3 {
                    return None;
                }
                let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
                len.checked_sub(0x8000)
            } else {
                Some(buf[1] as usize)
            }
        }
    }
}

/// `true` if `buf` looks like a Fast-Path PDU whose declared length matches
/// its actual size — the stronger check `decrypt` uses before treating a
/// frame as a self-contained Fast-Path packet, as opposed to [`classify`]'s
/// cheaper "could be Fast-Path" guess used while framing a stream.
pub fn is_fast_path(buf: &[u8]) -> bool {
    if buf.len() <= 1 {
        return false;
    }
    buf[0] % 4 == 0 && (buf[1] as usize == buf.len() || buf[1] == 0x80)
}

/// Split `buf` into complete PDUs, left to right. Any trailing bytes that
/// don't form a complete PDU (truncated read, or too few bytes to even
/// determine a length) are left unconsumed rather than yielded or errored.
pub fn split_pdus(buf: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut rest = buf;
    while !rest.is_empty() {
        match pdu_len(rest) {
            Some(len) if len > 0 && len <= rest.len() => {
                out.push(&rest[..len]);
                rest = &rest[len..];
            }
            _ => break,
        }
    }
    out
}
