//! Line protocol: one decimal value per `\n`-terminated line.

use chrono::{DateTime, Local};
use log::debug;

use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq)]
/// A single decoded reading.
pub struct Sample {
    /// Raw value on the device scale (0..=1023 for the stock firmware)
    pub value: f64,
    /// Wall-clock time the line was received
    pub received_at: DateTime<Local>,
}

impl Sample {
    /// Decode a line and stamp it with `received_at`.
    pub fn decode(line: &str, received_at: DateTime<Local>) -> Result<Self, DecodeError> {
        let value = decode_line(line)?;
        Ok(Sample { value, received_at })
    }
}

/// Parse one line (terminator already removed) into a value.
///
/// Surrounding whitespace is ignored. Anything else that is not a finite real
/// number is rejected; nothing is coerced to zero.
pub fn decode_line(line: &str) -> Result<f64, DecodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }
    let value: f64 = trimmed
        .parse()
        .map_err(|_| DecodeError::NotANumber(trimmed.to_string()))?;
    if !value.is_finite() {
        return Err(DecodeError::NonFinite(trimmed.to_string()));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Output of [`LineAssembler::push`].
pub enum AssembledLine {
    /// A complete line, without its terminator
    Line(String),
    /// A line exceeded the length limit and was discarded; holds the byte count dropped
    Overflow(usize),
}

/// Reassembles lines from the arbitrary chunks a serial read returns.
#[derive(Debug)]
pub struct LineAssembler {
    buffer: Vec<u8>,
    max_line_len: usize,
    // Set while skipping the tail of an overlong line
    discarding: bool,
    discarded: usize,
}

impl LineAssembler {
    pub fn new(max_line_len: usize) -> Self {
        LineAssembler {
            buffer: Vec::with_capacity(max_line_len),
            max_line_len,
            discarding: false,
            discarded: 0,
        }
    }

    /// Feed a chunk of bytes, returning every line it completes in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<AssembledLine> {
        let mut out = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                if self.discarding {
                    out.push(AssembledLine::Overflow(self.discarded));
                    self.discarding = false;
                    self.discarded = 0;
                } else {
                    if self.buffer.last() == Some(&b'\r') {
                        self.buffer.pop();
                    }
                    out.push(AssembledLine::Line(
                        String::from_utf8_lossy(&self.buffer).into_owned(),
                    ));
                }
                self.buffer.clear();
                continue;
            }

            if self.discarding {
                self.discarded += 1;
            } else if self.buffer.len() >= self.max_line_len {
                debug!("Line exceeded {} bytes, discarding until newline", self.max_line_len);
                self.discarding = true;
                self.discarded = self.buffer.len() + 1;
                self.buffer.clear();
            } else {
                self.buffer.push(byte);
            }
        }
        out
    }

    /// Bytes held for an unfinished line.
    pub fn pending_len(&self) -> usize {
        if self.discarding {
            self.discarded
        } else {
            self.buffer.len()
        }
    }

    /// Drop any partial line, e.g. after the port was reopened.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
        self.discarded = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_values() {
        assert_eq!(decode_line("512"), Ok(512.0));
        assert_eq!(decode_line("  17 "), Ok(17.0));
        assert_eq!(decode_line("3.25"), Ok(3.25));
        assert_eq!(decode_line("-4"), Ok(-4.0));
        assert_eq!(decode_line("1e2"), Ok(100.0));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_line(""), Err(DecodeError::Empty));
        assert_eq!(decode_line("   \t"), Err(DecodeError::Empty));
        for bad in ["abc", "12abc", "1 2", "0x10", "12,5", "--3", "MPY: soft reboot"] {
            assert!(
                matches!(decode_line(bad), Err(DecodeError::NotANumber(_))),
                "{bad:?} should not decode"
            );
        }
        for bad in ["inf", "-inf", "NaN", "infinity"] {
            assert!(matches!(decode_line(bad), Err(DecodeError::NonFinite(_))));
        }
    }

    #[test]
    fn test_decode_is_repeatable() {
        let now = Local::now();
        let a = Sample::decode("733", now).unwrap();
        let b = Sample::decode("733", now).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.value, 733.0);
    }

    #[test]
    fn test_assembler_splits_chunks() {
        let mut asm = LineAssembler::new(64);
        assert!(asm.push(b"12").is_empty());
        assert_eq!(asm.pending_len(), 2);
        let lines = asm.push(b"3\r\n45\n6");
        assert_eq!(
            lines,
            vec![
                AssembledLine::Line("123".to_string()),
                AssembledLine::Line("45".to_string())
            ]
        );
        assert_eq!(asm.pending_len(), 1);
        asm.clear();
        assert_eq!(asm.pending_len(), 0);
    }

    #[test]
    fn test_assembler_discards_overlong_line() {
        let mut asm = LineAssembler::new(4);
        let lines = asm.push(b"123456789\n42\n");
        assert_eq!(
            lines,
            vec![AssembledLine::Overflow(9), AssembledLine::Line("42".to_string())]
        );
    }

    #[test]
    fn test_assembler_lossy_utf8() {
        let mut asm = LineAssembler::new(16);
        let lines = asm.push(&[0xff, b'1', b'\n']);
        match &lines[0] {
            AssembledLine::Line(text) => assert!(decode_line(text).is_err()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
