use log::trace;

use crate::codec::DecodeInput;
use crate::utils::errors::AssembleError;

/// Zeroed bytes kept after the payload so decoders may over-read.
pub const INPUT_PADDING: usize = 16;

/// Collects input chunks into one contiguous, padded buffer.
///
/// Decoders get [`input`](Self::input), whose data is always followed by
/// `INPUT_PADDING` zero bytes. Consumed bytes are dropped from the front and
/// the remainder is moved down.
#[derive(Debug, Default)]
pub struct BitstreamAssembler {
    buffer: Vec<u8>,
    len: usize,
}

impl BitstreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `payload`, growing the buffer when needed.
    ///
    /// Returns the number of bytes appended.
    pub fn append(&mut self, payload: &[u8]) -> usize {
        if payload.is_empty() {
            return 0;
        }

        let need = self.len + payload.len() + INPUT_PADDING;
        if need > self.buffer.len() {
            let grown = need.max(self.buffer.len() * 2);
            trace!("assembler grows {} -> {grown} bytes", self.buffer.len());
            self.buffer.resize(grown, 0);
        }

        self.buffer[self.len..self.len + payload.len()].copy_from_slice(payload);
        self.len += payload.len();
        self.zero_padding();

        payload.len()
    }

    /// Drops `count` bytes from the front.
    pub fn consume(&mut self, count: usize) -> Result<(), AssembleError> {
        if count > self.len {
            return Err(AssembleError::ConsumeOverflow {
                requested: count,
                available: self.len,
            });
        }
        if count == 0 {
            return Ok(());
        }

        self.buffer.copy_within(count..self.len, 0);
        self.len -= count;
        self.zero_padding();
        Ok(())
    }

    /// Discards all buffered bytes.
    pub fn clear(&mut self) {
        self.len = 0;
        self.zero_padding();
    }

    fn zero_padding(&mut self) {
        let end = (self.len + INPUT_PADDING).min(self.buffer.len());
        self.buffer[self.len..end].fill(0);
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Buffered bytes followed by the zeroed padding.
    pub fn padded(&self) -> &[u8] {
        let end = (self.len + INPUT_PADDING).min(self.buffer.len());
        &self.buffer[..end]
    }

    /// The buffered bytes as decoder input.
    pub fn input(&self) -> DecodeInput<'_> {
        DecodeInput::new(self.padded(), self.len)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_bytes_are_contiguous_and_padded() {
        let mut assembler = BitstreamAssembler::new();

        assert_eq!(assembler.append(&[1, 2, 3]), 3);
        assert_eq!(assembler.append(&[4, 5]), 2);
        assert_eq!(assembler.data(), [1, 2, 3, 4, 5]);

        let padded = assembler.padded();
        assert_eq!(padded.len(), 5 + INPUT_PADDING);
        assert!(padded[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_append_is_noop() {
        let mut assembler = BitstreamAssembler::new();
        assert_eq!(assembler.append(&[]), 0);
        assert!(assembler.is_empty());
        assert!(assembler.buffer.is_empty());
    }

    #[test]
    fn growth_at_least_doubles() {
        let mut assembler = BitstreamAssembler::new();
        assembler.append(&[0xAA; 16]);
        assert_eq!(assembler.buffer.len(), 16 + INPUT_PADDING);

        assembler.append(&[0xBB; 1]);
        assert_eq!(assembler.buffer.len(), 2 * (16 + INPUT_PADDING));
        assert_eq!(assembler.len(), 17);
    }

    #[test]
    fn input_carries_zero_padding() {
        let mut assembler = BitstreamAssembler::new();
        assembler.append(&[9; 5]);

        let input = assembler.input();
        assert_eq!(input.len(), 5);
        assert_eq!(input.data(), [9; 5]);
        assert_eq!(input.padded().len(), 5 + INPUT_PADDING);
        assert!(input.padded()[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn interleaved_appends_and_consumes_keep_order() -> Result<(), AssembleError> {
        let mut assembler = BitstreamAssembler::new();
        let mut expected: Vec<u8> = Vec::new();
        let mut next = 0u8;
        let mut grew = false;

        // (append, consume) pairs; later appends outgrow the buffer while
        // leftover bytes are still queued.
        let steps = [(7, 3), (5, 0), (20, 11), (1, 1), (64, 40), (3, 30), (100, 5)];
        for (append, consume) in steps {
            let payload: Vec<u8> = (0..append)
                .map(|_| {
                    next = next.wrapping_add(1);
                    next
                })
                .collect();

            let (before, leftover) = (assembler.buffer.len(), expected.len());
            assembler.append(&payload);
            expected.extend_from_slice(&payload);
            grew |= leftover > 0 && assembler.buffer.len() > before;

            assert_eq!(assembler.data(), expected.as_slice());
            assert_eq!(assembler.len(), expected.len());
            assert!(assembler.padded()[assembler.len()..].iter().all(|&b| b == 0));
            assert_eq!(assembler.padded().len(), assembler.len() + INPUT_PADDING);

            assembler.consume(consume)?;
            expected.drain(..consume);
            assert_eq!(assembler.data(), expected.as_slice());
            assert!(assembler.padded()[assembler.len()..].iter().all(|&b| b == 0));
        }

        assert!(grew);
        Ok(())
    }

    #[test]
    fn consume_moves_remainder_and_rezeroes_tail() -> Result<(), AssembleError> {
        let mut assembler = BitstreamAssembler::new();
        assembler.append(&[1, 2, 3, 4, 5, 6]);

        assembler.consume(4)?;
        assert_eq!(assembler.data(), [5, 6]);
        assert!(assembler.padded()[2..].iter().all(|&b| b == 0));

        assert!(matches!(
            assembler.consume(3),
            Err(AssembleError::ConsumeOverflow {
                requested: 3,
                available: 2
            })
        ));

        assembler.clear();
        assert!(assembler.is_empty());
        Ok(())
    }
}
