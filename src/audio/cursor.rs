//! Byte buffer with a read position.

/// A byte buffer plus the position up to which it has been consumed.
///
/// Every hop in the audio path hands data over as a cursor: the receiver
/// advances it by however much it accepted and the remainder stays with the
/// sender for the next attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcmCursor {
    data: Vec<u8>,
    position: usize,
}

impl PcmCursor {
    /// Wrap `data` with the read position at its start.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.position..]
    }

    /// Number of bytes not yet consumed.
    #[inline]
    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.position
    }

    /// Returns true if unconsumed bytes are left.
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.position < self.data.len()
    }

    /// Mark `count` bytes as consumed.
    ///
    /// # Panics
    ///
    /// Panics if `count > remaining_len()`.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        assert!(
            count <= self.remaining_len(),
            "advance past end of cursor"
        );
        self.position += count;
    }

    /// Drop all data, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
        self.position = 0;
    }

    /// Clear the cursor and return its storage for writing.
    pub fn refill(&mut self) -> &mut Vec<u8> {
        self.clear();
        &mut self.data
    }

    /// Append bytes after the unconsumed data.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Storage for appending output.
    pub(crate) fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

impl From<Vec<u8>> for PcmCursor {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_and_remaining() {
        let mut cursor = PcmCursor::new(vec![1, 2, 3, 4]);
        assert_eq!(cursor.remaining_len(), 4);
        cursor.advance(3);
        assert_eq!(cursor.remaining(), &[4]);
        cursor.advance(1);
        assert!(!cursor.has_remaining());
    }

    #[test]
    fn test_refill_resets_position() {
        let mut cursor = PcmCursor::new(vec![1, 2]);
        cursor.advance(2);
        cursor.refill().extend_from_slice(&[7, 8, 9]);
        assert_eq!(cursor.remaining(), &[7, 8, 9]);
    }

    #[test]
    #[should_panic(expected = "advance past end of cursor")]
    fn test_advance_overflow() {
        let mut cursor = PcmCursor::new(vec![1]);
        cursor.advance(2);
    }
}
