/// Append-only builder for big-endian payloads.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Writes a `u32` length prefix followed by the UTF-8 bytes.
    ///
    /// # Panics
    /// Panics if the string is longer than `u32::MAX` bytes.
    pub fn write_string(&mut self, s: &str) {
        self.write_u32(s.len().try_into().expect("string too long"));
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_record_layout() {
        let mut w = Writer::new();
        w.write_u32(3);
        w.write_bool(true);
        w.write_string("ok");
        assert_eq!(w.into_vec(), vec![0, 0, 0, 3, 1, 0, 0, 0, 2, b'o', b'k']);
    }
}
