/// Render raw directory-entry bytes for terminal output. No PETSCII
/// conversion is attempted; printable ASCII passes through, the shifted
/// space (0xA0) becomes a plain space, everything else becomes a dot.
pub fn printable(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| match *b {
            0xA0 => ' ',
            c @ 0x20..=0x7E => c as char,
            _ => '.',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable() {
        assert_eq!(printable(b"HELLO"), "HELLO");
        assert_eq!(printable(b"A\xA0B"), "A B");
        assert_eq!(printable(&[0x01, 0x41, 0xFF]), ".A.");
    }
}
