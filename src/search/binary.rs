/// Bytes inspected when deciding whether a file is binary.
pub const BINARY_WINDOW: usize = 512;

/// A NUL anywhere in the first [`BINARY_WINDOW`] bytes marks the file as binary.
/// Single `memchr` pass over the window.
pub fn is_binary(buf: &[u8]) -> bool {
    let window = &buf[..buf.len().min(BINARY_WINDOW)];
    memchr::memchr(0, window).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_not_binary() {
        assert!(!is_binary(b"plain text\nwith lines\n"));
        assert!(!is_binary(b""));
    }

    #[test]
    fn nul_in_window_is_binary() {
        assert!(is_binary(b"abc\0def"));
    }

    #[test]
    fn nul_past_window_is_ignored() {
        let mut buf = vec![b'a'; BINARY_WINDOW];
        buf.push(0);
        assert!(!is_binary(&buf));
    }
}
