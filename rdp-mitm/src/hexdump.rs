//! Tiny hexdump helper for the `-d/--debug` frame trace. The upstream
//! reference shells out to the `hexdump` Python module; this is a direct
//! column-formatted equivalent.

/// Render `data` as 16-bytes-per-line hex + ASCII gutter, matching the
/// classic `hexdump -C` layout closely enough for a debug trace.
pub fn render(data: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in data.chunks(16).enumerate() {
        out.push_str(&format!("{:08x}  ", row * 16));
        for (i, b) in chunk.iter().enumerate() {
            out.push_str(&format!("{b:02x} "));
            if i == 7 {
                out.push(' ');
            }
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push_str(" |");
        for b in chunk {
            let c = *b as char;
            out.push(if c.is_ascii_graphic() || c == ' ' { c } else { '.' });
        }
        out.push_str("|\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_ascii_gutter() {
        let out = render(b"hello");
        assert!(out.contains("|hello"));
        assert!(out.starts_with("00000000"));
    }

    #[test]
    fn empty_input_renders_nothing() {
        assert_eq!(render(&[]), "");
    }
}
