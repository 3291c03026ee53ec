/// Renders up to the first `max_bytes` of `data` as a space-separated hex
/// string, with a trailing `"... (N more)"` marker when truncated. Used in
/// trace logging when a codec step fails, so a dropped connection leaves
/// something a developer can paste into a hex editor.
pub fn hex_dump(data: &[u8], max_bytes: usize) -> String {
    let shown = &data[..data.len().min(max_bytes)];
    let mut out = String::with_capacity(shown.len() * 3);
    for (i, byte) in shown.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    if data.len() > max_bytes {
        out.push_str(&format!(" ... ({} more)", data.len() - max_bytes));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_buffer_is_shown_in_full() {
        assert_eq!(hex_dump(&[0x01, 0xff, 0x00], 16), "01 ff 00");
    }

    #[test]
    fn long_buffer_is_truncated_with_a_count() {
        let data = vec![0xab; 20];
        let dumped = hex_dump(&data, 4);
        assert_eq!(dumped, "ab ab ab ab ... (16 more)");
    }

    #[test]
    fn empty_buffer_is_empty_string() {
        assert_eq!(hex_dump(&[], 16), "");
    }
}
