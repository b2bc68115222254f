/*!
 * Utility functions for btrfs-diff
 */

/// Truncate a string to `max_len` characters, appending an ellipsis
pub fn ellipsis(s: &str, max_len: usize) -> String {
    let max_len = max_len.max(3);
    let count = s.chars().count();
    if count <= max_len {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_len - 3).collect();
    format!("{}...", truncated)
}

/// Encode bytes as a lowercase hex string
pub fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
