//! Issue ID encoding: fixed-width base36 suffixes and hierarchical IDs.
//!
//! Canonical ids look like `bd-000001`; hierarchical child ids append
//! dotted positive integers (`bd-000001.2`). Suffixes encode a monotonic
//! per-store counter, so a case-insensitive lexicographic sort of ids
//! equals creation order.

/// Base36 alphabet (0-9, a-z).
const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Width of the encoded suffix. Six base36 digits cover ~2.1 billion ids
/// while keeping the fixed width that lexicographic ordering needs.
pub const SUFFIX_WIDTH: usize = 6;

/// Prefix marking a cross-repo reference (`external:<project>:<capability>`).
pub const EXTERNAL_REF_PREFIX: &str = "external:";

/// Encodes a counter value as fixed-width lowercase base36.
pub fn encode_base36(mut value: u64, width: usize) -> String {
    let mut chars: Vec<u8> = Vec::with_capacity(width);
    while value > 0 {
        chars.push(BASE36_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    while chars.len() < width {
        chars.push(b'0');
    }
    chars.reverse();
    // A counter past the width would break sort order; keep the least
    // significant digits rather than panic.
    if chars.len() > width {
        chars.drain(..chars.len() - width);
    }
    String::from_utf8(chars).expect("base36 chars are valid UTF-8")
}

/// Formats a canonical id from a prefix and a counter value.
pub fn format_id(prefix: &str, seq: u64) -> String {
    format!("{}-{}", prefix, encode_base36(seq, SUFFIX_WIDTH))
}

/// Returns `true` if the id is an external reference rather than a local
/// issue id.
pub fn is_external_ref(id: &str) -> bool {
    id.starts_with(EXTERNAL_REF_PREFIX)
}

/// Builds the hierarchical child id `parent.n`.
pub fn child_id(parent: &str, n: u32) -> String {
    format!("{parent}.{n}")
}

/// Returns the parent portion of a hierarchical id, or `None` for roots.
///
/// Only the final dotted segment is stripped, and only when it is a
/// positive integer: `bd-000001.2.1` -> `bd-000001.2`.
pub fn parent_of(id: &str) -> Option<&str> {
    let (head, tail) = id.rsplit_once('.')?;
    if is_child_ordinal(tail) { Some(head) } else { None }
}

/// Parses the child ordinal of a hierarchical id (`bd-000001.3` -> 3).
pub fn child_ordinal(id: &str) -> Option<u32> {
    let (_, tail) = id.rsplit_once('.')?;
    if is_child_ordinal(tail) {
        tail.parse().ok()
    } else {
        None
    }
}

/// Returns `true` if `id` is a direct hierarchical child of `parent`:
/// `parent.N` with integer N and no further dots.
pub fn is_direct_child(id: &str, parent: &str) -> bool {
    id.strip_prefix(parent)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(is_child_ordinal)
}

fn is_child_ordinal(s: &str) -> bool {
    !s.is_empty() && s != "0" && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_base36_zero_pads() {
        assert_eq!(encode_base36(0, 6), "000000");
        assert_eq!(encode_base36(1, 6), "000001");
        assert_eq!(encode_base36(35, 6), "00000z");
        assert_eq!(encode_base36(36, 6), "000010");
    }

    #[test]
    fn encode_base36_is_monotonic_lexicographically() {
        let mut prev = encode_base36(0, SUFFIX_WIDTH);
        for v in 1..200u64 {
            let cur = encode_base36(v, SUFFIX_WIDTH);
            assert!(prev < cur, "{prev} should sort before {cur}");
            prev = cur;
        }
    }

    #[test]
    fn format_id_shape() {
        assert_eq!(format_id("bd", 1), "bd-000001");
        assert_eq!(format_id("app", 37), "app-000011");
    }

    #[test]
    fn external_ref_detection() {
        assert!(is_external_ref("external:beads:login"));
        assert!(!is_external_ref("bd-000001"));
    }

    #[test]
    fn hierarchical_parent() {
        assert_eq!(parent_of("bd-000001.2"), Some("bd-000001"));
        assert_eq!(parent_of("bd-000001.2.1"), Some("bd-000001.2"));
        assert_eq!(parent_of("bd-000001"), None);
        // Non-numeric tails are not child markers.
        assert_eq!(parent_of("bd-abc.def"), None);
    }

    #[test]
    fn hierarchical_ordinal() {
        assert_eq!(child_ordinal("bd-000001.3"), Some(3));
        assert_eq!(child_ordinal("bd-000001"), None);
        assert_eq!(child_ordinal("bd-000001.0"), None);
    }

    #[test]
    fn direct_child_check() {
        assert!(is_direct_child("bd-000001.1", "bd-000001"));
        assert!(is_direct_child("bd-000001.12", "bd-000001"));
        assert!(!is_direct_child("bd-000001.1.2", "bd-000001"));
        assert!(!is_direct_child("bd-000001", "bd-000001"));
        assert!(!is_direct_child("bd-0000012.1", "bd-000001"));
    }

    #[test]
    fn child_id_roundtrip() {
        let id = child_id("bd-000001", 4);
        assert_eq!(id, "bd-000001.4");
        assert_eq!(parent_of(&id), Some("bd-000001"));
        assert_eq!(child_ordinal(&id), Some(4));
    }
}
