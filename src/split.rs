//! Splitting of chat text into broadcast-sized parts
//!
//! A client message may hold twice as much text as a broadcast. Long text is
//! cut into at most two parts, preferring the last whitespace before the limit.

/// Split `text` into one or two parts of at most `limit` characters each.
///
/// The backward whitespace scan starts at `limit - 1`. A whitespace split is
/// only taken when the remainder is shorter than `limit - 1`; otherwise the
/// text is cut hard at `limit`. Leading whitespace of the second part is
/// dropped, the second part is truncated to `limit`, and an empty second part
/// yields `None`.
pub fn split_message(text: &str, limit: usize) -> (String, Option<String>) {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    if len <= limit {
        return (text.to_string(), None);
    }

    let whitespace = (0..limit).rev().find(|&i| chars[i].is_whitespace());
    let split_at = match whitespace {
        Some(i) if len - i < limit - 1 => i,
        _ => limit,
    };

    let first: String = chars[..split_at].iter().collect();
    let second: String = chars[split_at..]
        .iter()
        .skip_while(|c| c.is_whitespace())
        .take(limit)
        .collect();

    (first, (!second.is_empty()).then_some(second))
}
