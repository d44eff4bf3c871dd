//! Plain-text digest rendering.
//!
//! ```text
//! [Daily Security Digest]
//! Time: 2025-06-10 12:00:00
//! Updates: 2
//! ==============================
//!
//! 1. @alice: new CVE writeup
//! 🔗 https://twitter.com/alice/status/1
//!
//! 2. ...
//! ```
use std::fmt::Write as _;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use vigil_common::IntelligenceItem;

/// Once the text grows past this many characters no further items are added.
pub const DIGEST_CEILING_CHARS: usize = 4000;

pub const TRUNCATION_MARKER: &str = "... (truncated, too many items)\n";

const HEADER_TIME: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Render `items` in order under a header.
///
/// The ceiling is checked after each item, so the item that crosses it is kept
/// and followed by [`TRUNCATION_MARKER`].
pub fn render_digest(items: &[IntelligenceItem], label: &str, now: OffsetDateTime) -> String {
    let stamp = now.format(HEADER_TIME).unwrap_or_else(|_| now.to_string());

    let mut out = String::with_capacity(DIGEST_CEILING_CHARS + 256);
    let _ = writeln!(out, "[{label} Security Digest]");
    let _ = writeln!(out, "Time: {stamp}");
    let _ = writeln!(out, "Updates: {}", items.len());
    out.push_str(&"=".repeat(30));
    out.push_str("\n\n");

    let mut chars = out.chars().count();
    for (i, item) in items.iter().enumerate() {
        let block = format!("{}. {}\n🔗 {}\n\n", i + 1, item.summary(), item.link());
        chars += block.chars().count();
        out.push_str(&block);

        if chars > DIGEST_CEILING_CHARS {
            out.push_str(TRUNCATION_MARKER);
            tracing::debug!(rendered = i + 1, total = items.len(), "onebot.digest.truncated");
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-06-10 08:05:09 UTC);

    fn item(i: usize, body_len: usize) -> IntelligenceItem {
        IntelligenceItem::new(
            format!("https://twitter.com/a/status/{i}"),
            format!("@a: {}", "x".repeat(body_len)),
        )
        .unwrap()
    }

    #[test]
    fn header_and_items_in_order() {
        let items = vec![item(1, 3), item(2, 3)];
        let text = render_digest(&items, "Daily", NOW);
        let expected = "[Daily Security Digest]\n\
                        Time: 2025-06-10 08:05:09\n\
                        Updates: 2\n\
                        ==============================\n\n\
                        1. @a: xxx\n🔗 https://twitter.com/a/status/1\n\n\
                        2. @a: xxx\n🔗 https://twitter.com/a/status/2\n\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn identical_input_renders_identically() {
        let items: Vec<_> = (0..50).map(|i| item(i, 120)).collect();
        assert_eq!(render_digest(&items, "L", NOW), render_digest(&items, "L", NOW));
    }

    #[test]
    fn truncates_after_the_item_that_crosses_the_ceiling() {
        let items: Vec<_> = (1..=40).map(|i| item(i, 200)).collect();

        // Find k, the first item whose block pushes the total past the ceiling.
        let header = render_digest(&[], "L", NOW).chars().count();
        let mut total = header;
        let mut k = 0;
        for (i, it) in items.iter().enumerate() {
            total += format!("{}. {}\n🔗 {}\n\n", i + 1, it.summary(), it.link()).chars().count();
            if total > DIGEST_CEILING_CHARS {
                k = i + 1;
                break;
            }
        }
        assert!(k > 0 && k < items.len());

        let text = render_digest(&items, "L", NOW);
        assert!(text.ends_with(TRUNCATION_MARKER));
        assert!(text.contains(&format!("\n{k}. @a:")));
        assert!(!text.contains(&format!("\n{}. @a:", k + 1)));
        assert!(text.contains("Updates: 40\n"));
    }

    #[test]
    fn ceiling_counts_characters_not_bytes() {
        // 900 chars but 2700 bytes each: four of them stay below 4000 characters.
        let wide = |i: usize| {
            IntelligenceItem::new(format!("https://t/{i}"), "界".repeat(900)).unwrap()
        };
        let items: Vec<_> = (1..=4).map(wide).collect();
        let text = render_digest(&items, "L", NOW);
        assert!(!text.contains(TRUNCATION_MARKER));
        assert!(text.contains("\n4. "));
    }
}
