//! Telegram HTML helpers and report number formatting.

use chrono::{DateTime, Utc};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Split a message into chunks of at most `limit` bytes, breaking on line boundaries.
///
/// Callers build listings line by line with balanced tags per line, so line breaks are
/// always safe split points. A single line longer than `limit` loses its tags and is cut
/// between entities, so no chunk ever carries unbalanced markup.
pub fn split_html_chunks(html: &str, limit: usize) -> Vec<String> {
    if html.len() <= limit || limit == 0 {
        return vec![html.to_string()];
    }

    let mut out = Vec::new();
    let mut chunk = String::new();

    for line in html.split('\n') {
        let sep = usize::from(!chunk.is_empty());
        if chunk.len() + sep + line.len() <= limit {
            if sep == 1 {
                chunk.push('\n');
            }
            chunk.push_str(line);
            continue;
        }

        if !chunk.is_empty() {
            out.push(std::mem::take(&mut chunk));
        }

        if line.len() <= limit {
            chunk.push_str(line);
            continue;
        }

        let plain = strip_tags(line);
        let mut rest = plain.as_str();
        while rest.len() > limit {
            let (head, tail) = split_outside_entity(rest, limit);
            if head.is_empty() {
                break;
            }
            out.push(head.to_string());
            rest = tail;
        }
        chunk.push_str(rest);
    }

    if !chunk.trim().is_empty() {
        out.push(chunk);
    }
    out
}

/// Drop every `<...>` tag, keeping escaped text as is.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Like [`split_utf8_prefix`], but never cuts through an `&...;` entity.
fn split_outside_entity(s: &str, max_bytes: usize) -> (&str, &str) {
    let (head, _) = split_utf8_prefix(s, max_bytes);
    if let Some(amp) = head.rfind('&') {
        if amp > 0 && !head[amp..].contains(';') {
            return s.split_at(amp);
        }
    }
    split_utf8_prefix(s, head.len())
}

fn split_utf8_prefix(s: &str, max_bytes: usize) -> (&str, &str) {
    if s.len() <= max_bytes {
        return (s, "");
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.split_at(end)
}

pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

/// `1234567` -> `1,234,567`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Whole mebibytes, rounded to nearest.
pub fn format_memory(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    format!("{}MB", (bytes + MIB / 2) / MIB)
}

/// `<hours>h <minutes>m`; hours are not wrapped into days.
pub fn format_uptime(seconds: u64) -> String {
    format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
}

pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_date(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn escapes_html() {
        let s = r#"<a href="x&y">"#;
        assert_eq!(escape_html(s), "&lt;a href=&quot;x&amp;y&quot;&gt;");
    }

    #[test]
    fn short_messages_are_not_split() {
        assert_eq!(split_html_chunks("hello", 10), vec!["hello"]);
    }

    #[test]
    fn splits_on_line_boundaries() {
        let lines: Vec<String> = (0..50).map(|i| format!("<code>KEY{i:04}</code>")).collect();
        let html = lines.join("\n");
        let chunks = split_html_chunks(&html, 100);

        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.len() <= 100);
            assert_eq!(c.matches("<code>").count(), c.matches("</code>").count());
        }
        assert_eq!(chunks.join("\n"), html);
    }

    #[test]
    fn oversized_line_is_cut_at_char_boundaries() {
        let line = "é".repeat(30);
        let chunks = split_html_chunks(&line, 7);
        assert!(chunks.iter().all(|c| c.len() <= 7));
        assert_eq!(chunks.concat(), line);
    }

    #[test]
    fn oversized_markup_line_never_leaves_open_tags_or_split_entities() {
        let html = format!(
            "<b>Log</b>\n• {} | <code>{}</code>\n• short",
            "x".repeat(10),
            escape_html(&"<".repeat(1200))
        );
        let chunks = split_html_chunks(&html, 1000);

        assert!(chunks.len() > 2);
        for c in &chunks {
            assert!(c.len() <= 1000);
            assert_eq!(c.matches("<code>").count(), c.matches("</code>").count());
            let tail = c.rsplit('&').next().unwrap_or("");
            assert!(!c.contains('&') || tail.contains(';'), "cut entity in {c:?}");
            assert!(!c.starts_with("lt;"));
        }
        assert_eq!(chunks[0], "<b>Log</b>");
        assert!(chunks.iter().all(|c| !c.contains("<code>")));
        assert!(chunks.last().is_some_and(|c| c.ends_with("\n• short")));
    }

    #[test]
    fn truncates_by_chars() {
        assert_eq!(truncate_text("abcdef", 3), "abc...");
        assert_eq!(truncate_text("ñandú", 10), "ñandú");
    }

    #[test]
    fn report_numbers() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
        assert_eq!(format_memory(5 * 1024 * 1024 + 10), "5MB");
        assert_eq!(format_memory(5 * 1024 * 1024 + 600 * 1024), "6MB");
        assert_eq!(format_uptime(0), "0h 0m");
        assert_eq!(format_uptime(90_061), "25h 1m");
    }

    #[test]
    fn timestamps_are_utc() {
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(t), "2026-01-02 03:04:05 UTC");
        assert_eq!(format_date(t), "2026-01-02");
    }
}
