//! Value conversions used by the indicator interpreter.

use feed_schema::{Directive, LikertBucket};

/// Render a number the way a `%d` directive with flags and width would.
pub fn format_number(directive: &Directive, value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let sign = if value < 0 {
        "-"
    } else if directive.plus {
        "+"
    } else {
        ""
    };
    let len = sign.len() + digits.len();
    let pad = directive.width.saturating_sub(len);
    if directive.left {
        format!("{sign}{digits}{}", " ".repeat(pad))
    } else if directive.zero {
        format!("{sign}{}{digits}", "0".repeat(pad))
    } else {
        format!("{}{sign}{digits}", " ".repeat(pad))
    }
}

/// Render text the way a `%s` directive with a width would. Text is never
/// truncated here.
pub fn format_text(directive: &Directive, text: &str) -> String {
    let pad = directive.width.saturating_sub(text.chars().count());
    if directive.left {
        format!("{text}{}", " ".repeat(pad))
    } else {
        format!("{}{text}", " ".repeat(pad))
    }
}

/// Label for a value, or an empty string when the value indexes nothing.
pub fn label(labels: &[String], value: i32) -> &str {
    usize::try_from(value)
        .ok()
        .and_then(|index| labels.get(index))
        .map(String::as_str)
        .unwrap_or("")
}

/// Character stat notation: plain up to 18, then `18/bonus`.
pub fn stat(value: i32) -> String {
    if value <= 18 {
        value.to_string()
    } else {
        format!("18/{}", value - 18)
    }
}

/// The bucket with the greatest threshold not above `value`.
///
/// Buckets are ascending, so the scan stops at the first threshold past the
/// value. Values below the lowest threshold have no bucket.
pub fn likert(buckets: &[LikertBucket], value: i32) -> Option<&LikertBucket> {
    buckets
        .iter()
        .take_while(|bucket| bucket.threshold <= value)
        .last()
}

/// Truncate to `width` characters. A zero width leaves the text whole.
pub fn cut(text: &str, width: u16) -> &str {
    if width == 0 {
        return text;
    }
    match text.char_indices().nth(width as usize) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
