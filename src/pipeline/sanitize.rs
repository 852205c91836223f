//! Deterministic script sanitizer.
//!
//! Writer models pad their output with boilerplate ("Sure, here's..."),
//! trail off into meta-commentary, and sprinkle emoji into text meant to be
//! spoken aloud. All cleanup lives in this one table-driven pass applied
//! once at the end of the Generate stage; templates never filter anything
//! themselves.

/// Leading boilerplate stripped when the script starts with it
/// (case-insensitive). The remainder after the first line break or colon is
/// kept.
const STRIP_PREFIXES: &[&str] = &[
    "sure, here's",
    "sure thing",
    "here's a",
    "here's the",
    "here is",
    "of course",
    "script:",
];

/// Everything from the first occurrence of any of these markers onward is
/// dropped: the model has stopped speaking and started annotating.
const STOP_MARKERS: &[&str] = &[
    "\n---",
    "(note",
    "note:",
    "[note",
    "as an ai",
    "i hope this",
    "let me know",
    "```",
    "word count",
    "---\n",
    "*wink*",
    "(laughs",
];

/// Sanitize raw writer output into an on-air script.
///
/// Deterministic and idempotent: sanitizing a sanitized script is a no-op.
/// One pass can expose new boilerplate (a stripped prefix revealing
/// another), so the pass runs to a fixpoint; every step is length
/// non-increasing, so this terminates.
pub fn sanitize(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = sanitize_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn sanitize_once(raw: &str) -> String {
    let mut text = raw.trim();

    // Unwrap a fully quoted response
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = text[1..text.len() - 1].trim();
    }

    let mut owned = strip_prefix_boilerplate(text);

    // Truncate at the earliest stop condition
    if let Some(cut) = earliest_stop(&owned) {
        owned.truncate(cut);
    }

    // Collapse whitespace runs (including newlines) into single spaces
    let collapsed = owned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim().to_string()
}

fn strip_prefix_boilerplate(text: &str) -> String {
    // ASCII-only lowercasing keeps byte offsets aligned with the original
    let lower = text.to_ascii_lowercase();
    for prefix in STRIP_PREFIXES {
        if lower.starts_with(prefix) {
            // Keep whatever follows the boilerplate's colon or line break
            let rest = &text[prefix.len()..];
            if let Some(pos) = rest.find([':', '\n']) {
                return rest[pos + 1..].trim_start().to_string();
            }
            return String::new();
        }
    }
    text.to_string()
}

/// Byte offset of the earliest stop marker, emoji, or date stamp.
fn earliest_stop(text: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    let mut earliest: Option<usize> = None;
    let mut consider = |pos: Option<usize>| {
        if let Some(p) = pos {
            earliest = Some(earliest.map_or(p, |e| e.min(p)));
        }
    };

    for marker in STOP_MARKERS {
        consider(lower.find(marker));
    }
    consider(text.char_indices().find(|(_, c)| is_emoji(*c)).map(|(i, _)| i));
    consider(find_date_stamp(text));
    earliest
}

fn is_emoji(c: char) -> bool {
    matches!(u32::from(c),
        0x1F000..=0x1FAFF   // pictographs, emoticons, symbols
        | 0x2600..=0x27BF   // misc symbols and dingbats
        | 0x2190..=0x21FF   // arrows
        | 0xFE00..=0xFE0F   // variation selectors
        | 0x2B00..=0x2BFF)  // misc symbols and arrows
}

/// Find an obvious `YYYY-MM-DD` date stamp.
fn find_date_stamp(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.len() < 10 {
        return None;
    }
    for i in 0..=bytes.len() - 10 {
        let window = &bytes[i..i + 10];
        let shape_ok = window[0..4].iter().all(u8::is_ascii_digit)
            && window[4] == b'-'
            && window[5..7].iter().all(u8::is_ascii_digit)
            && window[7] == b'-'
            && window[8..10].iter().all(u8::is_ascii_digit);
        if shape_ok {
            return Some(i);
        }
    }
    None
}
