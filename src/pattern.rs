//! The URL-translation pattern mini-DSL (§4.G, §4.H step 4). Patterns
//! are compiled once at configuration load time into a flat list of
//! literal/placeholder segments (the pre-compiled-segment redesign
//! named in the design notes, §9), so the dispatch hot path is a
//! linear emit loop rather than a string scan per message.
//!
//! Grounded on `gw/urltrans.c`'s `urltrans_get_pattern`.

use std::time::SystemTime;

use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderKind {
    /// %k - the keyword (first word).
    Keyword,
    /// %s - next positional argument, URL-encoded.
    NextArg,
    /// %S - next positional argument, raw, '*' rewritten to '~'.
    NextArgRaw,
    /// %r - all remaining positional args, '+'-joined, URL-encoded.
    RemainingArgs,
    /// %a - all positional args, '+'-joined, URL-encoded.
    AllArgs,
    /// %p - receiver MSISDN, URL-encoded.
    Receiver,
    /// %P - sender MSISDN, URL-encoded.
    Sender,
    /// %q - like %p but a leading "00" becomes "%2B".
    ReceiverPlus,
    /// %Q - like %P but a leading "00" becomes "%2B".
    SenderPlus,
    /// %t - origin time, "YYYY-MM-DD+HH:MM" UTC.
    Time,
    /// %% - literal '%'.
    Percent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSegment {
    Literal(String),
    Placeholder(PlaceholderKind),
}

/// Compiles a pattern string into segments once. Unknown `%x`
/// sequences pass the two characters through literally (the source's
/// "unknown passthrough" behaviour, applied so a future placeholder
/// letter doesn't silently swallow input).
pub fn compile(pattern: &str) -> Vec<PatternSegment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        let Some(&code) = chars.peek() else {
            literal.push('%');
            break;
        };
        let kind = match code {
            'k' => Some(PlaceholderKind::Keyword),
            's' => Some(PlaceholderKind::NextArg),
            'S' => Some(PlaceholderKind::NextArgRaw),
            'r' => Some(PlaceholderKind::RemainingArgs),
            'a' => Some(PlaceholderKind::AllArgs),
            'p' => Some(PlaceholderKind::Receiver),
            'P' => Some(PlaceholderKind::Sender),
            'q' => Some(PlaceholderKind::ReceiverPlus),
            'Q' => Some(PlaceholderKind::SenderPlus),
            't' => Some(PlaceholderKind::Time),
            '%' => Some(PlaceholderKind::Percent),
            _ => None,
        };
        match kind {
            Some(kind) => {
                chars.next();
                if !literal.is_empty() {
                    segments.push(PatternSegment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(PatternSegment::Placeholder(kind));
            }
            None => {
                literal.push('%');
                literal.push(code);
                chars.next();
            }
        }
    }
    if !literal.is_empty() {
        segments.push(PatternSegment::Literal(literal));
    }
    segments
}

/// RFC 2396 percent-encoding: the unreserved set is
/// `;/?:@&=+$,-_.!~*'()` plus alphanumerics; everything else becomes
/// `%HH` (uppercase hex).
///
/// The grounding source's `encode_for_url`, read literally, encodes
/// only that punctuation set and leaves alphanumerics (and everything
/// else) untouched — the inverse of RFC 2396. This isn't a named open
/// question, and §8 invariant 6 (idempotent on already-safe strings,
/// ASCII-only output) only holds for the correct behaviour, so that's
/// what's implemented here.
pub fn encode_for_url(input: &str) -> String {
    const UNRESERVED_PUNCT: &[u8] = b";/?:@&=+$,-_.!~*'()";
    let mut out = String::with_capacity(input.len());
    for byte in input.as_bytes() {
        let b = *byte;
        let is_unreserved =
            b.is_ascii_alphanumeric() || UNRESERVED_PUNCT.contains(&b);
        if is_unreserved {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// %S: raw positional argument with '*' rewritten to '~'.
pub fn raw_star_to_tilde(input: &str) -> String {
    input.replace('*', "~")
}

/// %q/%Q: URL-encoded MSISDN, with a leading "00" international
/// prefix rewritten to the URL-encoded '+' ("%2B").
pub fn encode_msisdn_plus(input: &str) -> String {
    if let Some(rest) = input.strip_prefix("00") {
        format!("%2B{}", encode_for_url(rest))
    } else {
        encode_for_url(input)
    }
}

pub struct ExpandContext<'a> {
    pub keyword: &'a str,
    pub args: &'a [String],
    pub receiver: &'a str,
    pub sender: &'a str,
    pub time: SystemTime,
}

/// %t: origin time formatted "YYYY-MM-DD+HH:MM" UTC, via `time`
/// rather than hand-rolled calendar math (mirrors the teacher's own
/// `OffsetDateTime::from_unix_timestamp` + manual field formatting in
/// `storage/raw_archiver.rs::format_date`).
fn format_time_utc(time: SystemTime) -> String {
    let secs = time
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let dt = OffsetDateTime::from_unix_timestamp(secs).unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let date = dt.date();
    format!(
        "{:04}-{:02}-{:02}+{:02}:{:02}",
        date.year(),
        date.month() as u8,
        date.day(),
        dt.hour(),
        dt.minute()
    )
}

/// Expands a compiled pattern against one inbound message's context.
/// `%s`/`%S` consume positional args left-to-right via a shared
/// cursor; `%r` consumes the rest from wherever the cursor is.
pub fn expand(segments: &[PatternSegment], ctx: &ExpandContext) -> String {
    let mut out = String::new();
    let mut next_arg = 0usize;
    for seg in segments {
        match seg {
            PatternSegment::Literal(s) => out.push_str(s),
            PatternSegment::Placeholder(kind) => match kind {
                PlaceholderKind::Keyword => out.push_str(ctx.keyword),
                PlaceholderKind::NextArg => {
                    if let Some(a) = ctx.args.get(next_arg) {
                        out.push_str(&encode_for_url(a));
                        next_arg += 1;
                    }
                }
                PlaceholderKind::NextArgRaw => {
                    if let Some(a) = ctx.args.get(next_arg) {
                        out.push_str(&raw_star_to_tilde(a));
                        next_arg += 1;
                    }
                }
                PlaceholderKind::RemainingArgs => {
                    let joined = ctx.args[next_arg.min(ctx.args.len())..].join("+");
                    out.push_str(&encode_for_url(&joined));
                    next_arg = ctx.args.len();
                }
                PlaceholderKind::AllArgs => {
                    let joined = ctx.args.join("+");
                    out.push_str(&encode_for_url(&joined));
                }
                PlaceholderKind::Receiver => out.push_str(&encode_for_url(ctx.receiver)),
                PlaceholderKind::Sender => out.push_str(&encode_for_url(ctx.sender)),
                PlaceholderKind::ReceiverPlus => out.push_str(&encode_msisdn_plus(ctx.receiver)),
                PlaceholderKind::SenderPlus => out.push_str(&encode_msisdn_plus(ctx.sender)),
                PlaceholderKind::Time => out.push_str(&format_time_utc(ctx.time)),
                PlaceholderKind::Percent => out.push('%'),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_for_url_is_rfc2396_correct() {
        assert_eq!(encode_for_url("hi there"), "hi%20there");
        assert_eq!(encode_for_url("abcXYZ019"), "abcXYZ019");
        assert_eq!(encode_for_url(";/?:@&=+$,-_.!~*'()"), ";/?:@&=+$,-_.!~*'()");
    }

    #[test]
    fn encode_for_url_is_idempotent_on_safe_strings_and_ascii_only() {
        let safe = "already-safe_string.42";
        assert_eq!(encode_for_url(safe), safe);
        let encoded = encode_for_url("caf\u{e9}"); // 'é' multi-byte in UTF-8
        assert!(encoded.is_ascii());
    }

    #[test]
    fn s1_scenario_echo_pattern() {
        let segments = compile("you said %s %s");
        let ctx = ExpandContext {
            keyword: "echo",
            args: &["hi".to_string(), "there".to_string()],
            receiver: "111",
            sender: "222",
            time: SystemTime::now(),
        };
        assert_eq!(expand(&segments, &ctx), "you said hi there");
    }

    #[test]
    fn msisdn_plus_rewrites_leading_00() {
        assert_eq!(encode_msisdn_plus("00358401234567"), "%2B358401234567");
        assert_eq!(encode_msisdn_plus("358401234567"), "358401234567");
    }

    #[test]
    fn percent_literal_and_unknown_passthrough() {
        let segments = compile("100%% done %x");
        assert_eq!(
            segments,
            vec![
                PatternSegment::Literal("100".to_string()),
                PatternSegment::Placeholder(PlaceholderKind::Percent),
                PatternSegment::Literal(" done %x".to_string()),
            ]
        );
    }

    #[test]
    fn time_placeholder_formats_utc() {
        let t = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        assert_eq!(format_time_utc(t), "2023-11-14+22:13");
    }
}
