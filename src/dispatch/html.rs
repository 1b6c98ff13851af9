//! Minimal HTML/WML-to-text reducer for service replies (§4.H step
//! 7). Not a renderer: strips tags, decodes the five XML entities
//! plus numeric character references, and collapses whitespace.
//!
//! Grounded on `gw/smsbox_req.c`'s `convert_tags_to_newlines`-style
//! reply massaging, generalized into one pass.

/// Strips markup and decodes entities, leaving plain text with
/// whitespace runs collapsed to single spaces and ends trimmed.
pub fn html_to_sms(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_tag = false;

    while let Some(c) = chars.next() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            '&' if !in_tag => {
                let mut entity = String::new();
                let mut consumed = Vec::new();
                while let Some(&next) = chars.peek() {
                    if next == ';' || entity.len() > 8 {
                        break;
                    }
                    entity.push(next);
                    consumed.push(next);
                    chars.next();
                }
                if chars.peek() == Some(&';') {
                    chars.next();
                    out.push_str(&decode_entity(&entity).unwrap_or_else(|| {
                        let mut s = String::from("&");
                        s.push_str(&entity);
                        s.push(';');
                        s
                    }));
                } else {
                    out.push('&');
                    out.push_str(&entity);
                }
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }

    collapse_whitespace(&out)
}

fn decode_entity(name: &str) -> Option<String> {
    match name {
        "amp" => Some("&".to_string()),
        "lt" => Some("<".to_string()),
        "gt" => Some(">".to_string()),
        "quot" => Some("\"".to_string()),
        "apos" => Some("'".to_string()),
        _ => {
            let codepoint = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()));
            codepoint.and_then(char::from_u32).map(String::from)
        }
    }
}

fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;
    for c in input.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        assert_eq!(html_to_sms("<p>Hello   <b>World</b></p>"), "Hello World");
    }

    #[test]
    fn decodes_named_entities() {
        assert_eq!(html_to_sms("Tom &amp; Jerry &lt;3&gt;"), "Tom & Jerry <3>");
    }

    #[test]
    fn decodes_numeric_character_references() {
        assert_eq!(html_to_sms("&#65;&#x42;"), "AB");
    }

    #[test]
    fn unknown_entity_passes_through_unescaped() {
        assert_eq!(html_to_sms("a &nbsp; b"), "a &nbsp; b");
    }

    #[test]
    fn trims_leading_and_trailing_whitespace() {
        assert_eq!(html_to_sms("  <div>\n  hi \n</div>  "), "hi");
    }
}
