//! Service Indication (SI) push compiler (§4.J). Grounded on
//! `gw/wap_push_si_compiler.c`: the element/attribute tables, the
//! `href` prefix/suffix tokenization, and the nibble-packed date
//! encoding for `created`/`si-expires`.

use super::{charset, encode_element, header, write_opaque, write_str_i, TokenTable, XmlElement};

const VERSION: u8 = 0x02; // WBXML 1.2
const PUBLIC_ID: u8 = 0x05; // SI 1.0

const ELEMENTS: &[(&str, u8)] = &[
    ("si", 0x05),
    ("indication", 0x06),
    ("info", 0x07),
    ("item", 0x08),
];

/// `action` attribute values map directly to a fixed token with no
/// payload — the value itself is implied by the token.
const ACTIONS: &[(&str, u8)] = &[
    ("signal-none", 0x05),
    ("signal-low", 0x06),
    ("signal-medium", 0x07),
    ("signal-high", 0x08),
    ("delete", 0x09),
];

/// `href` URL prefixes, longest match wins, checked in this order.
const HREF_PREFIXES: &[(&str, u8)] = &[
    ("https://www.", 0x0f),
    ("http://www.", 0x0d),
    ("https://", 0x0e),
    ("http://", 0x0c),
];

const HREF_NO_PREFIX: u8 = 0x0b;

/// `href` URL suffixes applied to the string left over after the
/// prefix is stripped. The source matches these anywhere a known
/// suffix occurs, not only at the very end; the first table entry
/// found in the remainder wins.
const HREF_SUFFIXES: &[(&str, u8)] = &[(".com/", 0x85), (".edu/", 0x86), (".net/", 0x87), (".org/", 0x88)];

const ATTR_CREATED: u8 = 0x0a;
const ATTR_SI_EXPIRES: u8 = 0x10;
const ATTR_SI_ID: u8 = 0x11;
const ATTR_CLASS: u8 = 0x12;

struct SiTable;

impl TokenTable for SiTable {
    fn element_token(&self, name: &str) -> Option<u8> {
        ELEMENTS.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
    }

    fn encode_attribute(&self, out: &mut Vec<u8>, name: &str, value: &str) -> bool {
        match name {
            "action" => match ACTIONS.iter().find(|(v, _)| *v == value) {
                Some((_, token)) => {
                    out.push(*token);
                    true
                }
                None => false,
            },
            "href" => {
                encode_href(out, value);
                true
            }
            "created" => {
                out.push(ATTR_CREATED);
                write_opaque(out, &encode_date(value));
                true
            }
            "si-expires" => {
                out.push(ATTR_SI_EXPIRES);
                write_opaque(out, &encode_date(value));
                true
            }
            "si-id" => {
                out.push(ATTR_SI_ID);
                write_str_i(out, value);
                true
            }
            "class" => {
                out.push(ATTR_CLASS);
                write_str_i(out, value);
                true
            }
            _ => false,
        }
    }
}

fn encode_href(out: &mut Vec<u8>, value: &str) {
    let (token, rest) = match HREF_PREFIXES.iter().find(|(prefix, _)| value.starts_with(prefix)) {
        Some((prefix, token)) => (*token, &value[prefix.len()..]),
        None => (HREF_NO_PREFIX, value),
    };
    out.push(token);

    match HREF_SUFFIXES.iter().find(|(suffix, _)| rest.contains(suffix)) {
        Some((suffix, suffix_token)) => {
            let cut = rest.find(suffix).expect("contains implies find");
            write_str_i(out, &rest[..cut]);
            out.push(*suffix_token);
        }
        None => write_str_i(out, rest),
    }
}

/// Packs a date string's digits (year-month-day-hour-minute-second,
/// in that order) two per byte, dropping trailing zero NIBBLES
/// before packing — an intentional divergence from the grounding
/// source, which only drops trailing zero BYTES. A short digit run
/// left with an odd nibble count is padded with a zero low nibble.
fn encode_date(value: &str) -> Vec<u8> {
    let mut nibbles: Vec<u8> = value.chars().filter_map(|c| c.to_digit(10)).map(|d| d as u8).collect();

    while nibbles.last() == Some(&0) {
        nibbles.pop();
    }

    if nibbles.len() % 2 != 0 {
        nibbles.push(0);
    }

    nibbles.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect()
}

/// Compiles an SI push document tree into its WBXML byte encoding
/// (`charset` is accepted but always normalized to UTF-8, per the
/// preserved source quirk — see [`charset::resolve`]).
pub fn compile(root: &XmlElement, charset_name: &str) -> Vec<u8> {
    let mut out = header(VERSION, PUBLIC_ID, charset::resolve(charset_name));
    encode_element(root, &SiTable, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wbxml::XmlNode;

    #[test]
    fn header_uses_si_public_id_and_version() {
        let tree = XmlElement::new("si");
        let encoded = compile(&tree, "UTF-8");
        assert_eq!(&encoded[..4], &[0x02, 0x05, 0x6A, 0x00]);
    }

    #[test]
    fn action_attribute_maps_to_fixed_token_with_no_payload() {
        let tree = XmlElement::new("indication").attr("action", "signal-high");
        let encoded = compile(&tree, "UTF-8");
        assert_eq!(encoded[4], 0x06 | 0x80); // indication token with ATTR_BIT
        assert_eq!(encoded[5], 0x08);
        assert_eq!(encoded[6], 0x01); // END closing the attribute list
    }

    #[test]
    fn href_matches_longest_known_prefix_and_suffix() {
        let mut out = Vec::new();
        encode_href(&mut out, "https://www.example.com/path");
        assert_eq!(out[0], 0x0f);
        assert_eq!(out[1], 0x03); // STR_I
        assert!(out[2..].starts_with(b"example"));
        assert!(out.ends_with(&[0x85]));
    }

    #[test]
    fn href_without_known_prefix_or_suffix_is_inlined_whole() {
        let mut out = Vec::new();
        encode_href(&mut out, "ftp://example.invalid/x");
        assert_eq!(out[0], HREF_NO_PREFIX);
        assert_eq!(out[1], 0x03);
        assert!(out[2..].starts_with(b"ftp://example.invalid/x\0"));
    }

    #[test]
    fn date_encoding_drops_trailing_zero_nibbles() {
        // 2026-07-27T00:00:00 -> digits "20260727000000" -> trim
        // trailing zero nibbles down to "20260727" (8 nibbles, even).
        let packed = encode_date("2026-07-27T00:00:00Z");
        assert_eq!(packed, vec![0x20, 0x26, 0x07, 0x27]);
    }

    #[test]
    fn date_encoding_pads_odd_nibble_count() {
        // digits "2026071" (7 digits) -> no trailing zero to trim off
        // the very last nibble (1), so pad with a zero low nibble.
        let packed = encode_date("2026-07-1");
        assert_eq!(packed, vec![0x20, 0x26, 0x07, 0x10]);
    }

    #[test]
    fn created_and_si_expires_use_opaque_nibble_packed_dates() {
        let tree = XmlElement::new("si").attr("created", "2026-07-27T00:00:00Z");
        let encoded = compile(&tree, "UTF-8");
        assert_eq!(encoded[5], ATTR_CREATED);
        assert_eq!(encoded[6], 0xC3); // OPAQUE
        assert_eq!(encoded[7], 4); // payload length
        assert_eq!(&encoded[8..12], &[0x20, 0x26, 0x07, 0x27]);
    }

    #[test]
    fn si_id_and_class_are_plain_inline_strings() {
        let tree = XmlElement::new("si").attr("si-id", "msg-1").attr("class", "alert");
        let encoded = compile(&tree, "UTF-8");
        assert_eq!(encoded[5], ATTR_SI_ID);
        assert_eq!(encoded[6], 0x03);
        assert!(encoded[7..].starts_with(b"msg-1\0"));
    }

    #[test]
    fn whole_document_round_trip_byte_shape() {
        let tree = XmlElement::new("si").child(XmlNode::Element(
            XmlElement::new("indication")
                .attr("href", "http://www.example.org/x")
                .attr("action", "signal-medium")
                .text("New message"),
        ));
        let encoded = compile(&tree, "UTF-8");
        assert!(!encoded.is_empty());
        assert_eq!(&encoded[..4], &[0x02, 0x05, 0x6A, 0x00]);
    }
}
