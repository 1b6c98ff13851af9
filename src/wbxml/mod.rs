//! WBXML tokenizer (§4.J): two micro-codecs (OTA, SI) sharing one
//! skeleton — a recursive walk over an in-house XML tree producing a
//! binary token stream. XML parsing itself is out of scope; callers
//! build an [`XmlElement`] tree directly (e.g. from a provisioning
//! template already rendered by the dispatcher), which is what both
//! `ota_compile`/`si_compile` operate on once `libxml2` has parsed
//! their document.
//!
//! Grounded on `gw/xml_shared.c` (the shared framing/encoding
//! helpers) and `gw/ota_compiler.c`/`gw/wap_push_si_compiler.c` (the
//! two per-document-type tables and element/attribute walks).

pub mod charset;
pub mod ota;
pub mod si;

/// One node in a provisioning-document tree: either an element with
/// attributes and children, or a text run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    /// Attribute order matters: it's preserved exactly as given,
    /// matching the source's in-order `node->properties` walk.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        XmlElement { name: name.into(), attrs: Vec::new(), children: Vec::new() }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, node: XmlNode) -> Self {
        self.children.push(node);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }
}

const END: u8 = 0x01;
const STR_I: u8 = 0x03;
const LITERAL: u8 = 0x04;
const OPAQUE: u8 = 0xC3;
const CONTENT_BIT: u8 = 0x40;
const ATTR_BIT: u8 = 0x80;

/// Something that knows one document type's fixed element/attribute
/// token tables. An unrecognized element or attribute name falls
/// back to the same uniform LITERAL/inline-string encoding in both
/// cases (§4.J) — the fallback itself lives in [`encode_element`],
/// not in implementations of this trait.
pub trait TokenTable {
    fn element_token(&self, name: &str) -> Option<u8>;

    /// Encodes one attribute directly into `out` (its token byte plus
    /// any payload the table's encoding calls for). Returns `false`
    /// when the name/value pair isn't recognized, so the caller can
    /// fall back to LITERAL.
    fn encode_attribute(&self, out: &mut Vec<u8>, name: &str, value: &str) -> bool;
}

/// WBXML multi-byte uint32: 7 bits per byte, most-significant group
/// first, continuation bit (0x80) set on every byte but the last.
pub fn encode_uintvar(value: u32) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7F) as u8];
    let mut rest = value >> 7;
    while rest > 0 {
        bytes.push((rest & 0x7F) as u8);
        rest >>= 7;
    }
    bytes.reverse();
    let last = bytes.len() - 1;
    for b in &mut bytes[..last] {
        *b |= 0x80;
    }
    bytes
}

/// The document header: version byte, public-id byte, charset as a
/// multi-byte uint32, then a zero-length string table (§4.J: this
/// crate never builds one).
pub fn header(version: u8, public_id: u8, charset_mib: u32) -> Vec<u8> {
    let mut out = vec![version, public_id];
    out.extend(encode_uintvar(charset_mib));
    out.push(0x00);
    out
}

fn write_octet_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0x00);
}

pub fn write_str_i(out: &mut Vec<u8>, s: &str) {
    out.push(STR_I);
    write_octet_string(out, s);
}

pub fn write_opaque(out: &mut Vec<u8>, payload: &[u8]) {
    out.push(OPAQUE);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
}

fn only_blanks(s: &str) -> bool {
    s.chars().all(char::is_whitespace)
}

/// Whether an element has "content" per the source's
/// `element_check_content`: a lone whitespace-only text child counts
/// as no content at all, so the tag is emitted as self-closing with
/// no `END`.
fn has_content(children: &[XmlNode]) -> bool {
    match children {
        [] => false,
        [XmlNode::Text(t)] if only_blanks(t) => false,
        _ => true,
    }
}

/// Encodes one element (and its subtree) using `table`'s token
/// lookups, appending to `out`. Shared by both OTA and SI — they
/// differ only in their tables, not in this walk.
pub fn encode_element(el: &XmlElement, table: &dyn TokenTable, out: &mut Vec<u8>) {
    let content = has_content(&el.children);
    let has_attrs = !el.attrs.is_empty();
    let mut flags = 0u8;
    if content {
        flags |= CONTENT_BIT;
    }
    if has_attrs {
        flags |= ATTR_BIT;
    }

    match table.element_token(&el.name) {
        Some(token) => out.push(token | flags),
        None => {
            out.push(LITERAL | flags);
            write_octet_string(out, &el.name);
        }
    }

    if has_attrs {
        for (name, value) in &el.attrs {
            if !table.encode_attribute(out, name, value) {
                out.push(LITERAL);
                write_octet_string(out, name);
                write_str_i(out, value);
            }
        }
        out.push(END);
    }

    if content {
        for child in &el.children {
            encode_node(child, table, out);
        }
        out.push(END);
    }
}

fn encode_node(node: &XmlNode, table: &dyn TokenTable, out: &mut Vec<u8>) {
    match node {
        XmlNode::Element(el) => encode_element(el, table, out),
        XmlNode::Text(text) => {
            if !only_blanks(text) {
                write_str_i(out, text);
            }
        }
    }
}
