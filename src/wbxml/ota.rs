//! OTA settings/bookmarks compiler (§4.J). Grounded on
//! `gw/ota_compiler.c` in full: the element/attribute token tables
//! and the element/attribute walk (generalized into
//! [`super::encode_element`]).

use super::{charset, encode_element, header, write_str_i, TokenTable, XmlElement};

const VERSION: u8 = 0x01; // WBXML 1.1
const PUBLIC_ID: u8 = 0x01; // "unknown / not publicly registered"

const ELEMENTS: &[(&str, u8)] = &[
    ("CHARACTERISTIC-LIST", 0x05),
    ("CHARACTERISTIC", 0x06),
    ("PARM", 0x07),
];

/// `(attribute name, expected value, token)`. A row whose value is
/// the literal string `"INLINE"` matches any actual value for that
/// attribute name and emits the token followed by the actual value
/// as an inline string; every other row matches only its exact value
/// and emits the token alone (the value itself is implied by the
/// token, nothing more to write).
const ATTRIBUTES: &[(&str, &str, u8)] = &[
    ("TYPE", "ADDRESS", 0x06),
    ("TYPE", "URL", 0x07),
    ("TYPE", "MMSURL", 0x7c),
    ("TYPE", "NAME", 0x08),
    ("TYPE", "ID", 0x7d),
    ("TYPE", "BOOKMARK", 0x7f),
    ("NAME", "BEARER", 0x12),
    ("NAME", "PROXY", 0x13),
    ("NAME", "PORT", 0x14),
    ("NAME", "NAME", 0x15),
    ("NAME", "PROXY_TYPE", 0x16),
    ("NAME", "URL", 0x17),
    ("NAME", "PROXY_AUTHNAME", 0x18),
    ("NAME", "PROXY_AUTHSECRET", 0x19),
    ("NAME", "SMS_SMSC_ADDRESS", 0x1a),
    ("NAME", "USSD_SERVICE_CODE", 0x1b),
    ("NAME", "GPRS_ACCESSPOINTNAME", 0x1c),
    ("NAME", "PPP_LOGINTYPE", 0x1d),
    ("NAME", "PROXY_LOGINTYPE", 0x1e),
    ("NAME", "CSD_DIALSTRING", 0x21),
    ("NAME", "CSD_CALLTYPE", 0x28),
    ("NAME", "CSD_CALLSPEED", 0x29),
    ("NAME", "PPP_AUTHTYPE", 0x22),
    ("NAME", "PPP_AUTHNAME", 0x23),
    ("NAME", "PPP_AUTHSECRET", 0x24),
    ("NAME", "ISP_NAME", 0x7e),
    ("NAME", "INLINE", 0x10),
    ("VALUE", "GSM/CSD", 0x45),
    ("VALUE", "GSM/SMS", 0x46),
    ("VALUE", "GSM/USSD", 0x47),
    ("VALUE", "IS-136/CSD", 0x48),
    ("VALUE", "GPRS", 0x49),
    ("VALUE", "9200", 0x60),
    ("VALUE", "9201", 0x61),
    ("VALUE", "9202", 0x62),
    ("VALUE", "9203", 0x63),
    ("VALUE", "AUTOMATIC", 0x64),
    ("VALUE", "MANUAL", 0x65),
    ("VALUE", "AUTO", 0x6a),
    ("VALUE", "9600", 0x6b),
    ("VALUE", "14400", 0x6c),
    ("VALUE", "19200", 0x6d),
    ("VALUE", "28800", 0x6e),
    ("VALUE", "38400", 0x6f),
    ("VALUE", "PAP", 0x70),
    ("VALUE", "CHAP", 0x71),
    ("VALUE", "ANALOGUE", 0x72),
    ("VALUE", "ISDN", 0x73),
    ("VALUE", "43200", 0x74),
    ("VALUE", "57600", 0x75),
    ("VALUE", "MSISDN_NO", 0x76),
    ("VALUE", "IPV4", 0x77),
    ("VALUE", "MS_CHAP", 0x78),
    ("VALUE", "INLINE", 0x11),
];

struct OtaTable;

impl TokenTable for OtaTable {
    fn element_token(&self, name: &str) -> Option<u8> {
        ELEMENTS.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
    }

    fn encode_attribute(&self, out: &mut Vec<u8>, name: &str, value: &str) -> bool {
        for (attr_name, attr_value, token) in ATTRIBUTES {
            if *attr_name == name && (*attr_value == value || *attr_value == "INLINE") {
                out.push(*token);
                if *attr_value == "INLINE" {
                    write_str_i(out, value);
                }
                return true;
            }
        }
        false
    }
}

/// Compiles an OTA settings/bookmarks tree into its WBXML byte
/// encoding (`charset` is accepted but always normalized to UTF-8,
/// per the preserved source quirk — see [`charset::resolve`]).
pub fn compile(root: &XmlElement, charset_name: &str) -> Vec<u8> {
    let mut out = header(VERSION, PUBLIC_ID, charset::resolve(charset_name));
    encode_element(root, &OtaTable, &mut out);
    out
}
