//! URL-translation table (§4.G): configured service patterns and
//! sendsms users. Append-only after configuration load; lookup is
//! O(N) over the loaded entries.
//!
//! Grounded on `gw/urltrans.c` in full: `URLTranslation`/
//! `URLTranslationList`, `urltrans_find`/`find_translation`/
//! `find_default_translation`, `urltrans_find_username`, and
//! `create_onetrans`'s field layout.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::pattern::{self, PatternSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransType {
    Url,
    Text,
    File,
    Sendsms,
}

#[derive(Debug, Clone)]
pub struct UrlTranslation {
    /// `None` represents the catch-all "default" entry.
    pub keyword: Option<String>,
    pub aliases: Vec<String>,
    pub trans_type: TransType,
    pub pattern: String,
    pub compiled_pattern: Vec<PatternSegment>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub faked_sender: Option<String>,
    pub max_messages: i64,
    pub concatenation: bool,
    pub split_chars: Option<String>,
    pub split_suffix: Option<String>,
    pub header: Option<String>,
    pub footer: Option<String>,
    pub omit_empty: bool,
    pub accepted_smsc: Vec<String>,
    pub forced_smsc: Option<String>,
    pub default_smsc: Option<String>,
    pub allow_ip: Vec<String>,
    pub deny_ip: Vec<String>,
    pub args: usize,
    pub has_catchall_arg: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl UrlTranslation {
    pub fn new(keyword: Option<&str>, trans_type: TransType, pattern: &str) -> Self {
        UrlTranslation {
            keyword: keyword.map(str::to_string),
            aliases: Vec::new(),
            trans_type,
            pattern: pattern.to_string(),
            compiled_pattern: pattern::compile(pattern),
            prefix: None,
            suffix: None,
            faked_sender: None,
            max_messages: 1,
            concatenation: false,
            split_chars: None,
            split_suffix: None,
            header: None,
            footer: None,
            omit_empty: false,
            accepted_smsc: Vec::new(),
            forced_smsc: None,
            default_smsc: None,
            allow_ip: Vec::new(),
            deny_ip: Vec::new(),
            args: 0,
            has_catchall_arg: false,
            username: None,
            password: None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.keyword.is_none()
    }

    fn keyword_matches(&self, keyword: &str) -> bool {
        match &self.keyword {
            Some(k) => k.eq_ignore_ascii_case(keyword),
            None => false,
        }
    }

    fn alias_matches(&self, keyword: &str) -> bool {
        self.aliases.iter().any(|a| a.eq_ignore_ascii_case(keyword))
    }

    fn arg_count_matches(&self, word_count: usize) -> bool {
        if self.has_catchall_arg {
            word_count >= self.args
        } else {
            word_count == self.args
        }
    }

    fn accepts_smsc(&self, smsc_id: Option<&str>) -> bool {
        if self.accepted_smsc.is_empty() {
            return true;
        }
        match smsc_id {
            Some(id) => self.accepted_smsc.iter().any(|s| s == id),
            None => true,
        }
    }

    /// Restores the two-distinct-list allow/deny IP check the data
    /// model (§3) describes. The grounding source's
    /// `default_authorise_user` passes `allow_ip` as both arguments to
    /// its IP-check helper, making `deny_ip` dead code; that isn't a
    /// named open question and the field's own name makes the
    /// intended check unambiguous, so it's implemented here as: deny
    /// wins if present in `deny_ip`; otherwise, when `allow_ip` is
    /// non-empty, the IP must appear in it.
    pub fn ip_allowed(&self, ip: &str) -> bool {
        if self.deny_ip.iter().any(|d| d == ip) {
            return false;
        }
        if self.allow_ip.is_empty() {
            return true;
        }
        self.allow_ip.iter().any(|a| a == ip)
    }

    /// Builds one entry from a config-file `sms-service` or
    /// `sendsms-user` stanza's flat key/value fields (§4.G). List
    /// fields (`aliases`, `accepted-smsc`, `allow-ip`, `deny-ip`) are
    /// semicolon-delimited, matching §4.H's statement that aliases are
    /// "semicolon-delimited". `default_type` supplies `type` for
    /// stanzas (like `sendsms-user`) that never carry one of their own.
    pub fn from_group(fields: &HashMap<String, String>, default_type: Option<TransType>) -> std::result::Result<Self, ConfigError> {
        let get = |k: &str| fields.get(k).map(String::as_str);
        let keyword = get("keyword").filter(|k| !k.eq_ignore_ascii_case("default"));
        let trans_type = match get("type") {
            Some(v) => parse_trans_type(v)?,
            None => default_type.ok_or_else(|| ConfigError::MissingKey("type".into(), "sms-service".into()))?,
        };
        let pattern = get("pattern").or_else(|| get("text")).unwrap_or("");

        let mut entry = UrlTranslation::new(keyword, trans_type, pattern);
        entry.aliases = parse_list(get("aliases"));
        entry.prefix = get("prefix").map(str::to_string);
        entry.suffix = get("suffix").map(str::to_string);
        entry.faked_sender = get("faked-sender").map(str::to_string);
        if let Some(v) = get("max-messages") {
            entry.max_messages = v.parse().map_err(|_| ConfigError::InvalidValue("max-messages".into(), v.to_string()))?;
        }
        entry.concatenation = parse_bool(get("concatenation"));
        entry.split_chars = get("split-chars").map(str::to_string);
        entry.split_suffix = get("split-suffix").map(str::to_string);
        entry.header = get("header").map(str::to_string);
        entry.footer = get("footer").map(str::to_string);
        entry.omit_empty = parse_bool(get("omit-empty"));
        entry.accepted_smsc = parse_list(get("accepted-smsc"));
        entry.forced_smsc = get("forced-smsc").map(str::to_string);
        entry.default_smsc = get("default-smsc").map(str::to_string);
        entry.allow_ip = parse_list(get("allow-ip"));
        entry.deny_ip = parse_list(get("deny-ip"));
        entry.has_catchall_arg = parse_bool(get("catch-all"));
        if let Some(v) = get("args") {
            entry.args = v.parse().map_err(|_| ConfigError::InvalidValue("args".into(), v.to_string()))?;
        }
        entry.username = get("username").map(str::to_string);
        entry.password = get("password").map(str::to_string);
        Ok(entry)
    }
}

fn parse_bool(v: Option<&str>) -> bool {
    matches!(v.map(str::to_ascii_lowercase).as_deref(), Some("1" | "true" | "yes"))
}

fn parse_list(v: Option<&str>) -> Vec<String> {
    match v {
        Some(s) => s.split(';').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect(),
        None => Vec::new(),
    }
}

fn parse_trans_type(v: &str) -> std::result::Result<TransType, ConfigError> {
    match v.to_ascii_lowercase().as_str() {
        "text" => Ok(TransType::Text),
        "file" => Ok(TransType::File),
        "url" => Ok(TransType::Url),
        "sendsms" => Ok(TransType::Sendsms),
        _ => Err(ConfigError::InvalidValue("type".into(), v.to_string())),
    }
}

#[derive(Debug, Clone, Default)]
pub struct UrlTranslationList {
    entries: Vec<UrlTranslation>,
}

impl UrlTranslationList {
    pub fn new() -> Self {
        UrlTranslationList::default()
    }

    pub fn add(&mut self, entry: UrlTranslation) {
        self.entries.push(entry);
    }

    /// §4.H step 2: scans for a non-SENDSMS entry matching either
    /// keyword-and-arg-count, or alias; a candidate that fails the
    /// accepted_smsc/arg-count gate is skipped rather than
    /// terminating the scan (matching `find_translation`'s loop,
    /// which continues on mismatch instead of early-exiting).
    pub fn find(&self, keyword: &str, word_count: usize, smsc_id: Option<&str>) -> Option<&UrlTranslation> {
        for entry in &self.entries {
            if entry.trans_type == TransType::Sendsms || entry.is_default() {
                continue;
            }
            let keyword_hit = entry.keyword_matches(keyword) && entry.arg_count_matches(word_count);
            let alias_hit = entry.alias_matches(keyword);
            if (keyword_hit || alias_hit) && entry.accepts_smsc(smsc_id) {
                return Some(entry);
            }
        }
        self.find_default()
    }

    pub fn find_default(&self) -> Option<&UrlTranslation> {
        self.entries.iter().find(|e| e.is_default())
    }

    /// Sendsms HTTP-surface authorization: scans SENDSMS-type entries
    /// for a username+password match, then checks the caller's IP.
    pub fn find_username(&self, username: &str, password: &str, client_ip: &str) -> Option<&UrlTranslation> {
        self.entries.iter().find(|e| {
            e.trans_type == TransType::Sendsms
                && e.username.as_deref() == Some(username)
                && e.password.as_deref() == Some(password)
                && e.ip_allowed(client_ip)
        })
    }

    /// Builds a table from the config file's `sms-service` and
    /// `sendsms-user` stanzas (§4.G, §10.C); every other stanza
    /// (`core`, or ungrouped) is ignored here — [`GatewayConfig::load`]
    /// handles those.
    pub fn load_from_groups(groups: &[HashMap<String, String>]) -> std::result::Result<Self, ConfigError> {
        let mut list = UrlTranslationList::new();
        for group in groups {
            match group.get("group").map(String::as_str) {
                Some("sms-service") => list.add(UrlTranslation::from_group(group, None)?),
                Some("sendsms-user") => list.add(UrlTranslation::from_group(group, Some(TransType::Sendsms))?),
                _ => {}
            }
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_entry() -> UrlTranslation {
        let mut e = UrlTranslation::new(Some("echo"), TransType::Text, "you said %s %s");
        e.args = 2;
        e
    }

    #[test]
    fn find_matches_by_keyword_and_arg_count() {
        let mut list = UrlTranslationList::new();
        list.add(echo_entry());
        let found = list.find("echo", 2, None).unwrap();
        assert_eq!(found.keyword.as_deref(), Some("echo"));
    }

    #[test]
    fn find_falls_back_to_default_on_arg_count_mismatch() {
        let mut list = UrlTranslationList::new();
        list.add(echo_entry());
        let mut default = UrlTranslation::new(None, TransType::Text, "fallback");
        default.keyword = None;
        list.add(default);
        let found = list.find("echo", 5, None).unwrap();
        assert!(found.is_default());
    }

    #[test]
    fn find_skips_entry_whose_accepted_smsc_does_not_match() {
        let mut list = UrlTranslationList::new();
        let mut e = echo_entry();
        e.accepted_smsc = vec!["smsc-a".to_string()];
        list.add(e);
        assert!(list.find("echo", 2, Some("smsc-b")).is_none());
        assert!(list.find("echo", 2, Some("smsc-a")).is_some());
    }

    #[test]
    fn sendsms_type_entries_are_never_returned_by_find() {
        let mut list = UrlTranslationList::new();
        let mut e = UrlTranslation::new(Some("echo"), TransType::Sendsms, "");
        e.args = 0;
        list.add(e);
        assert!(list.find("echo", 0, None).is_none());
    }

    #[test]
    fn ip_allow_deny_two_list_check() {
        let mut e = UrlTranslation::new(Some("x"), TransType::Sendsms, "");
        e.allow_ip.push("10.0.0.1".to_string());
        e.deny_ip.push("10.0.0.2".to_string());
        assert!(e.ip_allowed("10.0.0.1"));
        assert!(!e.ip_allowed("10.0.0.2"));
        assert!(!e.ip_allowed("10.0.0.3")); // allow_ip non-empty, not listed
    }

    #[test]
    fn ip_allowed_when_allow_list_empty_unless_denied() {
        let mut e = UrlTranslation::new(Some("x"), TransType::Sendsms, "");
        e.deny_ip.push("10.0.0.2".to_string());
        assert!(e.ip_allowed("10.0.0.9"));
        assert!(!e.ip_allowed("10.0.0.2"));
    }

    #[test]
    fn from_group_parses_sms_service_stanza() {
        let mut fields = HashMap::new();
        fields.insert("group".to_string(), "sms-service".to_string());
        fields.insert("keyword".to_string(), "echo".to_string());
        fields.insert("type".to_string(), "text".to_string());
        fields.insert("pattern".to_string(), "you said %s %s".to_string());
        fields.insert("args".to_string(), "2".to_string());
        fields.insert("aliases".to_string(), "e;ec".to_string());
        fields.insert("accepted-smsc".to_string(), "smsc-a;smsc-b".to_string());
        fields.insert("concatenation".to_string(), "true".to_string());

        let entry = UrlTranslation::from_group(&fields, None).unwrap();
        assert_eq!(entry.keyword.as_deref(), Some("echo"));
        assert_eq!(entry.trans_type, TransType::Text);
        assert_eq!(entry.args, 2);
        assert_eq!(entry.aliases, vec!["e", "ec"]);
        assert_eq!(entry.accepted_smsc, vec!["smsc-a", "smsc-b"]);
        assert!(entry.concatenation);
    }

    #[test]
    fn from_group_without_type_requires_default_type() {
        let mut fields = HashMap::new();
        fields.insert("group".to_string(), "sendsms-user".to_string());
        fields.insert("username".to_string(), "alice".to_string());
        fields.insert("password".to_string(), "secret".to_string());

        let entry = UrlTranslation::from_group(&fields, Some(TransType::Sendsms)).unwrap();
        assert_eq!(entry.trans_type, TransType::Sendsms);
        assert_eq!(entry.username.as_deref(), Some("alice"));

        assert!(UrlTranslation::from_group(&fields, None).is_err());
    }

    #[test]
    fn load_from_groups_ignores_core_and_loads_both_kinds() {
        let mut core = HashMap::new();
        core.insert("group".to_string(), "core".to_string());
        core.insert("smsbox-port".to_string(), "14001".to_string());

        let mut service = HashMap::new();
        service.insert("group".to_string(), "sms-service".to_string());
        service.insert("keyword".to_string(), "echo".to_string());
        service.insert("type".to_string(), "text".to_string());
        service.insert("pattern".to_string(), "%s".to_string());

        let mut user = HashMap::new();
        user.insert("group".to_string(), "sendsms-user".to_string());
        user.insert("username".to_string(), "bob".to_string());
        user.insert("password".to_string(), "pw".to_string());

        let list = UrlTranslationList::load_from_groups(&[core, service, user]).unwrap();
        assert!(list.find("echo", 0, None).is_some());
        assert!(list.find_username("bob", "pw", "1.2.3.4").is_some());
    }
}
