//! Per-transport options parsing.
//!
//! Two textual forms are accepted:
//!
//! - JSON: an object whose members are per-transport objects, e.g.
//!   `{"tls": {"sni": "example.com"}, "ws": {"path": "/t"}}`.
//! - The server-side `TOR_PT_SERVER_TRANSPORT_OPTIONS` form,
//!   `name:key=value;name:key=value`, where a backslash escapes the next
//!   character.
//!
//! Both produce a [`TransportOptions`] map. Argument values stay dynamically
//! typed until a transport factory reads them through [`TransportArgs`].

use std::collections::BTreeMap;

use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("invalid options json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} is not a JSON object")]
    NotAnObject(String),
    #[error("options syntax error at byte {position}: {reason}")]
    Syntax { position: usize, reason: &'static str },
    #[error("duplicate option `{key}` for transport `{transport}`")]
    Duplicate { transport: String, key: String },
    #[error("cannot convert {found} to a string")]
    TypeMismatch { found: &'static str },
    #[error("transport `{transport}` option `{key}` has unsupported type {found}")]
    InvalidArgument {
        transport: String,
        key: String,
        found: &'static str,
    },
    #[error("transport `{transport}` requires option `{key}`")]
    MissingArgument { transport: String, key: String },
}

/// Options for every transport named in an options blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportOptions {
    entries: BTreeMap<String, Map<String, Value>>,
}

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Transport names with at least an (possibly empty) options entry.
    pub fn transports(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, transport: &str) -> bool {
        self.entries.contains_key(transport)
    }

    /// Arguments scoped to `transport`; empty when the blob has none for it.
    pub fn args_for(&self, transport: &str) -> TransportArgs {
        TransportArgs {
            transport: transport.to_string(),
            values: self.entries.get(transport).cloned().unwrap_or_default(),
        }
    }

    /// Set one argument, replacing any previous value.
    pub fn insert(&mut self, transport: impl Into<String>, key: impl Into<String>, value: Value) {
        self.entries
            .entry(transport.into())
            .or_default()
            .insert(key.into(), value);
    }
}

/// The arguments of a single transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportArgs {
    transport: String,
    values: Map<String, Value>,
}

impl TransportArgs {
    pub fn new(transport: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            values: Map::new(),
        }
    }

    /// Builder-style setter, mostly for tests and programmatic setups.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fetch a required argument as a string.
    ///
    /// Numbers and booleans are rendered; objects, arrays and null are
    /// rejected.
    pub fn require_str(&self, key: &str) -> Result<String, OptionsError> {
        self.optional_str(key)?
            .ok_or_else(|| OptionsError::MissingArgument {
                transport: self.transport.clone(),
                key: key.to_string(),
            })
    }

    pub fn optional_str(&self, key: &str) -> Result<Option<String>, OptionsError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(value) => coerce_to_string(value)
                .map(Some)
                .map_err(|_| self.invalid(key, value)),
        }
    }

    /// Fetch an optional boolean; JSON booleans and the strings
    /// `true`/`false` are accepted.
    pub fn optional_bool(&self, key: &str) -> Result<Option<bool>, OptionsError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
            Some(value) => Err(self.invalid(key, value)),
        }
    }

    fn invalid(&self, key: &str, value: &Value) -> OptionsError {
        OptionsError::InvalidArgument {
            transport: self.transport.clone(),
            key: key.to_string(),
            found: value_kind(value),
        }
    }
}

/// Parse the JSON options form.
///
/// Blank input yields an empty map. A member whose value is `null` is kept
/// as a transport with no arguments.
pub fn parse_options(raw: &str) -> Result<TransportOptions, OptionsError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(TransportOptions::new());
    }

    let top = match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => map,
        _ => return Err(OptionsError::NotAnObject("options blob".into())),
    };

    let mut entries = BTreeMap::new();
    for (transport, value) in top {
        let args = match value {
            Value::Object(args) => args,
            Value::Null => Map::new(),
            _ => {
                return Err(OptionsError::NotAnObject(format!(
                    "options for transport `{transport}`"
                )));
            }
        };
        entries.insert(transport, args);
    }
    Ok(TransportOptions { entries })
}

/// Parse the server options form.
///
/// A blob starting with `{` is read as JSON, anything else as
/// `name:key=value;...` with backslash escapes. Values of the latter form are
/// always strings.
pub fn parse_server_options(raw: &str) -> Result<TransportOptions, OptionsError> {
    if raw.trim_start().starts_with('{') {
        return parse_options(raw);
    }
    if raw.trim().is_empty() {
        return Ok(TransportOptions::new());
    }

    let mut entries: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    let mut entry = PendingEntry::default();
    let mut chars = raw.char_indices();

    while let Some((pos, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => entry.push(escaped),
                None => {
                    return Err(OptionsError::Syntax {
                        position: pos,
                        reason: "trailing backslash",
                    });
                }
            },
            ':' if entry.field == Field::Transport => entry.field = Field::Key,
            '=' if entry.field == Field::Key => entry.field = Field::Value,
            ';' => {
                entry.finish(&mut entries)?;
                entry = PendingEntry::starting_at(pos + 1);
            }
            _ => entry.push(c),
        }
    }
    entry.finish(&mut entries)?;

    Ok(TransportOptions { entries })
}

/// Render a scalar option value as a string.
pub fn coerce_to_string(value: &Value) -> Result<String, OptionsError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(OptionsError::TypeMismatch {
            found: value_kind(other),
        }),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Field {
    #[default]
    Transport,
    Key,
    Value,
}

#[derive(Debug, Default)]
struct PendingEntry {
    start: usize,
    field: Field,
    transport: String,
    key: String,
    value: String,
}

impl PendingEntry {
    fn starting_at(start: usize) -> Self {
        Self {
            start,
            ..Self::default()
        }
    }

    fn push(&mut self, c: char) {
        match self.field {
            Field::Transport => self.transport.push(c),
            Field::Key => self.key.push(c),
            Field::Value => self.value.push(c),
        }
    }

    fn finish(self, entries: &mut BTreeMap<String, Map<String, Value>>) -> Result<(), OptionsError> {
        let syntax = |reason| OptionsError::Syntax {
            position: self.start,
            reason,
        };
        match self.field {
            Field::Transport => return Err(syntax("missing ':' after transport name")),
            Field::Key => return Err(syntax("missing '=' after option key")),
            Field::Value => {}
        }
        if self.transport.is_empty() {
            return Err(syntax("empty transport name"));
        }
        if self.key.is_empty() {
            return Err(syntax("empty option key"));
        }

        let args = entries.entry(self.transport.clone()).or_default();
        match args.entry(self.key.clone()) {
            serde_json::map::Entry::Occupied(_) => Err(OptionsError::Duplicate {
                transport: self.transport,
                key: self.key,
            }),
            serde_json::map::Entry::Vacant(slot) => {
                slot.insert(Value::String(self.value));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_options_json() {
        let opts = parse_options(r#"{"tls": {"sni": "example.com"}, "plain": {}}"#).unwrap();
        assert_eq!(opts.len(), 2);
        assert!(opts.contains("plain"));
        let tls = opts.args_for("tls");
        assert_eq!(tls.transport(), "tls");
        assert_eq!(tls.require_str("sni").unwrap(), "example.com");
    }

    #[test]
    fn test_parse_options_empty_input() {
        assert!(parse_options("").unwrap().is_empty());
        assert!(parse_options("   \n").unwrap().is_empty());
        assert!(parse_options("{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_options_null_member_is_empty_args() {
        let opts = parse_options(r#"{"plain": null}"#).unwrap();
        assert!(opts.contains("plain"));
        assert!(opts.args_for("plain").is_empty());
    }

    #[test]
    fn test_parse_options_rejects_non_objects() {
        assert!(matches!(
            parse_options("[1, 2]"),
            Err(OptionsError::NotAnObject(_))
        ));
        assert!(matches!(
            parse_options(r#"{"tls": "sni=example.com"}"#),
            Err(OptionsError::NotAnObject(_))
        ));
        assert!(matches!(parse_options("{not json"), Err(OptionsError::Json(_))));
    }

    #[test]
    fn test_args_for_unknown_transport_is_empty() {
        let opts = parse_options(r#"{"tls": {"sni": "a"}}"#).unwrap();
        let args = opts.args_for("ws");
        assert_eq!(args.transport(), "ws");
        assert!(args.is_empty());
    }

    #[test]
    fn test_require_str_missing_and_mistyped() {
        let args = TransportArgs::new("ws").with("host", json!({"nested": true}));
        match args.require_str("path") {
            Err(OptionsError::MissingArgument { transport, key }) => {
                assert_eq!(transport, "ws");
                assert_eq!(key, "path");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            args.require_str("host"),
            Err(OptionsError::InvalidArgument { found: "object", .. })
        ));
    }

    #[test]
    fn test_optional_bool_accepts_strings() {
        let args = TransportArgs::new("tls")
            .with("a", true)
            .with("b", "false")
            .with("c", "TRUE")
            .with("d", 1);
        assert_eq!(args.optional_bool("a").unwrap(), Some(true));
        assert_eq!(args.optional_bool("b").unwrap(), Some(false));
        assert_eq!(args.optional_bool("c").unwrap(), Some(true));
        assert_eq!(args.optional_bool("missing").unwrap(), None);
        assert!(args.optional_bool("d").is_err());
    }

    #[test]
    fn test_coerce_to_string() {
        assert_eq!(coerce_to_string(&json!("x")).unwrap(), "x");
        assert_eq!(coerce_to_string(&json!(443)).unwrap(), "443");
        assert_eq!(coerce_to_string(&json!(1.5)).unwrap(), "1.5");
        assert_eq!(coerce_to_string(&json!(false)).unwrap(), "false");
        assert!(matches!(
            coerce_to_string(&json!(null)),
            Err(OptionsError::TypeMismatch { found: "null" })
        ));
        assert!(matches!(
            coerce_to_string(&json!([1])),
            Err(OptionsError::TypeMismatch { found: "array" })
        ));
    }

    #[test]
    fn test_parse_server_options_kv_form() {
        let opts = parse_server_options("ws:path=/tunnel;tls:cert=/a.pem;tls:key=/b.pem").unwrap();
        assert_eq!(opts.len(), 2);
        assert_eq!(opts.args_for("ws").require_str("path").unwrap(), "/tunnel");
        let tls = opts.args_for("tls");
        assert_eq!(tls.require_str("cert").unwrap(), "/a.pem");
        assert_eq!(tls.require_str("key").unwrap(), "/b.pem");
    }

    #[test]
    fn test_parse_server_options_escapes() {
        let opts = parse_server_options(r"t:k=a\;b\=c\:d\\e;t:empty=").unwrap();
        let args = opts.args_for("t");
        assert_eq!(args.require_str("k").unwrap(), r"a;b=c:d\e");
        assert_eq!(args.require_str("empty").unwrap(), "");
    }

    #[test]
    fn test_parse_server_options_unescaped_separators_in_value() {
        let opts = parse_server_options("t:url=http://h:1/?a=b").unwrap();
        assert_eq!(
            opts.args_for("t").require_str("url").unwrap(),
            "http://h:1/?a=b"
        );
    }

    #[test]
    fn test_parse_server_options_json_form() {
        let opts = parse_server_options(r#" {"ws": {"path": "/x"}}"#).unwrap();
        assert_eq!(opts.args_for("ws").require_str("path").unwrap(), "/x");
        assert!(parse_server_options("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_server_options_errors() {
        let cases = [
            ("novalue", "missing ':' after transport name"),
            ("t:key", "missing '=' after option key"),
            (":k=v", "empty transport name"),
            ("t:=v", "empty option key"),
            ("t:k=v;", "missing ':' after transport name"),
        ];
        for (input, expected) in cases {
            match parse_server_options(input) {
                Err(OptionsError::Syntax { reason, .. }) => assert_eq!(reason, expected, "{input}"),
                other => panic!("{input}: unexpected {other:?}"),
            }
        }

        assert!(matches!(
            parse_server_options(r"t:k=v\"),
            Err(OptionsError::Syntax {
                reason: "trailing backslash",
                position: 5
            })
        ));
        assert!(matches!(
            parse_server_options("t:k=1;t:k=2"),
            Err(OptionsError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_syntax_error_reports_entry_offset() {
        match parse_server_options("a:b=c;oops") {
            Err(OptionsError::Syntax { position, .. }) => assert_eq!(position, 6),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_insert_builds_options() {
        let mut opts = TransportOptions::new();
        opts.insert("ws", "path", json!("/p"));
        assert_eq!(opts.transports().collect::<Vec<_>>(), vec!["ws"]);
        assert_eq!(opts.args_for("ws").require_str("path").unwrap(), "/p");
    }
}
