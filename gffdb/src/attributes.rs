/*! Parsing and rendering of the attribute column.

Attributes are modeled as an ordered multimap: keys keep the order in which
they first appeared, and each key maps to a list of string values. A key may
carry zero values (`Complete`-style bare tokens found in some annotation
pipelines), one value, or several.

Parsing and rendering are both driven by a [`Dialect`](::Dialect); when the
same dialect is used for both, rendering the parsed map reproduces the
original column byte for byte, modulo the documented percent-encoding policy.
*/
use std::error::Error;
use std::fmt::Write as FmtWrite;

use itertools::Itertools;
use linked_hash_map::{self, LinkedHashMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use Dialect;
use DialectFmt;


/// Characters that must be percent-encoded in rendered GFF3 values.
///
/// Space is deliberately absent: `%20` is decoded on parse but never
/// re-encoded.
const GFF3_ENCODE_SET: &'static [char] = &['\t', '\n', '\r', ';', '=', '&', ',', '%'];

quick_error! {
    /// Errors that occur when parsing attribute strings.
    #[derive(Debug)]
    pub enum AttrError {
        /// Occurs when a token has no key/value separator and is not a bare
        /// key the dialect allows.
        InvalidToken(token: String) {
            description("attribute token has no key/value separator")
            display(self_) -> ("{}: {:?}", self_.description(), token)
        }
    }
}

/// Ordered multimap of attribute keys to value lists.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    inner: LinkedHashMap<String, Vec<String>>,
}

impl Attributes {

    /// Creates an empty attribute map.
    pub fn new() -> Attributes {
        Attributes { inner: LinkedHashMap::new() }
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns whether the map has no keys at all.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns whether the given key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns the values of the given key.
    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.inner.get(key).map(|vals| vals.as_slice())
    }

    /// Returns the first value of the given key.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.inner.get(key).and_then(|vals| vals.first()).map(|val| val.as_str())
    }

    /// Replaces the values of the given key, appending the key if new.
    pub fn insert<K>(&mut self, key: K, values: Vec<String>)
        where K: Into<String>
    {
        let _ = self.inner.insert(key.into(), values);
    }

    /// Appends one value to the given key, appending the key if new.
    pub fn append_value<K, V>(&mut self, key: K, value: V)
        where K: Into<String>, V: Into<String>
    {
        self.inner.entry(key.into()).or_insert_with(Vec::new).push(value.into());
    }

    /// Extends the values of the given key, skipping values already present.
    ///
    /// Existing values keep their positions; new values are appended in the
    /// order given.
    pub fn merge_values<K>(&mut self, key: K, values: &[String])
        where K: Into<String>
    {
        let slot = self.inner.entry(key.into()).or_insert_with(Vec::new);
        for value in values.iter() {
            if !slot.contains(value) {
                slot.push(value.clone());
            }
        }
    }

    /// Removes a key and returns its values.
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.inner.remove(key)
    }

    /// Returns an iterator over keys in insertion order.
    pub fn keys(&self) -> linked_hash_map::Keys<String, Vec<String>> {
        self.inner.keys()
    }

    /// Returns an iterator over `(key, values)` pairs in insertion order.
    pub fn iter(&self) -> linked_hash_map::Iter<String, Vec<String>> {
        self.inner.iter()
    }

    /// Sorts the values of every key in place.
    pub fn sort_values(&mut self) {
        for (_, values) in self.inner.iter_mut() {
            values.sort();
        }
    }
}

impl Default for Attributes {

    fn default() -> Attributes {
        Attributes::new()
    }
}

impl Serialize for Attributes {

    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Attributes {

    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Attributes, D::Error> {
        LinkedHashMap::deserialize(deserializer).map(|inner| Attributes { inner: inner })
    }
}

/// Parses one attribute column under the given dialect.
///
/// `decode_percent` controls whether `%XX` escapes are decoded; it only
/// applies to GFF3-format dialects.
pub fn parse_attributes(
    raw: &str,
    dialect: &Dialect,
    decode_percent: bool,
) -> Result<Attributes, AttrError> {

    let mut attributes = Attributes::new();
    let decode = decode_percent && dialect.fmt == DialectFmt::Gff3;

    let mut body = raw.trim_matches(|c: char| c == ' ' || c == '\r');
    if body.is_empty() || body == ::UNK_STR {
        return Ok(attributes);
    }
    if dialect.leading_semicolon && body.starts_with(';') {
        body = &body[1..];
    }
    if dialect.trailing_semicolon && body.ends_with(';') {
        body = &body[..body.len() - 1];
    }

    for token in body.split(';') {
        let token = token.trim_matches(' ');
        if token.is_empty() {
            continue;
        }

        let (key, values) = parse_token(token, dialect, decode)?;
        let repeated = attributes.contains_key(key.as_str());
        if repeated && dialect.repeated_keys {
            for value in values {
                attributes.append_value(key.as_str(), value);
            }
        } else {
            // Without repeated-key support the last occurrence wins.
            attributes.insert(key, values);
        }
    }

    Ok(attributes)
}

/// Splits one `key[<sep>value]` token into a key and its values.
fn parse_token(
    token: &str,
    dialect: &Dialect,
    decode: bool,
) -> Result<(String, Vec<String>), AttrError> {

    let split = match dialect.fmt {
        DialectFmt::Gff3 => token.find('='),
        DialectFmt::Gtf => token.find(' '),
    };

    let (raw_key, raw_value) = match split {
        Some(pos) => (&token[..pos], Some(&token[pos + 1..])),
        // A bare word is a key with an empty value list; anything else is a
        // token the dialect cannot represent.
        None => {
            if token.contains('"') {
                return Err(AttrError::InvalidToken(token.to_owned()));
            }
            (token, None)
        }
    };

    let key = maybe_decode(raw_key, decode);
    let values = match raw_value {
        None => Vec::new(),
        Some(raw) => {
            let unquoted = unquote(raw.trim_matches(' '));
            unquoted
                .split(dialect.multival_separator.as_str())
                .map(|val| maybe_decode(val, decode))
                .collect::<Vec<String>>()
        }
    };

    Ok((key, values))
}

/// Strips one pair of surrounding double quotes, if present.
fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Renders an attribute map back to its column form under the given dialect.
///
/// Keys follow the dialect's `key_order` when set (keys missing from the
/// order are appended in insertion order); otherwise insertion order is used
/// throughout. `encode_percent` controls re-encoding of reserved characters
/// and only applies to GFF3-format dialects.
pub fn render_attributes(
    attributes: &Attributes,
    dialect: &Dialect,
    encode_percent: bool,
) -> String {

    if attributes.is_empty() {
        return ::UNK_STR.to_owned();
    }
    let encode = encode_percent && dialect.fmt == DialectFmt::Gff3;

    let ordered_keys = ordered_keys(attributes, dialect);
    let mut tokens = Vec::with_capacity(ordered_keys.len());
    for key in ordered_keys {
        let values = match attributes.values(key) {
            Some(vals) => vals,
            None => continue,
        };
        let mut token = String::new();
        token.push_str(maybe_encode(key, encode).as_str());
        if !values.is_empty() {
            token.push_str(dialect.keyval_separator.as_str());
            let joined = values.iter()
                .map(|val| maybe_encode(val, encode))
                .join(dialect.multival_separator.as_str());
            if dialect.quoted_values {
                let _ = write!(token, "\"{}\"", joined);
            } else {
                token.push_str(joined.as_str());
            }
        }
        tokens.push(token);
    }

    let mut rendered = tokens.iter().join(dialect.field_separator.as_str());
    if dialect.leading_semicolon {
        rendered.insert(0, ';');
    }
    if dialect.trailing_semicolon {
        rendered.push(';');
    }
    rendered
}

/// Returns the keys to render, honoring the dialect-level ordering.
fn ordered_keys<'a>(attributes: &'a Attributes, dialect: &'a Dialect) -> Vec<&'a str> {
    match dialect.key_order {
        None => attributes.keys().map(|key| key.as_str()).collect(),
        Some(ref order) => {
            let mut keys = Vec::with_capacity(attributes.len());
            for key in order.iter() {
                if attributes.contains_key(key.as_str()) && !keys.contains(&key.as_str()) {
                    keys.push(key.as_str());
                }
            }
            for key in attributes.keys() {
                if !keys.contains(&key.as_str()) {
                    keys.push(key.as_str());
                }
            }
            keys
        }
    }
}

fn maybe_decode(value: &str, decode: bool) -> String {
    if decode { percent_decode(value) } else { value.to_owned() }
}

fn maybe_encode(value: &str, encode: bool) -> String {
    if encode { percent_encode(value) } else { value.to_owned() }
}

/// Decodes every valid `%XX` escape; invalid escapes are kept literally.
pub fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' && idx + 2 < bytes.len() {
            let hex = (hex_val(bytes[idx + 1]), hex_val(bytes[idx + 2]));
            if let (Some(hi), Some(lo)) = hex {
                out.push(hi * 16 + lo);
                idx += 3;
                continue;
            }
        }
        out.push(bytes[idx]);
        idx += 1;
    }
    String::from_utf8(out).unwrap_or_else(|err| {
        String::from_utf8_lossy(err.as_bytes()).into_owned()
    })
}

/// Percent-encodes the characters GFF3 reserves, plus control characters.
pub fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if GFF3_ENCODE_SET.contains(&c) || c.is_control() {
            for byte in c.to_string().as_bytes() {
                let _ = write!(out, "%{:02X}", byte);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn hex_val(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
