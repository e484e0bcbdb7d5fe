/*! Attribute-column dialects.

The ninth column of the GFF format family carries `key`/`value` attribute
pairs, but the way those pairs are written differs per producing tool: GFF3
uses `key=value` pairs separated by `;`, GTF/GFF2 uses `key "value"` pairs
separated by `; ` with a trailing `;`, and real-world files deviate from both
in smaller ways (leading separators, unquoted values, repeated keys).

A [`Dialect`] captures one such convention as a plain value. It is consulted
both when parsing attribute strings and when rendering them back, and it is
the only thing standing between a stored feature and a bit-identical
reconstruction of its source line.
*/
use std::fmt;

use regex::{Error as RegexError, Regex};


/// Default field separator for GFF3 attribute strings.
const GFF3_FIELD_SEP: &'static str = ";";

/// Default field separator for GTF attribute strings.
const GTF_FIELD_SEP: &'static str = "; ";

/// Key/value separator for GFF3 attribute tokens.
const GFF3_KEYVAL_SEP: &'static str = "=";

/// Key/value separator for GTF attribute tokens.
const GTF_KEYVAL_SEP: &'static str = " ";

/// Separator for multiple values of a single key.
const MULTIVAL_SEP: &'static str = ",";

quick_error! {
    /// Errors that occur when inferring a dialect.
    #[derive(Debug)]
    pub enum DialectError {
        /// Occurs when no attribute strings were available for inference.
        NoSamples {
            description("no attribute strings to infer a dialect from")
        }
        /// Occurs when the sampled attribute strings disagree and no format
        /// reaches a majority.
        Undecided {
            description("sampled attribute strings have no majority dialect")
        }
        /// Generic wrapper type for errors from the regex crate.
        Regex(err: RegexError) {
            description("dialect regex error")
            display("{}", err)
            from()
            cause(err)
        }
    }
}

/// The attribute-column format family of a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectFmt {
    Gff3,
    Gtf,
}

impl fmt::Display for DialectFmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &DialectFmt::Gff3 => write!(f, "gff3"),
            &DialectFmt::Gtf => write!(f, "gtf"),
        }
    }
}

/// Formatting convention of an attribute column.
///
/// Instances are usually produced by [`infer_dialect`] over the leading
/// features of a file, but they can also be built by hand and passed to the
/// ingest to skip inference entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialect {
    /// Format family.
    pub fmt: DialectFmt,
    /// Separator between key/value tokens.
    pub field_separator: String,
    /// Separator between a key and its values within one token.
    pub keyval_separator: String,
    /// Separator between multiple values of one key.
    pub multival_separator: String,
    /// Whether the attribute string starts with a field separator.
    pub leading_semicolon: bool,
    /// Whether the attribute string ends with a field separator.
    pub trailing_semicolon: bool,
    /// Whether values are wrapped in double quotes.
    pub quoted_values: bool,
    /// Whether one key may occur in several tokens on the same line.
    pub repeated_keys: bool,
    /// Database-level attribute key ordering used when rendering.
    ///
    /// When unset, per-feature insertion order is used instead.
    pub key_order: Option<Vec<String>>,
}

impl Dialect {

    /// Creates the canonical GFF3 dialect.
    pub fn gff3() -> Dialect {
        Dialect {
            fmt: DialectFmt::Gff3,
            field_separator: GFF3_FIELD_SEP.to_owned(),
            keyval_separator: GFF3_KEYVAL_SEP.to_owned(),
            multival_separator: MULTIVAL_SEP.to_owned(),
            leading_semicolon: false,
            trailing_semicolon: false,
            quoted_values: false,
            repeated_keys: false,
            key_order: None,
        }
    }

    /// Creates the canonical Ensembl-style GTF dialect.
    pub fn gtf() -> Dialect {
        Dialect {
            fmt: DialectFmt::Gtf,
            field_separator: GTF_FIELD_SEP.to_owned(),
            keyval_separator: GTF_KEYVAL_SEP.to_owned(),
            multival_separator: MULTIVAL_SEP.to_owned(),
            leading_semicolon: false,
            trailing_semicolon: true,
            quoted_values: true,
            repeated_keys: true,
            key_order: None,
        }
    }
}

impl Default for Dialect {

    fn default() -> Dialect {
        Dialect::gff3()
    }
}

/// One sampled line's worth of dialect evidence.
///
/// This is the per-line result that [`infer_dialect`] votes over.
#[derive(Debug)]
struct LineEvidence {
    fmt: DialectFmt,
    spaced_fields: bool,
    leading_semicolon: bool,
    trailing_semicolon: bool,
    quoted_values: bool,
    repeated_keys: bool,
    keys: Vec<String>,
}

/// Infers the dialect of a single attribute string.
///
/// Returns `None` for strings that carry no usable evidence (empty or `.`
/// placeholder columns).
pub fn infer_dialect_line(raw: &str) -> Option<Dialect> {
    single_line_evidence(raw).ok().and_then(|ev| ev).map(|ev| evidence_to_dialect(&ev))
}

fn single_line_evidence(raw: &str) -> Result<Option<LineEvidence>, DialectError> {
    let gtf_token_re = Regex::new(r#"^\s*(?P<key>[^\s"]+)\s+(?P<value>.+)$"#)?;

    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == ::UNK_STR {
        return Ok(None);
    }

    let leading = trimmed.starts_with(';');
    let trailing = trimmed.ends_with(';');
    let body = trimmed.trim_matches(';').trim();
    if body.is_empty() {
        return Ok(None);
    }

    let tokens = body.split(';').map(|tok| tok.trim_matches(' ')).collect::<Vec<&str>>();
    let spaced_fields = body.split(';').skip(1).any(|tok| tok.starts_with(' '));

    let mut fmt = None;
    let mut quoted = false;
    let mut keys = Vec::with_capacity(tokens.len());
    for token in tokens.iter() {
        if token.is_empty() {
            continue;
        }
        // An unquoted `=` before any space marks a GFF3 token.
        let eq_pos = token.find('=');
        let space_pos = token.find(' ');
        match (eq_pos, space_pos) {
            (Some(e), Some(s)) if e < s => {
                fmt = fmt.or(Some(DialectFmt::Gff3));
                keys.push(token[..e].to_owned());
            }
            (Some(e), None) => {
                fmt = fmt.or(Some(DialectFmt::Gff3));
                keys.push(token[..e].to_owned());
            }
            _ => {
                match gtf_token_re.captures(token) {
                    Some(cap) => {
                        fmt = fmt.or(Some(DialectFmt::Gtf));
                        if let Some(key) = cap.name("key") {
                            keys.push(key.as_str().to_owned());
                        }
                        if let Some(value) = cap.name("value") {
                            let v = value.as_str();
                            if v.starts_with('"') && v.ends_with('"') && v.len() >= 2 {
                                quoted = true;
                            }
                        }
                    }
                    // A bare word is a key with no values; it carries no
                    // format evidence of its own.
                    None => keys.push((*token).to_owned()),
                }
            }
        }
    }

    let fmt = match fmt {
        Some(f) => f,
        None => return Ok(None),
    };

    let mut repeated = false;
    for (idx, key) in keys.iter().enumerate() {
        if keys[..idx].contains(key) {
            repeated = true;
            break;
        }
    }

    Ok(Some(LineEvidence {
        fmt: fmt,
        spaced_fields: spaced_fields,
        leading_semicolon: leading,
        trailing_semicolon: trailing,
        quoted_values: quoted,
        repeated_keys: repeated,
        keys: keys,
    }))
}

fn evidence_to_dialect(ev: &LineEvidence) -> Dialect {
    let mut dialect = match ev.fmt {
        DialectFmt::Gff3 => Dialect::gff3(),
        DialectFmt::Gtf => Dialect::gtf(),
    };
    dialect.field_separator =
        if ev.spaced_fields { GTF_FIELD_SEP.to_owned() } else { GFF3_FIELD_SEP.to_owned() };
    dialect.leading_semicolon = ev.leading_semicolon;
    dialect.trailing_semicolon = ev.trailing_semicolon;
    dialect.quoted_values = ev.quoted_values;
    dialect.repeated_keys = ev.repeated_keys;
    dialect.key_order = Some(ev.keys.clone());
    dialect
}

/// Infers a dialect by majority vote over sampled attribute strings.
///
/// Each sample is the literal ninth column of one record. Samples without
/// usable evidence are skipped. The format is decided by comparing how many
/// samples parse as GFF3 (`=`-separated) versus GTF (space-separated); ties
/// prefer GFF3. The remaining flags are decided field-wise by simple
/// majority over the samples that matched the winning format.
pub fn infer_dialect<I, S>(samples: I) -> Result<Dialect, DialectError>
    where I: IntoIterator<Item = S>, S: AsRef<str>
{
    let mut evidences = Vec::new();
    for sample in samples {
        if let Some(ev) = single_line_evidence(sample.as_ref())? {
            evidences.push(ev);
        }
    }
    if evidences.is_empty() {
        return Err(DialectError::NoSamples);
    }

    let n_gtf = evidences.iter().filter(|ev| ev.fmt == DialectFmt::Gtf).count();
    let n_gff3 = evidences.len() - n_gtf;
    let fmt = if n_gtf > n_gff3 { DialectFmt::Gtf } else { DialectFmt::Gff3 };

    let votes = evidences.iter().filter(|ev| ev.fmt == fmt).collect::<Vec<&LineEvidence>>();
    if votes.is_empty() {
        return Err(DialectError::Undecided);
    }
    let quorum = votes.len() / 2 + 1;
    let tally = |pred: &dyn Fn(&LineEvidence) -> bool| {
        votes.iter().filter(|ev| pred(**ev)).count() >= quorum
    };

    let mut dialect = match fmt {
        DialectFmt::Gff3 => Dialect::gff3(),
        DialectFmt::Gtf => Dialect::gtf(),
    };
    dialect.field_separator =
        if tally(&|ev| ev.spaced_fields) { GTF_FIELD_SEP.to_owned() } else { GFF3_FIELD_SEP.to_owned() };
    dialect.leading_semicolon = tally(&|ev| ev.leading_semicolon);
    dialect.trailing_semicolon = tally(&|ev| ev.trailing_semicolon);
    dialect.quoted_values = tally(&|ev| ev.quoted_values);
    dialect.repeated_keys = votes.iter().any(|ev| ev.repeated_keys);
    dialect.key_order = Some(majority_key_order(&votes));

    Ok(dialect)
}

/// Returns the most frequent key sequence among the voting lines.
///
/// Ties are broken in favor of the sequence seen first, which keeps the
/// stored ordering stable for homogeneous files.
fn majority_key_order(votes: &[&LineEvidence]) -> Vec<String> {
    let mut orders: Vec<(&[String], usize)> = Vec::new();
    for ev in votes.iter() {
        match orders.iter().position(|&(keys, _)| keys == ev.keys.as_slice()) {
            Some(idx) => orders[idx].1 += 1,
            None => orders.push((ev.keys.as_slice(), 1)),
        }
    }
    let mut best: Option<(&[String], usize)> = None;
    for &(keys, count) in orders.iter() {
        let better = match best {
            Some((_, best_count)) => count > best_count,
            None => true,
        };
        if better {
            best = Some((keys, count));
        }
    }
    best.map(|(keys, _)| keys.to_vec()).unwrap_or_else(Vec::new)
}
