/*! Primary-key assignment and collision policies.

Every feature entering the store needs a unique primary key, but annotation
files rarely agree on where that key lives: GFF3 files carry an `ID`
attribute, GTF files carry `gene_id`/`transcript_id`, tool output sometimes
carries nothing usable at all. The [`IdSpec`] variants cover the observed
cases, and an [`Autoincrementer`] backs every fallback path with stable
`<base>_<n>` keys.

When two rows resolve to the same key, the configured [`MergeStrategy`]
decides between failing, skipping, merging, uniquifying, or replacing.
*/
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

use linked_hash_map::{self, LinkedHashMap};

use Feature;


quick_error! {
    /// Errors that occur when assigning or reconciling primary keys.
    #[derive(Debug)]
    pub enum IdError {
        /// Occurs when two rows claim the same primary key under the `error`
        /// strategy.
        Duplicate(id: String, line: u64) {
            description("duplicate primary key")
            display(self_) -> ("{}: {:?}, line {}", self_.description(), id, line)
        }
        /// Occurs when the merge strategy cannot reconcile two rows because
        /// their non-attribute columns differ.
        MergeConflict(id: String, line: u64) {
            description("rows with the same primary key have conflicting fields")
            display(self_) -> ("{}: {:?}, line {}", self_.description(), id, line)
        }
        /// Occurs when a `:FIELD:` reference names an unknown column.
        UnknownField(name: String) {
            description("unknown special field in id spec")
            display(self_) -> ("{}: {:?}", self_.description(), name)
        }
    }
}

/// A primary key produced by a callable id spec.
#[derive(Debug, Clone, PartialEq)]
pub enum IdKey {
    /// Use this exact string.
    Literal(String),
    /// Ask the autoincrementer for the next `<base>_<n>` key.
    Autoincrement(String),
}

/// User policy for deriving a feature's primary key.
pub enum IdSpec {
    /// Autoincrement per featuretype (`gene_1`, `gene_2`, ...).
    Auto,
    /// The first value of the named attribute, or a `:FIELD:` column
    /// reference; falls back to autoincrement when absent.
    Key(String),
    /// The first present key of an ordered list of candidates.
    Keys(Vec<String>),
    /// Dispatch by featuretype; unlisted featuretypes autoincrement.
    ByType(HashMap<String, IdSpec>),
    /// A callable receiving the feature in progress.
    ///
    /// `None` falls back to autoincrement keyed by the featuretype.
    Func(Box<dyn Fn(&Feature) -> Option<IdKey>>),
}

impl IdSpec {

    /// Returns whether this spec is the plain autoincrement policy.
    pub fn is_auto(&self) -> bool {
        match self {
            &IdSpec::Auto => true,
            _ => false,
        }
    }
}

impl fmt::Debug for IdSpec {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &IdSpec::Auto => write!(f, "Auto"),
            &IdSpec::Key(ref key) => write!(f, "Key({:?})", key),
            &IdSpec::Keys(ref keys) => write!(f, "Keys({:?})", keys),
            &IdSpec::ByType(ref map) => {
                let mut keys = map.keys().collect::<Vec<&String>>();
                keys.sort();
                write!(f, "ByType({:?})", keys)
            }
            &IdSpec::Func(_) => write!(f, "Func(..)"),
        }
    }
}

/// Per-base counters backing autoincremented keys.
///
/// Counters keep their first-use order so the persisted `autoincrements`
/// table is stable across identical ingests.
#[derive(Debug, Clone, Default)]
pub struct Autoincrementer {
    counts: LinkedHashMap<String, i64>,
}

impl Autoincrementer {

    pub fn new() -> Autoincrementer {
        Autoincrementer { counts: LinkedHashMap::new() }
    }

    /// Increments the counter of the given base and returns its new value.
    pub fn next(&mut self, base: &str) -> i64 {
        let count = self.counts.entry(base.to_owned()).or_insert(0);
        *count += 1;
        *count
    }

    /// Increments the counter of the given base and renders the full key.
    pub fn next_key(&mut self, base: &str) -> String {
        let n = self.next(base);
        format!("{}_{}", base, n)
    }

    /// Seeds the counter of the given base, e.g. from a persisted store.
    pub fn seed(&mut self, base: &str, n: i64) {
        let _ = self.counts.insert(base.to_owned(), n);
    }

    /// Returns an iterator over `(base, count)` pairs in first-use order.
    pub fn iter(&self) -> linked_hash_map::Iter<String, i64> {
        self.counts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Computes primary keys for features per an [`IdSpec`].
pub struct IdResolver {
    spec: IdSpec,
    counters: Autoincrementer,
}

impl IdResolver {

    pub fn new(spec: IdSpec) -> IdResolver {
        IdResolver {
            spec: spec,
            counters: Autoincrementer::new(),
        }
    }

    /// Returns the primary key for the given feature.
    pub fn assign(&mut self, feature: &Feature) -> Result<String, IdError> {
        self.assign_with_default(feature, None)
    }

    /// Returns the primary key for the given feature, preferring `default`
    /// over autoincrement when the spec yields nothing.
    ///
    /// This is how synthesized gene and transcript rows keep their grouping
    /// key as their primary key unless the spec says otherwise.
    pub fn assign_with_default(
        &mut self,
        feature: &Feature,
        default: Option<&str>,
    ) -> Result<String, IdError> {

        let candidate = candidate_key(&self.spec, feature)?;
        match candidate {
            Some(IdKey::Literal(key)) => Ok(key),
            Some(IdKey::Autoincrement(base)) => Ok(self.counters.next_key(base.as_str())),
            None => {
                match default {
                    Some(key) => Ok(key.to_owned()),
                    None => Ok(self.counters.next_key(feature.featuretype())),
                }
            }
        }
    }

    /// Returns the counters accumulated so far.
    pub fn counters(&self) -> &Autoincrementer {
        &self.counters
    }

    /// Consumes the resolver, returning its counters for persistence.
    pub fn into_counters(self) -> Autoincrementer {
        self.counters
    }
}

/// Resolves a spec to a candidate key, without autoincrement fallback.
fn candidate_key(spec: &IdSpec, feature: &Feature) -> Result<Option<IdKey>, IdError> {
    match spec {
        &IdSpec::Auto => Ok(None),
        &IdSpec::Key(ref key) => lookup_key(key.as_str(), feature),
        &IdSpec::Keys(ref keys) => {
            for key in keys.iter() {
                if let Some(found) = lookup_key(key.as_str(), feature)? {
                    return Ok(Some(found));
                }
            }
            Ok(None)
        }
        &IdSpec::ByType(ref map) => {
            match map.get(feature.featuretype()) {
                Some(inner) => candidate_key(inner, feature),
                None => Ok(None),
            }
        }
        &IdSpec::Func(ref func) => Ok(func(feature)),
    }
}

/// Looks up one attribute key or `:FIELD:` column reference.
fn lookup_key(key: &str, feature: &Feature) -> Result<Option<IdKey>, IdError> {
    if key.len() > 2 && key.starts_with(':') && key.ends_with(':') {
        let field = &key[1..key.len() - 1];
        return special_field(field, feature)
            .map(|value| value.map(IdKey::Literal));
    }
    // An empty attribute value cannot serve as a primary key; treat it the
    // same as an absent one.
    Ok(feature.attributes().first(key)
        .filter(|value| !value.is_empty())
        .map(|value| IdKey::Literal(value.to_owned())))
}

/// Returns the string form of a named fixed column.
fn special_field(field: &str, feature: &Feature) -> Result<Option<String>, IdError> {
    let value = match field {
        "seqid" => Some(feature.seqid().to_owned()),
        "source" => Some(feature.source().to_owned()),
        "featuretype" => Some(feature.featuretype().to_owned()),
        "start" => feature.start().map(|coord| coord.to_string()),
        "end" => feature.end().map(|coord| coord.to_string()),
        "score" => Some(feature.score().to_owned()),
        "strand" => Some(feature.strand().to_owned()),
        "frame" => Some(feature.frame().to_owned()),
        _ => return Err(IdError::UnknownField(field.to_owned())),
    };
    Ok(value)
}

/// Policy for resolving two features that claim the same primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Fail the ingest.
    Error,
    /// Log a warning and skip the new row.
    Warning,
    /// Combine the rows if their non-attribute columns agree.
    Merge,
    /// Keep both rows, giving the new one a `_<n>`-suffixed key.
    CreateUnique,
    /// Let the new row overwrite the existing one.
    Replace,
}

impl FromStr for MergeStrategy {

    type Err = String;

    fn from_str(s: &str) -> Result<MergeStrategy, String> {
        match s {
            "error" => Ok(MergeStrategy::Error),
            "warning" => Ok(MergeStrategy::Warning),
            "merge" => Ok(MergeStrategy::Merge),
            "create_unique" => Ok(MergeStrategy::CreateUnique),
            "replace" => Ok(MergeStrategy::Replace),
            otherwise => Err(format!("unknown merge strategy: {:?}", otherwise)),
        }
    }
}

impl fmt::Display for MergeStrategy {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            &MergeStrategy::Error => "error",
            &MergeStrategy::Warning => "warning",
            &MergeStrategy::Merge => "merge",
            &MergeStrategy::CreateUnique => "create_unique",
            &MergeStrategy::Replace => "replace",
        };
        write!(f, "{}", name)
    }
}

/// Merge strategies for an ingest, with optional per-featuretype overrides.
#[derive(Debug, Clone)]
pub struct MergePolicy {
    default: MergeStrategy,
    by_type: HashMap<String, MergeStrategy>,
}

impl MergePolicy {

    pub fn new(default: MergeStrategy) -> MergePolicy {
        MergePolicy {
            default: default,
            by_type: HashMap::new(),
        }
    }

    /// Sets the strategy for one featuretype.
    pub fn set_for_type<T>(&mut self, featuretype: T, strategy: MergeStrategy)
        where T: Into<String>
    {
        let _ = self.by_type.insert(featuretype.into(), strategy);
    }

    /// Returns the strategy that applies to the given featuretype.
    pub fn strategy_for(&self, featuretype: &str) -> MergeStrategy {
        self.by_type.get(featuretype).cloned().unwrap_or(self.default)
    }
}

impl Default for MergePolicy {

    fn default() -> MergePolicy {
        MergePolicy::new(MergeStrategy::Error)
    }
}

/// Combines two rows that share a primary key.
///
/// The rows must agree on every non-attribute column other than the score;
/// attribute values are united per key, keeping the existing order and
/// appending unseen values. Merging a feature with itself is a no-op.
pub fn merge_features(existing: &mut Feature, incoming: &Feature) -> Result<(), IdError> {
    if !existing.same_fields(incoming) {
        let id = existing.id().unwrap_or("<unassigned>").to_owned();
        return Err(IdError::MergeConflict(id, incoming.lineno().unwrap_or(0)));
    }
    let pairs = incoming.attributes().iter()
        .map(|(key, values)| (key.clone(), values.clone()))
        .collect::<Vec<(String, Vec<String>)>>();
    for (key, values) in pairs {
        existing.attributes_mut().merge_values(key, values.as_slice());
    }
    Ok(())
}
