/*! The feature model and the tab-record parser.

A [`Feature`] is one annotated interval: the nine columns of a GFF record
plus any trailing extra columns, the primary key assigned during ingest, and
the precomputed UCSC bin used by the store's interval index.

Coordinates are kept as the formats define them: 1-based, inclusive, with
`.` marking an absent value. A present pair must satisfy `start <= end`;
zero-length intervals are not representable and are rejected at parse time.
*/
use std::error::Error;
use std::fmt;
use std::num::ParseIntError;

use attributes::{parse_attributes, render_attributes};
use bins::bin_from_range;
use {AttrError, Attributes, Coord, Dialect};


/// Number of fixed columns in a GFF record.
const N_GFF_FIELDS: usize = 9;

/// Directive prefix.
const DIRECTIVE_PREFIX: &'static str = "##";

/// Directive marking the start of inline FASTA sequence data.
const FASTA_DIRECTIVE: &'static str = "##FASTA";

quick_error! {
    /// Errors that occur when parsing a single annotation line.
    #[derive(Debug)]
    pub enum LineError {
        /// Occurs when a record has fewer than nine tab-separated fields.
        FieldCount(found: usize, line: u64) {
            description("record has fewer than nine fields")
            display(self_) -> ("{} ({} found), line {}", self_.description(), found, line)
        }
        /// Occurs when a start or end column is neither an integer nor `.`.
        Coordinate(err: ParseIntError, line: u64) {
            description("coordinate column is not an integer")
            display(self_) -> ("{}: {}, line {}", self_.description(), err, line)
        }
        /// Occurs when a record's start coordinate is larger than its end
        /// coordinate.
        ReversedCoordinates(line: u64) {
            description("start coordinate larger than end coordinate")
            display(self_) -> ("{}, line {}", self_.description(), line)
        }
        /// Occurs when the attribute column cannot be parsed.
        Attr(err: AttrError, line: u64) {
            description("attribute column cannot be parsed")
            display(self_) -> ("{}: {}, line {}", self_.description(), err, line)
            cause(err)
        }
    }
}

/// One parsed line of annotation input.
#[derive(Debug, Clone, PartialEq)]
pub enum GffLine {
    /// A tab-separated feature record.
    Feature(Feature),
    /// A `##`-prefixed header line, stored verbatim.
    Directive(String),
    /// A `#`-prefixed comment, skipped by the ingest.
    Comment(String),
    /// An empty line.
    Blank,
    /// The `##FASTA` directive; everything after it is sequence data.
    Fasta,
}

/// A single annotated interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    id: Option<String>,
    seqid: String,
    source: String,
    featuretype: String,
    start: Option<u64>,
    end: Option<u64>,
    score: String,
    strand: String,
    frame: String,
    attributes: Attributes,
    extra: Vec<String>,
    bin: Option<u32>,
    dialect: Option<Dialect>,
    lineno: Option<u64>,
}

impl Feature {

    /// Returns the assigned primary key, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_ref().map(|id| id.as_str())
    }

    /// Sets the primary key.
    pub fn set_id<T>(&mut self, id: T)
        where T: Into<String>
    {
        self.id = Some(id.into());
    }

    /// Returns the reference sequence name.
    pub fn seqid(&self) -> &str {
        self.seqid.as_str()
    }

    /// Sets the reference sequence name.
    pub fn set_seqid<T>(&mut self, seqid: T)
        where T: Into<String>
    {
        self.seqid = seqid.into();
    }

    /// Returns the annotation source column.
    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    /// Sets the annotation source column.
    pub fn set_source<T>(&mut self, source: T)
        where T: Into<String>
    {
        self.source = source.into();
    }

    /// Returns the feature type column.
    pub fn featuretype(&self) -> &str {
        self.featuretype.as_str()
    }

    /// Sets the feature type column.
    pub fn set_featuretype<T>(&mut self, featuretype: T)
        where T: Into<String>
    {
        self.featuretype = featuretype.into();
    }

    /// Returns the 1-based inclusive start coordinate.
    pub fn start(&self) -> Option<u64> {
        self.start
    }

    /// Returns the 1-based inclusive end coordinate.
    pub fn end(&self) -> Option<u64> {
        self.end
    }

    /// Returns the start and end coordinates as a pair.
    pub fn coords(&self) -> Coord {
        (self.start, self.end)
    }

    /// Sets the coordinates, recomputing the bin column.
    pub fn set_coords(&mut self, start: Option<u64>, end: Option<u64>) {
        self.start = start;
        self.end = end;
        self.bin = compute_bin(start, end);
    }

    /// Returns the score column.
    pub fn score(&self) -> &str {
        self.score.as_str()
    }

    /// Sets the score column.
    pub fn set_score<T>(&mut self, score: T)
        where T: Into<String>
    {
        self.score = score.into();
    }

    /// Returns the strand column.
    pub fn strand(&self) -> &str {
        self.strand.as_str()
    }

    /// Sets the strand column.
    pub fn set_strand<T>(&mut self, strand: T)
        where T: Into<String>
    {
        self.strand = strand.into();
    }

    /// Returns the frame column.
    pub fn frame(&self) -> &str {
        self.frame.as_str()
    }

    /// Sets the frame column.
    pub fn set_frame<T>(&mut self, frame: T)
        where T: Into<String>
    {
        self.frame = frame.into();
    }

    /// Returns the attribute map.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns the attribute map for modification.
    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    /// Replaces the attribute map.
    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
    }

    /// Returns the trailing columns beyond the ninth.
    pub fn extra(&self) -> &[String] {
        self.extra.as_slice()
    }

    /// Replaces the trailing columns.
    pub fn set_extra(&mut self, extra: Vec<String>) {
        self.extra = extra;
    }

    /// Returns the UCSC bin of the coordinates, if they are present.
    pub fn bin(&self) -> Option<u32> {
        self.bin
    }

    /// Returns the dialect attached to this feature, if any.
    pub fn dialect(&self) -> Option<&Dialect> {
        self.dialect.as_ref()
    }

    /// Attaches the dialect used when rendering this feature as text.
    pub fn set_dialect(&mut self, dialect: Option<Dialect>) {
        self.dialect = dialect;
    }

    /// Returns the 1-based input line this feature was parsed from, if any.
    pub fn lineno(&self) -> Option<u64> {
        self.lineno
    }

    /// Returns whether all non-attribute columns other than the score match.
    ///
    /// This is the equality the merge policy requires before two rows with
    /// the same primary key may be combined.
    pub fn same_fields(&self, other: &Feature) -> bool {
        self.seqid == other.seqid
            && self.source == other.source
            && self.featuretype == other.featuretype
            && self.start == other.start
            && self.end == other.end
            && self.strand == other.strand
            && self.frame == other.frame
    }

    /// Renders the feature as one GFF text line under the given dialect.
    pub fn to_gff_line(&self, dialect: &Dialect, encode_percent: bool) -> String {
        let mut fields = Vec::with_capacity(N_GFF_FIELDS + self.extra.len());
        fields.push(self.seqid.clone());
        fields.push(self.source.clone());
        fields.push(self.featuretype.clone());
        fields.push(coord_field(self.start));
        fields.push(coord_field(self.end));
        fields.push(self.score.clone());
        fields.push(self.strand.clone());
        fields.push(self.frame.clone());
        fields.push(render_attributes(&self.attributes, dialect, encode_percent));
        for field in self.extra.iter() {
            fields.push(field.clone());
        }
        fields.join("\t")
    }
}

impl fmt::Display for Feature {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fallback = Dialect::default();
        let dialect = self.dialect.as_ref().unwrap_or(&fallback);
        write!(f, "{}", self.to_gff_line(dialect, true))
    }
}

/// Feature builder.
pub struct FBuilder {
    seqid: String,
    featuretype: String,
    source: String,
    start: Option<u64>,
    end: Option<u64>,
    score: String,
    strand: String,
    frame: String,
    id: Option<String>,
    attributes: Attributes,
    extra: Vec<String>,
    dialect: Option<Dialect>,
    lineno: Option<u64>,
}

impl FBuilder {

    pub fn new<T, U>(seqid: T, featuretype: U) -> Self
        where T: Into<String>, U: Into<String>
    {
        FBuilder {
            seqid: seqid.into(),
            featuretype: featuretype.into(),
            source: ::UNK_STR.to_owned(),
            start: None,
            end: None,
            score: ::UNK_STR.to_owned(),
            strand: ::UNK_STR.to_owned(),
            frame: ::UNK_STR.to_owned(),
            id: None,
            attributes: Attributes::new(),
            extra: Vec::new(),
            dialect: None,
            lineno: None,
        }
    }

    pub fn source<T>(mut self, source: T) -> Self
        where T: Into<String>
    {
        self.source = source.into();
        self
    }

    pub fn coords(mut self, start: u64, end: u64) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn coords_opt(mut self, start: Option<u64>, end: Option<u64>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn score<T>(mut self, score: T) -> Self
        where T: Into<String>
    {
        self.score = score.into();
        self
    }

    pub fn strand<T>(mut self, strand: T) -> Self
        where T: Into<String>
    {
        self.strand = strand.into();
        self
    }

    pub fn frame<T>(mut self, frame: T) -> Self
        where T: Into<String>
    {
        self.frame = frame.into();
        self
    }

    pub fn id<T>(mut self, id: T) -> Self
        where T: Into<String>
    {
        self.id = Some(id.into());
        self
    }

    pub fn attribute<K, V>(mut self, key: K, value: V) -> Self
        where K: Into<String>, V: Into<String>
    {
        self.attributes.append_value(key, value);
        self
    }

    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn extra(mut self, extra: Vec<String>) -> Self {
        self.extra = extra;
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn lineno(mut self, lineno: u64) -> Self {
        self.lineno = Some(lineno);
        self
    }

    pub fn build(self) -> Result<Feature, LineError> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(LineError::ReversedCoordinates(self.lineno.unwrap_or(0)));
            }
        }
        let bin = compute_bin(self.start, self.end);
        Ok(Feature {
            id: self.id,
            seqid: self.seqid,
            source: self.source,
            featuretype: self.featuretype,
            start: self.start,
            end: self.end,
            score: self.score,
            strand: self.strand,
            frame: self.frame,
            attributes: self.attributes,
            extra: self.extra,
            bin: bin,
            dialect: self.dialect,
            lineno: self.lineno,
        })
    }
}

/// Parses one line of annotation input.
///
/// `lineno` is the 1-based position of the line in its source and is carried
/// into any error raised here.
pub fn parse_line(
    line: &str,
    lineno: u64,
    dialect: &Dialect,
    decode_percent: bool,
) -> Result<GffLine, LineError> {

    let trimmed = line.trim_end_matches(|c| c == '\n' || c == '\r');
    if trimmed.trim().is_empty() {
        return Ok(GffLine::Blank);
    }
    if trimmed == FASTA_DIRECTIVE {
        return Ok(GffLine::Fasta);
    }
    if trimmed.starts_with(DIRECTIVE_PREFIX) {
        return Ok(GffLine::Directive(trimmed.to_owned()));
    }
    if trimmed.starts_with('#') {
        return Ok(GffLine::Comment(trimmed.to_owned()));
    }

    let fields = trimmed.split('\t').collect::<Vec<&str>>();
    if fields.len() < N_GFF_FIELDS {
        return Err(LineError::FieldCount(fields.len(), lineno));
    }

    let start = parse_coord(fields[3], lineno)?;
    let end = parse_coord(fields[4], lineno)?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(LineError::ReversedCoordinates(lineno));
        }
    }

    let attributes = parse_attributes(fields[8], dialect, decode_percent)
        .map_err(|err| LineError::Attr(err, lineno))?;

    let extra = fields[N_GFF_FIELDS..].iter()
        .map(|field| (*field).to_owned())
        .collect::<Vec<String>>();

    Ok(GffLine::Feature(Feature {
        id: None,
        seqid: fields[0].to_owned(),
        source: fields[1].to_owned(),
        featuretype: fields[2].to_owned(),
        start: start,
        end: end,
        score: fields[5].to_owned(),
        strand: fields[6].to_owned(),
        frame: fields[7].to_owned(),
        attributes: attributes,
        extra: extra,
        bin: compute_bin(start, end),
        dialect: None,
        lineno: Some(lineno),
    }))
}

/// Parses one coordinate column.
fn parse_coord(field: &str, lineno: u64) -> Result<Option<u64>, LineError> {
    if field == ::UNK_STR || field.is_empty() {
        return Ok(None);
    }
    field.parse::<u64>()
        .map(Some)
        .map_err(|err| LineError::Coordinate(err, lineno))
}

/// Renders one coordinate column.
fn coord_field(coord: Option<u64>) -> String {
    match coord {
        Some(value) => value.to_string(),
        None => ::UNK_STR.to_owned(),
    }
}

/// Computes the UCSC bin for a 1-based inclusive coordinate pair.
fn compute_bin(start: Option<u64>, end: Option<u64>) -> Option<u32> {
    match (start, end) {
        (Some(s), Some(e)) if s > 0 => Some(bin_from_range(s - 1, e)),
        _ => None,
    }
}
