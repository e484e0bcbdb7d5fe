/*! The ingest pipeline.

[`DbBuilder`] wires the stages together: the input source is opened as a
line stream, the leading records are peeked for dialect inference, the full
stream is then parsed under the settled dialect, and every feature flows
through the user transform, primary-key assignment, and collision handling
before landing in the store. GFF3 `Parent` attributes are staged as edges
along the way; GTF component rows feed the gene/transcript inference, whose
synthesized rows are appended after the last file-order feature. One commit
closes the ingest.

Everything here runs single-threaded and pull-driven; the only suspension
points are reads from the source and writes to the store. A shared cancel
flag is checked between records, and a cancelled or failed ingest leaves no
store file behind.
*/
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use multimap::MultiMap;

use attributes::render_attributes;
use dialect::{infer_dialect, infer_dialect_line};
use ids::{Autoincrementer, IdResolver, IdSpec, MergePolicy, MergeStrategy, merge_features};
use infer::GtfInference;
use io_gff::{GffSource, LineStream, PeekedLines, peek_lines};
use model::parse_line;
use store::{FeatureDb, StoreError, StoreWriter};
use utils::attribute_column;
use {Dialect, DialectError, DialectFmt, Error, Feature, GffLine, IdError};


/// Attribute key GFF3 uses for primary identifiers.
const GFF3_ID_KEY: &'static str = "ID";

/// Attribute key GFF3 uses to reference parent features.
const GFF3_PARENT_KEY: &'static str = "Parent";

/// Default GTF attribute key for gene identifiers.
const GTF_GENE_KEY: &'static str = "gene_id";

/// Default GTF attribute key for transcript identifiers.
const GTF_TRANSCRIPT_KEY: &'static str = "transcript_id";

/// Default GTF component featuretype driving inference.
const GTF_SUBFEATURE: &'static str = "exon";

/// Featuretype of gene rows.
const GENE_STR: &'static str = "gene";

/// Featuretype of transcript rows.
const TRANSCRIPT_STR: &'static str = "transcript";

/// Ingest progress is logged every this many stored features.
const PROGRESS_EVERY: u64 = 100_000;

/// Per-feature transform applied before primary-key assignment.
///
/// Returning `None` drops the feature.
pub type Transform = Box<dyn Fn(Feature) -> Option<Feature>>;

/// Builder for a feature store ingest.
pub struct DbBuilder {
    source: GffSource,
    dest: PathBuf,
    id_spec: IdSpec,
    merge_policy: MergePolicy,
    transform: Option<Transform>,
    dialect: Option<Dialect>,
    force: bool,
    verbose: bool,
    checklines: Option<usize>,
    force_gff: bool,
    force_dialect_check: bool,
    gtf_transcript_key: String,
    gtf_gene_key: String,
    gtf_subfeature: String,
    disable_infer_transcripts: bool,
    disable_infer_genes: bool,
    keep_order: bool,
    sort_attribute_values: bool,
    ignore_malformed_lines: bool,
    percent_codec: bool,
    maxlevel: i64,
    cancel: Option<Arc<AtomicBool>>,
}

impl DbBuilder {

    pub fn new<S, P>(source: S, dest: P) -> DbBuilder
        where S: Into<GffSource>, P: AsRef<Path>
    {
        DbBuilder {
            source: source.into(),
            dest: dest.as_ref().to_path_buf(),
            id_spec: IdSpec::Auto,
            merge_policy: MergePolicy::default(),
            transform: None,
            dialect: None,
            force: false,
            verbose: false,
            checklines: Some(::DEF_CHECKLINES),
            force_gff: false,
            force_dialect_check: false,
            gtf_transcript_key: GTF_TRANSCRIPT_KEY.to_owned(),
            gtf_gene_key: GTF_GENE_KEY.to_owned(),
            gtf_subfeature: GTF_SUBFEATURE.to_owned(),
            disable_infer_transcripts: false,
            disable_infer_genes: false,
            keep_order: false,
            sort_attribute_values: false,
            ignore_malformed_lines: false,
            percent_codec: true,
            maxlevel: ::DEF_MAXLEVEL,
            cancel: None,
        }
    }

    /// Sets the primary-key policy.
    ///
    /// The default derives keys from the `ID` attribute for GFF3 input and
    /// from the gene/transcript identifier attributes for GTF input, with
    /// autoincrement fallbacks everywhere else.
    pub fn id_spec(mut self, id_spec: IdSpec) -> Self {
        self.id_spec = id_spec;
        self
    }

    /// Sets the strategy applied when two rows claim the same primary key.
    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_policy = MergePolicy::new(strategy);
        self
    }

    /// Overrides the merge strategy for one featuretype.
    pub fn merge_strategy_for<T>(mut self, featuretype: T, strategy: MergeStrategy) -> Self
        where T: Into<String>
    {
        self.merge_policy.set_for_type(featuretype, strategy);
        self
    }

    /// Sets a transform applied to every feature before key assignment.
    pub fn transform<F>(mut self, transform: F) -> Self
        where F: Fn(Feature) -> Option<Feature> + 'static
    {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Fixes the dialect, skipping inference entirely.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Sets whether an existing destination store is overwritten.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Sets whether ingest progress is logged.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets how many leading records are sampled for dialect inference;
    /// `None` samples the whole input.
    pub fn checklines(mut self, checklines: Option<usize>) -> Self {
        self.checklines = checklines;
        self
    }

    /// Treats the input as plain GFF even when it looks like GTF, skipping
    /// gene/transcript inference.
    pub fn force_gff(mut self, force_gff: bool) -> Self {
        self.force_gff = force_gff;
        self
    }

    /// Re-infers the dialect on every line, for internally inconsistent
    /// files. Slow; the majority dialect is still the one stored.
    pub fn force_dialect_check(mut self, force_dialect_check: bool) -> Self {
        self.force_dialect_check = force_dialect_check;
        self
    }

    /// Sets the attribute key GTF inference groups transcripts by.
    pub fn gtf_transcript_key<T>(mut self, key: T) -> Self
        where T: Into<String>
    {
        self.gtf_transcript_key = key.into();
        self
    }

    /// Sets the attribute key GTF inference groups genes by.
    pub fn gtf_gene_key<T>(mut self, key: T) -> Self
        where T: Into<String>
    {
        self.gtf_gene_key = key.into();
        self
    }

    /// Sets the component featuretype GTF inference is driven by.
    pub fn gtf_subfeature<T>(mut self, subfeature: T) -> Self
        where T: Into<String>
    {
        self.gtf_subfeature = subfeature.into();
        self
    }

    /// Disables synthesis of transcript rows during GTF ingest.
    pub fn disable_infer_transcripts(mut self, disable: bool) -> Self {
        self.disable_infer_transcripts = disable;
        self
    }

    /// Disables synthesis of gene rows during GTF ingest.
    pub fn disable_infer_genes(mut self, disable: bool) -> Self {
        self.disable_infer_genes = disable;
        self
    }

    /// Preserves each feature's own attribute-key order when rendering,
    /// instead of the store-wide order captured by inference.
    pub fn keep_order(mut self, keep_order: bool) -> Self {
        self.keep_order = keep_order;
        self
    }

    /// Sorts multi-values within each attribute key at ingest time, giving
    /// stable rendering at the cost of strict round-trip fidelity.
    pub fn sort_attribute_values(mut self, sort: bool) -> Self {
        self.sort_attribute_values = sort;
        self
    }

    /// Skips structurally malformed lines with a warning instead of failing
    /// the ingest.
    pub fn ignore_malformed_lines(mut self, ignore: bool) -> Self {
        self.ignore_malformed_lines = ignore;
        self
    }

    /// Sets whether `%XX` escapes are decoded and re-encoded in GFF3
    /// attributes. On by default.
    pub fn percent_codec(mut self, percent_codec: bool) -> Self {
        self.percent_codec = percent_codec;
        self
    }

    /// Sets the highest transitive relation level to materialize.
    pub fn maxlevel(mut self, maxlevel: i64) -> Self {
        self.maxlevel = maxlevel;
        self
    }

    /// Installs a flag that cancels the ingest when set.
    ///
    /// The flag is checked between records; a cancelled ingest rolls back
    /// and removes the partially written store.
    pub fn cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Runs the ingest and returns a read handle on the new store.
    pub fn run(self) -> ::Result<FeatureDb> {
        let dest = self.dest.clone();
        match self.run_inner() {
            Ok(()) => FeatureDb::open(&dest),
            Err(err) => {
                // Leave an untouched pre-existing store alone; otherwise
                // nothing of the failed ingest must remain on disk.
                let pre_existing = match &err {
                    &Error::Store(StoreError::AlreadyExists(_)) => true,
                    _ => false,
                };
                if !pre_existing {
                    let _ = fs::remove_file(&dest);
                }
                Err(err)
            }
        }
    }

    fn run_inner(self) -> ::Result<()> {
        let DbBuilder {
            source, dest, id_spec, merge_policy, transform, dialect,
            force, verbose, checklines, force_gff, force_dialect_check,
            gtf_transcript_key, gtf_gene_key, gtf_subfeature,
            disable_infer_transcripts, disable_infer_genes,
            keep_order, sort_attribute_values, ignore_malformed_lines,
            percent_codec, maxlevel, cancel,
        } = self;

        let writer = StoreWriter::create(&dest, force).map_err(Error::Store)?;

        // Settle the dialect first: explicitly given, or voted over the
        // peeked prefix of the input.
        let (dialect, lines) = match source {
            GffSource::Features(features) => {
                let dialect = match dialect {
                    Some(dialect) => dialect,
                    None => infer_from_features(&features, checklines, percent_codec)?,
                };
                let mut ingest = Ingest::new(
                    writer, &dialect, id_spec, merge_policy, transform,
                    force_gff, gtf_transcript_key, gtf_gene_key, gtf_subfeature,
                    disable_infer_transcripts, disable_infer_genes,
                    sort_attribute_values, verbose, cancel);
                for feature in features {
                    ingest.process(feature)?;
                }
                return ingest.finish(dialect, keep_order, maxlevel);
            }
            ref source => {
                let stream = LineStream::open(source)?;
                match dialect {
                    Some(dialect) => (dialect, Replayable::Plain(stream)),
                    None => {
                        let (buffer, rest) = peek_lines(stream, checklines)?;
                        let samples = buffer.iter()
                            .filter(|&&(_, ref line)| {
                                !line.trim().is_empty() && !line.starts_with('#')
                            })
                            .filter_map(|&(_, ref line)| attribute_column(line.as_str()));
                        let dialect = match infer_dialect(samples) {
                            Ok(dialect) => dialect,
                            Err(DialectError::NoSamples) => Dialect::default(),
                            Err(err) => return Err(Error::Dialect(err)),
                        };
                        (dialect, Replayable::Peeked(rest))
                    }
                }
            }
        };

        if verbose {
            info!("ingesting with inferred {} dialect", dialect.fmt);
        }

        let mut ingest = Ingest::new(
            writer, &dialect, id_spec, merge_policy, transform,
            force_gff, gtf_transcript_key, gtf_gene_key, gtf_subfeature,
            disable_infer_transcripts, disable_infer_genes,
            sort_attribute_values, verbose, cancel);

        for result in lines {
            let (lineno, line) = result?;
            let line_dialect = if force_dialect_check {
                attribute_column(line.as_str())
                    .and_then(infer_dialect_line)
                    .unwrap_or_else(|| dialect.clone())
            } else {
                dialect.clone()
            };
            let parsed = match parse_line(line.as_str(), lineno, &line_dialect, percent_codec) {
                Ok(parsed) => parsed,
                Err(err) => {
                    if ignore_malformed_lines {
                        warn!("skipping malformed line {}: {}", lineno, err);
                        continue;
                    }
                    return Err(Error::Line(err));
                }
            };
            match parsed {
                GffLine::Feature(feature) => ingest.process(feature)?,
                GffLine::Directive(directive) => ingest.directives.push(directive),
                GffLine::Comment(_) | GffLine::Blank => {}
                GffLine::Fasta => break,
            }
        }

        ingest.finish(dialect, keep_order, maxlevel)
    }
}

/// Creates a store from an annotation file with default settings.
pub fn create_db<P, Q>(source: P, dest: Q) -> ::Result<FeatureDb>
    where P: AsRef<Path>, Q: AsRef<Path>
{
    DbBuilder::new(GffSource::from_path(source), dest).run()
}

/// Opens an existing store for reading.
pub fn open_db<P: AsRef<Path>>(path: P) -> ::Result<FeatureDb> {
    FeatureDb::open(path)
}

/// A line stream that may have been peeked at.
enum Replayable {
    Plain(LineStream),
    Peeked(PeekedLines),
}

impl Iterator for Replayable {

    type Item = io::Result<(u64, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            &mut Replayable::Plain(ref mut stream) => stream.next(),
            &mut Replayable::Peeked(ref mut stream) => stream.next(),
        }
    }
}

/// Infers the store dialect from an in-memory feature stream.
///
/// Each sampled feature's attribute column is re-rendered under the dialect
/// the feature itself carries, then voted over like file input.
fn infer_from_features(
    features: &[Feature],
    checklines: Option<usize>,
    percent_codec: bool,
) -> ::Result<Dialect> {

    let n = checklines.unwrap_or(features.len());
    let fallback = Dialect::default();
    let samples = features.iter()
        .take(n)
        .map(|feature| {
            let dialect = feature.dialect().unwrap_or(&fallback);
            render_attributes(feature.attributes(), dialect, percent_codec)
        });
    match infer_dialect(samples) {
        Ok(dialect) => Ok(dialect),
        Err(DialectError::NoSamples) => Ok(Dialect::default()),
        Err(err) => Err(Error::Dialect(err)),
    }
}

/// Mutable state of one running ingest.
struct Ingest {
    writer: StoreWriter,
    resolver: IdResolver,
    merge_policy: MergePolicy,
    transform: Option<Transform>,
    uniquifier: Autoincrementer,
    duplicates: MultiMap<String, String>,
    staged_edges: Vec<(String, String)>,
    inference: Option<GtfInference>,
    directives: Vec<String>,
    sort_attribute_values: bool,
    verbose: bool,
    cancel: Option<Arc<AtomicBool>>,
    n_stored: u64,
}

impl Ingest {

    fn new(
        writer: StoreWriter,
        dialect: &Dialect,
        id_spec: IdSpec,
        merge_policy: MergePolicy,
        transform: Option<Transform>,
        force_gff: bool,
        gtf_transcript_key: String,
        gtf_gene_key: String,
        gtf_subfeature: String,
        disable_infer_transcripts: bool,
        disable_infer_genes: bool,
        sort_attribute_values: bool,
        verbose: bool,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Ingest {

        let gtf_mode = dialect.fmt == DialectFmt::Gtf && !force_gff;
        let spec = if id_spec.is_auto() {
            default_id_spec(dialect.fmt, gtf_gene_key.as_str(), gtf_transcript_key.as_str())
        } else {
            id_spec
        };
        let inference = if gtf_mode && !(disable_infer_transcripts && disable_infer_genes) {
            let mut inference = GtfInference::new(
                gtf_transcript_key, gtf_gene_key, gtf_subfeature);
            let _ = inference.infer_transcripts(!disable_infer_transcripts);
            let _ = inference.infer_genes(!disable_infer_genes);
            Some(inference)
        } else {
            None
        };

        Ingest {
            writer: writer,
            resolver: IdResolver::new(spec),
            merge_policy: merge_policy,
            transform: transform,
            uniquifier: Autoincrementer::new(),
            duplicates: MultiMap::new(),
            staged_edges: Vec::new(),
            inference: inference,
            directives: Vec::new(),
            sort_attribute_values: sort_attribute_values,
            verbose: verbose,
            cancel: cancel,
            n_stored: 0,
        }
    }

    fn check_cancel(&self) -> ::Result<()> {
        if let Some(ref cancel) = self.cancel {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }

    /// Runs one feature through transform, key assignment, and collision
    /// handling, then stores it.
    fn process(&mut self, feature: Feature) -> ::Result<()> {
        self.check_cancel()?;

        let mut feature = match self.transform {
            Some(ref transform) => match transform(feature) {
                Some(feature) => feature,
                None => return Ok(()),
            },
            None => feature,
        };
        if self.sort_attribute_values {
            feature.attributes_mut().sort_values();
        }

        let id = self.resolver.assign(&feature).map_err(Error::Id)?;
        let stored = self.store_with_key(feature, id)?;
        if let Some(stored) = stored {
            self.stage_parent_edges(&stored);
            if let Some(ref mut inference) = self.inference {
                inference.observe(&stored);
            }
            self.n_stored += 1;
            if self.verbose && self.n_stored % PROGRESS_EVERY == 0 {
                info!("{} features stored", self.n_stored);
            }
        }
        Ok(())
    }

    /// Applies the merge policy and writes the row.
    ///
    /// Returns the feature as stored, or `None` when the policy skipped it.
    fn store_with_key(&mut self, mut feature: Feature, id: String) -> ::Result<Option<Feature>> {
        let existing = self.writer.get_feature(id.as_str()).map_err(Error::Store)?;
        match existing {
            None => {
                feature.set_id(id);
                self.writer.insert_feature(&feature).map_err(Error::Store)?;
                Ok(Some(feature))
            }
            Some(mut existing) => {
                let strategy = self.merge_policy.strategy_for(feature.featuretype());
                match strategy {
                    MergeStrategy::Error => {
                        Err(Error::Id(IdError::Duplicate(id, feature.lineno().unwrap_or(0))))
                    }
                    MergeStrategy::Warning => {
                        warn!("duplicate primary key {:?} on line {}; row skipped",
                              id, feature.lineno().unwrap_or(0));
                        Ok(None)
                    }
                    MergeStrategy::Replace => {
                        feature.set_id(id);
                        self.writer.replace_feature(&feature).map_err(Error::Store)?;
                        Ok(Some(feature))
                    }
                    MergeStrategy::Merge => {
                        merge_features(&mut existing, &feature).map_err(Error::Id)?;
                        self.writer.replace_feature(&existing).map_err(Error::Store)?;
                        Ok(Some(existing))
                    }
                    MergeStrategy::CreateUnique => {
                        let newid = self.uniquifier.next_key(id.as_str());
                        self.duplicates.insert(id, newid.clone());
                        feature.set_id(newid);
                        self.writer.insert_feature(&feature).map_err(Error::Store)?;
                        Ok(Some(feature))
                    }
                }
            }
        }
    }

    /// Stages one level-1 edge per listed parent value.
    ///
    /// Parents may appear later in the file, so edges are written only once
    /// the whole stream has been consumed.
    fn stage_parent_edges(&mut self, feature: &Feature) {
        let child = match feature.id() {
            Some(id) => id.to_owned(),
            None => return,
        };
        if let Some(parents) = feature.attributes().values(GFF3_PARENT_KEY) {
            for parent in parents.iter() {
                if !parent.is_empty() {
                    self.staged_edges.push((parent.clone(), child.clone()));
                }
            }
        }
    }

    /// Emits synthesized rows, writes edges and auxiliary tables, and
    /// commits.
    fn finish(mut self, dialect: Dialect, keep_order: bool, maxlevel: i64) -> ::Result<()> {
        self.check_cancel()?;
        if self.n_stored == 0 {
            return Err(Error::EmptyInput);
        }

        if let Some(inference) = self.inference.take() {
            if inference.n_orphans() > 0 {
                warn!("{} component features had no transcript identifier and were \
                       excluded from inference", inference.n_orphans());
            }
            let infer_transcripts = inference.infers_transcripts();
            let (transcripts, genes) = inference.finalize()?;

            let mut transcript_ids: HashMap<String, String> = HashMap::new();
            for (value, feature, children) in transcripts {
                let id = self.store_inferred(feature, value.as_str())?;
                for child in children {
                    self.writer.insert_relation(id.as_str(), child.as_str(), 1)
                        .map_err(Error::Store)?;
                }
                let _ = transcript_ids.insert(value, id);
            }
            for (value, feature, children) in genes {
                let id = self.store_inferred(feature, value.as_str())?;
                for child in children {
                    // Children are transcript grouping keys unless transcript
                    // inference was off, in which case they are stored keys.
                    let child_id = if infer_transcripts {
                        transcript_ids.get(child.as_str()).cloned().unwrap_or(child)
                    } else {
                        child
                    };
                    self.writer.insert_relation(id.as_str(), child_id.as_str(), 1)
                        .map_err(Error::Store)?;
                }
            }
        }

        for &(ref parent, ref child) in self.staged_edges.iter() {
            self.writer.insert_relation(parent.as_str(), child.as_str(), 1)
                .map_err(Error::Store)?;
        }
        self.writer.close_relations(maxlevel).map_err(Error::Store)?;

        for directive in self.directives.iter() {
            self.writer.insert_directive(directive.as_str()).map_err(Error::Store)?;
        }
        for (idspecid, newids) in self.duplicates.iter_all() {
            for newid in newids.iter() {
                self.writer.insert_duplicate(idspecid.as_str(), newid.as_str())
                    .map_err(Error::Store)?;
            }
        }
        self.writer.write_autoincrements(self.resolver.counters()).map_err(Error::Store)?;
        self.writer.write_autoincrements(&self.uniquifier).map_err(Error::Store)?;

        let mut dialect = dialect;
        if keep_order {
            dialect.key_order = None;
        }
        self.writer.write_meta(&dialect).map_err(Error::Store)?;

        if self.verbose {
            info!("committing {} features", self.n_stored);
        }
        self.writer.commit().map_err(Error::Store)
    }

    /// Stores one synthesized row.
    ///
    /// An explicit row of the same featuretype wins over the synthesized
    /// one; any other key collision goes through the merge policy. Returns
    /// the primary key the row ended up under.
    fn store_inferred(&mut self, feature: Feature, group_key: &str) -> ::Result<String> {
        let id = self.resolver
            .assign_with_default(&feature, Some(group_key))
            .map_err(Error::Id)?;
        let existing = self.writer.get_feature(id.as_str()).map_err(Error::Store)?;
        if let Some(ref existing) = existing {
            if existing.featuretype() == feature.featuretype() {
                debug!("explicit {} row {:?} wins over inferred one",
                       feature.featuretype(), id);
                return Ok(id);
            }
        }
        let stored = self.store_with_key(feature, id.clone())?;
        match stored {
            Some(stored) => Ok(stored.id().unwrap_or(id.as_str()).to_owned()),
            None => Ok(id),
        }
    }
}

/// The dialect-aware default id spec.
fn default_id_spec(fmt: DialectFmt, gene_key: &str, transcript_key: &str) -> IdSpec {
    match fmt {
        DialectFmt::Gff3 => IdSpec::Key(GFF3_ID_KEY.to_owned()),
        DialectFmt::Gtf => {
            let mut by_type = HashMap::new();
            let _ = by_type.insert(GENE_STR.to_owned(), IdSpec::Key(gene_key.to_owned()));
            let _ = by_type.insert(
                TRANSCRIPT_STR.to_owned(), IdSpec::Key(transcript_key.to_owned()));
            IdSpec::ByType(by_type)
        }
    }
}
