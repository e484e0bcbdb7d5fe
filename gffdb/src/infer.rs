/*! Inference of implicit gene and transcript rows from GTF components.

GTF files typically carry only component features (exons, CDS, codons); the
gene and transcript rows they belong to exist only as `gene_id` and
`transcript_id` attribute values. During ingest, component features of the
configured subfeature type are grouped by those values and a parent feature
is synthesized per group, spanning the leftmost and rightmost child.

Each group is a small accumulator that moves through three states: `Empty`
on creation, `Accumulating` while component rows extend its coordinates, and
`Finalized` once the end of the input stream is reached. Synthesized rows are
emitted in the order their groups first appeared, after all file-order rows.
*/
use linked_hash_map::LinkedHashMap;

use model::FBuilder;
use {Feature, INIT_COORD};


/// Featuretype of synthesized transcript rows.
const TRANSCRIPT_STR: &'static str = "transcript";

/// Featuretype of synthesized gene rows.
const GENE_STR: &'static str = "gene";

/// Lifecycle of one inference group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Empty,
    Accumulating,
    Finalized,
}

/// A synthesized parent: its grouping key, the feature itself, and the keys
/// of its children.
///
/// For transcripts the children are stored feature primary keys; for genes
/// they are transcript grouping keys (or stored feature primary keys when
/// transcript inference is disabled).
pub type InferredParent = (String, Feature, Vec<String>);

/// Running extent accumulator for one inferred parent feature.
#[derive(Debug)]
struct SpanGroup {
    seqid: String,
    strand: String,
    start: u64,
    end: u64,
    has_coords: bool,
    gene_value: Option<String>,
    children: Vec<String>,
    state: GroupState,
}

impl SpanGroup {

    fn new(seqid: &str, strand: &str) -> SpanGroup {
        SpanGroup {
            seqid: seqid.to_owned(),
            strand: strand.to_owned(),
            start: INIT_COORD.0,
            end: INIT_COORD.1,
            has_coords: false,
            gene_value: None,
            children: Vec::new(),
            state: GroupState::Empty,
        }
    }

    /// Widens the group extent with one subfeature's coordinates.
    ///
    /// Finalized groups are left untouched.
    fn extend_coords(&mut self, feature: &Feature) {
        if self.state == GroupState::Finalized {
            return;
        }
        self.state = GroupState::Accumulating;
        if let (Some(start), Some(end)) = feature.coords() {
            self.start = ::std::cmp::min(self.start, start);
            self.end = ::std::cmp::max(self.end, end);
            self.has_coords = true;
        }
    }

    /// Records one child key, skipping repeats.
    fn add_child(&mut self, child: &str) {
        if self.state == GroupState::Finalized {
            return;
        }
        self.state = GroupState::Accumulating;
        if !self.children.iter().any(|known| known == child) {
            self.children.push(child.to_owned());
        }
    }

    fn coords(&self) -> (Option<u64>, Option<u64>) {
        if self.has_coords {
            (Some(self.start), Some(self.end))
        } else {
            (None, None)
        }
    }
}

/// Builder of implicit gene and transcript rows.
pub struct GtfInference {
    transcript_key: String,
    gene_key: String,
    subfeature: String,
    infer_transcripts: bool,
    infer_genes: bool,
    transcripts: LinkedHashMap<String, SpanGroup>,
    genes: LinkedHashMap<String, SpanGroup>,
    n_orphans: u64,
    warned_explicit: bool,
}

impl GtfInference {

    pub fn new<T, U, V>(transcript_key: T, gene_key: U, subfeature: V) -> GtfInference
        where T: Into<String>, U: Into<String>, V: Into<String>
    {
        GtfInference {
            transcript_key: transcript_key.into(),
            gene_key: gene_key.into(),
            subfeature: subfeature.into(),
            infer_transcripts: true,
            infer_genes: true,
            transcripts: LinkedHashMap::new(),
            genes: LinkedHashMap::new(),
            n_orphans: 0,
            warned_explicit: false,
        }
    }

    /// Sets whether transcript rows are synthesized.
    pub fn infer_transcripts(&mut self, infer_transcripts: bool) -> &mut Self {
        self.infer_transcripts = infer_transcripts;
        self
    }

    /// Sets whether gene rows are synthesized.
    pub fn infer_genes(&mut self, infer_genes: bool) -> &mut Self {
        self.infer_genes = infer_genes;
        self
    }

    /// Returns the number of component features skipped for having no
    /// transcript identifier.
    pub fn n_orphans(&self) -> u64 {
        self.n_orphans
    }

    /// Returns whether transcript rows are being synthesized.
    pub fn infers_transcripts(&self) -> bool {
        self.infer_transcripts
    }

    /// Feeds one stored feature into the accumulators.
    ///
    /// The feature must already carry its final primary key. Any component
    /// row with a transcript identifier contributes an edge to its group;
    /// only rows of the subfeature type widen the group extents.
    pub fn observe(&mut self, feature: &Feature) {
        let featuretype = feature.featuretype();
        if featuretype == TRANSCRIPT_STR || featuretype == GENE_STR {
            if !self.warned_explicit && (self.infer_transcripts || self.infer_genes) {
                warn!("input contains explicit {} rows; consider disabling gene/transcript \
                       inference for this file", featuretype);
                self.warned_explicit = true;
            }
            return;
        }
        let is_subfeature = featuretype == self.subfeature.as_str();

        let transcript_value = feature.attributes().first(self.transcript_key.as_str())
            .map(|value| value.to_owned());
        let gene_value = feature.attributes().first(self.gene_key.as_str())
            .map(|value| value.to_owned());

        // Components without a transcript identifier are stored but take no
        // part in inference.
        let transcript_value = match transcript_value {
            Some(value) if !value.is_empty() => value,
            _ => {
                if is_subfeature {
                    self.n_orphans += 1;
                }
                return;
            }
        };

        if self.infer_transcripts {
            let group = self.transcripts
                .entry(transcript_value.clone())
                .or_insert_with(|| SpanGroup::new(feature.seqid(), feature.strand()));
            if is_subfeature {
                group.extend_coords(feature);
            }
            if let Some(id) = feature.id() {
                group.add_child(id);
            }
            if group.gene_value.is_none() {
                group.gene_value = gene_value.clone();
            }
        }

        if self.infer_genes {
            if let Some(gene_value) = gene_value {
                if !gene_value.is_empty() {
                    let infer_transcripts = self.infer_transcripts;
                    let group = self.genes
                        .entry(gene_value)
                        .or_insert_with(|| SpanGroup::new(feature.seqid(), feature.strand()));
                    if is_subfeature {
                        group.extend_coords(feature);
                    }
                    // With transcript inference on, gene children are the
                    // transcript groups; otherwise components hang off the
                    // gene directly.
                    if infer_transcripts {
                        group.add_child(transcript_value.as_str());
                    } else if let Some(id) = feature.id() {
                        group.add_child(id);
                    }
                }
            }
        }
    }

    /// Closes all groups and emits the synthesized rows.
    ///
    /// Transcripts come first, then genes, each set in the order its groups
    /// first appeared in the input.
    pub fn finalize(self) -> ::Result<(Vec<InferredParent>, Vec<InferredParent>)> {
        let transcript_key = self.transcript_key;
        let gene_key = self.gene_key;

        let mut transcripts = Vec::with_capacity(self.transcripts.len());
        for (value, mut group) in self.transcripts.into_iter() {
            group.state = GroupState::Finalized;
            let coords = group.coords();
            let mut builder = FBuilder::new(group.seqid.as_str(), TRANSCRIPT_STR)
                .source(::DERIVED_SOURCE)
                .strand(group.strand.as_str())
                .coords_opt(coords.0, coords.1)
                .attribute(transcript_key.as_str(), value.as_str());
            if let Some(ref gene_value) = group.gene_value {
                builder = builder.attribute(gene_key.as_str(), gene_value.as_str());
            }
            let feature = builder.build().map_err(::Error::Line)?;
            transcripts.push((value, feature, group.children));
        }

        let mut genes = Vec::with_capacity(self.genes.len());
        for (value, mut group) in self.genes.into_iter() {
            group.state = GroupState::Finalized;
            let coords = group.coords();
            let feature = FBuilder::new(group.seqid.as_str(), GENE_STR)
                .source(::DERIVED_SOURCE)
                .strand(group.strand.as_str())
                .coords_opt(coords.0, coords.1)
                .attribute(gene_key.as_str(), value.as_str())
                .build()
                .map_err(::Error::Line)?;
            genes.push((value, feature, group.children));
        }

        Ok((transcripts, genes))
    }
}
