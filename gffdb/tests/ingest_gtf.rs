#[macro_use]
extern crate matches;
extern crate gffdb;
extern crate tempfile;

use gffdb::{DbBuilder, Error, GffSource, IdSpec, StoreError, DERIVED_SOURCE};
use tempfile::tempdir;


static ENSEMBL: &'static str = include_str!("data/ensembl_b0019.gtf");
static TWO_GENES: &'static str = include_str!("data/two_genes.gtf");


#[test]
fn collapsed_ids_with_transform() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(ENSEMBL), dir.path().join("ensembl.db"))
        .transform(|mut feature| {
            let new_id = feature.attributes().first("transcript_id")
                .map(|id| format!("{}_transcript", id));
            if let Some(new_id) = new_id {
                feature.attributes_mut().insert("transcript_id", vec![new_id]);
            }
            Some(feature)
        })
        .run()
        .expect("ingest");

    let gene = db.feature("B0019.1").expect("gene");
    assert_eq!(gene.featuretype(), "gene");
    assert_eq!(gene.source(), DERIVED_SOURCE);
    assert_eq!(gene.start(), Some(12759579));
    assert_eq!(gene.end(), Some(12764949));

    let transcript = db.feature("B0019.1_transcript").expect("transcript");
    assert_eq!(transcript.featuretype(), "transcript");
    assert_eq!(transcript.source(), DERIVED_SOURCE);

    let children = db.children("B0019.1", Some(1), Some("transcript")).expect("children");
    let child_ids = children.iter().filter_map(|f| f.id()).collect::<Vec<&str>>();
    assert_eq!(child_ids, vec!["B0019.1_transcript"]);
}

#[test]
fn inferred_extents_and_edges() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(TWO_GENES), dir.path().join("two.db"))
        .run()
        .expect("ingest");

    let t1 = db.feature("t1").expect("t1");
    assert_eq!(t1.coords(), (Some(100), Some(400)));
    assert_eq!(t1.source(), DERIVED_SOURCE);
    let t2 = db.feature("t2").expect("t2");
    assert_eq!(t2.coords(), (Some(500), Some(650)));
    let t3 = db.feature("t3").expect("t3");
    assert_eq!(t3.coords(), (Some(1000), Some(6000)));
    assert_eq!(t3.strand(), "-");

    let g1 = db.feature("g1").expect("g1");
    assert_eq!(g1.coords(), (Some(100), Some(650)));
    let g2 = db.feature("g2").expect("g2");
    assert_eq!(g2.coords(), (Some(1000), Some(6000)));

    let g1_transcripts = db.children("g1", Some(1), Some("transcript")).expect("children");
    let ids = g1_transcripts.iter().filter_map(|f| f.id()).collect::<Vec<&str>>();
    assert_eq!(ids, vec!["t1", "t2"]);

    // The CDS is a child of its transcript, but only exons set the extents.
    let t2_children = db.children("t2", Some(1), None).expect("children");
    assert_eq!(t2_children.len(), 2);

    let g1_exons = db.children("g1", Some(2), Some("exon")).expect("exons");
    assert_eq!(g1_exons.len(), 3);
}

#[test]
fn orphan_components_are_stored_but_not_inferred() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(TWO_GENES), dir.path().join("two.db"))
        .run()
        .expect("ingest");

    // The last exon has an empty transcript_id: stored, but no synthesized
    // parents.
    let orphan = db.feature("exon_6").expect("orphan");
    assert_eq!(orphan.start(), Some(9000));
    assert!(db.parents("exon_6", None, None).expect("parents").is_empty());
    let missing = db.feature("g3");
    assert_matches!(missing.err(),
                    Some(Error::Store(StoreError::MissingFeature(_))));
}

#[test]
fn autoincrement_fallback_numbers_by_featuretype() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(TWO_GENES), dir.path().join("two.db"))
        .id_spec(IdSpec::Key("no_such_attribute".to_owned()))
        .run()
        .expect("ingest");

    let third_exon = db.feature("exon_3").expect("exon_3");
    assert_eq!(third_exon.coords(), (Some(500), Some(650)));
    let first_cds = db.feature("CDS_1").expect("CDS_1");
    assert_eq!(first_cds.coords(), (Some(520), Some(600)));
}

#[test]
fn transcript_inference_can_be_disabled() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(TWO_GENES), dir.path().join("two.db"))
        .disable_infer_transcripts(true)
        .run()
        .expect("ingest");

    assert!(db.feature("t1").is_err());
    let g1 = db.feature("g1").expect("g1");
    assert_eq!(g1.coords(), (Some(100), Some(650)));
    let g1_exons = db.children("g1", Some(1), Some("exon")).expect("children");
    assert_eq!(g1_exons.len(), 3);
}

#[test]
fn gene_inference_can_be_disabled() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(TWO_GENES), dir.path().join("two.db"))
        .disable_infer_genes(true)
        .run()
        .expect("ingest");

    assert!(db.feature("g1").is_err());
    let t1 = db.feature("t1").expect("t1");
    assert_eq!(t1.coords(), (Some(100), Some(400)));
}

#[test]
fn force_gff_skips_inference() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(TWO_GENES), dir.path().join("two.db"))
        .force_gff(true)
        .run()
        .expect("ingest");

    assert!(db.feature("g1").is_err());
    assert!(db.feature("t1").is_err());
    assert_eq!(db.n_features().expect("count"), 7);
}

#[test]
fn custom_subfeature_drives_inference() {
    let text = "\
chr1\ttest\tcoding_exon\t100\t200\t.\t+\t.\tgene_id \"g1\"; transcript_id \"t1\";\n\
chr1\ttest\tcoding_exon\t300\t400\t.\t+\t.\tgene_id \"g1\"; transcript_id \"t1\";\n";
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(text), dir.path().join("sub.db"))
        .gtf_subfeature("coding_exon")
        .run()
        .expect("ingest");

    let t1 = db.feature("t1").expect("t1");
    assert_eq!(t1.coords(), (Some(100), Some(400)));
}

#[test]
fn custom_grouping_keys() {
    let text = "\
chr1\ttest\texon\t100\t200\t.\t+\t.\tlocus \"L1\"; tx \"T1\";\n\
chr1\ttest\texon\t300\t400\t.\t+\t.\tlocus \"L1\"; tx \"T1\";\n";
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(text), dir.path().join("keys.db"))
        .gtf_gene_key("locus")
        .gtf_transcript_key("tx")
        .run()
        .expect("ingest");

    let transcript = db.feature("T1").expect("transcript");
    assert_eq!(transcript.coords(), (Some(100), Some(400)));
    let locus = db.feature("L1").expect("locus");
    assert_eq!(locus.featuretype(), "gene");
    let children = db.children("L1", Some(1), Some("transcript")).expect("children");
    assert_eq!(children.len(), 1);
}

#[test]
fn explicit_transcript_rows_win_over_inference() {
    let text = "\
chr1\ttest\ttranscript\t90\t450\t.\t+\t.\tgene_id \"g1\"; transcript_id \"t1\";\n\
chr1\ttest\texon\t100\t200\t.\t+\t.\tgene_id \"g1\"; transcript_id \"t1\";\n\
chr1\ttest\texon\t300\t400\t.\t+\t.\tgene_id \"g1\"; transcript_id \"t1\";\n";
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(text), dir.path().join("explicit.db"))
        .run()
        .expect("ingest");

    // The explicit row's extent is preserved; inference does not overwrite
    // it with the exon-derived one.
    let t1 = db.feature("t1").expect("t1");
    assert_eq!(t1.coords(), (Some(90), Some(450)));
    assert_eq!(t1.source(), "test");

    // Edges still hang the exons off the explicit transcript.
    let children = db.children("t1", Some(1), Some("exon")).expect("children");
    assert_eq!(children.len(), 2);
}
