#[macro_use]
extern crate matches;
extern crate gffdb;
extern crate tempfile;

use gffdb::{DbBuilder, Error, GffSource, IdError, IdSpec, MergeStrategy, RegionQuery};
use tempfile::tempdir;


static FLYBASE: &'static str = include_str!("data/flybase_gene.gff3");
static MOUSE: &'static str = include_str!("data/mouse_extra_comma.gff3");
static HYBRID: &'static str = include_str!("data/hybrid1.gff3");
static GLIMMER: &'static str = include_str!("data/glimmer_nokeyval.gff3");
static DUP_IDS: &'static str = include_str!("data/dup_ids.gff3");


#[test]
fn flybase_hierarchy() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(FLYBASE), dir.path().join("flybase.db"))
        .run()
        .expect("ingest");

    let gene = db.feature("FBgn0031208").expect("gene");
    assert_eq!(gene.start(), Some(7529));
    assert_eq!(gene.end(), Some(9484));

    let mrnas = db.children("FBgn0031208", Some(1), Some("mRNA")).expect("mrnas");
    let mrna_ids = mrnas.iter().filter_map(|f| f.id()).collect::<Vec<&str>>();
    assert_eq!(mrna_ids, vec!["FBtr0300689", "FBtr0300690"]);

    let exons = db.children("FBgn0031208", Some(2), Some("exon")).expect("exons");
    let starts = exons.iter().filter_map(|f| f.start()).collect::<Vec<u64>>();
    assert_eq!(starts, vec![7529, 8193, 8193, 8668]);

    let query = RegionQuery::new("chr2L", 9277, 10000).completely_within(true);
    let inside = db.region(&query).expect("region");
    assert_eq!(inside.len(), 1);
    assert_eq!(inside[0].featuretype(), "three_prime_UTR");
    assert_eq!(inside[0].start(), Some(9277));
    assert_eq!(inside[0].end(), Some(9484));

    let directives = db.directives().expect("directives");
    assert_eq!(directives,
               vec!["##gff-version 3".to_owned(),
                    "##sequence-region chr2L 1 23011544".to_owned()]);
}

#[test]
fn multi_parent_exons_have_two_edges() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(FLYBASE), dir.path().join("flybase.db"))
        .run()
        .expect("ingest");

    // The first exon lists both mRNAs in its Parent attribute.
    let exon = db.features_of_type("exon").expect("exons").remove(0);
    let exon_id = exon.id().expect("exon id").to_owned();
    let parents = db.parents(exon_id.as_str(), Some(1), None).expect("parents");
    let parent_ids = parents.iter().filter_map(|f| f.id()).collect::<Vec<&str>>();
    assert_eq!(parent_ids, vec!["FBtr0300689", "FBtr0300690"]);
}

#[test]
fn stored_feature_renders_back_to_its_line() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(FLYBASE), dir.path().join("flybase.db"))
        .keep_order(true)
        .run()
        .expect("ingest");

    let gene_line = FLYBASE.lines().nth(2).expect("gene line");
    let gene = db.feature("FBgn0031208").expect("gene");
    assert_eq!(format!("{}", gene), gene_line);

    let mrna_line = FLYBASE.lines().nth(3).expect("mrna line");
    let mrna = db.feature("FBtr0300689").expect("mrna");
    assert_eq!(format!("{}", mrna), mrna_line);
}

#[test]
fn mouse_extra_comma_create_unique() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(MOUSE), dir.path().join("mouse.db"))
        .id_spec(IdSpec::Keys(vec!["ID".to_owned(), "Name".to_owned()]))
        .merge_strategy(MergeStrategy::CreateUnique)
        .run()
        .expect("ingest");

    let cds = db.features_of_type("CDS").expect("cds rows");
    let ids = cds.iter().filter_map(|f| f.id()).collect::<Vec<&str>>();
    assert_eq!(ids, vec![
        "CDS:NC_000083.5:LOC100040603",
        "CDS:NC_000083.5:LOC100040603_1",
        "CDS:NC_000083.5:LOC100040603_2",
        "CDS:NC_000083.5:LOC100040603_3",
        "CDS:NC_000083.5:LOC100040603_4",
    ]);

    let cds4 = db.feature("CDS:NC_000083.5:LOC100040603_4").expect("cds4");
    let expected = vec!["XM_001475631.1".to_owned(), String::new()];
    assert_eq!(cds4.attributes().values("Parent"), Some(expected.as_slice()));

    let duplicates = db.duplicates().expect("duplicates");
    assert_eq!(duplicates.len(), 4);
    assert!(duplicates.iter().all(|&(ref orig, _)| orig == "CDS:NC_000083.5:LOC100040603"));
}

#[test]
fn fasta_directive_terminates_ingest() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(HYBRID), dir.path().join("hybrid.db"))
        .run()
        .expect("ingest");

    assert_eq!(db.n_features().expect("count"), 2);
    let gene = db.feature("A00469").expect("gene");
    let alias = vec!["GH1".to_owned()];
    let note = vec!["growth hormone 1".to_owned()];
    assert_eq!(gene.attributes().values("Alias"), Some(alias.as_slice()));
    assert_eq!(gene.attributes().values("Note"), Some(note.as_slice()));
    assert_eq!(db.directives().expect("directives").len(), 2);
}

#[test]
fn bare_attribute_keys_survive_ingest() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(GLIMMER), dir.path().join("glimmer.db"))
        .run()
        .expect("ingest");

    let mrna = db.feature("GL0000007").expect("mrna");
    assert_eq!(mrna.attributes().values("Complete"), Some(&[][..]));
}

#[test]
fn transform_rewrites_ids_and_parents() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(GLIMMER), dir.path().join("glimmer.db"))
        .transform(|mut feature| {
            if feature.featuretype().ends_with("RNA") {
                let new_id = feature.attributes().first("ID")
                    .map(|id| format!("{}_transcript", id));
                if let Some(new_id) = new_id {
                    feature.attributes_mut().insert("ID", vec![new_id]);
                }
            } else {
                let new_parents = feature.attributes().values("Parent").map(|parents| {
                    parents.iter()
                        .map(|parent| format!("{}_transcript", parent))
                        .collect::<Vec<String>>()
                });
                if let Some(new_parents) = new_parents {
                    feature.attributes_mut().insert("Parent", new_parents);
                }
            }
            Some(feature)
        })
        .run()
        .expect("ingest");

    let parents = db.parents("CDS_1", Some(1), None).expect("parents");
    let parent_ids = parents.iter().filter_map(|f| f.id()).collect::<Vec<&str>>();
    assert_eq!(parent_ids, vec!["GL0000006_transcript"]);
}

#[test]
fn transform_can_drop_features() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(GLIMMER), dir.path().join("glimmer.db"))
        .transform(|feature| {
            if feature.featuretype() == "CDS" {
                None
            } else {
                Some(feature)
            }
        })
        .run()
        .expect("ingest");
    assert_eq!(db.n_features().expect("count"), 2);
}

#[test]
fn conflicting_duplicates_fail_merge() {
    let dir = tempdir().expect("temp dir");
    let result = DbBuilder::new(GffSource::from_text(DUP_IDS), dir.path().join("dup.db"))
        .merge_strategy(MergeStrategy::Merge)
        .run();
    let err = result.err().expect("ingest must fail");
    assert_matches!(err, Error::Id(IdError::MergeConflict(_, 2)));
}

#[test]
fn conflicting_duplicates_survive_create_unique() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(DUP_IDS), dir.path().join("dup.db"))
        .merge_strategy(MergeStrategy::CreateUnique)
        .run()
        .expect("ingest");
    assert!(db.feature("CDS:D1007.5a").is_ok());
    assert!(db.feature("CDS:D1007.5a_1").is_ok());
}

#[test]
fn compatible_duplicates_merge_attributes() {
    let text = "\
chr1\tsrc\tgene\t1\t100\t.\t+\t.\tID=g1;Dbxref=A\n\
chr1\tsrc\tgene\t1\t100\t.\t+\t.\tID=g1;Dbxref=B,A\n";
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(text), dir.path().join("merge.db"))
        .merge_strategy(MergeStrategy::Merge)
        .run()
        .expect("ingest");
    assert_eq!(db.n_features().expect("count"), 1);
    let gene = db.feature("g1").expect("gene");
    let expected = vec!["A".to_owned(), "B".to_owned()];
    assert_eq!(gene.attributes().values("Dbxref"), Some(expected.as_slice()));
}

#[test]
fn duplicate_key_errors_by_default() {
    let dir = tempdir().expect("temp dir");
    let result = DbBuilder::new(GffSource::from_text(DUP_IDS), dir.path().join("dup.db"))
        .run();
    let err = result.err().expect("ingest must fail");
    assert_matches!(err, Error::Id(IdError::Duplicate(_, 2)));
}

#[test]
fn warning_strategy_skips_duplicates() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(DUP_IDS), dir.path().join("dup.db"))
        .merge_strategy(MergeStrategy::Warning)
        .run()
        .expect("ingest");
    assert_eq!(db.n_features().expect("count"), 1);
    let cds = db.feature("CDS:D1007.5a").expect("cds");
    assert_eq!(cds.start(), Some(10));
}

#[test]
fn replace_strategy_overwrites() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(DUP_IDS), dir.path().join("dup.db"))
        .merge_strategy(MergeStrategy::Replace)
        .run()
        .expect("ingest");
    assert_eq!(db.n_features().expect("count"), 1);
    let cds = db.feature("CDS:D1007.5a").expect("cds");
    assert_eq!(cds.start(), Some(120));
}

#[test]
fn empty_input_is_an_error_and_leaves_no_store() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("empty.db");
    let result = DbBuilder::new(
        GffSource::from_text("# nothing here\n\n"), path.clone()).run();
    let err = result.err().expect("ingest must fail");
    assert_matches!(err, Error::EmptyInput);
    assert!(!path.exists());
}
