#[macro_use]
extern crate matches;
extern crate gffdb;
extern crate tempfile;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gffdb::{open_db, DbBuilder, DialectFmt, Error, GffSource, MergeStrategy,
            IdSpec, RegionQuery, StoreError};
use tempfile::tempdir;


static FLYBASE: &'static str = include_str!("data/flybase_gene.gff3");
static MOUSE: &'static str = include_str!("data/mouse_extra_comma.gff3");
static ENSEMBL: &'static str = include_str!("data/ensembl_b0019.gtf");


#[test]
fn region_overlap_and_containment() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(FLYBASE), dir.path().join("flybase.db"))
        .run()
        .expect("ingest");

    let overlapping = db.region(&RegionQuery::new("chr2L", 8000, 8300)).expect("region");
    assert_eq!(overlapping.len(), 9);
    assert!(overlapping.iter().all(|f| f.featuretype() != "five_prime_UTR"));

    let contained = db
        .region(&RegionQuery::new("chr2L", 8000, 8300).completely_within(true))
        .expect("region");
    assert!(contained.is_empty());

    let elsewhere = db.region(&RegionQuery::new("chr3R", 8000, 8300)).expect("region");
    assert!(elsewhere.is_empty());
}

#[test]
fn dialect_and_version_are_persisted() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("flybase.db");
    {
        let db = DbBuilder::new(GffSource::from_text(FLYBASE), path.clone())
            .run()
            .expect("ingest");
        assert_eq!(db.dialect().fmt, DialectFmt::Gff3);
    }
    let reopened = open_db(&path).expect("reopen");
    assert_eq!(reopened.dialect().fmt, DialectFmt::Gff3);
    assert!(!reopened.version().is_empty());

    let gtf_path = dir.path().join("ensembl.db");
    let gtf_db = DbBuilder::new(GffSource::from_text(ENSEMBL), gtf_path)
        .run()
        .expect("ingest");
    assert_eq!(gtf_db.dialect().fmt, DialectFmt::Gtf);
    assert!(gtf_db.dialect().quoted_values);
}

#[test]
fn autoincrement_counters_are_persisted() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(FLYBASE), dir.path().join("flybase.db"))
        .run()
        .expect("ingest");

    let counters = db.autoincrements().expect("autoincrements");
    assert!(counters.contains(&("exon".to_owned(), 4)));
    assert!(counters.contains(&("CDS".to_owned(), 4)));
    assert!(counters.contains(&("three_prime_UTR".to_owned(), 1)));
}

#[test]
fn duplicate_keys_stay_reachable_by_original_id() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(MOUSE), dir.path().join("mouse.db"))
        .id_spec(IdSpec::Keys(vec!["ID".to_owned(), "Name".to_owned()]))
        .merge_strategy(MergeStrategy::CreateUnique)
        .run()
        .expect("ingest");

    // The first CDS kept the plain key; the lookup must keep working even
    // for keys handed out to later rows.
    let plain = db.feature("CDS:NC_000083.5:LOC100040603").expect("cds");
    assert_eq!(plain.featuretype(), "CDS");
    let renamed = db.feature("CDS:NC_000083.5:LOC100040603_2").expect("renamed");
    assert_eq!(renamed.featuretype(), "CDS");
}

#[test]
fn update_rewrites_a_row() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(FLYBASE), dir.path().join("flybase.db"))
        .run()
        .expect("ingest");

    let mut gene = db.feature("FBgn0031208").expect("gene");
    gene.set_source("curated");
    gene.attributes_mut().append_value("Note", "edited");
    db.update(&gene).expect("update");

    let reread = db.feature("FBgn0031208").expect("gene");
    assert_eq!(reread.source(), "curated");
    let expected = vec!["edited".to_owned()];
    assert_eq!(reread.attributes().values("Note"), Some(expected.as_slice()));
}

#[test]
fn delete_removes_row_and_edges() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(FLYBASE), dir.path().join("flybase.db"))
        .run()
        .expect("ingest");

    db.delete("FBtr0300690").expect("delete");
    assert!(db.feature("FBtr0300690").is_err());
    let mrnas = db.children("FBgn0031208", Some(1), Some("mRNA")).expect("children");
    assert_eq!(mrnas.len(), 1);
    assert_matches!(db.delete("FBtr0300690").err(),
                    Some(Error::Store(StoreError::MissingFeature(_))));
}

#[test]
fn existing_store_needs_force() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("flybase.db");
    {
        let _db = DbBuilder::new(GffSource::from_text(FLYBASE), path.clone())
            .run()
            .expect("ingest");
    }

    let result = DbBuilder::new(GffSource::from_text(FLYBASE), path.clone()).run();
    assert_matches!(result.err(),
                    Some(Error::Store(StoreError::AlreadyExists(_))));

    // The original store is untouched by the refused ingest.
    let db = open_db(&path).expect("reopen");
    assert_eq!(db.n_features().expect("count"), 13);

    let rebuilt = DbBuilder::new(GffSource::from_text(FLYBASE), path.clone())
        .force(true)
        .run()
        .expect("rebuild");
    assert_eq!(rebuilt.n_features().expect("count"), 13);
}

#[test]
fn cancel_flag_aborts_and_cleans_up() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("flybase.db");
    let cancel = Arc::new(AtomicBool::new(false));
    cancel.store(true, Ordering::Relaxed);

    let result = DbBuilder::new(GffSource::from_text(FLYBASE), path.clone())
        .cancel_flag(cancel)
        .run();
    let err = result.err().expect("ingest must be cancelled");
    assert_matches!(err, Error::Cancelled);
    assert!(!path.exists());
}

#[test]
fn featuretype_listing_counts_rows() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(FLYBASE), dir.path().join("flybase.db"))
        .run()
        .expect("ingest");

    let listing = db.featuretypes().expect("featuretypes");
    assert!(listing.contains(&("exon".to_owned(), 4)));
    assert!(listing.contains(&("mRNA".to_owned(), 2)));
    assert!(listing.contains(&("gene".to_owned(), 1)));
    assert_eq!(db.count_features_of_type("CDS").expect("count"), 4);
}

#[test]
fn all_features_come_back_in_file_order() {
    let dir = tempdir().expect("temp dir");
    let db = DbBuilder::new(GffSource::from_text(FLYBASE), dir.path().join("flybase.db"))
        .run()
        .expect("ingest");

    let features = db.all_features().expect("features");
    assert_eq!(features.len(), 13);
    assert_eq!(features[0].featuretype(), "gene");
    assert_eq!(features[1].id(), Some("FBtr0300689"));
    assert_eq!(features[2].id(), Some("FBtr0300690"));
}
