extern crate gffdb;

use gffdb::{parse_attributes, render_attributes, Dialect};


#[test]
fn gff3_round_trip() {
    let dialect = Dialect::gff3();
    let raw = "ID=FBtr0300689;Name=CG11023-RB;Parent=FBgn0031208";
    let attrs = parse_attributes(raw, &dialect, true).expect("attributes");
    let expected = vec!["FBgn0031208".to_owned()];
    assert_eq!(attrs.values("Parent"), Some(expected.as_slice()));
    assert_eq!(render_attributes(&attrs, &dialect, true), raw);
}

#[test]
fn gtf_round_trip() {
    let dialect = Dialect::gtf();
    let raw = "gene_id \"B0019.1\"; transcript_id \"B0019.1\"; exon_number \"1\";";
    let attrs = parse_attributes(raw, &dialect, true).expect("attributes");
    let expected = vec!["B0019.1".to_owned()];
    assert_eq!(attrs.values("gene_id"), Some(expected.as_slice()));
    assert_eq!(render_attributes(&attrs, &dialect, true), raw);
}

#[test]
fn multiple_values_split() {
    let dialect = Dialect::gff3();
    let attrs = parse_attributes("Dbxref=FlyBase:FBan0011023,EntrezGene:33155", &dialect, true)
        .expect("attributes");
    let expected = vec!["FlyBase:FBan0011023".to_owned(), "EntrezGene:33155".to_owned()];
    assert_eq!(attrs.values("Dbxref"), Some(expected.as_slice()));
}

#[test]
fn multiple_values_permutation_same_multiset() {
    let dialect = Dialect::gff3();
    let one = parse_attributes("K=v1,v2,v3", &dialect, true).expect("attributes");
    let two = parse_attributes("K=v3,v1,v2", &dialect, true).expect("attributes");
    let mut one_vals = one.values("K").expect("values").to_vec();
    let mut two_vals = two.values("K").expect("values").to_vec();
    one_vals.sort();
    two_vals.sort();
    assert_eq!(one_vals, two_vals);
}

#[test]
fn trailing_comma_keeps_empty_element() {
    let dialect = Dialect::gff3();
    let attrs = parse_attributes("Parent=XM_001475631.1,", &dialect, true)
        .expect("attributes");
    let expected = vec!["XM_001475631.1".to_owned(), String::new()];
    assert_eq!(attrs.values("Parent"), Some(expected.as_slice()));
}

#[test]
fn bare_key_has_empty_value_list() {
    let dialect = Dialect::gff3();
    let raw = "ID=GL0000007;Name=GL0000007;Complete";
    let attrs = parse_attributes(raw, &dialect, true).expect("attributes");
    assert_eq!(attrs.values("Complete"), Some(&[][..]));
    assert_eq!(render_attributes(&attrs, &dialect, true), raw);
}

#[test]
fn percent_decoding_and_reencoding() {
    let dialect = Dialect::gff3();
    let attrs = parse_attributes("Note=growth%20hormone%201;Tag=a%2Cb", &dialect, true)
        .expect("attributes");
    let note = vec!["growth hormone 1".to_owned()];
    let tag = vec!["a,b".to_owned()];
    assert_eq!(attrs.values("Note"), Some(note.as_slice()));
    assert_eq!(attrs.values("Tag"), Some(tag.as_slice()));
    // Spaces stay decoded; the comma must go back to its escape to stay
    // distinguishable from a value separator.
    assert_eq!(render_attributes(&attrs, &dialect, true),
               "Note=growth hormone 1;Tag=a%2Cb");
}

#[test]
fn percent_codec_can_be_disabled() {
    let dialect = Dialect::gff3();
    let raw = "Note=growth%20hormone%201";
    let attrs = parse_attributes(raw, &dialect, false).expect("attributes");
    let expected = vec!["growth%20hormone%201".to_owned()];
    assert_eq!(attrs.values("Note"), Some(expected.as_slice()));
    assert_eq!(render_attributes(&attrs, &dialect, false), raw);
}

#[test]
fn repeated_keys_accumulate_in_gtf() {
    let dialect = Dialect::gtf();
    let attrs = parse_attributes("tag \"one\"; tag \"two\";", &dialect, true)
        .expect("attributes");
    let expected = vec!["one".to_owned(), "two".to_owned()];
    assert_eq!(attrs.values("tag"), Some(expected.as_slice()));
}

#[test]
fn repeated_keys_keep_last_in_gff3() {
    let dialect = Dialect::gff3();
    let attrs = parse_attributes("k=1;k=2", &dialect, true).expect("attributes");
    let expected = vec!["2".to_owned()];
    assert_eq!(attrs.values("k"), Some(expected.as_slice()));
}

#[test]
fn sorted_values_render_stably() {
    let dialect = Dialect::gff3();
    let mut attrs = parse_attributes("Dbxref=b,a,c", &dialect, true).expect("attributes");
    attrs.sort_values();
    assert_eq!(render_attributes(&attrs, &dialect, true), "Dbxref=a,b,c");
}

#[test]
fn key_order_from_dialect_wins_over_insertion() {
    let mut dialect = Dialect::gff3();
    dialect.key_order = Some(vec!["Name".to_owned(), "ID".to_owned()]);
    let attrs = parse_attributes("ID=x;Name=y;Other=z", &dialect, true).expect("attributes");
    assert_eq!(render_attributes(&attrs, &dialect, true), "Name=y;ID=x;Other=z");
}
