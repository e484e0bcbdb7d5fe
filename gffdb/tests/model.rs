#[macro_use]
extern crate matches;
extern crate gffdb;

use gffdb::{parse_line, Dialect, GffLine, LineError};


const MRNA_LINE: &'static str =
    "chr2L\tFlyBase\tmRNA\t7529\t9484\t.\t+\t.\tID=FBtr0300689;Name=CG11023-RB;Parent=FBgn0031208";


#[test]
fn parses_feature_fields() {
    let dialect = Dialect::gff3();
    let parsed = parse_line(MRNA_LINE, 1, &dialect, true).expect("line");
    let feature = match parsed {
        GffLine::Feature(feature) => feature,
        otherwise => panic!("expected a feature, got {:?}", otherwise),
    };
    assert_eq!(feature.seqid(), "chr2L");
    assert_eq!(feature.source(), "FlyBase");
    assert_eq!(feature.featuretype(), "mRNA");
    assert_eq!(feature.start(), Some(7529));
    assert_eq!(feature.end(), Some(9484));
    assert_eq!(feature.score(), ".");
    assert_eq!(feature.strand(), "+");
    assert_eq!(feature.frame(), ".");
    assert_eq!(feature.attributes().first("ID"), Some("FBtr0300689"));
    assert!(feature.extra().is_empty());
    assert!(feature.bin().is_some());
    assert_eq!(feature.id(), None);
    assert_eq!(feature.lineno(), Some(1));
}

#[test]
fn extra_fields_are_kept() {
    let dialect = Dialect::gff3();
    let line = format!("{}\tcolA\tcolB", MRNA_LINE);
    let parsed = parse_line(line.as_str(), 1, &dialect, true).expect("line");
    match parsed {
        GffLine::Feature(feature) => {
            let expected = vec!["colA".to_owned(), "colB".to_owned()];
            assert_eq!(feature.extra(), expected.as_slice());
        }
        otherwise => panic!("expected a feature, got {:?}", otherwise),
    }
}

#[test]
fn missing_coordinates_are_allowed() {
    let dialect = Dialect::gff3();
    let line = "I\t.\tchromosome\t.\t.\t.\t.\t.\tID=I";
    let parsed = parse_line(line, 1, &dialect, true).expect("line");
    match parsed {
        GffLine::Feature(feature) => {
            assert_eq!(feature.coords(), (None, None));
            assert_eq!(feature.bin(), None);
        }
        otherwise => panic!("expected a feature, got {:?}", otherwise),
    }
}

#[test]
fn directives_comments_and_blanks() {
    let dialect = Dialect::gff3();
    assert_eq!(parse_line("##gff-version 3", 1, &dialect, true).expect("line"),
               GffLine::Directive("##gff-version 3".to_owned()));
    assert_eq!(parse_line("# a comment", 2, &dialect, true).expect("line"),
               GffLine::Comment("# a comment".to_owned()));
    assert_eq!(parse_line("", 3, &dialect, true).expect("line"), GffLine::Blank);
    assert_eq!(parse_line("##FASTA", 4, &dialect, true).expect("line"), GffLine::Fasta);
}

#[test]
fn too_few_fields_is_malformed() {
    let dialect = Dialect::gff3();
    let result = parse_line("chr1\tsrc\tgene\t1\t10", 7, &dialect, true);
    assert_matches!(result, Err(LineError::FieldCount(5, 7)));
}

#[test]
fn unparseable_coordinate_is_an_error() {
    let dialect = Dialect::gff3();
    let result = parse_line("chr1\tsrc\tgene\tabc\t10\t.\t+\t.\tID=x", 3, &dialect, true);
    assert_matches!(result, Err(LineError::Coordinate(_, 3)));
}

#[test]
fn reversed_coordinates_are_rejected() {
    let dialect = Dialect::gff3();
    let result = parse_line("chr1\tsrc\tgene\t100\t10\t.\t+\t.\tID=x", 5, &dialect, true);
    assert_matches!(result, Err(LineError::ReversedCoordinates(5)));
}

#[test]
fn feature_renders_back_to_its_line() {
    let dialect = Dialect::gff3();
    let parsed = parse_line(MRNA_LINE, 1, &dialect, true).expect("line");
    match parsed {
        GffLine::Feature(feature) => {
            assert_eq!(feature.to_gff_line(&dialect, true), MRNA_LINE);
        }
        otherwise => panic!("expected a feature, got {:?}", otherwise),
    }
}

#[test]
fn extra_fields_render_back() {
    let dialect = Dialect::gff3();
    let line = format!("{}\tcolA\tcolB", MRNA_LINE);
    let parsed = parse_line(line.as_str(), 1, &dialect, true).expect("line");
    match parsed {
        GffLine::Feature(feature) => {
            assert_eq!(feature.to_gff_line(&dialect, true), line);
        }
        otherwise => panic!("expected a feature, got {:?}", otherwise),
    }
}

#[test]
fn gtf_line_round_trips() {
    let dialect = Dialect::gtf();
    let line = "I\tprotein_coding\texon\t12759579\t12760013\t.\t-\t.\t\
                gene_id \"B0019.1\"; transcript_id \"B0019.1\";";
    let parsed = parse_line(line, 1, &dialect, true).expect("line");
    match parsed {
        GffLine::Feature(feature) => {
            assert_eq!(feature.to_gff_line(&dialect, true), line);
        }
        otherwise => panic!("expected a feature, got {:?}", otherwise),
    }
}
