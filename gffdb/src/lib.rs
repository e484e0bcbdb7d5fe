#![deny(
        trivial_casts, trivial_numeric_casts,
        unsafe_code,
        unstable_features,
        unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unused_results)]

extern crate flate2;
extern crate itertools;
extern crate linked_hash_map;
#[macro_use]
extern crate log;
extern crate multimap;
#[macro_use]
extern crate quick_error;
extern crate regex;
extern crate rusqlite;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate ureq;

use std::io;

mod dialect;
pub use dialect::{Dialect, DialectError, DialectFmt, infer_dialect, infer_dialect_line};

mod attributes;
pub use attributes::{AttrError, Attributes, parse_attributes, render_attributes};

mod bins;
pub use bins::{bin_from_range, bins_for_range};

mod model;
pub use model::{FBuilder, Feature, GffLine, LineError, parse_line};

mod io_gff;
pub use io_gff::{GffSource, LineStream, Lines, PeekedLines, peek_lines,
                 Reader as GffReader, Writer as GffWriter};

mod ids;
pub use ids::{Autoincrementer, IdError, IdKey, IdResolver, IdSpec,
              MergePolicy, MergeStrategy, merge_features};

mod infer;
pub use infer::{GtfInference, GroupState};

mod store;
pub use store::{FeatureDb, RegionQuery, StoreError, StoreWriter};

mod create;
pub use create::{DbBuilder, Transform, create_db, open_db};


quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Dialect(err: DialectError) {
            description("dialect error")
            display("{}", err)
            from()
            cause(err)
        }
        Attr(err: AttrError) {
            description("attribute error")
            display("{}", err)
            from()
            cause(err)
        }
        Line(err: LineError) {
            description("line error")
            display("{}", err)
            from()
            cause(err)
        }
        Id(err: IdError) {
            description("primary key error")
            display("{}", err)
            from()
            cause(err)
        }
        Store(err: StoreError) {
            description("store error")
            display("{}", err)
            from()
            cause(err)
        }
        Io(err: io::Error) {
            description("input/output error")
            display("{}", err)
            from()
            cause(err)
        }
        Remote(err: Box<ureq::Error>) {
            description("remote source error")
            display("{}", err)
            cause(err)
        }
        /// Occurs when an ingest finishes without having seen a single feature.
        EmptyInput {
            description("no features found in input")
        }
        /// Occurs when an ingest is aborted through its cancel signal.
        Cancelled {
            description("ingest cancelled")
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Error {
        Error::Remote(Box::new(err))
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;

/// Value for columns that are undefined, as a string.
pub const UNK_STR: &'static str = ".";

/// Value for columns that are undefined, as a char.
pub const UNK_CHAR: char = '.';

/// Source column value for gene and transcript rows synthesized during GTF
/// ingest.
///
/// The literal is kept byte-identical to the marker used by annotation
/// databases already in the wild, so stores built here interoperate with them.
pub const DERIVED_SOURCE: &'static str = "gffutils_derived";

/// Initial start coordinate value.
///
/// This is meant to be used with `std::cmp::min` as coordinates from an input is parsed.
const INIT_START: u64 = u64::MAX;

/// Initial end coordinate value.
///
/// This is meant to be used with `std::cmp::max` as coordinates from an input is parsed.
const INIT_END: u64 = u64::MIN;

/// Initial start and end coordinates values.
const INIT_COORD: (u64, u64) = (INIT_START, INIT_END);

/// Number of leading features sampled for dialect inference by default.
pub const DEF_CHECKLINES: usize = 10;

/// Highest relation level materialized by default.
pub const DEF_MAXLEVEL: i64 = 3;

// Helper type for raw coordinates
type Coord = (Option<u64>, Option<u64>);

// Generic utilities
mod utils {

    /// Returns true when the path or URL names a gzip-compressed payload.
    #[inline]
    pub(crate) fn is_gzip_name(name: &str) -> bool {
        name.ends_with(".gz") || name.ends_with(".gzip")
    }

    /// Splits a raw tab record and returns the attribute column, if present.
    #[inline]
    pub(crate) fn attribute_column(line: &str) -> Option<&str> {
        line.split('\t').nth(8)
    }
}
