/*! The SQLite-backed feature store.

An ingest writes three core tables (`features`, `relations`, `meta`) plus
three auxiliary ones (`directives`, `autoincrements`, `duplicates`) inside a
single transaction: a failed ingest leaves the store file unchanged, a
successful one leaves it fully populated. Indexes and planner statistics are
built after the commit.

[`StoreWriter`] is the write half, owned exclusively by one ingest.
[`FeatureDb`] is the read half; any number of them may point at the last
committed version of a store.
*/
use std::error::Error;
use std::fs;
use std::path::Path;

use rusqlite::{self, Connection, OptionalExtension, params};
use serde_json;

use bins::bins_for_range;
use ids::Autoincrementer;
use model::FBuilder;
use {Dialect, Feature};


/// DDL for all six store tables.
const SCHEMA: &'static str = "
CREATE TABLE features (
    id TEXT PRIMARY KEY,
    seqid TEXT,
    source TEXT,
    featuretype TEXT,
    start INTEGER,
    \"end\" INTEGER,
    score TEXT,
    strand TEXT,
    frame TEXT,
    attributes TEXT,
    extra TEXT,
    bin INTEGER
);
CREATE TABLE relations (
    parent TEXT,
    child TEXT,
    level INTEGER,
    PRIMARY KEY (parent, child, level)
);
CREATE TABLE meta (
    dialect TEXT,
    version TEXT
);
CREATE TABLE directives (
    directive TEXT
);
CREATE TABLE autoincrements (
    base TEXT PRIMARY KEY,
    n INTEGER
);
CREATE TABLE duplicates (
    idspecid TEXT,
    newid TEXT PRIMARY KEY
);
";

/// Columns selected whenever features are reconstructed.
const FEATURE_COLS: &'static str =
    "id, seqid, source, featuretype, start, \"end\", score, strand, frame, attributes, extra";

quick_error! {
    /// Errors that occur when reading or writing a store.
    #[derive(Debug)]
    pub enum StoreError {
        /// Occurs when the destination exists and `force` was not given.
        AlreadyExists(path: String) {
            description("destination store already exists")
            display(self_) -> ("{}: {}", self_.description(), path)
        }
        /// Occurs when a feature is looked up by an unknown primary key.
        MissingFeature(id: String) {
            description("no feature with the given primary key")
            display(self_) -> ("{}: {:?}", self_.description(), id)
        }
        /// Occurs when a store file has no usable metadata row.
        Corrupt(msg: String) {
            description("store metadata is missing or unreadable")
            display(self_) -> ("{}: {}", self_.description(), msg)
        }
        /// Generic wrapper for errors from the SQLite layer.
        Sqlite(err: rusqlite::Error) {
            description("sqlite error")
            display("{}", err)
            from()
            cause(err)
        }
        /// Generic wrapper for errors from the JSON columns.
        Json(err: serde_json::Error) {
            description("json column error")
            display("{}", err)
            from()
            cause(err)
        }
    }
}

/// Raw feature row as selected from the store.
///
/// The tuple elements are the `features` columns in schema order, minus the
/// bin (which is recomputed from the coordinates on reconstruction).
type FeatureRow = (String, String, String, String, Option<i64>, Option<i64>,
                   String, String, String, String, String);

/// Write half of a store, wrapping one ingest-long transaction.
pub struct StoreWriter {
    conn: Connection,
    committed: bool,
}

impl StoreWriter {

    /// Creates a new store at the given path and opens its transaction.
    ///
    /// An existing file is an error unless `force` is given, in which case
    /// it is removed first.
    pub fn create<P: AsRef<Path>>(path: P, force: bool) -> Result<StoreWriter, StoreError> {
        let path = path.as_ref();
        if path.exists() {
            if !force {
                return Err(StoreError::AlreadyExists(path.display().to_string()));
            }
            if let Err(err) = fs::remove_file(path) {
                warn!("could not remove existing store {}: {}", path.display(), err);
            }
        }

        let conn = Connection::open(path)?;
        let _ = conn.pragma_update(None, "synchronous", "NORMAL")?;
        let _ = conn.pragma_update(None, "journal_mode", "MEMORY")?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch("BEGIN")?;
        Ok(StoreWriter {
            conn: conn,
            committed: false,
        })
    }

    /// Inserts one feature row.
    ///
    /// The caller is responsible for having resolved primary-key collisions
    /// beforehand; a colliding insert surfaces as a SQLite constraint error.
    pub fn insert_feature(&self, feature: &Feature) -> Result<(), StoreError> {
        self.put_feature(feature, false)
    }

    /// Inserts one feature row, overwriting any row with the same key.
    pub fn replace_feature(&self, feature: &Feature) -> Result<(), StoreError> {
        self.put_feature(feature, true)
    }

    fn put_feature(&self, feature: &Feature, replace: bool) -> Result<(), StoreError> {
        let sql = if replace {
            "INSERT OR REPLACE INTO features \
             (id, seqid, source, featuretype, start, \"end\", score, strand, frame, \
              attributes, extra, bin) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        } else {
            "INSERT INTO features \
             (id, seqid, source, featuretype, start, \"end\", score, strand, frame, \
              attributes, extra, bin) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        };
        let attributes = serde_json::to_string(feature.attributes())?;
        let extra = serde_json::to_string(&feature.extra())?;
        let _ = self.conn.execute(sql, params![
            feature.id(),
            feature.seqid(),
            feature.source(),
            feature.featuretype(),
            feature.start().map(|coord| coord as i64),
            feature.end().map(|coord| coord as i64),
            feature.score(),
            feature.strand(),
            feature.frame(),
            attributes,
            extra,
            feature.bin().map(|bin| bin as i64),
        ])?;
        Ok(())
    }

    /// Returns the feature stored under the given primary key, if any.
    ///
    /// Uncommitted rows written earlier in the same ingest are visible here,
    /// which is what the merge policies rely on.
    pub fn get_feature(&self, id: &str) -> Result<Option<Feature>, StoreError> {
        let sql = format!("SELECT {} FROM features WHERE id = ?1", FEATURE_COLS);
        let row = self.conn
            .query_row(sql.as_str(), params![id], row_to_raw)
            .optional()?;
        match row {
            Some(raw) => raw_to_feature(raw, None).map(Some),
            None => Ok(None),
        }
    }

    /// Inserts one parent/child edge, ignoring duplicates and self-edges.
    pub fn insert_relation(&self, parent: &str, child: &str, level: i64) -> Result<(), StoreError> {
        if parent == child {
            debug!("skipping self-edge on {:?}", parent);
            return Ok(());
        }
        let _ = self.conn.execute(
            "INSERT OR IGNORE INTO relations (parent, child, level) VALUES (?1, ?2, ?3)",
            params![parent, child, level])?;
        Ok(())
    }

    /// Materializes transitive edges up to `maxlevel`.
    ///
    /// Level k edges are joined from level k-1 and level 1 edges; pairs
    /// already related at any level are left alone, as are self-pairs.
    pub fn close_relations(&self, maxlevel: i64) -> Result<(), StoreError> {
        let mut level = 2;
        while level <= maxlevel {
            let _ = self.conn.execute(
                "INSERT INTO relations (parent, child, level) \
                 SELECT DISTINCT a.parent, b.child, ?1 \
                 FROM relations a JOIN relations b ON a.child = b.parent \
                 WHERE a.level = ?1 - 1 AND b.level = 1 AND a.parent != b.child \
                   AND NOT EXISTS (SELECT 1 FROM relations r \
                                   WHERE r.parent = a.parent AND r.child = b.child)",
                params![level])?;
            level += 1;
        }
        Ok(())
    }

    /// Appends one directive line.
    pub fn insert_directive(&self, directive: &str) -> Result<(), StoreError> {
        let _ = self.conn.execute(
            "INSERT INTO directives (directive) VALUES (?1)", params![directive])?;
        Ok(())
    }

    /// Records one uniquified primary key.
    pub fn insert_duplicate(&self, idspecid: &str, newid: &str) -> Result<(), StoreError> {
        let _ = self.conn.execute(
            "INSERT OR REPLACE INTO duplicates (idspecid, newid) VALUES (?1, ?2)",
            params![idspecid, newid])?;
        Ok(())
    }

    /// Persists the autoincrement counters.
    pub fn write_autoincrements(&self, counters: &Autoincrementer) -> Result<(), StoreError> {
        for (base, n) in counters.iter() {
            let _ = self.conn.execute(
                "INSERT OR REPLACE INTO autoincrements (base, n) VALUES (?1, ?2)",
                params![base, n])?;
        }
        Ok(())
    }

    /// Persists the ingest dialect and the library version.
    pub fn write_meta(&self, dialect: &Dialect) -> Result<(), StoreError> {
        let dialect_json = serde_json::to_string(dialect)?;
        let _ = self.conn.execute(
            "INSERT INTO meta (dialect, version) VALUES (?1, ?2)",
            params![dialect_json, env!("CARGO_PKG_VERSION")])?;
        Ok(())
    }

    /// Returns the number of feature rows written so far.
    pub fn n_features(&self) -> Result<i64, StoreError> {
        let count = self.conn
            .query_row("SELECT count(*) FROM features", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Commits the ingest, then builds indexes and planner statistics.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        self.committed = true;
        self.conn.execute_batch("
            CREATE INDEX idx_features_featuretype ON features (featuretype);
            CREATE INDEX idx_features_region ON features (seqid, bin, start, \"end\");
            CREATE INDEX idx_relations_parent ON relations (parent);
            CREATE INDEX idx_relations_child ON relations (child);
            ANALYZE;
        ")?;
        Ok(())
    }
}

impl Drop for StoreWriter {

    /// Rolls the transaction back when the ingest did not commit.
    fn drop(&mut self) {
        if !self.committed {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                debug!("rollback on drop failed: {}", err);
            }
        }
    }
}

/// A bin-accelerated interval query against a store.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionQuery {
    seqid: String,
    start: u64,
    end: u64,
    completely_within: bool,
}

impl RegionQuery {

    /// Creates a query over 1-based inclusive coordinates.
    pub fn new<T>(seqid: T, start: u64, end: u64) -> RegionQuery
        where T: Into<String>
    {
        RegionQuery {
            seqid: seqid.into(),
            start: start,
            end: end,
            completely_within: false,
        }
    }

    /// Restricts matches to features lying entirely inside the interval.
    ///
    /// The default is to match any overlapping feature.
    pub fn completely_within(mut self, completely_within: bool) -> Self {
        self.completely_within = completely_within;
        self
    }
}

/// Read half of a committed store.
pub struct FeatureDb {
    conn: Connection,
    dialect: Dialect,
    version: String,
}

impl FeatureDb {

    /// Opens a committed store for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> ::Result<FeatureDb> {
        let conn = Connection::open(path.as_ref())
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        let meta: Option<(String, String)> = conn
            .query_row("SELECT dialect, version FROM meta",
                       [], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        let (dialect_json, version) = meta.ok_or_else(|| {
            ::Error::Store(StoreError::Corrupt("empty meta table".to_owned()))
        })?;
        let dialect = serde_json::from_str(dialect_json.as_str())
            .map_err(StoreError::Json)
            .map_err(::Error::Store)?;
        Ok(FeatureDb {
            conn: conn,
            dialect: dialect,
            version: version,
        })
    }

    /// Returns the dialect the store was built with.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Returns the library version the store was built with.
    pub fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the feature stored under the given primary key.
    ///
    /// Keys renamed by the `create_unique` strategy are resolved through the
    /// duplicates table, so a feature stays reachable under the key its
    /// attributes originally carried.
    pub fn feature(&self, id: &str) -> ::Result<Feature> {
        if let Some(feature) = self.lookup(id)? {
            return Ok(feature);
        }
        let mapped: Option<String> = self.conn
            .query_row("SELECT newid FROM duplicates WHERE idspecid = ?1 LIMIT 1",
                       params![id], |row| row.get(0))
            .optional()
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        if let Some(newid) = mapped {
            if let Some(feature) = self.lookup(newid.as_str())? {
                return Ok(feature);
            }
        }
        Err(::Error::Store(StoreError::MissingFeature(id.to_owned())))
    }

    fn lookup(&self, id: &str) -> ::Result<Option<Feature>> {
        let sql = format!("SELECT {} FROM features WHERE id = ?1", FEATURE_COLS);
        let row = self.conn
            .query_row(sql.as_str(), params![id], row_to_raw)
            .optional()
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        match row {
            Some(raw) => {
                raw_to_feature(raw, Some(&self.dialect))
                    .map(Some)
                    .map_err(::Error::Store)
            }
            None => Ok(None),
        }
    }

    /// Returns all features, in insertion (file) order.
    pub fn all_features(&self) -> ::Result<Vec<Feature>> {
        let sql = format!("SELECT {} FROM features ORDER BY rowid", FEATURE_COLS);
        self.collect_features(sql.as_str(), Vec::new())
    }

    /// Returns all features of one featuretype, in insertion order.
    pub fn features_of_type(&self, featuretype: &str) -> ::Result<Vec<Feature>> {
        let sql = format!(
            "SELECT {} FROM features WHERE featuretype = ?1 ORDER BY rowid", FEATURE_COLS);
        self.collect_features(sql.as_str(), vec![featuretype.to_owned()])
    }

    /// Returns the number of features of one featuretype.
    pub fn count_features_of_type(&self, featuretype: &str) -> ::Result<i64> {
        let count = self.conn
            .query_row("SELECT count(*) FROM features WHERE featuretype = ?1",
                       params![featuretype], |row| row.get(0))
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        Ok(count)
    }

    /// Returns every distinct featuretype with its row count.
    pub fn featuretypes(&self) -> ::Result<Vec<(String, i64)>> {
        let mut stmt = self.conn
            .prepare("SELECT featuretype, count(*) FROM features \
                      GROUP BY featuretype ORDER BY featuretype")
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StoreError::Sqlite).map_err(::Error::Store)?);
        }
        Ok(out)
    }

    /// Returns the total number of features.
    pub fn n_features(&self) -> ::Result<i64> {
        let count = self.conn
            .query_row("SELECT count(*) FROM features", [], |row| row.get(0))
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        Ok(count)
    }

    /// Returns the children of a feature, in insertion order.
    ///
    /// `level` of `None` spans all materialized levels; `featuretype`
    /// restricts the result when given.
    pub fn children(
        &self,
        id: &str,
        level: Option<i64>,
        featuretype: Option<&str>,
    ) -> ::Result<Vec<Feature>> {
        self.related(id, level, featuretype, true)
    }

    /// Returns the parents of a feature, in insertion order.
    pub fn parents(
        &self,
        id: &str,
        level: Option<i64>,
        featuretype: Option<&str>,
    ) -> ::Result<Vec<Feature>> {
        self.related(id, level, featuretype, false)
    }

    fn related(
        &self,
        id: &str,
        level: Option<i64>,
        featuretype: Option<&str>,
        down: bool,
    ) -> ::Result<Vec<Feature>> {

        let (join_col, where_col) = if down { ("child", "parent") } else { ("parent", "child") };
        let mut sql = format!(
            "SELECT {} FROM features f \
             JOIN relations r ON f.id = r.{} \
             WHERE r.{} = ?1",
            feature_cols_prefixed(), join_col, where_col);
        let mut args = vec![id.to_owned()];
        if let Some(level) = level {
            sql.push_str(" AND r.level = ?2");
            args.push(level.to_string());
        }
        if let Some(featuretype) = featuretype {
            sql.push_str(if level.is_some() {
                " AND f.featuretype = ?3"
            } else {
                " AND f.featuretype = ?2"
            });
            args.push(featuretype.to_owned());
        }
        sql.push_str(" ORDER BY f.rowid");
        self.collect_features(sql.as_str(), args)
    }

    /// Runs a bin-accelerated interval query.
    pub fn region(&self, query: &RegionQuery) -> ::Result<Vec<Feature>> {
        if query.end < query.start {
            return Ok(Vec::new());
        }
        let start0 = if query.start > 0 { query.start - 1 } else { 0 };
        let bins = bins_for_range(start0, query.end);
        let bin_list = bins.iter()
            .map(|bin| bin.to_string())
            .collect::<Vec<String>>()
            .join(",");
        let cond = if query.completely_within {
            "start >= ?2 AND \"end\" <= ?3"
        } else {
            "start <= ?3 AND \"end\" >= ?2"
        };
        let sql = format!(
            "SELECT {} FROM features \
             WHERE seqid = ?1 AND start IS NOT NULL AND \"end\" IS NOT NULL \
               AND bin IN ({}) AND {} ORDER BY rowid",
            FEATURE_COLS, bin_list, cond);
        let args = vec![
            query.seqid.clone(),
            (query.start as i64).to_string(),
            (query.end as i64).to_string(),
        ];
        self.collect_features(sql.as_str(), args)
    }

    /// Returns all stored directive lines, in file order.
    pub fn directives(&self) -> ::Result<Vec<String>> {
        let mut stmt = self.conn
            .prepare("SELECT directive FROM directives ORDER BY rowid")
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StoreError::Sqlite).map_err(::Error::Store)?);
        }
        Ok(out)
    }

    /// Returns the `(original key, assigned key)` pairs recorded by the
    /// `create_unique` strategy.
    pub fn duplicates(&self) -> ::Result<Vec<(String, String)>> {
        let mut stmt = self.conn
            .prepare("SELECT idspecid, newid FROM duplicates ORDER BY rowid")
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StoreError::Sqlite).map_err(::Error::Store)?);
        }
        Ok(out)
    }

    /// Returns the persisted autoincrement counters.
    pub fn autoincrements(&self) -> ::Result<Vec<(String, i64)>> {
        let mut stmt = self.conn
            .prepare("SELECT base, n FROM autoincrements ORDER BY rowid")
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StoreError::Sqlite).map_err(::Error::Store)?);
        }
        Ok(out)
    }

    /// Rewrites one stored feature in place.
    pub fn update(&self, feature: &Feature) -> ::Result<()> {
        let id = feature.id().ok_or_else(|| {
            ::Error::Store(StoreError::MissingFeature("<unassigned>".to_owned()))
        })?;
        let attributes = serde_json::to_string(feature.attributes())
            .map_err(StoreError::Json)
            .map_err(::Error::Store)?;
        let extra = serde_json::to_string(&feature.extra())
            .map_err(StoreError::Json)
            .map_err(::Error::Store)?;
        let n = self.conn.execute(
            "UPDATE features SET seqid = ?2, source = ?3, featuretype = ?4, \
             start = ?5, \"end\" = ?6, score = ?7, strand = ?8, frame = ?9, \
             attributes = ?10, extra = ?11, bin = ?12 WHERE id = ?1",
            params![
                id,
                feature.seqid(),
                feature.source(),
                feature.featuretype(),
                feature.start().map(|coord| coord as i64),
                feature.end().map(|coord| coord as i64),
                feature.score(),
                feature.strand(),
                feature.frame(),
                attributes,
                extra,
                feature.bin().map(|bin| bin as i64),
            ])
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        if n == 0 {
            return Err(::Error::Store(StoreError::MissingFeature(id.to_owned())));
        }
        Ok(())
    }

    /// Removes one feature and every edge touching it.
    pub fn delete(&self, id: &str) -> ::Result<()> {
        let n = self.conn
            .execute("DELETE FROM features WHERE id = ?1", params![id])
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        if n == 0 {
            return Err(::Error::Store(StoreError::MissingFeature(id.to_owned())));
        }
        let _ = self.conn
            .execute("DELETE FROM relations WHERE parent = ?1 OR child = ?1", params![id])
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        Ok(())
    }

    fn collect_features(&self, sql: &str, args: Vec<String>) -> ::Result<Vec<Feature>> {
        let mut stmt = self.conn
            .prepare(sql)
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), row_to_raw)
            .map_err(StoreError::Sqlite)
            .map_err(::Error::Store)?;
        let mut raws = Vec::new();
        for row in rows {
            raws.push(row.map_err(StoreError::Sqlite).map_err(::Error::Store)?);
        }
        let mut features = Vec::with_capacity(raws.len());
        for raw in raws {
            features.push(
                raw_to_feature(raw, Some(&self.dialect)).map_err(::Error::Store)?);
        }
        Ok(features)
    }
}

/// Returns the feature columns qualified with the `f.` join alias.
fn feature_cols_prefixed() -> String {
    FEATURE_COLS.split(", ")
        .map(|col| format!("f.{}", col))
        .collect::<Vec<String>>()
        .join(", ")
}

/// Maps one SQL row to the raw tuple form.
fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<FeatureRow> {
    Ok((
        row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?,
        row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?,
        row.get(8)?, row.get(9)?, row.get(10)?,
    ))
}

/// Rebuilds a feature from its raw row.
fn raw_to_feature(raw: FeatureRow, dialect: Option<&Dialect>) -> Result<Feature, StoreError> {
    let (id, seqid, source, featuretype, start, end,
         score, strand, frame, attributes, extra) = raw;
    let attributes = serde_json::from_str(attributes.as_str())?;
    let extra: Vec<String> = serde_json::from_str(extra.as_str())?;

    let mut builder = FBuilder::new(seqid, featuretype)
        .source(source)
        .coords_opt(start.map(|coord| coord as u64), end.map(|coord| coord as u64))
        .score(score)
        .strand(strand)
        .frame(frame)
        .attributes(attributes)
        .extra(extra)
        .id(id);
    if let Some(dialect) = dialect {
        builder = builder.dialect(dialect.clone());
    }
    builder.build().map_err(|err| StoreError::Corrupt(err.to_string()))
}
