/*! Input sources, line streaming, and the GFF text writer.

Annotation text can arrive from a local file (optionally gzip-compressed), a
remote URL, an in-memory text blob, or an already-parsed feature stream. The
types here fold the first three into one lazy sequence of numbered lines,
with a `peek`-and-rewind combinator layered on top for dialect inference:
the peeked prefix is buffered, and the rewound stream chains the buffer with
the remainder so no line is read twice from the underlying source.

Readers own their underlying handles; dropping a stream releases the file or
connection on every exit path.
*/
use std::borrow::Cow;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::vec;

use flate2::read::MultiGzDecoder;
use ureq;

use model::parse_line;
use utils::is_gzip_name;
use {Dialect, Feature, GffLine};


/// An input source of annotation data.
#[derive(Debug)]
pub enum GffSource {
    /// A local file path; `.gz` suffixes are transparently decompressed.
    Path(PathBuf),
    /// A remote URL; the response is streamed, with the same gzip handling.
    Url(String),
    /// A text blob of annotation lines.
    Text(String),
    /// An in-memory stream of already-parsed features.
    Features(Vec<Feature>),
}

impl GffSource {

    /// Creates a source from anything path-like.
    pub fn from_path<P: AsRef<Path>>(path: P) -> GffSource {
        GffSource::Path(path.as_ref().to_path_buf())
    }

    /// Creates a source from a URL string.
    pub fn from_url<T: Into<String>>(url: T) -> GffSource {
        GffSource::Url(url.into())
    }

    /// Creates a source from annotation text held in memory.
    pub fn from_text<T: Into<String>>(text: T) -> GffSource {
        GffSource::Text(text.into())
    }

    /// Creates a source from parsed features held in memory.
    pub fn from_features(features: Vec<Feature>) -> GffSource {
        GffSource::Features(features)
    }
}

impl<'a> From<&'a Path> for GffSource {

    fn from(path: &'a Path) -> GffSource {
        GffSource::from_path(path)
    }
}

impl From<PathBuf> for GffSource {

    fn from(path: PathBuf) -> GffSource {
        GffSource::Path(path)
    }
}

/// Lazy sequence of numbered input lines.
///
/// Line numbers are 1-based. Yielded lines have their trailing newline
/// stripped.
pub struct LineStream {
    inner: io::BufReader<Box<dyn io::Read>>,
    lineno: u64,
}

impl LineStream {

    /// Opens the given source as a line stream.
    ///
    /// Feature-stream sources carry no text lines and are rejected here;
    /// they are consumed directly by the ingest.
    pub fn open(source: &GffSource) -> ::Result<LineStream> {
        let reader: Box<dyn io::Read> = match source {
            &GffSource::Path(ref path) => {
                let file = fs::File::open(path)?;
                if path.to_str().map(is_gzip_name).unwrap_or(false) {
                    Box::new(MultiGzDecoder::new(file))
                } else {
                    Box::new(file)
                }
            }
            &GffSource::Url(ref url) => {
                let response = ureq::get(url.as_str()).call()?;
                if is_gzip_name(url.as_str()) {
                    Box::new(MultiGzDecoder::new(response.into_reader()))
                } else {
                    Box::new(response.into_reader())
                }
            }
            &GffSource::Text(ref text) => Box::new(io::Cursor::new(text.clone().into_bytes())),
            &GffSource::Features(_) => {
                let err = io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "feature-stream sources carry no text lines");
                return Err(::Error::Io(err));
            }
        };
        Ok(LineStream {
            inner: io::BufReader::new(reader),
            lineno: 0,
        })
    }
}

impl Iterator for LineStream {

    type Item = io::Result<(u64, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = String::new();
        match self.inner.read_line(&mut buf) {
            Ok(0) => None,
            Ok(_) => {
                self.lineno += 1;
                while buf.ends_with('\n') || buf.ends_with('\r') {
                    let _ = buf.pop();
                }
                Some(Ok((self.lineno, buf)))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// A line stream restarted after a peek.
///
/// Yields the buffered prefix first, then continues with the untouched
/// remainder of the original stream.
pub struct PeekedLines {
    buffer: vec::IntoIter<(u64, String)>,
    rest: LineStream,
}

impl Iterator for PeekedLines {

    type Item = io::Result<(u64, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.buffer.next() {
            Some(item) => Some(Ok(item)),
            None => self.rest.next(),
        }
    }
}

/// Reads the leading record lines of a stream, then rewinds it.
///
/// Up to `n` candidate record lines (lines that are neither comments,
/// directives, nor blank) are read and returned; `None` reads the whole
/// stream. The second return value replays every consumed line, in order,
/// before the rest of the stream.
pub fn peek_lines(
    mut stream: LineStream,
    n: Option<usize>,
) -> ::Result<(Vec<(u64, String)>, PeekedLines)> {

    let mut buffer = Vec::new();
    let mut n_records = 0;
    loop {
        if let Some(limit) = n {
            if n_records >= limit {
                break;
            }
        }
        match stream.next() {
            None => break,
            Some(Err(err)) => return Err(::Error::Io(err)),
            Some(Ok((lineno, line))) => {
                if line == "##FASTA" {
                    buffer.push((lineno, line));
                    break;
                }
                if !line.trim().is_empty() && !line.starts_with('#') {
                    n_records += 1;
                }
                buffer.push((lineno, line));
            }
        }
    }

    let replay = buffer.clone();
    Ok((buffer, PeekedLines {
        buffer: replay.into_iter(),
        rest: stream,
    }))
}

/// GFF reader.
///
/// Parses annotation text into [`GffLine`](::GffLine) values under a fixed
/// dialect. For dialect inference over unseen input, use the ingest entry
/// points instead; this reader is the right tool once the dialect is known.
pub struct Reader<R: io::Read> {
    inner: io::BufReader<R>,
    dialect: Dialect,
    decode_percent: bool,
}

impl<R: io::Read> Reader<R> {

    /// Creates a GFF reader from another reader.
    pub fn from_reader(in_reader: R) -> Reader<R> {
        Reader {
            inner: io::BufReader::new(in_reader),
            dialect: Dialect::default(),
            decode_percent: true,
        }
    }

    /// Sets the dialect used for attribute parsing.
    pub fn dialect(&mut self, dialect: Dialect) -> &mut Self {
        self.dialect = dialect;
        self
    }

    /// Sets whether `%XX` escapes are decoded in GFF3 attributes.
    pub fn decode_percent(&mut self, decode_percent: bool) -> &mut Self {
        self.decode_percent = decode_percent;
        self
    }

    /// Creates an iterator of parsed lines.
    ///
    /// Iteration ends at end of input or at a `##FASTA` directive, whichever
    /// comes first.
    pub fn lines(&mut self) -> Lines<R> {
        Lines {
            reader: self,
            lineno: 0,
            done: false,
        }
    }
}

impl Reader<fs::File> {

    /// Creates a GFF reader that reads from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        fs::File::open(path).map(Reader::from_reader)
    }
}

/// Iterator over parsed GFF lines.
pub struct Lines<'a, R: 'a> where R: io::Read {
    reader: &'a mut Reader<R>,
    lineno: u64,
    done: bool,
}

impl<'a, R> Iterator for Lines<'a, R> where R: io::Read {

    type Item = ::Result<GffLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = String::new();
        match self.reader.inner.read_line(&mut buf) {
            Ok(0) => None,
            Err(err) => {
                self.done = true;
                Some(Err(::Error::Io(err)))
            }
            Ok(_) => {
                self.lineno += 1;
                let parsed = parse_line(
                    buf.as_str(), self.lineno,
                    &self.reader.dialect, self.reader.decode_percent);
                match parsed {
                    Ok(GffLine::Fasta) => {
                        self.done = true;
                        None
                    }
                    Ok(line) => Some(Ok(line)),
                    Err(err) => Some(Err(::Error::Line(err))),
                }
            }
        }
    }
}

/// GFF text writer.
pub struct Writer<W: io::Write> {
    inner: W,
    dialect: Dialect,
    encode_percent: bool,
}

impl<W: io::Write> Writer<W> {

    /// Creates a GFF writer from another writer.
    pub fn from_writer(in_writer: W) -> Writer<W> {
        Writer {
            inner: in_writer,
            dialect: Dialect::default(),
            encode_percent: true,
        }
    }

    /// Sets the dialect used for attribute rendering.
    pub fn dialect(&mut self, dialect: Dialect) -> &mut Self {
        self.dialect = dialect;
        self
    }

    /// Sets whether reserved characters are re-encoded in GFF3 attributes.
    pub fn encode_percent(&mut self, encode_percent: bool) -> &mut Self {
        self.encode_percent = encode_percent;
        self
    }

    /// Writes the given directive line verbatim.
    pub fn write_directive(&mut self, directive: &str) -> ::Result<()> {
        self.inner.write_all(directive.as_bytes())?;
        self.inner.write_all(b"\n")?;
        Ok(())
    }

    /// Writes the given feature as one GFF line.
    pub fn write_feature(&mut self, feature: &Feature) -> ::Result<()> {
        let line = feature.to_gff_line(&self.dialect, self.encode_percent);
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")?;
        Ok(())
    }
}

impl Writer<fs::File> {

    /// Creates a GFF writer that writes to the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let f = fs::File::create(path)?;
        Ok(Writer::from_writer(f))
    }
}

impl Writer<Vec<u8>> {

    /// Creates a GFF writer that writes to an in-memory buffer.
    ///
    /// The initial capacity of the buffer is 64 KiB.
    pub fn from_memory() -> Writer<Vec<u8>> {
        Writer::from_writer(Vec::with_capacity(1024 * 64))
    }

    /// Returns the contents of the in-memory buffer as a string.
    pub fn as_string(&self) -> Cow<str> {
        String::from_utf8_lossy(self.inner.as_slice())
    }
}
