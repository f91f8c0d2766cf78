use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::Path,
};

use flate2::{read::MultiGzDecoder, write::GzEncoder, Compression};

use crate::error::SfmError;

/// The first two bytes of every gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Check whether a buffer starts with the gzip magic number.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Inflate the buffer if it is gzip compressed, otherwise return it unchanged.
/// Concatenated gzip members are inflated one after the other.
pub fn decompress_if_gzip(raw: Vec<u8>) -> std::io::Result<Vec<u8>> {
    if !is_gzip(&raw) {
        return Ok(raw);
    }
    let mut inflated = Vec::with_capacity(raw.len() * 4);
    MultiGzDecoder::new(raw.as_slice()).read_to_end(&mut inflated)?;
    Ok(inflated)
}

/// Read a whole file, transparently inflating gzip content.
///
/// # Arguments
///
/// * `path` - The file to read.
///
/// # Returns
///
/// The decompressed bytes of the file.
pub fn read_file_bytes(path: impl AsRef<Path>) -> Result<Vec<u8>, SfmError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| SfmError::file(path, e))?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)
        .map_err(|e| SfmError::file(path, e))?;
    decompress_if_gzip(raw).map_err(|e| SfmError::file(path, e))
}

/// Read a whole text file, transparently inflating gzip content.
pub fn read_file_text(path: impl AsRef<Path>) -> Result<String, SfmError> {
    let path = path.as_ref();
    let bytes = read_file_bytes(path)?;
    String::from_utf8(bytes).map_err(|e| SfmError::ParseError {
        what: format!("text of {}", path.display()),
        token: e.to_string(),
    })
}

/// Whether a path asks for compressed output.
pub fn has_gz_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// A buffered output file, gzip compressed when the path ends in `.gz`.
pub enum OutputFile {
    /// Plain text output.
    Plain(BufWriter<File>),
    /// Gzip compressed output.
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputFile {
    /// Create the file, truncating any previous content.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SfmError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SfmError::file(path, e))?;
        let writer = BufWriter::new(file);
        if has_gz_extension(path) {
            Ok(OutputFile::Gzip(GzEncoder::new(writer, Compression::default())))
        } else {
            Ok(OutputFile::Plain(writer))
        }
    }

    /// Flush all buffers and write the gzip trailer if any.
    pub fn finish(self) -> std::io::Result<()> {
        match self {
            OutputFile::Plain(mut writer) => writer.flush(),
            OutputFile::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            OutputFile::Plain(writer) => writer.write(buf),
            OutputFile::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            OutputFile::Plain(writer) => writer.flush(),
            OutputFile::Gzip(encoder) => encoder.flush(),
        }
    }
}
