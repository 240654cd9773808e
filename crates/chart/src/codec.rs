//! V2 codec: versioned JSON round-trip of [`GraphDef`].
//!
//! The encoded form is stable: keys follow struct declaration order and
//! floats use serde_json's shortest-exact formatting, so encoding the same
//! GraphDef twice yields identical bytes. Files whose name ends in `.gz`
//! are transparently gzip-wrapped.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graphdef::GraphDef;

pub const V2_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported graph version {found} (expected {V2_VERSION})")]
    Version { found: u32 },
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    #[serde(flatten)]
    graph: GraphDef,
}

pub fn encode_to<W: Write>(graph: &GraphDef, writer: W) -> Result<(), CodecError> {
    let envelope = Envelope {
        version: V2_VERSION,
        graph: graph.clone(),
    };
    serde_json::to_writer(writer, &envelope)?;
    Ok(())
}

pub fn decode_from<R: Read>(reader: R) -> Result<GraphDef, CodecError> {
    let envelope: Envelope = serde_json::from_reader(reader)?;
    if envelope.version != V2_VERSION {
        return Err(CodecError::Version {
            found: envelope.version,
        });
    }
    Ok(envelope.graph)
}

pub fn encode_string(graph: &GraphDef) -> Result<String, CodecError> {
    let mut buf = Vec::new();
    encode_to(graph, &mut buf)?;
    // serde_json output is always UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write a GraphDef to `path`, gzip-compressed iff the name ends in `.gz`.
pub fn write_file(graph: &GraphDef, path: &Path) -> Result<(), CodecError> {
    let file = BufWriter::new(File::create(path)?);
    if is_gz(path) {
        let mut gz = GzEncoder::new(file, Compression::default());
        encode_to(graph, &mut gz)?;
        gz.finish()?.flush()?;
    } else {
        let mut file = file;
        encode_to(graph, &mut file)?;
        file.flush()?;
    }
    Ok(())
}

pub fn read_file(path: &Path) -> Result<GraphDef, CodecError> {
    let file = BufReader::new(File::open(path)?);
    if is_gz(path) {
        decode_from(GzDecoder::new(file))
    } else {
        decode_from(file)
    }
}

fn is_gz(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}
