//! Inbox discovery and loading.
//!
//! An inbox is a directory with one sub-directory per contact; each contact
//! folder holds one or more `message_<n>.json` export files. File-name parsing
//! lives here so the merger only ever sees typed [`MessagePart`]s.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::raw_message::{ExportDocument, MessagePart};
use crate::repair::repair_encoding;

const FILE_PREFIX: &str = "message_";
const FILE_SUFFIX: &str = ".json";

/// Failure while reading a single folder of an inbox.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} contains no message_<n>.json files")]
    NoMessageFiles(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SourceError + '_ {
    move |source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Numeric index of a `message_<n>.json` file, or `None` for any other name.
pub fn message_file_index(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let digits = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match digits.parse() {
        Ok(index) => Some(index),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "message file index out of range; file ignored");
            None
        }
    }
}

/// Parse one export file into a [`MessagePart`].
pub fn read_part(path: &Path, index: u64, repair: bool) -> Result<MessagePart, SourceError> {
    let raw = fs::read_to_string(path).map_err(io_err(path))?;
    let json_err = |source| SourceError::Json {
        path: path.to_path_buf(),
        source,
    };
    let mut value: Value = serde_json::from_str(&raw).map_err(json_err)?;
    if repair {
        value = repair_encoding(value);
    }
    let doc: ExportDocument = serde_json::from_value(value).map_err(json_err)?;
    Ok(MessagePart {
        index,
        messages: doc.messages,
    })
}

/// Reader over an inbox directory.
#[derive(Debug, Clone)]
pub struct Inbox {
    root: PathBuf,
    repair: bool,
}

impl Inbox {
    /// `repair` applies [`repair_encoding`] to every document before parsing.
    pub fn new(root: impl Into<PathBuf>, repair: bool) -> Self {
        Inbox {
            root: root.into(),
            repair,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all contact folders, sorted.
    pub fn folders(&self) -> Result<Vec<String>, SourceError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_err(&self.root))? {
            let entry = entry.map_err(io_err(&self.root))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                out.push(name.to_string());
            }
        }
        out.sort();
        Ok(out)
    }

    /// Export files of `folder` with their numeric index, in directory order.
    pub fn message_files(&self, folder: &str) -> Result<Vec<(u64, PathBuf)>, SourceError> {
        let dir = self.root.join(folder);
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_err(&dir))? {
            let path = entry.map_err(io_err(&dir))?.path();
            match message_file_index(&path) {
                Some(idx) if path.is_file() => files.push((idx, path)),
                _ => debug!(path = %path.display(), "ignoring non-message file"),
            }
        }
        Ok(files)
    }

    /// Read every export file of `folder`. Parts are returned unordered;
    /// ordering is the merger's concern.
    pub fn load_parts(&self, folder: &str) -> Result<Vec<MessagePart>, SourceError> {
        let files = self.message_files(folder)?;
        if files.is_empty() {
            return Err(SourceError::NoMessageFiles(self.root.join(folder)));
        }
        files
            .iter()
            .map(|(idx, path)| read_part(path, *idx, self.repair))
            .collect()
    }
}
