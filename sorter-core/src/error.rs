//! Error types for every layer of the engine: parsing, reduction, the
//! append-only log, and the facade that ties them together.

use thiserror::Error;

/// A location in the original submission body, used by [`ParseError::Syntax`]
/// to point back at the offending text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ParseError {
    #[error("syntax error at line {line}, col {col}: {detail}")]
    Syntax {
        line: usize,
        col: usize,
        detail: String,
    },
}

impl ParseError {
    pub fn syntax(pos: Position, detail: impl Into<String>) -> Self {
        ParseError::Syntax {
            line: pos.line,
            col: pos.col,
            detail: detail.into(),
        }
    }
}

/// Semantic errors raised by the reducer while folding a [`crate::dsl::Document`]
/// into [`crate::state::State`]. Every variant aborts the document being
/// processed without mutating state (see invariant 5 in the data model).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ReducerError {
    #[error("item '{title}' submitted without a preceding hashtag")]
    MissingHashtagContext { title: String },
    #[error("vote on '{item1}'/'{item2}' has no preceding attribute declaration")]
    MissingAttributeContext { item1: String, item2: String },
    #[error("unknown item '{title}' referenced in vote")]
    UnknownItem { title: String },
    #[error("item '{title}' already has a body; bodies are immutable")]
    ImmutableBody { title: String },
    #[error("vote ratio {ratio_left}:{ratio_right} contains a zero side")]
    ZeroRatio { ratio_left: u32, ratio_right: u32 },
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed log filename: {0}")]
    MalformedFilename(String),
    #[error("no such log entry: {0}")]
    NotFound(String),
}

/// The error surfaced by [`crate::api::Core::ingest`]. Mirrors the three
/// independent failure modes a submission can hit, in the order they can
/// occur: it might not parse, it might not reduce, or the log append itself
/// might fail.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("submission contained no recognizable dsl statements")]
    NoDslContent,
    #[error(transparent)]
    Reducer(#[from] ReducerError),
    #[error(transparent)]
    Log(#[from] LogError),
}

/// One entry's worth of trouble during [`crate::api::Core::replay`]. Replay
/// never aborts; it collects one of these per bad entry and keeps going.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("while reading {filename}: {source}")]
    Log {
        filename: String,
        #[source]
        source: LogError,
    },
    #[error("while parsing {filename}: {source}")]
    Parse {
        filename: String,
        #[source]
        source: ParseError,
    },
    #[error("while reducing {filename}: {source}")]
    Reducer {
        filename: String,
        #[source]
        source: ReducerError,
    },
}
