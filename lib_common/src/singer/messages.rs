//! Singer messages and the channel they are written to.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One line of tap output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Describes the records that follow for a stream.
    Schema {
        /// Stream name.
        stream: String,
        /// JSON Schema of the stream's records.
        schema: Value,
        /// Primary key fields.
        key_properties: Vec<String>,
        /// Fields used as bookmarks; omitted when empty.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        bookmark_properties: Vec<String>,
    },
    /// A single extracted record.
    Record {
        /// Stream name.
        stream: String,
        /// The transformed record.
        record: Map<String, Value>,
        /// RFC 3339 extraction time.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_extracted: Option<String>,
    },
    /// The state to resume from on the next run.
    State {
        /// The full state document.
        value: Value,
    },
}

/// Writes messages as JSON lines, flushing after each one so downstream
/// targets see records as they are produced.
pub struct MessageWriter<W: Write> {
    out: W,
}

impl MessageWriter<io::Stdout> {
    /// A writer on the process stdout.
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> MessageWriter<W> {
    /// Wraps any `Write` sink.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Serializes `message` on a single line.
    pub fn write_message(&mut self, message: &Message) -> io::Result<()> {
        let line = serde_json::to_string(message).map_err(io::Error::other)?;
        self.out.write_all(line.as_bytes())?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }

    /// Gives the sink back, e.g. to inspect a buffer in tests.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Parses JSON-lines output back into messages. Blank lines are skipped.
pub fn parse_messages(output: &[u8]) -> serde_json::Result<Vec<Message>> {
    String::from_utf8_lossy(output)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(serde_json::from_str)
        .collect()
}
