//! Office file ingestion
//!
//! An office file is a tiny subset of a graphviz `graph` with annotation
//! comments attached to the node line that follows them:
//!
//! ```text
//! # name: Awnam Office
//! graph awnam {
//!
//! # name: Break Room
//! # has: gamecube
//! # voice: enabled
//! break
//!
//! parking_lot -- reception
//! reception -- break
//! }
//! ```
//!
//! Parsing is single-pass and lenient: lines that match nothing are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::invariants::assert_office_invariants;
use crate::models::Office;

/// A node ID: ASCII letters, digits, underscores, or chars U+0080 to U+00FF
const NODE: &str = r"[_0-9a-zA-Z\x{80}-\x{FF}]+";

static GRAPH_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^graph\s+(.+)\s+\{").unwrap());
static EDGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^({NODE})\s+--\s+({NODE})")).unwrap());
static NODE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(&format!(r"^({NODE})$")).unwrap());
static NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^# name: (.+)").unwrap());
static ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^# has: (.+)").unwrap());
static VOICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^# voice: (.+)").unwrap());

/// Annotations waiting for the next node or header line
#[derive(Debug, Default)]
struct Pending {
    name: Option<String>,
    items: Vec<String>,
    voice_enabled: bool,
}

impl Pending {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One recognized line of an office file
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Blank,
    Name(&'a str),
    Item(&'a str),
    Voice(&'a str),
    Node(&'a str),
    Edge(&'a str, &'a str),
    Header(&'a str),
    Unknown,
}

fn capture<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
    re.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn classify(line: &str) -> Line<'_> {
    if line.is_empty() {
        return Line::Blank;
    }
    if let Some(name) = capture(&NAME, line) {
        return Line::Name(name);
    }
    if let Some(item) = capture(&ITEM, line) {
        return Line::Item(item);
    }
    if let Some(voice) = capture(&VOICE, line) {
        return Line::Voice(voice);
    }
    if let Some(id) = capture(&NODE_ID, line) {
        return Line::Node(id);
    }
    if let Some(caps) = EDGE.captures(line) {
        if let (Some(a), Some(b)) = (caps.get(1), caps.get(2)) {
            return Line::Edge(a.as_str(), b.as_str());
        }
    }
    if let Some(id) = capture(&GRAPH_HEADER, line) {
        return Line::Header(id);
    }
    Line::Unknown
}

struct Parser {
    office: Office,
    pending: Pending,
}

impl Parser {
    fn new() -> Self {
        Self {
            office: Office::empty(),
            pending: Pending::default(),
        }
    }

    fn feed(&mut self, raw: &str) {
        match classify(raw.trim()) {
            Line::Blank => self.pending.reset(),
            Line::Name(name) => self.pending.name = Some(name.to_string()),
            Line::Item(item) => self.pending.items.push(item.to_string()),
            Line::Voice(value) => self.pending.voice_enabled = value == "enabled",
            Line::Node(id) => {
                let pending = std::mem::take(&mut self.pending);
                let room = self.office.room_entry(id);
                if !pending.items.is_empty() {
                    room.items = pending.items;
                }
                if let Some(name) = pending.name {
                    room.name = name;
                }
                if pending.voice_enabled {
                    room.voice_enabled = true;
                }
            }
            Line::Edge(a, b) => self.office.add_edge(a, b),
            Line::Header(id) => {
                let name = self.pending.name.take();
                self.office.set_header(id.to_string(), name);
            }
            Line::Unknown => {
                debug!(line = raw, "Skipping unrecognized office line");
            }
        }
    }

    fn finish(self) -> Office {
        assert_office_invariants(&self.office);
        self.office
    }
}

impl Office {
    /// Parse an office from its textual description
    pub fn parse_str(source: &str) -> Office {
        let mut parser = Parser::new();
        for line in source.lines() {
            parser.feed(line);
        }
        parser.finish()
    }

    /// Parse an office file
    ///
    /// Fails only if the file cannot be opened or read.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Office> {
        let path = path.as_ref();
        let parse_err = |source| Error::Parse {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = BufReader::new(File::open(path).map_err(parse_err)?);
        let mut parser = Parser::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).map_err(parse_err)? == 0 {
                break;
            }
            // invalid UTF-8 only spoils the line it is on
            let line = String::from_utf8_lossy(&buf);
            parser.feed(line.trim_end_matches(['\n', '\r']));
        }
        Ok(parser.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn sample_office_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../offices/awnam.dot")
    }

    #[test]
    fn test_classify_lines() {
        assert_eq!(classify(""), Line::Blank);
        assert_eq!(classify("# name: Break Room"), Line::Name("Break Room"));
        assert_eq!(classify("# has: gamecube"), Line::Item("gamecube"));
        assert_eq!(classify("# voice: enabled"), Line::Voice("enabled"));
        assert_eq!(classify("break"), Line::Node("break"));
        assert_eq!(classify("a -- b"), Line::Edge("a", "b"));
        assert_eq!(classify("graph awnam {"), Line::Header("awnam"));
        assert_eq!(classify("}"), Line::Unknown);
        assert_eq!(classify("# just a comment"), Line::Unknown);
    }

    #[test]
    fn test_non_ascii_node_ids() {
        let office = Office::parse_str("graph x {\nkaffee_küche -- büro\n}");
        assert!(office.room("kaffee_küche").is_some());
        assert_eq!(office.neighbors("büro"), ["kaffee_küche"]);

        // only Latin-1 letters beyond ASCII
        assert_eq!(classify("会議室"), Line::Unknown);
        assert_eq!(classify("lobby -- 会議室"), Line::Unknown);
    }

    #[test]
    fn test_edges_are_symmetric() {
        let office = Office::parse_str("graph x {\na -- b\n}");
        assert_eq!(office.neighbors("a"), ["b"]);
        assert_eq!(office.neighbors("b"), ["a"]);
    }

    #[test]
    fn test_edge_endpoints_become_default_rooms() {
        let office = Office::parse_str("graph x {\na -- b\n}");
        let room = office.room("b").unwrap();
        assert_eq!(room.name, "b");
        assert!(room.items.is_empty());
        assert!(!room.voice_enabled);
    }

    #[test]
    fn test_header_name_annotation() {
        let office = Office::parse_str("# name: Head Quarters\ngraph hq {\n}");
        assert_eq!(office.id(), "hq");
        assert_eq!(office.name(), "Head Quarters");

        let office = Office::parse_str("graph hq {\n}");
        assert_eq!(office.name(), "hq");
    }

    #[test]
    fn test_blank_line_resets_annotations() {
        let office = Office::parse_str(
            "graph x {\n# name: Lost Name\n# has: lamp\n# voice: enabled\n\nlobby\n}",
        );
        let lobby = office.room("lobby").unwrap();
        assert_eq!(lobby.name, "lobby");
        assert!(lobby.items.is_empty());
        assert!(!lobby.voice_enabled);
    }

    #[test]
    fn test_annotations_attach_to_next_node_only() {
        let office = Office::parse_str(
            "graph x {\n# name: Lab\n# has: laser\n# has: goggles\n# voice: enabled\nlab\nstore\n}",
        );
        let lab = office.room("lab").unwrap();
        assert_eq!(lab.name, "Lab");
        assert_eq!(lab.items, ["laser", "goggles"]);
        assert!(lab.voice_enabled);

        let store = office.room("store").unwrap();
        assert_eq!(store.name, "store");
        assert!(!store.voice_enabled);
    }

    #[test]
    fn test_node_declared_after_edge_keeps_edges() {
        let office = Office::parse_str("graph x {\na -- b\n\n# name: Bee\nb\n}");
        assert_eq!(office.room("b").unwrap().name, "Bee");
        assert_eq!(office.neighbors("b"), ["a"]);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let office = Office::parse_str("graph x {\na -> b\n-- c\n!!!\nd\n}");
        assert_eq!(office.room_count(), 1);
        assert!(office.room("d").is_some());
    }

    #[test]
    fn test_from_file_sample_office() {
        let office = Office::from_file(sample_office_path()).unwrap();

        assert_eq!(office.id(), "awnam");
        assert_eq!(office.name(), "Awnam Office");
        assert_eq!(office.adjacency().count(), 16);
        assert_eq!(office.neighbors("parking_lot"), ["reception"]);
        assert!(office.neighbors("reception").iter().any(|id| id == "frizzle_office"));

        let break_room = office.room("break").unwrap();
        assert_eq!(break_room.name, "Break Room");
        assert!(break_room.items.iter().any(|item| item == "gamecube"));
        assert!(break_room.voice_enabled);
    }

    #[test]
    fn test_parsing_twice_is_equal() {
        let first = Office::from_file(sample_office_path()).unwrap();
        let second = Office::from_file(sample_office_path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_from_file_missing_is_parse_error() {
        let dir = tempdir().unwrap();
        let err = Office::from_file(dir.path().join("nope.dot")).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_from_file_matches_parse_str() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.dot");
        let source = "graph tiny {\n# voice: enabled\nlobby\nlobby -- desk\n}\n";
        std::fs::write(&path, source).unwrap();

        assert_eq!(Office::from_file(&path).unwrap(), Office::parse_str(source));
    }

    #[test]
    fn test_from_file_tolerates_invalid_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin1.dot");
        std::fs::write(&path, b"graph x {\r\n\xff\xfe junk\nlobby -- desk\r\n}\n").unwrap();

        let office = Office::from_file(&path).unwrap();
        assert_eq!(office.id(), "x");
        assert_eq!(office.neighbors("lobby"), ["desk"]);
        assert_eq!(office.rooms().count(), 2);
    }
}
