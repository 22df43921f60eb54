// Dependency manifest (requirements.txt) parsing and pin validation.
//
// Every line is blank, a `#` comment, or an exact pin `name[extras]==version`
// with an optional environment marker (`; python_version >= "3.9"`) and an
// optional trailing comment. Problems are collected for the whole file so the
// caller can report them all at once.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// `name` or `name[extra,extra]`, PEP 508 identifier rules.
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<name>[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)(?:\[(?P<extras>[^\]]*)\])?$",
    )
    .expect("valid regex")
});

static EXTRA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("valid regex")
});

/// Release segment, then optional pre/post/dev parts and a local label.
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[0-9]+(?:\.[0-9]+)*(?:(?:a|b|rc)[0-9]+)?(?:\.post[0-9]+)?(?:\.dev[0-9]+)?(?:\+[A-Za-z0-9]+(?:\.[A-Za-z0-9]+)*)?$",
    )
    .expect("valid regex")
});

static SEPARATOR_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("valid regex"));

/// Comparison operators that make a requirement something other than an exact pin.
const LOOSE_OPERATORS: &[&str] = &["===", "~=", "!=", ">=", "<=", ">", "<"];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One exact pin from the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// 1-based line number.
    pub line: usize,
    pub name: String,
    pub extras: Vec<String>,
    pub version: String,
    pub marker: Option<String>,
    pub comment: Option<String>,
}

impl ManifestEntry {
    pub fn canonical_name(&self) -> String {
        canonical_name(&self.name)
    }
}

/// A manifest in which every requirement line is a valid pin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
    pub comments: usize,
    pub blanks: usize,
}

impl Manifest {
    /// Look a package up by name, ignoring case and `-`/`_`/`.` differences.
    pub fn find(&self, name: &str) -> Option<&ManifestEntry> {
        let wanted = canonical_name(name);
        self.entries.iter().find(|e| e.canonical_name() == wanted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    NotPinned,
    InvalidName,
    InvalidVersion,
    Duplicate { first_line: usize },
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::NotPinned => write!(f, "not an exact pin"),
            IssueKind::InvalidName => write!(f, "invalid package name"),
            IssueKind::InvalidVersion => write!(f, "invalid version"),
            IssueKind::Duplicate { first_line } => {
                write!(f, "duplicate of line {first_line}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestIssue {
    pub line: usize,
    pub kind: IssueKind,
    /// The offending requirement text (comment stripped).
    pub text: String,
}

impl fmt::Display for ManifestIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {}", self.line, self.kind, self.text)
    }
}

/// Every problem found in a manifest, in line order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render_issues(.issues))]
pub struct ManifestReport {
    pub issues: Vec<ManifestIssue>,
}

fn render_issues(issues: &[ManifestIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} has {} problem(s):\n{report}", .report.issues.len())]
    Invalid {
        path: PathBuf,
        report: ManifestReport,
    },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse manifest text, returning either the pins or every issue found.
pub fn parse_manifest(text: &str) -> Result<Manifest, ManifestReport> {
    let mut manifest = Manifest::default();
    let mut issues = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            manifest.blanks += 1;
            continue;
        }
        if trimmed.starts_with('#') {
            manifest.comments += 1;
            continue;
        }

        let (body, comment) = split_comment(trimmed);
        match parse_pin(body, line_no) {
            Ok(mut entry) => {
                entry.comment = comment;
                let key = entry.canonical_name();
                if let Some(&first_line) = seen.get(&key) {
                    issues.push(ManifestIssue {
                        line: line_no,
                        kind: IssueKind::Duplicate { first_line },
                        text: body.to_string(),
                    });
                    continue;
                }
                seen.insert(key, line_no);
                manifest.entries.push(entry);
            }
            Err(kind) => issues.push(ManifestIssue {
                line: line_no,
                kind,
                text: body.to_string(),
            }),
        }
    }

    if issues.is_empty() {
        Ok(manifest)
    } else {
        Err(ManifestReport { issues })
    }
}

/// Read and parse a manifest file.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&text).map_err(|report| ManifestError::Invalid {
        path: path.to_path_buf(),
        report,
    })
}

/// PEP 503 normalisation: lowercase, runs of `-`, `_`, `.` become one `-`.
pub fn canonical_name(name: &str) -> String {
    SEPARATOR_RUN_RE
        .replace_all(&name.to_ascii_lowercase(), "-")
        .into_owned()
}

/// Whether `version` is an acceptable pinned version string.
pub fn is_valid_version(version: &str) -> bool {
    VERSION_RE.is_match(version)
}

/// Split off a trailing comment. Like pip, `#` only starts a comment at the
/// beginning of the line or after whitespace.
fn split_comment(line: &str) -> (&str, Option<String>) {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            let comment = line[i + 1..].trim();
            let comment = (!comment.is_empty()).then(|| comment.to_string());
            return (line[..i].trim_end(), comment);
        }
    }
    (line, None)
}

fn parse_pin(body: &str, line: usize) -> Result<ManifestEntry, IssueKind> {
    // Options (-r, -e, --index-url) and URLs are never exact pins.
    if body.starts_with('-') || body.contains("://") {
        return Err(IssueKind::NotPinned);
    }

    let (requirement, marker) = match body.split_once(';') {
        Some((req, marker)) => (req.trim(), Some(marker.trim().to_string())),
        None => (body, None),
    };

    if LOOSE_OPERATORS.iter().any(|op| requirement.contains(op)) {
        return Err(IssueKind::NotPinned);
    }
    let Some((lhs, rhs)) = requirement.split_once("==") else {
        return Err(IssueKind::NotPinned);
    };

    let lhs = lhs.trim();
    let version = rhs.trim();

    let caps = NAME_RE.captures(lhs).ok_or(IssueKind::InvalidName)?;
    let name = caps["name"].to_string();
    let extras = match caps.name("extras") {
        Some(group) => parse_extras(group.as_str())?,
        None => Vec::new(),
    };

    // Prefix matches (`==1.*`) fail here too; they are not exact pins.
    if !is_valid_version(version) {
        return Err(IssueKind::InvalidVersion);
    }

    Ok(ManifestEntry {
        line,
        name,
        extras,
        version: version.to_string(),
        marker: marker.filter(|m| !m.is_empty()),
        comment: None,
    })
}

fn parse_extras(group: &str) -> Result<Vec<String>, IssueKind> {
    group
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|e| {
            if EXTRA_RE.is_match(e) {
                Ok(e.to_string())
            } else {
                Err(IssueKind::InvalidName)
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
