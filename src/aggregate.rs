//! Grouping and merging of per-frame files into session bundles.
//!
//! Files are processed in one pass. Each accepted file lands in the
//! [`CameraGroup`] for its (session, camera) pair; bundles keep cameras in
//! first-seen order. Per-file problems never abort the run: they are recorded
//! as [`FileIssue`]s and the file is skipped.

use crate::pattern::{FilenamePattern, ParsedName};
use crate::wrapper::{self, WrapperNames, WriteFailure, WrittenWrapper};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// What to do when two files claim the same frame of the same camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep the first file seen and skip the later one.
    #[default]
    Reject,
    /// Replace the stored frame with the later file.
    Overwrite,
}

/// Settings for one aggregation run, resolved from config and CLI.
#[derive(Debug, Clone)]
pub struct WrapOptions {
    pub output_dir: PathBuf,
    /// Appended to the sanitized session id to form the wrapper file name.
    pub suffix: String,
    /// Collapse `*_keypoints_2d`/`*_keypoints_3d` arrays onto one line.
    pub compact_keypoints: bool,
    pub duplicates: DuplicatePolicy,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            suffix: ".json".to_string(),
            compact_keypoints: true,
            duplicates: DuplicatePolicy::default(),
        }
    }
}

/// All frames of one camera within a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraGroup {
    pub id: String,
    pub camera: String,
    pub width: u32,
    pub height: u32,
    /// Serialized with string keys, ascending by frame index.
    pub frames: BTreeMap<u64, Value>,
}

impl CameraGroup {
    fn new(name: &ParsedName) -> Self {
        Self {
            id: name.id.clone(),
            camera: name.camera.clone(),
            width: name.width,
            height: name.height,
            frames: BTreeMap::new(),
        }
    }
}

/// Every camera recorded for one session, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct SessionBundle {
    pub id: String,
    cameras: Vec<CameraGroup>,
    camera_index: HashMap<String, usize>,
}

impl SessionBundle {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn cameras(&self) -> &[CameraGroup] {
        &self.cameras
    }

    /// Total number of frames across all cameras.
    pub fn frame_count(&self) -> usize {
        self.cameras.iter().map(|c| c.frames.len()).sum()
    }

    fn camera_mut(&mut self, camera: &str) -> Option<&mut CameraGroup> {
        let index = *self.camera_index.get(camera)?;
        Some(&mut self.cameras[index])
    }

    fn push_camera(&mut self, group: CameraGroup) -> &mut CameraGroup {
        let index = self.cameras.len();
        self.camera_index.insert(group.camera.clone(), index);
        self.cameras.push(group);
        &mut self.cameras[index]
    }
}

/// Category of a per-file problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// The path did not match the pattern, or a captured number was invalid.
    NameParse,
    /// The file is not valid JSON (or not an object/array).
    ContentParse,
    /// Resolution conflict or duplicate frame within a camera group.
    Consistency,
    /// The file could not be read.
    Io,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            IssueKind::NameParse => "name parse error",
            IssueKind::ContentParse => "content parse error",
            IssueKind::Consistency => "consistency error",
            IssueKind::Io => "I/O error",
        };
        f.write_str(label)
    }
}

/// A problem with a single input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIssue {
    pub path: PathBuf,
    pub kind: IssueKind,
    pub detail: String,
}

impl FileIssue {
    fn new(path: &Path, kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for FileIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.path.display(), self.kind, self.detail)
    }
}

/// In-memory merge state for one run.
pub struct Aggregator<'p> {
    pattern: &'p FilenamePattern,
    duplicates: DuplicatePolicy,
    sessions: Vec<SessionBundle>,
    session_index: HashMap<String, usize>,
    files_merged: usize,
    skipped: Vec<FileIssue>,
    warnings: Vec<FileIssue>,
}

impl<'p> Aggregator<'p> {
    pub fn new(pattern: &'p FilenamePattern, duplicates: DuplicatePolicy) -> Self {
        Self {
            pattern,
            duplicates,
            sessions: Vec::new(),
            session_index: HashMap::new(),
            files_merged: 0,
            skipped: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Parse the name of `path`, read its JSON content and merge it.
    /// Returns `true` if the frame ended up in a camera group.
    pub fn add_file(&mut self, path: &Path) -> bool {
        let name = match self.pattern.parse(path) {
            Ok(name) => name,
            Err(e) => {
                self.skip(FileIssue::new(path, IssueKind::NameParse, e.to_string()));
                return false;
            }
        };

        let record = match read_frame(path) {
            Ok(record) => record,
            Err(issue) => {
                self.skip(issue);
                return false;
            }
        };

        self.add_frame(path, name, record)
    }

    /// Merge a frame whose name and content are already parsed. `path` is
    /// only used for reporting.
    pub fn add_frame(&mut self, path: &Path, name: ParsedName, record: Value) -> bool {
        let duplicates = self.duplicates;
        let session = self.session_mut(&name.id);

        let group = match session.camera_mut(&name.camera) {
            Some(group) => {
                if (group.width, group.height) != (name.width, name.height) {
                    let detail = format!(
                        "resolution {}x{} conflicts with {}x{} already recorded for camera \"{}\" of session \"{}\"",
                        name.width, name.height, group.width, group.height, group.camera, group.id
                    );
                    self.skip(FileIssue::new(path, IssueKind::Consistency, detail));
                    return false;
                }
                group
            }
            None => session.push_camera(CameraGroup::new(&name)),
        };

        if group.frames.contains_key(&name.frame) {
            let detail = format!(
                "frame {} of camera \"{}\" in session \"{}\" already present",
                name.frame, name.camera, name.id
            );
            match duplicates {
                DuplicatePolicy::Reject => {
                    self.skip(FileIssue::new(path, IssueKind::Consistency, detail));
                    return false;
                }
                DuplicatePolicy::Overwrite => {
                    group.frames.insert(name.frame, record);
                    let issue = FileIssue::new(
                        path,
                        IssueKind::Consistency,
                        format!("{detail}; replaced"),
                    );
                    tracing::warn!(file = %path.display(), frame = name.frame, "duplicate frame overwritten");
                    self.warnings.push(issue);
                    self.files_merged += 1;
                    return true;
                }
            }
        }

        group.frames.insert(name.frame, record);
        tracing::debug!(
            file = %path.display(),
            session = %name.id,
            camera = %name.camera,
            frame = name.frame,
            "merged frame"
        );
        self.files_merged += 1;
        true
    }

    fn session_mut(&mut self, id: &str) -> &mut SessionBundle {
        let index = match self.session_index.get(id) {
            Some(&index) => index,
            None => {
                self.sessions.push(SessionBundle::new(id));
                let index = self.sessions.len() - 1;
                self.session_index.insert(id.to_string(), index);
                index
            }
        };
        &mut self.sessions[index]
    }

    fn skip(&mut self, issue: FileIssue) {
        tracing::debug!(file = %issue.path.display(), kind = %issue.kind, detail = %issue.detail, "skipped file");
        self.skipped.push(issue);
    }

    pub fn sessions(&self) -> &[SessionBundle] {
        &self.sessions
    }

    #[allow(dead_code)]
    pub fn skipped(&self) -> &[FileIssue] {
        &self.skipped
    }

    #[allow(dead_code)]
    pub fn warnings(&self) -> &[FileIssue] {
        &self.warnings
    }

    /// Files handed to the aggregator so far, merged or skipped.
    pub fn files_seen(&self) -> usize {
        self.files_merged + self.skipped.len()
    }
}

/// Read and parse one frame file.
fn read_frame(path: &Path) -> Result<Value, FileIssue> {
    let metadata =
        std::fs::metadata(path).map_err(|e| FileIssue::new(path, IssueKind::Io, e.to_string()))?;
    if !metadata.is_file() {
        return Err(FileIssue::new(path, IssueKind::Io, "not a regular file"));
    }

    let bytes =
        std::fs::read(path).map_err(|e| FileIssue::new(path, IssueKind::Io, e.to_string()))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| FileIssue::new(path, IssueKind::ContentParse, e.to_string()))?;

    if !(value.is_object() || value.is_array()) {
        return Err(FileIssue::new(
            path,
            IssueKind::ContentParse,
            "expected a JSON object or array",
        ));
    }
    Ok(value)
}

/// Fatal errors that stop a run.
#[derive(Debug)]
pub enum WrapError {
    /// The output directory does not exist and could not be created.
    OutputDir { path: PathBuf, source: std::io::Error },
}

impl std::fmt::Display for WrapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WrapError::OutputDir { path, source } => write!(
                f,
                "cannot create output directory {}: {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for WrapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WrapError::OutputDir { source, .. } => Some(source),
        }
    }
}

/// Outcome of a complete run.
#[derive(Debug, Default)]
pub struct AggregationReport {
    pub files_seen: usize,
    pub files_merged: usize,
    pub skipped: Vec<FileIssue>,
    pub warnings: Vec<FileIssue>,
    pub written: Vec<WrittenWrapper>,
    pub failed: Vec<WriteFailure>,
}

impl AggregationReport {
    /// Number of skipped files of the given kind.
    pub fn skipped_of(&self, kind: IssueKind) -> usize {
        self.skipped.iter().filter(|i| i.kind == kind).count()
    }

    /// Session ids whose wrapper was written, in write order.
    pub fn written_sessions(&self) -> Vec<&str> {
        self.written.iter().map(|w| w.session_id.as_str()).collect()
    }

    /// True when every session wrapper was written.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Collect `inputs` into per-session wrappers under `options.output_dir`.
///
/// Inputs are processed in the given order. Only a missing output directory
/// that cannot be created is fatal; everything else ends up in the report.
pub fn aggregate(
    inputs: &[PathBuf],
    pattern: &FilenamePattern,
    options: &WrapOptions,
) -> Result<AggregationReport, WrapError> {
    std::fs::create_dir_all(&options.output_dir).map_err(|source| WrapError::OutputDir {
        path: options.output_dir.clone(),
        source,
    })?;

    tracing::debug!(files = inputs.len(), pattern = %pattern.as_str(), "preparing to wrap frame files");

    let mut aggregator = Aggregator::new(pattern, options.duplicates);
    for path in inputs {
        aggregator.add_file(path);
    }

    let mut names = WrapperNames::new(&options.suffix);
    let mut written = Vec::new();
    let mut failed = Vec::new();
    for bundle in aggregator.sessions() {
        let file_name = names.claim(&bundle.id);
        tracing::debug!(
            session = %bundle.id,
            cameras = bundle.cameras().len(),
            frames = bundle.frame_count(),
            "writing session wrapper"
        );
        match wrapper::write_wrapper(
            &options.output_dir,
            &file_name,
            bundle,
            options.compact_keypoints,
        ) {
            Ok(wrapper) => written.push(wrapper),
            Err(failure) => {
                tracing::error!(session = %failure.session_id, error = %failure.error, "failed to write wrapper");
                failed.push(failure);
            }
        }
    }

    Ok(AggregationReport {
        files_seen: aggregator.files_seen(),
        files_merged: aggregator.files_merged,
        skipped: aggregator.skipped,
        warnings: aggregator.warnings,
        written,
        failed,
    })
}
