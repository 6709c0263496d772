//! Wrapper file output.
//!
//! A wrapper is a JSON array with one object per camera of a session. Output
//! is pretty-printed with a 2-space indent; keypoint arrays are collapsed to a
//! single line so a frame stays readable. Files are written to a temporary
//! file in the output directory and renamed into place.

use crate::aggregate::{CameraGroup, SessionBundle};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tempfile::NamedTempFile;

/// Matches `"pose_keypoints_2d": [ ... ]` style arrays of plain numbers.
static KEYPOINT_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"("\w+_keypoints_\dd": \[)([^\[\]{}"]*)(\])"#).unwrap());

/// A wrapper that was written successfully.
#[derive(Debug, Clone)]
pub struct WrittenWrapper {
    pub session_id: String,
    pub path: PathBuf,
    pub cameras: usize,
    pub frames: usize,
}

/// A wrapper that could not be written. Other sessions are unaffected.
#[derive(Debug)]
pub struct WriteFailure {
    pub session_id: String,
    pub path: PathBuf,
    pub error: std::io::Error,
}

impl std::fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed to write wrapper for session \"{}\" to {}: {}",
            self.session_id,
            self.path.display(),
            self.error
        )
    }
}

impl std::error::Error for WriteFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// File name for a session's wrapper.
///
/// Path separators, control characters and `< > : " | ? *` are replaced by
/// `_`. An id that would be empty, `.` or `..` gets a leading `_`. Distinct
/// ids can map to the same name; [`WrapperNames`] resolves that within a run.
pub fn wrapper_file_name(session_id: &str, suffix: &str) -> String {
    format!("{}{suffix}", sanitize_stem(session_id))
}

fn sanitize_stem(session_id: &str) -> String {
    let mut stem: String = session_id
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if stem.is_empty() || stem == "." || stem == ".." {
        stem.insert(0, '_');
    }
    stem
}

/// Hands out one wrapper file name per session for a single run.
///
/// The first session to claim a name gets it as is. A later session whose
/// name is already taken (compared case-insensitively, so case-folding
/// filesystems are covered too) gets `<stem>~2<suffix>`, `<stem>~3<suffix>`
/// and so on. Names depend only on the order sessions are claimed in.
pub struct WrapperNames {
    suffix: String,
    claimed: HashMap<String, String>,
}

impl WrapperNames {
    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
            claimed: HashMap::new(),
        }
    }

    pub fn claim(&mut self, session_id: &str) -> String {
        let mut name = wrapper_file_name(session_id, &self.suffix);
        let stem = sanitize_stem(session_id);
        let mut n = 2;
        while let Some(owner) = self.claimed.get(&name.to_lowercase()) {
            tracing::warn!(
                session = %session_id,
                taken_by = %owner,
                file = %name,
                "wrapper file name already used by another session"
            );
            name = format!("{stem}~{n}{}", self.suffix);
            n += 1;
        }
        self.claimed.insert(name.to_lowercase(), session_id.to_string());
        name
    }
}

/// Serialize the cameras of one session.
pub fn render(cameras: &[CameraGroup], compact_keypoints: bool) -> serde_json::Result<String> {
    let mut text = serde_json::to_string_pretty(cameras)?;
    if compact_keypoints {
        text = compact_keypoint_arrays(&text);
    }
    text.push('\n');
    Ok(text)
}

/// Put every keypoint array on one line: `[1.0, 2.0, 0.5]`.
fn compact_keypoint_arrays(pretty: &str) -> String {
    KEYPOINT_ARRAY
        .replace_all(pretty, |caps: &Captures| {
            let values: Vec<&str> = caps[2].split_whitespace().collect();
            format!("{}{}{}", &caps[1], values.join(" "), &caps[3])
        })
        .into_owned()
}

/// Render `bundle` and write it to `dir/file_name`.
pub fn write_wrapper(
    dir: &Path,
    file_name: &str,
    bundle: &SessionBundle,
    compact_keypoints: bool,
) -> Result<WrittenWrapper, WriteFailure> {
    let path = dir.join(file_name);
    let failure = |error: std::io::Error| WriteFailure {
        session_id: bundle.id.clone(),
        path: path.clone(),
        error,
    };

    let text = render(bundle.cameras(), compact_keypoints).map_err(|e| failure(e.into()))?;
    write_atomic(dir, &path, text.as_bytes()).map_err(failure)?;

    tracing::debug!(session = %bundle.id, file = %path.display(), "wrote wrapper file");

    Ok(WrittenWrapper {
        session_id: bundle.id.clone(),
        path: path.clone(),
        cameras: bundle.cameras().len(),
        frames: bundle.frame_count(),
    })
}

fn write_atomic(dir: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
