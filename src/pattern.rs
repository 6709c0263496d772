//! Filename patterns: pull session id, camera, resolution and frame index out
//! of an OpenPose output path.
//!
//! A pattern is any regex with the named groups `id`, `camera`, `width`,
//! `height` and `frame`. Three presets cover the layouts produced by the
//! OpenPose CLI and the Public DGS Corpus frame extractor.

use regex::{Captures, Regex};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

/// Named groups every pattern has to define.
pub const REQUIRED_GROUPS: [&str; 5] = ["id", "camera", "width", "height", "frame"];

const FILENAME_PRESET: &str = r"^(?:.+/)*(?P<id>.+)_(?P<camera>.+)_(?P<width>\d+)x(?P<height>\d+)_(?P<frame>\d+)_keypoints\.json$";
const DIRNAME_PRESET: &str = r"^(?:.+/)*(?P<id>.+)_(?P<camera>.+)_(?P<width>\d+)x(?P<height>\d+)/.*_(?P<frame>\d+)_keypoints\.json$";
const EXTRACTED_PRESET: &str = r"^(?:.+/)*(?P<id>.+)_(?P<camera>.+)\.(?P<width>\d+)x(?P<height>\d+)\.frame_(?P<frame>\d+)\.(?:keypoints|openpose)\.json$";

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(Preset::Filename.regex()).unwrap());
static DIRNAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(Preset::Dirname.regex()).unwrap());
static EXTRACTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(Preset::Extracted.regex()).unwrap());

/// Built-in filename layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// `ID_CAMERA_WIDTHxHEIGHT_FRAME_keypoints.json`
    #[default]
    Filename,
    /// `ID_CAMERA_WIDTHxHEIGHT/VIDEONAME_FRAME_keypoints.json`
    Dirname,
    /// `ID_CAMERA.WIDTHxHEIGHT.frame_FRAME.openpose.json` (frame extractor output)
    Extracted,
}

impl Preset {
    pub fn name(self) -> &'static str {
        match self {
            Preset::Filename => "filename",
            Preset::Dirname => "dirname",
            Preset::Extracted => "extracted",
        }
    }

    /// The regex source text for this preset.
    pub fn regex(self) -> &'static str {
        match self {
            Preset::Filename => FILENAME_PRESET,
            Preset::Dirname => DIRNAME_PRESET,
            Preset::Extracted => EXTRACTED_PRESET,
        }
    }

    fn compiled(self) -> &'static Regex {
        match self {
            Preset::Filename => &FILENAME_RE,
            Preset::Dirname => &DIRNAME_RE,
            Preset::Extracted => &EXTRACTED_RE,
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Metadata extracted from one input path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub id: String,
    pub camera: String,
    pub width: u32,
    pub height: u32,
    pub frame: u64,
}

/// Why a path could not be turned into a [`ParsedName`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameParseError {
    /// The pattern did not match the path at all.
    NoMatch,
    /// The path is not valid UTF-8, so no field can be taken from it verbatim.
    NonUtf8Path,
    /// The pattern matched, but a group was missing or not a valid integer.
    Malformed { group: &'static str, value: String },
}

impl std::fmt::Display for NameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameParseError::NoMatch => write!(f, "path does not match the filename pattern"),
            NameParseError::NonUtf8Path => write!(f, "path is not valid UTF-8"),
            NameParseError::Malformed { group, value } if value.is_empty() => {
                write!(f, "group \"{group}\" did not capture anything")
            }
            NameParseError::Malformed { group, value } => {
                write!(f, "group \"{group}\" is not a non-negative integer: \"{value}\"")
            }
        }
    }
}

impl std::error::Error for NameParseError {}

/// Errors raised while building a pattern. These abort the run before any
/// file is touched.
#[derive(Debug)]
pub enum PatternError {
    InvalidRegex(regex::Error),
    MissingGroups(Vec<&'static str>),
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternError::InvalidRegex(e) => write!(f, "invalid filename regex: {e}"),
            PatternError::MissingGroups(groups) => write!(
                f,
                "filename regex is missing required named groups: {}",
                groups.join(", ")
            ),
        }
    }
}

impl std::error::Error for PatternError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PatternError::InvalidRegex(e) => Some(e),
            PatternError::MissingGroups(_) => None,
        }
    }
}

impl From<regex::Error> for PatternError {
    fn from(e: regex::Error) -> Self {
        PatternError::InvalidRegex(e)
    }
}

/// A compiled filename pattern.
#[derive(Debug, Clone)]
pub struct FilenamePattern {
    regex: Regex,
    preset: Option<Preset>,
}

impl FilenamePattern {
    pub fn from_preset(preset: Preset) -> Self {
        Self {
            regex: preset.compiled().clone(),
            preset: Some(preset),
        }
    }

    /// Compile a user supplied regex and check that it defines all five
    /// required named groups.
    pub fn custom(source: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(source)?;
        let names: Vec<&str> = regex.capture_names().flatten().collect();
        let missing: Vec<&'static str> = REQUIRED_GROUPS
            .iter()
            .copied()
            .filter(|group| !names.contains(group))
            .collect();
        if !missing.is_empty() {
            return Err(PatternError::MissingGroups(missing));
        }
        Ok(Self {
            regex,
            preset: None,
        })
    }

    /// The preset this pattern was built from, if any.
    pub fn preset(&self) -> Option<Preset> {
        self.preset
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Match the full path (not only the basename, so directory-encoded
    /// layouts work) and extract the five fields.
    pub fn parse(&self, path: &Path) -> Result<ParsedName, NameParseError> {
        let text = path_text(path).ok_or(NameParseError::NonUtf8Path)?;
        let caps = self
            .regex
            .captures(&text)
            .ok_or(NameParseError::NoMatch)?;

        Ok(ParsedName {
            id: capture(&caps, "id")?.to_string(),
            camera: capture(&caps, "camera")?.to_string(),
            width: parse_number("width", capture(&caps, "width")?)?,
            height: parse_number("height", capture(&caps, "height")?)?,
            frame: parse_number("frame", capture(&caps, "frame")?)?,
        })
    }
}

fn capture<'t>(caps: &Captures<'t>, group: &'static str) -> Result<&'t str, NameParseError> {
    caps.name(group)
        .map(|m| m.as_str())
        .ok_or(NameParseError::Malformed {
            group,
            value: String::new(),
        })
}

fn parse_number<T: FromStr>(group: &'static str, value: &str) -> Result<T, NameParseError> {
    value.parse().map_err(|_| NameParseError::Malformed {
        group,
        value: value.to_string(),
    })
}

fn path_text(path: &Path) -> Option<String> {
    let text = path.to_str()?;
    if cfg!(windows) {
        Some(text.replace('\\', "/"))
    } else {
        Some(text.to_string())
    }
}
