//! Class taxonomy: canonical names, display names, draw colours, and the subset
//! of classes eligible for tracking. Fixed once the model is loaded.

use std::{collections::HashSet, fs, path::Path};

use serde::Deserialize;
use thiserror::Error;

/// Fallback colour for class ids outside the taxonomy.
pub const UNKNOWN_CLASS_COLOR: [u8; 3] = [255, 255, 255];

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("failed to read taxonomy file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed taxonomy file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid colour {value:?} for class {class:?}; expected #RRGGBB")]
    Color { class: String, value: String },
    #[error("trackable class {0:?} is not part of the taxonomy")]
    UnknownTrackable(String),
    #[error("taxonomy must contain at least one class")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub display_name: String,
    pub color: [u8; 3],
}

/// Class names eligible for tracking; everything else is detected and drawn
/// but never assigned an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackableClasses(HashSet<String>);

impl TrackableClasses {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTaxonomy {
    classes: Vec<ClassInfo>,
    trackable: TrackableClasses,
}

impl Default for ClassTaxonomy {
    /// Four-class surveillance taxonomy the bundled model was trained on.
    fn default() -> Self {
        let classes = vec![
            class("oddiy_harakat", "Oddiy Harakat", [0x00, 0xFF, 0x00]),
            class("shubhali_harakat", "Shubhali Harakat", [0xFF, 0xA5, 0x00]),
            class("jabrlangan_shaxs", "Jabrlangan Shaxs", [0xFF, 0x00, 0x00]),
            class("qurol_aslahasi", "Qurol-Aslaha", [0x8A, 0x2B, 0xE2]),
        ];
        let trackable =
            TrackableClasses::new(["oddiy_harakat", "shubhali_harakat", "jabrlangan_shaxs"]);
        Self { classes, trackable }
    }
}

fn class(name: &str, display_name: &str, color: [u8; 3]) -> ClassInfo {
    ClassInfo {
        name: name.to_string(),
        display_name: display_name.to_string(),
        color,
    }
}

#[derive(Deserialize)]
struct TaxonomyFile {
    classes: Vec<ClassEntry>,
    #[serde(default)]
    trackable: Vec<String>,
}

#[derive(Deserialize)]
struct ClassEntry {
    name: String,
    display_name: Option<String>,
    color: Option<String>,
}

impl ClassTaxonomy {
    pub fn new(classes: Vec<ClassInfo>, trackable: TrackableClasses) -> Result<Self, TaxonomyError> {
        if classes.is_empty() {
            return Err(TaxonomyError::Empty);
        }
        for name in &trackable.0 {
            if !classes.iter().any(|class| &class.name == name) {
                return Err(TaxonomyError::UnknownTrackable(name.clone()));
            }
        }
        Ok(Self { classes, trackable })
    }

    /// Load a taxonomy from JSON:
    /// `{"classes": [{"name", "display_name"?, "color"?: "#RRGGBB"}], "trackable": [..]}`.
    pub fn from_json_str(json: &str) -> Result<Self, TaxonomyError> {
        let file: TaxonomyFile = serde_json::from_str(json)?;
        let mut classes = Vec::with_capacity(file.classes.len());
        for entry in file.classes {
            let color = match entry.color {
                Some(value) => parse_hex_color(&value).ok_or_else(|| TaxonomyError::Color {
                    class: entry.name.clone(),
                    value,
                })?,
                None => UNKNOWN_CLASS_COLOR,
            };
            let display_name = entry.display_name.unwrap_or_else(|| entry.name.clone());
            classes.push(ClassInfo {
                name: entry.name,
                display_name,
                color,
            });
        }
        Self::new(classes, TrackableClasses::new(file.trackable))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TaxonomyError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn classes(&self) -> &[ClassInfo] {
        &self.classes
    }

    pub fn trackable(&self) -> &TrackableClasses {
        &self.trackable
    }

    pub fn get(&self, class_id: usize) -> Option<&ClassInfo> {
        self.classes.get(class_id)
    }

    /// Canonical name, or `class<N>` for ids outside the taxonomy.
    pub fn name(&self, class_id: usize) -> String {
        self.get(class_id)
            .map(|class| class.name.clone())
            .unwrap_or_else(|| format!("class{class_id}"))
    }

    pub fn display_name(&self, class_id: usize) -> String {
        self.get(class_id)
            .map(|class| class.display_name.clone())
            .unwrap_or_else(|| format!("class{class_id}"))
    }

    pub fn color(&self, class_id: usize) -> [u8; 3] {
        self.get(class_id)
            .map(|class| class.color)
            .unwrap_or(UNKNOWN_CLASS_COLOR)
    }

    pub fn is_trackable(&self, class_id: usize) -> bool {
        self.get(class_id)
            .map(|class| self.trackable.contains(&class.name))
            .unwrap_or(false)
    }
}

fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}
