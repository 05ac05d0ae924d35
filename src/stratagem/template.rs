//! Stratagem templates and their direction sequences

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One step of a stratagem input sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "Up"),
            Direction::Down => write!(f, "Down"),
            Direction::Left => write!(f, "Left"),
            Direction::Right => write!(f, "Right"),
        }
    }
}

impl FromStr for Direction {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            _ => Err(TemplateError::UnknownDirection(s.trim().to_string())),
        }
    }
}

/// Parse a comma separated sequence such as `"Up, down,LEFT"`
pub fn parse_directions(raw: &str) -> Result<Vec<Direction>, TemplateError> {
    let directions = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<_>, _>>()?;

    if directions.is_empty() {
        return Err(TemplateError::EmptySequence);
    }
    Ok(directions)
}

/// Render a sequence the way it is stored: `"Up, Down, Left"`
pub fn format_directions(directions: &[Direction]) -> String {
    directions
        .iter()
        .map(Direction::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A named direction sequence a slot can bind to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratagemTemplate {
    pub name: String,
    pub category: String,
    pub directions: Vec<Direction>,
}

impl StratagemTemplate {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        directions: Vec<Direction>,
    ) -> Result<Self, TemplateError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(TemplateError::EmptyName);
        }
        // must survive a round trip through a `- **Name**: ...` line
        if name.contains(['\n', '\r']) || name.contains("**") {
            return Err(TemplateError::InvalidName(name));
        }
        let category = category.into().trim().to_string();
        if category.contains(['\n', '\r']) {
            return Err(TemplateError::InvalidCategory(category));
        }
        if directions.is_empty() {
            return Err(TemplateError::EmptySequence);
        }
        Ok(Self {
            name,
            category,
            directions,
        })
    }
}

/// Errors raised while building, loading or saving templates
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown direction '{0}' (expected Up, Down, Left or Right)")]
    UnknownDirection(String),

    #[error("a stratagem needs at least one direction")]
    EmptySequence,

    #[error("a stratagem needs a name")]
    EmptyName,

    #[error("stratagem name {0:?} may not contain line breaks or '**'")]
    InvalidName(String),

    #[error("category {0:?} may not contain line breaks")]
    InvalidCategory(String),

    #[error("template store I/O failed at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
