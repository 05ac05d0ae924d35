//! Persistent template list
//!
//! Templates live in a markdown document: `## Category` headings followed
//! by `- **Name**: Up, Down, Left` entries. Anything else is ignored, so
//! the file can carry free-form notes.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::template::{format_directions, parse_directions, StratagemTemplate, TemplateError};

/// Category used for entries that appear before any heading
pub const DEFAULT_CATEGORY: &str = "Stratagems";

/// Ordered set of templates with unique names
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: Vec<Arc<StratagemTemplate>>,
}

impl TemplateStore {
    #[cfg(test)]
    pub fn new(templates: impl IntoIterator<Item = StratagemTemplate>) -> Self {
        let mut store = Self::default();
        for template in templates {
            store.insert_new(template);
        }
        store
    }

    /// Parse the markdown format, skipping lines that do not describe a template
    pub fn parse(text: &str) -> Self {
        let mut store = Self::default();
        let mut category = DEFAULT_CATEGORY.to_string();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.starts_with("##") {
                category = line.trim_start_matches('#').trim().to_string();
                continue;
            }
            let Some(entry) = line.strip_prefix("- **") else {
                continue;
            };
            let Some((name, sequence)) = entry.split_once("**:") else {
                continue;
            };

            let parsed = parse_directions(sequence)
                .and_then(|dirs| StratagemTemplate::new(name, category.as_str(), dirs));
            match parsed {
                Ok(template) => store.insert_new(template),
                Err(e) => debug!(line = line_no + 1, %e, "skipping template line"),
            }
        }

        store
    }

    /// Load from disk; a missing file yields an empty store
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let store = Self::parse(&text);
                info!(?path, count = store.len(), "templates loaded");
                Ok(store)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(?path, "template file not found, starting with no templates");
                Ok(Self::default())
            }
            Err(source) => Err(TemplateError::Io {
                path: path.to_owned(),
                source,
            }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), TemplateError> {
        let io_err = |source| TemplateError::Io {
            path: path.to_owned(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_markdown()).map_err(io_err)?;
        info!(?path, count = self.len(), "templates saved");
        Ok(())
    }

    /// Render grouped by category in order of first appearance
    pub fn to_markdown(&self) -> String {
        let mut categories: Vec<&str> = Vec::new();
        for template in &self.templates {
            if !categories.contains(&template.category.as_str()) {
                categories.push(&template.category);
            }
        }

        let mut out = String::from("# Stratagem Codes\n");
        for category in categories {
            out.push_str(&format!("\n## {}\n\n", category));
            for template in self.templates.iter().filter(|t| t.category == category) {
                out.push_str(&format!(
                    "- **{}**: {}\n",
                    template.name,
                    format_directions(&template.directions)
                ));
            }
        }
        out
    }

    pub fn get(&self, name: &str) -> Option<Arc<StratagemTemplate>> {
        self.templates.iter().find(|t| t.name == name).cloned()
    }

    /// Insert or replace by name, keeping the original position on replace
    pub fn upsert(&mut self, template: StratagemTemplate) -> Arc<StratagemTemplate> {
        let template = Arc::new(template);
        match self.templates.iter_mut().find(|t| t.name == template.name) {
            Some(existing) => *existing = Arc::clone(&template),
            None => self.templates.push(Arc::clone(&template)),
        }
        template
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<StratagemTemplate>> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn insert_new(&mut self, template: StratagemTemplate) {
        if self.get(&template.name).is_some() {
            warn!(name = %template.name, "duplicate template name ignored");
            return;
        }
        self.templates.push(Arc::new(template));
    }
}

#[cfg(test)]
mod tests {
    use super::super::template::Direction;
    use super::*;

    const SAMPLE: &str = "\
# Helldivers 2 stratagem codes

- **Reinforce**: Up, Down, Right, Left, Up

## Orbital Cannons

- **Orbital Laser**: Right, Down, Up, Right, Down
- **Orbital Gatling Barrage**: right, down, left, up, up
- **Broken**: Up, Sideways
- **Orbital Laser**: Up

Some free text in between.

## Eagle

- **Eagle Airstrike**: Up, Right, Down, Right
";

    #[test]
    fn test_parse_categories_and_sequences() {
        let store = TemplateStore::parse(SAMPLE);
        assert_eq!(store.len(), 4);

        let reinforce = store.get("Reinforce").unwrap();
        assert_eq!(reinforce.category, DEFAULT_CATEGORY);
        assert_eq!(reinforce.directions.len(), 5);

        let laser = store.get("Orbital Laser").unwrap();
        assert_eq!(laser.category, "Orbital Cannons");
        assert_eq!(laser.directions[0], Direction::Right);

        assert_eq!(store.get("Eagle Airstrike").unwrap().category, "Eagle");
        assert!(store.get("Broken").is_none());
    }

    #[test]
    fn test_markdown_survives_reparse() {
        let store = TemplateStore::parse(SAMPLE);
        let reparsed = TemplateStore::parse(&store.to_markdown());
        let names: Vec<_> = reparsed.iter().map(|t| t.name.clone()).collect();
        let original: Vec<_> = store.iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, original);
        assert_eq!(
            reparsed.get("Orbital Gatling Barrage").unwrap().directions,
            store.get("Orbital Gatling Barrage").unwrap().directions
        );
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut store = TemplateStore::parse(SAMPLE);
        let updated =
            StratagemTemplate::new("Reinforce", "Mission", vec![Direction::Down]).unwrap();
        store.upsert(updated);
        assert_eq!(store.len(), 4);
        assert_eq!(store.iter().next().unwrap().category, "Mission");
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::load(&dir.path().join("nope.md")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stratagems.md");
        TemplateStore::parse(SAMPLE).save(&path).unwrap();
        let loaded = TemplateStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 4);
    }
}
