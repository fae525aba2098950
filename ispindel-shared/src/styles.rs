/// BJCP beer style catalog
///
/// Styles come from a beerjson export of the BJCP guidelines:
///
/// ```json
/// { "beerjson": { "styles": [
///     { "name": "American Light Lager", "category": "Standard American Beer", "style_id": "1A" }
/// ] } }
/// ```
///
/// The catalog is loaded once at startup and shared read-only.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Style id of the catch-all entry that is always listed first
pub const CUSTOM_STYLE_ID: &str = "OWN";

/// Errors raised while loading the catalog
#[derive(Debug, thiserror::Error)]
pub enum StyleError {
    #[error("failed to read beer style file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid beer style JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One selectable style
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeerStyle {
    /// Display label, `"[category] name [style_id]"`
    pub label: String,
    pub category: String,
    pub style_id: String,
}

#[derive(Deserialize)]
struct BeerJsonFile {
    beerjson: BeerJsonBody,
}

#[derive(Deserialize)]
struct BeerJsonBody {
    styles: Vec<RawStyle>,
}

#[derive(Deserialize)]
struct RawStyle {
    name: Option<String>,
    category: Option<String>,
    style_id: Option<String>,
}

/// Ordered list of styles, custom entry first
#[derive(Debug, Clone, Serialize)]
pub struct StyleCatalog {
    styles: Vec<BeerStyle>,
}

impl StyleCatalog {
    /// Catalog holding only the custom entry
    pub fn custom_only() -> Self {
        Self {
            styles: vec![custom_style()],
        }
    }

    /// Parses a beerjson document
    ///
    /// Entries missing `name`, `category` or `style_id` are skipped.
    pub fn from_json(json: &str) -> Result<Self, StyleError> {
        let file: BeerJsonFile = serde_json::from_str(json)?;

        let mut styles = vec![custom_style()];
        styles.extend(file.beerjson.styles.into_iter().filter_map(|raw| {
            let (name, category, style_id) = (raw.name?, raw.category?, raw.style_id?);
            Some(BeerStyle {
                label: format!("[{}] {} [{}]", category, strip_category(&name, &category), style_id),
                category,
                style_id,
            })
        }));

        Ok(Self { styles })
    }

    /// Reads and parses the catalog file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StyleError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| StyleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn find(&self, style_id: &str) -> Option<&BeerStyle> {
        self.styles.iter().find(|s| s.style_id == style_id)
    }

    pub fn styles(&self) -> &[BeerStyle] {
        &self.styles
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

fn custom_style() -> BeerStyle {
    BeerStyle {
        label: "Custom style".to_string(),
        category: String::new(),
        style_id: CUSTOM_STYLE_ID.to_string(),
    }
}

/// Some BJCP names repeat their category ("Specialty IPA Belgian IPA")
fn strip_category<'a>(name: &'a str, category: &str) -> &'a str {
    if category.is_empty() {
        return name;
    }
    match name.strip_prefix(category).and_then(|rest| rest.strip_prefix(' ')) {
        Some(rest) if !rest.is_empty() => rest,
        _ => name,
    }
}
