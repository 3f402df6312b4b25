//! HTML metadata extraction
//!
//! This module derives two fields from a fetched page:
//! - a display name (social title, then `<title>`, then first `<h1>`)
//! - a coarse industry category from keyword heuristics over the visible text
//!
//! The classification is a heuristic. It is deterministic for identical
//! input and makes no claim of accuracy.

use scraper::{Html, Selector};

/// Coarse industry category inferred from page text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Industry {
    Technology,
    Retail,
    Finance,
    Healthcare,
    Education,
    #[default]
    Other,
}

impl Industry {
    /// Converts the industry to the label stored in the sink
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technology => "Technology",
            Self::Retail => "Retail",
            Self::Finance => "Finance",
            Self::Healthcare => "Healthcare",
            Self::Education => "Education",
            Self::Other => "Other",
        }
    }

    /// Parses a stored label; returns None for unknown labels
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "Technology" => Some(Self::Technology),
            "Retail" => Some(Self::Retail),
            "Finance" => Some(Self::Finance),
            "Healthcare" => Some(Self::Healthcare),
            "Education" => Some(Self::Education),
            "Other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Returns all industries, classification order first, `Other` last
    pub fn all() -> [Self; 6] {
        [
            Self::Technology,
            Self::Retail,
            Self::Finance,
            Self::Healthcare,
            Self::Education,
            Self::Other,
        ]
    }
}

impl std::fmt::Display for Industry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword sets in priority order; the first category with a hit wins
pub const INDUSTRY_KEYWORDS: &[(Industry, &[&str])] = &[
    (
        Industry::Technology,
        &["software", "tech", "cloud", "ai", "digital", "computing"],
    ),
    (
        Industry::Retail,
        &["shop", "store", "buy", "cart", "retail", "purchase"],
    ),
    (
        Industry::Finance,
        &["bank", "loan", "finance", "insurance", "invest", "wealth"],
    ),
    (
        Industry::Healthcare,
        &["health", "medical", "doctor", "hospital", "clinic"],
    ),
    (
        Industry::Education,
        &["education", "school", "university", "college", "learning"],
    ),
];

/// Elements whose text never renders
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Fields extracted from an HTML document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFields {
    /// Display name; `None` when no name signal is present
    pub name: Option<String>,

    /// Inferred industry; `Other` when no keyword matched
    pub industry: Industry,
}

/// Extracts a display name and industry from an HTML document
///
/// A page with no usable signal is not an error: it yields `name: None`
/// and `Industry::Other`.
///
/// # Example
///
/// ```
/// use cc_enrich::crawler::{extract_metadata, Industry};
///
/// let html = r#"<html><head><title>Acme Cloud</title></head>
///               <body>We offer cloud software solutions</body></html>"#;
/// let fields = extract_metadata(html);
/// assert_eq!(fields.name.as_deref(), Some("Acme Cloud"));
/// assert_eq!(fields.industry, Industry::Technology);
/// ```
pub fn extract_metadata(html: &str) -> ExtractedFields {
    let document = Html::parse_document(html);

    ExtractedFields {
        name: extract_name(&document),
        industry: classify_industry(&visible_text(&document)),
    }
}

/// Resolves the display name; the first non-empty source wins
fn extract_name(document: &Html) -> Option<String> {
    extract_social_title(document)
        .or_else(|| extract_title(document))
        .or_else(|| extract_first_heading(document))
}

/// Content of `<meta property="og:title">`
fn extract_social_title(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"meta[property="og:title"]"#).ok()?;

    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_first_heading(document: &Html) -> Option<String> {
    let selector = Selector::parse("h1").ok()?;

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Concatenates every text node that is not inside a hidden element
fn visible_text(document: &Html) -> String {
    let mut text = String::new();

    for node in document.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };

        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .map(|element| HIDDEN_ELEMENTS.contains(&element.name()))
            .unwrap_or(false);

        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }

    text
}

/// Classifies text by the first keyword set with a hit
///
/// Matching is case-insensitive substring containment, so short keywords
/// such as "ai" also hit inside longer words.
pub fn classify_industry(text: &str) -> Industry {
    let text = text.to_lowercase();

    INDUSTRY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| text.contains(kw)))
        .map(|(industry, _)| *industry)
        .unwrap_or_default()
}
