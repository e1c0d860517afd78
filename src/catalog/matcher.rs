//! Structural matching against the service's minified bundle.
//!
//! Everything that depends on the bundle's exact shape lives here, as pure
//! functions over text, so that a change upstream shows up as a failing
//! fixture test rather than as a corrupted catalog.

use once_cell::sync::Lazy;
use regex::Regex;

/// Asset paths referenced by the homepage.
static BUNDLE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"static/chunks.+?\.js").expect("bundle path pattern"));

/// Artifact of the streaming renderer that can split a path across two pushes.
static PUSH_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""\]\)</script><script>self\.__next_f\.push\(\[.,""#).expect("separator pattern")
});

/// `let X="\n\nHuman:",Y=<expression>,Z=` with single-character identifiers.
static MODEL_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"let (.)=("\\n\\nHuman:"),.=(.+?),.="#).expect("model definition pattern")
});

/// The model table expression captured from a bundle asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelExpression {
    /// The marker string literal exactly as written in the source, quotes included.
    pub marker_literal: String,
    /// Identifier the bundler bound the marker to.
    pub index_var: String,
    pub expression: String,
}

impl ModelExpression {
    /// The expression with every `[<index_var>]` replaced by the marker literal.
    pub fn resolved(&self) -> String {
        self.expression
            .replace(&format!("[{}]", self.index_var), &self.marker_literal)
    }
}

pub struct BundlePatternMatcher;

impl BundlePatternMatcher {
    /// Bundle asset paths in first-seen order, duplicates dropped.
    pub fn extract_bundle_paths(html: &str) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for found in BUNDLE_PATH.find_iter(html) {
            let path = PUSH_SEPARATOR.replace_all(found.as_str(), "").into_owned();
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }

    /// The first model definition statement in `source`, if any.
    pub fn extract_model_expression(source: &str) -> Option<ModelExpression> {
        let caps = MODEL_DEFINITION.captures(source)?;
        Some(ModelExpression {
            index_var: caps.get(1)?.as_str().to_string(),
            marker_literal: caps.get(2)?.as_str().to_string(),
            expression: caps.get(3)?.as_str().to_string(),
        })
    }
}
