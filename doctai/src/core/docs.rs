//! Loaded documentation and its prompt rendering.

/// Ordered mapping from source identifier (path or URL) to raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentationSet {
    entries: Vec<(String, String)>,
}

impl DocumentationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a document. An identifier seen before keeps its position and
    /// takes the new text.
    pub fn insert(&mut self, identifier: String, text: String) {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| *existing == identifier)
        {
            slot.1 = text;
        } else {
            self.entries.push((identifier, text));
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == identifier)
            .map(|(_, text)| text.as_str())
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(id, text)| (id.as_str(), text.as_str()))
    }
}

const SEPARATOR_WIDTH: usize = 80;

/// Render every document under a labeled header, separated by a rule line.
pub fn format_documentation(docs: &DocumentationSet) -> String {
    let rule = "=".repeat(SEPARATOR_WIDTH);
    docs.iter()
        .map(|(source, content)| {
            format!("=== Documentation from: {source} ===\n{content}\n{rule}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_overwrites_in_place() {
        let mut docs = DocumentationSet::new();
        docs.insert("a.md".to_string(), "one".to_string());
        docs.insert("b.md".to_string(), "two".to_string());
        docs.insert("a.md".to_string(), "three".to_string());

        assert_eq!(docs.identifiers(), vec!["a.md", "b.md"]);
        assert_eq!(docs.get("a.md"), Some("three"));
    }

    #[test]
    fn formats_each_source_with_header() {
        let mut docs = DocumentationSet::new();
        docs.insert("README.md".to_string(), "Install with make.".to_string());
        docs.insert("https://x.dev/guide".to_string(), "Run it.".to_string());

        let rendered = format_documentation(&docs);
        let rule = "=".repeat(80);
        assert_eq!(
            rendered,
            format!(
                "=== Documentation from: README.md ===\nInstall with make.\n{rule}\n\n=== Documentation from: https://x.dev/guide ===\nRun it.\n{rule}"
            )
        );
    }
}
