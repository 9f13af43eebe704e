//! Documentation loading from local files, directories and URLs.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::core::docs::DocumentationSet;
use crate::error::FetchError;

/// File extensions picked up when walking a directory (compared lower-cased).
pub const DOC_EXTENSIONS: &[&str] = &["md", "txt", "rst", "adoc", "markdown"];

pub const DEFAULT_URL_TIMEOUT: Duration = Duration::from_secs(30);

/// Abstraction over documentation acquisition.
pub trait SourceLoader {
    fn fetch(&self, sources: &[String]) -> Result<DocumentationSet, FetchError>;
}

/// Loads documentation from the local filesystem and over HTTP.
pub struct DocumentationFetcher {
    client: Client,
}

impl DocumentationFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client for documentation fetch")?;
        Ok(Self { client })
    }

    fn fetch_source(&self, source: &str, docs: &mut DocumentationSet) -> Result<(), FetchError> {
        if is_url(source) {
            let text = self.fetch_url(source)?;
            docs.insert(source.to_string(), text);
            return Ok(());
        }

        let path = Path::new(source);
        if !path.exists() {
            return Err(FetchError::NotFound(path.to_path_buf()));
        }
        if path.is_file() {
            let text = read_document(path)?;
            docs.insert(source.to_string(), text);
            Ok(())
        } else if path.is_dir() {
            read_directory(path, docs)
        } else {
            Err(FetchError::InvalidPathType(path.to_path_buf()))
        }
    }

    fn fetch_url(&self, url: &str) -> Result<String, FetchError> {
        let http_err = |e: reqwest::Error| FetchError::Http {
            url: url.to_string(),
            message: e.to_string(),
        };
        debug!(url, "fetching documentation url");
        let response = self
            .client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(http_err)?;
        response.text().map_err(http_err)
    }
}

impl SourceLoader for DocumentationFetcher {
    #[instrument(skip_all, fields(sources = sources.len()))]
    fn fetch(&self, sources: &[String]) -> Result<DocumentationSet, FetchError> {
        if sources.is_empty() {
            return Err(FetchError::NoSources);
        }
        let mut docs = DocumentationSet::new();
        for source in sources {
            let before = docs.len();
            self.fetch_source(source, &mut docs)?;
            info!(source = %source, added = docs.len() - before, "fetched source");
        }
        Ok(docs)
    }
}

/// A source is a URL when it has both a scheme and a host.
pub fn is_url(source: &str) -> bool {
    reqwest::Url::parse(source).is_ok_and(|url| url.host_str().is_some_and(|h| !h.is_empty()))
}

fn read_document(path: &Path) -> Result<String, FetchError> {
    fs::read_to_string(path).map_err(|source| FetchError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

fn has_doc_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DOC_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn read_directory(dir: &Path, docs: &mut DocumentationSet) -> Result<(), FetchError> {
    let mut found = 0usize;
    let walker = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(err = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !has_doc_extension(path) {
            continue;
        }
        match read_document(path) {
            Ok(text) => {
                docs.insert(path.display().to_string(), text);
                found += 1;
            }
            Err(e) => warn!(err = %e, "skipping documentation file"),
        }
    }

    if found == 0 {
        return Err(FetchError::NoDocumentsFound(dir.to_path_buf()));
    }
    debug!(dir = %dir.display(), found, "read documentation directory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fetcher() -> DocumentationFetcher {
        DocumentationFetcher::new(DEFAULT_URL_TIMEOUT).expect("fetcher")
    }

    fn sources(items: &[String]) -> Vec<String> {
        items.to_vec()
    }

    #[test]
    fn detects_urls() {
        assert!(is_url("https://example.com/docs"));
        assert!(is_url("http://localhost:8080/readme"));
        assert!(!is_url("docs/README.md"));
        assert!(!is_url("/abs/README.md"));
        assert!(!is_url("file:///tmp/readme.md"));
        assert!(!is_url("C:\\docs\\readme.md"));
    }

    #[test]
    fn reads_single_file() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("README.md");
        fs::write(&file, "# Hello").expect("write");
        let id = file.display().to_string();

        let docs = fetcher().fetch(&sources(&[id.clone()])).expect("fetch");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs.get(&id), Some("# Hello"));
    }

    #[test]
    fn walks_directory_sorted_with_allowlist() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("nested")).expect("mkdir");
        fs::write(dir.path().join("b.md"), "b").expect("write");
        fs::write(dir.path().join("a.TXT"), "a").expect("write");
        fs::write(dir.path().join("nested/c.rst"), "c").expect("write");
        fs::write(dir.path().join("script.py"), "print(1)").expect("write");

        let docs = fetcher()
            .fetch(&sources(&[dir.path().display().to_string()]))
            .expect("fetch");

        let names: Vec<String> = docs
            .identifiers()
            .iter()
            .map(|id| {
                Path::new(id)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["a.TXT", "b.md", "c.rst"]);
    }

    #[test]
    fn skips_unreadable_files_in_directory() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("good.md"), "fine").expect("write");
        fs::write(dir.path().join("bad.md"), [0xff, 0xfe, 0x00]).expect("write");

        let docs = fetcher()
            .fetch(&sources(&[dir.path().display().to_string()]))
            .expect("fetch");
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn empty_directory_is_no_documents_found() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("main.rs"), "fn main() {}").expect("write");

        let err = fetcher()
            .fetch(&sources(&[dir.path().display().to_string()]))
            .unwrap_err();
        assert!(matches!(err, FetchError::NoDocumentsFound(_)));
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("nope.md").display().to_string();

        let err = fetcher().fetch(&sources(&[missing])).unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
        assert!(err.to_string().starts_with("Path does not exist"));
    }

    #[test]
    fn no_sources_is_an_error() {
        let err = fetcher().fetch(&[]).unwrap_err();
        assert!(matches!(err, FetchError::NoSources));
    }

    #[test]
    fn repeated_source_keeps_first_position() {
        let dir = tempdir().expect("tempdir");
        let a = dir.path().join("a.md");
        let b = dir.path().join("b.md");
        fs::write(&a, "A").expect("write");
        fs::write(&b, "B").expect("write");
        let a = a.display().to_string();
        let b = b.display().to_string();

        let docs = fetcher()
            .fetch(&sources(&[a.clone(), b.clone(), a.clone()]))
            .expect("fetch");
        assert_eq!(docs.identifiers(), vec![a.as_str(), b.as_str()]);
    }
}
