use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::models::{Document, DocumentMetadata};
use crate::IngestError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Reads every matching file under a directory into page-level documents.
#[derive(Clone)]
pub struct DirectoryLoader {
    required_exts: Vec<String>,
    recursive: bool,
    extractor: Arc<dyn PdfExtractor>,
}

impl Default for DirectoryLoader {
    fn default() -> Self {
        Self::pdf()
    }
}

impl DirectoryLoader {
    pub fn new(required_exts: &[&str], recursive: bool, extractor: Arc<dyn PdfExtractor>) -> Self {
        Self {
            required_exts: required_exts
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            recursive,
            extractor,
        }
    }

    pub fn pdf() -> Self {
        Self::new(&[".pdf"], true, Arc::new(LopdfExtractor))
    }

    pub fn discover_files(&self, folder: &Path) -> Vec<PathBuf> {
        let walker = if self.recursive {
            WalkDir::new(folder)
        } else {
            WalkDir::new(folder).max_depth(1)
        };

        let mut files = Vec::new();
        for entry in walker.into_iter().filter_map(|item| item.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }

            let matches = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    self.required_exts
                        .iter()
                        .any(|required| ext.eq_ignore_ascii_case(required))
                });

            if matches {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort_unstable();
        files
    }

    pub fn load_data(&self, folder: &Path) -> Result<Vec<Document>, IngestError> {
        let mut documents = Vec::new();

        for path in self.discover_files(folder) {
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string();
            let file_path = path.to_string_lossy().to_string();

            for page in self.extractor.extract_pages(&path)? {
                let page_label = page.number.to_string();
                documents.push(Document {
                    doc_id: document_id(&file_path, &page_label),
                    text: page.text,
                    metadata: DocumentMetadata {
                        file_name: file_name.clone(),
                        file_path: file_path.clone(),
                        page_label,
                    },
                });
            }
        }

        if documents.is_empty() {
            return Err(IngestError::NoDocuments(folder.to_path_buf()));
        }

        tracing::debug!(folder = %folder.display(), documents = documents.len(), "loaded documents");
        Ok(documents)
    }
}

fn document_id(file_path: &str, page_label: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b"#");
    hasher.update(page_label.as_bytes());
    format!("{:x}", hasher.finalize())
}
