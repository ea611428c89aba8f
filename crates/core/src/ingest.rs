use crate::engine::EngineBuilder;
use crate::loader::DirectoryLoader;
use crate::models::{FileKey, UploadedFile};
use crate::session::SessionState;
use crate::IngestError;
use serde::Serialize;
use std::path::Path;
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingFile,
    MissingCredential,
    UnsupportedFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Skipped(SkipReason),
    Ready { key: FileKey, cached: bool },
}

/// Client-supplied names are reduced to their last path component.
fn stored_file_name(file_name: &str) -> Option<&str> {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}

/// Parses an upload and builds its query engine unless this session already has one for the name.
///
/// Without a file or credential nothing happens. The upload is written into a temporary
/// directory that is removed when this call returns, whatever the outcome.
pub async fn ingest_upload(
    state: &mut SessionState,
    upload: Option<UploadedFile>,
    credential: &str,
    loader: &DirectoryLoader,
    builder: &dyn EngineBuilder,
) -> Result<IngestOutcome, IngestError> {
    let Some(upload) = upload else {
        return Ok(IngestOutcome::Skipped(SkipReason::MissingFile));
    };
    if credential.trim().is_empty() {
        return Ok(IngestOutcome::Skipped(SkipReason::MissingCredential));
    }
    let Some(file_name) = stored_file_name(&upload.file_name).map(str::to_string) else {
        return Ok(IngestOutcome::Skipped(SkipReason::UnsupportedFormat));
    };
    if !upload.is_pdf() {
        return Ok(IngestOutcome::Skipped(SkipReason::UnsupportedFormat));
    }

    let temp_dir = TempDir::new()?;
    let file_path = temp_dir.path().join(&file_name);
    tokio::fs::write(&file_path, &upload.bytes).await?;
    state.uploaded_file = Some(upload);

    let key = FileKey::new(state.id(), file_name);
    tracing::info!(file_key = %key, "indexing document");

    if state.is_cached(&key) {
        tracing::debug!(file_key = %key, "reusing cached query engine");
        state.active_file = Some(key.clone());
        return Ok(IngestOutcome::Ready { key, cached: true });
    }

    index_upload(state, key, &file_path, credential, loader, builder).await
}

/// Builds and caches the engine for a written upload.
/// The session is only touched once the build succeeds.
async fn index_upload(
    state: &mut SessionState,
    key: FileKey,
    file_path: &Path,
    credential: &str,
    loader: &DirectoryLoader,
    builder: &dyn EngineBuilder,
) -> Result<IngestOutcome, IngestError> {
    ensure_persisted(file_path)?;
    let upload_dir = file_path.parent().unwrap_or(file_path);
    let documents = load_documents(loader, upload_dir).await?;
    let engine = builder.build(documents, credential.trim()).await?;

    state.file_cache.insert(key.clone(), engine);
    state.active_file = Some(key.clone());
    Ok(IngestOutcome::Ready { key, cached: false })
}

fn ensure_persisted(path: &Path) -> Result<(), IngestError> {
    if path.exists() {
        Ok(())
    } else {
        Err(IngestError::MissingUpload(path.to_path_buf()))
    }
}

async fn load_documents(
    loader: &DirectoryLoader,
    dir: &Path,
) -> Result<Vec<crate::models::Document>, IngestError> {
    let loader = loader.clone();
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || loader.load_data(&dir))
        .await
        .map_err(|error| IngestError::Loader(error.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{scripted_engine, ScriptedLlm};
    use crate::engine::{QueryEngine, QueryEngineOptions};
    use crate::extractor::{PageText, PdfExtractor};
    use crate::models::{Document, SessionId};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct StubExtractor {
        seen: Mutex<Vec<PathBuf>>,
    }

    impl PdfExtractor for StubExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
            self.seen.lock().unwrap().push(path.to_path_buf());
            Ok(vec![PageText {
                number: 1,
                text: "The relief valve opens at 210 bar.".to_string(),
            }])
        }
    }

    fn stub_loader() -> (DirectoryLoader, Arc<StubExtractor>) {
        let extractor = Arc::new(StubExtractor {
            seen: Mutex::new(Vec::new()),
        });
        (
            DirectoryLoader::new(&[".pdf"], true, extractor.clone()),
            extractor,
        )
    }

    #[derive(Default)]
    struct CountingBuilder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EngineBuilder for CountingBuilder {
        async fn build(
            &self,
            documents: Vec<Document>,
            _credential: &str,
        ) -> Result<Arc<QueryEngine>, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IngestError::PdfParse("boom".to_string()));
            }
            assert!(!documents.is_empty());
            let engine = scripted_engine(
                Arc::new(ScriptedLlm::new(&["ok"])),
                QueryEngineOptions::default(),
            )
            .await;
            Ok(Arc::new(engine))
        }
    }

    fn pdf(name: &str) -> Option<UploadedFile> {
        Some(UploadedFile::new(name, b"%PDF-1.4\n".to_vec()))
    }

    #[tokio::test]
    async fn same_file_name_builds_once_per_session() {
        let mut state = SessionState::new(SessionId::new());
        let (loader, _) = stub_loader();
        let builder = CountingBuilder::default();

        let first = ingest_upload(&mut state, pdf("doc.pdf"), "key", &loader, &builder)
            .await
            .unwrap();
        let second = ingest_upload(&mut state, pdf("doc.pdf"), "key", &loader, &builder)
            .await
            .unwrap();

        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(first, IngestOutcome::Ready { cached: false, .. }));
        assert!(matches!(second, IngestOutcome::Ready { cached: true, .. }));
        assert_eq!(state.cache_len(), 1);
    }

    #[tokio::test]
    async fn cache_key_is_session_and_file_name() {
        let mut state = SessionState::new(SessionId::new());
        let (loader, _) = stub_loader();
        let builder = CountingBuilder::default();

        ingest_upload(&mut state, pdf("doc.pdf"), "key", &loader, &builder)
            .await
            .unwrap();

        let expected = format!("{}-doc.pdf", state.id());
        assert_eq!(state.active_file().map(ToString::to_string), Some(expected));
        assert!(state.active_engine().is_some());
    }

    #[tokio::test]
    async fn distinct_names_get_distinct_engines() {
        let mut state = SessionState::new(SessionId::new());
        let (loader, _) = stub_loader();
        let builder = CountingBuilder::default();

        ingest_upload(&mut state, pdf("a.pdf"), "key", &loader, &builder).await.unwrap();
        ingest_upload(&mut state, pdf("b.pdf"), "key", &loader, &builder).await.unwrap();

        assert_eq!(builder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.cache_len(), 2);
        assert_eq!(
            state.active_file().map(|key| key.file_name.as_str()),
            Some("b.pdf")
        );
    }

    #[tokio::test]
    async fn missing_inputs_are_a_no_op() {
        let mut state = SessionState::new(SessionId::new());
        let (loader, extractor) = stub_loader();
        let builder = CountingBuilder::default();

        let no_key = ingest_upload(&mut state, pdf("doc.pdf"), "  ", &loader, &builder)
            .await
            .unwrap();
        let no_file = ingest_upload(&mut state, None, "key", &loader, &builder)
            .await
            .unwrap();
        let not_pdf = ingest_upload(
            &mut state,
            Some(UploadedFile::new("notes.txt", b"x".to_vec())),
            "key",
            &loader,
            &builder,
        )
        .await
        .unwrap();

        assert_eq!(no_key, IngestOutcome::Skipped(SkipReason::MissingCredential));
        assert_eq!(no_file, IngestOutcome::Skipped(SkipReason::MissingFile));
        assert_eq!(not_pdf, IngestOutcome::Skipped(SkipReason::UnsupportedFormat));
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
        assert!(extractor.seen.lock().unwrap().is_empty());
        assert_eq!(state.cache_len(), 0);
        assert!(state.uploaded_file().is_none());
    }

    #[tokio::test]
    async fn temp_directory_is_removed_after_ingestion() {
        let mut state = SessionState::new(SessionId::new());
        let (loader, extractor) = stub_loader();
        let builder = CountingBuilder::default();

        ingest_upload(&mut state, pdf("doc.pdf"), "key", &loader, &builder)
            .await
            .unwrap();

        let seen = extractor.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].exists());
    }

    #[tokio::test]
    async fn build_failure_leaves_cache_untouched() {
        let mut state = SessionState::new(SessionId::new());
        let (loader, extractor) = stub_loader();
        let builder = CountingBuilder {
            fail: true,
            ..Default::default()
        };

        let result = ingest_upload(&mut state, pdf("doc.pdf"), "key", &loader, &builder).await;

        assert!(result.is_err());
        assert_eq!(state.cache_len(), 0);
        assert!(state.active_file().is_none());
        assert!(!extractor.seen.lock().unwrap()[0].exists());
    }

    #[tokio::test]
    async fn unreadable_pdf_surfaces_parse_error() {
        let mut state = SessionState::new(SessionId::new());
        let builder = CountingBuilder::default();

        let result =
            ingest_upload(&mut state, pdf("doc.pdf"), "key", &DirectoryLoader::pdf(), &builder)
                .await;

        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.cache_len(), 0);
    }

    #[tokio::test]
    async fn path_components_are_stripped_from_names() {
        let mut state = SessionState::new(SessionId::new());
        let (loader, extractor) = stub_loader();
        let builder = CountingBuilder::default();

        let outcome = ingest_upload(&mut state, pdf("../../etc/doc.pdf"), "key", &loader, &builder)
            .await
            .unwrap();

        match outcome {
            IngestOutcome::Ready { key, .. } => assert_eq!(key.file_name, "doc.pdf"),
            other => panic!("unexpected outcome {other:?}"),
        }
        let seen = extractor.seen.lock().unwrap();
        assert_eq!(seen[0].file_name().and_then(|name| name.to_str()), Some("doc.pdf"));
    }

    #[test]
    fn stored_names_reject_bare_dots() {
        assert_eq!(stored_file_name("a\\b\\c.pdf"), Some("c.pdf"));
        assert_eq!(stored_file_name(".."), None);
        assert_eq!(stored_file_name("dir/"), None);
    }

    #[test]
    fn vanished_upload_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");

        let error = ensure_persisted(&path).unwrap_err();
        assert!(matches!(error, IngestError::MissingUpload(ref missing) if missing == &path));
        assert!(error.to_string().starts_with("could not find the uploaded file"));
    }

    #[tokio::test]
    async fn upload_missing_from_disk_builds_nothing() {
        let mut state = SessionState::new(SessionId::new());
        let (loader, extractor) = stub_loader();
        let builder = CountingBuilder::default();
        let dir = tempfile::tempdir().unwrap();
        let never_written = dir.path().join("doc.pdf");
        let key = FileKey::new(state.id(), "doc.pdf");

        let result =
            index_upload(&mut state, key, &never_written, "key", &loader, &builder).await;

        assert!(matches!(result, Err(IngestError::MissingUpload(ref path)) if path == &never_written));
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
        assert!(extractor.seen.lock().unwrap().is_empty());
        assert_eq!(state.cache_len(), 0);
        assert!(state.active_file().is_none());
    }
}
