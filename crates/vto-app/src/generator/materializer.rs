use std::sync::Arc;
use std::time::Duration;
use anyhow::{bail, Context};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, error, warn};
use vto_core::output::{slot_name, MIME_JPEG};
use vto_core::{Provenance, RecordPayload, ResultRecord, StoredResult};
use vto_synth::{FallbackImageSynthesizer, SynthContext};
use crate::storage::ResultSink;

const USER_AGENT: &str = concat!("vto-materializer/", env!("CARGO_PKG_VERSION"));

/// Bytes chosen for one slot, before persisting
struct Resolved {
    bytes: Vec<u8>,
    mime: String,
    provenance: Provenance,
}

/// Resolves result records to bytes and persists them through the sink
pub struct ResultMaterializer {
    client: Client,
    sink: Arc<dyn ResultSink>,
    synth: FallbackImageSynthesizer,
}

impl ResultMaterializer {
    pub fn new(sink: Arc<dyn ResultSink>, fetch_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(fetch_timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build result fetch client")?;

        Ok(Self {
            client,
            sink,
            synth: FallbackImageSynthesizer::default(),
        })
    }

    /// Persist one record. Empty inline data or a fetch failure degrades to a
    /// placeholder for the slot. `None` only when even the placeholder could not be stored.
    pub async fn materialize(
        &self,
        record: ResultRecord,
        owner_id: &str,
        job_id: &str,
        sources: &[Vec<u8>],
    ) -> Option<StoredResult> {
        let slot = record.slot;
        let resolved = match record.payload {
            RecordPayload::Inline(bytes) if bytes.is_empty() => {
                warn!("Slot {} has no image data, using placeholder", slot);
                self.placeholder(slot, sources)
            }
            RecordPayload::Inline(bytes) => Resolved {
                bytes,
                mime: record.mime,
                provenance: record.provenance,
            },
            RecordPayload::Remote(url) => match self.fetch(&url, &record.mime).await {
                Ok((bytes, mime)) => Resolved { bytes, mime, provenance: record.provenance },
                Err(e) => {
                    warn!("Slot {} fetch from {} failed, using placeholder: {:#}", slot, url, e);
                    self.placeholder(slot, sources)
                }
            },
        };

        match self.store(slot, owner_id, job_id, &resolved).await {
            Ok(stored) => Some(stored),
            Err(e) if resolved.provenance == Provenance::Real => {
                warn!("Slot {} could not be stored, retrying with placeholder: {:#}", slot, e);
                let fallback = self.placeholder(slot, sources);
                self.store(slot, owner_id, job_id, &fallback)
                    .await
                    .inspect_err(|e| error!("Slot {} placeholder could not be stored: {:#}", slot, e))
                    .ok()
            }
            Err(e) => {
                error!("Slot {} placeholder could not be stored: {:#}", slot, e);
                None
            }
        }
    }

    async fn fetch(&self, url: &str, default_mime: &str) -> anyhow::Result<(Vec<u8>, String)> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {}", status);
        }

        let header_mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"));

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            bail!("empty body");
        }

        let mime = header_mime
            .or_else(|| image::guess_format(&bytes).ok().map(|f| f.to_mime_type().to_string()))
            .unwrap_or_else(|| default_mime.to_string());

        debug!("Fetched {} bytes ({}) from {}", bytes.len(), mime, url);
        Ok((bytes.to_vec(), mime))
    }

    fn placeholder(&self, slot: usize, sources: &[Vec<u8>]) -> Resolved {
        Resolved {
            bytes: self.synth.synthesize(&SynthContext::with_sources(slot, sources)),
            mime: MIME_JPEG.to_string(),
            provenance: Provenance::Mock,
        }
    }

    async fn store(&self, slot: usize, owner_id: &str, job_id: &str, resolved: &Resolved) -> anyhow::Result<StoredResult> {
        let reference = self
            .sink
            .persist(owner_id, job_id, slot, &resolved.bytes, &resolved.mime)
            .await?;

        Ok(StoredResult {
            slot,
            slot_name: slot_name(slot),
            reference,
            mime: resolved.mime.clone(),
            provenance: resolved.provenance,
            size: resolved.bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;
    use vto_core::output::MIME_PNG;
    use crate::storage::FsResultSink;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Accepts connections and never answers
    async fn hanging_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    fn materializer(root: &std::path::Path, timeout: Duration) -> ResultMaterializer {
        ResultMaterializer::new(Arc::new(FsResultSink::new(root)), timeout).unwrap()
    }

    #[tokio::test]
    async fn test_inline_record_is_stored_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let record = ResultRecord::inline(0, vec![7; 16], MIME_PNG, Provenance::Real);

        let stored = materializer(dir.path(), Duration::from_secs(1))
            .materialize(record, "alice", "job_1", &[])
            .await
            .unwrap();

        assert_eq!(stored.reference, "results/alice/job_1-0.png");
        assert_eq!(stored.slot_name, "result_0");
        assert_eq!(std::fs::read(dir.path().join("alice/job_1-0.png")).unwrap(), vec![7; 16]);
    }

    #[tokio::test]
    async fn test_empty_inline_record_degrades_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let record = ResultRecord::inline(2, Vec::new(), MIME_PNG, Provenance::Real);

        let stored = materializer(dir.path(), Duration::from_secs(1))
            .materialize(record, "alice", "job_1", &[])
            .await
            .unwrap();

        assert_eq!(stored.provenance, Provenance::Mock);
        assert_eq!(stored.reference, "results/alice/job_1-2.jpg");
        assert!(stored.size > 0);
        let bytes = std::fs::read(dir.path().join("alice/job_1-2.jpg")).unwrap();
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_timeout_degrades_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let base = hanging_server().await;
        let record = ResultRecord::remote(1, format!("{}/x.png", base));

        let stored = materializer(dir.path(), Duration::from_millis(200))
            .materialize(record, "alice", "job_1", &[])
            .await
            .unwrap();

        assert_eq!(stored.provenance, Provenance::Mock);
        assert_eq!(stored.mime, MIME_JPEG);
        assert_eq!(stored.reference, "results/alice/job_1-1.jpg");
        let bytes = std::fs::read(dir.path().join("alice/job_1-1.jpg")).unwrap();
        assert!(!bytes.is_empty());
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    #[tokio::test]
    async fn test_error_status_and_empty_body_degrade() {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new()
            .route("/missing.png", get(|| async { (axum::http::StatusCode::NOT_FOUND, "gone") }))
            .route("/empty.png", get(|| async { "" }));
        let base = serve(router).await;
        let materializer = materializer(dir.path(), Duration::from_secs(2));

        for (slot, path) in ["missing.png", "empty.png"].iter().enumerate() {
            let record = ResultRecord::remote(slot, format!("{}/{}", base, path));
            let stored = materializer.materialize(record, "bob", "job_2", &[]).await.unwrap();
            assert_eq!(stored.provenance, Provenance::Mock);
            assert!(stored.size > 0);
        }
    }

    #[tokio::test]
    async fn test_fetched_bytes_keep_their_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let router = Router::new().route(
            "/x.jpg",
            get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], vec![0xFFu8, 0xD8, 0xFF, 0xE0]) }),
        );
        let base = serve(router).await;

        let stored = materializer(dir.path(), Duration::from_secs(2))
            .materialize(ResultRecord::remote(0, format!("{}/x.jpg", base)), "bob", "job_3", &[])
            .await
            .unwrap();

        assert_eq!(stored.provenance, Provenance::Real);
        assert_eq!(stored.reference, "results/bob/job_3-0.jpg");
        assert_eq!(stored.size, 4);
    }

    #[tokio::test]
    async fn test_unstorable_slot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let record = ResultRecord::inline(0, vec![1], MIME_PNG, Provenance::Real);

        // The sink refuses unsafe owner ids for both attempts
        let stored = materializer(dir.path(), Duration::from_secs(1))
            .materialize(record, "../evil", "job_1", &[])
            .await;
        assert!(stored.is_none());
    }
}
