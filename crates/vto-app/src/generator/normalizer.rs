use futures::future::join_all;
use tracing::{debug, warn};
use vto_core::output::{MIME_JPEG, MIME_PNG};
use vto_core::{Provenance, RawOutput, RawOutputItem, ResultRecord};
use vto_synth::{FallbackImageSynthesizer, SynthContext};

/// Counts of what happened to each raw item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub recognized: usize,
    pub skipped: usize,
    pub mocked: bool,
}

enum Candidate {
    Inline(Vec<u8>),
    Remote(String),
}

/// Turns whatever a backend returned into slot-indexed result records
#[derive(Debug, Clone, Default)]
pub struct OutputNormalizer {
    synth: FallbackImageSynthesizer,
}

impl OutputNormalizer {
    pub fn new(synth: FallbackImageSynthesizer) -> Self {
        Self { synth }
    }

    /// Never fails. Items that can't be mapped are skipped, and an output with
    /// nothing usable becomes a single mock record at slot 0.
    pub async fn normalize(&self, raw: RawOutput, sources: &[Vec<u8>]) -> (Vec<ResultRecord>, NormalizeReport) {
        let items = raw.into_items();
        let total = items.len();

        // Lazy resolvers run concurrently; join_all keeps item order
        let candidates = join_all(items.into_iter().enumerate().map(|(index, item)| candidate(index, item))).await;

        let records: Vec<ResultRecord> = candidates
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(slot, candidate)| match candidate {
                Candidate::Inline(bytes) => ResultRecord::inline(slot, bytes, MIME_PNG, Provenance::Real),
                Candidate::Remote(url) => ResultRecord::remote(slot, url),
            })
            .collect();

        let mut report = NormalizeReport {
            recognized: records.len(),
            skipped: total - records.len(),
            mocked: false,
        };

        if report.skipped > 0 {
            warn!("Skipped {} of {} backend output item(s)", report.skipped, total);
        }

        if records.is_empty() {
            warn!("Backend output had no usable items, substituting a placeholder");
            report.mocked = true;
            let bytes = self.synth.synthesize(&SynthContext::with_sources(0, sources));
            return (vec![ResultRecord::inline(0, bytes, MIME_JPEG, Provenance::Mock)], report);
        }

        (records, report)
    }
}

async fn candidate(index: usize, item: RawOutputItem) -> Option<Candidate> {
    match item {
        RawOutputItem::Bytes(bytes) => Some(Candidate::Inline(bytes)),
        RawOutputItem::Url(url) | RawOutputItem::StaticUrl { url } => Some(Candidate::Remote(url)),
        RawOutputItem::LazyUrl(resolver) => match resolver.resolve().await {
            Ok(url) => Some(Candidate::Remote(url)),
            Err(e) => {
                warn!("Output item {} URL could not be resolved: {:#}", index, e);
                None
            }
        },
        RawOutputItem::Unrecognized(value) => {
            debug!("Output item {} has an unrecognized shape: {}", index, value);
            None
        }
    }
}
