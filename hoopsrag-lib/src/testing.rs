//! Fixtures shared by unit tests across modules.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::chunk::{Chunk, ChunkMetadata};
use crate::document::DocumentKind;
use crate::generate::{GenerationRequest, Generator};
use crate::season::Season;
use crate::{Error, Result};

pub(crate) fn make_chunk(id: &str, document_id: &str, content: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        content: content.to_string(),
        metadata: ChunkMetadata {
            document_id: document_id.to_string(),
            kind: DocumentKind::StatTable,
            season: Season::new(2024),
            range: 0..content.len(),
            position: 0,
            total_chunks: 1,
        },
    }
}

/// What a [`ScriptedGenerator`] does when called.
pub(crate) enum Script {
    Reply(String),
    QuotaExceeded,
    Hang,
}

/// In-process generator that follows a script and counts its calls.
pub(crate) struct ScriptedGenerator {
    script: Script,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub(crate) fn replying(text: &str) -> Self {
        Self::new(Script::Reply(text.to_string()))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        match &self.script {
            Script::Reply(text) => Ok(text.clone()),
            Script::QuotaExceeded => Err(Error::GenerationQuotaExceeded("429".to_string())),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }
}
