//! Adapter that replays canned replies.
//!
//! Useful for demos and tests that need a deterministic model.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use tracing::trace;

use crate::traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, InferenceChunk, InferenceRequest,
    ModelAdapter,
};

/// Replays a fixed script of replies, one per [`ModelAdapter::infer`] call.
///
/// Each reply is streamed word by word. Once the script runs out the adapter
/// either repeats its last reply or fails, depending on how it was built.
#[derive(Debug)]
pub struct ScriptedAdapter {
    metadata: AdapterMetadata,
    replies: Mutex<VecDeque<String>>,
    repeat_last: Option<String>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedAdapter {
    /// Creates an adapter that fails once `replies` is exhausted.
    #[must_use]
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metadata: AdapterMetadata::new("scripted", "scripted"),
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            repeat_last: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates an adapter that answers every request with `reply`.
    #[must_use]
    pub fn repeating(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self {
            repeat_last: Some(reply),
            ..Self::new(Vec::<String>::new())
        }
    }

    /// Returns every request received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests
            .lock()
            .expect("scripted adapter poisoned")
            .clone()
    }

    fn next_reply(&self) -> Option<String> {
        let mut replies = self.replies.lock().expect("scripted adapter poisoned");
        replies.pop_front().or_else(|| self.repeat_last.clone())
    }
}

#[async_trait]
impl ModelAdapter for ScriptedAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn infer(&self, request: InferenceRequest) -> AdapterResult<AdapterStream> {
        self.requests
            .lock()
            .expect("scripted adapter poisoned")
            .push(request);

        let reply = self
            .next_reply()
            .ok_or_else(|| AdapterError::response("script exhausted"))?;
        trace!(reply = %reply, "scripted reply");

        let words: Vec<String> = reply.split_inclusive(' ').map(str::to_owned).collect();
        let last = words.len().saturating_sub(1);
        let chunks: Vec<AdapterResult<InferenceChunk>> = if words.is_empty() {
            vec![Ok(InferenceChunk::new("", true))]
        } else {
            words
                .into_iter()
                .enumerate()
                .map(|(index, word)| Ok(InferenceChunk::new(word, index == last)))
                .collect()
        };
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MessageRole, PromptMessage, collect_text};

    fn request() -> InferenceRequest {
        InferenceRequest::new(vec![PromptMessage::new(MessageRole::User, "hi")]).unwrap()
    }

    #[tokio::test]
    async fn replays_in_order_then_fails() {
        let adapter = ScriptedAdapter::new(["one two", "three"]);

        let first = collect_text(adapter.infer(request()).await.unwrap()).await.unwrap();
        let second = collect_text(adapter.infer(request()).await.unwrap()).await.unwrap();
        assert_eq!(first, "one two");
        assert_eq!(second, "three");

        assert!(adapter.infer(request()).await.is_err());
        assert_eq!(adapter.requests().len(), 3);
    }

    #[tokio::test]
    async fn repeating_never_runs_out() {
        let adapter = ScriptedAdapter::repeating("Final Answer: ok");
        for _ in 0..3 {
            let text = collect_text(adapter.infer(request()).await.unwrap()).await.unwrap();
            assert_eq!(text, "Final Answer: ok");
        }
    }
}
