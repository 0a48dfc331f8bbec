use crate::core::backend::{AiBackend, ChatRecord, HistoryBackend, RoutineRequest};
use crate::core::models::ExtractedProduct;
use crate::core::products::ProductExtractor;
use crate::core::text::normalize;
use log::{info, warn};
use std::io;
use std::sync::Arc;

/// Cleaned assistant answer plus the products mined from it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub text: String,
    pub products: Vec<ExtractedProduct>,
    /// Whether the exchange was stored in the user's history.
    pub saved: bool,
}

/// Chat and routine flows on top of the hosted AI function.
///
/// A failed call leaves the previous reply of that kind in place.
pub struct Assistant {
    ai: Arc<dyn AiBackend>,
    history: Option<Arc<dyn HistoryBackend>>,
    extractor: ProductExtractor,
    last_chat: Option<AssistantReply>,
}

impl Assistant {
    pub fn new(ai: Arc<dyn AiBackend>, extractor: ProductExtractor) -> Self {
        Self {
            ai,
            history: None,
            extractor,
            last_chat: None,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryBackend>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn last_chat(&self) -> Option<&AssistantReply> {
        self.last_chat.as_ref()
    }

    pub async fn chat(&mut self, message: &str) -> io::Result<AssistantReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Message cannot be empty",
            ));
        }

        let raw = self.ai.chat(message).await.inspect_err(|e| {
            warn!("Chat request failed: {e}");
        })?;
        let reply = self.finish(message, &raw).await;
        self.last_chat = Some(reply.clone());
        Ok(reply)
    }

    pub async fn routine(&mut self, request: &RoutineRequest) -> io::Result<AssistantReply> {
        let raw = self.ai.generate_routine(request).await.inspect_err(|e| {
            warn!("Routine request failed: {e}");
        })?;
        Ok(self.finish(&request.describe(), &raw).await)
    }

    async fn finish(&self, prompt: &str, raw: &str) -> AssistantReply {
        let text = normalize(raw);
        let products = self.extractor.extract(&text);
        info!("Assistant reply: {} chars, {} product(s)", text.len(), products.len());

        let mut saved = false;
        if let Some(history) = self.history.as_ref().filter(|h| h.is_enabled()) {
            let record = ChatRecord {
                message: prompt.to_string(),
                response: text.clone(),
                products: products.clone(),
            };
            match history.save_chat(&record).await {
                Ok(()) => saved = true,
                Err(e) => warn!("Chat history was not saved: {e}"),
            }
        }

        AssistantReply {
            text,
            products,
            saved,
        }
    }
}
