//! Chat orchestrator: central coordinator wiring classifier, registry,
//! transport, router and the conversation store.
//!
//! Sends are serialised per conversation. Closing or reloading a
//! conversation bumps its generation; a send started under an older
//! generation stops rendering and its result is discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, info, warn};

use medtutor_core::config::ChatConfig;
use medtutor_core::error::MedtutorError;
use medtutor_core::types::{title_from_text, ChatTurn, MessageContent, Role};
use medtutor_storage::ConversationStore;

use crate::classifier::IntentClassifier;
use crate::error::ChatError;
use crate::registry::{self, PromptConfig};
use crate::request::build_request;
use crate::router::{route, ProseSink, RenderedResponse};
use crate::transport::ChatTransport;
use crate::types::Category;

/// Default number of prior turns sent with a new message.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Default maximum number of images attached to one message.
pub const DEFAULT_MAX_IMAGES: usize = 5;

/// Default number of conversations kept in memory between sends.
pub const DEFAULT_MAX_CACHED_CONVERSATIONS: usize = 64;

/// Result of one resolved send.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub category: Category,
    pub rendered: RenderedResponse,
    /// Text stored as the assistant turn.
    pub assistant_text: String,
    /// The assistant turn is a transport error notice.
    pub is_error: bool,
}

/// In-memory state of one conversation.
#[derive(Debug)]
struct Conversation {
    turns: tokio::sync::Mutex<Vec<ChatTurn>>,
    generation: AtomicU64,
    last_used: AtomicU64,
}

impl Conversation {
    fn with_turns(turns: Vec<ChatTurn>) -> Self {
        Self {
            turns: tokio::sync::Mutex::new(turns),
            generation: AtomicU64::new(0),
            last_used: AtomicU64::new(0),
        }
    }

    fn touch(&self, tick: u64) {
        self.last_used.store(tick, Ordering::Relaxed);
    }

    fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Forwards prose to the caller's sink while the send is current.
struct GenerationSink<'a> {
    conversation: &'a Conversation,
    generation: u64,
    inner: &'a mut (dyn ProseSink + Send),
}

impl GenerationSink<'_> {
    fn is_current(&self) -> bool {
        self.conversation.generation() == self.generation
    }
}

impl ProseSink for GenerationSink<'_> {
    fn render(&mut self, cumulative: &str) {
        if self.is_current() {
            self.inner.render(cumulative);
        }
    }
}

/// Text of the assistant turn recorded when the provider call fails.
pub fn error_turn_text(err: &ChatError) -> String {
    format!(
        "⚠️ Erro: {}\n\nVerifique suas configurações e garanta que sua API e endpoint estão ativos e suportam *chatCompletions*.",
        err
    )
}

/// Central chat orchestrator.
pub struct ChatOrchestrator {
    classifier: IntentClassifier,
    transport: RwLock<Arc<dyn ChatTransport>>,
    store: Option<Arc<dyn ConversationStore>>,
    conversations: Mutex<HashMap<String, Arc<Conversation>>>,
    clock: AtomicU64,
    history_window: usize,
    max_images: usize,
    max_cached: usize,
}

impl ChatOrchestrator {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            transport: RwLock::new(transport),
            store: None,
            conversations: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
            history_window: DEFAULT_HISTORY_WINDOW,
            max_images: DEFAULT_MAX_IMAGES,
            max_cached: DEFAULT_MAX_CACHED_CONVERSATIONS,
        }
    }

    /// Orchestrator using the history window and image limit from config.
    pub fn from_config(transport: Arc<dyn ChatTransport>, config: &ChatConfig) -> Self {
        Self::new(transport)
            .with_history_window(config.history_window)
            .with_max_images(config.max_images)
    }

    /// Persist conversations to `store` after every resolved send.
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_max_images(mut self, max_images: usize) -> Self {
        self.max_images = max_images;
        self
    }

    /// Keep at most `max` idle conversations in memory.
    pub fn with_max_cached(mut self, max: usize) -> Self {
        self.max_cached = max.max(1);
        self
    }

    /// Replace the transport used by subsequent sends.
    pub fn set_transport(&self, transport: Arc<dyn ChatTransport>) {
        match self.transport.write() {
            Ok(mut guard) => *guard = transport,
            Err(poisoned) => *poisoned.into_inner() = transport,
        }
    }

    fn transport(&self) -> Arc<dyn ChatTransport> {
        match self.transport.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Category and prompt configuration `text` would be sent with.
    pub fn preview(&self, text: &str) -> (Category, &'static PromptConfig) {
        let category = self.classifier.classify(text);
        (category, registry::resolve(category))
    }

    fn lock_map(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<Conversation>>>, ChatError> {
        self.conversations
            .lock()
            .map_err(|e| ChatError::StorageError(format!("conversation lock poisoned: {}", e)))
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Cached state of conversation `id`, if any.
    fn cached(&self, id: &str) -> Result<Option<Arc<Conversation>>, ChatError> {
        let map = self.lock_map()?;
        Ok(map.get(id).map(|conversation| {
            conversation.touch(self.tick());
            Arc::clone(conversation)
        }))
    }

    /// Cached state of conversation `id`, loaded from the store on a miss.
    async fn conversation(&self, id: &str) -> Result<Arc<Conversation>, ChatError> {
        if let Some(existing) = self.cached(id)? {
            return Ok(existing);
        }
        let turns = self.stored_turns(id).await?.unwrap_or_default();
        let mut map = self.lock_map()?;
        // Another caller may have loaded it while the lock was released.
        let conversation = map
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Conversation::with_turns(turns)));
        conversation.touch(self.tick());
        Ok(Arc::clone(conversation))
    }

    /// Run `op` against the store on the blocking pool.
    async fn blocking_store<T, F>(&self, op: F) -> Result<Option<T>, ChatError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ConversationStore) -> Result<T, MedtutorError> + Send + 'static,
    {
        let Some(store) = self.store.clone() else {
            return Ok(None);
        };
        let value = tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| ChatError::StorageError(format!("store task failed: {}", e)))??;
        Ok(Some(value))
    }

    async fn stored_turns(&self, id: &str) -> Result<Option<Vec<ChatTurn>>, ChatError> {
        let id = id.to_string();
        let stored = self.blocking_store(move |store| store.load(&id)).await?.flatten();
        Ok(stored.map(|stored| {
            stored
                .turns
                .into_iter()
                .filter(|t| t.role != Role::System)
                .collect()
        }))
    }

    /// Send one user message in conversation `id`.
    ///
    /// Prose reaches `sink` as it is decoded. Transport failures are not
    /// returned as errors: they are recorded as an assistant error turn and
    /// reported through [`SendOutcome::is_error`].
    pub async fn send(
        &self,
        id: &str,
        text: &str,
        images: &[String],
        sink: &mut (dyn ProseSink + Send),
    ) -> Result<SendOutcome, ChatError> {
        let text = text.trim();
        if text.is_empty() && images.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if images.len() > self.max_images {
            return Err(ChatError::TooManyImages(self.max_images));
        }

        let conversation = self.conversation(id).await?;
        let outcome = self.send_in(&conversation, id, text, images, sink).await;
        drop(conversation);
        self.evict_idle();
        outcome
    }

    async fn send_in(
        &self,
        conversation: &Conversation,
        id: &str,
        text: &str,
        images: &[String],
        sink: &mut (dyn ProseSink + Send),
    ) -> Result<SendOutcome, ChatError> {
        let mut turns = conversation.turns.lock().await;
        let generation = conversation.generation();

        let (category, config) = self.preview(text);
        let user_content = MessageContent::from_text_and_images(text, images);
        let request = build_request(
            config,
            &turns,
            user_content.clone(),
            self.history_window,
            !config.output_shape.is_structured(),
        );
        info!(
            conversation = id,
            category = %category,
            history = request.messages.len() - 2,
            images = images.len(),
            "Sending message"
        );

        let transport = self.transport();
        let mut guard = GenerationSink {
            conversation,
            generation,
            inner: sink,
        };
        let result = route(transport.as_ref(), config, &request, &mut guard).await;

        if !guard.is_current() {
            debug!(conversation = id, "Discarding result of superseded send");
            return Err(ChatError::Superseded);
        }

        let outcome = match result {
            Ok(routed) => SendOutcome {
                category,
                rendered: routed.rendered,
                assistant_text: routed.raw_text,
                is_error: false,
            },
            Err(e) if e.is_transport() => {
                warn!(conversation = id, category = %category, error = %e, "Provider call failed");
                let message = error_turn_text(&e);
                guard.render(&message);
                SendOutcome {
                    category,
                    rendered: RenderedResponse::prose(message.clone()),
                    assistant_text: message,
                    is_error: true,
                }
            }
            Err(e) => return Err(e),
        };

        turns.push(ChatTurn::user(user_content));
        turns.push(ChatTurn::assistant(outcome.assistant_text.as_str()));
        // Saved while the turns are locked so saves for one conversation
        // land in order.
        self.persist(id, turns.clone()).await;

        Ok(outcome)
    }

    async fn persist(&self, id: &str, turns: Vec<ChatTurn>) {
        let title = turns
            .iter()
            .find(|t| t.role == Role::User)
            .map(|t| title_from_text(&t.content.text()))
            .filter(|t| !t.is_empty());
        let key = id.to_string();
        let saved = self
            .blocking_store(move |store| store.save(&key, &turns, title.as_deref()))
            .await;
        if let Err(e) = saved {
            warn!(conversation = id, error = %e, "Failed to persist conversation");
        }
    }

    /// Drop the least recently used conversations beyond the cache limit.
    ///
    /// Only idle entries are dropped: nobody else holds them and no send is
    /// queued on their turns. Without a store their history is lost.
    fn evict_idle(&self) {
        let Ok(mut map) = self.lock_map() else {
            return;
        };
        if map.len() <= self.max_cached {
            return;
        }
        let mut idle: Vec<(u64, String)> = map
            .iter()
            .filter(|&(_, c)| Arc::strong_count(c) == 1 && c.turns.try_lock().is_ok())
            .map(|(id, c)| (c.last_used(), id.clone()))
            .collect();
        idle.sort_unstable();
        let excess = map.len() - self.max_cached;
        for (_, id) in idle.into_iter().take(excess) {
            map.remove(&id);
            debug!(conversation = %id, "Evicted idle conversation");
        }
    }

    /// Number of conversations currently held in memory.
    pub fn cached_conversations(&self) -> usize {
        self.lock_map().map(|map| map.len()).unwrap_or(0)
    }

    /// Turns of conversation `id`: the in-memory state when cached, the
    /// stored history otherwise. A miss does not create an entry.
    pub async fn history(&self, id: &str) -> Result<Vec<ChatTurn>, ChatError> {
        match self.cached(id)? {
            Some(conversation) => Ok(conversation.turns.lock().await.clone()),
            None => Ok(self.stored_turns(id).await?.unwrap_or_default()),
        }
    }

    /// Reload conversation `id` from the store, superseding any send in
    /// flight for it. Returns `None` when the store has no such conversation.
    pub async fn load(&self, id: &str) -> Result<Option<Vec<ChatTurn>>, ChatError> {
        let cached = self.cached(id)?;
        if let Some(conversation) = &cached {
            conversation.bump();
        }
        let stored = self.stored_turns(id).await?;
        debug!(conversation = id, found = stored.is_some(), "Conversation loaded");
        match (cached, &stored) {
            (Some(conversation), _) => {
                *conversation.turns.lock().await = stored.clone().unwrap_or_default();
            }
            (None, Some(turns)) => {
                let conversation = {
                    let mut map = self.lock_map()?;
                    let entry = map
                        .entry(id.to_string())
                        .or_insert_with(|| Arc::new(Conversation::with_turns(Vec::new())));
                    entry.bump();
                    entry.touch(self.tick());
                    Arc::clone(entry)
                };
                *conversation.turns.lock().await = turns.clone();
            }
            (None, None) => {}
        }
        Ok(stored)
    }

    /// Forget the in-memory state of conversation `id`. A send in flight
    /// for it is orphaned. Persisted history is kept.
    pub fn close(&self, id: &str) -> Result<(), ChatError> {
        if let Some(conversation) = self.lock_map()?.remove(id) {
            conversation.bump();
        }
        Ok(())
    }

    /// Close conversation `id` and remove it from the store.
    pub async fn delete(&self, id: &str) -> Result<bool, ChatError> {
        self.close(id)?;
        let id = id.to_string();
        Ok(self
            .blocking_store(move |store| store.delete(&id))
            .await?
            .unwrap_or(false))
    }

    /// Close every conversation and clear the store.
    pub async fn clear_all(&self) -> Result<usize, ChatError> {
        for (_, conversation) in self.lock_map()?.drain() {
            conversation.bump();
        }
        Ok(self
            .blocking_store(|store| store.clear_all())
            .await?
            .unwrap_or(0))
    }
}
