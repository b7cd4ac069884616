//! Single-item rewrites with cancellable per-key streaming state.
//!
//! Each in-flight rewrite is keyed by `(item_id, message_index?)` in a
//! table owned by [`RewriteActions`]. At most one live entry exists per
//! key: starting again on the same key aborts the previous stream first,
//! and an explicit cancel drops the entry without writing anything back.
//! Entries are inserted and removed inside one lock scope, so no await
//! point ever observes a half-updated table.

use crate::bulk::rewrite::apply_item_rewrite;
use crate::bulk::rewrite::build_both_request;
use crate::bulk::rewrite::build_field_request;
use crate::bulk::rewrite::decompose_both;
use crate::collaborators::ItemPersister;
use crate::collaborators::ItemStore;
use crate::context::RunContext;
use crate::error::CoreError;
use crate::extract;
use curator_api::AiClient;
use curator_api::ChunkChannel;
use curator_api::KeyCipher;
use curator_api::RewriteStreamRequest;
use curator_api::StreamAuth;
use curator_api::StreamOutcome;
use curator_client::HttpTransport;
use curator_protocol::ReviewItem;
use curator_protocol::RewriteTarget;
use curator_protocol::RewriterConfig;
use curator_protocol::Role;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Identity of one in-flight rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RewriteKey {
    pub item_id: String,
    /// `None` for item-level rewrites; `Some` addresses one turn of a
    /// multi-turn item.
    pub message_index: Option<usize>,
}

impl RewriteKey {
    pub fn item(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            message_index: None,
        }
    }

    pub fn message(item_id: impl Into<String>, index: usize) -> Self {
        Self {
            item_id: item_id.into(),
            message_index: Some(index),
        }
    }
}

/// Text accumulated so far for one in-flight rewrite, for live display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSnapshot {
    pub text: String,
    pub reasoning: String,
    pub answer: String,
}

struct ActiveRewrite {
    cancel: CancellationToken,
    snapshot: RewriteSnapshot,
}

pub struct RewriteActions<T: HttpTransport> {
    ai: Arc<AiClient<T>>,
    store: Arc<dyn ItemStore>,
    persister: Option<Arc<dyn ItemPersister>>,
    cipher: Arc<dyn KeyCipher>,
    states: Mutex<HashMap<RewriteKey, ActiveRewrite>>,
}

impl<T: HttpTransport> RewriteActions<T> {
    pub fn new(
        ai: Arc<AiClient<T>>,
        store: Arc<dyn ItemStore>,
        cipher: Arc<dyn KeyCipher>,
    ) -> Self {
        Self {
            ai,
            store,
            persister: None,
            cipher,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_persister(mut self, persister: Arc<dyn ItemPersister>) -> Self {
        self.persister = Some(persister);
        self
    }

    /// The accumulated text for a live rewrite, if one exists for `key`.
    pub fn snapshot(&self, key: &RewriteKey) -> Option<RewriteSnapshot> {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(key).map(|entry| entry.snapshot.clone()))
    }

    pub fn is_active(&self, key: &RewriteKey) -> bool {
        self.states
            .lock()
            .map(|states| states.contains_key(key))
            .unwrap_or(false)
    }

    /// Aborts the live rewrite for `key`, if any, discarding whatever was
    /// accumulated. The target item is left untouched.
    pub fn cancel(&self, key: &RewriteKey) {
        if let Ok(mut states) = self.states.lock()
            && let Some(entry) = states.remove(key)
        {
            entry.cancel.cancel();
        }
    }

    /// Runs one rewrite for `key` to completion and writes the result into
    /// the item.
    ///
    /// A rewrite already live on the same key is aborted first, so two
    /// streams never race to write the same target. If this rewrite is
    /// itself cancelled mid-flight, nothing is written back and `Ok` is
    /// returned.
    pub async fn start(
        &self,
        ctx: &RunContext,
        key: RewriteKey,
        target: RewriteTarget,
        config: &RewriterConfig,
    ) -> Result<(), CoreError> {
        let item = self
            .store
            .get(&key.item_id)
            .await
            .ok_or_else(|| CoreError::ItemNotFound(key.item_id.clone()))?;

        let request = self.build_request(&item, &key, target, config)?;

        let cancel = CancellationToken::new();
        {
            let mut states = match self.states.lock() {
                Ok(states) => states,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(previous) = states.remove(&key) {
                previous.cancel.cancel();
            }
            states.insert(
                key.clone(),
                ActiveRewrite {
                    cancel: cancel.clone(),
                    snapshot: RewriteSnapshot::default(),
                },
            );
        }

        let auth = StreamAuth {
            cipher: self.cipher.as_ref(),
            api_key: &config.api_key,
        };
        let result = self
            .ai
            .stream_rewrite(&request, auth, &cancel, |chunk| {
                if let Ok(mut states) = self.states.lock()
                    && let Some(entry) = states.get_mut(&key)
                {
                    match chunk.channel {
                        ChunkChannel::Content => entry.snapshot.text.push_str(&chunk.text),
                        ChunkChannel::Reasoning => {
                            entry.snapshot.reasoning.push_str(&chunk.text);
                        }
                        ChunkChannel::Answer => entry.snapshot.answer.push_str(&chunk.text),
                    }
                }
                ControlFlow::Continue(())
            })
            .await;

        // The entry is ours to remove only while our token is still live; a
        // cancel (or a newer start) has already removed it and may have
        // installed a successor.
        let should_apply = {
            let mut states = match self.states.lock() {
                Ok(states) => states,
                Err(poisoned) => poisoned.into_inner(),
            };
            if cancel.is_cancelled() {
                false
            } else {
                states.remove(&key);
                true
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) if err.is_abort() => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if !should_apply {
            return Ok(());
        }

        let mut updated = item.clone();
        apply_rewrite(&mut updated, &item, &key, target, &outcome)?;
        self.store.put(updated.clone()).await;
        self.persist_detached(ctx, updated);
        Ok(())
    }

    fn build_request(
        &self,
        item: &ReviewItem,
        key: &RewriteKey,
        target: RewriteTarget,
        config: &RewriterConfig,
    ) -> Result<RewriteStreamRequest, CoreError> {
        match key.message_index {
            None => Ok(if target.is_combined() {
                build_both_request(item, config)
            } else {
                build_field_request(item, target.fields()[0], config)
            }),
            Some(index) => {
                let message = item.messages.get(index).ok_or_else(|| {
                    CoreError::MessageIndexOutOfRange {
                        item_id: item.id.clone(),
                        index,
                    }
                })?;
                if needs_assistant_turn(target) && message.role != Role::Assistant {
                    return Err(CoreError::ReasoningOnNonAssistant);
                }

                let mut request = if target.is_combined() {
                    build_both_request(item, config)
                } else {
                    build_field_request(item, target.fields()[0], config)
                };
                request.input = match target {
                    RewriteTarget::MessageReasoning => message
                        .reasoning_content
                        .clone()
                        .unwrap_or_default(),
                    _ => message.content.clone(),
                };
                Ok(request)
            }
        }
    }

    fn persist_detached(&self, ctx: &RunContext, item: ReviewItem) {
        if !ctx.persists_updates() {
            return;
        }
        let Some(persister) = self.persister.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = persister.persist(&item).await {
                warn!(item = %item.id, error = %err, "auto-save failed");
            }
        });
    }
}

fn needs_assistant_turn(target: RewriteTarget) -> bool {
    matches!(
        target,
        RewriteTarget::MessageReasoning | RewriteTarget::MessageBoth
    )
}

fn apply_rewrite(
    updated: &mut ReviewItem,
    prior: &ReviewItem,
    key: &RewriteKey,
    target: RewriteTarget,
    outcome: &StreamOutcome,
) -> Result<(), CoreError> {
    let Some(index) = key.message_index else {
        apply_item_rewrite(updated, prior, target, outcome);
        return Ok(());
    };

    let message =
        updated
            .messages
            .get_mut(index)
            .ok_or_else(|| CoreError::MessageIndexOutOfRange {
                item_id: prior.id.clone(),
                index,
            })?;

    match target {
        RewriteTarget::MessageQuery | RewriteTarget::Query => {
            message.content = outcome.content.trim().to_string();
        }
        RewriteTarget::MessageAnswer | RewriteTarget::Answer => {
            message.content = outcome.content.trim().to_string();
        }
        RewriteTarget::MessageReasoning | RewriteTarget::Reasoning => {
            message.reasoning_content =
                Some(extract::strip_think_markup(&outcome.content));
        }
        RewriteTarget::MessageBoth | RewriteTarget::Both => {
            let (reasoning, answer) = decompose_both(outcome);
            // One usable side keeps the other at its prior value.
            if let Some(reasoning) = reasoning {
                message.reasoning_content = Some(extract::strip_think_markup(&reasoning));
            }
            if let Some(answer) = answer {
                message.content = answer;
            }
        }
    }
    updated.mark_dirty();
    Ok(())
}
