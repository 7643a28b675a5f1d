// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Undoable diagram mutations.
//!
//! Every change to a diagram goes through a [`Command`]: it writes to the [`GraphStore`], mirrors
//! the persisted result into an optional [`LocalCache`], and remembers enough to reverse itself.
//! A [`CommandLog`] is the undo/redo history of one diagram; [`CommandManager`] hands out one log
//! per scope and serializes commands on it.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use log::{debug, trace};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{EngineConfig, MissingShapePolicy};
use crate::format::notation::NotationParseError;
use crate::model::{Diagram, DiagramId, IdError, ShapeId};
use crate::store::{CacheStage, GraphStore, LocalCache, StoreError};

pub mod activations;
pub mod members;
pub mod move_entities;
pub mod preview;

pub use activations::RefreshActivationsCommand;
pub use members::{AddMemberCommand, DeleteMemberCommand, MemberArraySpec, UpdateMemberCommand};
pub use move_entities::{resolve_moves, EntityMove, MoveEntitiesCommand};
pub use preview::{
    ApplyPreviewCommand, CreateOutcome, CreatePreviewCommand, DiscardPreviewCommand,
    PreviewAction, PreviewPipeline, PreviewStage, RejectSuggestionCommand,
    ReplacePreviewCommand,
};

/// Default bound on undo entries per diagram.
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("shape not found (id={shape_id})")]
    ShapeNotFound { shape_id: ShapeId },
    #[error("no preview group tagged '{tag}'")]
    PreviewGroupNotFound { tag: String },
    #[error("notation parse error: {0}")]
    Parse(#[from] NotationParseError),
    #[error(transparent)]
    Id(#[from] IdError),
    #[error("invalid command input: {0}")]
    Validation(String),
    #[error("generator {shape_id} already has an active preview")]
    GeneratorOccupied { shape_id: ShapeId },
    #[error("cannot {action:?} preview '{tag}' in stage {stage:?}")]
    InvalidTransition { tag: String, stage: PreviewStage, action: PreviewAction },
    #[error("suggestion {shape_id} has {connectors} connectors (expected one outgoing at most)")]
    AmbiguousSuggestion { shape_id: ShapeId, connectors: usize },
    #[error("shape {shape_id} is a '{actual}', expected '{expected}'")]
    WrongShapeKind { shape_id: ShapeId, expected: String, actual: String },
    #[error("index {index} is out of range for '{property}' of {shape_id} (len {len})")]
    IndexOutOfRange { shape_id: ShapeId, property: &'static str, index: usize, len: usize },
    #[error("command has not been executed")]
    NotExecuted,
}

/// An undoable unit of graph mutation.
///
/// `execute` either completes or returns the first store error unchanged; writes that already
/// succeeded inside the same command are not rolled back. `undo` reverses a completed `execute`.
#[async_trait]
pub trait Command: Send + Sync {
    fn description(&self) -> String;

    async fn execute(&mut self) -> Result<(), CommandError>;

    async fn undo(&mut self) -> Result<(), CommandError>;
}

/// What a command writes to: the store, one diagram in it, and optionally a render cache.
#[derive(Clone)]
pub struct CommandContext {
    store: Arc<dyn GraphStore>,
    cache: Option<Arc<dyn LocalCache>>,
    diagram_id: DiagramId,
    missing_shapes: MissingShapePolicy,
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("diagram_id", &self.diagram_id)
            .field("cache", &self.cache.is_some())
            .field("missing_shapes", &self.missing_shapes)
            .finish_non_exhaustive()
    }
}

impl CommandContext {
    pub fn new(store: Arc<dyn GraphStore>, diagram_id: DiagramId) -> Self {
        Self { store, cache: None, diagram_id, missing_shapes: MissingShapePolicy::default() }
    }

    /// A context whose commands follow the configured missing-shape policy.
    pub fn from_config(
        store: Arc<dyn GraphStore>,
        diagram_id: DiagramId,
        config: &EngineConfig,
    ) -> Self {
        Self::new(store, diagram_id).with_missing_shapes(config.missing_shapes)
    }

    pub fn with_missing_shapes(mut self, policy: MissingShapePolicy) -> Self {
        self.missing_shapes = policy;
        self
    }

    pub fn missing_shapes(&self) -> MissingShapePolicy {
        self.missing_shapes
    }

    pub fn with_cache(mut self, cache: Arc<dyn LocalCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    pub fn diagram_id(&self) -> &DiagramId {
        &self.diagram_id
    }

    pub async fn diagram(&self) -> Result<Diagram, CommandError> {
        Ok(self.store.diagram(&self.diagram_id).await?)
    }

    /// Applies a staged cache change against the diagram a successful write returned.
    pub(crate) fn commit(&self, stage: CacheStage, persisted: &Diagram) {
        stage.commit(persisted, self.cache.as_deref());
    }
}

/// Undo/redo history for one diagram.
pub struct CommandLog {
    scope: DiagramId,
    undo: VecDeque<Box<dyn Command>>,
    redo: Vec<Box<dyn Command>>,
    max_depth: usize,
}

impl std::fmt::Debug for CommandLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandLog")
            .field("scope", &self.scope)
            .field("undo", &self.undo_descriptions())
            .field("redo", &self.redo.len())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl CommandLog {
    pub fn new(scope: DiagramId) -> Self {
        Self::with_max_depth(scope, DEFAULT_HISTORY_DEPTH)
    }

    pub fn with_max_depth(scope: DiagramId, max_depth: usize) -> Self {
        Self { scope, undo: VecDeque::new(), redo: Vec::new(), max_depth: max_depth.max(1) }
    }

    pub fn scope(&self) -> &DiagramId {
        &self.scope
    }

    /// Runs `command`. On success it becomes the newest undo entry and the redo history is
    /// dropped; on failure nothing is recorded.
    pub async fn execute(&mut self, mut command: Box<dyn Command>) -> Result<(), CommandError> {
        debug!(scope:% = self.scope, command:% = command.description(); "execute");
        command.execute().await?;

        self.redo.clear();
        self.push_undo(command);
        Ok(())
    }

    /// Undoes the newest entry. Returns `Ok(false)` when there is nothing to undo. A failed undo
    /// leaves the entry on the undo stack.
    pub async fn undo(&mut self) -> Result<bool, CommandError> {
        let Some(mut command) = self.undo.pop_back() else {
            return Ok(false);
        };
        debug!(scope:% = self.scope, command:% = command.description(); "undo");

        if let Err(err) = command.undo().await {
            self.undo.push_back(command);
            return Err(err);
        }
        trace!(scope:% = self.scope, redo_depth = self.redo.len() + 1; "push redo");
        self.redo.push(command);
        Ok(true)
    }

    /// Re-executes the newest undone entry. Returns `Ok(false)` when there is nothing to redo.
    /// A failed redo leaves the entry on the redo stack.
    pub async fn redo(&mut self) -> Result<bool, CommandError> {
        let Some(mut command) = self.redo.pop() else {
            return Ok(false);
        };
        debug!(scope:% = self.scope, command:% = command.description(); "redo");

        if let Err(err) = command.execute().await {
            self.redo.push(command);
            return Err(err);
        }
        self.push_undo(command);
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Descriptions of the undo entries, oldest first.
    pub fn undo_descriptions(&self) -> Vec<String> {
        self.undo.iter().map(|command| command.description()).collect()
    }

    fn push_undo(&mut self, command: Box<dyn Command>) {
        self.undo.push_back(command);
        while self.undo.len() > self.max_depth {
            self.undo.pop_front();
        }
        trace!(scope:% = self.scope, undo_depth = self.undo.len(); "push undo");
    }
}

pub type SharedCommandLog = Arc<Mutex<CommandLog>>;

/// Registry of per-diagram command logs.
///
/// The log's async mutex is held for the whole execute/undo/redo, so commands on one scope never
/// interleave. Different scopes run independently.
#[derive(Debug)]
pub struct CommandManager {
    logs: StdMutex<BTreeMap<DiagramId, SharedCommandLog>>,
    history_depth: usize,
}

impl Default for CommandManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl CommandManager {
    pub fn new(history_depth: usize) -> Self {
        Self { logs: StdMutex::new(BTreeMap::new()), history_depth }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.history_depth)
    }

    /// Returns the log for `scope`, creating it on first use.
    pub fn log(&self, scope: &DiagramId) -> SharedCommandLog {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.entry(scope.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(CommandLog::with_max_depth(scope.clone(), self.history_depth)))
            })
            .clone()
    }

    pub async fn execute(
        &self,
        command: Box<dyn Command>,
        scope: &DiagramId,
    ) -> Result<(), CommandError> {
        let log = self.log(scope);
        let mut log = log.lock().await;
        log.execute(command).await
    }

    pub async fn undo(&self, scope: &DiagramId) -> Result<bool, CommandError> {
        let log = self.log(scope);
        let mut log = log.lock().await;
        log.undo().await
    }

    pub async fn redo(&self, scope: &DiagramId) -> Result<bool, CommandError> {
        let log = self.log(scope);
        let mut log = log.lock().await;
        log.redo().await
    }

    pub async fn can_undo(&self, scope: &DiagramId) -> bool {
        self.log(scope).lock().await.can_undo()
    }

    pub async fn can_redo(&self, scope: &DiagramId) -> bool {
        self.log(scope).lock().await.can_redo()
    }

    /// Drops both stacks of `scope` (e.g. when the diagram view closes).
    pub async fn clear_scope(&self, scope: &DiagramId) {
        let removed = self.logs.lock().unwrap_or_else(PoisonError::into_inner).remove(scope);
        if let Some(log) = removed {
            log.lock().await.clear();
        }
        debug!(scope:% = scope; "cleared command history");
    }
}
