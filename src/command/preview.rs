// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! The generate → preview → apply/discard pipeline.
//!
//! A generator shape receives notation text. Creating a preview imports the text, places the
//! result where the generator stood as uncommitted entities tagged with the generator's id, and
//! removes the generator. The preview can then be replaced by regenerated text, applied (the
//! entities become committed) or discarded.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::{json, Value};

use super::activations::{committed_view, derive_lifelines};
use super::{Command, CommandContext, CommandError};
use crate::config::EngineConfig;
use crate::format::notation::{ImportedGraph, NotationCodec, NotationParseError, SequenceGeometry};
use crate::model::{
    kinds, Connector, ConnectorId, Diagram, DiagramKind, Point, PreviewGroup, Shape, ShapeId,
};
use crate::store::{CacheStage, ConnectorPatch, ConnectorUpdate, ShapePatch, ShapeUpdate};

/// Key of the generation status object stored in a generator's `data`.
pub const GENERATION_KEY: &str = "generation";
pub const STATUS_BUILDING: &str = "building";
pub const STATUS_ERROR: &str = "error";

/// Where a preview tag currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStage {
    /// Generator present, nothing generated yet (or the last attempt failed).
    Generator,
    /// Generator present and flagged as waiting for text.
    Building,
    /// Uncommitted entities carry the tag.
    Preview,
    /// Only committed entities carry the tag.
    Applied,
    /// Neither the generator nor any tagged entity exists.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewAction {
    Create,
    /// Regenerate an existing preview in place.
    Replace,
    Apply,
    Discard,
}

impl PreviewStage {
    pub fn observe(diagram: &Diagram, tag: &str) -> Self {
        if !diagram.preview_group(tag).is_empty() {
            return Self::Preview;
        }
        if let Some(shape) = diagram.shapes().get(tag) {
            if shape.kind() == kinds::GENERATOR {
                let status = shape.data()[GENERATION_KEY]["status"].as_str();
                return match status {
                    Some(STATUS_BUILDING) => Self::Building,
                    _ => Self::Generator,
                };
            }
        }
        if diagram.has_committed_tag(tag) {
            Self::Applied
        } else {
            Self::Discarded
        }
    }

    pub fn allows(self, action: PreviewAction) -> bool {
        self.after(action).is_some()
    }

    /// The stage reached by running `action` from `self`, or `None` when the transition is not
    /// allowed.
    pub fn after(self, action: PreviewAction) -> Option<Self> {
        match (self, action) {
            (Self::Generator | Self::Building, PreviewAction::Create) => Some(Self::Preview),
            (Self::Preview, PreviewAction::Replace) => Some(Self::Preview),
            (Self::Preview, PreviewAction::Apply) => Some(Self::Applied),
            (Self::Preview, PreviewAction::Discard) => Some(Self::Discarded),
            _ => None,
        }
    }
}

fn require_stage(
    diagram: &Diagram,
    tag: &str,
    action: PreviewAction,
) -> Result<PreviewStage, CommandError> {
    let stage = PreviewStage::observe(diagram, tag);
    if stage.allows(action) {
        Ok(stage)
    } else {
        Err(CommandError::InvalidTransition { tag: tag.to_owned(), stage, action })
    }
}

/// Scopes an imported graph under `tag` and translates it so its bounding box starts at `anchor`.
fn place_preview(
    graph: ImportedGraph,
    tag: &str,
    anchor: Point,
) -> Result<(Vec<Shape>, Vec<Connector>), CommandError> {
    let origin = graph
        .shapes()
        .iter()
        .map(Shape::bounds)
        .reduce(|a, b| a.union(b))
        .map_or(Point::ORIGIN, |bounds| bounds.origin());
    let (dx, dy) = origin.delta_to(anchor);
    Ok(graph.into_preview(tag, Point::new(dx, dy))?)
}

/// Clones every entity of `group` out of `diagram`.
fn snapshot_group(diagram: &Diagram, group: &PreviewGroup) -> (Vec<Shape>, Vec<Connector>) {
    let shapes = group.shapes.iter().filter_map(|id| diagram.shape(id).cloned()).collect();
    let connectors =
        group.connectors.iter().filter_map(|id| diagram.connector(id).cloned()).collect();
    (shapes, connectors)
}

fn entity_ids(shapes: &[Shape], connectors: &[Connector]) -> (Vec<ShapeId>, Vec<ConnectorId>) {
    (
        shapes.iter().map(|s| s.id().clone()).collect(),
        connectors.iter().map(|c| c.id().clone()).collect(),
    )
}

async fn add_batch(
    ctx: &CommandContext,
    shapes: Vec<Shape>,
    connectors: Vec<Connector>,
) -> Result<(), CommandError> {
    let (shape_ids, connector_ids) = entity_ids(&shapes, &connectors);
    let mut stage = CacheStage::new();
    stage.refresh_shapes(shape_ids);
    stage.refresh_connectors(connector_ids);
    let persisted = ctx.store().add_entities(ctx.diagram_id(), shapes, connectors).await?;
    ctx.commit(stage, &persisted);
    Ok(())
}

async fn delete_batch(
    ctx: &CommandContext,
    shape_ids: Vec<ShapeId>,
    connector_ids: Vec<ConnectorId>,
) -> Result<(), CommandError> {
    let mut stage = CacheStage::new();
    stage.remove_shapes(shape_ids.iter().cloned());
    stage.remove_connectors(connector_ids.iter().cloned());
    let persisted =
        ctx.store().delete_entities(ctx.diagram_id(), shape_ids, connector_ids).await?;
    ctx.commit(stage, &persisted);
    Ok(())
}

async fn write_shape_data(
    ctx: &CommandContext,
    shape_id: &ShapeId,
    data: Value,
) -> Result<(), CommandError> {
    let mut stage = CacheStage::new();
    stage.refresh_shape(shape_id.clone());
    let patch = ShapePatch { data: Some(data), ..ShapePatch::default() };
    let update = ShapeUpdate::new(shape_id.clone(), patch);
    let persisted = ctx.store().update_shape(ctx.diagram_id(), update).await?;
    ctx.commit(stage, &persisted);
    Ok(())
}

fn with_generation_error(data: &Value, error: &NotationParseError) -> Value {
    let mut data = match data {
        Value::Object(_) => data.clone(),
        _ => json!({}),
    };
    data[GENERATION_KEY] = json!({ "status": STATUS_ERROR, "message": error.to_string() });
    data
}

/// Result of the last [`CreatePreviewCommand`] execute.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created { shapes: Vec<ShapeId>, connectors: Vec<ConnectorId> },
    /// The text did not parse; the error was recorded on the generator, which stays in place.
    ParseFailed { error: NotationParseError },
}

#[derive(Debug)]
struct CreatedPreview {
    generator: Shape,
    outcome: CreateOutcome,
}

/// Turns a generator into a preview of the given notation text.
///
/// The preview is added before the generator is deleted. If that delete fails, both stay in the
/// diagram and the command is not recorded.
#[derive(Debug)]
pub struct CreatePreviewCommand {
    ctx: CommandContext,
    codec: NotationCodec,
    generator_id: ShapeId,
    text: String,
    executed: Option<CreatedPreview>,
}

impl CreatePreviewCommand {
    pub fn new(
        ctx: CommandContext,
        codec: NotationCodec,
        generator_id: ShapeId,
        text: impl Into<String>,
    ) -> Self {
        Self { ctx, codec, generator_id, text: text.into(), executed: None }
    }

    pub fn outcome(&self) -> Option<&CreateOutcome> {
        self.executed.as_ref().map(|e| &e.outcome)
    }
}

#[async_trait]
impl Command for CreatePreviewCommand {
    fn description(&self) -> String {
        format!("Generate preview from {}", self.generator_id)
    }

    async fn execute(&mut self) -> Result<(), CommandError> {
        let diagram = self.ctx.diagram().await?;
        let tag = self.generator_id.as_str();
        let generator = diagram
            .shape(&self.generator_id)
            .cloned()
            .ok_or_else(|| CommandError::ShapeNotFound { shape_id: self.generator_id.clone() })?;
        if PreviewStage::observe(&diagram, tag) == PreviewStage::Preview {
            return Err(CommandError::GeneratorOccupied { shape_id: self.generator_id.clone() });
        }
        require_stage(&diagram, tag, PreviewAction::Create)?;

        let outcome = match self.codec.import(&self.text) {
            Err(error) => {
                warn!(
                    diagram_id:% = self.ctx.diagram_id(),
                    generator_id:% = self.generator_id,
                    error:% = error;
                    "generated text did not parse"
                );
                let data = with_generation_error(generator.data(), &error);
                write_shape_data(&self.ctx, &self.generator_id, data).await?;
                CreateOutcome::ParseFailed { error }
            }
            Ok(graph) => {
                let (shapes, connectors) = place_preview(graph, tag, generator.position())?;
                let (shape_ids, connector_ids) = entity_ids(&shapes, &connectors);
                add_batch(&self.ctx, shapes, connectors).await?;
                delete_batch(&self.ctx, vec![self.generator_id.clone()], Vec::new()).await?;
                info!(
                    diagram_id:% = self.ctx.diagram_id(),
                    tag = tag,
                    shapes = shape_ids.len(),
                    connectors = connector_ids.len();
                    "created preview"
                );
                CreateOutcome::Created { shapes: shape_ids, connectors: connector_ids }
            }
        };

        self.executed = Some(CreatedPreview { generator, outcome });
        Ok(())
    }

    async fn undo(&mut self) -> Result<(), CommandError> {
        let executed = self.executed.as_ref().ok_or(CommandError::NotExecuted)?;
        match &executed.outcome {
            CreateOutcome::Created { shapes, connectors } => {
                delete_batch(&self.ctx, shapes.clone(), connectors.clone()).await?;
                add_batch(&self.ctx, vec![executed.generator.clone()], Vec::new()).await?;
            }
            CreateOutcome::ParseFailed { .. } => {
                let data = executed.generator.data().clone();
                write_shape_data(&self.ctx, &self.generator_id, data).await?;
            }
        }
        debug!(generator_id:% = self.generator_id; "undid preview creation");
        Ok(())
    }
}

#[derive(Debug)]
struct ReplacedPreview {
    old_shapes: Vec<Shape>,
    old_connectors: Vec<Connector>,
    new_shapes: Vec<ShapeId>,
    new_connectors: Vec<ConnectorId>,
}

/// Swaps a preview group for the import of new text, anchored where the old group started.
///
/// Text that does not parse fails the command before anything is written. If the old group is
/// deleted but adding the new one fails, the tag is left without entities.
#[derive(Debug)]
pub struct ReplacePreviewCommand {
    ctx: CommandContext,
    codec: NotationCodec,
    tag: String,
    text: String,
    replaced: Option<ReplacedPreview>,
}

impl ReplacePreviewCommand {
    pub fn new(
        ctx: CommandContext,
        codec: NotationCodec,
        tag: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self { ctx, codec, tag: tag.into(), text: text.into(), replaced: None }
    }
}

#[async_trait]
impl Command for ReplacePreviewCommand {
    fn description(&self) -> String {
        format!("Regenerate preview {}", self.tag)
    }

    async fn execute(&mut self) -> Result<(), CommandError> {
        let diagram = self.ctx.diagram().await?;
        let group = diagram.preview_group(&self.tag);
        if group.is_empty() {
            return Err(CommandError::PreviewGroupNotFound { tag: self.tag.clone() });
        }
        let graph = self.codec.import(&self.text)?;

        let anchor = diagram.bounds_of(&group.shapes).map_or(Point::ORIGIN, |b| b.origin());
        let (shapes, connectors) = place_preview(graph, &self.tag, anchor)?;
        let (new_shapes, new_connectors) = entity_ids(&shapes, &connectors);
        let (old_shapes, old_connectors) = snapshot_group(&diagram, &group);

        delete_batch(&self.ctx, group.shapes, group.connectors).await?;
        add_batch(&self.ctx, shapes, connectors).await?;
        debug!(
            diagram_id:% = self.ctx.diagram_id(),
            tag = self.tag.as_str(),
            removed = old_shapes.len() + old_connectors.len(),
            added = new_shapes.len() + new_connectors.len();
            "replaced preview"
        );

        self.replaced =
            Some(ReplacedPreview { old_shapes, old_connectors, new_shapes, new_connectors });
        Ok(())
    }

    async fn undo(&mut self) -> Result<(), CommandError> {
        let replaced = self.replaced.as_ref().ok_or(CommandError::NotExecuted)?;
        delete_batch(&self.ctx, replaced.new_shapes.clone(), replaced.new_connectors.clone())
            .await?;
        add_batch(&self.ctx, replaced.old_shapes.clone(), replaced.old_connectors.clone()).await?;
        Ok(())
    }
}

#[derive(Debug)]
struct AppliedPreview {
    restore_shapes: Vec<ShapeUpdate>,
    restore_connectors: Vec<ConnectorUpdate>,
}

/// Commits a preview group in one batched update.
///
/// On sequence diagrams the lifelines are normalized in the same write: every committed lifeline
/// (including the newly committed ones) gets a common height and fresh activation boxes.
#[derive(Debug)]
pub struct ApplyPreviewCommand {
    ctx: CommandContext,
    tag: String,
    geometry: SequenceGeometry,
    applied: Option<AppliedPreview>,
}

impl ApplyPreviewCommand {
    pub fn new(ctx: CommandContext, tag: impl Into<String>) -> Self {
        Self { ctx, tag: tag.into(), geometry: SequenceGeometry::default(), applied: None }
    }

    pub fn with_geometry(mut self, geometry: SequenceGeometry) -> Self {
        self.geometry = geometry;
        self
    }
}

#[async_trait]
impl Command for ApplyPreviewCommand {
    fn description(&self) -> String {
        format!("Apply preview {}", self.tag)
    }

    async fn execute(&mut self) -> Result<(), CommandError> {
        let diagram = self.ctx.diagram().await?;
        let group = diagram.preview_group(&self.tag);
        if group.is_empty() {
            return Err(CommandError::PreviewGroupNotFound { tag: self.tag.clone() });
        }

        let mut forward = group
            .shapes
            .iter()
            .map(|id| (id.clone(), ShapePatch::preview(false)))
            .collect::<BTreeMap<_, _>>();
        let mut backward = group
            .shapes
            .iter()
            .map(|id| (id.clone(), ShapePatch::preview(true)))
            .collect::<BTreeMap<_, _>>();

        if diagram.kind() == DiagramKind::Sequence {
            let (shapes, connectors) = committed_view(&diagram, Some(&self.tag));
            for derived in derive_lifelines(&shapes, &connectors, Some(&self.geometry)) {
                let Some(current) = diagram.shape(&derived.shape_id) else {
                    continue;
                };
                if current.size() == derived.size && current.data() == &derived.data {
                    continue;
                }
                let patch = forward.entry(derived.shape_id.clone()).or_default();
                patch.size = Some(derived.size);
                patch.data = Some(derived.data);
                let restore = backward.entry(derived.shape_id).or_default();
                restore.size = Some(current.size());
                restore.data = Some(current.data().clone());
            }
        }

        let shape_updates =
            forward.into_iter().map(|(id, patch)| ShapeUpdate::new(id, patch)).collect::<Vec<_>>();
        let connector_updates = group
            .connectors
            .iter()
            .map(|id| ConnectorUpdate::new(id.clone(), ConnectorPatch::preview(false)))
            .collect::<Vec<_>>();
        let restore_shapes =
            backward.into_iter().map(|(id, patch)| ShapeUpdate::new(id, patch)).collect::<Vec<_>>();
        let restore_connectors = group
            .connectors
            .iter()
            .map(|id| ConnectorUpdate::new(id.clone(), ConnectorPatch::preview(true)))
            .collect::<Vec<_>>();

        let mut stage = CacheStage::new();
        stage.refresh_shapes(shape_updates.iter().map(|u| u.shape_id.clone()));
        stage.refresh_connectors(group.connectors.iter().cloned());
        let persisted = self
            .ctx
            .store()
            .update_entities(self.ctx.diagram_id(), shape_updates, connector_updates)
            .await?;
        self.ctx.commit(stage, &persisted);
        info!(
            diagram_id:% = self.ctx.diagram_id(),
            tag = self.tag.as_str(),
            shapes = group.shapes.len(),
            connectors = group.connectors.len();
            "applied preview"
        );

        self.applied = Some(AppliedPreview { restore_shapes, restore_connectors });
        Ok(())
    }

    async fn undo(&mut self) -> Result<(), CommandError> {
        let applied = self.applied.as_ref().ok_or(CommandError::NotExecuted)?;
        let mut stage = CacheStage::new();
        stage.refresh_shapes(applied.restore_shapes.iter().map(|u| u.shape_id.clone()));
        stage.refresh_connectors(applied.restore_connectors.iter().map(|u| u.connector_id.clone()));
        let persisted = self
            .ctx
            .store()
            .update_entities(
                self.ctx.diagram_id(),
                applied.restore_shapes.clone(),
                applied.restore_connectors.clone(),
            )
            .await?;
        self.ctx.commit(stage, &persisted);
        Ok(())
    }
}

/// Deletes a preview group in one batched write.
#[derive(Debug)]
pub struct DiscardPreviewCommand {
    ctx: CommandContext,
    tag: String,
    discarded: Option<(Vec<Shape>, Vec<Connector>)>,
}

impl DiscardPreviewCommand {
    pub fn new(ctx: CommandContext, tag: impl Into<String>) -> Self {
        Self { ctx, tag: tag.into(), discarded: None }
    }
}

#[async_trait]
impl Command for DiscardPreviewCommand {
    fn description(&self) -> String {
        format!("Discard preview {}", self.tag)
    }

    async fn execute(&mut self) -> Result<(), CommandError> {
        let diagram = self.ctx.diagram().await?;
        let group = diagram.preview_group(&self.tag);
        if group.is_empty() {
            return Err(CommandError::PreviewGroupNotFound { tag: self.tag.clone() });
        }
        let snapshot = snapshot_group(&diagram, &group);
        delete_batch(&self.ctx, group.shapes, group.connectors).await?;
        debug!(diagram_id:% = self.ctx.diagram_id(), tag = self.tag.as_str(); "discarded preview");
        self.discarded = Some(snapshot);
        Ok(())
    }

    async fn undo(&mut self) -> Result<(), CommandError> {
        let (shapes, connectors) = self.discarded.clone().ok_or(CommandError::NotExecuted)?;
        add_batch(&self.ctx, shapes, connectors).await
    }
}

/// Removes a suggestion shape together with its single outgoing connector.
///
/// A suggestion that any other connector touches is refused, since deleting it would leave that
/// connector dangling. The connector goes first; if the shape delete then fails, the connector
/// stays deleted and the command is not recorded.
#[derive(Debug)]
pub struct RejectSuggestionCommand {
    ctx: CommandContext,
    shape_id: ShapeId,
    rejected: Option<(Shape, Option<Connector>)>,
}

impl RejectSuggestionCommand {
    pub fn new(ctx: CommandContext, shape_id: ShapeId) -> Self {
        Self { ctx, shape_id, rejected: None }
    }
}

#[async_trait]
impl Command for RejectSuggestionCommand {
    fn description(&self) -> String {
        format!("Reject suggestion {}", self.shape_id)
    }

    async fn execute(&mut self) -> Result<(), CommandError> {
        let diagram = self.ctx.diagram().await?;
        let shape = diagram
            .shape(&self.shape_id)
            .cloned()
            .ok_or_else(|| CommandError::ShapeNotFound { shape_id: self.shape_id.clone() })?;
        if shape.kind() != kinds::SUGGESTION {
            return Err(CommandError::WrongShapeKind {
                shape_id: self.shape_id.clone(),
                expected: kinds::SUGGESTION.to_owned(),
                actual: shape.kind().to_owned(),
            });
        }
        let touching = diagram.connectors_touching(&self.shape_id).len();
        let connector = match diagram.outgoing_connectors(&self.shape_id).as_slice() {
            [] if touching == 0 => None,
            [connector] if touching == 1 => Some((*connector).clone()),
            _ => {
                return Err(CommandError::AmbiguousSuggestion {
                    shape_id: self.shape_id.clone(),
                    connectors: touching,
                })
            }
        };

        if let Some(connector) = &connector {
            delete_batch(&self.ctx, Vec::new(), vec![connector.id().clone()]).await?;
        }
        delete_batch(&self.ctx, vec![self.shape_id.clone()], Vec::new()).await?;
        debug!(shape_id:% = self.shape_id; "rejected suggestion");
        self.rejected = Some((shape, connector));
        Ok(())
    }

    async fn undo(&mut self) -> Result<(), CommandError> {
        let (shape, connector) = self.rejected.clone().ok_or(CommandError::NotExecuted)?;
        add_batch(&self.ctx, vec![shape], Vec::new()).await?;
        if let Some(connector) = connector {
            add_batch(&self.ctx, Vec::new(), vec![connector]).await?;
        }
        Ok(())
    }
}

/// Builds the right pipeline command for the current stage of a tag.
#[derive(Debug, Clone)]
pub struct PreviewPipeline {
    ctx: CommandContext,
    codec: NotationCodec,
}

impl PreviewPipeline {
    pub fn new(ctx: CommandContext, codec: NotationCodec) -> Self {
        Self { ctx, codec }
    }

    pub fn from_config(ctx: CommandContext, config: &EngineConfig) -> Self {
        Self::new(ctx, config.codec())
    }

    pub async fn stage(&self, tag: &str) -> Result<PreviewStage, CommandError> {
        Ok(PreviewStage::observe(&self.ctx.diagram().await?, tag))
    }

    /// A create command while the generator waits, a replace command once a preview exists.
    pub async fn generate(
        &self,
        generator_id: &ShapeId,
        text: &str,
    ) -> Result<Box<dyn Command>, CommandError> {
        match self.stage(generator_id.as_str()).await? {
            PreviewStage::Generator | PreviewStage::Building => Ok(Box::new(
                CreatePreviewCommand::new(self.ctx.clone(), self.codec, generator_id.clone(), text),
            )),
            PreviewStage::Preview => Ok(Box::new(ReplacePreviewCommand::new(
                self.ctx.clone(),
                self.codec,
                generator_id.as_str(),
                text,
            ))),
            stage => Err(CommandError::InvalidTransition {
                tag: generator_id.to_string(),
                stage,
                action: PreviewAction::Create,
            }),
        }
    }

    pub async fn apply(&self, tag: &str) -> Result<Box<dyn Command>, CommandError> {
        require_stage(&self.ctx.diagram().await?, tag, PreviewAction::Apply)?;
        Ok(Box::new(
            ApplyPreviewCommand::new(self.ctx.clone(), tag)
                .with_geometry(*self.codec.sequence_geometry()),
        ))
    }

    pub async fn discard(&self, tag: &str) -> Result<Box<dyn Command>, CommandError> {
        require_stage(&self.ctx.diagram().await?, tag, PreviewAction::Discard)?;
        Ok(Box::new(DiscardPreviewCommand::new(self.ctx.clone(), tag)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;
    use serde_json::json;

    use super::{
        ApplyPreviewCommand, CreateOutcome, CreatePreviewCommand, DiscardPreviewCommand,
        PreviewAction, PreviewPipeline, PreviewStage, RejectSuggestionCommand,
        ReplacePreviewCommand, GENERATION_KEY,
    };
    use crate::command::activations::ACTIVATIONS_KEY;
    use crate::command::{Command, CommandContext, CommandError, CommandManager};
    use crate::format::notation::NotationCodec;
    use crate::model::fixtures::{did, edge, flowchart_with_generator, lifeline, rect, sid};
    use crate::model::{kinds, Bounds, Diagram, DiagramKind, Point, Shape};
    use crate::store::{GraphStore, MemoryStore, RenderCache, StoreCall, StoreError};

    const CHECKOUT: &str = "flowchart LR\n  cart[Cart] --> pay[Pay]\n  pay --> done[Done]\n";

    fn setup(diagram: Diagram) -> (Arc<MemoryStore>, CommandContext) {
        let id = diagram.id().clone();
        let store = Arc::new(MemoryStore::with_diagram(diagram));
        (store.clone(), CommandContext::new(store, id))
    }

    fn generator_pipeline() -> (Arc<MemoryStore>, CommandContext, PreviewPipeline) {
        let (store, ctx) = setup(flowchart_with_generator());
        let pipeline = PreviewPipeline::new(ctx.clone(), NotationCodec::default());
        (store, ctx, pipeline)
    }

    #[rstest]
    #[case(PreviewStage::Generator, PreviewAction::Create, Some(PreviewStage::Preview))]
    #[case(PreviewStage::Building, PreviewAction::Create, Some(PreviewStage::Preview))]
    #[case(PreviewStage::Preview, PreviewAction::Replace, Some(PreviewStage::Preview))]
    #[case(PreviewStage::Preview, PreviewAction::Apply, Some(PreviewStage::Applied))]
    #[case(PreviewStage::Preview, PreviewAction::Discard, Some(PreviewStage::Discarded))]
    #[case(PreviewStage::Preview, PreviewAction::Create, None)]
    #[case(PreviewStage::Generator, PreviewAction::Apply, None)]
    #[case(PreviewStage::Applied, PreviewAction::Discard, None)]
    #[case(PreviewStage::Discarded, PreviewAction::Replace, None)]
    fn stage_transitions(
        #[case] stage: PreviewStage,
        #[case] action: PreviewAction,
        #[case] expected: Option<PreviewStage>,
    ) {
        assert_eq!(stage.after(action), expected);
        assert_eq!(stage.allows(action), expected.is_some());
    }

    #[tokio::test]
    async fn create_places_the_preview_at_the_generator_and_removes_it() {
        let (store, ctx, _) = generator_pipeline();
        let mut command =
            CreatePreviewCommand::new(ctx, NotationCodec::default(), sid("gen1"), CHECKOUT);
        command.execute().await.expect("create");

        let diagram = store.snapshot(&did("d1")).expect("diagram");
        assert!(diagram.shape(&sid("gen1")).is_none());
        let group = diagram.preview_group("gen1");
        assert_eq!(group.shapes.len(), 3);
        assert_eq!(group.connectors.len(), 2);
        assert!(group.shapes.iter().all(|id| id.as_str().starts_with("gen1:")));

        let bounds = diagram.bounds_of(&group.shapes).expect("bounds");
        assert_eq!(bounds.origin(), Point::new(100.0, 200.0));
        assert_eq!(PreviewStage::observe(&diagram, "gen1"), PreviewStage::Preview);
        assert!(matches!(
            command.outcome(),
            Some(CreateOutcome::Created { shapes, .. }) if shapes.len() == 3
        ));

        let calls = store.calls();
        assert!(matches!(calls[0], StoreCall::Add { .. }));
        assert!(matches!(&calls[1], StoreCall::Delete { shapes, .. } if shapes == &[sid("gen1")]));
    }

    #[tokio::test]
    async fn undoing_create_restores_the_generator() {
        let (store, ctx, _) = generator_pipeline();
        let before = store.snapshot(&did("d1")).expect("diagram");
        let mut command =
            CreatePreviewCommand::new(ctx, NotationCodec::default(), sid("gen1"), CHECKOUT);
        command.execute().await.expect("create");
        command.undo().await.expect("undo");

        let after = store.snapshot(&did("d1")).expect("diagram");
        assert_eq!(after.shapes(), before.shapes());
        assert!(after.connectors().is_empty());
    }

    #[tokio::test]
    async fn parse_failure_marks_the_generator_and_keeps_it() {
        let (store, ctx, _) = generator_pipeline();
        let mut command = CreatePreviewCommand::new(
            ctx,
            NotationCodec::default(),
            sid("gen1"),
            "flowchart LR\n  end\n",
        );
        command.execute().await.expect("parse failures are recorded, not returned");
        assert!(matches!(command.outcome(), Some(CreateOutcome::ParseFailed { .. })));

        let diagram = store.snapshot(&did("d1")).expect("diagram");
        let generator = diagram.shape(&sid("gen1")).expect("generator kept");
        assert_eq!(generator.data()[GENERATION_KEY]["status"], "error");
        assert!(generator.data()[GENERATION_KEY]["message"].as_str().is_some());
        assert_eq!(generator.data()["prompt"], "checkout flow");
        assert!(diagram.preview_group("gen1").is_empty());

        command.undo().await.expect("undo");
        let restored = store.snapshot(&did("d1")).expect("diagram");
        let generator = restored.shape(&sid("gen1")).expect("generator");
        assert_eq!(generator.data(), &json!({ "prompt": "checkout flow" }));
    }

    #[tokio::test]
    async fn create_on_an_occupied_generator_is_rejected() {
        let generator =
            Shape::new(sid("gen1"), kinds::GENERATOR, Bounds::new(0.0, 0.0, 200.0, 100.0));
        let mut occupant = rect("gen1:a", 0.0, 0.0);
        occupant.set_preview(true);
        occupant.set_overlay_tag(Some("gen1"));
        let diagram =
            Diagram::with_entities(did("d1"), DiagramKind::Flowchart, [generator, occupant], [])
                .expect("diagram");
        let (store, ctx) = setup(diagram);

        let mut command =
            CreatePreviewCommand::new(ctx, NotationCodec::default(), sid("gen1"), CHECKOUT);
        let err = command.execute().await.expect_err("occupied");
        assert_eq!(err, CommandError::GeneratorOccupied { shape_id: sid("gen1") });
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn replace_swaps_the_group_in_place_and_undo_brings_it_back() {
        let (store, ctx, _) = generator_pipeline();
        CreatePreviewCommand::new(ctx.clone(), NotationCodec::default(), sid("gen1"), CHECKOUT)
            .execute()
            .await
            .expect("create");
        let created = store.snapshot(&did("d1")).expect("diagram");
        store.clear_calls();

        let mut replace = ReplacePreviewCommand::new(
            ctx,
            NotationCodec::default(),
            "gen1",
            "flowchart TD\n  start[Start] --> stop[Stop]\n",
        );
        replace.execute().await.expect("replace");

        let replaced = store.snapshot(&did("d1")).expect("diagram");
        let group = replaced.preview_group("gen1");
        assert_eq!(group.shapes, vec![sid("gen1:n:start"), sid("gen1:n:stop")]);
        let bounds = replaced.bounds_of(&group.shapes).expect("bounds");
        assert_eq!(bounds.origin(), Point::new(100.0, 200.0));
        assert_eq!(store.calls().len(), 2);

        replace.undo().await.expect("undo");
        let restored = store.snapshot(&did("d1")).expect("diagram");
        assert_eq!(restored.shapes(), created.shapes());
        assert_eq!(restored.connectors(), created.connectors());
    }

    #[tokio::test]
    async fn replace_with_bad_text_writes_nothing() {
        let (store, ctx, _) = generator_pipeline();
        CreatePreviewCommand::new(ctx.clone(), NotationCodec::default(), sid("gen1"), CHECKOUT)
            .execute()
            .await
            .expect("create");
        store.clear_calls();

        let err = ReplacePreviewCommand::new(ctx, NotationCodec::default(), "gen1", "graph XY")
            .execute()
            .await
            .expect_err("bad header");
        assert!(matches!(err, CommandError::Parse(_)));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn apply_commits_in_one_write_and_keeps_the_tag() {
        let (store, ctx, _) = generator_pipeline();
        let cache = Arc::new(RenderCache::seeded(&store.snapshot(&did("d1")).expect("diagram")));
        let ctx = ctx.with_cache(cache.clone());
        CreatePreviewCommand::new(ctx.clone(), NotationCodec::default(), sid("gen1"), CHECKOUT)
            .execute()
            .await
            .expect("create");
        store.clear_calls();

        let mut apply = ApplyPreviewCommand::new(ctx, "gen1");
        apply.execute().await.expect("apply");
        assert_eq!(store.calls().len(), 1);

        let diagram = store.snapshot(&did("d1")).expect("diagram");
        assert!(diagram.preview_group("gen1").is_empty());
        assert_eq!(PreviewStage::observe(&diagram, "gen1"), PreviewStage::Applied);
        assert!(cache.mirrors(&diagram));

        apply.undo().await.expect("undo");
        let undone = store.snapshot(&did("d1")).expect("diagram");
        assert_eq!(undone.preview_group("gen1").shapes.len(), 3);
        assert!(cache.mirrors(&undone));
    }

    #[tokio::test]
    async fn applying_a_sequence_preview_normalizes_every_lifeline() {
        let generator =
            Shape::new(sid("gen1"), kinds::GENERATOR, Bounds::new(600.0, 0.0, 200.0, 100.0));
        let diagram = Diagram::with_entities(
            did("seq"),
            DiagramKind::Sequence,
            [lifeline("existing", 0.0, 150.0), generator],
            [],
        )
        .expect("diagram");
        let (store, ctx) = setup(diagram);
        let codec = NotationCodec::default();

        CreatePreviewCommand::new(
            ctx.clone(),
            codec,
            sid("gen1"),
            "sequenceDiagram\n  A->>+B: call\n  B-->>-A: done\n  A-)B: ping\n",
        )
        .execute()
        .await
        .expect("create");
        let mut apply =
            ApplyPreviewCommand::new(ctx, "gen1").with_geometry(*codec.sequence_geometry());
        apply.execute().await.expect("apply");

        let applied = store.snapshot(&did("seq")).expect("diagram");
        let heights = applied
            .shapes()
            .values()
            .filter(|s| s.kind() == kinds::LIFELINE)
            .map(|s| s.size().height())
            .collect::<Vec<_>>();
        assert_eq!(heights.len(), 3);
        assert!(heights.windows(2).all(|w| w[0] == w[1]));
        assert!(heights[0] >= codec.sequence_geometry().min_height);

        let callee = applied.shape(&sid("gen1:p:B")).expect("B");
        assert_eq!(callee.data()[ACTIVATIONS_KEY].as_array().map(Vec::len), Some(1));

        apply.undo().await.expect("undo");
        let undone = store.snapshot(&did("seq")).expect("diagram");
        assert_eq!(undone.shape(&sid("existing")).expect("existing").size().height(), 150.0);
        assert_eq!(undone.preview_group("gen1").shapes.len(), 2);
    }

    #[tokio::test]
    async fn discard_removes_the_group_and_undo_restores_it() {
        let (store, ctx, _) = generator_pipeline();
        CreatePreviewCommand::new(ctx.clone(), NotationCodec::default(), sid("gen1"), CHECKOUT)
            .execute()
            .await
            .expect("create");
        let created = store.snapshot(&did("d1")).expect("diagram");

        let mut discard = DiscardPreviewCommand::new(ctx, "gen1");
        discard.execute().await.expect("discard");
        let diagram = store.snapshot(&did("d1")).expect("diagram");
        assert_eq!(PreviewStage::observe(&diagram, "gen1"), PreviewStage::Discarded);
        assert_eq!(diagram.shapes().len(), 1);

        discard.undo().await.expect("undo");
        let restored = store.snapshot(&did("d1")).expect("diagram");
        assert_eq!(restored.shapes(), created.shapes());
        assert_eq!(restored.connectors(), created.connectors());
    }

    #[tokio::test]
    async fn missing_group_is_reported() {
        let (_, ctx, _) = generator_pipeline();
        let err =
            DiscardPreviewCommand::new(ctx.clone(), "nope").execute().await.expect_err("none");
        assert_eq!(err, CommandError::PreviewGroupNotFound { tag: "nope".to_owned() });
        let err = ApplyPreviewCommand::new(ctx, "nope").execute().await.expect_err("none");
        assert_eq!(err, CommandError::PreviewGroupNotFound { tag: "nope".to_owned() });
    }

    fn suggestion_diagram() -> Diagram {
        let suggestion =
            Shape::new(sid("s1"), kinds::SUGGESTION, Bounds::new(300.0, 0.0, 100.0, 50.0));
        Diagram::with_entities(
            did("d1"),
            DiagramKind::Flowchart,
            [rect("a", 0.0, 0.0), rect("b", 0.0, 100.0), suggestion],
            [edge("c1", "s1", "a"), edge("c2", "a", "b")],
        )
        .expect("diagram")
    }

    #[tokio::test]
    async fn reject_deletes_connector_then_shape_and_undo_re_adds_both() {
        let (store, ctx) = setup(suggestion_diagram());
        let before = store.snapshot(&did("d1")).expect("diagram");

        let mut reject = RejectSuggestionCommand::new(ctx, sid("s1"));
        reject.execute().await.expect("reject");
        let calls = store.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], StoreCall::Delete { connectors, .. } if connectors.len() == 1));
        assert!(matches!(&calls[1], StoreCall::Delete { shapes, .. } if shapes == &[sid("s1")]));

        reject.undo().await.expect("undo");
        let after = store.snapshot(&did("d1")).expect("diagram");
        assert_eq!(after.shapes(), before.shapes());
        assert_eq!(after.connectors(), before.connectors());
    }

    #[tokio::test]
    async fn reject_refuses_non_suggestions() {
        let (_, ctx) = setup(suggestion_diagram());
        let err = RejectSuggestionCommand::new(ctx, sid("a")).execute().await.expect_err("kind");
        assert!(matches!(err, CommandError::WrongShapeKind { ref actual, .. } if actual == "rect"));
    }

    #[tokio::test]
    async fn reject_stops_when_the_connector_delete_fails() {
        let (store, ctx) = setup(suggestion_diagram());
        store.fail_write(1);
        let err = RejectSuggestionCommand::new(ctx, sid("s1")).execute().await.expect_err("fail");
        assert!(matches!(err, CommandError::Store(StoreError::Unavailable { .. })));
        let diagram = store.diagram(&did("d1")).await.expect("diagram");
        assert!(diagram.shape(&sid("s1")).is_some());
    }

    #[tokio::test]
    async fn reject_refuses_suggestions_with_incoming_connectors() {
        let suggestion =
            Shape::new(sid("s2"), kinds::SUGGESTION, Bounds::new(300.0, 200.0, 100.0, 50.0));
        let diagram = Diagram::with_entities(
            did("d2"),
            DiagramKind::Flowchart,
            [rect("a", 0.0, 0.0), suggestion],
            [edge("c1", "a", "s2")],
        )
        .expect("diagram");
        let (store, ctx) = setup(diagram);
        let err = RejectSuggestionCommand::new(ctx, sid("s2")).execute().await.expect_err("in");
        assert_eq!(err, CommandError::AmbiguousSuggestion { shape_id: sid("s2"), connectors: 1 });
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn create_leaves_both_generator_and_preview_when_the_delete_fails() {
        let (store, ctx, _) = generator_pipeline();
        let manager = CommandManager::default();
        store.fail_write(2);

        let command =
            CreatePreviewCommand::new(ctx, NotationCodec::default(), sid("gen1"), CHECKOUT);
        let result = manager.execute(Box::new(command), &did("d1")).await;
        assert!(matches!(result, Err(CommandError::Store(StoreError::Unavailable { .. }))));

        let diagram = store.snapshot(&did("d1")).expect("diagram");
        assert!(diagram.shape(&sid("gen1")).is_some());
        assert_eq!(diagram.preview_group("gen1").shapes.len(), 3);
        assert_eq!(PreviewStage::observe(&diagram, "gen1"), PreviewStage::Preview);
        assert!(!manager.can_undo(&did("d1")).await);
    }

    #[tokio::test]
    async fn replace_leaves_an_empty_tag_when_the_add_fails() {
        let (store, ctx, _) = generator_pipeline();
        let manager = CommandManager::default();
        let create =
            CreatePreviewCommand::new(ctx.clone(), NotationCodec::default(), sid("gen1"), CHECKOUT);
        manager.execute(Box::new(create), &did("d1")).await.expect("create");
        store.fail_write(2);

        let replace = ReplacePreviewCommand::new(
            ctx,
            NotationCodec::default(),
            "gen1",
            "flowchart TD\n  start[Start] --> stop[Stop]\n",
        );
        let result = manager.execute(Box::new(replace), &did("d1")).await;
        assert!(matches!(result, Err(CommandError::Store(StoreError::Unavailable { .. }))));

        let diagram = store.snapshot(&did("d1")).expect("diagram");
        assert!(diagram.preview_group("gen1").is_empty());
        assert_eq!(PreviewStage::observe(&diagram, "gen1"), PreviewStage::Discarded);
        assert_eq!(diagram.shapes().len(), 1);
        let log = manager.log(&did("d1"));
        assert_eq!(log.lock().await.undo_descriptions(), vec!["Generate preview from gen1"]);
    }

    #[tokio::test]
    async fn reject_keeps_the_shape_when_its_delete_fails() {
        let (store, ctx) = setup(suggestion_diagram());
        let manager = CommandManager::default();
        store.fail_write(2);

        let reject = RejectSuggestionCommand::new(ctx, sid("s1"));
        let result = manager.execute(Box::new(reject), &did("d1")).await;
        assert!(matches!(result, Err(CommandError::Store(StoreError::Unavailable { .. }))));

        let diagram = store.snapshot(&did("d1")).expect("diagram");
        assert!(diagram.shape(&sid("s1")).is_some());
        assert!(diagram.connectors_touching(&sid("s1")).is_empty());
        assert_eq!(diagram.connectors().len(), 1);
        assert!(!manager.can_undo(&did("d1")).await);
    }

    #[tokio::test]
    async fn pipeline_picks_create_then_replace() {
        let (store, _, pipeline) = generator_pipeline();
        assert_eq!(pipeline.stage("gen1").await.expect("stage"), PreviewStage::Generator);

        let mut create = pipeline.generate(&sid("gen1"), CHECKOUT).await.expect("create");
        assert!(create.description().starts_with("Generate"));
        create.execute().await.expect("execute");
        assert_eq!(pipeline.stage("gen1").await.expect("stage"), PreviewStage::Preview);

        let replace = pipeline.generate(&sid("gen1"), CHECKOUT).await.expect("replace");
        assert!(replace.description().starts_with("Regenerate"));

        pipeline.apply("gen1").await.expect("apply").execute().await.expect("execute");
        assert_eq!(pipeline.stage("gen1").await.expect("stage"), PreviewStage::Applied);

        let Err(err) = pipeline.discard("gen1").await else {
            panic!("discard after apply must be refused");
        };
        assert!(matches!(
            err,
            CommandError::InvalidTransition {
                stage: PreviewStage::Applied,
                action: PreviewAction::Discard,
                ..
            }
        ));
        let Err(err) = pipeline.generate(&sid("gen1"), CHECKOUT).await else {
            panic!("generate after apply must be refused");
        };
        assert!(matches!(err, CommandError::InvalidTransition { .. }));
        assert!(store.snapshot(&did("d1")).expect("diagram").check_invariants().is_ok());
    }
}
