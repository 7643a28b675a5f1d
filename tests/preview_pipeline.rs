// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use serde_json::json;
use tessera::command::{
    PreviewPipeline, PreviewStage, RefreshActivationsCommand, RejectSuggestionCommand,
};
use tessera::model::{kinds, Bounds};
use tessera::{
    Command, CommandContext, CommandManager, Connector, ConnectorId, Diagram, DiagramId,
    DiagramKind, EngineConfig, GraphStore, MemoryStore, Shape, ShapeId,
};

const CHECKOUT: &str = r#"flowchart LR
  %% generated
  cart[Cart] --> pay{Pay?}
  pay -->|yes| done(Done)
  pay -.-> cart
"#;

const REGENERATED: &str = "flowchart TD\n  cart[Cart] --> done[Done]\n";

fn did(value: &str) -> DiagramId {
    DiagramId::new(value).expect("diagram id")
}

fn sid(value: &str) -> ShapeId {
    ShapeId::new(value).expect("shape id")
}

fn generator_diagram(kind: DiagramKind) -> Diagram {
    let bounds = Bounds::new(400.0, 80.0, 240.0, 120.0);
    let generator = Shape::new(sid("gen"), kinds::GENERATOR, bounds)
        .with_data(json!({ "prompt": "checkout", "generation": { "status": "building" } }));
    Diagram::with_entities(did("board"), kind, [generator], []).expect("diagram")
}

fn engine(diagram: Diagram) -> (Arc<MemoryStore>, PreviewPipeline, CommandManager) {
    let config = EngineConfig::from_toml_str("history_depth = 20").expect("config");
    let store = Arc::new(MemoryStore::with_diagram(diagram));
    let ctx = CommandContext::new(store.clone(), did("board"));
    (store, PreviewPipeline::from_config(ctx, &config), CommandManager::from_config(&config))
}

#[tokio::test]
async fn generate_regenerate_apply_and_undo_everything() {
    let (store, pipeline, manager) = engine(generator_diagram(DiagramKind::Flowchart));
    let scope = did("board");
    assert_eq!(pipeline.stage("gen").await.expect("stage"), PreviewStage::Building);

    let create = pipeline.generate(&sid("gen"), CHECKOUT).await.expect("create");
    manager.execute(create, &scope).await.expect("create preview");
    let diagram = store.diagram(&scope).await.expect("diagram");
    let group = diagram.preview_group("gen");
    assert_eq!((group.shapes.len(), group.connectors.len()), (3, 3));
    assert!(diagram.shape(&sid("gen")).is_none());

    let replace = pipeline.generate(&sid("gen"), REGENERATED).await.expect("replace");
    manager.execute(replace, &scope).await.expect("replace preview");
    let diagram = store.diagram(&scope).await.expect("diagram");
    let group = diagram.preview_group("gen");
    assert_eq!((group.shapes.len(), group.connectors.len()), (2, 1));
    let origin = diagram.bounds_of(&group.shapes).expect("bounds").origin();
    assert_eq!((origin.x(), origin.y()), (400.0, 80.0));

    manager.execute(pipeline.apply("gen").await.expect("apply"), &scope).await.expect("apply");
    let applied = store.diagram(&scope).await.expect("diagram");
    assert_eq!(PreviewStage::observe(&applied, "gen"), PreviewStage::Applied);

    let codec = EngineConfig::default().codec();
    let exported = codec
        .export(applied.shapes().values(), applied.connectors().values())
        .expect("export");
    assert_eq!(exported.metadata.node_ids.len(), 2);
    let reimported = codec.import(&exported.syntax).expect("exported text re-imports");
    assert_eq!(reimported.shapes().len(), 2);
    assert_eq!(reimported.connectors().len(), 1);

    while manager.undo(&scope).await.expect("undo") {}
    let restored = store.diagram(&scope).await.expect("diagram");
    assert_eq!(restored.shapes(), generator_diagram(DiagramKind::Flowchart).shapes());
    assert!(restored.connectors().is_empty());

    while manager.redo(&scope).await.expect("redo") {}
    let redone = store.diagram(&scope).await.expect("diagram");
    assert_eq!(redone.shapes(), applied.shapes());
    assert_eq!(redone.connectors(), applied.connectors());
}

#[tokio::test]
async fn sequence_previews_commit_with_fresh_activations() {
    let (store, pipeline, manager) = engine(generator_diagram(DiagramKind::Sequence));
    let scope = did("board");
    let text = "sequenceDiagram
  participant Web
  participant Api
  Web->>+Api: checkout
  Api-->>-Web: ok
";

    let create = pipeline.generate(&sid("gen"), text).await.expect("create");
    manager.execute(create, &scope).await.expect("create preview");
    manager.execute(pipeline.apply("gen").await.expect("apply"), &scope).await.expect("apply");

    let diagram = store.diagram(&scope).await.expect("diagram");
    let api = diagram.shape(&sid("gen:p:Api")).expect("api lifeline");
    assert!(!api.is_preview());
    assert_eq!(api.data()["activations"].as_array().map(Vec::len), Some(1));

    let mut refresh = RefreshActivationsCommand::new(CommandContext::new(store.clone(), scope));
    refresh.execute().await.expect("refresh");
    assert_eq!(refresh.changed(), 0);
}

#[tokio::test]
async fn rejected_suggestions_come_back_on_undo() {
    let anchor = Shape::new(sid("svc"), kinds::RECT, Bounds::new(0.0, 0.0, 160.0, 60.0));
    let suggestion =
        Shape::new(sid("idea"), kinds::SUGGESTION, Bounds::new(240.0, 0.0, 160.0, 60.0));
    let link_id = ConnectorId::new("link").expect("connector id");
    let link = Connector::new(link_id, sid("idea"), sid("svc"));
    let diagram = Diagram::with_entities(
        did("board"),
        DiagramKind::Architecture,
        [anchor, suggestion],
        [link],
    )
    .expect("diagram");
    let store = Arc::new(MemoryStore::with_diagram(diagram.clone()));
    let manager = CommandManager::default();
    let scope = did("board");

    let ctx = CommandContext::new(store.clone(), scope.clone());
    let command = RejectSuggestionCommand::new(ctx, sid("idea"));
    manager.execute(Box::new(command), &scope).await.expect("reject");
    let after = store.diagram(&scope).await.expect("diagram");
    assert_eq!(after.shapes().len(), 1);
    assert!(after.connectors().is_empty());

    assert!(manager.undo(&scope).await.expect("undo"));
    let restored = store.diagram(&scope).await.expect("diagram");
    assert_eq!(restored.shapes(), diagram.shapes());
    assert_eq!(restored.connectors(), diagram.connectors());
}
