use lectio_core::{Document, repair_deterministic};
use lectio_render::{DocumentRenderer, Node, html::to_html};
use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

fn fixture_lessons() -> Vec<(PathBuf, Document)> {
    let dir = workspace_root().join("fixtures").join("lessons");
    let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|e| e == "json"))
                .collect()
        })
        .unwrap_or_default();
    paths.sort();
    paths
        .into_iter()
        .map(|path| {
            let text = std::fs::read_to_string(&path)
                .unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()));
            let doc = Document::from_json(&text)
                .unwrap_or_else(|err| panic!("failed to parse {}: {err}", path.display()));
            (path, doc)
        })
        .collect()
}

#[tokio::test]
async fn repaired_fixtures_render_every_block_to_a_terminal_state() {
    let fixtures = fixture_lessons();
    assert!(!fixtures.is_empty(), "no fixtures under fixtures/lessons");

    let renderer = DocumentRenderer::default();
    for (path, doc) in fixtures {
        let repaired = repair_deterministic(doc).document;
        let tree = renderer.render(&repaired).await;
        let children = tree.children();
        assert_eq!(children.len(), repaired.blocks.len(), "{}", path.display());

        for (i, child) in children.iter().enumerate() {
            assert_eq!(child.id(), format!("block-{i}"), "{}", path.display());
            assert!(
                !matches!(child, Node::Unavailable { .. }),
                "{}: block {i} faulted",
                path.display()
            );
            if let Some(view) = child.diagram_view() {
                assert!(view.is_terminal(), "{}: block {i} left pending", path.display());
            }
        }

        let html = to_html(&tree);
        assert_eq!(html.matches("id=\"block-").count(), children.len(), "{}", path.display());
    }
}

#[test]
fn unrepaired_fixtures_still_render_totally() {
    let renderer = DocumentRenderer::default();
    for (path, doc) in fixture_lessons() {
        let tree = renderer.render_tree(&doc);
        assert_eq!(tree.children().len(), doc.blocks.len(), "{}", path.display());
    }
}
