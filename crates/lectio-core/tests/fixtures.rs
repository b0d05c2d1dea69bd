use lectio_core::{
    BlockBody, Document, REFERENCE_SENTINEL, ReferenceSource, diagram::LABEL_MAX_CHARS,
    repair_deterministic,
};
use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

fn list_fixture_lessons() -> Vec<PathBuf> {
    let dir = workspace_root().join("fixtures").join("lessons");
    let mut out: Vec<PathBuf> = std::fs::read_dir(&dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|e| e == "json"))
                .collect()
        })
        .unwrap_or_default();
    out.sort();
    out
}

fn load(path: &Path) -> Document {
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()));
    Document::from_json(&text).unwrap_or_else(|err| panic!("failed to parse {}: {err}", path.display()))
}

#[test]
fn fixture_lessons_repair_idempotently() {
    let fixtures = list_fixture_lessons();
    assert!(!fixtures.is_empty(), "no fixtures under fixtures/lessons");

    for path in fixtures {
        let original = load(&path);
        let once = repair_deterministic(original.clone());
        assert_eq!(
            once.document.blocks.len(),
            original.blocks.len(),
            "{}: repair must keep every block",
            path.display()
        );

        let twice = repair_deterministic(once.document.clone());
        assert_eq!(once.document, twice.document, "{}", path.display());

        let text = serde_json::to_string(&once.document).unwrap();
        assert_eq!(Document::from_json(&text).unwrap(), once.document, "{}", path.display());
    }
}

#[test]
fn fixture_lessons_satisfy_output_invariants() {
    for path in list_fixture_lessons() {
        let outcome = repair_deterministic(load(&path));
        for block in &outcome.document.blocks {
            match &block.body {
                BlockBody::ReferenceList { source } => {
                    let ReferenceSource::Items(items) = source else {
                        panic!("{}: free-text references survived repair", path.display());
                    };
                    assert!(!items.is_empty());
                    for item in items {
                        assert!(item.ends_with(REFERENCE_SENTINEL));
                        assert!(!item.ends_with("<br><br><br>"));
                    }
                }
                BlockBody::Diagram { graph_source, .. } => {
                    assert!(!graph_source.contains(['→', '←', '⇒', '⇐']));
                    assert!(!graph_source.contains("```"));
                    for label in graph_source.split('[').skip(1).filter_map(|s| s.split_once(']')) {
                        assert!(label.0.trim_matches('"').chars().count() <= LABEL_MAX_CHARS);
                    }
                }
                BlockBody::Paragraph { text } | BlockBody::HighlightBox { text } => {
                    assert!(!text.contains("<div"));
                    assert!(!text.contains("<ul"));
                }
                _ => {}
            }
        }
    }
}

#[test]
fn hidrostatica_fixture_has_balanced_structure_markers() {
    let path = workspace_root()
        .join("fixtures")
        .join("lessons")
        .join("hidrostatica.json");
    let outcome = repair_deterministic(load(&path));
    let balance = &outcome.diagnostics.balance;
    assert!(balance.has_objectives);
    assert!(balance.has_required_readings);
    assert_eq!(balance.paragraph_count, 2);
    assert_eq!(balance.visual_count, 5);
    assert_eq!(outcome.diagnostics.block_warnings.len(), 1);
}
