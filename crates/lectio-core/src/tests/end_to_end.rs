use crate::*;
use futures::executor::block_on;
use serde_json::json;

fn mixed_lesson() -> Document {
    Document::from_value(&json!({
        "generalTitle": "Hidrostática",
        "blocks": [
            { "kind": "paragraph", "text": "<div>bad</div> and <strong>good" },
            { "kind": "diagram", "diagramKind": "flow", "graphSource": "graph TD\nA[Pressure (P/y)] → B[Height]" },
            { "kind": "referenceList", "title": "Referências", "texto": "[1] Foo, B. Fluid Mechanics." }
        ]
    }))
    .unwrap()
}

#[test]
fn deterministic_repair_fixes_every_sub_format() {
    let outcome = repair_deterministic(mixed_lesson());
    let blocks = &outcome.document.blocks;
    assert_eq!(blocks.len(), 3);

    let BlockBody::Paragraph { text } = &blocks[0].body else {
        panic!("expected paragraph, got {:?}", blocks[0].body);
    };
    assert!(!text.contains("<div>"));
    assert_eq!(text, "bad and <strong>good</strong>");

    let BlockBody::Diagram { graph_source, .. } = &blocks[1].body else {
        panic!("expected diagram, got {:?}", blocks[1].body);
    };
    assert!(graph_source.contains("-->"));
    assert!(!graph_source.contains('→'));
    assert!(graph_source.contains("A[Pressure]"));

    let value = serde_json::to_value(&blocks[2]).unwrap();
    let items = value["itens"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].as_str().unwrap().ends_with(REFERENCE_SENTINEL));
    assert!(value.get("texto").is_none());
}

#[test]
fn repair_without_assistant_is_deterministic_only() {
    let outcome = block_on(Repairer::default().repair(mixed_lesson()));
    assert_eq!(
        outcome.diagnostics.mode,
        RepairMode::DeterministicOnly {
            reason: "assist transport failed: no assistant configured".to_string()
        }
    );
    assert_eq!(outcome.document, repair_deterministic(mixed_lesson()).document);
}

#[test]
fn repair_is_idempotent_on_its_own_output() {
    let once = repair_deterministic(mixed_lesson());
    let twice = repair_deterministic(once.document.clone());
    assert_eq!(once.document, twice.document);
    assert_eq!(once.diagnostics.balance, twice.diagnostics.balance);
}

#[test]
fn diagnostics_flag_a_thin_lesson() {
    let outcome = repair_deterministic(mixed_lesson());
    let diag = &outcome.diagnostics;
    assert_eq!(diag.balance.paragraph_count, 1);
    assert_eq!(diag.balance.visual_count, 1);
    assert!(diag
        .balance_warnings
        .contains(&BalanceWarning::TooFewParagraphs { count: 1, minimum: 8 }));
    assert!(diag.balance_warnings.contains(&BalanceWarning::MissingObjectives));
    assert!(diag.block_warnings.is_empty());
}

#[test]
fn document_order_is_preserved() {
    let outcome = repair_deterministic(mixed_lesson());
    let kinds: Vec<&str> = outcome.document.blocks.iter().map(Block::kind_name).collect();
    assert_eq!(kinds, ["paragraph", "diagram", "referenceList"]);
}
