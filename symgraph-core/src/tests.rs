//! Comprehensive test suite for symgraph-core.

use crate::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn unit(path: &str, hash: &str, line_count: usize, nodes: Vec<AstNode>) -> SourceUnit {
    SourceUnit::new(FileMeta::new(path, hash), FileAst::new(line_count, nodes))
}

fn engine() -> Engine {
    Engine::new(SymgraphConfig::default()).unwrap()
}

fn full_pass(units: &[SourceUnit]) -> Snapshot {
    engine()
        .full_pass(1, units, &mut ExtractionCache::new(), &CancellationToken::new())
        .unwrap()
}

fn coordinator(parser: &Arc<InMemoryParser>) -> SyncCoordinator {
    SyncCoordinator::new(engine(), parser.clone())
}

fn dead_names(snapshot: &Snapshot) -> Vec<(&str, DeadCodeStatus)> {
    snapshot
        .analysis
        .dead_code
        .iter()
        .map(|d| (d.name.as_str(), d.status))
        .collect()
}

/// Every cycle closes after `length` hops over live, non-stale edges.
fn assert_cycles_close(snapshot: &Snapshot) {
    let edges: BTreeSet<(&str, &str)> = snapshot
        .graph
        .dependency_edges
        .iter()
        .filter(|e| !e.stale)
        .map(|e| (e.from_path.as_str(), e.to_path.as_str()))
        .collect();
    for cycle in &snapshot.analysis.cycles {
        assert_eq!(cycle.hops().count(), cycle.length);
        for hop in cycle.hops() {
            assert!(edges.contains(&hop), "cycle {} uses missing edge {:?}", cycle, hop);
        }
    }
}

/// Symbols reported `dead` have no incoming usage edge and are not entry points.
fn assert_dead_is_unused(snapshot: &Snapshot) {
    let entry: BTreeSet<SymbolId> = snapshot
        .analysis
        .entry_points
        .iter()
        .map(|e| e.symbol_id)
        .collect();
    for item in &snapshot.analysis.dead_code {
        if item.status != DeadCodeStatus::Dead {
            continue;
        }
        assert!(!entry.contains(&item.symbol_id));
        assert!(
            !snapshot
                .graph
                .usage_edges
                .iter()
                .any(|e| e.target == item.symbol_id && e.source != item.symbol_id),
            "{} is dead but used",
            item.qualified_name
        );
    }
}

// Scenario A: mutual imports form exactly one cycle
#[test]
fn test_two_file_cycle() {
    let snap = full_pass(&[
        unit(
            "a.py",
            "1",
            3,
            vec![
                AstNode::import_names(".b", &["g"], 1),
                AstNode::function("f", 2, 3).exported(),
            ],
        ),
        unit(
            "b.py",
            "2",
            3,
            vec![
                AstNode::import_names(".a", &["f"], 1),
                AstNode::function("g", 2, 3).exported(),
            ],
        ),
    ]);

    assert_eq!(snap.analysis.cycles.len(), 1);
    let cycle = &snap.analysis.cycles[0];
    assert_eq!(cycle.files, vec!["a.py", "b.py"]);
    assert_eq!(cycle.length, 2);
    assert_cycles_close(&snap);

    let circular = snap
        .analysis
        .import_issues
        .iter()
        .filter(|i| i.kind == ImportIssueKind::Circular)
        .count();
    assert_eq!(circular, 2);
    assert!(snap
        .analysis
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::CycleDetected));
}

// Scenario B: three independent ifs give cyclomatic complexity 4
#[test]
fn test_cyclomatic_complexity_of_three_ifs() {
    let snap = full_pass(&[unit(
        "calc.py",
        "1",
        10,
        vec![AstNode::function("classify", 1, 10).exported().with_children(vec![
            AstNode::branch(NodeKind::If, 2, 3),
            AstNode::branch(NodeKind::If, 4, 5),
            AstNode::branch(NodeKind::If, 6, 7),
        ])],
    )]);

    let report = &snap.analysis.complexity[0];
    assert_eq!(report.name, "classify");
    assert_eq!(report.cyclomatic, 4);
    assert_eq!(report.cyclomatic_grade, Grade::A);
    let symbol = &snap.graph.symbols[&report.symbol_id];
    assert_eq!(symbol.cyclomatic_complexity, Some(4));
}

// Scenario C: dead, dead in production, and test files never reported
#[test]
fn test_dead_code_statuses() {
    let snap = full_pass(&[
        unit(
            "app.py",
            "1",
            8,
            vec![
                AstNode::function("main", 1, 3).exported(),
                AstNode::function("_helper", 5, 8),
            ],
        ),
        unit("util.py", "2", 3, vec![AstNode::function("_only_in_tests", 1, 3)]),
        unit(
            "tests/test_util.py",
            "3",
            5,
            vec![
                AstNode::import_names("util", &["_only_in_tests"], 1),
                AstNode::function("test_it", 2, 5)
                    .with_children(vec![AstNode::call("_only_in_tests", 3)]),
                AstNode::function("_fixture", 5, 5),
            ],
        ),
    ]);

    let dead = dead_names(&snap);
    assert_eq!(
        dead,
        vec![
            ("_helper", DeadCodeStatus::Dead),
            ("_only_in_tests", DeadCodeStatus::DeadInProduction),
        ]
    );
    let helper = &snap.analysis.dead_code[0];
    assert!(helper.confidence >= 0.9);
    assert_eq!(helper.reason, DeadCodeReason::Unused);
    assert!(snap
        .analysis
        .dead_code
        .iter()
        .all(|d| !d.file_path.starts_with("tests/")));
    assert_dead_is_unused(&snap);
}

// Scenario D: deleting an imported file leaves the importer with an unresolved import
#[test]
fn test_delete_imported_file() {
    let parser = Arc::new(InMemoryParser::new());
    parser.insert(
        "a.js",
        FileAst::new(
            4,
            vec![
                AstNode::import_names("./b", &["b"], 1),
                AstNode::function("a", 2, 4)
                    .exported()
                    .with_children(vec![AstNode::call("b", 3)]),
            ],
        ),
    );
    parser.insert("b.js", FileAst::new(2, vec![AstNode::function("b", 1, 2).exported()]));
    let sync = coordinator(&parser);
    let units: Vec<SourceUnit> = ["a.js", "b.js"]
        .iter()
        .map(|p| SourceUnit::new(FileMeta::new(*p, "1"), parser.parse(p).unwrap()))
        .collect();
    let first = sync.full_pass(&units, &CancellationToken::new()).unwrap();
    assert_eq!(first.graph.import_count(ImportStatus::Resolved), 1);

    sync.apply(&ChangeEvent::delete("b.js")).unwrap();
    let pending = sync.snapshot();
    assert_eq!(pending.graph.state_of("a.js"), FileState::Stale);
    assert_eq!(pending.graph.state_of("b.js"), FileState::Tombstoned);

    let snap = sync.incremental_pass().unwrap();
    assert!(snap.graph.files.contains_key("a.js"));
    assert!(!snap.graph.files.contains_key("b.js"));
    let import = snap.graph.imports_in_file("a.js").next().unwrap();
    assert_eq!(import.status, ImportStatus::Unresolved);
    assert!(snap
        .analysis
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::UnresolvedImport && i.file_path == "a.js"));
    assert!(snap
        .analysis
        .import_issues
        .iter()
        .any(|i| i.kind == ImportIssueKind::Unresolved && i.import_path == "./b"));
    assert!(snap.graph.dependency_edges.is_empty());
}

// Scenario D with an absolute Python import: the deleted module does not turn
// into an external package
#[test]
fn test_delete_absolute_import_target() {
    let parser = Arc::new(InMemoryParser::new());
    parser.insert(
        "a.py",
        FileAst::new(
            4,
            vec![
                AstNode::import_names("b", &["f"], 1),
                AstNode::function("main", 2, 4).with_children(vec![AstNode::call("f", 3)]),
            ],
        ),
    );
    parser.insert("b.py", FileAst::new(2, vec![AstNode::function("f", 1, 2)]));
    let sync = coordinator(&parser);
    let units: Vec<SourceUnit> = ["a.py", "b.py"]
        .iter()
        .map(|p| SourceUnit::new(FileMeta::new(*p, "1"), parser.parse(p).unwrap()))
        .collect();
    let first = sync.full_pass(&units, &CancellationToken::new()).unwrap();
    assert_eq!(first.graph.import_count(ImportStatus::Resolved), 1);
    assert!(first.graph.internal_modules.contains("b"));

    let outcome = sync.apply(&ChangeEvent::delete("b.py")).unwrap();
    assert_eq!(outcome.stale_files, vec!["a.py"]);

    let snap = sync.incremental_pass().unwrap();
    let import = snap.graph.imports_in_file("a.py").next().unwrap();
    assert_eq!(import.status, ImportStatus::Unresolved);
    assert!(!import.is_external);
    assert_eq!(import.package_name, None);
    assert!(snap
        .analysis
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::UnresolvedImport && i.file_path == "a.py"));
    assert!(snap
        .analysis
        .import_issues
        .iter()
        .any(|i| i.kind == ImportIssueKind::Unresolved && i.import_path == "b"));

    // A full pass over the same end state agrees
    let full = sync
        .full_pass(&units[..1], &CancellationToken::new())
        .unwrap();
    assert_eq!(full.graph, snap.graph);
    assert_eq!(full.analysis, snap.analysis);
}

// Property: full analysis is idempotent
#[test]
fn test_full_pass_idempotent() {
    let units = vec![
        unit(
            "svc.py",
            "1",
            12,
            vec![
                AstNode::class("Service", 1, 10).exported().with_children(vec![
                    AstNode::function("run", 2, 5).with_params(&["self"]).with_children(vec![
                        AstNode::call("self.step", 3),
                    ]),
                    AstNode::function("step", 6, 10).with_params(&["self"]),
                ]),
                AstNode::function("_unused", 11, 12),
            ],
        ),
        unit(
            "main.py",
            "2",
            4,
            vec![
                AstNode::import_names(".svc", &["Service"], 1),
                AstNode::call("Service", 3),
            ],
        ),
    ];
    let first = full_pass(&units);
    let second = full_pass(&units);

    assert_eq!(first.graph, second.graph);
    assert_eq!(first.analysis, second.analysis);
    assert!(first.graph.symbols.values().all(|s| !s.stale && !s.tombstoned));
    assert!(first.graph.usage_edges.iter().all(|e| !e.stale));
    assert!(first
        .graph
        .file_states
        .values()
        .all(|s| *s == FileState::Synced));
    assert_dead_is_unused(&first);
}

// Property: an incremental pass equals a full pass over the same end state
#[test]
fn test_incremental_equals_full() {
    let a_ast = FileAst::new(
        5,
        vec![
            AstNode::import_names(".b", &["shared", "old"], 1),
            AstNode::function("entry", 2, 5)
                .exported()
                .with_children(vec![AstNode::call("shared", 3), AstNode::call("old", 4)]),
        ],
    );
    let b_v1 = FileAst::new(
        6,
        vec![
            AstNode::function("shared", 1, 3),
            AstNode::function("old", 4, 6),
        ],
    );
    let b_v2 = FileAst::new(
        6,
        vec![AstNode::function("shared", 1, 3).with_children(vec![
            AstNode::branch(NodeKind::If, 2, 2),
        ])],
    );
    let c_ast = FileAst::new(
        3,
        vec![
            AstNode::import_names(".b", &["shared"], 1),
            AstNode::function("_c", 2, 3).with_children(vec![AstNode::call("shared", 3)]),
        ],
    );
    let d_ast = FileAst::new(
        3,
        vec![
            AstNode::import_names(".a", &["entry"], 1),
            AstNode::function("_d", 2, 3),
        ],
    );

    let parser = Arc::new(InMemoryParser::new());
    parser.insert("a.py", a_ast.clone());
    parser.insert("b.py", b_v1.clone());
    parser.insert("c.py", c_ast.clone());
    let sync = coordinator(&parser);
    sync.full_pass(
        &[
            SourceUnit::new(FileMeta::new("a.py", "a1"), a_ast.clone()),
            SourceUnit::new(FileMeta::new("b.py", "b1"), b_v1),
            SourceUnit::new(FileMeta::new("c.py", "c1"), c_ast),
        ],
        &CancellationToken::new(),
    )
    .unwrap();

    parser.insert("b.py", b_v2.clone());
    parser.insert("d.py", d_ast.clone());
    parser.insert("e.py", d_ast.clone());
    let incremental = sync
        .sync(vec![
            ChangeEvent::modify("b.py", "b2"),
            ChangeEvent::create("d.py", "d1"),
            ChangeEvent::delete("c.py"),
            ChangeEvent::moved("d.py", "e.py", "d1"),
        ])
        .unwrap();

    let full = full_pass(&[
        SourceUnit::new(FileMeta::new("a.py", "a1"), a_ast),
        SourceUnit::new(FileMeta::new("b.py", "b2"), b_v2),
        SourceUnit::new(FileMeta::new("e.py", "d1"), d_ast),
    ]);

    assert_eq!(incremental.graph, full.graph);
    assert_eq!(incremental.analysis, full.analysis);
    assert!(incremental
        .analysis
        .issues
        .iter()
        .any(|i| i.message.contains("old")));
    let run = incremental.last_run.as_ref().unwrap();
    assert_eq!(run.trigger, RunTrigger::Incremental);
    assert_eq!(run.files_deleted, 2);
}

// Edge case: empty repository
#[test]
fn test_empty_repository() {
    let snap = full_pass(&[]);
    assert!(snap.is_empty());
    let summary = Query::new(&snap).summary();
    assert_eq!(summary.files, 0);
    assert_eq!(summary.symbols, 0);
    assert!(summary.issues_by_kind.is_empty());
    assert!(snap.analysis.dead_code.is_empty());
    assert!(snap.analysis.cycles.is_empty());

    let parser = Arc::new(InMemoryParser::new());
    let sync = coordinator(&parser);
    let after = sync.sync(Vec::new()).unwrap();
    assert!(after.is_empty());
    assert_eq!(after.version, 1);
}

// Self import closes a cycle of length 1
#[test]
fn test_self_import_cycle() {
    let snap = full_pass(&[unit(
        "loop.ts",
        "1",
        2,
        vec![
            AstNode::import_names("./loop", &["x"], 1),
            AstNode::variable("x", 2).exported(),
        ],
    )]);
    assert_eq!(snap.analysis.cycles.len(), 1);
    assert_eq!(snap.analysis.cycles[0].length, 1);
    assert_cycles_close(&snap);
}

// Snapshot diff across an incremental update
#[test]
fn test_diff_between_versions() {
    let parser = Arc::new(InMemoryParser::new());
    parser.insert("m.py", FileAst::new(2, vec![AstNode::function("f", 1, 2).exported()]));
    let sync = coordinator(&parser);
    let v1 = sync.sync(vec![ChangeEvent::create("m.py", "1")]).unwrap();

    parser.insert(
        "m.py",
        FileAst::new(
            4,
            vec![
                AstNode::function("f", 1, 3).exported(),
                AstNode::function("g", 4, 4).exported(),
            ],
        ),
    );
    let v2 = sync.sync(vec![ChangeEvent::modify("m.py", "2")]).unwrap();

    let diff = Query::new(&v2).diff_since(&v1);
    assert_eq!(diff.added_symbols.len(), 1);
    assert_eq!(diff.changed_symbols.len(), 1);
    assert!(diff.removed_symbols.is_empty());
    assert!(v2.version > v1.version);
}

// Readers keep their version while the writer publishes new ones
#[test]
fn test_readers_see_immutable_versions() {
    let parser = Arc::new(InMemoryParser::new());
    for i in 0..8 {
        parser.insert(
            format!("m{}.py", i),
            FileAst::new(1, vec![AstNode::function("f", 1, 1).exported()]),
        );
    }
    let sync = coordinator(&parser);

    std::thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut last = 0;
            for _ in 0..200 {
                let snap = sync.snapshot();
                assert!(snap.version >= last);
                assert_eq!(snap.graph.files.len(), snap.extracts.len());
                last = snap.version;
            }
        });
        for i in 0..8 {
            sync.apply(&ChangeEvent::create(&format!("m{}.py", i), "1"))
                .unwrap();
        }
        reader.join().unwrap();
    });

    let snap = sync.incremental_pass().unwrap();
    assert_eq!(snap.graph.files.len(), 8);
    assert_eq!(snap.graph.stale_file_count(), 0);
}

// Resource exhaustion leaves the published snapshot in place
#[test]
fn test_resource_exhaustion_keeps_prior_snapshot() {
    let config = SymgraphConfig {
        limits: config::LimitConfig {
            max_symbols: 1,
            ..config::LimitConfig::default()
        },
        ..SymgraphConfig::default()
    };
    let parser = Arc::new(InMemoryParser::new());
    parser.insert(
        "m.py",
        FileAst::new(2, vec![AstNode::function("f", 1, 1), AstNode::function("g", 2, 2)]),
    );
    let sync = SyncCoordinator::new(Engine::new(config).unwrap(), parser.clone());
    sync.apply(&ChangeEvent::create("m.py", "1")).unwrap();
    let before = sync.snapshot();

    let err = sync.incremental_pass().unwrap_err();
    assert!(err.is_fatal_for_run());
    assert!(Arc::ptr_eq(&before, &sync.snapshot()));
}
