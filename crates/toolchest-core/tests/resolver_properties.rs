//! Plan-shape properties over generated catalogs, plus catalog loading and
//! validation from JSON documents.

use std::collections::{BTreeMap, HashMap, HashSet};

use toolchest_core::{
    CatalogError, DependencyResolver, InstallMethod, InstallRef, InstallationOptions,
    InstallationRecord, ToolCatalog, ToolConfig,
};

/// Small deterministic generator so failures reproduce by seed.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

/// Random DAG: tool `t{i}` may depend on any `t{j}` with `j < i`.
/// Declaration order is shuffled so it does not line up with the edges.
fn generated_catalog(seed: u64, size: usize) -> ToolCatalog {
    let mut rng = Lcg(seed);
    let mut tools: Vec<ToolConfig> = (0..size)
        .map(|i| {
            let deps: Vec<String> = (0..i)
                .filter(|_| rng.below(4) == 0)
                .map(|j| format!("t{j}"))
                .collect();
            ToolConfig::new(format!("t{i}"), InstallRef::command(["true"])).with_dependencies(deps)
        })
        .collect();
    for i in (1..tools.len()).rev() {
        let j = rng.below(i as u64 + 1) as usize;
        tools.swap(i, j);
    }
    ToolCatalog::new(tools, vec![]).unwrap()
}

fn closure(catalog: &ToolCatalog, roots: &[String]) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut stack: Vec<String> = roots.to_vec();
    while let Some(id) = stack.pop() {
        if seen.insert(id.clone()) {
            stack.extend(catalog.lookup(&id).unwrap().dependencies.iter().cloned());
        }
    }
    seen
}

#[test]
fn test_plans_are_topological_layered_and_complete() {
    for seed in 1..=40u64 {
        let catalog = generated_catalog(seed, 18);
        let mut rng = Lcg(seed ^ 0xdead_beef);
        let request: Vec<String> = (0..3).map(|_| format!("t{}", rng.below(18))).collect();

        let plan = DependencyResolver::new(&catalog)
            .resolve(&request, &InstallationOptions::default(), &BTreeMap::new())
            .unwrap();

        let layer_of: HashMap<&str, usize> =
            plan.nodes.iter().map(|n| (n.id(), n.layer)).collect();

        let expected = closure(&catalog, &request);
        let planned: HashSet<String> = layer_of.keys().map(|s| s.to_string()).collect();
        assert_eq!(planned, expected, "seed {seed}: plan must be the closure");

        for node in &plan.nodes {
            for dep in &node.dependencies {
                assert!(
                    layer_of[dep.as_str()] < node.layer,
                    "seed {seed}: {dep} must precede {}",
                    node.id()
                );
            }
            if node.layer > 0 {
                assert!(
                    node.dependencies
                        .iter()
                        .any(|d| layer_of[d.as_str()] == node.layer - 1),
                    "seed {seed}: {} is not in its earliest layer",
                    node.id()
                );
            }
        }

        assert!(plan.layers.iter().all(|l| !l.is_empty()));
        let flattened: Vec<&str> = plan.layers.iter().flatten().map(String::as_str).collect();
        assert_eq!(flattened, plan.order(), "seed {seed}");

        for layer in &plan.layers {
            let decl: Vec<usize> = layer
                .iter()
                .map(|id| catalog.declaration_index(id).unwrap())
                .collect();
            assert!(decl.windows(2).all(|w| w[0] < w[1]), "seed {seed}: tie-break");
        }
    }
}

#[test]
fn test_installed_tools_drop_out_but_still_satisfy_dependents() {
    for seed in 1..=20u64 {
        let catalog = generated_catalog(seed, 14);
        let everything: Vec<String> = catalog.tools().iter().map(|t| t.id.clone()).collect();

        let mut rng = Lcg(seed.wrapping_mul(31));
        let installed: BTreeMap<String, InstallationRecord> = everything
            .iter()
            .filter(|_| rng.below(3) == 0)
            .map(|id| {
                (
                    id.clone(),
                    InstallationRecord::installed(id, "1.0", InstallMethod::SourceBuild),
                )
            })
            .collect();

        let plan = DependencyResolver::new(&catalog)
            .resolve(&everything, &InstallationOptions::default(), &installed)
            .unwrap();

        assert_eq!(plan.len() + plan.pre_satisfied.len(), everything.len());
        for node in &plan.nodes {
            assert!(!installed.contains_key(node.id()));
            if node.dependencies.iter().all(|d| installed.contains_key(d)) {
                assert_eq!(node.layer, 0, "seed {seed}: {} should be ready at once", node.id());
            }
        }
        for id in &plan.pre_satisfied {
            assert!(installed.contains_key(id));
        }

        let forced = DependencyResolver::new(&catalog)
            .resolve(
                &everything,
                &InstallationOptions::default().with_force(true),
                &installed,
            )
            .unwrap();
        assert_eq!(forced.len(), everything.len());
        assert!(forced.pre_satisfied.is_empty());
    }
}

const CATALOG_JSON: &str = r#"{
  "tools": [
    {
      "id": "protoc",
      "name": "Protocol Buffers compiler",
      "category": "build",
      "version": "25.1",
      "install": {
        "method": "prebuilt_binary",
        "url": "https://example.invalid/protoc-25.1",
        "sha256": "00ff"
      }
    },
    {
      "id": "buf",
      "name": "Buf",
      "category": "build",
      "dependencies": ["protoc"],
      "install": { "method": "package_manager", "manager": "go", "package": "github.com/bufbuild/buf/cmd/buf@latest" }
    },
    {
      "id": "grpcurl",
      "name": "grpcurl",
      "dependencies": ["protoc"],
      "install": {
        "method": "source_build",
        "steps": [["make", "install"]],
        "workdir": "src"
      },
      "timeout_secs": 600
    }
  ],
  "bundles": [
    { "id": "grpc", "name": "gRPC toolchain", "tools": ["buf", "grpcurl"] }
  ]
}"#;

#[test]
fn test_catalog_document_loads_with_bundles() {
    let catalog = ToolCatalog::from_json_str(CATALOG_JSON).unwrap();
    assert_eq!(catalog.tools().len(), 3);
    assert!(catalog.is_bundle("grpc"));
    assert_eq!(
        catalog.expand_request(&["grpc".to_string(), "buf".to_string()]).unwrap(),
        vec!["buf", "grpcurl"]
    );
    assert_eq!(
        catalog.lookup("protoc").unwrap().method(),
        InstallMethod::PrebuiltBinary
    );
    assert_eq!(catalog.lookup("grpcurl").unwrap().timeout_secs, Some(600));

    let plan = DependencyResolver::new(&catalog)
        .resolve(&["grpc".to_string()], &InstallationOptions::default(), &BTreeMap::new())
        .unwrap();
    assert_eq!(plan.layers, vec![vec!["protoc"], vec!["buf", "grpcurl"]]);
    assert!(!plan.node("protoc").unwrap().requested);
    assert!(plan.node("buf").unwrap().requested);

    let reparsed = ToolCatalog::from_json_str(&catalog.to_json_string().unwrap()).unwrap();
    assert_eq!(reparsed.tools(), catalog.tools());
}

#[test]
fn test_invalid_catalogs_are_rejected_at_load() {
    let unknown_dep = r#"{"tools": [
        {"id": "a", "name": "a", "dependencies": ["ghost"],
         "install": {"method": "source_build", "steps": [["true"]]}}
    ]}"#;
    assert!(matches!(
        ToolCatalog::from_json_str(unknown_dep),
        Err(CatalogError::UnknownDependency { .. })
    ));

    let cyclic = r#"{"tools": [
        {"id": "a", "name": "a", "dependencies": ["b"],
         "install": {"method": "source_build", "steps": [["true"]]}},
        {"id": "b", "name": "b", "dependencies": ["a"],
         "install": {"method": "source_build", "steps": [["true"]]}}
    ]}"#;
    match ToolCatalog::from_json_str(cyclic) {
        Err(CatalogError::CycleDetected { path }) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&"a".to_string()) && path.contains(&"b".to_string()));
        }
        other => panic!("expected cycle, got {other:?}"),
    }

    let bad_bundle = r#"{"tools": [], "bundles": [{"id": "x", "tools": ["nope"]}]}"#;
    assert!(matches!(
        ToolCatalog::from_json_str(bad_bundle),
        Err(CatalogError::UnknownBundleMember { .. })
    ));

    assert!(matches!(
        ToolCatalog::from_json_str("{ not json"),
        Err(CatalogError::Parse(_))
    ));
}

#[test]
fn test_shipped_catalog_is_valid() {
    let catalog = ToolCatalog::from_json_str(include_str!("../../../catalog/tools.json")).unwrap();
    assert_eq!(catalog.lookup("ripgrep").unwrap().binary_name(), "rg");

    let plan = DependencyResolver::new(&catalog)
        .resolve(&["starter".to_string()], &InstallationOptions::default(), &BTreeMap::new())
        .unwrap();
    assert_eq!(plan.layers[0], vec!["rustup", "jq"]);
    assert_eq!(plan.layers[1], vec!["ripgrep", "fd", "just"]);
}
