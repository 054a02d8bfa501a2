//! Integration Tests for Assembly
//!
//! These tests verify that declaration, assembly, re-assembly and overrides
//! work together correctly.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use supply_core::{
    AsNode, AssemblyConfig, Factory, FactoryConfig, Leaf, Registry, Supplied, SupplyError, SupplyState,
    SupplyWatch,
};

fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
    let count = Arc::new(AtomicI32::new(0));
    (count.clone(), count)
}

fn constant<T>(registry: &Registry, name: &str, value: T) -> Factory<T>
where
    T: Clone + Send + Sync + 'static,
{
    registry
        .declare(name)
        .unwrap()
        .as_factory(FactoryConfig::new(move |_, _| Ok(value.clone())))
        .unwrap()
}

/// Test that a member shared by two dependents is constructed once.
#[test]
fn diamond_constructs_shared_member_once() {
    let registry = Registry::new();
    let (c_count, c_clone) = counter();

    let c = registry
        .declare("c")
        .unwrap()
        .as_factory(FactoryConfig::new(move |_, _| {
            c_clone.fetch_add(1, Ordering::SeqCst);
            Ok(10i32)
        }))
        .unwrap();

    let c_dep = c.clone();
    let a = registry
        .declare("a")
        .unwrap()
        .as_factory(FactoryConfig::new(move |values, _| Ok(*values.get(&c_dep)? + 1)).requires(&c))
        .unwrap();

    let c_dep = c.clone();
    let b = registry
        .declare("b")
        .unwrap()
        .as_factory(FactoryConfig::new(move |values, _| Ok(*values.get(&c_dep)? + 2)).requires(&c))
        .unwrap();

    let (a_dep, b_dep) = (a.clone(), b.clone());
    let root = registry
        .declare("root")
        .unwrap()
        .as_factory(
            FactoryConfig::new(move |values, _| Ok(*values.get(&a_dep)? + *values.get(&b_dep)?))
                .requires(&a)
                .requires(&b),
        )
        .unwrap();

    let supply = root.assemble(Supplied::new());
    assert_eq!(*supply.unpack().unwrap(), 23);
    assert_eq!(c_count.load(Ordering::SeqCst), 1);
}

/// Test that concurrent readers of one member share a single construction.
#[test]
fn concurrent_unpack_is_single_flight() {
    let registry = Registry::new();
    let (count, count_clone) = counter();

    let slow = registry
        .declare("slow")
        .unwrap()
        .as_factory(FactoryConfig::new(move |_, _| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(20));
            Ok("built".to_string())
        }))
        .unwrap();

    let supply = slow.assemble_with(Supplied::new(), AssemblyConfig::no_prefetch());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let supply = supply.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                supply.unpack().unwrap()
            })
        })
        .collect();

    let values: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(values.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

/// Test that a node reading itself through a substitute is rejected.
#[test]
fn direct_cycle_is_rejected() {
    let registry = Registry::new();
    let a = constant(&registry, "a", 1u8);

    let err = a.mock(FactoryConfig::new(|_, _| Ok(2u8)).requires(&a)).unwrap_err();
    match err {
        SupplyError::CircularDependency { node, path } => {
            assert_eq!(node.as_str(), "a");
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected a cycle, got {other}"),
    }
}

/// Test that cycles through required dependencies are rejected.
#[test]
fn indirect_required_cycle_is_rejected() {
    let registry = Registry::new();
    let c = constant(&registry, "c", 1u8);
    let b = registry
        .declare("b")
        .unwrap()
        .as_factory(FactoryConfig::new(|_, _| Ok(2u8)).requires(&c))
        .unwrap();
    let _a = registry
        .declare("a")
        .unwrap()
        .as_factory(FactoryConfig::new(|_, _| Ok(3u8)).requires(&b))
        .unwrap();

    // c -> b -> c
    let err = c.mock(FactoryConfig::new(|_, _| Ok(4u8)).requires(&b)).unwrap_err();
    assert!(matches!(err, SupplyError::CircularDependency { .. }));
    assert!(err.to_string().contains("c -> b -> c"));
}

/// Test that assembler and optional edges count for cycle detection.
#[test]
fn indirect_assembler_and_optional_cycles_are_rejected() {
    let registry = Registry::new();
    let worker = constant(&registry, "worker", 0u8);
    let boss = registry
        .declare("boss")
        .unwrap()
        .as_factory(FactoryConfig::new(|_, _| Ok(1u8)).assembler(&worker))
        .unwrap();
    let auditor = registry
        .declare("auditor")
        .unwrap()
        .as_factory(FactoryConfig::new(|_, _| Ok(2u8)).optional(&worker))
        .unwrap();

    let via_assembler = worker.mock(FactoryConfig::new(|_, _| Ok(3u8)).requires(&boss));
    let via_optional = worker.mock(FactoryConfig::new(|_, _| Ok(4u8)).assembler(&auditor));

    assert!(matches!(via_assembler, Err(SupplyError::CircularDependency { .. })));
    assert!(matches!(via_optional, Err(SupplyError::CircularDependency { .. })));
}

/// Test that lazy members are built on first read only, across re-assembly.
#[test]
fn lazy_member_is_deferred_across_reassembly() {
    let registry = Registry::new();
    let (count, count_clone) = counter();

    let setting = registry.declare("setting").unwrap().as_leaf::<u32>();
    let report = registry
        .declare("report")
        .unwrap()
        .as_factory(
            FactoryConfig::new(move |_, _| {
                count_clone.fetch_add(1, Ordering::SeqCst);
                Ok("report".to_string())
            })
            .lazy(true),
        )
        .unwrap();
    let app = registry
        .declare("app")
        .unwrap()
        .as_factory(
            FactoryConfig::new(|_, _| Ok(()))
                .requires(&report)
                .requires(&setting),
        )
        .unwrap();

    let first = app.assemble_with(Supplied::new().with(&setting, 1), AssemblyConfig::inline());
    first.unpack().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);

    let second = first.reassemble(Supplied::new().with(&setting, 2));
    let third = second.reassemble(Supplied::new().with(&setting, 3));
    assert_eq!(count.load(Ordering::SeqCst), 0);

    let via_third = third.value_map().get(&report).unwrap();
    let via_first = first.value_map().get(&report).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&via_first, &via_third));
}

/// Test that re-assembly rebuilds the perturbed path and keeps the rest.
#[test]
fn reassembly_preserves_untouched_branches() {
    let registry = Registry::new();
    let (d_count, d_clone) = counter();

    let c = registry.declare("c").unwrap().as_leaf::<u32>();
    let c_dep = c.clone();
    let b = registry
        .declare("b")
        .unwrap()
        .as_factory(FactoryConfig::new(move |values, _| Ok(*values.get(&c_dep)? * 10)).requires(&c))
        .unwrap();
    let d = registry
        .declare("d")
        .unwrap()
        .as_factory(FactoryConfig::new(move |_, _| {
            d_clone.fetch_add(1, Ordering::SeqCst);
            Ok(7u32)
        }))
        .unwrap();
    let (b_dep, d_dep) = (b.clone(), d.clone());
    let a = registry
        .declare("a")
        .unwrap()
        .as_factory(
            FactoryConfig::new(move |values, _| Ok(*values.get(&b_dep)? + *values.get(&d_dep)?))
                .requires(&b)
                .requires(&d),
        )
        .unwrap();

    let before = a.assemble(Supplied::new().with(&c, 1));
    assert_eq!(*before.unpack().unwrap(), 17);

    let after = before.reassemble(Supplied::new().with(&c, 2));
    assert_eq!(*after.unpack().unwrap(), 27);

    let (old, new) = (before.resolved_map(), after.resolved_map());
    assert!(!after.same_as(&before));
    assert!(!new["b"].same_as(&old["b"]));
    assert!(new["d"].same_as(&old["d"]));
    assert_eq!(d_count.load(Ordering::SeqCst), 1);
}

/// Test that supplied values win over preserved ones.
#[test]
fn supplied_value_overrides_preserved_member() {
    let registry = Registry::new();
    let d = constant(&registry, "d", 1u32);
    let d_dep = d.clone();
    let a = registry
        .declare("a")
        .unwrap()
        .as_factory(FactoryConfig::new(move |values, _| Ok(*values.get(&d_dep)?)).requires(&d))
        .unwrap();

    let before = a.assemble(Supplied::new());
    assert_eq!(*before.unpack().unwrap(), 1);

    let after = before.reassemble(Supplied::new().with(&d, 99));
    assert_eq!(*after.unpack().unwrap(), 99);
    assert!(after.resolved_map()["d"].is_packed());
}

/// Test that explicitly supplying "no value" removes the old value.
#[test]
fn absent_value_is_authoritative() {
    let registry = Registry::new();
    let theme = registry.declare("theme").unwrap().as_leaf::<String>();
    let theme_dep = theme.clone();
    let page = registry
        .declare("page")
        .unwrap()
        .as_factory(
            FactoryConfig::new(move |values, _| {
                Ok(values
                    .optional(&theme_dep)?
                    .map_or_else(|| "plain".to_string(), |theme| theme.to_string()))
            })
            .optional(&theme),
        )
        .unwrap();

    let dark = page.assemble(Supplied::new().with(&theme, "dark".to_string()));
    assert_eq!(dark.unpack().unwrap().as_str(), "dark");

    let plain = dark.reassemble(Supplied::new().without(&theme));
    assert_eq!(plain.unpack().unwrap().as_str(), "plain");
    assert_eq!(plain.resolved_map()["theme"].state(), SupplyState::Absent);
}

/// `app` reads `page`, which falls back to "plain" without a theme.
fn themed_app(registry: &Registry) -> (Leaf<String>, Factory<String>, Arc<AtomicI32>) {
    let (builds, builds_inner) = counter();
    let theme = registry.declare("theme").unwrap().as_leaf::<String>();
    let theme_dep = theme.clone();
    let page = registry
        .declare("page")
        .unwrap()
        .as_factory(
            FactoryConfig::new(move |values, _| {
                builds_inner.fetch_add(1, Ordering::SeqCst);
                Ok(values
                    .optional(&theme_dep)?
                    .map_or_else(|| "plain".to_string(), |theme| theme.to_string()))
            })
            .optional(&theme),
        )
        .unwrap();
    let page_dep = page.clone();
    let app = registry
        .declare("app")
        .unwrap()
        .as_factory(FactoryConfig::new(move |values, _| Ok(format!("app:{}", values.get(&page_dep)?))).requires(&page))
        .unwrap();
    (theme, app, builds)
}

/// Test that supplying an optional value later rebuilds a nested reader.
#[test]
fn nested_optional_added_on_reassembly() {
    let registry = Registry::new();
    let (theme, app, builds) = themed_app(&registry);

    let plain = app.assemble_with(Supplied::new(), AssemblyConfig::no_prefetch());
    assert_eq!(plain.unpack().unwrap().as_str(), "app:plain");

    let dark = plain.reassemble(Supplied::new().with(&theme, "dark".to_string()));
    assert_eq!(dark.unpack().unwrap().as_str(), "app:dark");
    assert!(!dark.resolved_map()["page"].same_as(&plain.resolved_map()["page"]));
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

/// Test that removing an optional value rebuilds a nested reader.
#[test]
fn nested_optional_removed_on_reassembly() {
    let registry = Registry::new();
    let (theme, app, builds) = themed_app(&registry);

    let dark = app.assemble_with(
        Supplied::new().with(&theme, "dark".to_string()),
        AssemblyConfig::no_prefetch(),
    );
    assert_eq!(dark.unpack().unwrap().as_str(), "app:dark");

    let plain = dark.reassemble(Supplied::new().without(&theme));
    assert_eq!(plain.unpack().unwrap().as_str(), "app:plain");
    assert_eq!(builds.load(Ordering::SeqCst), 2);

    // An unrelated change keeps the rebuilt page.
    let again = plain.reassemble(Supplied::new());
    assert!(again.resolved_map()["page"].same_as(&plain.resolved_map()["page"]));
}

/// Test that packed values come back as the same allocation.
#[test]
fn leaf_round_trip_keeps_identity() {
    let registry = Registry::new();
    let shared: Leaf<Vec<u8>> = registry.declare("shared").unwrap().as_leaf();
    let number: Leaf<i64> = registry.declare("number").unwrap().as_leaf();

    let value = Arc::new(vec![1, 2, 3]);
    let unpacked = shared.pack_arc(value.clone()).unpack().unwrap();
    assert!(Arc::ptr_eq(&unpacked, &value));

    assert_eq!(*number.pack(-5).unpack().unwrap(), -5);
}

/// Test that one failing member does not poison its siblings.
#[test]
fn construction_errors_are_isolated() {
    let registry = Registry::new();
    let ok = constant(&registry, "ok", "ok".to_string());
    let broken = registry
        .declare("broken")
        .unwrap()
        .as_factory(FactoryConfig::<String>::new(|_, _| Err("E".into())))
        .unwrap();
    let root = registry
        .declare("root")
        .unwrap()
        .as_factory(
            FactoryConfig::new(|_, _| Ok("root".to_string()))
                .requires(&ok)
                .requires(&broken),
        )
        .unwrap();

    let supply = root.assemble(Supplied::new());
    assert_eq!(supply.unpack().unwrap().as_str(), "root");
    assert_eq!(supply.value_map().get(&ok).unwrap().as_str(), "ok");

    let err = supply.value_map().get(&broken).unwrap_err();
    assert_eq!(err.node(), Some("broken"));
    assert_eq!(err.user_error().unwrap().to_string(), "E");

    // Replayed, not rebuilt.
    let again = supply.value_map().get(&broken).unwrap_err();
    assert_eq!(again.to_string(), err.to_string());
}

/// Test that a dependency's failure reaches the reader unchanged.
#[test]
fn dependency_errors_pass_through_verbatim() {
    let registry = Registry::new();
    let port = registry.declare("port").unwrap().as_leaf::<u16>();
    let port_dep = port.clone();
    let server = registry
        .declare("server")
        .unwrap()
        .as_factory(FactoryConfig::new(move |values, _| Ok(*values.get(&port_dep)?)).requires(&port))
        .unwrap();
    let server_dep = server.clone();
    let app = registry
        .declare("app")
        .unwrap()
        .as_factory(FactoryConfig::new(move |values, _| Ok(*values.get(&server_dep)?)).requires(&server))
        .unwrap();

    let err = app.assemble(Supplied::new()).unpack().unwrap_err();
    assert!(matches!(err, SupplyError::MissingDependency(ref name) if name.as_str() == "port"));
}

/// Test that a hired mock replaces the original dependency.
#[test]
fn hired_mock_replaces_dependency() {
    let registry = Registry::new();
    let dep = constant(&registry, "dep", "real".to_string());
    let dep_read = dep.clone();
    let main = registry
        .declare("main")
        .unwrap()
        .as_factory(FactoryConfig::new(move |values, _| Ok(values.get(&dep_read)?.to_string())).requires(&dep))
        .unwrap();

    let fake = dep.mock(FactoryConfig::new(|_, _| Ok("mock".to_string()))).unwrap();
    let hired = main.hire([&fake]).unwrap();

    assert_eq!(hired.assemble(Supplied::new()).unpack().unwrap().as_str(), "mock");
    assert_eq!(main.assemble(Supplied::new()).unpack().unwrap().as_str(), "real");
}

/// Test that a mock's own dependencies join the hired team.
#[test]
fn hired_mock_brings_its_own_dependencies() {
    let registry = Registry::new();
    let prefix = registry.declare("prefix").unwrap().as_leaf::<String>();
    let dep = constant(&registry, "dep", "real".to_string());
    let dep_read = dep.clone();
    let main = registry
        .declare("main")
        .unwrap()
        .as_factory(FactoryConfig::new(move |values, _| Ok(values.get(&dep_read)?.to_string())).requires(&dep))
        .unwrap();

    let prefix_read = prefix.clone();
    let fake = dep
        .mock(
            FactoryConfig::new(move |values, _| Ok(format!("{}-mock", values.get(&prefix_read)?)))
                .requires(&prefix),
        )
        .unwrap();

    let supply = main
        .hire([&fake])
        .unwrap()
        .assemble(Supplied::new().with(&prefix, "test".to_string()));
    assert_eq!(supply.unpack().unwrap().as_str(), "test-mock");
}

/// Test that substitutes can be introduced during re-assembly.
#[test]
fn reassemble_with_override_swaps_branch() {
    let registry = Registry::new();
    let clock = constant(&registry, "clock", 100u64);
    let other = constant(&registry, "other", 1u64);
    let (clock_dep, other_dep) = (clock.clone(), other.clone());
    let app = registry
        .declare("app")
        .unwrap()
        .as_factory(
            FactoryConfig::new(move |values, _| Ok(*values.get(&clock_dep)? + *values.get(&other_dep)?))
                .requires(&clock)
                .requires(&other),
        )
        .unwrap();

    let before = app.assemble(Supplied::new());
    assert_eq!(*before.unpack().unwrap(), 101);

    let frozen = clock.mock(FactoryConfig::new(|_, _| Ok(0u64))).unwrap();
    let after = before.reassemble_with(Supplied::new(), [&frozen]).unwrap();

    assert_eq!(*after.unpack().unwrap(), 1);
    assert!(after.resolved_map()["other"].same_as(&before.resolved_map()["other"]));
    assert!(after.node().overrides()[0].ptr_eq(frozen.node_ref()));
}

/// Test that assemblers are built on demand and reuse the caller's members.
#[test]
fn assembler_is_built_on_demand_within_scope() {
    let registry = Registry::new();
    let (pool_count, pool_clone) = counter();

    let pool = registry
        .declare("pool")
        .unwrap()
        .as_factory(FactoryConfig::new(move |_, _| {
            pool_clone.fetch_add(1, Ordering::SeqCst);
            Ok("pool".to_string())
        }))
        .unwrap();
    let job = registry.declare("job").unwrap().as_leaf::<u32>();

    let (pool_dep, job_dep) = (pool.clone(), job.clone());
    let worker = registry
        .declare("worker")
        .unwrap()
        .as_factory(
            FactoryConfig::new(move |values, _| {
                Ok(format!("{}#{}", values.get(&pool_dep)?, values.get(&job_dep)?))
            })
            .requires(&pool)
            .requires(&job),
        )
        .unwrap();

    let worker_dep = worker.clone();
    let dispatcher = registry
        .declare("dispatcher")
        .unwrap()
        .as_factory(
            FactoryConfig::new(move |_, ctx| {
                let jobs = (1..=3)
                    .map(|n| ctx.assemble(&worker_dep, Supplied::new().with(&job, n)).unpack())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(jobs.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            })
            .requires(&pool)
            .assembler(&worker),
        )
        .unwrap();

    let supply = dispatcher.assemble(Supplied::new());
    let jobs = supply.unpack().unwrap();
    assert_eq!(*jobs, vec!["pool#1", "pool#2", "pool#3"]);
    assert_eq!(pool_count.load(Ordering::SeqCst), 1);
}

/// Test that a watch notifies only when re-assembly changes the root.
#[test]
fn watch_follows_reassembly() {
    let registry = Registry::new();
    let user = registry.declare("user").unwrap().as_leaf::<String>();
    let user_dep = user.clone();
    let banner = registry
        .declare("banner")
        .unwrap()
        .as_factory(FactoryConfig::new(move |values, _| Ok(format!("welcome {}", values.get(&user_dep)?))).requires(&user))
        .unwrap();

    let watch = SupplyWatch::new(banner.assemble(Supplied::new().with(&user, "guest".to_string())));
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    watch.subscribe(move |supply| {
        seen_clone.lock().push(supply.unpack().unwrap().to_string());
    });

    watch.reassemble(Supplied::new().with(&user, "ada".to_string()));
    assert_eq!(*seen.lock(), vec!["welcome ada".to_string()]);
}

/// Test that snapshots render as JSON.
#[test]
fn snapshot_renders_as_json() {
    let registry = Registry::new();
    let port = registry.declare("port").unwrap().as_leaf::<u16>();
    let server = registry
        .declare("server")
        .unwrap()
        .as_factory(FactoryConfig::new(|_, _| Ok(())).requires(&port))
        .unwrap();

    let supply = server.assemble_with(Supplied::new(), AssemblyConfig::no_prefetch());
    let json: serde_json::Value = serde_json::from_str(&supply.as_any().to_json().unwrap()).unwrap();

    assert_eq!(json[0]["name"], "server");
    assert_eq!(json[0]["state"], "pending");
    assert_eq!(json[1]["name"], "port");
    assert_eq!(json[1]["state"], "absent");
}
