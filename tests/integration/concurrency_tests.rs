use std::{fs, sync::Arc, thread, time::Duration};

use shdefs::{
    oracle::{builtin, Verdict},
    store::lock::LockStrategy,
    DefinitionKind, DefinitionStore, StoreConfig,
};
use tempfile::tempdir;

const WRITERS: usize = 8;
const PER_WRITER: usize = 5;

fn hammer(strategy: LockStrategy, kind: DefinitionKind) -> shdefs::Result<()> {
    let tmp = tempdir()?;
    let config = StoreConfig::in_dir(tmp.path())
        .with_lock_timeout(Duration::from_secs(30))
        .with_lock_strategy(strategy);
    let store = Arc::new(DefinitionStore::open(config));

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let store = Arc::clone(&store);
            thread::spawn(move || -> shdefs::Result<()> {
                for n in 0..PER_WRITER {
                    let name = format!("w{writer}_{n}");
                    let body = match kind {
                        DefinitionKind::Alias => format!("echo {name}"),
                        DefinitionKind::Function => format!("    echo \"{{ {name} }}\""),
                    };
                    store.add(&name, &body, kind)?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread panicked")?;
    }

    let mut names = store.list(kind)?;
    assert_eq!(names.len(), WRITERS * PER_WRITER, "a concurrent write was lost");
    names.sort();
    names.dedup();
    assert_eq!(names.len(), WRITERS * PER_WRITER, "a record was written twice");

    let content = fs::read_to_string(store.path(kind))?;
    assert_eq!(builtin::check(&content, kind), Verdict::Valid);
    if kind == DefinitionKind::Alias {
        assert_eq!(content.lines().count(), WRITERS * PER_WRITER);
    }
    assert!(!tmp.path().join(format!("{}.lock", kind.file_name())).exists());
    Ok(())
}

#[test]
fn concurrent_alias_adds_are_serialized() -> shdefs::Result<()> {
    hammer(LockStrategy::Auto, DefinitionKind::Alias)
}

#[test]
fn concurrent_function_adds_are_serialized() -> shdefs::Result<()> {
    hammer(LockStrategy::Auto, DefinitionKind::Function)
}

#[test]
fn token_strategy_serializes_writers_too() -> shdefs::Result<()> {
    hammer(LockStrategy::Token, DefinitionKind::Alias)
}
