use std::{
    fs,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use shdefs::{
    oracle::{SyntaxOracle, Verdict},
    store::backup::BackupPaths,
    DefinitionKind, DefinitionStore, Error, Severity, StoreConfig,
};
use tempfile::{tempdir, TempDir};

use DefinitionKind::{Alias, Function};

fn store() -> (TempDir, DefinitionStore) {
    let tmp = tempdir().unwrap();
    let store = DefinitionStore::open(StoreConfig::in_dir(tmp.path()));
    (tmp, store)
}

fn error_of(err: &anyhow::Error) -> &Error {
    err.downcast_ref::<Error>()
        .unwrap_or_else(|| panic!("unexpected error type: {err:#}"))
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

struct RejectEverything;

impl SyntaxOracle for RejectEverything {
    fn name(&self) -> &'static str {
        "reject"
    }

    fn validate(&self, _path: &Path, _kind: DefinitionKind) -> shdefs::Result<Verdict> {
        Ok(Verdict::Invalid("rejected for the test".into()))
    }
}

/// Accepts the candidate, then rejects the published file.
#[derive(Default)]
struct ValidOnlyOnce {
    calls: AtomicUsize,
}

impl SyntaxOracle for ValidOnlyOnce {
    fn name(&self) -> &'static str {
        "once"
    }

    fn validate(&self, _path: &Path, _kind: DefinitionKind) -> shdefs::Result<Verdict> {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(Verdict::Valid),
            _ => Ok(Verdict::Invalid("corrupted after publish".into())),
        }
    }
}

/// Accepts the candidate but deletes it, so the publishing rename fails.
struct DeletesCandidate;

impl SyntaxOracle for DeletesCandidate {
    fn name(&self) -> &'static str {
        "deletes-candidate"
    }

    fn validate(&self, path: &Path, _kind: DefinitionKind) -> shdefs::Result<Verdict> {
        fs::remove_file(path)?;
        Ok(Verdict::Valid)
    }
}

fn scratch_files(dir: &Path) -> Vec<String> {
    dir_entries(dir)
        .into_iter()
        .filter(|name| name.ends_with(".tmp"))
        .collect()
}

#[test]
fn first_add_to_an_empty_store_takes_no_backup() -> shdefs::Result<()> {
    let (tmp, store) = store();

    let report = store.add("ll", "ls -la", Alias)?;
    assert!(report.is_clean());

    assert_eq!(fs::read_to_string(store.path(Alias))?, "alias ll='ls -la'\n");
    assert_eq!(BackupPaths::for_target(&store.path(Alias)).generations(), 0);
    assert_eq!(dir_entries(tmp.path()), vec!["aliases"]);
    Ok(())
}

#[test]
fn backup_holds_the_state_before_the_mutation() -> shdefs::Result<()> {
    let (_tmp, store) = store();
    store.add("a", "1", Alias)?;

    let report = store.add("b", "2", Alias)?;
    let backups = BackupPaths::for_target(&store.path(Alias));
    assert_eq!(fs::read_to_string(&backups.current)?, "alias a='1'\n");
    assert_eq!(
        fs::read_to_string(store.path(Alias))?,
        "alias a='1'\nalias b='2'\n"
    );
    assert_eq!(report.count(Severity::Info), 1);
    Ok(())
}

#[test]
fn two_generations_track_the_last_two_mutations() -> shdefs::Result<()> {
    let (tmp, store) = store();
    for name in ["a", "b", "c"] {
        store.add(name, name, Alias)?;
    }

    let backups = BackupPaths::for_target(&store.path(Alias));
    assert_eq!(fs::read_to_string(&backups.old)?, "alias a='a'\n");
    assert_eq!(fs::read_to_string(&backups.current)?, "alias a='a'\nalias b='b'\n");
    assert_eq!(
        fs::read_to_string(store.path(Alias))?,
        "alias a='a'\nalias b='b'\nalias c='c'\n"
    );
    assert_eq!(
        dir_entries(tmp.path()),
        vec!["aliases", "aliases.bak", "aliases.bak.old"]
    );
    Ok(())
}

#[test]
fn rejected_candidate_leaves_everything_untouched() -> shdefs::Result<()> {
    let tmp = tempdir()?;
    let good = DefinitionStore::open(StoreConfig::in_dir(tmp.path()));
    good.add("greet", "    echo hi", Function)?;
    let before = fs::read(good.path(Function))?;
    let entries_before = dir_entries(tmp.path());

    let rejecting = DefinitionStore::open(StoreConfig::in_dir(tmp.path()))
        .with_oracle(Box::new(RejectEverything));
    let err = rejecting.add("bye", "    echo bye", Function).unwrap_err();
    assert!(matches!(error_of(&err), Error::SyntaxInvalid { .. }));
    let err = rejecting.remove("greet", Function).unwrap_err();
    assert!(matches!(error_of(&err), Error::SyntaxInvalid { .. }));

    assert_eq!(fs::read(good.path(Function))?, before);
    assert_eq!(dir_entries(tmp.path()), entries_before);
    Ok(())
}

#[test]
fn live_file_failing_revalidation_is_reported_not_raised() -> shdefs::Result<()> {
    let tmp = tempdir()?;
    let store = DefinitionStore::open(StoreConfig::in_dir(tmp.path()))
        .with_oracle(Box::new(ValidOnlyOnce::default()));

    let report = store.add("ll", "ls -la", Alias)?;

    assert!(report.has_critical());
    let critical = report
        .findings()
        .iter()
        .find(|f| f.severity == Severity::Critical)
        .expect("critical finding");
    assert_eq!(critical.path.as_deref(), Some(store.path(Alias).as_path()));
    assert!(critical.message.contains("corrupted after publish"));
    assert!(store.exists("ll", Alias));
    Ok(())
}

#[test]
fn insufficient_space_is_refused_before_any_file_is_created() -> shdefs::Result<()> {
    let tmp = tempdir()?;
    let store = DefinitionStore::open(StoreConfig::in_dir(tmp.path()));
    store.add("ll", "ls -la", Alias)?;
    let before = fs::read(store.path(Alias))?;

    let starved =
        DefinitionStore::open(StoreConfig::in_dir(tmp.path()).with_min_free_bytes(u64::MAX));
    let err = starved.add("la", "ls -A", Alias).unwrap_err();
    match error_of(&err) {
        Error::InsufficientDiskSpace { required, .. } => assert_eq!(*required, u64::MAX),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(fs::read(store.path(Alias))?, before);
    assert_eq!(dir_entries(tmp.path()), vec!["aliases"]);
    Ok(())
}

#[test]
fn names_are_validated_and_collisions_reported() -> shdefs::Result<()> {
    let (tmp, store) = store();

    for bad in ["", "2x", "my-alias", "a b", "x;rm"] {
        let err = store.add(bad, "true", Alias).unwrap_err();
        assert!(matches!(error_of(&err), Error::NameInvalid(_)), "{bad:?}");
    }
    assert!(dir_entries(tmp.path()).is_empty());

    store.add("ll", "ls -la", Alias)?;
    let err = store.add("ll", "ls", Alias).unwrap_err();
    assert!(matches!(error_of(&err), Error::AlreadyExists { kind: Alias, .. }));

    let err = store.remove("nope", Alias).unwrap_err();
    assert!(matches!(
        error_of(&err),
        Error::NotFound { kind: Some(Alias), .. }
    ));
    let err = store.update("nope", "x", Function).unwrap_err();
    assert!(matches!(
        error_of(&err),
        Error::NotFound { kind: Some(Function), .. }
    ));
    let err = store.get("ll", Function).unwrap_err();
    assert!(matches!(error_of(&err), Error::NotFound { .. }));
    Ok(())
}

#[test]
fn reads_return_what_was_written() -> shdefs::Result<()> {
    let (_tmp, store) = store();
    let body = "    local msg=\"{ $1 }\"\n    echo \"$msg\" # }";
    store.add("shout", body, Function)?;
    store.add("say", "echo 'hi' there", Alias)?;

    let function = store.get("shout", Function)?;
    assert_eq!(function.body, body);
    assert_eq!(function.source, format!("shout() {{\n{body}\n}}"));

    let alias = store.get("say", Alias)?;
    assert_eq!(alias.body, "echo 'hi' there");

    assert!(store.exists("say", Alias));
    assert!(!store.exists("say", Function));
    assert!(!store.exists("not-a-name", Alias));
    assert_eq!(store.kinds_of("shout"), vec![Function]);
    assert_eq!(store.list(Function)?, vec!["shout"]);
    assert_eq!(store.list(Alias)?, vec!["say"]);
    Ok(())
}

#[test]
fn update_replaces_in_one_transaction() -> shdefs::Result<()> {
    let (_tmp, store) = store();
    store.add("a", "1", Alias)?;
    store.add("b", "2", Alias)?;

    store.update("a", "one", Alias)?;

    let backups = BackupPaths::for_target(&store.path(Alias));
    assert_eq!(fs::read_to_string(&backups.current)?, "alias a='1'\nalias b='2'\n");
    assert_eq!(fs::read_to_string(&backups.old)?, "alias a='1'\n");
    assert_eq!(
        fs::read_to_string(store.path(Alias))?,
        "alias b='2'\nalias a='one'\n"
    );
    Ok(())
}

#[test]
fn removing_a_function_keeps_its_neighbours() -> shdefs::Result<()> {
    let (_tmp, store) = store();
    for name in ["test", "test_func", "test_function"] {
        store.add(name, &format!("    echo {name}"), Function)?;
    }

    store.remove("test_func", Function)?;

    assert_eq!(
        fs::read_to_string(store.path(Function))?,
        "test() {\n    echo test\n}\n\ntest_function() {\n    echo test_function\n}\n"
    );
    Ok(())
}

#[test]
fn unclosed_function_is_never_removed() -> shdefs::Result<()> {
    let (tmp, store) = store();
    let content = "ok() {\n    :\n}\n\nbroken() {\n    echo never closed\n";
    fs::write(store.path(Function), content)?;

    let err = store.remove("broken", Function).unwrap_err();
    assert!(matches!(error_of(&err), Error::SyntaxInvalid { .. }));
    assert_eq!(fs::read_to_string(store.path(Function))?, content);
    assert_eq!(dir_entries(tmp.path()), vec!["functions"]);
    Ok(())
}

#[test]
fn name_in_both_collections_needs_an_explicit_kind() -> shdefs::Result<()> {
    let (_tmp, store) = store();
    store.add("x", "echo alias", Alias)?;
    store.add("x", "    echo function", Function)?;
    store.add("only", "true", Alias)?;

    let err = store.resolve_kind("x", None).unwrap_err();
    assert!(matches!(error_of(&err), Error::Ambiguous(name) if name == "x"));
    assert_eq!(store.resolve_kind("x", Some(Function))?, Function);
    assert_eq!(store.resolve_kind("only", None)?, Alias);

    let err = store.resolve_kind("ghost", None).unwrap_err();
    assert!(matches!(error_of(&err), Error::NotFound { kind: None, .. }));
    Ok(())
}

#[cfg(unix)]
#[test]
fn file_mode_survives_a_rewrite() -> shdefs::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let (_tmp, store) = store();
    store.add("a", "1", Alias)?;
    let mode = |path: &Path| fs::metadata(path).map(|m| m.permissions().mode() & 0o777);
    assert_eq!(mode(&store.path(Alias))?, 0o644);

    fs::set_permissions(store.path(Alias), fs::Permissions::from_mode(0o600))?;
    store.add("b", "2", Alias)?;
    assert_eq!(mode(&store.path(Alias))?, 0o600);
    Ok(())
}

#[test]
fn failed_backup_rotation_aborts_before_the_target_is_touched() -> shdefs::Result<()> {
    let (tmp, store) = store();
    store.add("a", "1", Alias)?;
    store.add("b", "2", Alias)?;
    let before = fs::read(store.path(Alias))?;

    // An old generation that cannot be discarded.
    let backups = BackupPaths::for_target(&store.path(Alias));
    fs::create_dir(&backups.old)?;
    fs::write(backups.old.join("pinned"), "x")?;

    let err = store.add("c", "3", Alias).unwrap_err();
    assert!(matches!(error_of(&err), Error::BackupFailed { .. }));
    assert_eq!(shdefs::exit_code_for(&err), 12);

    assert_eq!(fs::read(store.path(Alias))?, before);
    assert_eq!(fs::read_to_string(&backups.current)?, "alias a='1'\n");
    assert!(scratch_files(tmp.path()).is_empty());
    assert_eq!(
        dir_entries(tmp.path()),
        vec!["aliases", "aliases.bak", "aliases.bak.old"]
    );
    Ok(())
}

#[test]
fn failed_publish_names_the_backup_and_leaves_the_target_intact() -> shdefs::Result<()> {
    let tmp = tempdir()?;
    let good = DefinitionStore::open(StoreConfig::in_dir(tmp.path()));
    good.add("ll", "ls -la", Alias)?;
    let before = fs::read(good.path(Alias))?;

    let sabotaged =
        DefinitionStore::open(StoreConfig::in_dir(tmp.path())).with_oracle(Box::new(DeletesCandidate));
    let err = sabotaged.add("la", "ls -A", Alias).unwrap_err();

    let backup = BackupPaths::for_target(&good.path(Alias)).current;
    match error_of(&err) {
        Error::PublishFailed { backup: named, .. } => {
            assert_eq!(named.as_deref(), Some(backup.display().to_string().as_str()))
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains(&backup.display().to_string()));
    assert_eq!(shdefs::exit_code_for(&err), 11);

    assert_eq!(fs::read(good.path(Alias))?, before);
    assert_eq!(fs::read(&backup)?, before);
    assert!(scratch_files(tmp.path()).is_empty());
    assert!(!tmp.path().join("aliases.lock").exists());
    Ok(())
}

#[test]
fn unreadable_file_is_an_io_error_not_a_missing_name() -> shdefs::Result<()> {
    let (_tmp, store) = store();
    fs::create_dir(store.path(Alias))?;

    let err = store.remove("ll", Alias).unwrap_err();
    assert!(matches!(error_of(&err), Error::Io(_)), "got {err:#}");
    Ok(())
}
