//! A write that the file system refuses must leave no trace in the log.
//!
//! The file-size limit is process wide, so this file holds a single test.

#![cfg(all(feature = "persistent", target_os = "linux"))]

use std::fs;
use std::sync::Arc;

use entitystore::{
    open_storage, props, Entity, EntityConfig, KeySpec, PropertyType, ScanOptions, SetupOptions,
};
use tempfile::tempdir;

fn task_entity(dir: &std::path::Path) -> Entity {
    let storage = open_storage(dir, None).unwrap();
    let entity = Entity::configure(
        EntityConfig::new("taskId", KeySpec::constant("task"))
            .property("taskId", PropertyType::String)
            .property("workerType", PropertyType::String),
    )
    .unwrap();
    entity
        .setup(SetupOptions::new("tasks", "queue", Arc::new(storage)))
        .unwrap();
    entity
}

fn set_file_size_limit(limit: libc::rlimit) {
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_FSIZE, &limit) };
    assert_eq!(rc, 0, "setrlimit failed");
}

#[test]
fn test_refused_append_is_not_replayed() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("entities.wal");

    {
        let entity = task_entity(dir.path());
        entity
            .create(&props! { "taskId" => "T1", "workerType" => "w" }, false)
            .unwrap();
        let size = fs::metadata(&wal_path).unwrap().len();

        let mut saved = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        unsafe {
            libc::signal(libc::SIGXFSZ, libc::SIG_IGN);
            assert_eq!(libc::getrlimit(libc::RLIMIT_FSIZE, &mut saved), 0);
        }
        set_file_size_limit(libc::rlimit {
            rlim_cur: size + 8,
            rlim_max: saved.rlim_max,
        });

        let err = entity
            .create(&props! { "taskId" => "ghost", "workerType" => "w" }, false)
            .unwrap_err();
        set_file_size_limit(saved);

        assert!(err.is_retryable());
        assert_eq!(err.code(), Some("08006"));
        assert!(entity.load(&props! { "taskId" => "ghost" }).unwrap().is_none());
        assert_eq!(fs::metadata(&wal_path).unwrap().len(), size);

        entity
            .create(&props! { "taskId" => "T2", "workerType" => "w" }, false)
            .unwrap();
    }

    let entity = task_entity(dir.path());
    assert!(entity.load(&props! { "taskId" => "ghost" }).unwrap().is_none());
    let page = entity.scan(None, &ScanOptions::new()).unwrap();
    assert_eq!(page.records.len(), 2);
}
