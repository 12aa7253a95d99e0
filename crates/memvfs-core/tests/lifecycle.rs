// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Node and descriptor lifetimes across links, renames and closes

use std::collections::HashMap;

use memvfs_core::{ErrorKind, Fd, Identity, OpenFlags, Vfs, VfsBuilder, VfsConfig, R_OK};
use memvfs_test_utils::{logged_assert_eq, logged_test};

fn user_vfs() -> Vfs {
    Vfs::new(VfsConfig::default().with_identity(Identity::new(1000, 1000)))
}

#[logged_test]
fn link_then_unlink_original_keeps_content() {
    let vfs = user_vfs();
    vfs.write_file("/original", "payload").unwrap();
    assert_eq!(vfs.stat("/original").unwrap().nlink, 1);

    vfs.link("/original", "/alias").unwrap();
    logged_assert_eq!(vfs.stat("/alias").unwrap().nlink, 2);

    vfs.unlink("/original").unwrap();
    logged_assert_eq!(vfs.stat("/alias").unwrap().nlink, 1);
    assert!(!vfs.exists("/original"));
    assert_eq!(vfs.read_file("/alias").unwrap(), b"payload");
}

#[logged_test]
fn unlinked_file_lives_until_last_close() {
    let vfs = user_vfs();
    let baseline = vfs.node_count();
    vfs.write_file("/scratch", "still here").unwrap();
    let fd = vfs.open("/scratch", OpenFlags::READ_ONLY, 0).unwrap();

    vfs.unlink("/scratch").unwrap();
    assert!(!vfs.exists("/scratch"));
    assert_eq!(vfs.node_count(), baseline + 1);
    assert_eq!(vfs.fstat(fd).unwrap().nlink, 0);

    let mut buf = [0u8; 10];
    assert_eq!(vfs.read(fd, &mut buf, 0, 10, None).unwrap(), 10);
    assert_eq!(&buf, b"still here");

    vfs.close(fd).unwrap();
    assert_eq!(vfs.node_count(), baseline);
    assert_eq!(vfs.open_descriptors(), 0);
}

#[logged_test]
fn rename_over_file_reclaims_replaced_node() {
    let vfs = user_vfs();
    vfs.write_file("/new", "new").unwrap();
    vfs.write_file("/old", "old").unwrap();
    let before = vfs.node_count();

    vfs.rename("/new", "/old").unwrap();
    assert_eq!(vfs.node_count(), before - 1);
    assert_eq!(vfs.read_file("/old").unwrap(), b"new");
    assert!(!vfs.exists("/new"));
}

#[logged_test]
fn closed_descriptor_is_ebadf_everywhere() {
    let vfs = user_vfs();
    let fd = vfs.open_str("/f", "w+", 0o644).unwrap();
    vfs.close(fd).unwrap();

    let mut buf = [0u8; 1];
    for err in [
        vfs.close(fd).unwrap_err(),
        vfs.read(fd, &mut buf, 0, 1, None).unwrap_err(),
        vfs.write(fd, b"x", 0, 1, None).unwrap_err(),
        vfs.fstat(fd).unwrap_err(),
        vfs.fsync(fd).unwrap_err(),
        vfs.ftruncate(fd, 0).unwrap_err(),
    ] {
        assert_eq!(err.kind, ErrorKind::BadDescriptor);
        assert_eq!(err.path, None);
    }
    assert_eq!(vfs.close(Fd(999)).unwrap_err().syscall, "close");

    // numbers are never handed out twice
    let next = vfs.open_str("/f", "r", 0).unwrap();
    assert_eq!(next.0, fd.0 + 1);
}

#[logged_test]
fn realpath_with_and_without_cache_agree() {
    let vfs = VfsBuilder::new()
        .identity(Identity::new(1000, 1000))
        .file("/data/real/file.txt", "x")
        .symlink("/data/real", "/shortcut")
        .symlink("../shortcut/file.txt", "/links/rel")
        .build()
        .unwrap();

    let plain = vfs.realpath("/links/rel", None).unwrap();
    assert_eq!(plain, "/data/real/file.txt");

    let mut cache = HashMap::new();
    let cached = vfs.realpath("/links/rel", Some(&mut cache)).unwrap();
    assert_eq!(cached, plain);
    logger.log_json("realpath cache", &cache).unwrap();
    assert_eq!(cache.get("/shortcut").map(String::as_str), Some("/data/real"));

    // a seeded prefix is trusted without touching the tree
    let mut seeded = HashMap::from([("/virtual".to_string(), "/data/real".to_string())]);
    assert_eq!(
        vfs.realpath("/virtual/file.txt", Some(&mut seeded)).unwrap(),
        "/data/real/file.txt"
    );
    assert_eq!(vfs.realpath("/virtual/file.txt", None).unwrap_err().kind, ErrorKind::NotFound);
}

#[logged_test]
fn symlink_cycles_are_eloop() {
    let vfs = user_vfs();
    vfs.symlink("/b", "/a").unwrap();
    vfs.symlink("/a", "/b").unwrap();

    assert_eq!(vfs.stat("/a").unwrap_err().kind, ErrorKind::Loop);
    assert_eq!(vfs.open_str("/a", "r", 0).unwrap_err().kind, ErrorKind::Loop);
    let err = vfs.realpath("/a", None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Loop);
    assert_eq!(err.syscall, "realpath");
    // the links themselves are still inspectable
    assert!(vfs.lstat("/a").unwrap().is_symlink());
    assert_eq!(vfs.readlink("/b").unwrap(), "/a");
}

#[logged_test]
fn capability_bits_ignore_ownership_class() {
    let vfs = user_vfs();
    vfs.write_file("/group_read", "").unwrap();
    vfs.write_file("/owner_exec", "").unwrap();
    vfs.chmod("/group_read", 0o040).unwrap();
    vfs.chmod("/owner_exec", 0o100).unwrap();

    vfs.access("/group_read", R_OK).unwrap();
    assert_eq!(vfs.access("/owner_exec", R_OK).unwrap_err().kind, ErrorKind::AccessDenied);
    vfs.open("/group_read", OpenFlags::READ_ONLY, 0).unwrap();
    assert_eq!(
        vfs.open("/owner_exec", OpenFlags::READ_ONLY, 0).unwrap_err().kind,
        ErrorKind::AccessDenied
    );
}
