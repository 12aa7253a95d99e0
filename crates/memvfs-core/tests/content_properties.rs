// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use memvfs_core::{Identity, Vfs, VfsConfig};
use memvfs_test_utils::logged_test;
use proptest::prelude::*;

fn user_vfs() -> Vfs {
    Vfs::new(VfsConfig::default().with_identity(Identity::new(1000, 1000)))
}

#[logged_test]
fn write_past_end_pads_with_spaces() {
    let vfs = user_vfs();
    vfs.write_file("/sparse", "fourteen bytes").unwrap();
    let fd = vfs.open_str("/sparse", "r+", 0).unwrap();
    assert_eq!(vfs.write(fd, b"!!", 0, 2, Some(20)).unwrap(), 2);
    vfs.close(fd).unwrap();

    let content = vfs.read_file("/sparse").unwrap();
    logger.log(&format!("content after sparse write: {:?}", String::from_utf8_lossy(&content))).unwrap();
    assert_eq!(content.len(), 22);
    assert_eq!(&content[..14], b"fourteen bytes");
    assert!(content[14..20].iter().all(|&b| b == 0x20));
    assert_eq!(&content[20..], b"!!");
}

proptest! {
    #[test]
    fn positional_write_reads_back(
        initial in proptest::collection::vec(any::<u8>(), 0..64),
        data in proptest::collection::vec(any::<u8>(), 1..32),
        position in 0u64..96,
    ) {
        let vfs = user_vfs();
        vfs.write_file("/f", &initial).unwrap();
        let fd = vfs.open_str("/f", "r+", 0).unwrap();

        prop_assert_eq!(vfs.write(fd, &data, 0, data.len(), Some(position)).unwrap(), data.len());
        let mut buf = vec![0u8; data.len()];
        prop_assert_eq!(vfs.read(fd, &mut buf, 0, data.len(), Some(position)).unwrap(), data.len());
        prop_assert_eq!(&buf, &data);
        vfs.close(fd).unwrap();
    }

    #[test]
    fn gap_before_write_is_filled_with_spaces(
        initial_len in 0usize..48,
        data in proptest::collection::vec(any::<u8>(), 1..16),
        position in 0usize..96,
    ) {
        let vfs = user_vfs();
        let initial = vec![b'x'; initial_len];
        vfs.write_file("/f", &initial).unwrap();
        let fd = vfs.open_str("/f", "r+", 0).unwrap();
        vfs.write(fd, &data, 0, data.len(), Some(position as u64)).unwrap();
        vfs.close(fd).unwrap();

        let content = vfs.read_file("/f").unwrap();
        prop_assert_eq!(content.len(), initial_len.max(position + data.len()));
        if position > initial_len {
            prop_assert!(content[initial_len..position].iter().all(|&b| b == b' '));
        }
        prop_assert_eq!(&content[position..position + data.len()], &data[..]);
        prop_assert_eq!(vfs.stat("/f").unwrap().size, content.len() as u64);
    }

    #[test]
    fn cursor_writes_accumulate(chunks in proptest::collection::vec(
        proptest::collection::vec(any::<u8>(), 0..16), 0..8,
    )) {
        let vfs = user_vfs();
        let fd = vfs.open_str("/log", "w", 0o644).unwrap();
        for chunk in &chunks {
            vfs.write(fd, chunk, 0, chunk.len(), None).unwrap();
        }
        vfs.close(fd).unwrap();
        prop_assert_eq!(vfs.read_file("/log").unwrap(), chunks.concat());
    }
}
