//! Asset Pack Integration Tests
//!
//! Tests for:
//! - Pack/mount/read round trip (small text entry + 1 MiB binary)
//! - OS fallback for unlisted paths
//! - Zero-entry packs
//! - Malformed pack rejection

use std::path::PathBuf;

use ember::assets::PackageFileSystem;

struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "ember_{tag}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |d| d.as_nanos())
        ));
        std::fs::create_dir_all(&path).expect("temp dir");
        Self { path }
    }

    fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

#[test]
fn pack_round_trip_preserves_contents() {
    let dir = TempDir::new("pack_rt");
    let src = dir.file("content");
    std::fs::create_dir_all(&src).expect("src dir");

    let a: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
    let b: Vec<u8> = (0..1024 * 1024u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
    std::fs::write(src.join("a.txt"), &a).expect("write a");
    std::fs::write(src.join("b.bin"), &b).expect("write b");

    let pak = dir.file("assets.pak");
    PackageFileSystem::pak_all(&pak, &src, &src).expect("pack");

    let mut vfs = PackageFileSystem::new();
    vfs.mount_pak(&pak).expect("mount");
    assert_eq!(vfs.entry_count(), 2);
    assert!(vfs.contains("a.txt"));
    assert!(vfs.contains("b.bin"));

    let loaded_a = vfs.load_file("a.txt").expect("a.txt from pack");
    assert_eq!(loaded_a.len(), 1024);
    assert_eq!(loaded_a, a);

    let loaded_b = vfs.load_file("b.bin").expect("b.bin from pack");
    assert_eq!(loaded_b, b);
}

#[test]
fn unlisted_paths_fall_through_to_the_os() {
    let dir = TempDir::new("pack_fallback");
    let src = dir.file("content");
    std::fs::create_dir_all(&src).expect("src dir");
    std::fs::write(src.join("packed.txt"), b"packed").expect("write");

    let pak = dir.file("assets.pak");
    PackageFileSystem::pak_all(&pak, &src, &src).expect("pack");

    let mut vfs = PackageFileSystem::new();
    vfs.mount_pak(&pak).expect("mount");

    // Present on disk but not in the pack.
    let loose = dir.file("loose.txt");
    std::fs::write(&loose, b"loose file").expect("write loose");
    let loaded = vfs
        .load_file(loose.to_str().expect("utf8 path"))
        .expect("loose file via OS");
    assert_eq!(loaded, b"loose file");

    // Present nowhere: the loader error surfaces.
    assert!(vfs.load_file("definitely/not/here.bin").is_err());
}

#[test]
fn zero_entry_pack_mounts_cleanly() {
    let dir = TempDir::new("pack_empty");
    let src = dir.file("empty");
    std::fs::create_dir_all(&src).expect("src dir");

    let pak = dir.file("empty.pak");
    PackageFileSystem::pak_all(&pak, &src, &src).expect("pack");

    let mut vfs = PackageFileSystem::new();
    vfs.mount_pak(&pak).expect("mount");
    assert_eq!(vfs.entry_count(), 0);
    assert!(!vfs.contains("anything"));
}

#[test]
fn wrong_magic_is_rejected() {
    let dir = TempDir::new("pack_magic");
    let bogus = dir.file("bogus.pak");
    std::fs::write(&bogus, b"PNG\x00\x00\x00\x00").expect("write");

    let mut vfs = PackageFileSystem::new();
    assert!(vfs.mount_pak(&bogus).is_err());
    assert_eq!(vfs.entry_count(), 0);
}

#[test]
fn reset_unmounts_everything() {
    let dir = TempDir::new("pack_reset");
    let src = dir.file("content");
    std::fs::create_dir_all(&src).expect("src dir");
    std::fs::write(src.join("x.bin"), b"x").expect("write");

    let pak = dir.file("assets.pak");
    PackageFileSystem::pak_all(&pak, &src, &src).expect("pack");

    let mut vfs = PackageFileSystem::new();
    vfs.mount_pak(&pak).expect("mount");
    assert_eq!(vfs.entry_count(), 1);

    vfs.reset();
    assert_eq!(vfs.entry_count(), 0);
}
