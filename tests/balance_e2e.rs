//! End-to-end dry-run balance scenario: two member directories, one overfull, one underfull,
//! wired up through the pool model, walker and transfer worker exactly the way the coordinator
//! uses them (but without going through mergerfs discovery, which needs a real mount).

use std::fs;
use std::path::PathBuf;

use mergerfs_balance::transfer::TransferWorker;
use mergerfs_balance::types::{DriveStats, TransferStatus};
use mergerfs_balance::walker::{WalkFilter, Walker};

fn write_file(path: &std::path::Path, size: usize) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, vec![0u8; size]).unwrap();
}

#[test]
fn dry_run_moves_a_file_from_overfull_to_underfull_member() {
    let root = tempfile::tempdir().unwrap();
    let member_a = root.path().join("a");
    let member_b = root.path().join("b");
    fs::create_dir_all(&member_a).unwrap();
    fs::create_dir_all(&member_b).unwrap();

    write_file(&member_a.join("movie.mkv"), 2_000_000);
    write_file(&member_a.join("notes.txt"), 10);

    // PoolModel::new reads live filesystem stats, which on a test runner reflects whatever
    // disk the tempdir lives on rather than a deliberately skewed pool; the pool model's own
    // over/underfull logic is exercised with synthetic stats in src/pool/mod.rs's unit tests.
    // This test drives the rest of the pipeline (filtered walk -> worker) directly.
    let stats_a = DriveStats {
        path: member_a.clone(),
        total_bytes: 10_000_000,
        used_bytes: 9_000_000,
        free_bytes: 1_000_000,
    };
    let stats_b = DriveStats {
        path: member_b.clone(),
        total_bytes: 10_000_000,
        used_bytes: 1_000_000,
        free_bytes: 9_000_000,
    };
    assert!(stats_a.usage_percent() > stats_b.usage_percent());

    let filter = WalkFilter {
        include: vec!["*.mkv".to_string()],
        ..Default::default()
    };
    let mut walker = Walker::new(&member_a, filter);
    let (candidate_path, candidate_size) = walker.next().expect("movie.mkv should be found");
    assert_eq!(candidate_path.file_name().unwrap(), "movie.mkv");
    assert_eq!(candidate_size, 2_000_000);
    assert!(walker.next().is_none(), "notes.txt must be excluded by the include filter");

    let dest_path = member_b.join("movie.mkv");
    let worker = TransferWorker::new(
        candidate_path.clone(),
        dest_path.clone(),
        member_a.clone(),
        candidate_size,
        true, // dry run: no filesystem side effects
    );
    let result = worker.run();
    assert_eq!(result.status, TransferStatus::Completed);
    assert_eq!(result.bytes_transferred, candidate_size);
    assert!(candidate_path.exists(), "dry run must leave the source file in place");
    assert!(!dest_path.exists(), "dry run must not create the destination file");
}

#[test]
fn live_transfer_moves_the_file_and_cleans_up_the_now_empty_source_directory() {
    let root = tempfile::tempdir().unwrap();
    let member_a = root.path().join("a");
    let member_b = root.path().join("b");
    let nested = member_a.join("movies/action");
    write_file(&nested.join("film.bin"), 1024);

    let source = nested.join("film.bin");
    let dest = member_b.join("movies/action/film.bin");

    // Exercises the real rsync path only when the binary is present in the sandbox; skip
    // gracefully everywhere else rather than failing CI on a missing external tool.
    if which_rsync().is_none() {
        return;
    }

    let worker = TransferWorker::new(source.clone(), dest.clone(), member_a.clone(), 1024, false);
    let result = worker.run();
    assert_eq!(result.status, TransferStatus::Completed);
    assert!(dest.exists());
    assert!(!source.exists());
    assert!(!member_a.join("movies/action").exists());
    assert!(!member_a.join("movies").exists());
    assert!(member_a.exists(), "the member root itself must survive cleanup");
}

fn which_rsync() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join("rsync"))
        .find(|p| p.is_file())
}
