use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tempfile::tempdir;
use time::{Date, Month};

use exception_archiver::{ArchiveContainer, ArchiveOutcome, Archiver, ArchiverConfig, FixedClock};

const BASE_SECS: u64 = 1_700_000_000;
const DAY_NS: u64 = 86_400 * 1_000_000_000;

fn write_record(dir: &Path, name: &str, body: &str, mtime_secs: u64) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, body)?;
    File::options()
        .write(true)
        .open(&path)?
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime_secs))?;
    Ok(path)
}

struct Fixture {
    _temp: tempfile::TempDir,
    live: PathBuf,
    archive: PathBuf,
    clock: Arc<FixedClock>,
    archiver: Archiver,
}

fn fixture(keep: usize, threshold: usize) -> Result<Fixture> {
    let temp = tempdir()?;
    let live = temp.path().join("live");
    let archive = temp.path().join("archive");
    fs::create_dir(&live)?;

    let mut config = ArchiverConfig::new(&live);
    config.archive_path = Some(archive.clone());
    config.keep_count = keep;
    config.archive_threshold = threshold;
    let date = Date::from_calendar_date(2026, Month::January, 24)?;
    let clock = Arc::new(FixedClock::at_date(date));
    let archiver = Archiver::with_clock(config, clock.clone())?;
    Ok(Fixture {
        _temp: temp,
        live,
        archive,
        clock,
        archiver,
    })
}

fn entry_names(container: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = ArchiveContainer::new(container)
        .entries()?
        .into_iter()
        .map(|e| e.name)
        .collect();
    names.sort();
    Ok(names)
}

fn archived(outcome: ArchiveOutcome) -> exception_archiver::ArchiveReport {
    match outcome {
        ArchiveOutcome::Archived(report) => report,
        other => panic!("expected archiving, got {other:?}"),
    }
}

#[test]
fn same_day_passes_share_one_container() -> Result<()> {
    let fx = fixture(2, 0)?;
    write_record(&fx.live, "a.txt", "a", BASE_SECS + 1)?;
    write_record(&fx.live, "b.txt", "b", BASE_SECS + 2)?;
    write_record(&fx.live, "c.txt", "c", BASE_SECS + 3)?;
    let first = archived(fx.archiver.maybe_archive()?);

    fx.clock.advance(DAY_NS / 2);
    write_record(&fx.live, "d.txt", "d", BASE_SECS + 4)?;
    let second = archived(fx.archiver.maybe_archive()?);

    assert_eq!(first.container, second.container);
    assert_eq!(entry_names(&first.container)?, ["a.txt", "b.txt"]);
    let container = ArchiveContainer::new(&first.container);
    assert_eq!(container.read_entry("a.txt")?, b"a");
    assert_eq!(container.read_entry("b.txt")?, b"b");
    Ok(())
}

#[test]
fn next_day_starts_a_new_container() -> Result<()> {
    let fx = fixture(1, 0)?;
    write_record(&fx.live, "a.txt", "a", BASE_SECS + 1)?;
    write_record(&fx.live, "b.txt", "b", BASE_SECS + 2)?;
    archived(fx.archiver.maybe_archive()?);

    fx.clock.advance(DAY_NS);
    write_record(&fx.live, "c.txt", "c", BASE_SECS + 3)?;
    archived(fx.archiver.maybe_archive()?);

    assert_eq!(
        entry_names(&fx.archive.join("exceptions-20260124.zip"))?,
        ["a.txt"]
    );
    assert_eq!(
        entry_names(&fx.archive.join("exceptions-20260125.zip"))?,
        ["b.txt"]
    );
    let dates: Vec<String> = fx
        .archiver
        .layout()
        .containers()?
        .iter()
        .map(|c| c.date.to_string())
        .collect();
    assert_eq!(dates, ["2026-01-24", "2026-01-25"]);
    Ok(())
}

#[test]
fn record_left_behind_by_failed_delete_is_not_stored_twice() -> Result<()> {
    let fx = fixture(1, 0)?;
    write_record(&fx.live, "a.txt", "alpha", BASE_SECS + 1)?;
    write_record(&fx.live, "b.txt", "bravo", BASE_SECS + 2)?;
    let first = archived(fx.archiver.maybe_archive()?);
    let size_after_first = fs::metadata(&first.container)?.len();

    // As if the earlier pass had stored a.txt but died before removing it.
    write_record(&fx.live, "a.txt", "alpha", BASE_SECS + 1)?;
    let second = archived(fx.archiver.maybe_archive()?);

    assert_eq!(second.entries.len(), 1);
    assert!(second.entries[0].reused);
    assert_eq!(second.entries[0].entry_name, "a.txt");
    assert!(!fx.live.join("a.txt").exists());
    assert_eq!(entry_names(&first.container)?, ["a.txt"]);
    assert_eq!(fs::metadata(&first.container)?.len(), size_after_first);
    Ok(())
}

#[test]
fn same_name_with_new_content_is_kept_alongside() -> Result<()> {
    let fx = fixture(1, 0)?;
    write_record(&fx.live, "a.txt", "first", BASE_SECS + 1)?;
    write_record(&fx.live, "z.txt", "newest", BASE_SECS + 10)?;
    let first = archived(fx.archiver.maybe_archive()?);

    write_record(&fx.live, "a.txt", "second", BASE_SECS + 2)?;
    let second = archived(fx.archiver.maybe_archive()?);

    assert_eq!(second.entries[0].entry_name, "a~1.txt");
    assert!(!second.entries[0].reused);
    let container = ArchiveContainer::new(&first.container);
    assert_eq!(container.read_entry("a.txt")?, b"first");
    assert_eq!(container.read_entry("a~1.txt")?, b"second");
    Ok(())
}

#[test]
fn unreadable_container_keeps_records_live() -> Result<()> {
    let fx = fixture(1, 0)?;
    fs::create_dir(&fx.archive)?;
    let container = fx.archive.join("exceptions-20260124.zip");
    fs::write(&container, b"garbage")?;
    write_record(&fx.live, "a.txt", "a", BASE_SECS + 1)?;
    write_record(&fx.live, "b.txt", "b", BASE_SECS + 2)?;

    let err = fx.archiver.maybe_archive().unwrap_err();
    assert!(matches!(err, exception_archiver::Error::Archive { .. }));
    assert!(fx.live.join("a.txt").exists());
    assert!(fx.live.join("b.txt").exists());
    assert_eq!(fs::read(&container)?, b"garbage");
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn unreadable_record_keeps_progress_made_before_it() -> Result<()> {
    use std::time::UNIX_EPOCH;

    let fx = fixture(0, 0)?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    write_record(&fx.live, "newer.txt", "n", now + 3600)?;
    // Opens fine, but every read fails with EIO.
    std::os::unix::fs::symlink("/proc/self/mem", fx.live.join("bad.txt"))?;
    write_record(&fx.live, "older.txt", "o", BASE_SECS)?;

    let listed: Vec<String> = fx
        .archiver
        .live_records()?
        .iter()
        .map(|r| r.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(listed, ["newer.txt", "bad.txt", "older.txt"]);

    let err = fx.archiver.maybe_archive().unwrap_err();
    assert!(err.to_string().contains("bad.txt"));
    assert!(!fx.live.join("newer.txt").exists());
    assert!(fx.live.join("bad.txt").exists());
    assert!(fx.live.join("older.txt").exists());
    let container = fx.archive.join("exceptions-20260124.zip");
    assert_eq!(entry_names(&container)?, ["newer.txt"]);

    // The next pass stops at the same record without storing anything twice.
    assert!(fx.archiver.maybe_archive().is_err());
    assert_eq!(entry_names(&container)?, ["newer.txt"]);
    assert!(fx.live.join("older.txt").exists());
    Ok(())
}
