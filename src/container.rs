//! Daily zip container.
//!
//! An append stages the whole pass in `<container>.tmp`: the current
//! container (if any) is copied there, the new entries are appended, the
//! copy is finished and synced, and only then renamed over the container.
//! Existing entries are never rewritten or dropped. A failure of the
//! container before the rename leaves it as it was; a record that cannot be
//! read ends the append with the records before it committed.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::debug;
use time::OffsetDateTime;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::enumerate::ExceptionRecord;
use crate::error::{Error, IoContext, Result};

/// An entry already stored in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub name: String,
    pub size: u64,
    pub crc32: u32,
}

/// Where a record ended up after an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedEntry {
    pub source: PathBuf,
    pub entry_name: String,
    /// An identical entry was already present, typically left behind by a
    /// pass whose delete step failed. Nothing was written for it.
    pub reused: bool,
}

/// What [`ArchiveContainer::append`] managed to store.
#[derive(Debug)]
pub struct Appended {
    /// Stored records, in input order.
    pub entries: Vec<ArchivedEntry>,
    /// Why the append stopped early. Records from this one on were not
    /// stored.
    pub stopped: Option<Error>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    size: u64,
    crc32: u32,
}

struct PlannedEntry<'a> {
    record: &'a ExceptionRecord,
    name: String,
    reused: bool,
}

#[derive(Debug, Clone)]
pub struct ArchiveContainer {
    path: PathBuf,
}

impl ArchiveContainer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Entries in central-directory order. A missing container is empty.
    pub fn entries(&self) -> Result<Vec<ContainerEntry>> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let mut archive = self.open_reader()?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive.by_index(index).map_err(|source| self.unreadable(source))?;
            entries.push(ContainerEntry {
                name: file.name().to_string(),
                size: file.size(),
                crc32: file.crc32(),
            });
        }
        Ok(entries)
    }

    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let mut archive = self.open_reader()?;
        let mut file = archive.by_name(name).map_err(|source| self.unreadable(source))?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|source| self.unreadable(ZipError::Io(source)))?;
        Ok(contents)
    }

    /// Adds records under their base names, in input order, and says which
    /// ones are now stored. Does not touch the records themselves.
    ///
    /// A base name already stored with the same size and CRC-32 is reused
    /// rather than added twice. One stored with different content gets the
    /// new record as `stem~N.ext`.
    ///
    /// A record that cannot be read stops the append: the records before it
    /// are committed as usual and the error comes back in
    /// [`Appended::stopped`]. Failures of the container itself are returned
    /// as `Err` and commit nothing.
    pub fn append(&self, records: &[ExceptionRecord]) -> Result<Appended> {
        let mut taken: HashMap<String, Fingerprint> = self
            .entries()?
            .into_iter()
            .map(|entry| {
                let fingerprint = Fingerprint {
                    size: entry.size,
                    crc32: entry.crc32,
                };
                (entry.name, fingerprint)
            })
            .collect();

        let mut plan = Vec::with_capacity(records.len());
        let mut stopped = None;
        for record in records {
            let fingerprint = match fingerprint(&record.path) {
                Ok(fingerprint) => fingerprint,
                Err(err) => {
                    stopped = Some(err);
                    break;
                }
            };
            let base = record.file_name().to_string_lossy().into_owned();
            let (name, reused) = resolve_entry_name(&taken, &base, fingerprint);
            taken.insert(name.clone(), fingerprint);
            plan.push(PlannedEntry {
                record,
                name,
                reused,
            });
        }

        if plan.iter().any(|entry| !entry.reused) {
            let (committed, write_stopped) = self.write_staged(&plan)?;
            plan.truncate(committed);
            if write_stopped.is_some() {
                stopped = write_stopped;
            }
        } else if !plan.is_empty() {
            debug!(
                "all {} records already present in {}",
                plan.len(),
                self.path.display()
            );
        }

        let entries = plan
            .into_iter()
            .map(|entry| ArchivedEntry {
                source: entry.record.path.clone(),
                entry_name: entry.name,
                reused: entry.reused,
            })
            .collect();
        Ok(Appended { entries, stopped })
    }

    /// Returns how many leading entries of `plan` are in the container.
    fn write_staged(&self, plan: &[PlannedEntry<'_>]) -> Result<(usize, Option<Error>)> {
        let tmp = tmp_path_for(&self.path)?;
        let _ = fs::remove_file(&tmp);

        let (committed, stopped) = match self.stage(&tmp, plan) {
            Ok(staged) => staged,
            Err(err) => {
                let _ = fs::remove_file(&tmp);
                return Err(err);
            }
        };
        if plan[..committed].iter().all(|entry| entry.reused) {
            let _ = fs::remove_file(&tmp);
            return Ok((committed, stopped));
        }

        fs::rename(&tmp, &self.path).io_at("rename", &tmp)?;
        if let Some(parent) = self.path.parent() {
            fsync_dir(parent)?;
        }
        Ok((committed, stopped))
    }

    fn stage(&self, tmp: &Path, plan: &[PlannedEntry<'_>]) -> Result<(usize, Option<Error>)> {
        let mut writer = self.open_staging_writer(tmp)?;
        let mut committed = plan.len();
        let mut stopped = None;
        for (index, entry) in plan.iter().enumerate() {
            if entry.reused {
                continue;
            }
            if let Some(err) = self.write_entry(&mut writer, entry)? {
                committed = index;
                stopped = Some(err);
                break;
            }
        }
        let file = writer.finish().map_err(|source| Error::ArchiveFinish {
            container: self.path.clone(),
            source,
        })?;
        file.sync_all().io_at("fsync", tmp)?;
        Ok((committed, stopped))
    }

    fn open_staging_writer(&self, tmp: &Path) -> Result<ZipWriter<File>> {
        if self.exists() {
            fs::copy(&self.path, tmp).io_at("copy", &self.path)?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(tmp)
                .io_at("open", tmp)?;
            ZipWriter::new_append(file).map_err(|source| self.unreadable(source))
        } else {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(tmp)
                .io_at("create", tmp)?;
            Ok(ZipWriter::new(file))
        }
    }

    /// `Ok(Some(err))` when the record itself could not be read. Nothing of
    /// it is left in the staged container then.
    fn write_entry(
        &self,
        writer: &mut ZipWriter<File>,
        entry: &PlannedEntry<'_>,
    ) -> Result<Option<Error>> {
        let write_err = |source: ZipError| Error::ArchiveWrite {
            container: self.path.clone(),
            entry: entry.name.clone(),
            source,
        };

        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);
        if let Some(modified) = zip_datetime(entry.record.modified) {
            options = options.last_modified_time(modified);
        }

        let mut source = match File::open(&entry.record.path).io_at("open", &entry.record.path) {
            Ok(source) => source,
            Err(err) => return Ok(Some(err)),
        };
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(write_err)?;
        if let Err(err) = io::copy(&mut source, writer) {
            writer.abort_file().map_err(write_err)?;
            return Ok(Some(write_err(ZipError::Io(err))));
        }
        Ok(None)
    }

    fn open_reader(&self) -> Result<ZipArchive<File>> {
        let file = File::open(&self.path).io_at("open", &self.path)?;
        ZipArchive::new(file).map_err(|source| self.unreadable(source))
    }

    fn unreadable(&self, source: ZipError) -> Error {
        Error::Archive {
            container: self.path.clone(),
            source,
        }
    }
}

fn resolve_entry_name(
    taken: &HashMap<String, Fingerprint>,
    base: &str,
    fingerprint: Fingerprint,
) -> (String, bool) {
    let (stem, ext) = match base.rfind('.') {
        Some(dot) if dot > 0 => base.split_at(dot),
        _ => (base, ""),
    };
    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            base.to_string()
        } else {
            format!("{stem}~{suffix}{ext}")
        };
        match taken.get(&name) {
            None => return (name, false),
            Some(existing) if *existing == fingerprint => return (name, true),
            Some(_) => suffix += 1,
        }
    }
}

fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let mut file = File::open(path).io_at("open", path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let read = file.read(&mut buf).io_at("read", path)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        size += read as u64;
    }
    Ok(Fingerprint {
        size,
        crc32: hasher.finalize(),
    })
}

fn zip_datetime(modified: SystemTime) -> Option<zip::DateTime> {
    let dt = OffsetDateTime::from(modified);
    zip::DateTime::from_date_and_time(
        u16::try_from(dt.year()).ok()?,
        dt.month() as u8,
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
    )
    .ok()
}

fn tmp_path_for(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("container has no file name: {}", path.display())))?
        .to_string_lossy();
    Ok(path.with_file_name(format!("{name}.tmp")))
}

fn fsync_dir(path: &Path) -> Result<()> {
    let dir = File::open(path).io_at("open", path)?;
    dir.sync_all().io_at("fsync", path)?;
    Ok(())
}
