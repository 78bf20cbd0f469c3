//! Archive assembly.
//!
//! Collects the synthesized manifest and every unit output into one tar
//! file named `<name>[-<version>]-<mode>.tar` in the output directory.
//!
//! The archive is written to a temporary file next to its destination and
//! renamed into place only after the last byte is flushed, so the final
//! name never refers to a partial archive. Entry headers are normalized so
//! identical inputs produce identical archives.

use crate::{
    compiler::{BuildMode, UnitOutput},
    layout::ProjectLayout,
    manifest::{MAIN_SCRIPT, MANIFEST_OUTPUT, PackageMetadata},
};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const ARCHIVE_EXTENSION: &str = "tar";

/// The assembler is the only writer of the output directory; one at a time.
static ASSEMBLY_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("two archive entries are both named `{0}`")]
    Collision(String),

    #[error("page `{page}` collides with the main script `main.js`")]
    ReservedPageName { page: String },

    #[error("couldn't write archive into `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Archive file name for a package and mode.
///
/// `ext` `1.2.3` prod → `ext-1.2.3-prod.tar`; without a version → `ext-prod.tar`.
pub fn archive_file_name(metadata: &PackageMetadata, mode: BuildMode) -> String {
    match &metadata.version {
        Some(version) => format!("{}-{version}-{mode}.{ARCHIVE_EXTENSION}", metadata.name),
        None => format!("{}-{mode}.{ARCHIVE_EXTENSION}", metadata.name),
    }
}

/// Reject layouts whose pages would collide with the main script.
///
/// A page named `main` is refused outright, whether or not the project has
/// a main unit, so adding one later can't silently change the archive.
pub fn check_layout_names(layout: &ProjectLayout) -> Result<(), ArchiveError> {
    let main_stem = MAIN_SCRIPT.trim_end_matches(".js");

    match layout.page_names().iter().find(|page| page.as_str() == main_stem) {
        Some(page) => Err(ArchiveError::ReservedPageName { page: page.clone() }),
        None => Ok(()),
    }
}

/// Writes archives into one output directory.
pub struct ArchiveAssembler {
    output_dir: PathBuf,
}

impl ArchiveAssembler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn archive_path(&self, metadata: &PackageMetadata, mode: BuildMode) -> PathBuf {
        self.output_dir.join(archive_file_name(metadata, mode))
    }

    /// Write `manifest.json` followed by every unit (and its map, if any),
    /// in the given order, and return the archive path.
    ///
    /// # Errors
    /// Name collisions are detected before anything is written. I/O
    /// failures leave no file under the final name.
    pub fn assemble(
        &self,
        manifest: &[u8],
        units: &[UnitOutput],
        mode: BuildMode,
        metadata: &PackageMetadata,
    ) -> Result<PathBuf, ArchiveError> {
        let entries = collect_entries(manifest, units)?;
        let path = self.archive_path(metadata, mode);

        let _guard = ASSEMBLY_LOCK.lock();
        self.write_atomically(&path, &entries)?;

        Ok(path)
    }

    fn write_atomically(&self, path: &Path, entries: &[(String, &[u8])]) -> Result<(), ArchiveError> {
        let io_err = |source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        };

        fs::create_dir_all(&self.output_dir).map_err(io_err)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".extpack-")
            .suffix(".tmp")
            .tempfile_in(&self.output_dir)
            .map_err(io_err)?;

        write_tar(tmp.as_file_mut(), entries).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;

        // Dropping `tmp` on any error above removes the temporary file.
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Flatten the manifest and units into ordered, collision-free entries.
fn collect_entries<'a>(
    manifest: &'a [u8],
    units: &'a [UnitOutput],
) -> Result<Vec<(String, &'a [u8])>, ArchiveError> {
    let mut entries = vec![(MANIFEST_OUTPUT.to_owned(), manifest)];
    for unit in units {
        entries.push((unit.name.clone(), unit.bytes.as_slice()));
        if let Some(map) = &unit.map {
            entries.push((unit.map_name(), map.as_slice()));
        }
    }

    let mut seen = FxHashSet::default();
    for (name, _) in &entries {
        if !seen.insert(name.as_str()) {
            return Err(ArchiveError::Collision(name.clone()));
        }
    }

    Ok(entries)
}

fn write_tar<W: Write>(writer: W, entries: &[(String, &[u8])]) -> io::Result<()> {
    let mut builder = tar::Builder::new(writer);

    for (name, bytes) in entries {
        let mut header = tar::Header::new_ustar();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        builder.append_data(&mut header, name, *bytes)?;
    }

    builder.into_inner()?.flush()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Read;

    /// Read an archive back as `(name, bytes)` pairs in archive order.
    pub fn read_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(fs::File::open(path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes).unwrap();
                (name, bytes)
            })
            .collect()
    }

    fn metadata(version: Option<&str>) -> PackageMetadata {
        PackageMetadata {
            name: "ext".into(),
            version: version.map(Into::into),
        }
    }

    fn unit(name: &str, bytes: &str, map: Option<&str>) -> UnitOutput {
        UnitOutput {
            name: name.into(),
            bytes: bytes.into(),
            map: map.map(Into::into),
        }
    }

    #[test]
    fn test_archive_file_name() {
        assert_eq!(archive_file_name(&metadata(Some("1.2.3")), BuildMode::Prod), "ext-1.2.3-prod.tar");
        assert_eq!(archive_file_name(&metadata(None), BuildMode::Prod), "ext-prod.tar");
        assert_eq!(archive_file_name(&metadata(None), BuildMode::Dev), "ext-dev.tar");
    }

    #[test]
    fn test_assemble_writes_entries_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ArchiveAssembler::new(dir.path().join("dist"));
        let units = [
            unit("main.js", "main()", Some("{}")),
            unit("pages/popup.html", "<html></html>", None),
            unit("pages/popup.js", "popup()", Some("{\"file\":\"popup.js\"}")),
        ];

        let path = assembler
            .assemble(b"{}", &units, BuildMode::Dev, &metadata(Some("0.1.0")))
            .unwrap();

        assert_eq!(path, dir.path().join("dist/ext-0.1.0-dev.tar"));
        let names: Vec<_> = read_entries(&path).into_iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            [
                "manifest.json",
                "main.js",
                "main.js.map",
                "pages/popup.html",
                "pages/popup.js",
                "pages/popup.js.map"
            ]
        );
    }

    #[test]
    fn test_assemble_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ArchiveAssembler::new(dir.path());
        let units = [unit("main.js", "main()", None)];

        let path = assembler.assemble(b"{}", &units, BuildMode::Prod, &metadata(None)).unwrap();
        let first = fs::read(&path).unwrap();
        let path = assembler.assemble(b"{}", &units, BuildMode::Prod, &metadata(None)).unwrap();
        assert_eq!(first, fs::read(&path).unwrap());
    }

    #[test]
    fn test_collision_is_caught_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ArchiveAssembler::new(dir.path());
        let units = [unit("main.js", "a", None), unit("main.js", "b", None)];

        let err = assembler
            .assemble(b"{}", &units, BuildMode::Prod, &metadata(None))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Collision(name) if name == "main.js"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_failure_leaves_no_archive() {
        let dir = tempfile::tempdir().unwrap();
        // Output "directory" is a regular file.
        let blocked = dir.path().join("dist");
        fs::write(&blocked, "not a directory").unwrap();
        let assembler = ArchiveAssembler::new(&blocked);

        let err = assembler
            .assemble(b"{}", &[], BuildMode::Prod, &metadata(None))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
        assert!(!assembler.archive_path(&metadata(None), BuildMode::Prod).exists());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ArchiveAssembler::new(dir.path());
        assembler.assemble(b"{}", &[], BuildMode::Dev, &metadata(None)).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, ["ext-dev.tar"]);
    }

    #[test]
    fn test_page_named_main_is_rejected() {
        let layout = ProjectLayout::new("src", false, vec!["main".into(), "popup".into()]);
        assert!(matches!(
            check_layout_names(&layout),
            Err(ArchiveError::ReservedPageName { page }) if page == "main"
        ));

        let layout = ProjectLayout::new("src", true, vec!["popup".into()]);
        assert!(check_layout_names(&layout).is_ok());
    }
}
