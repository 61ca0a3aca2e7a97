//! Run directory helpers shared by tile runners

use crate::error::TileRunError;
use crate::grid::Cell;
use chrono::NaiveDateTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Compact timestamp used in log and output file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Create a fresh, uniquely named `run.*` directory inside `work_dir`
///
/// The directory is not removed automatically; the caller decides whether
/// to keep it.
pub fn create_run_directory(work_dir: &Path) -> Result<PathBuf, TileRunError> {
    let dir = tempfile::Builder::new()
        .prefix("run.")
        .tempdir_in(work_dir)
        .map_err(|_| {
            TileRunError::new(format!(
                "Cannot create run directory in \"{}\".",
                work_dir.display()
            ))
        })?;

    #[allow(deprecated)]
    let path = dir.into_path();
    Ok(path)
}

/// Symlink every entry of `template_dir` into `run_dir`
///
/// Hidden entries are skipped. Returns `(source, target)` pairs in name
/// order.
pub fn link_template(
    template_dir: &Path,
    run_dir: &Path,
) -> Result<Vec<(PathBuf, PathBuf)>, TileRunError> {
    let entries = fs::read_dir(template_dir).map_err(|e| {
        TileRunError::new(format!(
            "Cannot read template directory \"{}\": {}",
            template_dir.display(),
            e
        ))
    })?;

    let mut sources = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            TileRunError::new(format!(
                "Cannot read template directory \"{}\": {}",
                template_dir.display(),
                e
            ))
        })?;
        if !entry.file_name().to_string_lossy().starts_with('.') {
            sources.push(entry.path());
        }
    }
    sources.sort();

    let mut linked = Vec::with_capacity(sources.len());
    for source in sources {
        let Some(name) = source.file_name() else {
            continue;
        };
        let target = run_dir.join(name);
        symlink(&source, &target).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                TileRunError::new(format!(
                    "Cannot create links in \"{}\", permission denied.",
                    run_dir.display()
                ))
            } else {
                TileRunError::new(format!(
                    "Cannot link \"{}\" into \"{}\": {}",
                    source.display(),
                    run_dir.display(),
                    e
                ))
            }
        })?;
        linked.push((source, target));
    }

    Ok(linked)
}

#[cfg(unix)]
fn symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink(source: &Path, target: &Path) -> io::Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, target)
    } else {
        std::os::windows::fs::symlink_file(source, target)
    }
}

/// Name under which a cell's output file is archived
///
/// `<stem>.<YYYYmmddHHMMSS>.y<yyy>x<xxx>[.<ext>]`, using global coordinates.
pub fn archive_name(file_name: &Path, cell: &Cell, start_time: &NaiveDateTime) -> String {
    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!(
        "{}.{}.y{:03}x{:03}",
        stem,
        start_time.format(TIMESTAMP_FORMAT),
        cell.y_global,
        cell.x_global
    );
    if let Some(ext) = file_name.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    name
}

/// Move `source` into `output_dir` under its [`archive_name`]
///
/// Falls back to copy and remove when a rename is not possible (for
/// example across file systems).
pub fn archive_output(
    source: &Path,
    output_dir: &Path,
    cell: &Cell,
    start_time: &NaiveDateTime,
) -> Result<PathBuf, TileRunError> {
    let file_name = source.file_name().map(Path::new).ok_or_else(|| {
        TileRunError::new(format!("Output path \"{}\" has no file name", source.display()))
    })?;
    let target = output_dir.join(archive_name(file_name, cell, start_time));

    if fs::rename(source, &target).is_err() {
        fs::copy(source, &target)
            .and_then(|_| fs::remove_file(source))
            .map_err(|e| {
                TileRunError::new(format!(
                    "Cannot archive \"{}\" to \"{}\": {}",
                    source.display(),
                    target.display(),
                    e
                ))
            })?;
    }

    Ok(target)
}

/// Expand an input file name pattern for one cell
///
/// `{time}` becomes the start time as `YYYYmmddHHMMSS`; `{x}` and `{y}`
/// become the global coordinates. Other text is kept as is.
pub fn input_file_name(pattern: &str, cell: &Cell, start_time: &NaiveDateTime) -> String {
    pattern
        .replace("{time}", &start_time.format(TIMESTAMP_FORMAT).to_string())
        .replace("{x}", &cell.x_global.to_string())
        .replace("{y}", &cell.y_global.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn start_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 1, 1)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_create_run_directory() {
        let work = TempDir::new().unwrap();
        let first = create_run_directory(work.path()).unwrap();
        let second = create_run_directory(work.path()).unwrap();

        assert_ne!(first, second);
        assert!(first.is_dir());
        assert_eq!(first.parent(), Some(work.path()));
        assert!(first.file_name().unwrap().to_string_lossy().starts_with("run."));
    }

    #[test]
    fn test_create_run_directory_missing_parent() {
        let work = TempDir::new().unwrap();
        let missing = work.path().join("does-not-exist");
        let err = create_run_directory(&missing).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Cannot create run directory in \"{}\".", missing.display())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_link_template() {
        let template = TempDir::new().unwrap();
        let run = TempDir::new().unwrap();
        fs::write(template.path().join("namelist"), "&nml /").unwrap();
        fs::write(template.path().join(".hidden"), "").unwrap();
        fs::create_dir(template.path().join("tables")).unwrap();

        let linked = link_template(template.path(), run.path()).unwrap();
        let targets: Vec<PathBuf> = linked.iter().map(|(_, t)| t.clone()).collect();
        assert_eq!(
            targets,
            vec![run.path().join("namelist"), run.path().join("tables")]
        );
        for (source, target) in &linked {
            assert_eq!(&fs::read_link(target).unwrap(), source);
        }
        assert!(!run.path().join(".hidden").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_link_template_existing_target() {
        let template = TempDir::new().unwrap();
        let run = TempDir::new().unwrap();
        fs::write(template.path().join("namelist"), "").unwrap();
        fs::write(run.path().join("namelist"), "").unwrap();

        assert!(link_template(template.path(), run.path()).is_err());
    }

    #[test]
    fn test_archive_name() {
        let cell = Cell::new(7, 12, 0, 0);
        assert_eq!(
            archive_name(Path::new("output.nc"), &cell, &start_time()),
            "output.20160101063000.y012x007.nc"
        );
        assert_eq!(
            archive_name(Path::new("diagnostics"), &cell, &start_time()),
            "diagnostics.20160101063000.y012x007"
        );
    }

    #[test]
    fn test_archive_output_moves_file() {
        let run = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let source = run.path().join("result.txt");
        fs::write(&source, "42").unwrap();

        let cell = Cell::linear(3, 1, 0);
        let archived = archive_output(&source, out.path(), &cell, &start_time()).unwrap();

        assert_eq!(archived, out.path().join("result.20160101063000.y001x003.txt"));
        assert_eq!(fs::read_to_string(&archived).unwrap(), "42");
        assert!(!source.exists());
    }

    #[test]
    fn test_archive_output_missing_source() {
        let out = TempDir::new().unwrap();
        let cell = Cell::linear(0, 0, 0);
        let err = archive_output(&out.path().join("nope.nc"), out.path(), &cell, &start_time());
        assert!(err.is_err());
    }

    #[test]
    fn test_input_file_name() {
        let cell = Cell::new(2, 3, 0, 1);
        assert_eq!(
            input_file_name("forcing.{time}.nc", &cell, &start_time()),
            "forcing.20160101063000.nc"
        );
        assert_eq!(
            input_file_name("in_{y}_{x}.nc", &cell, &start_time()),
            "in_3_2.nc"
        );
        assert_eq!(input_file_name("static.nc", &cell, &start_time()), "static.nc");
    }
}
