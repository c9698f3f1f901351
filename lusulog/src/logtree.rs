// Enumerate input files in a task's source tree.
//
// Machines drop their files into dated or otherwise nested subdirectories below the task's source
// directory, so the whole tree is searched.  Only files with the format's extension are returned.

use anyhow::{bail, Result};
use std::path::Path;

/// Find the files below `data_path` whose extension is `extension` (without the dot), sorted by
/// path.
///
/// This returns an error if `data_path` does not name a directory or if any directory in the
/// subtree cannot be read.
///
/// It does not return an error if the files cannot be read; that has to be handled later.
///
/// File names that are not representable as UTF8 are ignored.

pub fn find_logfiles(data_path: &Path, extension: &str) -> Result<Vec<String>> {
    if !data_path.is_dir() {
        bail!("No viable log directory: {}", data_path.display());
    }
    let mut filenames = vec![];
    walk(data_path, extension, &mut filenames)?;
    filenames.sort();
    Ok(filenames)
}

fn walk(dir: &Path, extension: &str, filenames: &mut Vec<String>) -> Result<()> {
    for entry in dir.read_dir()? {
        let Ok(entry) = entry else {
            // Bad directory entries are ignored
            continue;
        };
        let p = entry.path();
        if p.is_dir() {
            walk(&p, extension, filenames)?;
            continue;
        }
        match p.extension() {
            Some(ext) if ext == extension => {}
            _ => continue,
        }
        if let Some(pstr) = p.to_str() {
            filenames.push(pstr.to_string());
        }
    }
    Ok(())
}

#[test]
fn test_find_logfiles() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("2023/11/14")).unwrap();
    std::fs::write(root.join("2023/11/14/b.tgs"), "").unwrap();
    std::fs::write(root.join("2023/11/14/a.tgs"), "").unwrap();
    std::fs::write(root.join("2023/11/14/a.log"), "").unwrap();
    std::fs::write(root.join("top.tgs"), "").unwrap();
    std::fs::write(root.join("tgs"), "").unwrap();

    let files = find_logfiles(root, "tgs").unwrap();
    let rel = files
        .iter()
        .map(|f| Path::new(f).strip_prefix(root).unwrap().to_str().unwrap().to_string())
        .collect::<Vec<String>>();
    assert!(rel == vec!["2023/11/14/a.tgs", "2023/11/14/b.tgs", "top.tgs"]);

    // No such directory
    assert!(find_logfiles(&root.join("nope"), "tgs").is_err());
}
