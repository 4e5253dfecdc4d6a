use chrono::Utc;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Create `dir` and its parents. An existing directory is not an error.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Move `from` to `to`, falling back to copy + remove when a rename is not
/// possible (e.g. work dir and output dir on different filesystems).
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !from.exists() {
                return Err(rename_err);
            }
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_root(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "parcel_fs_{}_{}_{}",
            label,
            std::process::id(),
            Utc::now().timestamp_micros()
        ))
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let root = temp_root("ensure");
        let nested = root.join("a").join("b");
        ensure_dir(&nested).expect("first create");
        ensure_dir(&nested).expect("second create must not fail");
        assert!(nested.is_dir());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn atomic_write_replaces_content() {
        let root = temp_root("atomic");
        let path = root.join("out").join("report.json");
        atomic_write_bytes(&path, b"one").expect("write");
        atomic_write_bytes(&path, b"two").expect("rewrite");
        assert_eq!(fs::read(&path).expect("read"), b"two");
        let leftovers = fs::read_dir(path.parent().unwrap())
            .expect("list")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .count();
        assert_eq!(leftovers, 0);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn move_file_relocates_and_overwrites() {
        let root = temp_root("move");
        ensure_dir(&root).expect("root");
        let src = root.join("movie.gif");
        let dst = root.join("sim1.gif");
        fs::write(&dst, b"stale").expect("stale");
        fs::write(&src, b"fresh").expect("src");
        move_file(&src, &dst).expect("move");
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).expect("read"), b"fresh");
        assert!(move_file(&src, &dst).is_err());
        let _ = fs::remove_dir_all(root);
    }
}
