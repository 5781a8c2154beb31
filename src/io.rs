use std::fs::File;
use std::io::{BufWriter, Result, Write};
use std::path::Path;

/// Write a list of names, one per line with a trailing newline.
pub fn write_list(names: &[String], path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for name in names {
        writeln!(writer, "{name}")?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_is_newline_terminated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.list");
        write_list(&["a/1".to_string(), "a/2".to_string()], &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a/1\na/2\n");
    }

    #[test]
    fn empty_list_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.list");
        write_list(&[], &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
