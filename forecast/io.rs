use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sibling path used while a file is being written.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes `path` by filling a temporary sibling and renaming it into place.
///
/// Readers either see the previous file or the complete new one. The temporary
/// file is removed if anything fails.
pub fn write_atomically<F>(path: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let temp_path = temp_path_for(path);
    let write_result = (|| -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        fill(&mut writer)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(io::Error::other)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })
}
