//! Stream directory layout and the crash-safe frame/checkpoint protocol
//! (`spec.md` §4.3, §4.7).
//!
//! Layout under `<streams_dir>/<shard_name>_data/streams/<stream_id>/`:
//!
//! - `files/<name>` -- current committed initial/checkpoint files.
//! - `buffer_<name>` -- append-only staging for the uncommitted window.
//! - `<N>_<name>` -- immutable committed frame file, frames `(prev_N, N]`.
//! - `files/chkpt_<K>_<name>` -- checkpoint-swap sentinel.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::model::StreamId;

const CHKPT_PREFIX: &str = "chkpt_";
const BUFFER_PREFIX: &str = "buffer_";

#[derive(Debug, Clone)]
pub struct StreamDir {
    root: PathBuf,
}

impl StreamDir {
    pub fn new(streams_dir: &Path, shard_name: &str, id: &StreamId) -> Self {
        let root = streams_dir
            .join(format!("{shard_name}_data"))
            .join("streams")
            .join(id.as_dirname());
        StreamDir { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    fn buffer_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{BUFFER_PREFIX}{name}"))
    }

    fn chkpt_path(&self, frames: i64, name: &str) -> PathBuf {
        self.files_dir().join(format!("{CHKPT_PREFIX}{frames}_{name}"))
    }

    fn committed_path(&self, through_frames: i64, name: &str) -> PathBuf {
        self.root.join(format!("{through_frames}_{name}"))
    }

    /// Creates `files/` and writes the stream's initial files. Called once,
    /// at stream creation (`spec.md` §4.2, `POST /streams`).
    pub async fn write_initial(&self, files: &HashMap<String, Vec<u8>>) -> std::io::Result<()> {
        fs::create_dir_all(self.files_dir()).await?;
        for (name, bytes) in files {
            fs::write(self.files_dir().join(name), bytes).await?;
        }
        Ok(())
    }

    /// Reads every file currently committed under `files/`, as returned by
    /// `GET /core/start` (`spec.md` §6).
    pub async fn read_initial(&self) -> std::io::Result<HashMap<String, Vec<u8>>> {
        let mut out = HashMap::new();
        let dir = self.files_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(CHKPT_PREFIX) {
                continue;
            }
            let bytes = fs::read(entry.path()).await?;
            out.insert(name, bytes);
        }
        Ok(out)
    }

    /// Appends `files` (already decoded per `spec.md` §4.3 step 4) to this
    /// stream's buffer, returning the set of names touched. Does not clear
    /// the buffer first -- the caller clears `buffer_files` in the KV layer
    /// and calls this once per name.
    pub async fn append_buffer(&self, name: &str, data: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.root).await?;
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.buffer_path(name))
            .await?;
        f.write_all(data).await?;
        Ok(())
    }

    /// Deletes every `buffer_<name>` file, used by deactivation (`spec.md`
    /// §4.5 step 2) and by startup recovery.
    pub async fn clear_buffers(&self, names: impl IntoIterator<Item = String>) -> std::io::Result<()> {
        for name in names {
            match fs::remove_file(self.buffer_path(&name)).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Runs the four-step checkpoint swap (`spec.md` §4.3). `p` is the
    /// pre-commit `Stream.frames`, `t` is `p + buffer_frames`.
    ///
    /// Each step is individually crash-recoverable; see [`Self::recover`].
    pub async fn checkpoint(
        &self,
        checkpoint_files: &HashMap<String, Vec<u8>>,
        buffer_file_names: &HashSet<String>,
        p: i64,
        t: i64,
    ) -> std::io::Result<()> {
        // Step 1: files/<name> -> files/chkpt_<P>_<name>
        for name in checkpoint_files.keys() {
            let from = self.files_dir().join(name);
            let to = self.chkpt_path(p, name);
            fs::rename(&from, &to).await?;
        }

        // Step 2: buffer_<name> -> <T>_<name>
        for name in buffer_file_names {
            let from = self.buffer_path(name);
            let to = self.committed_path(t, name);
            match fs::rename(&from, &to).await {
                Ok(()) => {}
                // A name may appear in buffer_files with no buffer_<name> on
                // disk if the only POSTs to touch it were fully absorbed by
                // replay suppression after a partial write; nothing to move.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }

        // Step 3: write new checkpoint bytes to files/<name>
        for (name, bytes) in checkpoint_files {
            fs::write(self.files_dir().join(name), bytes).await?;
        }

        // Step 4: remove the sentinel
        for name in checkpoint_files.keys() {
            match fs::remove_file(self.chkpt_path(p, name)).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    /// Startup recovery for a single stream directory (`spec.md` §4.3,
    /// "Startup recovery"). Idempotent: safe to call on an already-coherent
    /// directory.
    pub async fn recover(&self) -> std::io::Result<()> {
        let mut entries = match fs::read_dir(&self.files_dir()).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };

        let mut sentinels = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(rest) = name.strip_prefix(CHKPT_PREFIX) {
                if let Some((k, orig_name)) = rest.split_once('_') {
                    if let Ok(k) = k.parse::<i64>() {
                        sentinels.push((k, orig_name.to_owned()));
                    }
                }
            }
        }

        if sentinels.is_empty() {
            // Coherent: discard any uncommitted buffer staged before the
            // crash. It is safely re-sent by a retried frame POST.
            return self.remove_all_buffers().await;
        }

        for (k, name) in sentinels {
            self.discard_frame_files_above(&name, k).await?;
            let from = self.chkpt_path(k, &name);
            let to = self.files_dir().join(&name);
            fs::rename(&from, &to).await?;
        }
        self.remove_all_buffers().await
    }

    async fn remove_all_buffers(&self) -> std::io::Result<()> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(BUFFER_PREFIX) {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }

    /// Deletes every committed frame file `<M>_<name>` with `M > k`: frames
    /// that were only ever reachable from a checkpoint commit that did not
    /// finish (`spec.md` §4.3, "delete every `<M>_<name>` with M > K").
    async fn discard_frame_files_above(&self, name: &str, k: i64) -> std::io::Result<()> {
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let fname = entry.file_name().to_string_lossy().into_owned();
            if let Some((m, suffix)) = split_frame_file(&fname) {
                if suffix == name && m > k {
                    fs::remove_file(entry.path()).await?;
                }
            }
        }
        Ok(())
    }

    /// Appends a timestamped line to `error_log.txt` (`spec.md` §6, `PUT
    /// /core/stop`'s optional decoded `error` message).
    pub async fn append_error_log(&self, line: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.root).await?;
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join("error_log.txt"))
            .await?;
        f.write_all(line.as_bytes()).await?;
        f.write_all(b"\n").await?;
        Ok(())
    }

    /// Removes the stream's entire on-disk directory (used by delete,
    /// `spec.md` §4.2).
    pub async fn remove_all(&self) -> std::io::Result<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Concatenates every committed frame file for `name` in frame order
    /// (`spec.md` §4.7). Returns `None` if `name` refers to a `files/`
    /// entry instead (caller should serve it as a single raw file).
    pub async fn download(&self, requested_name: &str) -> std::io::Result<Vec<u8>> {
        if let Some(files_name) = requested_name.strip_prefix("files/") {
            return self.read_single_file(files_name).await;
        }

        let mut matches = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let fname = entry.file_name().to_string_lossy().into_owned();
            if fname.starts_with(BUFFER_PREFIX) {
                continue;
            }
            if let Some((n, suffix)) = split_frame_file(&fname) {
                if suffix == requested_name {
                    matches.push((n, entry.path()));
                }
            }
        }
        matches.sort_by_key(|(n, _)| *n);

        let mut out = Vec::new();
        for (_, path) in matches {
            out.extend(fs::read(path).await?);
        }
        Ok(out)
    }

    async fn read_single_file(&self, name: &str) -> std::io::Result<Vec<u8>> {
        let path = self.files_dir().join(name);
        if !path_is_safe(&self.files_dir(), &path) {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "path traversal rejected"));
        }
        fs::read(path).await
    }
}

/// Splits a committed frame filename `<N>_<name>` into its numeric prefix
/// and the original name. `None` if the filename has no numeric prefix
/// (e.g. it isn't a frame file at all).
fn split_frame_file(fname: &str) -> Option<(i64, &str)> {
    let (prefix, suffix) = fname.split_once('_')?;
    let n: i64 = prefix.parse().ok()?;
    Some((n, suffix))
}

/// Requires the resolved path to be an immediate child of `dir`, rejecting
/// any `..`-style escape out of the stream's owned directory (`spec.md`
/// §4.7).
fn path_is_safe(dir: &Path, candidate: &Path) -> bool {
    candidate.parent() == Some(dir) && candidate.file_name().is_some()
}
