//! Synchronous filesystem module (`require('fs')`)
//!
//! The file operations are plain Rust functions returning [`FsError`];
//! [`create`] wraps them as script functions that throw an `Error` carrying
//! the same message.

use rquickjs::function::{Func, Opt};
use rquickjs::{Array, Coerced, Ctx, Exception, Object, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::trace;

/// Failure of a filesystem operation
#[derive(Debug, Error)]
pub enum FsError {
    /// Reading a file failed
    #[error("Error reading file: {0}")]
    Read(#[source] io::Error),
    /// Writing a file failed
    #[error("Error writing file: {0}")]
    Write(#[source] io::Error),
    /// Creating a directory failed
    #[error("Error creating directory: {0}")]
    CreateDir(#[source] io::Error),
    /// Listing a directory failed
    #[error("Error reading directory: {0}")]
    ReadDir(#[source] io::Error),
    /// Removing a file failed
    #[error("Error removing file: {0}")]
    Remove(#[source] io::Error),
    /// Querying metadata failed
    #[error("Error getting file stats: {0}")]
    Stat(#[source] io::Error),
}

/// Result alias for filesystem operations
pub type FsResult<T> = Result<T, FsError>;

/// Contents returned by [`read_file`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContents {
    /// Decoded UTF-8 text
    Text(String),
    /// Raw bytes, for any encoding other than UTF-8
    Bytes(Vec<u8>),
}

/// Whether `encoding` names UTF-8
pub fn is_utf8(encoding: &str) -> bool {
    matches!(encoding.to_ascii_lowercase().as_str(), "utf8" | "utf-8")
}

/// Read a whole file, decoding it when `encoding` is UTF-8
pub fn read_file(path: &Path, encoding: &str) -> FsResult<FileContents> {
    trace!(path = %path.display(), encoding, "readFileSync");
    if is_utf8(encoding) {
        fs::read_to_string(path)
            .map(FileContents::Text)
            .map_err(FsError::Read)
    } else {
        fs::read(path).map(FileContents::Bytes).map_err(FsError::Read)
    }
}

/// Replace a file's contents
pub fn write_file(path: &Path, data: &str) -> FsResult<()> {
    trace!(path = %path.display(), bytes = data.len(), "writeFileSync");
    fs::write(path, data).map_err(FsError::Write)
}

/// Whether anything exists at `path`
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Create a directory, with parents when `recursive`
pub fn mkdir(path: &Path, recursive: bool) -> FsResult<()> {
    let created = if recursive {
        fs::create_dir_all(path)
    } else {
        fs::create_dir(path)
    };
    created.map_err(FsError::CreateDir)
}

/// Entry names of a directory, sorted ascending
pub fn read_dir(path: &Path) -> FsResult<Vec<String>> {
    let mut names = fs::read_dir(path)
        .map_err(FsError::ReadDir)?
        .map(|entry| {
            entry
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .map_err(FsError::ReadDir)
        })
        .collect::<FsResult<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

/// Remove a file
pub fn unlink(path: &Path) -> FsResult<()> {
    fs::remove_file(path).map_err(FsError::Remove)
}

/// Metadata reported by `statSync`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStat {
    /// Regular file
    pub is_file: bool,
    /// Directory
    pub is_dir: bool,
    /// Size in bytes
    pub size: u64,
    /// Permission bits (0 where the platform has none)
    pub mode: u32,
    /// Modification time in whole Unix seconds
    pub mtime: i64,
    /// Modification time in Unix milliseconds
    pub mtime_ms: f64,
}

/// Query metadata for `path`
pub fn stat(path: &Path) -> FsResult<FileStat> {
    let metadata = fs::metadata(path).map_err(FsError::Stat)?;
    let modified = metadata.modified().map_err(FsError::Stat)?;
    let since_epoch = modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    Ok(FileStat {
        is_file: metadata.is_file(),
        is_dir: metadata.is_dir(),
        size: metadata.len(),
        mode: mode_of(&metadata),
        mtime: since_epoch.as_secs() as i64,
        mtime_ms: since_epoch.as_secs_f64() * 1000.0,
    })
}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(_metadata: &fs::Metadata) -> u32 {
    0
}

fn throw(ctx: &Ctx<'_>, err: FsError) -> rquickjs::Error {
    Exception::throw_message(ctx, &err.to_string())
}

fn encoding_option(options: Option<Value<'_>>) -> rquickjs::Result<String> {
    let Some(options) = options else {
        return Ok("utf8".to_string());
    };
    if let Some(encoding) = options.as_string() {
        return encoding.to_string();
    }
    if let Some(object) = options.as_object() {
        if let Some(encoding) = object.get::<_, Option<String>>("encoding")? {
            return Ok(encoding);
        }
    }
    Ok("utf8".to_string())
}

/// Build the `fs` module object.
pub fn create<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let module = Object::new(ctx.clone())?;

    module.set(
        "readFileSync",
        Func::from(
            |ctx: Ctx<'js>, path: Coerced<String>, options: Opt<Value<'js>>| -> rquickjs::Result<Value<'js>> {
                let encoding = encoding_option(options.0)?;
                match read_file(Path::new(&path.0), &encoding).map_err(|err| throw(&ctx, err))? {
                    FileContents::Text(text) => {
                        Ok(rquickjs::String::from_str(ctx.clone(), &text)?.into_value())
                    }
                    FileContents::Bytes(bytes) => {
                        let array = Array::new(ctx.clone())?;
                        for (index, byte) in bytes.iter().enumerate() {
                            array.set(index, i32::from(*byte))?;
                        }
                        Ok(array.into_value())
                    }
                }
            },
        ),
    )?;

    module.set(
        "writeFileSync",
        Func::from(
            |ctx: Ctx<'js>, path: Coerced<String>, data: Coerced<String>| -> rquickjs::Result<()> {
                write_file(Path::new(&path.0), &data.0).map_err(|err| throw(&ctx, err))
            },
        ),
    )?;

    module.set(
        "existsSync",
        Func::from(|path: Opt<Coerced<String>>| -> bool {
            path.0.map(|path| exists(Path::new(&path.0))).unwrap_or(false)
        }),
    )?;

    module.set(
        "mkdirSync",
        Func::from(
            |ctx: Ctx<'js>, path: Coerced<String>, options: Opt<Object<'js>>| -> rquickjs::Result<()> {
                let recursive = match options.0 {
                    Some(options) => options.get::<_, Option<bool>>("recursive")?.unwrap_or(false),
                    None => false,
                };
                mkdir(Path::new(&path.0), recursive).map_err(|err| throw(&ctx, err))
            },
        ),
    )?;

    module.set(
        "readdirSync",
        Func::from(
            |ctx: Ctx<'js>, path: Coerced<String>| -> rquickjs::Result<Vec<String>> {
                read_dir(Path::new(&path.0)).map_err(|err| throw(&ctx, err))
            },
        ),
    )?;

    module.set(
        "unlinkSync",
        Func::from(
            |ctx: Ctx<'js>, path: Coerced<String>| -> rquickjs::Result<()> {
                unlink(Path::new(&path.0)).map_err(|err| throw(&ctx, err))
            },
        ),
    )?;

    module.set(
        "statSync",
        Func::from(
            |ctx: Ctx<'js>, path: Coerced<String>| -> rquickjs::Result<Object<'js>> {
                let info = stat(&PathBuf::from(path.0)).map_err(|err| throw(&ctx, err))?;
                stat_object(&ctx, info)
            },
        ),
    )?;

    Ok(module)
}

fn stat_object<'js>(ctx: &Ctx<'js>, info: FileStat) -> rquickjs::Result<Object<'js>> {
    let object = Object::new(ctx.clone())?;
    object.set("isFile", Func::from(move || info.is_file))?;
    object.set("isDirectory", Func::from(move || info.is_dir))?;
    object.set("size", info.size as f64)?;
    object.set("mode", info.mode)?;
    object.set("mtime", info.mtime as f64)?;
    object.set("mtimeMs", info.mtime_ms)?;
    Ok(object)
}
