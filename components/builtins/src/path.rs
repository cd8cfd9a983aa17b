//! POSIX path module (`require('path')`)
//!
//! String-level path manipulation following the documented Node.js
//! `path.posix` behaviour. Nothing here touches the filesystem except
//! [`resolve`], which reads the current directory.

use rquickjs::function::{Func, Opt, Rest};
use rquickjs::{Coerced, Ctx, Object};
use std::env;

/// Path segment separator
pub const SEP: &str = "/";

/// `PATH`-style list delimiter
pub const DELIMITER: &str = ":";

/// Components of a path as returned by [`parse`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPath {
    /// `/` for absolute paths, empty otherwise
    pub root: String,
    /// Everything before the final segment
    pub dir: String,
    /// Final segment including extension
    pub base: String,
    /// Extension including the dot
    pub ext: String,
    /// Final segment without extension
    pub name: String,
}

/// Whether `path` starts at the root
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

// Collapse `.`, `..` and repeated separators. Leading `..` segments are kept
// only for relative paths.
fn normalize_segments(path: &str, allow_above_root: bool) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if allow_above_root => segments.push(".."),
                _ => {}
            },
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Normalize a path, keeping a trailing separator if present
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let absolute = is_absolute(path);
    let trailing = path.ends_with('/');

    let mut normalized = normalize_segments(path, !absolute);
    if normalized.is_empty() {
        if absolute {
            return "/".to_string();
        }
        return if trailing { "./" } else { "." }.to_string();
    }
    if trailing {
        normalized.push('/');
    }
    if absolute {
        format!("/{normalized}")
    } else {
        normalized
    }
}

/// Join segments with the separator and normalize the result
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    let joined = segments
        .iter()
        .map(AsRef::as_ref)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        return ".".to_string();
    }
    normalize(&joined)
}

/// Resolve segments right to left into an absolute path, relative to the
/// process's current directory
pub fn resolve<S: AsRef<str>>(segments: &[S]) -> String {
    let cwd = env::current_dir()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "/".to_string());
    resolve_from(&cwd, segments)
}

/// [`resolve`] with an explicit working directory
pub fn resolve_from<S: AsRef<str>>(cwd: &str, segments: &[S]) -> String {
    let mut resolved = String::new();
    let mut absolute = false;

    for segment in segments.iter().rev().map(AsRef::as_ref).chain([cwd]) {
        if segment.is_empty() {
            continue;
        }
        resolved = if resolved.is_empty() {
            segment.to_string()
        } else {
            format!("{segment}/{resolved}")
        };
        if is_absolute(segment) {
            absolute = true;
            break;
        }
    }

    let normalized = normalize_segments(&resolved, !absolute);
    if absolute {
        format!("/{normalized}")
    } else if normalized.is_empty() {
        ".".to_string()
    } else {
        normalized
    }
}

/// Relative path from `from` to `to`, both resolved first
pub fn relative(from: &str, to: &str) -> String {
    relative_from(
        &env::current_dir()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "/".to_string()),
        from,
        to,
    )
}

/// [`relative`] with an explicit working directory
pub fn relative_from(cwd: &str, from: &str, to: &str) -> String {
    let from = resolve_from(cwd, &[from]);
    let to = resolve_from(cwd, &[to]);
    if from == to {
        return String::new();
    }

    let from_parts: Vec<&str> = from.split('/').filter(|s| !s.is_empty()).collect();
    let to_parts: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();
    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; from_parts.len() - common];
    parts.extend(&to_parts[common..]);
    parts.join("/")
}

/// Directory portion of a path
pub fn dirname(path: &str) -> String {
    let bytes = path.as_bytes();
    if bytes.is_empty() {
        return ".".to_string();
    }
    let has_root = bytes[0] == b'/';
    let mut end = None;
    let mut matched_slash = true;
    for i in (1..bytes.len()).rev() {
        if bytes[i] == b'/' {
            if !matched_slash {
                end = Some(i);
                break;
            }
        } else {
            matched_slash = false;
        }
    }

    match end {
        None if has_root => "/".to_string(),
        None => ".".to_string(),
        Some(1) if has_root => "//".to_string(),
        Some(end) => path[..end].to_string(),
    }
}

/// Final segment of a path, minus `ext` when it is a proper suffix
pub fn basename(path: &str, ext: Option<&str>) -> String {
    let trimmed = path.trim_end_matches('/');
    let base = match trimmed.rfind('/') {
        Some(index) => &trimmed[index + 1..],
        None => trimmed,
    };
    match ext {
        Some(ext) if !ext.is_empty() && ext != base => {
            base.strip_suffix(ext).unwrap_or(base).to_string()
        }
        _ => base.to_string(),
    }
}

/// Extension of the final segment, from its last dot
pub fn extname(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut start_dot: Option<usize> = None;
    let mut start_part = 0;
    let mut end: Option<usize> = None;
    let mut matched_slash = true;
    // 0: nothing before the dot yet, 1: another dot, -1: a regular character
    let mut pre_dot_state = 0i8;

    for i in (0..bytes.len()).rev() {
        let byte = bytes[i];
        if byte == b'/' {
            if !matched_slash {
                start_part = i + 1;
                break;
            }
            continue;
        }
        if end.is_none() {
            matched_slash = false;
            end = Some(i + 1);
        }
        if byte == b'.' {
            if start_dot.is_none() {
                start_dot = Some(i);
            } else if pre_dot_state != 1 {
                pre_dot_state = 1;
            }
        } else if start_dot.is_some() {
            pre_dot_state = -1;
        }
    }

    match (start_dot, end) {
        (Some(dot), Some(end))
            if pre_dot_state != 0
                && !(pre_dot_state == 1 && dot + 1 == end && dot == start_part + 1) =>
        {
            path[dot..end].to_string()
        }
        _ => String::new(),
    }
}

/// Split a path into root, dir, base, ext and name
pub fn parse(path: &str) -> ParsedPath {
    if path.is_empty() {
        return ParsedPath::default();
    }
    let absolute = is_absolute(path);
    let root = if absolute { "/" } else { "" };

    let trimmed = {
        let stripped = path.trim_end_matches('/');
        if stripped.is_empty() { &path[..1] } else { stripped }
    };
    let first = usize::from(absolute);
    let dir = match trimmed.rfind('/') {
        Some(index) if index >= first => trimmed[..index].to_string(),
        _ => root.to_string(),
    };

    let base = basename(path, None);
    let ext = extname(&base);
    let name = base[..base.len() - ext.len()].to_string();

    ParsedPath {
        root: root.to_string(),
        dir,
        base,
        ext,
        name,
    }
}

/// Inverse of [`parse`]: `dir` (or `root`) joined with `base` (or
/// `name` + `ext`)
pub fn format(parts: &ParsedPath) -> String {
    let dir = if parts.dir.is_empty() {
        &parts.root
    } else {
        &parts.dir
    };
    let base = if parts.base.is_empty() {
        format!("{}{}", parts.name, parts.ext)
    } else {
        parts.base.clone()
    };

    if dir.is_empty() {
        base
    } else if *dir == parts.root {
        format!("{dir}{base}")
    } else {
        format!("{dir}/{base}")
    }
}

fn strings(values: Rest<Coerced<String>>) -> Vec<String> {
    values.0.into_iter().map(|value| value.0).collect()
}

fn field(object: &Object<'_>, key: &str) -> rquickjs::Result<String> {
    Ok(object.get::<_, Option<String>>(key)?.unwrap_or_default())
}

/// Build the `path` module object.
pub fn create<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let module = Object::new(ctx.clone())?;

    module.set("sep", SEP)?;
    module.set("delimiter", DELIMITER)?;
    module.set(
        "join",
        Func::from(|parts: Rest<Coerced<String>>| join(&strings(parts))),
    )?;
    module.set(
        "resolve",
        Func::from(|parts: Rest<Coerced<String>>| resolve(&strings(parts))),
    )?;
    module.set(
        "normalize",
        Func::from(|path: Coerced<String>| normalize(&path.0)),
    )?;
    module.set(
        "isAbsolute",
        Func::from(|path: Coerced<String>| is_absolute(&path.0)),
    )?;
    module.set(
        "relative",
        Func::from(|from: Coerced<String>, to: Coerced<String>| relative(&from.0, &to.0)),
    )?;
    module.set(
        "dirname",
        Func::from(|path: Coerced<String>| dirname(&path.0)),
    )?;
    module.set(
        "basename",
        Func::from(|path: Coerced<String>, ext: Opt<Coerced<String>>| {
            basename(&path.0, ext.0.as_ref().map(|ext| ext.0.as_str()))
        }),
    )?;
    module.set(
        "extname",
        Func::from(|path: Coerced<String>| extname(&path.0)),
    )?;
    module.set(
        "parse",
        Func::from(
            |ctx: Ctx<'js>, path: Coerced<String>| -> rquickjs::Result<Object<'js>> {
                let parsed = parse(&path.0);
                let object = Object::new(ctx)?;
                object.set("root", parsed.root)?;
                object.set("dir", parsed.dir)?;
                object.set("base", parsed.base)?;
                object.set("ext", parsed.ext)?;
                object.set("name", parsed.name)?;
                Ok(object)
            },
        ),
    )?;
    module.set(
        "format",
        Func::from(|parts: Object<'js>| -> rquickjs::Result<String> {
            Ok(format(&ParsedPath {
                root: field(&parts, "root")?,
                dir: field(&parts, "dir")?,
                base: field(&parts, "base")?,
                ext: field(&parts, "ext")?,
                name: field(&parts, "name")?,
            }))
        }),
    )?;

    Ok(module)
}
