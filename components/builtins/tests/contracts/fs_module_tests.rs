//! Contract tests for the fs module

use super::{eval, with_modules};
use std::fs;
use tempfile::TempDir;

fn quoted(path: &std::path::Path) -> String {
    format!("{:?}", path.to_str().unwrap())
}

#[test]
fn test_write_then_read_utf8() {
    let dir = TempDir::new().unwrap();
    let file = quoted(&dir.path().join("hello.txt"));
    with_modules(|ctx| {
        let text: String = eval(
            ctx,
            &format!("fs.writeFileSync({file}, 'hi there'); fs.readFileSync({file}, 'utf8')"),
        )
        .unwrap();
        assert_eq!(text, "hi there");

        let default: String = eval(ctx, &format!("fs.readFileSync({file})")).unwrap();
        assert_eq!(default, "hi there");

        let options: String =
            eval(ctx, &format!("fs.readFileSync({file}, {{ encoding: 'utf-8' }})")).unwrap();
        assert_eq!(options, "hi there");
    });
}

#[test]
fn test_read_binary_returns_byte_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("raw.bin");
    fs::write(&path, [1u8, 2, 250]).unwrap();
    let file = quoted(&path);
    with_modules(|ctx| {
        let bytes: Vec<i32> = eval(ctx, &format!("fs.readFileSync({file}, 'binary')")).unwrap();
        assert_eq!(bytes, vec![1, 2, 250]);
    });
}

#[test]
fn test_read_missing_file_throws() {
    let dir = TempDir::new().unwrap();
    let file = quoted(&dir.path().join("missing.txt"));
    with_modules(|ctx| {
        let message = eval::<String>(ctx, &format!("fs.readFileSync({file})")).unwrap_err();
        assert!(message.starts_with("Error reading file: "), "{message}");
    });
}

#[test]
fn test_exists_sync() {
    let dir = TempDir::new().unwrap();
    let present = quoted(dir.path());
    let absent = quoted(&dir.path().join("absent"));
    with_modules(|ctx| {
        assert!(eval::<bool>(ctx, &format!("fs.existsSync({present})")).unwrap());
        assert!(!eval::<bool>(ctx, &format!("fs.existsSync({absent})")).unwrap());
        assert!(!eval::<bool>(ctx, "fs.existsSync()").unwrap());
    });
}

#[test]
fn test_mkdir_readdir_unlink() {
    let dir = TempDir::new().unwrap();
    let nested = quoted(&dir.path().join("a/b"));
    let root = quoted(&dir.path().join("a"));
    let file = quoted(&dir.path().join("a/z.txt"));
    with_modules(|ctx| {
        eval::<()>(ctx, &format!("fs.mkdirSync({nested}, {{ recursive: true }})")).unwrap();
        eval::<()>(ctx, &format!("fs.writeFileSync({file}, '')")).unwrap();

        let names: Vec<String> = eval(ctx, &format!("fs.readdirSync({root})")).unwrap();
        assert_eq!(names, vec!["b", "z.txt"]);

        eval::<()>(ctx, &format!("fs.unlinkSync({file})")).unwrap();
        let names: Vec<String> = eval(ctx, &format!("fs.readdirSync({root})")).unwrap();
        assert_eq!(names, vec!["b"]);

        let message = eval::<()>(ctx, &format!("fs.unlinkSync({file})")).unwrap_err();
        assert!(message.starts_with("Error removing file: "), "{message}");
    });
}

#[test]
fn test_mkdir_without_recursive_fails_for_missing_parent() {
    let dir = TempDir::new().unwrap();
    let nested = quoted(&dir.path().join("x/y"));
    with_modules(|ctx| {
        let message = eval::<()>(ctx, &format!("fs.mkdirSync({nested})")).unwrap_err();
        assert!(message.starts_with("Error creating directory: "), "{message}");
    });
}

#[test]
fn test_stat_sync() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.txt");
    fs::write(&path, "abcdef").unwrap();
    let file = quoted(&path);
    let folder = quoted(dir.path());
    with_modules(|ctx| {
        let summary: String = eval(
            ctx,
            &format!(
                "const s = fs.statSync({file}); \
                 [s.isFile(), s.isDirectory(), s.size, typeof s.mode, s.mtime > 0].join(',')"
            ),
        )
        .unwrap();
        assert_eq!(summary, "true,false,6,number,true");

        assert!(eval::<bool>(ctx, &format!("fs.statSync({folder}).isDirectory()")).unwrap());
    });
}
