//! Contract tests for the path module

use super::{eval, with_modules};

fn check(expression: &str, expected: &str) {
    with_modules(|ctx| {
        let actual: String = eval(ctx, expression).unwrap();
        assert_eq!(actual, expected, "{expression}");
    });
}

#[test]
fn test_constants() {
    check("path.sep", "/");
    check("path.delimiter", ":");
}

#[test]
fn test_join_and_normalize() {
    check("path.join('/foo', 'bar', 'baz/asdf', 'quux', '..')", "/foo/bar/baz/asdf");
    check("path.join()", ".");
    check("path.normalize('/a//b/./c/..')", "/a/b");
}

#[test]
fn test_resolve_returns_absolute() {
    check("path.resolve('/foo/bar', './baz')", "/foo/bar/baz");
    with_modules(|ctx| {
        assert!(eval::<bool>(ctx, "path.isAbsolute(path.resolve('x'))").unwrap());
    });
}

#[test]
fn test_components() {
    check("path.basename('/a/b/file.txt')", "file.txt");
    check("path.basename('/a/b/file.txt', '.txt')", "file");
    check("path.dirname('/a/b/file.txt')", "/a/b");
    check("path.extname('archive.tar.gz')", ".gz");
    check("path.relative('/data/a/b', '/data/c')", "../../c");
}

#[test]
fn test_is_absolute() {
    with_modules(|ctx| {
        assert!(eval::<bool>(ctx, "path.isAbsolute('/etc')").unwrap());
        assert!(!eval::<bool>(ctx, "path.isAbsolute('etc')").unwrap());
    });
}

#[test]
fn test_parse_and_format() {
    check(
        "JSON.stringify(path.parse('/home/user/file.txt'))",
        r#"{"root":"/","dir":"/home/user","base":"file.txt","ext":".txt","name":"file"}"#,
    );
    check("path.format({ dir: '/home/user', base: 'file.txt' })", "/home/user/file.txt");
    check("path.format({ root: '/', name: 'file', ext: '.txt' })", "/file.txt");
    check("path.format(path.parse('rel/dir/x.js'))", "rel/dir/x.js");
}
