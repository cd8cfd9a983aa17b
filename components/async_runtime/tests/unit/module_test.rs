//! Unit tests for the CommonJS module loader

use crate::fake_host::{FakeHost, Host, TestValue};
use async_runtime::{LoadState, ModuleLoader, ScriptHost};
use core_types::ErrorKind;
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

const EXPORTS: usize = 0;
const REQUIRE: usize = 1;
const MODULE: usize = 2;
const FILENAME: usize = 3;
const DIRNAME: usize = 4;

fn write(root: &Path, relative: &str, source: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, source).unwrap();
    path
}

fn require(host: Host<'_>, require_fn: &TestValue, specifier: &str) -> Result<TestValue, TestValue> {
    host.call(require_fn, &host.undefined(), vec![TestValue::str(specifier)])
}

#[test]
fn second_require_hits_cache() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let path = write(dir.path(), "counter.js", "exports.value = 1;");
    host.define_module(&path, |host, args| {
        host.set(&args[EXPORTS], "value", TestValue::Number(1.0))?;
        Ok(host.undefined())
    });

    let loader = ModuleLoader::new();
    let first = loader.require(h, dir.path(), "./counter").unwrap();
    let second = loader.require(h, dir.path(), "./counter.js").unwrap();

    assert!(first.same_object(&second));
    assert_eq!(first.prop("value").number(), Some(1.0));
    assert_eq!(host.evaluations(&path), 1);
    assert_eq!(loader.entry(&path).unwrap().load_state(), LoadState::Loaded);
}

#[test]
fn circular_require_sees_partial_exports() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let a = write(dir.path(), "a.js", "// a");
    let b = write(dir.path(), "b.js", "// b");

    host.define_module(&a, |host, args| {
        host.set(&args[EXPORTS], "early", TestValue::str("a-early"))?;
        let b = require(host, &args[REQUIRE], "./b")?;
        host.set(&args[EXPORTS], "fromB", host.get(&b, "sawEarly")?)?;
        host.set(&args[EXPORTS], "late", TestValue::str("a-late"))?;
        Ok(host.undefined())
    });
    host.define_module(&b, |host, args| {
        let a = require(host, &args[REQUIRE], "./a")?;
        host.set(&args[EXPORTS], "sawEarly", host.get(&a, "early")?)?;
        host.set(&args[EXPORTS], "sawLate", host.get(&a, "late")?)?;
        host.set(&args[EXPORTS], "a", a)?;
        Ok(host.undefined())
    });

    let loader = ModuleLoader::new();
    let a_exports = loader.require(h, dir.path(), "./a").unwrap();
    let b_exports = loader.require(h, dir.path(), "./b").unwrap();

    assert_eq!(a_exports.prop("fromB").as_str(), Some("a-early"));
    assert!(b_exports.prop("sawLate").as_str().is_none());
    assert_eq!(b_exports.prop("a").prop("late").as_str(), Some("a-late"));
    assert_eq!(host.evaluations(&a), 1);
    assert_eq!(host.evaluations(&b), 1);
}

#[test]
fn circular_require_sees_reassigned_module_exports() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let a = write(dir.path(), "a.js", "// a");
    let b = write(dir.path(), "b.js", "// b");

    host.define_module(&a, |host, args| {
        let replacement = host.new_object()?;
        host.set(&replacement, "name", TestValue::str("A"))?;
        host.set(&args[MODULE], "exports", replacement.clone())?;
        let b = require(host, &args[REQUIRE], "./b")?;
        host.set(&replacement, "bSaw", host.get(&b, "seen")?)?;
        Ok(host.undefined())
    });
    host.define_module(&b, |host, args| {
        let a = require(host, &args[REQUIRE], "./a")?;
        host.set(&args[EXPORTS], "seen", host.get(&a, "name")?)?;
        Ok(host.undefined())
    });

    let loader = ModuleLoader::new();
    let a_exports = loader.require(h, dir.path(), "./a").unwrap();

    assert_eq!(a_exports.prop("name").as_str(), Some("A"));
    assert_eq!(a_exports.prop("bSaw").as_str(), Some("A"));
    assert!(loader.entry(&a).unwrap().exports().same_object(&a_exports));
}

#[test]
fn entry_is_loading_while_body_runs() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let path = write(dir.path(), "self.js", "");
    let loader = ModuleLoader::new();

    let observed = Rc::new(Cell::new(None));
    let (l, o, p) = (loader.clone(), observed.clone(), path.clone());
    host.define_module(&path, move |host, _| {
        o.set(l.entry(&p).map(|entry| entry.load_state()));
        Ok(host.undefined())
    });

    loader.require(h, dir.path(), "./self").unwrap();
    assert_eq!(observed.get(), Some(LoadState::Loading));
}

#[test]
fn syntax_error_evicts_and_retry_rereads() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let path = write(dir.path(), "broken.js", "exports.x = ; // @syntax-error");
    host.define_module(&path, |host, args| {
        host.set(&args[EXPORTS], "fixed", TestValue::Number(1.0))?;
        Ok(host.undefined())
    });

    let loader = ModuleLoader::new();
    let err = loader.require(h, dir.path(), "./broken").unwrap_err();
    assert_eq!(err.error_kind(), Some(ErrorKind::SyntaxError));
    assert!(loader.entry(&path).is_none());
    assert_eq!(loader.cached_modules(), 0);

    fs::write(&path, "exports.fixed = 1;").unwrap();
    let exports = loader.require(h, dir.path(), "./broken").unwrap();
    assert_eq!(exports.prop("fixed").number(), Some(1.0));
    assert_eq!(host.evaluations(&path), 2);
}

#[test]
fn throwing_body_evicts_and_reexecutes() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let path = write(dir.path(), "flaky.js", "");
    let attempts = Rc::new(Cell::new(0));

    let a = attempts.clone();
    host.define_module(&path, move |host, _| {
        a.set(a.get() + 1);
        if a.get() == 1 {
            return Err(host.error(ErrorKind::Error, "first attempt fails"));
        }
        Ok(host.undefined())
    });

    let loader = ModuleLoader::new();
    assert!(loader.require(h, dir.path(), "./flaky").is_err());
    assert!(loader.require(h, dir.path(), "./flaky").is_ok());
    assert_eq!(attempts.get(), 2);
}

#[test]
fn module_exports_can_be_replaced() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let path = write(dir.path(), "value.js", "module.exports = 'replaced';");
    host.define_module(&path, |host, args| {
        host.set(&args[MODULE], "exports", TestValue::str("replaced"))?;
        Ok(host.undefined())
    });

    let loader = ModuleLoader::new();
    let exports = loader.require(h, dir.path(), "./value").unwrap();
    assert_eq!(exports.as_str(), Some("replaced"));
    assert_eq!(
        loader.require(h, dir.path(), "./value").unwrap().as_str(),
        Some("replaced")
    );
}

#[test]
fn filename_and_dirname_are_absolute() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let path = write(dir.path(), "lib/where.js", "");
    host.define_module(&path, |host, args| {
        host.set(&args[EXPORTS], "file", args[FILENAME].clone())?;
        host.set(&args[EXPORTS], "dir", args[DIRNAME].clone())?;
        Ok(host.undefined())
    });

    let loader = ModuleLoader::new();
    let exports = loader.require(h, dir.path(), "./lib/../lib/where").unwrap();
    assert_eq!(exports.prop("file").as_str(), Some(path.to_str().unwrap()));
    assert_eq!(
        exports.prop("dir").as_str(),
        Some(dir.path().join("lib").to_str().unwrap())
    );
}

#[test]
fn missing_module_is_an_error() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let loader = ModuleLoader::new();

    let err = loader.require(h, dir.path(), "./nope").unwrap_err();
    assert_eq!(err.error_kind(), Some(ErrorKind::Error));
    assert_eq!(err.error_message(), Some("Cannot find module './nope'"));
    assert_eq!(loader.cached_modules(), 0);
}

#[test]
fn require_without_specifier_is_a_type_error() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let loader = ModuleLoader::new();
    let require_fn = loader.require_function(h, dir.path().to_path_buf()).unwrap();

    let err = h.call(&require_fn, &h.undefined(), Vec::new()).unwrap_err();
    assert_eq!(err.error_kind(), Some(ErrorKind::TypeError));
}

#[test]
fn builtins_resolve_without_filesystem() {
    let host = FakeHost::new();
    let h = host.as_host();
    let loader = ModuleLoader::new();
    let fs_exports = TestValue::object();
    loader.register_builtin("fs", fs_exports.clone());

    let plain = loader.require(h, Path::new("/does/not/exist"), "fs").unwrap();
    let prefixed = loader.require(h, Path::new("/does/not/exist"), "node:fs").unwrap();
    assert!(plain.same_object(&fs_exports));
    assert!(prefixed.same_object(&fs_exports));
    assert_eq!(loader.cached_modules(), 0);
}

#[test]
fn bare_specifier_searches_ancestor_dependency_dirs() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let index = write(dir.path(), "node_modules/greet/index.js", "");
    fs::create_dir_all(dir.path().join("src/deep")).unwrap();
    host.define_module(&index, |host, args| {
        host.set(&args[EXPORTS], "hello", TestValue::str("world"))?;
        Ok(host.undefined())
    });

    let loader = ModuleLoader::new();
    let exports = loader
        .require(h, &dir.path().join("src/deep"), "greet")
        .unwrap();
    assert_eq!(exports.prop("hello").as_str(), Some("world"));
    assert!(loader.entry(&index).is_some());
}

#[test]
fn package_json_main_is_followed() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    write(
        dir.path(),
        "node_modules/pkg/package.json",
        r#"{ "name": "pkg", "main": "dist/entry" }"#,
    );
    let entry = write(dir.path(), "node_modules/pkg/dist/entry.js", "");
    host.define_module(&entry, |host, args| {
        host.set(&args[EXPORTS], "main", TestValue::Number(1.0))?;
        Ok(host.undefined())
    });

    let loader = ModuleLoader::new();
    let exports = loader.require(h, dir.path(), "pkg").unwrap();
    assert_eq!(exports.prop("main").number(), Some(1.0));
}

#[test]
fn directory_without_manifest_loads_index() {
    let dir = TempDir::new().unwrap();
    let loader: Rc<ModuleLoader<TestValue>> = ModuleLoader::new();
    fs::create_dir_all(dir.path().join("widgets")).unwrap();
    assert_eq!(
        loader.resolve(dir.path(), "./widgets"),
        dir.path().join("widgets/index.js")
    );
}

#[test]
fn nested_requires_resolve_from_requiring_module() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let outer = write(dir.path(), "outer.js", "");
    let inner = write(dir.path(), "lib/inner.js", "");
    let sibling = write(dir.path(), "lib/sibling.js", "");

    host.define_module(&outer, |host, args| {
        let inner = require(host, &args[REQUIRE], "./lib/inner")?;
        host.set(&args[MODULE], "exports", inner)?;
        Ok(host.undefined())
    });
    host.define_module(&inner, |host, args| {
        let sibling = require(host, &args[REQUIRE], "./sibling")?;
        host.set(&args[MODULE], "exports", sibling)?;
        Ok(host.undefined())
    });
    host.define_module(&sibling, |host, args| {
        host.set(&args[MODULE], "exports", TestValue::str("sibling"))?;
        Ok(host.undefined())
    });

    let loader = ModuleLoader::new();
    let exports = loader.require(h, dir.path(), "./outer").unwrap();
    assert_eq!(exports.as_str(), Some("sibling"));
    assert_eq!(loader.cached_modules(), 3);
}

#[test]
fn load_path_accepts_files_without_extension() {
    let dir = TempDir::new().unwrap();
    let host = FakeHost::new();
    let h = host.as_host();
    let path = write(dir.path(), "bin/tool", "exports.name = 'tool';");
    host.define_module(&path, |host, args| {
        host.set(&args[EXPORTS], "name", TestValue::str("tool"))?;
        Ok(host.undefined())
    });

    let loader = ModuleLoader::new();
    let exports = loader.load_path(h, &path).unwrap();
    assert_eq!(exports.prop("name").as_str(), Some("tool"));

    let again = loader.load_path(h, &dir.path().join("bin/./tool")).unwrap();
    assert!(again.same_object(&exports));
    assert_eq!(host.evaluations(&path), 1);
}
