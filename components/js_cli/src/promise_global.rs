//! The global `Promise` constructor
//!
//! A small script shell gives `Promise` its constructor semantics and
//! prototype; every operation forwards to host natives built on the
//! engine-agnostic promise engine. The shell also owns the two helpers the
//! host uses to map between script objects and promise records: `idOf`
//! reads the hidden record id of a wrapper, `wrap` creates a wrapper for a
//! record.

use crate::host::{JsValue, PromiseShell, QuickJsHost};
use async_runtime::combinators::{all, all_settled, race};
use async_runtime::{native_fn, Handler, Promise, ScriptHost};
use core_types::ErrorKind;

const PROMISE_SHELL: &str = r#"
(function (native) {
  'use strict';
  const ID = Symbol('promise.id');
  const RECORD = Symbol('promise.record');
  const hasOwn = Object.prototype.hasOwnProperty;

  function idOf(value) {
    const isObject = (typeof value === 'object' && value !== null) || typeof value === 'function';
    return isObject && hasOwn.call(value, ID) ? value[ID] : undefined;
  }

  function Promise(executor) {
    if (new.target === undefined) {
      throw new TypeError("Promise constructor cannot be invoked without 'new'");
    }
    return native.construct(executor);
  }

  function wrap(id, record) {
    const promise = Object.create(Promise.prototype);
    Object.defineProperty(promise, ID, { value: id });
    Object.defineProperty(promise, RECORD, { value: record });
    return promise;
  }

  function settleAll(name, combine, items) {
    if (!Array.isArray(items)) {
      if (name === 'allSettled') {
        return native.resolve([]);
      }
      return native.reject(new TypeError('Promise.' + name + ' requires an array'));
    }
    return combine.apply(undefined, items);
  }

  function method(fn) {
    return { value: fn, writable: true, configurable: true };
  }

  Object.defineProperties(Promise.prototype, {
    then: method(function then(onFulfilled, onRejected) {
      return native.then(this, onFulfilled, onRejected);
    }),
    catch: method(function (onRejected) {
      return native.then(this, undefined, onRejected);
    }),
    finally: method(function (onFinally) {
      return native.finally(this, onFinally);
    }),
    [Symbol.toStringTag]: { value: 'Promise', configurable: true },
  });

  Object.defineProperties(Promise, {
    resolve: method(function resolve(value) {
      return idOf(value) !== undefined ? value : native.resolve(value);
    }),
    reject: method(function reject(reason) {
      return native.reject(reason);
    }),
    all: method(function all(iterable) {
      return settleAll('all', native.all, iterable);
    }),
    race: method(function race(iterable) {
      return settleAll('race', native.race, iterable);
    }),
    allSettled: method(function allSettled(iterable) {
      return settleAll('allSettled', native.allSettled, iterable);
    }),
  });

  return { Promise, idOf, wrap };
})
"#;

fn arg<V: Clone>(host: &dyn ScriptHost<V>, args: &[V], index: usize) -> V {
    args.get(index).cloned().unwrap_or_else(|| host.undefined())
}

fn handler<V: Clone>(host: &dyn ScriptHost<V>, value: V) -> Option<Handler<V>> {
    host.is_callable(&value).then_some(Handler::Script(value))
}

fn receiver<V: Clone + 'static>(
    host: &dyn ScriptHost<V>,
    this: &V,
    method: &str,
) -> Result<Promise<V>, V> {
    host.as_promise(this).ok_or_else(|| {
        host.error(
            ErrorKind::TypeError,
            &format!("Promise.prototype.{method} called on incompatible receiver"),
        )
    })
}

/// Builds the object of natives the shell forwards to.
///
/// Methods take their receiver as the first argument; combinators take
/// their inputs as separate arguments.
pub fn natives<V: Clone + 'static>(host: &dyn ScriptHost<V>) -> Result<V, V> {
    let object = host.new_object()?;
    let define = |name: &str, function| -> Result<(), V> {
        let function = host.native_function(name, function)?;
        host.set(&object, name, function)
    };

    define(
        "construct",
        native_fn(|host: &dyn ScriptHost<V>, args: Vec<V>| {
            let promise = Promise::construct(host, &arg(host, &args, 0))?;
            host.wrap_promise(&promise)
        }),
    )?;
    define(
        "then",
        native_fn(|host: &dyn ScriptHost<V>, args: Vec<V>| {
            let promise = receiver(host, &arg(host, &args, 0), "then")?;
            let derived = promise.then(
                host,
                handler(host, arg(host, &args, 1)),
                handler(host, arg(host, &args, 2)),
            );
            host.wrap_promise(&derived)
        }),
    )?;
    define(
        "finally",
        native_fn(|host: &dyn ScriptHost<V>, args: Vec<V>| {
            let promise = receiver(host, &arg(host, &args, 0), "finally")?;
            let derived = promise.finally(host, Some(arg(host, &args, 1)));
            host.wrap_promise(&derived)
        }),
    )?;
    define(
        "resolve",
        native_fn(|host: &dyn ScriptHost<V>, args: Vec<V>| {
            host.wrap_promise(&Promise::resolved(host, arg(host, &args, 0)))
        }),
    )?;
    define(
        "reject",
        native_fn(|host: &dyn ScriptHost<V>, args: Vec<V>| {
            host.wrap_promise(&Promise::rejected(host, arg(host, &args, 0)))
        }),
    )?;
    define(
        "all",
        native_fn(|host: &dyn ScriptHost<V>, args: Vec<V>| host.wrap_promise(&all(host, args))),
    )?;
    define(
        "race",
        native_fn(|host: &dyn ScriptHost<V>, args: Vec<V>| host.wrap_promise(&race(host, args))),
    )?;
    define(
        "allSettled",
        native_fn(|host: &dyn ScriptHost<V>, args: Vec<V>| {
            host.wrap_promise(&all_settled(host, args))
        }),
    )?;

    Ok(object)
}

/// Evaluates the shell, records its helpers and returns the constructor.
pub(crate) fn install(host: &QuickJsHost<'_>) -> Result<JsValue, JsValue> {
    let shell = host.evaluate("<promise>", PROMISE_SHELL)?;
    let natives = natives(host)?;
    let undefined = host.undefined();
    let exported = host.call(&shell, &undefined, vec![natives])?;

    let constructor = host.get(&exported, "Promise")?;
    *host.state().shell.borrow_mut() = Some(PromiseShell {
        id_of: host.get(&exported, "idOf")?,
        wrap: host.get(&exported, "wrap")?,
    });
    Ok(constructor)
}
