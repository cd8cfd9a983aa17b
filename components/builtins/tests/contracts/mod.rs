//! Contract tests for builtins component
//!
//! These tests drive the script-visible objects through a real QuickJS
//! context and check what scripts observe.

mod fs_module_tests;
mod path_module_tests;

use rquickjs::{Context, Ctx, Runtime};

/// Run `f` inside a fresh context with `fs` and `path` bound as globals
pub fn with_modules<R>(f: impl FnOnce(&Ctx<'_>) -> R) -> R {
    let runtime = Runtime::new().unwrap();
    let context = Context::full(&runtime).unwrap();
    context.with(|ctx| {
        let globals = ctx.globals();
        for name in builtins::BUILTIN_MODULES {
            let module = builtins::create_module(&ctx, name).unwrap().unwrap();
            globals.set(name, module).unwrap();
        }
        f(&ctx)
    })
}

/// Evaluate `source`, returning the thrown error message on failure
pub fn eval<T>(ctx: &Ctx<'_>, source: &str) -> Result<T, String>
where
    T: for<'js> rquickjs::FromJs<'js>,
{
    ctx.eval::<T, _>(source).map_err(|_| {
        let thrown = ctx.catch();
        thrown
            .as_object()
            .and_then(|object| object.get::<_, String>("message").ok())
            .unwrap_or_else(|| "<non-error thrown>".to_string())
    })
}
