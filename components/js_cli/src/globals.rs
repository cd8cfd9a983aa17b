//! Globals installed into every context
//!
//! Timers, `queueMicrotask`, `require`, `console`, `Promise` and the
//! `global` alias. Timer and microtask callbacks are saved as [`JsValue`]s
//! and run later by the event loop, outside the call that scheduled them.

use crate::host::{HostState, JsValue, QuickJsHost};
use crate::promise_global;
use async_runtime::{MicroTask, TimerId};
use core_types::JsError;
use rquickjs::function::{Func, Opt, Rest};
use rquickjs::{Coerced, Ctx, Exception, FromJs, Value};
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::debug;

/// Longest accepted timer delay, in milliseconds.
pub const MAX_DELAY_MS: f64 = 2_147_483_647.0;

/// Converts a script delay argument to a duration.
///
/// Missing, non-numeric, `NaN` and negative delays mean zero. Fractions
/// are truncated.
pub fn delay_from<'js>(ctx: &Ctx<'js>, delay: Option<Value<'js>>) -> Duration {
    let millis = match delay {
        Some(value) if !value.is_undefined() => match Coerced::<f64>::from_js(ctx, value) {
            Ok(millis) => millis.0,
            Err(_) => {
                let _ = ctx.catch();
                0.0
            }
        },
        _ => 0.0,
    };
    if millis.is_finite() && millis > 0.0 {
        Duration::from_millis(millis.min(MAX_DELAY_MS).trunc() as u64)
    } else {
        Duration::ZERO
    }
}

fn timer_id<'js>(ctx: &Ctx<'js>, id: Option<Value<'js>>) -> Option<TimerId> {
    let id = Coerced::<f64>::from_js(ctx, id?)
        .map_err(|_| ctx.catch())
        .ok()?
        .0;
    (id.is_finite() && id >= 0.0 && id <= f64::from(u32::MAX)).then(|| TimerId::from(id as u32))
}

type ScriptCallback = Box<dyn Fn() -> Result<(), JsError>>;

fn script_callback<'js>(
    ctx: &Ctx<'js>,
    state: &Weak<HostState>,
    api: &str,
    callback: Option<Value<'js>>,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<ScriptCallback> {
    let callback = match callback {
        Some(callback) if callback.is_function() => JsValue::save(ctx, callback),
        _ => {
            return Err(Exception::throw_type(
                ctx,
                &format!("{api} callback must be a function"),
            ))
        }
    };
    let args: Vec<JsValue> = args
        .into_iter()
        .map(|arg| JsValue::save(ctx, arg))
        .collect();
    let state = state.clone();
    Ok(Box::new(move || match state.upgrade() {
        Some(state) => state.invoke(&callback, &args),
        None => Ok(()),
    }))
}

fn install_timers<'js>(ctx: &Ctx<'js>, state: &Rc<HostState>) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    globals.set(
        "setTimeout",
        Func::from({
            let state = state.weak();
            move |ctx: Ctx<'js>,
                  callback: Opt<Value<'js>>,
                  delay: Opt<Value<'js>>,
                  args: Rest<Value<'js>>|
                  -> rquickjs::Result<u32> {
                let run = script_callback(&ctx, &state, "setTimeout", callback.0, args.0)?;
                let delay = delay_from(&ctx, delay.0);
                let Some(state) = state.upgrade() else { return Ok(0) };
                Ok(state.event_loop.set_timeout(move || run(), delay).get())
            }
        }),
    )?;

    globals.set(
        "setInterval",
        Func::from({
            let state = state.weak();
            move |ctx: Ctx<'js>,
                  callback: Opt<Value<'js>>,
                  delay: Opt<Value<'js>>,
                  args: Rest<Value<'js>>|
                  -> rquickjs::Result<u32> {
                let run = script_callback(&ctx, &state, "setInterval", callback.0, args.0)?;
                let interval = delay_from(&ctx, delay.0);
                let Some(state) = state.upgrade() else { return Ok(0) };
                Ok(state.event_loop.set_interval(move || run(), interval).get())
            }
        }),
    )?;

    globals.set(
        "setImmediate",
        Func::from({
            let state = state.weak();
            move |ctx: Ctx<'js>,
                  callback: Opt<Value<'js>>,
                  args: Rest<Value<'js>>|
                  -> rquickjs::Result<u32> {
                let run = script_callback(&ctx, &state, "setImmediate", callback.0, args.0)?;
                let Some(state) = state.upgrade() else { return Ok(0) };
                Ok(state.event_loop.set_immediate(move || run()).get())
            }
        }),
    )?;

    for name in ["clearTimeout", "clearInterval", "clearImmediate"] {
        let state = state.weak();
        globals.set(
            name,
            Func::from(move |ctx: Ctx<'js>, id: Opt<Value<'js>>| {
                let (Some(state), Some(id)) = (state.upgrade(), timer_id(&ctx, id.0)) else {
                    return;
                };
                // One id space for all three kinds, so any clear cancels any timer.
                state.event_loop.clear_timeout(id);
            }),
        )?;
    }

    globals.set(
        "queueMicrotask",
        Func::from({
            let state = state.weak();
            move |ctx: Ctx<'js>, callback: Opt<Value<'js>>| -> rquickjs::Result<()> {
                let run = script_callback(&ctx, &state, "queueMicrotask", callback.0, Vec::new())?;
                if let Some(state) = state.upgrade() {
                    state.event_loop.queue_microtask(MicroTask::new(move || run()));
                }
                Ok(())
            }
        }),
    )?;

    Ok(())
}

/// Points the global `require` at `base_dir`.
pub fn install_require(host: &QuickJsHost<'_>, base_dir: PathBuf) -> Result<(), JsError> {
    debug!(base_dir = %base_dir.display(), "global require");
    let require = host
        .state()
        .loader
        .require_function(host, base_dir)
        .map_err(|thrown| host.js_error(&thrown))?;
    let require = host
        .restore(&require)
        .map_err(|thrown| host.js_error(&thrown))?;
    host.check(host.ctx().globals().set("require", require))
}

/// Installs every global into the context behind `host`.
pub fn install(host: &QuickJsHost<'_>, base_dir: PathBuf) -> Result<(), JsError> {
    let ctx = host.ctx();
    let state = host.state();
    let globals = ctx.globals();

    host.check(globals.set("global", globals.clone()))?;

    let console = host.check(builtins::console::create(ctx, state.console.clone()))?;
    host.check(globals.set("console", console))?;

    for name in builtins::BUILTIN_MODULES {
        if let Some(module) = host.check(builtins::create_module(ctx, name))? {
            state
                .loader
                .register_builtin(name, host.save(module.into_value()));
        }
    }
    install_require(host, base_dir)?;

    host.check(install_timers(ctx, state))?;

    let promise = promise_global::install(host).map_err(|thrown| host.js_error(&thrown))?;
    let promise = host
        .restore(&promise)
        .map_err(|thrown| host.js_error(&thrown))?;
    host.check(globals.set("Promise", promise))?;

    Ok(())
}
