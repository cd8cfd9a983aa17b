//! `Promise.all`, `Promise.race` and `Promise.allSettled`.
//!
//! Every input is first passed through [`Promise::resolved`], so plain
//! values and thenables are accepted alongside promises.

use crate::host::ScriptHost;
use crate::promise::{native_handler, Promise, Settlement};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Fulfills with every input's value, in input order, once all inputs have
/// fulfilled. Rejects with the first rejection. An empty input fulfills
/// with an empty array.
pub fn all<V: Clone + 'static>(host: &dyn ScriptHost<V>, inputs: Vec<V>) -> Promise<V> {
    let aggregate = Promise::new(host);
    if inputs.is_empty() {
        fulfill_with_array(host, &aggregate, Vec::new());
        return aggregate;
    }

    let slots: Rc<RefCell<Vec<Option<V>>>> = Rc::new(RefCell::new(vec![None; inputs.len()]));
    let remaining = Rc::new(Cell::new(inputs.len()));

    for (index, input) in inputs.into_iter().enumerate() {
        let on_fulfilled = {
            let aggregate = aggregate.clone();
            let slots = slots.clone();
            let remaining = remaining.clone();
            native_handler(move |host: &dyn ScriptHost<V>, value: V| {
                slots.borrow_mut()[index] = Some(value);
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    let values = collect_slots(host, &slots);
                    fulfill_with_array(host, &aggregate, values);
                }
                Ok(host.undefined())
            })
        };
        let on_rejected = {
            let aggregate = aggregate.clone();
            native_handler(move |host: &dyn ScriptHost<V>, reason: V| {
                aggregate.reject(host, reason);
                Ok(host.undefined())
            })
        };
        Promise::resolved(host, input).observe(host, on_fulfilled, on_rejected);
    }
    aggregate
}

/// Settles like the first input to settle. An empty input never settles.
pub fn race<V: Clone + 'static>(host: &dyn ScriptHost<V>, inputs: Vec<V>) -> Promise<V> {
    let aggregate = Promise::new(host);
    for input in inputs {
        let on_fulfilled = {
            let aggregate = aggregate.clone();
            native_handler(move |host: &dyn ScriptHost<V>, value: V| {
                aggregate.resolve(host, value);
                Ok(host.undefined())
            })
        };
        let on_rejected = {
            let aggregate = aggregate.clone();
            native_handler(move |host: &dyn ScriptHost<V>, reason: V| {
                aggregate.reject(host, reason);
                Ok(host.undefined())
            })
        };
        Promise::resolved(host, input).observe(host, on_fulfilled, on_rejected);
    }
    aggregate
}

/// Fulfills, once every input has settled, with one descriptor per input:
/// `{status: "fulfilled", value}` or `{status: "rejected", reason}`.
/// Never rejects.
pub fn all_settled<V: Clone + 'static>(host: &dyn ScriptHost<V>, inputs: Vec<V>) -> Promise<V> {
    let aggregate = Promise::new(host);
    if inputs.is_empty() {
        fulfill_with_array(host, &aggregate, Vec::new());
        return aggregate;
    }

    let slots: Rc<RefCell<Vec<Option<V>>>> = Rc::new(RefCell::new(vec![None; inputs.len()]));
    let remaining = Rc::new(Cell::new(inputs.len()));

    let record = move |index: usize, aggregate: Promise<V>| {
        let slots = slots.clone();
        let remaining = remaining.clone();
        move |host: &dyn ScriptHost<V>, settlement: Settlement<V>| -> Result<V, V> {
            let descriptor = match settled_descriptor(host, &settlement) {
                Ok(descriptor) => descriptor,
                Err(error) => {
                    aggregate.reject(host, error);
                    return Ok(host.undefined());
                }
            };
            slots.borrow_mut()[index] = Some(descriptor);
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                let values = collect_slots(host, &slots);
                fulfill_with_array(host, &aggregate, values);
            }
            Ok(host.undefined())
        }
    };

    for (index, input) in inputs.into_iter().enumerate() {
        let settle = Rc::new(record(index, aggregate.clone()));
        let on_fulfilled = {
            let settle = settle.clone();
            native_handler(move |host: &dyn ScriptHost<V>, value: V| {
                settle(host, Settlement::Fulfilled(value))
            })
        };
        let on_rejected = native_handler(move |host: &dyn ScriptHost<V>, reason: V| {
            settle(host, Settlement::Rejected(reason))
        });
        Promise::resolved(host, input).observe(host, on_fulfilled, on_rejected);
    }
    aggregate
}

/// Builds the `allSettled` descriptor object for one outcome.
pub fn settled_descriptor<V: Clone>(
    host: &dyn ScriptHost<V>,
    settlement: &Settlement<V>,
) -> Result<V, V> {
    let descriptor = host.new_object()?;
    match settlement {
        Settlement::Fulfilled(value) => {
            host.set(&descriptor, "status", host.string("fulfilled")?)?;
            host.set(&descriptor, "value", value.clone())?;
        }
        Settlement::Rejected(reason) => {
            host.set(&descriptor, "status", host.string("rejected")?)?;
            host.set(&descriptor, "reason", reason.clone())?;
        }
    }
    Ok(descriptor)
}

fn collect_slots<V: Clone>(host: &dyn ScriptHost<V>, slots: &RefCell<Vec<Option<V>>>) -> Vec<V> {
    slots
        .borrow_mut()
        .drain(..)
        .map(|slot| slot.unwrap_or_else(|| host.undefined()))
        .collect()
}

fn fulfill_with_array<V: Clone + 'static>(
    host: &dyn ScriptHost<V>,
    aggregate: &Promise<V>,
    values: Vec<V>,
) {
    match host.array(values) {
        Ok(array) => aggregate.resolve(host, array),
        Err(error) => aggregate.reject(host, error),
    }
}
