// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Deterministic fake timers.
//!
//! Replaces the timer functions of an environment's global object with mock
//! functions that queue callbacks on a virtual clock. Nothing runs until a
//! test asks for it through one of the `run_*` methods.

use parking_lot::Mutex;
use spacey_mock::ModuleMocker;
use spacey_value::{CallContext, Exception, JsResult, Object, Value, WeakObject};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};

/// Timers expiring later than this are never picked as the next timer
const MS_IN_A_YEAR: f64 = 31_536_000_000.0;

/// Unique identifier for a timer, tick or immediate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Timeout,
    Interval,
}

/// A scheduled timeout or interval
#[derive(Debug)]
struct Timer {
    kind: TimerKind,
    callback: Value,
    args: Vec<Value>,
    expiry: f64,
    interval: f64,
}

/// A queued tick or immediate
#[derive(Debug)]
struct Task {
    id: TimerId,
    callback: Value,
    args: Vec<Value>,
}

#[derive(Debug)]
struct Clock {
    now: f64,
    next_id: u64,
    timers: BTreeMap<TimerId, Timer>,
    ticks: VecDeque<Task>,
    immediates: VecDeque<Task>,
    /// Ticks and immediates that already ran or were cleared
    cancelled: HashSet<TimerId>,
}

impl Clock {
    fn new() -> Self {
        Self {
            now: 0.0,
            next_id: 1,
            timers: BTreeMap::new(),
            ticks: VecDeque::new(),
            immediates: VecDeque::new(),
            cancelled: HashSet::new(),
        }
    }

    fn allocate_id(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Soonest timer, lowest id first on ties
    fn next_timer(&self) -> Option<(TimerId, f64)> {
        let mut soonest = None;
        let mut soonest_time = MS_IN_A_YEAR;
        for (id, timer) in &self.timers {
            if timer.expiry < soonest_time {
                soonest_time = timer.expiry;
                soonest = Some((*id, timer.expiry));
            }
        }
        soonest
    }
}

/// Where an intercepted API lives
#[derive(Debug, Clone, Copy)]
enum ApiSlot {
    Global(&'static str),
    ProcessNextTick,
}

#[derive(Debug, Default)]
struct TimerApis {
    originals: Vec<(ApiSlot, Value)>,
    fakes: Vec<(ApiSlot, Value)>,
}

struct TimersInner {
    global: WeakObject,
    max_loops: usize,
    clock: Mutex<Clock>,
    apis: Mutex<TimerApis>,
}

/// Handle to the fake timers of one environment
#[derive(Clone)]
pub struct FakeTimers {
    inner: Arc<TimersInner>,
}

impl std::fmt::Debug for FakeTimers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clock = self.inner.clock.lock();
        f.debug_struct("FakeTimers")
            .field("now", &clock.now)
            .field("timers", &clock.timers.len())
            .field("ticks", &clock.ticks.len())
            .field("immediates", &clock.immediates.len())
            .finish()
    }
}

type FakeImpl = fn(&FakeTimers, &CallContext<'_>) -> JsResult<Value>;

impl FakeTimers {
    /// Install fake timers on `global`.
    ///
    /// The current timer functions are kept so they can be restored with
    /// [`use_real_timers`](Self::use_real_timers). The replacements are mock
    /// functions created by `mocker`, so their calls are recorded.
    pub fn new(global: &Object, mocker: &ModuleMocker, max_loops: usize) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<TimersInner>| {
            let fakes: Vec<(ApiSlot, Value)> = vec![
                (ApiSlot::Global("setTimeout"), fake(mocker, weak, "setTimeout", Self::fake_set_timeout)),
                (ApiSlot::Global("clearTimeout"), fake(mocker, weak, "clearTimeout", Self::fake_clear_timer)),
                (ApiSlot::Global("setInterval"), fake(mocker, weak, "setInterval", Self::fake_set_interval)),
                (ApiSlot::Global("clearInterval"), fake(mocker, weak, "clearInterval", Self::fake_clear_timer)),
                (ApiSlot::Global("setImmediate"), fake(mocker, weak, "setImmediate", Self::fake_set_immediate)),
                (ApiSlot::Global("clearImmediate"), fake(mocker, weak, "clearImmediate", Self::fake_clear_task)),
                (ApiSlot::ProcessNextTick, fake(mocker, weak, "nextTick", Self::fake_next_tick)),
            ];
            let originals = fakes
                .iter()
                .map(|(slot, _)| (*slot, read_slot(global, *slot)))
                .collect();

            TimersInner {
                global: global.downgrade(),
                max_loops,
                clock: Mutex::new(Clock::new()),
                apis: Mutex::new(TimerApis { originals, fakes }),
            }
        });

        let timers = Self { inner };
        timers.use_fake_timers();
        timers
    }

    /// Current virtual time in milliseconds
    pub fn now(&self) -> f64 {
        self.inner.clock.lock().now
    }

    /// Number of pending timeouts and intervals
    pub fn timer_count(&self) -> usize {
        self.inner.clock.lock().timers.len()
    }

    /// Drop every pending timeout, interval and immediate
    pub fn clear_all_timers(&self) {
        let mut clock = self.inner.clock.lock();
        clock.timers.clear();
        clock.immediates.clear();
    }

    /// Drop all pending work and rewind the clock to 0
    pub fn reset(&self) {
        let mut clock = self.inner.clock.lock();
        let next_id = clock.next_id;
        *clock = Clock::new();
        clock.next_id = next_id;
    }

    /// Run queued `process.nextTick` callbacks, including ones they queue
    pub fn run_all_ticks(&self) -> JsResult<()> {
        self.drain_queue("ticks", |clock| &mut clock.ticks)
    }

    /// Run queued `setImmediate` callbacks, including ones they queue
    pub fn run_all_immediates(&self) -> JsResult<()> {
        self.drain_queue("immediates", |clock| &mut clock.immediates)
    }

    /// Run ticks, then timers in expiry order until none are left
    pub fn run_all_timers(&self) -> JsResult<()> {
        self.run_all_ticks()?;

        for _ in 0..self.inner.max_loops {
            let next = self.inner.clock.lock().next_timer();
            let Some((id, expiry)) = next else {
                return Ok(());
            };
            self.advance_to(expiry);
            self.run_timer(id)?;
        }

        if self.inner.clock.lock().next_timer().is_some() {
            return Err(self.overflow("timers"));
        }
        Ok(())
    }

    /// Run only the timers pending right now, in expiry order.
    ///
    /// Timers scheduled by these callbacks stay queued.
    pub fn run_only_pending_timers(&self) -> JsResult<()> {
        let pending: Vec<(TimerId, f64)> = {
            let clock = self.inner.clock.lock();
            let mut pending: Vec<_> = clock
                .timers
                .iter()
                .map(|(id, timer)| (*id, timer.expiry))
                .collect();
            pending.sort_by(|a, b| a.1.total_cmp(&b.1));
            pending
        };

        for (id, expiry) in pending {
            if !self.inner.clock.lock().timers.contains_key(&id) {
                continue;
            }
            self.advance_to(expiry);
            self.run_timer(id)?;
        }
        Ok(())
    }

    /// Advance the clock by `ms`, running every timer that expires on the way
    pub fn run_timers_to_time(&self, ms: f64) -> JsResult<()> {
        let mut remaining = ms.max(0.0);

        for _ in 0..self.inner.max_loops {
            let step = {
                let mut clock = self.inner.clock.lock();
                match clock.next_timer() {
                    Some((id, expiry)) if clock.now + remaining >= expiry => {
                        remaining -= (expiry - clock.now).max(0.0);
                        clock.now = clock.now.max(expiry);
                        Some(id)
                    }
                    _ => {
                        clock.now += remaining;
                        None
                    }
                }
            };
            match step {
                Some(id) => self.run_timer(id)?,
                None => return Ok(()),
            }
        }

        Err(self.overflow("timers"))
    }

    /// Install the fake timer functions on the global object
    pub fn use_fake_timers(&self) {
        let fakes = self.inner.apis.lock().fakes.clone();
        self.install(&fakes);
    }

    /// Restore the timer functions that were present before installation
    pub fn use_real_timers(&self) {
        let originals = self.inner.apis.lock().originals.clone();
        self.install(&originals);
    }

    /// Run `f` with the original timer functions installed, then put back
    /// whatever was installed before
    pub fn run_with_real_timers<T>(&self, f: impl FnOnce() -> T) -> T {
        let current = match self.inner.global.upgrade() {
            Some(global) => {
                let apis = self.inner.apis.lock();
                apis.originals
                    .iter()
                    .map(|(slot, _)| (*slot, read_slot(&global, *slot)))
                    .collect::<Vec<_>>()
            }
            None => Vec::new(),
        };
        self.use_real_timers();
        let result = f();
        self.install(&current);
        result
    }

    /// Tear down: drop pending work and restore the real timer functions
    pub fn dispose(&self) {
        self.reset();
        self.use_real_timers();
        tracing::trace!("Fake timers disposed");
    }

    fn install(&self, values: &[(ApiSlot, Value)]) {
        let Some(global) = self.inner.global.upgrade() else {
            return;
        };
        for (slot, value) in values {
            write_slot(&global, *slot, value.clone());
        }
    }

    fn advance_to(&self, expiry: f64) {
        let mut clock = self.inner.clock.lock();
        clock.now = clock.now.max(expiry);
    }

    fn run_timer(&self, id: TimerId) -> JsResult<()> {
        let job = {
            let mut clock = self.inner.clock.lock();
            let now = clock.now;
            let kind = match clock.timers.get(&id) {
                Some(timer) => timer.kind,
                None => return Ok(()),
            };
            match kind {
                TimerKind::Timeout => clock
                    .timers
                    .remove(&id)
                    .map(|timer| (timer.callback, timer.args)),
                TimerKind::Interval => clock.timers.get_mut(&id).map(|timer| {
                    timer.expiry = now + timer.interval;
                    (timer.callback.clone(), timer.args.clone())
                }),
            }
        };

        match job {
            Some((callback, args)) => callback.call(Value::Undefined, &args).map(drop),
            None => Ok(()),
        }
    }

    fn run_task(&self, task: Task) -> JsResult<()> {
        let fresh = self.inner.clock.lock().cancelled.insert(task.id);
        if fresh {
            task.callback.call(Value::Undefined, &task.args)?;
        }
        Ok(())
    }

    fn drain_queue(&self, what: &str, queue: fn(&mut Clock) -> &mut VecDeque<Task>) -> JsResult<()> {
        for _ in 0..self.inner.max_loops {
            let task = queue(&mut self.inner.clock.lock()).pop_front();
            let Some(task) = task else {
                return Ok(());
            };
            self.run_task(task)?;
        }

        if queue(&mut self.inner.clock.lock()).is_empty() {
            Ok(())
        } else {
            Err(self.overflow(what))
        }
    }

    fn overflow(&self, what: &str) -> Exception {
        Exception::error(format!(
            "Ran {} {}, and there are still more! Assuming we've hit an infinite recursion and bailing out...",
            self.inner.max_loops, what
        ))
    }

    fn schedule(&self, kind: TimerKind, ctx: &CallContext<'_>) -> Value {
        let delay = ctx
            .arg(1)
            .as_number()
            .filter(|delay| delay.is_finite())
            .unwrap_or(0.0);
        let mut clock = self.inner.clock.lock();
        let id = clock.allocate_id();
        let expiry = clock.now + delay;
        clock.timers.insert(
            id,
            Timer {
                kind,
                callback: ctx.arg(0),
                args: ctx.rest(2).to_vec(),
                expiry,
                interval: delay,
            },
        );
        Value::from(id.0 as f64)
    }

    fn fake_set_timeout(&self, ctx: &CallContext<'_>) -> JsResult<Value> {
        Ok(self.schedule(TimerKind::Timeout, ctx))
    }

    fn fake_set_interval(&self, ctx: &CallContext<'_>) -> JsResult<Value> {
        Ok(self.schedule(TimerKind::Interval, ctx))
    }

    fn fake_clear_timer(&self, ctx: &CallContext<'_>) -> JsResult<Value> {
        if let Some(id) = timer_id(&ctx.arg(0)) {
            self.inner.clock.lock().timers.remove(&id);
        }
        Ok(Value::Undefined)
    }

    fn fake_clear_task(&self, ctx: &CallContext<'_>) -> JsResult<Value> {
        if let Some(id) = timer_id(&ctx.arg(0)) {
            self.inner.clock.lock().cancelled.insert(id);
        }
        Ok(Value::Undefined)
    }

    fn fake_set_immediate(&self, ctx: &CallContext<'_>) -> JsResult<Value> {
        let task = self.queue_task(ctx.arg(0), ctx.rest(1).to_vec());
        let id = task.id;
        self.inner.clock.lock().immediates.push_back(task);
        self.forward_to_original(ApiSlot::Global("setImmediate"), id, ctx)?;
        Ok(Value::from(id.0 as f64))
    }

    fn fake_next_tick(&self, ctx: &CallContext<'_>) -> JsResult<Value> {
        let task = self.queue_task(ctx.arg(0), ctx.rest(1).to_vec());
        let id = task.id;
        self.inner.clock.lock().ticks.push_back(task);
        self.forward_to_original(ApiSlot::ProcessNextTick, id, ctx)?;
        Ok(Value::Undefined)
    }

    fn queue_task(&self, callback: Value, args: Vec<Value>) -> Task {
        let id = self.inner.clock.lock().allocate_id();
        Task { id, callback, args }
    }

    /// Also schedule the task with the real API, if there is one. Whichever
    /// side runs it first marks it as done.
    fn forward_to_original(&self, slot: ApiSlot, id: TimerId, ctx: &CallContext<'_>) -> JsResult<()> {
        let original = {
            let apis = self.inner.apis.lock();
            apis.originals
                .iter()
                .find(|(s, _)| same_slot(*s, slot))
                .map(|(_, value)| value.clone())
        };
        let Some(original) = original.filter(Value::is_function) else {
            return Ok(());
        };

        let weak = Arc::downgrade(&self.inner);
        let callback = ctx.arg(0);
        let args = ctx.rest(1).to_vec();
        let once = Object::function("runOnce", move |_| {
            let Some(inner) = weak.upgrade() else {
                return Ok(Value::Undefined);
            };
            let timers = FakeTimers { inner };
            timers.run_task(Task {
                id,
                callback: callback.clone(),
                args: args.clone(),
            })?;
            Ok(Value::Undefined)
        });
        original.call(Value::Undefined, &[Value::from(once)])?;
        Ok(())
    }
}

fn fake(mocker: &ModuleMocker, weak: &Weak<TimersInner>, name: &str, behavior: FakeImpl) -> Value {
    let weak = weak.clone();
    let implementation = Object::function(name, move |ctx| match weak.upgrade() {
        Some(inner) => behavior(&FakeTimers { inner }, ctx),
        None => Ok(Value::Undefined),
    });
    let mock = mocker.get_mock_function();
    mock.mock_implementation(Some(implementation));
    mock.to_value()
}

fn timer_id(value: &Value) -> Option<TimerId> {
    value
        .as_number()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| TimerId(n as u64))
}

fn same_slot(a: ApiSlot, b: ApiSlot) -> bool {
    match (a, b) {
        (ApiSlot::Global(x), ApiSlot::Global(y)) => x == y,
        (ApiSlot::ProcessNextTick, ApiSlot::ProcessNextTick) => true,
        _ => false,
    }
}

fn read_slot(global: &Object, slot: ApiSlot) -> Value {
    match slot {
        ApiSlot::Global(name) => global.get(name),
        ApiSlot::ProcessNextTick => global.get("process").get("nextTick"),
    }
}

fn write_slot(global: &Object, slot: ApiSlot, value: Value) {
    match slot {
        ApiSlot::Global(name) => {
            if value.is_undefined() {
                global.delete(name);
            } else {
                global.set(name, value);
            }
        }
        ApiSlot::ProcessNextTick => {
            if let Some(process) = global.get("process").as_object() {
                if value.is_undefined() {
                    process.delete("nextTick");
                } else {
                    process.set("nextTick", value);
                }
            }
        }
    }
}
