//! Per-test execution contexts.
//!
//! A [`TestExecutionContext`] holds the ambient state of one unit of test
//! work: the running test and its result, the assertion counter, the
//! sandboxed thread state, and the runner's collaborators. Contexts form a
//! chain through their prior context; a child never mutates its parent except
//! to propagate an [`ExecutionStatus`] upward.
//!
//! Each thread has a "current" context slot. Entry points take the context
//! explicitly, and the adapters in [`crate::adapter`] reinstall the context
//! they captured around every poll so the slot follows asynchronous work.

mod formatter;
mod isolated;
mod status;

pub use formatter::{ValueFormatter, ValueFormatterFactory, default_formatter};
pub use isolated::IsolatedContext;
pub use status::{ExecutionStatus, ParallelScope};

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use unic_langid::LanguageIdentifier;

use crate::ambient::{self, Principal};
use crate::model::{
    NullListener, SharedDispatcher, TestAction, TestInfo, TestListener, TestMessage, TestResult,
};
use crate::randomizer::Randomizer;
use crate::sandbox::SandboxedThreadState;

/// Name given to the test of a fabricated ad-hoc context.
pub const ADHOC_TEST_NAME: &str = "AdhocTestMethod";

/// How a context came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    /// Created by the runner for a unit of test work.
    Standard,
    /// Fabricated because code ran outside any established test.
    Adhoc,
}

struct ContextState {
    current_test: Option<Arc<TestInfo>>,
    current_result: Option<Arc<TestResult>>,
    test_object: Option<Arc<dyn Any + Send + Sync>>,
    thread_state: SandboxedThreadState,
    dispatcher: Option<SharedDispatcher>,
    parallel_scope: ParallelScope,
    random: Option<Randomizer>,
    upstream_actions: Vec<Arc<dyn TestAction>>,
    multiple_assert_level: usize,
    single_threaded: bool,
    test_case_timeout: Option<Duration>,
    stop_on_error: bool,
    work_directory: Option<PathBuf>,
    worker_id: Option<String>,
    start_time: Option<SystemTime>,
    start_instant: Option<Instant>,
    value_formatter: ValueFormatter,
    listener: Arc<dyn TestListener>,
}

impl ContextState {
    fn fresh() -> Self {
        Self {
            current_test: None,
            current_result: None,
            test_object: None,
            thread_state: SandboxedThreadState::capture(),
            dispatcher: None,
            parallel_scope: ParallelScope::default(),
            random: None,
            upstream_actions: Vec::new(),
            multiple_assert_level: 0,
            single_threaded: false,
            test_case_timeout: None,
            stop_on_error: false,
            work_directory: None,
            worker_id: None,
            start_time: None,
            start_instant: None,
            value_formatter: default_formatter(),
            listener: Arc::new(NullListener),
        }
    }

    fn inherit(other: &Self) -> Self {
        Self {
            current_test: other.current_test.clone(),
            current_result: other.current_result.clone(),
            test_object: other.test_object.clone(),
            thread_state: other.thread_state.clone(),
            dispatcher: other.dispatcher.clone(),
            parallel_scope: other.parallel_scope,
            random: None,
            upstream_actions: other.upstream_actions.clone(),
            multiple_assert_level: 0,
            single_threaded: other.single_threaded,
            test_case_timeout: other.test_case_timeout,
            stop_on_error: other.stop_on_error,
            work_directory: other.work_directory.clone(),
            worker_id: other.worker_id.clone(),
            start_time: None,
            start_instant: None,
            value_formatter: Arc::clone(&other.value_formatter),
            listener: Arc::clone(&other.listener),
        }
    }
}

/// Ambient state for one unit of test work.
///
/// Contexts are shared as `Arc<TestExecutionContext>`; every setter takes
/// `&self`.
///
/// # Examples
///
/// ```
/// use ambit::context::{ExecutionStatus, TestExecutionContext};
///
/// let root = TestExecutionContext::new();
/// let child = TestExecutionContext::child_of(&root);
/// child.set_execution_status(ExecutionStatus::StopRequested);
/// assert_eq!(root.execution_status(), ExecutionStatus::StopRequested);
/// ```
pub struct TestExecutionContext {
    prior: Option<Arc<TestExecutionContext>>,
    kind: ContextKind,
    execution_status: AtomicU8,
    assert_count: AtomicUsize,
    recording: Mutex<()>,
    state: Mutex<ContextState>,
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<TestExecutionContext>>> = const { RefCell::new(None) };
}

impl TestExecutionContext {
    fn with_state(
        prior: Option<Arc<Self>>,
        kind: ContextKind,
        state: ContextState,
    ) -> Arc<Self> {
        Arc::new(Self {
            prior,
            kind,
            execution_status: AtomicU8::new(ExecutionStatus::Running.as_u8()),
            assert_count: AtomicUsize::new(0),
            recording: Mutex::new(()),
            state: Mutex::new(state),
        })
    }

    /// Creates a root context from the calling thread's ambient state.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_state(None, ContextKind::Standard, ContextState::fresh())
    }

    /// Creates a child that starts as a copy of `parent`.
    ///
    /// The child has its own assertion counter, randomizer, and
    /// multiple-assert level.
    #[must_use]
    pub fn child_of(parent: &Arc<Self>) -> Arc<Self> {
        let state = ContextState::inherit(&parent.lock());
        Self::with_state(Some(Arc::clone(parent)), ContextKind::Standard, state)
    }

    /// Creates a minimal context with a synthetic test and a fresh result.
    #[must_use]
    pub fn adhoc() -> Arc<Self> {
        let test = Arc::new(TestInfo::new(ADHOC_TEST_NAME, ADHOC_TEST_NAME));
        let mut state = ContextState::fresh();
        state.current_result = Some(Arc::new(TestResult::new(test.full_name())));
        state.current_test = Some(test);
        Self::with_state(None, ContextKind::Adhoc, state)
    }

    fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The calling thread's current context.
    ///
    /// When none is installed an ad-hoc context is fabricated, installed, and
    /// returned, so assertion machinery always has a result to record into.
    #[must_use]
    pub fn current() -> Arc<Self> {
        CURRENT.with(|cell| {
            let mut slot = cell.borrow_mut();
            if let Some(context) = slot.as_ref() {
                return Arc::clone(context);
            }
            log::debug!("fabricating ad-hoc execution context");
            let context = Self::adhoc();
            *slot = Some(Arc::clone(&context));
            context
        })
    }

    /// The calling thread's current context, without fabricating one.
    #[must_use]
    pub fn current_opt() -> Option<Arc<Self>> {
        CURRENT.with(|cell| cell.borrow().clone())
    }

    /// Clears the calling thread's current context slot.
    pub fn clear_current() {
        CURRENT.with(|cell| cell.borrow_mut().take());
    }

    fn replace_current(context: Option<Arc<Self>>) -> Option<Arc<Self>> {
        CURRENT.with(|cell| cell.replace(context))
    }

    /// Restores this context's thread state and makes it current.
    pub fn establish_execution_environment(self: &Arc<Self>) {
        let thread_state = self.lock().thread_state.clone();
        thread_state.restore();
        Self::replace_current(Some(Arc::clone(self)));
    }

    /// Establishes this context until the returned guard drops.
    ///
    /// The guard restores the thread state and current context that were in
    /// place before, including when the scope unwinds.
    pub fn enter(self: &Arc<Self>) -> EstablishedScope {
        let previous_state = SandboxedThreadState::capture();
        let previous = Self::current_opt();
        self.establish_execution_environment();
        EstablishedScope {
            previous: Some((previous, Some(previous_state))),
            _not_send: PhantomData,
        }
    }

    /// Makes this context current until the returned guard drops, leaving
    /// the thread's ambient properties untouched.
    pub fn install(self: &Arc<Self>) -> EstablishedScope {
        let previous = Self::replace_current(Some(Arc::clone(self)));
        EstablishedScope {
            previous: Some((previous, None)),
            _not_send: PhantomData,
        }
    }

    /// Records changes the test made to the thread so later work inherits
    /// them.
    pub fn update_context_from_environment(&self) {
        self.lock().thread_state = SandboxedThreadState::capture();
    }

    /// Context this one was created from.
    #[must_use]
    pub fn prior(&self) -> Option<&Arc<Self>> {
        self.prior.as_ref()
    }

    /// How the context was created.
    #[must_use]
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Returns `true` for fabricated ad-hoc contexts.
    #[must_use]
    pub fn is_adhoc(&self) -> bool {
        self.kind == ContextKind::Adhoc
    }

    /// Whether the run should continue.
    ///
    /// A context still marked running reflects any status set on its
    /// ancestors.
    #[must_use]
    pub fn execution_status(&self) -> ExecutionStatus {
        let own = ExecutionStatus::from_u8(self.execution_status.load(Ordering::Acquire));
        if own != ExecutionStatus::Running {
            return own;
        }
        let Some(prior) = &self.prior else {
            return own;
        };
        let inherited = prior.execution_status();
        if inherited != ExecutionStatus::Running {
            self.execution_status
                .store(inherited.as_u8(), Ordering::Release);
        }
        inherited
    }

    /// Sets the status here and on every ancestor.
    pub fn set_execution_status(&self, status: ExecutionStatus) {
        self.execution_status.store(status.as_u8(), Ordering::Release);
        if let Some(prior) = &self.prior {
            prior.set_execution_status(status);
        }
    }

    /// Test being run.
    #[must_use]
    pub fn current_test(&self) -> Option<Arc<TestInfo>> {
        self.lock().current_test.clone()
    }

    /// Sets the test being run.
    pub fn set_current_test(&self, test: Option<Arc<TestInfo>>) {
        let mut state = self.lock();
        state.current_test = test;
        state.random = None;
    }

    /// Result the test records into.
    #[must_use]
    pub fn current_result(&self) -> Option<Arc<TestResult>> {
        self.lock().current_result.clone()
    }

    /// Sets the result the test records into.
    pub fn set_current_result(&self, result: Option<Arc<TestResult>>) {
        self.lock().current_result = result;
    }

    /// Appends `text` to the current result's output.
    pub fn write_output(&self, text: &str) {
        if let Some(result) = self.current_result() {
            result.write_output(text);
        }
    }

    /// Fixture instance the test runs against.
    #[must_use]
    pub fn test_object(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.lock().test_object.clone()
    }

    /// Sets the fixture instance the test runs against.
    pub fn set_test_object(&self, object: Option<Arc<dyn Any + Send + Sync>>) {
        self.lock().test_object = object;
    }

    /// Snapshot of the thread state this context establishes.
    #[must_use]
    pub fn thread_state(&self) -> SandboxedThreadState {
        self.lock().thread_state.clone()
    }

    /// Dispatcher running this context's work.
    #[must_use]
    pub fn dispatcher(&self) -> Option<SharedDispatcher> {
        self.lock().dispatcher.clone()
    }

    /// Sets the dispatcher running this context's work.
    pub fn set_dispatcher(&self, dispatcher: Option<SharedDispatcher>) {
        self.lock().dispatcher = dispatcher;
    }

    /// Parallel scope of the running item.
    #[must_use]
    pub fn parallel_scope(&self) -> ParallelScope {
        self.lock().parallel_scope
    }

    /// Sets the parallel scope of the running item.
    pub fn set_parallel_scope(&self, scope: ParallelScope) {
        self.lock().parallel_scope = scope;
    }

    /// Runs `body` with this test's randomizer, seeding it on first use.
    pub fn with_random<R>(&self, body: impl FnOnce(&mut Randomizer) -> R) -> R {
        let mut random = {
            let mut state = self.lock();
            let seed = state.current_test.as_ref().map_or(0, |test| test.seed());
            state.random.take().unwrap_or_else(|| Randomizer::new(seed))
        };
        let value = body(&mut random);
        self.lock().random = Some(random);
        value
    }

    /// Actions declared by enclosing items.
    #[must_use]
    pub fn upstream_actions(&self) -> Vec<Arc<dyn TestAction>> {
        self.lock().upstream_actions.clone()
    }

    /// Adds an action declared by an enclosing item.
    pub fn add_upstream_action(&self, action: Arc<dyn TestAction>) {
        self.lock().upstream_actions.push(action);
    }

    /// Nesting depth of multiple-assert blocks.
    #[must_use]
    pub fn multiple_assert_level(&self) -> usize {
        self.lock().multiple_assert_level
    }

    /// Sets the nesting depth of multiple-assert blocks.
    pub fn set_multiple_assert_level(&self, level: usize) {
        self.lock().multiple_assert_level = level;
    }

    /// Returns `true` when all work must stay on one thread.
    #[must_use]
    pub fn is_single_threaded(&self) -> bool {
        self.lock().single_threaded
    }

    /// Marks whether all work must stay on one thread.
    pub fn set_single_threaded(&self, single_threaded: bool) {
        self.lock().single_threaded = single_threaded;
    }

    /// Timeout applied to each test case.
    #[must_use]
    pub fn test_case_timeout(&self) -> Option<Duration> {
        self.lock().test_case_timeout
    }

    /// Sets the timeout applied to each test case.
    pub fn set_test_case_timeout(&self, timeout: Option<Duration>) {
        self.lock().test_case_timeout = timeout;
    }

    /// Returns `true` when the run stops at the first error.
    #[must_use]
    pub fn stop_on_error(&self) -> bool {
        self.lock().stop_on_error
    }

    /// Sets whether the run stops at the first error.
    pub fn set_stop_on_error(&self, stop_on_error: bool) {
        self.lock().stop_on_error = stop_on_error;
    }

    /// Working directory for the test.
    #[must_use]
    pub fn work_directory(&self) -> Option<PathBuf> {
        self.lock().work_directory.clone()
    }

    /// Sets the working directory for the test.
    pub fn set_work_directory(&self, directory: Option<&Path>) {
        self.lock().work_directory = directory.map(Path::to_path_buf);
    }

    /// Name of the worker running the context.
    #[must_use]
    pub fn worker_id(&self) -> Option<String> {
        self.lock().worker_id.clone()
    }

    /// Sets the name of the worker running the context.
    pub fn set_worker_id(&self, worker_id: Option<String>) {
        self.lock().worker_id = worker_id;
    }

    /// Wall-clock time the test started.
    #[must_use]
    pub fn start_time(&self) -> Option<SystemTime> {
        self.lock().start_time
    }

    /// Time elapsed since [`TestExecutionContext::mark_started`].
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.lock().start_instant.map(|start| start.elapsed())
    }

    /// Stamps the start time of the test.
    pub fn mark_started(&self) {
        let mut state = self.lock();
        state.start_time = Some(SystemTime::now());
        state.start_instant = Some(Instant::now());
    }

    /// Listener receiving this context's events.
    #[must_use]
    pub fn listener(&self) -> Arc<dyn TestListener> {
        Arc::clone(&self.lock().listener)
    }

    /// Sets the listener receiving this context's events.
    pub fn set_listener(&self, listener: Arc<dyn TestListener>) {
        self.lock().listener = listener;
    }

    /// Number of assertions counted in this context.
    #[must_use]
    pub fn assert_count(&self) -> usize {
        self.assert_count.load(Ordering::Acquire)
    }

    /// Counts one assertion.
    pub fn increment_assert_count(&self) {
        self.assert_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Counts `count` assertions.
    pub fn increment_assert_count_by(&self, count: usize) {
        self.assert_count.fetch_add(count, Ordering::AcqRel);
    }

    /// Adds a formatter to the head of the chain.
    pub fn add_formatter(&self, factory: ValueFormatterFactory) {
        let mut state = self.lock();
        let current = Arc::clone(&state.value_formatter);
        state.value_formatter = factory(current);
    }

    /// Current head of the formatter chain.
    #[must_use]
    pub fn value_formatter(&self) -> ValueFormatter {
        Arc::clone(&self.lock().value_formatter)
    }

    /// Renders `value` with the formatter chain.
    #[must_use]
    pub fn format_value(&self, value: &dyn Any) -> String {
        let formatter = self.value_formatter();
        formatter(value)
    }

    /// Forwards a message to the listener, tagged with the current test id.
    pub fn send_message(&self, destination: &str, message: &str) {
        let (listener, test_id) = {
            let state = self.lock();
            let test_id = state
                .current_test
                .as_ref()
                .map_or_else(String::new, |test| test.id().to_owned());
            (Arc::clone(&state.listener), test_id)
        };
        listener.send_message(TestMessage {
            destination: destination.to_owned(),
            text: message.to_owned(),
            test_id,
        });
    }

    /// Culture this context establishes.
    #[must_use]
    pub fn culture(&self) -> LanguageIdentifier {
        self.lock().thread_state.culture().clone()
    }

    /// Sets the culture on the snapshot and on the calling thread.
    pub fn set_culture(&self, culture: LanguageIdentifier) {
        let mut state = self.lock();
        state.thread_state = state.thread_state.clone().with_culture(culture.clone());
        ambient::set_culture(culture);
    }

    /// UI culture this context establishes.
    #[must_use]
    pub fn ui_culture(&self) -> LanguageIdentifier {
        self.lock().thread_state.ui_culture().clone()
    }

    /// Sets the UI culture on the snapshot and on the calling thread.
    pub fn set_ui_culture(&self, culture: LanguageIdentifier) {
        let mut state = self.lock();
        state.thread_state = state.thread_state.clone().with_ui_culture(culture.clone());
        ambient::set_ui_culture(culture);
    }

    /// Principal this context establishes.
    #[must_use]
    pub fn principal(&self) -> Option<Arc<dyn Principal>> {
        self.lock().thread_state.principal().cloned()
    }

    /// Sets the principal on the snapshot and on the calling thread.
    pub fn set_principal(&self, principal: Option<Arc<dyn Principal>>) {
        let mut state = self.lock();
        state.thread_state = state.thread_state.clone().with_principal(principal.clone());
        ambient::set_principal(principal);
    }

    /// Serialises concurrent recordings into this context's result.
    pub fn recording_lock(&self) -> MutexGuard<'_, ()> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for TestExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("TestExecutionContext")
            .field("kind", &self.kind)
            .field(
                "current_test",
                &state.current_test.as_ref().map(|test| test.full_name().to_owned()),
            )
            .field("assert_count", &self.assert_count())
            .field("thread_state", &state.thread_state)
            .field("has_prior", &self.prior.is_some())
            .finish_non_exhaustive()
    }
}

/// Guard returned by [`TestExecutionContext::enter`] and
/// [`TestExecutionContext::install`].
#[must_use = "dropping the scope restores the previous context immediately"]
pub struct EstablishedScope {
    previous: Option<(
        Option<Arc<TestExecutionContext>>,
        Option<SandboxedThreadState>,
    )>,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for EstablishedScope {
    fn drop(&mut self) {
        if let Some((previous, thread_state)) = self.previous.take() {
            if let Some(thread_state) = thread_state {
                thread_state.restore();
            }
            TestExecutionContext::replace_current(previous);
        }
    }
}

#[cfg(test)]
mod tests;
