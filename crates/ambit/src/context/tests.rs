//! Tests for execution contexts and the current-context slot.

use super::*;
use crate::ambient::GenericPrincipal;
use crate::model::{AssertionResult, AssertionStatus};
use rstest::{fixture, rstest};
use std::sync::Mutex;
use std::thread;
use unic_langid::langid;

#[derive(Default)]
struct RecordingListener {
    messages: Mutex<Vec<TestMessage>>,
}

impl TestListener for RecordingListener {
    fn send_message(&self, message: TestMessage) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}

/// Root context running a named test, established on the calling thread.
#[fixture]
fn running_test() -> Arc<TestExecutionContext> {
    TestExecutionContext::clear_current();
    let context = TestExecutionContext::new();
    let test = Arc::new(TestInfo::new("42", "Suite.Fixture.Case").with_seed(1234));
    context.set_current_result(Some(Arc::new(TestResult::new(test.full_name()))));
    context.set_current_test(Some(test));
    context.establish_execution_environment();
    context
}

#[test]
fn current_fabricates_an_adhoc_context_once() {
    TestExecutionContext::clear_current();
    assert!(TestExecutionContext::current_opt().is_none());
    let first = TestExecutionContext::current();
    assert!(first.is_adhoc());
    assert!(first.current_result().is_some());
    assert_eq!(
        first.current_test().map(|test| test.name().to_owned()),
        Some(ADHOC_TEST_NAME.to_owned())
    );
    let second = TestExecutionContext::current();
    assert!(Arc::ptr_eq(&first, &second));
    TestExecutionContext::clear_current();
}

#[test]
fn stop_request_propagates_three_levels_up() {
    let root = TestExecutionContext::new();
    let level1 = TestExecutionContext::child_of(&root);
    let level2 = TestExecutionContext::child_of(&level1);
    let level3 = TestExecutionContext::child_of(&level2);
    level3.set_execution_status(ExecutionStatus::StopRequested);
    assert_eq!(root.execution_status(), ExecutionStatus::StopRequested);
    assert_eq!(level1.execution_status(), ExecutionStatus::StopRequested);
    assert_eq!(level2.execution_status(), ExecutionStatus::StopRequested);
}

#[test]
fn running_children_read_through_to_ancestors() {
    let root = TestExecutionContext::new();
    let child = TestExecutionContext::child_of(&root);
    let grandchild = TestExecutionContext::child_of(&child);
    assert_eq!(grandchild.execution_status(), ExecutionStatus::Running);
    root.set_execution_status(ExecutionStatus::AbortRequested);
    assert_eq!(grandchild.execution_status(), ExecutionStatus::AbortRequested);
}

#[rstest]
fn children_copy_settings_but_not_counters(running_test: Arc<TestExecutionContext>) {
    running_test.set_single_threaded(true);
    running_test.set_stop_on_error(true);
    running_test.set_parallel_scope(ParallelScope::CHILDREN);
    running_test.set_test_case_timeout(Some(Duration::from_secs(3)));
    running_test.increment_assert_count_by(5);
    running_test.set_multiple_assert_level(2);

    let child = TestExecutionContext::child_of(&running_test);
    assert!(child.is_single_threaded());
    assert!(child.stop_on_error());
    assert_eq!(child.parallel_scope(), ParallelScope::CHILDREN);
    assert_eq!(child.test_case_timeout(), Some(Duration::from_secs(3)));
    assert_eq!(child.assert_count(), 0);
    assert_eq!(child.multiple_assert_level(), 0);
    assert!(child.prior().is_some_and(|prior| Arc::ptr_eq(prior, &running_test)));
}

#[rstest]
fn assertion_counter_is_atomic(running_test: Arc<TestExecutionContext>) {
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let context = Arc::clone(&running_test);
            thread::spawn(move || {
                for _ in 0..250 {
                    context.increment_assert_count();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap_or_else(|_| panic!("worker panicked"));
    }
    assert_eq!(running_test.assert_count(), 1000);
}

#[rstest]
fn isolation_round_trip_restores_the_enclosing_context(
    running_test: Arc<TestExecutionContext>,
) {
    running_test.increment_assert_count();
    let before = running_test.thread_state();
    {
        let isolated = IsolatedContext::enter();
        let inner = isolated.context();
        assert!(Arc::ptr_eq(&TestExecutionContext::current(), inner));
        inner.increment_assert_count_by(10);
        inner.set_culture(langid!("de-DE"));
        inner.set_principal(Some(Arc::new(GenericPrincipal::new("inner", ["x"]))));
        if let Some(result) = inner.current_result() {
            result.record_assertion(AssertionResult::new(AssertionStatus::Failed, "inner"));
        }
        assert_eq!(ambient::culture(), langid!("de-DE"));
    }
    assert!(Arc::ptr_eq(&TestExecutionContext::current(), &running_test));
    assert_eq!(running_test.assert_count(), 1);
    assert!(running_test.thread_state().same_as(&before));
    assert_eq!(ambient::culture(), langid!("en-US"));
    assert!(ambient::principal().is_none());
    let parent_result = running_test
        .current_result()
        .unwrap_or_else(|| panic!("fixture installs a result"));
    assert!(parent_result.assertion_results().is_empty());
    TestExecutionContext::clear_current();
}

#[rstest]
fn isolation_restores_on_unwind(running_test: Arc<TestExecutionContext>) {
    let outcome = std::panic::catch_unwind(|| {
        let isolated = IsolatedContext::enter();
        isolated.context().set_culture(langid!("fr-FR"));
        panic!("inside isolation");
    });
    assert!(outcome.is_err());
    assert!(Arc::ptr_eq(&TestExecutionContext::current(), &running_test));
    assert_eq!(ambient::culture(), langid!("en-US"));
    TestExecutionContext::clear_current();
}

#[rstest]
fn isolated_output_is_flushed_to_the_parent(running_test: Arc<TestExecutionContext>) {
    running_test.write_output("outer;");
    {
        let isolated = IsolatedContext::enter();
        isolated.context().write_output("inner;");
    }
    let output = running_test
        .current_result()
        .map(|result| result.output())
        .unwrap_or_default();
    assert_eq!(output, "outer;inner;");
    TestExecutionContext::clear_current();
}

#[rstest]
fn enter_restores_previous_context_and_thread_state(running_test: Arc<TestExecutionContext>) {
    let other = TestExecutionContext::new();
    other.set_culture(langid!("es-ES"));
    ambient::set_culture(langid!("en-US"));
    {
        let _scope = other.enter();
        assert_eq!(ambient::culture(), langid!("es-ES"));
        assert!(Arc::ptr_eq(&TestExecutionContext::current(), &other));
    }
    assert_eq!(ambient::culture(), langid!("en-US"));
    assert!(Arc::ptr_eq(&TestExecutionContext::current(), &running_test));
    TestExecutionContext::clear_current();
}

#[rstest]
fn update_from_environment_captures_thread_changes(running_test: Arc<TestExecutionContext>) {
    ambient::set_ui_culture(langid!("fr"));
    running_test.update_context_from_environment();
    assert_eq!(running_test.ui_culture(), langid!("fr"));
    ambient::set_ui_culture(langid!("en-US"));
    running_test.establish_execution_environment();
    assert_eq!(ambient::ui_culture(), langid!("fr"));
    running_test.set_ui_culture(langid!("en-US"));
    TestExecutionContext::clear_current();
}

#[rstest]
fn randomizer_is_seeded_from_the_test(running_test: Arc<TestExecutionContext>) {
    let first = running_test.with_random(Randomizer::next_u64);
    let mut expected = Randomizer::new(1234);
    assert_eq!(first, expected.next_u64());
    let second = running_test.with_random(Randomizer::next_u64);
    assert_eq!(second, expected.next_u64());
    TestExecutionContext::clear_current();
}

#[rstest]
fn messages_carry_the_current_test_id(running_test: Arc<TestExecutionContext>) {
    let listener = Arc::new(RecordingListener::default());
    running_test.set_listener(listener.clone());
    running_test.send_message("progress", "halfway");
    let messages = listener
        .messages
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    assert_eq!(
        messages,
        vec![TestMessage {
            destination: "progress".to_owned(),
            text: "halfway".to_owned(),
            test_id: "42".to_owned(),
        }]
    );
    TestExecutionContext::clear_current();
}

#[rstest]
fn formatters_are_chained(running_test: Arc<TestExecutionContext>) {
    running_test.add_formatter(Box::new(|next: ValueFormatter| -> ValueFormatter {
        Arc::new(move |value: &dyn Any| {
            value
                .downcast_ref::<i32>()
                .map_or_else(|| next(value), |number| format!("#{number}"))
        })
    }));
    assert_eq!(running_test.format_value(&7_i32), "#7");
    assert_eq!(running_test.format_value(&true), "true");
    let child = TestExecutionContext::child_of(&running_test);
    assert_eq!(child.format_value(&8_i32), "#8");
    TestExecutionContext::clear_current();
}

#[test]
fn recording_lock_serialises_writers() {
    let context = TestExecutionContext::adhoc();
    let guard = context.recording_lock();
    let contender = Arc::clone(&context);
    let handle = thread::spawn(move || {
        let _held = contender.recording_lock();
    });
    thread::sleep(Duration::from_millis(10));
    assert!(!handle.is_finished());
    drop(guard);
    handle.join().unwrap_or_else(|_| panic!("contender panicked"));
}
