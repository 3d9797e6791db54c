//! Integration tests for the choices pipeline.
//!
//! Time is driven by a `ManualClock`; nothing sleeps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use horizon_select::prelude::*;
use horizon_select_core::ManualClock;
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
struct Employee {
    id: u32,
    name: String,
    department: String,
    disabled: bool,
}

fn employee(id: u32, department: &str) -> Employee {
    Employee {
        id,
        name: format!("Employee {id}"),
        department: department.to_string(),
        disabled: id % 7 == 0,
    }
}

fn staff(count: u32) -> Vec<Employee> {
    (0..count)
        .map(|id| employee(id, &format!("Department {}", id % 10)))
        .collect()
}

/// In-memory source that counts how often the full collection is read.
struct CountingSource {
    inner: VecSource<Employee>,
    reads: AtomicUsize,
}

impl CountingSource {
    fn new(items: Vec<Employee>) -> Arc<Self> {
        Arc::new(Self {
            inner: VecSource::new(items, |e: &Employee, search: &str| {
                e.name.to_lowercase().contains(&search.to_lowercase())
            }),
            reads: AtomicUsize::new(0),
        })
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl DataSource<Employee> for CountingSource {
    fn items(&self) -> Result<Vec<Arc<Employee>>, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.items()
    }

    fn filter(
        &self,
        items: &[Arc<Employee>],
        search: &str,
    ) -> Result<Vec<Arc<Employee>>, SourceError> {
        self.inner.filter(items, search)
    }

    fn revision(&self) -> Option<u64> {
        self.inner.revision()
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    scheduler: Scheduler,
    source: Arc<CountingSource>,
    publications: Arc<AtomicUsize>,
}

impl Harness {
    fn new(items: Vec<Employee>) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let clock = Arc::new(ManualClock::new());
        let scheduler = Scheduler::with_clock(clock.clone());
        Self {
            clock,
            scheduler,
            source: CountingSource::new(items),
            publications: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn build(&self, builder: SelectChoicesBuilder<Employee>) -> SelectChoices<Employee> {
        let choices = builder.scheduler(self.scheduler.clone()).build().unwrap();
        let publications = self.publications.clone();
        choices.published().connect(move |_| {
            publications.fetch_add(1, Ordering::SeqCst);
        });
        choices
    }

    fn choices(&self, repeat: &str, config: ChoicesConfig) -> SelectChoices<Employee> {
        self.build(SelectChoices::builder(repeat, self.source.clone(), PathEvaluator).config(config))
    }

    /// Change the search text and let the debounce delay pass.
    fn search(&self, choices: &SelectChoices<Employee>, text: &str) {
        choices.set_search(text);
        self.clock.advance(choices.config().search_debounce);
        self.scheduler.run_ready();
    }

    fn publications(&self) -> usize {
        self.publications.load(Ordering::SeqCst)
    }
}

fn no_debounce() -> ChoicesConfig {
    ChoicesConfig::new().search_debounce(Duration::ZERO)
}

#[test]
fn parses_item_name_from_binding() {
    let descriptor =
        RepeatDescriptor::parse("person in people | filter: $select.search track by person.id")
            .unwrap();
    assert_eq!(descriptor.item_name(), "person");
    assert_eq!(descriptor.track_by_expression(), Some("person.id"));

    let harness = Harness::new(staff(3));
    let err = SelectChoices::builder("person people", harness.source.clone(), PathEvaluator)
        .build()
        .unwrap_err();
    assert!(matches!(err, ChoicesError::MalformedExpression { .. }));
}

#[test]
fn keys_follow_track_by_not_reference_identity() {
    let keys: KeyGetter<Employee> =
        KeyGetter::new("person", Some("person.id".to_string()), Arc::new(PathEvaluator));
    let a = Arc::new(employee(42, "Sales"));
    let b = Arc::new(Employee {
        name: "Renamed".to_string(),
        ..employee(42, "Legal")
    });
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(keys.key(&a).unwrap(), keys.key(&b).unwrap());
}

#[test]
fn refresh_is_idempotent() {
    let harness = Harness::new(staff(500));
    let choices = harness.build(
        SelectChoices::builder("person in people track by person.id", harness.source.clone(), PathEvaluator)
            .group_by("'department'")
            .config(no_debounce().visible_limit_when_searching(40).group_visible_limit_when_searching(7)),
    );
    harness.search(&choices, "employee 1");

    choices.refresh().unwrap();
    let first = choices.visible();
    choices.refresh().unwrap();
    let second = choices.visible();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(*first, *second);
}

#[test]
fn rapid_search_changes_coalesce() {
    let harness = Harness::new(staff(100));
    let choices = harness.choices("person in people", ChoicesConfig::new());
    let typed = ["e", "em", "emp", "empl", "emplo", "employ", "employe", "employee"];

    for text in typed {
        choices.set_search(text);
        harness.clock.advance(Duration::from_millis(30));
        harness.scheduler.run_ready();
    }
    assert_eq!(harness.publications(), 0);

    harness.clock.advance(Duration::from_millis(200));
    harness.scheduler.run_ready();
    assert_eq!(harness.publications(), 1);
    assert_eq!(choices.visible().search, "employee");
}

#[test]
fn spaced_search_changes_each_refresh() {
    let harness = Harness::new(staff(100));
    let choices = harness.choices("person in people", ChoicesConfig::new());

    for text in ["1", "2", "3", "4"] {
        choices.set_search(text);
        harness.clock.advance(Duration::from_millis(250));
        harness.scheduler.run_ready();
    }
    assert_eq!(harness.publications(), 4);
}

#[test]
fn global_cap_and_show_more() {
    let harness = Harness::new(staff(10_000));
    let choices = harness.choices(
        "person in people",
        no_debounce().visible_limit_when_searching(50),
    );

    choices.open().unwrap();
    assert_eq!(choices.visible().len(), 10_000);

    harness.search(&choices, "employee");
    let visible = choices.visible();
    assert_eq!(visible.len(), 50);
    assert_eq!(visible.remaining_count, 9_950);
    assert!(visible.truncated_while_searching);

    let reads = harness.source.reads();
    choices.show_more(None).unwrap();
    assert_eq!(choices.visible().len(), 100);
    assert_eq!(choices.visible().remaining_count, 9_900);
    assert_eq!(harness.source.reads(), reads, "show more must not re-read the source");

    choices.show_more(Some(1_000_000)).unwrap();
    assert_eq!(choices.current_global_limit(), Some(10_000));
    let visible = choices.visible();
    assert_eq!(visible.len(), 10_000);
    assert_eq!(visible.remaining_count, 0);
    assert!(!visible.truncated_while_searching);
}

#[test]
fn show_more_after_source_change_rescans() {
    let harness = Harness::new(staff(100));
    let choices = harness.choices(
        "person in people",
        no_debounce().visible_limit_when_searching(10),
    );
    harness.search(&choices, "employee");
    assert_eq!(choices.visible().remaining_count, 90);

    harness.source.inner.push(employee(100, "Department 0"));
    let reads = harness.source.reads();
    choices.show_more(None).unwrap();

    assert_eq!(harness.source.reads(), reads + 1);
    assert_eq!(choices.visible().len(), 60);
    assert_eq!(choices.visible().remaining_count, 41);
}

#[test]
fn group_caps_are_independent() {
    let mut items: Vec<Employee> = (0..200).map(|id| employee(id, "Sales")).collect();
    items.extend((200..205).map(|id| employee(id, "Legal")));
    let harness = Harness::new(items);
    let choices = harness.build(
        SelectChoices::builder("person in people", harness.source.clone(), PathEvaluator)
            .group_by("'department'")
            .config(no_debounce().group_visible_limit_when_searching(10)),
    );

    harness.search(&choices, "employee");
    let visible = choices.visible();
    let sales = visible.group("Sales").unwrap();
    let legal = visible.group("Legal").unwrap();
    assert_eq!(sales.items.len(), 10);
    assert!(sales.truncated);
    assert_eq!(sales.total_count, 200);
    assert_eq!(legal.items.len(), 5);
    assert!(!legal.truncated);

    choices.show_more_group("Sales", None).unwrap();
    let visible = choices.visible();
    assert_eq!(visible.group("Sales").unwrap().items.len(), 20);
    assert_eq!(visible.group("Legal").unwrap().items.len(), 5);

    let before = harness.publications();
    choices.show_more_group("", None).unwrap();
    choices.show_more_group("Marketing", None).unwrap();
    assert_eq!(harness.publications(), before);
}

#[test]
fn search_change_resets_caps() {
    let harness = Harness::new(staff(1_000));
    let choices = harness.build(
        SelectChoices::builder("person in people", harness.source.clone(), PathEvaluator)
            .group_by("person.department")
            .config(
                no_debounce()
                    .visible_limit_when_searching(50)
                    .group_visible_limit_when_searching(10),
            ),
    );

    harness.search(&choices, "employee");
    choices.show_more(None).unwrap();
    choices.show_more_group("Department 3", Some(5)).unwrap();
    assert_eq!(choices.current_global_limit(), Some(100));
    assert_eq!(choices.group_limit("Department 3"), Some(15));

    harness.search(&choices, "employee 1");
    assert_eq!(choices.current_global_limit(), Some(50));
    assert_eq!(choices.group_limit("Department 3"), Some(10));
}

#[test]
fn minimum_input_length_gates_results() {
    let harness = Harness::new(staff(100));
    let choices = harness.choices("person in people", no_debounce().minimum_input_length(3));

    choices.open().unwrap();
    assert!(choices.visible().is_empty());
    assert_eq!(harness.source.reads(), 0);

    harness.search(&choices, "em");
    assert!(choices.visible().is_empty());
    assert_eq!(harness.source.reads(), 0);

    harness.search(&choices, "emp");
    assert_eq!(choices.visible().len(), 100);
    assert_eq!(harness.source.reads(), 1);
}

#[test]
fn disabled_cache_matches_direct_evaluation() {
    let harness = Harness::new(staff(10_000));
    let choices = harness.build(
        SelectChoices::builder("person in people track by person.id", harness.source.clone(), PathEvaluator)
            .disable_choice("person.disabled")
            .config(no_debounce()),
    );
    choices.refresh().unwrap();
    assert_eq!(choices.disabled_cache_len(), 10_000);

    let evaluator = PathEvaluator;
    for item in harness.source.inner.snapshot() {
        let direct = evaluator
            .evaluate("person.disabled", &Scope::item("person", item.as_ref()))
            .unwrap();
        assert_eq!(choices.is_disabled(&item).unwrap(), direct.as_bool().unwrap());
    }
}

#[test]
fn disabled_cache_skipped_without_track_by() {
    let harness = Harness::new(staff(50));
    let choices = harness.build(
        SelectChoices::builder("person in people", harness.source.clone(), PathEvaluator)
            .disable_choice("person.disabled"),
    );
    choices.refresh().unwrap();
    assert_eq!(choices.disabled_cache_len(), 0);

    let items = harness.source.inner.snapshot();
    assert!(choices.is_disabled(&items[0]).unwrap());
    assert!(!choices.is_disabled(&items[1]).unwrap());
}

#[test]
fn visible_limit_applies_without_search() {
    let harness = Harness::new(staff(300));
    let choices = harness.choices("person in people", no_debounce().visible_limit(25));

    choices.open().unwrap();
    let visible = choices.visible();
    assert_eq!(visible.len(), 25);
    assert_eq!(visible.remaining_count, 275);
    assert!(!visible.truncated_while_searching);
}

#[test]
fn key_evaluation_errors() {
    let harness = Harness::new(staff(10));
    let choices = harness.choices("person in people track by manager.id", no_debounce());

    let err = choices.refresh().unwrap_err();
    assert!(matches!(err, ChoicesError::KeyEvaluation { .. }));
    assert!(!err.is_fatal());

    let failures = Arc::new(Mutex::new(Vec::new()));
    let failures_clone = failures.clone();
    choices.refresh_failed().connect(move |err: &ChoicesError| {
        failures_clone.lock().push(err.clone());
    });

    harness.search(&choices, "employee");
    assert_eq!(failures.lock().len(), 1);
    assert!(choices.visible().is_empty());

    // A failed debounced refresh leaves the debouncer armed for the next change.
    assert!(!choices.is_search_pending());
    harness.search(&choices, "employee 1");
    assert_eq!(failures.lock().len(), 2);
    assert!(matches!(failures.lock()[1], ChoicesError::KeyEvaluation { .. }));
    assert!(!choices.is_torn_down());
}

#[test]
fn debounced_refresh_recovers_after_failure() {
    let harness = Harness::new(staff(20));
    let failing = Arc::new(AtomicBool::new(true));
    let flag = failing.clone();
    let evaluator = move |expression: &str, scope: &Scope<'_, Employee>| {
        if flag.load(Ordering::SeqCst) {
            return Err(EvalError::new("directory offline"));
        }
        PathEvaluator.evaluate(expression, scope)
    };
    let choices = harness.build(
        SelectChoices::builder(
            "person in people track by person.id",
            harness.source.clone(),
            evaluator,
        )
        .config(no_debounce()),
    );

    let failures = Arc::new(AtomicUsize::new(0));
    let failures_clone = failures.clone();
    choices.refresh_failed().connect(move |_| {
        failures_clone.fetch_add(1, Ordering::SeqCst);
    });

    harness.search(&choices, "employee 1");
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(choices.visible().is_empty());

    failing.store(false, Ordering::SeqCst);
    harness.search(&choices, "employee 2");
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(choices.visible().len(), 1);
}

#[test]
fn attribute_configuration() {
    let harness = Harness::new(staff(400));
    let config = ChoicesConfig::new()
        .resolve_attributes(
            [
                ("search-debounce", "0"),
                ("visible-limit-when-searching", "'30'"),
                ("visible-limit-when-searching-step", "20"),
            ],
            &PathEvaluator as &dyn ExpressionEvaluator<Employee>,
        )
        .unwrap();
    let choices = harness.choices("person in people", config);

    harness.search(&choices, "employee");
    assert_eq!(choices.visible().len(), 30);
    choices.show_more(None).unwrap();
    assert_eq!(choices.visible().len(), 50);
}
