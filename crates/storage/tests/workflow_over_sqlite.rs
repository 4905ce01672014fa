use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver};
use scheduler_core::{
    spawn_store_worker, CustomerWorkflow, FormField, Mode, Notification, NotificationKind,
    NotificationSink, SchedulerStore, StoreCompletion,
};
use storage::Storage;

#[derive(Default)]
struct Collected(Mutex<Vec<Notification>>);

impl Collected {
    fn kinds(&self) -> Vec<NotificationKind> {
        self.0
            .lock()
            .map(|n| n.iter().map(|n| n.kind).collect())
            .unwrap_or_default()
    }
}

impl NotificationSink for Collected {
    fn notify(&self, notification: Notification) {
        if let Ok(mut all) = self.0.lock() {
            all.push(notification);
        }
    }
}

struct App {
    workflow: CustomerWorkflow,
    ui_rx: Receiver<StoreCompletion>,
    sink: Arc<Collected>,
    worker: std::thread::JoinHandle<()>,
}

impl App {
    fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime");
        let storage = runtime.block_on(async {
            let storage = Storage::new("sqlite::memory:").await.expect("db");
            storage.seed_reference_data().await.expect("seed");
            storage.create_user("test", "test").await.expect("user");
            storage
                .sign_in("test", "test")
                .await
                .expect("sign in")
                .expect("credentials");
            storage.commit().await.expect("commit");
            storage
        });
        let store: Arc<dyn SchedulerStore> = Arc::new(storage);
        let (cmd_tx, cmd_rx) = bounded(32);
        let (ui_tx, ui_rx) = bounded(32);
        let worker = spawn_store_worker(runtime, store, cmd_rx, ui_tx);
        let sink = Arc::new(Collected::default());
        let mut workflow = CustomerWorkflow::new(cmd_tx, sink.clone());
        workflow.populate().expect("populate");
        let mut app = Self {
            workflow,
            ui_rx,
            sink,
            worker,
        };
        app.settle();
        app
    }

    fn settle(&mut self) {
        while self.workflow.is_loading() {
            let completion = self
                .ui_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("completion");
            self.workflow.apply(completion);
        }
    }

    fn add(&mut self, name: &str, country: &str) {
        self.workflow.enter(Mode::Add).expect("add mode");
        self.workflow.set_field(FormField::Name, name).expect("name");
        self.workflow
            .set_field(FormField::Phone, "555-0100")
            .expect("phone");
        self.workflow
            .set_field(FormField::Address, "1 Elm St")
            .expect("address");
        self.workflow
            .set_field(FormField::PostalCode, "10001")
            .expect("postal code");
        let index = self
            .workflow
            .countries()
            .iter()
            .position(|c| c.name == country)
            .expect("country listed");
        self.workflow.select_country(Some(index)).expect("country");
        self.settle();
        self.workflow.select_division(Some(0)).expect("division");
        self.workflow.confirm().expect("confirm");
        self.settle();
    }

    fn names(&self) -> Vec<String> {
        self.workflow
            .table()
            .iter()
            .map(|c| c.customer_name.clone())
            .collect()
    }

    fn shutdown(self) {
        drop(self.workflow);
        self.worker.join().expect("worker exits");
    }
}

#[test]
fn added_customer_gets_an_id_and_its_countrys_division() {
    let mut app = App::start();
    assert!(app.workflow.table().is_empty());
    assert_eq!(app.workflow.countries().len(), 3);

    app.add("Alice", "UK");

    let table = app.workflow.table();
    assert_eq!(table.len(), 1);
    assert!(table[0].customer_id.is_assigned());
    assert_eq!(table[0].country().name, "UK");
    assert_eq!(
        table[0].created_by.as_ref().map(|u| u.user_name.as_str()),
        Some("test")
    );
    assert_eq!(app.sink.kinds(), vec![NotificationKind::Add]);
    assert!(app.workflow.undo_available());

    app.workflow.refresh().expect("commit");
    app.settle();
    app.shutdown();
}

#[test]
fn undo_reverts_to_the_last_commit() {
    let mut app = App::start();
    app.add("Alice", "U.S");
    app.workflow.refresh().expect("commit");
    app.settle();

    app.add("Bob", "Canada");
    assert_eq!(app.names(), vec!["Alice", "Bob"]);

    app.workflow.undo().expect("undo");
    app.settle();
    assert_eq!(app.names(), vec!["Alice"]);
    assert!(!app.workflow.undo_available());
    assert_eq!(
        app.sink.kinds(),
        vec![
            NotificationKind::Add,
            NotificationKind::Success,
            NotificationKind::Add,
            NotificationKind::Success,
        ]
    );
    app.shutdown();
}

#[test]
fn edit_and_delete_round_trip_through_sqlite() {
    let mut app = App::start();
    app.add("Alice", "U.S");
    app.add("Bob", "U.S");

    app.workflow.select_row(Some(0)).expect("select");
    app.workflow.enter(Mode::Edit).expect("edit mode");
    app.workflow
        .set_field(FormField::Name, "Alicia")
        .expect("rename");
    app.workflow.confirm().expect("confirm edit");
    app.settle();
    assert_eq!(app.names(), vec!["Alicia", "Bob"]);

    app.workflow.select_row(Some(1)).expect("select");
    app.workflow.enter(Mode::Delete).expect("delete mode");
    app.settle();
    app.workflow.confirm().expect("confirm delete");
    app.settle();
    assert_eq!(app.names(), vec!["Alicia"]);
    assert_eq!(app.workflow.mode(), Mode::Idle);

    app.workflow.refresh().expect("commit");
    app.settle();
    app.shutdown();
}
