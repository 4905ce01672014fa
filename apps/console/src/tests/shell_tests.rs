use std::io::Cursor;

use crossbeam_channel::bounded;
use scheduler_core::spawn_store_worker;
use storage::Storage;

use super::*;

fn session(script: &str) -> String {
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
    let (cmd_tx, cmd_rx) = bounded(16);
    let (ui_tx, ui_rx) = bounded(16);
    let worker = spawn_store_worker(runtime, Arc::new(storage), cmd_rx, ui_tx);

    let mut shell = Shell::new(cmd_tx, ui_rx);
    let mut out = Vec::new();
    shell.run(Cursor::new(script), &mut out).expect("session");
    drop(shell);
    worker.join().expect("worker exits");
    String::from_utf8(out).expect("utf8")
}

const ADD_ALICE: &str = "add
set name Alice Smith
set phone 555-0100
set address 1 Elm St
set postal 10001
country 1
division 1
confirm
";

#[test]
fn parses_commands_with_one_based_indices() {
    assert_eq!(parse_command("select 3"), Ok(Command::Select(Some(2))));
    assert_eq!(parse_command("  SELECT none "), Ok(Command::Select(None)));
    assert_eq!(parse_command("country 1"), Ok(Command::Country(Some(0))));
    assert_eq!(parse_command("state -"), Ok(Command::Division(None)));
    assert_eq!(parse_command("delete"), Ok(Command::Enter(Mode::Delete)));
    assert_eq!(parse_command("q"), Ok(Command::Quit));
}

#[test]
fn set_keeps_the_rest_of_the_line_as_the_value() {
    assert_eq!(
        parse_command("set address 12  Oak   Ave"),
        Ok(Command::Set(FormField::Address, "12  Oak   Ave".into()))
    );
    assert_eq!(
        parse_command("set postal"),
        Ok(Command::Set(FormField::PostalCode, String::new()))
    );
}

#[test]
fn rejects_bad_input() {
    assert_eq!(
        parse_command("frobnicate"),
        Err(ParseError::Unknown("frobnicate".into()))
    );
    assert_eq!(
        parse_command("select 0"),
        Err(ParseError::BadIndex("0".into()))
    );
    assert_eq!(
        parse_command("select"),
        Err(ParseError::MissingArgument("select", "a number or 'none'"))
    );
    assert_eq!(
        parse_command("set colour blue"),
        Err(ParseError::UnknownField("colour".into()))
    );
    assert!(matches!(
        parse_command("set"),
        Err(ParseError::MissingArgument("set", _))
    ));
}

#[test]
fn feed_drains_in_order() {
    let feed = NotificationFeed::default();
    feed.notify(Notification::error("first"));
    feed.notify(Notification::error("second"));
    let drained: Vec<String> = feed.drain().into_iter().map(|n| n.message).collect();
    assert_eq!(drained, vec!["first", "second"]);
    assert!(feed.drain().is_empty());
}

#[test]
fn adding_a_customer_prints_the_notification_and_the_row() {
    let output = session(&format!("{ADD_ALICE}commit\nquit\n"));
    assert!(output.contains("No customers."), "{output}");
    assert!(
        output.contains("[add] Customer Added: 1: Alice Smith (undo available)"),
        "{output}"
    );
    assert!(output.contains("Alabama"), "{output}");
    assert!(output.contains("[success] Changes Committed"), "{output}");
    assert!(!output.contains("Uncommitted changes"), "{output}");
}

#[test]
fn edit_without_selection_reports_it() {
    let output = session("edit\nquit\n");
    assert!(output.contains("select a customer first"), "{output}");
}

#[test]
fn undo_restores_the_committed_table() {
    let output = session(&format!("{ADD_ALICE}undo\nquit\n"));
    assert!(output.contains("[success] Changes Rolled Back"), "{output}");
    assert!(output.trim_end().ends_with("No customers."), "{output}");
}

#[test]
fn appointment_hand_off_uses_the_selection() {
    let output = session(&format!("{ADD_ALICE}select 1\nappoint\nquit\n"));
    assert!(
        output.contains("Scheduling an appointment for 1: Alice Smith (1 customers in the picker)."),
        "{output}"
    );
    assert!(output.contains("Uncommitted changes were discarded."), "{output}");
}
