//! Smoke test for the ambient logging stack (SPEC_FULL.md §2): this crate's
//! `tracing::debug!` call sites (`mi::commands::write_interpreter_string`,
//! `mi::process::try_spawn`) are only observable with a subscriber
//! installed, which a library must never install itself. Exercising that
//! wiring from `tests/` — the one place in this crate allowed to act as a
//! "host binary" — is what keeps `tracing-subscriber` a real dependency
//! instead of dead weight in `[dev-dependencies]`.

use gdb_mi_core::mi::commands::MiCommand;

#[tokio::test]
async fn debug_logging_runs_under_an_installed_subscriber() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut sink = Vec::new();
    MiCommand::exec_continue()
        .write_interpreter_string(&mut sink, 7)
        .await
        .expect("writing to an in-memory sink never fails");
    assert_eq!(sink, b"7-exec-continue\n");
}
