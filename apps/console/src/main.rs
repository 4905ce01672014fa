mod config;
mod shell;

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use scheduler_core::spawn_store_worker;
use storage::Storage;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{load_settings, prepare_database_url, DEFAULT_CONFIG_FILE},
    shell::Shell,
};

/// Customer records console.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file; missing files are ignored.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    password: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config)?;
    if let Some(v) = args.database_url {
        settings.database_url = v;
    }
    if args.user.is_some() {
        settings.user = args.user;
    }
    if args.password.is_some() {
        settings.password = args.password;
    }
    let database_url = prepare_database_url(&settings.database_url)?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let user = match settings.user {
        Some(user) => user,
        None => prompt(&mut input, "User name: ")?,
    };
    let password = match settings.password {
        Some(password) => password,
        None => prompt(&mut input, "Password: ")?,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the store runtime")?;
    let opened = runtime.block_on(async {
        let storage = Storage::new(&database_url).await?;
        let signed_in = storage.sign_in(&user, &password).await?;
        // The lookup opened a transaction; release its connection while
        // the runtime is still reachable.
        storage.rollback().await?;
        anyhow::Ok((storage, signed_in))
    });
    let (storage, signed_in) = opened.with_context(|| format!("failed to open '{database_url}'"))?;
    let Some(signed_in) = signed_in else {
        bail!("Incorrect username or password.");
    };
    tracing::info!(user = %signed_in.user_name, database_url = %database_url, "signed in");

    let (cmd_tx, cmd_rx) = bounded(settings.queue_capacity);
    let (ui_tx, ui_rx) = bounded(settings.queue_capacity);
    let worker = spawn_store_worker(runtime, Arc::new(storage), cmd_rx, ui_tx);

    let mut shell = Shell::new(cmd_tx, ui_rx);
    let mut stdout = io::stdout();
    let result = shell.run(input, &mut stdout);
    tracing::debug!(
        customers = shell.workflow().table().len(),
        "closing console"
    );
    drop(shell);
    if worker.join().is_err() {
        tracing::error!("store worker panicked");
    }
    stdout.flush()?;
    result
}

fn prompt(input: &mut impl BufRead, label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("no input for '{}'", label.trim_end_matches(": "));
    }
    Ok(line.trim().to_string())
}
