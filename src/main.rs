//! twmd - CLI entry point.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};

use twmd::{
    cli::{Cli, Command, DownloadArgs, LoginArgs, OutputFormat},
    error::{exit_codes, Error, Result},
    job::{run_batch_job, BatchJobOptions},
    output::{print_error_line, print_summary, render_event_json, render_event_text},
    report,
    session::{cookies, Session, SessionStore},
};

/// Directory name component of the session path: `~/.twmd/`.
const APP_NAME: &str = "twmd";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "error" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let json_output = cli.output_format == OutputFormat::Json;
    match run(cli).await {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            print_error_line(&e, json_output);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let store = SessionStore::new(APP_NAME)?;
    let quiet = cli.quiet;
    let json_output = cli.output_format == OutputFormat::Json;

    match cli.command {
        Command::Login(args) => cmd_login(&store, args),
        Command::Whoami => cmd_whoami(&store),
        Command::Logout => cmd_logout(&store),
        Command::Download(args) => cmd_download(store, args, quiet, json_output).await,
        Command::Gui(args) => {
            twmd::server::serve(store, args.port).await?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn cmd_login(store: &SessionStore, args: LoginArgs) -> Result<i32> {
    let blob = match &args.cookies_file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| Error::Usage(format!("cannot read {}: {}", path.display(), e)))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let normalized = cookies::normalize_cookies(&blob);
    if normalized.is_empty() {
        return Err(Error::Usage("no cookies found in input".into()));
    }

    if !args.no_strict {
        let missing = cookies::missing_required(&normalized, &cookies::REQUIRED_COOKIES);
        if !missing.is_empty() {
            return Err(Error::Auth(format!(
                "missing required cookie(s): {}",
                missing.join(", ")
            )));
        }
    }

    let mut session = Session::new(normalized);
    session.valid = cookies::missing_required(&session.cookies, &cookies::REQUIRED_COOKIES)
        .is_empty();
    store.save(&session)?;

    println!(
        "Saved session with {} cookie(s) to {}",
        session.cookies.len(),
        store.path().display()
    );
    Ok(exit_codes::SUCCESS)
}

fn cmd_whoami(store: &SessionStore) -> Result<i32> {
    let Some(session) = store.load()? else {
        return Err(Error::Auth("no saved session; run `twmd login` first".into()));
    };

    let missing = cookies::missing_required(&session.cookies, &cookies::REQUIRED_COOKIES);
    if !missing.is_empty() {
        return Err(Error::Auth(format!(
            "session is missing required cookie(s): {}",
            missing.join(", ")
        )));
    }

    println!(
        "Session: {} cookie(s), updated {}, auth cookies present",
        session.cookies.len(),
        session.updated_at
    );
    Ok(exit_codes::SUCCESS)
}

fn cmd_logout(store: &SessionStore) -> Result<i32> {
    store.clear()?;
    println!("Session cleared");
    Ok(exit_codes::SUCCESS)
}

async fn cmd_download(
    store: SessionStore,
    args: DownloadArgs,
    quiet: bool,
    json_output: bool,
) -> Result<i32> {
    let users = resolve_users(&args)?;

    let options = BatchJobOptions {
        users,
        output_dir: args.out.clone(),
        media_kinds: args.kinds.clone(),
        engine: args.engine,
        max_tweets_per_user: args.max_tweets,
        concurrency: args.concurrency,
        retry_count: args.retry,
        user_retry_count: args.user_retry,
        user_delay_ms: args.user_delay_ms,
        per_request_delay_ms: args.request_delay_ms,
    };

    let mut job = run_batch_job(store, options, None);

    // Ctrl-C abandons pending work and lets the scraper clean up.
    let cancel = job.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping job");
            cancel.cancel();
        }
    });

    let spinner = if !quiet && !json_output {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(120));
        Some(spinner)
    } else {
        None
    };

    while let Some(event) = job.next_event().await {
        if json_output {
            println!("{}", render_event_json(&event));
        } else if !quiet {
            let line = render_event_text(&event);
            match &spinner {
                Some(spinner) => {
                    spinner.set_message(event.message.clone());
                    spinner.println(line);
                }
                None => println!("{}", line),
            }
        }
    }
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let result = job.join().await?;

    if let Some(path) = &args.json_report {
        report::write_json_report(path, &result)?;
    }
    if let Some(path) = &args.csv_report {
        report::write_csv_report(path, &result)?;
    }
    if let Some(path) = &args.failures_report {
        report::write_failures_report(path, &result)?;
    }

    if !quiet && !json_output {
        print_summary(&result);
    }

    if result.has_final_failures() {
        // Reported through the exit code; details are in the feed and
        // the optional reports.
        Ok(exit_codes::PARTIAL)
    } else {
        Ok(exit_codes::SUCCESS)
    }
}

fn resolve_users(args: &DownloadArgs) -> Result<Vec<String>> {
    match (&args.users, &args.users_file) {
        (Some(users), None) => Ok(users.clone()),
        (None, Some(path)) => read_users_file(path),
        (None, None) => Err(Error::Usage(
            "one of --users or --users-file is required".into(),
        )),
        (Some(_), Some(_)) => Err(Error::Usage(
            "--users and --users-file are mutually exclusive".into(),
        )),
    }
}

fn read_users_file(path: &PathBuf) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Usage(format!("cannot read {}: {}", path.display(), e)))?;
    let users: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    if users.is_empty() {
        return Err(Error::Usage(format!(
            "no usernames found in {}",
            path.display()
        )));
    }
    Ok(users)
}
