//! keylockctl - operate store-coordinated locks from the shell

mod cli;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use keylock::{
    CancelHandle, Context, KeylockConfig, Lock, LockClient, LockError, LockStatus, LockStore,
    RedisLockStore,
};
use tokio::process::Command as ChildCommand;
use tracing::{debug, error, info, warn};

use crate::cli::{Cli, Command, RetryArgs, ttl_or_default};

/// Exit code when the lock is held by someone else
const EXIT_CONTENDED: u8 = 2;
/// Exit code when a previously obtained lock is no longer held
const EXIT_NOT_HELD: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level);
    keylock::metrics::describe_metrics();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => exit_code_for(&e),
    }
}

fn exit_code_for(e: &anyhow::Error) -> ExitCode {
    match e.downcast_ref::<LockError>() {
        Some(lock_err) if lock_err.is_contention() => {
            eprintln!("lock is held by another owner");
            ExitCode::from(EXIT_CONTENDED)
        }
        Some(lock_err) if lock_err.is_lock_lost() => {
            eprintln!("lock is not held");
            ExitCode::from(EXIT_NOT_HELD)
        }
        _ => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = KeylockConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.redis_url {
        config.redis_url = url;
    }

    let store = RedisLockStore::connect(&config.redis_url)
        .await
        .with_context(|| format!("failed to connect to {}", config.redis_url))?;
    let client =
        LockClient::new(Arc::new(store)).with_token_generator(config.token_generator());

    match cli.command {
        Command::Obtain {
            key,
            ttl_ms,
            token,
            metadata,
            retry,
        } => {
            let mut opts = retry.lock_options(&config);
            opts.token = token;
            opts.metadata = metadata;

            let (ctx, cancel) = cancellable(&retry);
            let lock = client
                .obtain(&ctx, &key, ttl_or_default(ttl_ms, &config), &opts)
                .await;
            cancel.abort();

            let lock = lock?;
            println!("{}", lock.token());
            Ok(ExitCode::SUCCESS)
        }
        Command::Release {
            key,
            token,
            metadata,
        } => {
            let lock = client.adopt(key, token, metadata);
            lock.release(&Context::background()).await?;
            match lock.status() {
                LockStatus::Released => Ok(ExitCode::SUCCESS),
                _ => Err(LockError::NotHeld.into()),
            }
        }
        Command::Refresh {
            key,
            token,
            metadata,
            ttl_ms,
        } => {
            let lock = client.adopt(key, token, metadata);
            lock.refresh(&Context::background(), ttl_or_default(ttl_ms, &config))
                .await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Ttl { key } => {
            let ttl = client.store().pttl(&key).await?;
            println!("{}", ttl.as_millis());
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            key,
            ttl_ms,
            retry,
            command,
        } => {
            let ttl = ttl_or_default(ttl_ms, &config);
            let opts = retry.lock_options(&config);

            let (ctx, cancel) = cancellable(&retry);
            let lock = client.obtain(&ctx, &key, ttl, &opts).await;
            cancel.abort();

            let lock = lock?;
            info!(key = %lock.key(), "Lock obtained, starting command");
            let result = run_locked(&lock, ttl, &command).await;

            if let Err(e) = lock.release(&Context::background()).await {
                warn!(key = %lock.key(), error = %e, "Failed to release lock");
            }
            result
        }
    }
}

/// Context for an acquisition that ctrl-c cancels
///
/// The returned task must be aborted once the acquisition finishes.
fn cancellable(retry: &RetryArgs) -> (Context, tokio::task::JoinHandle<()>) {
    let (ctx, handle) = retry.context().with_cancel();
    let task = tokio::spawn(cancel_on_ctrl_c(handle));
    (ctx, task)
}

async fn cancel_on_ctrl_c(handle: CancelHandle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        debug!("Received ctrl-c, cancelling acquisition");
        handle.cancel();
    }
}

/// Run `command` while keeping `lock` alive, refreshing at half its TTL
async fn run_locked(lock: &Lock, ttl: Duration, command: &[String]) -> anyhow::Result<ExitCode> {
    let (program, args) = command.split_first().context("no command given")?;
    let mut child = ChildCommand::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start {}", program))?;

    let period = (ttl / 2).max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let ctx = Context::background();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.context("failed to wait for command")?;
                debug!(%status, "Command exited");
                let code = status
                    .code()
                    .and_then(|code| u8::try_from(code).ok())
                    .unwrap_or(1);
                return Ok(ExitCode::from(code));
            }
            _ = ticker.tick() => {
                match lock.refresh(&ctx, ttl).await {
                    Ok(()) => debug!(key = %lock.key(), "Lock refreshed"),
                    Err(e) if e.is_lock_lost() => {
                        warn!(key = %lock.key(), "Lock lost, stopping command");
                        child.kill().await.ok();
                        return Err(e.into());
                    }
                    Err(e) => warn!(key = %lock.key(), error = %e, "Failed to refresh lock"),
                }
            }
            _ = &mut ctrl_c => {
                info!("Received ctrl-c, stopping command");
                child.kill().await.ok();
                return Ok(ExitCode::from(130));
            }
        }
    }
}
