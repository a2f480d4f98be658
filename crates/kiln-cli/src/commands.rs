use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use kiln_maint::{
    unlink_files_root, GcEvent, GcPolicy, Maintenance, RepoStat, TracingObserver, UnlinkOptions,
    VerifyEvent,
};
use kiln_store::{
    cancel_pair, parse_size, CancelHandle, CancelToken, FsRepo, FsRepoOpener, RepoConfig,
};
use serde::Serialize;
use tracing::debug;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let (handle, cancel) = cancel_pair();
    cancel_on_ctrl_c(handle);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(cli, cancel, &mut out).await
}

/// Cancel running operations on the first Ctrl-C.
fn cancel_on_ctrl_c(handle: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received, cancelling");
            handle.cancel();
        }
    });
}

pub async fn execute(cli: Cli, cancel: CancelToken, out: &mut dyn Write) -> anyhow::Result<()> {
    let format = cli.format;
    let root = cli.repo_dir.as_path();
    match cli.command {
        Command::Init(args) => cmd_init(root, args, out),
        Command::Repo(RepoArgs { action }) => match action {
            RepoCommand::Gc(args) => cmd_gc(root, args, format, cancel, out).await,
            RepoCommand::Stat(args) => cmd_stat(root, args, format, cancel, out).await,
            RepoCommand::Verify(_) => cmd_verify(root, format, cancel, out).await,
            RepoCommand::Version(args) => cmd_version(root, args, format, out),
            RepoCommand::RmRoot(args) => cmd_rm_root(root, args, format, &cancel, out),
        },
    }
}

fn open_engine(root: &Path) -> anyhow::Result<Maintenance> {
    let repo = FsRepo::open(root)
        .with_context(|| format!("opening repository at {}", root.display()))?;
    Ok(Maintenance::new(Arc::new(repo)).with_observer(Arc::new(TracingObserver)))
}

fn cmd_init(root: &Path, args: InitArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    if let Some(size) = &args.storage_max {
        parse_size(size)?;
    }
    let config = RepoConfig {
        storage_max: args.storage_max,
        ..RepoConfig::default()
    };
    FsRepo::init(root, &config)?;
    writeln!(
        out,
        "{} Initialized kiln repository in {}",
        "✓".green().bold(),
        root.display().to_string().bold()
    )?;
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GcLine {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn render_gc_event(
    event: &GcEvent,
    format: OutputFormat,
    quiet: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let line = match event {
                GcEvent::Removed { key } => GcLine {
                    key: key.to_string(),
                    error: None,
                },
                GcEvent::Failed { key, cause } => GcLine {
                    key: key.to_string(),
                    error: Some(cause.to_string()),
                },
            };
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
        }
        OutputFormat::Text => match event {
            GcEvent::Removed { key } if quiet => writeln!(out, "{key}")?,
            GcEvent::Removed { key } => writeln!(out, "removed {key}")?,
            GcEvent::Failed { key, cause } => {
                writeln!(out, "{} {key}: {cause}", "failed".red())?
            }
        },
    }
    Ok(())
}

async fn cmd_gc(
    root: &Path,
    args: GcArgs,
    format: OutputFormat,
    cancel: CancelToken,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let engine = open_engine(root)?;
    let policy = if args.stream_errors {
        GcPolicy::StreamErrors
    } else {
        GcPolicy::Collect
    };
    let mut stream = engine.run_gc(policy, cancel);
    while let Some(event) = stream.next().await {
        render_gc_event(&event, format, args.quiet, out)?;
    }
    stream.finish().await?;
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct VerifyLine<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<u64>,
}

/// Text verify output keeps the progress counter on one line.
#[derive(Default)]
struct VerifyRenderer {
    mid_line: bool,
}

impl VerifyRenderer {
    fn render(
        &mut self,
        event: &VerifyEvent,
        format: OutputFormat,
        out: &mut dyn Write,
    ) -> anyhow::Result<()> {
        if format == OutputFormat::Json {
            let corrupt;
            let line = match event {
                VerifyEvent::Corrupt { key, cause } => {
                    corrupt = format!("block {key} was corrupt ({cause})");
                    VerifyLine {
                        msg: Some(corrupt.as_str()),
                        progress: None,
                    }
                }
                VerifyEvent::Progress { count } => VerifyLine {
                    msg: None,
                    progress: Some(*count),
                },
                VerifyEvent::Summary { message } => VerifyLine {
                    msg: Some(message.as_str()),
                    progress: None,
                },
            };
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
            return Ok(());
        }

        match event {
            VerifyEvent::Progress { count } => {
                write!(out, "\r{count} blocks processed.")?;
                out.flush()?;
                self.mid_line = true;
            }
            VerifyEvent::Corrupt { key, cause } => {
                self.end_line(out)?;
                writeln!(out, "{} block {key} was corrupt ({cause})", "✗".red())?;
            }
            VerifyEvent::Summary { message } => {
                self.end_line(out)?;
                writeln!(out, "{message}")?;
            }
        }
        Ok(())
    }

    fn end_line(&mut self, out: &mut dyn Write) -> std::io::Result<()> {
        if self.mid_line {
            self.mid_line = false;
            writeln!(out)?;
        }
        Ok(())
    }
}

async fn cmd_verify(
    root: &Path,
    format: OutputFormat,
    cancel: CancelToken,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let engine = open_engine(root)?;
    let mut stream = engine.verify_blocks(cancel);
    let mut renderer = VerifyRenderer::default();
    while let Some(event) = stream.next().await {
        renderer.render(&event, format, out)?;
    }
    renderer.end_line(out)?;
    stream.finish().await?;
    Ok(())
}

/// Binary-unit rendering of a byte count, e.g. `1.5 MiB`.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn render_stat(
    stat: &RepoStat,
    format: OutputFormat,
    human: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        writeln!(out, "{}", serde_json::to_string_pretty(stat)?)?;
        return Ok(());
    }
    let size = |bytes: u64| {
        if human {
            human_size(bytes)
        } else {
            bytes.to_string()
        }
    };
    writeln!(out, "{:<12}{}", "NumObjects:", stat.num_objects)?;
    writeln!(out, "{:<12}{}", "RepoSize:", size(stat.repo_size))?;
    if stat.has_storage_limit() {
        writeln!(out, "{:<12}{}", "StorageMax:", size(stat.storage_max))?;
    }
    writeln!(out, "{:<12}{}", "RepoPath:", stat.repo_path)?;
    writeln!(out, "{:<12}{}", "Version:", stat.version)?;
    Ok(())
}

async fn cmd_stat(
    root: &Path,
    args: StatArgs,
    format: OutputFormat,
    cancel: CancelToken,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let engine = open_engine(root)?;
    let stat = engine.compute_stats(cancel).await?;
    render_stat(&stat, format, args.human, out)
}

fn cmd_version(
    root: &Path,
    args: VersionArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let version = open_engine(root)?.repo_version();
    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::json!({ "Version": version }))?
        }
        OutputFormat::Text if args.quiet => writeln!(out, "{version}")?,
        OutputFormat::Text => writeln!(out, "kiln repo version {version}")?,
    }
    Ok(())
}

fn cmd_rm_root(
    root: &Path,
    args: RmRootArgs,
    format: OutputFormat,
    cancel: &CancelToken,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let opts = UnlinkOptions {
        confirm: args.confirm,
        remove_local_root: args.remove_local_root,
    };
    let outcome = unlink_files_root(&FsRepoOpener::new(root), opts, cancel, &TracingObserver)?;
    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::json!({ "Message": outcome.message() }))?
        }
        OutputFormat::Text => writeln!(out, "{}", outcome.message())?,
    }
    Ok(())
}
