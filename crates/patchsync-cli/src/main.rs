//! # patchsync CLI
//!
//! Command-line utilities for inspecting and replaying wire-format patches.

use anyhow::{bail, Context, Result};
use patchsync_core::{apply_patch, consolidate, transform_pair, Patch};
use std::env;
use std::fs;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let output = run(&args)?;
    print!("{output}");
    Ok(())
}

fn run(args: &[String]) -> Result<String> {
    let Some(command) = args.first() else {
        return Ok(help());
    };
    let operands = &args[1..];

    match command.as_str() {
        "inspect" => {
            let [path] = operands else {
                bail!("Usage: patchsync inspect <patch-file>");
            };
            let patch = read_patch(path)?;
            let json = serde_json::to_string_pretty(&patch).context("Failed to encode JSON")?;
            Ok(format!("{json}\n"))
        }
        "consolidate" => {
            if operands.is_empty() {
                bail!("Usage: patchsync consolidate <patch-file>...");
            }
            let patches = operands
                .iter()
                .map(|path| read_patch(path))
                .collect::<Result<Vec<_>>>()?;
            let consolidated = consolidate(&patches)
                .context("Patches are not sequential")?
                .context("No patches given")?;
            Ok(format!("{consolidated}\n"))
        }
        "transform" => {
            let [a, b] = operands else {
                bail!("Usage: patchsync transform <patch-a> <patch-b>");
            };
            let (a, b) = (read_patch(a)?, read_patch(b)?);
            tracing::debug!(a_diffs = a.diffs().len(), b_diffs = b.diffs().len(), "Transforming");
            let (a_prime, b_prime) = transform_pair(&a, &b, false);
            Ok(format!("{a_prime}\n\n{b_prime}\n"))
        }
        "apply" => {
            let Some((document, patch_paths)) = operands.split_first() else {
                bail!("Usage: patchsync apply <document-file> <patch-file>...");
            };
            let content = fs::read_to_string(document)
                .with_context(|| format!("Failed to read {document}"))?;
            let patches = patch_paths
                .iter()
                .map(|path| read_patch(path))
                .collect::<Result<Vec<_>>>()?;
            apply_patch(&content, &patches).context("Failed to apply patches")
        }
        "help" | "--help" | "-h" => Ok(help()),
        cmd => bail!("Unknown command: {cmd}\n\n{}", help()),
    }
}

fn read_patch(path: &str) -> Result<Patch> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    text.trim_end()
        .parse()
        .with_context(|| format!("Invalid patch in {path}"))
}

fn help() -> String {
    r"patchsync CLI

USAGE:
    patchsync <COMMAND> [ARGS]

COMMANDS:
    inspect <patch-file>                 Print a patch as JSON
    consolidate <patch-file>...          Merge sequential patches into one
    transform <patch-a> <patch-b>        Transform two concurrent patches; prints
                                         A' (after B, B wins ties) and B' (after A)
    apply <document-file> <patch-file>...
                                         Apply patches to a document and print it
    help                                 Show this help message

Patch files hold the wire form:
    v<base-version>:
    <index>:<+|-><length>:<percent-encoded text>,
    ...:
    <document-length>
"
    .to_string()
}
