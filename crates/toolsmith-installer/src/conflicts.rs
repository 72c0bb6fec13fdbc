use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::context::InstallContext;
use crate::process::{run_command, CommandOutcome, CommandRunner};
use crate::profile::{dedup, store_paths_in, ProfileInspector, ProfileSnapshot};
use crate::retry::RateLimitRetry;

static REMOVE_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"nix profile remove\s+(?:'([^']+)'|"([^"]+)"|([^\s'"`]+))"#)
        .expect("remove hint pattern is valid")
});

/// Candidate tokens in the order they should be tried: elements owning a
/// conflicting store path, elements matching the output, then tokens scraped
/// from remove hints in the failure text.
pub fn removal_candidates(
    snapshot: &ProfileSnapshot,
    ctx: &InstallContext,
    failure_text: &str,
    output: &str,
) -> Vec<String> {
    let by_store_path =
        snapshot.find_remove_tokens_for_store_path_prefixes(&store_paths_in(failure_text));
    let by_output = snapshot.find_remove_tokens_for_output(output, Some(&ctx.repo_dir));
    dedup(
        by_store_path
            .into_iter()
            .chain(by_output)
            .chain(scrape_remove_hints(failure_text)),
    )
}

/// Tokens suggested by `nix profile remove <token>` hints in failure text.
pub fn scrape_remove_hints(text: &str) -> Vec<String> {
    dedup(REMOVE_HINT_RE.captures_iter(text).filter_map(|captures| {
        captures
            .get(1)
            .or_else(|| captures.get(2))
            .or_else(|| captures.get(3))
            .map(|found| found.as_str().trim().to_string())
            .filter(|token| !token.is_empty())
    }))
}

/// Drives the bounded remove-then-retry loop after a failed profile install.
pub struct ConflictResolver<'a> {
    runner: &'a dyn CommandRunner,
    retry: &'a RateLimitRetry,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(runner: &'a dyn CommandRunner, retry: &'a RateLimitRetry) -> Self {
        Self { runner, retry }
    }

    /// Returns whether the install eventually succeeded. Never fails on its own:
    /// a dead end just reports `false` to the caller.
    pub fn resolve(
        &self,
        ctx: &InstallContext,
        install_cmd: &str,
        failure: &CommandOutcome,
        output: &str,
        max_rounds: u32,
    ) -> bool {
        let inspector = ProfileInspector::new(self.runner);
        let mut failure_text = failure.combined_output();
        let mut tried: HashSet<String> = HashSet::new();

        for round in 1..=max_rounds {
            let snapshot = inspector.snapshot(ctx);
            let candidates: Vec<String> =
                removal_candidates(&snapshot, ctx, &failure_text, output)
                    .into_iter()
                    .filter(|token| !tried.contains(token))
                    .collect();
            if candidates.is_empty() {
                debug!("no removable profile elements left for output '{output}'");
                return false;
            }

            info!(
                "resolving profile conflict for '{output}' (round {round}/{max_rounds}): removing {}",
                candidates.join(", ")
            );
            for token in &candidates {
                tried.insert(token.clone());
                let remove_cmd = format!("nix profile remove {}", shell_quote(token));
                match run_command(ctx, self.runner, &remove_cmd, true) {
                    Ok(outcome) if !outcome.is_success() => {
                        debug!("'{remove_cmd}' exited with {}", outcome.code)
                    }
                    Ok(_) => {}
                    Err(err) => warn!("'{remove_cmd}' could not run: {err}"),
                }
            }

            match self.retry.run(ctx, self.runner, install_cmd) {
                Ok(outcome) if outcome.is_success() => {
                    info!("'{install_cmd}' succeeded after conflict resolution");
                    return true;
                }
                Ok(outcome) => failure_text = outcome.combined_output(),
                Err(err) => {
                    warn!("'{install_cmd}' could not run: {err}");
                    return false;
                }
            }
        }
        false
    }
}

pub(crate) fn shell_quote(value: &str) -> String {
    let is_bare = |ch: char| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '+' | '/' | '#' | ':' | '=')
    };
    if !value.is_empty() && value.chars().all(is_bare) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
