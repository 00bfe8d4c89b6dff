//! Candidate set construction.

use std::collections::HashSet;

/// Merges stargazer and fork-owner logins into a duplicate-free list.
///
/// First-encounter order is kept (stargazers first, then fork owners) and the
/// list is cut at `max` entries. Blank logins are skipped.
pub fn dedupe_candidates<I, J>(stargazers: I, fork_owners: J, max: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
    J: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for login in stargazers.into_iter().chain(fork_owners) {
        if out.len() >= max {
            break;
        }
        if login.is_empty() {
            continue;
        }
        if seen.insert(login.clone()) {
            out.push(login);
        }
    }

    out
}
