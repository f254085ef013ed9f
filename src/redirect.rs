use std::collections::HashSet;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::GateError;

/// One canonicalization rule: a legacy path and the path that replaced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRule {
    pub source: String,
    pub target: String,
    /// Permanent rules answer 308 (clients and caches may remember them);
    /// temporary rules answer 307 and are re-checked on every request.
    pub permanent: bool,
    /// When set, the rule also matches descendants of `source`, appending
    /// the remainder to `target` (`/old/a/b` -> `/new/a/b`).
    pub match_subtree: bool,
}

/// Result of resolving a path against the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub target: String,
    pub permanent: bool,
}

impl IntoResponse for Redirection {
    fn into_response(self) -> Response {
        let status = if self.permanent {
            StatusCode::PERMANENT_REDIRECT
        } else {
            StatusCode::TEMPORARY_REDIRECT
        };
        (status, [(axum::http::header::LOCATION, self.target)]).into_response()
    }
}

/// Static table of legacy-path redirects, validated at startup.
///
/// Resolution is a single step: the target of a match is never itself looked
/// up again. With the default strict builder that cannot matter — a rule
/// whose target resolves again through the table (subtree matching included)
/// is rejected at build time — so resolving any rule's target yields `None`
/// and a redirect-following client always terminates after one hop.
#[derive(Debug, Clone, Default)]
pub struct RedirectTable {
    rules: Vec<RedirectRule>,
}

impl RedirectTable {
    #[must_use]
    pub fn builder() -> RedirectTableBuilder {
        RedirectTableBuilder::default()
    }

    /// Resolve a requested path. `None` means normal routing continues.
    ///
    /// Deterministic and total: when an exact rule and a subtree rule both
    /// match, the longest source (most specific) wins.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<Redirection> {
        let path = normalize(path);
        let mut best: Option<&RedirectRule> = None;

        for rule in &self.rules {
            let matched = if rule.match_subtree {
                path == rule.source || descends_from(&path, &rule.source)
            } else {
                path == rule.source
            };
            if matched && best.is_none_or(|b| rule.source.len() > b.source.len()) {
                best = Some(rule);
            }
        }

        best.map(|rule| {
            let target = if rule.match_subtree && path != rule.source {
                format!("{}{}", rule.target, &path[rule.source.len()..])
            } else {
                rule.target.clone()
            };
            Redirection {
                target,
                permanent: rule.permanent,
            }
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

/// Builder for [`RedirectTable`]; all validation happens in [`build`].
///
/// [`build`]: RedirectTableBuilder::build
#[derive(Debug, Default)]
pub struct RedirectTableBuilder {
    rules: Vec<RedirectRule>,
    allow_chained: bool,
}

impl RedirectTableBuilder {
    /// Add a temporary (307) rule for one exact path.
    #[must_use]
    pub fn rule(self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.push(source, target, false, false)
    }

    /// Add a permanent (308) rule for one exact path.
    #[must_use]
    pub fn permanent_rule(self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.push(source, target, true, false)
    }

    /// Add a permanent rule covering `source` and everything under it.
    #[must_use]
    pub fn subtree_rule(self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.push(source, target, true, true)
    }

    /// Accept rules that chain (one rule's target is another's source).
    ///
    /// Off by default. Chains are occasionally wanted mid-migration, but a
    /// client following redirects then takes one hop per rule, so the strict
    /// builder rejects them and forces a flattened table. Cycles are
    /// rejected regardless of this setting.
    #[must_use]
    pub fn allow_chained(mut self) -> Self {
        self.allow_chained = true;
        self
    }

    fn push(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        permanent: bool,
        match_subtree: bool,
    ) -> Self {
        self.rules.push(RedirectRule {
            source: source.into(),
            target: target.into(),
            permanent,
            match_subtree,
        });
        self
    }

    /// Validate and build the table.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] for a rule whose source equals its
    /// target, a path not starting with `/`, two rules with the same source,
    /// any cycle, or (without [`allow_chained`]) a chain.
    ///
    /// [`allow_chained`]: RedirectTableBuilder::allow_chained
    pub fn build(self) -> Result<RedirectTable, GateError> {
        let mut rules = Vec::with_capacity(self.rules.len());
        let mut seen = HashSet::new();

        for rule in self.rules {
            let source = normalize(&rule.source);
            let target = normalize(&rule.target);

            if !source.starts_with('/') || !target.starts_with('/') {
                return Err(GateError::Config(format!(
                    "redirect rule paths must be absolute: {source:?} -> {target:?}"
                )));
            }
            if source == target {
                return Err(GateError::Config(format!(
                    "redirect rule maps {source:?} to itself"
                )));
            }
            if !seen.insert(source.clone()) {
                return Err(GateError::Config(format!(
                    "ambiguous redirect rules: {source:?} has more than one target"
                )));
            }
            rules.push(RedirectRule {
                source,
                target,
                ..rule
            });
        }

        let table = RedirectTable { rules };

        for rule in &table.rules {
            // Walk resolutions starting at this rule's target, through the
            // same matching resolve() applies — subtree rules whose targets
            // land inside each other's subtrees must be caught too, not
            // just exact source hits. A walk longer than the rule count has
            // re-applied some rule and can only repeat from there.
            let mut hops = 0usize;
            let mut at = rule.target.clone();
            while let Some(next) = table.resolve(&at) {
                hops += 1;
                if hops > table.rules.len() {
                    return Err(GateError::Config(format!(
                        "redirect rules form a cycle through {:?}",
                        rule.source
                    )));
                }
                at = next.target;
            }
            if hops > 0 {
                if !self.allow_chained {
                    return Err(GateError::Config(format!(
                        "redirect rule {:?} -> {:?} chains into another rule; \
                         flatten the table or call allow_chained()",
                        rule.source, rule.target
                    )));
                }
                tracing::warn!(
                    source = %rule.source,
                    target = %rule.target,
                    "redirect rule chains into another rule"
                );
            }
        }

        Ok(table)
    }
}

/// Strip a trailing slash (except for the root path itself).
fn normalize(path: &str) -> String {
    if path.len() > 1 && path.ends_with('/') {
        path[..path.len() - 1].to_string()
    } else {
        path.to_string()
    }
}

fn descends_from(path: &str, prefix: &str) -> bool {
    path.len() > prefix.len()
        && path.starts_with(prefix)
        && path.as_bytes()[prefix.len()] == b'/'
}
