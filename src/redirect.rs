/// Redirection chain walking
///
/// An address record can point at another address through `redir_hash`
/// instead of holding routing data itself. Reads follow the chain to the
/// terminal record, bounded by a maximum depth and a visited list.
use crate::{
    error::{RedirectionError, ResolverError, ResolverResult},
    repository::{Repository, ResolveRecord},
};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Clone)]
pub struct RedirectResolver {
    repository: Arc<dyn Repository>,
    max_depth: usize,
}

impl RedirectResolver {
    pub fn new(repository: Arc<dyn Repository>, max_depth: usize) -> Self {
        Self {
            repository,
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Follow redirections from `hash` to the terminal record
    pub async fn resolve(&self, hash: &str) -> ResolverResult<ResolveRecord> {
        self.walk(hash, 0, None).await
    }

    /// Check that pointing `origin` at `target` keeps every chain through
    /// `origin` resolvable. The walk starts one hop in, so the depth budget
    /// is one less than for a read, and reaching `origin` again is a cycle.
    ///
    /// An unknown or deleted target is a validation error rather than a 404.
    pub async fn check_target(&self, origin: &str, target: &str) -> ResolverResult<()> {
        if origin == target {
            return Err(RedirectionError::Cyclic.into());
        }

        match self.walk(target, 1, Some(origin)).await {
            Ok(_) => Ok(()),
            Err(ResolverError::NotFound) => Err(ResolverError::validation("invalid redirect target")),
            Err(e) => Err(e),
        }
    }

    async fn walk(&self, start: &str, mut depth: usize, origin: Option<&str>) -> ResolverResult<ResolveRecord> {
        let mut visited: Vec<String> = Vec::with_capacity(self.max_depth);
        let mut current = start.to_string();

        loop {
            if origin == Some(current.as_str()) {
                return Err(RedirectionError::Cyclic.into());
            }

            let record = self.repository.get(&current).await?;
            if record.redir_hash.is_empty() {
                return Ok(record);
            }

            depth += 1;
            if depth >= self.max_depth {
                debug!("redirect chain from {} exceeded depth {}", start, self.max_depth);
                crate::metrics::record_redirect_failure("max_depth");
                return Err(RedirectionError::MaxDepth.into());
            }

            if visited.iter().any(|h| *h == current) {
                debug!("redirect cycle at {}", current);
                crate::metrics::record_redirect_failure("cyclic");
                return Err(RedirectionError::Cyclic.into());
            }
            visited.push(current);

            current = record.redir_hash;
        }
    }
}
