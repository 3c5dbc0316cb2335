//! Sequential try-each-candidate dispatch.
//!
//! Used during group discovery, where any single peer may be down.  A
//! failing candidate is logged and skipped; deciding what "no answer
//! at all" means is left to the caller.

use std::fmt::Display;
use std::future::Future;

use tracing::{debug, warn};

/// Run `op` against each candidate in order until one yields a value.
///
/// Errors and `Ok(None)` both move on to the next candidate.  Returns
/// `None` when no candidate produced a value.  Candidates after the
/// first success are never touched.
pub async fn run<'a, T, R, F, Fut>(candidates: &'a [T], mut op: F) -> Option<R>
where
    T: Display,
    F: FnMut(&'a T) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<R>>>,
{
    for (idx, candidate) in candidates.iter().enumerate() {
        match op(candidate).await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => debug!("Candidate {} ({}) returned nothing", idx, candidate),
            Err(e) => warn!("Candidate {} ({}) failed: {:#}", idx, candidate, e),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test]
    async fn test_returns_first_success_and_stops() {
        let calls = RefCell::new(Vec::new());
        let result = run(&[0, 1, 2, 3], |&i| {
            calls.borrow_mut().push(i);
            async move {
                if i < 2 {
                    anyhow::bail!("peer {i} unreachable");
                }
                Ok(Some(i * 10))
            }
        })
        .await;
        assert_eq!(result, Some(20));
        assert_eq!(*calls.borrow(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_none_results_are_skipped() {
        let result = run(&["a", "b"], |&s| async move {
            Ok(if s == "b" { Some(s.to_uppercase()) } else { None })
        })
        .await;
        assert_eq!(result.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_all_failures_yield_none() {
        let calls = RefCell::new(0);
        let result: Option<u32> = run(&[1, 2, 3], |_| {
            *calls.borrow_mut() += 1;
            async { Err(anyhow::anyhow!("down")) }
        })
        .await;
        assert_eq!(result, None);
        assert_eq!(*calls.borrow(), 3);
    }

    #[tokio::test]
    async fn test_empty_candidates_yield_none() {
        let result: Option<u32> = run(&[] as &[u32], |_| async { Ok(Some(1)) }).await;
        assert_eq!(result, None);
    }
}
