//! Local peer discovery with a quorum floor.
//!
//! Membership views lag behind the cluster, so a short peer list is treated
//! as transient and re-queried under the discovery retry policy. The result is
//! either at least `min_expected` peers or an error; a partial list is never
//! returned.

use ccdeploy_core::types::PeerHandle;

use crate::error::DeployError;
use crate::network::{LedgerSession, NetworkError};
use crate::retry::{self, RetryExhausted};
use crate::session::NetworkSession;

/// Why one discovery attempt was not good enough.
#[derive(Debug)]
enum Shortfall {
    BelowQuorum(usize),
    Network(NetworkError),
}

impl Shortfall {
    fn is_retryable(&self) -> bool {
        match self {
            Shortfall::BelowQuorum(_) => true,
            Shortfall::Network(err) => err.is_transient(),
        }
    }
}

pub struct PeerDiscovery<'a, S> {
    session: &'a NetworkSession<S>,
}

impl<'a, S: LedgerSession> PeerDiscovery<'a, S> {
    pub fn new(session: &'a NetworkSession<S>) -> Self {
        Self { session }
    }

    /// Peers of `org` as seen through the session's admin context.
    ///
    /// The local peer listing is scoped by the admin context, so `org` must be
    /// the session's org; anything else is [`DeployError::ForeignOrg`]. Fails
    /// with [`DeployError::QuorumNotReached`] when fewer than `min_expected`
    /// peers are visible on every attempt.
    pub fn discover_peers(
        &self,
        org: &str,
        min_expected: usize,
    ) -> Result<Vec<PeerHandle>, DeployError> {
        let ctx = self.session.admin();
        if org != ctx.org {
            return Err(DeployError::ForeignOrg {
                requested: org.to_string(),
                session: ctx.org.clone(),
            });
        }
        let policy = self.session.retry_settings().discovery;

        let found = retry::run(
            &policy,
            self.session.sleeper(),
            Shortfall::is_retryable,
            |attempt| {
                let peers = self
                    .session
                    .ledger()
                    .list_local_peers(ctx)
                    .map_err(Shortfall::Network)?;
                if peers.len() < min_expected {
                    tracing::debug!(
                        org,
                        attempt,
                        expected = min_expected,
                        found = peers.len(),
                        "peer view below quorum"
                    );
                    return Err(Shortfall::BelowQuorum(peers.len()));
                }
                Ok(peers)
            },
        );

        match found {
            Ok(peers) => {
                tracing::debug!(org, peers = peers.len(), "discovered local peers");
                Ok(peers)
            }
            Err(RetryExhausted {
                attempts,
                last: Shortfall::BelowQuorum(observed),
            }) => Err(DeployError::QuorumNotReached {
                org: org.to_string(),
                expected: min_expected,
                observed,
                attempts,
            }),
            Err(RetryExhausted {
                attempts,
                last: Shortfall::Network(err),
            }) => Err(DeployError::from_network(
                "discover peers",
                RetryExhausted {
                    attempts,
                    last: err,
                },
            )),
        }
    }
}
