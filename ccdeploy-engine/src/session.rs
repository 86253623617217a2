//! The single live handle to the ledger network.
//!
//! A [`NetworkSession`] is built once from an immutable [`DeployConfig`] and
//! owned by whoever drives the deployment. Components borrow it; the only
//! mutation after construction is opening the channel-scoped clients, which
//! requires `&mut`.

use ccdeploy_core::retry::{RetryPolicy, RetrySettings};
use ccdeploy_core::types::OrgIdentity;
use ccdeploy_core::DeployConfig;

use crate::error::DeployError;
use crate::network::{
    AdminContext, ChannelClient, EventClient, LedgerClient, LedgerConnector, LedgerSession,
    NetworkError, SigningIdentity,
};
use crate::retry::{self, Sleeper};

pub struct NetworkSession<S> {
    ledger: S,
    org: OrgIdentity,
    admin: AdminContext,
    signer: SigningIdentity,
    retry: RetrySettings,
    sleeper: Box<dyn Sleeper>,
    channel_client: Option<ChannelClient>,
    event_client: Option<EventClient>,
    ledger_client: Option<LedgerClient>,
}

impl<S: LedgerSession> NetworkSession<S> {
    /// Connect and load the administrative identity for `config.org`.
    pub fn open<C>(
        connector: &C,
        config: &DeployConfig,
        sleeper: Box<dyn Sleeper>,
    ) -> Result<Self, DeployError>
    where
        C: LedgerConnector<Session = S>,
    {
        config.validate()?;
        let network = &config.retry.network;

        let ledger = retry::run(network, sleeper.as_ref(), NetworkError::is_transient, |_| {
            connector.connect(&config.network_config)
        })
        .map_err(|e| DeployError::from_network("connect", e))?;
        tracing::info!(config = %config.network_config.display(), "network session created");

        let org = &config.org;
        let admin = retry::run(network, sleeper.as_ref(), NetworkError::is_transient, |_| {
            ledger.admin_context(&org.name, &org.admin)
        })
        .map_err(|e| DeployError::from_network("load admin context", e))?;
        let signer = retry::run(network, sleeper.as_ref(), NetworkError::is_transient, |_| {
            ledger.signing_identity(&org.name, &org.admin)
        })
        .map_err(|e| DeployError::from_network("load admin signing identity", e))?;
        tracing::info!(org = %org.name, admin = %org.admin, "admin identity loaded");

        Ok(Self {
            ledger,
            org: org.clone(),
            admin,
            signer,
            retry: config.retry,
            sleeper,
            channel_client: None,
            event_client: None,
            ledger_client: None,
        })
    }

    pub fn org(&self) -> &OrgIdentity {
        &self.org
    }

    pub fn admin(&self) -> &AdminContext {
        &self.admin
    }

    pub fn signer(&self) -> &SigningIdentity {
        &self.signer
    }

    pub fn retry_settings(&self) -> &RetrySettings {
        &self.retry
    }

    pub fn ledger(&self) -> &S {
        &self.ledger
    }

    pub(crate) fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    /// Run one network call under `policy`, retrying transient failures.
    pub(crate) fn call<T>(
        &self,
        step: &'static str,
        policy: &RetryPolicy,
        mut op: impl FnMut(&S, &AdminContext) -> Result<T, NetworkError>,
    ) -> Result<T, DeployError> {
        retry::run(
            policy,
            self.sleeper(),
            NetworkError::is_transient,
            |attempt| {
                if attempt > 1 {
                    tracing::debug!(step, attempt, "retrying network call");
                }
                op(&self.ledger, &self.admin)
            },
        )
        .map_err(|e| DeployError::from_network(step, e))
    }

    /// Open the channel-scoped channel, event and ledger clients. Handles that
    /// are already open are kept.
    pub fn open_channel_clients(&mut self, channel_id: &str) -> Result<(), DeployError> {
        let network = self.retry.network;
        let user = self.org.user.clone();

        if self.channel_client.is_none() {
            let client = self.call("open channel client", &network, |ledger, _| {
                ledger.open_channel_client(channel_id, &user)
            })?;
            tracing::info!(channel = channel_id, user = %user, "channel client created");
            self.channel_client = Some(client);
        }
        if self.event_client.is_none() {
            let client = self.call("open event client", &network, |ledger, _| {
                ledger.open_event_client(channel_id, &user)
            })?;
            tracing::info!(channel = channel_id, user = %user, "event client created");
            self.event_client = Some(client);
        }
        if self.ledger_client.is_none() {
            let client = self.call("open ledger client", &network, |ledger, _| {
                ledger.open_ledger_client(channel_id, &user)
            })?;
            tracing::info!(channel = channel_id, user = %user, "ledger client created");
            self.ledger_client = Some(client);
        }
        Ok(())
    }

    pub fn channel_client(&self) -> Option<&ChannelClient> {
        self.channel_client.as_ref()
    }

    pub fn event_client(&self) -> Option<&EventClient> {
        self.event_client.as_ref()
    }

    pub fn ledger_client(&self) -> Option<&LedgerClient> {
        self.ledger_client.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryNetwork, Op};
    use crate::retry::RecordingSleeper;
    use ccdeploy_core::config;

    #[test]
    fn open_loads_admin_and_signer() {
        let network = InMemoryNetwork::new().with_org("org1", "Org1MSP", 2);
        let session =
            NetworkSession::open(&network, &config::scaffold(), Box::new(RecordingSleeper::new()))
                .expect("open");
        assert_eq!(session.admin().principal, "Admin");
        assert_eq!(session.signer().msp_id, "Org1MSP");
        assert!(session.channel_client().is_none());
    }

    #[test]
    fn missing_signing_identity_is_identity_error() {
        let network = InMemoryNetwork::new()
            .with_org("org1", "Org1MSP", 2)
            .fail_permanently(Op::SigningIdentity, "no enrollment for Admin");
        let err = NetworkSession::open(&network, &config::scaffold(), Box::new(RecordingSleeper::new()))
            .err()
            .expect("must fail");
        assert!(matches!(err, DeployError::Identity { .. }), "got: {err}");
    }

    #[test]
    fn unusable_network_config_fails_fast() {
        let network = InMemoryNetwork::new().fail_permanently(Op::Connect, "config.yaml unreadable");
        let sleeper = RecordingSleeper::new();
        let err = NetworkSession::open(&network, &config::scaffold(), Box::new(sleeper.clone()))
            .err()
            .expect("must fail");
        assert!(matches!(err, DeployError::NetworkConfig { .. }), "got: {err}");
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn failed_ledger_client_is_retried_on_next_open() {
        let network = InMemoryNetwork::new()
            .with_org("org1", "Org1MSP", 2)
            .with_channel("mychannel")
            .fail_permanently(Op::OpenLedgerClient, "ledger service disabled");
        let mut session =
            NetworkSession::open(&network, &config::scaffold(), Box::new(RecordingSleeper::new()))
                .expect("open");

        let err = session.open_channel_clients("mychannel").unwrap_err();
        assert!(matches!(err, DeployError::Rejected { step: "open ledger client", .. }), "got: {err}");
        assert!(session.channel_client().is_some());
        assert!(session.ledger_client().is_none());

        session.open_channel_clients("mychannel").unwrap_err();
        assert_eq!(network.count(Op::OpenChannelClient), 1);
        assert_eq!(network.count(Op::OpenLedgerClient), 2);
    }

    #[test]
    fn channel_clients_open_once() {
        let network = InMemoryNetwork::new()
            .with_org("org1", "Org1MSP", 2)
            .with_channel("mychannel");
        let mut session =
            NetworkSession::open(&network, &config::scaffold(), Box::new(RecordingSleeper::new()))
                .expect("open");
        session.open_channel_clients("mychannel").expect("open clients");
        session.open_channel_clients("mychannel").expect("reopen");

        assert_eq!(network.count(Op::OpenChannelClient), 1);
        assert_eq!(network.count(Op::OpenEventClient), 1);
        assert_eq!(network.count(Op::OpenLedgerClient), 1);
        assert_eq!(
            session.ledger_client().map(|c| c.channel_id.as_str()),
            Some("mychannel")
        );
        assert_eq!(
            session.channel_client().map(|c| c.user.as_str()),
            Some("User1")
        );
    }
}
