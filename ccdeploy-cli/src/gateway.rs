//! JSON-over-HTTP ledger backend.
//!
//! Talks to an admin gateway that fronts the ledger SDK:
//!
//! ```text
//! POST {base}/v1/sessions                 { network_config }        -> { session_id }
//! POST {base}/v1/sessions/{id}/{op}       op-specific request body  -> op-specific response
//! ```
//!
//! HTTP 401/403 map to `NetworkError::Identity`, other 4xx to `Rejected`,
//! 5xx and transport failures to `Transient`.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use ccdeploy_core::types::{
    ChaincodeInfo, ChaincodeSpec, ChannelSpec, EndorsementPolicy, PeerHandle, TxId,
};
use ccdeploy_engine::network::{
    AdminContext, ChannelClient, EventClient, LedgerClient, LedgerConnector, LedgerSession,
    NetworkError, SigningIdentity,
};
use ccdeploy_engine::ChaincodeBundle;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct GatewayConnector {
    base: String,
    agent: ureq::Agent,
}

impl GatewayConnector {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewaySession {
    endpoint: String,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct SessionCreated {
    session_id: String,
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    tx_id: String,
}

#[derive(Deserialize)]
struct Peers {
    peers: Vec<PeerHandle>,
}

#[derive(Deserialize)]
struct Channels {
    channels: Vec<String>,
}

#[derive(Deserialize)]
struct Chaincodes {
    chaincodes: Vec<ChaincodeInfo>,
}

#[derive(Deserialize)]
struct Empty {}

/// What the gateway needs to know about a chaincode; the local build root
/// stays local.
#[derive(Serialize)]
struct ChaincodeRef<'a> {
    name: &'a str,
    version: &'a str,
    path: &'a str,
}

impl<'a> From<&'a ChaincodeSpec> for ChaincodeRef<'a> {
    fn from(spec: &'a ChaincodeSpec) -> Self {
        Self {
            name: &spec.name,
            version: &spec.version,
            path: &spec.path,
        }
    }
}

impl LedgerConnector for GatewayConnector {
    type Session = GatewaySession;

    fn connect(&self, network_config: &Path) -> Result<GatewaySession, NetworkError> {
        let profile = std::fs::read_to_string(network_config).map_err(|e| {
            NetworkError::Config(format!("cannot read {}: {e}", network_config.display()))
        })?;
        let created: SessionCreated = post(
            &self.agent,
            &format!("{}/v1/sessions", self.base),
            &json!({ "network_config": profile }),
        )?;
        Ok(GatewaySession {
            endpoint: format!("{}/v1/sessions/{}", self.base, created.session_id),
            agent: self.agent.clone(),
        })
    }
}

impl GatewaySession {
    fn call<B: Serialize, T: DeserializeOwned>(&self, op: &str, body: &B) -> Result<T, NetworkError> {
        tracing::debug!(op, "gateway request");
        post(&self.agent, &format!("{}/{op}", self.endpoint), body)
    }
}

impl LedgerSession for GatewaySession {
    fn admin_context(&self, org: &str, admin: &str) -> Result<AdminContext, NetworkError> {
        self.call("admin_context", &json!({ "org": org, "admin": admin }))
    }

    fn signing_identity(&self, org: &str, admin: &str) -> Result<SigningIdentity, NetworkError> {
        self.call("signing_identity", &json!({ "org": org, "admin": admin }))
    }

    fn create_channel(
        &self,
        ctx: &AdminContext,
        channel: &ChannelSpec,
        signer: &SigningIdentity,
        orderer: &str,
    ) -> Result<TxId, NetworkError> {
        let artifact = std::fs::read(&channel.artifact).map_err(|e| {
            NetworkError::Config(format!("cannot read {}: {e}", channel.artifact.display()))
        })?;
        let resp: TxResponse = self.call(
            "create_channel",
            &json!({
                "ctx": ctx,
                "channel_id": channel.id,
                "artifact": artifact,
                "signer": signer,
                "orderer": orderer,
            }),
        )?;
        Ok(TxId(resp.tx_id))
    }

    fn join_channel(
        &self,
        ctx: &AdminContext,
        channel_id: &str,
        orderer: &str,
    ) -> Result<(), NetworkError> {
        let _: Empty = self.call(
            "join_channel",
            &json!({ "ctx": ctx, "channel_id": channel_id, "orderer": orderer }),
        )?;
        Ok(())
    }

    fn list_local_peers(&self, ctx: &AdminContext) -> Result<Vec<PeerHandle>, NetworkError> {
        let resp: Peers = self.call("list_local_peers", &json!({ "ctx": ctx }))?;
        Ok(resp.peers)
    }

    fn query_channels(
        &self,
        ctx: &AdminContext,
        peer: &PeerHandle,
    ) -> Result<Vec<String>, NetworkError> {
        let resp: Channels = self.call("query_channels", &json!({ "ctx": ctx, "peer": peer }))?;
        Ok(resp.channels)
    }

    fn query_installed_chaincodes(
        &self,
        ctx: &AdminContext,
        peer: &PeerHandle,
    ) -> Result<Vec<ChaincodeInfo>, NetworkError> {
        let resp: Chaincodes =
            self.call("query_installed", &json!({ "ctx": ctx, "peer": peer }))?;
        Ok(resp.chaincodes)
    }

    fn install_chaincode(
        &self,
        ctx: &AdminContext,
        spec: &ChaincodeSpec,
        bundle: &ChaincodeBundle,
        targets: &[PeerHandle],
    ) -> Result<(), NetworkError> {
        let _: Empty = self.call(
            "install_chaincode",
            &json!({
                "ctx": ctx,
                "chaincode": ChaincodeRef::from(spec),
                "bundle": bundle,
                "targets": targets,
            }),
        )?;
        Ok(())
    }

    fn upgrade_chaincode(
        &self,
        ctx: &AdminContext,
        channel_id: &str,
        spec: &ChaincodeSpec,
        policy: &EndorsementPolicy,
    ) -> Result<TxId, NetworkError> {
        let resp: TxResponse = self.call(
            "upgrade_chaincode",
            &json!({
                "ctx": ctx,
                "channel_id": channel_id,
                "chaincode": ChaincodeRef::from(spec),
                "policy": policy,
            }),
        )?;
        Ok(TxId(resp.tx_id))
    }

    fn instantiate_chaincode(
        &self,
        ctx: &AdminContext,
        channel_id: &str,
        spec: &ChaincodeSpec,
        init_args: &[Vec<u8>],
        policy: &EndorsementPolicy,
    ) -> Result<TxId, NetworkError> {
        let args: Vec<String> = init_args
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect();
        let resp: TxResponse = self.call(
            "instantiate_chaincode",
            &json!({
                "ctx": ctx,
                "channel_id": channel_id,
                "chaincode": ChaincodeRef::from(spec),
                "init_args": args,
                "policy": policy,
            }),
        )?;
        Ok(TxId(resp.tx_id))
    }

    fn query_instantiated_chaincodes(
        &self,
        ctx: &AdminContext,
        channel_id: &str,
    ) -> Result<Vec<ChaincodeInfo>, NetworkError> {
        let resp: Chaincodes = self.call(
            "query_instantiated",
            &json!({ "ctx": ctx, "channel_id": channel_id }),
        )?;
        Ok(resp.chaincodes)
    }

    fn open_channel_client(
        &self,
        channel_id: &str,
        user: &str,
    ) -> Result<ChannelClient, NetworkError> {
        self.call(
            "channel_client",
            &json!({ "channel_id": channel_id, "user": user }),
        )
    }

    fn open_event_client(&self, channel_id: &str, user: &str) -> Result<EventClient, NetworkError> {
        self.call(
            "event_client",
            &json!({ "channel_id": channel_id, "user": user }),
        )
    }

    fn open_ledger_client(
        &self,
        channel_id: &str,
        user: &str,
    ) -> Result<LedgerClient, NetworkError> {
        self.call(
            "ledger_client",
            &json!({ "channel_id": channel_id, "user": user }),
        )
    }
}

fn post<B: Serialize, T: DeserializeOwned>(
    agent: &ureq::Agent,
    url: &str,
    body: &B,
) -> Result<T, NetworkError> {
    match agent.post(url).send_json(body) {
        Ok(resp) => resp
            .into_json::<T>()
            .map_err(|e| NetworkError::Rejected(format!("malformed gateway response from {url}: {e}"))),
        Err(ureq::Error::Status(code, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            Err(classify_status(code, body.trim()))
        }
        Err(ureq::Error::Transport(t)) => Err(NetworkError::Transient(t.to_string())),
    }
}

fn classify_status(code: u16, body: &str) -> NetworkError {
    let message = if body.is_empty() {
        format!("HTTP {code}")
    } else {
        format!("HTTP {code}: {body}")
    };
    match code {
        401 | 403 => NetworkError::Identity(message),
        400..=499 => NetworkError::Rejected(message),
        _ => NetworkError::Transient(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(classify_status(401, ""), NetworkError::Identity(_)));
        assert!(matches!(classify_status(403, "no admin cert"), NetworkError::Identity(_)));
        assert!(matches!(classify_status(409, "exists"), NetworkError::Rejected(_)));
        assert!(matches!(classify_status(404, ""), NetworkError::Rejected(_)));
        assert!(classify_status(503, "").is_transient());
        assert!(classify_status(500, "").is_transient());
    }

    #[test]
    fn status_message_includes_body() {
        assert_eq!(
            classify_status(409, "channel exists").to_string(),
            "request rejected: HTTP 409: channel exists"
        );
    }

    #[test]
    fn unreadable_network_config_is_config_error() {
        let err = GatewayConnector::new("http://127.0.0.1:9")
            .connect(Path::new("/no/such/config.yaml"))
            .unwrap_err();
        assert!(matches!(err, NetworkError::Config(_)), "got: {err}");
    }

    #[test]
    fn unreachable_gateway_is_transient() {
        let dir = TempDir::new().expect("tempdir");
        let profile = dir.path().join("config.yaml");
        std::fs::write(&profile, "name: test-network\n").expect("write profile");

        let err = GatewayConnector::new("http://127.0.0.1:9/")
            .connect(&profile)
            .unwrap_err();
        assert!(err.is_transient(), "got: {err}");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(GatewayConnector::new("http://gw:8080/").base, "http://gw:8080");
    }
}
