//! The master agent: version gating, community/context demultiplexing to
//! sub-agents, and the v3 two-pass USM decode flow.
//!
//! A running agent is held behind [`arc_swap::ArcSwap`] so configuration
//! can be hot-swapped without downtime: the server loop loads a fresh
//! `Arc<MasterAgent>` for every incoming datagram, so an in-flight swap
//! never sees a half-updated agent.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::codec;
use crate::error::{Error, Result};
use crate::pdu::{EnabledVersions, ErrorStatus, PduType, SnmpMessage, SnmpValue, SnmpVersion, VarBind};
use crate::security::{MessageSecurityParameters, PrivProtocol, SecurityConfig, UsmSecurityParameters};
use crate::subagent::SubAgent;

/// Aggregates every sub-agent under a single listening engine.
pub struct MasterAgent {
    pub security_config: SecurityConfig,
    pub sub_agents: Vec<Arc<SubAgent>>,
    pub allowed_versions: EnabledVersions,
    create_time: Instant,
    community_to_subagent: DashMap<String, Arc<SubAgent>>,
    default_subagent: arc_swap::ArcSwapOption<SubAgent>,
}

impl MasterAgent {
    pub fn new(security_config: SecurityConfig, sub_agents: Vec<Arc<SubAgent>>) -> Self {
        Self {
            security_config,
            sub_agents,
            allowed_versions: EnabledVersions::all(),
            create_time: Instant::now(),
            community_to_subagent: DashMap::new(),
            default_subagent: arc_swap::ArcSwapOption::from(None),
        }
    }

    /// Fills security defaults and builds the community/context routing
    /// table. Must run once before the agent serves traffic.
    pub async fn ready_for_work(&mut self) -> Result<()> {
        if self.sub_agents.is_empty() {
            return Err(Error::invalid_state(
                "a master agent needs at least one sub-agent before it can serve traffic",
            ));
        }
        if self.security_config.no_security && self.sub_agents.len() != 1 {
            return Err(Error::invalid_state(
                "no_security requires exactly one sub-agent",
            ));
        }
        self.security_config.ready_for_work();
        self.sync_config()?;
        Ok(())
    }

    /// Rebuilds `community_to_subagent` and the default sub-agent from
    /// each sub-agent's `community_ids`. A sub-agent with no community ids
    /// becomes the default; more than one is a configuration error, as is
    /// two sub-agents claiming the same community string. When
    /// `no_security` is set, the single sub-agent is always treated as the
    /// default regardless of its own `community_ids`.
    pub fn sync_config(&self) -> Result<()> {
        if self.security_config.no_security {
            self.community_to_subagent.clear();
            self.default_subagent.store(self.sub_agents.first().cloned());
            return Ok(());
        }
        self.community_to_subagent.clear();
        let mut default: Option<Arc<SubAgent>> = None;
        for sub_agent in &self.sub_agents {
            if sub_agent.community_ids.is_empty() {
                if default.is_some() {
                    return Err(Error::invalid_state(
                        "more than one sub-agent claims the default community",
                    ));
                }
                default = Some(sub_agent.clone());
                continue;
            }
            for community in &sub_agent.community_ids {
                if self
                    .community_to_subagent
                    .insert(community.clone(), sub_agent.clone())
                    .is_some()
                {
                    return Err(Error::invalid_state(format!(
                        "duplicate community {community:?} claimed by more than one sub-agent"
                    )));
                }
            }
        }
        self.default_subagent.store(default);
        Ok(())
    }

    fn find_for_subagent(&self, community: &str) -> Option<Arc<SubAgent>> {
        self.community_to_subagent
            .get(community)
            .map(|entry| entry.clone())
            .or_else(|| self.default_subagent.load_full())
    }

    /// Maps an internal error into the RFC 1905 envelope error-status the
    /// way the original agent's `fillErrorPkt` does: only the envelope
    /// error-status/index change, variables are left as-is.
    fn fill_error_pkt(response: &mut SnmpMessage, err: &Error) {
        let status = match err {
            Error::NoSnmpInstance => ErrorStatus::NoAccess,
            Error::UnsupportedOperation(_) => ErrorStatus::ResourceUnavailable,
            Error::NoPermission(_) => ErrorStatus::AuthorizationError,
            Error::UnsupportedPacketData(_) => ErrorStatus::BadValue,
            _ => ErrorStatus::GenErr,
        };
        response.pdu_type = PduType::GetResponse;
        response.error_status = status;
        response.error_index = 0;
    }

    /// Routes an already-decoded request to the right sub-agent and
    /// serves it.
    async fn response_for_pkt(&self, request: &SnmpMessage) -> Result<Option<SnmpMessage>> {
        if !self.allowed_versions.contains(request.version) {
            return Err(Error::UnsupportedProtoVersion);
        }
        let sub_agent = self
            .find_for_subagent(&request.community)
            .ok_or(Error::NoSnmpInstance)?;
        Ok(sub_agent.serve(request).await)
    }

    /// Builds a v3 discovery Report carrying `usmStatsUnknownEngineIDs`,
    /// answering a request whose variable list is empty (the standard
    /// probe pysnmp/net-snmp send before their first authenticated PDU).
    fn discovery_report(&self, request: &SnmpMessage) -> SnmpMessage {
        let mut response = request.response_shell();
        response.pdu_type = PduType::Report;
        response.variables.push(VarBind::new(
            crate::pdu::usm_stats_unknown_engine_ids_oid(),
            SnmpValue::Counter32(0),
        ));
        response.security_parameters =
            MessageSecurityParameters::Usm(self.security_config.default_usm_parameters());
        response
    }

    /// Decodes a raw inbound datagram, serves it, and encodes the
    /// response -- or returns `Ok(None)` for fire-and-forget traps.
    ///
    /// For v3 this is the two-pass flow from RFC 3414: a cheap probe
    /// recovers the claimed username from the USM header alone (the BER
    /// envelope always decodes even when the scoped PDU is ciphertext this
    /// engine can't open yet), then the request is fully decoded -- and,
    /// if encrypted, decrypted -- with that user's derived keys. A v3
    /// request with no variable bindings is treated as a discovery probe
    /// and answered with a Report, never forwarded to a sub-agent. An
    /// unknown user, a failed authentication digest check, or a failed
    /// decrypt (wrong passphrase, in each case) all collapse to the same
    /// `AuthorizationError` response -- the request is never forwarded to
    /// a sub-agent unless its claimed identity checks out.
    pub async fn response_for_buffer(&self, bytes: &[u8]) -> Result<Option<Vec<u8>>> {
        let default_usm = self.security_config.default_usm_parameters();

        if let Ok(probe) = codec::probe_v3(bytes) {
            if !self.allowed_versions.contains(SnmpVersion::V3) {
                debug!("dropping v3 request: v3 is not an allowed SNMP version on this agent");
                return Ok(None);
            }
            return self.response_for_v3_buffer(bytes, probe, default_usm).await;
        }

        let request = codec::decode_message(bytes, &default_usm)?;
        self.serve_and_encode(request, default_usm).await
    }

    async fn response_for_v3_buffer(
        &self,
        bytes: &[u8],
        probe: codec::V3Probe,
        default_usm: UsmSecurityParameters,
    ) -> Result<Option<Vec<u8>>> {
        let resolved_usm = match self.security_config.usm_parameters_for_user(&probe.username) {
            Ok(usm) => usm,
            Err(err) => {
                return Ok(Some(self.encode_v3_error(&probe, &err, &default_usm)?));
            }
        };

        match codec::decode_message(bytes, &resolved_usm) {
            Ok(request) if request.variables.is_empty() => {
                let report = self.discovery_report(&request);
                let encoded = codec::encode_message(&report, &report.security_parameters)?;
                Ok(Some(encoded))
            }
            Ok(request) => {
                let mut usm_for_response = resolved_usm;
                if usm_for_response.priv_protocol != PrivProtocol::None {
                    usm_for_response.refresh_privacy_salt();
                }
                self.serve_and_encode(request, usm_for_response).await
            }
            Err(err) => {
                warn!(error = %err, user = %probe.username, "v3 authentication or decryption failed");
                let denied = Error::no_permission("authentication failed");
                Ok(Some(self.encode_v3_error(&probe, &denied, &default_usm)?))
            }
        }
    }

    /// Builds an error `GetResponse` for a v3 request that never made it
    /// past USM resolution, keyed off the probe's message id since no
    /// fully-decoded request is available to build a response shell from.
    fn encode_v3_error(
        &self,
        probe: &codec::V3Probe,
        err: &Error,
        usm_for_response: &UsmSecurityParameters,
    ) -> Result<Vec<u8>> {
        let mut response = SnmpMessage {
            version: SnmpVersion::V3,
            community: String::new(),
            pdu_type: PduType::GetResponse,
            request_id: probe.message_id,
            non_repeaters: 0,
            max_repetitions: 0,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            variables: Vec::new(),
            security_parameters: MessageSecurityParameters::None,
        };
        Self::fill_error_pkt(&mut response, err);
        response.security_parameters = MessageSecurityParameters::Usm(usm_for_response.clone());
        codec::encode_message(&response, &response.security_parameters)
    }

    async fn serve_and_encode(
        &self,
        request: SnmpMessage,
        usm_for_response: UsmSecurityParameters,
    ) -> Result<Option<Vec<u8>>> {
        match self.response_for_pkt(&request).await {
            Ok(Some(mut response)) => {
                response.security_parameters = MessageSecurityParameters::Usm(usm_for_response);
                let encoded = codec::encode_message(&response, &response.security_parameters)?;
                Ok(Some(encoded))
            }
            Ok(None) => Ok(None),
            Err(Error::UnsupportedProtoVersion) => {
                debug!(version = ?request.version, "dropping request for a disallowed SNMP version");
                Ok(None)
            }
            Err(err) => {
                warn!(error = %err, "failed to serve SNMP request");
                let mut response = request.response_shell();
                Self::fill_error_pkt(&mut response, &err);
                response.security_parameters = MessageSecurityParameters::Usm(usm_for_response);
                let encoded = codec::encode_message(&response, &response.security_parameters)?;
                Ok(Some(encoded))
            }
        }
    }

    pub fn uptime_ticks(&self) -> u32 {
        (self.create_time.elapsed().as_millis() / 10) as u32
    }
}

/// Sends unsolicited traps/informs to a fixed set of destinations, driven
/// by application code rather than scheduled internally.
pub struct TrapSender<T: TrapTransport> {
    transport: T,
    destinations: Vec<T::Destination>,
    community: String,
}

/// Abstraction over "send these bytes to this destination", so
/// `TrapSender` does not depend on a concrete socket type.
#[async_trait::async_trait]
pub trait TrapTransport: Send + Sync {
    type Destination: Clone + Send + Sync;

    async fn send_to(&self, destination: &Self::Destination, bytes: &[u8]) -> Result<()>;
}

impl<T: TrapTransport> TrapSender<T> {
    pub fn new(transport: T, community: impl Into<String>) -> Self {
        Self {
            transport,
            destinations: Vec::new(),
            community: community.into(),
        }
    }

    pub fn add_destination(&mut self, destination: T::Destination) {
        self.destinations.push(destination);
    }

    async fn dispatch(&self, version: SnmpVersion, pdu_type: PduType, variables: Vec<VarBind>, request_id: i32) -> Result<()> {
        let message = SnmpMessage {
            version,
            community: self.community.clone(),
            pdu_type,
            request_id,
            non_repeaters: 0,
            max_repetitions: 0,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            variables,
            security_parameters: MessageSecurityParameters::None,
        };
        let bytes = codec::encode_message(&message, &message.security_parameters)?;
        for destination in &self.destinations {
            if let Err(err) = self.transport.send_to(destination, &bytes).await {
                warn!(error = %err, "failed to deliver trap");
            }
        }
        debug!(count = self.destinations.len(), "dispatched trap to destinations");
        Ok(())
    }

    pub async fn send_trap(&self, version: SnmpVersion, variables: Vec<VarBind>, request_id: i32) -> Result<()> {
        let pdu_type = match version {
            SnmpVersion::V1 => PduType::Trap,
            _ => PduType::SnmpV2Trap,
        };
        self.dispatch(version, pdu_type, variables, request_id).await
    }

    pub async fn send_inform(&self, variables: Vec<VarBind>, request_id: i32) -> Result<()> {
        self.dispatch(SnmpVersion::V2c, PduType::InformRequest, variables, request_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid::Oid;
    use crate::pdu::Asn1Type;
    use crate::pdu::PduControlItem;

    fn counter_sub_agent(communities: Vec<&str>) -> Arc<SubAgent> {
        let item = PduControlItem::read_only(
            Oid::parse("1.3.6.1.2.1.1.3.0").unwrap(),
            Asn1Type::TimeTicks,
            "sysUpTime",
            || Ok(SnmpValue::TimeTicks(7)),
        );
        Arc::new(SubAgent::with_oids(
            communities.into_iter().map(String::from).collect(),
            vec![item],
        ))
    }

    #[tokio::test]
    async fn sync_config_routes_by_community() {
        let public = counter_sub_agent(vec!["public"]);
        public.sync_config().await.unwrap();
        let master = MasterAgent::new(SecurityConfig::default(), vec![public.clone()]);
        master.sync_config().unwrap();
        assert!(master.find_for_subagent("public").is_some());
        assert!(master.find_for_subagent("nope").is_none());
    }

    #[tokio::test]
    async fn sync_config_rejects_duplicate_community() {
        let a = counter_sub_agent(vec!["public"]);
        let b = counter_sub_agent(vec!["public"]);
        a.sync_config().await.unwrap();
        b.sync_config().await.unwrap();
        let master = MasterAgent::new(SecurityConfig::default(), vec![a, b]);
        assert!(master.sync_config().is_err());
    }

    #[tokio::test]
    async fn default_subagent_used_when_community_unmatched() {
        let default_agent = counter_sub_agent(vec![]);
        default_agent.sync_config().await.unwrap();
        let master = MasterAgent::new(SecurityConfig::default(), vec![default_agent]);
        master.sync_config().unwrap();
        assert!(master.find_for_subagent("anything").is_some());
    }

    #[tokio::test]
    async fn disallowed_version_is_dropped_silently_not_answered_with_an_error() {
        let public = counter_sub_agent(vec!["public"]);
        public.sync_config().await.unwrap();
        let mut master = MasterAgent::new(SecurityConfig::default(), vec![public]);
        master.allowed_versions = EnabledVersions::V2C;
        master.ready_for_work().await.unwrap();

        let request = SnmpMessage {
            version: SnmpVersion::V1,
            community: "public".into(),
            pdu_type: PduType::GetRequest,
            request_id: 1,
            non_repeaters: 0,
            max_repetitions: 0,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            variables: vec![VarBind::new(
                Oid::parse("1.3.6.1.2.1.1.3.0").unwrap(),
                SnmpValue::Null,
            )],
            security_parameters: MessageSecurityParameters::None,
        };
        let bytes = codec::encode_message(&request, &MessageSecurityParameters::None).unwrap();

        let reply = master.response_for_buffer(&bytes).await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn ready_for_work_rejects_an_empty_sub_agent_list() {
        let mut master = MasterAgent::new(SecurityConfig::default(), vec![]);
        assert!(master.ready_for_work().await.is_err());
    }

    #[tokio::test]
    async fn ready_for_work_rejects_no_security_with_more_than_one_sub_agent() {
        let a = counter_sub_agent(vec![]);
        let b = counter_sub_agent(vec![]);
        a.sync_config().await.unwrap();
        b.sync_config().await.unwrap();
        let mut security = SecurityConfig::default();
        security.no_security = true;
        let mut master = MasterAgent::new(security, vec![a, b]);
        assert!(master.ready_for_work().await.is_err());
    }

    #[tokio::test]
    async fn no_security_treats_the_single_sub_agent_as_default_regardless_of_community_ids() {
        let agent = counter_sub_agent(vec!["irrelevant"]);
        agent.sync_config().await.unwrap();
        let mut security = SecurityConfig::default();
        security.no_security = true;
        let mut master = MasterAgent::new(security, vec![agent]);
        master.ready_for_work().await.unwrap();
        assert!(master.find_for_subagent("anything-at-all").is_some());
    }
}
