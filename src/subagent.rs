//! A sub-agent owns a sorted table of OIDs and the callbacks bound to
//! them, and serves one SNMP request at a time against that table.
//!
//! Lookups use the canonical OID byte ordering from [`crate::oid`], so
//! the table is kept sorted and binary-searched rather than scanned.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{Error, Result};
use crate::oid::Oid;
use crate::pdu::{
    Asn1Type, ErrorStatus, PduControlItem, PduType, PermissionAllowance, SnmpMessage, SnmpValue,
    VarBind,
};

/// A sub-agent: one community/context's worth of MIB objects.
pub struct SubAgent {
    pub community_ids: Vec<String>,
    oids: RwLock<Vec<PduControlItem>>,
    /// When set, a callback panic or error (after being echoed back as
    /// an `OctetString` value) also taints the envelope error-status
    /// with `GenErr`; when unset, the value is still substituted but the
    /// envelope stays clean -- mirrors `UserErrorMarkPacket`.
    pub user_error_marks_packet: bool,
}

impl SubAgent {
    pub fn new(community_ids: Vec<String>) -> Self {
        Self {
            community_ids,
            oids: RwLock::new(Vec::new()),
            user_error_marks_packet: false,
        }
    }

    pub fn with_oids(community_ids: Vec<String>, oids: Vec<PduControlItem>) -> Self {
        Self {
            community_ids,
            oids: RwLock::new(oids),
            user_error_marks_packet: false,
        }
    }

    /// Validates, sorts, and checks for duplicate OIDs. Must be called
    /// after mutating the table directly; [`SubAgent::replace_oids`] does
    /// this for you.
    pub async fn sync_config(&self) -> Result<()> {
        let mut oids = self.oids.write().await;
        oids.sort_by(|a, b| a.oid.compare(&b.oid));
        for pair in oids.windows(2) {
            if pair[0].oid == pair[1].oid {
                return Err(Error::duplicate_oid(pair[0].oid.to_string()));
            }
        }
        Ok(())
    }

    /// Atomically swaps in a new OID table and re-validates it.
    pub async fn replace_oids(&self, oids: Vec<PduControlItem>) -> Result<()> {
        {
            let mut guard = self.oids.write().await;
            *guard = oids;
        }
        self.sync_config().await
    }

    fn check_permission(item: &PduControlItem, message: &SnmpMessage) -> PermissionAllowance {
        match &item.on_check_permission {
            Some(check) => check(message.version, message.pdu_type, &message.community),
            None => PermissionAllowance::Allowed,
        }
    }

    /// Binary search by canonical OID ordering. Returns `Ok(index)` on an
    /// exact match, `Err(index)` with the insertion point otherwise --
    /// the same shape as `sort.Search` in the original source.
    fn search(oids: &[PduControlItem], oid: &Oid) -> std::result::Result<usize, usize> {
        oids.binary_search_by(|item| item.oid.compare(oid))
    }

    /// Runs a get callback with panic containment, converting both
    /// panics and callback errors into a uniform `OctetString` error
    /// value, and reports whether the envelope should record an error.
    fn run_get(item: &PduControlItem) -> (SnmpValue, Option<ErrorStatus>) {
        let on_get = match &item.on_get {
            Some(f) => f.clone(),
            None => return (SnmpValue::Null, Some(ErrorStatus::ResourceUnavailable)),
        };
        let result = catch_unwind(AssertUnwindSafe(|| on_get()));
        match result {
            Ok(Ok(value)) => (value, None),
            Ok(Err(err)) => (SnmpValue::error_octet_string(&err), Some(ErrorStatus::GenErr)),
            Err(panic) => {
                let detail = panic_message(&panic);
                warn!(oid = %item.oid, detail, "get callback panicked");
                (
                    SnmpValue::error_octet_string(detail),
                    Some(ErrorStatus::GenErr),
                )
            }
        }
    }

    fn run_set(item: &PduControlItem, value: &SnmpValue) -> Option<Error> {
        let on_set = match &item.on_set {
            Some(f) => f.clone(),
            None => return Some(Error::invalid_state("read-only object")),
        };
        let result = catch_unwind(AssertUnwindSafe(|| on_set(value)));
        match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(panic) => {
                let detail = panic_message(&panic);
                warn!(oid = %item.oid, detail, "set callback panicked");
                Some(Error::internal(detail))
            }
        }
    }

    fn run_trap(item: &PduControlItem, is_inform: bool, binding: &VarBind) -> (SnmpValue, Option<ErrorStatus>) {
        let on_trap = match &item.on_trap {
            Some(f) => f.clone(),
            None => return (SnmpValue::Null, Some(ErrorStatus::ResourceUnavailable)),
        };
        let result = catch_unwind(AssertUnwindSafe(|| on_trap(is_inform, binding)));
        match result {
            Ok(Ok(value)) => (value, None),
            Ok(Err(err)) => (SnmpValue::error_octet_string(&err), Some(ErrorStatus::GenErr)),
            Err(panic) => {
                let detail = panic_message(&panic);
                (
                    SnmpValue::error_octet_string(detail),
                    Some(ErrorStatus::GenErr),
                )
            }
        }
    }

    /// `GenErr` is the only status a user callback can produce (error
    /// return or panic), so it is the only one gated by
    /// `user_error_marks_packet`; lookup/permission/read-only statuses
    /// always apply to the envelope.
    fn error_status_for(&self, suggested: Option<ErrorStatus>) -> Option<ErrorStatus> {
        match suggested {
            Some(ErrorStatus::GenErr) if !self.user_error_marks_packet => None,
            other => other,
        }
    }

    async fn serve_get_request(&self, request: &SnmpMessage) -> SnmpMessage {
        let mut response = request.response_shell();
        let oids = self.oids.read().await;
        for (index, binding) in request.variables.iter().enumerate() {
            let found = Self::search(&oids, &binding.oid);
            let Ok(position) = found else {
                response.variables.push(VarBind::new(
                    binding.oid.clone(),
                    SnmpValue::NoSuchInstance,
                ));
                response.set_first_error(ErrorStatus::NoSuchName, index as u32 + 1);
                continue;
            };
            let item = &oids[position];
            if Self::check_permission(item, request) == PermissionAllowance::Denied {
                response
                    .variables
                    .push(VarBind::new(binding.oid.clone(), SnmpValue::Null));
                response.set_first_error(ErrorStatus::NoAccess, index as u32 + 1);
                continue;
            }
            let (value, error) = Self::run_get(item);
            response.variables.push(VarBind::new(binding.oid.clone(), value));
            if let Some(status) = self.error_status_for(error) {
                response.set_first_error(status, index as u32 + 1);
            }
        }
        response
    }

    /// GetNext takes only the *last* bound variable as its query -- a
    /// GetNextRequest with several variable bindings still walks a
    /// single OID, repeated `max(max_repetitions, 1)` times.
    async fn serve_get_next_request(&self, request: &SnmpMessage) -> SnmpMessage {
        let mut response = request.response_shell();
        let oids = self.oids.read().await;
        let Some(binding) = request.variables.last() else {
            return response;
        };
        let max_repetitions = request.max_repetitions.max(1) as usize;
        let mut cursor = match Self::search(&oids, &binding.oid) {
            Ok(position) => position + 1,
            Err(insertion) => insertion,
        };
        for _ in 0..max_repetitions {
            let Some((index, item)) = Self::next_walkable(&oids, cursor) else {
                break;
            };
            cursor = index + 1;
            if Self::check_permission(item, request) == PermissionAllowance::Denied {
                response
                    .variables
                    .push(VarBind::new(item.oid.clone(), SnmpValue::Null));
                response.set_first_error(ErrorStatus::NoAccess, response.variables.len() as u32);
                continue;
            }
            let (value, error) = Self::run_get(item);
            response.variables.push(VarBind::new(item.oid.clone(), value));
            if let Some(status) = self.error_status_for(error) {
                response.set_first_error(status, response.variables.len() as u32);
            }
        }
        if response.variables.is_empty() {
            response
                .variables
                .push(VarBind::new(binding.oid.clone(), SnmpValue::EndOfMibView));
        }
        response
    }

    async fn serve_get_bulk_request(&self, request: &SnmpMessage) -> SnmpMessage {
        let mut response = request.response_shell();
        let variables = &request.variables;
        let non_repeaters = (request.non_repeaters as usize).min(variables.len());
        if request.non_repeaters as usize > variables.len() {
            warn!(
                requested = request.non_repeaters,
                available = variables.len(),
                "clamping GetBulk non-repeaters to the number of bound variables"
            );
        }
        let max_repetitions = request.max_repetitions.max(1) as usize;
        let oids = self.oids.read().await;

        for binding in &variables[..non_repeaters] {
            let one = self
                .serve_get_next_locked(&oids, request, std::slice::from_ref(binding))
                .await;
            response.variables.extend(one.variables);
            if !one.error_status.is_no_error() {
                response.set_first_error(one.error_status, response.variables.len() as u32);
            }
        }

        // Repeaters are indexed directly at `base + repetition`, not walked:
        // non-walkable/denied entries still occupy a slot and are reported
        // inline (ResourceUnavailable/NoAccess), exactly like a plain Get.
        let repeaters = &variables[non_repeaters..];
        let base_indices: Vec<usize> = repeaters
            .iter()
            .map(|b| match Self::search(&oids, &b.oid) {
                Ok(position) => position + 1,
                Err(insertion) => insertion,
            })
            .collect();
        let mut end_of_mib_view_seen: std::collections::HashSet<Oid> =
            std::collections::HashSet::new();

        for repetition in 0..max_repetitions {
            for (slot, binding) in repeaters.iter().enumerate() {
                let next_index = base_indices[slot] + repetition;
                let Some(item) = oids.get(next_index) else {
                    if end_of_mib_view_seen.insert(binding.oid.clone()) {
                        response
                            .variables
                            .push(VarBind::new(binding.oid.clone(), SnmpValue::EndOfMibView));
                    }
                    continue;
                };
                if Self::check_permission(item, request) == PermissionAllowance::Denied {
                    response
                        .variables
                        .push(VarBind::new(binding.oid.clone(), SnmpValue::Null));
                    response.set_first_error(ErrorStatus::NoAccess, response.variables.len() as u32);
                    continue;
                }
                let (value, error) = Self::run_get(item);
                response.variables.push(VarBind::new(item.oid.clone(), value));
                if let Some(status) = self.error_status_for(error) {
                    response.set_first_error(status, response.variables.len() as u32);
                }
            }
        }
        response
    }

    /// Finds the next walkable item at or after `from_index`, returning its
    /// absolute index alongside it. Permission is not a skip condition here
    /// -- a walkable, permission-denied entry is still returned (and
    /// consumes a repetition); the caller reports it as `Null`/`NoAccess`
    /// instead of silently walking past it to the next allowed OID.
    fn next_walkable<'a>(
        oids: &'a [PduControlItem],
        from_index: usize,
    ) -> Option<(usize, &'a PduControlItem)> {
        oids.get(from_index..)?.iter().enumerate().find_map(|(offset, item)| {
            if !item.non_walkable && item.on_get.is_some() {
                Some((from_index + offset, item))
            } else {
                None
            }
        })
    }

    /// Shared GetNext core used both by `serve_get_next_request` and the
    /// non-repeater half of GetBulk, operating against an already-locked
    /// OID table.
    async fn serve_get_next_locked(
        &self,
        oids: &[PduControlItem],
        request: &SnmpMessage,
        variables: &[VarBind],
    ) -> SnmpMessage {
        let mut response = request.response_shell();
        for binding in variables {
            let next_index = match Self::search(oids, &binding.oid) {
                Ok(position) => position + 1,
                Err(insertion) => insertion,
            };
            match Self::next_walkable(oids, next_index) {
                Some((_, item)) if Self::check_permission(item, request) == PermissionAllowance::Denied => {
                    response
                        .variables
                        .push(VarBind::new(item.oid.clone(), SnmpValue::Null));
                    response.set_first_error(ErrorStatus::NoAccess, response.variables.len() as u32);
                }
                Some((_, item)) => {
                    let (value, error) = Self::run_get(item);
                    response.variables.push(VarBind::new(item.oid.clone(), value));
                    if let Some(status) = self.error_status_for(error) {
                        response.set_first_error(status, response.variables.len() as u32);
                    }
                }
                None => response
                    .variables
                    .push(VarBind::new(binding.oid.clone(), SnmpValue::EndOfMibView)),
            }
        }
        response
    }

    async fn serve_set_request(&self, request: &SnmpMessage) -> SnmpMessage {
        let mut response = request.response_shell();
        let oids = self.oids.read().await;
        for (index, binding) in request.variables.iter().enumerate() {
            let Ok(position) = Self::search(&oids, &binding.oid) else {
                response.set_first_error(ErrorStatus::NoSuchName, index as u32 + 1);
                response
                    .variables
                    .push(VarBind::new(binding.oid.clone(), SnmpValue::NoSuchInstance));
                continue;
            };
            let item = &oids[position];
            if Self::check_permission(item, request) == PermissionAllowance::Denied {
                response.set_first_error(ErrorStatus::NoAccess, index as u32 + 1);
                response
                    .variables
                    .push(VarBind::new(binding.oid.clone(), SnmpValue::Null));
                continue;
            }
            if item.on_set.is_none() {
                response.set_first_error(ErrorStatus::ReadOnly, index as u32 + 1);
                response
                    .variables
                    .push(VarBind::new(binding.oid.clone(), SnmpValue::Null));
                continue;
            }
            if let Some(err) = Self::run_set(item, &binding.value) {
                warn!(oid = %item.oid, error = %err, "set callback failed");
                if let Some(status) = self.error_status_for(Some(ErrorStatus::GenErr)) {
                    response.set_first_error(status, index as u32 + 1);
                }
                response.variables.push(VarBind::new(
                    binding.oid.clone(),
                    SnmpValue::error_octet_string(&err),
                ));
                continue;
            }
            response.variables.push(binding.clone());
        }
        response
    }

    /// Traps and informs carry no meaningful response for `Trap`/`SnmpV2Trap`
    /// (fire-and-forget); `InformRequest` gets an acknowledgement envelope.
    async fn serve_trap(&self, request: &SnmpMessage) -> Option<SnmpMessage> {
        let is_inform = matches!(request.pdu_type, PduType::InformRequest);
        let oids = self.oids.read().await;
        let mut response = request.response_shell();
        for (index, binding) in request.variables.iter().enumerate() {
            let Ok(position) = Self::search(&oids, &binding.oid) else {
                continue;
            };
            let item = &oids[position];
            let (value, error) = Self::run_trap(item, is_inform, binding);
            if is_inform {
                response.variables.push(VarBind::new(binding.oid.clone(), value));
                if let Some(status) = error {
                    response.set_first_error(status, index as u32 + 1);
                }
            }
        }
        if is_inform {
            Some(response)
        } else {
            None
        }
    }

    /// Dispatches a request by PDU type. Returns `None` for fire-and-forget
    /// traps.
    pub async fn serve(&self, request: &SnmpMessage) -> Option<SnmpMessage> {
        match request.pdu_type {
            PduType::GetRequest => Some(self.serve_get_request(request).await),
            PduType::GetNextRequest => Some(self.serve_get_next_request(request).await),
            PduType::GetBulkRequest => Some(self.serve_get_bulk_request(request).await),
            PduType::SetRequest => Some(self.serve_set_request(request).await),
            PduType::Trap | PduType::SnmpV2Trap | PduType::InformRequest => {
                self.serve_trap(request).await
            }
            other => {
                warn!(?other, "sub-agent cannot serve this PDU type");
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "callback panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{EnabledVersions, SnmpVersion};
    use crate::security::MessageSecurityParameters;

    fn base_request(pdu_type: PduType, variables: Vec<VarBind>) -> SnmpMessage {
        SnmpMessage {
            version: SnmpVersion::V2c,
            community: "public".into(),
            pdu_type,
            request_id: 1,
            non_repeaters: 0,
            max_repetitions: 10,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            variables,
            security_parameters: MessageSecurityParameters::None,
        }
    }

    fn agent_with_counter() -> SubAgent {
        let item = PduControlItem::read_only(
            Oid::parse("1.3.6.1.2.1.1.3.0").unwrap(),
            Asn1Type::TimeTicks,
            "sysUpTime",
            || Ok(SnmpValue::TimeTicks(42)),
        );
        SubAgent::with_oids(vec!["public".into()], vec![item])
    }

    #[tokio::test]
    async fn get_known_oid_succeeds() {
        let agent = agent_with_counter();
        agent.sync_config().await.unwrap();
        let oid = Oid::parse("1.3.6.1.2.1.1.3.0").unwrap();
        let request = base_request(PduType::GetRequest, vec![VarBind::new(oid, SnmpValue::Null)]);
        let response = agent.serve(&request).await.unwrap();
        assert!(response.error_status.is_no_error());
        assert_eq!(response.variables[0].value, SnmpValue::TimeTicks(42));
    }

    #[tokio::test]
    async fn get_unknown_oid_reports_no_such_name() {
        let agent = agent_with_counter();
        agent.sync_config().await.unwrap();
        let oid = Oid::parse("1.3.6.1.2.1.1.99.0").unwrap();
        let request = base_request(PduType::GetRequest, vec![VarBind::new(oid, SnmpValue::Null)]);
        let response = agent.serve(&request).await.unwrap();
        assert_eq!(response.error_status, ErrorStatus::NoSuchName);
        assert_eq!(response.variables[0].value, SnmpValue::NoSuchInstance);
    }

    #[tokio::test]
    async fn get_next_past_end_returns_end_of_mib_view() {
        let agent = agent_with_counter();
        agent.sync_config().await.unwrap();
        let oid = Oid::parse("1.3.6.1.2.1.1.3.0").unwrap();
        let request = base_request(PduType::GetNextRequest, vec![VarBind::new(oid, SnmpValue::Null)]);
        let response = agent.serve(&request).await.unwrap();
        assert_eq!(response.variables[0].value, SnmpValue::EndOfMibView);
    }

    #[tokio::test]
    async fn set_on_read_only_object_is_rejected() {
        let agent = agent_with_counter();
        agent.sync_config().await.unwrap();
        let oid = Oid::parse("1.3.6.1.2.1.1.3.0").unwrap();
        let request = base_request(
            PduType::SetRequest,
            vec![VarBind::new(oid, SnmpValue::Integer(1))],
        );
        let response = agent.serve(&request).await.unwrap();
        assert_eq!(response.error_status, ErrorStatus::ReadOnly);
    }

    #[tokio::test]
    async fn set_on_writable_object_echoes_the_request_variable() {
        use std::sync::atomic::{AtomicI64, Ordering};
        let stored = Arc::new(AtomicI64::new(0));
        let for_get = stored.clone();
        let for_set = stored.clone();
        let item = PduControlItem::read_write(
            Oid::parse("1.3.6.1.4.1.99999.2.0").unwrap(),
            Asn1Type::Integer,
            "knob",
            move || Ok(SnmpValue::Integer(for_get.load(Ordering::SeqCst))),
            move |value| {
                if let SnmpValue::Integer(v) = value {
                    for_set.store(*v, Ordering::SeqCst);
                }
                Ok(())
            },
        );
        let agent = SubAgent::with_oids(vec!["public".into()], vec![item]);
        agent.sync_config().await.unwrap();
        let oid = Oid::parse("1.3.6.1.4.1.99999.2.0").unwrap();
        let request = base_request(
            PduType::SetRequest,
            vec![VarBind::new(oid, SnmpValue::Integer(7))],
        );
        let response = agent.serve(&request).await.unwrap();
        assert!(response.error_status.is_no_error());
        assert_eq!(response.variables[0].value, SnmpValue::Integer(7));
        assert_eq!(stored.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn set_on_unknown_oid_reports_no_such_name_with_instance_value() {
        let agent = agent_with_counter();
        agent.sync_config().await.unwrap();
        let oid = Oid::parse("1.3.6.1.2.1.1.99.0").unwrap();
        let request = base_request(
            PduType::SetRequest,
            vec![VarBind::new(oid, SnmpValue::Integer(1))],
        );
        let response = agent.serve(&request).await.unwrap();
        assert_eq!(response.error_status, ErrorStatus::NoSuchName);
        assert_eq!(response.variables[0].value, SnmpValue::NoSuchInstance);
    }

    fn agent_with_table(count: u32) -> SubAgent {
        let items = (0..count)
            .map(|i| {
                let oid = Oid::parse(format!("1.3.6.1.4.1.99999.3.{i}")).unwrap();
                PduControlItem::read_only(oid, Asn1Type::Integer, "entry", move || {
                    Ok(SnmpValue::Integer(i as i32))
                })
            })
            .collect();
        SubAgent::with_oids(vec!["public".into()], items)
    }

    #[tokio::test]
    async fn get_next_walks_multiple_values_per_max_repetitions() {
        let agent = agent_with_table(5);
        agent.sync_config().await.unwrap();
        let oid = Oid::parse("1.3.6.1.4.1.99999.3.0").unwrap();
        let mut request = base_request(PduType::GetNextRequest, vec![VarBind::new(oid, SnmpValue::Null)]);
        request.max_repetitions = 3;
        let response = agent.serve(&request).await.unwrap();
        assert_eq!(response.variables.len(), 3);
        assert_eq!(response.variables[0].value, SnmpValue::Integer(1));
        assert_eq!(response.variables[1].value, SnmpValue::Integer(2));
        assert_eq!(response.variables[2].value, SnmpValue::Integer(3));
    }

    #[tokio::test]
    async fn get_next_only_uses_the_last_bound_variable() {
        let agent = agent_with_table(3);
        agent.sync_config().await.unwrap();
        let earlier = Oid::parse("1.3.6.1.4.1.99999.3.0").unwrap();
        let query = Oid::parse("1.3.6.1.4.1.99999.3.1").unwrap();
        let request = base_request(
            PduType::GetNextRequest,
            vec![
                VarBind::new(earlier, SnmpValue::Null),
                VarBind::new(query, SnmpValue::Null),
            ],
        );
        let response = agent.serve(&request).await.unwrap();
        assert_eq!(response.variables.len(), 1);
        assert_eq!(response.variables[0].value, SnmpValue::Integer(2));
    }

    #[tokio::test]
    async fn get_bulk_repeaters_emit_end_of_mib_view_once_past_the_end() {
        let agent = agent_with_table(2);
        agent.sync_config().await.unwrap();
        let oid = Oid::parse("1.3.6.1.4.1.99999.3.0").unwrap();
        let mut request = base_request(
            PduType::GetBulkRequest,
            vec![VarBind::new(oid, SnmpValue::Null)],
        );
        request.non_repeaters = 0;
        request.max_repetitions = 3;
        let response = agent.serve(&request).await.unwrap();
        // position 1 exists (entry 0's successor); positions 2 and 3 are past
        // the end, so EndOfMibView is reported once, not once per iteration.
        assert_eq!(response.variables.len(), 2);
        assert_eq!(response.variables[0].value, SnmpValue::Integer(1));
        assert_eq!(response.variables[1].value, SnmpValue::EndOfMibView);
    }

    #[tokio::test]
    async fn get_bulk_repeaters_do_not_skip_non_walkable_entries() {
        let oid0 = Oid::parse("1.3.6.1.4.1.99999.3.0").unwrap();
        let oid1 = Oid::parse("1.3.6.1.4.1.99999.3.1").unwrap();
        let item0 = PduControlItem::read_only(oid0.clone(), Asn1Type::Integer, "e0", || {
            Ok(SnmpValue::Integer(0))
        });
        let item1 = PduControlItem::read_only(oid1, Asn1Type::Integer, "e1", || {
            Ok(SnmpValue::Integer(1))
        })
        .with_non_walkable(true);
        let agent = SubAgent::with_oids(vec!["public".into()], vec![item0, item1]);
        agent.sync_config().await.unwrap();
        let mut request = base_request(
            PduType::GetBulkRequest,
            vec![VarBind::new(oid0, SnmpValue::Null)],
        );
        request.non_repeaters = 0;
        request.max_repetitions = 1;
        let response = agent.serve(&request).await.unwrap();
        // Unlike plain GetNext, the repeaters phase indexes directly and
        // reports the non-walkable entry's own value instead of skipping it.
        assert_eq!(response.variables.len(), 1);
        assert_eq!(response.variables[0].value, SnmpValue::Integer(1));
    }

    #[tokio::test]
    async fn get_next_reports_a_denied_entry_instead_of_walking_past_it() {
        let oid0 = Oid::parse("1.3.6.1.4.1.99999.3.0").unwrap();
        let oid1 = Oid::parse("1.3.6.1.4.1.99999.3.1").unwrap();
        let item0 = PduControlItem::read_only(oid0.clone(), Asn1Type::Integer, "e0", || {
            Ok(SnmpValue::Integer(0))
        });
        let item1 = PduControlItem::read_only(oid1, Asn1Type::Integer, "e1", || {
            Ok(SnmpValue::Integer(1))
        })
        .with_check_permission(|_, _, _| PermissionAllowance::Denied);
        let agent = SubAgent::with_oids(vec!["public".into()], vec![item0, item1]);
        agent.sync_config().await.unwrap();
        let request = base_request(
            PduType::GetNextRequest,
            vec![VarBind::new(oid0, SnmpValue::Null)],
        );
        let response = agent.serve(&request).await.unwrap();
        // The denied entry is returned as Null/NoAccess, not skipped in
        // favor of whatever comes after it.
        assert_eq!(response.variables.len(), 1);
        assert_eq!(response.variables[0].value, SnmpValue::Null);
        assert_eq!(response.error_status, ErrorStatus::NoAccess);
    }

    #[tokio::test]
    async fn get_bulk_repeaters_emit_end_of_mib_view_once_per_query_oid_not_per_slot() {
        let agent = agent_with_table(1);
        agent.sync_config().await.unwrap();
        let oid = Oid::parse("1.3.6.1.4.1.99999.3.0").unwrap();
        let request = base_request(
            PduType::GetBulkRequest,
            vec![
                VarBind::new(oid.clone(), SnmpValue::Null),
                VarBind::new(oid, SnmpValue::Null),
            ],
        );
        let response = agent.serve(&request).await.unwrap();
        // Both repeater slots name the same query OID and both run past the
        // end of the table; EndOfMibView is reported once per distinct
        // query OID, not once per slot.
        assert_eq!(
            response
                .variables
                .iter()
                .filter(|v| v.value == SnmpValue::EndOfMibView)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn callback_panic_is_contained() {
        let item = PduControlItem::read_only(
            Oid::parse("1.3.6.1.4.1.99999.1.0").unwrap(),
            Asn1Type::OctetString,
            "panics",
            || panic!("boom"),
        );
        let mut agent = SubAgent::with_oids(vec!["public".into()], vec![item]);
        agent.user_error_marks_packet = true;
        agent.sync_config().await.unwrap();
        let oid = Oid::parse("1.3.6.1.4.1.99999.1.0").unwrap();
        let request = base_request(PduType::GetRequest, vec![VarBind::new(oid, SnmpValue::Null)]);
        let response = agent.serve(&request).await.unwrap();
        assert_eq!(response.error_status, ErrorStatus::GenErr);
        match &response.variables[0].value {
            SnmpValue::OctetString(bytes) => {
                assert!(String::from_utf8_lossy(bytes).starts_with("ERROR:"))
            }
            other => panic!("expected OctetString, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_oid_rejected_on_sync() {
        let oid = Oid::parse("1.3.6.1.2.1.1.3.0").unwrap();
        let item = |oid: Oid| {
            PduControlItem::read_only(oid, Asn1Type::TimeTicks, "dup", || Ok(SnmpValue::TimeTicks(0)))
        };
        let agent = SubAgent::with_oids(
            vec!["public".into()],
            vec![item(oid.clone()), item(oid)],
        );
        assert!(agent.sync_config().await.is_err());
    }

    #[test]
    fn enabled_versions_default_is_all() {
        assert_eq!(EnabledVersions::default(), EnabledVersions::all());
    }
}
