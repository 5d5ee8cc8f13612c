//! Component E: the process-wide policy facade.
//!
//! `AccessRegistry` is the thin object every host-facing operation hangs
//! off of. Internally it is one `Inner` behind a single reentrant lock, per
//! the concurrency model's "all mutators serialize under a single
//! reentrant exclusive lock" rule — reentrant because a client callback
//! invoked while the lock is held is allowed to call back into the
//! registry (other than `remove_client`).

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use ascore_shared::{AccessRight, TrapMask};
use parking_lot::ReentrantMutex;

use crate::{
    arena::{Arena, Handle},
    calc::{CalcEngine, SimpleCalc},
    error::Error,
    evaluator,
    grammar::{classic, structured, ParsedAsg, ParsedFile, SyntaxError},
    host_match::{HostResolver, SystemResolver},
    identity::ClientIdentity,
    metrics::AscoreMetrics,
    model::{AsgId, PolicyModel, DEFAULT_ASG_NAME},
    notify::{ChangeOfAccessRights, ClientCallback},
    trap::{TrapObserver, WriteEvent, WriteToken},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemberHandle(Handle);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientHandle(Handle);

/// The two runtime knobs of spec.md §6: whether the subsystem performs any
/// checking at all, and which host-matching mode HAG clauses use.
#[derive(Clone, Copy, Debug)]
pub struct RegistryConfig {
    pub active: bool,
    pub check_client_ip: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            active: true,
            check_client_ip: false,
        }
    }
}

struct MemberState {
    asg_name: String,
    asg: AsgId,
    clients: Vec<ClientHandle>,
}

struct ClientState {
    member: MemberHandle,
    identity: ClientIdentity,
    callback: Option<ClientCallback>,
    effective: AccessRight,
    trap_mask: TrapMask,
}

struct Inner {
    config: RegistryConfig,
    model: PolicyModel,
    calc_engine: Box<dyn CalcEngine>,
    resolver: Box<dyn HostResolver>,
    members: Arena<MemberState>,
    clients: Arena<ClientState>,
    trap_observers: Vec<Box<dyn TrapObserver>>,
    next_sequence: u64,
    /// The client currently inside its own callback, so `remove_client`
    /// can refuse the use-after-free the source contract warns about.
    notifying: Option<ClientHandle>,
    metrics: Option<Arc<AscoreMetrics>>,
}

/// The single process-wide instance, lazily constructed on first use.
pub struct AccessRegistry {
    inner: ReentrantMutex<RefCell<Inner>>,
}

fn minimal_policy() -> PolicyModel {
    let file = ParsedFile {
        asgs: vec![ParsedAsg {
            name: DEFAULT_ASG_NAME.to_owned(),
            ..Default::default()
        }],
        ..Default::default()
    };
    PolicyModel::from_parsed(file, &SimpleCalc, &SystemResolver)
        .expect("a single empty DEFAULT ASG always links")
}

fn syntax_error_to_bad_config(err: SyntaxError) -> Error {
    Error::BadConfig {
        location: format!("{}:{}", err.line, err.column),
        message: err.message,
    }
}

impl Default for AccessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessRegistry {
    /// Builds an isolated registry with the default calculator and host
    /// resolver, holding the minimal single-`DEFAULT`-ASG policy until
    /// `initialize` is called. Tests use this directly instead of the
    /// shared singleton so they don't interfere with each other.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(Inner {
                config,
                model: minimal_policy(),
                calc_engine: Box::new(SimpleCalc),
                resolver: Box::new(SystemResolver),
                members: Arena::new(),
                clients: Arena::new(),
                trap_observers: Vec::new(),
                next_sequence: 0,
                notifying: None,
                metrics: None,
            })),
        }
    }

    /// The classic single-process-wide instance, matching the source
    /// library's one-global-table architecture for callers that want it.
    pub fn global() -> &'static AccessRegistry {
        static REGISTRY: OnceLock<AccessRegistry> = OnceLock::new();
        REGISTRY.get_or_init(AccessRegistry::new)
    }

    pub fn set_calc_engine(&self, engine: Box<dyn CalcEngine>) {
        self.inner.lock().borrow_mut().calc_engine = engine;
    }

    pub fn set_host_resolver(&self, resolver: Box<dyn HostResolver>) {
        self.inner.lock().borrow_mut().resolver = resolver;
    }

    pub fn set_active(&self, active: bool) {
        self.inner.lock().borrow_mut().config.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().borrow().config.active
    }

    pub fn set_check_client_ip(&self, check_client_ip: bool) {
        self.inner.lock().borrow_mut().config.check_client_ip = check_client_ip;
    }

    pub fn register_trap_observer(&self, observer: Box<dyn TrapObserver>) {
        self.inner.lock().borrow_mut().trap_observers.push(observer);
    }

    pub fn set_metrics(&self, metrics: Arc<AscoreMetrics>) {
        self.inner.lock().borrow_mut().metrics = Some(metrics);
    }

    #[tracing::instrument(skip(self, source, dict))]
    pub fn initialize(&self, source: &str, dict: &HashMap<String, String>) -> Result<(), Error> {
        let parsed = classic::parse(source, dict).map_err(syntax_error_to_bad_config)?;
        self.initialize_parsed(parsed)
    }

    #[tracing::instrument(skip(self, source, dict))]
    pub fn initialize_structured(&self, source: &str, dict: &HashMap<String, String>) -> Result<(), Error> {
        let parsed = structured::parse(source, dict).map_err(syntax_error_to_bad_config)?;
        self.initialize_parsed(parsed)
    }

    fn initialize_parsed(&self, parsed: ParsedFile) -> Result<(), Error> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();

        if !inner.clients.is_empty() {
            return Err(Error::ClientsExist);
        }

        let model = PolicyModel::from_parsed(parsed, inner.calc_engine.as_ref(), inner.resolver.as_ref())?;

        // Members bound only by ASG name are re-linked; an unknown name
        // falls back to DEFAULT rather than orphaning the member.
        let default_asg = model
            .find_asg(DEFAULT_ASG_NAME)
            .expect("from_parsed always synthesizes DEFAULT");
        let relinked: Vec<(Handle, AsgId)> = inner
            .members
            .iter()
            .map(|(handle, member)| {
                let asg = model.find_asg(&member.asg_name).unwrap_or(default_asg);
                (handle, asg)
            })
            .collect();

        inner.model = model;
        for (handle, asg) in relinked {
            if let Some(member) = inner.members.get_mut(handle) {
                member.asg = asg;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn add_member(&self, asg_name: &str) -> Result<MemberHandle, Error> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if !inner.config.active {
            return Err(Error::NotActive);
        }
        let asg = inner.model.find_asg(asg_name).unwrap_or_else(|| {
            inner
                .model
                .find_asg(DEFAULT_ASG_NAME)
                .expect("from_parsed always synthesizes DEFAULT")
        });
        let handle = inner.members.insert(MemberState {
            asg_name: asg_name.to_owned(),
            asg,
            clients: Vec::new(),
        });
        Ok(MemberHandle(handle))
    }

    #[tracing::instrument(skip(self))]
    pub fn change_group(&self, member: MemberHandle, new_asg_name: &str) -> Result<(), Error> {
        let clients = {
            let guard = self.inner.lock();
            let mut inner = guard.borrow_mut();
            if !inner.config.active {
                return Err(Error::NotActive);
            }
            let asg = inner.model.find_asg(new_asg_name).unwrap_or_else(|| {
                inner
                    .model
                    .find_asg(DEFAULT_ASG_NAME)
                    .expect("from_parsed always synthesizes DEFAULT")
            });
            let state = inner.members.get_mut(member.0).ok_or(Error::BadMember)?;
            state.asg_name = new_asg_name.to_owned();
            state.asg = asg;
            state.clients.clone()
        };
        for client in clients {
            self.notify_client(client);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_member(&self, member: MemberHandle) -> Result<(), Error> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let state = inner.members.get(member.0).ok_or(Error::BadMember)?;
        if !state.clients.is_empty() {
            return Err(Error::ClientsExist);
        }
        inner.members.remove(member.0);
        Ok(())
    }

    #[tracing::instrument(skip(self, identity))]
    pub fn add_client(&self, member: MemberHandle, identity: ClientIdentity) -> Result<ClientHandle, Error> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if !inner.config.active {
            return Err(Error::NotActive);
        }
        let asg = inner.members.get(member.0).ok_or(Error::BadMember)?.asg;
        let check_client_ip = inner.config.check_client_ip;
        let (effective, trap_mask) = evaluator::evaluate_client(&inner.model, asg, &identity, check_client_ip);

        let handle = inner.clients.insert(ClientState {
            member,
            identity,
            callback: None,
            effective,
            trap_mask,
        });
        let client = ClientHandle(handle);
        inner
            .members
            .get_mut(member.0)
            .expect("just looked up above")
            .clients
            .push(client);
        Ok(client)
    }

    #[tracing::instrument(skip(self, identity))]
    pub fn change_client(&self, client: ClientHandle, identity: ClientIdentity) -> Result<(), Error> {
        {
            let guard = self.inner.lock();
            let mut inner = guard.borrow_mut();
            if !inner.config.active {
                return Err(Error::NotActive);
            }
            inner.clients.get_mut(client.0).ok_or(Error::BadClient)?.identity = identity;
        }
        self.notify_client(client);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_client(&self, client: ClientHandle) -> Result<(), Error> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if inner.notifying == Some(client) {
            return Err(Error::BadClient);
        }
        let state = inner.clients.remove(client.0).ok_or(Error::BadClient)?;
        if let Some(member) = inner.members.get_mut(state.member.0) {
            member.clients.retain(|c| *c != client);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, callback))]
    pub fn register_client_callback(&self, client: ClientHandle, callback: Option<ClientCallback>) -> Result<(), Error> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.clients.get_mut(client.0).ok_or(Error::BadClient)?.callback = callback;
        Ok(())
    }

    /// Binds a value to the named input of the named ASG, recomputing that
    /// ASG's rules and every attached client once. The last call to arrive
    /// before a recompute is the one that wins, per the ordering guarantee.
    #[tracing::instrument(skip(self))]
    pub fn deliver_input(&self, asg_name: &str, symbolic_name: &str, value: f64, valid: bool) -> Result<(), Error> {
        let clients = {
            let guard = self.inner.lock();
            let mut inner = guard.borrow_mut();
            let asg_id = inner.model.find_asg(asg_name).ok_or(Error::BadAsg)?;

            let index = inner
                .model
                .asg(asg_id)
                .inputs
                .iter()
                .find(|link| link.symbolic_name == symbolic_name)
                .map(|link| link.index)
                .ok_or(Error::BadAsg)?;

            {
                let group = inner.model.asg_mut(asg_id);
                group.input_values[index] = value;
                if valid {
                    group.input_bad.clear(index);
                } else {
                    group.input_bad.set(index);
                }
            }

            let start = Instant::now();
            evaluator::recompute_asg_rules(&mut inner.model, asg_id);
            if let Some(metrics) = &inner.metrics {
                metrics
                    .asg_recompute_execution_time
                    .record(start.elapsed().as_secs_f64(), &[]);
            }

            let members: Vec<Handle> = inner
                .members
                .iter()
                .filter(|(_, member)| member.asg == asg_id)
                .map(|(handle, _)| handle)
                .collect();
            members
                .into_iter()
                .flat_map(|handle| {
                    inner
                        .members
                        .get(handle)
                        .map(|m| m.clients.clone())
                        .unwrap_or_default()
                })
                .collect::<Vec<ClientHandle>>()
        };

        for client in clients {
            self.notify_client(client);
        }

        Ok(())
    }

    pub fn check_get(&self, client: ClientHandle) -> bool {
        self.check(client, AccessRight::Read)
    }

    pub fn check_put(&self, client: ClientHandle) -> bool {
        self.check(client, AccessRight::Write)
    }

    pub fn check_rpc(&self, client: ClientHandle) -> bool {
        self.check(client, AccessRight::Rpc)
    }

    fn check(&self, client: ClientHandle, requested: AccessRight) -> bool {
        let start = Instant::now();
        let guard = self.inner.lock();
        let inner = guard.borrow();
        if !inner.config.active {
            return true;
        }
        let result = inner
            .clients
            .get(client.0)
            .map(|state| state.effective.satisfies(requested))
            .unwrap_or(false);
        if let Some(metrics) = &inner.metrics {
            metrics.check_execution_time.record(start.elapsed().as_secs_f64(), &[]);
        }
        result
    }

    #[tracing::instrument(skip(self, resource, type_tag, data))]
    #[allow(clippy::too_many_arguments)]
    pub fn trap_write_before(
        &self,
        client: ClientHandle,
        resource: impl Into<String>,
        type_tag: impl Into<String>,
        element_count: usize,
        data: Vec<u8>,
    ) -> Option<WriteToken> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if !inner.config.active {
            return None;
        }
        let state = inner.clients.get(client.0)?;
        if !state.trap_mask.contains(TrapMask::TRAP_WRITE) {
            return None;
        }
        let identity = state.identity.clone();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        let event = WriteEvent {
            sequence,
            user: identity.user,
            method: identity.method,
            authority: identity.authority,
            host: identity.host,
            is_tls: identity.is_tls,
            resource: resource.into(),
            type_tag: type_tag.into(),
            element_count,
            data,
        };
        for observer in &mut inner.trap_observers {
            observer.before_write(&event);
        }
        Some(WriteToken { sequence })
    }

    #[tracing::instrument(skip(self))]
    pub fn trap_write_after(&self, token: WriteToken) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        for observer in &mut inner.trap_observers {
            observer.after_write(token);
        }
    }

    pub fn with_model<R>(&self, f: impl FnOnce(&PolicyModel) -> R) -> R {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        f(&inner.model)
    }

    /// Recomputes one client's effective access and, if it changed, invokes
    /// its callback. The `RefCell` borrow used to compute the new state is
    /// dropped *before* the callback runs: the callback is allowed to call
    /// back into the registry (other than `remove_client`), and the policy
    /// lock only protects against concurrent access from other threads —
    /// `RefCell` itself has no notion of a reentrant borrow, so holding one
    /// across the callback would panic on the very reentrant call this
    /// contract is supposed to allow.
    fn notify_client(&self, client: ClientHandle) {
        let pending = {
            let guard = self.inner.lock();
            let mut inner = guard.borrow_mut();

            let member = match inner.clients.get(client.0) {
                Some(state) => state.member,
                None => return,
            };
            let asg = match inner.members.get(member.0) {
                Some(member) => member.asg,
                None => return,
            };
            let check_client_ip = inner.config.check_client_ip;

            let (effective, trap_mask) = {
                let state = inner.clients.get(client.0).expect("checked above");
                evaluator::evaluate_client(&inner.model, asg, &state.identity, check_client_ip)
            };

            let state = inner.clients.get_mut(client.0).expect("checked above");
            let changed = effective != state.effective || trap_mask != state.trap_mask;
            state.effective = effective;
            state.trap_mask = trap_mask;

            if !changed {
                None
            } else {
                state.callback.take().map(|callback| (callback, effective, trap_mask))
            }
        };

        let Some((mut callback, access, trap_mask)) = pending else {
            return;
        };

        {
            let guard = self.inner.lock();
            guard.borrow_mut().notifying = Some(client);
        }

        callback(client, ChangeOfAccessRights { access, trap_mask });

        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.notifying = None;
        if let Some(state) = inner.clients.get_mut(client.0) {
            state.callback = Some(callback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider;

    fn policy(source: &str) -> AccessRegistry {
        let registry = AccessRegistry::new();
        registry.initialize(source, &HashMap::new()).unwrap();
        registry
    }

    #[test]
    fn default_access_is_none_with_no_matching_rule() {
        let registry = policy(
            "UAG(restricted){bob} ASG(DEFAULT){RULE(0,NONE)} \
             ASG(ro){RULE(0,NONE) RULE(1,READ){UAG(restricted)}}",
        );
        let member = registry.add_member("ro").unwrap();
        let client = registry.add_client(member, ClientIdentity::legacy("alice", "localhost", 0)).unwrap();
        assert!(!registry.check_get(client));
    }

    #[test]
    fn bare_rule_level_does_not_gate_access() {
        // aslibtest.c's testHostNames holds the client at access_level 0
        // throughout and still sees RULE(1,READ) grant access, so a bare
        // (clauseless) higher-level rule must fire for a low-level client
        // too.
        let registry = policy("ASG(ro){RULE(0,NONE) RULE(1,READ)}");
        let member = registry.add_member("ro").unwrap();
        let client = registry.add_client(member, ClientIdentity::legacy("alice", "localhost", 0)).unwrap();
        assert!(registry.check_get(client));
        assert!(!registry.check_put(client));
    }

    #[test]
    fn inactive_subsystem_allows_everything() {
        let registry = policy("ASG(ro){RULE(0,NONE)}");
        let member = registry.add_member("ro").unwrap();
        let client = registry.add_client(member, ClientIdentity::legacy("alice", "localhost", 0)).unwrap();
        registry.set_active(false);
        assert!(registry.check_get(client));
        assert!(registry.check_put(client));
        assert!(registry.check_rpc(client));
    }

    #[test]
    fn initialize_with_live_clients_fails() {
        let registry = policy("ASG(ro){RULE(0,NONE)}");
        let member = registry.add_member("ro").unwrap();
        let _client = registry.add_client(member, ClientIdentity::legacy("alice", "localhost", 0)).unwrap();
        let err = registry.initialize("ASG(ro){RULE(0,NONE)}", &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::ClientsExist));
    }

    #[test]
    fn unknown_asg_name_falls_back_to_default() {
        let registry = policy("ASG(DEFAULT){RULE(0,NONE)}");
        let member = registry.add_member("ghost").unwrap();
        let client = registry.add_client(member, ClientIdentity::legacy("alice", "localhost", 0)).unwrap();
        assert!(!registry.check_get(client));
    }

    #[test]
    fn callback_fires_exactly_once_per_access_change() {
        let registry = policy("ASG(ro){RULE(0,NONE) RULE(1,READ)}");
        let member = registry.add_member("ro").unwrap();
        let client = registry.add_client(member, ClientIdentity::legacy("alice", "localhost", 0)).unwrap();
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = count.clone();
        registry
            .register_client_callback(
                client,
                Some(Box::new(move |_client, _coar| {
                    counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                })),
            )
            .unwrap();
        registry.change_client(client, ClientIdentity::legacy("alice", "localhost", 1)).unwrap();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
        // No further change in effective access: no additional callback.
        registry.change_client(client, ClientIdentity::legacy("alice", "localhost", 2)).unwrap();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_client_during_its_own_callback_is_rejected() {
        let registry = std::sync::Arc::new(policy("ASG(ro){RULE(0,NONE) RULE(1,READ)}"));
        let member = registry.add_member("ro").unwrap();
        let client = registry.add_client(member, ClientIdentity::legacy("alice", "localhost", 0)).unwrap();
        let registry_in_callback = registry.clone();
        registry
            .register_client_callback(
                client,
                Some(Box::new(move |c, _coar| {
                    let err = registry_in_callback.remove_client(c).unwrap_err();
                    assert!(matches!(err, Error::BadClient));
                })),
            )
            .unwrap();
        registry.change_client(client, ClientIdentity::legacy("alice", "localhost", 1)).unwrap();
    }

    #[test]
    fn metrics_are_recorded_for_check_and_recompute_without_disturbing_the_result() {
        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder().build();
        let meter = provider.meter("ascore-test");
        let registry = policy(r#"ASG(foo){INPA("signal1") RULE(0,WRITE){CALC("A")}}"#);
        registry.set_metrics(Arc::new(AscoreMetrics::new(&meter)));

        let member = registry.add_member("foo").unwrap();
        let client = registry.add_client(member, ClientIdentity::legacy("alice", "localhost", 0)).unwrap();
        assert!(!registry.check_put(client));

        registry.deliver_input("foo", "signal1", 1.0, true).unwrap();
        assert!(registry.check_put(client));
    }
}
