//! Handler registry for dispatching requests by `(service, procedure)`.
//!
//! [`MapRegistry`] keeps its table behind an `Arc` that writers replace
//! wholesale. Lookups clone the `Arc` and never wait on a registration in
//! progress.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::Serialize;

use super::{Handler, Service};
use crate::error::{Result, RpcError};
use crate::options::{RegisterConfig, RegisterOption};
use crate::protocol::RequestMeta;
use crate::transport::Context;

/// A registered procedure.
#[derive(Clone)]
pub struct HandlerSpec {
    pub procedure: String,
    /// Accepted request encoding. `None` accepts any.
    pub encoding: Option<String>,
    pub config: RegisterConfig,
    pub handler: Arc<dyn Handler>,
}

impl HandlerSpec {
    pub fn new(procedure: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            procedure: procedure.into(),
            encoding: None,
            config: RegisterConfig::default(),
            handler: Arc::new(handler),
        }
    }

    /// Only accept requests declaring `encoding`.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_options(mut self, options: &[&dyn RegisterOption]) -> Self {
        self.config = RegisterConfig::from_options(options);
        self
    }

    fn accepts(&self, encoding: &str) -> bool {
        self.encoding.as_deref().map_or(true, |e| e == encoding)
    }
}

impl fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSpec")
            .field("procedure", &self.procedure)
            .field("encoding", &self.encoding)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A `(service, procedure)` pair known to a registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ServiceProcedure {
    pub service: String,
    pub procedure: String,
}

/// Looks up the handler for an incoming request.
///
/// Called concurrently from every connection an inbound serves.
pub trait Registry: Send + Sync + 'static {
    /// Every registered pair, sorted.
    fn service_procedures(&self) -> Vec<ServiceProcedure>;

    /// Pick the handler for a request.
    ///
    /// Fails with [`RpcError::RouteNotFound`] when nothing is registered
    /// under `(meta.service, meta.procedure)` and with
    /// [`RpcError::UnsupportedEncoding`] when the match does not accept
    /// `meta.encoding`.
    fn choose(&self, ctx: &Context, meta: &RequestMeta) -> Result<HandlerSpec>;
}

type Table = HashMap<(String, String), HandlerSpec>;

/// Copy-on-write map registry.
#[derive(Default)]
pub struct MapRegistry {
    table: RwLock<Arc<Table>>,
    // Serializes writers so concurrent registrations do not lose updates.
    writer: Mutex<()>,
}

impl MapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` with default options, replacing any previous
    /// registration of the pair.
    pub fn register(&self, service: &str, procedure: &str, handler: impl Handler) {
        self.register_spec(service, HandlerSpec::new(procedure, handler));
    }

    pub fn register_with(
        &self,
        service: &str,
        procedure: &str,
        handler: impl Handler,
        options: &[&dyn RegisterOption],
    ) {
        self.register_spec(
            service,
            HandlerSpec::new(procedure, handler).with_options(options),
        );
    }

    pub fn register_spec(&self, service: &str, spec: HandlerSpec) {
        self.update(|table| {
            tracing::debug!(service, procedure = %spec.procedure, "registering procedure");
            table.insert((service.to_string(), spec.procedure.clone()), spec);
        });
    }

    /// Register every procedure of `service`. `options` apply to each.
    pub fn register_service(&self, service: Service, options: &[&dyn RegisterOption]) {
        let config = RegisterConfig::from_options(options);
        let (name, specs) = service.into_parts();
        self.update(|table| {
            for mut spec in specs {
                tracing::debug!(service = %name, procedure = %spec.procedure, "registering procedure");
                spec.config = config.clone();
                table.insert((name.clone(), spec.procedure.clone()), spec);
            }
        });
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// JSON array of `{"service", "procedure"}` objects.
    pub fn procedures_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.service_procedures())?)
    }

    fn snapshot(&self) -> Arc<Table> {
        let guard = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn update(&self, f: impl FnOnce(&mut Table)) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = Table::clone(&self.snapshot());
        f(&mut next);
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }
}

impl Registry for MapRegistry {
    fn service_procedures(&self) -> Vec<ServiceProcedure> {
        let mut pairs: Vec<_> = self
            .snapshot()
            .keys()
            .map(|(service, procedure)| ServiceProcedure {
                service: service.clone(),
                procedure: procedure.clone(),
            })
            .collect();
        pairs.sort();
        pairs
    }

    fn choose(&self, _ctx: &Context, meta: &RequestMeta) -> Result<HandlerSpec> {
        let table = self.snapshot();
        let spec = table
            .get(&(meta.service.clone(), meta.procedure.clone()))
            .ok_or_else(|| RpcError::RouteNotFound {
                service: meta.service.clone(),
                procedure: meta.procedure.clone(),
            })?;

        if !spec.accepts(&meta.encoding) {
            return Err(RpcError::UnsupportedEncoding {
                service: meta.service.clone(),
                procedure: meta.procedure.clone(),
                encoding: meta.encoding.clone(),
            });
        }

        Ok(spec.clone())
    }
}

impl fmt::Debug for MapRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapRegistry")
            .field("procedures", &self.service_procedures())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::handler::handler_fn;
    use crate::options::DisableEnveloping;
    use crate::transport::{Request, Response};

    fn echo() -> impl Handler {
        handler_fn(|_ctx, req: Request| async move { Ok(Response::new(req.body)) })
    }

    fn tagged(tag: &'static str) -> impl Handler {
        handler_fn(move |_ctx, _req: Request| async move { Ok(Response::new(tag)) })
    }

    fn meta(service: &str, procedure: &str, encoding: &str) -> RequestMeta {
        RequestMeta {
            service: service.to_string(),
            procedure: procedure.to_string(),
            encoding: encoding.to_string(),
            ..RequestMeta::default()
        }
    }

    #[test]
    fn test_choose_registered() {
        let registry = MapRegistry::new();
        registry.register("bar", "hello", echo());

        let spec = registry
            .choose(&Context::background(), &meta("bar", "hello", "raw"))
            .unwrap();
        assert_eq!(spec.procedure, "hello");
        assert!(!spec.config.disable_enveloping);
    }

    #[test]
    fn test_choose_missing_is_route_not_found() {
        let registry = MapRegistry::new();
        registry.register("bar", "hello", echo());

        let err = registry
            .choose(&Context::background(), &meta("bar", "goodbye", "raw"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Routing);

        let err = registry
            .choose(&Context::background(), &meta("baz", "hello", "raw"))
            .unwrap_err();
        assert!(matches!(err, RpcError::RouteNotFound { .. }));
    }

    #[test]
    fn test_encoding_mismatch_is_distinct() {
        let registry = MapRegistry::new();
        registry.register_spec("bar", HandlerSpec::new("hello", echo()).with_encoding("thrift"));

        assert!(registry
            .choose(&Context::background(), &meta("bar", "hello", "thrift"))
            .is_ok());

        let err = registry
            .choose(&Context::background(), &meta("bar", "hello", "json"))
            .unwrap_err();
        assert!(matches!(err, RpcError::UnsupportedEncoding { .. }));
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_same_procedure_in_two_services() {
        let registry = MapRegistry::new();
        registry.register("bar", "hello", tagged("bar"));
        registry.register("baz", "hello", tagged("baz"));

        for service in ["bar", "baz"] {
            let spec = registry
                .choose(&Context::background(), &meta(service, "hello", "raw"))
                .unwrap();
            let res = spec
                .handler
                .handle(Context::background(), Request::new("foo", service, "hello"))
                .await
                .unwrap();
            assert_eq!(&res.body[..], service.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_register_replaces() {
        let registry = MapRegistry::new();
        registry.register("bar", "hello", tagged("old"));
        registry.register("bar", "hello", tagged("new"));
        assert_eq!(registry.len(), 1);

        let spec = registry
            .choose(&Context::background(), &meta("bar", "hello", "raw"))
            .unwrap();
        let res = spec
            .handler
            .handle(Context::background(), Request::new("foo", "bar", "hello"))
            .await
            .unwrap();
        assert_eq!(&res.body[..], b"new");
    }

    #[test]
    fn test_register_with_options() {
        let registry = MapRegistry::new();
        registry.register_with("bar", "hello", echo(), &[&DisableEnveloping]);

        let spec = registry
            .choose(&Context::background(), &meta("bar", "hello", "raw"))
            .unwrap();
        assert!(spec.config.disable_enveloping);
    }

    #[test]
    fn test_register_service_applies_options_to_all() {
        let registry = MapRegistry::new();
        let service = Service::new("bar")
            .procedure("hello", echo())
            .procedure("goodbye", echo());
        registry.register_service(service, &[&DisableEnveloping]);

        for procedure in ["hello", "goodbye"] {
            let spec = registry
                .choose(&Context::background(), &meta("bar", procedure, "raw"))
                .unwrap();
            assert!(spec.config.disable_enveloping);
        }
    }

    #[test]
    fn test_introspection() {
        let registry = MapRegistry::new();
        assert!(registry.is_empty());
        registry.register("baz", "hello", echo());
        registry.register("bar", "hello", echo());

        let pairs = registry.service_procedures();
        assert_eq!(pairs[0].service, "bar");
        assert_eq!(pairs[1].service, "baz");

        assert_eq!(
            registry.procedures_json().unwrap(),
            r#"[{"service":"bar","procedure":"hello"},{"service":"baz","procedure":"hello"}]"#
        );
    }

    #[test]
    fn test_snapshot_survives_registration() {
        let registry = MapRegistry::new();
        registry.register("bar", "hello", echo());
        let before = registry.snapshot();

        registry.register("bar", "goodbye", echo());

        assert_eq!(before.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_lookups_and_registrations() {
        let registry = Arc::new(MapRegistry::new());
        registry.register("bar", "hello", echo());

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        registry.register("bar", &format!("p{i}-{j}"), echo());
                        registry
                            .choose(&Context::background(), &meta("bar", "hello", "raw"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(registry.len(), 1 + 8 * 50);
    }
}
