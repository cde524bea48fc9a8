use super::{Handler, HandlerSpec};

/// Procedures registered together under one service name.
///
/// ```
/// use rpcwire::handler::{handler_fn, MapRegistry, Service};
/// use rpcwire::options::DisableEnveloping;
/// use rpcwire::transport::Response;
///
/// let service = Service::new("bar")
///     .procedure("hello", handler_fn(|_ctx, _req| async { Ok(Response::empty()) }));
///
/// let registry = MapRegistry::new();
/// registry.register_service(service, &[&DisableEnveloping]);
/// ```
#[derive(Debug)]
pub struct Service {
    name: String,
    procedures: Vec<HandlerSpec>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            procedures: Vec::new(),
        }
    }

    pub fn procedure(self, procedure: impl Into<String>, handler: impl Handler) -> Self {
        self.spec(HandlerSpec::new(procedure, handler))
    }

    /// Add a procedure with a restricted encoding. Its config is replaced
    /// at registration.
    pub fn spec(mut self, spec: HandlerSpec) -> Self {
        self.procedures.push(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (String, Vec<HandlerSpec>) {
        (self.name, self.procedures)
    }
}
