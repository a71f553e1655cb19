//! Transactional service channel.
//!
//! Services are plain async traits. Each registered service has an
//! implementation and a proxy; the proxy forwards every method through a
//! [`ServiceChannel`], which applies transaction propagation, runs
//! interceptors and restores the caller's contexts afterwards.
//!
//! ```ignore
//! #[async_trait]
//! pub trait Greeter: Send + Sync {
//!     async fn greet(&self, name: String) -> Result<String, ServiceError>;
//! }
//!
//! struct GreeterProxy(ServiceChannel);
//!
//! #[async_trait]
//! impl Greeter for GreeterProxy {
//!     async fn greet(&self, name: String) -> Result<String, ServiceError> {
//!         self.0
//!             .call_required(Command::new("greet", move |s: Arc<dyn Greeter>| async move {
//!                 s.greet(name).await
//!             }))
//!             .await
//!     }
//! }
//! ```

pub mod command;
pub mod component;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod injection;
pub mod interceptor;
pub mod platform;
pub mod registry;

pub use command::{Command, Origin};
pub use component::{ComponentDescriptor, Layer};
pub use dispatcher::{ServiceChannel, ServiceChannelBuilder};
pub use error::{BusinessError, RegistryError, ServiceError, SystemError};
pub use health::{CheckLevel, HealthCheckResult, HealthStatus};
pub use injection::{
    Dependency, DependencyInjector, DependencyKind, Injectable, Injected, ResolvedDependencies,
};
pub use interceptor::{
    CallOutcome, InterceptorChain, LoggingInterceptor, ServiceCall, ServiceChannelInterceptor,
    TransactionListener,
};
pub use platform::{ChannelPlatform, ContainerPlatform, LocalPlatform};
pub use registry::{
    ActivityEntry, ActivityImplementation, ActivityRegistry, InMemoryServiceRegistry,
    ProxyDirectory, ServiceDirectory, ServiceDirectoryExt, ServiceEntry, ServiceImplementation,
    ServiceInstance, ServiceProviderEntry, ServiceProviderImplementation, ServiceProviderRegistry,
    ServiceRegistry, ServiceRegistryExt,
};
