use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::types::short_type_name;

type Instance = Arc<dyn Any + Send + Sync>;
type Constructor = Arc<dyn Fn(&Resolved) -> Result<Instance, DiError> + Send + Sync>;
type Factory = Arc<dyn Fn(&mut Resolver<'_>) -> Result<Instance, DiError> + Send + Sync>;

// ── Traits ──────────────────────────────────────────────────────────────────

/// How long a constructed instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifetime {
    /// Constructed once, then reused for every resolution.
    Singleton,
    /// Constructed anew on every resolution.
    #[default]
    Transient,
}

/// A type the [`Container`] can construct by injecting its dependencies.
///
/// ```ignore
/// impl Injectable for UserService {
///     fn dependencies() -> Vec<Dependency> {
///         vec![Dependency::of::<UserRepository>()]
///     }
///
///     fn construct(deps: &Resolved) -> Result<Self, DiError> {
///         Ok(UserService { repo: deps.get()? })
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not injectable",
    label = "the container does not know how to construct this type",
    note = "implement `Injectable`, or use `register_singleton` / `register_factory`"
)]
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Constructor dependencies, in parameter order.
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    fn lifetime() -> Lifetime {
        Lifetime::Transient
    }

    fn construct(deps: &Resolved) -> Result<Self, DiError>;
}

/// One constructor dependency: a type identity plus a readable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub type_id: TypeId,
    pub name: &'static str,
}

impl Dependency {
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: short_type_name::<T>(),
        }
    }
}

/// Dependencies resolved for one construction.
#[derive(Default)]
pub struct Resolved {
    entries: HashMap<TypeId, Instance>,
}

impl Resolved {
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, DiError> {
        let name = short_type_name::<T>();
        let entry = self
            .entries
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or(DiError::NotRegistered { name })?;
        entry
            .downcast::<T>()
            .map_err(|_| DiError::TypeMismatch { name })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("entry_count", &self.entries.len())
            .finish()
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

/// Errors raised while resolving the dependency graph. Fatal at startup.
#[derive(Debug)]
pub enum DiError {
    /// A type (directly or transitively) requires itself.
    CircularDependency { chain: Vec<String> },
    /// Neither registered, provided, nor produced by a factory.
    NotRegistered { name: &'static str },
    /// A dependency of `class` at constructor position `index` failed.
    Resolution {
        class: &'static str,
        dependency: &'static str,
        index: usize,
        source: Box<DiError>,
    },
    /// User construction code failed.
    Construction { class: &'static str, message: String },
    /// A stored instance has a different type than requested.
    TypeMismatch { name: &'static str },
}

impl DiError {
    pub fn construction<T>(message: impl Into<String>) -> Self {
        DiError::Construction {
            class: short_type_name::<T>(),
            message: message.into(),
        }
    }

    /// The innermost error of a `Resolution` chain.
    pub fn root_cause(&self) -> &DiError {
        match self {
            DiError::Resolution { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl fmt::Display for DiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiError::CircularDependency { chain } => {
                write!(f, "Circular dependency detected: {}", chain.join(" -> "))
            }
            DiError::NotRegistered { name } => write!(
                f,
                "Type '{name}' is not registered. Use .register::<T>(), \
                 .register_singleton(value) or .register_factory(f)"
            ),
            DiError::Resolution {
                class,
                dependency,
                index,
                source,
            } => write!(
                f,
                "Failed to resolve dependency '{dependency}' at index {index} of '{class}': {source}"
            ),
            DiError::Construction { class, message } => {
                write!(f, "Failed to construct '{class}': {message}")
            }
            DiError::TypeMismatch { name } => {
                write!(f, "Stored instance for '{name}' has an unexpected type")
            }
        }
    }
}

impl std::error::Error for DiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiError::Resolution { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

// ── Container ───────────────────────────────────────────────────────────────

struct Registration {
    name: &'static str,
    dependencies: Vec<Dependency>,
    lifetime: Lifetime,
    construct: Constructor,
}

/// Constructor-injection container with singleton and transient lifetimes.
///
/// Registration happens at startup through `&mut self`; resolution takes
/// `&self` and may run concurrently. Each top-level [`resolve`](Self::resolve)
/// call owns its own resolution stack.
#[derive(Default)]
pub struct Container {
    registrations: HashMap<TypeId, Registration>,
    factories: HashMap<TypeId, Factory>,
    singletons: DashMap<TypeId, Instance>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registrations", &self.registrations.len())
            .field("factories", &self.factories.len())
            .field("singletons", &self.singletons.len())
            .finish()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` for constructor injection.
    pub fn register<T: Injectable>(&mut self) -> &mut Self {
        self.registrations.insert(
            TypeId::of::<T>(),
            Registration {
                name: short_type_name::<T>(),
                dependencies: T::dependencies(),
                lifetime: T::lifetime(),
                construct: Arc::new(|deps: &Resolved| Ok(Arc::new(T::construct(deps)?) as Instance)),
            },
        );
        self
    }

    /// Provide a pre-built instance, returned by every resolution of `T`.
    pub fn register_singleton<T: Send + Sync + 'static>(&mut self, instance: T) -> &mut Self {
        self.register_instance(Arc::new(instance))
    }

    pub fn register_instance<T: Send + Sync + 'static>(&mut self, instance: Arc<T>) -> &mut Self {
        self.singletons.insert(TypeId::of::<T>(), instance as Instance);
        self
    }

    /// Produce `T` with a closure, called on every resolution. The closure
    /// may resolve further dependencies through the given [`Resolver`].
    pub fn register_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&mut Resolver<'_>) -> Result<T, DiError> + Send + Sync + 'static,
    {
        self.factories.insert(
            TypeId::of::<T>(),
            Arc::new(move |resolver: &mut Resolver<'_>| {
                Ok(Arc::new(factory(resolver)?) as Instance)
            }),
        );
        self
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        let id = TypeId::of::<T>();
        self.registrations.contains_key(&id)
            || self.factories.contains_key(&id)
            || self.singletons.contains_key(&id)
    }

    /// Resolve `T` with a fresh resolution stack.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, DiError> {
        Resolver::new(self).resolve::<T>()
    }
}

/// One top-level resolution: the container plus the stack of types being
/// constructed.
pub struct Resolver<'c> {
    container: &'c Container,
    stack: Vec<(TypeId, &'static str)>,
}

impl<'c> Resolver<'c> {
    fn new(container: &'c Container) -> Self {
        Self {
            container,
            stack: Vec::new(),
        }
    }

    /// Names of the types currently under construction, outermost first.
    pub fn stack(&self) -> Vec<&'static str> {
        self.stack.iter().map(|(_, name)| *name).collect()
    }

    pub fn resolve<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>, DiError> {
        let dep = Dependency::of::<T>();
        self.resolve_erased(dep)?
            .downcast::<T>()
            .map_err(|_| DiError::TypeMismatch { name: dep.name })
    }

    fn resolve_erased(&mut self, dep: Dependency) -> Result<Instance, DiError> {
        if self.stack.iter().any(|(id, _)| *id == dep.type_id) {
            let mut chain: Vec<String> = self.stack.iter().map(|(_, n)| n.to_string()).collect();
            chain.push(dep.name.to_string());
            return Err(DiError::CircularDependency { chain });
        }

        if let Some(instance) = self.container.singletons.get(&dep.type_id) {
            trace!(name = dep.name, "Resolved cached singleton");
            return Ok(instance.clone());
        }

        if let Some(factory) = self.container.factories.get(&dep.type_id).cloned() {
            self.stack.push((dep.type_id, dep.name));
            let result = factory(self);
            self.stack.pop();
            return result;
        }

        let container = self.container;
        let registration = container
            .registrations
            .get(&dep.type_id)
            .ok_or(DiError::NotRegistered { name: dep.name })?;

        self.stack.push((dep.type_id, dep.name));
        let result = self.construct(registration);
        self.stack.pop();
        let instance = result?;

        if registration.lifetime == Lifetime::Singleton {
            debug!(name = registration.name, "Constructed singleton");
            let cached = container
                .singletons
                .entry(dep.type_id)
                .or_insert(instance)
                .clone();
            return Ok(cached);
        }
        Ok(instance)
    }

    fn construct(&mut self, registration: &Registration) -> Result<Instance, DiError> {
        let mut resolved = Resolved::default();
        for (index, dep) in registration.dependencies.iter().enumerate() {
            match self.resolve_erased(*dep) {
                Ok(instance) => {
                    resolved.entries.insert(dep.type_id, instance);
                }
                Err(err @ DiError::CircularDependency { .. }) => return Err(err),
                Err(err) => {
                    return Err(DiError::Resolution {
                        class: registration.name,
                        dependency: dep.name,
                        index,
                        source: Box::new(err),
                    })
                }
            }
        }
        (registration.construct)(&resolved)
    }
}
