use std::future::Future;
use std::pin::Pin;

/// A boxed, `Send` future. Used at every dynamic seam (middleware, guards,
/// stores) where trait objects must return futures.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Short, human-readable name of a type: the last path segment without
/// generic arguments (`my_app::services::UserService` -> `UserService`).
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
