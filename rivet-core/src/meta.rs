use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Declaration site a piece of metadata is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// The controller as a whole (class-level declarations).
    Controller,
    /// A single named handler.
    Handler(String),
}

impl Target {
    pub fn handler(name: impl Into<String>) -> Self {
        Target::Handler(name.into())
    }
}

/// Type-erased metadata storage keyed by `(target, slot)`.
///
/// The slot is the Rust type of the stored value, so every reader gets back
/// exactly the type that was written. Single-value slots use
/// [`set`](Self::set)/[`get`](Self::get); list slots use
/// [`append`](Self::append)/[`list`](Self::list) so repeated declarations
/// compose instead of overwriting.
///
/// A store is owned by one controller's registration and is read-only once
/// compilation starts.
#[derive(Default)]
pub struct MetaStore {
    inner: HashMap<(Target, TypeId), Box<dyn Any + Send + Sync>>,
}

impl MetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a single value, replacing any previous value in the same slot.
    pub fn set<V: Any + Send + Sync>(&mut self, target: Target, value: V) {
        self.inner.insert((target, TypeId::of::<V>()), Box::new(value));
    }

    pub fn get<V: Any + Send + Sync>(&self, target: &Target) -> Option<&V> {
        self.inner
            .get(&(target.clone(), TypeId::of::<V>()))
            .and_then(|boxed| boxed.downcast_ref::<V>())
    }

    pub fn get_mut<V: Any + Send + Sync>(&mut self, target: &Target) -> Option<&mut V> {
        self.inner
            .get_mut(&(target.clone(), TypeId::of::<V>()))
            .and_then(|boxed| boxed.downcast_mut::<V>())
    }

    pub fn contains<V: Any + Send + Sync>(&self, target: &Target) -> bool {
        self.inner.contains_key(&(target.clone(), TypeId::of::<V>()))
    }

    /// Append an item to the list slot for `V`.
    pub fn append<V: Any + Send + Sync>(&mut self, target: Target, item: V) {
        self.list_entry::<V>(target).push(item);
    }

    /// All items appended to the list slot for `V`, in declaration order.
    pub fn list<V: Any + Send + Sync>(&self, target: &Target) -> &[V] {
        self.get::<Vec<V>>(target).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn list_mut<V: Any + Send + Sync>(&mut self, target: &Target) -> Option<&mut Vec<V>> {
        self.get_mut::<Vec<V>>(target)
    }

    fn list_entry<V: Any + Send + Sync>(&mut self, target: Target) -> &mut Vec<V> {
        let slot = self
            .inner
            .entry((target, TypeId::of::<Vec<V>>()))
            .or_insert_with(|| Box::new(Vec::<V>::new()));
        match slot.downcast_mut::<Vec<V>>() {
            Some(list) => list,
            // The key embeds TypeId::of::<Vec<V>>, so the box always holds a Vec<V>.
            None => unreachable!("MetaStore slot type mismatch"),
        }
    }
}
