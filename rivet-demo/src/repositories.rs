use rivet_core::prelude::*;
use tokio::sync::RwLock;

use crate::models::{Region, User};

/// In-memory user table, shared by every service that resolves it.
pub struct UserRepository {
    users: RwLock<Vec<User>>,
}

impl UserRepository {
    pub fn seeded() -> Self {
        let users = vec![
            User { id: 1, name: "Alice".into(), email: "alice@example.com".into(), role: "admin".into() },
            User { id: 2, name: "Bob".into(), email: "bob@example.com".into(), role: "user".into() },
        ];
        Self { users: RwLock::new(users) }
    }

    pub async fn all(&self) -> Vec<User> {
        self.users.read().await.clone()
    }

    pub async fn find(&self, id: u64) -> Option<User> {
        self.users.read().await.iter().find(|u| u.id == id).cloned()
    }

    pub async fn find_by_email(&self, email: &str) -> Option<User> {
        self.users
            .read()
            .await
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }

    pub async fn insert(&self, name: String, email: String, role: String) -> User {
        let mut users = self.users.write().await;
        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let user = User { id, name, email, role };
        users.push(user.clone());
        user
    }

    /// Apply `f` to the user with `id`, returning the updated copy.
    pub async fn update(&self, id: u64, f: impl FnOnce(&mut User)) -> Option<User> {
        let mut users = self.users.write().await;
        let user = users.iter_mut().find(|u| u.id == id)?;
        f(user);
        Some(user.clone())
    }

    pub async fn delete(&self, id: u64) -> bool {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|u| u.id != id);
        users.len() != before
    }
}

impl Injectable for UserRepository {
    fn lifetime() -> Lifetime {
        Lifetime::Singleton
    }

    fn construct(_: &Resolved) -> Result<Self, DiError> {
        Ok(Self::seeded())
    }
}

pub struct RegionRepository {
    regions: RwLock<Vec<Region>>,
}

impl RegionRepository {
    pub fn seeded() -> Self {
        let regions = vec![
            Region { id: 1, code: "PAR".into(), name: "Paris".into(), latitude: 48.8566, longitude: 2.3522 },
            Region { id: 2, code: "LYS".into(), name: "Lyon".into(), latitude: 45.7640, longitude: 4.8357 },
            Region { id: 3, code: "NYC".into(), name: "New York".into(), latitude: 40.7128, longitude: -74.0060 },
        ];
        Self { regions: RwLock::new(regions) }
    }

    pub async fn all(&self) -> Vec<Region> {
        self.regions.read().await.clone()
    }

    pub async fn find_by_code(&self, code: &str) -> Option<Region> {
        self.regions
            .read()
            .await
            .iter()
            .find(|r| r.code.eq_ignore_ascii_case(code))
            .cloned()
    }

    pub async fn insert(&self, code: String, name: String, latitude: f64, longitude: f64) -> Region {
        let mut regions = self.regions.write().await;
        let id = regions.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let region = Region { id, code, name, latitude, longitude };
        regions.push(region.clone());
        region
    }

    pub async fn delete(&self, id: u64) -> bool {
        let mut regions = self.regions.write().await;
        let before = regions.len();
        regions.retain(|r| r.id != id);
        regions.len() != before
    }
}

impl Injectable for RegionRepository {
    fn lifetime() -> Lifetime {
        Lifetime::Singleton
    }

    fn construct(_: &Resolved) -> Result<Self, DiError> {
        Ok(Self::seeded())
    }
}
