use rivet_core::prelude::*;

use crate::models::{CreateRegionRequest, CreateUserRequest, Region, UpdateUserRequest, User};
use crate::repositories::{RegionRepository, UserRepository};

const EARTH_RADIUS_KM: f64 = 6371.0;

pub struct UserService {
    repo: Arc<UserRepository>,
}

impl Injectable for UserService {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<UserRepository>()]
    }

    fn construct(deps: &Resolved) -> Result<Self, DiError> {
        Ok(Self { repo: deps.get()? })
    }
}

impl UserService {
    pub async fn list(&self) -> Vec<User> {
        self.repo.all().await
    }

    pub async fn get(&self, id: u64) -> Result<User, AppError> {
        self.repo
            .find(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))
    }

    pub async fn create(&self, req: CreateUserRequest) -> Result<User, AppError> {
        if self.repo.find_by_email(&req.email).await.is_some() {
            return Err(AppError::Conflict(format!("Email {} is already registered", req.email)));
        }
        let user = self.repo.insert(req.name, req.email, req.role).await;
        tracing::info!(user_id = user.id, "User created");
        Ok(user)
    }

    pub async fn update(&self, id: u64, req: UpdateUserRequest) -> Result<User, AppError> {
        if let Some(email) = &req.email {
            if let Some(owner) = self.repo.find_by_email(email).await {
                if owner.id != id {
                    return Err(AppError::Conflict(format!("Email {email} is already registered")));
                }
            }
        }
        self.repo
            .update(id, |user| {
                if let Some(name) = req.name {
                    user.name = name;
                }
                if let Some(email) = req.email {
                    user.email = email;
                }
            })
            .await
            .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))
    }

    pub async fn delete(&self, id: u64) -> Result<(), AppError> {
        if self.repo.delete(id).await {
            tracing::info!(user_id = id, "User deleted");
            Ok(())
        } else {
            Err(AppError::NotFound(format!("User {id} not found")))
        }
    }
}

pub struct RegionService {
    repo: Arc<RegionRepository>,
}

impl Injectable for RegionService {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<RegionRepository>()]
    }

    fn construct(deps: &Resolved) -> Result<Self, DiError> {
        Ok(Self { repo: deps.get()? })
    }
}

impl RegionService {
    pub async fn list(&self) -> Vec<Region> {
        self.repo.all().await
    }

    pub async fn create(&self, req: CreateRegionRequest) -> Result<Region, AppError> {
        let code = req.code.to_ascii_uppercase();
        if self.repo.find_by_code(&code).await.is_some() {
            return Err(AppError::Conflict(format!("Region {code} already exists")));
        }
        Ok(self
            .repo
            .insert(code, req.name, req.latitude, req.longitude)
            .await)
    }

    pub async fn delete(&self, id: u64) -> Result<(), AppError> {
        if self.repo.delete(id).await {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Region {id} not found")))
        }
    }

    /// Regions within `radius_km` of a point, nearest first.
    pub async fn nearby(&self, latitude: f64, longitude: f64, radius_km: f64) -> Vec<(Region, f64)> {
        let mut hits: Vec<(Region, f64)> = self
            .repo
            .all()
            .await
            .into_iter()
            .map(|r| {
                let d = distance_km(latitude, longitude, r.latitude, r.longitude);
                (r, d)
            })
            .filter(|(_, d)| *d <= radius_km)
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits
    }
}

/// Great-circle distance (haversine).
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
