use rivet_core::prelude::*;
use rivet_utils::ActivityLog;
use serde_json::json;

use crate::controllers::{float_arg, id_arg};
use crate::models::CreateRegionRequest;
use crate::services::RegionService;

const DEFAULT_RADIUS_KM: f64 = 50.0;

pub struct RegionController {
    regions: Arc<RegionService>,
}

impl Injectable for RegionController {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<RegionService>()]
    }

    fn construct(deps: &Resolved) -> Result<Self, DiError> {
        Ok(Self { regions: deps.get()? })
    }
}

impl Controller for RegionController {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.controller("/regions")
            .version("v1")
            .middleware(ActivityLog::tracing());

        b.get("/", "list", Self::list);
        b.get("/nearby", "nearby", Self::nearby)
            .platform(Platform::Mobile)
            .param(ParameterDescriptor::query(0, "lat"))
            .param(ParameterDescriptor::query(1, "lon"))
            .param(ParameterDescriptor::query(2, "radius_km"));
        b.post("/", "create", Self::create)
            .require_permissions(["regions:write"])
            .param(ParameterDescriptor::body(0).validate::<CreateRegionRequest>());
        b.delete("/{id}", "delete", Self::delete)
            .require_any_permission(["regions:write", "regions:admin"])
            .param(ParameterDescriptor::path(0, "id"));
    }
}

impl RegionController {
    async fn list(self: Arc<Self>, _ctx: RequestContext, _args: Args) -> Result<Reply, AppError> {
        Reply::ok(self.regions.list().await)
    }

    async fn nearby(self: Arc<Self>, _ctx: RequestContext, args: Args) -> Result<Reply, AppError> {
        let lat = float_arg(&args, 0, "lat", None)?;
        let lon = float_arg(&args, 1, "lon", None)?;
        let radius = float_arg(&args, 2, "radius_km", Some(DEFAULT_RADIUS_KM))?;
        let hits: Vec<_> = self
            .regions
            .nearby(lat, lon, radius)
            .await
            .into_iter()
            .map(|(region, distance_km)| json!({ "region": region, "distance_km": distance_km }))
            .collect();
        Reply::ok(hits)
    }

    async fn create(self: Arc<Self>, _ctx: RequestContext, args: Args) -> Result<Reply, AppError> {
        Reply::created(self.regions.create(args.get(0)?).await?)
    }

    async fn delete(self: Arc<Self>, _ctx: RequestContext, args: Args) -> Result<Reply, AppError> {
        self.regions.delete(id_arg(&args, 0)?).await?;
        Reply::no_content()
    }
}
