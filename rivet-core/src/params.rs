use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::descriptor::{ParamSource, ParameterDescriptor};
use crate::error::{AppError, RouteError};
use crate::validation::ValidationFailure;

/// One resolved handler argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A value extracted from the request (body, path, query, header, user).
    Value(Value),
    /// Escape hatch: the handler reads the raw request from its context.
    Request,
    /// Escape hatch: the handler builds its own response via `Reply::Raw`.
    Response,
    /// Never filled; continuation is owned by the middleware chain.
    Unset,
}

impl Arg {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Positional arguments for a handler invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Arg>);

impl Args {
    pub fn new(args: Vec<Arg>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn arg(&self, index: usize) -> Option<&Arg> {
        self.0.get(index)
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.0.get(index).and_then(Arg::as_value)
    }

    /// Deserialize the argument at `index`.
    ///
    /// A missing value deserializes from `null`, so `Option<T>` arguments
    /// read as `None`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, AppError> {
        let value = self.value(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|e| AppError::BadRequest(format!("Invalid argument at position {index}: {e}")))
    }

    /// Borrow the argument at `index` as a string.
    pub fn str(&self, index: usize) -> Result<&str, AppError> {
        self.value(index)
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::BadRequest(format!("Missing string argument at position {index}")))
    }

    pub fn into_vec(self) -> Vec<Arg> {
        self.0
    }
}

/// Builds handler arguments from parameter descriptors and the request.
#[derive(Debug, Clone, Default)]
pub struct ParameterResolver;

impl ParameterResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve `params` against `ctx` into positional arguments.
    ///
    /// Descriptors are ordered by index; every slot up to the highest index
    /// must be declared. Schema failures surface as
    /// [`RouteError::Validation`].
    pub async fn resolve(
        &self,
        params: &[ParameterDescriptor],
        ctx: &mut RequestContext,
    ) -> Result<Args, RouteError> {
        let mut ordered: Vec<&ParameterDescriptor> = params.iter().collect();
        ordered.sort_by_key(|p| p.index);

        let size = ordered.last().map(|p| p.index + 1).unwrap_or(0);
        let mut args: Vec<Option<Arg>> = vec![None; size];

        for param in ordered {
            let raw = extract(param, ctx)?;
            let arg = match (raw, &param.schema) {
                (Arg::Value(value), Some(schema)) => Arg::Value(
                    schema
                        .parse(value)
                        .await
                        .map_err(|failure| failure.scoped(param.label()))?,
                ),
                (other, _) => other,
            };
            args[param.index] = Some(arg);
        }

        let mut resolved = Vec::with_capacity(size);
        for (index, slot) in args.into_iter().enumerate() {
            match slot {
                Some(arg) => resolved.push(arg),
                None => {
                    return Err(RouteError::Handler(AppError::Internal(format!(
                        "Handler '{}' has no parameter declared at position {index}",
                        ctx.route().handler
                    ))))
                }
            }
        }
        Ok(Args(resolved))
    }
}

fn extract(param: &ParameterDescriptor, ctx: &mut RequestContext) -> Result<Arg, ValidationFailure> {
    let name = param.name.as_deref();
    let arg = match param.source {
        ParamSource::Body => {
            let body = ctx.body_json()?;
            match name {
                Some(field) => Arg::Value(body.get(field).cloned().unwrap_or(Value::Null)),
                None => Arg::Value(body.clone()),
            }
        }
        ParamSource::Path => Arg::Value(match name {
            Some(key) => optional_string(ctx.path_param(key)),
            None => collect_pairs(ctx.path_params().iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        }),
        ParamSource::Query => Arg::Value(match name {
            Some(key) => optional_string(ctx.query_param(key)),
            None => collect_pairs(ctx.query_pairs().iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        }),
        ParamSource::Header => Arg::Value(match name {
            Some(key) => optional_string(ctx.header(key)),
            None => collect_pairs(
                ctx.headers()
                    .iter()
                    .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str(), v))),
            ),
        }),
        ParamSource::User => Arg::Value(
            ctx.principal()
                .map(|p| p.to_json())
                .unwrap_or(Value::Null),
        ),
        ParamSource::Request => Arg::Request,
        ParamSource::Response => Arg::Response,
        ParamSource::Next => Arg::Unset,
    };
    Ok(arg)
}

fn optional_string(value: Option<&str>) -> Value {
    value.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null)
}

/// Collect pairs into an object; repeated keys become arrays.
fn collect_pairs<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value.to_string());
        match map.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.to_string(), value);
            }
        }
    }
    Value::Object(map)
}
