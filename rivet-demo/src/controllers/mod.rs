pub mod region_controller;
pub mod user_controller;

use rivet_core::{AppError, Args};

/// Numeric id from a path argument.
pub(crate) fn id_arg(args: &Args, index: usize) -> Result<u64, AppError> {
    let raw = args.str(index)?;
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("'{raw}' is not a valid id")))
}

/// Float from an optional query argument, `default` when absent.
pub(crate) fn float_arg(args: &Args, index: usize, name: &str, default: Option<f64>) -> Result<f64, AppError> {
    match (args.value(index).and_then(|v| v.as_str()), default) {
        (Some(raw), _) => raw
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Query parameter '{name}' must be a number"))),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(AppError::BadRequest(format!("Query parameter '{name}' is required"))),
    }
}
