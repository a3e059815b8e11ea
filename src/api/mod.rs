pub(crate) mod assistant;
pub(crate) mod auth;
pub(crate) mod batches;
pub(crate) mod errors;
pub(crate) mod exports;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod router;
pub(crate) mod validation;
